//! CEL (Common Expression Language) constraint conditions
//!
//! Pairwise constraints may express their trigger and requirement as CEL
//! over parameter names, e.g. `mode == "aggressive" && interval > 30`.
//! Expressions are parsed once per command (using cel-parser) to find the
//! parameters they read, then evaluated against partial assignments (using
//! cel-interpreter).

use crate::error::SpecDefect;
use crate::spec::ParamValue;
use cel_interpreter::{Context, Program, Value};
use cel_parser::ast::{EntryExpr, Expr, MapExpr, StructExpr};
use cel_parser::Parser;
use indexmap::IndexMap;

/// Parsed CEL expression
pub use cel_parser::Expression as CelExpr;

/// Re-export cel-interpreter Value for callers building bindings by hand
pub use cel_interpreter::Value as CelValue;

/// A compiled boolean expression over parameter names
pub struct CelCondition {
    source: String,
    program: Program,
    variables: Vec<String>,
}

impl std::fmt::Debug for CelCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CelCondition")
            .field("source", &self.source)
            .field("variables", &self.variables)
            .finish()
    }
}

impl CelCondition {
    /// Compile `expr`; `known` lists the names that count as variables
    pub fn compile(expr: &str, known: &[&str]) -> Result<Self, SpecDefect> {
        let ast = parse(expr)?;
        let program = Program::compile(expr).map_err(|e| SpecDefect::Expression {
            expression: expr.to_string(),
            reason: format!("{:?}", e),
        })?;

        let variables = referenced_identifiers(&ast)
            .into_iter()
            .filter(|v| known.contains(&v.as_str()))
            .collect();

        Ok(Self {
            source: expr.to_string(),
            program,
            variables,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Parameter names the expression reads
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Whether every referenced parameter has a binding
    pub fn is_bound(&self, bindings: &IndexMap<String, ParamValue>) -> bool {
        self.variables.iter().all(|v| bindings.contains_key(v))
    }

    /// Evaluate against bindings; the result must be a bool
    pub fn eval_bool(&self, bindings: &IndexMap<String, ParamValue>) -> Result<bool, SpecDefect> {
        let mut context = Context::default();
        for (name, value) in bindings {
            context.add_variable_from_value(name.clone(), to_cel_value(value));
        }

        match self.program.execute(&context) {
            Ok(Value::Bool(b)) => Ok(b),
            Ok(other) => Err(SpecDefect::Expression {
                expression: self.source.clone(),
                reason: format!("expected bool result, got {:?}", other),
            }),
            Err(e) => Err(SpecDefect::Expression {
                expression: self.source.clone(),
                reason: format!("{:?}", e),
            }),
        }
    }
}

/// Convert a spec value into a CEL value
pub fn to_cel_value(value: &ParamValue) -> CelValue {
    match value {
        ParamValue::Bool(b) => (*b).into(),
        ParamValue::Int(i) => (*i).into(),
        ParamValue::Text(s) => s.clone().into(),
    }
}

/// Parse `expr` into a CEL syntax tree (using cel-parser)
pub fn parse(expr: &str) -> Result<CelExpr, SpecDefect> {
    Parser::new().parse(expr).map_err(|e| SpecDefect::Expression {
        expression: expr.to_string(),
        reason: e.to_string(),
    })
}

/// Free identifiers of an expression, sorted and deduplicated
///
/// Names bound by comprehension macros (`all`, `exists`, `map`, ...) are
/// local to their loop and do not count.
pub fn referenced_identifiers(expr: &CelExpr) -> Vec<String> {
    let mut vars = Vec::new();
    collect_identifiers(expr, &mut Vec::new(), &mut vars);
    vars.sort();
    vars.dedup();
    vars
}

fn collect_identifiers<'e>(expr: &'e CelExpr, bound: &mut Vec<&'e str>, vars: &mut Vec<String>) {
    match &expr.expr {
        Expr::Ident(name) => {
            if !name.starts_with('@') && !bound.contains(&name.as_str()) {
                vars.push(name.clone());
            }
        }
        Expr::Select(select) => collect_identifiers(&select.operand, bound, vars),
        Expr::Call(call) => {
            if let Some(target) = &call.target {
                collect_identifiers(target, bound, vars);
            }
            for arg in &call.args {
                collect_identifiers(arg, bound, vars);
            }
        }
        Expr::Comprehension(comp) => {
            collect_identifiers(&comp.iter_range, bound, vars);
            collect_identifiers(&comp.accu_init, bound, vars);

            let depth = bound.len();
            bound.push(comp.iter_var.as_str());
            if let Some(second) = &comp.iter_var2 {
                bound.push(second.as_str());
            }
            bound.push(comp.accu_var.as_str());
            collect_identifiers(&comp.loop_cond, bound, vars);
            collect_identifiers(&comp.loop_step, bound, vars);
            collect_identifiers(&comp.result, bound, vars);
            bound.truncate(depth);
        }
        Expr::List(list) => {
            for item in &list.elements {
                collect_identifiers(item, bound, vars);
            }
        }
        Expr::Map(MapExpr { entries }) | Expr::Struct(StructExpr { entries, .. }) => {
            for entry in entries {
                match &entry.expr {
                    EntryExpr::StructField(field) => collect_identifiers(&field.value, bound, vars),
                    EntryExpr::MapEntry(pair) => {
                        collect_identifiers(&pair.key, bound, vars);
                        collect_identifiers(&pair.value, bound, vars);
                    }
                }
            }
        }
        Expr::Literal(_) | Expr::Unspecified => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(pairs: &[(&str, ParamValue)]) -> IndexMap<String, ParamValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn idents(expr: &str) -> Vec<String> {
        referenced_identifiers(&parse(expr).unwrap())
    }

    #[test]
    fn test_referenced_identifiers() {
        let vars = idents(r#"mode == "main" && size(group) > 0 || pfs"#);
        assert_eq!(vars, vec!["group", "mode", "pfs"]);
    }

    #[test]
    fn test_identifiers_inside_literals_are_ignored() {
        let vars = idents(r#"protocol == "esp_tunnel" && 'auth' != method && b"mode" != r"x""#);
        assert_eq!(vars, vec!["method", "protocol"]);
    }

    #[test]
    fn test_comprehension_variables_are_local() {
        let vars = idents("peers.all(mode, mode != local) && [1, 2].exists(x, x == count)");
        assert_eq!(vars, vec!["count", "local", "peers"]);
    }

    #[test]
    fn test_selects_report_their_operand() {
        assert_eq!(idents("proposal.pfs == true"), vec!["proposal"]);
    }

    #[test]
    fn test_parse_error_is_defect() {
        let err = CelCondition::compile("mode ==", &["mode"]).unwrap_err();
        assert!(matches!(err, SpecDefect::Expression { .. }));
    }

    #[test]
    fn test_eval_bool() {
        let cond = CelCondition::compile(r#"mode == "aggressive" && interval > 30"#, &[
            "mode", "interval",
        ])
        .unwrap();
        assert_eq!(cond.variables(), &["interval", "mode"]);

        let hit = bind(&[("mode", "aggressive".into()), ("interval", ParamValue::Int(60))]);
        let miss = bind(&[("mode", "main".into()), ("interval", ParamValue::Int(60))]);
        assert!(cond.eval_bool(&hit).unwrap());
        assert!(!cond.eval_bool(&miss).unwrap());
    }

    #[test]
    fn test_unknown_names_are_not_variables() {
        let cond = CelCondition::compile(r#"mode == "main""#, &["interval"]).unwrap();
        assert!(cond.variables().is_empty());
        assert!(cond.is_bound(&IndexMap::new()));
    }

    #[test]
    fn test_non_bool_result_is_defect() {
        let cond = CelCondition::compile("interval + 1", &["interval"]).unwrap();
        let err = cond.eval_bool(&bind(&[("interval", ParamValue::Int(1))])).unwrap_err();
        assert!(matches!(err, SpecDefect::Expression { .. }));
    }
}
