//! Command validation - detect malformed or inconsistent specs
//!
//! Detects:
//! - Empty names, unknown models and unknown parameter references
//! - Unordered ranges and enum values outside their declared set
//! - Malformed templates and patterns, duplicate test names
//! - Boundary contradictions, constraint precedence and uncoverable pairs
//!
//! Coverage gaps are reported as warnings.

use crate::boundary::BoundaryExpander;
use crate::config::{Catalog, LicenseContext};
use crate::error::{CoverageGap, Error, Result, SpecDefect};
use crate::fields::FieldEmitter;
use crate::pairwise::PairwiseGenerator;
use crate::resolve::Resolver;
use crate::spec::{Command, ParamType, SwitchState};
use crate::syntax::compile_templates;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Result of command validation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidationReport {
    pub command: String,
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    pub error_count: usize,
    pub warning_count: usize,
}

/// A validation issue found in a command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidationIssue {
    pub code: String,
    pub severity: Severity,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub defect: Option<SpecDefect>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap: Option<CoverageGap>,

    /// How to resolve the issue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// Severity of a validation issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Severity {
    Error,
    Warning,
}

impl ValidationReport {
    /// Defects among the issues
    pub fn defects(&self) -> Vec<SpecDefect> {
        self.issues.iter().filter_map(|i| i.defect.clone()).collect()
    }
}

/// Validate a command against the catalog
///
/// In strict mode coverage gaps count as errors.
pub fn validate_command(
    command: &Command,
    catalog: &Catalog,
    license: &LicenseContext,
    strict: bool,
) -> ValidationReport {
    let mut defects = static_defects(command, catalog);
    let mut gaps = Vec::new();

    // Generators surface the defects only visible after resolution
    let resolver = Resolver::new(catalog);
    let expander = BoundaryExpander::for_command(&resolver, command, "invalid-value");
    match expander.expand_command(command, license) {
        Ok(expansions) => gaps.extend(expansions.into_iter().flat_map(|e| e.gaps)),
        Err(e) => defects.extend(e.defects().iter().cloned()),
    }
    if let Err(e) = PairwiseGenerator::new(&resolver, license).generate(command) {
        defects.extend(e.defects().iter().cloned());
    }
    if let Err(e) = FieldEmitter::new().emit_all(command) {
        defects.extend(e.defects().iter().cloned());
    }

    let mut unique = Vec::with_capacity(defects.len());
    for d in defects {
        if !unique.contains(&d) {
            unique.push(d);
        }
    }

    let mut issues = Vec::new();
    let mut counter = 1;
    let mut next_code = || {
        let c = counter;
        counter += 1;
        format!("V{:03}", c)
    };
    for defect in unique {
        issues.push(ValidationIssue {
            code: next_code(),
            severity: Severity::Error,
            message: defect.to_string(),
            suggestion: suggestion_for(&defect),
            defect: Some(defect),
            gap: None,
        });
    }
    for gap in gaps {
        issues.push(ValidationIssue {
            code: next_code(),
            severity: if strict { Severity::Error } else { Severity::Warning },
            message: gap.to_string(),
            suggestion: Some("declare the missing data or set derive_boundaries: false".into()),
            defect: None,
            gap: Some(gap),
        });
    }

    let error_count = issues.iter().filter(|i| i.severity == Severity::Error).count();
    ValidationReport {
        command: command.name.clone(),
        is_valid: error_count == 0,
        warning_count: issues.len() - error_count,
        error_count,
        issues,
    }
}

/// Fail with every defect found, ignoring coverage gaps
pub fn ensure_valid(command: &Command, catalog: &Catalog) -> Result<()> {
    let defects = static_defects(command, catalog);
    if defects.is_empty() {
        Ok(())
    } else {
        Err(Error::Defects(defects))
    }
}

/// Defects detectable without resolving any domain
pub fn static_defects(command: &Command, catalog: &Catalog) -> Vec<SpecDefect> {
    let mut defects = Vec::new();

    if command.name.trim().is_empty() {
        defects.push(SpecDefect::EmptyName);
    }

    check_models(command, catalog, &mut defects);
    check_parameters(command, &mut defects);

    if let Err(d) = compile_templates(command) {
        defects.extend(d);
    }

    let mut names = HashSet::new();
    for test in command.all_syntax_tests() {
        if !names.insert(test.name.as_str()) {
            defects.push(SpecDefect::Duplicate {
                what: "syntax test".into(),
                name: test.name.clone(),
            });
        }
    }

    if let Some(pairwise) = &command.pairwise {
        for name in pairwise.parameters.iter().chain(pairwise.parameter_values.keys()) {
            if !command.parameters.contains_key(name) {
                let d = SpecDefect::UnknownParameter {
                    parameter: name.clone(),
                    context: "pairwise".into(),
                };
                if !defects.contains(&d) {
                    defects.push(d);
                }
            }
        }
        for (name, values) in &pairwise.parameter_values {
            let Some(param) = command.parameters.get(name) else {
                continue;
            };
            if param.typ != ParamType::Enum || param.enum_values.is_empty() {
                continue;
            }
            for v in values {
                let text = v.to_string();
                if param.enum_value(&text).is_none() {
                    defects.push(SpecDefect::EnumValueOutOfSet {
                        parameter: name.clone(),
                        value: text,
                        context: "pairwise parameter_values".into(),
                    });
                }
            }
        }
    }

    defects
}

fn check_models(command: &Command, catalog: &Catalog, defects: &mut Vec<SpecDefect>) {
    let mut unknown = |model: &String, context: String| {
        if !catalog.knows_model(model) {
            defects.push(SpecDefect::UnknownModel {
                model: model.clone(),
                context,
            });
        }
    };

    for m in &command.applicable_models {
        unknown(m, "applicable_models".into());
    }
    for (name, param) in &command.parameters {
        for m in param.model_constraints.keys() {
            unknown(m, format!("model_constraints of parameter '{}'", name));
        }
        if let Some(a) = &param.availability {
            for m in a.referenced_models() {
                unknown(m, format!("availability of parameter '{}'", name));
            }
        }
    }
    for (name, cases) in &command.boundary_tests {
        for case in cases {
            for m in case.valid_for.iter().chain(&case.invalid_for) {
                unknown(m, format!("boundary test {}={}", name, case.value));
            }
        }
    }
    for test in command.all_syntax_tests() {
        if let Some(c) = &test.model_constraints {
            for m in c.referenced_models() {
                unknown(m, format!("syntax test '{}'", test.name));
            }
        }
    }
    if let Some(pairwise) = &command.pairwise {
        for (i, c) in pairwise.constraints.iter().enumerate() {
            for m in &c.invalid_for {
                unknown(m, format!("pairwise constraint {}", c.label(i)));
            }
        }
    }
}

fn check_parameters(command: &Command, defects: &mut Vec<SpecDefect>) {
    for (name, param) in &command.parameters {
        if let Some(r) = param.range {
            if !r.is_ordered() {
                defects.push(SpecDefect::MalformedRange {
                    parameter: name.clone(),
                    model: None,
                    min: r.min,
                    max: r.max,
                });
            }
        }
        for (model, over) in &param.model_constraints {
            if let Some(r) = over.range.filter(|r| !r.is_ordered()) {
                defects.push(SpecDefect::MalformedRange {
                    parameter: name.clone(),
                    model: Some(model.clone()),
                    min: r.min,
                    max: r.max,
                });
            }
            if param.typ == ParamType::Enum {
                for v in &over.exclude_values {
                    if param.enum_value(v).is_none() {
                        defects.push(SpecDefect::EnumValueOutOfSet {
                            parameter: name.clone(),
                            value: v.clone(),
                            context: format!("exclude_values on {}", model),
                        });
                    }
                }
            }
        }

        if let Some(default) = &param.default {
            let text = default.to_string();
            let out_of_set = match param.typ {
                ParamType::Enum => param.enum_value(&text).is_none(),
                ParamType::Switch if param.enum_values.is_empty() => SwitchState::parse(&text).is_none(),
                ParamType::Switch => param.enum_value(&text).is_none(),
                _ => false,
            };
            if out_of_set {
                defects.push(SpecDefect::EnumValueOutOfSet {
                    parameter: name.clone(),
                    value: text,
                    context: "default".into(),
                });
            }
        }

        if let Some(p) = &param.pattern {
            if let Err(e) = Regex::new(p) {
                defects.push(SpecDefect::InvalidPattern {
                    pattern: p.clone(),
                    context: format!("parameter '{}'", name),
                    reason: e.to_string(),
                });
            }
        }

        for v in &param.variants {
            if let Some(p) = &v.pattern {
                if let Err(e) = Regex::new(p) {
                    defects.push(SpecDefect::InvalidPattern {
                        pattern: p.clone(),
                        context: format!("variant '{}' of parameter '{}'", v.name, name),
                        reason: e.to_string(),
                    });
                }
            }
            if let Some(r) = v.range.filter(|r| !r.is_ordered()) {
                defects.push(SpecDefect::MalformedRange {
                    parameter: format!("{}.{}", name, v.name),
                    model: None,
                    min: r.min,
                    max: r.max,
                });
            }
            for other in v.terraform_fields.keys() {
                if !command.parameters.contains_key(other) {
                    defects.push(SpecDefect::UnknownParameter {
                        parameter: other.clone(),
                        context: format!("variant '{}' of parameter '{}'", v.name, name),
                    });
                }
            }
        }
    }
}

fn suggestion_for(defect: &SpecDefect) -> Option<String> {
    let text = match defect {
        SpecDefect::UnknownModel { .. } => "add the model to the catalog or fix the identifier",
        SpecDefect::UnknownParameter { .. } => "declare the parameter under `parameters` or fix the reference",
        SpecDefect::MalformedRange { .. } => "swap the bounds so that min <= max",
        SpecDefect::ConstraintPrecedence { .. } => "give the overlapping constraints distinct `priority` values",
        SpecDefect::AmbiguousConstraint { .. } => "split the constraint into a requires rule and an invalid_for rule",
        SpecDefect::Duplicate { .. } => "rename one of the tests",
        SpecDefect::FieldCollision { .. } => "bind one of the parameters to a different terraform_field",
        _ => return None,
    };
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Spec;

    const BROKEN: &str = r#"
command:
  name: ipsec ike encryption
  applicable_models: [RTX1210, RTX9999]
  syntax:
    set: "ipsec ike encryption <gateway_id> <algorithm>"
  parameters:
    gateway_id:
      type: int
      range: [1000, 1]
    algorithm:
      type: enum
      default: blowfish
      enum_values:
        - value: 3des-cbc
        - value: aes-cbc
  syntax_tests:
    - name: aes
      rtx: "ipsec ike encryption 1 aes-cbc"
      terraform: { gateway_id: 1, algorithm: aes-cbc }
    - name: aes
      rtx: "ipsec ike encryption 2 aes-cbc"
      terraform: { gateway_id: 2, algorithm: aes-cbc }
"#;

    fn catalog() -> Catalog {
        serde_norway::from_str("models: { RTX1210: {}, RTX830: {} }").unwrap()
    }

    #[test]
    fn test_static_defects() {
        let spec = Spec::from_yaml(BROKEN).unwrap();
        let defects = static_defects(&spec.command, &catalog());
        assert!(defects.contains(&SpecDefect::UnknownModel {
            model: "RTX9999".into(),
            context: "applicable_models".into(),
        }));
        assert!(defects
            .iter()
            .any(|d| matches!(d, SpecDefect::MalformedRange { parameter, .. } if parameter == "gateway_id")));
        assert!(defects.iter().any(
            |d| matches!(d, SpecDefect::EnumValueOutOfSet { value, .. } if value == "blowfish")
        ));
        assert!(defects
            .iter()
            .any(|d| matches!(d, SpecDefect::Duplicate { name, .. } if name == "aes")));
    }

    #[test]
    fn test_report_counts() {
        let spec = Spec::from_yaml(BROKEN).unwrap();
        let report = validate_command(&spec.command, &catalog(), &LicenseContext::new(), false);
        assert!(!report.is_valid);
        assert_eq!(report.error_count, report.defects().len());
        assert!(report.issues[0].code.starts_with("V0"));
    }

    #[test]
    fn test_gaps_are_warnings_unless_strict() {
        let yaml = r#"
command:
  name: ipsec ike log
  syntax:
    set: "ipsec ike log <gateway_id>"
  parameters:
    gateway_id:
      type: int
"#;
        let spec = Spec::from_yaml(yaml).unwrap();
        let lenient = validate_command(&spec.command, &Catalog::default(), &LicenseContext::new(), false);
        assert!(lenient.is_valid);
        assert_eq!(lenient.warning_count, 1);

        let strict = validate_command(&spec.command, &Catalog::default(), &LicenseContext::new(), true);
        assert!(!strict.is_valid);
        assert_eq!(strict.error_count, 1);
    }
}
