//! Pairwise matrix generation
//!
//! Builds a covering array in which every pair of values of two distinct
//! participating parameters appears in at least one combination, while no
//! combination violates a declared constraint.
//!
//! ## Algorithm
//!
//! Per model, greedily:
//! 1. Required pairs are all value pairs minus those a constraint forbids
//!    outright (a constraint reading only those two parameters).
//! 2. Seed each row with the uncovered pair that has the fewest compatible
//!    completions; a pair with no valid completion is a defect.
//! 3. Fill the remaining parameters most-constrained first, picking the
//!    value that covers the most uncovered pairs while a valid completion
//!    still exists.
//!
//! Declaration order breaks every tie, so output is deterministic. Rows
//! produced for several models are merged and carry their model set.

use crate::cel::CelCondition;
use crate::config::LicenseContext;
use crate::error::{Error, ResolveError, Result, SpecDefect};
use crate::resolve::{DomainKind, Resolver};
use crate::spec::{Command, ConstraintCondition, PairwiseSpec, ParamType, ParamValue, Requirement};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// One generated input combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Combination {
    pub values: IndexMap<String, ParamValue>,
    /// Models the combination applies to; empty when the command names none
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

enum Trigger {
    Match(Vec<(usize, ParamValue)>),
    Expr(CelCondition),
}

enum Need {
    OneOf(usize, Vec<ParamValue>),
    Expr(CelCondition),
}

struct Rule {
    label: String,
    priority: Option<i32>,
    when: Trigger,
    requires: Option<Need>,
    invalid_for: Vec<String>,
    /// Trigger parameters
    when_refs: Vec<usize>,
    /// Every parameter the rule reads
    refs: Vec<usize>,
}

impl Rule {
    fn is_requires(&self) -> bool {
        self.requires.is_some()
    }

    fn is_model_ban(&self) -> bool {
        !self.invalid_for.is_empty()
    }
}

/// Candidate values per participating parameter on one model
type Domains = Vec<Vec<ParamValue>>;

/// Partial row: value index per parameter
type Row = Vec<Option<usize>>;

/// Generates pairwise combinations for commands
pub struct PairwiseGenerator<'r, 'c> {
    resolver: &'r Resolver<'c>,
    license: LicenseContext,
}

impl<'r, 'c> PairwiseGenerator<'r, 'c> {
    pub fn new(resolver: &'r Resolver<'c>, license: &LicenseContext) -> Self {
        Self {
            resolver,
            license: license.clone(),
        }
    }

    /// Generate the covering array for `command`'s pairwise section
    ///
    /// Commands without an enabled pairwise section produce no combinations.
    pub fn generate(&self, command: &Command) -> Result<Vec<Combination>> {
        let Some(spec) = command.pairwise.as_ref().filter(|p| p.enabled) else {
            return Ok(Vec::new());
        };

        let names = &spec.parameters;
        if names.len() < 2 {
            return Err(SpecDefect::TooFewPairwiseParameters { found: names.len() }.into());
        }

        let mut defects = Vec::new();
        for name in names {
            if !command.parameters.contains_key(name) {
                defects.push(SpecDefect::UnknownParameter {
                    parameter: name.clone(),
                    context: "pairwise.parameters".into(),
                });
            }
        }
        if !defects.is_empty() {
            return Err(Error::Defects(defects));
        }

        let rules = compile_rules(command, spec)?;

        let models: Vec<Option<&str>> = if command.applicable_models.is_empty() {
            vec![None]
        } else {
            command
                .applicable_models
                .iter()
                .map(|m| Some(m.as_str()))
                .collect()
        };

        let mut merged: Vec<Combination> = Vec::new();
        for model in models {
            let domains = match self.domains(command, spec, model) {
                Ok(Some(d)) => d,
                Ok(None) => continue,
                Err(Error::Defects(d)) => {
                    defects.extend(d);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let covering = Covering {
                rules: &rules,
                domains: &domains,
                names,
                model,
            };

            for d in covering.precedence_conflicts() {
                if !defects.contains(&d) {
                    defects.push(d);
                }
            }

            let (rows, uncoverable) = match covering.build() {
                Ok(built) => built,
                Err(d) => {
                    defects.push(d);
                    continue;
                }
            };
            defects.extend(uncoverable);

            debug!(
                command = %command.name,
                model = model.unwrap_or("*"),
                rows = rows.len(),
                "built pairwise rows"
            );

            for row in rows {
                let values: IndexMap<String, ParamValue> = names
                    .iter()
                    .zip(&row)
                    .enumerate()
                    .map(|(p, (n, v))| (n.clone(), domains[p][*v].clone()))
                    .collect();
                match merged.iter_mut().find(|c| c.values == values) {
                    Some(existing) => {
                        if let Some(m) = model {
                            existing.models.push(m.to_string());
                        }
                    }
                    None => merged.push(Combination {
                        values,
                        models: model.map(|m| vec![m.to_string()]).unwrap_or_default(),
                    }),
                }
            }
        }

        if defects.is_empty() {
            Ok(merged)
        } else {
            Err(Error::Defects(defects))
        }
    }

    /// Candidate values per parameter; `None` when a parameter is not offered
    fn domains(
        &self,
        command: &Command,
        spec: &PairwiseSpec,
        model: Option<&str>,
    ) -> Result<Option<Domains>> {
        let mut domains = Vec::with_capacity(spec.parameters.len());
        let mut defects = Vec::new();

        for name in &spec.parameters {
            let Some(param) = command.parameters.get(name) else {
                continue;
            };
            let domain = match self.resolver.resolve(name, param, model, &self.license) {
                Ok(d) => d,
                Err(ResolveError::Unsupported { reason, .. }) => {
                    warn!(
                        parameter = %name,
                        model = model.unwrap_or("*"),
                        "no pairwise matrix for this model: {}",
                        reason
                    );
                    return Ok(None);
                }
                Err(ResolveError::Defect(d)) => {
                    defects.push(d);
                    continue;
                }
            };

            let values: Vec<ParamValue> = match spec.parameter_values.get(name) {
                Some(declared) => declared
                    .iter()
                    .filter(|v| match domain.check(v) {
                        Ok(()) => true,
                        Err(e) => {
                            debug!("dropping pairwise value: {}", e);
                            false
                        }
                    })
                    .cloned()
                    .collect(),
                None => match &domain.kind {
                    DomainKind::Enum { .. } | DomainKind::Switch { .. } => {
                        domain.members().into_iter().map(ParamValue::Text).collect()
                    }
                    DomainKind::Range { range: Some(r) } => {
                        let mut v = vec![ParamValue::Int(r.min)];
                        if r.max != r.min {
                            v.push(ParamValue::Int(r.max));
                        }
                        v
                    }
                    DomainKind::Scalar {
                        typ: ParamType::Bool,
                        ..
                    } => vec![ParamValue::Bool(true), ParamValue::Bool(false)],
                    _ => Vec::new(),
                },
            };

            if values.is_empty() {
                defects.push(SpecDefect::EmptyPairwiseDomain {
                    parameter: name.clone(),
                });
            }
            domains.push(values);
        }

        if defects.is_empty() {
            Ok(Some(domains))
        } else {
            Err(Error::Defects(defects))
        }
    }
}

fn compile_rules(command: &Command, spec: &PairwiseSpec) -> Result<Vec<Rule>> {
    let names = &spec.parameters;
    let known: Vec<&str> = command.parameters.keys().map(String::as_str).collect();
    let position = |n: &str| names.iter().position(|p| p == n);
    let mut defects = Vec::new();
    let mut rules = Vec::new();

    for (i, c) in spec.constraints.iter().enumerate() {
        let label = c.label(i);
        if c.requires.is_some() && !c.invalid_for.is_empty() {
            defects.push(SpecDefect::AmbiguousConstraint {
                constraint: label.clone(),
            });
            continue;
        }

        let mut outside = Vec::new();
        let mut when_refs = Vec::new();

        let when = match &c.when {
            ConstraintCondition::Match(map) => {
                let mut terms = Vec::new();
                for (name, value) in map {
                    match position(name) {
                        Some(p) => {
                            terms.push((p, value.clone()));
                            when_refs.push(p);
                        }
                        None => outside.push(name.clone()),
                    }
                }
                Trigger::Match(terms)
            }
            ConstraintCondition::Expr(expr) => match CelCondition::compile(expr, &known) {
                Ok(cond) => {
                    for v in cond.variables() {
                        match position(v) {
                            Some(p) => when_refs.push(p),
                            None => outside.push(v.clone()),
                        }
                    }
                    Trigger::Expr(cond)
                }
                Err(d) => {
                    defects.push(d);
                    continue;
                }
            },
        };

        let mut refs = when_refs.clone();
        let requires = match &c.requires {
            None => None,
            Some(Requirement::OneOf { param, one_of }) => match position(param) {
                Some(p) => {
                    refs.push(p);
                    Some(Need::OneOf(p, one_of.clone()))
                }
                None => {
                    outside.push(param.clone());
                    None
                }
            },
            Some(Requirement::Expr(expr)) => match CelCondition::compile(expr, &known) {
                Ok(cond) => {
                    for v in cond.variables() {
                        match position(v) {
                            Some(p) => refs.push(p),
                            None => outside.push(v.clone()),
                        }
                    }
                    Some(Need::Expr(cond))
                }
                Err(d) => {
                    defects.push(d);
                    continue;
                }
            },
        };

        if !outside.is_empty() {
            for parameter in outside {
                defects.push(SpecDefect::UnknownParameter {
                    parameter,
                    context: format!("constraint '{}' (not a pairwise parameter)", label),
                });
            }
            continue;
        }

        when_refs.sort_unstable();
        when_refs.dedup();
        refs.sort_unstable();
        refs.dedup();

        rules.push(Rule {
            label,
            priority: c.priority,
            when,
            requires,
            invalid_for: c.invalid_for.clone(),
            when_refs,
            refs,
        });
    }

    if defects.is_empty() {
        Ok(rules)
    } else {
        Err(Error::Defects(defects))
    }
}

struct Covering<'a> {
    rules: &'a [Rule],
    domains: &'a Domains,
    names: &'a [String],
    model: Option<&'a str>,
}

type Pair = (usize, usize, usize, usize);

impl Covering<'_> {
    fn bindings(&self, row: &Row) -> IndexMap<String, ParamValue> {
        row.iter()
            .enumerate()
            .filter_map(|(p, v)| v.map(|v| (self.names[p].clone(), self.domains[p][v].clone())))
            .collect()
    }

    fn trigger_holds(
        &self,
        rule: &Rule,
        row: &Row,
        bound: &IndexMap<String, ParamValue>,
    ) -> std::result::Result<bool, SpecDefect> {
        match &rule.when {
            Trigger::Match(terms) => Ok(terms.iter().all(|(p, expected)| {
                row[*p].is_some_and(|v| self.domains[*p][v].same_as(expected))
            })),
            Trigger::Expr(cond) => cond.eval_bool(bound),
        }
    }

    fn need_holds(
        &self,
        need: &Need,
        row: &Row,
        bound: &IndexMap<String, ParamValue>,
    ) -> std::result::Result<bool, SpecDefect> {
        match need {
            Need::OneOf(p, allowed) => Ok(row[*p]
                .is_some_and(|v| allowed.iter().any(|a| self.domains[*p][v].same_as(a)))),
            Need::Expr(cond) => cond.eval_bool(bound),
        }
    }

    fn bans_here(&self, rule: &Rule) -> bool {
        match self.model {
            Some(m) => rule.invalid_for.iter().any(|x| x == m),
            None => false,
        }
    }

    /// Whether the assigned part of `row` breaks a constraint whose
    /// parameters are all assigned
    fn violates(&self, row: &Row) -> std::result::Result<bool, SpecDefect> {
        let bound = self.bindings(row);

        for rule in self.rules {
            if !rule.refs.iter().all(|p| row[*p].is_some()) {
                continue;
            }
            if rule.is_model_ban() && !self.bans_here(rule) {
                continue;
            }
            if !self.trigger_holds(rule, row, &bound)? {
                continue;
            }

            let broken = match &rule.requires {
                Some(need) => !self.need_holds(need, row, &bound)?,
                None if rule.is_model_ban() => !self.overridden(rule, row, &bound)?,
                None => true,
            };
            if broken {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// A satisfied requires-rule of higher priority lifts a model ban
    fn overridden(
        &self,
        ban: &Rule,
        row: &Row,
        bound: &IndexMap<String, ParamValue>,
    ) -> std::result::Result<bool, SpecDefect> {
        let Some(ban_priority) = ban.priority else {
            return Ok(false);
        };
        for rule in self.rules {
            let Some(need) = &rule.requires else {
                continue;
            };
            let outranks = rule.priority.is_some_and(|p| p < ban_priority);
            if !outranks || !rule.refs.iter().all(|p| row[*p].is_some()) {
                continue;
            }
            if self.trigger_holds(rule, row, bound)? && self.need_holds(need, row, bound)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether the free parameters of `row` can be filled without violation
    fn completable(&self, row: &mut Row) -> std::result::Result<bool, SpecDefect> {
        if self.violates(row)? {
            return Ok(false);
        }
        let Some(free) = row.iter().position(Option::is_none) else {
            return Ok(true);
        };
        for v in 0..self.domains[free].len() {
            row[free] = Some(v);
            let ok = self.completable(row)?;
            row[free] = None;
            if ok {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn pair_row(&self, (i, a, j, b): Pair) -> Row {
        let mut row: Row = vec![None; self.names.len()];
        row[i] = Some(a);
        row[j] = Some(b);
        row
    }

    /// Build rows; also returns the pairs that could not be covered
    fn build(&self) -> std::result::Result<(Vec<Vec<usize>>, Vec<SpecDefect>), SpecDefect> {
        let n = self.names.len();

        let mut required: Vec<Pair> = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                for a in 0..self.domains[i].len() {
                    for b in 0..self.domains[j].len() {
                        if !self.violates(&self.pair_row((i, a, j, b)))? {
                            required.push((i, a, j, b));
                        }
                    }
                }
            }
        }
        let index: HashMap<Pair, usize> = required
            .iter()
            .enumerate()
            .map(|(idx, pair)| (*pair, idx))
            .collect();
        let pair_index = |p: usize, v: usize, q: usize, w: usize| {
            let key = if p < q { (p, v, q, w) } else { (q, w, p, v) };
            index.get(&key).copied()
        };

        // Static freedom: compatible single-parameter extensions of each pair
        let mut freedom = Vec::with_capacity(required.len());
        for &pair in &required {
            let (i, _, j, _) = pair;
            let mut row = self.pair_row(pair);
            let mut count = 0usize;
            for k in (0..n).filter(|k| *k != i && *k != j) {
                for v in 0..self.domains[k].len() {
                    row[k] = Some(v);
                    if !self.violates(&row)? {
                        count += 1;
                    }
                }
                row[k] = None;
            }
            freedom.push(count);
        }

        let mut order: Vec<usize> = (0..required.len()).collect();
        order.sort_by_key(|&p| (freedom[p], p));
        let mut uncovered: BTreeSet<(usize, usize)> =
            order.iter().enumerate().map(|(rank, p)| (rank, *p)).collect();
        let mut rank_of = vec![0usize; required.len()];
        for (rank, p) in order.iter().enumerate() {
            rank_of[*p] = rank;
        }
        let is_uncovered =
            |set: &BTreeSet<(usize, usize)>, p: usize| set.contains(&(rank_of[p], p));

        let mut rows = Vec::new();
        let mut uncoverable = Vec::new();

        while let Some((rank, seed)) = uncovered.first().copied() {
            let (i, a, j, b) = required[seed];
            let mut row = self.pair_row(required[seed]);

            if !self.completable(&mut row)? {
                uncoverable.push(SpecDefect::UncoverablePair {
                    left: format!("{}={}", self.names[i], self.domains[i][a]),
                    right: format!("{}={}", self.names[j], self.domains[j][b]),
                    model: self.model.map(str::to_string),
                });
                uncovered.remove(&(rank, seed));
                continue;
            }

            while let Some(k) = self.most_constrained(&mut row)? {
                let mut best: Option<(usize, usize)> = None;
                for v in 0..self.domains[k].len() {
                    row[k] = Some(v);
                    if self.completable(&mut row)? {
                        let gain = row
                            .iter()
                            .enumerate()
                            .filter(|(q, _)| *q != k)
                            .filter_map(|(q, w)| w.and_then(|w| pair_index(k, v, q, w)))
                            .filter(|p| is_uncovered(&uncovered, *p))
                            .count();
                        if best.is_none_or(|(_, g)| gain > g) {
                            best = Some((v, gain));
                        }
                    }
                    row[k] = None;
                }
                match best {
                    Some((v, _)) => row[k] = Some(v),
                    None => break,
                }
            }

            let Some(full) = row.iter().copied().collect::<Option<Vec<usize>>>() else {
                break;
            };
            for p in 0..n {
                for q in (p + 1)..n {
                    if let Some(idx) = pair_index(p, full[p], q, full[q]) {
                        uncovered.remove(&(rank_of[idx], idx));
                    }
                }
            }
            rows.push(full);
        }

        Ok((rows, uncoverable))
    }

    /// Unassigned parameter with the fewest locally compatible values
    fn most_constrained(&self, row: &mut Row) -> std::result::Result<Option<usize>, SpecDefect> {
        let mut best: Option<(usize, usize)> = None;
        for k in 0..row.len() {
            if row[k].is_some() {
                continue;
            }
            let mut count = 0usize;
            for v in 0..self.domains[k].len() {
                row[k] = Some(v);
                if !self.violates(row)? {
                    count += 1;
                }
            }
            row[k] = None;
            if best.is_none_or(|(_, c)| count < c) {
                best = Some((k, count));
            }
        }
        Ok(best.map(|(k, _)| k))
    }

    /// Requires-rules and model bans that can trigger on the same
    /// combination without distinct priorities
    fn precedence_conflicts(&self) -> Vec<SpecDefect> {
        let mut conflicts = Vec::new();
        for req in self.rules.iter().filter(|r| r.is_requires()) {
            for ban in self.rules.iter().filter(|r| r.is_model_ban()) {
                if self.model.is_some() && !self.bans_here(ban) {
                    continue;
                }
                if matches!((req.priority, ban.priority), (Some(a), Some(b)) if a != b) {
                    continue;
                }
                let mut vars: Vec<usize> =
                    req.when_refs.iter().chain(&ban.when_refs).copied().collect();
                vars.sort_unstable();
                vars.dedup();
                let mut row: Row = vec![None; self.names.len()];
                if self.triggers_overlap(req, ban, &vars, &mut row) {
                    conflicts.push(SpecDefect::ConstraintPrecedence {
                        first: req.label.clone(),
                        second: ban.label.clone(),
                    });
                }
            }
        }
        conflicts
    }

    fn triggers_overlap(&self, a: &Rule, b: &Rule, vars: &[usize], row: &mut Row) -> bool {
        let Some((&p, rest)) = vars.split_first() else {
            let row: &Row = row;
            let bound = self.bindings(row);
            let holds = |rule: &Rule| self.trigger_holds(rule, row, &bound).unwrap_or(false);
            return holds(a) && holds(b);
        };
        for v in 0..self.domains[p].len() {
            row[p] = Some(v);
            let hit = self.triggers_overlap(a, b, rest, row);
            row[p] = None;
            if hit {
                return true;
            }
        }
        false
    }
}
