//! Syntax round-trip validation
//!
//! Checks every declared syntax test against the command's templates:
//! text parses to the declared fields, the fields serialize back to the
//! text, and (for bidirectional tests) the serialized text parses again to
//! the same fields. Failures are per-test outcomes, never errors.

use crate::config::LicenseContext;
use crate::error::{Error, ResolveError, Result};
use crate::resolve::{check_availability, EffectiveDomain, Resolver};
use crate::spec::{Command, ParamValue, SyntaxForm, SyntaxMode, SyntaxTest};
use crate::syntax::{compile_templates, Fields, SyntaxCodec, Template};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which conversion failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// text -> structured
    Parse,
    /// structured -> text
    Serialize,
    /// text -> structured -> text -> structured
    Reparse,
}

/// One failed direction with expected and actual renderings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DirectionFailure {
    pub direction: Direction,
    /// 1-based line of a multi-line test
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub expected: String,
    pub actual: String,
}

/// Result status of one syntax test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoundTripStatus {
    Passed,
    Failed { failures: Vec<DirectionFailure> },
    Skipped { reason: String },
}

/// Outcome of one syntax test on one model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RoundTripOutcome {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub status: RoundTripStatus,
}

impl RoundTripOutcome {
    pub fn passed(&self) -> bool {
        matches!(self.status, RoundTripStatus::Passed)
    }

    pub fn failed(&self) -> bool {
        matches!(self.status, RoundTripStatus::Failed { .. })
    }
}

/// Validates a command's syntax tests
pub struct RoundTripValidator<'r, 'c> {
    command: &'r Command,
    templates: Vec<(SyntaxForm, Template)>,
    resolver: &'r Resolver<'c>,
    license: LicenseContext,
}

impl<'r, 'c> RoundTripValidator<'r, 'c> {
    /// Compile the command's templates; malformed ones are defects
    pub fn new(command: &'r Command, resolver: &'r Resolver<'c>, license: &LicenseContext) -> Result<Self> {
        let templates = compile_templates(command).map_err(Error::Defects)?;
        Ok(Self {
            command,
            templates,
            resolver,
            license: license.clone(),
        })
    }

    /// Every syntax and multiline test on every applicable model
    pub fn verify_all(&self) -> Result<Vec<RoundTripOutcome>> {
        let models: Vec<Option<&str>> = if self.command.applicable_models.is_empty() {
            vec![None]
        } else {
            self.command
                .applicable_models
                .iter()
                .map(|m| Some(m.as_str()))
                .collect()
        };

        let mut outcomes = Vec::new();
        for model in models {
            let domains = self.domains(model)?;
            for test in self.command.all_syntax_tests() {
                outcomes.push(self.verify_with(test, model, &domains));
            }
        }
        Ok(outcomes)
    }

    /// Verify a single test on `model`
    pub fn verify(&self, test: &SyntaxTest, model: Option<&str>) -> Result<RoundTripOutcome> {
        let domains = self.domains(model)?;
        Ok(self.verify_with(test, model, &domains))
    }

    /// Resolved domains of every parameter offered on `model`
    fn domains(&self, model: Option<&str>) -> Result<IndexMap<String, EffectiveDomain>> {
        let mut domains = IndexMap::new();
        for (name, param) in &self.command.parameters {
            match self.resolver.resolve(name, param, model, &self.license) {
                Ok(d) => {
                    domains.insert(name.clone(), d);
                }
                Err(ResolveError::Unsupported { .. }) => {}
                Err(ResolveError::Defect(d)) => return Err(d.into()),
            }
        }
        Ok(domains)
    }

    fn verify_with(
        &self,
        test: &SyntaxTest,
        model: Option<&str>,
        domains: &IndexMap<String, EffectiveDomain>,
    ) -> RoundTripOutcome {
        let outcome = |status| RoundTripOutcome {
            name: test.name.clone(),
            model: model.map(str::to_string),
            status,
        };

        if let (Some(m), Some(constraints)) = (model, &test.model_constraints) {
            if let Err(reason) =
                check_availability(constraints, m, &self.license, self.resolver.catalog())
            {
                return outcome(RoundTripStatus::Skipped { reason });
            }
        }

        let codec = SyntaxCodec::new(self.command, &self.templates, domains);
        let lines: Vec<&str> = test
            .rtx
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let mappings = test.terraform.mappings();
        let mode = test.mode();
        let mut failures = Vec::new();

        if mappings.len() > 1 {
            if mappings.len() != lines.len() {
                failures.push(DirectionFailure {
                    direction: Direction::Parse,
                    line: None,
                    expected: format!("{} line(s)", mappings.len()),
                    actual: format!("{} line(s)", lines.len()),
                });
            } else {
                let multi = lines.len() > 1;
                for (i, (line, mapping)) in lines.iter().zip(&mappings).enumerate() {
                    let n = multi.then_some(i + 1);
                    self.check_line(&codec, test.form, mode, line, mapping, n, &mut failures);
                }
            }
        } else {
            let expected = mappings.first().copied().cloned().unwrap_or_default();
            if lines.len() <= 1 {
                let line = lines.first().copied().unwrap_or("");
                self.check_line(&codec, test.form, mode, line, &expected, None, &mut failures);
            } else {
                self.check_merged(&codec, test.form, mode, &lines, &expected, &mut failures);
            }
        }

        debug!(
            test = %test.name,
            model = model.unwrap_or("*"),
            failures = failures.len(),
            "round trip checked"
        );

        if failures.is_empty() {
            outcome(RoundTripStatus::Passed)
        } else {
            outcome(RoundTripStatus::Failed { failures })
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn check_line(
        &self,
        codec: &SyntaxCodec<'_>,
        form: SyntaxForm,
        mode: SyntaxMode,
        line: &str,
        expected: &Fields,
        n: Option<usize>,
        failures: &mut Vec<DirectionFailure>,
    ) {
        let fail = |direction, expected: String, actual: String| DirectionFailure {
            direction,
            line: n,
            expected,
            actual,
        };

        if mode != SyntaxMode::BuildOnly {
            match codec.parse(form, line) {
                Ok(actual) => {
                    if !declared_match(expected, &actual) {
                        failures.push(fail(Direction::Parse, render(expected), render(&actual)));
                    }
                }
                Err(e) => failures.push(fail(Direction::Parse, render(expected), e)),
            }
        }

        if mode != SyntaxMode::ParseOnly {
            match codec.serialize(form, expected) {
                Ok(text) => {
                    if self.canonical(&text) != self.canonical(line) {
                        failures.push(fail(Direction::Serialize, line.to_string(), text.clone()));
                    }
                    if mode == SyntaxMode::Bidirectional {
                        match codec.parse(form, &text) {
                            Ok(again) if declared_match(expected, &again) => {}
                            Ok(again) => failures.push(fail(
                                Direction::Reparse,
                                render(expected),
                                render(&again),
                            )),
                            Err(e) => failures.push(fail(Direction::Reparse, render(expected), e)),
                        }
                    }
                }
                Err(e) => failures.push(fail(Direction::Serialize, line.to_string(), e)),
            }
        }
    }

    /// Several lines describing one mapping: parse and merge, and render
    /// each line from the fields it binds
    fn check_merged(
        &self,
        codec: &SyntaxCodec<'_>,
        form: SyntaxForm,
        mode: SyntaxMode,
        lines: &[&str],
        expected: &Fields,
        failures: &mut Vec<DirectionFailure>,
    ) {
        let mut merged = Fields::new();
        let mut per_line = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            match codec.parse(form, line) {
                Ok(fields) => {
                    merged.extend(fields.iter().map(|(k, v)| (k.clone(), v.clone())));
                    per_line.push(Some(fields));
                }
                Err(e) => {
                    if mode != SyntaxMode::BuildOnly {
                        failures.push(DirectionFailure {
                            direction: Direction::Parse,
                            line: Some(i + 1),
                            expected: render(expected),
                            actual: e,
                        });
                    }
                    per_line.push(None);
                }
            }
        }

        if mode != SyntaxMode::BuildOnly && failures.is_empty() && !declared_match(expected, &merged) {
            failures.push(DirectionFailure {
                direction: Direction::Parse,
                line: None,
                expected: render(expected),
                actual: render(&merged),
            });
        }

        if mode == SyntaxMode::ParseOnly {
            return;
        }
        for (i, (line, parsed)) in lines.iter().zip(per_line).enumerate() {
            let Some(parsed) = parsed else { continue };
            let subset: Fields = parsed
                .keys()
                .filter_map(|k| expected.get(k).map(|v| (k.clone(), v.clone())))
                .collect();
            match codec.serialize(form, &subset) {
                Ok(text) if self.canonical(&text) == self.canonical(line) => {}
                Ok(text) => failures.push(DirectionFailure {
                    direction: Direction::Serialize,
                    line: Some(i + 1),
                    expected: line.to_string(),
                    actual: text,
                }),
                Err(e) => failures.push(DirectionFailure {
                    direction: Direction::Serialize,
                    line: Some(i + 1),
                    expected: line.to_string(),
                    actual: e,
                }),
            }
        }
    }

    /// Whitespace-normalised text with keyword synonyms canonicalised
    fn canonical(&self, text: &str) -> String {
        text.split_whitespace()
            .map(|w| self.command.canonical_keyword(w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Every declared field is present with an equal value
fn declared_match(expected: &Fields, actual: &Fields) -> bool {
    expected
        .iter()
        .all(|(k, v)| actual.get(k).is_some_and(|a| a.same_as(v)))
}

fn render(fields: &IndexMap<String, ParamValue>) -> String {
    let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{{{}}}", parts.join(", "))
}
