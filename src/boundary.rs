//! Boundary test expansion
//!
//! Combines declared boundary cases with canonical auto-derived ones:
//!
//! - integer ranges: `min-1` invalid, `min` valid, `max` valid, `max+1` invalid
//! - license tiers: `limit` valid, `limit+1` invalid, with the grant attached
//! - enums and switches: every offered value valid, excluded values invalid,
//!   one out-of-set token invalid
//!
//! Declared cases win over derived ones with the same value. Model-scoped
//! declarations are expanded to one case per model.

use crate::config::LicenseContext;
use crate::error::{CoverageGap, Error, GapKind, ResolveError, Result, SpecDefect};
use crate::resolve::{DomainKind, EffectiveDomain, LicenseGrant, Resolver};
use crate::spec::{BoundaryTest, Command, ParamType, ParamValue, Parameter};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where a boundary case came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CaseOrigin {
    Declared,
    Range,
    License,
    Enum,
    OutOfSet,
    Variant,
}

/// A boundary value with its expected validity on one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConcreteBoundaryCase {
    pub parameter: String,
    pub value: ParamValue,
    pub expected_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// License grant the expectation depends on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<LicenseGrant>,
    /// Effective domain on `model`; absent when unscoped or unsupported there
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<EffectiveDomain>,
    pub origin: CaseOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_contains: Option<String>,
}

/// Expanded cases and gaps for one parameter
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BoundaryExpansion {
    pub parameter: String,
    pub cases: Vec<ConcreteBoundaryCase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gaps: Vec<CoverageGap>,
}

/// Expands boundary cases over a command's models
pub struct BoundaryExpander<'r, 'c> {
    resolver: &'r Resolver<'c>,
    models: Vec<String>,
    out_of_set_token: String,
}

impl<'r, 'c> BoundaryExpander<'r, 'c> {
    pub fn new(resolver: &'r Resolver<'c>, models: &[String], out_of_set_token: &str) -> Self {
        Self {
            resolver,
            models: models.to_vec(),
            out_of_set_token: out_of_set_token.to_string(),
        }
    }

    /// Expander for a command's applicable models
    pub fn for_command(resolver: &'r Resolver<'c>, command: &Command, out_of_set_token: &str) -> Self {
        Self::new(resolver, &command.applicable_models, out_of_set_token)
    }

    /// Expand every parameter of `command`
    ///
    /// All defects across parameters are collected before failing.
    pub fn expand_command(
        &self,
        command: &Command,
        license: &LicenseContext,
    ) -> Result<Vec<BoundaryExpansion>> {
        let mut defects = Vec::new();
        for name in command.boundary_tests.keys() {
            if !command.parameters.contains_key(name) {
                defects.push(SpecDefect::UnknownParameter {
                    parameter: name.clone(),
                    context: "boundary_tests".into(),
                });
            }
        }

        let mut expansions = Vec::new();
        for (name, param) in &command.parameters {
            let declared = command
                .boundary_tests
                .get(name)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            match self.expand(name, param, declared, license) {
                Ok(expansion) => expansions.push(expansion),
                Err(Error::Defects(d)) => defects.extend(d),
                Err(e) => return Err(e),
            }
        }

        if defects.is_empty() {
            Ok(expansions)
        } else {
            Err(Error::Defects(defects))
        }
    }

    /// Expand one parameter's boundary cases
    pub fn expand(
        &self,
        name: &str,
        param: &Parameter,
        declared: &[BoundaryTest],
        license: &LicenseContext,
    ) -> Result<BoundaryExpansion> {
        let mut expansion = BoundaryExpansion {
            parameter: name.to_string(),
            ..Default::default()
        };
        let mut defects = Vec::new();

        let targets: Vec<Option<&str>> = if self.models.is_empty() {
            vec![None]
        } else {
            self.models.iter().map(|m| Some(m.as_str())).collect()
        };

        let mut domains: Vec<(Option<&str>, EffectiveDomain)> = Vec::new();
        for model in &targets {
            match self.resolver.resolve(name, param, *model, license) {
                Ok(domain) => domains.push((*model, domain)),
                Err(ResolveError::Unsupported { reason, .. }) => {
                    debug!(parameter = name, model = model.unwrap_or("*"), "skipped: {}", reason);
                }
                Err(ResolveError::Defect(d)) => defects.push(d),
            }
        }

        // Declared cases without model scope: emitted once, checked on every model
        for case in declared.iter().filter(|c| !c.is_model_scoped()) {
            if case.valid {
                for (model, domain) in &domains {
                    if let Err(e) = domain.check(&case.value) {
                        defects.push(contradiction(name, case, *model, e.reason));
                    }
                }
            }
            expansion.cases.push(declared_case(name, case, None, case.valid, None));
        }

        // Model-scoped declarations: one case per model
        let scoped_models: Vec<String> = if self.models.is_empty() {
            let mut named: Vec<String> = Vec::new();
            for case in declared.iter().filter(|c| c.is_model_scoped()) {
                for m in case.valid_for.iter().chain(&case.invalid_for) {
                    if !named.contains(m) {
                        named.push(m.clone());
                    }
                }
            }
            named
        } else {
            self.models.clone()
        };
        for case in declared.iter().filter(|c| c.is_model_scoped()) {
            for model in &scoped_models {
                let valid = scoped_validity(case, model);
                let domain = match domains.iter().find(|(m, _)| *m == Some(model.as_str())) {
                    Some((_, d)) => Some(d.clone()),
                    None => match self.resolver.resolve(name, param, Some(model.as_str()), license) {
                        Ok(d) => Some(d),
                        Err(ResolveError::Unsupported { .. }) => None,
                        Err(ResolveError::Defect(d)) => {
                            defects.push(d);
                            continue;
                        }
                    },
                };
                let domain = domain.as_ref();
                if valid {
                    let rejection = match domain {
                        Some(d) => d.check(&case.value).err().map(|e| e.reason),
                        None => Some("the parameter is unsupported there".to_string()),
                    };
                    if let Some(reason) = rejection {
                        defects.push(contradiction(name, case, Some(model.as_str()), reason));
                    }
                }
                expansion
                    .cases
                    .push(declared_case(name, case, Some(model), valid, domain));
            }
        }

        if param.derive_boundaries {
            for (model, domain) in &domains {
                let mut derived = Vec::new();
                self.derive(name, param, *model, domain, &mut derived, &mut expansion.gaps);
                for case in derived {
                    let shadowed = expansion.cases.iter().any(|c| {
                        c.value.same_as(&case.value)
                            && ((c.origin == CaseOrigin::Declared
                                && (c.model.is_none() || c.model == case.model))
                                || (c.model == case.model && c.license == case.license))
                    });
                    if !shadowed {
                        expansion.cases.push(case);
                    }
                }
            }
        }

        if defects.is_empty() {
            debug!(
                parameter = name,
                cases = expansion.cases.len(),
                gaps = expansion.gaps.len(),
                "expanded boundaries"
            );
            Ok(expansion)
        } else {
            Err(Error::Defects(defects))
        }
    }

    fn derive(
        &self,
        name: &str,
        param: &Parameter,
        model: Option<&str>,
        domain: &EffectiveDomain,
        cases: &mut Vec<ConcreteBoundaryCase>,
        gaps: &mut Vec<CoverageGap>,
    ) {
        let model_name = model.map(str::to_string);
        let scoped_domain = model.map(|_| domain.clone());
        let case = |value: ParamValue, valid: bool, origin: CaseOrigin, license: Option<LicenseGrant>| {
            ConcreteBoundaryCase {
                parameter: name.to_string(),
                value,
                expected_valid: valid,
                model: model_name.clone(),
                license,
                domain: scoped_domain.clone(),
                origin,
                description: None,
                error_contains: None,
            }
        };

        if let (Some(m), Some(cap)) = (model, domain.capacity.as_deref()) {
            let catalog = self.resolver.catalog();
            let inline = param
                .model_constraints
                .get(m)
                .is_some_and(|o| !o.license.is_empty());
            if !inline
                && catalog.base_limit(m, cap).is_none()
                && catalog.license_tables(m, cap).next().is_none()
            {
                gaps.push(gap(
                    GapKind::MissingLicenseTable,
                    name,
                    model,
                    format!("capacity '{}' has neither a base limit nor a license table", cap),
                ));
            }
        }

        match &domain.kind {
            DomainKind::Range { range: None } => gaps.push(gap(
                GapKind::MissingRange,
                name,
                model,
                "integer parameter has no range to derive boundaries from".into(),
            )),
            DomainKind::Range { range: Some(r) } => {
                let grant = domain.applied_license.clone();
                // A bound at the edge of i64 has no outside neighbour
                if let Some(below) = r.min.checked_sub(1) {
                    cases.push(case(ParamValue::Int(below), false, CaseOrigin::Range, None));
                }
                cases.push(case(ParamValue::Int(r.min), true, CaseOrigin::Range, None));
                cases.push(case(ParamValue::Int(r.max), true, CaseOrigin::Range, grant.clone()));
                if let Some(above) = r.max.checked_add(1) {
                    cases.push(case(ParamValue::Int(above), false, CaseOrigin::Range, grant));
                }

                for tier in &domain.license_tiers {
                    let grant = LicenseGrant {
                        sku: tier.sku.clone(),
                        quantity: tier.quantity,
                    };
                    if domain.applied_license.as_ref() == Some(&grant) {
                        continue;
                    }
                    if tier.limit >= r.min {
                        cases.push(case(
                            ParamValue::Int(tier.limit),
                            true,
                            CaseOrigin::License,
                            Some(grant.clone()),
                        ));
                    }
                    if let Some(above) = tier.limit.checked_add(1) {
                        cases.push(case(
                            ParamValue::Int(above),
                            false,
                            CaseOrigin::License,
                            Some(grant),
                        ));
                    }
                }
            }
            DomainKind::Enum { values, excluded } => {
                if values.is_empty() && excluded.is_empty() {
                    if param.typ == ParamType::Enum {
                        gaps.push(gap(
                            GapKind::MissingEnumValues,
                            name,
                            model,
                            "enum parameter declares no values".into(),
                        ));
                    }
                    return;
                }
                for v in values {
                    cases.push(case(v.as_str().into(), true, CaseOrigin::Enum, None));
                }
                for v in excluded {
                    cases.push(case(v.as_str().into(), false, CaseOrigin::Enum, None));
                }
                let token = self.unique_token(values.iter().chain(excluded));
                cases.push(case(token.into(), false, CaseOrigin::OutOfSet, None));
            }
            DomainKind::Switch { states, .. } => {
                let members: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
                for v in &members {
                    cases.push(case(v.as_str().into(), true, CaseOrigin::Enum, None));
                }
                let token = self.unique_token(members.iter());
                cases.push(case(token.into(), false, CaseOrigin::OutOfSet, None));
            }
            DomainKind::Variants { variants } => {
                for v in variants {
                    let prefix = v.keyword.as_ref().map(|k| format!("{} ", k)).unwrap_or_default();
                    let samples: Vec<String> = match (&v.value, v.range) {
                        (Some(fixed), _) => vec![fixed.clone()],
                        (None, Some(r)) => {
                            [r.min.checked_sub(1), Some(r.min), Some(r.max), r.max.checked_add(1)]
                                .into_iter()
                                .flatten()
                                .map(|n| format!("{}{}", prefix, n))
                                .collect()
                        }
                        (None, None) => Vec::new(),
                    };
                    for sample in samples {
                        let value = ParamValue::Text(sample);
                        let valid = domain.check(&value).is_ok();
                        cases.push(case(value, valid, CaseOrigin::Variant, None));
                    }
                }
            }
            DomainKind::Scalar { .. } => {}
        }
    }

    /// The configured out-of-set token, suffixed until it collides with nothing
    fn unique_token<'a>(&self, taken: impl Iterator<Item = &'a String>) -> String {
        let taken: Vec<&String> = taken.collect();
        let mut token = self.out_of_set_token.clone();
        let mut n = 1;
        while taken.iter().any(|t| **t == token) {
            n += 1;
            token = format!("{}-{}", self.out_of_set_token, n);
        }
        token
    }
}

fn scoped_validity(case: &BoundaryTest, model: &str) -> bool {
    if case.invalid_for.iter().any(|m| m == model) {
        false
    } else if !case.valid_for.is_empty() {
        case.valid_for.iter().any(|m| m == model)
    } else {
        case.valid
    }
}

fn declared_case(
    name: &str,
    case: &BoundaryTest,
    model: Option<&String>,
    valid: bool,
    domain: Option<&EffectiveDomain>,
) -> ConcreteBoundaryCase {
    ConcreteBoundaryCase {
        parameter: name.to_string(),
        value: case.value.clone(),
        expected_valid: valid,
        model: model.cloned(),
        license: domain.and_then(|d| d.applied_license.clone()),
        domain: domain.cloned(),
        origin: CaseOrigin::Declared,
        description: case.description.clone(),
        error_contains: case.error_contains.clone(),
    }
}

fn contradiction(name: &str, case: &BoundaryTest, model: Option<&str>, reason: String) -> SpecDefect {
    SpecDefect::BoundaryContradiction {
        parameter: name.to_string(),
        value: case.value.to_string(),
        model: model.map(str::to_string),
        reason,
    }
}

fn gap(kind: GapKind, name: &str, model: Option<&str>, message: String) -> CoverageGap {
    CoverageGap {
        kind,
        parameter: name.to_string(),
        model: model.map(str::to_string),
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Catalog;
    use crate::spec::Spec;

    const ENCRYPTION: &str = r#"
command:
  name: ipsec ike encryption
  syntax:
    set: "ipsec ike encryption <gateway_id> <algorithm>"
  parameters:
    gateway_id:
      type: int
      range: [1, 1000]
    algorithm:
      type: enum
      enum_values:
        - value: 3des-cbc
        - value: aes-cbc
    comment:
      type: int
  boundary_tests:
    gateway_id:
      - value: 1
        valid: true
        description: lowest tunnel
"#;

    fn values(expansion: &BoundaryExpansion) -> Vec<(String, bool)> {
        expansion
            .cases
            .iter()
            .map(|c| (c.value.to_string(), c.expected_valid))
            .collect()
    }

    #[test]
    fn test_range_cases_with_declared_override() {
        let spec = Spec::from_yaml(ENCRYPTION).unwrap();
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let expander = BoundaryExpander::for_command(&resolver, &spec.command, "invalid-value");
        let cmd = &spec.command;

        let exp = expander
            .expand(
                "gateway_id",
                &cmd.parameters["gateway_id"],
                &cmd.boundary_tests["gateway_id"],
                &LicenseContext::new(),
            )
            .unwrap();

        assert_eq!(
            values(&exp),
            vec![
                ("1".to_string(), true),
                ("0".to_string(), false),
                ("1000".to_string(), true),
                ("1001".to_string(), false),
            ]
        );
        assert_eq!(exp.cases[0].origin, CaseOrigin::Declared);
        assert_eq!(exp.cases[0].description.as_deref(), Some("lowest tunnel"));
    }

    #[test]
    fn test_enum_cases() {
        let spec = Spec::from_yaml(ENCRYPTION).unwrap();
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let expander = BoundaryExpander::new(&resolver, &[], "aes-cbc");

        let exp = expander
            .expand(
                "algorithm",
                &spec.command.parameters["algorithm"],
                &[],
                &LicenseContext::new(),
            )
            .unwrap();
        assert_eq!(
            values(&exp),
            vec![
                ("3des-cbc".to_string(), true),
                ("aes-cbc".to_string(), true),
                ("aes-cbc-2".to_string(), false),
            ]
        );
        assert_eq!(exp.cases[2].origin, CaseOrigin::OutOfSet);
    }

    #[test]
    fn test_missing_range_is_gap() {
        let spec = Spec::from_yaml(ENCRYPTION).unwrap();
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let expander = BoundaryExpander::for_command(&resolver, &spec.command, "invalid-value");

        let exp = expander
            .expand(
                "comment",
                &spec.command.parameters["comment"],
                &[],
                &LicenseContext::new(),
            )
            .unwrap();
        assert!(exp.cases.is_empty());
        assert_eq!(exp.gaps.len(), 1);
        assert_eq!(exp.gaps[0].kind, GapKind::MissingRange);
    }

    #[test]
    fn test_derivation_can_be_disabled() {
        let spec = Spec::from_yaml(ENCRYPTION).unwrap();
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let expander = BoundaryExpander::for_command(&resolver, &spec.command, "invalid-value");
        let mut param = spec.command.parameters["comment"].clone();
        param.derive_boundaries = false;

        let exp = expander
            .expand("comment", &param, &[], &LicenseContext::new())
            .unwrap();
        assert!(exp.cases.is_empty());
        assert!(exp.gaps.is_empty());
    }

    #[test]
    fn test_declared_valid_outside_domain_is_contradiction() {
        let spec = Spec::from_yaml(ENCRYPTION).unwrap();
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let expander = BoundaryExpander::for_command(&resolver, &spec.command, "invalid-value");
        let declared = vec![BoundaryTest {
            value: ParamValue::Int(5000),
            valid: true,
            description: None,
            error_contains: None,
            valid_for: vec![],
            invalid_for: vec![],
        }];

        let err = expander
            .expand(
                "gateway_id",
                &spec.command.parameters["gateway_id"],
                &declared,
                &LicenseContext::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err.defects(),
            [SpecDefect::BoundaryContradiction { .. }]
        ));
    }

    #[test]
    fn test_unknown_boundary_parameter_is_defect() {
        let mut spec = Spec::from_yaml(ENCRYPTION).unwrap();
        spec.command
            .boundary_tests
            .insert("nonexistent".into(), Vec::new());
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let expander = BoundaryExpander::for_command(&resolver, &spec.command, "invalid-value");

        let err = expander
            .expand_command(&spec.command, &LicenseContext::new())
            .unwrap_err();
        assert!(err
            .defects()
            .iter()
            .any(|d| matches!(d, SpecDefect::UnknownParameter { parameter, .. } if parameter == "nonexistent")));
    }

    #[test]
    fn test_range_at_integer_limits_skips_missing_neighbours() {
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let expander = BoundaryExpander::new(&resolver, &[], "invalid-value");
        let param = Parameter {
            typ: ParamType::Int,
            range: Some(crate::spec::Range::new(i64::MIN, i64::MAX)),
            ..Default::default()
        };

        let exp = expander
            .expand("counter", &param, &[], &LicenseContext::new())
            .unwrap();
        assert_eq!(
            values(&exp),
            vec![
                (i64::MIN.to_string(), true),
                (i64::MAX.to_string(), true),
            ]
        );
    }
}
