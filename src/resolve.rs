//! Parameter resolution: effective domains per model and license
//!
//! A [`Resolver`] turns a [`Parameter`] plus a target model and license
//! context into an [`EffectiveDomain`]: the concrete range, enum set or
//! variant set that applies there. The domain doubles as the parameter
//! validator through [`EffectiveDomain::check`].
//!
//! Results are pure functions of immutable inputs, so they are memoized in
//! a read-mostly table shared by every caller of the same resolver. The
//! memo is keyed by the parameter declaration itself, so one resolver can
//! serve every command of a batch.

use crate::config::{Catalog, LicenseContext};
use crate::error::{Error, ResolveError, Result, SpecDefect};
use crate::spec::{Command, ModelConstraints, ParamType, ParamValue, Parameter, Range, SwitchState};
use crate::syntax::variant_token;
use crate::util::compare_firmware;
use indexmap::IndexMap;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::RwLock;
use thiserror::Error;
use tracing::debug;

/// A license held in some quantity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct LicenseGrant {
    pub sku: String,
    pub quantity: u32,
}

/// One row of a license-extension table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct LicenseTier {
    pub sku: String,
    pub quantity: u32,
    pub limit: i64,
}

/// Concrete shape of a resolved domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DomainKind {
    Range {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        range: Option<Range>,
    },
    Enum {
        values: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        excluded: Vec<String>,
    },
    Switch {
        states: Vec<SwitchState>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        auto_resolves_to: Option<SwitchState>,
    },
    Variants {
        variants: Vec<VariantDomain>,
    },
    Scalar {
        #[serde(rename = "type")]
        typ: ParamType,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
}

/// Resolved shape of one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VariantDomain {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: ParamType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

/// Allowed values of one parameter on one model under one license context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EffectiveDomain {
    pub parameter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(flatten)]
    pub kind: DomainKind,
    /// Every license tier that can extend the upper bound
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub license_tiers: Vec<LicenseTier>,
    /// The grant that set the upper bound, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied_license: Option<LicenseGrant>,
    /// Capability key whose catalog data was consulted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,
}

/// A value rejected by a domain
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[error("{parameter}: '{value}' {reason}")]
pub struct ValueError {
    pub parameter: String,
    pub value: String,
    pub reason: String,
}

/// Parameter name, declaration fingerprint, model, normalized license
type MemoKey = (String, String, Option<String>, Vec<(String, u32)>);

/// Resolves parameters against the static catalog
pub struct Resolver<'a> {
    catalog: &'a Catalog,
    memo: RwLock<HashMap<MemoKey, std::result::Result<EffectiveDomain, ResolveError>>>,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a Catalog) -> Self {
        Self {
            catalog,
            memo: RwLock::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// Resolve the effective domain of `param` (named `name`)
    pub fn resolve(
        &self,
        name: &str,
        param: &Parameter,
        model: Option<&str>,
        license: &LicenseContext,
    ) -> std::result::Result<EffectiveDomain, ResolveError> {
        let key: MemoKey = (
            name.to_string(),
            param.fingerprint(),
            model.map(str::to_string),
            license.normalized(),
        );

        if let Ok(memo) = self.memo.read() {
            if let Some(hit) = memo.get(&key) {
                return hit.clone();
            }
        }

        let result = self.compute(name, param, model, license);
        if let Ok(mut memo) = self.memo.write() {
            memo.entry(key).or_insert_with(|| result.clone());
        }
        result
    }

    fn compute(
        &self,
        name: &str,
        param: &Parameter,
        model: Option<&str>,
        license: &LicenseContext,
    ) -> std::result::Result<EffectiveDomain, ResolveError> {
        let over = model.and_then(|m| param.model_constraints.get(m));

        if let Some(m) = model {
            if !self.catalog.knows_model(m) {
                return Err(SpecDefect::UnknownModel {
                    model: m.to_string(),
                    context: format!("resolution of parameter '{}'", name),
                }
                .into());
            }
            if let Some(availability) = &param.availability {
                check_availability(availability, m, license, self.catalog).map_err(|reason| {
                    ResolveError::Unsupported {
                        parameter: name.to_string(),
                        model: m.to_string(),
                        reason,
                    }
                })?;
            }
            if over.is_some_and(|o| o.unavailable) {
                return Err(ResolveError::Unsupported {
                    parameter: name.to_string(),
                    model: m.to_string(),
                    reason: "marked unavailable".into(),
                });
            }
        }

        if let Some(pattern) = &param.pattern {
            compile_pattern(pattern).map_err(|reason| SpecDefect::InvalidPattern {
                pattern: pattern.clone(),
                context: format!("parameter '{}'", name),
                reason,
            })?;
        }

        let capacity = over.and_then(|o| o.capacity.clone());
        let mut range = over.and_then(|o| o.range).or(param.range);
        if let (Some(m), Some(cap), Some(r)) = (model, capacity.as_deref(), range.as_mut()) {
            if let Some(limit) = self.catalog.base_limit(m, cap) {
                r.max = limit;
            }
        }

        let mut tiers = Vec::new();
        if let Some(o) = over {
            for (sku, limits) in &o.license {
                tiers.extend(limits.iter().enumerate().map(|(i, limit)| LicenseTier {
                    sku: sku.clone(),
                    quantity: i as u32 + 1,
                    limit: *limit,
                }));
            }
        }
        if let (Some(m), Some(cap)) = (model, capacity.as_deref()) {
            for table in self.catalog.license_tables(m, cap) {
                tiers.extend(table.limits.iter().enumerate().map(|(i, limit)| LicenseTier {
                    sku: table.sku.clone(),
                    quantity: i as u32 + 1,
                    limit: *limit,
                }));
            }
        }

        let applied = applicable_tier(&tiers, license);
        if let (Some((_, limit)), Some(r)) = (&applied, range.as_mut()) {
            r.max = *limit;
        }

        if let Some(r) = range {
            if !r.is_ordered() {
                return Err(SpecDefect::MalformedRange {
                    parameter: name.to_string(),
                    model: model.map(str::to_string),
                    min: r.min,
                    max: r.max,
                }
                .into());
            }
        }

        let kind = self.domain_kind(name, param, over, range)?;

        debug!(
            parameter = name,
            model = model.unwrap_or("*"),
            "resolved domain {:?}",
            kind
        );

        Ok(EffectiveDomain {
            parameter: name.to_string(),
            model: model.map(str::to_string),
            kind,
            license_tiers: tiers,
            applied_license: applied.map(|(grant, _)| grant),
            capacity,
        })
    }

    fn domain_kind(
        &self,
        name: &str,
        param: &Parameter,
        over: Option<&crate::spec::ModelOverride>,
        range: Option<Range>,
    ) -> std::result::Result<DomainKind, ResolveError> {
        let excluded: Vec<String> = over.map(|o| o.exclude_values.clone()).unwrap_or_default();

        if param.has_variants() {
            let mut variants = Vec::with_capacity(param.variants.len());
            for v in &param.variants {
                if let Some(pattern) = &v.pattern {
                    compile_pattern(pattern).map_err(|reason| SpecDefect::InvalidPattern {
                        pattern: pattern.clone(),
                        context: format!("variant '{}' of parameter '{}'", v.name, name),
                        reason,
                    })?;
                }
                if let Some(r) = v.range {
                    if !r.is_ordered() {
                        return Err(SpecDefect::MalformedRange {
                            parameter: format!("{}.{}", name, v.name),
                            model: None,
                            min: r.min,
                            max: r.max,
                        }
                        .into());
                    }
                }
                variants.push(VariantDomain {
                    name: v.name.clone(),
                    typ: v.typ,
                    value: v.value.clone(),
                    keyword: v.keyword.clone(),
                    pattern: v.pattern.clone(),
                    range: v.range,
                });
            }
            return Ok(DomainKind::Variants { variants });
        }

        let kind = match param.typ {
            ParamType::Int => DomainKind::Range { range },
            ParamType::Enum => {
                let values = param
                    .enum_values
                    .iter()
                    .map(|e| e.value.clone())
                    .filter(|v| !excluded.contains(v))
                    .collect();
                DomainKind::Enum { values, excluded }
            }
            ParamType::Switch => {
                let mut states: Vec<SwitchState> = if param.enum_values.is_empty() {
                    vec![SwitchState::On, SwitchState::Off]
                } else {
                    param
                        .enum_values
                        .iter()
                        .filter_map(|e| SwitchState::parse(&e.value))
                        .collect()
                };
                states.retain(|s| !excluded.iter().any(|x| x == s.as_str()));
                let auto_resolves_to = over
                    .and_then(|o| o.auto_resolves_to)
                    .or_else(|| {
                        param
                            .default
                            .as_ref()
                            .and_then(|d| SwitchState::parse(&d.to_string()))
                    })
                    .filter(|s| *s != SwitchState::Auto);
                DomainKind::Switch {
                    states,
                    auto_resolves_to,
                }
            }
            typ => DomainKind::Scalar {
                typ,
                pattern: param.pattern.clone(),
            },
        };
        Ok(kind)
    }
}

/// Row reached by each held SKU (quantity capped at the table length);
/// the largest limit among them wins
fn applicable_tier(tiers: &[LicenseTier], license: &LicenseContext) -> Option<(LicenseGrant, i64)> {
    let mut best: Option<(LicenseGrant, i64)> = None;
    for (sku, held) in license.normalized() {
        let rows: Vec<&LicenseTier> = tiers.iter().filter(|t| t.sku == sku).collect();
        let Some(deepest) = rows.iter().map(|t| t.quantity).max() else {
            continue;
        };
        let reach = held.min(deepest);
        let limit = rows
            .iter()
            .filter(|t| t.quantity == reach)
            .map(|t| t.limit)
            .max();
        if let Some(limit) = limit {
            if best.as_ref().is_none_or(|(_, l)| limit > *l) {
                best = Some((LicenseGrant { sku, quantity: held }, limit));
            }
        }
    }
    best
}

/// Whether a model offers something under the given availability rules
pub fn check_availability(
    constraints: &ModelConstraints,
    model: &str,
    license: &LicenseContext,
    catalog: &Catalog,
) -> std::result::Result<(), String> {
    if !constraints.valid_for.is_empty() && !constraints.valid_for.iter().any(|m| m == model) {
        return Err(format!("{} is not listed in valid_for", model));
    }
    if constraints.invalid_for.iter().any(|m| m == model) {
        return Err(format!("{} is listed in invalid_for", model));
    }
    if constraints.unavailable.iter().any(|m| m == model) {
        return Err(format!("unavailable on {}", model));
    }
    if let Some(sku) = &constraints.requires_license {
        if !license.holds(sku) {
            return Err(format!("requires license {}", sku));
        }
    }
    if let (Some(min), Some(fw)) = (&constraints.min_firmware, catalog.firmware(model)) {
        if compare_firmware(fw, min) == Ordering::Less {
            return Err(format!("requires firmware {} (catalog has {})", min, fw));
        }
    }
    Ok(())
}

fn compile_pattern(pattern: &str) -> std::result::Result<Regex, String> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| e.to_string())
}

impl EffectiveDomain {
    /// Effective numeric range, for range-shaped domains
    pub fn range(&self) -> Option<Range> {
        match &self.kind {
            DomainKind::Range { range } => *range,
            _ => None,
        }
    }

    /// Offered members of an enum or switch domain
    pub fn members(&self) -> Vec<String> {
        match &self.kind {
            DomainKind::Enum { values, .. } => values.clone(),
            DomainKind::Switch { states, .. } => {
                states.iter().map(|s| s.as_str().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Members excluded on this model
    pub fn excluded(&self) -> &[String] {
        match &self.kind {
            DomainKind::Enum { excluded, .. } => excluded,
            _ => &[],
        }
    }

    /// Concrete on/off meaning of a switch state; `None` when `auto` is
    /// left to the device
    pub fn resolve_switch(&self, state: SwitchState) -> Option<bool> {
        let auto = match &self.kind {
            DomainKind::Switch {
                auto_resolves_to, ..
            } => *auto_resolves_to,
            _ => None,
        };
        match state {
            SwitchState::On => Some(true),
            SwitchState::Off => Some(false),
            SwitchState::Auto => match auto {
                Some(SwitchState::On) => Some(true),
                Some(SwitchState::Off) => Some(false),
                _ => None,
            },
        }
    }

    /// Validate one value against the domain
    pub fn check(&self, value: &ParamValue) -> std::result::Result<(), ValueError> {
        let text = value.to_string();
        let reject = |reason: String| ValueError {
            parameter: self.parameter.clone(),
            value: text.clone(),
            reason,
        };

        match &self.kind {
            DomainKind::Range { range } => {
                let n = value
                    .as_int()
                    .ok_or_else(|| reject("is not an integer".into()))?;
                match range {
                    Some(r) if !r.contains(n) => Err(reject(format!("is outside {}", r))),
                    _ => Ok(()),
                }
            }
            DomainKind::Enum { values, excluded } => {
                if values.contains(&text) {
                    Ok(())
                } else if excluded.contains(&text) {
                    Err(reject(format!("is not offered{}", self.on_model())))
                } else {
                    Err(reject(format!("is not one of [{}]", values.join(", "))))
                }
            }
            DomainKind::Switch { states, .. } => match SwitchState::parse(&text) {
                Some(s) if states.contains(&s) => Ok(()),
                _ => Err(reject(format!(
                    "is not one of [{}]",
                    states.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
                ))),
            },
            DomainKind::Scalar { typ, pattern } => {
                check_token(*typ, &text, pattern.as_deref(), None).map_err(reject)
            }
            DomainKind::Variants { variants } => {
                if variants.iter().any(|v| v.accepts(&text)) {
                    Ok(())
                } else {
                    Err(reject(format!(
                        "matches none of the variants [{}]",
                        variants
                            .iter()
                            .map(|v| v.name.as_str())
                            .collect::<Vec<_>>()
                            .join(", ")
                    )))
                }
            }
        }
    }

    fn on_model(&self) -> String {
        match &self.model {
            Some(m) => format!(" on {}", m),
            None => String::new(),
        }
    }
}

impl VariantDomain {
    /// Whether a token belongs to this variant
    ///
    /// A keyworded variant only accepts `keyword value`.
    pub fn accepts(&self, text: &str) -> bool {
        if let Some(fixed) = &self.value {
            return text == fixed;
        }
        let token = match &self.keyword {
            Some(kw) => match text.strip_prefix(kw.as_str()) {
                Some(rest) if rest.starts_with(' ') && !rest.trim_start().is_empty() => {
                    rest.trim_start()
                }
                _ => return false,
            },
            None => text,
        };
        check_token(self.typ, token, self.pattern.as_deref(), self.range).is_ok()
    }
}

/// Check a single token against a semantic type, pattern and range
pub fn check_token(
    typ: ParamType,
    token: &str,
    pattern: Option<&str>,
    range: Option<Range>,
) -> std::result::Result<(), String> {
    match typ {
        ParamType::Int => {
            let n: i64 = token
                .parse()
                .map_err(|_| "is not an integer".to_string())?;
            if let Some(r) = range {
                if !r.contains(n) {
                    return Err(format!("is outside {}", r));
                }
            }
        }
        ParamType::Bool => {
            if !matches!(token, "true" | "false" | "on" | "off") {
                return Err("is not a boolean".into());
            }
        }
        ParamType::Ipv4 => {
            token
                .parse::<Ipv4Addr>()
                .map_err(|_| "is not an IPv4 address".to_string())?;
        }
        ParamType::Ipv6 => {
            token
                .parse::<Ipv6Addr>()
                .map_err(|_| "is not an IPv6 address".to_string())?;
        }
        ParamType::Cidr => {
            let (addr, prefix) = token
                .split_once('/')
                .ok_or_else(|| "is not in address/prefix form".to_string())?;
            let addr: IpAddr = addr
                .parse()
                .map_err(|_| "has an invalid network address".to_string())?;
            let prefix: u8 = prefix
                .parse()
                .map_err(|_| "has an invalid prefix length".to_string())?;
            let max = if addr.is_ipv4() { 32 } else { 128 };
            if prefix > max {
                return Err(format!("has prefix length above {}", max));
            }
        }
        ParamType::IpRange => {
            let (lo, hi) = token
                .split_once('-')
                .ok_or_else(|| "is not in first-last form".to_string())?;
            let lo: Ipv4Addr = lo
                .parse()
                .map_err(|_| "has an invalid first address".to_string())?;
            let hi: Ipv4Addr = hi
                .parse()
                .map_err(|_| "has an invalid last address".to_string())?;
            if lo > hi {
                return Err("has first address after last".into());
            }
        }
        ParamType::Hex => {
            let digits = token
                .strip_prefix("0x")
                .or_else(|| token.strip_prefix("0X"))
                .unwrap_or(token);
            if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err("is not hexadecimal".into());
            }
        }
        ParamType::String | ParamType::Enum | ParamType::Switch => {
            if token.is_empty() {
                return Err("is empty".into());
            }
        }
    }

    if let Some(p) = pattern {
        let re = compile_pattern(p)?;
        if !re.is_match(token) {
            return Err(format!("does not match pattern {}", p));
        }
    }
    Ok(())
}

/// Validate a structured value set for `command` on `model`
///
/// Returns every rejected value; an empty list means the set is valid.
/// Specification defects abort with [`Error::Defects`].
pub fn validate_values(
    resolver: &Resolver<'_>,
    command: &Command,
    values: &IndexMap<String, ParamValue>,
    model: Option<&str>,
    license: &LicenseContext,
) -> Result<Vec<ValueError>> {
    let mut rejected = Vec::new();

    for (name, param) in &command.parameters {
        // Variant parameters may bind fields of their own; rebuild the token
        let variant = if param.has_variants() {
            variant_token(name, param, values).map(ParamValue::Text)
        } else {
            None
        };
        let field = param.field_name(name);
        let value = variant
            .as_ref()
            .or_else(|| values.get(field))
            .or_else(|| values.get(name.as_str()));

        let Some(value) = value else {
            if param.required {
                rejected.push(ValueError {
                    parameter: name.clone(),
                    value: String::new(),
                    reason: "is required".into(),
                });
            }
            continue;
        };

        // Structured aliases such as `true` for `on` map back to their token
        let token = param
            .enum_values
            .iter()
            .find(|e| e.terraform_value.as_ref().is_some_and(|t| t.same_as(value)))
            .map(|e| ParamValue::Text(e.value.clone()));
        let value = token.as_ref().unwrap_or(value);

        match resolver.resolve(name, param, model, license) {
            Ok(domain) => {
                if let Err(e) = domain.check(value) {
                    rejected.push(e);
                }
            }
            Err(ResolveError::Unsupported { reason, .. }) => rejected.push(ValueError {
                parameter: name.clone(),
                value: value.to_string(),
                reason: format!("is not accepted: {}", reason),
            }),
            Err(ResolveError::Defect(d)) => return Err(Error::Defects(vec![d])),
        }
    }

    Ok(rejected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LicenseTable, ModelInfo};
    use crate::spec::{EnumValue, ModelOverride, Spec, Variant};
    use pretty_assertions::assert_eq;

    fn catalog() -> Catalog {
        let mut models = IndexMap::new();
        models.insert(
            "RTX1210".to_string(),
            ModelInfo {
                firmware: Some("14.01.38".into()),
                limits: [("ipsec_tunnels".to_string(), 100)].into_iter().collect(),
                ..Default::default()
            },
        );
        models.insert(
            "RTX830".to_string(),
            ModelInfo {
                firmware: Some("15.02.10".into()),
                limits: [("ipsec_tunnels".to_string(), 20)].into_iter().collect(),
                ..Default::default()
            },
        );
        Catalog {
            models,
            licenses: vec![LicenseTable {
                sku: "YSL-VPN-EX".into(),
                capability: "ipsec_tunnels".into(),
                models: vec!["RTX1210".into()],
                limits: vec![300, 500, 700],
            }],
        }
    }

    fn tunnel_param() -> Parameter {
        let mut param = Parameter {
            typ: ParamType::Int,
            range: Some(Range::new(1, 3000)),
            ..Default::default()
        };
        param.model_constraints.insert(
            "RTX1210".into(),
            ModelOverride {
                capacity: Some("ipsec_tunnels".into()),
                ..Default::default()
            },
        );
        param.model_constraints.insert(
            "RTX830".into(),
            ModelOverride {
                capacity: Some("ipsec_tunnels".into()),
                ..Default::default()
            },
        );
        param
    }

    #[test]
    fn test_base_limit_without_license() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let domain = resolver
            .resolve("tunnel", &tunnel_param(), Some("RTX1210"), &LicenseContext::new())
            .unwrap();
        assert_eq!(domain.range(), Some(Range::new(1, 100)));
        assert_eq!(domain.applied_license, None);
        assert_eq!(domain.license_tiers.len(), 3);
    }

    #[test]
    fn test_memo_distinguishes_declarations_with_same_name() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let license = LicenseContext::new();
        let wide = Parameter {
            typ: ParamType::Int,
            range: Some(Range::new(1, 1000)),
            ..Default::default()
        };
        let narrow = Parameter {
            range: Some(Range::new(1, 10)),
            ..wide.clone()
        };

        let first = resolver.resolve("gateway_id", &wide, None, &license).unwrap();
        let second = resolver.resolve("gateway_id", &narrow, None, &license).unwrap();
        assert_eq!(first.range(), Some(Range::new(1, 1000)));
        assert_eq!(second.range(), Some(Range::new(1, 10)));
    }

    #[test]
    fn test_license_quantity_selects_row() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let license = LicenseContext::new().with("YSL-VPN-EX", 3);
        let domain = resolver
            .resolve("tunnel", &tunnel_param(), Some("RTX1210"), &license)
            .unwrap();
        assert_eq!(domain.range(), Some(Range::new(1, 700)));
        assert!(domain.check(&ParamValue::Int(700)).is_ok());
        assert!(domain.check(&ParamValue::Int(701)).is_err());
        assert_eq!(
            domain.applied_license,
            Some(LicenseGrant {
                sku: "YSL-VPN-EX".into(),
                quantity: 3
            })
        );
    }

    #[test]
    fn test_quantity_beyond_table_uses_last_row() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let license = LicenseContext::new().with("YSL-VPN-EX", 9);
        let domain = resolver
            .resolve("tunnel", &tunnel_param(), Some("RTX1210"), &license)
            .unwrap();
        assert_eq!(domain.range(), Some(Range::new(1, 700)));
    }

    #[test]
    fn test_license_table_scoped_to_model() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let license = LicenseContext::new().with("YSL-VPN-EX", 2);
        let domain = resolver
            .resolve("tunnel", &tunnel_param(), Some("RTX830"), &license)
            .unwrap();
        assert_eq!(domain.range(), Some(Range::new(1, 20)));
        assert!(domain.license_tiers.is_empty());
    }

    #[test]
    fn test_unknown_model_is_defect() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let err = resolver
            .resolve("tunnel", &tunnel_param(), Some("RTX9999"), &LicenseContext::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Defect(SpecDefect::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_unavailable_is_unsupported_not_defect() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let param = Parameter {
            typ: ParamType::String,
            availability: Some(ModelConstraints {
                invalid_for: vec!["RTX830".into()],
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = resolver
            .resolve("local_id", &param, Some("RTX830"), &LicenseContext::new())
            .unwrap_err();
        assert!(matches!(err, ResolveError::Unsupported { .. }));
        assert!(resolver
            .resolve("local_id", &param, Some("RTX1210"), &LicenseContext::new())
            .is_ok());
    }

    #[test]
    fn test_min_firmware() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let param = Parameter {
            availability: Some(ModelConstraints {
                min_firmware: Some("15.00.00".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let license = LicenseContext::new();
        assert!(resolver.resolve("p", &param, Some("RTX1210"), &license).is_err());
        assert!(resolver.resolve("p", &param, Some("RTX830"), &license).is_ok());
    }

    #[test]
    fn test_model_excludes_enum_value() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let mut param = Parameter {
            typ: ParamType::Enum,
            enum_values: ["3des-cbc", "aes-cbc", "aes256-cbc"]
                .iter()
                .map(|v| EnumValue {
                    value: v.to_string(),
                    description: None,
                    terraform_value: None,
                })
                .collect(),
            ..Default::default()
        };
        param.model_constraints.insert(
            "RTX830".into(),
            ModelOverride {
                exclude_values: vec!["3des-cbc".into()],
                ..Default::default()
            },
        );

        let license = LicenseContext::new();
        let full = resolver.resolve("alg", &param, Some("RTX1210"), &license).unwrap();
        let trimmed = resolver.resolve("alg", &param, Some("RTX830"), &license).unwrap();
        assert_eq!(full.members().len(), 3);
        assert_eq!(trimmed.members(), vec!["aes-cbc", "aes256-cbc"]);
        let err = trimmed.check(&"3des-cbc".into()).unwrap_err();
        assert!(err.reason.contains("not offered on RTX830"));
    }

    #[test]
    fn test_switch_auto_resolution() {
        let catalog = catalog();
        let resolver = Resolver::new(&catalog);
        let mut param = Parameter {
            typ: ParamType::Switch,
            default: Some("off".into()),
            ..Default::default()
        };
        param.model_constraints.insert(
            "RTX1210".into(),
            ModelOverride {
                auto_resolves_to: Some(SwitchState::On),
                ..Default::default()
            },
        );

        let license = LicenseContext::new();
        let a = resolver.resolve("s", &param, Some("RTX1210"), &license).unwrap();
        let b = resolver.resolve("s", &param, Some("RTX830"), &license).unwrap();
        assert_eq!(a.resolve_switch(SwitchState::Auto), Some(true));
        assert_eq!(b.resolve_switch(SwitchState::Auto), Some(false));
        assert_eq!(b.resolve_switch(SwitchState::On), Some(true));
    }

    #[test]
    fn test_malformed_range_is_defect() {
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let param = Parameter {
            typ: ParamType::Int,
            range: Some(Range::new(10, 1)),
            ..Default::default()
        };
        let err = resolver
            .resolve("bad", &param, None, &LicenseContext::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ResolveError::Defect(SpecDefect::MalformedRange { .. })
        ));
    }

    #[test]
    fn test_check_typed_tokens() {
        assert!(check_token(ParamType::Ipv4, "192.168.0.1", None, None).is_ok());
        assert!(check_token(ParamType::Ipv4, "192.168.0.256", None, None).is_err());
        assert!(check_token(ParamType::Cidr, "10.0.0.0/8", None, None).is_ok());
        assert!(check_token(ParamType::Cidr, "10.0.0.0/33", None, None).is_err());
        assert!(check_token(ParamType::IpRange, "10.0.0.1-10.0.0.9", None, None).is_ok());
        assert!(check_token(ParamType::IpRange, "10.0.0.9-10.0.0.1", None, None).is_err());
        assert!(check_token(ParamType::Hex, "0xdeadBEEF", None, None).is_ok());
        assert!(check_token(ParamType::Hex, "0x", None, None).is_err());
        assert!(check_token(ParamType::String, "abc-1", Some("[a-z]+-[0-9]"), None).is_ok());
        assert!(check_token(ParamType::String, "abc-12", Some("[a-z]+-[0-9]"), None).is_err());
    }

    #[test]
    fn test_variant_domain() {
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let param = Parameter {
            variants: vec![
                Variant {
                    name: "off".into(),
                    value: Some("off".into()),
                    ..Default::default()
                },
                Variant {
                    name: "text".into(),
                    keyword: Some("text".into()),
                    typ: ParamType::String,
                    pattern: Some("[!-~]{1,64}".into()),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let domain = resolver
            .resolve("secret", &param, None, &LicenseContext::new())
            .unwrap();
        assert!(domain.check(&"off".into()).is_ok());
        assert!(domain.check(&"text s3cret".into()).is_ok());
        assert!(domain.check(&"text".into()).is_err());
        assert!(domain.check(&"texts3cret".into()).is_err());
        assert!(domain.check(&"s3cret".into()).is_err());
        assert!(domain.check(&"".into()).is_err());
    }

    #[test]
    fn test_validate_values() {
        let spec = Spec::from_yaml(
            r#"
command:
  name: ipsec ike keepalive use
  syntax:
    set: "ipsec ike keepalive use <gateway_id> <switch>"
  parameters:
    gateway_id:
      type: int
      required: true
      range: [1, 1000]
    switch:
      type: switch
      terraform_field: keepalive_enabled
"#,
        )
        .unwrap();
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let license = LicenseContext::new();

        let good: IndexMap<String, ParamValue> = [
            ("gateway_id".to_string(), ParamValue::Int(5)),
            ("keepalive_enabled".to_string(), "on".into()),
        ]
        .into_iter()
        .collect();
        assert!(validate_values(&resolver, &spec.command, &good, None, &license)
            .unwrap()
            .is_empty());

        let bad: IndexMap<String, ParamValue> =
            [("keepalive_enabled".to_string(), "maybe".into())]
                .into_iter()
                .collect();
        let rejected = validate_values(&resolver, &spec.command, &bad, None, &license).unwrap();
        let names: Vec<_> = rejected.iter().map(|e| e.parameter.as_str()).collect();
        assert_eq!(names, vec!["gateway_id", "switch"]);
    }

    #[test]
    fn test_validate_values_rebuilds_variant_tokens() {
        let spec = Spec::from_yaml(
            r#"
command:
  name: ipsec ike pre-shared-key
  syntax:
    set: "ipsec ike pre-shared-key <gateway_id> <key...>"
  parameters:
    gateway_id:
      type: int
      range: [1, 1000]
    key:
      required: true
      variants:
        - name: text
          keyword: text
          type: string
          terraform_field: pre_shared_key
          terraform_value: { key_format: text }
        - name: hex
          keyword: hex
          type: hex
          terraform_field: pre_shared_key
          terraform_value: { key_format: hex }
"#,
        )
        .unwrap();
        let catalog = Catalog::default();
        let resolver = Resolver::new(&catalog);
        let license = LicenseContext::new();
        let fields = |key: &str, format: &str| -> IndexMap<String, ParamValue> {
            [
                ("gateway_id".to_string(), ParamValue::Int(1)),
                ("pre_shared_key".to_string(), key.into()),
                ("key_format".to_string(), format.into()),
            ]
            .into_iter()
            .collect()
        };

        let text = validate_values(&resolver, &spec.command, &fields("himitsu", "text"), None, &license);
        assert!(text.unwrap().is_empty());

        let bad_hex = validate_values(&resolver, &spec.command, &fields("zz", "hex"), None, &license)
            .unwrap();
        assert_eq!(bad_hex.len(), 1);
        assert_eq!(bad_hex[0].parameter, "key");
        assert_eq!(bad_hex[0].value, "hex zz");
    }
}
