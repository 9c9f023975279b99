//! Specification types, the core data model
//!
//! A [`Spec`] document describes one router command family: its syntax
//! templates, its parameters (with per-model overrides and license
//! extensions), and the tests declared against it.
//!
//! ## Example Spec
//!
//! ```yaml
//! command:
//!   name: ipsec ike encryption
//!   applicable_models: [RTX1210, RTX830]
//!   syntax:
//!     set: "ipsec ike encryption <gateway_id> <algorithm>"
//!     delete: "no ipsec ike encryption <gateway_id> [<algorithm>]"
//!   parameters:
//!     gateway_id:
//!       type: int
//!       required: true
//!       range: [1, 1000]
//!     algorithm:
//!       type: enum
//!       default: 3des-cbc
//!       enum_values:
//!         - value: 3des-cbc
//!         - value: aes-cbc
//!         - value: aes256-cbc
//!   syntax_tests:
//!     - name: aes
//!       rtx: "ipsec ike encryption 1 aes-cbc"
//!       terraform: { gateway_id: 1, algorithm: aes-cbc }
//! ```

use crate::error::{Error, Result};
use indexmap::IndexMap;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;

/// Root of a specification document
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[schemars(title = "rtxspec Spec", description = "Router command specification")]
pub struct Spec {
    pub command: Command,
}

/// One CLI command family
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    /// Canonical command name, e.g. `ipsec ike encryption`
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Manual section the command is documented in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,

    /// Device models the command exists on
    #[serde(default)]
    pub applicable_models: Vec<String>,

    pub syntax: SyntaxSpec,

    /// Keyword synonyms: alias -> canonical keyword
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub synonyms: IndexMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform: Option<TerraformSpec>,

    /// Parameters in declaration order
    #[serde(default)]
    pub parameters: IndexMap<String, Parameter>,

    #[serde(default)]
    pub syntax_tests: Vec<SyntaxTest>,

    /// Declared boundary cases, keyed by parameter name
    #[serde(default)]
    pub boundary_tests: IndexMap<String, Vec<BoundaryTest>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairwise: Option<PairwiseSpec>,

    #[serde(default)]
    pub multiline_tests: Vec<SyntaxTest>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_status: Option<String>,
}

/// Either a single item or a list of alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            OneOrMany::One(item) => std::slice::from_ref(item),
            OneOrMany::Many(items) => items,
        }
    }
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        OneOrMany::Many(Vec::new())
    }
}

/// Command syntax templates
///
/// Template grammar: keywords, `<param>`, `<param...>` (rest of line) and
/// nestable `[optional groups]`. Each list entry is an alternative form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyntaxSpec {
    pub set: OneOrMany<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<OneOrMany<String>>,
}

/// Which syntax family a test exercises
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SyntaxForm {
    #[default]
    Set,
    Delete,
}

/// Terraform resource naming and struct layout
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TerraformSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub struct_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,

    /// Fields added to existing structs, keyed by struct name
    #[serde(default)]
    pub struct_additions: IndexMap<String, Vec<StructField>>,

    /// Complete struct definitions, keyed by struct name
    #[serde(default)]
    pub struct_definition: IndexMap<String, Vec<StructField>>,
}

/// A struct field declared directly in the terraform section
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StructField {
    pub name: String,

    #[serde(rename = "type")]
    pub typ: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json_tag: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
}

/// Semantic type of a parameter or variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ParamType {
    #[default]
    String,
    #[serde(alias = "integer")]
    Int,
    Enum,
    /// on / off, optionally auto
    Switch,
    Bool,
    Ipv4,
    Ipv6,
    Cidr,
    #[serde(alias = "ip_range")]
    IpRange,
    Hex,
}

impl ParamType {
    pub fn is_numeric(self) -> bool {
        matches!(self, ParamType::Int)
    }

    pub fn is_enumerated(self) -> bool {
        matches!(self, ParamType::Enum | ParamType::Switch)
    }
}

impl std::fmt::Display for ParamType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParamType::String => "string",
            ParamType::Int => "int",
            ParamType::Enum => "enum",
            ParamType::Switch => "switch",
            ParamType::Bool => "bool",
            ParamType::Ipv4 => "ipv4",
            ParamType::Ipv6 => "ipv6",
            ParamType::Cidr => "cidr",
            ParamType::IpRange => "ip-range",
            ParamType::Hex => "hex",
        };
        write!(f, "{}", s)
    }
}

/// A scalar parameter value as written in specs and structured mappings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl ParamValue {
    /// Integer view, accepting numeric text
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Text(s) => s.trim().parse().ok(),
            ParamValue::Bool(_) => None,
        }
    }

    /// Loose equality: `1` matches `"1"`, `true` matches `"true"`
    pub fn same_as(&self, other: &ParamValue) -> bool {
        self == other || self.to_string() == other.to_string()
    }
}

impl std::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Text(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Text(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

/// Inclusive numeric range, written `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(i64, i64)", into = "(i64, i64)")]
pub struct Range {
    pub min: i64,
    pub max: i64,
}

impl Range {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.min && value <= self.max
    }
}

impl From<(i64, i64)> for Range {
    fn from((min, max): (i64, i64)) -> Self {
        Self { min, max }
    }
}

impl From<Range> for (i64, i64) {
    fn from(r: Range) -> Self {
        (r.min, r.max)
    }
}

impl JsonSchema for Range {
    fn schema_name() -> Cow<'static, str> {
        "Range".into()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        <(i64, i64)>::json_schema(generator)
    }
}

impl std::fmt::Display for Range {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}

/// Switch state; `auto` defers the decision to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SwitchState {
    On,
    Off,
    Auto,
}

impl SwitchState {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "on" => Some(SwitchState::On),
            "off" => Some(SwitchState::Off),
            "auto" => Some(SwitchState::Auto),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SwitchState::On => "on",
            SwitchState::Off => "off",
            SwitchState::Auto => "auto",
        }
    }
}

/// One named input slot of a command
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Parameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub required: bool,

    #[serde(rename = "type", default)]
    pub typ: ParamType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,

    /// Regex the value must match (string-like types)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<EnumValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<Variant>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_field: Option<String>,

    /// Overrides the schema type derived from `type`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_type: Option<String>,

    /// Per-model overrides, keyed by model identifier
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub model_constraints: IndexMap<String, ModelOverride>,

    /// Which models offer the parameter at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<ModelConstraints>,

    /// Auto-derive canonical boundary cases
    #[serde(default = "default_true")]
    pub derive_boundaries: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_true() -> bool {
    true
}

impl Parameter {
    /// Digest of the declaration, distinguishing same-named parameters of
    /// different commands
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let content = serde_json::to_string(self).unwrap_or_default();
        hex::encode(Sha256::digest(content.as_bytes()))
    }

    /// Structured field name the parameter binds to
    pub fn field_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.terraform_field.as_deref().unwrap_or(name)
    }

    pub fn enum_value(&self, value: &str) -> Option<&EnumValue> {
        self.enum_values.iter().find(|e| e.value == value)
    }

    pub fn has_variants(&self) -> bool {
        !self.variants.is_empty()
    }
}

/// An enumerated value with its description
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EnumValue {
    pub value: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Structured value when it differs from the command token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_value: Option<ParamValue>,
}

/// An alternative shape of a parameter
///
/// Exactly one of `value` (bare keyword), `keyword` (keyword followed by a
/// typed value) or a typed/pattern token describes how the variant appears
/// on the command line.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Variant {
    pub name: String,

    #[serde(rename = "type", default)]
    pub typ: ParamType,

    /// Bare keyword the variant is written as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    /// Keyword preceding the variant's value, e.g. `text`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terraform_field: Option<String>,

    /// Field overrides for other parameters while this variant is selected
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub terraform_fields: IndexMap<String, String>,

    /// Constant fields set when this variant is selected
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub terraform_value: IndexMap<String, ParamValue>,
}

impl Variant {
    /// Whether the variant carries a value beyond its keyword
    pub fn takes_value(&self) -> bool {
        self.value.is_none()
    }
}

/// Per-model override of a parameter's domain
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModelOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,

    #[serde(default)]
    pub unavailable: bool,

    /// Capability key looked up in the catalog (base limit and license tables)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<String>,

    /// Inline license tables: SKU -> limit per quantity (index 0 = one license)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub license: IndexMap<String, Vec<i64>>,

    /// Enum members not offered on this model
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_values: Vec<String>,

    /// What `auto` means on this model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_resolves_to: Option<SwitchState>,
}

/// Model applicability rules for a parameter or a test
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ModelConstraints {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_for: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_for: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unavailable: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires_license: Option<String>,

    /// Minimum firmware revision, e.g. `14.01.20`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_firmware: Option<String>,
}

impl ModelConstraints {
    /// Every model identifier named by these constraints
    pub fn referenced_models(&self) -> impl Iterator<Item = &String> {
        self.valid_for
            .iter()
            .chain(&self.invalid_for)
            .chain(&self.unavailable)
    }
}

/// A declared boundary value for one parameter
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BoundaryTest {
    pub value: ParamValue,

    pub valid: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Fragment expected in the device's error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_contains: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub valid_for: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_for: Vec<String>,
}

impl BoundaryTest {
    pub fn is_model_scoped(&self) -> bool {
        !self.valid_for.is_empty() || !self.invalid_for.is_empty()
    }
}

/// Pairwise coverage declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct PairwiseSpec {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Participating parameters, in tie-break order
    pub parameters: Vec<String>,

    /// Candidate values; derived from the parameter domain when omitted
    #[serde(default)]
    pub parameter_values: IndexMap<String, Vec<ParamValue>>,

    #[serde(default)]
    pub constraints: Vec<PairwiseConstraint>,
}

/// Conditional constraint on pairwise combinations
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PairwiseConstraint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(alias = "condition")]
    pub when: ConstraintCondition,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requires: Option<Requirement>,

    /// Models on which a matching combination is invalid
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invalid_for: Vec<String>,

    /// Lower value wins when constraints overlap
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
}

impl PairwiseConstraint {
    /// Display label: explicit name or the condition text
    pub fn label(&self, index: usize) -> String {
        match &self.name {
            Some(n) => n.clone(),
            None => format!("#{} ({})", index + 1, self.when),
        }
    }
}

/// Constraint trigger
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum ConstraintCondition {
    /// CEL expression over parameter names
    Expr(String),
    /// Parameter -> required value, AND'd together
    Match(IndexMap<String, ParamValue>),
}

impl std::fmt::Display for ConstraintCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstraintCondition::Expr(e) => write!(f, "{}", e),
            ConstraintCondition::Match(m) => {
                let parts: Vec<_> = m.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "{}", parts.join(" && "))
            }
        }
    }
}

/// What must hold when a constraint triggers
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Requirement {
    OneOf {
        param: String,
        one_of: Vec<ParamValue>,
    },
    /// CEL expression over parameter names
    Expr(String),
}

/// Declared command text and its structured equivalent
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SyntaxTest {
    pub name: String,

    /// Command text; one command per line
    pub rtx: String,

    #[serde(default)]
    pub terraform: Structured,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bidirectional: Option<bool>,

    #[serde(default)]
    pub parse_only: bool,

    #[serde(default)]
    pub build_only: bool,

    #[serde(default)]
    pub form: SyntaxForm,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_constraints: Option<ModelConstraints>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Directions a syntax test checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxMode {
    Bidirectional,
    ParseOnly,
    BuildOnly,
}

impl SyntaxTest {
    pub fn mode(&self) -> SyntaxMode {
        if self.parse_only || (self.bidirectional == Some(false) && !self.build_only) {
            SyntaxMode::ParseOnly
        } else if self.build_only {
            SyntaxMode::BuildOnly
        } else {
            SyntaxMode::Bidirectional
        }
    }
}

/// Structured equivalent of command text: one mapping, or one per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Structured {
    Single(IndexMap<String, ParamValue>),
    Multi(Vec<IndexMap<String, ParamValue>>),
}

impl Default for Structured {
    fn default() -> Self {
        Structured::Single(IndexMap::new())
    }
}

impl Structured {
    pub fn mappings(&self) -> Vec<&IndexMap<String, ParamValue>> {
        match self {
            Structured::Single(m) => vec![m],
            Structured::Multi(ms) => ms.iter().collect(),
        }
    }
}

impl Spec {
    /// Parse spec from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_norway::from_str(yaml).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Serialize spec to YAML string
    pub fn to_yaml(&self) -> Result<String> {
        serde_norway::to_string(self).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Parse spec from JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Serialize spec to JSON string
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Load a spec file; `.json` is read as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let spec = if path.extension().is_some_and(|e| e == "json") {
            Self::from_json(&content)?
        } else {
            Self::from_yaml(&content)?
        };

        if spec.command.name.trim().is_empty() {
            return Err(Error::SpecParse(format!(
                "{}: command.name is required",
                path.display()
            )));
        }
        Ok(spec)
    }
}

impl Command {
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.get(name)
    }

    pub fn set_forms(&self) -> &[String] {
        self.syntax.set.as_slice()
    }

    pub fn delete_forms(&self) -> &[String] {
        self.syntax
            .delete
            .as_ref()
            .map(|d| d.as_slice())
            .unwrap_or(&[])
    }

    pub fn forms(&self, form: SyntaxForm) -> &[String] {
        match form {
            SyntaxForm::Set => self.set_forms(),
            SyntaxForm::Delete => self.delete_forms(),
        }
    }

    /// Syntax tests followed by multiline tests
    pub fn all_syntax_tests(&self) -> impl Iterator<Item = &SyntaxTest> {
        self.syntax_tests.iter().chain(&self.multiline_tests)
    }

    /// Canonical spelling of a keyword
    pub fn canonical_keyword<'a>(&'a self, token: &'a str) -> &'a str {
        self.synonyms.get(token).map(|s| s.as_str()).unwrap_or(token)
    }

    /// Compute hash of the command for change detection
    pub fn hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let content = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("sha256:{}", hex::encode(&hasher.finalize()[..8]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEEPALIVE: &str = r#"
command:
  name: ipsec ike keepalive use
  applicable_models: [RTX1210]
  syntax:
    set:
      - "ipsec ike keepalive use <gateway_id> <switch> [<method>]"
    delete: "no ipsec ike keepalive use <gateway_id>"
  parameters:
    gateway_id:
      type: int
      range: [1, 1000]
    switch:
      type: switch
      enum_values:
        - value: "on"
        - value: "off"
        - value: auto
  syntax_tests:
    - name: "on"
      rtx: "ipsec ike keepalive use 1 on"
      terraform: { gateway_id: 1, switch: "on" }
    - name: multi
      rtx: |
        ipsec ike keepalive use 1 on
        ipsec ike keepalive use 2 off
      terraform:
        - { gateway_id: 1, switch: "on" }
        - { gateway_id: 2, switch: "off" }
      parse_only: true
"#;

    #[test]
    fn test_parse_yaml() {
        let spec = Spec::from_yaml(KEEPALIVE).unwrap();
        let cmd = &spec.command;
        assert_eq!(cmd.name, "ipsec ike keepalive use");
        assert_eq!(cmd.set_forms().len(), 1);
        assert_eq!(cmd.delete_forms().len(), 1);
        assert_eq!(cmd.parameters["gateway_id"].range, Some(Range::new(1, 1000)));
        assert_eq!(cmd.parameters["switch"].typ, ParamType::Switch);
        assert!(cmd.parameters["switch"].derive_boundaries);
    }

    #[test]
    fn test_structured_single_and_multi() {
        let spec = Spec::from_yaml(KEEPALIVE).unwrap();
        let tests = &spec.command.syntax_tests;
        assert!(matches!(tests[0].terraform, Structured::Single(_)));
        assert_eq!(tests[0].mode(), SyntaxMode::Bidirectional);
        assert!(matches!(tests[1].terraform, Structured::Multi(ref m) if m.len() == 2));
        assert_eq!(tests[1].mode(), SyntaxMode::ParseOnly);
    }

    #[test]
    fn test_param_value_same_as() {
        assert!(ParamValue::Int(1).same_as(&ParamValue::Text("1".into())));
        assert!(!ParamValue::Int(1).same_as(&ParamValue::Int(2)));
        assert_eq!(ParamValue::Text("42".into()).as_int(), Some(42));
    }

    #[test]
    fn test_hash_is_stable() {
        let a = Spec::from_yaml(KEEPALIVE).unwrap();
        let b = Spec::from_yaml(KEEPALIVE).unwrap();
        assert_eq!(a.command.hash(), b.command.hash());
        assert!(a.command.hash().starts_with("sha256:"));
    }

    #[test]
    fn test_switch_state_parse() {
        assert_eq!(SwitchState::parse("auto"), Some(SwitchState::Auto));
        assert_eq!(SwitchState::parse("yes"), None);
        assert_eq!(SwitchState::On.as_str(), "on");
    }
}
