//! Structured field mapping
//!
//! Derives the target-schema field descriptors a command binds: one
//! descriptor per plain parameter, or a discriminated mapping for
//! parameters with variants. Fields bound twice with incompatible types or
//! value sets are reported as [`SpecDefect::FieldCollision`].

use crate::error::{Error, Result, SpecDefect};
use crate::spec::{Command, ParamType, ParamValue, Parameter, StructField, Variant};
use crate::util::{to_pascal_case, to_snake_case};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One field of the target schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldDescriptor {
    /// Field name as it appears in structured mappings
    pub name: String,
    /// Struct member name (PascalCase)
    pub struct_name: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// One branch of a discriminated mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VariantBranch {
    pub variant: String,
    /// Selector value that picks this branch
    pub when: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldDescriptor>,
    /// Other parameters rebound to a different field in this branch
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub redirects: IndexMap<String, String>,
}

/// Field mapping of one parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldMapping {
    Single {
        field: FieldDescriptor,
    },
    Discriminated {
        selector: FieldDescriptor,
        branches: Vec<VariantBranch>,
    },
}

impl FieldMapping {
    /// Every descriptor in the mapping, selector first
    pub fn descriptors(&self) -> Vec<&FieldDescriptor> {
        match self {
            FieldMapping::Single { field } => vec![field],
            FieldMapping::Discriminated { selector, branches } => std::iter::once(selector)
                .chain(branches.iter().flat_map(|b| &b.fields))
                .collect(),
        }
    }
}

/// All field mappings of one command
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FieldTable {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Parameter name -> mapping, in declaration order
    pub parameters: IndexMap<String, FieldMapping>,
    /// Struct name -> fields declared in the terraform section
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub structs: IndexMap<String, Vec<FieldDescriptor>>,
}

/// Emits field mappings
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldEmitter;

impl FieldEmitter {
    pub fn new() -> Self {
        Self
    }

    /// Mapping for one parameter
    pub fn emit(&self, name: &str, param: &Parameter) -> FieldMapping {
        if !param.has_variants() {
            return FieldMapping::Single {
                field: plain_descriptor(name, param),
            };
        }

        let mut selector = selector_for(name, param);
        selector.allowed_values = param
            .variants
            .iter()
            .map(|v| branch_key(v, &selector.name))
            .collect();
        let branches = param
            .variants
            .iter()
            .map(|v| VariantBranch {
                variant: v.name.clone(),
                when: branch_key(v, &selector.name),
                fields: branch_fields(name, param, v, &selector.name),
                redirects: v.terraform_fields.clone(),
            })
            .collect();

        FieldMapping::Discriminated { selector, branches }
    }

    /// Mappings for every parameter plus declared struct fields
    pub fn emit_all(&self, command: &Command) -> Result<FieldTable> {
        let mut table = FieldTable {
            command: command.name.clone(),
            resource: command.terraform.as_ref().and_then(|t| t.resource_name.clone()),
            ..FieldTable::default()
        };
        let mut seen = FieldIndex::default();
        let mut defects = Vec::new();

        for (name, param) in &command.parameters {
            let mapping = self.emit(name, param);
            for d in mapping.descriptors() {
                seen.record(d, &format!("parameter '{}'", name), &mut defects);
            }
            if let FieldMapping::Discriminated { branches, .. } = &mapping {
                for branch in branches {
                    for (other, field) in &branch.redirects {
                        let Some(target) = command.parameters.get(other) else {
                            defects.push(SpecDefect::UnknownParameter {
                                parameter: other.clone(),
                                context: format!("variant '{}' of parameter '{}'", branch.variant, name),
                            });
                            continue;
                        };
                        let redirected = FieldDescriptor {
                            name: field.clone(),
                            struct_name: to_pascal_case(field),
                            ..plain_descriptor(other, target)
                        };
                        seen.record(
                            &redirected,
                            &format!("parameter '{}' via variant '{}'", other, branch.variant),
                            &mut defects,
                        );
                    }
                }
            }
            table.parameters.insert(name.clone(), mapping);
        }

        if let Some(tf) = &command.terraform {
            for (struct_name, fields) in tf.struct_definition.iter().chain(&tf.struct_additions) {
                let entry = table.structs.entry(struct_name.clone()).or_default();
                for f in fields {
                    let d = struct_descriptor(f);
                    seen.record(&d, &format!("struct {}", struct_name), &mut defects);
                    entry.push(d);
                }
            }
        }

        if defects.is_empty() {
            Ok(table)
        } else {
            Err(Error::Defects(defects))
        }
    }
}

/// First binding of each field name, for collision checks
#[derive(Default)]
struct FieldIndex {
    first: IndexMap<String, (String, String, Vec<String>)>,
}

impl FieldIndex {
    fn record(&mut self, d: &FieldDescriptor, source: &str, defects: &mut Vec<SpecDefect>) {
        let mut values = d.allowed_values.clone();
        values.sort();

        let Some((first_source, first_type, first_values)) = self.first.get(&d.name) else {
            self.first
                .insert(d.name.clone(), (source.to_string(), d.typ.clone(), values));
            return;
        };

        let values_clash =
            !first_values.is_empty() && !values.is_empty() && *first_values != values;
        if *first_type != d.typ || values_clash {
            defects.push(SpecDefect::FieldCollision {
                field: d.name.clone(),
                first: first_source.clone(),
                first_type: describe(first_type, first_values),
                second: source.to_string(),
                second_type: describe(&d.typ, &values),
            });
        }
    }
}

fn describe(typ: &str, values: &[String]) -> String {
    if values.is_empty() {
        typ.to_string()
    } else {
        format!("{} [{}]", typ, values.join(", "))
    }
}

/// Schema type for a parameter type
pub fn schema_type(typ: ParamType) -> &'static str {
    match typ {
        ParamType::Int => "int",
        ParamType::Bool => "bool",
        _ => "string",
    }
}

fn plain_descriptor(name: &str, param: &Parameter) -> FieldDescriptor {
    let field = param.field_name(name).to_string();
    let boolean = param.typ.is_enumerated()
        && !param.enum_values.is_empty()
        && param
            .enum_values
            .iter()
            .all(|e| matches!(e.terraform_value, Some(ParamValue::Bool(_))));
    let derived = if boolean { "bool" } else { schema_type(param.typ) };
    let allowed_values = match param.typ {
        _ if boolean => Vec::new(),
        ParamType::Enum => param
            .enum_values
            .iter()
            .map(|e| match &e.terraform_value {
                Some(t) => t.to_string(),
                None => e.value.clone(),
            })
            .collect(),
        ParamType::Switch if param.enum_values.is_empty() => vec!["on".into(), "off".into()],
        ParamType::Switch => param.enum_values.iter().map(|e| e.value.clone()).collect(),
        _ => Vec::new(),
    };
    FieldDescriptor {
        struct_name: to_pascal_case(&field),
        typ: param
            .terraform_type
            .clone()
            .unwrap_or_else(|| derived.to_string()),
        allowed_values,
        description: param.description.clone(),
        required: param.required,
        name: field,
    }
}

/// Constant field shared by every variant, else the parameter's own field
fn selector_for(name: &str, param: &Parameter) -> FieldDescriptor {
    let shared = param.variants.first().and_then(|first| {
        first
            .terraform_value
            .keys()
            .find(|k| param.variants.iter().all(|v| v.terraform_value.contains_key(*k)))
            .cloned()
    });
    let field = shared.unwrap_or_else(|| format!("{}_type", param.field_name(name)));
    FieldDescriptor {
        struct_name: to_pascal_case(&field),
        name: field,
        typ: "string".into(),
        allowed_values: Vec::new(),
        description: param.description.clone(),
        required: param.required,
    }
}

fn branch_key(v: &Variant, selector: &str) -> String {
    v.terraform_value
        .get(selector)
        .map(|value| value.to_string())
        .unwrap_or_else(|| to_snake_case(&v.name))
}

/// Value-carrying fields a branch binds, excluding the selector
fn branch_fields(name: &str, param: &Parameter, v: &Variant, selector: &str) -> Vec<FieldDescriptor> {
    let mut fields = Vec::new();
    if v.takes_value() {
        let field = v
            .terraform_field
            .clone()
            .unwrap_or_else(|| param.field_name(name).to_string());
        fields.push(FieldDescriptor {
            struct_name: to_pascal_case(&field),
            name: field,
            typ: schema_type(v.typ).to_string(),
            allowed_values: Vec::new(),
            description: v.description.clone(),
            required: false,
        });
    }
    for (k, value) in &v.terraform_value {
        if k == selector {
            continue;
        }
        fields.push(FieldDescriptor {
            struct_name: to_pascal_case(k),
            name: k.clone(),
            typ: match value {
                ParamValue::Int(_) => "int".into(),
                ParamValue::Bool(_) => "bool".into(),
                ParamValue::Text(_) => "string".into(),
            },
            allowed_values: Vec::new(),
            description: None,
            required: false,
        });
    }
    fields
}

fn struct_descriptor(f: &StructField) -> FieldDescriptor {
    let typ = match f.typ.as_str() {
        "int" | "int32" | "int64" | "integer" => "int".to_string(),
        "bool" | "boolean" => "bool".to_string(),
        "string" => "string".to_string(),
        other => other.to_string(),
    };
    FieldDescriptor {
        name: f.json_tag.clone().unwrap_or_else(|| to_snake_case(&f.name)),
        struct_name: to_pascal_case(&f.name),
        typ,
        allowed_values: f.enum_values.clone(),
        description: f.description.clone(),
        required: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::Spec;
    use pretty_assertions::assert_eq;

    const PSK: &str = r#"
command:
  name: ipsec ike pre-shared-key
  terraform:
    resource_name: rtx_ipsec_tunnel
    struct_definition:
      IKEv1:
        - { name: GatewayID, type: int, json_tag: gateway_id }
  syntax:
    set: "ipsec ike pre-shared-key <gateway_id> <key>"
  parameters:
    gateway_id:
      type: int
      range: [1, 1000]
      required: true
    key:
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
"#;

    #[test]
    fn test_single_descriptor() {
        let spec = Spec::from_yaml(PSK).unwrap();
        let mapping = FieldEmitter::new().emit("gateway_id", &spec.command.parameters["gateway_id"]);
        let FieldMapping::Single { field } = mapping else {
            panic!("expected single mapping");
        };
        assert_eq!(field.name, "gateway_id");
        assert_eq!(field.struct_name, "GatewayId");
        assert_eq!(field.typ, "int");
        assert!(field.required);
    }

    #[test]
    fn test_variants_discriminate_on_shared_constant() {
        let spec = Spec::from_yaml(PSK).unwrap();
        let mapping = FieldEmitter::new().emit("key", &spec.command.parameters["key"]);
        let FieldMapping::Discriminated { selector, branches } = mapping else {
            panic!("expected discriminated mapping");
        };
        assert_eq!(selector.name, "key_format");
        assert_eq!(selector.allowed_values, vec!["text", "hex"]);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[1].when, "hex");
        assert_eq!(branches[1].fields[0].name, "pre_shared_key");
    }

    #[test]
    fn test_emit_all_includes_structs() {
        let spec = Spec::from_yaml(PSK).unwrap();
        let table = FieldEmitter::new().emit_all(&spec.command).unwrap();
        assert_eq!(table.resource.as_deref(), Some("rtx_ipsec_tunnel"));
        assert_eq!(table.parameters.len(), 2);
        assert_eq!(table.structs["IKEv1"][0].name, "gateway_id");
    }

    #[test]
    fn test_struct_field_type_collision() {
        let yaml = PSK.replace("type: int, json_tag", "type: string, json_tag");
        let spec = Spec::from_yaml(&yaml).unwrap();
        let err = FieldEmitter::new().emit_all(&spec.command).unwrap_err();
        assert!(matches!(
            err.defects(),
            [SpecDefect::FieldCollision { field, .. }] if field == "gateway_id"
        ));
    }
}
