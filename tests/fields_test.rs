//! Field mapping tests over the bundled specs

use pretty_assertions::assert_eq;
use rtxspec::spec::EnumValue;
use rtxspec::{FieldEmitter, FieldMapping, FieldTable, ParamType, Parameter, Spec, SpecDefect};
use std::path::PathBuf;

fn spec(file: &str) -> Spec {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    Spec::load(&root.join("specs").join(file)).unwrap()
}

fn single<'a>(table: &'a FieldTable, param: &str) -> &'a rtxspec::FieldDescriptor {
    match &table.parameters[param] {
        FieldMapping::Single { field } => field,
        other => panic!("expected single mapping for {}, got {:?}", param, other),
    }
}

fn enum_param(values: &[&str]) -> Parameter {
    Parameter {
        typ: ParamType::Enum,
        enum_values: values
            .iter()
            .map(|v| EnumValue {
                value: v.to_string(),
                description: None,
                terraform_value: None,
            })
            .collect(),
        ..Default::default()
    }
}

#[test]
fn test_keepalive_fields() {
    let table = FieldEmitter::new()
        .emit_all(&spec("ipsec_ike_keepalive_use.yaml").command)
        .unwrap();

    assert_eq!(table.resource.as_deref(), Some("rtx_ipsec_tunnel"));
    let names: Vec<&str> = table
        .parameters
        .values()
        .flat_map(|m| m.descriptors())
        .map(|d| d.name.as_str())
        .collect();
    assert_eq!(
        names,
        vec!["tunnel_id", "keepalive_enabled", "keepalive_interval", "keepalive_retry"]
    );

    let enabled = single(&table, "enabled");
    assert_eq!(enabled.typ, "bool");
    assert!(enabled.allowed_values.is_empty());
    assert!(enabled.required);

    let interval = single(&table, "interval");
    assert_eq!(interval.typ, "int");
    assert_eq!(interval.struct_name, "KeepaliveInterval");
    assert!(!interval.required);
}

#[test]
fn test_switch_and_enum_values() {
    let table = FieldEmitter::new()
        .emit_all(&spec("ipsec_ike_pfs.yaml").command)
        .unwrap();

    let pfs = single(&table, "pfs");
    assert_eq!(pfs.typ, "string");
    assert_eq!(pfs.allowed_values, vec!["on", "off"]);

    let version = single(&table, "ike_version");
    assert_eq!(version.allowed_values, vec!["1", "2"]);
}

#[test]
fn test_pre_shared_key_is_discriminated() {
    let table = FieldEmitter::new()
        .emit_all(&spec("ipsec_ike_pre_shared_key.yaml").command)
        .unwrap();

    let FieldMapping::Discriminated { selector, branches } = &table.parameters["key"] else {
        panic!("expected discriminated mapping");
    };
    assert_eq!(selector.name, "key_format");
    assert_eq!(selector.allowed_values, vec!["text", "hex"]);
    let whens: Vec<&str> = branches.iter().map(|b| b.when.as_str()).collect();
    assert_eq!(whens, vec!["text", "hex"]);
    assert!(branches
        .iter()
        .all(|b| b.fields.iter().any(|f| f.name == "pre_shared_key")));
}

#[test]
fn test_type_collision_between_parameters() {
    let mut spec = spec("ipsec_ike_keepalive_use.yaml");
    if let Some(count) = spec.command.parameters.get_mut("count") {
        count.terraform_field = Some("keepalive_enabled".into());
    }
    let err = FieldEmitter::new().emit_all(&spec.command).unwrap_err();
    match err.defects() {
        [SpecDefect::FieldCollision {
            field,
            first_type,
            second_type,
            ..
        }] => {
            assert_eq!(field, "keepalive_enabled");
            assert_eq!(first_type, "bool");
            assert_eq!(second_type, "int");
        }
        other => panic!("expected one collision, got {:?}", other),
    }
}

#[test]
fn test_value_sets_compare_unordered() {
    let mut command = spec("ipsec_ike_pfs.yaml").command;
    let mut first = enum_param(&["main", "aggressive"]);
    first.terraform_field = Some("exchange_mode".into());
    let mut second = enum_param(&["aggressive", "main"]);
    second.terraform_field = Some("exchange_mode".into());
    command.parameters.insert("mode".into(), first);
    command.parameters.insert("peer_mode".into(), second);
    assert!(FieldEmitter::new().emit_all(&command).is_ok());

    let mut third = enum_param(&["main", "base"]);
    third.terraform_field = Some("exchange_mode".into());
    command.parameters.insert("fallback_mode".into(), third);
    let err = FieldEmitter::new().emit_all(&command).unwrap_err();
    assert!(matches!(
        err.defects(),
        [SpecDefect::FieldCollision { field, .. }] if field == "exchange_mode"
    ));
}
