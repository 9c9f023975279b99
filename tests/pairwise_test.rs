//! Pairwise generation tests
//!
//! Property tests over random enum domains with forbidding constraints,
//! plus the PFS / negotiate-strictly scenario from the bundled specs.

use indexmap::IndexMap;
use proptest::prelude::*;
use rtxspec::spec::{ConstraintCondition, EnumValue, PairwiseConstraint, PairwiseSpec};
use rtxspec::{
    Catalog, Combination, Command, Error, LicenseContext, PairwiseGenerator, ParamType,
    ParamValue, Parameter, ProjectConfig, Resolver, Spec, SpecDefect,
};
use std::path::PathBuf;

/// Domain sizes per parameter and constraints as (parameter, value) terms
type Scenario = (Vec<usize>, Vec<Vec<(usize, usize)>>);

fn scenario() -> impl Strategy<Value = Scenario> {
    prop::collection::vec(2usize..=3, 2..=4).prop_flat_map(|sizes| {
        let n = sizes.len();
        let bounds = sizes.clone();
        let term = (0..n).prop_flat_map(move |p| (Just(p), 0..bounds[p]));
        let constraints = prop::collection::vec(prop::collection::vec(term, 2..=3), 0..=3);
        (Just(sizes), constraints)
    })
}

fn param_name(p: usize) -> String {
    format!("p{}", p)
}

fn value_name(v: usize) -> String {
    format!("v{}", v)
}

/// Constraint terms with repeated parameters collapsed, last one winning
fn normalized(terms: &[(usize, usize)]) -> IndexMap<usize, usize> {
    terms.iter().copied().collect()
}

fn build_command((sizes, constraints): &Scenario) -> Command {
    let mut command = Command {
        name: "pairwise property".into(),
        ..Default::default()
    };
    for (p, size) in sizes.iter().enumerate() {
        let param = Parameter {
            typ: ParamType::Enum,
            enum_values: (0..*size)
                .map(|v| EnumValue {
                    value: value_name(v),
                    description: None,
                    terraform_value: None,
                })
                .collect(),
            ..Default::default()
        };
        command.parameters.insert(param_name(p), param);
    }
    command.pairwise = Some(PairwiseSpec {
        enabled: true,
        parameters: (0..sizes.len()).map(param_name).collect(),
        parameter_values: IndexMap::new(),
        constraints: constraints
            .iter()
            .map(|terms| PairwiseConstraint {
                name: None,
                when: ConstraintCondition::Match(
                    normalized(terms)
                        .into_iter()
                        .map(|(p, v)| (param_name(p), ParamValue::Text(value_name(v))))
                        .collect(),
                ),
                requires: None,
                invalid_for: vec![],
                priority: None,
            })
            .collect(),
    });
    command
}

fn forbidden(constraints: &[Vec<(usize, usize)>], row: &[usize]) -> bool {
    constraints
        .iter()
        .any(|terms| normalized(terms).iter().all(|(p, v)| row[*p] == *v))
}

/// Every full assignment that breaks no constraint
fn valid_rows((sizes, constraints): &Scenario) -> Vec<Vec<usize>> {
    let mut rows = vec![vec![]];
    for size in sizes {
        rows = rows
            .into_iter()
            .flat_map(|row: Vec<usize>| {
                (0..*size).map(move |v| {
                    let mut next = row.clone();
                    next.push(v);
                    next
                })
            })
            .collect();
    }
    rows.into_iter().filter(|r| !forbidden(constraints, r)).collect()
}

/// Whether a pair is forbidden by a constraint reading only those two parameters
fn directly_forbidden(constraints: &[Vec<(usize, usize)>], i: usize, a: usize, j: usize, b: usize) -> bool {
    constraints.iter().any(|terms| {
        let terms = normalized(terms);
        terms
            .iter()
            .all(|(p, v)| (*p == i && *v == a) || (*p == j && *v == b))
    })
}

fn row_of(combination: &Combination, n: usize) -> Vec<usize> {
    (0..n)
        .map(|p| {
            let text = combination.values[&param_name(p)].to_string();
            text.trim_start_matches('v').parse().unwrap()
        })
        .collect()
}

fn parse_side(side: &str) -> (usize, usize) {
    let (p, v) = side.split_once('=').unwrap();
    (
        p.trim_start_matches('p').parse().unwrap(),
        v.trim_start_matches('v').parse().unwrap(),
    )
}

fn generate(command: &Command) -> rtxspec::Result<Vec<Combination>> {
    let catalog = Catalog::default();
    let resolver = Resolver::new(&catalog);
    PairwiseGenerator::new(&resolver, &LicenseContext::new()).generate(command)
}

proptest! {
    #[test]
    fn test_rows_never_violate_constraints(s in scenario()) {
        let command = build_command(&s);
        if let Ok(rows) = generate(&command) {
            for c in &rows {
                prop_assert!(!forbidden(&s.1, &row_of(c, s.0.len())));
            }
        }
    }

    #[test]
    fn test_every_allowed_pair_is_covered(s in scenario()) {
        let command = build_command(&s);
        if let Ok(rows) = generate(&command) {
            let n = s.0.len();
            let rows: Vec<Vec<usize>> = rows.iter().map(|c| row_of(c, n)).collect();
            for i in 0..n {
                for j in (i + 1)..n {
                    for a in 0..s.0[i] {
                        for b in 0..s.0[j] {
                            if directly_forbidden(&s.1, i, a, j, b) {
                                continue;
                            }
                            prop_assert!(
                                rows.iter().any(|r| r[i] == a && r[j] == b),
                                "pair p{}=v{} p{}=v{} not covered", i, a, j, b
                            );
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_uncoverable_pairs_are_real(s in scenario()) {
        let command = build_command(&s);
        if let Err(err) = generate(&command) {
            let valid = valid_rows(&s);
            for defect in err.defects() {
                match defect {
                    SpecDefect::UncoverablePair { left, right, .. } => {
                        let (i, a) = parse_side(left);
                        let (j, b) = parse_side(right);
                        prop_assert!(!valid.iter().any(|r| r[i] == a && r[j] == b));
                    }
                    other => prop_assert!(false, "unexpected defect {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_generation_is_deterministic(s in scenario()) {
        let command = build_command(&s);
        let first = generate(&command).map_err(|e| e.to_string());
        let second = generate(&command).map_err(|e| e.to_string());
        prop_assert_eq!(first, second);
    }
}

#[test]
fn test_unconstrained_matrix_is_small() {
    let s: Scenario = (vec![3, 3, 3, 3], vec![]);
    let rows = generate(&build_command(&s)).unwrap();
    // 9 pairs per parameter pair is the floor; greedy stays close to it
    assert!(rows.len() >= 9);
    assert!(rows.len() <= 15, "got {} rows", rows.len());
}

#[test]
fn test_single_parameter_is_defect() {
    let mut command = build_command(&(vec![2, 2], vec![]));
    if let Some(p) = command.pairwise.as_mut() {
        p.parameters.truncate(1);
    }
    let err = generate(&command).unwrap_err();
    assert!(matches!(
        err.defects(),
        [SpecDefect::TooFewPairwiseParameters { found: 1 }]
    ));
}

fn pfs_fixture() -> (ProjectConfig, Spec) {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let config = ProjectConfig::load_from_dir(&root).unwrap().unwrap();
    let spec = Spec::load(&root.join("specs").join("ipsec_ike_pfs.yaml")).unwrap();
    (config, spec)
}

fn text(c: &Combination, name: &str) -> String {
    c.values[name].to_string()
}

#[test]
fn test_strict_ikev1_pfs_follows_peer() {
    let (config, spec) = pfs_fixture();
    let resolver = Resolver::new(&config.catalog);
    let rows = PairwiseGenerator::new(&resolver, &LicenseContext::new())
        .generate(&spec.command)
        .unwrap();

    assert!(!rows.is_empty());
    let strict_v1: Vec<&Combination> = rows
        .iter()
        .filter(|c| text(c, "ike_version") == "1" && text(c, "negotiate_strictly") == "on")
        .collect();
    assert!(!strict_v1.is_empty());
    for c in strict_v1 {
        assert_eq!(text(c, "pfs"), text(c, "peer_pfs"), "{:?}", c);
    }

    // Mismatches stay covered where the rule does not apply
    for (pfs, peer) in [("on", "off"), ("off", "on")] {
        assert!(
            rows.iter().any(|c| text(c, "pfs") == pfs && text(c, "peer_pfs") == peer),
            "pfs={} peer_pfs={} not covered",
            pfs,
            peer
        );
    }
}

#[test]
fn test_model_ban_only_on_named_model() {
    let (config, spec) = pfs_fixture();
    let resolver = Resolver::new(&config.catalog);
    let rows = PairwiseGenerator::new(&resolver, &LicenseContext::new())
        .generate(&spec.command)
        .unwrap();

    let strict_v2: Vec<&Combination> = rows
        .iter()
        .filter(|c| text(c, "ike_version") == "2" && text(c, "negotiate_strictly") == "on")
        .collect();
    assert!(!strict_v2.is_empty());
    for c in strict_v2 {
        assert!(!c.models.iter().any(|m| m == "RTX830"), "{:?}", c);
        assert!(c.models.iter().any(|m| m == "RTX1210"));
    }
}

#[test]
fn test_overlapping_rules_need_priorities() {
    let (config, mut spec) = pfs_fixture();
    let pairwise = spec.command.pairwise.as_mut().unwrap();
    pairwise.constraints[0].when = ConstraintCondition::Expr(r#"negotiate_strictly == "on""#.into());
    pairwise.constraints[1].priority = None;

    let resolver = Resolver::new(&config.catalog);
    let err = PairwiseGenerator::new(&resolver, &LicenseContext::new())
        .generate(&spec.command)
        .unwrap_err();
    assert!(matches!(err, Error::Defects(_)));
    assert!(err
        .defects()
        .iter()
        .any(|d| matches!(d, SpecDefect::ConstraintPrecedence { .. })));
}
