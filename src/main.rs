//! rtxspec CLI - Command-line interface
//!
//! Commands:
//!   validate  - Check a spec for defects and coverage gaps
//!   resolve   - Show effective parameter domains (optionally check values)
//!   boundary  - Expand boundary cases
//!   pairwise  - Generate the pairwise matrix
//!   roundtrip - Run syntax round-trip tests
//!   fields    - Emit structured field mappings
//!   generate  - Produce all artifacts for a spec or a directory of specs

use indexmap::IndexMap;
use rtxspec::config::CONFIG_FILE;
use rtxspec::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        return ExitCode::from(1);
    }

    let result = match args[1].as_str() {
        "validate" => cmd_validate(&args[2..]),
        "resolve" => cmd_resolve(&args[2..]),
        "boundary" => cmd_boundary(&args[2..]),
        "pairwise" => cmd_pairwise(&args[2..]),
        "roundtrip" => cmd_roundtrip(&args[2..]),
        "fields" => cmd_fields(&args[2..]),
        "generate" => cmd_generate(&args[2..]),
        "schema" => cmd_schema(&args[2..]),
        "version" | "--version" | "-v" => {
            println!("rtxspec {}", VERSION);
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        cmd => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            Err("Unknown command".into())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}

fn print_usage() {
    println!(
        r#"
rtxspec - Declarative router command specifications

USAGE:
    rtxspec <COMMAND> [OPTIONS]

COMMANDS:
    validate <spec.yaml> [--strict]   Check a spec for defects and coverage gaps
    resolve <spec.yaml> [--value f=v] Show effective domains; check values with --value
    boundary <spec.yaml>              Expand boundary cases
    pairwise <spec.yaml>              Generate the pairwise matrix
    roundtrip <spec.yaml>             Run syntax round-trip tests
    fields <spec.yaml>                Emit structured field mappings
    generate <spec.yaml|dir>          Produce all artifacts (directory: batch)
    schema [name]                     Print JSON schema for an output type
    version                           Print version

OPTIONS:
    --config <file>       Project config (default: ./{config})
    --model <name>        Restrict to one model (repeatable)
    --license <SKU[=N]>   Hold N copies of a license (repeatable; default N=1)
    --output <file>       Output file (default: stdout)
    --json                JSON output format
    --strict              Treat coverage gaps as errors (validate)

ENVIRONMENT:
    RUST_LOG              Log filter, e.g. RUST_LOG=rtxspec=debug

EXAMPLES:
    rtxspec validate specs/ipsec_ike_keepalive_use.yaml
    rtxspec boundary specs/ipsec_ike_remote_address.yaml --license YSL-VPN-EX2=3 --json
    rtxspec resolve specs/ipsec_ike_remote_address.yaml --model RTX1210 --value gateway_id=701 --value address=192.0.2.1
    rtxspec generate specs/ --output artifacts.json
"#,
        config = CONFIG_FILE
    );
}

fn cmd_validate(args: &[String]) -> Result<()> {
    let spec_path = spec_arg(args, "validate <spec.yaml> [--strict] [--json]")?;
    let strict = has_flag(args, "--strict");
    let (spec, config) = load_inputs(spec_path, args)?;
    let license = license_arg(args, &config)?;

    let report = validate_command(&spec.command, &config.catalog, &license, strict);

    if has_flag(args, "--json") {
        write_output(&parse_output_arg(args), &serde_json::to_string_pretty(&report)?)?;
    } else {
        print_validation_report(&report, spec_path);
    }

    if report.is_valid {
        Ok(())
    } else {
        Err("Validation failed".into())
    }
}

fn print_validation_report(report: &ValidationReport, spec_path: &str) {
    if report.issues.is_empty() {
        println!("✓ {}: valid (no issues found)", spec_path);
        return;
    }

    let mark = if report.is_valid { "✓" } else { "✗" };
    println!(
        "{} {}: {} error(s), {} warning(s)\n",
        mark, spec_path, report.error_count, report.warning_count
    );

    for (label, severity) in [("ERRORS", Severity::Error), ("WARNINGS", Severity::Warning)] {
        let issues: Vec<_> = report.issues.iter().filter(|i| i.severity == severity).collect();
        if issues.is_empty() {
            continue;
        }
        println!("{}:", label);
        for issue in issues {
            println!("  [{}] {}", issue.code, issue.message);
            if let Some(suggestion) = &issue.suggestion {
                println!("         Suggestion: {}", suggestion);
            }
        }
        println!();
    }
}

fn cmd_resolve(args: &[String]) -> Result<()> {
    let spec_path = spec_arg(args, "resolve <spec.yaml> [--model M] [--license SKU=N] [--value field=value]")?;
    let (spec, config) = load_inputs(spec_path, args)?;
    let license = license_arg(args, &config)?;
    let resolver = Resolver::new(&config.catalog);
    let command = &spec.command;
    let models = model_targets(args, command);

    let values = flag_values(args, "--value");
    if !values.is_empty() {
        let mut structured = IndexMap::new();
        for pair in values {
            let (field, value) = pair
                .split_once('=')
                .ok_or_else(|| Error::Other(format!("--value expects field=value, got '{}'", pair)))?;
            structured.insert(field.to_string(), ParamValue::Text(value.to_string()));
        }

        let mut all_valid = true;
        for model in &models {
            let rejected = validate_values(&resolver, command, &structured, model.as_deref(), &license)?;
            let label = model.as_deref().unwrap_or("*");
            if rejected.is_empty() {
                println!("✓ {}: accepted", label);
            } else {
                all_valid = false;
                for r in rejected {
                    println!("✗ {}: {}", label, r);
                }
            }
        }
        return if all_valid {
            Ok(())
        } else {
            Err("Values rejected".into())
        };
    }

    let mut domains = Vec::new();
    for model in &models {
        for (name, param) in &command.parameters {
            match resolver.resolve(name, param, model.as_deref(), &license) {
                Ok(domain) => domains.push(domain),
                Err(ResolveError::Unsupported { reason, .. }) => {
                    if !has_flag(args, "--json") {
                        println!("{} on {}: unsupported ({})", name, model.as_deref().unwrap_or("*"), reason);
                    }
                }
                Err(ResolveError::Defect(d)) => return Err(d.into()),
            }
        }
    }

    if has_flag(args, "--json") {
        write_output(&parse_output_arg(args), &serde_json::to_string_pretty(&domains)?)?;
    } else {
        for d in &domains {
            println!("{} on {}: {}", d.parameter, d.model.as_deref().unwrap_or("*"), describe_domain(d));
        }
    }
    Ok(())
}

fn describe_domain(domain: &EffectiveDomain) -> String {
    let shape = match &domain.kind {
        DomainKind::Range { range: Some(r) } => format!("int {}", r),
        DomainKind::Range { range: None } => "int (unbounded)".into(),
        DomainKind::Enum { values, .. } => format!("one of [{}]", values.join(", ")),
        DomainKind::Switch { states, .. } => format!(
            "switch [{}]",
            states.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", ")
        ),
        DomainKind::Variants { variants } => format!(
            "variants [{}]",
            variants.iter().map(|v| v.name.as_str()).collect::<Vec<_>>().join(", ")
        ),
        DomainKind::Scalar { typ, pattern: Some(p) } => format!("{} matching {}", typ, p),
        DomainKind::Scalar { typ, pattern: None } => typ.to_string(),
    };
    match &domain.applied_license {
        Some(grant) => format!("{} (with {} x{})", shape, grant.sku, grant.quantity),
        None => shape,
    }
}

fn cmd_boundary(args: &[String]) -> Result<()> {
    let spec_path = spec_arg(args, "boundary <spec.yaml> [--model M] [--license SKU=N] [--json]")?;
    let (spec, config) = load_inputs(spec_path, args)?;
    let license = license_arg(args, &config)?;
    let resolver = Resolver::new(&config.catalog);

    let models = flag_values(args, "--model");
    let expander = if models.is_empty() {
        BoundaryExpander::for_command(&resolver, &spec.command, &config.generation.out_of_set_token)
    } else {
        BoundaryExpander::new(&resolver, &models, &config.generation.out_of_set_token)
    };
    let expansions = expander.expand_command(&spec.command, &license)?;

    if has_flag(args, "--json") {
        return write_output(&parse_output_arg(args), &serde_json::to_string_pretty(&expansions)?);
    }

    for expansion in &expansions {
        println!("{}:", expansion.parameter);
        for case in &expansion.cases {
            let mark = if case.expected_valid { "valid  " } else { "invalid" };
            let mut line = format!("  {} {}", mark, case.value);
            if let Some(model) = &case.model {
                line.push_str(&format!(" on {}", model));
            }
            if let Some(grant) = &case.license {
                line.push_str(&format!(" with {} x{}", grant.sku, grant.quantity));
            }
            if let Some(description) = &case.description {
                line.push_str(&format!("  ({})", description));
            }
            println!("{}", line);
        }
        for gap in &expansion.gaps {
            println!("  gap: {}", gap);
        }
    }
    Ok(())
}

fn cmd_pairwise(args: &[String]) -> Result<()> {
    let spec_path = spec_arg(args, "pairwise <spec.yaml> [--license SKU=N] [--json]")?;
    let (spec, config) = load_inputs(spec_path, args)?;
    let license = license_arg(args, &config)?;
    let resolver = Resolver::new(&config.catalog);

    let combinations = PairwiseGenerator::new(&resolver, &license).generate(&spec.command)?;

    if has_flag(args, "--json") {
        return write_output(&parse_output_arg(args), &serde_json::to_string_pretty(&combinations)?);
    }

    for (i, c) in combinations.iter().enumerate() {
        let values: Vec<String> = c.values.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        if c.models.is_empty() {
            println!("{:>3}. {}", i + 1, values.join(" "));
        } else {
            println!("{:>3}. {}  [{}]", i + 1, values.join(" "), c.models.join(", "));
        }
    }
    println!("{} combination(s)", combinations.len());
    Ok(())
}

fn cmd_roundtrip(args: &[String]) -> Result<()> {
    let spec_path = spec_arg(args, "roundtrip <spec.yaml> [--license SKU=N] [--json]")?;
    let (spec, config) = load_inputs(spec_path, args)?;
    let license = license_arg(args, &config)?;
    let resolver = Resolver::new(&config.catalog);

    let outcomes = RoundTripValidator::new(&spec.command, &resolver, &license)?.verify_all()?;

    if has_flag(args, "--json") {
        write_output(&parse_output_arg(args), &serde_json::to_string_pretty(&outcomes)?)?;
    } else {
        for o in &outcomes {
            let model = o.model.as_deref().map(|m| format!(" [{}]", m)).unwrap_or_default();
            match &o.status {
                RoundTripStatus::Passed => println!("✓ {}{}", o.name, model),
                RoundTripStatus::Skipped { reason } => println!("- {}{}: skipped ({})", o.name, model, reason),
                RoundTripStatus::Failed { failures } => {
                    println!("✗ {}{}", o.name, model);
                    for f in failures {
                        let line = f.line.map(|n| format!(" line {}", n)).unwrap_or_default();
                        println!("    {:?}{}", f.direction, line);
                        println!("      expected: {}", f.expected);
                        println!("      actual:   {}", f.actual);
                    }
                }
            }
        }
    }

    if outcomes.iter().any(|o| o.failed()) {
        Err("Round-trip failures".into())
    } else {
        Ok(())
    }
}

fn cmd_fields(args: &[String]) -> Result<()> {
    let spec_path = spec_arg(args, "fields <spec.yaml> [--json]")?;
    let (spec, _) = load_inputs(spec_path, args)?;

    let table = FieldEmitter::new().emit_all(&spec.command)?;

    if has_flag(args, "--json") {
        return write_output(&parse_output_arg(args), &serde_json::to_string_pretty(&table)?);
    }

    for (name, mapping) in &table.parameters {
        match mapping {
            FieldMapping::Single { field } => {
                println!("{} -> {} ({}) {}", name, field.name, field.typ, field.struct_name);
            }
            FieldMapping::Discriminated { selector, branches } => {
                println!("{} -> selected by {}", name, selector.name);
                for b in branches {
                    let fields: Vec<&str> = b.fields.iter().map(|f| f.name.as_str()).collect();
                    println!("    {}={}: {}", selector.name, b.when, fields.join(", "));
                }
            }
        }
    }
    Ok(())
}

fn cmd_generate(args: &[String]) -> Result<()> {
    let path = spec_arg(args, "generate <spec.yaml|dir> [--license SKU=N] [--output file]")?;
    let config = load_config(args)?;
    let license = license_arg(args, &config)?;
    let generator = Generator::new(&config.catalog, config.generation.clone()).with_license(license);
    let output = parse_output_arg(args);

    let path = Path::new(path);
    if path.is_dir() {
        let specs = load_dir(path)?;
        let commands: Vec<Command> = specs.into_iter().map(|s| s.command).collect();
        let outcomes = generator.generate_batch(&commands);
        let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
        write_output(&output, &serde_json::to_string_pretty(&outcomes)?)?;
        eprintln!("{} command(s), {} failed", outcomes.len(), failed);
        return if failed == 0 {
            Ok(())
        } else {
            Err(format!("{} command(s) failed", failed).into())
        };
    }

    let spec = Spec::load(path)?;
    let artifacts = generator.generate(&spec.command)?;
    write_output(&output, &serde_json::to_string_pretty(&artifacts)?)?;
    if artifacts.round_trips_pass() {
        Ok(())
    } else {
        Err("Round-trip failures".into())
    }
}

fn cmd_schema(args: &[String]) -> Result<()> {
    let schema_name = args.first().map(|s| s.as_str()).unwrap_or("list");

    match schema_name {
        "list" => {
            println!(
                "Available schemas: spec, config, domain, boundary, pairwise, roundtrip, fields, artifacts, validate"
            );
            Ok(())
        }
        "spec" => print_schema::<Spec>(),
        "config" => print_schema::<ProjectConfig>(),
        "domain" => print_schema::<EffectiveDomain>(),
        "boundary" => print_schema::<BoundaryExpansion>(),
        "pairwise" => print_schema::<Combination>(),
        "roundtrip" => print_schema::<RoundTripOutcome>(),
        "fields" => print_schema::<FieldTable>(),
        "artifacts" => print_schema::<CommandArtifacts>(),
        "validate" => print_schema::<ValidationReport>(),
        _ => Err(format!("Unknown schema: {}", schema_name).into()),
    }
}

fn print_schema<T: schemars::JsonSchema>() -> Result<()> {
    let schema = schemars::schema_for!(T);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

fn spec_arg<'a>(args: &'a [String], usage: &str) -> Result<&'a str> {
    match args.first() {
        Some(a) if !a.starts_with("--") => Ok(a),
        _ => Err(format!("Usage: rtxspec {}", usage).into()),
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

/// Every value following a repeatable option
fn flag_values(args: &[String], flag: &str) -> Vec<String> {
    args.iter()
        .enumerate()
        .filter(|(_, a)| *a == flag)
        .filter_map(|(i, _)| args.get(i + 1).cloned())
        .collect()
}

fn parse_output_arg(args: &[String]) -> Option<PathBuf> {
    for (i, arg) in args.iter().enumerate() {
        if arg == "--output" || arg == "-o" {
            if let Some(path) = args.get(i + 1) {
                return Some(PathBuf::from(path));
            }
        }
    }
    None
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content).map_err(Error::Io)?;
            eprintln!("Written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

/// `--config`, else `.rtxspec.yaml` in the working directory, else defaults
fn load_config(args: &[String]) -> Result<ProjectConfig> {
    if let Some(path) = flag_values(args, "--config").first() {
        return ProjectConfig::load(Path::new(path));
    }
    let cwd = std::env::current_dir().map_err(Error::Io)?;
    Ok(ProjectConfig::load_from_dir(&cwd)?.unwrap_or_default())
}

fn load_inputs(spec_path: &str, args: &[String]) -> Result<(Spec, ProjectConfig)> {
    let spec = Spec::load(Path::new(spec_path))?;
    let config = load_config(args)?;
    Ok((spec, config))
}

/// Configured license context with `--license` grants applied on top
fn license_arg(args: &[String], config: &ProjectConfig) -> Result<LicenseContext> {
    let mut license = config.generation.license.clone();
    for grant in flag_values(args, "--license") {
        let (sku, quantity) = LicenseContext::parse_grant(&grant)?;
        license = license.with(sku, quantity);
    }
    Ok(license)
}

/// `--model` targets, else the command's models, else model-agnostic
fn model_targets(args: &[String], command: &Command) -> Vec<Option<String>> {
    let explicit = flag_values(args, "--model");
    let models = if explicit.is_empty() {
        command.applicable_models.clone()
    } else {
        explicit
    };
    if models.is_empty() {
        vec![None]
    } else {
        models.into_iter().map(Some).collect()
    }
}

/// Every spec file in a directory, sorted by file name
fn load_dir(dir: &Path) -> Result<Vec<Spec>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(Error::Io)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .is_some_and(|e| e == "yaml" || e == "yml" || e == "json")
                && p.file_name().is_some_and(|n| n != CONFIG_FILE)
        })
        .collect();
    paths.sort();

    paths.iter().map(|p| Spec::load(p)).collect()
}
