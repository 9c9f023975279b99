//! Generation of all artifacts for one command or a batch
//!
//! A [`Generator`] owns a resolver over the project catalog and runs every
//! generator against a command: boundary expansion, pairwise combinations,
//! syntax round trips and field mappings. In a batch, each command's result
//! is isolated, so a defective command never aborts the others.

use crate::boundary::{BoundaryExpander, ConcreteBoundaryCase};
use crate::config::{Catalog, GenerationConfig, LicenseContext};
use crate::error::{CoverageGap, Error, Result, SpecDefect};
use crate::fields::{FieldEmitter, FieldTable};
use crate::pairwise::{Combination, PairwiseGenerator};
use crate::resolve::Resolver;
use crate::roundtrip::{RoundTripOutcome, RoundTripValidator};
use crate::spec::Command;
use crate::validate::ensure_valid;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything generated for one command
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CommandArtifacts {
    pub command: String,
    /// Fingerprint of the command the artifacts were generated from
    pub spec_hash: String,
    pub boundary_cases: Vec<ConcreteBoundaryCase>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub coverage_gaps: Vec<CoverageGap>,
    pub combinations: Vec<Combination>,
    pub round_trips: Vec<RoundTripOutcome>,
    pub fields: FieldTable,
}

impl CommandArtifacts {
    /// Whether every round trip passed or was skipped
    pub fn round_trips_pass(&self) -> bool {
        self.round_trips.iter().all(|o| !o.failed())
    }
}

/// Per-command result of a batch run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BatchOutcome {
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<CommandArtifacts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defects: Vec<SpecDefect>,
}

impl BatchOutcome {
    fn from_result(command: &Command, result: Result<CommandArtifacts>) -> Self {
        match result {
            Ok(artifacts) => Self {
                command: command.name.clone(),
                artifacts: Some(artifacts),
                error: None,
                defects: Vec::new(),
            },
            Err(e) => Self {
                command: command.name.clone(),
                artifacts: None,
                defects: e.defects().to_vec(),
                error: Some(e.to_string()),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        self.artifacts.is_some()
    }
}

/// Runs every generator over commands
pub struct Generator<'c> {
    catalog: &'c Catalog,
    config: GenerationConfig,
    resolver: Resolver<'c>,
}

impl<'c> Generator<'c> {
    pub fn new(catalog: &'c Catalog, config: GenerationConfig) -> Self {
        Self {
            catalog,
            config,
            resolver: Resolver::new(catalog),
        }
    }

    /// Replace the configured license context
    pub fn with_license(mut self, license: LicenseContext) -> Self {
        self.config.license = license;
        self
    }

    pub fn license(&self) -> &LicenseContext {
        &self.config.license
    }

    pub fn resolver(&self) -> &Resolver<'c> {
        &self.resolver
    }

    /// Generate the artifacts of one command
    ///
    /// Defects and (unless allowed) coverage gaps are errors; round-trip
    /// failures are recorded in the artifacts.
    pub fn generate(&self, command: &Command) -> Result<CommandArtifacts> {
        ensure_valid(command, self.catalog)?;
        let license = &self.config.license;

        let expander =
            BoundaryExpander::for_command(&self.resolver, command, &self.config.out_of_set_token);
        let expansions = expander.expand_command(command, license)?;
        let mut boundary_cases = Vec::new();
        let mut coverage_gaps = Vec::new();
        for expansion in expansions {
            boundary_cases.extend(expansion.cases);
            coverage_gaps.extend(expansion.gaps);
        }
        if !coverage_gaps.is_empty() {
            if !self.config.allow_coverage_gaps {
                return Err(Error::CoverageGaps(coverage_gaps));
            }
            warn!(
                command = %command.name,
                gaps = coverage_gaps.len(),
                "coverage gaps allowed by configuration"
            );
        }

        let combinations = PairwiseGenerator::new(&self.resolver, license).generate(command)?;
        let round_trips = RoundTripValidator::new(command, &self.resolver, license)?.verify_all()?;
        let fields = FieldEmitter::new().emit_all(command)?;

        info!(
            command = %command.name,
            boundary_cases = boundary_cases.len(),
            combinations = combinations.len(),
            round_trips = round_trips.len(),
            "generated artifacts"
        );

        Ok(CommandArtifacts {
            command: command.name.clone(),
            spec_hash: command.hash(),
            boundary_cases,
            coverage_gaps,
            combinations,
            round_trips,
            fields,
        })
    }

    /// Generate every command, isolating failures per command
    ///
    /// With `generation.parallel` the commands are spread over scoped
    /// threads sharing one resolver. Output order follows input order.
    pub fn generate_batch(&self, commands: &[Command]) -> Vec<BatchOutcome> {
        let run = |command: &Command| {
            let outcome = BatchOutcome::from_result(command, self.generate(command));
            if let Some(error) = &outcome.error {
                warn!(command = %command.name, %error, "generation failed");
            }
            outcome
        };

        if !self.config.parallel || commands.len() < 2 {
            return commands.iter().map(run).collect();
        }

        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(commands.len());
        let chunk = commands.len().div_ceil(workers);

        std::thread::scope(|scope| {
            let handles: Vec<_> = commands
                .chunks(chunk)
                .map(|part| scope.spawn(move || part.iter().map(run).collect::<Vec<_>>()))
                .collect();

            let mut outcomes = Vec::with_capacity(commands.len());
            for (handle, part) in handles.into_iter().zip(commands.chunks(chunk)) {
                match handle.join() {
                    Ok(done) => outcomes.extend(done),
                    Err(_) => outcomes.extend(part.iter().map(|c| BatchOutcome {
                        command: c.name.clone(),
                        artifacts: None,
                        error: Some("generation panicked".into()),
                        defects: Vec::new(),
                    })),
                }
            }
            outcomes
        })
    }
}
