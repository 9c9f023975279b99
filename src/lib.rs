// Production-quality lints
#![warn(
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
// Deny truly dangerous patterns
#![deny(clippy::mem_forget)]
// Allow common patterns in library code
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! # rtxspec: declarative router command specifications
//!
//! One YAML document per command family describes the command's syntax,
//! its parameters (with per-model limits and license extensions) and the
//! tests declared against it. From that single description rtxspec derives:
//!
//! - **Validators**: the effective domain of every parameter per model and
//!   license context ([`Resolver`], [`EffectiveDomain::check`])
//! - **Boundary cases** around every range, enum and license tier
//!   ([`BoundaryExpander`])
//! - **Pairwise matrices** that respect declared constraints
//!   ([`PairwiseGenerator`])
//! - **Round-trip checks** between command text and structured fields
//!   ([`RoundTripValidator`])
//! - **Field mappings** for the structured schema ([`FieldEmitter`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rtxspec::{Catalog, GenerationConfig, Generator, LicenseContext, Spec};
//!
//! let spec = Spec::from_yaml(r#"
//! command:
//!   name: ipsec ike keepalive log
//!   syntax:
//!     set: "ipsec ike keepalive log <gateway_id> <log>"
//!   parameters:
//!     gateway_id: { type: int, range: [1, 1000] }
//!     log: { type: switch }
//!   syntax_tests:
//!     - name: on
//!       rtx: "ipsec ike keepalive log 1 on"
//!       terraform: { gateway_id: 1, log: "on" }
//! "#)?;
//!
//! let catalog = Catalog::default();
//! let generator = Generator::new(&catalog, GenerationConfig::default())
//!     .with_license(LicenseContext::new().with("YSL-VPN-EX2", 2));
//! let artifacts = generator.generate(&spec.command)?;
//! assert!(artifacts.round_trips_pass());
//! ```
//!
//! ## Errors
//!
//! Specification defects ([`SpecDefect`]) are never patched over; they
//! abort generation for the command that carries them. Missing data that
//! prevents auto-derivation is a [`CoverageGap`], fatal unless the project
//! config allows gaps. Round-trip failures are outcomes, not errors.

// Model and configuration
pub mod config;
pub mod error;
pub mod spec;
pub mod util;

// Resolution and expressions
pub mod cel;
pub mod resolve;

// Generators
pub mod boundary;
pub mod fields;
pub mod pairwise;
pub mod roundtrip;
pub mod syntax;

// Orchestration
pub mod generate;
pub mod validate;

// Re-exports
pub use boundary::{BoundaryExpander, BoundaryExpansion, CaseOrigin, ConcreteBoundaryCase};
pub use config::{Catalog, GenerationConfig, LicenseContext, LicenseTable, ModelInfo, ProjectConfig};
pub use error::{CoverageGap, Error, GapKind, ResolveError, Result, SpecDefect};
pub use fields::{FieldDescriptor, FieldEmitter, FieldMapping, FieldTable, VariantBranch};
pub use generate::{BatchOutcome, CommandArtifacts, Generator};
pub use pairwise::{Combination, PairwiseGenerator};
pub use resolve::{
    check_availability, validate_values, DomainKind, EffectiveDomain, LicenseGrant, LicenseTier,
    Resolver, ValueError,
};
pub use roundtrip::{Direction, DirectionFailure, RoundTripOutcome, RoundTripStatus, RoundTripValidator};
pub use spec::{
    Command, ParamType, ParamValue, Parameter, Range, Spec, Structured, SwitchState, SyntaxForm,
    SyntaxMode, SyntaxTest, Variant,
};
pub use syntax::{SyntaxCodec, Template};
pub use validate::{validate_command, Severity, ValidationIssue, ValidationReport};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
