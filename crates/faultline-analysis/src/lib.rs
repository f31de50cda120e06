//! # faultline-analysis: What to inject, and where
//!
//! - [`AnalysisFile`]: named [`AnalysisConfiguration`]s mapping call
//!   signatures to candidate [`Fault`]s
//! - [`TransformerRegistry`]: value transformers for response-altering faults
//! - [`FaultRegistry`]: per-transport construction of injected errors
//! - [`TestExecutionDocument`]: counterexample replay

mod configuration;
mod counterexample;
mod error;
mod fault;
mod registry;
mod transformer;

pub use configuration::{
    AnalysisConfiguration, AnalysisConfigurationBuilder, AnalysisFile, ErrorFault,
    TransformerEntry,
};
pub use counterexample::{FailureRecord, TestExecutionDocument};
pub use error::{AnalysisError, AnalysisResult};
pub use fault::{ExceptionFault, Fault, FaultKind, LatencyFault, LatencyScope, TransformerFault};
pub use registry::FaultRegistry;
pub use transformer::{
    BooleanAsStringTransformer, ByteArrayTransformer, ByzantineStringTransformer,
    IntegerAsStringTransformer, JsonObjectTransformer, StringTransformer, TransformerRegistry,
    ValueTransformer,
};
