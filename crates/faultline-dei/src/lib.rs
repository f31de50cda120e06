//! # faultline-dei: Distributed execution indices
//!
//! Identifies every remote call of a workflow execution so the "same" call
//! can be found again in later executions, despite nondeterminism in how
//! many calls happen and in which order.
//!
//! ```text
//! interceptor ─► CallsiteExtractor ─► KeyEncoder ─► ExecutionIndex.push
//!                  (stack + filter)    (V1 / V2)        │
//!                                                       ▼
//!                                        serialized index attached to call
//! ```
//!
//! - [`VectorClock`]: per-scope logical clock
//! - [`CallsiteExtractor`]: origin of a call in user code
//! - [`ExecutionIndex`]: the path of `(key, occurrence)` segments
//! - [`KeyEncoder`]: flat ([`FlatEncoder`]) or structured ([`StructuredEncoder`]) keys
//! - [`ScopeRegistry`]: per-request index and clock, keyed by correlation id

pub mod callsite;
pub mod encoding;
mod error;
pub mod imports;
pub mod index;
pub mod scope;
pub mod vector_clock;

pub use callsite::{
    ArgumentsDescriptor, BacktraceSource, CallTarget, Callsite, CallsiteExtractor,
    DEFAULT_INFRASTRUCTURE_NAMESPACES, FrameFilter, RecordedStack, StackSource,
};
pub use encoding::{
    ComponentOptions, FlatEncoder, IndexOptions, IndexVersion, KeyEncoder, StructuredEncoder,
    digest,
};
pub use error::{CallsiteError, CallsiteResult, DeiError, DeiResult};
pub use imports::{CargoManifestImports, ImportedLibraries, NoImports};
pub use index::{ExecutionIndex, Segment};
pub use scope::{RequestScope, ScopeRegistry};
pub use vector_clock::VectorClock;
