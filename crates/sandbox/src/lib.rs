//! Sandboxed code execution for facadegw.
//!
//! The [`ExecutionOrchestrator`] picks providers from a priority-ordered
//! [`ProviderRegistry`], falls back on transient provider failures and stops
//! on anything the submitted code itself caused.

pub mod container;
pub mod language;
pub mod managed;
pub mod orchestrator;
pub mod process;
pub mod provider;
pub mod registry;

pub use orchestrator::ExecutionOrchestrator;
pub use provider::{
    ExecMode, ExecutionOutput, ExecutionRequest, Limits, ProviderDescriptor, ProviderError,
    SandboxProvider,
};
pub use registry::ProviderRegistry;
