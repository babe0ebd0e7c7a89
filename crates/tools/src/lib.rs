//! File-side tooling for facadegw.
//!
//! - [`file_ops`]: project-scoped file store with path-traversal checks
//! - [`patch`]: unified-diff application for `patch` changes
//! - [`roundtrip`]: the start / preview / commit transaction manager

pub mod file_ops;
pub mod patch;
pub mod roundtrip;

pub use file_ops::{FileStore, LocalFileStore, LocalProjects, ProjectFiles};
pub use roundtrip::{RoundtripSettings, TransactionManager};
