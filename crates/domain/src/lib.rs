//! Shared vocabulary for the facadegw workspace: error taxonomy, envelope
//! types, typed commands, configuration and trace events.

pub mod command;
pub mod config;
pub mod envelope;
pub mod error;
pub mod trace;
