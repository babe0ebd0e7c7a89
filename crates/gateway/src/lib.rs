pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod dispatcher;
pub mod handlers;
pub mod rate_limit;
pub mod registry;
pub mod state;
pub mod store;
