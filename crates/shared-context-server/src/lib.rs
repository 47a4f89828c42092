//! Tool/resource surface, transports, configuration, and process bootstrap
//! for the shared-context coordination server.

pub mod app;
pub mod cli;
pub mod config;
pub mod http;
pub mod logging;
pub mod resources;
pub mod stdio;
pub mod tools;
