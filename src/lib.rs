pub mod commands;
pub mod config;
pub mod error;
pub mod manifest;
pub mod module;
pub mod registry;
pub mod runtime;
pub mod version;
pub mod wpcli;
