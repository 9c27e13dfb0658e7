//! hepack library exports for the CLI and integration tests.

pub mod archive;
pub mod commands;
pub mod compose;
pub mod config;
pub mod error;
pub mod partition;
pub mod preflight;
pub mod process;
pub mod recovery;
pub mod rewrite;
pub mod size;
pub mod subsystem;
pub mod table;
pub mod timing;
pub mod tools;
pub mod workspace;

pub use error::ComposeError;
