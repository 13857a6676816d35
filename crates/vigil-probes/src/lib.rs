//! Vigil Probes - the outside world for the Vigil engine
//!
//! Provides:
//! - a command runner that executes check probes as child processes
//! - discovery of the target inventory from a JSON file
//! - check definitions loaded from a directory of JSON files

pub mod definitions;
pub mod discovery;
pub mod process;

pub use definitions::DirectoryDefinitionSource;
pub use discovery::FileDiscovery;
pub use process::{ProbeRequest, ProcessRunner};
