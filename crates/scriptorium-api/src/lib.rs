//! The facade operation surface and built-in skill catalog for the
//! scriptorium registry.
//!
//! [`facade::Api`] is the entire contract RPC/CLI/TUI collaborators drive
//! the registry through; [`library`] is the process-wide immutable catalog
//! of skills shipped inside the binary.

pub mod facade;
pub mod library;

pub use facade::Api;
pub use scriptorium_templates::PublishInput;
