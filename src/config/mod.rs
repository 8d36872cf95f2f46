//! Configuration management
//!
//! Node settings come from built-in defaults, an optional TOML file and
//! environment overrides, in that order. CLI flags are applied on top by the binary.

pub mod settings;

pub use settings::{Config, DEFAULT_BOOTSTRAP_ADDR, DEFAULT_NODE_ADDR};
