//! Configuration module
//!
//! Engine settings, CLI argument definitions, and size parsing.

mod settings;

pub use settings::*;
