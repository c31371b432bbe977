//! Built-in format definitions composed from the spec combinators.

pub mod png;
pub mod zip;
