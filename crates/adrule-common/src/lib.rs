//! Domain types shared across the rule engine crates.

pub mod id;
pub mod types;
