//! Command implementations for the Trainpack CLI.

pub mod build;
pub mod recipe;
pub mod types;
