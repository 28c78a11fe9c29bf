//! Output formatting for the truth-gate CLI

pub mod output;

pub use output::{parse_value, CatalogOutput, OutputFormat, Render, VerifyOutput};
