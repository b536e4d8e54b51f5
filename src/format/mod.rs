//! Output formatters for lifted programs.

mod json;

pub use self::json::JsonFormatter;

use std::fmt;

use clap::ValueEnum;

use crate::{LiftError, Program};

/// Supported output formats for lifted programs
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Plain text dump (default)
    Text,
    /// JSON format (hierarchical)
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl OutputFormat {
    /// Get a formatter for this output format
    pub fn formatter(&self) -> Box<dyn ProgramFormatter> {
        match self {
            OutputFormat::Text => Box::new(TextFormatter),
            OutputFormat::Json => Box::new(JsonFormatter),
        }
    }
}

/// Formatter trait for lifted program output
pub trait ProgramFormatter {
    /// Format a lifted program
    fn format(&self, program: &Program) -> Result<String, LiftError>;
}

/// Format a lifted program as plain text
pub struct TextFormatter;

impl ProgramFormatter for TextFormatter {
    fn format(&self, program: &Program) -> Result<String, LiftError> {
        let mut output = String::new();
        for (i, func) in program.functions.iter().enumerate() {
            if i != 0 {
                output.push('\n');
            }
            output.push_str(&format!("{}() {{\n", func.name()));
            for (k, block) in program.function_blocks(func).enumerate() {
                if k != 0 {
                    output.push('\n');
                }
                output.push_str(&format!("{block}\n"));
            }
            output.push_str("}\n");
        }
        Ok(output)
    }
}
