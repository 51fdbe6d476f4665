//! CLI command definitions

use clap::Args;

/// Run a pipeline
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Seed variables written into the state store before the first node
    /// (key=value; values parse as JSON when possible)
    #[arg(long = "set", value_parser = parse_key_value)]
    pub set: Vec<(String, String)>,

    /// Print the final state as JSON
    #[arg(long)]
    pub json: bool,

    /// Suppress per-node progress output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Connect declared providers and list their tool catalogs
#[derive(Debug, Args, Clone)]
pub struct ToolsCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: String,

    /// Only connect this provider
    #[arg(short, long)]
    pub provider: Option<String>,
}

/// Parse key=value pairs
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let parts: Vec<&str> = s.splitn(2, '=').collect();
    if parts.len() != 2 {
        return Err(format!("Invalid key=value pair: {}", s));
    }
    Ok((parts[0].to_string(), parts[1].to_string()))
}
