use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct NetConfig {
    /// Prefix of ids generated for arcs created with `connect_*`.
    #[serde(default = "default_arc_id_prefix")]
    pub arc_id_prefix: String,
    #[serde(default)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pnml,
    Json,
    Ron,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OutputFormat::Pnml => "pnml",
            OutputFormat::Json => "json",
            OutputFormat::Ron => "ron",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pnml" => Ok(OutputFormat::Pnml),
            "json" => Ok(OutputFormat::Json),
            "ron" => Ok(OutputFormat::Ron),
            other => anyhow::bail!("unknown output format `{other}`"),
        }
    }
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            arc_id_prefix: default_arc_id_prefix(),
            output_format: OutputFormat::default(),
        }
    }
}

impl NetConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: NetConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        if config.arc_id_prefix.trim().is_empty() {
            anyhow::bail!("arc_id_prefix in {:?} cannot be blank", path);
        }
        Ok(config)
    }
}

fn default_arc_id_prefix() -> String {
    "arc".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let config = NetConfig::load_from_file("/definitely/not/here/pn.toml").unwrap();
        assert_eq!(config, NetConfig::default());
        assert_eq!(config.arc_id_prefix, "arc");
        assert_eq!(config.output_format, OutputFormat::Pnml);
    }

    #[test]
    fn partial_toml_keeps_remaining_defaults() {
        let config: NetConfig = toml::from_str("output_format = \"ron\"").unwrap();
        assert_eq!(config.output_format, OutputFormat::Ron);
        assert_eq!(config.arc_id_prefix, "arc");

        let config: NetConfig = toml::from_str("arc_id_prefix = \"edge-\"").unwrap();
        assert_eq!(config.arc_id_prefix, "edge-");
    }

    #[test]
    fn output_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::Ron.to_string(), "ron");
    }
}
