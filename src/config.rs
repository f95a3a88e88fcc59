use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use log::LevelFilter;

pub const ENV_LOG_LEVEL: &str = "KB_MCP_LOG_LEVEL";
pub const ENV_LOG_FILE: &str = "KB_MCP_LOG_FILE";
pub const ENV_DISABLED_FORMATS: &str = "KB_MCP_DISABLED_FORMATS";
pub const ENV_XLSX_SAMPLE_ROWS: &str = "KB_MCP_XLSX_SAMPLE_ROWS";
pub const ENV_MAX_COLUMN_WIDTH: &str = "KB_MCP_MAX_COLUMN_WIDTH";

/// Server configuration, built once at startup and passed to every component
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub log_level: LevelFilter,
    /// Optional log file in addition to stderr
    pub log_file: Option<PathBuf>,
    /// Extensions (without the dot, lowercase) to disable regardless of probing
    pub disabled_formats: Vec<String>,
    /// Rows of each sheet shown when extracting a workbook
    pub xlsx_sample_rows: usize,
    /// Cap for auto-sized column widths when formatting a sheet
    pub max_column_width: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            log_level: LevelFilter::Info,
            log_file: None,
            disabled_formats: Vec::new(),
            xlsx_sample_rows: 10,
            max_column_width: 50.0,
        }
    }
}

impl ServerConfig {
    /// Build the configuration from `KB_MCP_*` environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup; unparsable values
    /// fall back to the defaults
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup(ENV_LOG_LEVEL) {
            match LevelFilter::from_str(level.trim()) {
                Ok(level) => config.log_level = level,
                Err(_) => eprintln!("Ignoring invalid {}: {}", ENV_LOG_LEVEL, level),
            }
        }

        if let Some(path) = lookup(ENV_LOG_FILE) {
            if !path.trim().is_empty() {
                config.log_file = Some(PathBuf::from(path.trim()));
            }
        }

        if let Some(formats) = lookup(ENV_DISABLED_FORMATS) {
            config.disabled_formats = parse_format_list(&formats);
        }

        if let Some(rows) = lookup(ENV_XLSX_SAMPLE_ROWS) {
            if let Ok(rows) = rows.trim().parse::<usize>() {
                config.xlsx_sample_rows = rows;
            }
        }

        if let Some(width) = lookup(ENV_MAX_COLUMN_WIDTH) {
            if let Ok(width) = width.trim().parse::<f64>() {
                if width > 0.0 {
                    config.max_column_width = width;
                }
            }
        }

        config
    }

    pub fn is_format_disabled(&self, extension: &str) -> bool {
        self.disabled_formats.iter().any(|f| f == extension)
    }
}

/// Parse a comma-separated list of extensions: ".PDF, docx" -> ["pdf", "docx"]
fn parse_format_list(formats: &str) -> Vec<String> {
    let mut list = Vec::new();
    for part in formats.split(',') {
        let ext = part.trim().trim_start_matches('.').to_lowercase();
        if !ext.is_empty() && !list.contains(&ext) {
            list.push(ext);
        }
    }
    list
}
