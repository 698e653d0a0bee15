//! Optional config file loading. Search order: ./nmdcharvest.toml, then
//! $XDG_CONFIG_HOME/nmdcharvest/config.toml (or ~/.config/nmdcharvest/config.toml).

use serde::Deserialize;
use std::path::PathBuf;

/// Config file contents. All fields optional; only present keys override
/// defaults. CLI flags override config.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Config {
    /// Default output directory when -o is not set. Paths are relative to CWD.
    pub output_dir: Option<PathBuf>,
    /// HTTP User-Agent header.
    pub user_agent: Option<String>,
    /// Override the API endpoint URL.
    pub endpoint: Option<String>,
    /// Pacing delay in milliseconds between requests.
    pub request_delay_ms: Option<u64>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Total HTTP attempts per page (1 = no retry).
    pub retry_count: Option<u32>,
    /// Delay in seconds before each retry (e.g. [1, 2, 4]). If shorter than
    /// the retry count, the last value is reused.
    pub retry_backoff_secs: Option<Vec<u64>>,
    /// Records requested per page.
    pub page_size: Option<u32>,
    /// Cap on pages harvested per category.
    pub max_pages: Option<u32>,
}

/// Search order: (1) ./nmdcharvest.toml, (2) $XDG_CONFIG_HOME/nmdcharvest/config.toml.
/// Missing file returns Ok(None). Invalid TOML or I/O error reading a present file returns Err.
pub fn load_config() -> Result<Option<Config>, String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Cannot determine current directory: {}", e))?;
    let mut paths = vec![cwd.join("nmdcharvest.toml")];
    if let Some(d) = dirs::config_dir() {
        paths.push(d.join("nmdcharvest").join("config.toml"));
    }
    for path in &paths {
        if path.exists() {
            let s = std::fs::read_to_string(path)
                .map_err(|e| format!("Cannot read config {}: {}", path.display(), e))?;
            let config: Config = toml::from_str(&s)
                .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;
            return Ok(Some(config));
        }
    }
    Ok(None)
}
