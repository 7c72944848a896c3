//! Compiler configuration (`recipec.yaml`).
//!
//! ```yaml
//! search_paths:
//!   - /opt/recipes
//! defaults:
//!   tomcat.port: 8080
//! validate: true
//! max_overrides_bytes: 20480
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use std::path::{Path, PathBuf};

/// Default configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "recipec.yaml";

/// Colon-separated extra search roots.
pub const SEARCH_PATH_ENV: &str = "RECIPEC_SEARCH_PATH";

const DEFAULT_MAX_OVERRIDES_BYTES: u64 = 20 * 1024;

fn default_true() -> bool {
    true
}

fn default_max_overrides_bytes() -> u64 {
    DEFAULT_MAX_OVERRIDES_BYTES
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    /// Roots searched for `extend` targets after the recipe's own directory
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Lowest-precedence overlay values
    #[serde(default)]
    pub defaults: IndexMap<String, Value>,

    /// Run validation hooks after binding
    #[serde(default = "default_true")]
    pub validate: bool,

    /// Upper bound on overrides text
    #[serde(default = "default_max_overrides_bytes")]
    pub max_overrides_bytes: u64,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            search_paths: Vec::new(),
            defaults: IndexMap::new(),
            validate: true,
            max_overrides_bytes: DEFAULT_MAX_OVERRIDES_BYTES,
        }
    }
}

impl CompilerConfig {
    /// Append the roots listed in a colon-separated search path value.
    pub fn with_search_path_var(mut self, value: &str) -> Self {
        self.search_paths.extend(
            value
                .split(':')
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        );
        self
    }
}

/// Parse configuration YAML.
pub fn parse_config(yaml: &str) -> Result<CompilerConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("config parse error: {}", e))
}

/// Read a configuration file from disk.
pub fn parse_config_file(path: &Path) -> Result<CompilerConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Resolve the effective configuration: the explicit file if given, else
/// `recipec.yaml` under `cwd` when present, else defaults; then
/// `RECIPEC_SEARCH_PATH` is appended.
pub fn load_config(explicit: Option<&Path>, cwd: &Path) -> Result<CompilerConfig, String> {
    let config = match explicit {
        Some(path) => parse_config_file(path)?,
        None => {
            let implicit = cwd.join(CONFIG_FILE_NAME);
            if implicit.is_file() {
                parse_config_file(&implicit)?
            } else {
                CompilerConfig::default()
            }
        }
    };
    Ok(match std::env::var(SEARCH_PATH_ENV) {
        Ok(value) => config.with_search_path_var(&value),
        Err(_) => config,
    })
}
