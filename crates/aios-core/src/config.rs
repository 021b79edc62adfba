//! AIOS configuration
//!
//! All tunable parameters in one place. Loaded from TOML at startup,
//! falls back to defaults if no config file exists.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiosConfig {
    /// Line-length policy.
    pub line: LineConfig,
    /// Retry budget and fast-path switch.
    pub coordinator: CoordinatorConfig,
    /// Scout tier bridge (local classifier).
    #[serde(deserialize_with = "scout_bridge")]
    pub scout: LocalBridgeConfig,
    /// Worker tier bridge (local generator).
    #[serde(deserialize_with = "worker_bridge")]
    pub worker: LocalBridgeConfig,
    /// Oracle tier bridge (cloud arbiter).
    pub oracle: OracleConfig,
    /// REST service binding.
    pub gateway: GatewayConfig,
    /// Backup, cleanup and archive settings.
    pub housekeeping: HousekeepingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Longest allowed line, in characters.
    pub max_length: usize,
    /// Last column the fallback splitter may break at.
    pub break_column: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum worker calls per request. 0 sends every line to the fallback.
    pub max_retries: usize,
    /// Run the regex classifier before asking the scout model.
    pub fast_path: bool,
    /// Scout model confidence below which its label is replaced by the
    /// heuristic classification.
    pub min_scout_confidence: f32,
}

/// Each tier has its own defaults; a partial `[scout]` or `[worker]` table
/// overrides only the keys it sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBridgeConfig {
    /// Ollama-compatible server root.
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub model: String,
    /// Environment variable holding the AI Studio API key.
    pub api_key_env: String,
    /// Override for the AI Studio endpoint root.
    pub base_url: Option<String>,
    /// When set (with `vertex_location`), use Vertex AI instead of AI Studio.
    pub vertex_project: Option<String>,
    pub vertex_location: Option<String>,
    /// Environment variable holding the Vertex bearer token.
    pub access_token_env: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HousekeepingConfig {
    /// Where timestamped `.bak` copies go, relative to the written file.
    pub backup_dir: String,
    /// Backups kept per file; older ones are pruned.
    pub keep_backups: usize,
    /// Archive root, relative to the workspace.
    pub archive_dir: String,
    /// File names root cleanup never moves.
    pub protected: Vec<String>,
    /// Ordered cleanup rules; first match wins.
    pub rules: Vec<CleanupRuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanupRuleConfig {
    pub pattern: String,
    pub destination: String,
}

// ============================================================
// Defaults
// ============================================================

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

impl Default for AiosConfig {
    fn default() -> Self {
        Self {
            line: LineConfig::default(),
            coordinator: CoordinatorConfig::default(),
            scout: LocalBridgeConfig::scout(),
            worker: LocalBridgeConfig::worker(),
            oracle: OracleConfig::default(),
            gateway: GatewayConfig::default(),
            housekeeping: HousekeepingConfig::default(),
        }
    }
}

impl Default for LineConfig {
    fn default() -> Self {
        Self { max_length: 79, break_column: 76 }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self { max_retries: 2, fast_path: true, min_scout_confidence: 0.5 }
    }
}

impl LocalBridgeConfig {
    pub fn scout() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.into(),
            model: "gemma3:1b".into(),
            timeout_secs: 5,
            temperature: 0.1,
            max_tokens: 200,
        }
    }

    pub fn worker() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.into(),
            model: "mistral:7b".into(),
            timeout_secs: 60,
            temperature: 0.2,
            max_tokens: 512,
        }
    }
}

/// Keys present in a local bridge table.
#[derive(Deserialize)]
struct LocalBridgePatch {
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl LocalBridgePatch {
    fn apply(self, base: LocalBridgeConfig) -> LocalBridgeConfig {
        LocalBridgeConfig {
            base_url: self.base_url.unwrap_or(base.base_url),
            model: self.model.unwrap_or(base.model),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
            temperature: self.temperature.unwrap_or(base.temperature),
            max_tokens: self.max_tokens.unwrap_or(base.max_tokens),
        }
    }
}

fn scout_bridge<'de, D: Deserializer<'de>>(d: D) -> Result<LocalBridgeConfig, D::Error> {
    LocalBridgePatch::deserialize(d).map(|p| p.apply(LocalBridgeConfig::scout()))
}

fn worker_bridge<'de, D: Deserializer<'de>>(d: D) -> Result<LocalBridgeConfig, D::Error> {
    LocalBridgePatch::deserialize(d).map(|p| p.apply(LocalBridgeConfig::worker()))
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".into(),
            api_key_env: "GEMINI_API_KEY".into(),
            base_url: None,
            vertex_project: None,
            vertex_location: None,
            access_token_env: "VERTEX_ACCESS_TOKEN".into(),
            timeout_secs: 30,
            temperature: 0.1,
            max_tokens: 1024,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".into(), port: 8000 }
    }
}

impl Default for HousekeepingConfig {
    fn default() -> Self {
        let rule = |pattern: &str, destination: &str| CleanupRuleConfig {
            pattern: pattern.into(),
            destination: destination.into(),
        };
        Self {
            backup_dir: ".backups".into(),
            keep_backups: 5,
            archive_dir: "archive".into(),
            protected: ["README.md", "Cargo.toml", "Cargo.lock", "pyproject.toml", "aios.toml", ".gitignore"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rules: vec![
                rule("*_REPORT*.md", "docs/reports"),
                rule("*_SUMMARY*.md", "docs/reports"),
                rule("test_*.py", "tests"),
                rule("*_demo.py", "demos"),
                rule("*.log", "logs"),
                rule("*_state.json", "runtime/state"),
                rule("*.bak", "runtime/backups"),
            ],
        }
    }
}

// ============================================================
// Loading
// ============================================================

impl AiosConfig {
    /// Load config from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {} - using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                tracing::info!("No config at {} - using defaults", path.display());
                Self::default()
            }
        };
        config.apply_env();
        config
    }

    /// Strict variant for callers that must not silently ignore a bad file.
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `OLLAMA_HOST` overrides both local bridge URLs.
    pub fn apply_env(&mut self) {
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            let url = if host.starts_with("http") { host } else { format!("http://{}", host) };
            self.scout.base_url = url.clone();
            self.worker.base_url = url;
        }
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.line.max_length == 0 {
            return Err(crate::Error::Config("line.max_length must be positive".into()));
        }
        if self.line.break_column > self.line.max_length {
            return Err(crate::Error::Config(format!(
                "line.break_column ({}) exceeds line.max_length ({})",
                self.line.break_column, self.line.max_length
            )));
        }
        Ok(())
    }

    /// Write the current config as TOML (for generating a default config file).
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// `./aios.toml` if present, else `<config dir>/aios/aios.toml`.
    pub fn default_path(config_dir: Option<PathBuf>) -> PathBuf {
        let local = PathBuf::from("aios.toml");
        if local.exists() {
            return local;
        }
        config_dir
            .map(|d| d.join("aios").join("aios.toml"))
            .unwrap_or(local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_line_policy() {
        let c = AiosConfig::default();
        assert_eq!(c.line.max_length, 79);
        assert_eq!(c.line.break_column, 76);
        assert_eq!(c.coordinator.max_retries, 2);
        assert_eq!(c.scout.model, "gemma3:1b");
        assert_eq!(c.worker.model, "mistral:7b");
        assert!(c.scout.timeout_secs < c.worker.timeout_secs);
    }

    #[test]
    fn partial_toml_keeps_other_sections() {
        let c = AiosConfig::from_toml_str("[coordinator]\nmax_retries = 4\n").unwrap();
        assert_eq!(c.coordinator.max_retries, 4);
        assert!(c.coordinator.fast_path);
        assert_eq!(c.line.max_length, 79);
        assert_eq!(c.scout.model, "gemma3:1b");
    }

    #[test]
    fn partial_bridge_tables_keep_tier_defaults() {
        let c = AiosConfig::from_toml_str(
            "[scout]\nbase_url = \"http://gpu-box:11434\"\n\n[worker]\nmodel = \"codellama:13b\"\n",
        )
        .unwrap();
        assert_eq!(c.scout.base_url, "http://gpu-box:11434");
        assert_eq!(c.scout.model, "gemma3:1b");
        assert_eq!(c.scout.timeout_secs, 5);
        assert_eq!(c.scout.max_tokens, 200);
        assert_eq!(c.worker.model, "codellama:13b");
        assert_eq!(c.worker.timeout_secs, 60);
        assert_eq!(c.worker.base_url, DEFAULT_OLLAMA_URL);
    }

    #[test]
    fn break_column_beyond_limit_is_rejected() {
        let err = AiosConfig::from_toml_str("[line]\nmax_length = 60\nbreak_column = 70\n").unwrap_err();
        assert!(err.to_string().contains("break_column"));
    }

    #[test]
    fn toml_round_trip_through_dump() {
        let dumped = AiosConfig::default().to_toml();
        assert!(dumped.contains("[oracle]"));
        let back = AiosConfig::from_toml_str(&dumped).unwrap();
        assert_eq!(back.housekeeping.rules, AiosConfig::default().housekeeping.rules);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let c = AiosConfig::load(&dir.path().join("nope.toml"));
        assert_eq!(c.gateway.port, 8000);
    }

    #[test]
    fn load_invalid_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aios.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        let c = AiosConfig::load(&path);
        assert_eq!(c.oracle.model, "gemini-2.5-flash");
    }
}
