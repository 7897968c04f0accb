//! Startup configuration loading and validation.
//!
//! Reads `toolbridge.yaml` once at boot: model endpoint settings, the
//! ordered server descriptor list, the per-tool policy map, and the optional
//! per-call timeout. Config is the single source of truth — nothing is
//! re-read during query processing.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::mcp_client::ServerDescriptor;

use super::policy::ToolPolicy;

// ─── Errors ──────────────────────────────────────────────────────────────────

/// Errors raised while loading or validating the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{path}': {reason}")]
    Io { path: String, reason: String },

    /// The file is not valid YAML for the expected shape.
    #[error("failed to parse config file '{path}': {reason}")]
    Parse { path: String, reason: String },

    /// The file parsed but violates an invariant.
    #[error("invalid configuration: {reason}")]
    Invalid { reason: String },
}

// ─── Model Settings ──────────────────────────────────────────────────────────

/// Chat-completion endpoint settings for the model collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelSettings {
    /// Base URL of the OpenAI-compatible endpoint (e.g. `http://localhost:11434/v1`).
    pub base_url: String,
    /// Model name sent in each request.
    pub model: String,
    /// Environment variable holding the API key; unset for local endpoints.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1024
}

impl ModelSettings {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }
}

// ─── AppConfig ───────────────────────────────────────────────────────────────

/// Top-level configuration file shape.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub model: ModelSettings,
    /// Optional per-tool-call timeout. Absent means calls may wait forever.
    #[serde(default)]
    pub call_timeout_ms: Option<u64>,
    /// Ordered server fleet.
    #[serde(default)]
    pub servers: Vec<ServerDescriptor>,
    /// Qualified tool identifier → policy.
    #[serde(default)]
    pub tools: HashMap<String, ToolPolicy>,
}

impl AppConfig {
    /// Load and validate the configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: AppConfig =
            serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Structural validation beyond what serde enforces.
    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for descriptor in &self.servers {
            if !seen.insert(descriptor.name.as_str()) {
                return Err(ConfigError::Invalid {
                    reason: format!("duplicate server name '{}'", descriptor.name),
                });
            }
        }

        for tool_id in self.tools.keys() {
            if crate::mcp_client::split_tool_id(tool_id).is_none() {
                return Err(ConfigError::Invalid {
                    reason: format!(
                        "tool policy key '{tool_id}' is not a qualified server__tool identifier"
                    ),
                });
            }
        }

        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
model:
  base_url: http://localhost:11434/v1
  model: qwen2.5
  api_key_env: TOOLBRIDGE_API_KEY
call_timeout_ms: 30000
servers:
  - name: filesystem
    transport: stdio
    command: python3
    args: ["-m", "fs_server"]
    send_result_to_ai: true
  - name: search
    transport: sse
    url: http://localhost:8931/sse
tools:
  filesystem__read_file:
    transformer: text_file
    save_output: true
    send_result_to_ai: false
"#;

    fn write_config(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_sample_config() {
        let file = write_config(SAMPLE);
        let config = AppConfig::load(file.path()).unwrap();

        assert_eq!(config.model.model, "qwen2.5");
        assert_eq!(config.call_timeout_ms, Some(30_000));
        assert_eq!(config.servers.len(), 2);
        assert_eq!(config.servers[0].name, "filesystem");
        assert_eq!(config.servers[0].send_result_to_ai, Some(true));

        let policy = &config.tools["filesystem__read_file"];
        assert_eq!(policy.transformer.as_deref(), Some("text_file"));
        assert!(policy.save_output);
        assert_eq!(policy.send_result_to_ai, Some(false));
    }

    #[test]
    fn test_defaults_applied() {
        let file = write_config(
            "model:\n  base_url: http://localhost:1/v1\n  model: test\n",
        );
        let config = AppConfig::load(file.path()).unwrap();

        assert!(config.call_timeout_ms.is_none());
        assert!(config.servers.is_empty());
        assert!(config.tools.is_empty());
        assert!((config.model.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.model.max_tokens, 1024);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = AppConfig::load(Path::new("/nonexistent/toolbridge.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_malformed_yaml_is_parse_error() {
        let file = write_config("model: [not, a, mapping");
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_server_name_rejected() {
        let file = write_config(
            r#"
model:
  base_url: http://localhost:1/v1
  model: test
servers:
  - name: fs
    transport: sse
    url: http://localhost:1/sse
  - name: fs
    transport: sse
    url: http://localhost:2/sse
"#,
        );
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref reason } if reason.contains("fs")));
    }

    #[test]
    fn test_unqualified_tool_policy_key_rejected() {
        let file = write_config(
            r#"
model:
  base_url: http://localhost:1/v1
  model: test
tools:
  read_file:
    save_output: true
"#,
        );
        let err = AppConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref reason } if reason.contains("read_file")));
    }

    #[test]
    fn test_api_key_resolution() {
        let settings = ModelSettings {
            base_url: "http://localhost:1/v1".into(),
            model: "test".into(),
            api_key_env: Some("TOOLBRIDGE_TEST_KEY_UNSET".into()),
            temperature: 0.7,
            max_tokens: 1024,
        };
        assert!(settings.api_key().is_none());

        std::env::set_var("TOOLBRIDGE_TEST_KEY_SET", "secret");
        let settings = ModelSettings {
            api_key_env: Some("TOOLBRIDGE_TEST_KEY_SET".into()),
            ..settings
        };
        assert_eq!(settings.api_key().as_deref(), Some("secret"));
    }
}
