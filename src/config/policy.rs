//! Per-tool policy table and behavior-flag resolution.
//!
//! Policies are loaded once at startup into plain maps; resolution is a
//! pure lookup over those maps with a fixed three-level precedence. Nothing
//! here re-fetches or caches — every dispatch computes its own decision.

use std::collections::HashMap;

use serde::Deserialize;

use crate::mcp_client::{split_tool_id, ServerDescriptor};

// ─── ToolPolicy ──────────────────────────────────────────────────────────────

/// Optional per-tool configuration, keyed by qualified tool identifier.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolPolicy {
    /// Name of the response transformer to apply to this tool's output.
    #[serde(default)]
    pub transformer: Option<String>,
    /// Whether the transformer should persist the output as an artifact.
    #[serde(default)]
    pub save_output: bool,
    /// Tri-state: explicitly on, explicitly off, or unset (fall through to
    /// the server default, then to `false`).
    #[serde(default)]
    pub send_result_to_ai: Option<bool>,
}

// ─── PolicyResolver ──────────────────────────────────────────────────────────

/// Pure resolution over the two static tables: the per-tool policy map and
/// the per-server descriptor defaults.
pub struct PolicyResolver {
    tools: HashMap<String, ToolPolicy>,
    server_defaults: HashMap<String, Option<bool>>,
}

impl PolicyResolver {
    /// Build the resolver from the loaded tool table and server descriptors.
    pub fn new(tools: HashMap<String, ToolPolicy>, servers: &[ServerDescriptor]) -> Self {
        let server_defaults = servers
            .iter()
            .map(|d| (d.name.clone(), d.send_result_to_ai))
            .collect();
        Self {
            tools,
            server_defaults,
        }
    }

    /// Static lookup of a tool's policy; `None` when the tool has no entry.
    pub fn resolve_config(&self, tool_id: &str) -> Option<&ToolPolicy> {
        self.tools.get(tool_id)
    }

    /// Decide whether a tool call's result (or error) goes back to the model.
    ///
    /// Precedence: tool-specific setting > owning server's default > `false`.
    /// Applied identically to successes and failures.
    pub fn resolve_send_to_ai(&self, tool_id: &str) -> bool {
        if let Some(policy) = self.tools.get(tool_id) {
            if let Some(explicit) = policy.send_result_to_ai {
                return explicit;
            }
        }

        if let Some((server, _)) = split_tool_id(tool_id) {
            if let Some(Some(default)) = self.server_defaults.get(server) {
                return *default;
            }
        }

        false
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::ConnectionKind;

    fn descriptor(name: &str, send_result_to_ai: Option<bool>) -> ServerDescriptor {
        ServerDescriptor {
            name: name.to_string(),
            kind: ConnectionKind::Sse {
                url: "http://localhost:1/sse".into(),
            },
            auto_connect: true,
            send_result_to_ai,
        }
    }

    fn policy(send_result_to_ai: Option<bool>) -> ToolPolicy {
        ToolPolicy {
            transformer: None,
            save_output: false,
            send_result_to_ai,
        }
    }

    #[test]
    fn test_tool_specific_value_wins() {
        let mut tools = HashMap::new();
        tools.insert("fs__read_file".to_string(), policy(Some(true)));
        let resolver = PolicyResolver::new(tools, &[descriptor("fs", Some(false))]);

        assert!(resolver.resolve_send_to_ai("fs__read_file"));
    }

    #[test]
    fn test_tool_false_overrides_server_true() {
        let mut tools = HashMap::new();
        tools.insert("fs__read_file".to_string(), policy(Some(false)));
        let resolver = PolicyResolver::new(tools, &[descriptor("fs", Some(true))]);

        assert!(!resolver.resolve_send_to_ai("fs__read_file"));
    }

    #[test]
    fn test_unset_tool_falls_to_server_default() {
        let mut tools = HashMap::new();
        tools.insert("fs__read_file".to_string(), policy(None));
        let resolver = PolicyResolver::new(tools, &[descriptor("fs", Some(true))]);

        assert!(resolver.resolve_send_to_ai("fs__read_file"));
        // A tool with no policy entry at all also inherits the server default.
        assert!(resolver.resolve_send_to_ai("fs__write_file"));
    }

    #[test]
    fn test_nothing_set_defaults_to_false() {
        let resolver = PolicyResolver::new(HashMap::new(), &[descriptor("fs", None)]);
        assert!(!resolver.resolve_send_to_ai("fs__read_file"));
    }

    #[test]
    fn test_unknown_server_defaults_to_false() {
        let resolver = PolicyResolver::new(HashMap::new(), &[]);
        assert!(!resolver.resolve_send_to_ai("ghost__tool"));
    }

    #[test]
    fn test_malformed_identifier_defaults_to_false() {
        let resolver = PolicyResolver::new(HashMap::new(), &[descriptor("fs", Some(true))]);
        assert!(!resolver.resolve_send_to_ai("not-a-tool-id"));
    }

    #[test]
    fn test_resolve_config_is_static_lookup() {
        let mut tools = HashMap::new();
        tools.insert(
            "fs__read_file".to_string(),
            ToolPolicy {
                transformer: Some("text_file".into()),
                save_output: true,
                send_result_to_ai: None,
            },
        );
        let resolver = PolicyResolver::new(tools, &[]);

        let found = resolver.resolve_config("fs__read_file").unwrap();
        assert_eq!(found.transformer.as_deref(), Some("text_file"));
        assert!(found.save_output);
        assert!(resolver.resolve_config("fs__other").is_none());
    }
}
