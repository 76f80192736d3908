//! Approval policy for tool execution.
//!
//! Read-only tools never need approval. Write tools need approval unless the
//! configuration explicitly turns it off, globally or per tool.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::ConfigurationError;
use crate::tool::ToolName;

/// Either one switch for every write tool, or a per-tool map.
///
/// Write tools missing from the map require approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApprovalConfig {
    Global(bool),
    PerTool(BTreeMap<String, bool>),
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        ApprovalConfig::Global(true)
    }
}

impl ApprovalConfig {
    /// Whether invoking `tool` must pause for user confirmation.
    pub fn needs_approval(&self, tool: ToolName) -> bool {
        if !tool.is_write() {
            return false;
        }
        match self {
            ApprovalConfig::Global(required) => *required,
            ApprovalConfig::PerTool(map) => map.get(tool.as_str()).copied().unwrap_or(true),
        }
    }

    /// Reject per-tool entries that do not name a write tool.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if let ApprovalConfig::PerTool(map) = self {
            for key in map.keys() {
                let tool: ToolName = key.parse()?;
                if !tool.is_write() {
                    return Err(ConfigurationError::ApprovalNotConfigurable(key.clone()));
                }
            }
        }
        Ok(())
    }

    /// Decide what happens to a call, given any response already recorded for it.
    pub fn decide(&self, tool: ToolName, response: Option<(bool, Option<&str>)>) -> ApprovalDecision {
        if !self.needs_approval(tool) {
            return ApprovalDecision::AutoApproved;
        }
        match response {
            None => ApprovalDecision::Pending,
            Some((true, _)) => ApprovalDecision::Approved,
            Some((false, reason)) => ApprovalDecision::Denied {
                reason: reason.map(str::to_string),
            },
        }
    }
}

/// The approval state of a single tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    AutoApproved,
    Pending,
    Approved,
    Denied { reason: Option<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_requires_approval_for_writes_only() {
        let config = ApprovalConfig::default();
        assert!(config.needs_approval(ToolName::CreateIssue));
        assert!(config.needs_approval(ToolName::MergePullRequest));
        assert!(!config.needs_approval(ToolName::GetRepository));
    }

    #[test]
    fn read_only_tools_never_need_approval() {
        let mut map = BTreeMap::new();
        map.insert("getRepository".to_string(), true);
        let config = ApprovalConfig::PerTool(map);
        assert!(!config.needs_approval(ToolName::GetRepository));
        assert!(!ApprovalConfig::Global(true).needs_approval(ToolName::SearchCode));
    }

    #[test]
    fn global_false_disables_approval() {
        let config = ApprovalConfig::Global(false);
        assert!(ToolName::ALL.iter().all(|t| !config.needs_approval(*t)));
    }

    #[test]
    fn per_tool_unspecified_defaults_to_required() {
        let config: ApprovalConfig = serde_json::from_str(r#"{"createIssue": false}"#).unwrap();
        assert!(!config.needs_approval(ToolName::CreateIssue));
        assert!(config.needs_approval(ToolName::CloseIssue));
    }

    #[test]
    fn parses_boolean_form() {
        let config: ApprovalConfig = serde_json::from_str("false").unwrap();
        assert_eq!(config, ApprovalConfig::Global(false));
    }

    #[test]
    fn validate_rejects_read_only_and_unknown_keys() {
        let config: ApprovalConfig = serde_json::from_str(r#"{"listIssues": true}"#).unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigurationError::ApprovalNotConfigurable("listIssues".into())
        );

        let config: ApprovalConfig = serde_json::from_str(r#"{"dropTable": true}"#).unwrap();
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigurationError::UnknownTool("dropTable".into())
        );

        let config: ApprovalConfig = serde_json::from_str(r#"{"closeIssue": false}"#).unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn decisions() {
        let config = ApprovalConfig::default();
        assert_eq!(
            config.decide(ToolName::GetIssue, None),
            ApprovalDecision::AutoApproved
        );
        assert_eq!(config.decide(ToolName::CreateIssue, None), ApprovalDecision::Pending);
        assert_eq!(
            config.decide(ToolName::CreateIssue, Some((true, None))),
            ApprovalDecision::Approved
        );
        assert_eq!(
            config.decide(ToolName::CreateIssue, Some((false, Some("no")))),
            ApprovalDecision::Denied {
                reason: Some("no".into())
            }
        );
    }
}
