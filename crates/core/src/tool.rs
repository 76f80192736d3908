//! Tool trait and the fixed GitHub tool catalog.
//!
//! The catalog is a closed set: every [`ToolName`] must have exactly one
//! handler in the [`ToolRegistry`], which is checked when the registry is
//! built. Presets and allow-lists narrow the catalog per invocation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::error::{ConfigurationError, ToolError};
use crate::provider::ToolDefinition;

/// The name of a tool in the catalog. Declaration order is catalog order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ToolName {
    GetRepository,
    ListBranches,
    GetFileContent,
    ListPullRequests,
    GetPullRequest,
    ListIssues,
    GetIssue,
    SearchCode,
    SearchRepositories,
    ListCommits,
    GetCommit,
    CreateOrUpdateFile,
    CreatePullRequest,
    MergePullRequest,
    AddPullRequestComment,
    CreateIssue,
    AddIssueComment,
    CloseIssue,
}

impl ToolName {
    /// Every tool, in catalog order.
    pub const ALL: [ToolName; 18] = [
        ToolName::GetRepository,
        ToolName::ListBranches,
        ToolName::GetFileContent,
        ToolName::ListPullRequests,
        ToolName::GetPullRequest,
        ToolName::ListIssues,
        ToolName::GetIssue,
        ToolName::SearchCode,
        ToolName::SearchRepositories,
        ToolName::ListCommits,
        ToolName::GetCommit,
        ToolName::CreateOrUpdateFile,
        ToolName::CreatePullRequest,
        ToolName::MergePullRequest,
        ToolName::AddPullRequestComment,
        ToolName::CreateIssue,
        ToolName::AddIssueComment,
        ToolName::CloseIssue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::GetRepository => "getRepository",
            ToolName::ListBranches => "listBranches",
            ToolName::GetFileContent => "getFileContent",
            ToolName::ListPullRequests => "listPullRequests",
            ToolName::GetPullRequest => "getPullRequest",
            ToolName::ListIssues => "listIssues",
            ToolName::GetIssue => "getIssue",
            ToolName::SearchCode => "searchCode",
            ToolName::SearchRepositories => "searchRepositories",
            ToolName::ListCommits => "listCommits",
            ToolName::GetCommit => "getCommit",
            ToolName::CreateOrUpdateFile => "createOrUpdateFile",
            ToolName::CreatePullRequest => "createPullRequest",
            ToolName::MergePullRequest => "mergePullRequest",
            ToolName::AddPullRequestComment => "addPullRequestComment",
            ToolName::CreateIssue => "createIssue",
            ToolName::AddIssueComment => "addIssueComment",
            ToolName::CloseIssue => "closeIssue",
        }
    }

    /// Whether the tool mutates state on GitHub.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ToolName::CreateOrUpdateFile
                | ToolName::CreatePullRequest
                | ToolName::MergePullRequest
                | ToolName::AddPullRequestComment
                | ToolName::CreateIssue
                | ToolName::AddIssueComment
                | ToolName::CloseIssue
        )
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolName {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownTool(s.to_string()))
    }
}

/// Named tool bundles for common workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    CodeReview,
    IssueTriage,
    RepoExplorer,
    Maintainer,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::CodeReview,
        Preset::IssueTriage,
        Preset::RepoExplorer,
        Preset::Maintainer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Preset::CodeReview => "code-review",
            Preset::IssueTriage => "issue-triage",
            Preset::RepoExplorer => "repo-explorer",
            Preset::Maintainer => "maintainer",
        }
    }

    /// The tools this preset enables.
    pub fn tools(&self) -> &'static [ToolName] {
        use ToolName::*;
        match self {
            Preset::CodeReview => &[
                GetPullRequest,
                ListPullRequests,
                GetFileContent,
                ListCommits,
                GetCommit,
                GetRepository,
                ListBranches,
                SearchCode,
                AddPullRequestComment,
            ],
            Preset::IssueTriage => &[
                ListIssues,
                GetIssue,
                CreateIssue,
                AddIssueComment,
                CloseIssue,
                GetRepository,
                SearchRepositories,
                SearchCode,
            ],
            Preset::RepoExplorer => &[
                GetRepository,
                ListBranches,
                GetFileContent,
                ListPullRequests,
                GetPullRequest,
                ListIssues,
                GetIssue,
                ListCommits,
                GetCommit,
                SearchCode,
                SearchRepositories,
            ],
            Preset::Maintainer => &ToolName::ALL,
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Preset {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownPreset(s.to_string()))
    }
}

/// Which tools an invocation may use: a union of presets and explicit names.
///
/// An empty selection means the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSelection {
    #[serde(default)]
    pub presets: Vec<Preset>,
    #[serde(default)]
    pub allow: Vec<String>,
}

impl ToolSelection {
    /// Resolve to an allow-list, or `None` for the full catalog.
    pub fn allow_list(&self) -> Option<Vec<String>> {
        if self.presets.is_empty() && self.allow.is_empty() {
            return None;
        }
        let mut names: Vec<String> = self
            .presets
            .iter()
            .flat_map(|p| p.tools().iter().map(|t| t.as_str().to_string()))
            .collect();
        names.extend(self.allow.iter().cloned());
        Some(names)
    }

    /// The single preset, when exactly one is selected and no extra names.
    pub fn single_preset(&self) -> Option<Preset> {
        match self.presets.as_slice() {
            [only] if self.allow.is_empty() => Some(*only),
            _ => None,
        }
    }
}

/// The core Tool trait.
///
/// Each GitHub operation implements this trait. Handlers hold no shared
/// mutable state; they may be executed concurrently across turns.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Which catalog entry this handler implements.
    fn name(&self) -> ToolName;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the LLM.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().as_str().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// The complete set of tool handlers, one per catalog entry.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolName, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Build a registry, requiring exactly one handler per catalog entry.
    pub fn new(handlers: Vec<Arc<dyn Tool>>) -> Result<Self, ConfigurationError> {
        let mut tools = BTreeMap::new();
        for handler in handlers {
            let name = handler.name();
            if tools.insert(name, handler).is_some() {
                return Err(ConfigurationError::DuplicateHandler(name));
            }
        }
        if let Some(missing) = ToolName::ALL.into_iter().find(|t| !tools.contains_key(t)) {
            return Err(ConfigurationError::MissingHandler(missing));
        }
        Ok(Self { tools })
    }

    /// Get a handler by name.
    pub fn get(&self, name: ToolName) -> &Arc<dyn Tool> {
        // Construction guarantees every name is present.
        &self.tools[&name]
    }

    /// Resolve an optional allow-list to the callable set.
    ///
    /// No allow-list yields the full catalog. Unknown names are rejected.
    pub fn resolve(&self, allow: Option<&[String]>) -> Result<ResolvedTools, ConfigurationError> {
        let selected: BTreeSet<ToolName> = match allow {
            None => ToolName::ALL.into_iter().collect(),
            Some(names) => names
                .iter()
                .map(|n| n.parse::<ToolName>())
                .collect::<Result<_, _>>()?,
        };
        Ok(ResolvedTools {
            tools: selected
                .into_iter()
                .map(|name| (name, Arc::clone(self.get(name))))
                .collect(),
        })
    }

    /// Get all tool definitions in catalog order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }
}

/// The tools available to one loop invocation, in catalog order.
#[derive(Clone)]
pub struct ResolvedTools {
    tools: Vec<(ToolName, Arc<dyn Tool>)>,
}

impl std::fmt::Debug for ResolvedTools {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl ResolvedTools {
    /// Look up a resolved tool by its wire name.
    pub fn get(&self, name: &str) -> Option<(ToolName, &Arc<dyn Tool>)> {
        self.tools
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(n, t)| (*n, t))
    }

    pub fn contains(&self, name: ToolName) -> bool {
        self.tools.iter().any(|(n, _)| *n == name)
    }

    pub fn names(&self) -> Vec<ToolName> {
        self.tools.iter().map(|(n, _)| *n).collect()
    }

    /// Tool definitions for the model request.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|(_, t)| t.to_definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
