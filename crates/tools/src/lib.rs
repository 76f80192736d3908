//! GitHub tool implementations for RepoLens.
//!
//! Every [`ToolName`](repolens_core::tool::ToolName) in the catalog has one
//! handler here. Handlers share a [`GithubClient`] that carries the
//! session's credential, so a registry is built per session.

pub mod client;
pub mod commits;
pub mod issues;
pub mod pull_requests;
pub mod repository;
pub mod search;

pub use client::{DEFAULT_API_URL, GithubClient};

use repolens_core::error::ConfigurationError;
use repolens_core::tool::{Tool, ToolRegistry};
use std::sync::Arc;

/// One handler per catalog entry, all sharing `client`.
pub fn github_tools(client: Arc<GithubClient>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(repository::GetRepository::new(client.clone())),
        Arc::new(repository::ListBranches::new(client.clone())),
        Arc::new(repository::GetFileContent::new(client.clone())),
        Arc::new(pull_requests::ListPullRequests::new(client.clone())),
        Arc::new(pull_requests::GetPullRequest::new(client.clone())),
        Arc::new(issues::ListIssues::new(client.clone())),
        Arc::new(issues::GetIssue::new(client.clone())),
        Arc::new(search::SearchCode::new(client.clone())),
        Arc::new(search::SearchRepositories::new(client.clone())),
        Arc::new(commits::ListCommits::new(client.clone())),
        Arc::new(commits::GetCommit::new(client.clone())),
        Arc::new(repository::CreateOrUpdateFile::new(client.clone())),
        Arc::new(pull_requests::CreatePullRequest::new(client.clone())),
        Arc::new(pull_requests::MergePullRequest::new(client.clone())),
        Arc::new(pull_requests::AddPullRequestComment::new(client.clone())),
        Arc::new(issues::CreateIssue::new(client.clone())),
        Arc::new(issues::AddIssueComment::new(client.clone())),
        Arc::new(issues::CloseIssue::new(client)),
    ]
}

/// Build the full registry for one credential.
pub fn default_registry(client: Arc<GithubClient>) -> Result<ToolRegistry, ConfigurationError> {
    ToolRegistry::new(github_tools(client))
}
