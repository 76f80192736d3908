//! Commit history tools.

use async_trait::async_trait;
use repolens_core::error::ToolError;
use repolens_core::tool::{Tool, ToolName};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::client::{GithubClient, parse_args, push_opt};

fn default_per_page() -> u32 {
    30
}

fn commit_row(commit: &Value) -> Value {
    json!({
        "sha": commit["sha"],
        "message": commit["commit"]["message"],
        "author": commit["commit"]["author"]["name"],
        "authorLogin": commit["author"]["login"],
        "date": commit["commit"]["author"]["date"],
        "url": commit["html_url"],
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListCommitsArgs {
    owner: String,
    repo: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    author: Option<String>,
    #[serde(default)]
    since: Option<String>,
    #[serde(default)]
    until: Option<String>,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

pub struct ListCommits {
    client: Arc<GithubClient>,
}

impl ListCommits {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for ListCommits {
    fn name(&self) -> ToolName {
        ToolName::ListCommits
    }

    fn description(&self) -> &str {
        "List commits in a repository, optionally filtered by path, branch, author, or date range"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "path": { "type": "string", "description": "Only commits touching this path" },
                "sha": { "type": "string", "description": "Branch name or commit SHA to start from" },
                "author": { "type": "string", "description": "GitHub login or email of the author" },
                "since": { "type": "string", "description": "ISO 8601 timestamp; only commits after this date" },
                "until": { "type": "string", "description": "ISO 8601 timestamp; only commits before this date" },
                "perPage": { "type": "integer", "description": "Number of commits to return (max 100)", "default": 30 }
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: ListCommitsArgs = parse_args(self.name(), arguments)?;
        let mut query = vec![("per_page", args.per_page.min(100).to_string())];
        push_opt(&mut query, "path", &args.path);
        push_opt(&mut query, "sha", &args.sha);
        push_opt(&mut query, "author", &args.author);
        push_opt(&mut query, "since", &args.since);
        push_opt(&mut query, "until", &args.until);

        let raw = self
            .client
            .get(&["repos", &args.owner, &args.repo, "commits"], &query)
            .await?;
        let rows: Vec<Value> = raw
            .as_array()
            .map(|items| items.iter().map(commit_row).collect())
            .unwrap_or_default();
        Ok(Value::Array(rows))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetCommitArgs {
    owner: String,
    repo: String,
    #[serde(rename = "ref")]
    git_ref: String,
}

pub struct GetCommit {
    client: Arc<GithubClient>,
}

impl GetCommit {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn commit_detail(raw: &Value) -> Value {
    let mut detail = commit_row(raw);
    let stats = if raw["stats"].is_object() {
        json!({
            "additions": raw["stats"]["additions"],
            "deletions": raw["stats"]["deletions"],
            "total": raw["stats"]["total"],
        })
    } else {
        Value::Null
    };
    let files: Vec<Value> = raw["files"]
        .as_array()
        .map(|files| {
            files
                .iter()
                .map(|f| {
                    json!({
                        "filename": f["filename"],
                        "status": f["status"],
                        "additions": f["additions"],
                        "deletions": f["deletions"],
                        "patch": f["patch"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    detail["stats"] = stats;
    detail["files"] = Value::Array(files);
    detail
}

#[async_trait]
impl Tool for GetCommit {
    fn name(&self) -> ToolName {
        ToolName::GetCommit
    }

    fn description(&self) -> &str {
        "Get details of a specific commit including changed files and diffs"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "ref": { "type": "string", "description": "Commit SHA, branch, or tag" }
            },
            "required": ["owner", "repo", "ref"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: GetCommitArgs = parse_args(self.name(), arguments)?;
        let raw = self
            .client
            .get(&["repos", &args.owner, &args.repo, "commits", &args.git_ref], &[])
            .await?;
        Ok(commit_detail(&raw))
    }
}
