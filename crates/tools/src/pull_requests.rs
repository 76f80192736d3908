//! Pull request tools.

use async_trait::async_trait;
use repolens_core::error::ToolError;
use repolens_core::tool::{Tool, ToolName};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::client::{GithubClient, parse_args};

fn default_per_page() -> u32 {
    30
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum StateFilter {
    #[default]
    Open,
    Closed,
    All,
}

impl StateFilter {
    fn as_str(self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListPullRequestsArgs {
    owner: String,
    repo: String,
    #[serde(default)]
    state: StateFilter,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

pub struct ListPullRequests {
    client: Arc<GithubClient>,
}

impl ListPullRequests {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn pull_request_row(pr: &Value) -> Value {
    json!({
        "number": pr["number"],
        "title": pr["title"],
        "state": pr["state"],
        "url": pr["html_url"],
        "author": pr["user"]["login"],
        "branch": pr["head"]["ref"],
        "base": pr["base"]["ref"],
        "draft": pr["draft"],
        "createdAt": pr["created_at"],
        "updatedAt": pr["updated_at"],
    })
}

#[async_trait]
impl Tool for ListPullRequests {
    fn name(&self) -> ToolName {
        ToolName::ListPullRequests
    }

    fn description(&self) -> &str {
        "List pull requests in a GitHub repository"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "state": { "type": "string", "enum": ["open", "closed", "all"], "description": "Filter by state", "default": "open" },
                "perPage": { "type": "integer", "description": "Number of pull requests to return (max 100)", "default": 30 }
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: ListPullRequestsArgs = parse_args(self.name(), arguments)?;
        let raw = self
            .client
            .get(
                &["repos", &args.owner, &args.repo, "pulls"],
                &[
                    ("state", args.state.as_str().to_string()),
                    ("per_page", args.per_page.min(100).to_string()),
                ],
            )
            .await?;
        let rows: Vec<Value> = raw
            .as_array()
            .map(|items| items.iter().map(pull_request_row).collect())
            .unwrap_or_default();
        Ok(Value::Array(rows))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullNumberArgs {
    owner: String,
    repo: String,
    pull_number: u64,
}

pub struct GetPullRequest {
    client: Arc<GithubClient>,
}

impl GetPullRequest {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn pull_request_detail(pr: &Value) -> Value {
    json!({
        "number": pr["number"],
        "title": pr["title"],
        "body": pr["body"],
        "state": pr["state"],
        "url": pr["html_url"],
        "author": pr["user"]["login"],
        "branch": pr["head"]["ref"],
        "base": pr["base"]["ref"],
        "draft": pr["draft"],
        "merged": pr["merged"],
        "mergeable": pr["mergeable"],
        "additions": pr["additions"],
        "deletions": pr["deletions"],
        "changedFiles": pr["changed_files"],
        "createdAt": pr["created_at"],
        "updatedAt": pr["updated_at"],
        "mergedAt": pr["merged_at"],
    })
}

#[async_trait]
impl Tool for GetPullRequest {
    fn name(&self) -> ToolName {
        ToolName::GetPullRequest
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific pull request"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "pullNumber": { "type": "integer", "description": "Pull request number" }
            },
            "required": ["owner", "repo", "pullNumber"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: PullNumberArgs = parse_args(self.name(), arguments)?;
        let number = args.pull_number.to_string();
        let raw = self
            .client
            .get(&["repos", &args.owner, &args.repo, "pulls", &number], &[])
            .await?;
        Ok(pull_request_detail(&raw))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePullRequestArgs {
    owner: String,
    repo: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    head: String,
    base: String,
    #[serde(default)]
    draft: bool,
}

pub struct CreatePullRequest {
    client: Arc<GithubClient>,
}

impl CreatePullRequest {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CreatePullRequest {
    fn name(&self) -> ToolName {
        ToolName::CreatePullRequest
    }

    fn description(&self) -> &str {
        "Create a new pull request"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "title": { "type": "string", "description": "Pull request title" },
                "body": { "type": "string", "description": "Pull request description" },
                "head": { "type": "string", "description": "Branch containing the changes" },
                "base": { "type": "string", "description": "Branch to merge into" },
                "draft": { "type": "boolean", "description": "Open as a draft", "default": false }
            },
            "required": ["owner", "repo", "title", "head", "base"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CreatePullRequestArgs = parse_args(self.name(), arguments)?;
        let mut body = json!({
            "title": args.title,
            "head": args.head,
            "base": args.base,
            "draft": args.draft,
        });
        if let Some(text) = &args.body {
            body["body"] = json!(text);
        }
        let pr = self
            .client
            .send_json(Method::POST, &["repos", &args.owner, &args.repo, "pulls"], &body)
            .await?;
        Ok(json!({
            "number": pr["number"],
            "title": pr["title"],
            "url": pr["html_url"],
            "state": pr["state"],
            "draft": pr["draft"],
            "branch": pr["head"]["ref"],
            "base": pr["base"]["ref"],
        }))
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MergeMethod {
    #[default]
    Merge,
    Squash,
    Rebase,
}

impl MergeMethod {
    fn as_str(self) -> &'static str {
        match self {
            MergeMethod::Merge => "merge",
            MergeMethod::Squash => "squash",
            MergeMethod::Rebase => "rebase",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MergePullRequestArgs {
    owner: String,
    repo: String,
    pull_number: u64,
    #[serde(default)]
    commit_title: Option<String>,
    #[serde(default)]
    commit_message: Option<String>,
    #[serde(default)]
    merge_method: MergeMethod,
}

pub struct MergePullRequest {
    client: Arc<GithubClient>,
}

impl MergePullRequest {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for MergePullRequest {
    fn name(&self) -> ToolName {
        ToolName::MergePullRequest
    }

    fn description(&self) -> &str {
        "Merge a pull request"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "pullNumber": { "type": "integer", "description": "Pull request number" },
                "commitTitle": { "type": "string", "description": "Title for the merge commit" },
                "commitMessage": { "type": "string", "description": "Extra detail for the merge commit" },
                "mergeMethod": { "type": "string", "enum": ["merge", "squash", "rebase"], "default": "merge" }
            },
            "required": ["owner", "repo", "pullNumber"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: MergePullRequestArgs = parse_args(self.name(), arguments)?;
        let number = args.pull_number.to_string();
        let mut body = json!({ "merge_method": args.merge_method.as_str() });
        if let Some(title) = &args.commit_title {
            body["commit_title"] = json!(title);
        }
        if let Some(message) = &args.commit_message {
            body["commit_message"] = json!(message);
        }
        let raw = self
            .client
            .send_json(
                Method::PUT,
                &["repos", &args.owner, &args.repo, "pulls", &number, "merge"],
                &body,
            )
            .await?;
        Ok(json!({
            "merged": raw["merged"],
            "message": raw["message"],
            "sha": raw["sha"],
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullCommentArgs {
    owner: String,
    repo: String,
    pull_number: u64,
    body: String,
}

pub struct AddPullRequestComment {
    client: Arc<GithubClient>,
}

impl AddPullRequestComment {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

pub(crate) fn comment_summary(raw: &Value) -> Value {
    json!({
        "id": raw["id"],
        "url": raw["html_url"],
        "body": raw["body"],
        "author": raw["user"]["login"],
        "createdAt": raw["created_at"],
    })
}

#[async_trait]
impl Tool for AddPullRequestComment {
    fn name(&self) -> ToolName {
        ToolName::AddPullRequestComment
    }

    fn description(&self) -> &str {
        "Add a comment to a pull request"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "pullNumber": { "type": "integer", "description": "Pull request number" },
                "body": { "type": "string", "description": "Comment text (markdown supported)" }
            },
            "required": ["owner", "repo", "pullNumber", "body"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: PullCommentArgs = parse_args(self.name(), arguments)?;
        let number = args.pull_number.to_string();
        // PR conversation comments live on the issues endpoint.
        let raw = self
            .client
            .send_json(
                Method::POST,
                &["repos", &args.owner, &args.repo, "issues", &number, "comments"],
                &json!({ "body": args.body }),
            )
            .await?;
        Ok(comment_summary(&raw))
    }
}
