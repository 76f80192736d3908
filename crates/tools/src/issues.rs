//! Issue tools.
//!
//! GitHub's issue listing also returns pull requests; those are filtered out
//! so the model only sees real issues.

use async_trait::async_trait;
use repolens_core::error::ToolError;
use repolens_core::tool::{Tool, ToolName};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::client::{GithubClient, label_names, parse_args, push_opt};
use crate::pull_requests::comment_summary;

fn default_per_page() -> u32 {
    30
}

fn default_state() -> String {
    "open".into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListIssuesArgs {
    owner: String,
    repo: String,
    #[serde(default = "default_state")]
    state: String,
    #[serde(default)]
    labels: Option<String>,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

pub struct ListIssues {
    client: Arc<GithubClient>,
}

impl ListIssues {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

pub(crate) fn issue_rows(raw: &Value) -> Value {
    let rows: Vec<Value> = raw
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter(|issue| issue.get("pull_request").is_none())
                .map(|issue| {
                    json!({
                        "number": issue["number"],
                        "title": issue["title"],
                        "state": issue["state"],
                        "url": issue["html_url"],
                        "author": issue["user"]["login"],
                        "labels": label_names(&issue["labels"]),
                        "createdAt": issue["created_at"],
                        "updatedAt": issue["updated_at"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(rows)
}

#[async_trait]
impl Tool for ListIssues {
    fn name(&self) -> ToolName {
        ToolName::ListIssues
    }

    fn description(&self) -> &str {
        "List issues in a GitHub repository (excludes pull requests)"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "state": { "type": "string", "enum": ["open", "closed", "all"], "default": "open" },
                "labels": { "type": "string", "description": "Comma-separated list of label names" },
                "perPage": { "type": "integer", "description": "Number of issues to return (max 100)", "default": 30 }
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: ListIssuesArgs = parse_args(self.name(), arguments)?;
        if !matches!(args.state.as_str(), "open" | "closed" | "all") {
            return Err(ToolError::InvalidArguments(format!(
                "{}: state must be open, closed, or all",
                self.name()
            )));
        }
        let mut query = vec![
            ("state", args.state.clone()),
            ("per_page", args.per_page.min(100).to_string()),
        ];
        push_opt(&mut query, "labels", &args.labels);
        let raw = self
            .client
            .get(&["repos", &args.owner, &args.repo, "issues"], &query)
            .await?;
        Ok(issue_rows(&raw))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueNumberArgs {
    owner: String,
    repo: String,
    issue_number: u64,
}

pub struct GetIssue {
    client: Arc<GithubClient>,
}

impl GetIssue {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn issue_detail(issue: &Value) -> Value {
    let assignees: Vec<Value> = issue["assignees"]
        .as_array()
        .map(|a| a.iter().map(|u| u["login"].clone()).collect())
        .unwrap_or_default();
    json!({
        "number": issue["number"],
        "title": issue["title"],
        "body": issue["body"],
        "state": issue["state"],
        "url": issue["html_url"],
        "author": issue["user"]["login"],
        "assignees": assignees,
        "labels": label_names(&issue["labels"]),
        "comments": issue["comments"],
        "createdAt": issue["created_at"],
        "updatedAt": issue["updated_at"],
        "closedAt": issue["closed_at"],
    })
}

#[async_trait]
impl Tool for GetIssue {
    fn name(&self) -> ToolName {
        ToolName::GetIssue
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific issue"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "issueNumber": { "type": "integer", "description": "Issue number" }
            },
            "required": ["owner", "repo", "issueNumber"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: IssueNumberArgs = parse_args(self.name(), arguments)?;
        let number = args.issue_number.to_string();
        let raw = self
            .client
            .get(&["repos", &args.owner, &args.repo, "issues", &number], &[])
            .await?;
        Ok(issue_detail(&raw))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIssueArgs {
    owner: String,
    repo: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default)]
    assignees: Vec<String>,
}

pub struct CreateIssue {
    client: Arc<GithubClient>,
}

impl CreateIssue {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CreateIssue {
    fn name(&self) -> ToolName {
        ToolName::CreateIssue
    }

    fn description(&self) -> &str {
        "Create a new issue in a GitHub repository"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "title": { "type": "string", "description": "Issue title" },
                "body": { "type": "string", "description": "Issue description (markdown supported)" },
                "labels": { "type": "array", "items": { "type": "string" }, "description": "Labels to apply" },
                "assignees": { "type": "array", "items": { "type": "string" }, "description": "Usernames to assign" }
            },
            "required": ["owner", "repo", "title"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CreateIssueArgs = parse_args(self.name(), arguments)?;
        let mut body = json!({ "title": args.title });
        if let Some(text) = &args.body {
            body["body"] = json!(text);
        }
        if !args.labels.is_empty() {
            body["labels"] = json!(args.labels);
        }
        if !args.assignees.is_empty() {
            body["assignees"] = json!(args.assignees);
        }
        let issue = self
            .client
            .send_json(Method::POST, &["repos", &args.owner, &args.repo, "issues"], &body)
            .await?;
        Ok(json!({
            "number": issue["number"],
            "title": issue["title"],
            "url": issue["html_url"],
            "state": issue["state"],
            "labels": label_names(&issue["labels"]),
        }))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueCommentArgs {
    owner: String,
    repo: String,
    issue_number: u64,
    body: String,
}

pub struct AddIssueComment {
    client: Arc<GithubClient>,
}

impl AddIssueComment {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for AddIssueComment {
    fn name(&self) -> ToolName {
        ToolName::AddIssueComment
    }

    fn description(&self) -> &str {
        "Add a comment to an issue"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "issueNumber": { "type": "integer", "description": "Issue number" },
                "body": { "type": "string", "description": "Comment text (markdown supported)" }
            },
            "required": ["owner", "repo", "issueNumber", "body"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: IssueCommentArgs = parse_args(self.name(), arguments)?;
        let number = args.issue_number.to_string();
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

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum CloseReason {
    #[default]
    Completed,
    NotPlanned,
}

impl CloseReason {
    fn as_str(self) -> &'static str {
        match self {
            CloseReason::Completed => "completed",
            CloseReason::NotPlanned => "not_planned",
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CloseIssueArgs {
    owner: String,
    repo: String,
    issue_number: u64,
    #[serde(default)]
    state_reason: CloseReason,
}

pub struct CloseIssue {
    client: Arc<GithubClient>,
}

impl CloseIssue {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for CloseIssue {
    fn name(&self) -> ToolName {
        ToolName::CloseIssue
    }

    fn description(&self) -> &str {
        "Close an issue"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "issueNumber": { "type": "integer", "description": "Issue number" },
                "stateReason": { "type": "string", "enum": ["completed", "not_planned"], "default": "completed" }
            },
            "required": ["owner", "repo", "issueNumber"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CloseIssueArgs = parse_args(self.name(), arguments)?;
        let number = args.issue_number.to_string();
        let issue = self
            .client
            .send_json(
                Method::PATCH,
                &["repos", &args.owner, &args.repo, "issues", &number],
                &json!({ "state": "closed", "state_reason": args.state_reason.as_str() }),
            )
            .await?;
        Ok(json!({
            "number": issue["number"],
            "title": issue["title"],
            "state": issue["state"],
            "url": issue["html_url"],
            "closedAt": issue["closed_at"],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Arc<GithubClient> {
        Arc::new(GithubClient::new(&server.uri(), "t").unwrap())
    }

    #[test]
    fn pull_requests_are_filtered_from_issue_list() {
        let raw = json!([
            { "number": 1, "title": "Bug", "labels": [{ "name": "bug" }], "user": { "login": "a" } },
            { "number": 2, "title": "PR", "pull_request": { "url": "x" }, "user": { "login": "b" } }
        ]);
        let rows = issue_rows(&raw);
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["number"], 1);
        assert_eq!(rows[0]["labels"], json!(["bug"]));
    }

    #[test]
    fn issue_detail_collects_assignees() {
        let raw = json!({
            "number": 4,
            "assignees": [{ "login": "x" }, { "login": "y" }],
            "labels": [],
            "comments": 2,
            "user": { "login": "z" }
        });
        let detail = issue_detail(&raw);
        assert_eq!(detail["assignees"], json!(["x", "y"]));
        assert_eq!(detail["comments"], 2);
        assert!(detail["closedAt"].is_null());
    }

    #[tokio::test]
    async fn list_issues_passes_labels() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/o/r/issues"))
            .and(query_param("labels", "bug,ui"))
            .and(query_param("state", "open"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;

        let tool = ListIssues::new(client_for(&server));
        let out = tool
            .execute(json!({ "owner": "o", "repo": "r", "labels": "bug,ui" }))
            .await
            .unwrap();
        assert_eq!(out, json!([]));
    }

    #[tokio::test]
    async fn list_issues_rejects_bad_state() {
        let server = MockServer::start().await;
        let tool = ListIssues::new(client_for(&server));
        let err = tool
            .execute(json!({ "owner": "o", "repo": "r", "state": "merged" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn close_issue_sends_reason() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/o/r/issues/5"))
            .and(body_json(json!({ "state": "closed", "state_reason": "not_planned" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "number": 5, "title": "Old", "state": "closed", "html_url": "u", "closed_at": "2024-02-02T00:00:00Z"
            })))
            .mount(&server)
            .await;

        let tool = CloseIssue::new(client_for(&server));
        let out = tool
            .execute(json!({ "owner": "o", "repo": "r", "issueNumber": 5, "stateReason": "not_planned" }))
            .await
            .unwrap();
        assert_eq!(out["state"], "closed");
    }

    #[tokio::test]
    async fn create_issue_omits_empty_lists() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/o/r/issues"))
            .and(body_json(json!({ "title": "New" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "number": 10, "title": "New", "html_url": "u", "state": "open", "labels": []
            })))
            .mount(&server)
            .await;

        let tool = CreateIssue::new(client_for(&server));
        let out = tool
            .execute(json!({ "owner": "o", "repo": "r", "title": "New" }))
            .await
            .unwrap();
        assert_eq!(out["number"], 10);
    }
}
