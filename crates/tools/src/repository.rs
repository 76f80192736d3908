//! Repository tools: metadata, branches, and file contents.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
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

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RepoArgs {
    owner: String,
    repo: String,
}

/// Get repository metadata.
pub struct GetRepository {
    client: Arc<GithubClient>,
}

impl GetRepository {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

pub(crate) fn repository_summary(raw: &Value) -> Value {
    json!({
        "name": raw["name"],
        "fullName": raw["full_name"],
        "description": raw["description"],
        "url": raw["html_url"],
        "defaultBranch": raw["default_branch"],
        "stars": raw["stargazers_count"],
        "forks": raw["forks_count"],
        "openIssues": raw["open_issues_count"],
        "language": raw["language"],
        "private": raw["private"],
        "createdAt": raw["created_at"],
        "updatedAt": raw["updated_at"],
    })
}

#[async_trait]
impl Tool for GetRepository {
    fn name(&self) -> ToolName {
        ToolName::GetRepository
    }

    fn description(&self) -> &str {
        "Get information about a GitHub repository including description, stars, forks, language, and default branch"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner (user or organization)" },
                "repo": { "type": "string", "description": "Repository name" }
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: RepoArgs = parse_args(self.name(), arguments)?;
        let raw = self
            .client
            .get(&["repos", &args.owner, &args.repo], &[])
            .await?;
        Ok(repository_summary(&raw))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListBranchesArgs {
    owner: String,
    repo: String,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

/// List the branches of a repository.
pub struct ListBranches {
    client: Arc<GithubClient>,
}

impl ListBranches {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn branch_summaries(raw: &Value) -> Value {
    let branches: Vec<Value> = raw
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|b| {
                    json!({
                        "name": b["name"],
                        "sha": b["commit"]["sha"],
                        "protected": b["protected"],
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Value::Array(branches)
}

#[async_trait]
impl Tool for ListBranches {
    fn name(&self) -> ToolName {
        ToolName::ListBranches
    }

    fn description(&self) -> &str {
        "List branches in a GitHub repository"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "perPage": { "type": "integer", "description": "Number of branches to return (max 100)", "default": 30 }
            },
            "required": ["owner", "repo"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: ListBranchesArgs = parse_args(self.name(), arguments)?;
        let raw = self
            .client
            .get(
                &["repos", &args.owner, &args.repo, "branches"],
                &[("per_page", args.per_page.min(100).to_string())],
            )
            .await?;
        Ok(branch_summaries(&raw))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetFileContentArgs {
    owner: String,
    repo: String,
    path: String,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
}

/// Read a file or list a directory.
pub struct GetFileContent {
    client: Arc<GithubClient>,
}

impl GetFileContent {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn path_segments<'a>(owner: &'a str, repo: &'a str, path: &'a str) -> Vec<&'a str> {
    let mut segments = vec!["repos", owner, repo, "contents"];
    segments.extend(path.split('/').filter(|s| !s.is_empty()));
    segments
}

pub(crate) fn file_content(raw: &Value) -> Result<Value, ToolError> {
    if let Some(entries) = raw.as_array() {
        let entries: Vec<Value> = entries
            .iter()
            .map(|e| json!({ "name": e["name"], "type": e["type"], "path": e["path"] }))
            .collect();
        return Ok(json!({ "type": "directory", "entries": entries }));
    }

    if raw["type"].as_str() != Some("file") {
        return Ok(json!({ "type": raw["type"], "path": raw["path"] }));
    }

    let encoded: String = raw["content"]
        .as_str()
        .unwrap_or_default()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: ToolName::GetFileContent.to_string(),
            reason: format!("invalid base64 content: {e}"),
        })?;

    Ok(json!({
        "type": "file",
        "path": raw["path"],
        "sha": raw["sha"],
        "size": raw["size"],
        "content": String::from_utf8_lossy(&bytes),
    }))
}

#[async_trait]
impl Tool for GetFileContent {
    fn name(&self) -> ToolName {
        ToolName::GetFileContent
    }

    fn description(&self) -> &str {
        "Get the contents of a file or directory from a GitHub repository"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "path": { "type": "string", "description": "Path to the file or directory" },
                "ref": { "type": "string", "description": "Branch, tag, or commit SHA (defaults to the default branch)" }
            },
            "required": ["owner", "repo", "path"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: GetFileContentArgs = parse_args(self.name(), arguments)?;
        let mut query = Vec::new();
        crate::client::push_opt(&mut query, "ref", &args.git_ref);
        let raw = self
            .client
            .get(&path_segments(&args.owner, &args.repo, &args.path), &query)
            .await?;
        file_content(&raw)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrUpdateFileArgs {
    owner: String,
    repo: String,
    path: String,
    message: String,
    content: String,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    sha: Option<String>,
}

/// Create or update a file with a single commit.
pub struct CreateOrUpdateFile {
    client: Arc<GithubClient>,
}

impl CreateOrUpdateFile {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

fn file_write_body(args: &CreateOrUpdateFileArgs) -> Value {
    let mut body = json!({
        "message": args.message,
        "content": STANDARD.encode(args.content.as_bytes()),
    });
    if let Some(branch) = &args.branch {
        body["branch"] = json!(branch);
    }
    if let Some(sha) = &args.sha {
        body["sha"] = json!(sha);
    }
    body
}

fn file_write_summary(raw: &Value) -> Value {
    json!({
        "path": raw["content"]["path"],
        "sha": raw["content"]["sha"],
        "commitSha": raw["commit"]["sha"],
        "commitUrl": raw["commit"]["html_url"],
    })
}

#[async_trait]
impl Tool for CreateOrUpdateFile {
    fn name(&self) -> ToolName {
        ToolName::CreateOrUpdateFile
    }

    fn description(&self) -> &str {
        "Create a new file or update an existing file in a GitHub repository. Requires the file's current SHA when updating."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "owner": { "type": "string", "description": "Repository owner" },
                "repo": { "type": "string", "description": "Repository name" },
                "path": { "type": "string", "description": "Path of the file to write" },
                "message": { "type": "string", "description": "Commit message" },
                "content": { "type": "string", "description": "New file content (plain text)" },
                "branch": { "type": "string", "description": "Branch to commit to (defaults to the default branch)" },
                "sha": { "type": "string", "description": "Blob SHA of the file being replaced (required for updates)" }
            },
            "required": ["owner", "repo", "path", "message", "content"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: CreateOrUpdateFileArgs = parse_args(self.name(), arguments)?;
        let raw = self
            .client
            .send_json(
                Method::PUT,
                &path_segments(&args.owner, &args.repo, &args.path),
                &file_write_body(&args),
            )
            .await?;
        Ok(file_write_summary(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> Arc<GithubClient> {
        Arc::new(GithubClient::new(&server.uri(), "test-token").unwrap())
    }

    #[test]
    fn repository_summary_maps_fields() {
        let raw = json!({
            "name": "hello",
            "full_name": "octo/hello",
            "html_url": "https://github.com/octo/hello",
            "default_branch": "main",
            "stargazers_count": 42,
            "forks_count": 3,
            "open_issues_count": 1,
            "language": "Rust",
            "private": false
        });
        let summary = repository_summary(&raw);
        assert_eq!(summary["fullName"], "octo/hello");
        assert_eq!(summary["stars"], 42);
        assert_eq!(summary["defaultBranch"], "main");
        assert!(summary["description"].is_null());
    }

    #[test]
    fn directory_listing_is_summarized() {
        let raw = json!([
            { "name": "src", "type": "dir", "path": "src", "sha": "a" },
            { "name": "README.md", "type": "file", "path": "README.md", "sha": "b" }
        ]);
        let out = file_content(&raw).unwrap();
        assert_eq!(out["type"], "directory");
        assert_eq!(out["entries"].as_array().unwrap().len(), 2);
        assert_eq!(out["entries"][1]["name"], "README.md");
        assert!(out["entries"][0].get("sha").is_none());
    }

    #[test]
    fn file_content_is_decoded_across_line_breaks() {
        let raw = json!({
            "type": "file",
            "path": "README.md",
            "sha": "abc",
            "size": 12,
            "content": "SGVsbG8s\nIHdvcmxk\n"
        });
        let out = file_content(&raw).unwrap();
        assert_eq!(out["content"], "Hello, world");
        assert_eq!(out["sha"], "abc");
    }

    #[test]
    fn symlinks_report_type_only() {
        let raw = json!({ "type": "symlink", "path": "link", "target": "elsewhere" });
        let out = file_content(&raw).unwrap();
        assert_eq!(out, json!({ "type": "symlink", "path": "link" }));
    }

    #[tokio::test]
    async fn get_file_content_passes_ref() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/hello/contents/docs/guide.md"))
            .and(query_param("ref", "dev"))
            .and(header("authorization", "Bearer test-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "file",
                "path": "docs/guide.md",
                "sha": "s1",
                "size": 2,
                "content": "aGk="
            })))
            .mount(&server)
            .await;

        let tool = GetFileContent::new(client_for(&server));
        let out = tool
            .execute(json!({ "owner": "octo", "repo": "hello", "path": "docs/guide.md", "ref": "dev" }))
            .await
            .unwrap();
        assert_eq!(out["content"], "hi");
    }

    #[tokio::test]
    async fn create_or_update_file_encodes_content() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/repos/octo/hello/contents/notes.txt"))
            .and(body_partial_json(json!({
                "message": "add notes",
                "content": "aGVsbG8=",
                "branch": "feature"
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "content": { "path": "notes.txt", "sha": "blob1" },
                "commit": { "sha": "c1", "html_url": "https://github.com/octo/hello/commit/c1" }
            })))
            .mount(&server)
            .await;

        let tool = CreateOrUpdateFile::new(client_for(&server));
        let out = tool
            .execute(json!({
                "owner": "octo",
                "repo": "hello",
                "path": "notes.txt",
                "message": "add notes",
                "content": "hello",
                "branch": "feature"
            }))
            .await
            .unwrap();
        assert_eq!(out["sha"], "blob1");
        assert_eq!(out["commitSha"], "c1");
    }

    #[tokio::test]
    async fn not_found_is_an_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/octo/missing"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({ "message": "Not Found" })),
            )
            .mount(&server)
            .await;

        let tool = GetRepository::new(client_for(&server));
        let err = tool
            .execute(json!({ "owner": "octo", "repo": "missing" }))
            .await
            .unwrap_err();
        match err {
            ToolError::Upstream { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_arguments_are_rejected() {
        let server = MockServer::start().await;
        let tool = ListBranches::new(client_for(&server));
        let err = tool.execute(json!({ "owner": "octo" })).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
