//! Code and repository search.

use async_trait::async_trait;
use repolens_core::error::ToolError;
use repolens_core::tool::{Tool, ToolName};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::client::{GithubClient, parse_args};

fn default_per_page() -> u32 {
    10
}

fn search_result(raw: &Value, item: impl Fn(&Value) -> Value) -> Value {
    let items: Vec<Value> = raw["items"]
        .as_array()
        .map(|items| items.iter().map(item).collect())
        .unwrap_or_default();
    json!({
        "totalCount": raw["total_count"],
        "items": items,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchCodeArgs {
    query: String,
    #[serde(default = "default_per_page")]
    per_page: u32,
}

pub struct SearchCode {
    client: Arc<GithubClient>,
}

impl SearchCode {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SearchCode {
    fn name(&self) -> ToolName {
        ToolName::SearchCode
    }

    fn description(&self) -> &str {
        "Search for code across GitHub repositories. Use qualifiers like 'repo:owner/name' or 'language:rust' to narrow results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query using GitHub code search syntax" },
                "perPage": { "type": "integer", "description": "Number of results to return (max 100)", "default": 10 }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: SearchCodeArgs = parse_args(self.name(), arguments)?;
        let raw = self
            .client
            .get(
                &["search", "code"],
                &[
                    ("q", args.query),
                    ("per_page", args.per_page.min(100).to_string()),
                ],
            )
            .await?;
        Ok(search_result(&raw, |item| {
            json!({
                "name": item["name"],
                "path": item["path"],
                "url": item["html_url"],
                "repository": item["repository"]["full_name"],
                "sha": item["sha"],
            })
        }))
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum RepoSort {
    Stars,
    Forks,
    HelpWantedIssues,
    Updated,
}

impl RepoSort {
    fn as_str(self) -> &'static str {
        match self {
            RepoSort::Stars => "stars",
            RepoSort::Forks => "forks",
            RepoSort::HelpWantedIssues => "help-wanted-issues",
            RepoSort::Updated => "updated",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SortOrder {
    Asc,
    #[default]
    Desc,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchRepositoriesArgs {
    query: String,
    #[serde(default = "default_per_page")]
    per_page: u32,
    #[serde(default)]
    sort: Option<RepoSort>,
    #[serde(default)]
    order: SortOrder,
}

pub struct SearchRepositories {
    client: Arc<GithubClient>,
}

impl SearchRepositories {
    pub fn new(client: Arc<GithubClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for SearchRepositories {
    fn name(&self) -> ToolName {
        ToolName::SearchRepositories
    }

    fn description(&self) -> &str {
        "Search for GitHub repositories by name, description, topic, or language"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Search query using GitHub repository search syntax" },
                "perPage": { "type": "integer", "description": "Number of results to return (max 100)", "default": 10 },
                "sort": { "type": "string", "enum": ["stars", "forks", "help-wanted-issues", "updated"] },
                "order": { "type": "string", "enum": ["asc", "desc"], "default": "desc" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        let args: SearchRepositoriesArgs = parse_args(self.name(), arguments)?;
        let mut query = vec![
            ("q", args.query),
            ("per_page", args.per_page.min(100).to_string()),
        ];
        if let Some(sort) = args.sort {
            query.push(("sort", sort.as_str().to_string()));
            let order = match args.order {
                SortOrder::Asc => "asc",
                SortOrder::Desc => "desc",
            };
            query.push(("order", order.to_string()));
        }
        let raw = self
            .client
            .get(&["search", "repositories"], &query)
            .await?;
        Ok(search_result(&raw, |repo| {
            json!({
                "name": repo["name"],
                "fullName": repo["full_name"],
                "description": repo["description"],
                "url": repo["html_url"],
                "stars": repo["stargazers_count"],
                "forks": repo["forks_count"],
                "language": repo["language"],
                "topics": repo["topics"].as_array().cloned().unwrap_or_default(),
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_code_maps_items() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/code"))
            .and(query_param("q", "fn main repo:o/r"))
            .and(query_param("per_page", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1,
                "items": [{
                    "name": "main.rs",
                    "path": "src/main.rs",
                    "html_url": "u",
                    "sha": "s",
                    "repository": { "full_name": "o/r" }
                }]
            })))
            .mount(&server)
            .await;

        let tool = SearchCode::new(Arc::new(GithubClient::new(&server.uri(), "t").unwrap()));
        let out = tool
            .execute(json!({ "query": "fn main repo:o/r" }))
            .await
            .unwrap();
        assert_eq!(out["totalCount"], 1);
        assert_eq!(out["items"][0]["repository"], "o/r");
    }

    #[tokio::test]
    async fn search_repositories_sends_sort_and_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search/repositories"))
            .and(query_param("sort", "help-wanted-issues"))
            .and(query_param("order", "desc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "total_count": 1,
                "items": [{ "name": "r", "full_name": "o/r", "stargazers_count": 5 }]
            })))
            .mount(&server)
            .await;

        let tool =
            SearchRepositories::new(Arc::new(GithubClient::new(&server.uri(), "t").unwrap()));
        let out = tool
            .execute(json!({ "query": "agent", "sort": "help-wanted-issues" }))
            .await
            .unwrap();
        assert_eq!(out["items"][0]["stars"], 5);
        assert_eq!(out["items"][0]["topics"], json!([]));
    }
}
