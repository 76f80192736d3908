//! Minimal GitHub REST client shared by every tool.
//!
//! Holds one `reqwest::Client` and the caller's token. Paths are built from
//! segments so owner, repo, and file path components are percent-encoded.

use repolens_core::error::ToolError;
use repolens_core::tool::ToolName;
use reqwest::{Method, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

pub struct GithubClient {
    base_url: Url,
    token: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl GithubClient {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, ToolError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| client_error(format!("invalid GitHub API URL '{base_url}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(client_error(format!("GitHub API URL '{base_url}' cannot be a base")));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("repolens/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| client_error(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url,
            token: token.into(),
            http,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        url
    }

    /// Send a request and decode the JSON response.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<T, ToolError> {
        let url = self.url(segments);
        debug!(%method, url = %url, "GitHub request");

        let mut builder = self
            .http
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        // Without a token requests go out unauthenticated (public data only).
        if !self.token.is_empty() {
            builder = builder.bearer_auth(&self.token);
        }
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| client_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| v["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(ToolError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| client_error(format!("invalid response body: {e}")))
    }

    pub async fn get(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, ToolError> {
        self.request(Method::GET, segments, query, None).await
    }

    pub async fn send_json(
        &self,
        method: Method,
        segments: &[&str],
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ToolError> {
        self.request(method, segments, &[], Some(body)).await
    }
}

fn client_error(reason: String) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: "github".into(),
        reason,
    }
}

/// Decode tool arguments into their typed form.
pub fn parse_args<T: DeserializeOwned>(tool: ToolName, arguments: serde_json::Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolError::InvalidArguments(format!("{tool}: {e}")))
}

/// Label entries are either strings or objects with a `name`.
pub fn label_names(labels: &serde_json::Value) -> Vec<String> {
    labels
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|l| l.as_str().or_else(|| l["name"].as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Optional query parameter helper.
pub fn push_opt(query: &mut Vec<(&'static str, String)>, key: &'static str, value: &Option<String>) {
    if let Some(value) = value {
        query.push((key, value.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_segments_are_encoded() {
        let client = GithubClient::new("https://api.github.com", "t").unwrap();
        let url = client.url(&["repos", "octo cat", "hello", "contents", "dir", "a#b.md"]);
        assert_eq!(
            url.as_str(),
            "https://api.github.com/repos/octo%20cat/hello/contents/dir/a%23b.md"
        );
    }

    #[test]
    fn base_url_with_path_prefix() {
        let client = GithubClient::new("https://ghe.example.com/api/v3/", "t").unwrap();
        let url = client.url(&["repos", "a", "b"]);
        assert_eq!(url.as_str(), "https://ghe.example.com/api/v3/repos/a/b");
    }

    #[test]
    fn label_names_accepts_both_shapes() {
        let labels = serde_json::json!(["bug", {"name": "help wanted", "color": "fff"}]);
        assert_eq!(label_names(&labels), vec!["bug", "help wanted"]);
    }

    #[tokio::test]
    async fn empty_token_sends_no_authorization() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rate_limit"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        let client = GithubClient::new(&server.uri(), "").unwrap();
        client.get(&["rate_limit"], &[]).await.unwrap();

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("authorization").is_none());
    }

    #[test]
    fn debug_hides_token() {
        let client = GithubClient::new(DEFAULT_API_URL, "ghp_secret").unwrap();
        assert!(!format!("{client:?}").contains("ghp_secret"));
    }

    #[test]
    fn invalid_arguments_name_the_tool() {
        #[derive(serde::Deserialize, Debug)]
        #[allow(dead_code)]
        struct Args {
            owner: String,
        }
        let err = parse_args::<Args>(ToolName::GetRepository, serde_json::json!({}))
            .unwrap_err();
        assert!(err.to_string().contains("getRepository"));
    }
}
