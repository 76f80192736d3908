//! Chat title generation.
//!
//! Titles are plain text of at most [`MAX_TITLE_CHARS`] characters. A model
//! writes them from the first user message; when the model fails or returns
//! nothing usable, the user's own text is cut down instead.

use repolens_core::message::Message;
use repolens_core::provider::{Provider, ProviderRequest};
use tracing::{debug, warn};

pub const MAX_TITLE_CHARS: usize = 30;

const FALLBACK_TITLE: &str = "New chat";

const TITLE_PROMPT: &str = "You are a title generator for a chat:
- Generate a short title based on the first user's message
- The title should be less than 30 characters long
- The title should be a summary of the user's message
- Do not use quotes (' or \") or colons (:) or any other punctuation
- Do not use markdown, just plain text";

/// Strip markup and punctuation the title must not carry, then bound its length.
pub fn sanitize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .map(|c| match c {
            '"' | '\'' | '`' | ':' | '#' | '*' | '_' | '~' | '>' | '[' | ']' => ' ',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let title = truncate(&collapsed, MAX_TITLE_CHARS);
    (!title.is_empty()).then_some(title)
}

/// Cut at a word boundary when one exists within the bound.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    match cut.rfind(' ') {
        Some(space) if space > 0 => cut[..space].trim_end().to_string(),
        _ => cut,
    }
}

/// A title taken from the user's text.
pub fn fallback(user_text: &str) -> String {
    sanitize(user_text).unwrap_or_else(|| FALLBACK_TITLE.to_string())
}

/// Ask the model for a title. Never fails: errors fall back to the user's text.
pub async fn generate(provider: &dyn Provider, model: &str, first_message: &Message) -> String {
    let user_text = first_message.text();
    let mut request = ProviderRequest::new(model, vec![Message::user(user_text.clone())]);
    request.system = Some(TITLE_PROMPT.to_string());
    request.max_tokens = Some(32);

    match provider.complete(request).await {
        Ok(response) => match sanitize(&response.text) {
            Some(title) => {
                debug!(title = %title, "Generated chat title");
                title
            }
            None => fallback(&user_text),
        },
        Err(e) => {
            warn!(error = %e, "Title generation failed; using fallback");
            fallback(&user_text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::ScriptedProvider;
    use repolens_core::error::ProviderError;

    #[test]
    fn sanitize_strips_quotes_colons_and_markdown() {
        assert_eq!(
            sanitize("\"**Title:** Fix `bug`\"").as_deref(),
            Some("Title Fix bug")
        );
    }

    #[test]
    fn sanitize_collapses_whitespace() {
        assert_eq!(sanitize("  Rust \n\n  agents  ").as_deref(), Some("Rust agents"));
    }

    #[test]
    fn sanitize_bounds_length_at_word_boundary() {
        let title = sanitize("Review the authentication middleware changes in PR 42").unwrap();
        assert!(title.chars().count() <= MAX_TITLE_CHARS);
        assert_eq!(title, "Review the authentication");
    }

    #[test]
    fn sanitize_hard_cuts_a_single_long_word() {
        let title = sanitize(&"a".repeat(50)).unwrap();
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn sanitize_rejects_empty_result() {
        assert_eq!(sanitize("\"\" ** ::"), None);
    }

    #[test]
    fn multibyte_titles_are_cut_on_char_boundaries() {
        let title = sanitize(&"é".repeat(40)).unwrap();
        assert_eq!(title.chars().count(), MAX_TITLE_CHARS);
    }

    #[test]
    fn fallback_uses_user_text() {
        assert_eq!(fallback("What changed in v2?"), "What changed in v2?");
        assert_eq!(fallback("***"), "New chat");
    }

    #[tokio::test]
    async fn generate_uses_model_output() {
        let provider = ScriptedProvider::new(vec![]).with_title(Ok("Stars of octo/hello".into()));
        let title = generate(&provider, "title-model", &Message::user("how many stars?")).await;
        assert_eq!(title, "Stars of octo/hello");
    }

    #[tokio::test]
    async fn generate_falls_back_on_error() {
        let provider = ScriptedProvider::new(vec![])
            .with_title(Err(ProviderError::Network("offline".into())));
        let title = generate(&provider, "title-model", &Message::user("List open issues")).await;
        assert_eq!(title, "List open issues");
    }
}
