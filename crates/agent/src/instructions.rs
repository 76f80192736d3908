//! System instructions for the agent.

use repolens_core::tool::Preset;

/// Appended to every built-in prompt.
pub const SHARED_RULES: &str = "When a tool execution is denied by the user, do not retry it. Briefly acknowledge the decision and move on.";

const DEFAULT_PROMPT: &str = "You are a helpful GitHub assistant. You can read and explore repositories, issues, pull requests, commits, and code. You can also create issues, pull requests, comments, and update files when asked.";

const CODE_REVIEW_PROMPT: &str = "You are a code review assistant. Your job is to review pull requests thoroughly and provide constructive feedback.

When reviewing a PR:
- Read the PR description and changed files carefully
- Check for bugs, logic errors, and edge cases
- Suggest improvements when you spot issues
- Be constructive: explain why something is a problem and how to fix it
- Post your review as PR comments when asked";

const ISSUE_TRIAGE_PROMPT: &str = "You are an issue triage assistant. Your job is to help manage and organize GitHub issues.

When triaging issues:
- Read issue descriptions carefully to understand the problem
- Identify duplicates when possible
- Help categorize and prioritize issues
- Respond to users with clear, helpful information
- Create new issues when asked, with clear titles and descriptions";

const REPO_EXPLORER_PROMPT: &str = "You are a repository explorer. Your job is to help users understand codebases and find information across GitHub repositories.

When exploring repos:
- Answer questions about code structure and organization
- Summarize recent activity (commits, PRs, issues)
- Find specific files, functions, or patterns in code
- Explain how different parts of the codebase work together
- You have read-only access and cannot make changes";

const MAINTAINER_PROMPT: &str = "You are a repository maintainer assistant. You have full access to manage repositories, issues, and pull requests.

When maintaining repos:
- Be careful with write operations and review before acting
- Create well-structured issues and PRs with clear descriptions
- Use merge strategies appropriate for the repository
- Keep commit messages clean and descriptive
- When closing issues, provide a clear reason";

/// Formatting rules sent with chat turns.
pub const FORMATTING_RULES: &str = "**FORMATTING RULES (CRITICAL):**
- ABSOLUTELY NO MARKDOWN HEADINGS: Never use #, ##, ###, ####, #####, or ######
- NO underline-style headings with === or ---
- Use **bold text** for emphasis and section labels instead
- Start all responses with content, never with a heading";

/// The built-in prompt for one preset (or the general prompt), with the shared rules.
pub fn default_prompt(preset: Option<Preset>) -> String {
    let body = match preset {
        None => DEFAULT_PROMPT,
        Some(Preset::CodeReview) => CODE_REVIEW_PROMPT,
        Some(Preset::IssueTriage) => ISSUE_TRIAGE_PROMPT,
        Some(Preset::RepoExplorer) => REPO_EXPLORER_PROMPT,
        Some(Preset::Maintainer) => MAINTAINER_PROMPT,
    };
    format!("{body}\n\n{SHARED_RULES}")
}

/// Assemble the system prompt.
///
/// An explicit `instructions` override replaces everything else.
pub fn resolve(
    preset: Option<Preset>,
    instructions: Option<&str>,
    additional: Option<&str>,
) -> String {
    if let Some(instructions) = instructions.filter(|s| !s.trim().is_empty()) {
        return instructions.to_string();
    }
    let prompt = default_prompt(preset);
    match additional.filter(|s| !s.trim().is_empty()) {
        Some(additional) => format!("{prompt}\n\n{additional}"),
        None => prompt,
    }
}

/// Per-turn additions: configured text, the caller's name, formatting rules.
pub fn turn_additions(configured: Option<&str>, username: Option<&str>) -> String {
    let mut lines = Vec::new();
    if let Some(configured) = configured.filter(|s| !s.trim().is_empty()) {
        lines.push(configured.to_string());
    }
    if let Some(name) = username.filter(|s| !s.trim().is_empty()) {
        lines.push(format!("The user's name is {name}."));
    }
    lines.push(FORMATTING_RULES.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_prompt_carries_shared_rules() {
        let mut presets: Vec<Option<Preset>> = Preset::ALL.into_iter().map(Some).collect();
        presets.push(None);
        for preset in presets {
            assert!(default_prompt(preset).ends_with(SHARED_RULES));
        }
    }

    #[test]
    fn override_replaces_everything() {
        let prompt = resolve(Some(Preset::Maintainer), Some("Be terse."), Some("extra"));
        assert_eq!(prompt, "Be terse.");
    }

    #[test]
    fn additional_instructions_are_appended() {
        let prompt = resolve(None, None, Some("The user's name is octo."));
        assert!(prompt.starts_with("You are a helpful GitHub assistant."));
        assert!(prompt.ends_with("The user's name is octo."));
    }

    #[test]
    fn blank_override_is_ignored() {
        let prompt = resolve(Some(Preset::RepoExplorer), Some("   "), None);
        assert!(prompt.starts_with("You are a repository explorer."));
    }

    #[test]
    fn turn_additions_include_username_and_rules() {
        let text = turn_additions(Some("Answer in English."), Some("octo"));
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Answer in English.");
        assert_eq!(lines[1], "The user's name is octo.");
        assert!(text.contains("NO MARKDOWN HEADINGS"));
    }

    #[test]
    fn turn_additions_skip_missing_name() {
        let text = turn_additions(None, None);
        assert!(!text.contains("user's name"));
        assert!(text.starts_with("**FORMATTING RULES"));
    }
}
