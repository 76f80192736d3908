//! `repolens tools`: Show the tool catalog and what the configuration allows.

use repolens_config::AppConfig;
use repolens_core::tool::{Preset, ToolName};

pub async fn run(preset: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let preset = preset.map(|p| p.parse::<Preset>()).transpose()?;
    let selected: Option<Vec<String>> = match preset {
        Some(preset) => Some(
            preset
                .tools()
                .iter()
                .map(|t| t.as_str().to_string())
                .collect(),
        ),
        None => config.tools.selection.allow_list(),
    };

    let rows = catalog_rows(&config, selected.as_deref());
    match preset {
        Some(preset) => println!("Preset: {preset}"),
        None if selected.is_some() => println!("Configured selection"),
        None => println!("Full catalog"),
    }
    println!();
    println!("  {:<24} {:<6} {:<9} {}", "TOOL", "WRITE", "APPROVAL", "ENABLED");
    for row in &rows {
        println!(
            "  {:<24} {:<6} {:<9} {}",
            row.name,
            yes_no(row.write),
            yes_no(row.approval),
            yes_no(row.enabled)
        );
    }
    println!();
    println!("  Presets: {}", Preset::ALL.map(|p| p.as_str()).join(", "));

    Ok(())
}

struct Row {
    name: &'static str,
    write: bool,
    approval: bool,
    enabled: bool,
}

fn catalog_rows(config: &AppConfig, selected: Option<&[String]>) -> Vec<Row> {
    ToolName::ALL
        .into_iter()
        .map(|tool| Row {
            name: tool.as_str(),
            write: tool.is_write(),
            approval: config.tools.require_approval.needs_approval(tool),
            enabled: selected.is_none_or(|names| names.iter().any(|n| n == tool.as_str())),
        })
        .collect()
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "-" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use repolens_core::approval::ApprovalConfig;

    #[test]
    fn full_catalog_is_enabled_by_default() {
        let rows = catalog_rows(&AppConfig::default(), None);
        assert_eq!(rows.len(), 18);
        assert!(rows.iter().all(|r| r.enabled));
        assert_eq!(rows.iter().filter(|r| r.write).count(), 7);
        assert!(rows.iter().filter(|r| r.write).all(|r| r.approval));
    }

    #[test]
    fn selection_marks_enabled_tools() {
        let selected = vec!["getIssue".to_string()];
        let rows = catalog_rows(&AppConfig::default(), Some(&selected));
        let enabled: Vec<&str> = rows.iter().filter(|r| r.enabled).map(|r| r.name).collect();
        assert_eq!(enabled, vec!["getIssue"]);
    }

    #[test]
    fn approval_can_be_switched_off() {
        let mut config = AppConfig::default();
        config.tools.require_approval = ApprovalConfig::Global(false);
        let rows = catalog_rows(&config, None);
        assert!(rows.iter().all(|r| !r.approval));
    }
}
