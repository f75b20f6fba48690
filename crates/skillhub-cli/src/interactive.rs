//! Interactive prompts for the sync flow.
//!
//! Uses dialoguer for terminal UI prompts; all prompting stays here so the
//! core pipelines remain non-interactive.

use console::style;
use dialoguer::{Confirm, Password, theme::ColorfulTheme};

use skillhub_core::prelude::Decision;

/// Describe an actionable decision in one line.
pub fn describe(decision: &Decision) -> String {
    match decision {
        Decision::PublishNew { version } => {
            format!("publish new version {}", style(version).green())
        }
        Decision::PublishUpdate { from, to } => {
            format!("publish update {} -> {}", style(from).dim(), style(to).green())
        }
        Decision::UpdateAvailable { remote_version } => {
            format!("install update {}", style(remote_version).green())
        }
        Decision::InstallMissing => "reinstall missing files".to_string(),
        Decision::Skip | Decision::Unchanged => "nothing to do".to_string(),
        Decision::Conflict { reason } => format!("conflict: {}", style(reason).red()),
    }
}

/// Ask whether to apply one skill's pending action.
pub fn confirm_action(slug: &str, decision: &Decision) -> bool {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{}: {}?", style(slug).cyan().bold(), describe(decision)))
        .default(true)
        .interact()
        .unwrap_or(false)
}

/// Prompt for an API token without echoing it.
pub fn prompt_token() -> anyhow::Result<String> {
    let token = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("API token")
        .interact()?;
    Ok(token)
}
