//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::HistoryAction;
use orchestra_core::config::{self, AppConfig};
use orchestra_core::research::{HistoryStore, SessionRecord};
use std::path::Path;

/// Handle a CLI subcommand.
pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::History { action } => handle_history(action, workspace, config_file),
        Commands::Config { action } => handle_config(action, workspace, config_file),
    }
}

/// Open the history log the configuration points at.
pub(crate) fn history_store(config: &AppConfig, workspace: &Path) -> HistoryStore {
    HistoryStore::new(config.history.resolve_path(workspace))
}

/// One line of `history list` output.
pub(crate) fn summary_line(position: usize, record: &SessionRecord) -> String {
    format!(
        "{:>3}. {}  {}",
        position,
        record.timestamp.format("%Y-%m-%d %H:%M"),
        record.topic
    )
}

/// Pick a record by its 1-based position in a most-recent-first list.
fn select_record(records: &[SessionRecord], index: usize) -> anyhow::Result<&SessionRecord> {
    if records.is_empty() {
        anyhow::bail!("No research sessions recorded yet");
    }
    index
        .checked_sub(1)
        .and_then(|i| records.get(i))
        .ok_or_else(|| {
            anyhow::anyhow!(
                "No session at position {} (history holds {})",
                index,
                records.len()
            )
        })
}

fn handle_history(
    action: HistoryAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    let config = config::load_config(Some(workspace), config_file)
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
    let store = history_store(&config, workspace);
    let records = store.load_recent()?;

    match action {
        HistoryAction::List { limit } => {
            if records.is_empty() {
                println!("No research sessions recorded yet.");
                return Ok(());
            }
            let shown = limit.unwrap_or(records.len()).min(records.len());
            println!(
                "Research history ({} of {}) in {}:",
                shown,
                records.len(),
                store.path().display()
            );
            for (i, record) in records.iter().take(shown).enumerate() {
                println!("{}", summary_line(i + 1, record));
            }
            Ok(())
        }
        HistoryAction::Show { index } => {
            let record = select_record(&records, index)?;
            println!("# {}", record.topic);
            println!("_{}_\n", record.timestamp.to_rfc3339());
            println!("{}", record.report);
            Ok(())
        }
        HistoryAction::Export { index, out } => {
            let record = select_record(&records, index)?;
            let dest = out.unwrap_or_else(|| workspace.join(record.suggested_file_name()));
            HistoryStore::export_markdown(record, &dest)?;
            println!("Saved report to {}", dest.display());
            Ok(())
        }
    }
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let (config_path, created) = config::init_workspace_config(workspace)
                .map_err(|e| anyhow::anyhow!("Failed to write config: {}", e))?;
            if created {
                println!(
                    "Created default configuration at: {}",
                    config_path.display()
                );
            } else {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = config::load_config(Some(workspace), config_file)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            println!("{}", render_config(&config)?);
            for warning in config.validate() {
                println!("# warning: {}", warning);
            }
            Ok(())
        }
    }
}

/// TOML rendering of the configuration with secrets masked.
pub(crate) fn render_config(config: &AppConfig) -> anyhow::Result<String> {
    let mut shown = config.clone();
    for secret in shown.settings.credentials.values_mut() {
        if !secret.trim().is_empty() {
            *secret = "***".to_string();
        }
    }
    Ok(toml::to_string_pretty(&shown)?)
}
