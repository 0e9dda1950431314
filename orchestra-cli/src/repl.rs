//! REPL (Read-Eval-Print Loop) for interactive research sessions.
//!
//! Plain input starts research on a topic or, when the agent asked a
//! question, answers it. Slash commands cover the remaining actions.

use crate::commands;
use dialoguer::{Input, Password, Select};
use orchestra_core::config::{
    ANTHROPIC_API_KEY, AppConfig, GOOGLE_API_KEY, Provider, Settings, SettingsUpdate,
    TAVILY_API_KEY,
};
use orchestra_core::research::{
    Action, HistoryStore, MockResearchAgent, Outcome, Rejection, RemoteResearchAgent,
    ResearchAgent, ResearchController, SessionPhase, SessionRecord, SessionStore,
};
use orchestra_core::research::controller::resolve_topic;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Notify, mpsc};

const CREDENTIAL_KEYS: [&str; 3] = [TAVILY_API_KEY, GOOGLE_API_KEY, ANTHROPIC_API_KEY];

/// A parsed line of REPL input.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ReplCommand {
    /// Free text: a topic, or the answer to a pending question.
    Text(String),
    /// Continue without further clarification, optionally renaming the topic.
    Force(Option<String>),
    Settings,
    History,
    Save(Option<PathBuf>),
    New,
    Status,
    Help,
    Quit,
    Unknown(String),
}

pub(crate) fn parse_command(input: &str) -> Option<ReplCommand> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if !input.starts_with('/') {
        return Some(ReplCommand::Text(input.to_string()));
    }

    let (cmd, arg) = match input.split_once(char::is_whitespace) {
        Some((cmd, arg)) => (cmd, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (input, None),
    };
    let command = match cmd {
        "/force" | "/continue" => ReplCommand::Force(arg.map(str::to_string)),
        "/settings" => ReplCommand::Settings,
        "/history" => ReplCommand::History,
        "/save" => ReplCommand::Save(arg.map(PathBuf::from)),
        "/new" | "/reset" => ReplCommand::New,
        "/status" => ReplCommand::Status,
        "/help" | "/?" => ReplCommand::Help,
        "/quit" | "/exit" | "/q" => ReplCommand::Quit,
        other => ReplCommand::Unknown(other.to_string()),
    };
    Some(command)
}

/// Shown when text arrives while the agent still owes an answer.
const PENDING_HINT: &str =
    "The agent has not answered the last message yet. Use /force to continue, or /new to start over.";

/// Map free text to the action the current phase calls for.
///
/// A pending conversation already ends in a user turn, so the text would
/// not be sent; the caller gets a hint instead.
pub(crate) fn text_action(phase: SessionPhase, text: String) -> Result<Action, &'static str> {
    match phase {
        SessionPhase::AwaitingClarification => Ok(Action::SubmitClarification {
            answer: text,
            topic: None,
        }),
        SessionPhase::Pending => Err(PENDING_HINT),
        _ => Ok(Action::Start { topic: text }),
    }
}

fn help_text() -> &'static str {
    "\
  <text>           Start research on a topic, or answer the agent's question
  /force [topic]   Continue without further clarification
  /settings        Change provider, temperature, token budget and API keys
  /history         List completed research sessions
  /save [path]     Save the current report as Markdown
  /new             Start a fresh conversation
  /status          Show the session phase
  /quit            Exit
  Ctrl-C           Ask a running research to stop"
}

/// Pick the agent implementation for this session.
pub(crate) fn build_agent(config: &AppConfig, offline: bool) -> Arc<dyn ResearchAgent> {
    if offline {
        return Arc::new(MockResearchAgent::new());
    }
    match RemoteResearchAgent::new(&config.agent) {
        Ok(agent) => Arc::new(agent),
        Err(e) => {
            tracing::warn!("Research agent init failed: {}. Using offline agent.", e);
            Arc::new(MockResearchAgent::new())
        }
    }
}

/// Run the interactive research REPL.
pub async fn run_interactive(
    config: AppConfig,
    workspace: PathBuf,
    initial_topic: Option<String>,
    offline: bool,
) -> anyhow::Result<()> {
    let agent = build_agent(&config, offline);
    let history = commands::history_store(&config, &workspace);
    let controller = Arc::new(ResearchController::new(
        agent.clone(),
        history,
        SessionStore::new(config.settings.clone()),
    ));

    println!("\x1b[1;35m\n  OrchestraAI Deep Research\x1b[0m");
    println!(
        "  Agent: {} | Provider: {} | History: {}",
        agent.name(),
        config.settings.provider,
        controller.history().path().display()
    );
    println!("  Type /help for commands, /quit to exit\n");

    // Ctrl-C records a stop while research runs and ends the loop otherwise.
    let quit = Arc::new(Notify::new());
    let stop_handle = controller.clone();
    let quit_signal = quit.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !handle_interrupt(&stop_handle, &quit_signal) {
                break;
            }
        }
    });

    // Stdin is read on its own thread so the loop can also wait for Ctrl-C.
    let (line_tx, mut lines) = mpsc::unbounded_channel::<io::Result<String>>();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    if let Some(topic) = initial_topic {
        dispatch(&controller, Action::Start { topic });
    }

    loop {
        print!("{}", prompt(controller.phase()));
        io::stdout().flush()?;

        let input = tokio::select! {
            line = lines.recv() => match line {
                Some(Ok(line)) => line,
                _ => break,
            },
            _ = quit.notified() => {
                println!();
                break;
            }
        };
        let Some(command) = parse_command(&input) else {
            continue;
        };

        match command {
            ReplCommand::Text(text) => {
                // A finished session makes room for the next topic.
                if controller.phase() == SessionPhase::Completed {
                    controller.store().reset_conversation();
                }
                match text_action(controller.phase(), text) {
                    Ok(action) => dispatch(&controller, action),
                    Err(hint) => println!("  {}", hint),
                }
            }
            ReplCommand::Force(topic) => dispatch(&controller, Action::ForceContinue { topic }),
            ReplCommand::Settings => match prompt_settings(&controller.store().settings()) {
                Ok(update) => dispatch(&controller, Action::SaveSettings(update)),
                Err(e) => eprintln!("  Settings unchanged: {}", e),
            },
            ReplCommand::History => print_history(controller.history()),
            ReplCommand::Save(path) => save_report(&controller, path, &workspace),
            ReplCommand::New => {
                if controller.store().reset_conversation() {
                    println!("  Started a new conversation.");
                }
            }
            ReplCommand::Status => println!("  Session: {}", controller.phase()),
            ReplCommand::Help => println!("{}", help_text()),
            ReplCommand::Quit => {
                println!("Goodbye!");
                break;
            }
            ReplCommand::Unknown(cmd) => {
                println!("  Unknown command: {}. Type /help for commands.", cmd);
            }
        }
    }
    Ok(())
}

/// React to Ctrl-C. Returns whether the REPL keeps running.
fn handle_interrupt(controller: &ResearchController, quit: &Notify) -> bool {
    match controller.request_stop() {
        Outcome::StopRecorded => {
            println!("\n\x1b[33m  Stop requested; the current step will finish first.\x1b[0m");
            true
        }
        _ => {
            quit.notify_one();
            false
        }
    }
}

fn prompt(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::AwaitingClarification => "\x1b[1;33manswer> \x1b[0m",
        SessionPhase::Completed => "\x1b[1;32mtopic> \x1b[0m",
        _ => "\x1b[1;34mtopic> \x1b[0m",
    }
}

fn dispatch(controller: &ResearchController, action: Action) {
    if matches!(
        action,
        Action::Start { .. } | Action::ForceContinue { .. } | Action::SubmitClarification { .. }
    ) {
        println!("\x1b[90m  researching...\x1b[0m");
    }
    match controller.dispatch(action) {
        Ok(outcome) => print_outcome(&outcome),
        Err(e) => eprintln!("\x1b[31m  Error:\x1b[0m {}", e),
    }
}

fn print_outcome(outcome: &Outcome) {
    let width = textwrap::termwidth().saturating_sub(4).max(40);
    match outcome {
        Outcome::Clarification { question } => {
            println!("\n\x1b[33m?\x1b[0m {}", textwrap::fill(question, width));
            println!("\x1b[90m  Answer below, or /force to continue without clarifying.\x1b[0m\n");
        }
        Outcome::Completed { report, record } => {
            println!("\n{}\n", report);
            println!(
                "\x1b[90m  Saved to history as \"{}\". /save writes it to a file.\x1b[0m\n",
                record.topic
            );
        }
        Outcome::Pending => {
            println!("  The agent returned without a question or a report. Try /force.");
        }
        Outcome::StopRecorded => println!("  Stop requested."),
        Outcome::SettingsSaved { warnings } => {
            println!("  Settings saved.");
            for warning in warnings {
                println!("\x1b[33m  Warning:\x1b[0m {}", warning);
            }
        }
        Outcome::Ignored(rejection) => println!("  {}", rejection_hint(*rejection)),
    }
}

fn rejection_hint(rejection: Rejection) -> String {
    match rejection {
        Rejection::NoConversation => "Nothing to continue yet; enter a topic first.".to_string(),
        Rejection::NotAwaitingClarification => {
            "The agent is not waiting for an answer.".to_string()
        }
        other => {
            let text = other.to_string();
            let mut chars = text.chars();
            match chars.next() {
                Some(first) => format!("{}{}.", first.to_uppercase(), chars.as_str()),
                None => text,
            }
        }
    }
}

fn print_history(history: &HistoryStore) {
    match history.load_recent() {
        Ok(records) if records.is_empty() => println!("  No research sessions recorded yet."),
        Ok(records) => {
            for (i, record) in records.iter().enumerate() {
                println!("{}", commands::summary_line(i + 1, record));
            }
        }
        Err(e) => eprintln!("\x1b[31m  Error:\x1b[0m {}", e),
    }
}

fn save_report(controller: &ResearchController, path: Option<PathBuf>, workspace: &Path) {
    let state = controller.state();
    let Some(report) = state.report else {
        println!("  No report yet.");
        return;
    };
    let record = SessionRecord {
        topic: resolve_topic(None, &state.conversation),
        report,
        timestamp: chrono::Local::now(),
    };
    let dest = path
        .map(|p| if p.is_absolute() { p } else { workspace.join(p) })
        .unwrap_or_else(|| workspace.join(record.suggested_file_name()));
    match HistoryStore::export_markdown(&record, &dest) {
        Ok(()) => println!("  Saved report to {}", dest.display()),
        Err(e) => eprintln!("\x1b[31m  Error:\x1b[0m {}", e),
    }
}

/// Walk the user through the settings form.
///
/// API keys are prompted without echo; leaving one blank keeps the stored key.
fn prompt_settings(current: &Settings) -> anyhow::Result<SettingsUpdate> {
    let labels: Vec<String> = Provider::ALL.iter().map(|p| p.to_string()).collect();
    let default_index = Provider::ALL
        .iter()
        .position(|p| *p == current.provider)
        .unwrap_or(0);
    let selection = Select::new()
        .with_prompt("Model provider")
        .items(&labels)
        .default(default_index)
        .interact()?;

    let temperature: f32 = Input::new()
        .with_prompt("Temperature (0.0 - 1.0)")
        .default(current.temperature)
        .interact_text()?;
    let max_tokens: u32 = Input::new()
        .with_prompt("Max tokens per stage (512 - 200000)")
        .default(current.max_tokens)
        .interact_text()?;

    let mut credentials = std::collections::BTreeMap::new();
    for key in CREDENTIAL_KEYS {
        let stored = if current.has_credential(key) { "set" } else { "not set" };
        let value = Password::new()
            .with_prompt(format!("{} ({}; blank keeps it)", key, stored))
            .allow_empty_password(true)
            .interact()?;
        credentials.insert(key.to_string(), value);
    }

    Ok(SettingsUpdate {
        provider: Provider::ALL[selection],
        temperature,
        max_tokens,
        credentials,
    })
}
