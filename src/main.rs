//! RepCoach demo REPL.
//!
//! Reads one turn per line from stdin and streams the reply to stdout.
//! `/confirm` and `/cancel` answer a pending destructive action, `/recovery`
//! prints the recovery report for every tracked muscle, `/quit` exits, and
//! Ctrl-C aborts the turn in flight.

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use repcoach::agent_core::{InMemoryDomainServices, PendingConfirmation};
use repcoach::fitness::{ExerciseCatalog, RecoveryAnalyzer};
use repcoach::inference::config::{find_config_path, load_models_config};
use repcoach::inference::{ChunkCallback, InferenceClient};
use repcoach::{AgentSettings, CoachAgent, TurnRequest};

/// Set to `1` for JSON log lines.
const LOG_JSON_ENV: &str = "REPCOACH_LOG_JSON";

const USER_ID: &str = "local";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let json_logs = std::env::var(LOG_JSON_ENV).is_ok_and(|v| v == "1");
    if let Err(e) = repcoach::init_tracing(json_logs) {
        eprintln!("warning: logging disabled: {e}");
    }

    let settings = AgentSettings::load_or_default(&AgentSettings::default_path());

    let catalog = match &settings.catalog_path {
        Some(path) => ExerciseCatalog::load(path)
            .with_context(|| format!("loading exercise catalog {}", path.display()))?,
        None => ExerciseCatalog::builtin()?,
    };

    let cwd = std::env::current_dir()?;
    let models_path = find_config_path(&cwd)?;
    let models = load_models_config(&models_path)
        .with_context(|| format!("loading {}", models_path.display()))?;
    let client = InferenceClient::from_config(&models)?;
    if !client.health_check().await {
        eprintln!(
            "warning: model '{}' is not answering; replies will fall back",
            client.primary_model_name()
        );
    }

    let services = Arc::new(InMemoryDomainServices::with_sample_data());
    let analyzer = RecoveryAnalyzer::new(settings.recovery);
    let roster = catalog.muscle_roster();
    let agent = CoachAgent::new(settings, Arc::new(catalog), Arc::new(client), services.clone())?;
    let mut conversation = agent.new_session(uuid::Uuid::new_v4().to_string());

    let printer: ChunkCallback = Arc::new(|text: &str| {
        print!("{text}");
        let _ = std::io::stdout().flush();
    });

    println!("RepCoach ready. Ask for a workout, or /quit to leave.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut pending: Option<PendingConfirmation> = None;

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let text = line.trim();

        match text {
            "" => continue,
            "/quit" => break,
            "/recovery" => {
                let report = analyzer.analyze_with_roster(&services.muscle_volumes(), &roster);
                for (label, muscles) in [
                    ("overworked", &report.overworked),
                    ("recovered", &report.recovered),
                    ("undertrained", &report.undertrained),
                ] {
                    let names: Vec<&str> = muscles.iter().map(String::as_str).collect();
                    println!("{label:>12}: {}", names.join(", "));
                }
                continue;
            }
            "/confirm" | "/cancel" => {
                let Some(action) = pending.take() else {
                    println!("Nothing is waiting for confirmation.");
                    continue;
                };
                let outcome = if text == "/confirm" {
                    agent.confirm_action(action).await
                } else {
                    agent.decline_action(action)
                };
                println!("{}", outcome.message);
                continue;
            }
            _ => {}
        }

        let request = TurnRequest::new(USER_ID, text)
            .with_volumes(services.muscle_volumes())
            .with_profile(services.profile());

        let token = CancellationToken::new();
        let turn = agent.process_turn(&mut conversation, request, Some(printer.clone()), Some(token.clone()));
        tokio::pin!(turn);
        let result = tokio::select! {
            result = &mut turn => result,
            _ = tokio::signal::ctrl_c() => {
                token.cancel();
                turn.await
            }
        };

        println!();
        if result.aborted {
            println!("(stopped)");
        }
        if let Some(target) = &result.navigation_target {
            println!("[navigate: {target}]");
        }
        if let Some(action) = result.pending_confirmation {
            println!("Type /confirm to go ahead or /cancel to keep everything.");
            pending = Some(action);
        }
    }

    Ok(())
}
