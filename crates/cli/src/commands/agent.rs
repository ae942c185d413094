//! `wardops agent`: interactive or single-message ward assistant.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use wardops_agent::Orchestrator;
use wardops_config::AppConfig;
use wardops_core::event::EventBus;
use wardops_core::message::Message;
use wardops_providers::OpenAiCompatProvider;
use wardops_tools::ToolExecutor;

use super::{LiveWard, format_task};

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup instructions
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    WARDOPS_API_KEY=...      (generic)");
        eprintln!("    OPENROUTER_API_KEY=...   (recommended)");
        eprintln!("    OPENAI_API_KEY=...       (for OpenAI direct)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let event_bus = Arc::new(EventBus::default());
    let live = LiveWard::start(&config, event_bus.clone());

    let provider = Arc::new(OpenAiCompatProvider::from_config(&config));
    let executor = ToolExecutor::new(live.ward.clone()).with_event_bus(event_bus.clone());
    let orchestrator = Orchestrator::from_config(provider, executor, &config).with_event_bus(event_bus);

    let mut history: Vec<Message> = Vec::new();

    if let Some(msg) = message {
        // Single message mode
        eprint!("  Thinking...");
        let reply = turn(&orchestrator, &msg, &mut history).await;
        eprint!("\r              \r");
        println!("{reply}");
        print_active(&live);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║         WardOps Agent: Interactive Mode      ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Endpoint:  {}", config.provider.base_url);
    println!("  Models:    {}", config.provider.models.join(" -> "));
    println!("  Tools:     {}", tool_names());
    println!();
    println!("  Type your request and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"  You > ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "exit" || line == "quit" {
            break;
        }

        eprint!("  ...");
        let reply = turn(&orchestrator, line, &mut history).await;
        eprint!("\r     \r");
        println!();
        for text in reply.lines() {
            println!("  Assistant > {text}");
        }
        println!();
        print_active(&live);
    }

    orchestrator.shutdown();
    live.engine.shutdown();
    println!();
    println!("  Goodbye!");
    println!();

    Ok(())
}

/// Run one turn and keep whatever history it produced, even on failure.
async fn turn(orchestrator: &Orchestrator, utterance: &str, history: &mut Vec<Message>) -> String {
    match orchestrator.run(utterance, history).await {
        Ok(outcome) => {
            *history = outcome.history;
            outcome.reply
        }
        Err(e) => {
            tracing::warn!(error = %e, "Turn failed");
            let reply = e.user_message().to_string();
            if let Some(kept) = e.into_history() {
                *history = kept;
            }
            reply
        }
    }
}

fn tool_names() -> String {
    wardops_tools::WardTool::ALL
        .iter()
        .map(|tool| tool.name())
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_active(live: &LiveWard) {
    let active = live.engine.active_tasks();
    if active.is_empty() {
        return;
    }
    println!("  Active tasks ({}):", live.engine.source());
    for task in &active {
        println!("    {}", format_task(task));
    }
    println!();
}
