use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

mod app;
mod config;
mod handler;
mod ollama;
mod transcript;
mod tui;
mod ui;

use app::App;
use config::Config;
use ollama::OllamaClient;

const DEFAULT_ENDPOINT: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "llama3.2:latest";

#[derive(Parser)]
#[command(name = "charla")]
#[command(about = "Tabbed terminal chat that streams responses from local Ollama models")]
struct Cli {
    /// Ollama model to use
    #[arg(short, long)]
    model: Option<String>,
    /// Ollama endpoint
    #[arg(short, long)]
    endpoint: Option<String>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List available Ollama models
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load().unwrap_or_else(|_| Config::new());

    let endpoint = cli
        .endpoint
        .or_else(|| config.endpoint.clone())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let model = cli
        .model
        .or_else(|| config.default_model.clone())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string());

    let ollama = OllamaClient::new(&endpoint);

    match cli.command {
        Some(Commands::Models) => list_ollama_models(&ollama).await?,
        None => run_chat(ollama, model).await?,
    }

    Ok(())
}

async fn run_chat(ollama: OllamaClient, model: String) -> Result<()> {
    init_tracing()?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = tui::EventHandler::new();
    let mut app = App::new(ollama, model, events.sender());

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_loop(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut tui::EventHandler,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event).await?,
            None => break,
        }
    }
    Ok(())
}

/// Log to a file under the config dir; the terminal belongs to the TUI.
fn init_tracing() -> Result<()> {
    let log_dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("charla");
    std::fs::create_dir_all(&log_dir)?;
    let log_file = std::fs::File::create(log_dir.join("charla.log"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("CHARLA_LOG").unwrap_or_else(|_| EnvFilter::new("charla=info")),
        )
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .init();

    Ok(())
}

async fn list_ollama_models(ollama: &OllamaClient) -> Result<()> {
    println!("\n{}", "Available Ollama Models".bold().blue());
    println!("{}", "=".repeat(30).dimmed());

    match ollama.list_models().await {
        Ok(models) => {
            if models.is_empty() {
                println!(
                    "{}",
                    "No models found. Pull a model with: ollama pull llama3.2".yellow()
                );
            } else {
                for model in models {
                    println!("  • {}", model.green());
                }
            }
        }
        Err(e) => {
            println!("{}: {}", "Error connecting to Ollama".red(), e);
            println!("Make sure Ollama is running: {}", "ollama serve".bold());
            println!("Then pull a model: {}", "ollama pull llama3.2".bold());
        }
    }

    Ok(())
}
