use std::io::{Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::error;
use tracing_subscriber::EnvFilter;

use ai_helper_core::config::validate_api_key;
use ai_helper_core::{
    markdown, ChatRole, CompletionClient, Config, Outcome, Provider, Session, Settings,
};

mod bridge;

#[derive(Parser)]
#[command(name = "ai-helper")]
#[command(version)]
#[command(about = "Ask an LLM about selected text and chat about the answer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a piece of selected text
    Ask {
        /// The selected text
        text: String,
        /// Print the raw answer instead of the rendered card
        #[arg(long)]
        raw: bool,
    },
    /// Interactive chat session
    Chat,
    /// Read host messages as JSON lines on stdin and write page snapshots
    Serve,
    /// Render markdown to HTML
    Render {
        /// Markdown file (stdin when omitted)
        file: Option<PathBuf>,
    },
    /// Check the API key and model with a tiny request
    Test,
    /// List known models for the configured provider
    Models,
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the configuration file and resolved settings
    Show,
    /// Store the API key
    SetKey { key: String },
    /// Store the model
    SetModel { model: String },
    /// Switch provider (groq or openai)
    SetProvider { provider: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ask { text, raw } => ask(&load_settings()?, &text, raw).await?,
        Commands::Chat => chat(&load_settings()?).await?,
        Commands::Serve => bridge::run(Session::from_settings(&load_settings()?)?).await?,
        Commands::Render { file } => render(file)?,
        Commands::Test => test_connection(&load_settings()?).await?,
        Commands::Models => list_models()?,
        Commands::Config { action } => configure(action)?,
    }

    Ok(())
}

/// Resolve settings once at startup. A bad configuration ends the process
/// before any session exists.
fn load_settings() -> Result<Settings> {
    let config = Config::load().context("Failed to load configuration")?;
    match Settings::resolve(&config) {
        Ok(settings) => Ok(settings),
        Err(err) => {
            error!(error = %err, "invalid configuration");
            eprintln!(
                "{} run `ai-helper config set-key <key>` or set the provider's API key variable",
                "hint:".yellow().bold()
            );
            std::process::exit(1);
        }
    }
}

async fn ask(settings: &Settings, text: &str, raw: bool) -> Result<()> {
    let session = Session::from_settings(settings)?;

    match session.submit_selection(text).await? {
        Outcome::Ignored => {
            println!("{}", "Nothing to ask: the text is empty".yellow());
        }
        _ => {
            let card = session
                .response_card()
                .context("No response card was displayed")?;
            if raw {
                println!("{}", card.answer());
            } else {
                println!("{}", card.to_html());
            }
        }
    }

    Ok(())
}

async fn chat(settings: &Settings) -> Result<()> {
    let session = Session::from_settings(settings)?;
    session.open_chat();

    println!(
        "{} {} {}",
        "💬 Chat".bold().blue(),
        "model:".dimmed(),
        session.model().cyan()
    );
    println!(
        "{}",
        "Commands: /new, /regen <n>, /history, /quit".dimmed()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".bold().green());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        match line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim())) {
            ("", _) => continue,
            ("/quit", _) | ("/exit", _) => break,
            ("/new", _) => {
                session.new_chat();
                println!("{}", "Started a new conversation".dimmed());
            }
            ("/history", _) => print_history(&session),
            ("/regen", arg) => {
                let index = match arg.parse::<usize>() {
                    Ok(index) => index,
                    Err(_) => {
                        println!("{}", "Usage: /regen <turn number>".red());
                        continue;
                    }
                };
                match session.regenerate_turn(index).await {
                    Ok(new_index) => print_turn(&session, new_index),
                    Err(err) => println!("{} {}", "Error:".red().bold(), err),
                }
            }
            _ => match session.send_chat_message(line).await {
                Ok(Outcome::Replied(index)) => print_turn(&session, index),
                Ok(_) => {}
                Err(err) => println!("{} {}", "Error:".red().bold(), err),
            },
        }
    }

    Ok(())
}

fn print_turn(session: &Session, index: usize) {
    if let Some(turn) = session.conversation().get(index) {
        println!("{} {}\n", format!("[{index}]").dimmed(), turn.content);
    }
}

fn print_history(session: &Session) {
    let conversation = session.conversation();
    if conversation.is_empty() {
        println!("{}", "No messages yet".dimmed());
        return;
    }

    for (i, turn) in conversation.turns().iter().enumerate() {
        let role = match turn.role {
            ChatRole::User => "You".bold().green(),
            ChatRole::Assistant => "AI".bold().blue(),
        };
        println!("{} {}: {}", format!("[{i}]").dimmed(), role, turn.content);
    }
}

fn render(file: Option<PathBuf>) -> Result<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            input
        }
    };

    println!("{}", markdown::render(&input));
    Ok(())
}

async fn test_connection(settings: &Settings) -> Result<()> {
    let client = CompletionClient::from_settings(settings)?;
    println!(
        "🔌 Testing {} with {}",
        settings.provider.display_name().bold(),
        settings.model.cyan()
    );

    match client.test_connection(&settings.model).await {
        Ok(reply) => {
            println!("{} {}", "✅ Connection OK:".green().bold(), reply);
            Ok(())
        }
        Err(err) => {
            println!("{} {}", "❌ Connection failed:".red().bold(), err);
            std::process::exit(1);
        }
    }
}

fn list_models() -> Result<()> {
    let config = Config::load()?;
    let provider = config.provider()?;
    let current = config
        .model
        .clone()
        .unwrap_or_else(|| provider.default_model().to_string());

    println!("{}", format!("{} models:", provider.display_name()).bold());
    for model in provider.list_models() {
        if model == current {
            println!("  {} {}", "*".green().bold(), model.green());
        } else {
            println!("    {}", model);
        }
    }
    Ok(())
}

fn configure(action: ConfigAction) -> Result<()> {
    let mut config = Config::load()?;

    match action {
        ConfigAction::Show => {
            println!("{} {}", "Config file:".bold(), Config::get_config_path()?.display());
            let provider = config.provider()?;
            println!("{} {}", "Provider:".bold(), provider.display_name());
            println!(
                "{} {}",
                "Model:".bold(),
                config.model.as_deref().unwrap_or(provider.default_model())
            );
            println!(
                "{} {}",
                "Endpoint:".bold(),
                config.endpoint.as_deref().unwrap_or(provider.endpoint())
            );
            let key = match config.api_key.as_deref() {
                Some(key) => mask_key(key),
                None => format!("(not set, reads {})", provider.api_key_env()),
            };
            println!("{} {}", "API key:".bold(), key);
            return Ok(());
        }
        ConfigAction::SetKey { key } => {
            let key = key.trim().to_string();
            validate_api_key(config.provider()?, &key)?;
            config.api_key = Some(key);
        }
        ConfigAction::SetModel { model } => {
            config.model = Some(model);
        }
        ConfigAction::SetProvider { provider } => {
            let parsed = Provider::from_str(&provider).with_context(|| {
                let known: Vec<&str> = Provider::all().iter().map(|p| p.as_str()).collect();
                format!("Unknown provider: {provider} (expected one of {})", known.join(", "))
            })?;
            config.provider = Some(parsed.as_str().to_string());
            // The stored model may belong to the previous provider.
            config.model = None;
        }
    }

    config.save()?;
    println!("{}", "✅ Configuration saved".green());
    Ok(())
}

fn mask_key(key: &str) -> String {
    let visible: String = key.chars().take(4).collect();
    format!("{visible}{}", "*".repeat(key.chars().count().saturating_sub(4).min(20)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("gsk_abcdef"), "gsk_******");
        assert_eq!(mask_key("abc"), "abc");
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["ai-helper", "ask", "2+2=?", "--raw"]).unwrap();
        assert!(matches!(cli.command, Commands::Ask { raw: true, .. }));

        let cli = Cli::try_parse_from(["ai-helper", "config", "set-provider", "openai"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config { action: ConfigAction::SetProvider { .. } }
        ));
    }
}
