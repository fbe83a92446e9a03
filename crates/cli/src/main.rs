//! withyou command-line client.
//!
//! Usage:
//!   withyou                              # interactive loop
//!   withyou --config withyou.toml --locale india
//!   withyou --message "I can't sleep before my presentation" --json
//!   withyou --demo                       # built-in scenarios, offline
//!
//! # Environment Variables
//!
//! - `GOOGLE_API_KEY` - model API key (name configurable via `llm.api_key_env`)
//! - `GOOGLE_APPLICATION_CREDENTIALS` - service-account file for calendar integration
//! - `WITHYOU_CONFIG` - config file path
//! - `RUST_LOG` - log filter

mod demo;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use colored::*;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use withyou_common::{Phq9Answers, TurnInput};
use withyou_coordinator::{Orchestrator, TurnOutcome, WithYouConfig};

const DEFAULT_CONFIG_FILE: &str = "withyou.toml";

/// Command-line arguments for withyou
#[derive(Parser, Debug)]
#[command(name = "withyou", version, about = "A safety-first mental wellness companion")]
struct Args {
    /// Path to the config file
    #[arg(short, long, env = "WITHYOU_CONFIG")]
    config: Option<PathBuf>,

    /// User identifier
    #[arg(short, long, default_value = "local-user")]
    user: String,

    /// Conversation identifier (random when omitted)
    #[arg(long)]
    conversation: Option<String>,

    /// Locale for support resources, e.g. india, us, uk
    #[arg(short, long)]
    locale: Option<String>,

    /// Consent to sharing a redacted summary with a clinician
    #[arg(long)]
    consent: bool,

    /// PHQ-9 answers as nine comma-separated scores (0-3)
    #[arg(long, value_name = "SCORES")]
    phq9: Option<String>,

    /// Print the full structured outcome as JSON
    #[arg(long)]
    json: bool,

    /// Handle a single message and exit
    #[arg(short, long, conflicts_with = "demo")]
    message: Option<String>,

    /// Run the built-in scenarios against scripted models
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,withyou=info,audit=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    if args.demo {
        return demo::run(&config, args.json).await;
    }

    let orchestrator = Orchestrator::from_config(&config, |name| std::env::var(name).ok())
        .context("Failed to start withyou")?;

    let session = Session::from_args(&args)?;

    if let Some(message) = &args.message {
        let outcome = orchestrator.handle_turn(session.turn(message)).await?;
        print_outcome(&outcome, args.json)?;
        return Ok(());
    }

    conversation_loop(&orchestrator, &session, args.json).await
}

fn load_config(path: Option<&Path>) -> anyhow::Result<WithYouConfig> {
    match path {
        Some(path) => WithYouConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            WithYouConfig::from_file(DEFAULT_CONFIG_FILE)
        }
        None => Ok(WithYouConfig::default()),
    }
}

/// Identity and metadata shared by every turn of this run.
struct Session {
    user: String,
    conversation: String,
    locale: Option<String>,
    consent: bool,
    phq9: Option<Phq9Answers>,
}

impl Session {
    fn from_args(args: &Args) -> anyhow::Result<Self> {
        Ok(Self {
            user: args.user.clone(),
            conversation: args
                .conversation
                .clone()
                .unwrap_or_else(|| format!("conv_{}", uuid::Uuid::new_v4().simple())),
            locale: args.locale.clone(),
            consent: args.consent,
            phq9: args.phq9.as_deref().map(parse_phq9).transpose()?,
        })
    }

    fn turn(&self, text: &str) -> TurnInput {
        let mut turn = TurnInput::new(&self.user, &self.conversation, text).with_consent(self.consent);
        if let Some(locale) = &self.locale {
            turn = turn.with_locale(locale);
        }
        if let Some(answers) = &self.phq9 {
            turn = turn.with_phq9(answers.clone());
        }
        turn
    }
}

fn parse_phq9(raw: &str) -> anyhow::Result<Phq9Answers> {
    let scores = raw
        .split(',')
        .map(|s| s.trim().parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .context("PHQ-9 scores must be integers")?;
    let items: [u8; 9] = scores
        .try_into()
        .map_err(|v: Vec<u8>| anyhow::anyhow!("PHQ-9 needs 9 scores, got {}", v.len()))?;
    Ok(Phq9Answers::new(items)?)
}

async fn conversation_loop(
    orchestrator: &Orchestrator,
    session: &Session,
    json: bool,
) -> anyhow::Result<()> {
    println!(
        "{}",
        "withyou is here to listen. Type 'exit' or 'quit' to stop.".bright_green()
    );
    println!(
        "{}",
        "If you are in danger right now, please call your local emergency number.".yellow()
    );
    println!();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("{}", "You: ".bright_cyan().bold());
        io::stdout().flush()?;

        let Some(line) = lines.next() else {
            println!();
            break;
        };
        let line = line?;
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit") {
            println!("{}", "Take care. 👋".bright_green());
            break;
        }

        match orchestrator.handle_turn(session.turn(input)).await {
            Ok(outcome) => print_outcome(&outcome, json)?,
            Err(e) => {
                error!(error = %e, "Turn failed");
                println!("{} {}", "[withyou]".red().bold(), e);
            }
        }
        println!();
    }

    info!("Conversation ended");
    Ok(())
}

fn print_outcome(outcome: &TurnOutcome, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    let label = if outcome.is_escalated() {
        "[withyou 🛡️]".bright_red().bold()
    } else {
        "[withyou]".bright_green().bold()
    };
    println!("{label} {}", outcome.display_text());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_phq9_scores() {
        let answers = parse_phq9("1, 2, 0, 0, 3, 1, 0, 0, 0").unwrap();
        assert_eq!(answers.items(), &[1, 2, 0, 0, 3, 1, 0, 0, 0]);
        assert!(parse_phq9("1,2,3").is_err());
        assert!(parse_phq9("1,2,0,0,3,1,0,0,x").is_err());
        assert!(parse_phq9("4,0,0,0,0,0,0,0,0").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "withyou", "--user", "u1", "--locale", "in", "--message", "hi", "--json",
        ])
        .unwrap();
        assert_eq!(args.user, "u1");
        assert_eq!(args.locale.as_deref(), Some("in"));
        assert!(args.json);
        assert!(Args::try_parse_from(["withyou", "--demo", "--message", "hi"]).is_err());
    }

    #[test]
    fn test_session_turns_carry_metadata() {
        let args = Args::try_parse_from([
            "withyou", "--conversation", "c1", "--consent", "--phq9", "0,0,0,0,0,0,0,0,1",
        ])
        .unwrap();
        let session = Session::from_args(&args).unwrap();
        let turn = session.turn("hello");
        assert_eq!(turn.conversation_id, "c1");
        assert!(turn.metadata.consent_to_share);
        assert_eq!(turn.metadata.phq9.as_ref().unwrap().self_harm_item(), 1);
    }
}
