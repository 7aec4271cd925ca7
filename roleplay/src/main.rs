//! Two-character role-play from the terminal.
//!
//! Reads one action per line for the chosen character; the other character
//! is played by the model. Configuration comes from the environment (and a
//! `.env` file), with command line overrides:
//!
//! ```bash
//! cargo run -p roleplay -- --state state.json --as Sveta
//! ```

mod repl;

use roleplay_core::{EngineConfig, GameSession};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Default)]
struct Args {
    state: Option<String>,
    chronicle: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    acting: Option<String>,
    help: bool,
}

fn parse_args(args: &[String]) -> Args {
    let mut parsed = Args::default();

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--state" => {
                parsed.state = value;
                i += 1;
            }
            "--chronicle" => {
                parsed.chronicle = value;
                i += 1;
            }
            "--model" => {
                parsed.model = value;
                i += 1;
            }
            "--base-url" => {
                parsed.base_url = value;
                i += 1;
            }
            "--as" => {
                parsed.acting = value;
                i += 1;
            }
            "--help" | "-h" => parsed.help = true,
            other => eprintln!("Ignoring unknown argument: {other}"),
        }
        i += 1;
    }

    parsed
}

fn print_help() {
    println!("roleplay - two-character story driven by a language model");
    println!();
    println!("USAGE:");
    println!("  roleplay [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("  --state <path>      World document (default: state.json)");
    println!("  --chronicle <path>  Chronicle file (default: chronology.txt)");
    println!("  --as <name>         Character you play (asked if omitted)");
    println!("  --model <name>      Model name sent to the endpoint");
    println!("  --base-url <url>    OpenAI-compatible endpoint root");
    println!("  -h, --help          Show this help");
    println!();
    println!("ENVIRONMENT:");
    println!("  OPENAI_BASE_URL, OPENAI_API_KEY, ROLEPLAY_MODEL, ROLEPLAY_STATE_PATH,");
    println!("  ROLEPLAY_CHRONICLE_PATH, ROLEPLAY_WORD_LIMIT, ROLEPLAY_MAX_ATTEMPTS,");
    println!("  ROLEPLAY_TIMEOUT_SECS, RUST_LOG");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roleplay=info,roleplay_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let args = parse_args(&args);
    if args.help {
        print_help();
        return Ok(());
    }

    let mut config = EngineConfig::from_env()?;
    if let Some(path) = args.state {
        config = config.with_state_path(path);
    }
    if let Some(path) = args.chronicle {
        config = config.with_chronicle_path(path);
    }
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(url) = args.base_url {
        config = config.with_base_url(url);
    }

    tracing::info!(endpoint = %config.base_url, model = %config.model, "Starting session");
    let session = GameSession::new(config).await?;

    repl::run(&session, args.acting).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("roleplay")
            .chain(list.iter().copied())
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_args(&args(&["--state", "w.json", "--as", "Sveta", "--model", "qwen"]));
        assert_eq!(parsed.state.as_deref(), Some("w.json"));
        assert_eq!(parsed.acting.as_deref(), Some("Sveta"));
        assert_eq!(parsed.model.as_deref(), Some("qwen"));
        assert!(!parsed.help);
    }

    #[test]
    fn test_parse_help() {
        assert!(parse_args(&args(&["-h"])).help);
    }
}
