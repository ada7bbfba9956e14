mod shell;

use anyhow::Result;
use clap::Parser;
use easel_contracts::chat::Conversation;
use easel_contracts::config::AgentConfig;
use easel_engine::{default_output_dir, ImageAgent, OpenRouterClient};
use tracing_subscriber::EnvFilter;

use crate::shell::{run_session, SessionEnd};

#[derive(Debug, Parser)]
#[command(
    name = "easel",
    version,
    about = "Terminal image generation agent backed by OpenRouter"
)]
struct Cli {
    /// Chat and prompt-expansion model (overrides TEXT_MODEL).
    #[arg(long)]
    text_model: Option<String>,
    /// Image model (overrides IMAGE_MODEL).
    #[arg(long)]
    image_model: Option<String>,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("easel error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    let config = AgentConfig::from_env()
        .with_text_model(cli.text_model)
        .with_image_model(cli.image_model);
    let transport = OpenRouterClient::new(&config)?;
    let agent = ImageAgent::from_config(transport, &config, default_output_dir()?);
    tracing::debug!(
        text_model = agent.text_model(),
        image_model = agent.image_model(),
        output_dir = %agent.output_dir().display(),
        "agent ready"
    );

    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    let mut conversation = Conversation::new();
    let end = run_session(
        &mut stdin.lock(),
        &mut stdout.lock(),
        &mut conversation,
        |history, on_update| agent.chat(history, on_update),
    )?;
    match end {
        // Leave right away; the conversation is never saved.
        SessionEnd::Exit => std::process::exit(0),
        SessionEnd::EndOfInput => Ok(0),
    }
}

// Diagnostics go to stderr so they do not interleave with the transcript on stdout.
fn init_tracing() {
    let filter = EnvFilter::try_from_env("EASEL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
