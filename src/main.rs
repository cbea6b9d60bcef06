use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use voicebot::api::ApiServer;
use voicebot::session::{ChatModel, CycleRequest, SessionState, TurnOutcome, process_cycle};
use voicebot::voice::{AudioFormat, normalize, normalize_sniffed};
use voicebot::{Config, Gateways};

/// Voicebot - voice-enabled chat assistant web UI
#[derive(Parser)]
#[command(name = "voicebot", version, about)]
struct Cli {
    /// Config file path (defaults to ~/.config/voicebot/config.toml)
    #[arg(short, long, env = "VOICEBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web UI server (default)
    Serve,
    /// Ask one question and print the reply
    Ask {
        /// Question text
        text: String,
        /// Chat model (gpt-4o, gpt-4-turbo, gpt-3.5-turbo)
        #[arg(short, long)]
        model: Option<ChatModel>,
        /// Write the spoken reply (MP3) to this file
        #[arg(long)]
        speak_to: Option<PathBuf>,
    },
    /// Transcribe a WAV, MP3 or raw PCM file
    Transcribe {
        /// Audio file
        path: PathBuf,
    },
    /// Synthesize speech to an MP3 file
    Synthesize {
        /// Text to speak
        text: String,
        /// Output file
        #[arg(short, long)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,voicebot=info",
        1 => "info,voicebot=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::Ask {
            text,
            model,
            speak_to,
        } => ask(&config, text, model, speak_to.as_deref()).await,
        Command::Transcribe { path } => transcribe(&config, &path).await,
        Command::Synthesize { text, output } => synthesize(&config, &text, &output).await,
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.server.host,
        port = config.server.port,
        tts = ?config.tts.provider,
        default_model = %config.chat.default_model,
        "starting voicebot"
    );

    let server = ApiServer::from_config(config)?;
    server.run().await?;
    Ok(())
}

fn api_key(config: &Config) -> anyhow::Result<&str> {
    config
        .openai
        .api_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .context("OPENAI_API_KEY is not set")
}

async fn ask(
    config: &Config,
    text: String,
    model: Option<ChatModel>,
    speak_to: Option<&Path>,
) -> anyhow::Result<()> {
    let gateways = Gateways::from_config(config)?;
    let mut session = SessionState::new(config.chat.system_prompt.clone())
        .with_model(model.unwrap_or(config.chat.default_model))
        .with_credential(config.openai.api_key.as_deref().unwrap_or_default());

    let report = process_cycle(&mut session, CycleRequest::text(text), &gateways).await;
    for notice in &report.notices {
        eprintln!("! {notice}");
    }

    match report.outcome {
        TurnOutcome::Answered { response } => {
            println!("{response}");
        }
        TurnOutcome::Aborted(e) | TurnOutcome::Unanswered(e) => anyhow::bail!(e),
        TurnOutcome::Idle | TurnOutcome::Suppressed => anyhow::bail!("nothing to ask"),
    }

    if let (Some(path), Some(audio)) = (speak_to, report.speech) {
        tokio::fs::write(path, &audio)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Wrote {} bytes of audio to {}", audio.len(), path.display());
    }
    Ok(())
}

async fn transcribe(config: &Config, path: &Path) -> anyhow::Result<()> {
    let key = api_key(config)?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let file_name = path.file_name().and_then(|n| n.to_str());
    let hint = AudioFormat::from_hint(None, file_name);
    tracing::debug!(?hint, bytes = data.len(), "transcribing file");

    let wav = tokio::task::spawn_blocking(move || match hint {
        Some(format) => normalize(&data, format),
        None => normalize_sniffed(&data),
    })
    .await??;
    let gateways = Gateways::from_config(config)?;
    let text = gateways.transcribe(&wav, key).await?;
    println!("{text}");
    Ok(())
}

async fn synthesize(config: &Config, text: &str, output: &Path) -> anyhow::Result<()> {
    let gateways = Gateways::from_config(config)?;
    let key = config.openai.api_key.as_deref().unwrap_or_default();
    let audio = gateways.synthesize(text, key).await?;

    tokio::fs::write(output, &audio)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;
    println!("Wrote {} bytes of audio to {}", audio.len(), output.display());
    Ok(())
}
