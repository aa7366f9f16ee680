use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use parley_audio::{reencode, DeviceManager, Recorder};
use parley_core::{AudioCapture, ClientConfig, ErrorKind, EventSink, FinalPayload, SessionId, TurnPhase};
use parley_session::{run_pacer, ChatClient, FilePlayback};
use parley_transport::HttpTransport;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "parley", about = "Voice-capable chat client")]
struct Cli {
    /// Path to the configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send one turn and print the reply
    Send {
        /// Message text (may be empty when --audio is given)
        #[arg(default_value = "")]
        text: String,
        /// Audio capture to re-encode and attach
        #[arg(long)]
        audio: Option<PathBuf>,
        /// Session identifier; a fresh one is generated when omitted
        #[arg(long)]
        session: Option<String>,
    },
    /// Re-encode a capture to 16 kHz 16-bit PCM
    Encode { input: PathBuf, output: PathBuf },
    /// Record from the configured microphone and write the re-encoded clip
    Record {
        output: PathBuf,
        #[arg(long, default_value_t = 5)]
        seconds: u64,
    },
    /// List input devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ClientConfig::load_from_file(path)
            .with_context(|| format!("failed to load config from {:?}", path))?,
        None => ClientConfig::default(),
    };

    let env_filter = EnvFilter::try_new(&config.general.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    match cli.command {
        Command::Send {
            text,
            audio,
            session,
        } => send(&config, text, audio.as_deref(), session).await,
        Command::Encode { input, output } => encode(&input, &output).await,
        Command::Record { output, seconds } => record(&config, &output, seconds).await,
        Command::Devices => devices(),
    }
}

// ── send ──────────────────────────────────────────────────────

/// Keeps the terminal metadata for the summary printed after the reply.
#[derive(Default)]
struct SummarySink {
    suggestions: Vec<String>,
    error: Option<(ErrorKind, String)>,
}

impl EventSink for SummarySink {
    fn on_token(&mut self, _text: &str) {}

    fn on_final(&mut self, payload: &FinalPayload) {
        self.suggestions = payload.suggested_questions.clone().unwrap_or_default();
    }

    fn on_error(&mut self, kind: ErrorKind, detail: &str) {
        self.error = Some((kind, detail.to_string()));
    }
}

async fn send(
    config: &ClientConfig,
    text: String,
    audio_path: Option<&Path>,
    session: Option<String>,
) -> Result<()> {
    let audio = match audio_path {
        Some(path) => Some(encode_file(path).await?),
        None => None,
    };

    let transport = HttpTransport::new(&config.backend).context("failed to create HTTP transport")?;
    tracing::info!("posting to {}", transport.url());
    let playback = Arc::new(FilePlayback::new(config.playback.output_dir.clone()));
    let session_id = session.map(SessionId::from).unwrap_or_else(SessionId::generate);
    let client = ChatClient::new(session_id, Arc::new(transport)).with_playback(playback.clone());

    let state_rx = client.subscribe();
    let interval = config.render.pacer_interval();
    let pacer = tokio::spawn(async move {
        let mut shown = String::new();
        run_pacer(state_rx, interval, move |_, visible| {
            let mut stdout = std::io::stdout();
            if let Some(rest) = visible.strip_prefix(shown.as_str()) {
                let _ = write!(stdout, "{}", rest);
            } else {
                let _ = write!(stdout, "\n{}", visible);
            }
            let _ = stdout.flush();
            shown = visible.to_string();
        })
        .await;
    });

    let mut summary = SummarySink::default();
    let outcome = client
        .submit_turn(&text, audio, &mut summary)
        .await
        .context("turn was rejected")?;
    if let Err(e) = pacer.await {
        tracing::warn!("pacer task ended abnormally: {}", e);
    }
    println!();

    if !summary.suggestions.is_empty() {
        println!("\nSuggested follow-ups:");
        for question in &summary.suggestions {
            println!("  - {}", question);
        }
    }
    if let Some(path) = playback.last_path() {
        println!("\nReply audio saved to {}", path.display());
    }

    if outcome.phase == TurnPhase::Failed {
        match summary.error {
            Some((kind, detail)) => bail!("turn failed ({}): {}", kind, detail),
            None => bail!("turn failed"),
        }
    }
    Ok(())
}

// ── encode / record ───────────────────────────────────────────

async fn encode_file(path: &Path) -> Result<bytes::Bytes> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {:?}", path))?;
    let encoded = reencode(AudioCapture::new(data))
        .await
        .with_context(|| format!("failed to re-encode {:?}", path))?;
    Ok(encoded)
}

async fn encode(input: &Path, output: &Path) -> Result<()> {
    let encoded = encode_file(input).await?;
    tokio::fs::write(output, &encoded)
        .await
        .with_context(|| format!("failed to write {:?}", output))?;
    tracing::info!(bytes = encoded.len(), "wrote {:?}", output);
    Ok(())
}

async fn record(config: &ClientConfig, output: &Path, seconds: u64) -> Result<()> {
    let manager = DeviceManager::new();
    tracing::info!("using input device: {}", config.capture.device_name);
    let device = manager
        .get_input_device(&config.capture.device_name)
        .with_context(|| format!("failed to get input device: {}", config.capture.device_name))?;

    let duration = Duration::from_secs(seconds);
    let mut recorder = Recorder::start(&device, &config.capture, Duration::from_secs(1))
        .context("failed to start recording")?;
    eprintln!("Recording for {}s...", seconds);

    let started = Instant::now();
    while started.elapsed() < duration {
        tokio::time::sleep(Duration::from_millis(100)).await;
        recorder.drain();
    }
    let status = recorder.status();
    if status.dropped_samples() > 0 {
        tracing::warn!(dropped = status.dropped_samples(), "ring buffer overflowed while recording");
    }
    tracing::info!(frames = recorder.recorded_frames(), "stopping recording");
    let capture = recorder.finish().context("recording failed")?;
    let encoded = reencode(capture).await.context("failed to re-encode recording")?;
    tokio::fs::write(output, &encoded)
        .await
        .with_context(|| format!("failed to write {:?}", output))?;
    tracing::info!(bytes = encoded.len(), "wrote {:?}", output);
    Ok(())
}

fn devices() -> Result<()> {
    let manager = DeviceManager::new();
    let default = manager.default_input_name();
    for name in manager.input_device_names()? {
        let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{} {}", marker, name);
    }
    Ok(())
}
