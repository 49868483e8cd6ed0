use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::net::TcpListener;
use tracing::{error, info};

use voice_relay::client::{self, ClientError, DEFAULT_CONNECT_TIMEOUT, RelayClient};
use voice_relay::config::{ConfigError, DEFAULT_CLIENT_HOST, DEFAULT_PORT, DEFAULT_SERVER_HOST, RelayConfig};
use voice_relay::frame::Framing;
use voice_relay::llm::LlmClient;
use voice_relay::llm::types::LlmError;
use voice_relay::routes;
use voice_relay::state::AppState;
use voice_relay::tts::TtsClient;
use voice_relay::tts::types::TtsError;

#[derive(Debug, thiserror::Error)]
enum AppError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),
    #[error("llm: {0}")]
    Llm(#[from] LlmError),
    #[error("tts: {0}")]
    Tts(#[from] TtsError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Parser, Debug)]
#[command(name = "voice-relay", about = "Answer questions with synthesized speech over TCP or WebSocket")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay server.
    Serve(ServeArgs),
    /// Send one question and save the spoken answer.
    Ask(AskArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    Tcp,
    Ws,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[arg(long, env = "RELAY_HOST", default_value = DEFAULT_SERVER_HOST)]
    host: String,

    #[arg(long, env = "RELAY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "RELAY_TRANSPORT", value_enum, default_value_t = Transport::Tcp)]
    transport: Transport,

    #[arg(long, env = "RELAY_FRAMING", default_value = "sentinel")]
    framing: Framing,
}

#[derive(Args, Debug)]
struct AskArgs {
    question: String,

    #[arg(long, env = "RELAY_CLIENT_HOST", default_value = DEFAULT_CLIENT_HOST)]
    host: String,

    #[arg(long, env = "RELAY_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    #[arg(long, value_enum, default_value_t = Transport::Tcp)]
    transport: Transport,

    #[arg(long, env = "RELAY_FRAMING", default_value = "sentinel")]
    framing: Framing,

    /// Where to write the received audio.
    #[arg(long, default_value = "answer.mp3")]
    out: PathBuf,

    /// Seconds to wait for the spoken answer.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Ask(args) => ask(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "voice-relay failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(args: ServeArgs) -> Result<(), AppError> {
    let mut config = RelayConfig::from_env()?;
    config.host = args.host;
    config.port = args.port;
    config.framing = args.framing;

    // Provider config errors are fatal: a relay without providers can only fail.
    let llm = LlmClient::from_env()?;
    info!(provider = llm.provider().as_str(), model = llm.model(), "LLM client initialized");
    let tts = TtsClient::from_env()?;
    info!(model = tts.model(), voice = %tts.default_voice(), "TTS client initialized");

    let params = llm.params();
    let voice = tts.default_voice();
    let state = AppState::new(Arc::new(llm), Arc::new(tts), config)
        .with_params(params)
        .with_voice(voice);

    let listener = TcpListener::bind(state.config.addr()).await?;
    match args.transport {
        Transport::Tcp => routes::tcp::serve(listener, state, shutdown_signal()).await?,
        Transport::Ws => {
            info!(addr = %listener.local_addr()?, "websocket relay listening");
            axum::serve(listener, routes::app(state))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
    }
    Ok(())
}

async fn ask(args: AskArgs) -> Result<(), AppError> {
    let client = RelayClient::new(args.host, args.port)
        .with_framing(args.framing)
        .with_timeouts(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs(args.timeout_secs));

    let result = match args.transport {
        Transport::Tcp => client.send_question(&args.question).await,
        Transport::Ws => client.send_question_ws(&args.question).await,
    };

    match result {
        Ok(audio) => {
            client::save_audio(&args.out, &audio).await?;
            println!("Message sent successfully! Audio saved to {}", args.out.display());
            Ok(())
        }
        Err(e) => {
            println!("Error: {e}");
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
