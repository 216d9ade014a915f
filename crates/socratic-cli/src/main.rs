//! Socratic CLI
//!
//! Main entry point for serving the Socratic questioning engine.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use socratic_engine::{
    create_router, AppState, Config, RemoteAnswerEvaluator, RemoteQuestionGenerator,
    SessionStore, SocraticEngine,
};
use socratic_report::{json::JsonGenerator, LearningSummary, MarkdownGenerator};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Socratic - comprehension questioning for teaching sessions
///
/// Runs the questioning engine behind an HTTP and WebSocket API. The teaching
/// layer reports concepts and student messages; the engine asks questions,
/// evaluates answers, and tracks what the student has understood.
#[derive(Parser, Debug)]
#[command(name = "socratic")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: socratic.json in current directory)
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Host for the HTTP API server (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Port for the HTTP API server (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// URL of the question generation service (overrides config)
    #[arg(long, value_name = "URL")]
    generator_url: Option<String>,

    /// URL of the answer evaluation service (overrides config)
    #[arg(long, value_name = "URL")]
    evaluator_url: Option<String>,

    /// Directory to write learning summaries to when the server stops
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!("Socratic engine starting");
    tracing::debug!(config = ?args.config, "Config file");

    match run_server(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

/// Loads config, serves the API until Ctrl+C, then ends every session.
async fn run_server(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(url) = args.generator_url {
        config.collaborators.generator_url = url;
    }
    if let Some(url) = args.evaluator_url {
        config.collaborators.evaluator_url = url;
    }

    // Re-validate after overrides
    config.validate()?;

    print_config(&config);

    let generator =
        RemoteQuestionGenerator::new(&config.collaborators.generator_url, config.call_timeout())?;
    let evaluator =
        RemoteAnswerEvaluator::new(&config.collaborators.evaluator_url, config.call_timeout())?;
    let engine = SocraticEngine::new(config.clone(), Arc::new(generator), Arc::new(evaluator));
    let store = SessionStore::new(engine);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "Invalid server address '{}:{}': {e}\n\nSuggestion: Use an IP address for --host",
                config.server.host,
                config.server.port
            )
        })?;

    let router = create_router(AppState::new(config.clone(), store.clone()));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!();
    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    println!();
    println!("Ending sessions...");
    end_all_sessions(&store, args.output_dir.as_deref()).await
}

/// Ends every running session, writing summaries if `output_dir` is set.
async fn end_all_sessions(store: &SessionStore, output_dir: Option<&Path>) -> anyhow::Result<()> {
    for session_id in store.session_ids().await {
        let state = match store.end_session(&session_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Failed to end session");
                continue;
            }
        };

        let summary = LearningSummary::from_input(&state.summary_input());
        print_summary(&summary);

        if let Some(dir) = output_dir {
            write_summary(&summary, dir)?;
        }
    }
    Ok(())
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Difficulty: {}", config.difficulty);
    println!(
        "  Answer timeout: {}s (hint after {}s)",
        config.answer_timeout_seconds, config.hint_delay_seconds
    );
    println!(
        "  Pass threshold: {} (partial {})",
        config.pass_threshold, config.partial_threshold
    );
    println!("  Checkpoint every {} questions", config.checkpoint_interval);
    println!("  Question service: {}", config.collaborators.generator_url);
    println!("  Answer service: {}", config.collaborators.evaluator_url);
}

fn print_summary(summary: &LearningSummary) {
    let counts = summary.counts();
    println!(
        "  {}: {} concepts ({} mastered, {} learning, {} weak, {} skipped)",
        summary.session_id,
        counts.total(),
        counts.mastered,
        counts.learning,
        counts.weak,
        counts.skipped
    );
}

/// Writes Markdown and JSON summaries named after the session.
fn write_summary(summary: &LearningSummary, output_dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let md_path = output_dir.join(format!("{}.md", summary.session_id));
    std::fs::write(&md_path, MarkdownGenerator::new(summary).generate())?;
    println!("    Markdown summary: {}", md_path.display());

    let json_path = output_dir.join(format!("{}.json", summary.session_id));
    JsonGenerator::new(summary).write_to_file(&json_path, true)?;
    println!("    JSON summary: {}", json_path.display());

    Ok(())
}
