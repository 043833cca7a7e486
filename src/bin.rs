//! Binary entry point for `oncall-bot`.
//!
//! Runs the Slack listener by default.  With `--query`, it instead indexes the
//! knowledge base, logs what that query retrieves, and exits.

use clap::Parser;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use oncall_bot::base::{config::Config, types::Void};
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

/// Oncall-bot: a Slack assistant for on-call engineers.
///
/// Configuration can come from `config.toml` or `ONCALL_BOT_*` environment
/// variables. The bot answers slash commands, mentions, and direct messages,
/// grounding incident answers in a knowledge base and code answers in MCP tools.
#[derive(Parser, Debug)]
#[command(version, author, about, long_about = None)]
struct Args {
    /// Override the config file path (optional).
    ///
    /// By default, the bot will look for a config file at `.hidden/config.toml`
    /// in the current directory.
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,
    /// Index the knowledge base, log the articles retrieved for this query, and exit.
    #[arg(short, long)]
    query: Option<String>,
    /// Increase log verbosity (-v, -vv, etc.).
    ///
    /// - No flag: INFO level
    /// - -v: DEBUG level
    /// - -vv or more: TRACE level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Void {
    let args = Args::parse();

    init_tracing(args.verbose)?;

    let config = Config::load(args.config.as_deref())?;

    match args.query {
        Some(query) => oncall_bot::diagnose(config, &query).await,
        None => oncall_bot::start(config).await,
    }
}

/// Install the stdout and OTLP layers at the level selected by `-v`.
fn init_tracing(verbose: u8) -> Void {
    let level = match verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    let level_filter = tracing_subscriber::filter::LevelFilter::from_level(level);

    let stdout = tracing_subscriber::fmt::layer()
        .without_time()
        .with_ansi(true)
        .with_level(true)
        .with_file(false)
        .with_target(false)
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

    let exporter = opentelemetry_otlp::SpanExporter::builder().with_http().with_protocol(Protocol::HttpBinary).build()?;
    let tracer = opentelemetry_sdk::trace::SdkTracerProvider::builder().with_simple_exporter(exporter).build().tracer("oncall-bot");
    let otel = tracing_opentelemetry::layer().with_tracer(tracer);

    tracing_subscriber::registry().with(otel).with(level_filter).with(stdout).init();

    Ok(())
}
