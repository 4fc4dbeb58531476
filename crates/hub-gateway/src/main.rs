//! schedule-hub: natural-language scheduling gateway
//!
//! Main entry point for the schedule-hub service.
//!
//! Usage:
//!   schedule-hub                            - Start server mode (HTTP API)
//!   schedule-hub --once <text> --user <id>  - Process one request and print the response
//!   schedule-hub --help                     - Show help

use std::sync::Arc;

use hub_calendar::CalDavClient;
use hub_core::{Config, Normalizer, RecurrenceCompiler, ScheduleService, TimexResolver, UserId};
use tracing_subscriber::EnvFilter;

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Server mode (HTTP API)
    Server,
    /// Process a single request from the command line
    Once { text: String, user: String },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let mode = parse_args(std::env::args().skip(1))?;

    match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("schedule-hub {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        _ => {}
    }

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    // Load .env file
    dotenvy::dotenv().ok();

    // Load configuration (schedule-hub.toml or environment)
    let config = Config::load().map_err(|e| anyhow::anyhow!("Config error: {}", e))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting schedule-hub...");
    tracing::info!(
        provider = ?config.nlu.provider,
        calendar = %config.calendar.server_url,
        "Configuration loaded"
    );

    let service = Arc::new(build_service(&config)?);

    match mode {
        RunMode::Once { text, user } => {
            let user = UserId::parse(&user)?;
            let response = service.process(&text, &user).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(())
        }
        RunMode::Server => run_server(service, &config).await,
        _ => Ok(()),
    }
}

/// Wire the configured NLU provider and calendar into the scheduling service
fn build_service(config: &Config) -> anyhow::Result<ScheduleService> {
    let nlu = hub_nlu::build_provider(&config.nlu)
        .map_err(|e| anyhow::anyhow!("Failed to create NLU provider: {}", e))?;

    let calendar = CalDavClient::new(config.calendar.clone())
        .map_err(|e| anyhow::anyhow!("Failed to create calendar client: {}", e))?;

    let resolver = TimexResolver::new(config.resolver.relative_date_policy());
    Ok(ScheduleService::new(nlu, Arc::new(calendar))
        .with_normalizer(Normalizer::new(resolver))
        .with_compiler(RecurrenceCompiler::new(config.resolver.recurrence_range_months)))
}

/// Parse command line arguments
fn parse_args(args: impl IntoIterator<Item = String>) -> anyhow::Result<RunMode> {
    let mut args = args.into_iter();
    let mut text = None;
    let mut user = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--once" => {
                text = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--once requires the request text"))?,
                );
            }
            "--user" | "-u" => {
                user = Some(
                    args.next()
                        .ok_or_else(|| anyhow::anyhow!("--user requires a user id"))?,
                );
            }
            other => anyhow::bail!("Unknown argument: {} (see --help)", other),
        }
    }

    match (text, user) {
        (Some(text), Some(user)) => Ok(RunMode::Once { text, user }),
        (Some(_), None) => anyhow::bail!("--once requires --user <id>"),
        (None, Some(_)) => anyhow::bail!("--user is only valid with --once"),
        (None, None) => Ok(RunMode::Server),
    }
}

/// Print help message
fn print_help() {
    println!("schedule-hub - natural-language scheduling gateway");
    println!();
    println!("Usage:");
    println!("  schedule-hub                            Start server mode (HTTP API)");
    println!("  schedule-hub --once <text> --user <id>  Process one request and print the JSON response");
    println!("  schedule-hub --help                     Show this help message");
    println!("  schedule-hub --version                  Show version");
    println!();
    println!("Configuration is read from ./schedule-hub.toml when present.");
    println!();
    println!("Environment Variables:");
    println!("  NLU_PROVIDER         openai, clu or luis (default: openai)");
    println!("  NLU_API_KEY          NLU API key (required)");
    println!("  NLU_MODEL            Model name (default: gpt-4o-mini)");
    println!("  NLU_ENDPOINT         Azure OpenAI / CLU / LUIS endpoint");
    println!("  NLU_DEPLOYMENT       Azure deployment, CLU deployment or LUIS slot");
    println!("  NLU_PROJECT_NAME     CLU project name");
    println!("  NLU_APP_ID           LUIS application id");
    println!("  CALDAV_URL           CalDAV server URL (required)");
    println!("  CALDAV_USERNAME      CalDAV user name");
    println!("  CALDAV_PASSWORD      CalDAV password");
    println!("  CALDAV_CALENDAR_PATH Calendar path, {{user}} is replaced (default: calendars/{{user}}/default)");
    println!("  CALENDAR_TIME_ZONE   IANA time zone for event times (default: floating)");
    println!("  ATTENDEE_DOMAIN      Domain for attendee names (default: example.com)");
    println!("  API_PORT             HTTP API port (default: 3000)");
    println!("  API_ALLOWED_ORIGINS  Comma-separated CORS origins");
    println!("  RELATIVE_DAY_OFFSET  Days from today for times without a date (default: 1)");
    println!("  RECURRENCE_RANGE_MONTHS  Length of recurring series (default: 6)");
}

/// Run server mode (HTTP API)
async fn run_server(service: Arc<ScheduleService>, config: &Config) -> anyhow::Result<()> {
    let api_config = config.api.clone();
    tracing::info!("Starting HTTP API server on port {}", api_config.port);

    tracing::info!("schedule-hub initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    serve_until(hub_api::start_server(service, &api_config), tokio::signal::ctrl_c()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Drive `server` until `shutdown` resolves; a server that stops on its own is an error
async fn serve_until<S, C>(server: S, shutdown: C) -> anyhow::Result<()>
where
    S: std::future::Future<Output = anyhow::Result<()>>,
    C: std::future::Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = server => {
            result.map_err(|e| anyhow::anyhow!("HTTP API error: {}", e))?;
            anyhow::bail!("HTTP API server stopped unexpectedly")
        }
        signal = shutdown => {
            signal?;
            tracing::info!("Shutting down...");
            Ok(())
        }
    }
}
