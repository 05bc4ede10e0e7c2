use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use tokio::signal;
use tokio::signal::unix::SignalKind;

use heimdall::config;
use heimdall::config::BridgeConfig;
use heimdall::error::ApiResult;
use heimdall::gateway::GatewayBackend;
use heimdall::gateway::client::Controller;
use heimdall::platform::{Dispatcher, EntityContext, LogWriter};

use zrt::config::RuntimeServer;

#[derive(Parser)]
#[command(version, about = "Bridge between a host entity framework and remote Zigbee runtimes")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: Utf8PathBuf,
}

/*
 * Formatter function to output in syslog format. This makes sense when running
 * as a service (where output might go to a log file, or the system journal)
 */
#[allow(clippy::match_same_arms)]
fn syslog_format(
    buf: &mut pretty_env_logger::env_logger::fmt::Formatter,
    record: &log::Record,
) -> std::io::Result<()> {
    writeln!(
        buf,
        "<{}>{}: {}",
        match record.level() {
            log::Level::Error => 3,
            log::Level::Warn => 4,
            log::Level::Info => 6,
            log::Level::Debug => 7,
            log::Level::Trace => 7,
        },
        record.target(),
        record.args()
    )
}

fn init_logging() -> ApiResult<()> {
    /* Try to provide reasonable default filters, when RUST_LOG is not specified */
    const DEFAULT_LOG_FILTERS: &[&str] = &["debug", "tungstenite=info", "tokio_tungstenite=info"];

    let log_filters = std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTERS.join(","));

    /* Detect if we need syslog or human-readable formatting */
    if std::env::var("SYSTEMD_EXEC_PID").is_ok_and(|pid| pid == std::process::id().to_string()) {
        Ok(pretty_env_logger::env_logger::builder()
            .format(syslog_format)
            .parse_filters(&log_filters)
            .try_init()?)
    } else {
        Ok(pretty_env_logger::formatted_timed_builder()
            .parse_filters(&log_filters)
            .try_init()?)
    }
}

/// Run one runtime connection forever, reconnecting on failure.
async fn run_server(
    name: String,
    server: RuntimeServer,
    bridge: BridgeConfig,
    dispatcher: Dispatcher,
    context: EntityContext,
) {
    let reconnect = Duration::from_secs(
        server
            .reconnect_interval_secs
            .map_or(u64::from(bridge.reconnect_interval_secs), |secs| {
                u64::from(secs.get())
            }),
    );

    loop {
        match Controller::connect(&server).await {
            Ok(controller) => {
                log::info!("{name}: connected to {}", server.url);
                let mut backend = GatewayBackend::new(
                    name.clone(),
                    controller.clone(),
                    dispatcher.clone(),
                    context.clone(),
                    bridge.coordinator_name.clone(),
                );
                if let Err(err) = backend.run().await {
                    log::error!("{name}: backend stopped: {err}");
                }
                controller.disconnect();
            }
            Err(err) => {
                log::error!("{name}: connection failed: {err}");
            }
        }

        log::info!("{name}: reconnecting in {}s", reconnect.as_secs());
        tokio::time::sleep(reconnect).await;
    }
}

async fn run() -> ApiResult<()> {
    init_logging()?;

    let args = Args::parse();
    let config = config::parse(&args.config)?;
    log::debug!("Configuration loaded successfully");

    if !config.has_servers() {
        log::warn!("{}", "-".repeat(80));
        log::warn!("No runtime servers configured in config!");
        log::warn!("Heimdall will run, but has nothing to bridge.");
        log::warn!("");
        log::warn!(" ** Please configure at least one runtime server **");
        log::warn!("{}", "-".repeat(80));
    }

    let dispatcher = Dispatcher::new();
    let context = EntityContext::new(Arc::new(LogWriter));

    let mut tasks = Vec::new();
    for (name, server) in config.runtime.servers.clone() {
        tasks.push(tokio::spawn(run_server(
            name,
            server,
            config.bridge.clone(),
            dispatcher.clone(),
            context.clone(),
        )));
    }

    let mut terminate = signal::unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = signal::ctrl_c() => log::warn!("Ctrl-C pressed, exiting.."),
        _ = terminate.recv() => log::warn!("SIGTERM received, exiting.."),
    }

    for task in tasks {
        task.abort();
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        log::error!("Heimdall error: {err}");
        log::error!("Fatal error encountered, cannot continue.");
    }
}
