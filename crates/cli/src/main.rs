//! Runs message queue triggers against a NATS `JetStream` server.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod config;

use config::TriggerFile;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use mqtrigger_bootable::run_until_cancelled;
use mqtrigger_core::{
    Bridge, BridgeOptions, HttpInvoker, RouterResolver, TriggerManager, max_dispatch_duration,
};
use mqtrigger_messaging_nats::{DEFAULT_STREAM_PREFIX, NatsBroker, NatsBrokerOptions};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use url::Url;

/// CLI-specific error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Broker connection error
    #[error(transparent)]
    Broker(#[from] mqtrigger_messaging_nats::Error),

    /// Trigger manager lifecycle error
    #[error("trigger manager error: {0}")]
    Manager(String),

    /// Signal handler installation error
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] std::io::Error),

    /// Trigger file error
    #[error("trigger file error: {0}")]
    TriggerFile(String),
}

/// Slack added on top of the longest dispatch when deriving the ack deadline.
const ACK_WAIT_MARGIN: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Redelivery deadline for unacknowledged messages in milliseconds;
    /// derived from the attempt timeout when unset
    #[arg(long, env = "MQTRIGGER_ACK_WAIT_MS", value_parser = clap::value_parser!(u64).range(1..))]
    ack_wait_ms: Option<u64>,

    /// Per-attempt invocation timeout in milliseconds
    #[arg(
        long,
        default_value_t = 10_000,
        env = "MQTRIGGER_ATTEMPT_TIMEOUT_MS",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    attempt_timeout_ms: u64,

    /// Path segment under which the router serves functions
    #[arg(long, default_value = "function", env = "MQTRIGGER_FUNCTION_PATH_PREFIX")]
    function_path_prefix: String,

    /// NATS server URL
    #[arg(long, default_value = "nats://localhost:4222", env = "MQTRIGGER_NATS_URL")]
    nats_url: String,

    /// Router base URL
    #[arg(long, default_value = "http://localhost:8888", env = "MQTRIGGER_ROUTER_URL")]
    router_url: Url,

    /// Existing stream capturing every trigger topic
    #[arg(long, env = "MQTRIGGER_STREAM_NAME")]
    stream_name: Option<String>,

    /// Prefix for streams created per topic
    #[arg(long, default_value = DEFAULT_STREAM_PREFIX, env = "MQTRIGGER_STREAM_PREFIX")]
    stream_prefix: String,

    /// TOML file with `[[trigger]]` definitions
    #[arg(long, env = "MQTRIGGER_TRIGGERS")]
    triggers: PathBuf,
}

impl Args {
    fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    /// Explicit ack deadline, or one that outlasts every retry of a dispatch.
    fn ack_wait(&self) -> Duration {
        self.ack_wait_ms.map_or_else(
            || max_dispatch_duration(self.attempt_timeout()) + ACK_WAIT_MARGIN,
            Duration::from_millis,
        )
    }
}

async fn wait_for_signal() -> Result<(), Error> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("received interrupt signal");
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let trigger_file = TriggerFile::load(&args.triggers)?;

    info!(
        triggers = trigger_file.triggers.len(),
        path = %args.triggers.display(),
        "loaded trigger definitions"
    );

    let attempt_timeout = args.attempt_timeout();
    let ack_wait = args.ack_wait();
    if ack_wait <= max_dispatch_duration(attempt_timeout) {
        warn!(
            ?ack_wait,
            ?attempt_timeout,
            "ack wait is shorter than the longest dispatch; messages may be redelivered while in flight"
        );
    }

    let broker = NatsBroker::connect(NatsBrokerOptions {
        ack_wait: Some(ack_wait),
        client_name: Some("mqtrigger".to_string()),
        stream_name: args.stream_name,
        stream_prefix: args.stream_prefix,
        url: args.nats_url,
    })
    .await?;

    let bridge = Bridge::new(BridgeOptions {
        attempt_timeout: Some(attempt_timeout),
        broker,
        invoker: HttpInvoker::new(),
        resolver: RouterResolver::new(args.router_url).with_path_prefix(args.function_path_prefix),
    });

    let manager = TriggerManager::new(bridge, trigger_file.triggers);

    let shutdown_token = CancellationToken::new();
    let signal_task = tokio::spawn({
        let shutdown_token = shutdown_token.clone();
        async move {
            let result = wait_for_signal().await;
            shutdown_token.cancel();
            result
        }
    });

    if let Err(e) = run_until_cancelled(&manager, &shutdown_token).await {
        error!(error = %e, "trigger manager failed");
        signal_task.abort();
        return Err(Error::Manager(e.to_string()));
    }

    if signal_task.is_finished() {
        if let Ok(Err(e)) = signal_task.await {
            return Err(e);
        }
    } else {
        signal_task.abort();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        Args::try_parse_from(
            ["mqtrigger", "--triggers", "triggers.toml"]
                .iter()
                .chain(extra),
        )
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]).unwrap();

        assert_eq!(args.attempt_timeout(), Duration::from_secs(10));
        assert_eq!(args.ack_wait(), Duration::from_secs(130));
    }

    #[test]
    fn test_zero_attempt_timeout_rejected() {
        assert!(parse(&["--attempt-timeout-ms", "0"]).is_err());
        assert!(parse(&["--ack-wait-ms", "0"]).is_err());
    }

    #[test]
    fn test_ack_wait_follows_attempt_timeout() {
        let args = parse(&["--attempt-timeout-ms", "60000"]).unwrap();
        assert_eq!(args.ack_wait(), Duration::from_secs(630));

        let args = parse(&["--attempt-timeout-ms", "60000", "--ack-wait-ms", "5000"]).unwrap();
        assert_eq!(args.ack_wait(), Duration::from_secs(5));
    }
}
