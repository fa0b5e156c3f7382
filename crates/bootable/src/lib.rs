//! Lifecycle interface for long-running bridge components.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Error returned by lifecycle operations.
pub type BootError = Box<dyn std::error::Error + Send + Sync>;

/// A component that is started once and runs until shut down.
#[async_trait]
pub trait Bootable
where
    Self: Send + Sync + 'static,
{
    /// Component name, for logging.
    fn name(&self) -> &str;

    /// Starts the component. Returns once it is running.
    async fn start(&self) -> Result<(), BootError>;

    /// Stops the component, waiting for in-flight work to finish.
    async fn shutdown(&self) -> Result<(), BootError>;

    /// Resolves once the component has stopped.
    async fn wait(&self);
}

/// Starts `component` and keeps it running until `shutdown_token` is
/// cancelled or the component stops by itself, then shuts it down.
///
/// # Errors
///
/// Returns the error of `start` (the component is not shut down then) or of
/// `shutdown`.
pub async fn run_until_cancelled<T>(
    component: &T,
    shutdown_token: &CancellationToken,
) -> Result<(), BootError>
where
    T: Bootable,
{
    component.start().await?;
    info!(component = component.name(), "started");

    tokio::select! {
        () = shutdown_token.cancelled() => {}
        () = component.wait() => info!(component = component.name(), "stopped by itself"),
    }

    info!(component = component.name(), "shutting down");
    component.shutdown().await
}
