//! Broker reachability probe.
//!
//! Brokers in container setups often come up after the services that use
//! them. [`wait_for_tcp`] blocks start-up until the broker accepts TCP
//! connections.

use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("gave up waiting for {0}")]
    Cancelled(String),
}

/// Retry connecting to `addr` every `retry_interval` until it succeeds or
/// `token` is cancelled. Returns the number of failed attempts.
pub async fn wait_for_tcp(
    addr: &str,
    retry_interval: Duration,
    token: &CancellationToken,
) -> Result<usize, ProbeError> {
    let mut failures = 0;
    loop {
        let attempt = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ProbeError::Cancelled(addr.to_string())),
            attempt = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr)) => attempt,
        };

        match attempt {
            Ok(Ok(_stream)) => {
                tracing::info!(addr = %addr, failures, "broker reachable");
                return Ok(failures);
            }
            Ok(Err(e)) => tracing::warn!(addr = %addr, error = %e, "broker not reachable yet"),
            Err(_) => tracing::warn!(addr = %addr, "broker connect timed out"),
        }
        failures += 1;

        tokio::select! {
            biased;
            _ = token.cancelled() => return Err(ProbeError::Cancelled(addr.to_string())),
            _ = tokio::time::sleep(retry_interval) => {}
        }
    }
}
