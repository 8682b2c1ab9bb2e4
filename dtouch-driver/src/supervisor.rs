use crate::{
    driver::DTouchDriver,
    protocol::session::{DTouchSession, DTouchSessionImpl},
    types::Connection,
};
use backoff::backoff::Backoff;
use dtouch_sdk::{build_exponential_backoff, ConnectionState, DriverError, DriverResult, RetryPolicy};
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

/// Keeps the link to the controller open and the driver polling over it.
pub struct DTouchSupervisor {
    connection: Connection,
    retry: RetryPolicy,
    cancel_token: CancellationToken,
    state_tx: watch::Sender<ConnectionState>,
}

impl DTouchSupervisor {
    pub fn new(
        connection: Connection,
        retry: RetryPolicy,
        cancel_token: CancellationToken,
        state_tx: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            connection,
            retry,
            cancel_token,
            state_tx,
        }
    }

    async fn connect_once(
        connection: &Connection,
        address: u8,
    ) -> DriverResult<Arc<dyn DTouchSession>> {
        match connection {
            Connection::Serial {
                port,
                baud_rate,
                data_bits,
                stop_bits,
                parity,
            } => {
                let serial = tokio_serial::new(port, *baud_rate)
                    .data_bits((*data_bits).into())
                    .stop_bits((*stop_bits).into())
                    .parity((*parity).into())
                    .open_native_async()
                    .map_err(|e| DriverError::SessionError(e.to_string()))?;

                Ok(Arc::new(DTouchSessionImpl::new(serial, address)))
            }
            Connection::Tcp { host, port } => {
                let addr = format!("{}:{}", host, port);
                let stream = tokio::net::TcpStream::connect(&addr)
                    .await
                    .map_err(|e| DriverError::SessionError(format!("TCP connect failed: {}", e)))?;
                Ok(Arc::new(DTouchSessionImpl::new(stream, address)))
            }
        }
    }

    /// Open the link, run the driver on it and reopen it when it fails.
    ///
    /// Returns once cancelled, or with an error when the retry policy gives
    /// up on opening the link.
    pub async fn run(self, driver: Arc<DTouchDriver>) -> DriverResult<()> {
        let cancel = self.cancel_token.clone();
        let address = driver.device().address;

        loop {
            let _ = self.state_tx.send(ConnectionState::Connecting);

            let mut backoff = build_exponential_backoff(&self.retry);
            let mut attempts: u32 = 0;

            let session: Arc<dyn DTouchSession> = loop {
                if cancel.is_cancelled() {
                    let _ = self.state_tx.send(ConnectionState::Disconnected);
                    return Ok(());
                }

                match Self::connect_once(&self.connection, address).await {
                    Ok(sess) => break sess,
                    Err(e) => {
                        let _ = self.state_tx.send(ConnectionState::Failed(e.to_string()));
                        attempts = attempts.saturating_add(1);
                        let delay = if self.retry.allows(attempts) {
                            backoff.next_backoff()
                        } else {
                            None
                        };
                        let Some(delay) = delay else {
                            tracing::error!(
                                connection = %self.connection,
                                attempts,
                                error = %e,
                                "Giving up opening connection"
                            );
                            return Err(e);
                        };
                        tracing::warn!(
                            connection = %self.connection,
                            attempts,
                            retry_in_ms = delay.as_millis() as u64,
                            error = %e,
                            "Failed to open connection"
                        );

                        tokio::select! {
                            _ = cancel.cancelled() => {
                                let _ = self.state_tx.send(ConnectionState::Disconnected);
                                return Ok(());
                            }
                            _ = sleep(delay) => {}
                        }
                    }
                }
            };

            tracing::info!(connection = %self.connection, address, "Connection established");
            let _ = self.state_tx.send(ConnectionState::Connected);

            match driver.run(session, cancel.child_token()).await {
                Ok(()) => {
                    let _ = self.state_tx.send(ConnectionState::Disconnected);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(connection = %self.connection, error = %e, "Connection lost, reconnecting");
                    let _ = self.state_tx.send(ConnectionState::Reconnecting);
                    // Give the port a moment before reopening it.
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            let _ = self.state_tx.send(ConnectionState::Disconnected);
                            return Ok(());
                        }
                        _ = sleep(Duration::from_millis(self.retry.initial_interval_ms)) => {}
                    }
                }
            }
        }
    }
}
