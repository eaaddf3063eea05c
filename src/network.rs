//! Network client for the CertStream WebSocket connection
//!
//! This module handles connecting to the certstream websocket, parsing
//! messages, filtering heartbeats, and managing reconnection logic. Only
//! certificate-update events are forwarded to the pipeline.

use crate::core::CertificateEvent;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;

/// A parsed certstream message, discriminated by `message_type`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Liveness-only message; carries no domain data and is dropped here.
    Heartbeat,
    /// A newly observed certificate with its full domain list (possibly empty).
    CertificateUpdate { all_domains: Vec<String> },
}

/// Parses a raw certstream JSON message.
///
/// # Returns
/// * `Ok(StreamMessage)` for heartbeats and certificate updates
/// * `Err` if the JSON is malformed or the message type is unknown
pub fn parse_message(text: &str) -> Result<StreamMessage> {
    #[derive(Deserialize)]
    struct RawMessage {
        message_type: String,
        data: Option<MessageData>,
    }

    #[derive(Deserialize)]
    struct MessageData {
        leaf_cert: LeafCert,
    }

    #[derive(Deserialize)]
    struct LeafCert {
        all_domains: Vec<String>,
    }

    let message: RawMessage = serde_json::from_str(text)?;
    match message.message_type.as_str() {
        "heartbeat" => Ok(StreamMessage::Heartbeat),
        "certificate_update" => {
            let data = message
                .data
                .ok_or_else(|| anyhow::anyhow!("certificate_update without data payload"))?;
            Ok(StreamMessage::CertificateUpdate {
                all_domains: data.leaf_cert.all_domains,
            })
        }
        other => Err(anyhow::anyhow!("unknown message type: {}", other)),
    }
}

/// Trait for WebSocket connections to enable testing with fake implementations
#[async_trait]
pub trait WebSocketConnection: Send + Sync {
    /// Reads the next message from the WebSocket connection
    ///
    /// # Returns
    /// * `Some(Ok(Message))` if a message was successfully received
    /// * `Some(Err(error))` if there was an error reading the message
    /// * `None` if the connection has been closed
    async fn read_message(
        &mut self,
    ) -> Option<Result<Message, tokio_tungstenite::tungstenite::Error>>;
}

/// CertStream WebSocket client that subscribes to the certificate
/// transparency feed and forwards certificate-update events downstream.
pub struct CertStreamClient {
    url: String,
    allow_invalid_certs: bool,
    events_tx: async_channel::Sender<CertificateEvent>,
}

impl CertStreamClient {
    /// # Arguments
    /// * `url` - The WebSocket URL to connect to (e.g., "wss://certstream.calidog.io")
    /// * `events_tx` - Channel sender feeding the ingestion workers
    /// * `allow_invalid_certs` - Accept invalid TLS certificates (test servers)
    pub fn new(
        url: String,
        events_tx: async_channel::Sender<CertificateEvent>,
        allow_invalid_certs: bool,
    ) -> Self {
        Self {
            url,
            allow_invalid_certs,
            events_tx,
        }
    }

    /// Handles one raw text frame: parse, filter heartbeats, forward events.
    /// Returns `Err` only when the downstream channel is closed.
    async fn handle_text(&self, text: &str) -> Result<()> {
        match parse_message(text) {
            Ok(StreamMessage::Heartbeat) => {
                metrics::counter!("stream_heartbeats").increment(1);
                log::debug!("Received heartbeat, ignoring");
            }
            Ok(StreamMessage::CertificateUpdate { all_domains }) => {
                metrics::counter!("stream_certificate_updates").increment(1);
                let event = CertificateEvent::new(all_domains);
                if let Err(e) = self.events_tx.send(event).await {
                    log::error!("Failed to send event to ingestion channel: {}", e);
                    return Err(anyhow::anyhow!("event channel closed: {}", e));
                }
            }
            Err(e) => {
                log::warn!("Failed to parse certstream message: {}", e);
                // Continue processing other messages
            }
        }
        Ok(())
    }

    /// Runs the client with a custom WebSocket connection (primarily for testing)
    ///
    /// Processes messages from the provided connection until it closes, then
    /// returns. It does not implement reconnection logic.
    pub async fn run_with_connection(
        &self,
        mut connection: Box<dyn WebSocketConnection>,
    ) -> Result<()> {
        log::info!("Starting CertStream client message processing");

        while let Some(msg_result) = connection.read_message().await {
            match msg_result {
                Ok(Message::Text(text)) => self.handle_text(text.as_str()).await?,
                Ok(Message::Binary(_)) => {
                    log::debug!("Received binary message, ignoring");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    log::info!("Received close message from server");
                    break;
                }
                Ok(Message::Frame(_)) => {
                    log::debug!("Received frame message, ignoring");
                }
                Err(e) => {
                    log::error!("WebSocket error: {}", e);
                    return Err(anyhow::anyhow!("WebSocket error: {}", e));
                }
            }
        }

        log::info!("WebSocket connection closed");
        Ok(())
    }

    /// Runs the client with automatic reconnection to the configured URL.
    ///
    /// Reconnects with exponential backoff until the shutdown signal fires.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let mut backoff_ms: u64 = 1000;
        const MAX_BACKOFF_MS: u64 = 60_000;

        loop {
            log::info!("Attempting to connect to {}", self.url);

            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::info!("CertStream client received shutdown signal.");
                    return Ok(());
                }
                result = self.connect_and_run() => {
                    match result {
                        Ok(()) => {
                            log::info!("Connection closed normally");
                            backoff_ms = 1000;
                        }
                        Err(e) => {
                            metrics::counter!("stream_connection_failures").increment(1);
                            log::error!("Connection failed: {}", e);
                        }
                    }
                }
            }

            log::info!("Reconnecting in {} ms", backoff_ms);
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::info!("CertStream client received shutdown signal during backoff.");
                    return Ok(());
                }
                _ = tokio::time::sleep(Duration::from_millis(backoff_ms)) => {}
            }
            backoff_ms = std::cmp::min(backoff_ms * 2, MAX_BACKOFF_MS);
        }
    }

    /// Connects to the WebSocket URL and runs the message processing loop
    async fn connect_and_run(&self) -> Result<()> {
        use futures_util::stream::StreamExt;
        use tokio_tungstenite::{connect_async_tls_with_config, Connector};

        let connector = if self.allow_invalid_certs {
            let tls = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .build()?;
            Some(Connector::NativeTls(tls))
        } else {
            None
        };

        let (ws_stream, _) =
            connect_async_tls_with_config(self.url.as_str(), None, false, connector)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to connect to {}: {}", self.url, e))?;

        log::info!("Connected to {}", self.url);

        let (_, mut read) = ws_stream.split();

        while let Some(msg_result) = read.next().await {
            match msg_result {
                Ok(Message::Text(text)) => self.handle_text(text.as_str()).await?,
                Ok(Message::Binary(_)) => {
                    log::debug!("Received binary message, ignoring");
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(Message::Close(_)) => {
                    log::info!("Received close message from server");
                    break;
                }
                Ok(Message::Frame(_)) => {
                    log::debug!("Received frame message, ignoring");
                }
                Err(e) => {
                    return Err(anyhow::anyhow!("WebSocket error: {}", e));
                }
            }
        }

        Ok(())
    }
}
