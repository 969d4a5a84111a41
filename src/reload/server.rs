// src/reload/server.rs

//! WebSocket live-reload server.
//!
//! Every connected client receives one text frame per reload:
//!
//! ```json
//! { "type": "reload", "paths": ["src/css/site.css"] }
//! ```
//!
//! Clients are not expected to send anything; incoming frames other than
//! `Close` are ignored.

use std::net::SocketAddr;
use std::path::PathBuf;

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use super::ReloadNotifier;

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ReloadMessage<'a> {
    Reload { paths: Vec<&'a str> },
}

#[derive(Debug)]
pub struct WsReloadServer {
    addr: SocketAddr,
    messages: broadcast::Sender<String>,
    shutdown_tx: broadcast::Sender<()>,
}

impl WsReloadServer {
    /// Bind `host:port` and start accepting clients in the background.
    ///
    /// Port 0 picks a free port; see [`WsReloadServer::local_addr`].
    pub async fn start(host: &str, port: u16) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;

        info!(%addr, "live-reload server listening");

        let (messages, _) = broadcast::channel::<String>(16);
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        let messages_for_clients = messages.clone();
        let mut shutdown_rx = shutdown_tx.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, peer)) => {
                                let rx = messages_for_clients.subscribe();
                                tokio::spawn(async move {
                                    if let Err(e) = handle_client(stream, peer, rx).await {
                                        warn!(%peer, error = %e, "live-reload client error");
                                    }
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "failed to accept live-reload connection");
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("live-reload server shutting down");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            addr,
            messages,
            shutdown_tx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.messages.receiver_count()
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for WsReloadServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl ReloadNotifier for WsReloadServer {
    fn notify(&self, changed: &[PathBuf]) {
        let paths: Vec<String> = changed
            .iter()
            .map(|p| crate::watch::path_utils::to_slash(p))
            .collect();
        let msg = ReloadMessage::Reload {
            paths: paths.iter().map(String::as_str).collect(),
        };
        let text = match serde_json::to_string(&msg) {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "failed to encode reload message");
                return;
            }
        };
        // No receivers just means no browser is connected.
        match self.messages.send(text) {
            Ok(clients) => info!(clients, paths = changed.len(), "reload sent"),
            Err(_) => debug!("reload requested with no connected clients"),
        }
    }
}

async fn handle_client(
    stream: TcpStream,
    peer: SocketAddr,
    mut messages: broadcast::Receiver<String>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    debug!(%peer, "live-reload client connected");

    loop {
        tokio::select! {
            msg = messages.recv() => {
                match msg {
                    Ok(text) => {
                        if ws_tx.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(%peer, skipped = n, "live-reload client lagging");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(%peer, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    debug!(%peer, "live-reload client disconnected");
    Ok(())
}
