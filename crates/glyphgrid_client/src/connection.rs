//! The client's WebSocket connection: a writer task draining outgoing
//! [`ClientMessage`]s and a reader task reconciling incoming `apply-changes` into the
//! local pool. Adapted from an `ewebsock`-based connection to `tokio_tungstenite`
//! to match the server side's transport.

use std::sync::Arc;

use anyhow::Context as _;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;

use glyphgrid_log::{info, warn};
use glyphgrid_proto::{decode_server_message, encode_client_message, ClientMessage, ServerMessage};

use crate::pool::ClientPool;

/// A live connection to a glyphgrid server. Dropping it does not close the socket;
/// the reader/writer tasks run until the transport errors or the process exits. All
/// outgoing traffic flows through the returned [`ClientPool`], not through this
/// handle.
pub struct Connection;

impl Connection {
    /// Connects to `address:port` and spawns the reader/writer tasks. Returns the
    /// connection handle plus the [`ClientPool`] it feeds; `redraw` is signalled
    /// whenever the pool commits server-authoritative diffs.
    pub async fn connect(
        address: &str,
        port: u16,
        redraw: watch::Sender<()>,
    ) -> anyhow::Result<(Arc<ClientPool>, Connection)> {
        let url = format!("ws://{address}:{port}");
        let (ws_stream, _response) = tokio_tungstenite::connect_async(&url)
            .await
            .with_context(|| format!("connecting to {url}"))?;
        info!("connected to {url}");

        let (mut sink, mut stream) = ws_stream.split();
        let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let pool = Arc::new(ClientPool::new(outgoing_tx, redraw));

        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let text = encode_client_message(&msg);
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
        });

        let reader_pool = Arc::clone(&pool);
        tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(_) => break,
                };
                let text = match frame {
                    Message::Text(text) => text,
                    Message::Close(_) => break,
                    _ => continue,
                };
                match decode_server_message(&text) {
                    Ok(Some(ServerMessage::ApplyChanges(diffs))) => {
                        reader_pool.commit_diffs(&diffs);
                    }
                    Ok(None) => {} // unknown `type`: ignored per spec.md §6
                    Err(err) => warn!("malformed frame dropped: {err}"),
                }
            }
            info!("connection to server closed");
        });

        Ok((pool, Connection))
    }
}
