//! The per-connection accept/dispatch flow: WebSocket handshake, frame decode, and
//! dispatch to [`Session`] handlers. Based on a `comms::server::handle_connection`
//! style accept loop (`accept_async`, split sink/stream, `tokio::select!`), adapted
//! so outgoing frames are funneled through a per-session
//! channel rather than a single broadcast channel, since fan-out here is filtered per
//! recipient by `loaded_chunks` (spec.md §4.7) rather than uniform.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use glyphgrid_log::{info, warn};
use glyphgrid_proto::{decode_client_message, encode_server_message, ClientMessage, ServerMessage};
use glyphgrid_store::PersistentPool;

use crate::registry::Registry;
use crate::session::Session;

/// Accepts the WebSocket handshake on `stream` and runs its connection lifecycle to
/// completion, logging (not propagating) any error — the caller has nothing further
/// to do once a connection ends.
pub async fn accept_connection(pool: Arc<PersistentPool>, registry: Arc<Registry>, stream: TcpStream) {
    if let Err(err) = handle_connection(pool, registry, stream).await {
        warn!("connection error: {err:#}");
    }
}

async fn handle_connection(
    pool: Arc<PersistentPool>,
    registry: Arc<Registry>,
    stream: TcpStream,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut sink, mut incoming) = ws_stream.split();

    let (outgoing_tx, mut outgoing_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let session = Session::new(pool, registry.clone(), outgoing_tx);
    let index = registry.insert(session.handle().clone());
    info!("{}", registry.graph_line(index, true));

    let writer = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let text = encode_server_message(&msg);
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let result = read_loop(&mut incoming, &session).await;

    registry.remove(index);
    info!("{}", registry.graph_line(index, false));
    writer.abort();

    result
}

async fn read_loop(
    incoming: &mut futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<TcpStream>,
    >,
    session: &Session,
) -> anyhow::Result<()> {
    while let Some(frame) = incoming.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => break,
            Err(err) => return Err(err.into()),
        };

        let text = match frame {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue, // binary/ping/pong: not part of the protocol, ignored
        };

        match decode_client_message(&text) {
            Ok(Some(msg)) => dispatch(session, msg).await?,
            Ok(None) => {} // unknown `type`: ignored per spec.md §6
            Err(err) => warn!("malformed frame dropped: {err}"),
        }
    }
    Ok(())
}

async fn dispatch(session: &Session, msg: ClientMessage) -> anyhow::Result<()> {
    match msg {
        ClientMessage::RequestChunks(positions) => {
            session.handle_request_chunks(positions).await?;
        }
        ClientMessage::UnloadChunks(positions) => {
            session.handle_unload_chunks(&positions);
        }
        ClientMessage::SaveChanges(changes) => {
            session.handle_save_changes(changes).await?;
        }
    }
    Ok(())
}
