//! Message framing for the duplex transport: `{"type": string, "data": value}` frames,
//! with three message kinds in each direction and deterministic encoding of diffs.

use glyphgrid_core::{ChunkDiff, ChunkPos};
use serde::{Deserialize, Serialize};

/// A batch of per-chunk diffs, as exchanged in `save-changes` and `apply-changes`.
///
/// Encodes as an array of `[[x, y], {idx: char, …}]` entries. `BTreeMap` ordering inside
/// each [`ChunkDiff`] makes the encoding deterministic.
pub type ChangeSet = Vec<(ChunkPos, ChunkDiff)>;

/// Messages sent client → server.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    RequestChunks(Vec<ChunkPos>),
    UnloadChunks(Vec<ChunkPos>),
    SaveChanges(ChangeSet),
}

/// Messages sent server → client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    ApplyChanges(ChangeSet),
}

const TYPE_REQUEST_CHUNKS: &str = "request-chunks";
const TYPE_UNLOAD_CHUNKS: &str = "unload-chunks";
const TYPE_SAVE_CHANGES: &str = "save-changes";
const TYPE_APPLY_CHANGES: &str = "apply-changes";

#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The frame was not valid JSON, or its `data` didn't match the shape its `type` implies.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The envelope every frame is wrapped in.
#[derive(Serialize, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    data: serde_json::Value,
}

fn encode(kind: &str, data: serde_json::Value) -> String {
    // `Frame` fields only ever hold values we produced ourselves via `serde_json::to_value`,
    // so this can't fail.
    serde_json::to_string(&Frame {
        kind: kind.to_owned(),
        data,
    })
    .expect("encoding a frame built from valid JSON values cannot fail")
}

pub fn encode_client_message(msg: &ClientMessage) -> String {
    match msg {
        ClientMessage::RequestChunks(positions) => encode(
            TYPE_REQUEST_CHUNKS,
            serde_json::to_value(positions).expect("ChunkPos is always serializable"),
        ),
        ClientMessage::UnloadChunks(positions) => encode(
            TYPE_UNLOAD_CHUNKS,
            serde_json::to_value(positions).expect("ChunkPos is always serializable"),
        ),
        ClientMessage::SaveChanges(changes) => encode(
            TYPE_SAVE_CHANGES,
            serde_json::to_value(changes).expect("ChangeSet is always serializable"),
        ),
    }
}

pub fn encode_server_message(msg: &ServerMessage) -> String {
    match msg {
        ServerMessage::ApplyChanges(changes) => encode(
            TYPE_APPLY_CHANGES,
            serde_json::to_value(changes).expect("ChangeSet is always serializable"),
        ),
    }
}

/// Decodes a client → server frame.
///
/// Returns `Ok(None)` for any `type` other than the three client message kinds — per the
/// wire protocol, unknown types are ignored, not treated as errors.
pub fn decode_client_message(text: &str) -> Result<Option<ClientMessage>, ProtoError> {
    let frame: Frame = serde_json::from_str(text)?;
    match frame.kind.as_str() {
        TYPE_REQUEST_CHUNKS => Ok(Some(ClientMessage::RequestChunks(serde_json::from_value(
            frame.data,
        )?))),
        TYPE_UNLOAD_CHUNKS => Ok(Some(ClientMessage::UnloadChunks(serde_json::from_value(
            frame.data,
        )?))),
        TYPE_SAVE_CHANGES => Ok(Some(ClientMessage::SaveChanges(serde_json::from_value(
            frame.data,
        )?))),
        _ => Ok(None),
    }
}

/// Decodes a server → client frame.
///
/// Returns `Ok(None)` for any `type` other than `apply-changes`.
pub fn decode_server_message(text: &str) -> Result<Option<ServerMessage>, ProtoError> {
    let frame: Frame = serde_json::from_str(text)?;
    match frame.kind.as_str() {
        TYPE_APPLY_CHANGES => Ok(Some(ServerMessage::ApplyChanges(serde_json::from_value(
            frame.data,
        )?))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff_with(entries: &[(u16, char)]) -> ChunkDiff {
        let mut d = ChunkDiff::new();
        for &(i, c) in entries {
            d.set_index(i, c);
        }
        d
    }

    #[test]
    fn request_chunks_round_trips() {
        let msg = ClientMessage::RequestChunks(vec![ChunkPos::new(0, 0), ChunkPos::new(-1, 2)]);
        let encoded = encode_client_message(&msg);
        assert_eq!(
            encoded,
            r#"{"type":"request-chunks","data":[[0,0],[-1,2]]}"#
        );
        assert_eq!(decode_client_message(&encoded).unwrap(), Some(msg));
    }

    #[test]
    fn save_changes_round_trips() {
        let changes = vec![(ChunkPos::new(0, 0), diff_with(&[(0, 'a')]))];
        let msg = ClientMessage::SaveChanges(changes);
        let encoded = encode_client_message(&msg);
        assert_eq!(
            encoded,
            r#"{"type":"save-changes","data":[[[0,0],{"0":"a"}]]}"#
        );
        assert_eq!(decode_client_message(&encoded).unwrap(), Some(msg));
    }

    #[test]
    fn apply_changes_round_trips() {
        let changes = vec![(ChunkPos::new(1, 0), diff_with(&[(1, ' ')]))];
        let msg = ServerMessage::ApplyChanges(changes);
        let encoded = encode_server_message(&msg);
        assert_eq!(decode_server_message(&encoded).unwrap(), Some(msg));
    }

    #[test]
    fn unknown_type_is_ignored_not_an_error() {
        let text = r#"{"type":"ping","data":null}"#;
        assert_eq!(decode_client_message(text).unwrap(), None);
        assert_eq!(decode_server_message(text).unwrap(), None);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(decode_client_message("not json").is_err());
    }

    #[test]
    fn decodes_string_keyed_indices_on_the_wire() {
        let text = r#"{"type":"save-changes","data":[[[0,0],{"0":"a","1":" "}]]}"#;
        let Some(ClientMessage::SaveChanges(changes)) = decode_client_message(text).unwrap()
        else {
            panic!("expected SaveChanges");
        };
        assert_eq!(changes[0].1.get(0, ' '), 'a');
        assert_eq!(changes[0].1.get(1, 'x'), ' ');
    }
}
