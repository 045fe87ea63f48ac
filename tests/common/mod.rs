// Shared builders for the end-to-end tests: synthetic handshakes, chunk
// headers, AMF command payloads and a single-flow harness.

use bytes::Bytes;
use rtmpsniff::{Amf0Encoder, AmfValue, FlowFactory, FlowSupervisor};
use tokio::sync::mpsc;

pub const MSG_TYPE_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_TYPE_COMMAND_AMF0: u8 = 20;

/// Client handshake: version byte plus two zero-filled 1536-byte blobs.
pub fn handshake() -> Vec<u8> {
    let mut bytes = vec![0x03];
    bytes.extend_from_slice(&vec![0u8; 1536 * 2]);
    bytes
}

/// One-byte basic header for csid < 64.
pub fn basic_header(fmt: u8, csid: u8) -> Vec<u8> {
    vec![(fmt << 6) | (csid & 0x3F)]
}

/// The 11-byte fmt-0 message header (timestamp zero).
pub fn message_header_fmt0(type_id: u8, stream_id: u32, length: u32) -> Vec<u8> {
    let mut header = vec![0, 0, 0]; // timestamp
    header.extend_from_slice(&length.to_be_bytes()[1..]); // u24 length
    header.push(type_id);
    header.extend_from_slice(&stream_id.to_le_bytes());
    header
}

/// Complete fmt-0 chunk header on a small csid.
pub fn chunk_fmt0(csid: u8, type_id: u8, stream_id: u32, length: u32) -> Vec<u8> {
    let mut chunk = basic_header(0, csid);
    chunk.extend_from_slice(&message_header_fmt0(type_id, stream_id, length));
    chunk
}

/// fmt-3 continuation header on a small csid.
pub fn chunk_fmt3(csid: u8) -> Vec<u8> {
    basic_header(3, csid)
}

/// AMF payload of a `connect` command with the given options.
pub fn connect_payload(props: &[(&str, &str)]) -> Vec<u8> {
    let mut encoder = Amf0Encoder::new();
    encoder
        .encode(&AmfValue::String("connect".to_string()))
        .unwrap();
    encoder.encode(&AmfValue::Number(1.0)).unwrap();
    encoder
        .encode(&AmfValue::Object(
            props
                .iter()
                .map(|(k, v)| (k.to_string(), AmfValue::String(v.to_string())))
                .collect(),
        ))
        .unwrap();
    encoder.into_bytes()
}

/// AMF payload of a `play` command: name, transaction id, null, target.
pub fn play_payload(target: &str) -> Vec<u8> {
    let mut encoder = Amf0Encoder::new();
    encoder
        .encode(&AmfValue::String("play".to_string()))
        .unwrap();
    encoder.encode(&AmfValue::Number(2.0)).unwrap();
    encoder.encode_null();
    encoder
        .encode(&AmfValue::String(target.to_string()))
        .unwrap();
    encoder.into_bytes()
}

/// Run one flow's bytes through a fresh supervisor and collect everything
/// its collator emitted.
pub async fn run_flow(parts: Vec<Vec<u8>>) -> Vec<String> {
    let (results_tx, mut results_rx) = mpsc::channel(16);
    let mut supervisor = FlowSupervisor::new(results_tx);

    let writer = supervisor.new_flow("test flow");
    for part in parts {
        // Writes may fail only if the worker died; the flow outcome is
        // still whatever the collator managed to emit.
        let _ = writer.write(Bytes::from(part)).await;
    }
    drop(writer);

    supervisor.wait().await;

    let mut lines = Vec::new();
    while let Some(line) = results_rx.recv().await {
        lines.push(line);
    }
    lines
}

/// Convenience: handshake + whole-message chunks for a connect/play pair.
pub fn simple_flow(connect_props: &[(&str, &str)], play_target: &str) -> Vec<Vec<u8>> {
    let connect = connect_payload(connect_props);
    let play = play_payload(play_target);
    vec![
        handshake(),
        chunk_fmt0(3, MSG_TYPE_COMMAND_AMF0, 0, connect.len() as u32),
        connect,
        chunk_fmt0(3, MSG_TYPE_COMMAND_AMF0, 0, play.len() as u32),
        play,
    ]
}
