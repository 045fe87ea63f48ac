use crate::PipeWriter;

/// One RTMP message being reassembled on a chunk stream id.
///
/// The header fields persist after a message completes; later fmt-1/2/3
/// chunks on the same csid reuse whatever the last full or partial header
/// established. Only `writer` and `remaining` reset between messages.
pub struct MessageInProgress {
    /// False until a full fmt-0 header has been observed on this csid.
    pub header_seen: bool,

    /// 24-bit timestamp or timestamp-delta field as last seen on the wire.
    pub timestamp: u32,

    /// Declared message length (24-bit).
    pub message_length: u32,

    /// Message type id.
    pub type_id: u8,

    /// Message stream id (little-endian on the wire).
    pub message_stream_id: u32,

    /// Payload bytes still owed to the current message. Zero means the next
    /// chunk on this csid starts a new message.
    pub remaining: u32,

    /// Write end of the payload pipe feeding this message's decoder.
    pub writer: Option<PipeWriter>,
}

impl MessageInProgress {
    pub fn new() -> Self {
        MessageInProgress {
            header_seen: false,
            timestamp: 0,
            message_length: 0,
            type_id: 0,
            message_stream_id: 0,
            remaining: 0,
            writer: None,
        }
    }
}

impl Default for MessageInProgress {
    fn default() -> Self {
        Self::new()
    }
}
