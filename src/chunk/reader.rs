use crate::chunk::MessageInProgress;
use crate::command::CommandCollator;
use crate::message::decode_message;
use crate::protocol::{
    DEFAULT_CHUNK_SIZE, EXTENDED_TIMESTAMP, HANDSHAKE_PACKET_SIZE, MSG_TYPE_SET_CHUNK_SIZE,
    RTMP_VERSION,
};
use crate::{byte_pipe, Error, Result};
use bytes::Bytes;
use log::{debug, error, trace};
use std::collections::HashMap;
use std::io::{Error as IoError, ErrorKind};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, BufReader};
use tokio::task::JoinSet;

/// In-flight payload chunks between the demultiplexer and one message
/// decoder. Small on purpose: the pipe is the backpressure mechanism.
const MESSAGE_PIPE_CAPACITY: usize = 4;

/// Per-flow RTMP chunk demultiplexer.
///
/// Consumes one reassembled TCP byte stream: recognizes the handshake, then
/// parses chunk headers and routes payload bytes to the in-progress message
/// of each chunk stream id. Every message gets its own decoder task fed
/// through a bounded byte pipe; a message closes out when its declared
/// length has been fully forwarded.
pub struct ChunkReader {
    label: String,

    /// Messages in progress by chunk stream id
    streams: HashMap<u32, MessageInProgress>,

    /// Flow-wide chunk size, updated by set-chunk-size control messages
    chunk_size: u32,

    /// Collator shared with this flow's decoder tasks
    collator: Arc<CommandCollator>,

    /// Decoder tasks still running for this flow
    decoders: JoinSet<()>,
}

impl ChunkReader {
    pub fn new(label: impl Into<String>, collator: Arc<CommandCollator>) -> Self {
        ChunkReader {
            label: label.into(),
            streams: HashMap::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            collator,
            decoders: JoinSet::new(),
        }
    }

    /// Drive one TCP flow to completion.
    ///
    /// Returns only after every decoder task has finished and the rest of
    /// the TCP stream has been discarded, so the caller can treat task exit
    /// as flow completion.
    pub async fn run<R: AsyncRead + Unpin + Send>(mut self, reader: R) {
        let mut reader = BufReader::new(reader);

        if self.read_handshake(&mut reader).await {
            loop {
                match self.process_chunk(&mut reader).await {
                    Ok(()) => {}
                    Err(e) if e.is_eof() => {
                        debug!("{}: {}", self.label, e);
                        break;
                    }
                    Err(e) => {
                        error!("{}: {}", self.label, e);
                        break;
                    }
                }
            }
        }

        self.teardown(&mut reader).await;
    }

    /// Consume C0 (version) plus the C1 and C2 blobs. Content is ignored:
    /// a passive observer has nothing to verify or echo. Returns false if
    /// this does not look like RTMP or the stream ended early.
    async fn read_handshake<R: AsyncRead + Unpin>(&self, reader: &mut R) -> bool {
        let mut version = [0u8; 1];
        if let Err(e) = reader.read_exact(&mut version).await {
            if e.kind() != ErrorKind::UnexpectedEof {
                debug!("{}: read: {}", self.label, e);
            }
            return false;
        }
        if version[0] != RTMP_VERSION {
            debug!("{}: not RTMP", self.label);
            return false;
        }

        let mut blob = vec![0u8; HANDSHAKE_PACKET_SIZE];
        for _ in 0..2 {
            if let Err(e) = reader.read_exact(&mut blob).await {
                debug!("{}: handshake read: {}", self.label, e);
                return false;
            }
        }

        debug!("{}: RTMP handshake consumed", self.label);
        true
    }

    /// Parse one chunk: basic header, per-format message header, optional
    /// extended timestamp, then payload routed to the message's pipe.
    async fn process_chunk<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<()> {
        let basic = reader
            .read_u8()
            .await
            .map_err(|e| Error::chunk("read headertype", e))?;
        let format = basic >> 6;
        let mut csid = u32::from(basic & 0x3F);

        if csid == 0 {
            let ext = reader
                .read_u8()
                .await
                .map_err(|e| Error::chunk("read chunkStreamID=0 next byte", e))?;
            csid = u32::from(ext) + 64;
        } else if csid == 1 {
            let ext = reader
                .read_u16()
                .await
                .map_err(|e| Error::chunk("read chunkStreamID=1 next bytes", e))?;
            csid = u32::from(ext) + 64;
        }

        trace!("{}: fmt {} chunkStreamID {}", self.label, format, csid);

        let msg = self.streams.entry(csid).or_default();

        match format {
            0 | 1 => {
                msg.timestamp = read_u24(reader)
                    .await
                    .map_err(|e| Error::chunk("read message header", e))?;
                msg.message_length = read_u24(reader)
                    .await
                    .map_err(|e| Error::chunk("read message header", e))?;
                msg.type_id = reader
                    .read_u8()
                    .await
                    .map_err(|e| Error::chunk("read message header", e))?;
                if format == 0 {
                    msg.message_stream_id = reader
                        .read_u32_le()
                        .await
                        .map_err(|e| Error::chunk("read streamID", e))?;
                    trace!("{}: have streamID {}", self.label, msg.message_stream_id);
                    // Only a full header establishes the chunk stream; a
                    // fmt-1 delta still needs a message-stream-id from
                    // somewhere.
                    msg.header_seen = true;
                }
            }
            2 => {
                msg.timestamp = read_u24(reader)
                    .await
                    .map_err(|e| Error::chunk("read timestampDelta", e))?;
            }
            _ => {} // fmt 3 carries no message header
        }

        if msg.timestamp == EXTENDED_TIMESTAMP {
            // Validated by consuming it; the value itself is not retained.
            let extended = reader
                .read_u32()
                .await
                .map_err(|e| Error::chunk("read extendedTimestamp", e))?;
            trace!("{}: extendedTimestamp {}", self.label, extended);
        }

        if !msg.header_seen {
            // First chunk on this csid was a continuation; a mid-stream
            // observer cannot reconstruct the message it belongs to.
            return Err(Error::protocol(format!(
                "missed the header of chunkStreamID {}",
                csid
            )));
        }

        if msg.writer.is_none() {
            let (writer, payload) = byte_pipe(MESSAGE_PIPE_CAPACITY);
            msg.writer = Some(writer);
            self.decoders
                .spawn(decode_message(payload, msg.type_id, Arc::clone(&self.collator)));
        }

        if msg.remaining == 0 {
            // First chunk of a new message on this csid.
            msg.remaining = msg.message_length;
        }

        trace!(
            "{}: chunkStreamID {} type {} remaining {}",
            self.label,
            csid,
            msg.type_id,
            msg.remaining
        );

        // Set-chunk-size applies to the whole flow, so it is decoded here
        // rather than in the message decoder.
        if msg.type_id == MSG_TYPE_SET_CHUNK_SIZE && msg.remaining >= 4 {
            let size = reader
                .read_u32()
                .await
                .map_err(|e| Error::chunk("read chunkSize", e))?;
            msg.remaining -= 4;
            self.chunk_size = size;
            debug!("{}: new chunk size {}", self.label, size);
        }

        let take = self.chunk_size.min(msg.remaining);
        msg.remaining -= take;

        if take > 0 {
            let mut payload = vec![0u8; take as usize];
            reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| Error::chunk("read chunk payload", e))?;
            if let Some(writer) = &msg.writer {
                writer.write(Bytes::from(payload)).await?;
            }
        }

        if msg.remaining == 0 {
            trace!("{}: closing out chunkStreamID {}", self.label, csid);
            // Dropping the writer ends the decoder's stream cleanly. Header
            // memory stays so later fmt-1/2/3 chunks keep decoding.
            msg.writer.take();
        }

        Ok(())
    }

    /// Close every open payload pipe with an error so decoders drain and
    /// exit, wait for them, tell the collator the flow ended, and discard
    /// whatever the TCP stream still carries.
    async fn teardown<R: AsyncRead + Unpin>(&mut self, reader: &mut R) {
        for msg in self.streams.values_mut() {
            if let Some(writer) = msg.writer.take() {
                writer
                    .close_with_error(IoError::new(ErrorKind::ConnectionAborted, "flow exiting"))
                    .await;
            }
        }

        while self.decoders.join_next().await.is_some() {}

        self.collator.finish();

        let _ = tokio::io::copy(reader, &mut tokio::io::sink()).await;
        debug!("{}: flow done", self.label);
    }
}

/// 24-bit big-endian read, shared by timestamp and length fields.
async fn read_u24<R: AsyncRead + Unpin>(reader: &mut R) -> std::io::Result<u32> {
    let mut bytes = [0u8; 3];
    reader.read_exact(&mut bytes).await?;
    Ok(u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]))
}
