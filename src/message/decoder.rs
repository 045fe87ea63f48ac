use crate::amf::{read_values, AmfValue};
use crate::command::CommandCollator;
use crate::protocol::{MSG_TYPE_COMMAND_AMF0, MSG_TYPE_COMMAND_AMF3};
use crate::{PipeReader, Result};
use log::debug;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// Decode one reassembled RTMP message from its payload pipe.
///
/// Command messages (AMF0 and AMF3-wrapped) are parsed into a value list
/// and handed to the flow's collator as one atomic update; everything else
/// is discarded. The pipe is always drained before returning so the
/// demultiplexer's payload writes can never deadlock on a finished decoder.
pub async fn decode_message(mut reader: PipeReader, type_id: u8, collator: Arc<CommandCollator>) {
    if type_id == MSG_TYPE_COMMAND_AMF0 || type_id == MSG_TYPE_COMMAND_AMF3 {
        match read_command(&mut reader, type_id).await {
            Ok(values) if !values.is_empty() => {
                debug!("command values: {:?}", values);
                collator.add(&values).await;
            }
            Ok(_) => {}
            // Includes flow-died pipe errors and mid-value truncation; a
            // partial command is never delivered.
            Err(e) => debug!("message type {}: {}", type_id, e),
        }
    }

    let _ = tokio::io::copy(&mut reader, &mut tokio::io::sink()).await;
}

async fn read_command(reader: &mut PipeReader, type_id: u8) -> Result<Vec<AmfValue>> {
    if type_id == MSG_TYPE_COMMAND_AMF3 {
        // Servers prefix one AMF3 type-marker byte; the body that follows
        // is plain AMF0. Genuine AMF3 encodings are not decoded.
        let _ = reader.read_u8().await?;
    }
    read_values(reader).await
}
