use bytes::Bytes;
use std::io::{Error as IoError, ErrorKind, Result as IoResult};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::mpsc;

/// Create a bounded single-producer single-consumer byte pipe.
///
/// `capacity` is the number of in-flight payload chunks, not bytes; a small
/// value keeps the producer lock-stepped with the consumer. Dropping the
/// writer closes the pipe cleanly (the reader sees end-of-stream);
/// [`PipeWriter::close_with_error`] makes every subsequent read fail with
/// the given error instead.
pub fn byte_pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        PipeWriter { tx },
        PipeReader {
            rx,
            current: Bytes::new(),
            failed: None,
        },
    )
}

/// Write end of a byte pipe.
pub struct PipeWriter {
    tx: mpsc::Sender<IoResult<Bytes>>,
}

impl PipeWriter {
    /// Send one payload chunk, waiting while the pipe is full.
    ///
    /// Fails with `BrokenPipe` when the reader has gone away.
    pub async fn write(&self, data: Bytes) -> IoResult<()> {
        self.tx
            .send(Ok(data))
            .await
            .map_err(|_| IoError::new(ErrorKind::BrokenPipe, "pipe reader gone"))
    }

    /// Blocking variant of [`write`] for producers running outside the
    /// async runtime (the capture loop). Must not be called from a task.
    pub fn blocking_write(&self, data: Bytes) -> IoResult<()> {
        self.tx
            .blocking_send(Ok(data))
            .map_err(|_| IoError::new(ErrorKind::BrokenPipe, "pipe reader gone"))
    }

    /// Close the pipe with an error; the reader drains buffered chunks and
    /// then observes `err` on every read.
    pub async fn close_with_error(self, err: IoError) {
        // Best effort: the reader may already be gone.
        let _ = self.tx.send(Err(err)).await;
    }
}

/// Read end of a byte pipe. Implements [`AsyncRead`]; a clean writer close
/// reads as end-of-stream.
pub struct PipeReader {
    rx: mpsc::Receiver<IoResult<Bytes>>,
    current: Bytes,
    failed: Option<IoError>,
}

impl AsyncRead for PipeReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<IoResult<()>> {
        let this = self.get_mut();
        loop {
            if !this.current.is_empty() {
                let n = this.current.len().min(buf.remaining());
                buf.put_slice(&this.current.split_to(n));
                return Poll::Ready(Ok(()));
            }
            if let Some(err) = &this.failed {
                return Poll::Ready(Err(IoError::new(err.kind(), err.to_string())));
            }
            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(Ok(data))) => this.current = data,
                Poll::Ready(Some(Err(err))) => {
                    // Sticky: reads keep failing after the writer aborted.
                    let out = IoError::new(err.kind(), err.to_string());
                    this.failed = Some(err);
                    return Poll::Ready(Err(out));
                }
                Poll::Ready(None) => return Poll::Ready(Ok(())),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
