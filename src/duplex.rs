use crate::buffer::ChunkBuffer;
use crate::decode::{decode_one, DecodeOptions};
use crate::encode::{encode_chunks, Chunk, ChunkWriter, EncodeOptions};
use crate::error::Error;
use crate::scanner::{ItemScanner, Scan};
use crate::value::Value;
use bytes::Bytes;
use futures_core::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::trace;

enum Push {
    Chunk(Bytes, oneshot::Sender<()>),
    Close,
    Abort(Error),
}

/// Push half of a decode bridge; see [`decode_duplex`].
pub struct DecodeSender {
    tx: mpsc::Sender<Push>,
    pending: VecDeque<oneshot::Receiver<()>>,
}

/// Pull half of a decode bridge: a stream of decoded values. All decoding
/// happens on this side's polls.
pub struct DecodeReceiver {
    rx: mpsc::Receiver<Push>,
    buf: ChunkBuffer,
    scanner: ItemScanner,
    opts: DecodeOptions,
    input_closed: bool,
    done: bool,
}

/// Duplex decode endpoint over a one-slot bridge.
///
/// Chunks pushed into the [`DecodeSender`] flow through a bounded channel
/// (high-water mark 1); each carries a completion handle the receiver
/// resolves once it has consumed the chunk, absorbing its bytes into the
/// decode buffer and releasing the pushed storage. [`DecodeSender::push`]
/// completes only after the previous chunk's completion resolves, so at
/// most one unconsumed chunk is ever in flight; [`DecodeSender::close`]
/// awaits drain of everything still pending.
pub fn decode_duplex(opts: DecodeOptions) -> (DecodeSender, DecodeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let scanner = ItemScanner::new(opts.max_depth);
    (
        DecodeSender {
            tx,
            pending: VecDeque::new(),
        },
        DecodeReceiver {
            rx,
            buf: ChunkBuffer::new(),
            scanner,
            opts,
            input_closed: false,
            done: false,
        },
    )
}

impl DecodeSender {
    /// Push one chunk into the bridge; completes only once the previous
    /// chunk has been consumed by the receiver.
    pub async fn push(&mut self, chunk: Bytes) -> Result<(), Error> {
        // At most one unconsumed chunk stays in flight
        if let Some(front) = self.pending.pop_front() {
            let _ = front.await;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Push::Chunk(chunk, ack_tx))
            .await
            .map_err(|_| Error::StreamClosed)?;
        self.pending.push_back(ack_rx);
        Ok(())
    }

    /// Signal end of input, then await release of every in-flight chunk.
    pub async fn close(mut self) -> Result<(), Error> {
        self.tx
            .send(Push::Close)
            .await
            .map_err(|_| Error::StreamClosed)?;
        for ack in self.pending.drain(..) {
            let _ = ack.await;
        }
        Ok(())
    }

    /// Propagate an error to the reader and tear the bridge down.
    pub async fn abort(self, error: Error) -> Result<(), Error> {
        trace!("decode bridge aborted: {error}");
        self.tx
            .send(Push::Abort(error))
            .await
            .map_err(|_| Error::StreamClosed)
    }
}

impl DecodeReceiver {
    fn finish(&mut self) {
        self.done = true;
        self.buf.clear();
    }
}

impl Stream for DecodeReceiver {
    type Item = Result<Value, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match this.scanner.step(&this.buf) {
                Err(e) => {
                    this.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                Ok(Scan::Complete(_)) => {
                    let r = decode_one(&mut this.buf, &this.opts);
                    if r.is_err() {
                        this.finish();
                    }
                    return Poll::Ready(Some(r));
                }
                Ok(Scan::NeedMore) => {
                    if this.input_closed {
                        let empty = this.buf.is_empty();
                        this.finish();
                        if empty {
                            return Poll::Ready(None);
                        }
                        trace!("push input closed mid-item");
                        return Poll::Ready(Some(Err(Error::PrematureEnd)));
                    }
                    match this.rx.poll_recv(cx) {
                        Poll::Ready(Some(Push::Chunk(chunk, ack))) => {
                            // Consume on arrival: the bytes move into the
                            // decode buffer and the pushed storage is
                            // released before the completion resolves
                            this.buf.push(Bytes::copy_from_slice(&chunk));
                            drop(chunk);
                            let _ = ack.send(());
                        }
                        Poll::Ready(Some(Push::Close)) | Poll::Ready(None) => {
                            this.input_closed = true;
                        }
                        Poll::Ready(Some(Push::Abort(e))) => {
                            this.finish();
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Pending => return Poll::Pending,
                    }
                }
            }
        }
    }
}

/// Push half of an encode bridge; see [`encode_duplex`].
pub struct EncodeSender {
    tx: mpsc::Sender<Result<Bytes, Error>>,
    writer: ChunkWriter,
    opts: EncodeOptions,
}

/// Pull half of an encode bridge: a stream of encoded chunks.
pub struct EncodeReceiver {
    rx: mpsc::Receiver<Result<Bytes, Error>>,
}

/// Duplex encode endpoint over a one-slot bridge.
///
/// [`EncodeSender::send`] encodes one value and forwards its chunks through
/// a bounded channel (high-water mark 1), so the producer is paced to the
/// reader's pulls and at most one value is ever in flight.
/// [`EncodeSender::close`] flushes the partial tail chunk and ends the
/// reader.
pub fn encode_duplex(opts: EncodeOptions) -> (EncodeSender, EncodeReceiver) {
    let (tx, rx) = mpsc::channel(1);
    let writer = ChunkWriter::new(&opts);
    (EncodeSender { tx, writer, opts }, EncodeReceiver { rx })
}

impl EncodeSender {
    pub async fn send(&mut self, value: &Value) -> Result<(), Error> {
        let mut staged: Vec<Bytes> = Vec::new();
        {
            let mut sink = |chunk: Chunk<'_>| {
                staged.push(chunk.into_bytes());
                Ok(())
            };
            encode_chunks(value, &self.opts, &mut self.writer, &mut sink)?;
        }
        for chunk in staged {
            self.tx
                .send(Ok(chunk))
                .await
                .map_err(|_| Error::StreamClosed)?;
        }
        Ok(())
    }

    /// Flush the partial tail chunk and end the output sequence.
    pub async fn close(mut self) -> Result<(), Error> {
        let mut tail = None;
        self.writer.flush(&mut |chunk: Chunk<'_>| {
            tail = Some(chunk.into_bytes());
            Ok(())
        })?;
        if let Some(chunk) = tail {
            self.tx
                .send(Ok(chunk))
                .await
                .map_err(|_| Error::StreamClosed)?;
        }
        Ok(())
    }

    /// Propagate an error to the reader and tear the bridge down.
    pub async fn abort(self, error: Error) -> Result<(), Error> {
        trace!("encode bridge aborted: {error}");
        self.tx
            .send(Err(error))
            .await
            .map_err(|_| Error::StreamClosed)
    }
}

impl Stream for EncodeReceiver {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
