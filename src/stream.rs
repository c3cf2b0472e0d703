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
use tracing::trace;

/// Pull-style decoder over a synchronous chunk source.
///
/// Chunks are drawn from the source only as items need them; each complete
/// item is decoded and yielded in input order. A source that ends mid-item
/// yields [`Error::PrematureEnd`]. The iterator is fused after any error.
pub struct DecodeIter<I> {
    source: I,
    buf: ChunkBuffer,
    scanner: ItemScanner,
    opts: DecodeOptions,
    done: bool,
}

impl<I: Iterator<Item = Bytes>> DecodeIter<I> {
    pub fn new(source: impl IntoIterator<Item = Bytes, IntoIter = I>, opts: DecodeOptions) -> Self {
        Self::with_buffer(source, opts, ChunkBuffer::new())
    }

    /// Like [`DecodeIter::new`], with `on_free` receiving each chunk back
    /// once fully consumed, enabling buffer-pool reuse by the source.
    pub fn with_on_free(
        source: impl IntoIterator<Item = Bytes, IntoIter = I>,
        opts: DecodeOptions,
        on_free: impl FnMut(Bytes) + Send + 'static,
    ) -> Self {
        Self::with_buffer(source, opts, ChunkBuffer::with_on_free(on_free))
    }

    fn with_buffer(
        source: impl IntoIterator<Item = Bytes, IntoIter = I>,
        opts: DecodeOptions,
        buf: ChunkBuffer,
    ) -> Self {
        Self {
            source: source.into_iter(),
            buf,
            scanner: ItemScanner::new(opts.max_depth),
            opts,
            done: false,
        }
    }
}

impl<I: Iterator<Item = Bytes>> Iterator for DecodeIter<I> {
    type Item = Result<Value, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.scanner.step(&self.buf) {
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Ok(Scan::Complete(_)) => {
                    let r = decode_one(&mut self.buf, &self.opts);
                    if r.is_err() {
                        self.done = true;
                    }
                    return Some(r);
                }
                Ok(Scan::NeedMore) => match self.source.next() {
                    Some(chunk) => self.buf.push(chunk),
                    None => {
                        self.done = true;
                        if self.buf.is_empty() {
                            return None;
                        }
                        trace!("byte source ended mid-item");
                        return Some(Err(Error::PrematureEnd));
                    }
                },
            }
        }
    }
}

/// Pull-style decoder over an awaitable chunk source; the asynchronous
/// counterpart of [`DecodeIter`]. The only suspension point is awaiting the
/// next input chunk.
pub struct DecodeStream<S> {
    source: S,
    buf: ChunkBuffer,
    scanner: ItemScanner,
    opts: DecodeOptions,
    done: bool,
}

impl<S: Stream<Item = Bytes> + Unpin> DecodeStream<S> {
    pub fn new(source: S, opts: DecodeOptions) -> Self {
        Self::with_buffer(source, opts, ChunkBuffer::new())
    }

    pub fn with_on_free(
        source: S,
        opts: DecodeOptions,
        on_free: impl FnMut(Bytes) + Send + 'static,
    ) -> Self {
        Self::with_buffer(source, opts, ChunkBuffer::with_on_free(on_free))
    }

    fn with_buffer(source: S, opts: DecodeOptions, buf: ChunkBuffer) -> Self {
        Self {
            source,
            buf,
            scanner: ItemScanner::new(opts.max_depth),
            opts,
            done: false,
        }
    }
}

impl<S: Stream<Item = Bytes> + Unpin> Stream for DecodeStream<S> {
    type Item = Result<Value, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        loop {
            match this.scanner.step(&this.buf) {
                Err(e) => {
                    this.done = true;
                    return Poll::Ready(Some(Err(e)));
                }
                Ok(Scan::Complete(_)) => {
                    let r = decode_one(&mut this.buf, &this.opts);
                    if r.is_err() {
                        this.done = true;
                    }
                    return Poll::Ready(Some(r));
                }
                Ok(Scan::NeedMore) => match Pin::new(&mut this.source).poll_next(cx) {
                    Poll::Ready(Some(chunk)) => this.buf.push(chunk),
                    Poll::Ready(None) => {
                        this.done = true;
                        if this.buf.is_empty() {
                            return Poll::Ready(None);
                        }
                        trace!("byte source ended mid-item");
                        return Poll::Ready(Some(Err(Error::PrematureEnd)));
                    }
                    Poll::Pending => return Poll::Pending,
                },
            }
        }
    }
}

/// Pull-style encoder over a synchronous value source, yielding owned
/// chunks. Encodings of successive values pack into shared chunks; the
/// partial tail flushes after the last value.
pub struct EncodeIter<I> {
    source: I,
    opts: EncodeOptions,
    writer: ChunkWriter,
    queue: VecDeque<Bytes>,
    failed: Option<Error>,
    done: bool,
}

impl<I: Iterator<Item = Value>> EncodeIter<I> {
    pub fn new(source: impl IntoIterator<Item = Value, IntoIter = I>, opts: EncodeOptions) -> Self {
        let writer = ChunkWriter::new(&opts);
        Self {
            source: source.into_iter(),
            opts,
            writer,
            queue: VecDeque::new(),
            failed: None,
            done: false,
        }
    }
}

impl<I: Iterator<Item = Value>> Iterator for EncodeIter<I> {
    type Item = Result<Bytes, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // Chunks emitted before a failure drain ahead of the error
            if let Some(chunk) = self.queue.pop_front() {
                return Some(Ok(chunk));
            }
            if let Some(e) = self.failed.take() {
                self.done = true;
                return Some(Err(e));
            }
            if self.done {
                return None;
            }
            let queue = &mut self.queue;
            let mut sink = |chunk: Chunk<'_>| {
                queue.push_back(chunk.into_bytes());
                Ok(())
            };
            match self.source.next() {
                Some(value) => {
                    if let Err(e) = encode_chunks(&value, &self.opts, &mut self.writer, &mut sink) {
                        self.failed = Some(e);
                    }
                }
                None => {
                    self.done = true;
                    if let Err(e) = self.writer.flush(&mut sink) {
                        self.failed = Some(e);
                    }
                }
            }
        }
    }
}

/// Pull-style encoder over an awaitable value source; the asynchronous
/// counterpart of [`EncodeIter`].
pub struct EncodeStream<S> {
    source: S,
    opts: EncodeOptions,
    writer: ChunkWriter,
    queue: VecDeque<Bytes>,
    failed: Option<Error>,
    done: bool,
}

impl<S: Stream<Item = Value> + Unpin> EncodeStream<S> {
    pub fn new(source: S, opts: EncodeOptions) -> Self {
        let writer = ChunkWriter::new(&opts);
        Self {
            source,
            opts,
            writer,
            queue: VecDeque::new(),
            failed: None,
            done: false,
        }
    }
}

impl<S: Stream<Item = Value> + Unpin> Stream for EncodeStream<S> {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            // Chunks emitted before a failure drain ahead of the error
            if let Some(chunk) = this.queue.pop_front() {
                return Poll::Ready(Some(Ok(chunk)));
            }
            if let Some(e) = this.failed.take() {
                this.done = true;
                return Poll::Ready(Some(Err(e)));
            }
            if this.done {
                return Poll::Ready(None);
            }
            match Pin::new(&mut this.source).poll_next(cx) {
                Poll::Ready(Some(value)) => {
                    let queue = &mut this.queue;
                    let mut sink = |chunk: Chunk<'_>| {
                        queue.push_back(chunk.into_bytes());
                        Ok(())
                    };
                    if let Err(e) = encode_chunks(&value, &this.opts, &mut this.writer, &mut sink) {
                        this.failed = Some(e);
                    }
                }
                Poll::Ready(None) => {
                    this.done = true;
                    let queue = &mut this.queue;
                    let mut sink = |chunk: Chunk<'_>| {
                        queue.push_back(chunk.into_bytes());
                        Ok(())
                    };
                    if let Err(e) = this.writer.flush(&mut sink) {
                        this.failed = Some(e);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
