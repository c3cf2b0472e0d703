use crate::error::Error;
use bytes::Bytes;
use std::collections::VecDeque;

type FreeFn = Box<dyn FnMut(Bytes) + Send>;

/// Ordered rope of input chunks with a read cursor into the first.
///
/// Chunks are owned by the buffer until their bytes are fully consumed, at
/// which point the optional `on_free` callback receives them back, in receive
/// order, exactly once per chunk. The callback is the hand-off point for
/// buffer-pool reuse by the byte source. Dropping the buffer releases every
/// still-held chunk through the same path.
pub struct ChunkBuffer {
    chunks: VecDeque<Bytes>,
    cursor: usize,
    unread: usize,
    on_free: Option<FreeFn>,
}

impl Default for ChunkBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self {
            chunks: VecDeque::new(),
            cursor: 0,
            unread: 0,
            on_free: None,
        }
    }

    pub fn with_on_free(on_free: impl FnMut(Bytes) + Send + 'static) -> Self {
        Self {
            chunks: VecDeque::new(),
            cursor: 0,
            unread: 0,
            on_free: Some(Box::new(on_free)),
        }
    }

    /// Total unread bytes across all held chunks.
    pub fn len(&self) -> usize {
        self.unread
    }

    pub fn is_empty(&self) -> bool {
        self.unread == 0
    }

    pub fn push(&mut self, chunk: Bytes) {
        if chunk.is_empty() && self.chunks.is_empty() {
            self.free(chunk);
            return;
        }
        self.unread += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Verify `n` unread bytes are available.
    pub fn allocate(&mut self, n: usize) -> Result<(), Error> {
        if self.unread < n {
            Err(Error::PrematureEnd)
        } else {
            Ok(())
        }
    }

    /// Non-consuming read at `offset` bytes past the cursor.
    pub fn peek(&self, offset: usize) -> Option<u8> {
        let mut remaining = offset;
        let mut start = self.cursor;
        for chunk in &self.chunks {
            let avail = chunk.len() - start;
            if remaining < avail {
                return Some(chunk[start + remaining]);
            }
            remaining -= avail;
            start = 0;
        }
        None
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        self.allocate(1)?;
        let b = self.peek(0).ok_or(Error::PrematureEnd)?;
        self.advance(1, None);
        Ok(b)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        self.allocate(N)?;
        let mut out = [0u8; N];
        for (i, slot) in out.iter_mut().enumerate() {
            *slot = self.peek(i).ok_or(Error::PrematureEnd)?;
        }
        self.advance(N, None);
        Ok(out)
    }

    /// Consume exactly `n` bytes, copied out.
    pub fn take_vec(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        self.allocate(n)?;
        let mut out = Vec::with_capacity(n);
        self.advance(n, Some(&mut out));
        Ok(out)
    }

    /// Consume exactly `n` bytes without materialising them.
    pub fn skip(&mut self, n: usize) -> Result<(), Error> {
        self.allocate(n)?;
        self.advance(n, None);
        Ok(())
    }

    fn advance(&mut self, mut n: usize, mut target: Option<&mut Vec<u8>>) {
        self.unread -= n;
        while n > 0 {
            let Some(front) = self.chunks.front() else {
                break;
            };
            let take = (front.len() - self.cursor).min(n);
            if let Some(out) = target.as_mut() {
                out.extend_from_slice(&front[self.cursor..self.cursor + take]);
            }
            self.cursor += take;
            n -= take;
            if self.cursor == front.len() {
                if let Some(chunk) = self.chunks.pop_front() {
                    self.cursor = 0;
                    self.free(chunk);
                }
            }
        }
        // Empty chunks queued behind the consumed region release here
        while self.chunks.front().is_some_and(|c| c.len() == self.cursor) {
            if let Some(chunk) = self.chunks.pop_front() {
                self.cursor = 0;
                self.free(chunk);
            }
        }
    }

    /// Release every held chunk through the `on_free` path.
    pub fn clear(&mut self) {
        self.cursor = 0;
        self.unread = 0;
        while let Some(chunk) = self.chunks.pop_front() {
            self.free(chunk);
        }
    }

    fn free(&mut self, chunk: Bytes) {
        if let Some(f) = self.on_free.as_mut() {
            f(chunk);
        }
    }
}

impl Drop for ChunkBuffer {
    fn drop(&mut self) {
        self.clear();
    }
}
