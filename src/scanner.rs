use crate::buffer::ChunkBuffer;
use crate::error::Error;

pub(crate) enum Scan {
    /// A whole top-level item spans the next `usize` unread bytes.
    Complete(usize),
    NeedMore,
}

/// Incremental item-boundary scanner.
///
/// Walks item headers ahead of the buffer's read cursor with an explicit
/// stack of outstanding child counts, so streaming adapters can tell when a
/// complete top-level item has been buffered before handing it to the
/// decoder. Nothing is consumed and no payload is validated; structural
/// errors (tags, indefinite lengths, reserved header bits, excessive depth)
/// surface here with the same kinds the decoder uses.
pub(crate) struct ItemScanner {
    offset: usize,
    stack: Vec<u64>,
    max_depth: usize,
}

impl ItemScanner {
    pub(crate) fn new(max_depth: usize) -> Self {
        Self {
            offset: 0,
            stack: vec![1],
            max_depth,
        }
    }

    /// Resume scanning. On `Complete` the scanner resets itself for the next
    /// top-level item.
    pub(crate) fn step(&mut self, buf: &ChunkBuffer) -> Result<Scan, Error> {
        loop {
            if self.stack.is_empty() {
                let len = self.offset;
                self.offset = 0;
                self.stack.push(1);
                return Ok(Scan::Complete(len));
            }

            let Some(initial) = buf.peek(self.offset) else {
                return Ok(Scan::NeedMore);
            };
            let major = initial >> 5;
            let minor = initial & 0x1F;
            if major == 6 {
                return Err(Error::UnsupportedFeature("tagged item"));
            }

            let (arg, header_len) = match minor {
                0..=23 => (minor as u64, 1),
                24..=27 => {
                    let extra = 1usize << (minor - 24);
                    let Some(arg) = self.peek_be(buf, extra) else {
                        return Ok(Scan::NeedMore);
                    };
                    (arg, 1 + extra)
                }
                28..=30 => return Err(Error::InvalidEncoding("reserved additional info")),
                _ => {
                    return Err(match major {
                        2..=5 => Error::UnsupportedFeature("indefinite-length item"),
                        _ => Error::InvalidEncoding("unexpected break byte"),
                    })
                }
            };

            self.offset = self
                .offset
                .checked_add(header_len)
                .ok_or(Error::InvalidEncoding("length overflow"))?;

            // This header fills one pending slot
            if let Some(top) = self.stack.last_mut() {
                *top -= 1;
            }

            match major {
                2 | 3 => {
                    let len = usize::try_from(arg)
                        .map_err(|_| Error::InvalidEncoding("length overflow"))?;
                    self.offset = self
                        .offset
                        .checked_add(len)
                        .ok_or(Error::InvalidEncoding("length overflow"))?;
                }
                4 | 5 => {
                    let count = if major == 5 {
                        arg.checked_mul(2)
                            .ok_or(Error::InvalidEncoding("length overflow"))?
                    } else {
                        arg
                    };
                    if count > 0 {
                        if self.stack.len() >= self.max_depth {
                            return Err(Error::MaxRecursion);
                        }
                        self.stack.push(count);
                    }
                }
                _ => {}
            }

            // Completed frames pop only after any child count is pushed, so
            // the stack length tracks true nesting depth even for chains of
            // single-child containers
            while self.stack.last() == Some(&0) {
                self.stack.pop();
            }
        }
    }

    fn peek_be(&self, buf: &ChunkBuffer, n: usize) -> Option<u64> {
        let mut v = 0u64;
        for i in 0..n {
            v = (v << 8) | buf.peek(self.offset + 1 + i)? as u64;
        }
        Some(v)
    }
}
