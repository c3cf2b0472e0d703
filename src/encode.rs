use crate::error::{Error, HookError};
use crate::value::{PathItem, Value, SAFE_INTEGER_BOUND};
use bytes::{Bytes, BytesMut};

/// Narrowest floating-point wire width the codec may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum FloatWidth {
    #[default]
    F16,
    F32,
    F64,
}

/// Validate or transform a value before it is encoded. Fires pre-order for
/// the root and for every array element and map value; a returned replacement
/// is encoded in place of the original (its children are traversed, but the
/// hook is not re-applied to the replacement root).
pub type EncodeValueHook =
    Box<dyn Fn(&Value, &[PathItem]) -> Result<Option<Value>, HookError> + Send + Sync>;

/// Validate or remap a map key before it is encoded.
pub type EncodeKeyHook = Box<dyn Fn(&str) -> Result<Option<String>, HookError> + Send + Sync>;

pub struct EncodeOptions {
    pub allow_undefined: bool,
    pub chunk_recycling: bool,
    pub chunk_size: usize,
    pub min_float_size: FloatWidth,
    pub max_depth: usize,
    pub on_key: Option<EncodeKeyHook>,
    pub on_value: Option<EncodeValueHook>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            allow_undefined: true,
            chunk_recycling: false,
            chunk_size: 4096,
            min_float_size: FloatWidth::F16,
            max_depth: 1024,
            on_key: None,
            on_value: None,
        }
    }
}

enum ChunkRepr<'a> {
    View(&'a [u8]),
    Owned(Bytes),
}

/// A chunk handed to an emit sink.
///
/// Owned unless chunk recycling is enabled, in which case it borrows the
/// writer's staging buffer and is only valid until the sink returns; use
/// [`Chunk::into_bytes`] to retain it either way.
pub struct Chunk<'a>(ChunkRepr<'a>);

impl Chunk<'_> {
    pub fn into_bytes(self) -> Bytes {
        match self.0 {
            ChunkRepr::View(v) => Bytes::copy_from_slice(v),
            ChunkRepr::Owned(b) => b,
        }
    }
}

impl std::ops::Deref for Chunk<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.0 {
            ChunkRepr::View(v) => v,
            ChunkRepr::Owned(b) => b,
        }
    }
}

/// Fixed-capacity staging buffer that emits a chunk whenever it fills.
///
/// With `chunk_recycling` the backing storage is reused across emits and
/// sinks see borrowed views; otherwise each emitted chunk is independently
/// owned. A partial tail chunk stays staged until [`ChunkWriter::flush`].
pub struct ChunkWriter {
    staging: BytesMut,
    chunk_size: usize,
    recycle: bool,
}

impl ChunkWriter {
    pub fn new(opts: &EncodeOptions) -> Self {
        let chunk_size = opts.chunk_size.max(1);
        Self {
            staging: BytesMut::with_capacity(chunk_size),
            chunk_size,
            recycle: opts.chunk_recycling,
        }
    }

    fn emit<F>(&mut self, sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(Chunk<'_>) -> Result<(), Error>,
    {
        if self.staging.is_empty() {
            return Ok(());
        }
        if self.recycle {
            let r = sink(Chunk(ChunkRepr::View(&self.staging)));
            self.staging.clear();
            r
        } else {
            let chunk = self.staging.split().freeze();
            sink(Chunk(ChunkRepr::Owned(chunk)))?;
            self.staging.reserve(self.chunk_size);
            Ok(())
        }
    }

    pub(crate) fn push<F>(&mut self, mut data: &[u8], sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(Chunk<'_>) -> Result<(), Error>,
    {
        while !data.is_empty() {
            let room = self.chunk_size - self.staging.len();
            let take = room.min(data.len());
            self.staging.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.staging.len() == self.chunk_size {
                self.emit(sink)?;
            }
        }
        Ok(())
    }

    /// Emit any partial tail chunk.
    pub fn flush<F>(&mut self, sink: &mut F) -> Result<(), Error>
    where
        F: FnMut(Chunk<'_>) -> Result<(), Error>,
    {
        self.emit(sink)
    }
}

struct Encoder<'a, F> {
    w: &'a mut ChunkWriter,
    sink: &'a mut F,
    opts: &'a EncodeOptions,
    path: Vec<PathItem>,
}

impl<F> Encoder<'_, F>
where
    F: FnMut(Chunk<'_>) -> Result<(), Error>,
{
    fn push(&mut self, data: &[u8]) -> Result<(), Error> {
        self.w.push(data, self.sink)
    }

    fn emit_uint_minor(&mut self, major: u8, val: u64) -> Result<(), Error> {
        if val < 24 {
            self.push(&[(major << 5) | (val as u8)])
        } else if val <= u8::MAX as u64 {
            self.push(&[(major << 5) | 24, val as u8])
        } else if val <= u16::MAX as u64 {
            self.push(&[(major << 5) | 25])?;
            self.push(&(val as u16).to_be_bytes())
        } else if val <= u32::MAX as u64 {
            self.push(&[(major << 5) | 26])?;
            self.push(&(val as u32).to_be_bytes())
        } else {
            self.push(&[(major << 5) | 27])?;
            self.push(&val.to_be_bytes())
        }
    }

    fn emit_value(&mut self, value: &Value, depth: usize) -> Result<(), Error> {
        let replacement = match self.opts.on_value.as_ref() {
            Some(hook) => hook(value, &self.path).map_err(Error::Hook)?,
            None => None,
        };
        match replacement {
            Some(replacement) => self.emit_item(&replacement, depth),
            None => self.emit_item(value, depth),
        }
    }

    fn emit_item(&mut self, value: &Value, depth: usize) -> Result<(), Error> {
        if depth == 0 {
            return Err(Error::MaxRecursion);
        }
        match value {
            Value::Unsigned(u) => {
                if *u > SAFE_INTEGER_BOUND {
                    return Err(Error::UnsafeInteger(*u as i128));
                }
                self.emit_uint_minor(0, *u)
            }
            Value::Negative(n) => {
                if *n >= 0 {
                    return Err(Error::InvalidEncoding(
                        "negative integer holding a non-negative value",
                    ));
                }
                // -1 - n without overflow at i64::MIN
                let u = !*n as u64;
                if u >= SAFE_INTEGER_BOUND {
                    return Err(Error::UnsafeInteger(*n as i128));
                }
                self.emit_uint_minor(1, u)
            }
            Value::Bytes(b) => {
                self.emit_uint_minor(2, b.len() as u64)?;
                self.push(b)
            }
            Value::Text(s) => {
                // The UTF-8 byte length is exact up front; payload bytes go
                // straight into the staging buffer, splitting across chunks
                self.emit_uint_minor(3, s.len() as u64)?;
                self.push(s.as_bytes())
            }
            Value::Array(items) => {
                self.emit_uint_minor(4, items.len() as u64)?;
                for (i, item) in items.iter().enumerate() {
                    self.path.push(PathItem::Index(i as u64));
                    let r = self.emit_value(item, depth - 1);
                    self.path.pop();
                    r?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                self.emit_uint_minor(5, entries.len() as u64)?;
                for (key, item) in entries {
                    let key = match self.opts.on_key.as_ref() {
                        Some(hook) => hook(key)
                            .map_err(Error::Hook)?
                            .unwrap_or_else(|| key.clone()),
                        None => key.clone(),
                    };
                    self.emit_uint_minor(3, key.len() as u64)?;
                    self.push(key.as_bytes())?;
                    self.path.push(PathItem::Key(key));
                    let r = self.emit_value(item, depth - 1);
                    self.path.pop();
                    r?;
                }
                Ok(())
            }
            Value::Bool(b) => self.push(&[(7 << 5) | if *b { 21 } else { 20 }]),
            Value::Null => self.push(&[(7 << 5) | 22]),
            Value::Undefined => {
                if !self.opts.allow_undefined {
                    return Err(Error::UndefinedDisallowed);
                }
                self.push(&[(7 << 5) | 23])
            }
            Value::Float(f) => self.emit_float(*f),
        }
    }

    fn emit_float(&mut self, value: f64) -> Result<(), Error> {
        if value.is_nan() {
            // Canonical NaN at the narrowest permitted width
            return match self.opts.min_float_size {
                FloatWidth::F16 => self.push(&[(7 << 5) | 25, 0x7E, 0x00]),
                FloatWidth::F32 => {
                    self.push(&[(7 << 5) | 26])?;
                    self.push(&0x7FC0_0000u32.to_be_bytes())
                }
                FloatWidth::F64 => {
                    self.push(&[(7 << 5) | 27])?;
                    self.push(&0x7FF8_0000_0000_0000u64.to_be_bytes())
                }
            };
        }
        if self.opts.min_float_size <= FloatWidth::F16 {
            if let Some(f) = lossless_float_coerce::<half::f16>(value) {
                self.push(&[(7 << 5) | 25])?;
                return self.push(&f.to_be_bytes());
            }
        }
        if self.opts.min_float_size <= FloatWidth::F32 {
            if let Some(f) = lossless_float_coerce::<f32>(value) {
                self.push(&[(7 << 5) | 26])?;
                return self.push(&f.to_be_bytes());
            }
        }
        self.push(&[(7 << 5) | 27])?;
        self.push(&value.to_be_bytes())
    }
}

fn lossless_float_coerce<T>(value: f64) -> Option<T>
where
    T: num_traits::FromPrimitive + Into<f64> + Copy,
{
    match <T as num_traits::FromPrimitive>::from_f64(value) {
        Some(f) if <T as Into<f64>>::into(f) == value => Some(f),
        _ => None,
    }
}

/// Encode one value through `writer`, emitting completed chunks to `sink`.
///
/// The writer's partial tail chunk is left staged so encodings of successive
/// values pack tightly; call [`ChunkWriter::flush`] after the last value.
pub fn encode_chunks<F>(
    value: &Value,
    opts: &EncodeOptions,
    writer: &mut ChunkWriter,
    sink: &mut F,
) -> Result<(), Error>
where
    F: FnMut(Chunk<'_>) -> Result<(), Error>,
{
    Encoder {
        w: writer,
        sink,
        opts,
        path: Vec::new(),
    }
    .emit_value(value, opts.max_depth)
}

/// Encode a single value into one contiguous byte vector.
pub fn encode(value: &Value, opts: &EncodeOptions) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    let mut writer = ChunkWriter::new(opts);
    let mut sink = |chunk: Chunk<'_>| {
        out.extend_from_slice(&chunk);
        Ok(())
    };
    encode_chunks(value, opts, &mut writer, &mut sink)?;
    writer.flush(&mut sink)?;
    Ok(out)
}
