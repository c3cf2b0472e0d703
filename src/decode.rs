use crate::buffer::ChunkBuffer;
use crate::encode::FloatWidth;
use crate::error::{Error, HookError};
use crate::value::{PathItem, Value, SAFE_INTEGER_BOUND};
use bytes::Bytes;

/// Category of the item a decode hook is being consulted about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Unsigned,
    Negative,
    Bytes,
    Text,
    Array,
    Map,
    Simple,
    Float,
}

/// Intercept a value before its payload is decoded.
///
/// Arguments are the decode thunk, the item kind and the item's argument
/// (integer value, payload byte length, container count, simple value or raw
/// float bits, per kind); the key path is available via
/// [`Thunk::key_path`]. Return `Some(replacement)` to substitute the item,
/// or `None` to fall through to normal decoding. If the thunk was never
/// invoked, the item's bytes are skipped so the cursor stays byte-exact.
pub type DecodeValueHook = Box<
    dyn Fn(&mut Thunk<'_, '_>, ItemKind, u64) -> Result<Option<Value>, HookError> + Send + Sync,
>;

/// Intercept a map key before its payload is decoded; the argument is the
/// key's UTF-8 byte length. Same skip semantics as [`DecodeValueHook`].
pub type DecodeKeyHook =
    Box<dyn Fn(&mut Thunk<'_, '_>, u64) -> Result<Option<String>, HookError> + Send + Sync>;

pub struct DecodeOptions {
    pub allow_undefined: bool,
    pub min_float_size: FloatWidth,
    pub max_depth: usize,
    pub on_key: Option<DecodeKeyHook>,
    pub on_value: Option<DecodeValueHook>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            allow_undefined: true,
            min_float_size: FloatWidth::F16,
            max_depth: 1024,
            on_key: None,
            on_value: None,
        }
    }
}

#[derive(Clone, Copy)]
struct Header {
    major: u8,
    minor: u8,
    arg: u64,
}

pub(crate) struct Traversal<'b> {
    buf: &'b mut ChunkBuffer,
    path: Vec<PathItem>,
}

/// Deferred decode of one item's payload, handed to transform hooks.
///
/// The first [`Thunk::decode`] call consumes the payload bytes and memoises
/// the result; repeat calls return the memoised value, so the thunk never
/// double-reads.
pub struct Thunk<'a, 'b> {
    t: &'a mut Traversal<'b>,
    opts: &'a DecodeOptions,
    header: Header,
    depth: usize,
    state: Option<Value>,
}

impl Thunk<'_, '_> {
    pub fn decode(&mut self) -> Result<Value, Error> {
        if let Some(v) = &self.state {
            return Ok(v.clone());
        }
        let v = decode_body(self.t, self.opts, self.header, self.depth)?;
        self.state = Some(v.clone());
        Ok(v)
    }

    /// Traversal path from the root to the pending item, innermost last.
    pub fn key_path(&self) -> &[PathItem] {
        &self.t.path
    }
}

fn read_header(buf: &mut ChunkBuffer) -> Result<Header, Error> {
    let initial = buf.read_u8()?;
    let major = initial >> 5;
    let minor = initial & 0x1F;
    if major == 6 {
        return Err(Error::UnsupportedFeature("tagged item"));
    }
    let arg = match minor {
        0..=23 => minor as u64,
        24 => buf.read_u8()? as u64,
        25 => u16::from_be_bytes(buf.read_array()?) as u64,
        26 => u32::from_be_bytes(buf.read_array()?) as u64,
        27 => u64::from_be_bytes(buf.read_array()?),
        28..=30 => return Err(Error::InvalidEncoding("reserved additional info")),
        _ => {
            return Err(match major {
                2..=5 => Error::UnsupportedFeature("indefinite-length item"),
                _ => Error::InvalidEncoding("unexpected break byte"),
            })
        }
    };
    Ok(Header { major, minor, arg })
}

fn item_kind(header: &Header) -> ItemKind {
    match header.major {
        0 => ItemKind::Unsigned,
        1 => ItemKind::Negative,
        2 => ItemKind::Bytes,
        3 => ItemKind::Text,
        4 => ItemKind::Array,
        5 => ItemKind::Map,
        _ => match header.minor {
            25 | 26 | 27 => ItemKind::Float,
            _ => ItemKind::Simple,
        },
    }
}

fn arg_len(arg: u64) -> Result<usize, Error> {
    usize::try_from(arg).map_err(|_| Error::InvalidEncoding("length overflow"))
}

fn decode_item(t: &mut Traversal, opts: &DecodeOptions, depth: usize) -> Result<Value, Error> {
    if depth == 0 {
        return Err(Error::MaxRecursion);
    }
    let header = read_header(t.buf)?;
    if opts.on_value.is_some() {
        let kind = item_kind(&header);
        let (outcome, decoded) = {
            let mut thunk = Thunk {
                t: &mut *t,
                opts,
                header,
                depth,
                state: None,
            };
            let outcome = match opts.on_value.as_ref() {
                Some(hook) => hook(&mut thunk, kind, header.arg).map_err(Error::Hook)?,
                None => None,
            };
            (outcome, thunk.state.take())
        };
        return match outcome {
            Some(replacement) => {
                if decoded.is_none() {
                    skip_body(t, header, depth)?;
                }
                Ok(replacement)
            }
            None => match decoded {
                Some(v) => Ok(v),
                None => decode_body(t, opts, header, depth),
            },
        };
    }
    decode_body(t, opts, header, depth)
}

fn decode_key(t: &mut Traversal, opts: &DecodeOptions, depth: usize) -> Result<String, Error> {
    if depth == 0 {
        return Err(Error::MaxRecursion);
    }
    let header = read_header(t.buf)?;
    if header.major != 3 {
        return Err(Error::InvalidEncoding("non-string map key"));
    }
    if opts.on_key.is_some() {
        let (outcome, decoded) = {
            let mut thunk = Thunk {
                t: &mut *t,
                opts,
                header,
                depth,
                state: None,
            };
            let outcome = match opts.on_key.as_ref() {
                Some(hook) => hook(&mut thunk, header.arg).map_err(Error::Hook)?,
                None => None,
            };
            (outcome, thunk.state.take())
        };
        return match outcome {
            Some(replacement) => {
                if decoded.is_none() {
                    skip_body(t, header, depth)?;
                }
                Ok(replacement)
            }
            None => match decoded {
                Some(Value::Text(s)) => Ok(s),
                Some(_) => Err(Error::InvalidEncoding("non-string map key")),
                None => decode_text(t, header.arg),
            },
        };
    }
    decode_text(t, header.arg)
}

fn decode_text(t: &mut Traversal, arg: u64) -> Result<String, Error> {
    let bytes = t.buf.take_vec(arg_len(arg)?)?;
    String::from_utf8(bytes).map_err(|_| Error::InvalidEncoding("invalid utf-8 in text string"))
}

fn decode_body(
    t: &mut Traversal,
    opts: &DecodeOptions,
    header: Header,
    depth: usize,
) -> Result<Value, Error> {
    match header.major {
        0 => {
            if header.arg > SAFE_INTEGER_BOUND {
                Err(Error::UnsafeInteger(header.arg as i128))
            } else {
                Ok(Value::Unsigned(header.arg))
            }
        }
        1 => {
            if header.arg >= SAFE_INTEGER_BOUND {
                Err(Error::UnsafeInteger(-1i128 - header.arg as i128))
            } else {
                Ok(Value::Negative(-1i64 - header.arg as i64))
            }
        }
        2 => Ok(Value::Bytes(t.buf.take_vec(arg_len(header.arg)?)?)),
        3 => Ok(Value::Text(decode_text(t, header.arg)?)),
        4 => {
            let count = arg_len(header.arg)?;
            let mut items = Vec::with_capacity(count.min(4096));
            for i in 0..count {
                t.path.push(PathItem::Index(i as u64));
                let r = decode_item(t, opts, depth - 1);
                t.path.pop();
                items.push(r?);
            }
            Ok(Value::Array(items))
        }
        5 => {
            let count = arg_len(header.arg)?;
            let mut entries: Vec<(String, Value)> = Vec::with_capacity(count.min(4096));
            for _ in 0..count {
                let key = decode_key(t, opts, depth - 1)?;
                if entries.iter().any(|(k, _)| *k == key) {
                    return Err(Error::InvalidEncoding("duplicate map key"));
                }
                t.path.push(PathItem::Key(key.clone()));
                let r = decode_item(t, opts, depth - 1);
                t.path.pop();
                entries.push((key, r?));
            }
            Ok(Value::Map(entries))
        }
        7 => match header.minor {
            20 => Ok(Value::Bool(false)),
            21 => Ok(Value::Bool(true)),
            22 => Ok(Value::Null),
            23 => {
                if opts.allow_undefined {
                    Ok(Value::Undefined)
                } else {
                    Err(Error::UndefinedDisallowed)
                }
            }
            0..=19 | 24 => Err(Error::UnsupportedFeature("unassigned simple value")),
            25 => {
                if opts.min_float_size > FloatWidth::F16 {
                    return Err(Error::InvalidEncoding("float narrower than minimum width"));
                }
                Ok(Value::Float(half::f16::from_bits(header.arg as u16).to_f64()))
            }
            26 => {
                if opts.min_float_size > FloatWidth::F32 {
                    return Err(Error::InvalidEncoding("float narrower than minimum width"));
                }
                Ok(Value::Float(f32::from_bits(header.arg as u32) as f64))
            }
            27 => Ok(Value::Float(f64::from_bits(header.arg))),
            _ => Err(Error::InvalidEncoding("invalid additional info")),
        },
        _ => Err(Error::UnsupportedFeature("tagged item")),
    }
}

/// Advance past one item's payload without materialising it. The header has
/// already been consumed.
fn skip_body(t: &mut Traversal, header: Header, depth: usize) -> Result<(), Error> {
    match header.major {
        2 | 3 => t.buf.skip(arg_len(header.arg)?),
        4 => {
            for _ in 0..header.arg {
                skip_item(t, depth - 1)?;
            }
            Ok(())
        }
        5 => {
            for _ in 0..header.arg {
                skip_item(t, depth - 1)?;
                skip_item(t, depth - 1)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn skip_item(t: &mut Traversal, depth: usize) -> Result<(), Error> {
    if depth == 0 {
        return Err(Error::MaxRecursion);
    }
    let header = read_header(t.buf)?;
    skip_body(t, header, depth)
}

/// Decode one item from the front of `buf`.
pub(crate) fn decode_one(buf: &mut ChunkBuffer, opts: &DecodeOptions) -> Result<Value, Error> {
    let mut t = Traversal {
        buf,
        path: Vec::new(),
    };
    decode_item(&mut t, opts, opts.max_depth)
}

/// Decode exactly one value from a contiguous buffer; trailing bytes are an
/// error.
pub fn decode(data: &[u8], opts: &DecodeOptions) -> Result<Value, Error> {
    let mut buf = ChunkBuffer::new();
    buf.push(Bytes::copy_from_slice(data));
    let value = decode_one(&mut buf, opts)?;
    if !buf.is_empty() {
        return Err(Error::InvalidEncoding("trailing bytes after value"));
    }
    Ok(value)
}
