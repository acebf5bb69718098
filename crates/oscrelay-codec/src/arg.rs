use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, BytesMut};

use crate::codec::{blob_size, put_blob, put_string, string_size, Reader};
use crate::error::{CodecError, Result};
use crate::timetag::TimeTag;

/// A single typed message argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Blob(Vec<u8>),
    Bool(bool),
    Nil,
    TimeTag(TimeTag),
}

impl Arg {
    /// The character this argument contributes to the type-tag string.
    pub fn type_tag(&self) -> char {
        match self {
            Arg::Int32(_) => 'i',
            Arg::Int64(_) => 'h',
            Arg::Float32(_) => 'f',
            Arg::Float64(_) => 'd',
            Arg::String(_) => 's',
            Arg::Blob(_) => 'b',
            Arg::Bool(true) => 'T',
            Arg::Bool(false) => 'F',
            Arg::Nil => 'N',
            Arg::TimeTag(_) => 't',
        }
    }

    /// Bytes this argument occupies after the type-tag string.
    pub fn encoded_size(&self) -> usize {
        match self {
            Arg::Int32(_) | Arg::Float32(_) => 4,
            Arg::Int64(_) | Arg::Float64(_) | Arg::TimeTag(_) => 8,
            Arg::String(s) => string_size(s),
            Arg::Blob(b) => blob_size(b),
            Arg::Bool(_) | Arg::Nil => 0,
        }
    }

    /// Integer value of an `Int32` or `Int64` argument.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Arg::Int32(v) => Some(i64::from(*v)),
            Arg::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn write_payload(&self, dst: &mut BytesMut) {
        match self {
            Arg::Int32(v) => dst.put_i32(*v),
            Arg::Int64(v) => dst.put_i64(*v),
            Arg::Float32(v) => dst.put_f32(*v),
            Arg::Float64(v) => dst.put_f64(*v),
            Arg::String(s) => put_string(dst, s),
            Arg::Blob(b) => put_blob(dst, b),
            Arg::TimeTag(t) => dst.put_u64(t.raw()),
            Arg::Bool(_) | Arg::Nil => {}
        }
    }

    pub(crate) fn read(tag: char, reader: &mut Reader<'_>) -> Result<Self> {
        Ok(match tag {
            'i' => Arg::Int32(reader.read_i32()?),
            'h' => Arg::Int64(reader.read_i64()?),
            'f' => Arg::Float32(reader.read_f32()?),
            'd' => Arg::Float64(reader.read_f64()?),
            's' => Arg::String(reader.read_string()?),
            'b' => Arg::Blob(reader.read_blob()?),
            'T' => Arg::Bool(true),
            'F' => Arg::Bool(false),
            'N' => Arg::Nil,
            't' => Arg::TimeTag(TimeTag::from_raw(reader.read_u64()?)),
            other => return Err(CodecError::UnsupportedTypeTag(other)),
        })
    }
}

/// Text form, one token per argument:
///
/// | form | type |
/// |---|---|
/// | `42` | int32 |
/// | `42L` | int64 |
/// | `2.5`, `2.5f` | float32 |
/// | `2.5d` | float64 |
/// | `"text"` | string (`\"` and `\\` escaped) |
/// | `{blob:0a0b}` | blob (hex) |
/// | `{time:123}` | time tag (raw NTP value) |
/// | `true`, `false`, `nil` | bool, nil |
impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Int32(v) => write!(f, "{v}"),
            Arg::Int64(v) => write!(f, "{v}L"),
            Arg::Float32(v) => write!(f, "{v}f"),
            Arg::Float64(v) => write!(f, "{v}d"),
            Arg::String(s) => {
                f.write_str("\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
            Arg::Blob(b) => {
                f.write_str("{blob:")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                f.write_str("}")
            }
            Arg::Bool(v) => write!(f, "{v}"),
            Arg::Nil => f.write_str("nil"),
            Arg::TimeTag(t) => write!(f, "{{time:{t}}}"),
        }
    }
}

impl FromStr for Arg {
    type Err = CodecError;

    fn from_str(input: &str) -> Result<Self> {
        let token = input.trim();
        let invalid = || CodecError::Parse(format!("invalid argument: {token:?}"));

        match token {
            "" => return Err(CodecError::Parse("empty argument".to_string())),
            "true" => return Ok(Arg::Bool(true)),
            "false" => return Ok(Arg::Bool(false)),
            "nil" => return Ok(Arg::Nil),
            _ => {}
        }

        if let Some(quoted) = token.strip_prefix('"') {
            let body = quoted.strip_suffix('"').ok_or_else(invalid)?;
            return unescape(body).map(Arg::String);
        }
        if let Some(hex) = token
            .strip_prefix("{blob:")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            return parse_hex(hex).map(Arg::Blob).ok_or_else(invalid);
        }
        if let Some(raw) = token
            .strip_prefix("{time:")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            let raw: u64 = raw.parse().map_err(|_| invalid())?;
            return Ok(Arg::TimeTag(TimeTag::from_raw(raw)));
        }
        if let Some(num) = token.strip_suffix('L') {
            return num.parse().map(Arg::Int64).map_err(|_| invalid());
        }
        if let Some(num) = token.strip_suffix('d') {
            return num.parse().map(Arg::Float64).map_err(|_| invalid());
        }
        if let Some(num) = token.strip_suffix('f') {
            return num.parse().map(Arg::Float32).map_err(|_| invalid());
        }
        if let Ok(v) = token.parse::<i32>() {
            return Ok(Arg::Int32(v));
        }
        token.parse().map(Arg::Float32).map_err(|_| invalid())
    }
}

fn unescape(body: &str) -> Result<String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some(escaped @ ('"' | '\\')) => out.push(escaped),
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                _ => return Err(CodecError::Parse(format!("invalid escape in {body:?}"))),
            },
            '"' => return Err(CodecError::Parse(format!("unescaped quote in {body:?}"))),
            other => out.push(other),
        }
    }
    Ok(out)
}

fn parse_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

impl From<i32> for Arg {
    fn from(v: i32) -> Self {
        Arg::Int32(v)
    }
}

impl From<i64> for Arg {
    fn from(v: i64) -> Self {
        Arg::Int64(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Self {
        Arg::Float32(v)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Self {
        Arg::Float64(v)
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Self {
        Arg::Bool(v)
    }
}

impl From<&str> for Arg {
    fn from(v: &str) -> Self {
        Arg::String(v.to_string())
    }
}

impl From<String> for Arg {
    fn from(v: String) -> Self {
        Arg::String(v)
    }
}

impl From<TimeTag> for Arg {
    fn from(v: TimeTag) -> Self {
        Arg::TimeTag(v)
    }
}
