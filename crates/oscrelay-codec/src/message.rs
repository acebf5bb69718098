use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;

use crate::arg::Arg;
use crate::codec::{padded_len, put_string, string_size, Reader};
use crate::error::{CodecError, Result};

/// An addressed message with typed arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// Address the message is routed to, always starting with `/`.
    pub address: String,
    /// Arguments in wire order.
    pub args: Vec<Arg>,
}

impl Message {
    /// Create a message.
    pub fn new(address: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// The type-tag string, including the leading `,`.
    pub fn type_tags(&self) -> String {
        std::iter::once(',')
            .chain(self.args.iter().map(Arg::type_tag))
            .collect()
    }

    /// Wire size of this message in bytes.
    pub fn encoded_size(&self) -> usize {
        string_size(&self.address)
            + padded_len(self.args.len() + 2)
            + self.args.iter().map(Arg::encoded_size).sum::<usize>()
    }

    pub(crate) fn write_to(&self, dst: &mut BytesMut) {
        put_string(dst, &self.address);
        put_string(dst, &self.type_tags());
        for arg in &self.args {
            arg.write_payload(dst);
        }
    }

    pub(crate) fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let address = reader.read_string()?;
        if !address.starts_with('/') {
            return Err(CodecError::InvalidAddress(address));
        }

        // Type tags are optional for legacy senders; a bare address has no args.
        if reader.is_empty() {
            return Ok(Self::new(address, Vec::new()));
        }

        let tags = reader.read_string()?;
        let tags = tags.strip_prefix(',').ok_or(CodecError::MissingTypeTags)?;
        let args = tags
            .chars()
            .map(|tag| Arg::read(tag, reader))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::new(address, args))
    }
}

/// Text form: `/address, arg, arg, ...` (see [`Arg`] for argument syntax).
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)?;
        for arg in &self.args {
            write!(f, ", {arg}")?;
        }
        Ok(())
    }
}

impl FromStr for Message {
    type Err = CodecError;

    fn from_str(input: &str) -> Result<Self> {
        let mut tokens = split_top_level(input)?.into_iter();
        let address = tokens.next().unwrap_or_default().trim().to_string();
        if !address.starts_with('/') || address.contains(char::is_whitespace) {
            return Err(CodecError::InvalidAddress(address));
        }
        let args = tokens
            .map(|token| token.parse())
            .collect::<Result<Vec<Arg>>>()?;
        Ok(Self::new(address, args))
    }
}

/// Split on commas that are not inside a quoted string.
fn split_top_level(input: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;

    for (idx, ch) in input.char_indices() {
        match ch {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                parts.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    if in_quotes {
        return Err(CodecError::Parse(format!(
            "unterminated string in {input:?}"
        )));
    }
    parts.push(&input[start..]);
    Ok(parts)
}
