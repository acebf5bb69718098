/// Errors that can occur while encoding, decoding or parsing packets.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The datagram ended in the middle of a field.
    #[error("unexpected end of packet")]
    UnexpectedEof,

    /// The address is empty or does not start with `/`.
    #[error("invalid address pattern: {0:?}")]
    InvalidAddress(String),

    /// The type-tag string does not start with `,`.
    #[error("type tag string must start with ','")]
    MissingTypeTags,

    /// The type-tag string names a type this codec does not support.
    #[error("unsupported type tag '{0}'")]
    UnsupportedTypeTag(char),

    /// A string field is not valid UTF-8.
    #[error("invalid string: {0}")]
    InvalidString(#[from] std::str::Utf8Error),

    /// A bundle element declares a size that does not fit the bundle.
    #[error("invalid bundle element size {size} ({remaining} bytes remaining)")]
    InvalidElementSize { size: i32, remaining: usize },

    /// Bundles are nested deeper than [`crate::MAX_BUNDLE_DEPTH`].
    #[error("bundles nested deeper than {max} levels")]
    NestingTooDeep { max: usize },

    /// The text form of a message or argument could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
