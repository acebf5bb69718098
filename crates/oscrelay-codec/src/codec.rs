use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, Result};

/// Marker that opens every bundle: `#bundle` followed by a NUL.
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Bundle header: marker (8) + time tag (8) = 16 bytes.
pub const BUNDLE_HEADER_SIZE: usize = 16;

/// Every element inside a bundle is preceded by a 4-byte big-endian size.
pub const ELEMENT_SIZE_PREFIX: usize = 4;

/// Deepest bundle nesting a decoded datagram may contain. The outermost
/// bundle is depth 1.
pub const MAX_BUNDLE_DEPTH: usize = 32;

/// Round a length up to the next multiple of four.
pub(crate) fn padded_len(len: usize) -> usize {
    (len + 3) & !3
}

/// Wire size of an OSC string: content, at least one NUL, padded to 4.
pub(crate) fn string_size(s: &str) -> usize {
    padded_len(s.len() + 1)
}

/// Wire size of a blob: 4-byte length plus padded content.
pub(crate) fn blob_size(blob: &[u8]) -> usize {
    4 + padded_len(blob.len())
}

pub(crate) fn put_string(dst: &mut BytesMut, s: &str) {
    dst.put_slice(s.as_bytes());
    dst.put_bytes(0, string_size(s) - s.len());
}

pub(crate) fn put_blob(dst: &mut BytesMut, blob: &[u8]) {
    dst.put_u32(blob.len() as u32);
    dst.put_slice(blob);
    dst.put_bytes(0, padded_len(blob.len()) - blob.len());
}

/// Cursor over a datagram being decoded.
///
/// All reads are bounds-checked; running off the end yields
/// [`CodecError::UnexpectedEof`] rather than a panic.
pub(crate) struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_be_bytes(self.take_array()?))
    }

    pub(crate) fn read_string(&mut self) -> Result<String> {
        let rest = &self.buf[self.pos..];
        let nul = rest
            .iter()
            .position(|b| *b == 0)
            .ok_or(CodecError::UnexpectedEof)?;
        let text = std::str::from_utf8(&rest[..nul])?.to_string();
        self.take(padded_len(nul + 1))?;
        Ok(text)
    }

    pub(crate) fn read_blob(&mut self) -> Result<Vec<u8>> {
        let len = self.read_u32()? as usize;
        let data = self.take(len)?.to_vec();
        self.take(padded_len(len) - len)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_padding_always_includes_terminator() {
        assert_eq!(string_size(""), 4);
        assert_eq!(string_size("abc"), 4);
        assert_eq!(string_size("abcd"), 8);
        assert_eq!(string_size("/foo"), 8);
    }

    #[test]
    fn put_string_pads_with_nul() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "data");
        assert_eq!(buf.as_ref(), b"data\0\0\0\0");
    }

    #[test]
    fn blob_is_length_prefixed_and_padded() {
        let mut buf = BytesMut::new();
        put_blob(&mut buf, &[1, 2, 3, 4, 5]);
        assert_eq!(buf.len(), blob_size(&[1, 2, 3, 4, 5]));
        assert_eq!(&buf[..4], &[0, 0, 0, 5]);
        assert_eq!(&buf[9..], &[0, 0, 0]);
    }

    #[test]
    fn reader_reports_eof_instead_of_panicking() {
        let mut reader = Reader::new(&[0, 0]);
        assert!(matches!(reader.read_u32(), Err(CodecError::UnexpectedEof)));
    }

    #[test]
    fn read_string_requires_terminator() {
        let mut reader = Reader::new(b"abcd");
        assert!(matches!(
            reader.read_string(),
            Err(CodecError::UnexpectedEof)
        ));
    }

    #[test]
    fn read_string_consumes_padding() {
        let mut reader = Reader::new(b"ab\0\0rest");
        assert_eq!(reader.read_string().unwrap(), "ab");
        assert_eq!(reader.remaining(), 4);
    }
}
