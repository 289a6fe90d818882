use crate::err::TruncatedRead;
use crate::utils::bytes;

/// A lightweight cursor over an immutable byte slice.
///
/// This is the slice/offset equivalent of `Cursor<&[u8]>`, intended for template decoding where
/// the data is already in memory and every failed read must report its exact offset.
///
/// All reads are big-endian and advance the cursor on success. A failed read leaves the
/// position untouched.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    #[inline]
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    #[inline]
    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    #[inline]
    pub(crate) fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    #[inline]
    pub(crate) fn is_at_end(&self) -> bool {
        self.remaining() == 0
    }

    /// Everything from the current position to the end of the buffer.
    #[inline]
    pub(crate) fn rest(&self) -> &'a [u8] {
        self.buf.get(self.pos..).unwrap_or_default()
    }

    #[inline]
    pub(crate) fn peek_u8(&self) -> Option<u8> {
        bytes::read_u8(self.buf, self.pos)
    }

    #[inline]
    pub(crate) fn take_bytes(
        &mut self,
        len: usize,
        what: &'static str,
    ) -> Result<&'a [u8], TruncatedRead> {
        let out = bytes::slice_r(self.buf, self.pos, len, what)?;
        self.pos += len;
        Ok(out)
    }

    #[inline]
    pub(crate) fn array<const N: usize>(
        &mut self,
        what: &'static str,
    ) -> Result<[u8; N], TruncatedRead> {
        let v = bytes::read_array_r::<N>(self.buf, self.pos, what)?;
        self.pos += N;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u8_named(&mut self, what: &'static str) -> Result<u8, TruncatedRead> {
        let b = bytes::read_u8(self.buf, self.pos)
            .ok_or_else(|| bytes::truncated(what, self.pos, 1, self.buf.len()))?;
        self.pos += 1;
        Ok(b)
    }

    #[inline]
    pub(crate) fn u16_named(&mut self, what: &'static str) -> Result<u16, TruncatedRead> {
        let v = bytes::read_u16_be_r(self.buf, self.pos, what)?;
        self.pos += 2;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u32_named(&mut self, what: &'static str) -> Result<u32, TruncatedRead> {
        let v = bytes::read_u32_be_r(self.buf, self.pos, what)?;
        self.pos += 4;
        Ok(v)
    }

    #[inline]
    pub(crate) fn u64_named(&mut self, what: &'static str) -> Result<u64, TruncatedRead> {
        let v = bytes::read_u64_be_r(self.buf, self.pos, what)?;
        self.pos += 8;
        Ok(v)
    }

    /// Read an unsigned big-endian integer of `width` bytes (1, 2, 4 or 8).
    pub(crate) fn uint_named(
        &mut self,
        width: usize,
        what: &'static str,
    ) -> Result<u64, TruncatedRead> {
        match width {
            1 => self.u8_named(what).map(u64::from),
            2 => self.u16_named(what).map(u64::from),
            4 => self.u32_named(what).map(u64::from),
            _ => self.u64_named(what),
        }
    }

    /// Read a Pascal string: a one byte length prefix followed by that many bytes.
    ///
    /// The cursor only advances if both the prefix and the body are present.
    pub(crate) fn pascal_string(&mut self, what: &'static str) -> Result<&'a [u8], TruncatedRead> {
        let start = self.pos;
        let len = usize::from(self.u8_named(what)?);
        match self.take_bytes(len, what) {
            Ok(body) => Ok(body),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cursor_advances_only_on_success() {
        let buf = [0x00, 0x0A, 0xFF];
        let mut cursor = ByteCursor::new(&buf);

        assert_eq!(cursor.u16_named("word").unwrap(), 10);
        assert_eq!(cursor.pos(), 2);

        let err = cursor.u16_named("word").unwrap_err();
        assert_eq!(err.offset, 2);
        assert_eq!(err.have, 1);
        assert_eq!(cursor.pos(), 2);
        assert_eq!(cursor.remaining(), 1);
    }

    #[test]
    fn test_pascal_string_rewinds_when_body_is_short() {
        let buf = [0x05, b'a', b'b'];
        let mut cursor = ByteCursor::new(&buf);

        let err = cursor.pascal_string("pstring").unwrap_err();
        assert_eq!(err.need, 5);
        assert_eq!(err.have, 2);
        assert_eq!(cursor.pos(), 0);
    }

    #[test]
    fn test_pascal_string() {
        let buf = [0x03, b'a', b'b', b'c', 0x00];
        let mut cursor = ByteCursor::new(&buf);

        assert_eq!(cursor.pascal_string("pstring").unwrap(), b"abc");
        assert_eq!(cursor.peek_u8(), Some(0));
        assert_eq!(cursor.rest(), &[0x00]);
    }
}
