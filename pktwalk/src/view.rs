//! Bounds-checked, read-only views over packet bytes.

use std::ops::Range;

use crate::error::{ReadError, Result};

/// Byte order of a multi-byte integer on the wire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    /// Network byte order.
    #[default]
    Big,
    Little,
    /// Whatever the host uses.
    Native,
}

impl ByteOrder {
    fn is_little(self) -> bool {
        match self {
            ByteOrder::Big => false,
            ByteOrder::Little => true,
            ByteOrder::Native => cfg!(target_endian = "little"),
        }
    }
}

/// A read-only window into a packet.
///
/// The captured length is how many bytes are actually present. The reported length is how many
/// bytes the packet claimed to have on the wire, which is larger when the capture was cut short
/// by a snapshot length. Reads that fall between the two fail with [`ReadError::Truncated`],
/// reads past the reported length fail with [`ReadError::OutOfBounds`].
///
/// Offsets taken by the methods here are relative to the start of the view. [`ByteView::base`]
/// maps them back to the packet the view was carved from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteView<'a> {
    data: &'a [u8],
    reported: usize,
    base: usize,
}

impl<'a> ByteView<'a> {
    /// A view over a fully captured buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            reported: data.len(),
            base: 0,
        }
    }

    /// A view over a buffer which only holds the first `data.len()` of `reported_len` bytes. A
    /// reported length shorter than the captured data is raised to it.
    pub fn truncated(data: &'a [u8], reported_len: usize) -> Self {
        Self {
            data,
            reported: reported_len.max(data.len()),
            base: 0,
        }
    }

    pub fn captured_len(&self) -> usize {
        self.data.len()
    }

    pub fn reported_len(&self) -> usize {
        self.reported
    }

    /// Offset of this view within the top-level packet.
    pub fn base(&self) -> usize {
        self.base
    }

    /// The captured bytes.
    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_truncated(&self) -> bool {
        self.data.len() < self.reported
    }

    fn check(&self, offset: usize, len: usize) -> Result<Range<usize>> {
        let err = |truncated| {
            let (captured, reported) = (self.data.len(), self.reported);
            if truncated {
                ReadError::Truncated {
                    offset,
                    len,
                    captured,
                    reported,
                }
            } else {
                ReadError::OutOfBounds {
                    offset,
                    len,
                    captured,
                    reported,
                }
            }
        };
        match offset.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(offset..end),
            Some(end) if end <= self.reported => Err(err(true)),
            _ => Err(err(false)),
        }
    }

    pub fn get_u8(&self, offset: usize) -> Result<u8> {
        let range = self.check(offset, 1)?;
        Ok(self.data[range.start])
    }

    pub fn get_u16(&self, offset: usize, order: ByteOrder) -> Result<u16> {
        self.get_uint(offset, 2, order).map(|v| v as u16)
    }

    /// Reads a 3-byte integer.
    pub fn get_u24(&self, offset: usize, order: ByteOrder) -> Result<u32> {
        self.get_uint(offset, 3, order).map(|v| v as u32)
    }

    pub fn get_u32(&self, offset: usize, order: ByteOrder) -> Result<u32> {
        self.get_uint(offset, 4, order).map(|v| v as u32)
    }

    pub fn get_u64(&self, offset: usize, order: ByteOrder) -> Result<u64> {
        self.get_uint(offset, 8, order)
    }

    /// Reads an unsigned integer of `width` bytes. Bytes beyond the eighth shift the earlier ones
    /// out, so callers keep `width` within 1 to 8.
    pub fn get_uint(&self, offset: usize, width: usize, order: ByteOrder) -> Result<u64> {
        let bytes = self.get_bytes(offset, width)?;
        let fold = |acc: u64, b: &u8| (acc << 8) | u64::from(*b);
        let value = if order.is_little() {
            bytes.iter().rev().fold(0, fold)
        } else {
            bytes.iter().fold(0, fold)
        };
        Ok(value)
    }

    pub fn get_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let range = self.check(offset, len)?;
        Ok(&self.data[range])
    }

    /// Reads exactly `N` bytes into an array.
    pub fn get_array<const N: usize>(&self, offset: usize) -> Result<[u8; N]> {
        let bytes = self.get_bytes(offset, N)?;
        let mut out = [0; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// A sub-view of exactly `len` captured bytes. Fails like a read of the same range.
    pub fn slice(&self, offset: usize, len: usize) -> Result<ByteView<'a>> {
        let range = self.check(offset, len)?;
        Ok(ByteView {
            data: &self.data[range],
            reported: len,
            base: self.base + offset,
        })
    }

    /// A sub-view reporting `len` bytes, of which only the captured part is readable. Only fails
    /// when the range runs past the reported length, so that truncated payloads can still be
    /// handed to another dissector.
    pub fn subset(&self, offset: usize, len: usize) -> Result<ByteView<'a>> {
        let end = match offset.checked_add(len) {
            Some(end) if end <= self.reported => end,
            _ => {
                return Err(ReadError::OutOfBounds {
                    offset,
                    len,
                    captured: self.data.len(),
                    reported: self.reported,
                })
            }
        };
        let captured = self.data.len();
        Ok(ByteView {
            data: &self.data[offset.min(captured)..end.min(captured)],
            reported: len,
            base: self.base + offset,
        })
    }

    /// Everything from `offset` to the reported end.
    pub fn tail(&self, offset: usize) -> Result<ByteView<'a>> {
        let len = self
            .reported
            .checked_sub(offset)
            .ok_or(ReadError::OutOfBounds {
                offset,
                len: 0,
                captured: self.data.len(),
                reported: self.reported,
            })?;
        self.subset(offset, len)
    }

    /// Position of the first `needle` at or after `offset`, searching captured bytes only.
    pub fn find_byte(&self, offset: usize, needle: u8) -> Option<usize> {
        self.data
            .get(offset..)?
            .iter()
            .position(|b| *b == needle)
            .map(|i| offset + i)
    }

    /// Captured bytes left from `offset`, or zero past the end.
    pub fn remaining_len(&self, offset: usize) -> usize {
        self.data.len().saturating_sub(offset)
    }

    /// Reported bytes left from `offset`, or zero past the end.
    pub fn reported_remaining(&self, offset: usize) -> usize {
        self.reported.saturating_sub(offset)
    }
}

impl<'a> From<&'a [u8]> for ByteView<'a> {
    fn from(data: &'a [u8]) -> Self {
        ByteView::new(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use test_case::test_case;

    static BUF: [u8; 8] = hex!("01 02 03 04 05 06 07 08");

    #[test_case(ByteOrder::Big, 0x0102; "big endian")]
    #[test_case(ByteOrder::Little, 0x0201; "little endian")]
    fn test_get_u16(order: ByteOrder, want: u16) {
        let view = ByteView::new(&BUF);
        assert_eq!(view.get_u16(0, order), Ok(want));
    }

    #[test]
    fn test_integer_widths() {
        let view = ByteView::new(&BUF);
        assert_eq!(view.get_u8(7), Ok(0x08));
        assert_eq!(view.get_u24(1, ByteOrder::Big), Ok(0x020304));
        assert_eq!(view.get_u24(1, ByteOrder::Little), Ok(0x040302));
        assert_eq!(view.get_u32(4, ByteOrder::Big), Ok(0x05060708));
        assert_eq!(view.get_u64(0, ByteOrder::Big), Ok(0x0102030405060708));
        assert_eq!(view.get_u64(0, ByteOrder::Little), Ok(0x0807060504030201));
    }

    #[test]
    fn test_native_order_matches_host() {
        let view = ByteView::new(&BUF);
        let want = u32::from_ne_bytes([1, 2, 3, 4]);
        assert_eq!(view.get_u32(0, ByteOrder::Native), Ok(want));
    }

    #[test]
    fn test_truncated_vs_out_of_bounds() {
        let data = [0_u8; 50];
        let view = ByteView::truncated(&data, 100);
        assert_eq!(
            view.get_u8(60),
            Err(ReadError::Truncated {
                offset: 60,
                len: 1,
                captured: 50,
                reported: 100,
            })
        );
        assert_eq!(
            view.get_u8(200),
            Err(ReadError::OutOfBounds {
                offset: 200,
                len: 1,
                captured: 50,
                reported: 100,
            })
        );
        // straddling the captured end is still truncation
        assert!(matches!(
            view.get_u32(48, ByteOrder::Big),
            Err(ReadError::Truncated { .. })
        ));
    }

    #[test]
    fn test_overflowing_reads_are_out_of_bounds() {
        let view = ByteView::new(&BUF);
        assert!(matches!(
            view.get_bytes(usize::MAX, 2),
            Err(ReadError::OutOfBounds { .. })
        ));
        assert!(matches!(
            view.subset(4, usize::MAX),
            Err(ReadError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_slice_is_strict() {
        let data = [0_u8; 4];
        let view = ByteView::truncated(&data, 8);
        assert!(view.slice(0, 4).is_ok());
        assert!(matches!(view.slice(2, 4), Err(ReadError::Truncated { .. })));
    }

    #[test]
    fn test_subset_keeps_captured_part() {
        let view = ByteView::truncated(&BUF[..6], 10);
        let sub = view.subset(4, 4).unwrap();
        assert_eq!(sub.captured_len(), 2);
        assert_eq!(sub.reported_len(), 4);
        assert_eq!(sub.base(), 4);
        assert_eq!(sub.get_u8(1), Ok(0x06));
        assert!(matches!(sub.get_u8(2), Err(ReadError::Truncated { .. })));

        let nested = sub.subset(1, 2).unwrap();
        assert_eq!(nested.base(), 5);
        assert!(view.subset(8, 4).is_err());
    }

    #[test]
    fn test_tail() {
        let view = ByteView::new(&BUF);
        let tail = view.tail(6).unwrap();
        assert_eq!(tail.as_slice(), &[7, 8]);
        assert_eq!(view.tail(8).unwrap().captured_len(), 0);
        assert!(view.tail(9).is_err());
    }

    #[test]
    fn test_find_byte_and_remaining() {
        let data = b"foo\tbar\r\n";
        let view = ByteView::truncated(data, 20);
        assert_eq!(view.find_byte(0, b'\t'), Some(3));
        assert_eq!(view.find_byte(4, b'\t'), None);
        assert_eq!(view.find_byte(100, b'\t'), None);
        assert_eq!(view.remaining_len(4), 5);
        assert_eq!(view.remaining_len(40), 0);
        assert_eq!(view.reported_remaining(4), 16);
    }
}
