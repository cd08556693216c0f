use thiserror::Error;

/// A read result.
pub type Result<T> = std::result::Result<T, ReadError>;

/// A failed read from a [`ByteView`](crate::ByteView).
#[derive(Error, Debug, Clone, Copy, Eq, PartialEq)]
pub enum ReadError {
    /// The range lies beyond the reported length of the packet.
    #[error("read of {len} bytes at offset {offset} is beyond the reported length {reported}")]
    OutOfBounds {
        offset: usize,
        len: usize,
        captured: usize,
        reported: usize,
    },
    /// The range is within the reported length, but was not captured.
    #[error("read of {len} bytes at offset {offset} is beyond the captured length {captured} (reported {reported})")]
    Truncated {
        offset: usize,
        len: usize,
        captured: usize,
        reported: usize,
    },
}

impl ReadError {
    /// Offset of the failed read, relative to the view it was made on.
    pub fn offset(&self) -> usize {
        match self {
            ReadError::OutOfBounds { offset, .. } | ReadError::Truncated { offset, .. } => *offset,
        }
    }
}

/// A catalog which breaks one of the rules a walk relies on. Raised when the catalog is built,
/// never while walking a packet.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum SpecError {
    #[error("field `{field}`: mask {mask:#x} does not fit in {width} bytes")]
    MaskOutOfRange {
        field: &'static str,
        mask: u64,
        width: usize,
    },
    #[error("field `{field}`: masks and sub-fields need an integer or boolean type")]
    NotNumeric { field: &'static str },
    #[error("field `{field}`: width {width} is not valid for its type")]
    InvalidWidth { field: &'static str, width: usize },
    #[error("field `{field}`: {reason}")]
    InvalidLength {
        field: &'static str,
        reason: &'static str,
    },
    #[error("field `{field}`: sub-field `{subfield}` needs a mask")]
    UnmaskedSubfield {
        field: &'static str,
        subfield: &'static str,
    },
    #[error("`{field}` refers to `{source_field}`, which is not an earlier integer field")]
    UnknownSource {
        field: &'static str,
        source_field: &'static str,
    },
    #[error("`{abbrev}` is used by more than one item in `{catalog}`")]
    DuplicateAbbrev {
        catalog: &'static str,
        abbrev: &'static str,
    },
    #[error("TLV `{field}`: {reason}")]
    InvalidTlvLayout {
        field: &'static str,
        reason: &'static str,
    },
    #[error("variants `{catalog}`: tag {tag} is claimed twice")]
    DuplicateTag { catalog: &'static str, tag: u64 },
    #[error("variants `{catalog}`: more than one default variant")]
    DuplicateDefault { catalog: &'static str },
}
