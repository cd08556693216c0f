//! Declarative field descriptors.

use std::borrow::Cow;

use crate::catalog::{FieldCatalog, Item};
use crate::error::SpecError;
use crate::view::ByteOrder;

/// The wire type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    U8,
    U16,
    U24,
    U32,
    U64,
    /// An integer which is shown as set or not set.
    Boolean,
    Bytes,
    String,
    Ipv4,
    Ipv6,
    /// A 6-byte MAC address.
    Ether,
}

impl FieldType {
    /// Width in bytes, or zero for types whose width comes from a [`LengthRule`].
    pub const fn natural_width(self) -> usize {
        match self {
            FieldType::U8 | FieldType::Boolean => 1,
            FieldType::U16 => 2,
            FieldType::U24 => 3,
            FieldType::U32 | FieldType::Ipv4 => 4,
            FieldType::U64 => 8,
            FieldType::Ipv6 => 16,
            FieldType::Ether => 6,
            FieldType::Bytes | FieldType::String => 0,
        }
    }

    /// Whether values of this type are read as an unsigned integer, and so can be masked.
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::U8
                | FieldType::U16
                | FieldType::U24
                | FieldType::U32
                | FieldType::U64
                | FieldType::Boolean
        )
    }

    pub const fn is_variable(self) -> bool {
        matches!(self, FieldType::Bytes | FieldType::String)
    }
}

/// How many bytes a `Bytes` or `String` field spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthRule {
    Fixed(usize),
    /// The value of an earlier integer sibling, by abbreviation.
    Field(&'static str),
    /// An integer length of `width` bytes precedes the value.
    Prefixed { width: usize, order: ByteOrder },
    /// Runs up to a terminator byte, which is consumed but not part of the value.
    Delimited(u8),
    /// Runs up to LF or CRLF, which is consumed but not part of the value. Without a terminator
    /// the line runs to the end of the captured data.
    Line,
    /// Everything left in the captured data.
    Remaining,
}

/// A sparse mapping from integer values to labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValueTable {
    entries: &'static [(u64, &'static str)],
    unknown: &'static str,
}

impl ValueTable {
    pub const fn new(entries: &'static [(u64, &'static str)]) -> Self {
        Self {
            entries,
            unknown: "Unknown",
        }
    }

    /// Replaces the label used for values missing from the table.
    pub const fn with_unknown(mut self, label: &'static str) -> Self {
        self.unknown = label;
        self
    }

    pub fn get(&self, value: u64) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(k, _)| *k == value)
            .map(|(_, label)| *label)
    }

    /// The label for `value`. Never fails: values missing from the table come back as e.g.
    /// `Unknown (0x2a)`.
    pub fn lookup(&self, value: u64) -> Cow<'static, str> {
        match self.get(value) {
            Some(label) => Cow::Borrowed(label),
            None => Cow::Owned(format!("{} (0x{value:x})", self.unknown)),
        }
    }
}

/// Describes a single field: how to read it and how to show it.
///
/// Built once, usually into a `static`, and shared by every walk afterwards.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub(crate) name: &'static str,
    pub(crate) abbrev: &'static str,
    pub(crate) typ: FieldType,
    pub(crate) width: usize,
    pub(crate) mask: Option<u64>,
    pub(crate) order: ByteOrder,
    pub(crate) length: Option<LengthRule>,
    pub(crate) table: Option<&'static ValueTable>,
    pub(crate) subfields: Option<FieldCatalog>,
}

impl FieldSpec {
    /// A big-endian field of `typ`'s natural width.
    pub fn new(name: &'static str, abbrev: &'static str, typ: FieldType) -> Self {
        Self {
            name,
            abbrev,
            typ,
            width: typ.natural_width(),
            mask: None,
            order: ByteOrder::Big,
            length: None,
            table: None,
            subfields: None,
        }
    }

    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_mask(mut self, mask: u64) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn with_table(mut self, table: &'static ValueTable) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_length(mut self, length: LengthRule) -> Self {
        self.length = Some(length);
        self
    }

    /// Overrides the width of a boolean, which may span 1 to 8 bytes.
    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width;
        self
    }

    /// Masked fields which are extracted from this field's raw value, without consuming any more
    /// bytes.
    pub fn with_subfields(mut self, subfields: FieldCatalog) -> Self {
        self.subfields = Some(subfields);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn abbrev(&self) -> &'static str {
        self.abbrev
    }

    pub fn typ(&self) -> FieldType {
        self.typ
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn mask(&self) -> Option<u64> {
        self.mask
    }

    pub fn order(&self) -> ByteOrder {
        self.order
    }

    pub fn length(&self) -> Option<LengthRule> {
        self.length
    }

    pub fn table(&self) -> Option<&'static ValueTable> {
        self.table
    }

    pub fn subfields(&self) -> Option<&FieldCatalog> {
        self.subfields.as_ref()
    }

    /// Applies the mask to a raw value and shifts the result down to bit zero.
    pub fn extract(&self, raw: u64) -> u64 {
        match self.mask {
            Some(mask) if mask != 0 => (raw & mask) >> mask.trailing_zeros(),
            _ => raw,
        }
    }

    /// The inverse of [`FieldSpec::extract`]: places `value` under the mask in `raw`, leaving the
    /// other bits alone.
    pub fn encode_masked(&self, raw: u64, value: u64) -> u64 {
        match self.mask {
            Some(mask) if mask != 0 => {
                let shift = mask.trailing_zeros();
                (raw & !mask) | ((value << shift) & mask)
            }
            _ => value,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), SpecError> {
        let field = self.abbrev;

        if self.typ.is_variable() {
            match self.length {
                None => {
                    return Err(SpecError::InvalidLength {
                        field,
                        reason: "bytes and strings need a length rule",
                    })
                }
                Some(LengthRule::Prefixed { width, .. }) if !(1..=8).contains(&width) => {
                    return Err(SpecError::InvalidLength {
                        field,
                        reason: "length prefixes must be 1 to 8 bytes wide",
                    })
                }
                Some(_) => (),
            }
        } else {
            if self.length.is_some() {
                return Err(SpecError::InvalidLength {
                    field,
                    reason: "only bytes and strings take a length rule",
                });
            }
            let width_ok = match self.typ {
                FieldType::Boolean => (1..=8).contains(&self.width),
                typ => self.width == typ.natural_width(),
            };
            if !width_ok {
                return Err(SpecError::InvalidWidth {
                    field,
                    width: self.width,
                });
            }
        }

        if (self.mask.is_some() || self.subfields.is_some()) && !self.typ.is_numeric() {
            return Err(SpecError::NotNumeric { field });
        }
        if let Some(mask) = self.mask {
            check_mask(field, mask, self.width)?;
        }
        if let Some(subfields) = &self.subfields {
            for item in subfields.items() {
                let Item::Field(sub) = item else {
                    return Err(SpecError::NotNumeric { field });
                };
                if !sub.typ.is_numeric() {
                    return Err(SpecError::NotNumeric { field: sub.abbrev });
                }
                let Some(mask) = sub.mask else {
                    return Err(SpecError::UnmaskedSubfield {
                        field,
                        subfield: sub.abbrev,
                    });
                };
                check_mask(sub.abbrev, mask, self.width)?;
            }
        }

        Ok(())
    }
}

fn check_mask(field: &'static str, mask: u64, width: usize) -> Result<(), SpecError> {
    let fits = match width {
        0 => false,
        8.. => true,
        _ => mask >> (width * 8) == 0,
    };
    if mask == 0 || !fits {
        return Err(SpecError::MaskOutOfRange { field, mask, width });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    static OPCODES: ValueTable = ValueTable::new(&[(1, "Probe"), (2, "Echo"), (3, "Flush")]);

    #[test]
    fn test_lookup() {
        assert_eq!(OPCODES.lookup(2), "Echo");
        assert_eq!(OPCODES.lookup(42), "Unknown (0x2a)");
        let table = OPCODES.with_unknown("Reserved");
        assert_eq!(table.lookup(0), "Reserved (0x0)");
    }

    #[test_case(0xF000, 0xA123, 0xA; "high nibble")]
    #[test_case(0x0FFF, 0xA123, 0x123; "low twelve bits")]
    #[test_case(0x0030, 0x00F0, 0x3; "middle bits")]
    fn test_extract(mask: u64, raw: u64, want: u64) {
        let spec = FieldSpec::new("X", "x", FieldType::U16).with_mask(mask);
        assert_eq!(spec.extract(raw), want);
    }

    #[test]
    fn test_encode_masked_is_idempotent() {
        let spec = FieldSpec::new("Version", "version", FieldType::U16).with_mask(0x0FFF);
        for raw in [0x0000_u64, 0xA123, 0xFFFF, 0x5A5A] {
            let value = spec.extract(raw);
            assert_eq!(spec.encode_masked(raw, value), raw);
            assert_eq!(spec.extract(spec.encode_masked(raw, 0x7)), 0x7);
        }
    }

    #[test]
    fn test_validate() {
        let ok = [
            FieldSpec::new("A", "a", FieldType::U8).with_mask(0xE0),
            FieldSpec::new("B", "b", FieldType::Bytes).with_length(LengthRule::Remaining),
            FieldSpec::new("C", "c", FieldType::Boolean).with_width(2),
            FieldSpec::new("D", "d", FieldType::U64).with_mask(u64::MAX),
        ];
        for spec in ok {
            assert_eq!(spec.validate(), Ok(()), "{}", spec.abbrev);
        }

        let bad = [
            FieldSpec::new("A", "a", FieldType::U8).with_mask(0x100),
            FieldSpec::new("B", "b", FieldType::Bytes),
            FieldSpec::new("C", "c", FieldType::U16).with_width(3),
            FieldSpec::new("D", "d", FieldType::String).with_mask(1),
            FieldSpec::new("E", "e", FieldType::U8).with_length(LengthRule::Fixed(1)),
            FieldSpec::new("F", "f", FieldType::U8).with_mask(0),
        ];
        for spec in bad {
            assert!(spec.validate().is_err(), "{}", spec.abbrev);
        }
    }
}
