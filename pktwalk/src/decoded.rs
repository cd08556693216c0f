//! The field tree produced by a dissection.

use std::borrow::Cow;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::ReadError;
use crate::field::FieldType;
use crate::view::ByteView;

/// A decoded value. Bytes and strings borrow from the packet where they can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value<'a> {
    /// Protocol, group and TLV nodes carry no value of their own.
    None,
    UInt(u64),
    Bool(bool),
    Bytes(&'a [u8]),
    Str(Cow<'a, str>),
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Ether([u8; 6]),
}

impl<'a> Value<'a> {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Bool(b) => Some(u64::from(*b)),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match self {
            Value::Bytes(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s.as_ref()),
            _ => None,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => Ok(()),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Bool(true) => f.write_str("True"),
            Value::Bool(false) => f.write_str("False"),
            Value::Bytes(bytes) => {
                for b in *bytes {
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Value::Str(s) => f.write_str(s),
            Value::Ipv4(addr) => write!(f, "{addr}"),
            Value::Ipv6(addr) => write!(f, "{addr}"),
            Value::Ether(mac) => {
                let [a, b, c, d, e, g] = mac;
                write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    OutOfBounds,
    Truncated,
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Note,
    Warning,
    Error,
}

/// An annotation on a decoded tree explaining why dissection stopped early.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub severity: Severity,
    /// Absolute offset within the packet.
    pub offset: usize,
    pub message: Cow<'static, str>,
}

impl Diagnostic {
    pub fn malformed(offset: usize, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: DiagnosticKind::Malformed,
            severity: Severity::Error,
            offset,
            message: message.into(),
        }
    }

    pub fn truncated(offset: usize, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind: DiagnosticKind::Truncated,
            severity: Severity::Warning,
            offset,
            message: message.into(),
        }
    }

    /// Converts a failed read on a view whose first byte sits at `base` in the packet.
    pub fn from_read(err: &ReadError, base: usize) -> Self {
        let (kind, severity) = match err {
            ReadError::OutOfBounds { .. } => (DiagnosticKind::OutOfBounds, Severity::Error),
            ReadError::Truncated { .. } => (DiagnosticKind::Truncated, Severity::Warning),
        };
        Self {
            kind,
            severity,
            offset: base + err.offset(),
            message: Cow::Owned(err.to_string()),
        }
    }

    pub fn is_malformed(&self) -> bool {
        self.kind == DiagnosticKind::Malformed
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            DiagnosticKind::OutOfBounds => "Out of bounds",
            DiagnosticKind::Truncated => "Truncated",
            DiagnosticKind::Malformed => "Malformed",
        };
        write!(f, "[{kind}] {} at offset {}", self.message, self.offset)
    }
}

/// One node of the decoded tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedField<'a> {
    pub name: &'static str,
    /// Full dotted filter key, e.g. `moldudp64.message_block.message_length`.
    pub abbrev: String,
    /// `None` for protocol, group and TLV nodes.
    pub typ: Option<FieldType>,
    /// Absolute offset within the packet.
    pub start: usize,
    pub len: usize,
    pub value: Value<'a>,
    /// The label of an enumerated value, or a summary of a node.
    pub display: Option<Cow<'static, str>>,
    pub children: Vec<DecodedField<'a>>,
    pub diagnostic: Option<Diagnostic>,
    /// Computed by a dissector instead of read from the packet.
    pub generated: bool,
}

impl<'a> DecodedField<'a> {
    /// A node holding other fields.
    pub fn node(name: &'static str, abbrev: impl Into<String>, start: usize, len: usize) -> Self {
        Self {
            name,
            abbrev: abbrev.into(),
            typ: None,
            start,
            len,
            value: Value::None,
            display: None,
            children: Vec::new(),
            diagnostic: None,
            generated: false,
        }
    }

    pub fn field(
        name: &'static str,
        abbrev: impl Into<String>,
        typ: FieldType,
        start: usize,
        len: usize,
        value: Value<'a>,
    ) -> Self {
        Self {
            typ: Some(typ),
            value,
            ..Self::node(name, abbrev, start, len)
        }
    }

    /// A value which does not appear in the packet, anchored at `start` with zero length.
    pub fn generated(
        name: &'static str,
        abbrev: impl Into<String>,
        typ: FieldType,
        start: usize,
        value: Value<'a>,
    ) -> Self {
        Self {
            generated: true,
            ..Self::field(name, abbrev, typ, start, 0, value)
        }
    }

    /// The captured bytes of a payload nobody claimed.
    pub fn data(view: &ByteView<'a>) -> Self {
        let mut data = Self::node("Data", "data", view.base(), view.reported_len());
        data.children.push(Self::field(
            "Data",
            "data.data",
            FieldType::Bytes,
            view.base(),
            view.captured_len(),
            Value::Bytes(view.as_slice()),
        ));
        data.display = Some(Cow::Owned(format!("{} bytes", view.reported_len())));
        data
    }

    pub fn with_display(mut self, display: impl Into<Cow<'static, str>>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn push(&mut self, child: DecodedField<'a>) {
        self.children.push(child);
    }

    /// The first field in depth-first order whose abbreviation is `abbrev`, this one included.
    pub fn find(&self, abbrev: &str) -> Option<&DecodedField<'a>> {
        self.walk().find(|f| f.abbrev == abbrev)
    }

    pub fn find_all<'s>(&'s self, abbrev: &'s str) -> impl Iterator<Item = &'s DecodedField<'a>> {
        self.walk().filter(move |f| f.abbrev == abbrev)
    }

    /// This field and all of its descendants, depth first, in display order.
    pub fn walk(&self) -> Descendants<'_, 'a> {
        Descendants { stack: vec![self] }
    }

    /// Every diagnostic in this subtree, depth first.
    pub fn diagnostics(&self) -> Vec<&Diagnostic> {
        self.walk().filter_map(|f| f.diagnostic.as_ref()).collect()
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = depth * 4;
        write!(f, "{:indent$}{}", "", self.name)?;
        match (&self.display, &self.value) {
            (None, Value::None) => (),
            (Some(display), Value::None) => write!(f, ": {display}")?,
            (None, value) => write!(f, ": {value}")?,
            (Some(display), value) => write!(f, ": {display} ({value})")?,
        }
        if self.generated {
            f.write_str(" [generated]")?;
        }
        writeln!(f)?;
        if let Some(diag) = &self.diagnostic {
            writeln!(f, "{:indent$}    {diag}", "")?;
        }
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for DecodedField<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

/// Depth-first iterator returned by [`DecodedField::walk`].
pub struct Descendants<'t, 'a> {
    stack: Vec<&'t DecodedField<'a>>,
}

impl<'t, 'a> Iterator for Descendants<'t, 'a> {
    type Item = &'t DecodedField<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(next)
    }
}
