//! Walks a [`FieldCatalog`] over a [`ByteView`].

use std::borrow::Cow;
use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::instrument;

use crate::catalog::{CountRule, FieldCatalog, GroupSpec, Item, Repeat, SwitchSpec, TlvSpec};
use crate::decoded::{DecodedField, Diagnostic, Value};
use crate::error::ReadError;
use crate::field::{FieldSpec, FieldType, LengthRule};
use crate::view::ByteView;

/// The outcome of walking a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Walk<'a> {
    /// Decoded fields, in catalog order. Kept even when the walk stops early.
    pub fields: Vec<DecodedField<'a>>,
    /// Offset just past the last byte consumed, relative to the view.
    pub offset: usize,
    /// Why the walk stopped before the catalog was exhausted.
    pub diagnostic: Option<Diagnostic>,
}

impl<'a> Walk<'a> {
    pub fn find(&self, abbrev: &str) -> Option<&DecodedField<'a>> {
        self.fields.iter().find_map(|f| f.find(abbrev))
    }

    pub fn is_complete(&self) -> bool {
        self.diagnostic.is_none()
    }
}

/// Decodes `catalog` from `offset` onwards.
///
/// Fails only when `offset` lies past the captured data. Anything going wrong during the walk
/// itself stops it with a [`Diagnostic`], keeping whatever was decoded up to that point. The
/// diagnostic is also attached to the innermost group element, switch or TLV open at the time.
#[instrument(skip_all, level = "trace")]
pub fn decode<'a>(
    catalog: &FieldCatalog,
    view: &ByteView<'a>,
    offset: usize,
) -> Result<Walk<'a>, ReadError> {
    if offset > view.captured_len() {
        return Err(ReadError::OutOfBounds {
            offset,
            len: 0,
            captured: view.captured_len(),
            reported: view.reported_len(),
        });
    }

    let mut walker = Walker {
        view: *view,
        offset,
        tlv_value: None,
    };
    let mut fields = Vec::new();
    let diagnostic = match walker.walk(catalog, catalog.abbrev(), &mut fields) {
        Ok(()) => None,
        Err(stop) => {
            tracing::debug!(catalog = catalog.abbrev(), diagnostic = %stop.diag, "walk stopped early");
            Some(stop.diag)
        }
    };

    Ok(Walk {
        fields,
        offset: walker.offset,
        diagnostic,
    })
}

/// A position within a view, for dissectors which decode several catalogs one after another.
#[derive(Debug, Clone, Copy)]
pub struct CursorDissector<'a> {
    view: ByteView<'a>,
    offset: usize,
}

impl<'a> CursorDissector<'a> {
    pub fn new(view: ByteView<'a>) -> Self {
        Self::at(view, 0)
    }

    pub fn at(view: ByteView<'a>, offset: usize) -> Self {
        Self { view, offset }
    }

    pub fn view(&self) -> ByteView<'a> {
        self.view
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Captured bytes after the cursor.
    pub fn remaining(&self) -> usize {
        self.view.remaining_len(self.offset)
    }

    /// Decodes `catalog` at the cursor, then moves past whatever it consumed.
    pub fn decode(&mut self, catalog: &FieldCatalog) -> Result<Walk<'a>, ReadError> {
        let walk = decode(catalog, &self.view, self.offset)?;
        self.offset = walk.offset;
        Ok(walk)
    }

    /// Everything after the cursor, for handing to another dissector.
    pub fn rest(&self) -> Result<ByteView<'a>, ReadError> {
        self.view.tail(self.offset)
    }
}

/// Unwinds a walk. `attached` is set once some node carries the diagnostic.
struct Stop {
    diag: Diagnostic,
    attached: bool,
}

impl Stop {
    fn new(diag: Diagnostic) -> Self {
        Self {
            diag,
            attached: false,
        }
    }
}

type Step<T = ()> = std::result::Result<T, Stop>;

/// Values of the integer fields decoded so far in one catalog.
type Scope = Vec<(&'static str, u64)>;

enum TlvState<'a> {
    ReadType,
    ReadLength {
        node: DecodedField<'a>,
        typ: u64,
    },
    ValidateLength {
        node: DecodedField<'a>,
        typ: u64,
        declared: u64,
    },
    ReadValue {
        node: DecodedField<'a>,
        typ: u64,
        value_len: usize,
    },
    Advance {
        node: DecodedField<'a>,
        next: usize,
    },
}

struct Walker<'a> {
    view: ByteView<'a>,
    offset: usize,
    /// Set when `view` is the value of a TLV, to its declared length.
    tlv_value: Option<usize>,
}

impl<'a> Walker<'a> {
    fn abs(&self, offset: usize) -> usize {
        self.view.base() + offset
    }

    fn read_err(&self, err: ReadError) -> Stop {
        match (self.tlv_value, &err) {
            // the declared length is what is wrong, not the packet
            (Some(len), ReadError::OutOfBounds { .. }) => {
                self.malformed(err.offset(), format!("TLV value of {len} bytes is too short"))
            }
            _ => Stop::new(Diagnostic::from_read(&err, self.view.base())),
        }
    }

    fn malformed(&self, offset: usize, message: impl Into<Cow<'static, str>>) -> Stop {
        Stop::new(Diagnostic::malformed(self.abs(offset), message))
    }

    fn walk(
        &mut self,
        catalog: &FieldCatalog,
        prefix: &str,
        out: &mut Vec<DecodedField<'a>>,
    ) -> Step {
        let mut scope = Scope::new();
        for item in catalog.items() {
            match item {
                Item::Field(spec) => {
                    let (field, raw) = self.field(spec, prefix, &scope)?;
                    if let Some(value) = raw {
                        scope.push((spec.abbrev, value));
                    }
                    out.push(field);
                }
                Item::Group(group) => self.group(group, prefix, &scope, out)?,
                Item::Switch(switch) => self.switch(switch, prefix, &scope, out)?,
                Item::Tlv(tlv) => self.tlv(tlv, prefix, out)?,
            }
        }
        Ok(())
    }

    fn source(&self, scope: &Scope, source: &str) -> Step<u64> {
        scope
            .iter()
            .rev()
            .find(|(abbrev, _)| *abbrev == source)
            .map(|(_, value)| *value)
            .ok_or_else(|| self.malformed(self.offset, format!("no value for `{source}`")))
    }

    fn to_len(&self, value: u64, at: usize) -> Step<usize> {
        usize::try_from(value)
            .map_err(|_| self.malformed(at, format!("length {value} is not addressable")))
    }

    /// Returns the field, plus its value when later siblings may refer to it.
    fn field(
        &mut self,
        spec: &FieldSpec,
        prefix: &str,
        scope: &Scope,
    ) -> Step<(DecodedField<'a>, Option<u64>)> {
        let path = join(prefix, spec.abbrev);
        let start = self.offset;

        if spec.typ.is_numeric() {
            let raw = self
                .view
                .get_uint(start, spec.width, spec.order)
                .map_err(|e| self.read_err(e))?;
            let value = spec.extract(raw);
            let mut field = numeric_field(spec, &path, self.abs(start), spec.width, value);
            if let Some(subfields) = &spec.subfields {
                for item in subfields.items() {
                    if let Item::Field(sub) = item {
                        let abbrev = join(&path, sub.abbrev);
                        let sub_value = sub.extract(raw);
                        field.push(numeric_field(sub, &abbrev, self.abs(start), spec.width, sub_value));
                    }
                }
            }
            self.offset = start + spec.width;
            return Ok((field, Some(value)));
        }

        let value = match spec.typ {
            FieldType::Ipv4 => self
                .view
                .get_array::<4>(start)
                .map(|b| Value::Ipv4(Ipv4Addr::from(b))),
            FieldType::Ipv6 => self
                .view
                .get_array::<16>(start)
                .map(|b| Value::Ipv6(Ipv6Addr::from(b))),
            FieldType::Ether => self.view.get_array::<6>(start).map(Value::Ether),
            _ => return self.variable(spec, path, scope).map(|f| (f, None)),
        };
        let value = value.map_err(|e| self.read_err(e))?;
        let width = spec.typ.natural_width();
        self.offset = start + width;
        Ok((
            DecodedField::field(spec.name, path, spec.typ, self.abs(start), width, value),
            None,
        ))
    }

    fn variable(&mut self, spec: &FieldSpec, path: String, scope: &Scope) -> Step<DecodedField<'a>> {
        let start = self.offset;
        let Some(rule) = spec.length else {
            return Err(self.malformed(start, format!("`{}` has no length rule", spec.abbrev)));
        };

        // where the value starts, how long it is, and how many bytes the field spans in total
        let (at, len, consumed) = match rule {
            LengthRule::Fixed(n) => (start, n, n),
            LengthRule::Field(source) => {
                let n = self.source(scope, source)?;
                let n = self.to_len(n, start)?;
                self.check_length(start, n)?;
                (start, n, n)
            }
            LengthRule::Prefixed { width, order } => {
                let n = self
                    .view
                    .get_uint(start, width, order)
                    .map_err(|e| self.read_err(e))?;
                let n = self.to_len(n, start)?;
                self.check_length(start + width, n)?;
                (start + width, n, width + n)
            }
            LengthRule::Delimited(end) => match self.view.find_byte(start, end) {
                Some(pos) => (start, pos - start, pos - start + 1),
                None if self.view.is_truncated() => {
                    return Err(Stop::new(Diagnostic::truncated(
                        self.abs(start),
                        format!("terminator {end:#04x} was not captured"),
                    )));
                }
                None => {
                    return Err(self.malformed(start, format!("missing terminator {end:#04x}")));
                }
            },
            LengthRule::Line => match self.view.find_byte(start, b'\n') {
                Some(pos) => {
                    let cr = pos > start && self.view.get_u8(pos - 1) == Ok(b'\r');
                    (start, pos - start - usize::from(cr), pos - start + 1)
                }
                None if self.view.is_truncated() => {
                    return Err(Stop::new(Diagnostic::truncated(
                        self.abs(start),
                        "end of line was not captured",
                    )));
                }
                None => {
                    let n = self.view.remaining_len(start);
                    (start, n, n)
                }
            },
            LengthRule::Remaining => {
                let n = self.view.remaining_len(start);
                (start, n, n)
            }
        };

        let bytes = self
            .view
            .get_bytes(at, len)
            .map_err(|e| self.read_err(e))?;
        let value = match spec.typ {
            FieldType::String => Value::Str(String::from_utf8_lossy(bytes)),
            _ => Value::Bytes(bytes),
        };
        self.offset = start + consumed;
        Ok(DecodedField::field(
            spec.name,
            path,
            spec.typ,
            self.abs(start),
            consumed,
            value,
        ))
    }

    /// A length read from the packet may not run past the reported data.
    fn check_length(&self, at: usize, len: usize) -> Step {
        let remaining = self.view.reported_remaining(at);
        if len > remaining {
            return Err(self.malformed(
                at,
                format!("length {len} exceeds the {remaining} bytes remaining"),
            ));
        }
        Ok(())
    }

    fn group(
        &mut self,
        group: &GroupSpec,
        prefix: &str,
        scope: &Scope,
        out: &mut Vec<DecodedField<'a>>,
    ) -> Step {
        let path = join(prefix, group.abbrev);
        let count = match group.repeat {
            Repeat::Once => Some(1),
            Repeat::Count(CountRule::Fixed(n)) => Some(n),
            Repeat::Count(CountRule::Field(source)) => {
                let n = self.source(scope, source)?;
                Some(self.to_len(n, self.offset)?)
            }
            Repeat::UntilEnd => None,
        };
        let repeated = group.repeat != Repeat::Once;

        let mut done = 0;
        loop {
            match count {
                Some(n) if done == n => return Ok(()),
                Some(n) if repeated && self.view.reported_remaining(self.offset) == 0 => {
                    return Err(self.malformed(
                        self.offset,
                        format!("expected {n} {} elements, found {done}", group.name),
                    ));
                }
                None if self.view.remaining_len(self.offset) == 0 => return Ok(()),
                _ => (),
            }

            let start = self.offset;
            let mut node = DecodedField::node(group.name, path.clone(), self.abs(start), 0);
            let res = match self.walk(&group.catalog, &path, &mut node.children) {
                Ok(()) if repeated && self.offset == start => {
                    Err(self.malformed(start, "repeated element consumed no bytes"))
                }
                res => res,
            };
            node.len = self.offset - start;
            let res = attach(&mut node, res);
            out.push(node);
            res?;
            done += 1;
        }
    }

    fn switch(
        &mut self,
        switch: &SwitchSpec,
        prefix: &str,
        scope: &Scope,
        out: &mut Vec<DecodedField<'a>>,
    ) -> Step {
        let tag = self.source(scope, switch.on)?;
        let path = join(prefix, switch.abbrev);
        let start = self.offset;
        let mut node = DecodedField::node(switch.name, path.clone(), self.abs(start), 0);

        let res = match switch.variants.select(tag) {
            Some(variant) => {
                node.display = Some(Cow::Borrowed(variant.name));
                self.walk(&variant.catalog, &path, &mut node.children)
            }
            None => {
                node.display = Some(switch.variants.lookup(tag));
                Ok(())
            }
        };
        node.len = self.offset - start;
        let res = attach(&mut node, res);
        out.push(node);
        res
    }

    fn tlv(&mut self, spec: &TlvSpec, prefix: &str, out: &mut Vec<DecodedField<'a>>) -> Step {
        let layout = spec.layout;
        let header = layout.header_len();
        let path = join(prefix, spec.abbrev);
        let mut start = self.offset;
        let mut state = TlvState::ReadType;

        loop {
            state = match state {
                TlvState::ReadType => {
                    start = self.offset;
                    let reported = self.view.reported_remaining(start);
                    if reported == 0 {
                        return Ok(());
                    }
                    if reported < header {
                        return Err(self.malformed(
                            start,
                            format!("{reported} trailing bytes are too short for a TLV header"),
                        ));
                    }
                    let typ = self
                        .view
                        .get_uint(start, layout.type_width, layout.order)
                        .map_err(|e| self.read_err(e))?;

                    let name = spec.variants.select(typ).map_or(spec.name, |v| v.name);
                    let label = spec.variants.lookup(typ);
                    let mut node = DecodedField::node(name, path.clone(), self.abs(start), header)
                        .with_display(label.clone());
                    node.push(
                        DecodedField::field(
                            "Type",
                            join(&path, "type"),
                            uint_type(layout.type_width),
                            self.abs(start),
                            layout.type_width,
                            Value::UInt(typ),
                        )
                        .with_display(label),
                    );
                    self.offset = start + layout.type_width;
                    TlvState::ReadLength { node, typ }
                }

                TlvState::ReadLength { mut node, typ } => {
                    let at = self.offset;
                    let declared = match self.view.get_uint(at, layout.length_width, layout.order)
                    {
                        Ok(declared) => declared,
                        Err(e) => return fail(node, self.read_err(e), out),
                    };
                    node.push(DecodedField::field(
                        "Length",
                        join(&path, "length"),
                        uint_type(layout.length_width),
                        self.abs(at),
                        layout.length_width,
                        Value::UInt(declared),
                    ));
                    self.offset = at + layout.length_width;

                    if layout.end_type == Some(typ) {
                        out.push(node);
                        return Ok(());
                    }
                    TlvState::ValidateLength {
                        node,
                        typ,
                        declared,
                    }
                }

                TlvState::ValidateLength {
                    node,
                    typ,
                    declared,
                } => {
                    let value_start = start + header;
                    let remaining = self.view.reported_remaining(value_start);
                    let value_len = if layout.length_includes_header {
                        declared.checked_sub(header as u64)
                    } else {
                        Some(declared)
                    };
                    let checked = match value_len.map(usize::try_from) {
                        None => Err(format!(
                            "TLV length {declared} is less than the {header} byte header"
                        )),
                        Some(Ok(n)) if n <= remaining => Ok(n),
                        Some(_) => Err(format!(
                            "TLV length {declared} exceeds the {remaining} bytes remaining"
                        )),
                    };
                    match checked {
                        Ok(n) if value_start + n > self.view.captured_len() => {
                            let diag = Diagnostic::truncated(
                                self.abs(value_start),
                                format!("TLV value of {n} bytes was not captured"),
                            );
                            return fail(node, Stop::new(diag), out);
                        }
                        Ok(value_len) => TlvState::ReadValue {
                            node,
                            typ,
                            value_len,
                        },
                        Err(message) => {
                            let stop = self.malformed(start + layout.type_width, message);
                            return fail(node, stop, out);
                        }
                    }
                }

                TlvState::ReadValue {
                    mut node,
                    typ,
                    value_len,
                } => {
                    let value_start = self.offset;
                    let value = match self.view.subset(value_start, value_len) {
                        Ok(value) => value,
                        Err(e) => return fail(node, self.read_err(e), out),
                    };
                    let mut inner = Walker {
                        view: value,
                        offset: 0,
                        tlv_value: Some(value_len),
                    };
                    let res = match spec.variants.select(typ) {
                        Some(variant) => inner.walk(&variant.catalog, &path, &mut node.children),
                        None => match value.get_bytes(0, value_len) {
                            Ok(bytes) => {
                                node.push(DecodedField::field(
                                    "Value",
                                    join(&path, "value"),
                                    FieldType::Bytes,
                                    value.base(),
                                    value_len,
                                    Value::Bytes(bytes),
                                ));
                                Ok(())
                            }
                            Err(e) => Err(inner.read_err(e)),
                        },
                    };
                    if let Err(stop) = res {
                        return fail(node, stop, out);
                    }
                    node.len = header + value_len;
                    TlvState::Advance {
                        node,
                        next: value_start + value_len,
                    }
                }

                TlvState::Advance { node, next } => {
                    out.push(node);
                    self.offset = next;
                    TlvState::ReadType
                }
            };
        }
    }
}

fn join(prefix: &str, abbrev: &str) -> String {
    if prefix.is_empty() {
        abbrev.to_string()
    } else {
        format!("{prefix}.{abbrev}")
    }
}

fn uint_type(width: usize) -> FieldType {
    match width {
        1 => FieldType::U8,
        2 => FieldType::U16,
        3 => FieldType::U24,
        4 => FieldType::U32,
        _ => FieldType::U64,
    }
}

fn numeric_field<'a>(
    spec: &FieldSpec,
    abbrev: &str,
    start: usize,
    len: usize,
    value: u64,
) -> DecodedField<'a> {
    let decoded = match spec.typ {
        FieldType::Boolean => Value::Bool(value != 0),
        _ => Value::UInt(value),
    };
    let mut field = DecodedField::field(spec.name, abbrev, spec.typ, start, len, decoded);
    field.display = spec.table.map(|table| table.lookup(value));
    field
}

/// Attaches the diagnostic of a failed step to `node`, unless a node further down has it.
fn attach(node: &mut DecodedField<'_>, res: Step) -> Step {
    res.map_err(|mut stop| {
        if !stop.attached {
            node.diagnostic = Some(stop.diag.clone());
            stop.attached = true;
        }
        stop
    })
}

fn fail<'a>(mut node: DecodedField<'a>, stop: Stop, out: &mut Vec<DecodedField<'a>>) -> Step {
    let res = attach(&mut node, Err(stop));
    out.push(node);
    res
}
