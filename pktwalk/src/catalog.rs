//! Ordered field catalogs and the items they are made of.

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::error::SpecError;
use crate::field::{FieldSpec, LengthRule};
use crate::view::ByteOrder;

/// Implemented by types describing a fixed layout, usually through `#[derive(Catalog)]`.
pub trait Catalog {
    fn catalog() -> &'static FieldCatalog;
}

/// Implemented by types describing a tagged choice of layouts, usually through
/// `#[derive(Variants)]`.
pub trait Variants {
    fn variants() -> &'static VariantCatalog;
}

/// An ordered, immutable sequence of items. Cloning is cheap.
#[derive(Clone)]
pub struct FieldCatalog(Arc<CatalogInner>);

struct CatalogInner {
    name: &'static str,
    abbrev: &'static str,
    items: Vec<Item>,
}

impl FieldCatalog {
    pub fn builder(name: &'static str, abbrev: &'static str) -> CatalogBuilder {
        CatalogBuilder {
            name,
            abbrev,
            items: Vec::new(),
        }
    }

    /// Display name, e.g. "User Datagram Protocol".
    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// Filter key prefix of everything decoded from this catalog, e.g. "udp".
    pub fn abbrev(&self) -> &'static str {
        self.0.abbrev
    }

    pub fn items(&self) -> &[Item] {
        &self.0.items
    }

    pub fn is_empty(&self) -> bool {
        self.0.items.is_empty()
    }
}

impl fmt::Debug for FieldCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCatalog")
            .field("name", &self.0.name)
            .field("abbrev", &self.0.abbrev)
            .field("items", &self.0.items)
            .finish()
    }
}

/// One step of a catalog.
#[derive(Debug, Clone)]
pub enum Item {
    Field(FieldSpec),
    Group(GroupSpec),
    Switch(SwitchSpec),
    Tlv(TlvSpec),
}

impl Item {
    pub fn abbrev(&self) -> &'static str {
        match self {
            Item::Field(spec) => spec.abbrev,
            Item::Group(group) => group.abbrev,
            Item::Switch(switch) => switch.abbrev,
            Item::Tlv(tlv) => tlv.abbrev,
        }
    }
}

/// How many times a group is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Once,
    Count(CountRule),
    /// Until the captured data runs out.
    UntilEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountRule {
    Fixed(usize),
    /// The value of an earlier integer sibling, by abbreviation.
    Field(&'static str),
}

/// A nested catalog, shown as a subtree.
#[derive(Debug, Clone)]
pub struct GroupSpec {
    pub(crate) name: &'static str,
    pub(crate) abbrev: &'static str,
    pub(crate) catalog: FieldCatalog,
    pub(crate) repeat: Repeat,
}

impl GroupSpec {
    pub fn once(name: &'static str, abbrev: &'static str, catalog: FieldCatalog) -> Self {
        Self::repeated(name, abbrev, catalog, Repeat::Once)
    }

    /// Each element becomes a sibling subtree with the same name.
    pub fn repeated(
        name: &'static str,
        abbrev: &'static str,
        catalog: FieldCatalog,
        repeat: Repeat,
    ) -> Self {
        Self {
            name,
            abbrev,
            catalog,
            repeat,
        }
    }
}

/// Picks one of several catalogs based on the value of an earlier integer sibling.
#[derive(Debug, Clone)]
pub struct SwitchSpec {
    pub(crate) name: &'static str,
    pub(crate) abbrev: &'static str,
    pub(crate) on: &'static str,
    pub(crate) variants: VariantCatalog,
}

impl SwitchSpec {
    pub fn new(
        name: &'static str,
        abbrev: &'static str,
        on: &'static str,
        variants: VariantCatalog,
    ) -> Self {
        Self {
            name,
            abbrev,
            on,
            variants,
        }
    }
}

/// Framing of a type-length-value sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvLayout {
    pub(crate) type_width: usize,
    pub(crate) length_width: usize,
    pub(crate) order: ByteOrder,
    pub(crate) length_includes_header: bool,
    pub(crate) end_type: Option<u64>,
}

impl TlvLayout {
    /// Big-endian type and length fields of the given widths, with the length counting only the
    /// value.
    pub const fn new(type_width: usize, length_width: usize) -> Self {
        Self {
            type_width,
            length_width,
            order: ByteOrder::Big,
            length_includes_header: false,
            end_type: None,
        }
    }

    pub const fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    /// The length field counts the type and length fields too.
    pub const fn including_header(mut self) -> Self {
        self.length_includes_header = true;
        self
    }

    /// A TLV of this type ends the sequence. Its value is not decoded.
    pub const fn with_end_type(mut self, end_type: u64) -> Self {
        self.end_type = Some(end_type);
        self
    }

    pub const fn header_len(&self) -> usize {
        self.type_width + self.length_width
    }
}

/// A TLV loop: values are decoded with the variant matching their type.
#[derive(Debug, Clone)]
pub struct TlvSpec {
    pub(crate) name: &'static str,
    pub(crate) abbrev: &'static str,
    pub(crate) layout: TlvLayout,
    pub(crate) variants: VariantCatalog,
}

impl TlvSpec {
    pub fn new(
        name: &'static str,
        abbrev: &'static str,
        layout: TlvLayout,
        variants: VariantCatalog,
    ) -> Self {
        Self {
            name,
            abbrev,
            layout,
            variants,
        }
    }
}

pub struct CatalogBuilder {
    name: &'static str,
    abbrev: &'static str,
    items: Vec<Item>,
}

impl CatalogBuilder {
    pub fn item(mut self, item: Item) -> Self {
        self.items.push(item);
        self
    }

    pub fn field(self, spec: FieldSpec) -> Self {
        self.item(Item::Field(spec))
    }

    pub fn group(self, group: GroupSpec) -> Self {
        self.item(Item::Group(group))
    }

    pub fn switch(self, switch: SwitchSpec) -> Self {
        self.item(Item::Switch(switch))
    }

    pub fn tlv(self, tlv: TlvSpec) -> Self {
        self.item(Item::Tlv(tlv))
    }

    /// Checks every item, and that items which depend on earlier siblings can find them.
    pub fn build(self) -> Result<FieldCatalog, SpecError> {
        let mut abbrevs = HashSet::new();
        // integer fields seen so far, which later items may refer to
        let mut providers: Vec<&'static str> = Vec::new();

        for item in &self.items {
            if !abbrevs.insert(item.abbrev()) {
                return Err(SpecError::DuplicateAbbrev {
                    catalog: self.abbrev,
                    abbrev: item.abbrev(),
                });
            }

            let needs = |field: &'static str, source: &'static str| {
                if providers.contains(&source) {
                    Ok(())
                } else {
                    Err(SpecError::UnknownSource {
                        field,
                        source_field: source,
                    })
                }
            };

            match item {
                Item::Field(spec) => {
                    spec.validate()?;
                    if let Some(LengthRule::Field(source)) = spec.length {
                        needs(spec.abbrev, source)?;
                    }
                }
                Item::Group(group) => {
                    if let Repeat::Count(CountRule::Field(source)) = group.repeat {
                        needs(group.abbrev, source)?;
                    }
                }
                Item::Switch(switch) => needs(switch.abbrev, switch.on)?,
                Item::Tlv(tlv) => {
                    let layout = &tlv.layout;
                    let reason = if !(1..=8).contains(&layout.type_width) {
                        Some("type width must be 1 to 8 bytes")
                    } else if !(1..=8).contains(&layout.length_width) {
                        Some("length width must be 1 to 8 bytes")
                    } else {
                        None
                    };
                    if let Some(reason) = reason {
                        return Err(SpecError::InvalidTlvLayout {
                            field: tlv.abbrev,
                            reason,
                        });
                    }
                }
            }

            if let Item::Field(spec) = item {
                if spec.typ.is_numeric() {
                    providers.push(spec.abbrev);
                }
            }
        }

        Ok(FieldCatalog(Arc::new(CatalogInner {
            name: self.name,
            abbrev: self.abbrev,
            items: self.items,
        })))
    }
}

/// One choice of a [`VariantCatalog`].
#[derive(Debug, Clone)]
pub struct Variant {
    pub(crate) name: &'static str,
    pub(crate) abbrev: &'static str,
    pub(crate) catalog: FieldCatalog,
}

impl Variant {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn abbrev(&self) -> &'static str {
        self.abbrev
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }
}

/// Maps tags to catalogs. Used by switches (tag from a sibling field) and TLV loops (tag from
/// the type field). Cloning is cheap.
#[derive(Clone)]
pub struct VariantCatalog(Arc<VariantInner>);

struct VariantInner {
    name: &'static str,
    tags: Vec<(u64, usize)>,
    variants: Vec<Variant>,
    default: Option<usize>,
}

impl VariantCatalog {
    pub fn builder(name: &'static str) -> VariantCatalogBuilder {
        VariantCatalogBuilder {
            name,
            tags: Vec::new(),
            variants: Vec::new(),
            default: None,
            duplicate_default: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    /// The variant claiming `tag`, else the default variant if there is one.
    pub fn select(&self, tag: u64) -> Option<&Variant> {
        self.0
            .tags
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, i)| *i)
            .or(self.0.default)
            .and_then(|i| self.0.variants.get(i))
    }

    /// Label for `tag`: the name of an exact match, else `Unknown (0x..)`. The default variant
    /// does not lend its name, as it usually stands for "anything else".
    pub fn lookup(&self, tag: u64) -> Cow<'static, str> {
        let exact = self.0.tags.iter().find(|(t, _)| *t == tag);
        match exact.and_then(|(_, i)| self.0.variants.get(*i)) {
            Some(variant) => Cow::Borrowed(variant.name),
            None => Cow::Owned(format!("Unknown (0x{tag:x})")),
        }
    }

    pub fn variants(&self) -> &[Variant] {
        &self.0.variants
    }
}

impl fmt::Debug for VariantCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VariantCatalog")
            .field("name", &self.0.name)
            .field("tags", &self.0.tags)
            .field("default", &self.0.default)
            .finish_non_exhaustive()
    }
}

pub struct VariantCatalogBuilder {
    name: &'static str,
    tags: Vec<(u64, usize)>,
    variants: Vec<Variant>,
    default: Option<usize>,
    duplicate_default: bool,
}

impl VariantCatalogBuilder {
    pub fn variant(
        mut self,
        tags: &[u64],
        name: &'static str,
        abbrev: &'static str,
        catalog: FieldCatalog,
    ) -> Self {
        let idx = self.variants.len();
        self.variants.push(Variant {
            name,
            abbrev,
            catalog,
        });
        self.tags.extend(tags.iter().map(|t| (*t, idx)));
        self
    }

    /// Selected for any tag no other variant claims.
    pub fn default_variant(
        mut self,
        name: &'static str,
        abbrev: &'static str,
        catalog: FieldCatalog,
    ) -> Self {
        if self.default.is_some() {
            self.duplicate_default = true;
        }
        self.default = Some(self.variants.len());
        self.variants.push(Variant {
            name,
            abbrev,
            catalog,
        });
        self
    }

    pub fn build(self) -> Result<VariantCatalog, SpecError> {
        if self.duplicate_default {
            return Err(SpecError::DuplicateDefault { catalog: self.name });
        }
        let mut seen = HashSet::new();
        for (tag, _) in &self.tags {
            if !seen.insert(*tag) {
                return Err(SpecError::DuplicateTag {
                    catalog: self.name,
                    tag: *tag,
                });
            }
        }
        Ok(VariantCatalog(Arc::new(VariantInner {
            name: self.name,
            tags: self.tags,
            variants: self.variants,
            default: self.default,
        })))
    }
}
