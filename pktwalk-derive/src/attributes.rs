use syn::meta::ParseNestedMeta;
use syn::parse::Parse;
use syn::punctuated::Punctuated;

use crate::util::*;

/// A set of options which is filled in one `key` or `key = value` item at a time.
pub(crate) trait FromMeta: Default {
    fn accept(&mut self, meta: ParseNestedMeta) -> syn::Result<()>;
}

/// Collects the options of every `#[pktwalk(...)]` attribute in `attrs`. Other attributes, such
/// as doc comments, are skipped.
pub(crate) fn parse_options<T: FromMeta>(attrs: &[syn::Attribute]) -> syn::Result<T> {
    let mut opts = T::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("pktwalk")) {
        attr.parse_nested_meta(|meta| opts.accept(meta))?;
    }
    Ok(opts)
}

/// Options for the type deriving `Catalog` or `Variants`.
#[derive(Debug, Clone, Default)]
pub(crate) struct ContainerOptions {
    /// Display name of the catalog, e.g. "User Datagram Protocol".
    pub(crate) name: Option<String>,
    /// Filter key segment, e.g. "udp".
    pub(crate) abbrev: Option<String>,
}

/// Options for a field. A field may be a named field or a unit tuple element, in a struct or an
/// enum variant.
#[derive(Debug, Clone, Default)]
pub(crate) struct FieldOptions {
    /// Custom display name for the field.
    pub(crate) rename: Option<String>,
    /// Custom filter key segment for the field.
    pub(crate) abbrev: Option<String>,
    /// Overrides the wire type inferred from the Rust type, e.g. "u24" or "ether".
    pub(crate) typ: Option<syn::LitStr>,
    pub(crate) enc: Option<Encoding>,
    pub(crate) mask: Option<syn::LitInt>,
    /// Path to a `pktwalk::ValueTable` static.
    pub(crate) lookup: Option<syn::Path>,
    /// A type deriving `Catalog` whose masked fields become sub-fields of this one.
    pub(crate) bits: Option<syn::Type>,
    /// An earlier integer field holding the byte length (for bytes and strings) or the element
    /// count (for lists).
    pub(crate) len_field: Option<syn::Ident>,
    /// Width in bytes of an integer length prefix.
    pub(crate) prefix: Option<syn::LitInt>,
    pub(crate) delimiter: Option<u8>,
    pub(crate) line: bool,
    pub(crate) rest: bool,
    /// An earlier integer field which selects the variant of this field.
    pub(crate) dispatch: Option<syn::Ident>,
    /// Path to a `pktwalk::TlvLayout` constant. Only valid on lists of enums.
    pub(crate) tlv: Option<syn::Path>,
}

/// Options for an enum variant.
#[derive(Debug, Clone, Default)]
pub(crate) struct VariantOptions {
    pub(crate) rename: Option<String>,
    pub(crate) abbrev: Option<String>,
    pub(crate) tags: Vec<u64>,
    pub(crate) default: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Encoding {
    Big,
    Little,
    Native,
}

impl Parse for Encoding {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let lit: syn::LitStr = input.parse()?;
        match lit.value().as_str() {
            "be" | "big" => Ok(Encoding::Big),
            "le" | "little" => Ok(Encoding::Little),
            "native" => Ok(Encoding::Native),
            _ => make_err(&lit, "expected one of \"be\", \"le\" or \"native\""),
        }
    }
}

fn key(meta: &ParseNestedMeta) -> String {
    meta.path
        .get_ident()
        .map(ToString::to_string)
        .unwrap_or_default()
}

fn unknown(meta: &ParseNestedMeta) -> syn::Result<()> {
    Err(meta.error("unrecognized attribute"))
}

fn value<T: Parse>(meta: &ParseNestedMeta) -> syn::Result<T> {
    meta.value()?.parse()
}

fn string(meta: &ParseNestedMeta) -> syn::Result<String> {
    Ok(value::<syn::LitStr>(meta)?.value())
}

/// Parses the Rust syntax held in a string, e.g. `lookup = "crate::OPCODES"`.
fn quoted<T: Parse>(meta: &ParseNestedMeta) -> syn::Result<T> {
    value::<syn::LitStr>(meta)?.parse()
}

/// A bare `key` is true. `key = false` spells out the default.
fn flag(meta: &ParseNestedMeta) -> syn::Result<bool> {
    if meta.input.peek(syn::Token![=]) {
        Ok(value::<syn::LitBool>(meta)?.value)
    } else {
        Ok(true)
    }
}

/// Either one integer or a bracketed list of them.
fn tags(meta: &ParseNestedMeta) -> syn::Result<Vec<u64>> {
    let input = meta.value()?;
    let lits: Vec<syn::LitInt> = if input.peek(syn::token::Bracket) {
        let content;
        syn::bracketed!(content in input);
        Punctuated::<syn::LitInt, syn::Token![,]>::parse_terminated(&content)?
            .into_iter()
            .collect()
    } else {
        vec![input.parse()?]
    };
    if lits.is_empty() {
        return Err(meta.error("expected at least one tag"));
    }
    lits.iter().map(|lit| lit.base10_parse::<u64>()).collect()
}

impl FromMeta for ContainerOptions {
    fn accept(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        match key(&meta).as_str() {
            "name" => self.name = Some(string(&meta)?),
            "abbrev" => self.abbrev = Some(string(&meta)?),
            _ => return unknown(&meta),
        }
        Ok(())
    }
}

impl FromMeta for FieldOptions {
    fn accept(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        match key(&meta).as_str() {
            "rename" => self.rename = Some(string(&meta)?),
            "abbrev" => self.abbrev = Some(string(&meta)?),
            "typ" => self.typ = Some(value(&meta)?),
            "enc" => self.enc = Some(value(&meta)?),
            "mask" => {
                let mask: syn::LitInt = value(&meta)?;
                mask.base10_parse::<u64>()?;
                self.mask = Some(mask);
            }
            "lookup" => self.lookup = Some(quoted(&meta)?),
            "bits" => self.bits = Some(quoted(&meta)?),
            "len_field" => self.len_field = Some(quoted(&meta)?),
            "prefix" => {
                let width: syn::LitInt = value(&meta)?;
                if !(1..=8).contains(&width.base10_parse::<usize>()?) {
                    return make_err(&width, "prefix width must be 1 to 8 bytes");
                }
                self.prefix = Some(width);
            }
            "delimiter" => self.delimiter = Some(value::<syn::LitByte>(&meta)?.value()),
            "line" => self.line = flag(&meta)?,
            "rest" => self.rest = flag(&meta)?,
            "dispatch_field" => self.dispatch = Some(quoted(&meta)?),
            "tlv" => self.tlv = Some(quoted(&meta)?),
            _ => return unknown(&meta),
        }
        Ok(())
    }
}

impl FromMeta for VariantOptions {
    fn accept(&mut self, meta: ParseNestedMeta) -> syn::Result<()> {
        match key(&meta).as_str() {
            "rename" => self.rename = Some(string(&meta)?),
            "abbrev" => self.abbrev = Some(string(&meta)?),
            "tag" => self.tags.extend(tags(&meta)?),
            "default" => self.default = flag(&meta)?,
            _ => return unknown(&meta),
        }
        Ok(())
    }
}
