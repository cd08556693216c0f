use std::collections::HashSet;

use proc_macro2::TokenStream;
use quote::quote;

use crate::attributes::*;
use crate::util::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IntType {
    U8,
    U16,
    U32,
    U64,
}

impl IntType {
    fn bits(self) -> u32 {
        match self {
            IntType::U8 => 8,
            IntType::U16 => 16,
            IntType::U32 => 32,
            IntType::U64 => 64,
        }
    }

    fn field_type(self) -> TokenStream {
        match self {
            IntType::U8 => quote! { U8 },
            IntType::U16 => quote! { U16 },
            IntType::U32 => quote! { U32 },
            IntType::U64 => quote! { U64 },
        }
    }
}

/// How a Rust field type maps onto the wire.
#[derive(Debug, Clone)]
pub(crate) enum FieldKind {
    Int(IntType),
    Bool,
    Ipv4,
    Ipv6,
    /// `[u8; N]`, holding the length expression.
    ByteArray(syn::Expr),
    /// `Vec<u8>`
    ByteVec,
    /// `String`
    Text,
    /// `Vec<T>` for any other `T`.
    List(syn::Type),
    /// A user-defined type deriving `Catalog` or `Variants`.
    Nested(syn::Type),
}

impl FieldKind {
    pub(crate) fn from_type(ty: &syn::Type) -> syn::Result<Self> {
        use FieldKind::*;
        use IntType::*;

        match ty {
            syn::Type::Array(arr) => {
                if is_ident(&arr.elem, "u8") {
                    Ok(ByteArray(arr.len.clone()))
                } else {
                    make_err(ty, "only byte arrays are supported, consider Vec<T> instead")
                }
            }
            syn::Type::Paren(inner) => Self::from_type(&inner.elem),
            syn::Type::Path(tp) if tp.qself.is_none() => {
                let Some(seg) = tp.path.segments.last() else {
                    return make_err(ty, "expected a type");
                };
                let kind = match seg.ident.to_string().as_str() {
                    "u8" => Int(U8),
                    "u16" => Int(U16),
                    "u32" => Int(U32),
                    "u64" => Int(U64),
                    "bool" => Bool,
                    "Ipv4Addr" => Ipv4,
                    "Ipv6Addr" => Ipv6,
                    "String" => Text,
                    "Vec" => match single_generic(seg) {
                        Some(elem) if is_ident(elem, "u8") => ByteVec,
                        Some(elem) => List(elem.clone()),
                        None => return make_err(ty, "expected Vec<T>"),
                    },
                    "i8" | "i16" | "i32" | "i64" | "i128" | "u128" | "isize" | "usize" | "f32"
                    | "f64" | "char" | "str" => {
                        return make_err(ty, "unsupported primitive type");
                    }
                    _ => {
                        if !matches!(seg.arguments, syn::PathArguments::None) {
                            return make_err(ty, "generic field types are not supported");
                        }
                        Nested(ty.clone())
                    }
                };
                Ok(kind)
            }
            _ => make_err(ty, "unsupported field type"),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(self, FieldKind::Int(_))
    }
}

fn is_ident(ty: &syn::Type, name: &str) -> bool {
    matches!(ty, syn::Type::Path(tp) if tp.qself.is_none() && tp.path.is_ident(name))
}

fn single_generic(seg: &syn::PathSegment) -> Option<&syn::Type> {
    match &seg.arguments {
        syn::PathArguments::AngleBracketed(args) if args.args.len() == 1 => {
            match args.args.first() {
                Some(syn::GenericArgument::Type(ty)) => Some(ty),
                _ => None,
            }
        }
        _ => None,
    }
}

/// One field of a struct or enum variant, lowered to what the catalog needs.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    /// What sibling attributes such as `len_field` refer to this field by.
    key: String,
    name: String,
    abbrev: String,
    ty: syn::Type,
    kind: FieldKind,
    options: FieldOptions,
}

impl Field {
    fn from_named(field: &syn::Field) -> syn::Result<Self> {
        let Some(ident) = &field.ident else {
            return make_err(field, "expected a named field");
        };
        let options = parse_options::<FieldOptions>(&field.attrs)?;
        let key = ident.to_string();
        let name = options
            .rename
            .clone()
            .unwrap_or_else(|| title_case(&ident));
        let abbrev = options
            .abbrev
            .clone()
            .unwrap_or_else(|| snake_case(&ident));
        Ok(Field {
            key,
            name,
            abbrev,
            ty: field.ty.clone(),
            kind: FieldKind::from_type(&field.ty)?,
            options,
        })
    }

    /// A unit tuple element takes its name from the type or variant that holds it.
    fn from_unit(field: &syn::Field, name: &str, abbrev: &str) -> syn::Result<Self> {
        let options = parse_options::<FieldOptions>(&field.attrs)?;
        let name = options.rename.clone().unwrap_or_else(|| name.to_string());
        let abbrev = options.abbrev.clone().unwrap_or_else(|| abbrev.to_string());
        Ok(Field {
            key: abbrev.clone(),
            name,
            abbrev,
            ty: field.ty.clone(),
            kind: FieldKind::from_type(&field.ty)?,
            options,
        })
    }

    /// Rejects attributes which make no sense for this kind of field.
    fn check_applicable(&self) -> syn::Result<()> {
        use FieldKind::*;

        let opts = &self.options;
        let numeric = matches!(self.kind, Int(_) | Bool);
        let variable = matches!(self.kind, ByteVec | Text);
        let list = matches!(self.kind, List(_));

        let checks = [
            (opts.mask.is_some(), numeric, "mask"),
            (opts.lookup.is_some(), numeric, "lookup"),
            (opts.bits.is_some(), self.kind.is_integer(), "bits"),
            (
                opts.enc.is_some(),
                numeric || (variable && opts.prefix.is_some()),
                "enc",
            ),
            (
                opts.typ.is_some(),
                matches!(self.kind, Int(IntType::U32) | ByteArray(_)),
                "typ",
            ),
            (opts.len_field.is_some(), variable || list, "len_field"),
            (opts.prefix.is_some(), variable, "prefix"),
            (opts.delimiter.is_some(), variable, "delimiter"),
            (opts.line, variable, "line"),
            (opts.rest, variable || list, "rest"),
            (
                opts.dispatch.is_some(),
                matches!(self.kind, Nested(_)),
                "dispatch_field",
            ),
            (opts.tlv.is_some(), list, "tlv"),
        ];

        for (present, allowed, attr) in checks {
            if present && !allowed {
                return make_err(&self.ty, &format!("`{attr}` is not valid on this field type"));
            }
        }

        if let Some(mask) = &opts.mask {
            let bits = match (&self.kind, self.wire_typ()) {
                (_, Some("u24")) => 24,
                (Int(int), _) => int.bits(),
                _ => 8,
            };
            let value = mask.base10_parse::<u64>()?;
            if value == 0 {
                return make_err(mask, "mask must not be zero");
            }
            if bits < 64 && value >> bits != 0 {
                return make_err(mask, &format!("mask does not fit in a {bits}-bit field"));
            }
        }

        Ok(())
    }

    fn wire_typ(&self) -> Option<&str> {
        self.options.typ.as_ref().map(|lit| match lit.value().as_str() {
            "u24" => "u24",
            "string" => "string",
            "ether" => "ether",
            _ => "",
        })
    }

    /// Produces the expression for the `pktwalk::Item` describing this field. `earlier` are the
    /// fields preceding it in the same struct or variant.
    fn item(&self, earlier: &[Field]) -> syn::Result<TokenStream> {
        use FieldKind::*;

        let name = &self.name;
        let abbrev = &self.abbrev;
        let ret = match &self.kind {
            Int(int) => {
                let typ = match (int, self.wire_typ()) {
                    (_, None) => int.field_type(),
                    (IntType::U32, Some("u24")) => quote! { U24 },
                    _ => return self.bad_typ(),
                };
                let spec = self.numeric_spec(typ);
                quote! { pktwalk::Item::Field(#spec) }
            }
            Bool => {
                let spec = self.numeric_spec(quote! { Boolean });
                quote! { pktwalk::Item::Field(#spec) }
            }
            Ipv4 => quote! {
                pktwalk::Item::Field(pktwalk::FieldSpec::new(#name, #abbrev, pktwalk::FieldType::Ipv4))
            },
            Ipv6 => quote! {
                pktwalk::Item::Field(pktwalk::FieldSpec::new(#name, #abbrev, pktwalk::FieldType::Ipv6))
            },
            ByteArray(len) => match self.wire_typ() {
                None => quote! {
                    pktwalk::Item::Field(
                        pktwalk::FieldSpec::new(#name, #abbrev, pktwalk::FieldType::Bytes)
                            .with_length(pktwalk::LengthRule::Fixed(#len))
                    )
                },
                Some("string") => quote! {
                    pktwalk::Item::Field(
                        pktwalk::FieldSpec::new(#name, #abbrev, pktwalk::FieldType::String)
                            .with_length(pktwalk::LengthRule::Fixed(#len))
                    )
                },
                Some("ether") => {
                    if let syn::Expr::Lit(syn::ExprLit {
                        lit: syn::Lit::Int(n),
                        ..
                    }) = len
                    {
                        if n.base10_parse::<usize>()? != 6 {
                            return make_err(n, "MAC addresses are 6 bytes long");
                        }
                    }
                    quote! {
                        pktwalk::Item::Field(pktwalk::FieldSpec::new(#name, #abbrev, pktwalk::FieldType::Ether))
                    }
                }
                _ => return self.bad_typ(),
            },
            ByteVec | Text => {
                let typ = match self.kind {
                    ByteVec => quote! { Bytes },
                    _ => quote! { String },
                };
                let rule = self.length_rule(earlier)?;
                quote! {
                    pktwalk::Item::Field(
                        pktwalk::FieldSpec::new(#name, #abbrev, pktwalk::FieldType::#typ)
                            .with_length(#rule)
                    )
                }
            }
            List(elem) => {
                let opts = &self.options;
                match (&opts.tlv, &opts.len_field, opts.rest) {
                    (Some(layout), None, false) => quote! {
                        pktwalk::Item::Tlv(pktwalk::TlvSpec::new(
                            #name,
                            #abbrev,
                            #layout,
                            <#elem as pktwalk::Variants>::variants().clone(),
                        ))
                    },
                    (None, Some(len_field), false) => {
                        let count = provider(earlier, len_field, "len_field")?;
                        quote! {
                            pktwalk::Item::Group(pktwalk::GroupSpec::repeated(
                                #name,
                                #abbrev,
                                <#elem as pktwalk::Catalog>::catalog().clone(),
                                pktwalk::Repeat::Count(pktwalk::CountRule::Field(#count)),
                            ))
                        }
                    }
                    (None, None, true) => quote! {
                        pktwalk::Item::Group(pktwalk::GroupSpec::repeated(
                            #name,
                            #abbrev,
                            <#elem as pktwalk::Catalog>::catalog().clone(),
                            pktwalk::Repeat::UntilEnd,
                        ))
                    },
                    _ => {
                        return make_err(
                            &self.ty,
                            "lists need exactly one of `len_field`, `rest` or `tlv`",
                        )
                    }
                }
            }
            Nested(ty) => match &self.options.dispatch {
                Some(dispatch) => {
                    let on = provider(earlier, dispatch, "dispatch_field")?;
                    quote! {
                        pktwalk::Item::Switch(pktwalk::SwitchSpec::new(
                            #name,
                            #abbrev,
                            #on,
                            <#ty as pktwalk::Variants>::variants().clone(),
                        ))
                    }
                }
                None => quote! {
                    pktwalk::Item::Group(pktwalk::GroupSpec::once(
                        #name,
                        #abbrev,
                        <#ty as pktwalk::Catalog>::catalog().clone(),
                    ))
                },
            },
        };
        Ok(ret)
    }

    fn bad_typ<T>(&self) -> syn::Result<T> {
        match &self.options.typ {
            Some(lit) => make_err(lit, "`typ` is not valid for this field type"),
            None => make_err(&self.ty, "`typ` is not valid for this field type"),
        }
    }

    fn numeric_spec(&self, typ: TokenStream) -> TokenStream {
        let name = &self.name;
        let abbrev = &self.abbrev;
        let opts = &self.options;

        let order = opts.enc.map(|enc| {
            let order = encoding_tokens(enc);
            quote! { .with_order(#order) }
        });
        let mask = opts.mask.as_ref().map(|mask| quote! { .with_mask(#mask) });
        let table = opts.lookup.as_ref().map(|path| quote! { .with_table(&#path) });
        let bits = opts.bits.as_ref().map(|ty| {
            quote! { .with_subfields(<#ty as pktwalk::Catalog>::catalog().clone()) }
        });

        quote! {
            pktwalk::FieldSpec::new(#name, #abbrev, pktwalk::FieldType::#typ)
                #order
                #mask
                #table
                #bits
        }
    }

    fn length_rule(&self, earlier: &[Field]) -> syn::Result<TokenStream> {
        let opts = &self.options;
        let given = [
            opts.len_field.is_some(),
            opts.prefix.is_some(),
            opts.delimiter.is_some(),
            opts.line,
            opts.rest,
        ];
        if given.iter().filter(|x| **x).count() != 1 {
            return make_err(
                &self.ty,
                "expected exactly one of `len_field`, `prefix`, `delimiter`, `line` or `rest`",
            );
        }

        let rule = if let Some(len_field) = &opts.len_field {
            let len = provider(earlier, len_field, "len_field")?;
            quote! { pktwalk::LengthRule::Field(#len) }
        } else if let Some(width) = &opts.prefix {
            let width = width.base10_parse::<usize>()?;
            let order = encoding_tokens(opts.enc.unwrap_or(Encoding::Big));
            quote! { pktwalk::LengthRule::Prefixed { width: #width, order: #order } }
        } else if let Some(delimiter) = opts.delimiter {
            quote! { pktwalk::LengthRule::Delimited(#delimiter) }
        } else if opts.line {
            quote! { pktwalk::LengthRule::Line }
        } else {
            quote! { pktwalk::LengthRule::Remaining }
        };
        Ok(rule)
    }
}

fn encoding_tokens(enc: Encoding) -> TokenStream {
    match enc {
        Encoding::Big => quote! { pktwalk::ByteOrder::Big },
        Encoding::Little => quote! { pktwalk::ByteOrder::Little },
        Encoding::Native => quote! { pktwalk::ByteOrder::Native },
    }
}

/// Finds the abbreviation of an earlier integer field, which some later field depends on.
fn provider<'a>(earlier: &'a [Field], ident: &syn::Ident, attr: &str) -> syn::Result<&'a str> {
    let key = ident.to_string();
    match earlier.iter().find(|f| f.key == key) {
        Some(field) if field.kind.is_integer() => Ok(&field.abbrev),
        Some(_) => make_err(
            ident,
            &format!("`{attr}` must name an integer field, found `{key}`"),
        ),
        None => make_err(
            ident,
            &format!("`{attr}` must name an earlier field, `{key}` is not one"),
        ),
    }
}

/// Lowers the fields of a struct or enum variant. `name` and `abbrev` are those of the container,
/// and are given to the single element of a unit tuple.
pub(crate) fn fields_from(fields: &syn::Fields, name: &str, abbrev: &str) -> syn::Result<Vec<Field>> {
    match fields {
        syn::Fields::Named(named) => named.named.iter().map(Field::from_named).collect(),
        syn::Fields::Unnamed(unnamed) => {
            let mut it = unnamed.unnamed.iter();
            match (it.next(), it.next()) {
                (Some(field), None) => Ok(vec![Field::from_unit(field, name, abbrev)?]),
                _ => make_err(fields, "expected only one field in tuple"),
            }
        }
        syn::Fields::Unit => Ok(Vec::new()),
    }
}

/// Checks the fields as a whole. Not exhaustive, as per-field checks happen when generating each
/// item.
pub(crate) fn check_fields(fields: &[Field]) -> syn::Result<()> {
    fn check_abbrevs(fields: &[Field]) -> syn::Result<()> {
        let mut seen = HashSet::new();
        for field in fields {
            if !seen.insert(field.abbrev.as_str()) {
                return make_err(
                    &field.ty,
                    &format!("another field already uses the abbreviation `{}`", field.abbrev),
                );
            }
        }
        Ok(())
    }

    /// Length and dispatch providers must come before the fields which use them.
    fn check_providers(fields: &[Field]) -> syn::Result<()> {
        for (i, field) in fields.iter().enumerate() {
            if let Some(ident) = &field.options.len_field {
                provider(&fields[..i], ident, "len_field")?;
            }
            if let Some(ident) = &field.options.dispatch {
                provider(&fields[..i], ident, "dispatch_field")?;
            }
        }
        Ok(())
    }

    for field in fields {
        field.check_applicable()?;
    }
    check_abbrevs(fields)?;
    check_providers(fields)?;

    Ok(())
}

/// Produces an expression which builds the `FieldCatalog`, propagating `SpecError` with `?`.
pub(crate) fn catalog_expr(name: &str, abbrev: &str, fields: &[Field]) -> syn::Result<TokenStream> {
    check_fields(fields)?;

    let mut items = Vec::with_capacity(fields.len());
    for (i, field) in fields.iter().enumerate() {
        let item = field.item(&fields[..i])?;
        items.push(quote! { .item(#item) });
    }

    Ok(quote! {
        pktwalk::FieldCatalog::builder(#name, #abbrev)
            #(#items)*
            .build()?
    })
}

/// Produces an expression which builds the `VariantCatalog` of an enum.
pub(crate) fn variants_expr(name: &str, data: &syn::DataEnum) -> syn::Result<TokenStream> {
    let mut calls = Vec::with_capacity(data.variants.len());
    let mut tags_seen = HashSet::new();
    let mut has_default = false;

    for variant in &data.variants {
        let opts = parse_options::<VariantOptions>(&variant.attrs)?;
        let vname = opts
            .rename
            .clone()
            .unwrap_or_else(|| title_case(&variant.ident));
        let vabbrev = opts
            .abbrev
            .clone()
            .unwrap_or_else(|| snake_case(&variant.ident));

        let mut tags = opts.tags.clone();
        // Explicit discriminants double as tags for unit variants.
        if let Some((_, syn::Expr::Lit(syn::ExprLit {
            lit: syn::Lit::Int(n),
            ..
        }))) = &variant.discriminant
        {
            if tags.is_empty() {
                tags.push(n.base10_parse::<u64>()?);
            }
        }
        if tags.is_empty() && !opts.default {
            return make_err(variant, "expected a `tag` or `default` attribute");
        }
        for tag in &tags {
            if !tags_seen.insert(*tag) {
                return make_err(variant, &format!("tag {tag} is used by another variant"));
            }
        }

        let fields = fields_from(&variant.fields, &vname, &vabbrev)?;
        let catalog = catalog_expr(&vname, &vabbrev, &fields)?;

        if !tags.is_empty() {
            calls.push(quote! {
                .variant(&[#(#tags),*], #vname, #vabbrev, #catalog)
            });
        }
        if opts.default {
            if has_default {
                return make_err(variant, "only one variant can be the default");
            }
            has_default = true;
            calls.push(quote! {
                .default_variant(#vname, #vabbrev, #catalog)
            });
        }
    }

    Ok(quote! {
        pktwalk::VariantCatalog::builder(#name)
            #(#calls)*
            .build()?
    })
}
