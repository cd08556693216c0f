//! This crate provides the derive macros for [pktwalk](http://docs.rs/pktwalk), which turn
//! annotated Rust types into immutable field catalogs.

use proc_macro::TokenStream;
use quote::quote;

mod attributes;
mod model;
mod util;

use crate::attributes::*;
use crate::model::*;
use crate::util::*;

/// Derives `pktwalk::Catalog` for a struct. Each field becomes one catalog item, in declaration
/// order.
#[proc_macro_derive(Catalog, attributes(pktwalk))]
pub fn derive_catalog(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    let ret = derive_catalog_impl(&input).unwrap_or_else(|e| e.to_compile_error());
    ret.into()
}

fn derive_catalog_impl(input: &syn::DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let data = match &input.data {
        syn::Data::Enum(_) | syn::Data::Union(_) => {
            return make_err(&input.ident, "only structs can derive Catalog");
        }
        syn::Data::Struct(data) => data,
    };
    if !input.generics.params.is_empty() {
        return make_err(&input.generics, "generic types cannot derive Catalog");
    }

    let opts = parse_options::<ContainerOptions>(&input.attrs)?;
    let name = opts
        .name
        .unwrap_or_else(|| title_case(&input.ident));
    let abbrev = opts
        .abbrev
        .unwrap_or_else(|| snake_case(&input.ident));

    let fields = fields_from(&data.fields, &name, &abbrev)?;
    let build = catalog_expr(&name, &abbrev, &fields)?;

    let ident = &input.ident;
    let ident_str = ident.to_string();

    Ok(quote! {
        impl pktwalk::Catalog for #ident {
            fn catalog() -> &'static pktwalk::FieldCatalog {
                fn build() -> ::std::result::Result<pktwalk::FieldCatalog, pktwalk::SpecError> {
                    ::std::result::Result::Ok(#build)
                }
                static CATALOG: pktwalk::__private::Lazy<pktwalk::FieldCatalog> =
                    pktwalk::__private::Lazy::new(|| {
                        build().unwrap_or_else(|e| panic!("invalid catalog for `{}`: {}", #ident_str, e))
                    });
                &CATALOG
            }
        }
    })
}

/// Derives `pktwalk::Variants` for an enum. Each variant is selected by one or more tags, or is
/// the default for tags nothing else claims.
#[proc_macro_derive(Variants, attributes(pktwalk))]
pub fn derive_variants(input: TokenStream) -> TokenStream {
    let input = syn::parse_macro_input!(input as syn::DeriveInput);
    let ret = derive_variants_impl(&input).unwrap_or_else(|e| e.to_compile_error());
    ret.into()
}

fn derive_variants_impl(input: &syn::DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let data = match &input.data {
        syn::Data::Struct(_) | syn::Data::Union(_) => {
            return make_err(&input.ident, "only enums can derive Variants");
        }
        syn::Data::Enum(data) => data,
    };
    if !input.generics.params.is_empty() {
        return make_err(&input.generics, "generic types cannot derive Variants");
    }
    if data.variants.is_empty() {
        return make_err(&input.ident, "expected at least one variant");
    }

    let opts = parse_options::<ContainerOptions>(&input.attrs)?;
    if opts.abbrev.is_some() {
        return make_err(&input.ident, "`abbrev` is not used on enums");
    }
    let name = opts
        .name
        .unwrap_or_else(|| title_case(&input.ident));

    let build = variants_expr(&name, data)?;

    let ident = &input.ident;
    let ident_str = ident.to_string();

    Ok(quote! {
        impl pktwalk::Variants for #ident {
            fn variants() -> &'static pktwalk::VariantCatalog {
                fn build() -> ::std::result::Result<pktwalk::VariantCatalog, pktwalk::SpecError> {
                    ::std::result::Result::Ok(#build)
                }
                static VARIANTS: pktwalk::__private::Lazy<pktwalk::VariantCatalog> =
                    pktwalk::__private::Lazy::new(|| {
                        build().unwrap_or_else(|e| panic!("invalid variants for `{}`: {}", #ident_str, e))
                    });
                &VARIANTS
            }
        }
    })
}
