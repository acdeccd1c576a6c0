//! Derive macros for osp-core archetypes.
//!
//! This crate provides the `#[derive(Archetype)]` macro for implementing the
//! `Archetype` trait on user payload types.
//!
//! # Example
//!
//! ```ignore
//! use osp_core::Archetype;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Archetype, Serialize, Deserialize)]
//! #[archetype(node, parent = "Place")]
//! struct City {
//!     name: String,
//!     population: u64,
//! }
//!
//! #[derive(Archetype, Serialize, Deserialize)]
//! #[archetype(walker, name = "Census")]
//! struct CensusWalker {
//!     total: u64,
//! }
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, Error, LitStr};

/// Derive macro for implementing the `Archetype` trait.
///
/// # Attributes
///
/// - `#[archetype(node)]`, `#[archetype(edge)]` or `#[archetype(walker)]` -
///   Required. The entity family.
/// - `#[archetype(name = "...")]` - Dispatch name; defaults to the type name.
/// - `#[archetype(parent = "...")]` - Declared parent archetype; defaults to
///   the family's base type.
///
/// The type must also implement serde's `Serialize` and `Deserialize`.
#[proc_macro_derive(Archetype, attributes(archetype))]
pub fn derive_archetype(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match derive_archetype_impl(input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn derive_archetype_impl(input: DeriveInput) -> Result<TokenStream2, Error> {
    let ident = &input.ident;
    let attrs = parse_archetype_attrs(&input)?;

    let kind = match attrs.kind {
        Some(Kind::Node) => quote! { ::osp_core::anchor::ArchetypeKind::Node },
        Some(Kind::Edge) => quote! { ::osp_core::anchor::ArchetypeKind::Edge },
        Some(Kind::Walker) => quote! { ::osp_core::anchor::ArchetypeKind::Walker },
        None => {
            return Err(Error::new(
                ident.span(),
                "Missing #[archetype(node | edge | walker)] attribute",
            ))
        }
    };

    let name = attrs.name.unwrap_or_else(|| ident.to_string());
    if name.is_empty() {
        return Err(Error::new(ident.span(), "archetype name cannot be empty"));
    }
    if attrs.parent.as_deref() == Some(name.as_str()) {
        return Err(Error::new(ident.span(), "an archetype cannot be its own parent"));
    }
    let parent = match &attrs.parent {
        Some(parent) => quote! { ::std::option::Option::Some(#parent) },
        None => quote! { ::std::option::Option::None },
    };

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    Ok(quote! {
        impl #impl_generics ::osp_core::anchor::Archetype for #ident #ty_generics #where_clause {
            const NAME: &'static str = #name;
            const KIND: ::osp_core::anchor::ArchetypeKind = #kind;
            const PARENT: ::std::option::Option<&'static str> = #parent;
        }
    })
}

/// Entity family named in the attribute.
#[derive(Clone, Copy)]
enum Kind {
    Node,
    Edge,
    Walker,
}

/// Parsed `#[archetype(...)]` attributes.
#[derive(Default)]
struct ArchetypeAttrs {
    kind: Option<Kind>,
    name: Option<String>,
    parent: Option<String>,
}

/// Parse #[archetype(...)] attributes.
fn parse_archetype_attrs(input: &DeriveInput) -> Result<ArchetypeAttrs, Error> {
    let mut result = ArchetypeAttrs::default();

    for attr in &input.attrs {
        if !attr.path().is_ident("archetype") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            let kind = if meta.path.is_ident("node") {
                Some(Kind::Node)
            } else if meta.path.is_ident("edge") {
                Some(Kind::Edge)
            } else if meta.path.is_ident("walker") {
                Some(Kind::Walker)
            } else {
                None
            };

            if let Some(kind) = kind {
                if result.kind.is_some() {
                    return Err(meta.error("archetype kind given more than once"));
                }
                result.kind = Some(kind);
                Ok(())
            } else if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                result.name = Some(value.value());
                Ok(())
            } else if meta.path.is_ident("parent") {
                let value: LitStr = meta.value()?.parse()?;
                result.parent = Some(value.value());
                Ok(())
            } else {
                Err(meta.error(
                    "unknown archetype attribute, expected 'node', 'edge', 'walker', 'name', or 'parent'",
                ))
            }
        })?;
    }

    Ok(result)
}
