//! Message derive implementation.
//!
//! Both derives emit a single trait impl whose associated `Result` type is
//! read from the `result = "…"` attribute string and parsed as a type.
//! The message's data shape is irrelevant to the contract, so structs and
//! enums are both accepted.

use proc_macro2::TokenStream;
use quote::quote;
use syn::{DeriveInput, Type, parse_quote};

/// Which message contract to implement.
pub enum Kind {
    Command,
    Query,
}

impl Kind {
    fn attr_name(&self) -> &'static str {
        match self {
            Kind::Command => "command",
            Kind::Query => "query",
        }
    }
}

pub fn derive_message(input: &DeriveInput, kind: Kind) -> syn::Result<TokenStream> {
    let result_ty = parse_result_attr(input, &kind)?;
    let result_ty: Type = match (result_ty, &kind) {
        (Some(ty), _) => ty,
        (None, Kind::Command) => parse_quote! { () },
        (None, Kind::Query) => {
            return Err(syn::Error::new(
                input.ident.span(),
                "#[derive(Query)] requires `#[query(result = \"…\")]`; \
                 a query without a result has nothing to return",
            ));
        }
    };

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let tokens = match kind {
        Kind::Command => quote! {
            impl #impl_generics ::legate_core::message::Command for #name #ty_generics #where_clause {
                type Result = #result_ty;
            }
        },
        Kind::Query => quote! {
            impl #impl_generics ::legate_core::message::Query for #name #ty_generics #where_clause {
                type Result = #result_ty;
            }
        },
    };
    Ok(tokens)
}

fn parse_result_attr(input: &DeriveInput, kind: &Kind) -> syn::Result<Option<Type>> {
    let mut result: Option<Type> = None;
    for attr in &input.attrs {
        if !attr.path().is_ident(kind.attr_name()) {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("result") {
                let value = meta.value()?.parse::<syn::LitStr>()?;
                result = Some(value.parse()?);
                Ok(())
            } else {
                Err(meta.error("unsupported key; expected `result = \"…\"`"))
            }
        })?;
    }
    Ok(result)
}
