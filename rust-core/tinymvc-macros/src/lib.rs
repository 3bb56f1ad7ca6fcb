//! # tinymvc Macros
//!
//! Procedural macros for the tinymvc framework.
//!
//! ## Provided
//!
//! - `#[derive(Model)]` binds a struct to a table and primary key

use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::quote;
use syn::{parse_macro_input, DeriveInput, LitStr};

/// Derive `tinymvc_core::Model`
///
/// # Usage
///
/// ```ignore
/// #[derive(Model)]
/// #[model(table = "users", primary_key = "id")]
/// struct User {
///     id: i64,
///     name: String,
/// }
/// ```
///
/// Both attributes are optional. The table defaults to the snake_cased
/// type name plus `s` (`BlogPost` -> `blog_posts`), the key to `id`.
#[proc_macro_derive(Model, attributes(model))]
pub fn derive_model(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_model(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_model(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let mut table = None;
    let mut primary_key = None;

    for attr in input.attrs.iter().filter(|a| a.path().is_ident("model")) {
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("table") {
                table = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else if meta.path.is_ident("primary_key") {
                primary_key = Some(meta.value()?.parse::<LitStr>()?);
                Ok(())
            } else {
                Err(meta.error("expected `table` or `primary_key`"))
            }
        })?;
    }

    let table = table.unwrap_or_else(|| {
        LitStr::new(&format!("{}s", snake_case(&name.to_string())), Span::call_site())
    });

    let primary_key = primary_key.map(|pk| {
        quote! { const PRIMARY_KEY: &'static str = #pk; }
    });

    Ok(quote! {
        impl #impl_generics ::tinymvc_core::Model for #name #ty_generics #where_clause {
            const TABLE: &'static str = #table;
            #primary_key
        }
    })
}

/// `BlogPost` -> `blog_post`
fn snake_case(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, c) in ident.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}
