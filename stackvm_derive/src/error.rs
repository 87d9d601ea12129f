//! Derive macro for error types.
//!
//! Generates `std::fmt::Display` and `std::error::Error` implementations.
//! Replacement for `thiserror` crate.
//!
//! # Usage
//!
//! ```ignore
//! use stackvm_derive::Error;
//!
//! #[derive(Debug, Error)]
//! pub enum MachineError {
//!     #[error("unknown opcode: {0}")]
//!     UnknownOpcode(String),
//!
//!     #[error("stack full ({capacity} slots)")]
//!     Overflow { capacity: usize, ip: usize },
//!
//!     #[error("stack empty")]
//!     Underflow,
//! }
//! ```
//!
//! # Supported Features
//!
//! - Unit variants: `#[error("message")]`
//! - Tuple variants with positional args: `#[error("error: {0}")]`
//! - Struct variants with named args: `#[error("expected {expected}")]`
//!
//! Fields that the message does not mention are left out of the generated
//! `write!` call, so a variant may carry context that is only useful to
//! callers matching on it.

use proc_macro::TokenStream;
use proc_macro2::Ident;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

/// Derives `Display` and `Error` for an enum or struct.
///
/// Each variant must have an `#[error("...")]` attribute specifying
/// the display message. Supports field interpolation using `{0}`, `{1}`
/// for tuple fields or `{field_name}` for struct fields.
pub fn derive_error(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match expand_error_derive(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_error_derive(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let display_body = match &input.data {
        Data::Enum(data_enum) => {
            let arms = data_enum
                .variants
                .iter()
                .map(|variant| {
                    let variant_name = &variant.ident;
                    let message = extract_error_message_from_attrs(
                        &variant.attrs,
                        &variant.ident,
                        &format!("variant `{}`", variant_name),
                    )?;

                    let arm = match &variant.fields {
                        Fields::Unit => quote! {
                            Self::#variant_name => write!(f, #message),
                        },
                        Fields::Unnamed(fields) => {
                            let bindings = positional_idents(fields.unnamed.len());
                            let format_str = convert_positional_to_named(&message, bindings.len());
                            let used = used_idents(&format_str, &bindings);
                            let patterns = bindings.iter().map(|ident| {
                                if used.contains(ident) {
                                    quote! { #ident }
                                } else {
                                    quote! { _ }
                                }
                            });
                            quote! {
                                Self::#variant_name(#(#patterns),*) => write!(f, #format_str, #(#used = #used),*),
                            }
                        }
                        Fields::Named(fields) => {
                            let bindings: Vec<Ident> =
                                fields.named.iter().filter_map(|f| f.ident.clone()).collect();
                            let used = used_idents(&message, &bindings);
                            quote! {
                                Self::#variant_name { #(#used,)* .. } => write!(f, #message, #(#used = #used),*),
                            }
                        }
                    };

                    Ok(arm)
                })
                .collect::<syn::Result<Vec<_>>>()?;

            quote! {
                match self {
                    #(#arms)*
                }
            }
        }
        Data::Struct(data_struct) => {
            let message = extract_error_message_from_attrs(
                &input.attrs,
                &input.ident,
                &format!("type `{}`", input.ident),
            )?;

            match &data_struct.fields {
                Fields::Unit => quote! {
                    write!(f, #message)
                },
                Fields::Named(fields) => {
                    let bindings: Vec<Ident> =
                        fields.named.iter().filter_map(|f| f.ident.clone()).collect();
                    let used = used_idents(&message, &bindings);
                    quote! {
                        write!(f, #message, #(#used = self.#used),*)
                    }
                }
                Fields::Unnamed(fields) => {
                    let bindings = positional_idents(fields.unnamed.len());
                    let format_str = convert_positional_to_named(&message, bindings.len());
                    let (used, indices): (Vec<_>, Vec<_>) = bindings
                        .iter()
                        .enumerate()
                        .filter(|(_, ident)| mentions(&format_str, &ident.to_string()))
                        .map(|(i, ident)| (ident.clone(), syn::Index::from(i)))
                        .unzip();
                    quote! {
                        write!(f, #format_str, #(#used = self.#indices),*)
                    }
                }
            }
        }
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(
                input,
                "Error derive does not support unions",
            ));
        }
    };

    Ok(quote! {
        impl #impl_generics ::std::fmt::Display for #name #ty_generics #where_clause {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                #display_body
            }
        }

        impl #impl_generics ::std::error::Error for #name #ty_generics #where_clause {}
    })
}

/// Extracts the error message from attributes.
fn extract_error_message_from_attrs<T: ToTokens>(
    attrs: &[syn::Attribute],
    target: &T,
    target_desc: &str,
) -> syn::Result<String> {
    for attr in attrs {
        if !attr.path().is_ident("error") {
            continue;
        }

        let Meta::List(meta_list) = &attr.meta else {
            return Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute; use #[error(\"message\")] to describe the error",
            ));
        };

        let lit = syn::parse2::<Lit>(meta_list.tokens.clone()).map_err(|_| {
            syn::Error::new_spanned(
                &attr.meta,
                "failed to parse #[error] attribute; expected a string literal like #[error(\"stack underflow at {ip}\")]",
            )
        })?;

        return match lit {
            Lit::Str(lit_str) => Ok(lit_str.value()),
            _ => Err(syn::Error::new_spanned(
                &attr.meta,
                "invalid #[error] attribute: message must be a string literal",
            )),
        };
    }

    Err(syn::Error::new_spanned(
        target,
        format!(
            "missing #[error(\"...\")] attribute on {}; every error variant must declare a display message",
            target_desc
        ),
    ))
}

/// Binding names `f0, f1, ...` for tuple fields.
fn positional_idents(count: usize) -> Vec<Ident> {
    (0..count).map(|i| format_ident!("f{}", i)).collect()
}

/// Keeps only the bindings the format string interpolates.
fn used_idents(format_str: &str, bindings: &[Ident]) -> Vec<Ident> {
    bindings
        .iter()
        .filter(|ident| mentions(format_str, &ident.to_string()))
        .cloned()
        .collect()
}

/// Returns true if `format_str` contains `{name}` or `{name:...}`.
fn mentions(format_str: &str, name: &str) -> bool {
    format_str.contains(&format!("{{{name}}}")) || format_str.contains(&format!("{{{name}:"))
}

/// Converts positional format args `{0}`, `{1:?}` to named args `{f0}`, `{f1:?}`.
fn convert_positional_to_named(format_str: &str, field_count: usize) -> String {
    let mut result = format_str.to_string();
    for i in (0..field_count).rev() {
        result = result
            .replace(&format!("{{{i}}}"), &format!("{{f{i}}}"))
            .replace(&format!("{{{i}:"), &format!("{{f{i}:"));
    }
    result
}
