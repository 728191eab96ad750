//! `#[derive(Event)]` implementation using the **parent-in-child** layout.
//!
//! # Overview
//!
//! `#[derive(Event)]` generates:
//!
//! 1. `impl Event`: event name, `as_any`, plus the ancestor-chain methods
//!    (`upcast`, `type_chain`) for child events
//! 2. `impl Deref[Mut]`: generated only when a parent field exists
//!
//! # Root events
//!
//! A struct without a `#[event(parent)]` field is a root event. Its type
//! chain contains only itself.
//!
//! # Child events
//!
//! The parent is detected from the field marked with `#[event(parent)]`. The
//! child's chain is itself followed by the parent's chain.
//!
//! # Struct-level `#[event(...)]`
//!
//! | Key | Example | Required | Description |
//! |-----|---------|----------|-------------|
//! | `name` | `"order.special"` | No | Event name (default: the struct identifier) |
//!
//! # Field-level `#[event(...)]`
//!
//! | Key | Description |
//! |-----|-------------|
//! | `parent` | Marks this field as the parent (type is auto-detected) |

use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, Ident, Member, Type, spanned::Spanned};

// ============================================================================
// Attribute parsing
// ============================================================================

fn parse_struct_attrs(attrs: &[Attribute]) -> syn::Result<Option<String>> {
    let mut name: Option<String> = None;

    for attr in attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                name = Some(meta.value()?.parse::<syn::LitStr>()?.value());
                Ok(())
            } else {
                Err(meta.error("unsupported #[event] key, expected `name`"))
            }
        })?;
    }

    Ok(name)
}

fn is_parent_field(attrs: &[Attribute]) -> syn::Result<bool> {
    let mut is_parent = false;

    for attr in attrs {
        if !attr.path().is_ident("event") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("parent") {
                is_parent = true;
                Ok(())
            } else {
                Err(meta.error("unsupported field attribute, expected `parent`"))
            }
        })?;
    }

    Ok(is_parent)
}

/// Finds the single field marked `#[event(parent)]`, if any.
fn find_parent(fields: &Fields) -> syn::Result<Option<(Member, Type)>> {
    let mut parent: Option<(Member, Type)> = None;

    for (index, field) in fields.iter().enumerate() {
        if !is_parent_field(&field.attrs)? {
            continue;
        }
        if parent.is_some() {
            return Err(syn::Error::new(
                field.span(),
                "an event can only have one #[event(parent)] field",
            ));
        }
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(index.into()),
        };
        parent = Some((member, field.ty.clone()));
    }

    Ok(parent)
}

// ============================================================================
// Entry point
// ============================================================================

pub fn derive_event(input: &DeriveInput) -> syn::Result<TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new(
            input.generics.span(),
            "Event cannot be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => &data.fields,
        Data::Enum(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Event does not support enums. Use structs with a parent field instead.",
            ));
        }
        Data::Union(_) => {
            return Err(syn::Error::new(
                input.span(),
                "Event cannot be derived for unions",
            ));
        }
    };

    let event_name = parse_struct_attrs(&input.attrs)?.unwrap_or_else(|| name.to_string());

    let tokens = match find_parent(fields)? {
        Some((member, parent_ty)) => generate_child_event(name, &event_name, &member, &parent_ty),
        None => generate_root_event(name, &event_name),
    };

    Ok(tokens)
}

// ============================================================================
// Code generation
// ============================================================================

fn generate_root_event(name: &Ident, event_name: &str) -> TokenStream {
    let name_lit = syn::LitStr::new(event_name, name.span());

    quote! {
        impl ::postbus::Event for #name {
            fn event_name(&self) -> &'static str {
                #name_lit
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }
        }
    }
}

fn generate_child_event(
    name: &Ident,
    event_name: &str,
    parent: &Member,
    parent_ty: &Type,
) -> TokenStream {
    let name_lit = syn::LitStr::new(event_name, name.span());

    // ── Deref / DerefMut ──
    let deref_impls = quote! {
        impl ::std::ops::Deref for #name {
            type Target = #parent_ty;
            #[inline]
            fn deref(&self) -> &Self::Target {
                &self.#parent
            }
        }

        impl ::std::ops::DerefMut for #name {
            #[inline]
            fn deref_mut(&mut self) -> &mut Self::Target {
                &mut self.#parent
            }
        }
    };

    // ── Event trait impl ──
    let event_impl = quote! {
        impl ::postbus::Event for #name {
            fn event_name(&self) -> &'static str {
                #name_lit
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn upcast(&self, target: ::std::any::TypeId) -> ::std::option::Option<&dyn ::std::any::Any> {
                // Self before any ancestor
                if target == ::std::any::TypeId::of::<Self>() {
                    return ::std::option::Option::Some(self);
                }
                // Walk up through the parent field
                <#parent_ty as ::postbus::Event>::upcast(&self.#parent, target)
            }

            fn type_chain(&self, chain: &mut ::std::vec::Vec<::postbus::EventType>) {
                chain.push(::postbus::EventType::of::<Self>());
                <#parent_ty as ::postbus::Event>::type_chain(&self.#parent, chain);
            }
        }
    };

    quote! {
        #deref_impls
        #event_impl
    }
}
