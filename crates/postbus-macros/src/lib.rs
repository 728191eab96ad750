//! Procedural macros for the postbus event bus.
//!
//! This crate provides:
//!
//! - `#[derive(Event)]` - Implements `postbus::Event` and wires up the ancestor chain
//!
//! The generated code refers to `::postbus`, so depend on the `postbus` facade
//! crate rather than on this one directly.
//!
//! ```rust,ignore
//! use postbus::prelude::*;
//!
//! #[derive(Debug, Clone, Event)]
//! pub struct Order {
//!     pub id: u32,
//! }
//!
//! #[derive(Debug, Clone, Event)]
//! #[event(name = "order.special")]
//! pub struct SpecialOrder {
//!     #[event(parent)]
//!     pub order: Order,
//!     pub discount: u8,
//! }
//! ```

mod event;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Derives `postbus::Event` for a struct.
///
/// For **root events** (no parent field), this generates:
/// - `event_name(&self) -> &'static str` - Returns the event name
/// - `as_any(&self) -> &dyn Any`
///
/// For **child events**, this additionally generates:
/// - `upcast` - Views the event as itself or as any of its ancestors
/// - `type_chain` - Appends itself, then the parent's chain
/// - `Deref` / `DerefMut` to the parent, so parent fields read naturally
///
/// # Attributes
///
/// - `#[event(name = "...")]` - Override the event name (default: the struct name)
/// - `#[event(parent)]` on a field - Marks the embedded parent event
///
/// Enums, unions and generic structs are rejected.
#[proc_macro_derive(Event, attributes(event))]
pub fn derive_event(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match event::derive_event(&input) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
