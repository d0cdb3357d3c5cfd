//! Procedural macros for the Legate mediator.
//!
//! This crate provides:
//!
//! - `#[derive(Command)]` - Implements the `Command` message contract
//! - `#[derive(Query)]` - Implements the `Query` message contract
//!
//! Both derives read the handler's result type from a `result = "…"`
//! attribute. Commands default to `()` when the attribute is omitted;
//! queries must name one.
//!
//! The generated impls name `::legate_core` by absolute path, so any crate
//! using these derives must list `legate-core` in its own dependencies
//! (alongside `legate` when going through the facade).
//!
//! ```rust,ignore
//! use legate_macros::{Command, Query};
//!
//! #[derive(Command)]
//! pub struct DeactivateUser {
//!     pub user_id: u64,
//! }
//!
//! #[derive(Command)]
//! #[command(result = "u64")]
//! pub struct RegisterUser {
//!     pub name: String,
//! }
//!
//! #[derive(Query)]
//! #[query(result = "Vec<String>")]
//! pub struct ListUserNames;
//! ```

mod message;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Implements `legate_core::message::Command` for the annotated type.
///
/// # Attributes
///
/// - `#[command(result = "…")]` - The handler's result type (default: `()`)
#[proc_macro_derive(Command, attributes(command))]
pub fn derive_command(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_message(&input, message::Kind::Command) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

/// Implements `legate_core::message::Query` for the annotated type.
///
/// # Attributes
///
/// - `#[query(result = "…")]` - The handler's result type (required)
#[proc_macro_derive(Query, attributes(query))]
pub fn derive_query(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match message::derive_message(&input, message::Kind::Query) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}
