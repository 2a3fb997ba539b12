//! Flowmazon Core - Shared types library.
//!
//! This crate provides common types used across all Flowmazon components:
//! - `storefront` - Public-facing shop with product listing and cart
//! - `cli` - Command-line tools for migrations, seeding and housekeeping
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, quantities and emails

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
