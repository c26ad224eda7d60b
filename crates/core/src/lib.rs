//! Storehouse Core - Shared types library.
//!
//! This crate provides common types and pure algorithms used across all
//! Storehouse components:
//! - `storefront` - Public JSON API, admin back-office API and payments
//! - `cli` - Command-line tools for migrations and seeding
//!
//! # Architecture
//!
//! The core crate contains only types, traits and pure functions - no I/O, no
//! database access, no HTTP clients. This keeps it lightweight and allows it
//! to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices and statuses
//! - [`catalog`] - Category tree building, cycle checks, product cursors, slugs
//! - [`retry`] - Bounded exponential backoff schedule

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod catalog;
pub mod retry;
pub mod types;

pub use types::*;
