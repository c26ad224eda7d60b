//! Business logic services for the storefront.
//!
//! # Services
//!
//! - `categories` - Category CRUD, tree, highlighting and ordering
//! - `products` - Product listing, pagination and CRUD
//! - `carts` - Server-side carts for signed-in and anonymous visitors
//! - `retry` - Bounded retry of transient repository failures
//!
//! Services own their repositories behind `Arc<dyn Trait>` so they can be
//! built once in `main`, shared through `AppState`, and exercised against
//! mocks in tests.

pub mod carts;
pub mod categories;
pub mod products;
pub mod retry;

pub use carts::{CartService, CartServiceError};
pub use categories::{CategoryService, CategoryServiceError};
pub use products::{ProductService, ProductServiceError};
