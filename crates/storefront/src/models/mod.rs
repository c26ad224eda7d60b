//! Domain models for the storefront.
//!
//! Each entity module owns three kinds of type: the snake_case row read by
//! `sqlx`, the camelCase model served over HTTP, and the inputs used to
//! create or change it. Row-to-model conversion happens only in the entity's
//! own module.

pub mod cart;
pub mod category;
pub mod product;
pub mod session;

pub use cart::{Cart, CartItem, CartItemRow, CartOwner, CartRow, NewCartItem};
pub use category::{Category, CategoryFilter, CategoryRow, CategoryUpdate, NewCategory};
pub use product::{
    NewProduct, Pagination, Product, ProductFilter, ProductListParams, ProductListing, ProductPage,
    ProductQuery, ProductRow, ProductUpdate,
};
pub use session::{CurrentUser, keys as session_keys};
