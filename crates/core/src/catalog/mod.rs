//! Catalog algorithms shared by the storefront and the CLI.
//!
//! - [`tree`] - Builds the category forest and guards parent assignments
//! - [`cursor`] - Opaque keyset cursors for product listings
//! - [`slug`] - URL slug generation and validation

pub mod cursor;
pub mod slug;
pub mod tree;

pub use cursor::{CursorError, ProductCursor, ProductSortOrder};
pub use slug::{is_valid_slug, slugify};
pub use tree::{CategoryNode, CategoryTree, TreeItem, build_tree, would_create_cycle};
