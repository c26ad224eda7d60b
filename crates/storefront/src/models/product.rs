//! Product rows, API models, inputs and listing pages.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use storehouse_core::catalog::{ProductCursor, ProductSortOrder};
use storehouse_core::{CategoryId, ProductId};

use super::category::double_option;

/// A `products` row joined with its category ids.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ProductRow {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub category_ids: Vec<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A product as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub compare_at_price: Option<Decimal>,
    pub stock: i32,
    pub image_url: Option<String>,
    pub sku: Option<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub category_ids: Vec<CategoryId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        let mut category_ids: Vec<CategoryId> =
            row.category_ids.into_iter().map(CategoryId::new).collect();
        category_ids.sort_unstable();
        category_ids.dedup();

        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            compare_at_price: row.compare_at_price,
            stock: row.stock,
            image_url: row.image_url,
            sku: row.sku,
            is_active: row.is_active,
            is_featured: row.is_featured,
            category_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl Product {
    /// Whether at least one unit is available.
    #[must_use]
    pub const fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// Keyset cursor pointing at this product.
    #[must_use]
    pub fn cursor(&self) -> ProductCursor {
        ProductCursor {
            id: self.id,
            price: self.price,
            name: self.name.clone(),
            created_at: self.created_at,
            featured: self.is_featured,
        }
    }
}

/// Row filters for product listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductFilter {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub category_id: Option<CategoryId>,
    pub in_stock_only: bool,
    pub featured_only: bool,
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
}

impl ProductFilter {
    /// Whether `product` passes this filter. Inactive products never do.
    #[must_use]
    pub fn matches(&self, product: &Product) -> bool {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        product.is_active
            && self.min_price.is_none_or(|min| product.price >= min)
            && self.max_price.is_none_or(|max| product.price <= max)
            && self
                .category_id
                .is_none_or(|c| product.category_ids.contains(&c))
            && (!self.in_stock_only || product.in_stock())
            && (!self.featured_only || product.is_featured)
            && search.is_none_or(|needle| {
                product.name.to_lowercase().contains(&needle)
                    || product
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            })
    }
}

/// How a listing is paged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pagination {
    /// Keyset paging; `None` starts from the beginning.
    Cursor(Option<ProductCursor>),
    /// 1-based page number with offset paging and totals.
    Page(u32),
}

impl Default for Pagination {
    fn default() -> Self {
        Self::Cursor(None)
    }
}

/// Raw listing parameters as received in a query string.
///
/// Fields are spelled out rather than flattening [`ProductFilter`] because
/// flattened query strings lose their types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductListParams {
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub category_id: Option<CategoryId>,
    pub in_stock_only: bool,
    pub featured_only: bool,
    pub search: Option<String>,
    pub sort_order: Option<String>,
    pub cursor: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ProductListParams {
    /// The row filter part of these parameters.
    #[must_use]
    pub fn filter(&self) -> ProductFilter {
        ProductFilter {
            min_price: self.min_price,
            max_price: self.max_price,
            category_id: self.category_id,
            in_stock_only: self.in_stock_only,
            featured_only: self.featured_only,
            search: self.search.clone(),
        }
    }
}

/// A validated product listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductQuery {
    pub filter: ProductFilter,
    pub sort: ProductSortOrder,
    pub pagination: Pagination,
    pub limit: u32,
}

/// What a repository is asked to fetch for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductListing {
    pub filter: ProductFilter,
    pub sort: ProductSortOrder,
    pub after: Option<ProductCursor>,
    pub limit: i64,
    pub offset: i64,
}

/// One page of products.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_pages: Option<i64>,
}

/// Input for creating a product.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Decimal,
    #[serde(default)]
    pub compare_at_price: Option<Decimal>,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub category_ids: Vec<CategoryId>,
}

/// Partial update of a product.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProductUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    pub price: Option<Decimal>,
    #[serde(deserialize_with = "double_option")]
    pub compare_at_price: Option<Option<Decimal>>,
    pub stock: Option<i32>,
    #[serde(deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub sku: Option<Option<String>>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

impl ProductUpdate {
    /// Apply this update to an in-memory product.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name.clone_from(name);
        }
        if let Some(slug) = &self.slug {
            product.slug.clone_from(slug);
        }
        if let Some(description) = &self.description {
            product.description.clone_from(description);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(compare_at_price) = self.compare_at_price {
            product.compare_at_price = compare_at_price;
        }
        if let Some(stock) = self.stock {
            product.stock = stock;
        }
        if let Some(image_url) = &self.image_url {
            product.image_url.clone_from(image_url);
        }
        if let Some(sku) = &self.sku {
            product.sku.clone_from(sku);
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
        if let Some(is_featured) = self.is_featured {
            product.is_featured = is_featured;
        }
    }
}

const fn default_true() -> bool {
    true
}
