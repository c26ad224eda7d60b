//! Product service.
//!
//! Listings come in two flavours. Cursor mode resumes after the last row a
//! client has seen and is what infinite scroll uses; page mode takes a
//! 1-based page number and also reports totals. In both modes one extra row
//! is fetched to decide `has_more`.

mod error;

pub use error::ProductServiceError;

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::instrument;

use storehouse_core::catalog::{ProductCursor, ProductSortOrder, is_valid_slug, slugify};
use storehouse_core::{CategoryId, ProductId};

use crate::db::ProductRepository;
use crate::models::{
    NewProduct, Pagination, Product, ProductFilter, ProductListParams, ProductListing,
    ProductPage, ProductQuery, ProductUpdate,
};

/// Page size when the client does not ask for one.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Largest page size a client may ask for.
pub const MAX_PAGE_SIZE: u32 = 100;

const DEFAULT_FEATURED_LIMIT: u32 = 8;
const MAX_NAME_LENGTH: usize = 200;

/// Product operations.
#[derive(Clone)]
pub struct ProductService {
    products: Arc<dyn ProductRepository>,
}

impl std::fmt::Debug for ProductService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProductService").finish_non_exhaustive()
    }
}

impl ProductService {
    /// Create a new product service.
    #[must_use]
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    /// Validate raw listing parameters.
    ///
    /// # Errors
    ///
    /// Returns `ProductServiceError::Validation` when both `cursor` and
    /// `page` are given, for an unknown sort order, an out-of-range limit or
    /// inverted price bounds; `ProductServiceError::InvalidCursor` when the
    /// cursor does not decode.
    pub fn parse_query(params: ProductListParams) -> Result<ProductQuery, ProductServiceError> {
        let filter = params.filter();
        validate_filter(&filter)?;

        let sort = params
            .sort_order
            .as_deref()
            .unwrap_or_default()
            .parse::<ProductSortOrder>()
            .map_err(ProductServiceError::Validation)?;

        let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        validate_limit(limit)?;

        let pagination = match (params.cursor, params.page) {
            (Some(_), Some(_)) => {
                return Err(ProductServiceError::Validation(
                    "cursor and page cannot be used together".to_string(),
                ));
            }
            (Some(token), None) => Pagination::Cursor(Some(ProductCursor::decode(&token)?)),
            (None, Some(0)) => {
                return Err(ProductServiceError::Validation(
                    "page numbers start at 1".to_string(),
                ));
            }
            (None, Some(page)) => Pagination::Page(page),
            (None, None) => Pagination::Cursor(None),
        };

        Ok(ProductQuery {
            filter,
            sort,
            pagination,
            limit,
        })
    }

    /// One page of active products.
    ///
    /// # Errors
    ///
    /// Returns `ProductServiceError::Validation` for an invalid query,
    /// `ProductServiceError::Fetch` if a query fails.
    #[instrument(skip(self, query), fields(sort = ?query.sort, limit = query.limit))]
    pub async fn list_products(
        &self,
        query: ProductQuery,
    ) -> Result<ProductPage, ProductServiceError> {
        validate_filter(&query.filter)?;
        validate_limit(query.limit)?;
        let limit = i64::from(query.limit);

        match query.pagination {
            Pagination::Cursor(after) => {
                let listing = ProductListing {
                    filter: query.filter,
                    sort: query.sort,
                    after,
                    limit: limit + 1,
                    offset: 0,
                };
                let rows = self
                    .products
                    .list(listing)
                    .await
                    .map_err(ProductServiceError::Fetch)?;

                let (items, has_more) = split_page(rows, query.limit);
                let next_cursor = match items.last() {
                    Some(last) if has_more => Some(last.cursor().encode()?),
                    _ => None,
                };

                Ok(ProductPage {
                    items,
                    has_more,
                    next_cursor,
                    page: None,
                    total: None,
                    total_pages: None,
                })
            }
            Pagination::Page(page) => {
                if page == 0 {
                    return Err(ProductServiceError::Validation(
                        "page numbers start at 1".to_string(),
                    ));
                }
                let listing = ProductListing {
                    filter: query.filter.clone(),
                    sort: query.sort,
                    after: None,
                    limit: limit + 1,
                    offset: i64::from(page - 1) * limit,
                };

                let (rows, total) = tokio::try_join!(
                    self.products.list(listing),
                    self.products.count(query.filter)
                )
                .map_err(ProductServiceError::Fetch)?;

                let (items, has_more) = split_page(rows, query.limit);
                Ok(ProductPage {
                    items,
                    has_more,
                    next_cursor: None,
                    page: Some(page),
                    total: Some(total),
                    total_pages: Some((total + limit - 1) / limit),
                })
            }
        }
    }

    /// Any product by id, including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns `ProductServiceError::NotFound` if no product has `id`.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn get_product(&self, id: ProductId) -> Result<Product, ProductServiceError> {
        self.products
            .get(id)
            .await
            .map_err(ProductServiceError::Fetch)?
            .ok_or_else(|| ProductServiceError::NotFound(id.to_string()))
    }

    /// # Errors
    ///
    /// Returns `ProductServiceError::NotFound` if no product has `slug`.
    #[instrument(skip(self))]
    pub async fn get_product_by_slug(&self, slug: &str) -> Result<Product, ProductServiceError> {
        self.products
            .get_by_slug(slug)
            .await
            .map_err(ProductServiceError::Fetch)?
            .ok_or_else(|| ProductServiceError::NotFound(slug.to_string()))
    }

    /// Active featured products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `ProductServiceError::Validation` if `limit` is out of range.
    #[instrument(skip(self))]
    pub async fn featured_products(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<Product>, ProductServiceError> {
        let limit = limit.unwrap_or(DEFAULT_FEATURED_LIMIT);
        validate_limit(limit)?;

        self.products
            .featured(i64::from(limit))
            .await
            .map_err(ProductServiceError::Fetch)
    }

    /// # Errors
    ///
    /// Returns `ProductServiceError::Validation` for invalid input,
    /// `ProductServiceError::Duplicate` if the slug or SKU is taken.
    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(
        &self,
        mut input: NewProduct,
    ) -> Result<Product, ProductServiceError> {
        input.name = validate_name(&input.name)?;
        let slug = input.slug.take().unwrap_or_else(|| slugify(&input.name));
        validate_slug(&slug)?;
        input.slug = Some(slug);
        validate_price("price", input.price)?;
        if let Some(compare_at_price) = input.compare_at_price {
            validate_price("compareAtPrice", compare_at_price)?;
        }
        validate_stock(input.stock)?;
        input.category_ids.sort_unstable();
        input.category_ids.dedup();

        let product = self
            .products
            .create(input)
            .await
            .map_err(|e| ProductServiceError::from_write(e, ProductServiceError::Create))?;

        tracing::info!(id = %product.id, slug = %product.slug, "Product created");
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns `ProductServiceError::Validation` for invalid input,
    /// `ProductServiceError::NotFound` if the product does not exist.
    #[instrument(skip(self, update), fields(id = %id))]
    pub async fn update_product(
        &self,
        id: ProductId,
        mut update: ProductUpdate,
    ) -> Result<Product, ProductServiceError> {
        if let Some(name) = &update.name {
            update.name = Some(validate_name(name)?);
        }
        if let Some(slug) = &update.slug {
            validate_slug(slug)?;
        }
        if let Some(price) = update.price {
            validate_price("price", price)?;
        }
        if let Some(Some(compare_at_price)) = update.compare_at_price {
            validate_price("compareAtPrice", compare_at_price)?;
        }
        if let Some(stock) = update.stock {
            validate_stock(stock)?;
        }

        let product = self
            .products
            .update(id, update)
            .await
            .map_err(|e| ProductServiceError::from_write(e, ProductServiceError::Update))?
            .ok_or_else(|| ProductServiceError::NotFound(id.to_string()))?;

        tracing::info!(id = %id, "Product updated");
        Ok(product)
    }

    /// # Errors
    ///
    /// Returns `ProductServiceError::NotFound` if the product does not exist.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn delete_product(&self, id: ProductId) -> Result<(), ProductServiceError> {
        let deleted = self
            .products
            .delete(id)
            .await
            .map_err(ProductServiceError::Delete)?;
        if !deleted {
            return Err(ProductServiceError::NotFound(id.to_string()));
        }

        tracing::info!(id = %id, "Product deleted");
        Ok(())
    }

    /// Replace a product's categories atomically.
    ///
    /// # Errors
    ///
    /// Returns `ProductServiceError::NotFound` if the product does not
    /// exist, `ProductServiceError::Validation` if a category does not.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn set_product_categories(
        &self,
        id: ProductId,
        mut category_ids: Vec<CategoryId>,
    ) -> Result<Product, ProductServiceError> {
        category_ids.sort_unstable();
        category_ids.dedup();

        let found = self
            .products
            .set_categories(id, category_ids)
            .await
            .map_err(|e| ProductServiceError::from_write(e, ProductServiceError::Update))?;
        if !found {
            return Err(ProductServiceError::NotFound(id.to_string()));
        }

        self.get_product(id).await
    }
}

/// Drop the look-ahead row, reporting whether there was one.
fn split_page(mut rows: Vec<Product>, limit: u32) -> (Vec<Product>, bool) {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let has_more = rows.len() > limit;
    rows.truncate(limit);
    (rows, has_more)
}

fn validate_filter(filter: &ProductFilter) -> Result<(), ProductServiceError> {
    if let Some(min) = filter.min_price {
        validate_price("minPrice", min)?;
    }
    if let Some(max) = filter.max_price {
        validate_price("maxPrice", max)?;
    }
    if let (Some(min), Some(max)) = (filter.min_price, filter.max_price)
        && min > max
    {
        return Err(ProductServiceError::Validation(
            "minPrice must not exceed maxPrice".to_string(),
        ));
    }
    Ok(())
}

fn validate_limit(limit: u32) -> Result<(), ProductServiceError> {
    if (1..=MAX_PAGE_SIZE).contains(&limit) {
        Ok(())
    } else {
        Err(ProductServiceError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )))
    }
}

fn validate_name(name: &str) -> Result<String, ProductServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ProductServiceError::Validation(
            "product name is required".to_string(),
        ));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ProductServiceError::Validation(format!(
            "product name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_string())
}

fn validate_slug(slug: &str) -> Result<(), ProductServiceError> {
    if is_valid_slug(slug) {
        Ok(())
    } else {
        Err(ProductServiceError::Validation(format!(
            "invalid slug: {slug}"
        )))
    }
}

fn validate_price(field: &str, price: Decimal) -> Result<(), ProductServiceError> {
    if price.is_sign_negative() && !price.is_zero() {
        return Err(ProductServiceError::Validation(format!(
            "{field} must not be negative"
        )));
    }
    Ok(())
}

fn validate_stock(stock: i32) -> Result<(), ProductServiceError> {
    if stock < 0 {
        return Err(ProductServiceError::Validation(
            "stock must not be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::db::{MockProductRepository, RepositoryError};

    fn product(id: i32) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Product {id}"),
            slug: format!("product-{id}"),
            description: None,
            price: Decimal::new(1000 + i64::from(id), 2),
            compare_at_price: None,
            stock: 3,
            image_url: None,
            sku: None,
            is_active: true,
            is_featured: false,
            category_ids: vec![],
            created_at: Utc::now() - Duration::minutes(i64::from(id)),
            updated_at: Utc::now(),
        }
    }

    fn new_product(price: Decimal) -> NewProduct {
        NewProduct {
            name: "Sencha".to_string(),
            slug: None,
            description: None,
            price,
            compare_at_price: None,
            stock: 0,
            image_url: None,
            sku: None,
            is_active: true,
            is_featured: false,
            category_ids: vec![CategoryId::new(2), CategoryId::new(2)],
        }
    }

    fn service(mock: MockProductRepository) -> ProductService {
        ProductService::new(Arc::new(mock))
    }

    fn cursor_query(after: Option<ProductCursor>, limit: u32) -> ProductQuery {
        ProductQuery {
            filter: ProductFilter::default(),
            sort: ProductSortOrder::Default,
            pagination: Pagination::Cursor(after),
            limit,
        }
    }

    #[tokio::test]
    async fn test_cursor_page_fetches_one_extra_row() {
        let mut mock = MockProductRepository::new();
        mock.expect_list()
            .once()
            .withf(|listing| listing.limit == 3 && listing.offset == 0 && listing.after.is_none())
            .return_once(|_| Ok(vec![product(1), product(2), product(3)]));

        let page = service(mock)
            .list_products(cursor_query(None, 2))
            .await
            .unwrap();

        assert_eq!(page.items.len(), 2);
        assert!(page.has_more);
        let cursor = ProductCursor::decode(page.next_cursor.as_deref().unwrap()).unwrap();
        assert_eq!(cursor.id, ProductId::new(2));
        assert_eq!(cursor.price, Decimal::new(1002, 2));
    }

    #[tokio::test]
    async fn test_last_page_has_no_cursor() {
        let mut mock = MockProductRepository::new();
        mock.expect_list()
            .withf(|listing| listing.after.as_ref().map(|c| c.id) == Some(ProductId::new(2)))
            .return_once(|_| Ok(vec![product(3)]));

        let after = product(2).cursor();
        let page = service(mock)
            .list_products(cursor_query(Some(after), 2))
            .await
            .unwrap();

        assert_eq!(page.items.len(), 1);
        assert!(!page.has_more);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_page_mode_reports_totals() {
        let mut mock = MockProductRepository::new();
        mock.expect_list()
            .once()
            .withf(|listing| listing.offset == 20 && listing.limit == 11)
            .return_once(|_| Ok((21..=25).map(product).collect()));
        mock.expect_count().once().return_once(|_| Ok(25));

        let page = service(mock)
            .list_products(ProductQuery {
                pagination: Pagination::Page(3),
                ..cursor_query(None, 10)
            })
            .await
            .unwrap();

        assert_eq!(page.items.len(), 5);
        assert!(!page.has_more);
        assert_eq!(page.page, Some(3));
        assert_eq!(page.total, Some(25));
        assert_eq!(page.total_pages, Some(3));
    }

    #[tokio::test]
    async fn test_fetch_failure_message() {
        let mut mock = MockProductRepository::new();
        mock.expect_list()
            .return_once(|_| Err(RepositoryError::Database(sqlx::Error::PoolTimedOut)));

        let err = service(mock)
            .list_products(cursor_query(None, 12))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Failed to fetch products"));
    }

    #[test]
    fn test_parse_query_defaults() {
        let query = ProductService::parse_query(ProductListParams::default()).unwrap();

        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.sort, ProductSortOrder::Default);
        assert_eq!(query.pagination, Pagination::Cursor(None));
    }

    #[test]
    fn test_parse_query_rejects_cursor_with_page() {
        let token = product(1).cursor().encode().unwrap();
        let params = ProductListParams {
            cursor: Some(token),
            page: Some(2),
            ..ProductListParams::default()
        };

        assert!(matches!(
            ProductService::parse_query(params),
            Err(ProductServiceError::Validation(_))
        ));
    }

    #[test]
    fn test_parse_query_validation() {
        let inverted = ProductListParams {
            min_price: Some(Decimal::new(10, 0)),
            max_price: Some(Decimal::new(5, 0)),
            ..ProductListParams::default()
        };
        assert!(ProductService::parse_query(inverted).is_err());

        for limit in [0, MAX_PAGE_SIZE + 1] {
            let params = ProductListParams {
                limit: Some(limit),
                ..ProductListParams::default()
            };
            assert!(ProductService::parse_query(params).is_err());
        }

        let bad_cursor = ProductListParams {
            cursor: Some("not-a-cursor".to_string()),
            ..ProductListParams::default()
        };
        assert!(matches!(
            ProductService::parse_query(bad_cursor),
            Err(ProductServiceError::InvalidCursor(_))
        ));

        let bad_sort = ProductListParams {
            sort_order: Some("cheapest".to_string()),
            ..ProductListParams::default()
        };
        assert!(ProductService::parse_query(bad_sort).is_err());
    }

    #[tokio::test]
    async fn test_create_rejects_negative_price() {
        let mut mock = MockProductRepository::new();
        mock.expect_create().never();

        let err = service(mock)
            .create_product(new_product(Decimal::new(-1, 2)))
            .await
            .unwrap_err();

        assert!(matches!(err, ProductServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_create_fills_slug_and_dedupes_categories() {
        let mut mock = MockProductRepository::new();
        mock.expect_create()
            .once()
            .withf(|input| {
                input.slug.as_deref() == Some("sencha") && input.category_ids.len() == 1
            })
            .return_once(|_| Ok(product(9)));

        let created = service(mock)
            .create_product(new_product(Decimal::ZERO))
            .await
            .unwrap();

        assert_eq!(created.id, ProductId::new(9));
    }

    #[tokio::test]
    async fn test_update_rejects_negative_stock() {
        let mut mock = MockProductRepository::new();
        mock.expect_update().never();

        let update = ProductUpdate {
            stock: Some(-3),
            ..ProductUpdate::default()
        };
        assert!(
            service(mock)
                .update_product(ProductId::new(1), update)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_set_categories_on_missing_product() {
        let mut mock = MockProductRepository::new();
        mock.expect_set_categories().return_once(|_, _| Ok(false));

        let err = service(mock)
            .set_product_categories(ProductId::new(7), vec![CategoryId::new(1)])
            .await
            .unwrap_err();

        assert!(matches!(err, ProductServiceError::NotFound(_)));
    }
}
