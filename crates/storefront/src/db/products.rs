//! Product repository.
//!
//! Listings are keyset-paginated on `(sort key, id)`; see
//! [`storehouse_core::catalog::cursor`] for the cursor format. The SQL here
//! mirrors `ProductSortOrder::compare`, including a byte-wise (`"C"`)
//! collation for name ordering.

use async_trait::async_trait;
use mockall::automock;
use sqlx::{PgPool, Postgres, QueryBuilder};

use storehouse_core::catalog::{ProductCursor, ProductSortOrder, slugify};
use storehouse_core::{CategoryId, ProductId};

use super::RepositoryError;
use crate::models::{NewProduct, Product, ProductFilter, ProductListing, ProductRow, ProductUpdate};

const PRODUCT_SELECT: &str = r#"
    SELECT p.id, p.name, p.slug, p.description, p.price, p.compare_at_price, p.stock,
           p.image_url, p.sku, p.is_active, p.is_featured,
           COALESCE(
               ARRAY_AGG(pc.category_id) FILTER (WHERE pc.category_id IS NOT NULL),
               '{}'
           ) AS category_ids,
           p.created_at, p.updated_at
    FROM products p
    LEFT JOIN product_categories pc ON pc.product_id = p.id
"#;

/// Data access for `products` and `product_categories`.
#[automock]
#[async_trait]
pub trait ProductRepository: Send + Sync {
    /// One page of active products.
    async fn list(&self, listing: ProductListing) -> Result<Vec<Product>, RepositoryError>;

    /// Number of active products matching `filter`.
    async fn count(&self, filter: ProductFilter) -> Result<i64, RepositoryError>;

    /// Any product by id, active or not.
    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError>;

    /// Active featured products, newest first.
    async fn featured(&self, limit: i64) -> Result<Vec<Product>, RepositoryError>;

    async fn create(&self, input: NewProduct) -> Result<Product, RepositoryError>;

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError>;

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError>;

    /// Replace the product's category links. Returns `false` if the product
    /// does not exist.
    async fn set_categories(
        &self,
        id: ProductId,
        category_ids: Vec<CategoryId>,
    ) -> Result<bool, RepositoryError>;
}

/// `PostgreSQL` implementation of [`ProductRepository`].
#[derive(Debug, Clone)]
pub struct PgProductRepository {
    pool: PgPool,
}

impl PgProductRepository {
    /// Create a new product repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Escape `LIKE` metacharacters in user input.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_filters(query: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    query.push(" WHERE p.is_active = TRUE");

    if let Some(min) = filter.min_price {
        query.push(" AND p.price >= ").push_bind(min);
    }
    if let Some(max) = filter.max_price {
        query.push(" AND p.price <= ").push_bind(max);
    }
    if let Some(category_id) = filter.category_id {
        query
            .push(
                " AND EXISTS (SELECT 1 FROM product_categories f \
                 WHERE f.product_id = p.id AND f.category_id = ",
            )
            .push_bind(category_id)
            .push(")");
    }
    if filter.in_stock_only {
        query.push(" AND p.stock > 0");
    }
    if filter.featured_only {
        query.push(" AND p.is_featured = TRUE");
    }
    if let Some(term) = filter.search.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        let pattern = like_pattern(term);
        query
            .push(" AND (p.name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR p.description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn push_keyset(query: &mut QueryBuilder<'_, Postgres>, sort: ProductSortOrder, after: &ProductCursor) {
    match sort {
        ProductSortOrder::Default => {
            query.push(" AND p.id > ").push_bind(after.id);
        }
        ProductSortOrder::PriceAsc => {
            query
                .push(" AND (p.price, p.id) > (")
                .push_bind(after.price)
                .push(", ")
                .push_bind(after.id)
                .push(")");
        }
        ProductSortOrder::PriceDesc => {
            query
                .push(" AND (p.price, p.id) < (")
                .push_bind(after.price)
                .push(", ")
                .push_bind(after.id)
                .push(")");
        }
        ProductSortOrder::NameAsc => {
            query
                .push(r#" AND (p.name COLLATE "C", p.id) > ("#)
                .push_bind(after.name.clone())
                .push(r#" COLLATE "C", "#)
                .push_bind(after.id)
                .push(")");
        }
        ProductSortOrder::Newest => {
            query
                .push(" AND (p.created_at, p.id) < (")
                .push_bind(after.created_at)
                .push(", ")
                .push_bind(after.id)
                .push(")");
        }
    }
}

const fn order_by(sort: ProductSortOrder) -> &'static str {
    match sort {
        ProductSortOrder::Default => " ORDER BY p.id ASC",
        ProductSortOrder::PriceAsc => " ORDER BY p.price ASC, p.id ASC",
        ProductSortOrder::PriceDesc => " ORDER BY p.price DESC, p.id DESC",
        ProductSortOrder::NameAsc => r#" ORDER BY p.name COLLATE "C" ASC, p.id ASC"#,
        ProductSortOrder::Newest => " ORDER BY p.created_at DESC, p.id DESC",
    }
}

/// Build the page query for `listing`.
fn list_query(listing: &ProductListing) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(PRODUCT_SELECT);
    push_filters(&mut query, &listing.filter);
    if let Some(after) = &listing.after {
        push_keyset(&mut query, listing.sort, after);
    }
    query.push(" GROUP BY p.id");
    query.push(order_by(listing.sort));
    query.push(" LIMIT ").push_bind(listing.limit);
    if listing.offset > 0 {
        query.push(" OFFSET ").push_bind(listing.offset);
    }
    query
}

fn count_query(filter: &ProductFilter) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new("SELECT COUNT(*) FROM products p");
    push_filters(&mut query, filter);
    query
}

async fn fetch_by_id<'e, E>(executor: E, id: ProductId) -> Result<Option<Product>, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query_as::<_, ProductRow>(&format!(
        "{PRODUCT_SELECT} WHERE p.id = $1 GROUP BY p.id"
    ))
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(row.map(Product::from))
}

fn ids_to_i32(ids: &[CategoryId]) -> Vec<i32> {
    ids.iter().map(CategoryId::as_i32).collect()
}

#[async_trait]
impl ProductRepository for PgProductRepository {
    async fn list(&self, listing: ProductListing) -> Result<Vec<Product>, RepositoryError> {
        let rows = list_query(&listing)
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn count(&self, filter: ProductFilter) -> Result<i64, RepositoryError> {
        let total: i64 = count_query(&filter)
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(total)
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(fetch_by_id(&self.pool, id).await?)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "{PRODUCT_SELECT} WHERE p.slug = $1 GROUP BY p.id"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Product::from))
    }

    async fn featured(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            r"{PRODUCT_SELECT}
            WHERE p.is_active = TRUE AND p.is_featured = TRUE
            GROUP BY p.id
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }

    async fn create(&self, input: NewProduct) -> Result<Product, RepositoryError> {
        let slug = input.slug.unwrap_or_else(|| slugify(&input.name));
        let mut tx = self.pool.begin().await?;

        let id: ProductId = sqlx::query_scalar(
            r"
            INSERT INTO products
                (name, slug, description, price, compare_at_price, stock, image_url, sku,
                 is_active, is_featured)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            ",
        )
        .bind(&input.name)
        .bind(&slug)
        .bind(&input.description)
        .bind(input.price)
        .bind(input.compare_at_price)
        .bind(input.stock)
        .bind(&input.image_url)
        .bind(&input.sku)
        .bind(input.is_active)
        .bind(input.is_featured)
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        if !input.category_ids.is_empty() {
            sqlx::query(
                r"
                INSERT INTO product_categories (product_id, category_id)
                SELECT $1, UNNEST($2::int4[])
                ON CONFLICT DO NOTHING
                ",
            )
            .bind(id)
            .bind(ids_to_i32(&input.category_ids))
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from_sqlx)?;
        }

        let product = fetch_by_id(&mut *tx, id)
            .await?
            .ok_or(RepositoryError::NotFound)?;
        tx.commit().await?;

        Ok(product)
    }

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut query: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("UPDATE products SET updated_at = now()");

        if let Some(name) = update.name {
            query.push(", name = ").push_bind(name);
        }
        if let Some(slug) = update.slug {
            query.push(", slug = ").push_bind(slug);
        }
        if let Some(description) = update.description {
            query.push(", description = ").push_bind(description);
        }
        if let Some(price) = update.price {
            query.push(", price = ").push_bind(price);
        }
        if let Some(compare_at_price) = update.compare_at_price {
            query.push(", compare_at_price = ").push_bind(compare_at_price);
        }
        if let Some(stock) = update.stock {
            query.push(", stock = ").push_bind(stock);
        }
        if let Some(image_url) = update.image_url {
            query.push(", image_url = ").push_bind(image_url);
        }
        if let Some(sku) = update.sku {
            query.push(", sku = ").push_bind(sku);
        }
        if let Some(is_active) = update.is_active {
            query.push(", is_active = ").push_bind(is_active);
        }
        if let Some(is_featured) = update.is_featured {
            query.push(", is_featured = ").push_bind(is_featured);
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query
            .build()
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(RepositoryError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_categories(
        &self,
        id: ProductId,
        category_ids: Vec<CategoryId>,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if !exists {
            return Ok(false);
        }

        sqlx::query("DELETE FROM product_categories WHERE product_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r"
            INSERT INTO product_categories (product_id, category_id)
            SELECT $1, UNNEST($2::int4[])
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(id)
        .bind(ids_to_i32(&category_ids))
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from_sqlx)?;

        sqlx::query("UPDATE products SET updated_at = now() WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
