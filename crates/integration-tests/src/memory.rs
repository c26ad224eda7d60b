//! In-memory repositories with the same observable behaviour as the
//! `PostgreSQL` ones: unique slugs and SKUs, foreign keys, ordering and
//! keyset paging.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use storehouse_core::catalog::{slugify, would_create_cycle};
use storehouse_core::{CartId, CartItemId, CategoryId, ProductId, VariantId};
use storehouse_storefront::db::{
    CartRepository, CategoryRepository, ProductRepository, RepositoryError,
};
use storehouse_storefront::models::{
    CartItem, CartOwner, CartRow, Category, CategoryFilter, CategoryUpdate, NewCartItem,
    NewCategory, NewProduct, Product, ProductFilter, ProductListing, ProductUpdate,
};

fn next_id(counter: &mut i32) -> i32 {
    *counter += 1;
    *counter
}

// =============================================================================
// Categories
// =============================================================================

#[derive(Default)]
struct CategoryStore {
    rows: Vec<Category>,
    last_id: i32,
}

#[derive(Default)]
pub struct InMemoryCategoryRepository {
    store: Mutex<CategoryStore>,
}

impl InMemoryCategoryRepository {
    fn with_store<T>(&self, f: impl FnOnce(&mut CategoryStore) -> T) -> T {
        f(&mut self.store.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Whether a category with `id` exists.
    #[must_use]
    pub fn exists(&self, id: CategoryId) -> bool {
        self.with_store(|s| s.rows.iter().any(|c| c.id == id))
    }

    /// Every stored category, unfiltered.
    #[must_use]
    pub fn all(&self) -> Vec<Category> {
        self.with_store(|s| s.rows.clone())
    }
}

fn sort_categories(rows: &mut [Category]) {
    rows.sort_by(|a, b| {
        a.sort_order
            .cmp(&b.sort_order)
            .then_with(|| a.name.cmp(&b.name))
            .then(a.id.cmp(&b.id))
    });
}

#[async_trait]
impl CategoryRepository for InMemoryCategoryRepository {
    async fn list(&self, filter: CategoryFilter) -> Result<Vec<Category>, RepositoryError> {
        let mut rows: Vec<Category> = self.with_store(|s| {
            s.rows
                .iter()
                .filter(|c| filter.matches(c))
                .cloned()
                .collect()
        });
        sort_categories(&mut rows);
        Ok(rows)
    }

    async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        Ok(self.with_store(|s| s.rows.iter().find(|c| c.id == id).cloned()))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        Ok(self.with_store(|s| s.rows.iter().find(|c| c.slug == slug).cloned()))
    }

    async fn create(&self, input: NewCategory) -> Result<Category, RepositoryError> {
        let slug = input.slug.unwrap_or_else(|| slugify(&input.name));

        self.with_store(|s| {
            if s.rows.iter().any(|c| c.slug == slug) {
                return Err(RepositoryError::Conflict("categories_slug_key".to_string()));
            }
            if let Some(parent) = input.parent_id
                && !s.rows.iter().any(|c| c.id == parent)
            {
                return Err(RepositoryError::InvalidReference(
                    "categories_parent_id_fkey".to_string(),
                ));
            }

            let now = Utc::now();
            let category = Category {
                id: CategoryId::new(next_id(&mut s.last_id)),
                name: input.name,
                slug,
                description: input.description,
                parent_id: input.parent_id,
                sort_order: input.sort_order,
                is_active: input.is_active,
                is_visible: input.is_visible,
                is_highlighted: false,
                highlight_priority: None,
                image_url: input.image_url,
                created_at: now,
                updated_at: now,
            };
            s.rows.push(category.clone());
            Ok(category)
        })
    }

    async fn update(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError> {
        self.with_store(|s| {
            if let Some(slug) = &update.slug
                && s.rows.iter().any(|c| c.id != id && &c.slug == slug)
            {
                return Err(RepositoryError::Conflict("categories_slug_key".to_string()));
            }
            if let Some(Some(parent)) = update.parent_id {
                if !s.rows.iter().any(|c| c.id == parent) {
                    return Err(RepositoryError::InvalidReference(
                        "categories_parent_id_fkey".to_string(),
                    ));
                }
                if would_create_cycle(&s.rows, id, Some(parent)) {
                    return Err(RepositoryError::Cycle);
                }
            }

            Ok(s.rows.iter_mut().find(|c| c.id == id).map(|category| {
                update.apply_to(category);
                category.updated_at = Utc::now();
                category.clone()
            }))
        })
    }

    async fn delete(&self, id: CategoryId) -> Result<bool, RepositoryError> {
        self.with_store(|s| {
            if s.rows.iter().any(|c| c.parent_id == Some(id)) {
                return Err(RepositoryError::InvalidReference(
                    "categories_parent_id_fkey".to_string(),
                ));
            }
            let before = s.rows.len();
            s.rows.retain(|c| c.id != id);
            Ok(s.rows.len() != before)
        })
    }

    async fn count_children(&self, id: CategoryId) -> Result<i64, RepositoryError> {
        let count = self.with_store(|s| s.rows.iter().filter(|c| c.parent_id == Some(id)).count());
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn set_highlighted(
        &self,
        ids: Vec<CategoryId>,
        highlighted: bool,
    ) -> Result<u64, RepositoryError> {
        Ok(self.with_store(|s| {
            let mut changed = 0;
            for category in s.rows.iter_mut().filter(|c| ids.contains(&c.id)) {
                category.is_highlighted = highlighted;
                if !highlighted {
                    category.highlight_priority = None;
                }
                category.updated_at = Utc::now();
                changed += 1;
            }
            changed
        }))
    }

    async fn set_highlight_priority(
        &self,
        id: CategoryId,
        priority: i32,
    ) -> Result<Option<Category>, RepositoryError> {
        Ok(self.with_store(|s| {
            s.rows
                .iter_mut()
                .find(|c| c.id == id && c.is_highlighted)
                .map(|category| {
                    category.highlight_priority = Some(priority);
                    category.updated_at = Utc::now();
                    category.clone()
                })
        }))
    }

    async fn highlighted(&self, limit: i64) -> Result<Vec<Category>, RepositoryError> {
        let mut rows: Vec<Category> = self.with_store(|s| {
            s.rows
                .iter()
                .filter(|c| c.is_highlighted && c.is_active && c.is_visible)
                .cloned()
                .collect()
        });
        sort_categories(&mut rows);
        // Stable sort keeps (sort_order, name, id) within equal priorities.
        rows.sort_by_key(|c| (c.highlight_priority.is_none(), c.highlight_priority));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn reorder(&self, order: Vec<(CategoryId, i32)>) -> Result<u64, RepositoryError> {
        Ok(self.with_store(|s| {
            let mut changed = 0;
            for (id, sort_order) in order {
                if let Some(category) = s.rows.iter_mut().find(|c| c.id == id) {
                    category.sort_order = sort_order;
                    category.updated_at = Utc::now();
                    changed += 1;
                }
            }
            changed
        }))
    }

    async fn set_visibility(
        &self,
        id: CategoryId,
        visible: bool,
    ) -> Result<Option<Category>, RepositoryError> {
        Ok(self.with_store(|s| {
            s.rows.iter_mut().find(|c| c.id == id).map(|category| {
                category.is_visible = visible;
                category.updated_at = Utc::now();
                category.clone()
            })
        }))
    }
}

// =============================================================================
// Products
// =============================================================================

#[derive(Default)]
struct ProductStore {
    rows: Vec<Product>,
    last_id: i32,
}

pub struct InMemoryProductRepository {
    store: Mutex<ProductStore>,
    categories: Arc<InMemoryCategoryRepository>,
}

impl InMemoryProductRepository {
    #[must_use]
    pub fn new(categories: Arc<InMemoryCategoryRepository>) -> Self {
        Self {
            store: Mutex::new(ProductStore::default()),
            categories,
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut ProductStore) -> T) -> T {
        f(&mut self.store.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Any stored product, active or not.
    #[must_use]
    pub fn find(&self, id: ProductId) -> Option<Product> {
        self.with_store(|s| s.rows.iter().find(|p| p.id == id).cloned())
    }

    /// Adjust a product in place, bypassing validation.
    pub fn modify(&self, id: ProductId, f: impl FnOnce(&mut Product)) {
        self.with_store(|s| {
            if let Some(product) = s.rows.iter_mut().find(|p| p.id == id) {
                f(product);
            }
        });
    }

    fn check_categories(&self, ids: &[CategoryId]) -> Result<(), RepositoryError> {
        if ids.iter().all(|id| self.categories.exists(*id)) {
            Ok(())
        } else {
            Err(RepositoryError::InvalidReference(
                "product_categories_category_id_fkey".to_string(),
            ))
        }
    }
}

fn check_unique(
    rows: &[Product],
    id: Option<ProductId>,
    slug: Option<&str>,
    sku: Option<&str>,
) -> Result<(), RepositoryError> {
    let others = || rows.iter().filter(move |p| Some(p.id) != id);
    if let Some(slug) = slug
        && others().any(|p| p.slug == slug)
    {
        return Err(RepositoryError::Conflict("products_slug_key".to_string()));
    }
    if let Some(sku) = sku
        && others().any(|p| p.sku.as_deref() == Some(sku))
    {
        return Err(RepositoryError::Conflict("products_sku_key".to_string()));
    }
    Ok(())
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn list(&self, listing: ProductListing) -> Result<Vec<Product>, RepositoryError> {
        let mut rows: Vec<Product> = self.with_store(|s| {
            s.rows
                .iter()
                .filter(|p| listing.filter.matches(p))
                .filter(|p| {
                    listing
                        .after
                        .as_ref()
                        .is_none_or(|after| listing.sort.follows(after, &p.cursor()))
                })
                .cloned()
                .collect()
        });
        rows.sort_by(|a, b| listing.sort.compare(&a.cursor(), &b.cursor()));

        Ok(rows
            .into_iter()
            .skip(usize::try_from(listing.offset).unwrap_or(0))
            .take(usize::try_from(listing.limit).unwrap_or(0))
            .collect())
    }

    async fn count(&self, filter: ProductFilter) -> Result<i64, RepositoryError> {
        let count = self.with_store(|s| s.rows.iter().filter(|p| filter.matches(p)).count());
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.find(id))
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        Ok(self.with_store(|s| s.rows.iter().find(|p| p.slug == slug).cloned()))
    }

    async fn featured(&self, limit: i64) -> Result<Vec<Product>, RepositoryError> {
        let mut rows: Vec<Product> = self.with_store(|s| {
            s.rows
                .iter()
                .filter(|p| p.is_active && p.is_featured)
                .cloned()
                .collect()
        });
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(rows)
    }

    async fn create(&self, input: NewProduct) -> Result<Product, RepositoryError> {
        let slug = input.slug.unwrap_or_else(|| slugify(&input.name));
        self.check_categories(&input.category_ids)?;

        self.with_store(|s| {
            check_unique(&s.rows, None, Some(&slug), input.sku.as_deref())?;

            let now = Utc::now();
            let mut category_ids = input.category_ids;
            category_ids.sort_unstable();
            category_ids.dedup();

            let product = Product {
                id: ProductId::new(next_id(&mut s.last_id)),
                name: input.name,
                slug,
                description: input.description,
                price: input.price,
                compare_at_price: input.compare_at_price,
                stock: input.stock,
                image_url: input.image_url,
                sku: input.sku,
                is_active: input.is_active,
                is_featured: input.is_featured,
                category_ids,
                created_at: now,
                updated_at: now,
            };
            s.rows.push(product.clone());
            Ok(product)
        })
    }

    async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        self.with_store(|s| {
            let sku = update.sku.as_ref().and_then(Option::as_deref);
            check_unique(&s.rows, Some(id), update.slug.as_deref(), sku)?;

            Ok(s.rows.iter_mut().find(|p| p.id == id).map(|product| {
                update.apply_to(product);
                product.updated_at = Utc::now();
                product.clone()
            }))
        })
    }

    async fn delete(&self, id: ProductId) -> Result<bool, RepositoryError> {
        Ok(self.with_store(|s| {
            let before = s.rows.len();
            s.rows.retain(|p| p.id != id);
            s.rows.len() != before
        }))
    }

    async fn set_categories(
        &self,
        id: ProductId,
        mut category_ids: Vec<CategoryId>,
    ) -> Result<bool, RepositoryError> {
        self.check_categories(&category_ids)?;
        category_ids.sort_unstable();
        category_ids.dedup();

        Ok(self.with_store(|s| {
            s.rows.iter_mut().find(|p| p.id == id).is_some_and(|product| {
                product.category_ids = category_ids;
                product.updated_at = Utc::now();
                true
            })
        }))
    }
}

// =============================================================================
// Carts
// =============================================================================

#[derive(Clone)]
struct StoredLine {
    id: CartItemId,
    cart_id: CartId,
    product_id: ProductId,
    variant_id: Option<VariantId>,
    quantity: i32,
    unit_price: Decimal,
    created_at: chrono::DateTime<Utc>,
    updated_at: chrono::DateTime<Utc>,
}

#[derive(Default)]
struct CartStore {
    carts: Vec<CartRow>,
    lines: Vec<StoredLine>,
    last_cart_id: i32,
    last_line_id: i32,
}

pub struct InMemoryCartRepository {
    store: Mutex<CartStore>,
    products: Arc<InMemoryProductRepository>,
}

impl InMemoryCartRepository {
    #[must_use]
    pub fn new(products: Arc<InMemoryProductRepository>) -> Self {
        Self {
            store: Mutex::new(CartStore::default()),
            products,
        }
    }

    fn with_store<T>(&self, f: impl FnOnce(&mut CartStore) -> T) -> T {
        f(&mut self.store.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of carts currently stored.
    #[must_use]
    pub fn cart_count(&self) -> usize {
        self.with_store(|s| s.carts.len())
    }

    /// The stored cart for a user, if any.
    #[must_use]
    pub fn user_cart(&self, user_id: Uuid) -> Option<CartRow> {
        self.with_store(|s| s.carts.iter().find(|c| c.user_id == Some(user_id)).cloned())
    }

    /// Join a line with its product, dropping lines whose product is gone.
    fn hydrate(&self, line: StoredLine) -> Option<CartItem> {
        let product = self.products.find(line.product_id)?;
        Some(CartItem {
            id: line.id,
            cart_id: line.cart_id,
            product_id: line.product_id,
            variant_id: line.variant_id,
            name: product.name,
            slug: product.slug,
            image_url: product.image_url,
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.unit_price * Decimal::from(line.quantity),
            created_at: line.created_at,
            updated_at: line.updated_at,
        })
    }

    fn line(&self, cart_id: CartId, item_id: CartItemId) -> Option<CartItem> {
        let line = self.with_store(|s| {
            s.lines
                .iter()
                .find(|l| l.cart_id == cart_id && l.id == item_id)
                .cloned()
        })?;
        self.hydrate(line)
    }
}

fn owns(cart: &CartRow, owner: &CartOwner) -> bool {
    match owner {
        CartOwner::User(id) => cart.user_id == Some(*id),
        CartOwner::Anonymous(id) => cart.anonymous_id.as_deref() == Some(id.as_str()),
    }
}

#[async_trait]
impl CartRepository for InMemoryCartRepository {
    async fn find_cart(&self, owner: CartOwner) -> Result<Option<CartRow>, RepositoryError> {
        Ok(self.with_store(|s| s.carts.iter().find(|c| owns(c, &owner)).cloned()))
    }

    async fn get_or_create_cart(&self, owner: CartOwner) -> Result<CartRow, RepositoryError> {
        Ok(self.with_store(|s| {
            if let Some(cart) = s.carts.iter().find(|c| owns(c, &owner)) {
                return cart.clone();
            }
            let now = Utc::now();
            let cart = CartRow {
                id: CartId::new(next_id(&mut s.last_cart_id)),
                user_id: owner.user_id(),
                anonymous_id: owner.anonymous_id().map(String::from),
                created_at: now,
                updated_at: now,
            };
            s.carts.push(cart.clone());
            cart
        }))
    }

    async fn items(&self, cart_id: CartId) -> Result<Vec<CartItem>, RepositoryError> {
        let mut lines: Vec<StoredLine> = self.with_store(|s| {
            s.lines
                .iter()
                .filter(|l| l.cart_id == cart_id)
                .cloned()
                .collect()
        });
        lines.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(lines.into_iter().filter_map(|l| self.hydrate(l)).collect())
    }

    async fn get_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>, RepositoryError> {
        Ok(self.line(cart_id, item_id))
    }

    async fn find_item(
        &self,
        cart_id: CartId,
        product_id: ProductId,
        variant_id: Option<VariantId>,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let line = self.with_store(|s| {
            s.lines
                .iter()
                .find(|l| {
                    l.cart_id == cart_id && l.product_id == product_id && l.variant_id == variant_id
                })
                .cloned()
        });
        Ok(line.and_then(|l| self.hydrate(l)))
    }

    async fn insert_item(
        &self,
        cart_id: CartId,
        item: NewCartItem,
    ) -> Result<CartItem, RepositoryError> {
        if self.products.find(item.product_id).is_none() {
            return Err(RepositoryError::InvalidReference(
                "cart_items_product_id_fkey".to_string(),
            ));
        }

        let line = self.with_store(|s| {
            if s.lines.iter().any(|l| {
                l.cart_id == cart_id
                    && l.product_id == item.product_id
                    && l.variant_id == item.variant_id
            }) {
                return Err(RepositoryError::Conflict("cart_items_line_key".to_string()));
            }
            let now = Utc::now();
            let line = StoredLine {
                id: CartItemId::new(next_id(&mut s.last_line_id)),
                cart_id,
                product_id: item.product_id,
                variant_id: item.variant_id,
                quantity: item.quantity,
                unit_price: item.unit_price,
                created_at: now,
                updated_at: now,
            };
            s.lines.push(line.clone());
            Ok(line)
        })?;

        self.hydrate(line).ok_or(RepositoryError::NotFound)
    }

    async fn set_quantity(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
        quantity: i32,
    ) -> Result<Option<CartItem>, RepositoryError> {
        let found = self.with_store(|s| {
            s.lines
                .iter_mut()
                .find(|l| l.cart_id == cart_id && l.id == item_id)
                .map(|line| {
                    line.quantity = quantity;
                    line.updated_at = Utc::now();
                })
                .is_some()
        });
        Ok(if found { self.line(cart_id, item_id) } else { None })
    }

    async fn delete_item(
        &self,
        cart_id: CartId,
        item_id: CartItemId,
    ) -> Result<u64, RepositoryError> {
        Ok(self.with_store(|s| {
            let before = s.lines.len();
            s.lines.retain(|l| !(l.cart_id == cart_id && l.id == item_id));
            u64::from(s.lines.len() != before)
        }))
    }

    async fn clear(&self, cart_id: CartId) -> Result<u64, RepositoryError> {
        Ok(self.with_store(|s| {
            let before = s.lines.len();
            s.lines.retain(|l| l.cart_id != cart_id);
            u64::try_from(before - s.lines.len()).unwrap_or(u64::MAX)
        }))
    }

    async fn merge(
        &self,
        from: CartId,
        into: CartId,
        max_quantity: i32,
    ) -> Result<u64, RepositoryError> {
        Ok(self.with_store(|s| {
            let (moving, kept): (Vec<StoredLine>, Vec<StoredLine>) =
                s.lines.drain(..).partition(|l| l.cart_id == from);
            s.lines = kept;

            let mut moved = 0;
            for line in moving {
                moved += 1;
                if let Some(existing) = s.lines.iter_mut().find(|l| {
                    l.cart_id == into
                        && l.product_id == line.product_id
                        && l.variant_id == line.variant_id
                }) {
                    existing.quantity = (existing.quantity + line.quantity).min(max_quantity);
                    existing.updated_at = Utc::now();
                } else {
                    s.lines.push(StoredLine {
                        cart_id: into,
                        quantity: line.quantity.min(max_quantity),
                        ..line
                    });
                }
            }

            s.carts.retain(|c| c.id != from);
            moved
        }))
    }
}
