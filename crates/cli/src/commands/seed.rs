//! Seed the storefront database with categories and products.
//!
//! The YAML file lists categories (parents before children) and products
//! that refer to categories by slug:
//!
//! ```yaml
//! categories:
//!   - name: Kitchen
//!     highlighted: true
//!     priority: 0
//!   - name: Knives
//!     parent: kitchen
//! products:
//!   - name: Chef Knife
//!     price: "49.90"
//!     stock: 12
//!     featured: true
//!     categories: [knives]
//! ```
//!
//! Rows whose slug already exists are left alone, so the command can be run
//! repeatedly.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info};

use storehouse_core::CategoryId;
use storehouse_core::catalog::slugify;
use storehouse_storefront::db;
use storehouse_storefront::models::{NewCategory, NewProduct};
use storehouse_storefront::services::{
    CategoryService, CategoryServiceError, ProductService, ProductServiceError,
};
use storehouse_storefront::state::Repositories;

use super::database_url;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub categories: Vec<SeedCategory>,
    pub products: Vec<SeedProduct>,
}

#[derive(Debug, Deserialize)]
pub struct SeedCategory {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Slug of the parent category.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub highlighted: bool,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl SeedCategory {
    fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

#[derive(Debug, Deserialize)]
pub struct SeedProduct {
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
    pub sku: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub featured: bool,
    /// Category slugs.
    #[serde(default)]
    pub categories: Vec<String>,
}

impl SeedProduct {
    fn slug(&self) -> String {
        self.slug.clone().unwrap_or_else(|| slugify(&self.name))
    }
}

/// Counts reported after seeding.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub categories_created: usize,
    pub categories_skipped: usize,
    pub products_created: usize,
    pub products_skipped: usize,
}

/// Check a seed file for problems that would fail halfway through seeding.
///
/// Returns one message per problem; an empty list means the file is usable.
#[must_use]
pub fn validate_seed(seed: &SeedFile) -> Vec<String> {
    let mut errors = Vec::new();
    let mut category_slugs = HashSet::new();

    for category in &seed.categories {
        let slug = category.slug();
        if let Some(parent) = &category.parent
            && !category_slugs.contains(parent.as_str())
        {
            errors.push(format!(
                "category '{slug}': parent '{parent}' must be listed before it"
            ));
        }
        if category.priority.is_some() && !category.highlighted {
            errors.push(format!(
                "category '{slug}': priority is only allowed on highlighted categories"
            ));
        }
        if !category_slugs.insert(slug.clone()) {
            errors.push(format!("category '{slug}' is listed twice"));
        }
    }

    let mut product_slugs = HashSet::new();
    for product in &seed.products {
        let slug = product.slug();
        if product.price < Decimal::ZERO {
            errors.push(format!("product '{slug}': price must not be negative"));
        }
        if product.stock < 0 {
            errors.push(format!("product '{slug}': stock must not be negative"));
        }
        for category in &product.categories {
            if !category_slugs.contains(category.as_str()) {
                errors.push(format!(
                    "product '{slug}': unknown category '{category}'"
                ));
            }
        }
        if !product_slugs.insert(slug.clone()) {
            errors.push(format!("product '{slug}' is listed twice"));
        }
    }

    errors
}

/// Seed categories and products from a YAML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or fails validation, the
/// database URL is missing, or a database operation fails.
pub async fn run(file_path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !file_path.exists() {
        return Err(format!("File not found: {}", file_path.display()).into());
    }

    info!(path = %file_path.display(), "Loading seed data from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(file_path).await?;
    let seed: SeedFile = serde_yaml::from_str(&content)?;

    info!(
        categories = seed.categories.len(),
        products = seed.products.len(),
        "Parsed seed file"
    );

    let errors = validate_seed(&seed);
    if !errors.is_empty() {
        error!("Seed file validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    if dry_run {
        info!("Dry run: seed file is valid, nothing written");
        return Ok(());
    }

    let database_url = database_url()?;
    let pool = db::create_pool(&database_url).await?;
    info!("Connected to database");

    let repositories = Repositories::postgres(&pool);
    let categories = CategoryService::new(repositories.categories);
    let products = ProductService::new(repositories.products);

    let summary = seed_catalog(&categories, &products, &seed).await?;

    info!("Seeding complete!");
    info!("  Categories created: {}", summary.categories_created);
    info!("  Categories skipped (already exist): {}", summary.categories_skipped);
    info!("  Products created: {}", summary.products_created);
    info!("  Products skipped (already exist): {}", summary.products_skipped);

    Ok(())
}

async fn seed_catalog(
    categories: &CategoryService,
    products: &ProductService,
    seed: &SeedFile,
) -> Result<SeedSummary, Box<dyn std::error::Error>> {
    let mut summary = SeedSummary::default();
    let mut ids: HashMap<String, CategoryId> = HashMap::new();

    for entry in &seed.categories {
        let slug = entry.slug();
        match categories.get_category_by_slug(&slug).await {
            Ok(existing) => {
                ids.insert(slug, existing.id);
                summary.categories_skipped += 1;
                continue;
            }
            Err(CategoryServiceError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let parent_id = entry.parent.as_ref().and_then(|p| ids.get(p).copied());
        let category = categories
            .create_category(NewCategory {
                name: entry.name.clone(),
                slug: Some(slug.clone()),
                description: entry.description.clone(),
                parent_id,
                sort_order: entry.sort_order,
                is_active: true,
                is_visible: true,
                image_url: entry.image_url.clone(),
            })
            .await?;

        if entry.highlighted {
            categories
                .update_highlight_status(vec![category.id], true)
                .await?;
            if let Some(priority) = entry.priority {
                categories
                    .update_highlight_priority(category.id, priority)
                    .await?;
            }
        }

        info!(slug = %slug, id = %category.id, "Category created");
        ids.insert(slug, category.id);
        summary.categories_created += 1;
    }

    for entry in &seed.products {
        let slug = entry.slug();
        match products.get_product_by_slug(&slug).await {
            Ok(_) => {
                summary.products_skipped += 1;
                continue;
            }
            Err(ProductServiceError::NotFound(_)) => {}
            Err(e) => return Err(e.into()),
        }

        let category_ids = entry
            .categories
            .iter()
            .filter_map(|c| ids.get(c).copied())
            .collect();
        let product = products
            .create_product(NewProduct {
                name: entry.name.clone(),
                slug: Some(slug.clone()),
                description: entry.description.clone(),
                price: entry.price,
                compare_at_price: entry.compare_at_price,
                stock: entry.stock,
                image_url: entry.image_url.clone(),
                sku: entry.sku.clone(),
                is_active: true,
                is_featured: entry.featured,
                category_ids,
            })
            .await?;

        info!(slug = %slug, id = %product.id, "Product created");
        summary.products_created += 1;
    }

    Ok(summary)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const DEMO: &str = r#"
categories:
  - name: Kitchen
    highlighted: true
    priority: 0
  - name: Knives
    parent: kitchen
products:
  - name: Chef Knife
    price: "49.90"
    stock: 12
    featured: true
    categories: [knives]
"#;

    #[test]
    fn test_demo_file_is_valid() {
        let seed: SeedFile = serde_yaml::from_str(DEMO).unwrap();
        assert_eq!(seed.categories.len(), 2);
        assert_eq!(seed.products[0].price, Decimal::new(4990, 2));
        assert!(validate_seed(&seed).is_empty());
    }

    #[test]
    fn test_parent_must_come_first() {
        let seed: SeedFile = serde_yaml::from_str(
            r"
categories:
  - name: Knives
    parent: kitchen
  - name: Kitchen
",
        )
        .unwrap();
        let errors = validate_seed(&seed);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("must be listed before"));
    }

    #[test]
    fn test_unknown_category_and_duplicates() {
        let seed: SeedFile = serde_yaml::from_str(
            r#"
categories:
  - name: Tools
  - name: Tools
products:
  - name: Hammer
    price: "10"
    categories: [garden]
"#,
        )
        .unwrap();
        let errors = validate_seed(&seed);
        assert!(errors.iter().any(|e| e.contains("listed twice")));
        assert!(errors.iter().any(|e| e.contains("unknown category 'garden'")));
    }

    #[test]
    fn test_priority_requires_highlight() {
        let seed: SeedFile = serde_yaml::from_str(
            r"
categories:
  - name: Tools
    priority: 3
",
        )
        .unwrap();
        assert_eq!(validate_seed(&seed).len(), 1);
    }
}
