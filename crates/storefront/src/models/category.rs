//! Category rows, API models and inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use storehouse_core::CategoryId;
use storehouse_core::catalog::TreeItem;

/// A `categories` row as stored.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CategoryRow {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i32,
    pub is_active: bool,
    pub is_visible: bool,
    pub is_highlighted: bool,
    pub highlight_priority: Option<i32>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A category as served by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub sort_order: i32,
    pub is_active: bool,
    pub is_visible: bool,
    pub is_highlighted: bool,
    /// Lower sorts first; always `None` when not highlighted.
    pub highlight_priority: Option<i32>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            parent_id: row.parent_id,
            sort_order: row.sort_order,
            is_active: row.is_active,
            is_visible: row.is_visible,
            is_highlighted: row.is_highlighted,
            highlight_priority: row.highlight_priority.filter(|_| row.is_highlighted),
            image_url: row.image_url,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl TreeItem for Category {
    fn id(&self) -> CategoryId {
        self.id
    }

    fn parent_id(&self) -> Option<CategoryId> {
        self.parent_id
    }

    fn sort_order(&self) -> i32 {
        self.sort_order
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Filter for category listings, also accepted as query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryFilter {
    /// Only categories that are both active and visible.
    pub active_only: bool,
    pub parent_id: Option<CategoryId>,
    pub highlighted_only: bool,
}

impl CategoryFilter {
    /// Whether `category` passes this filter.
    #[must_use]
    pub fn matches(&self, category: &Category) -> bool {
        (!self.active_only || (category.is_active && category.is_visible))
            && self.parent_id.is_none_or(|p| category.parent_id == Some(p))
            && (!self.highlighted_only || category.is_highlighted)
    }
}

/// Input for creating a category.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    /// Derived from `name` when omitted.
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parent_id: Option<CategoryId>,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub is_visible: bool,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Partial update of a category. Absent fields are left unchanged; an
/// explicit `null` clears a nullable column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub name: Option<String>,
    pub slug: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub parent_id: Option<Option<CategoryId>>,
    pub sort_order: Option<i32>,
    pub is_active: Option<bool>,
    pub is_visible: Option<bool>,
    #[serde(deserialize_with = "double_option")]
    pub image_url: Option<Option<String>>,
}

impl CategoryUpdate {
    /// Apply this update to an in-memory category.
    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name.clone_from(name);
        }
        if let Some(slug) = &self.slug {
            category.slug.clone_from(slug);
        }
        if let Some(description) = &self.description {
            category.description.clone_from(description);
        }
        if let Some(parent_id) = self.parent_id {
            category.parent_id = parent_id;
        }
        if let Some(sort_order) = self.sort_order {
            category.sort_order = sort_order;
        }
        if let Some(is_active) = self.is_active {
            category.is_active = is_active;
        }
        if let Some(is_visible) = self.is_visible {
            category.is_visible = is_visible;
        }
        if let Some(image_url) = &self.image_url {
            category.image_url.clone_from(image_url);
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Distinguish an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
