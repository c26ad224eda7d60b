//! Opaque keyset cursors for product listings.
//!
//! A cursor is the URL-safe base64 encoding of a small JSON object holding
//! the sort key of the last row a client has seen:
//!
//! ```json
//! {"id":12,"price":"19.99","name":"Tea","created_at":"2026-01-01T00:00:00Z","featured":false}
//! ```
//!
//! The next page is every row that sorts strictly after that key under the
//! requested [`ProductSortOrder`]. The product id is always the final
//! tie-breaker, which keeps pages disjoint even when prices or names
//! collide, and keeps existing rows from being skipped or repeated when new
//! products are inserted between requests.

use std::cmp::Ordering;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ProductId;

/// Longest cursor string accepted by [`ProductCursor::decode`].
const MAX_CURSOR_LEN: usize = 1024;

/// Errors decoding a client-supplied cursor.
#[derive(Debug, Error)]
pub enum CursorError {
    #[error("cursor is empty")]
    Empty,
    #[error("cursor is too long")]
    TooLong,
    #[error("cursor is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("cursor payload is invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Sort key of the last product returned on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCursor {
    pub id: ProductId,
    pub price: Decimal,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub featured: bool,
}

impl ProductCursor {
    /// Encode as an opaque token.
    ///
    /// # Errors
    ///
    /// Returns `CursorError::Json` if serialization fails.
    pub fn encode(&self) -> Result<String, CursorError> {
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decode a token produced by [`ProductCursor::encode`].
    ///
    /// # Errors
    ///
    /// Returns a `CursorError` if the token is empty, oversized, not base64,
    /// or does not hold a cursor object.
    pub fn decode(token: &str) -> Result<Self, CursorError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CursorError::Empty);
        }
        if token.len() > MAX_CURSOR_LEN {
            return Err(CursorError::TooLong);
        }

        let bytes = URL_SAFE_NO_PAD.decode(token)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Ordering of a product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductSortOrder {
    /// Ascending id (insertion order).
    #[default]
    Default,
    PriceAsc,
    PriceDesc,
    NameAsc,
    /// Most recently created first.
    Newest,
}

impl ProductSortOrder {
    /// Compare two sort keys under this ordering, id as the tie-breaker.
    #[must_use]
    pub fn compare(self, a: &ProductCursor, b: &ProductCursor) -> Ordering {
        match self {
            Self::Default => a.id.cmp(&b.id),
            Self::PriceAsc => a.price.cmp(&b.price).then(a.id.cmp(&b.id)),
            Self::PriceDesc => b.price.cmp(&a.price).then(b.id.cmp(&a.id)),
            Self::NameAsc => a.name.cmp(&b.name).then(a.id.cmp(&b.id)),
            Self::Newest => b
                .created_at
                .cmp(&a.created_at)
                .then(b.id.cmp(&a.id)),
        }
    }

    /// Whether `candidate` belongs on a page that resumes after `cursor`.
    #[must_use]
    pub fn follows(self, cursor: &ProductCursor, candidate: &ProductCursor) -> bool {
        self.compare(candidate, cursor) == Ordering::Greater
    }
}

impl std::str::FromStr for ProductSortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" | "default" => Ok(Self::Default),
            "price_asc" => Ok(Self::PriceAsc),
            "price_desc" => Ok(Self::PriceDesc),
            "name_asc" => Ok(Self::NameAsc),
            "newest" => Ok(Self::Newest),
            _ => Err(format!("invalid sort order: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn cursor(id: i32, price: i64, name: &str) -> ProductCursor {
        ProductCursor {
            id: ProductId::new(id),
            price: Decimal::new(price, 2),
            name: name.to_string(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, id as u32 % 60).unwrap(),
            featured: id % 2 == 0,
        }
    }

    #[test]
    fn test_cursor_roundtrip() {
        let original = cursor(12, 1999, "Green Tea");
        let token = original.encode().unwrap();

        assert!(
            token
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        );
        assert_eq!(ProductCursor::decode(&token).unwrap(), original);
    }

    #[test]
    fn test_cursor_payload_is_plain_json() {
        let token = cursor(3, 500, "Mug").encode().unwrap();
        let json: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(token).unwrap()).unwrap();

        assert_eq!(json["id"], 3);
        assert_eq!(json["name"], "Mug");
        assert!(json.get("created_at").is_some());
        assert!(json.get("featured").is_some());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(ProductCursor::decode(""), Err(CursorError::Empty)));
        assert!(matches!(
            ProductCursor::decode("%%%"),
            Err(CursorError::Base64(_))
        ));
        let not_a_cursor = URL_SAFE_NO_PAD.encode(b"[1,2,3]");
        assert!(matches!(
            ProductCursor::decode(&not_a_cursor),
            Err(CursorError::Json(_))
        ));
        let huge = "A".repeat(MAX_CURSOR_LEN + 4);
        assert!(matches!(
            ProductCursor::decode(&huge),
            Err(CursorError::TooLong)
        ));
    }

    #[test]
    fn test_default_order_follows_by_id_only() {
        let at = cursor(10, 1000, "m");
        assert!(ProductSortOrder::Default.follows(&at, &cursor(11, 1, "a")));
        assert!(!ProductSortOrder::Default.follows(&at, &cursor(10, 1000, "m")));
        assert!(!ProductSortOrder::Default.follows(&at, &cursor(9, 9999, "z")));
    }

    #[test]
    fn test_price_ties_break_on_id() {
        let at = cursor(10, 1000, "m");
        assert!(ProductSortOrder::PriceAsc.follows(&at, &cursor(11, 1000, "a")));
        assert!(!ProductSortOrder::PriceAsc.follows(&at, &cursor(9, 1000, "a")));
        assert!(ProductSortOrder::PriceDesc.follows(&at, &cursor(9, 1000, "a")));
        assert!(ProductSortOrder::PriceDesc.follows(&at, &cursor(50, 999, "a")));
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(
            "price_desc".parse::<ProductSortOrder>().unwrap(),
            ProductSortOrder::PriceDesc
        );
        assert_eq!(
            "".parse::<ProductSortOrder>().unwrap(),
            ProductSortOrder::Default
        );
        assert!("cheapest".parse::<ProductSortOrder>().is_err());
    }
}
