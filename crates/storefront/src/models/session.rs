//! Session-related types.
//!
//! Types stored in the session for cart ownership.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session-stored user identity, written by the sign-in flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    /// User's id in the identity provider.
    pub id: Uuid,
    /// User's email address, if shared.
    pub email: Option<String>,
}

/// Session keys.
pub mod keys {
    /// Key for storing the current signed-in user.
    pub const CURRENT_USER: &str = "current_user";

    /// Key for the generated id of an anonymous visitor's cart.
    pub const ANONYMOUS_CART_ID: &str = "anonymous_cart_id";
}
