//! Status enums shared across services.

use serde::{Deserialize, Serialize};

/// Provider-agnostic payment status.
///
/// Every payment adapter maps its native vocabulary (Square's `COMPLETED`,
/// Stripe's `succeeded`, ...) into this enum at its own boundary. Nothing
/// outside an adapter ever sees a provider-specific status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Created, waiting for the customer or the provider.
    #[default]
    Pending,
    /// Authorized or being settled by the provider.
    Processing,
    /// Funds captured.
    Completed,
    /// Declined or errored.
    Failed,
    /// Voided before capture.
    Cancelled,
    /// Fully or partially refunded.
    Refunded,
}

impl PaymentStatus {
    /// Whether no further transitions are expected without a new action.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Refunded
        )
    }

    /// Whether the customer has successfully paid.
    #[must_use]
    pub const fn is_paid(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            _ => Err(format!("invalid payment status: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_status_display_roundtrip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Processing,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(status.to_string().parse::<PaymentStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_payment_status_serializes_snake_case() {
        let json = serde_json::to_string(&PaymentStatus::Completed).unwrap();
        assert_eq!(json, "\"completed\"");
    }

    #[test]
    fn test_paid_is_not_a_status() {
        assert!("paid".parse::<PaymentStatus>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(!PaymentStatus::Processing.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Refunded.is_terminal());
    }
}
