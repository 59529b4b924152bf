//! Order identity, payment method, and status lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::UserId;

/// A durable order identifier.
///
/// Derived deterministically from the commit wall clock and the buyer:
/// `YYYYMMDDHHMMSS` followed by the zero-padded 9-digit user id. Two commits
/// from the same buyer within one clock second collide; the persistence
/// layer's primary-key guard rejects the second one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Derive the order id for a commit at `at` by `user_id`.
    #[must_use]
    pub fn derive(at: DateTime<Utc>, user_id: UserId) -> Self {
        Self(format!(
            "{}{:09}",
            at.format("%Y%m%d%H%M%S"),
            user_id.as_i32()
        ))
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OrderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for OrderId {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for OrderId {
    fn decode(
        value: sqlx::postgres::PgValueRef<'r>,
    ) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        Ok(Self(id))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for OrderId {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

/// Unrecognized payment method code on the wire.
#[derive(Debug, Error)]
#[error("unrecognized pay method: {0}")]
pub struct PayMethodError(pub i16);

/// How the buyer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum PayMethod {
    /// Pay the courier on delivery.
    CashOnDelivery = 1,
    /// Pay online before shipment.
    Online = 2,
}

impl PayMethod {
    /// Wire code for this method.
    #[must_use]
    pub const fn as_i16(self) -> i16 {
        self as i16
    }

    /// The status a fresh order starts in for this method.
    #[must_use]
    pub const fn initial_status(self) -> OrderStatus {
        match self {
            Self::CashOnDelivery => OrderStatus::Unsent,
            Self::Online => OrderStatus::Unpaid,
        }
    }
}

impl TryFrom<i16> for PayMethod {
    type Error = PayMethodError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::CashOnDelivery),
            2 => Ok(Self::Online),
            other => Err(PayMethodError(other)),
        }
    }
}

/// Order lifecycle status.
///
/// Online orders move `Unpaid → Paid → Shipped → Completed`; cash-on-delivery
/// orders skip payment and move `Unsent → Shipped → Completed`. Orders are
/// never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Unpaid = 1,
    Unsent = 2,
    Paid = 3,
    Shipped = 4,
    Completed = 5,
}

impl OrderStatus {
    /// Whether `next` is a legal transition from this status.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unpaid, Self::Paid)
                | (Self::Paid | Self::Unsent, Self::Shipped)
                | (Self::Shipped, Self::Completed)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_order_id_shape() {
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 12, 30, 45).unwrap();
        let id = OrderId::derive(at, UserId::new(42));
        assert_eq!(id.as_str(), "20260806123045000000042");
        assert_eq!(id.as_str().len(), 23);
    }

    #[test]
    fn test_same_second_same_user_collides() {
        let at = Utc.with_ymd_and_hms(2026, 8, 6, 12, 30, 45).unwrap();
        assert_eq!(
            OrderId::derive(at, UserId::new(7)),
            OrderId::derive(at, UserId::new(7))
        );
    }

    #[test]
    fn test_pay_method_codes() {
        assert_eq!(PayMethod::try_from(1).unwrap(), PayMethod::CashOnDelivery);
        assert_eq!(PayMethod::try_from(2).unwrap(), PayMethod::Online);
        assert!(PayMethod::try_from(9).is_err());
        assert_eq!(PayMethod::Online.as_i16(), 2);
    }

    #[test]
    fn test_initial_status_per_method() {
        assert_eq!(PayMethod::Online.initial_status(), OrderStatus::Unpaid);
        assert_eq!(
            PayMethod::CashOnDelivery.initial_status(),
            OrderStatus::Unsent
        );
    }

    #[test]
    fn test_status_transitions() {
        use OrderStatus::{Completed, Paid, Shipped, Unpaid, Unsent};

        assert!(Unpaid.can_transition_to(Paid));
        assert!(Paid.can_transition_to(Shipped));
        assert!(Unsent.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Completed));

        assert!(!Unpaid.can_transition_to(Shipped));
        assert!(!Unsent.can_transition_to(Paid));
        assert!(!Completed.can_transition_to(Unpaid));
        assert!(!Shipped.can_transition_to(Unpaid));
    }
}
