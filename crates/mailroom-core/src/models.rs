//! Domain models and strongly-typed identifiers.
//!
//! Defines the `Email` entity, its lifecycle status enum, and the newtype
//! id wrapper used as the pagination cursor. Includes the sqlx
//! serialization glue so rows decode straight into domain types.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed email identifier.
///
/// Wraps the `BIGSERIAL` primary key. Ids are dense and strictly
/// increasing in creation order, which is what makes them usable as a
/// cursor for the list API.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct EmailId(pub i64);

impl fmt::Display for EmailId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for EmailId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for EmailId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EmailId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for EmailId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Email lifecycle status.
///
/// ```text
/// pending ──claim──▶ processing ──outcome──▶ sent
///    ▲                   │    └────────────▶ failed ──claim──▶ processing
///    └───────reaper──────┘
/// ```
///
/// `failed` rows stay claimable, so delivery is retried indefinitely.
/// Rows stuck in `processing` past the reaper threshold return to
/// `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    /// Queued and waiting for a worker.
    Pending,

    /// Claimed by a worker; dispatch in flight.
    ///
    /// Not a terminal state: rows orphaned here by a dead worker are
    /// requeued by the reaper once `updated_at` falls behind the
    /// stuck threshold.
    Processing,

    /// Delivered. Terminal.
    Sent,

    /// Delivery failed. Eligible for re-claim on the next iteration.
    Failed,
}

impl EmailStatus {
    /// Statuses exposed through the list API.
    ///
    /// `processing` is a worker-internal state and is deliberately not
    /// queryable.
    pub const QUERYABLE: [Self; 3] = [Self::Pending, Self::Sent, Self::Failed];

    /// Whether the status may be used as a list-API filter.
    pub fn is_queryable(self) -> bool {
        Self::QUERYABLE.contains(&self)
    }
}

impl fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for EmailStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(CoreError::InvalidInput(format!("unknown email status: {other}"))),
        }
    }
}

impl sqlx::Type<PgDb> for EmailStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for EmailStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        s.parse().map_err(|_| format!("invalid email status: {s}").into())
    }
}

/// A queued outbound email.
///
/// Rows are created by the ingress path in `pending`, transitioned by
/// workers and the reaper, and retained indefinitely. `updated_at`
/// advances on every status write and doubles as the stuck-detection
/// clock.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Email {
    /// Primary key and pagination cursor.
    pub id: EmailId,

    /// Recipient address (RFC 5322, validated at ingress).
    pub to_address: String,

    /// Subject line.
    pub subject: String,

    /// Message body.
    pub body: String,

    /// Current lifecycle status.
    pub status: EmailStatus,

    /// Refreshed by the store on every status change.
    pub updated_at: DateTime<Utc>,
}

/// Data needed to enqueue a new email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewEmail {
    /// Recipient address.
    pub to_address: String,

    /// Subject line.
    pub subject: String,

    /// Message body.
    pub body: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_and_parse_round_trip() {
        for status in
            [EmailStatus::Pending, EmailStatus::Processing, EmailStatus::Sent, EmailStatus::Failed]
        {
            let parsed: EmailStatus = status.to_string().parse().expect("status should parse");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn unknown_status_rejected() {
        assert!("delivering".parse::<EmailStatus>().is_err());
        assert!("".parse::<EmailStatus>().is_err());
    }

    #[test]
    fn processing_is_not_queryable() {
        assert!(!EmailStatus::Processing.is_queryable());
        assert!(EmailStatus::Pending.is_queryable());
        assert!(EmailStatus::Sent.is_queryable());
        assert!(EmailStatus::Failed.is_queryable());
    }

    #[test]
    fn status_serializes_as_snake_case() {
        assert_eq!(serde_json::to_string(&EmailStatus::Pending).unwrap(), "\"pending\"");
        assert_eq!(serde_json::to_string(&EmailStatus::Processing).unwrap(), "\"processing\"");
    }

    #[test]
    fn email_id_orders_by_value() {
        assert!(EmailId(1) < EmailId(2));
        assert_eq!(EmailId::from(7), EmailId(7));
    }
}
