//! IdTag domain entity

use chrono::{DateTime, Utc};
use rust_ocpp::v1_6::types::{AuthorizationStatus, IdTagInfo};
use serde::{Deserialize, Serialize};

/// IdTag authorization status (OCPP 1.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdTagStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
    ConcurrentTx,
}

impl std::fmt::Display for IdTagStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Accepted => write!(f, "Accepted"),
            Self::Blocked => write!(f, "Blocked"),
            Self::Expired => write!(f, "Expired"),
            Self::Invalid => write!(f, "Invalid"),
            Self::ConcurrentTx => write!(f, "ConcurrentTx"),
        }
    }
}

impl From<IdTagStatus> for AuthorizationStatus {
    fn from(status: IdTagStatus) -> Self {
        match status {
            IdTagStatus::Accepted => AuthorizationStatus::Accepted,
            IdTagStatus::Blocked => AuthorizationStatus::Blocked,
            IdTagStatus::Expired => AuthorizationStatus::Expired,
            IdTagStatus::Invalid => AuthorizationStatus::Invalid,
            IdTagStatus::ConcurrentTx => AuthorizationStatus::ConcurrentTx,
        }
    }
}

/// Authorization record for one RFID card / token, as kept by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRecord {
    pub id_tag: String,
    pub status: IdTagStatus,
    #[serde(default)]
    pub expiry_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent_id_tag: Option<String>,
}

impl AuthorizationRecord {
    pub fn new(id_tag: impl Into<String>, status: IdTagStatus) -> Self {
        Self {
            id_tag: id_tag.into(),
            status,
            expiry_date: None,
            parent_id_tag: None,
        }
    }

    pub fn with_expiry(mut self, expiry_date: DateTime<Utc>) -> Self {
        self.expiry_date = Some(expiry_date);
        self
    }

    pub fn with_parent(mut self, parent_id_tag: impl Into<String>) -> Self {
        self.parent_id_tag = Some(parent_id_tag.into());
        self
    }

    /// The `idTagInfo` a charge point sees for this record.
    pub fn id_tag_info(&self) -> IdTagInfo {
        IdTagInfo {
            status: self.status.into(),
            expiry_date: self.expiry_date,
            parent_id_tag: self.parent_id_tag.clone(),
        }
    }

    /// The `idTagInfo` for a tag the store does not know.
    pub fn unknown_id_tag_info() -> IdTagInfo {
        IdTagInfo {
            status: AuthorizationStatus::Invalid,
            expiry_date: None,
            parent_id_tag: None,
        }
    }
}
