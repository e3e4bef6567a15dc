//! Authorization store interface

use async_trait::async_trait;

use super::model::AuthorizationRecord;
use crate::domain::DomainResult;

/// Read contract of the external authorization backend.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Zero or one record for `id_tag`.
    async fn find_by_id_tag(&self, id_tag: &str) -> DomainResult<Option<AuthorizationRecord>>;
}
