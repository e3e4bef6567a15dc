//! Transaction repository interface

use async_trait::async_trait;

use super::model::{NewTransaction, StopTransaction, Transaction};
use crate::domain::DomainResult;

/// Issues transaction ids and tracks transaction state.
///
/// Implementations must hand out every id at most once, however many
/// sessions call [`TransactionRepository::start`] concurrently.
#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn start(&self, new: NewTransaction) -> DomainResult<Transaction>;
    async fn stop(&self, id: i32, stop: StopTransaction) -> DomainResult<Transaction>;
    async fn find_by_id(&self, id: i32) -> DomainResult<Option<Transaction>>;
    async fn find_by_charge_point(&self, charge_point_id: &str) -> DomainResult<Vec<Transaction>>;
}
