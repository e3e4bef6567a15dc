//! In-memory storage implementation
//!
//! Stands in for the external persistence backend during development and
//! in tests.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;

use crate::domain::{
    AuthorizationRecord, AuthorizationStore, DomainError, DomainResult, NewTransaction,
    RepositoryProvider, StopTransaction, Transaction, TransactionRepository,
};

// ── Authorization ──────────────────────────────────────────────

/// Authorization records keyed by id tag
#[derive(Default)]
pub struct InMemoryAuthorizationStore {
    records: DashMap<String, AuthorizationRecord>,
}

impl InMemoryAuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: impl IntoIterator<Item = AuthorizationRecord>) -> Self {
        let store = Self::new();
        for record in records {
            store.upsert(record);
        }
        store
    }

    pub fn upsert(&self, record: AuthorizationRecord) {
        self.records.insert(record.id_tag.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl AuthorizationStore for InMemoryAuthorizationStore {
    async fn find_by_id_tag(&self, id_tag: &str) -> DomainResult<Option<AuthorizationRecord>> {
        Ok(self.records.get(id_tag).map(|r| r.value().clone()))
    }
}

// ── Transactions ───────────────────────────────────────────────

/// Issues transaction ids and keeps every transaction for audit.
pub struct TransactionRegistry {
    transactions: DashMap<i32, Transaction>,
    next_id: AtomicI32,
}

impl TransactionRegistry {
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
            next_id: AtomicI32::new(1),
        }
    }

    fn issue_id(&self) -> i32 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn count(&self) -> usize {
        self.transactions.len()
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionRepository for TransactionRegistry {
    async fn start(&self, new: NewTransaction) -> DomainResult<Transaction> {
        let id = self.issue_id();
        let transaction = Transaction::start(id, new);
        self.transactions.insert(id, transaction.clone());
        info!(
            transaction_id = id,
            charge_point_id = transaction.charge_point_id.as_str(),
            connector_id = transaction.connector_id,
            "Transaction started"
        );
        Ok(transaction)
    }

    async fn stop(&self, id: i32, stop: StopTransaction) -> DomainResult<Transaction> {
        let mut entry = self.transactions.get_mut(&id).ok_or(DomainError::NotFound {
            entity: "transaction",
            field: "id",
            value: id.to_string(),
        })?;

        if !entry.is_active() {
            return Err(DomainError::TransactionAlreadyStopped(id));
        }
        entry.stop(stop);
        info!(
            transaction_id = id,
            meter_stop = ?entry.meter_stop,
            "Transaction stopped"
        );
        Ok(entry.clone())
    }

    async fn find_by_id(&self, id: i32) -> DomainResult<Option<Transaction>> {
        Ok(self.transactions.get(&id).map(|t| t.value().clone()))
    }

    async fn find_by_charge_point(&self, charge_point_id: &str) -> DomainResult<Vec<Transaction>> {
        let mut list: Vec<Transaction> = self
            .transactions
            .iter()
            .filter(|t| t.charge_point_id == charge_point_id)
            .map(|t| t.value().clone())
            .collect();
        list.sort_by_key(|t| t.id);
        Ok(list)
    }
}

// ── Provider ───────────────────────────────────────────────────

/// [`RepositoryProvider`] backed by the in-memory stores above.
#[derive(Default)]
pub struct InMemoryRepositoryProvider {
    id_tags: InMemoryAuthorizationStore,
    transactions: TransactionRegistry,
}

impl InMemoryRepositoryProvider {
    pub fn new(id_tags: InMemoryAuthorizationStore) -> Self {
        Self {
            id_tags,
            transactions: TransactionRegistry::new(),
        }
    }

    pub fn authorization_store(&self) -> &InMemoryAuthorizationStore {
        &self.id_tags
    }

    pub fn transaction_registry(&self) -> &TransactionRegistry {
        &self.transactions
    }
}

impl RepositoryProvider for InMemoryRepositoryProvider {
    fn id_tags(&self) -> &dyn AuthorizationStore {
        &self.id_tags
    }

    fn transactions(&self) -> &dyn TransactionRepository {
        &self.transactions
    }
}
