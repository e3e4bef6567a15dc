//! Repository access for the application layer

use super::id_tag::AuthorizationStore;
use super::transaction::TransactionRepository;

/// Provides access to all domain repositories.
///
/// Handlers receive an `Arc<dyn RepositoryProvider>` instead of reaching
/// for a process-wide client, so tests can inject in-memory fakes.
pub trait RepositoryProvider: Send + Sync {
    fn id_tags(&self) -> &dyn AuthorizationStore;
    fn transactions(&self) -> &dyn TransactionRepository;
}
