//! Core domain entities and repository contracts

pub mod error;
pub mod id_tag;
pub mod ocpp;
pub mod repositories;
pub mod transaction;

pub use error::{DomainError, DomainResult};
pub use id_tag::{AuthorizationRecord, AuthorizationStore, IdTagStatus};
pub use ocpp::OcppVersion;
pub use repositories::RepositoryProvider;
pub use transaction::{
    NewTransaction, StopTransaction, Transaction, TransactionRepository, TransactionStatus,
};
