//! Transaction aggregate

pub mod model;
pub mod repository;

pub use model::{NewTransaction, StopTransaction, Transaction, TransactionStatus};
pub use repository::TransactionRepository;
