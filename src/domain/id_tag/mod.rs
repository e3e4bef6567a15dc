//! IdTag aggregate
//!
//! Authorization records and the read-only store they are looked up in.

pub mod model;
pub mod repository;

pub use model::{AuthorizationRecord, IdTagStatus};
pub use repository::AuthorizationStore;
