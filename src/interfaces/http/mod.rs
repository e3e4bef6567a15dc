//! HTTP REST API interfaces
//!
//! - `handlers`: health, connected charge points, remote commands, metrics
//! - `middleware`: request metrics
//! - `router`: route table and shared state

pub mod common;
pub mod handlers;
pub mod middleware;
pub mod router;

pub use router::{create_api_router, ApiState};
