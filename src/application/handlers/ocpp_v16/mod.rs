//! OCPP 1.6 action handlers
//!
//! Charge-point-initiated actions only. Payloads are deserialized into
//! `rust_ocpp::v1_6` request types inside each handler; a payload that does
//! not fit its type is answered with `FormationViolation`.

mod handle_authorize;
mod handle_boot_notification;
mod handle_change_availability;
mod handle_heartbeat;
mod handle_meter_values;
mod handle_start_transaction;
mod handle_stop_transaction;

pub use handle_authorize::handle_authorize;
pub use handle_boot_notification::handle_boot_notification;
pub use handle_change_availability::handle_change_availability;
pub use handle_heartbeat::handle_heartbeat;
pub use handle_meter_values::handle_meter_values;
pub use handle_start_transaction::handle_start_transaction;
pub use handle_stop_transaction::handle_stop_transaction;
