pub mod commands;
pub mod handlers;
pub mod router;

pub use commands::{
    remote_start_transaction, remote_stop_transaction, CommandError, CommandSender,
    CommandStatus, SharedCommandSender,
};
pub use handlers::{HandlerContext, HandlerError, HandlerFn, HandlerResult};
pub use router::Router;
