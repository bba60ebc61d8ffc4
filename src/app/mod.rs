//! Command handlers behind the `kvmhv` binary.

pub mod common;
pub mod error;
pub mod lifecycle;
pub mod query;

pub use error::exit_code;
pub use lifecycle::{handle_console, handle_reboot, handle_start, handle_stop};
pub use query::{handle_info, handle_list, handle_node_info, handle_validate, handle_verify};
