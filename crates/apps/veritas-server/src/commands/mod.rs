//! Command implementations.

mod check;
mod init;
mod quote;
mod serve;

pub use check::check_config;
pub use init::init;
pub use quote::{quote, Quote};
pub use serve::{serve, serve_until};
