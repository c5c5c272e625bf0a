//! Interactive management client: command parsing and the API connection.

pub mod client;
pub mod command;

pub use client::{ApiClient, ClientError};
pub use command::{Command, CommandError};
