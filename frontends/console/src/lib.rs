//! Line-oriented console frontend for formbridge.

pub mod app;
pub mod command;
pub mod render;

pub use app::{ConsoleApp, Step};
pub use command::{Command, ParseError};
