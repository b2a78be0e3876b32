//! Subcommand implementations, one module per `Commands` variant.

pub mod delete;
pub mod drop_folder;
pub mod list;
pub mod push;
pub mod rebuild;
pub mod search;
