mod connection;
mod migrations;

pub use connection::{Database, SharedDatabase};
