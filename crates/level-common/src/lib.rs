#![doc = "Common types shared across the water-level workspace."]

pub mod config;
pub mod error;
pub mod protocol;

pub use config::*;
pub use error::*;
pub use protocol::*;
