//! Configuration loading and schema definitions
//!
//! Shared configuration types used by the runner, the Android commands and
//! the binaries.

mod loader;
mod schema;

pub use loader::{user_config_file, Config};
pub use schema::*;
