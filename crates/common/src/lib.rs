//! Shared types for the keyed dispatch workspace

mod error;
mod key;
mod secret;

pub use error::{Error, Result};
pub use key::ApiKey;
pub use secret::Secret;
