//! Shared primitives for the `ArthaQ` execution services
//!
//! Fixed-point price/quantity types, typed entity identifiers, and the
//! numeric constants every service agrees on. Services depend on this
//! crate, never the other way around.

pub mod constants;
pub mod ids;
pub mod strategy;
pub mod types;

pub use constants::*;
pub use ids::*;
pub use strategy::*;
pub use types::*;
