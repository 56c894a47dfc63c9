//! Utility functions for identifiers, ownership tokens and timestamps.

mod ids;
pub mod timestamps;

pub use ids::{generate_ownership_token, generate_uuid};
pub use timestamps::{duration_ms, now_utc, Timestamp};
