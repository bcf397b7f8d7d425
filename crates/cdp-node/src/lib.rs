//! HTTP management surface of a Diameter node

pub mod api;
pub mod error;

pub use api::create_router;
pub use error::ApiError;
