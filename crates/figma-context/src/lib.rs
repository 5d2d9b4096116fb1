//! Figma REST client for file data, node renders, and image downloads.

pub mod auth;
pub mod client;
pub mod ids;
pub mod types;

pub use auth::FigmaAuth;
pub use client::{FigmaService, DEFAULT_BASE_URL};
pub use ids::{normalize_node_id, safe_local_path, validate_file_key};
pub use types::*;
