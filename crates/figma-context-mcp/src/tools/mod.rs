//! MCP tool implementations.

pub mod download_figma_images;
pub mod get_figma_data;
pub mod get_node_screenshot;
pub mod registry;

pub use registry::{ToolHandler, ToolRegistry};
