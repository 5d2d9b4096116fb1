//! Core data types for Figma requests, renders, and downloads.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Render format accepted by the Figma images endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderFormat {
    Png,
    Svg,
    Jpg,
    Pdf,
}

impl RenderFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderFormat::Png => "png",
            RenderFormat::Svg => "svg",
            RenderFormat::Jpg => "jpg",
            RenderFormat::Pdf => "pdf",
        }
    }

    /// Pick a render format from a target file name's extension. Defaults to PNG.
    pub fn from_file_name(file_name: &str) -> Self {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "svg" => RenderFormat::Svg,
            "jpg" | "jpeg" => RenderFormat::Jpg,
            "pdf" => RenderFormat::Pdf,
            _ => RenderFormat::Png,
        }
    }
}

/// One image to fetch and write to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    pub node_id: String,
    /// Image fill reference. When set, the original fill asset is downloaded
    /// instead of a render of the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    pub file_name: String,
}

/// A file written by [`crate::FigmaService::download_images`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadedImage {
    pub node_id: String,
    pub path: PathBuf,
    pub bytes: usize,
}

/// Errors that can occur talking to the Figma API.
#[derive(thiserror::Error, Debug)]
pub enum FigmaError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Figma API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid file key: {0}")]
    InvalidFileKey(String),

    #[error("Invalid node ID: {0}")]
    InvalidNodeId(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("No Figma credentials configured (set FIGMA_API_KEY or FIGMA_OAUTH_TOKEN)")]
    MissingCredentials,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type FigmaResult<T> = Result<T, FigmaError>;
