//! Figma REST API client.

use std::collections::HashMap;
use std::path::Path;

use base64::Engine;
use serde::Deserialize;
use serde_json::Value;

use crate::auth::FigmaAuth;
use crate::ids::{normalize_node_id, validate_file_key};
use crate::types::{DownloadedImage, FigmaError, FigmaResult, ImageRequest, RenderFormat};

/// Default Figma REST API root.
pub const DEFAULT_BASE_URL: &str = "https://api.figma.com/v1";

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    images: HashMap<String, Option<String>>,
}

#[derive(Debug, Deserialize)]
struct ImageFillsResponse {
    #[serde(default)]
    meta: ImageFillsMeta,
}

#[derive(Debug, Default, Deserialize)]
struct ImageFillsMeta {
    #[serde(default)]
    images: HashMap<String, String>,
}

/// Thin async client over the Figma REST endpoints the tools need.
#[derive(Debug, Clone)]
pub struct FigmaService {
    http: reqwest::Client,
    base_url: String,
    auth: FigmaAuth,
}

impl FigmaService {
    pub fn new(auth: FigmaAuth) -> Self {
        Self::with_base_url(auth, DEFAULT_BASE_URL)
    }

    /// Point the client at a different API root (used by tests and proxies).
    pub fn with_base_url(auth: FigmaAuth, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            auth,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> FigmaResult<T> {
        let (header, value) = self.auth.header()?;
        let url = format!("{}{path}", self.base_url);
        tracing::debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .header(header, value)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| {
                    v.get("err")
                        .or_else(|| v.get("message"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                })
                .unwrap_or(body);
            return Err(FigmaError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }

    /// Fetch a whole file document.
    pub async fn get_file(&self, file_key: &str, depth: Option<u32>) -> FigmaResult<Value> {
        let file_key = validate_file_key(file_key)?;
        let mut query = Vec::new();
        if let Some(depth) = depth {
            query.push(("depth", depth.to_string()));
        }
        self.get_json(&format!("/files/{file_key}"), &query).await
    }

    /// Fetch specific node subtrees from a file.
    pub async fn get_nodes(
        &self,
        file_key: &str,
        node_ids: &[String],
        depth: Option<u32>,
    ) -> FigmaResult<Value> {
        let file_key = validate_file_key(file_key)?;
        let ids = normalize_all(node_ids)?;
        let mut query = vec![("ids", ids.join(","))];
        if let Some(depth) = depth {
            query.push(("depth", depth.to_string()));
        }
        self.get_json(&format!("/files/{file_key}/nodes"), &query)
            .await
    }

    /// Ask Figma to render nodes and return the temporary render URLs.
    ///
    /// Nodes Figma could not render map to `None`.
    pub async fn get_image_urls(
        &self,
        file_key: &str,
        node_ids: &[String],
        format: RenderFormat,
        scale: f32,
    ) -> FigmaResult<HashMap<String, Option<String>>> {
        let file_key = validate_file_key(file_key)?;
        let ids = normalize_all(node_ids)?;
        let mut query = vec![
            ("ids", ids.join(",")),
            ("format", format.as_str().to_string()),
        ];
        if format != RenderFormat::Svg {
            query.push(("scale", scale.to_string()));
        }

        let response: ImagesResponse = self
            .get_json(&format!("/images/{file_key}"), &query)
            .await?;
        if let Some(err) = response.err {
            return Err(FigmaError::Api {
                status: 400,
                message: err,
            });
        }
        Ok(response.images)
    }

    /// Map of image fill reference to download URL for every fill in a file.
    pub async fn get_image_fills(&self, file_key: &str) -> FigmaResult<HashMap<String, String>> {
        let file_key = validate_file_key(file_key)?;
        let response: ImageFillsResponse = self
            .get_json(&format!("/files/{file_key}/images"), &[])
            .await?;
        Ok(response.meta.images)
    }

    /// Download raw bytes from a render or fill URL.
    pub async fn fetch_bytes(&self, url: &str) -> FigmaResult<Vec<u8>> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FigmaError::Api {
                status: status.as_u16(),
                message: format!("download failed for {url}"),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }

    /// Render a single node as PNG and return it base64-encoded.
    ///
    /// Returns `Ok(None)` when the node exists but has nothing to render.
    pub async fn get_node_screenshot(
        &self,
        file_key: &str,
        node_id: &str,
    ) -> FigmaResult<Option<String>> {
        let node_id = normalize_node_id(node_id)?;
        let urls = self
            .get_image_urls(file_key, std::slice::from_ref(&node_id), RenderFormat::Png, 1.0)
            .await?;

        let Some(url) = urls.get(&node_id).cloned().flatten() else {
            return Ok(None);
        };

        let bytes = self.fetch_bytes(&url).await?;
        Ok(Some(
            base64::engine::general_purpose::STANDARD.encode(bytes),
        ))
    }

    /// Download renders and image fills into `dir`.
    ///
    /// Requests with an `image_ref` pull the original fill asset; the rest are
    /// rendered in the format implied by their file name. Requests that Figma
    /// cannot satisfy are skipped with a warning.
    pub async fn download_images(
        &self,
        file_key: &str,
        dir: &Path,
        requests: &[ImageRequest],
        png_scale: f32,
    ) -> FigmaResult<Vec<DownloadedImage>> {
        tokio::fs::create_dir_all(dir).await?;

        let mut downloads: Vec<(String, String, String)> = Vec::new();

        let fill_requests: Vec<&ImageRequest> =
            requests.iter().filter(|r| r.image_ref.is_some()).collect();
        if !fill_requests.is_empty() {
            let fills = self.get_image_fills(file_key).await?;
            for req in fill_requests {
                let image_ref = req.image_ref.as_deref().unwrap_or_default();
                match fills.get(image_ref) {
                    Some(url) => downloads.push((
                        req.node_id.clone(),
                        url.clone(),
                        req.file_name.clone(),
                    )),
                    None => tracing::warn!("No image fill found for ref {image_ref}"),
                }
            }
        }

        let mut by_format: HashMap<RenderFormat, Vec<&ImageRequest>> = HashMap::new();
        for req in requests.iter().filter(|r| r.image_ref.is_none()) {
            by_format
                .entry(RenderFormat::from_file_name(&req.file_name))
                .or_default()
                .push(req);
        }

        for (format, reqs) in by_format {
            let ids = reqs
                .iter()
                .map(|r| normalize_node_id(&r.node_id))
                .collect::<FigmaResult<Vec<_>>>()?;
            let urls = self.get_image_urls(file_key, &ids, format, png_scale).await?;
            for (req, id) in reqs.into_iter().zip(ids) {
                match urls.get(&id).cloned().flatten() {
                    Some(url) => downloads.push((id, url, req.file_name.clone())),
                    None => tracing::warn!("Figma returned no render for node {id}"),
                }
            }
        }

        let mut saved = Vec::with_capacity(downloads.len());
        for (node_id, url, file_name) in downloads {
            let path = crate::ids::safe_local_path(dir, &file_name)?;
            let bytes = self.fetch_bytes(&url).await?;
            tokio::fs::write(&path, &bytes).await?;
            tracing::info!("Saved {} ({} bytes)", path.display(), bytes.len());
            saved.push(DownloadedImage {
                node_id,
                path,
                bytes: bytes.len(),
            });
        }

        Ok(saved)
    }
}

fn normalize_all(node_ids: &[String]) -> FigmaResult<Vec<String>> {
    node_ids.iter().map(|id| normalize_node_id(id)).collect()
}
