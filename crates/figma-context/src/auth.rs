//! Figma API credentials.

use crate::types::{FigmaError, FigmaResult};

/// Credentials used to authenticate against the Figma REST API.
#[derive(Clone, Default)]
pub struct FigmaAuth {
    pub api_key: Option<String>,
    pub oauth_token: Option<String>,
    pub use_oauth: bool,
}

impl FigmaAuth {
    /// Personal access token auth.
    pub fn api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            oauth_token: None,
            use_oauth: false,
        }
    }

    /// OAuth bearer token auth.
    pub fn oauth(token: impl Into<String>) -> Self {
        Self {
            api_key: None,
            oauth_token: Some(token.into()),
            use_oauth: true,
        }
    }

    /// Header name and value to attach to every API request.
    pub fn header(&self) -> FigmaResult<(&'static str, String)> {
        if self.use_oauth {
            return match self.oauth_token.as_deref() {
                Some(token) if !token.is_empty() => {
                    Ok(("Authorization", format!("Bearer {token}")))
                }
                _ => Err(FigmaError::MissingCredentials),
            };
        }

        match self.api_key.as_deref() {
            Some(key) if !key.is_empty() => Ok(("X-Figma-Token", key.to_string())),
            _ => Err(FigmaError::MissingCredentials),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.header().is_ok()
    }
}

// Secrets stay out of logs.
impl std::fmt::Debug for FigmaAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FigmaAuth")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "<redacted>"))
            .field("use_oauth", &self.use_oauth)
            .finish()
    }
}
