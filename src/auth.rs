//! Login payload extraction and the session token pair.
//!
//! The chat client opens the game's web view and hands back its URL. The
//! signed init data lives in the URL fragment as `tgWebAppData=...`; it is
//! exchanged once for a [`TokenPair`].

use std::path::PathBuf;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;

use crate::error::AuthError;

const WEBAPP_DATA_KEY: &str = "tgWebAppData=";
const WEBAPP_VERSION_KEY: &str = "&tgWebAppVersion";

/// Produces the one-time web-view URL for an account.
#[async_trait]
pub trait WebViewSource: Send + Sync {
    async fn webview_url(&self, account: &str) -> Result<String, AuthError>;
}

/// Reads web-view URLs that an external session tool drops next to the
/// session files, as `<dir>/<account>.webview`.
#[derive(Debug, Clone)]
pub struct FileWebViewSource {
    dir: PathBuf,
}

impl FileWebViewSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, account: &str) -> PathBuf {
        self.dir.join(format!("{account}.webview"))
    }
}

#[async_trait]
impl WebViewSource for FileWebViewSource {
    async fn webview_url(&self, account: &str) -> Result<String, AuthError> {
        let path = self.path_for(account);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| AuthError::WebView(format!("{}: {e}", path.display())))?;
        let url = contents.trim();
        if url.is_empty() {
            return Err(AuthError::WebView(format!("{} is empty", path.display())));
        }
        Ok(url.to_string())
    }
}

/// Signed init data extracted from a web-view URL.
#[derive(Clone)]
pub struct LoginPayload {
    pairs: Vec<(String, String)>,
}

impl std::fmt::Debug for LoginPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Values carry the signature, keys are enough for diagnostics.
        f.debug_struct("LoginPayload")
            .field("keys", &self.pairs.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>())
            .finish()
    }
}

impl LoginPayload {
    /// Extract the login payload from a web-view URL.
    pub fn from_webview_url(webview: &str) -> Result<Self, AuthError> {
        let fragment = match url::Url::parse(webview) {
            Ok(url) => url.fragment().map(str::to_string),
            Err(_) => webview.split_once('#').map(|(_, f)| f.to_string()),
        }
        .ok_or(AuthError::MissingPayload)?;

        let start = fragment
            .find(WEBAPP_DATA_KEY)
            .ok_or(AuthError::MissingPayload)?;
        let data = &fragment[start + WEBAPP_DATA_KEY.len()..];
        let data = data.split(WEBAPP_VERSION_KEY).next().unwrap_or_default();

        let decoded = urlencoding::decode(data).map_err(|_| AuthError::InvalidEncoding)?;

        let mut pairs = Vec::new();
        for part in decoded.split('&') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            let value = if key == "user" {
                urlencoding::decode(value)
                    .map_err(|_| AuthError::InvalidEncoding)?
                    .into_owned()
            } else {
                value.to_string()
            };
            pairs.push((key.to_string(), value));
        }

        if pairs.is_empty() {
            return Err(AuthError::MissingPayload);
        }
        Ok(Self { pairs })
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

/// Access and refresh tokens for one session.
#[derive(Debug, Deserialize)]
#[serde(from = "TokenResponse")]
pub struct TokenPair {
    pub access: SecretString,
    pub refresh: SecretString,
}

impl From<TokenResponse> for TokenPair {
    fn from(raw: TokenResponse) -> Self {
        Self {
            access: SecretString::from(raw.access_token),
            refresh: SecretString::from(raw.refresh_token),
        }
    }
}
