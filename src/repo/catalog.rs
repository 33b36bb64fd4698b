use std::path::PathBuf;
use std::time::Duration;

use crate::foundation::core::AppId;
use crate::foundation::error::{FrameloopError, FrameloopResult};
use crate::foundation::fsutil::normalize_rel_path;

/// Listing file of one app in a catalog.
pub const CATALOG_MANIFEST: &str = "manifest.json";

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Catalog description of one app.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CatalogApp {
    /// App id; must match the requested id.
    pub id: AppId,
    /// Display name.
    pub name: String,
    /// One-line description.
    #[serde(default)]
    pub summary: String,
    /// Source file name, relative to the app directory.
    pub source: String,
    /// Asset files, relative to the app's catalog directory.
    #[serde(default)]
    pub assets: Vec<String>,
    /// Catalog revision (commit, version tag).
    #[serde(default)]
    pub revision: Option<String>,
}

impl CatalogApp {
    /// Check the listing belongs to `expected` and normalize its file paths.
    pub fn validated(mut self, expected: &AppId) -> FrameloopResult<Self> {
        if &self.id != expected {
            return Err(FrameloopError::download(format!(
                "catalog listing for '{expected}' describes '{}'",
                self.id
            )));
        }
        let source = normalize_rel_path(&self.source)?;
        if source.contains('/') {
            return Err(FrameloopError::download(format!(
                "source '{}' must be a plain file name",
                self.source
            )));
        }
        self.source = source;
        self.assets = self
            .assets
            .iter()
            .map(|a| normalize_rel_path(a))
            .collect::<FrameloopResult<Vec<_>>>()?;
        Ok(self)
    }
}

/// Remote source of installable apps.
pub trait Catalog: Send + Sync {
    /// Listing of `app`.
    fn describe(&self, app: &AppId) -> FrameloopResult<CatalogApp>;

    /// Contents of `path` (normalized, relative) in the catalog directory of `app`.
    fn fetch(&self, app: &AppId, path: &str) -> FrameloopResult<Vec<u8>>;
}

/// Catalog served over HTTP: `{base}/{id}/manifest.json` and `{base}/{id}/{path}`.
pub struct HttpCatalog {
    base: String,
    client: reqwest::blocking::Client,
}

impl HttpCatalog {
    /// Catalog rooted at `base_url`.
    pub fn new(base_url: impl Into<String>) -> FrameloopResult<Self> {
        let base = base_url.into().trim_end_matches('/').to_owned();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(FrameloopError::config(format!(
                "catalog url '{base}' must start with http:// or https://"
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .user_agent(concat!("frameloop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FrameloopError::config(format!("failed to build http client: {e}")))?;
        Ok(Self { base, client })
    }

    /// URL of `path` for `app`.
    pub fn url(&self, app: &AppId, path: &str) -> String {
        format!("{}/{}/{}", self.base, app, path)
    }

    fn get(&self, url: &str) -> FrameloopResult<Vec<u8>> {
        tracing::debug!(url, "catalog request");
        let resp = self
            .client
            .get(url)
            .send()
            .map_err(|e| FrameloopError::download(format!("GET {url}: {e}")))?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FrameloopError::download(format!("GET {url}: not found")));
        }
        if !status.is_success() {
            return Err(FrameloopError::download(format!("GET {url}: http {status}")));
        }
        let bytes = resp
            .bytes()
            .map_err(|e| FrameloopError::download(format!("GET {url}: body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

impl Catalog for HttpCatalog {
    fn describe(&self, app: &AppId) -> FrameloopResult<CatalogApp> {
        let bytes = self.get(&self.url(app, CATALOG_MANIFEST))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FrameloopError::download(format!("bad catalog listing for '{app}': {e}")))
    }

    fn fetch(&self, app: &AppId, path: &str) -> FrameloopResult<Vec<u8>> {
        self.get(&self.url(app, path))
    }
}

/// Catalog mirrored on the local filesystem, same layout as [`HttpCatalog`].
#[derive(Clone, Debug)]
pub struct DirCatalog {
    root: PathBuf,
}

impl DirCatalog {
    /// Catalog rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read(&self, app: &AppId, path: &str) -> FrameloopResult<Vec<u8>> {
        let full = self.root.join(app.as_str()).join(path);
        std::fs::read(&full)
            .map_err(|e| FrameloopError::download(format!("read '{}': {e}", full.display())))
    }
}

impl Catalog for DirCatalog {
    fn describe(&self, app: &AppId) -> FrameloopResult<CatalogApp> {
        let bytes = self.read(app, CATALOG_MANIFEST)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| FrameloopError::download(format!("bad catalog listing for '{app}': {e}")))
    }

    fn fetch(&self, app: &AppId, path: &str) -> FrameloopResult<Vec<u8>> {
        let path = normalize_rel_path(path)?;
        self.read(app, &path)
    }
}
