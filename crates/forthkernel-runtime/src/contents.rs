//! File-content collaborators used by `INCLUDE`.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use forthkernel_common::ContentsConfig;
use reqwest::header::AUTHORIZATION;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentsError {
    #[error("path '{0}' escapes the contents root")]
    OutsideRoot(String),

    #[error("failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("contents request for '{path}' failed: {source}")]
    Http {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("contents service returned no text for '{0}'")]
    NoContent(String),

    #[error("token environment variable '{0}' is not set")]
    MissingToken(String),
}

/// Source of file content, addressed by notebook-server style paths.
#[async_trait]
pub trait ContentsProvider: Send + Sync {
    async fn get(&self, path: &str) -> Result<String, ContentsError>;
}

/// Files under a local directory. Leading `/` is relative to the root.
#[derive(Debug, Clone)]
pub struct FsContents {
    root: PathBuf,
}

impl FsContents {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ContentsError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(ContentsError::OutsideRoot(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ContentsProvider for FsContents {
    async fn get(&self, path: &str) -> Result<String, ContentsError> {
        let file = self.resolve(path)?;
        tokio::fs::read_to_string(&file)
            .await
            .map_err(|source| ContentsError::Io {
                path: path.to_string(),
                source,
            })
    }
}

/// A Jupyter-compatible contents REST service.
#[derive(Debug, Clone)]
pub struct HttpContents {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpContents {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/api/contents/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl ContentsProvider for HttpContents {
    async fn get(&self, path: &str) -> Result<String, ContentsError> {
        let http_err = |source: reqwest::Error| ContentsError::Http {
            path: path.to_string(),
            source,
        };

        let mut request = self
            .client
            .get(self.url(path))
            .query(&[("content", "1"), ("type", "file"), ("format", "text")]);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("token {token}"));
        }

        let body: serde_json::Value = request
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(http_err)?
            .json()
            .await
            .map_err(http_err)?;

        body.get("content")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ContentsError::NoContent(path.to_string()))
    }
}

/// Build the provider described by a manifest `[contents]` table.
pub fn from_config(config: &ContentsConfig) -> Result<Arc<dyn ContentsProvider>, ContentsError> {
    match config {
        ContentsConfig::Fs { root } => Ok(Arc::new(FsContents::new(
            root.clone().unwrap_or_else(|| PathBuf::from(".")),
        ))),
        ContentsConfig::Http {
            base_url,
            token_env,
        } => {
            let token = token_env
                .as_ref()
                .map(|var| std::env::var(var).map_err(|_| ContentsError::MissingToken(var.clone())))
                .transpose()?;
            Ok(Arc::new(HttpContents::new(base_url.clone(), token)))
        }
    }
}
