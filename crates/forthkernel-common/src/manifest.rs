use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::options::KernelOptions;

pub const MANIFEST_FILE: &str = "Kernel.toml";

/// The parsed Kernel.toml manifest.
#[derive(Debug, Clone)]
pub struct KernelManifest {
    pub kernel: KernelOptions,
    pub contents: Option<ContentsConfig>,
    /// The directory containing the Kernel.toml file.
    pub root_dir: PathBuf,
}

/// Where `INCLUDE` fetches file content from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ContentsConfig {
    /// Files on the local filesystem, relative to `root`.
    Fs {
        #[serde(default)]
        root: Option<PathBuf>,
    },
    /// A Jupyter-compatible contents REST service.
    Http {
        base_url: String,
        #[serde(default)]
        token_env: Option<String>,
    },
}

/// Raw TOML structure for deserialization.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    kernel: KernelOptions,
    #[serde(default)]
    contents: Option<ContentsConfig>,
}

/// Errors that can occur when loading a manifest.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("no Kernel.toml found (searched from {0})")]
    NotFound(String),
    #[error("failed to read Kernel.toml: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("invalid Kernel.toml: {0}")]
    ParseError(String),
    #[error("invalid Kernel.toml: [contents] base_url '{0}' must start with http:// or https://")]
    InvalidBaseUrl(String),
    #[error("invalid Kernel.toml: [kernel] eval_shell must not be empty")]
    EmptyEvalShell,
}

/// Walk up from `start_dir` looking for `Kernel.toml`.
pub fn find_manifest(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir.to_path_buf();
    loop {
        let candidate = current.join(MANIFEST_FILE);
        if candidate.is_file() {
            return Some(candidate);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate a Kernel.toml manifest from a file path.
pub fn load_manifest(path: &Path) -> Result<KernelManifest, ManifestError> {
    let content = std::fs::read_to_string(path)?;
    let root_dir = path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    parse_manifest(&content, root_dir)
}

/// Parse and validate a Kernel.toml manifest from a string.
///
/// A relative filesystem contents root is resolved against `root_dir`.
pub fn parse_manifest(content: &str, root_dir: PathBuf) -> Result<KernelManifest, ManifestError> {
    let raw: RawManifest =
        toml::from_str(content).map_err(|e| ManifestError::ParseError(e.to_string()))?;

    if raw.kernel.eval_shell.trim().is_empty() {
        return Err(ManifestError::EmptyEvalShell);
    }

    let contents = match raw.contents {
        Some(ContentsConfig::Http { base_url, token_env }) => {
            if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
                return Err(ManifestError::InvalidBaseUrl(base_url));
            }
            Some(ContentsConfig::Http { base_url, token_env })
        }
        Some(ContentsConfig::Fs { root }) => {
            let root = match root {
                Some(r) if r.is_relative() => root_dir.join(r),
                Some(r) => r,
                None => root_dir.clone(),
            };
            Some(ContentsConfig::Fs { root: Some(root) })
        }
        None => None,
    };

    Ok(KernelManifest {
        kernel: raw.kernel,
        contents,
        root_dir,
    })
}

/// Find and load the manifest starting from `start_dir`.
pub fn find_and_load_manifest(start_dir: &Path) -> Result<KernelManifest, ManifestError> {
    let manifest_path = find_manifest(start_dir)
        .ok_or_else(|| ManifestError::NotFound(start_dir.display().to_string()))?;
    load_manifest(&manifest_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manifest_uses_defaults() {
        let manifest = parse_manifest("", PathBuf::from("/proj")).unwrap();
        assert_eq!(manifest.kernel, KernelOptions::default());
        assert!(manifest.contents.is_none());
    }

    #[test]
    fn kernel_table_overrides() {
        let manifest = parse_manifest(
            r#"
[kernel]
allow_eval = false
silent = false
base_path = "lib"
"#,
            PathBuf::from("/proj"),
        )
        .unwrap();
        assert!(!manifest.kernel.allow_eval);
        assert!(!manifest.kernel.silent);
        assert!(!manifest.kernel.case_sensitive);
        assert_eq!(manifest.kernel.base_path, "lib");
    }

    #[test]
    fn fs_root_resolves_against_manifest_dir() {
        let manifest = parse_manifest(
            r#"
[contents]
kind = "fs"
root = "forth"
"#,
            PathBuf::from("/proj"),
        )
        .unwrap();
        assert_eq!(
            manifest.contents,
            Some(ContentsConfig::Fs {
                root: Some(PathBuf::from("/proj/forth"))
            })
        );
    }

    #[test]
    fn fs_without_root_uses_manifest_dir() {
        let manifest =
            parse_manifest("[contents]\nkind = \"fs\"\n", PathBuf::from("/proj")).unwrap();
        assert_eq!(
            manifest.contents,
            Some(ContentsConfig::Fs {
                root: Some(PathBuf::from("/proj"))
            })
        );
    }

    #[test]
    fn http_requires_scheme() {
        let err = parse_manifest(
            "[contents]\nkind = \"http\"\nbase_url = \"localhost:8888\"\n",
            PathBuf::from("/proj"),
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidBaseUrl(_)));
    }

    #[test]
    fn empty_shell_rejected() {
        let err = parse_manifest("[kernel]\neval_shell = \"\"\n", PathBuf::from("/proj"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::EmptyEvalShell));
    }

    #[test]
    fn unknown_contents_kind_is_parse_error() {
        let err = parse_manifest("[contents]\nkind = \"s3\"\n", PathBuf::from("/proj"))
            .unwrap_err();
        assert!(matches!(err, ManifestError::ParseError(_)));
    }

    #[test]
    fn find_walks_up_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MANIFEST_FILE), "[kernel]\nsilent = false\n").unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let manifest = find_and_load_manifest(&nested).unwrap();
        assert!(!manifest.kernel.silent);
        assert_eq!(manifest.root_dir, dir.path());
    }

    #[test]
    fn find_reports_missing_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let err = find_and_load_manifest(dir.path());
        // A Kernel.toml further up the real filesystem would be found instead.
        if let Err(e) = err {
            assert!(matches!(e, ManifestError::NotFound(_)));
        }
    }
}
