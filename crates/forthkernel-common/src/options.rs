use serde::Deserialize;

/// Per-kernel configuration.
///
/// Every field has a default so a partial `[kernel]` table (or none at all)
/// yields a usable configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct KernelOptions {
    /// Install the `EVAL` host binding. It runs arbitrary host code, so
    /// deployments that cannot trust notebook authors should turn it off.
    pub allow_eval: bool,
    /// Suppress the engine's own " ok" chatter; the kernel publishes its
    /// own status line instead.
    pub silent: bool,
    /// When false, cell source is upper-cased before it reaches the engine.
    pub case_sensitive: bool,
    /// Base location prepended to relative `INCLUDE` file names.
    pub base_path: String,
    /// Shell used by the `EVAL` binding (`<shell> -c <code>`).
    pub eval_shell: String,
}

impl Default for KernelOptions {
    fn default() -> Self {
        Self {
            allow_eval: true,
            silent: true,
            case_sensitive: false,
            base_path: String::new(),
            eval_shell: "sh".to_string(),
        }
    }
}

impl KernelOptions {
    /// Resolve an `INCLUDE` file name against the configured base location.
    ///
    /// Names starting with `/` are taken as-is.
    pub fn resolve_include(&self, filename: &str) -> String {
        if filename.starts_with('/') || self.base_path.is_empty() {
            return filename.to_string();
        }
        format!(
            "{}/{}",
            self.base_path.trim_end_matches('/'),
            filename.trim_start_matches("./")
        )
    }
}
