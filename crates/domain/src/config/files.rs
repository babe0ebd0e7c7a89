use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Files / roundtrip
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesConfig {
    /// Each project lives in `<projects_root>/<projectId>`.
    #[serde(default = "d_projects_root")]
    pub projects_root: PathBuf,
    /// Seconds a manifest may stay non-terminal before it expires.
    #[serde(default = "d_900")]
    pub manifest_ttl_secs: u64,
    #[serde(default = "d_100")]
    pub max_paths_per_manifest: usize,
    /// How often the sweeper expires and evicts manifests (seconds).
    #[serde(default = "d_60")]
    pub sweep_interval_secs: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            projects_root: d_projects_root(),
            manifest_ttl_secs: 900,
            max_paths_per_manifest: 100,
            sweep_interval_secs: 60,
        }
    }
}

// ── serde default helpers ───────────────────────────────────────────

fn d_projects_root() -> PathBuf {
    PathBuf::from("./data/projects")
}
fn d_900() -> u64 {
    900
}
fn d_100() -> usize {
    100
}
fn d_60() -> u64 {
    60
}
