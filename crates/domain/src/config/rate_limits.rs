use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Per-caller command budgets
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Fixed-window budgets keyed by operation class.
///
/// Classes without an entry in `classes` fall back to `default`.  Each
/// `(caller, class)` pair consumes from its own bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default)]
    pub default: WindowLimit,
    #[serde(default = "d_classes")]
    pub classes: HashMap<String, WindowLimit>,
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            default: WindowLimit::default(),
            classes: d_classes(),
        }
    }
}

impl RateLimitsConfig {
    pub fn for_class(&self, class: &str) -> WindowLimit {
        self.classes.get(class).copied().unwrap_or(self.default)
    }
}

/// `limit` requests per `window_secs`-second window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub limit: u32,
    pub window_secs: u64,
}

impl Default for WindowLimit {
    fn default() -> Self {
        Self {
            limit: 120,
            window_secs: 60,
        }
    }
}

fn d_classes() -> HashMap<String, WindowLimit> {
    let mut classes = HashMap::new();
    classes.insert(
        "code".to_string(),
        WindowLimit {
            limit: 20,
            window_secs: 60,
        },
    );
    classes.insert(
        "search".to_string(),
        WindowLimit {
            limit: 60,
            window_secs: 60,
        },
    );
    classes
}
