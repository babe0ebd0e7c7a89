use serde::{Deserialize, Serialize};

use crate::command::Domain;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Domain enable flags
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Per-domain on/off switches.  A disabled domain still resolves, but the
/// dispatcher refuses to invoke it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainsConfig {
    #[serde(default = "d_true")]
    pub memories: bool,
    #[serde(default = "d_true")]
    pub knowledge: bool,
    #[serde(default = "d_true")]
    pub files: bool,
    #[serde(default = "d_true")]
    pub code: bool,
    #[serde(default = "d_true")]
    pub conversations: bool,
    #[serde(default = "d_true")]
    pub hydration: bool,
    #[serde(default = "d_true")]
    pub search: bool,
    #[serde(default = "d_true")]
    pub projects: bool,
}

impl Default for DomainsConfig {
    fn default() -> Self {
        Self {
            memories: true,
            knowledge: true,
            files: true,
            code: true,
            conversations: true,
            hydration: true,
            search: true,
            projects: true,
        }
    }
}

impl DomainsConfig {
    pub fn is_enabled(&self, domain: Domain) -> bool {
        match domain {
            Domain::Memories => self.memories,
            Domain::Knowledge => self.knowledge,
            Domain::Files => self.files,
            Domain::Code => self.code,
            Domain::Conversations => self.conversations,
            Domain::Hydration => self.hydration,
            Domain::Search => self.search,
            Domain::Projects => self.projects,
        }
    }
}

fn d_true() -> bool {
    true
}
