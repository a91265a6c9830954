//! Identity: agent personality and system prompt construction.
//!
//! Context files are read from the workspace directory in a fixed order:
//!
//! 1. `IDENTITY.md` — who the agent is
//! 2. `SOUL.md` — personality, tone, style
//! 3. `USER.md` — user-specific context
//! 4. `AGENTS.md` — operating instructions
//!
//! Each file is optional. Missing or blank files are skipped. When none
//! exist a built-in prompt is used.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

pub const IDENTITY_FILE: &str = "IDENTITY.md";
pub const SOUL_FILE: &str = "SOUL.md";
pub const USER_FILE: &str = "USER.md";
pub const AGENTS_FILE: &str = "AGENTS.md";

const DEFAULT_NAME: &str = "Pincer";

/// (file, xml tag) in prompt order.
const CONTEXT_FILES: [(&str, &str); 4] = [
    (IDENTITY_FILE, "identity"),
    (SOUL_FILE, "personality"),
    (USER_FILE, "user_context"),
    (AGENTS_FILE, "agent_instructions"),
];

/// The agent's identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    /// The agent's name
    pub name: String,

    /// System prompt built from identity files
    pub system_prompt: String,

    /// Which context files were loaded (for diagnostics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loaded_files: Vec<String>,
}

impl Identity {
    /// Identity used when no context files are present.
    pub fn default_identity() -> Self {
        Self {
            name: DEFAULT_NAME.into(),
            system_prompt: concat!(
                "You are Pincer, a helpful personal AI assistant. ",
                "You have access to tools that let you act on the user's behalf. ",
                "Use them when appropriate. Be concise and accurate.",
            )
            .into(),
            loaded_files: vec![],
        }
    }

    /// Load identity files from `workspace`.
    pub fn load(workspace: &Path) -> Self {
        let mut prompt = String::with_capacity(4096);
        let mut loaded_files = Vec::new();
        let mut name = None;

        for (file, tag) in CONTEXT_FILES {
            let path = workspace.join(file);
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let content = content.trim();
            if content.is_empty() {
                continue;
            }
            debug!(file = %path.display(), "Loaded context file");

            if file == IDENTITY_FILE {
                name = Self::extract_name(content);
            }
            if !prompt.is_empty() {
                prompt.push('\n');
            }
            prompt.push_str(&format!("<{tag}>\n{content}\n</{tag}>\n"));
            loaded_files.push(path.display().to_string());
        }

        if loaded_files.is_empty() {
            debug!(workspace = %workspace.display(), "No context files found, using fallback system prompt");
            return Self::default_identity();
        }

        prompt.push_str("\n<capabilities>\n");
        prompt.push_str("You have access to tools that let you act on the user's behalf. ");
        prompt.push_str("Use them when appropriate to help accomplish tasks.\n");
        prompt.push_str("</capabilities>\n");

        debug!(
            files_loaded = loaded_files.len(),
            prompt_len = prompt.len(),
            "Context loaded"
        );

        Self {
            name: name.unwrap_or_else(|| DEFAULT_NAME.into()),
            system_prompt: prompt,
            loaded_files,
        }
    }

    /// Pull the agent's name out of IDENTITY.md: "You are <Name>" or the
    /// first H1 heading other than "Identity".
    fn extract_name(content: &str) -> Option<String> {
        if let Some(pos) = content.find("You are ") {
            let name: String = content[pos + 8..]
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
                .collect();
            if !name.is_empty() && name.len() < 50 {
                return Some(name);
            }
        }

        content
            .lines()
            .filter_map(|line| line.trim().strip_prefix("# "))
            .map(str::trim)
            .find(|heading| !heading.is_empty() && *heading != "Identity")
            .map(str::to_string)
    }
}

impl Default for Identity {
    fn default() -> Self {
        Self::default_identity()
    }
}
