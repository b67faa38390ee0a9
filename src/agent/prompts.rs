//! Role system prompts, loaded once from `prompts/` at startup.
//!
//! Prompts are opaque templates with a single recognized token,
//! `{{TODAY_DATE}}`, substituted with the current UTC date at use time.

use crate::types::Role;
use chrono::Utc;
use std::collections::HashMap;
use std::path::Path;

const PROMPT_FILES: [(Role, &str); 4] = [
    (Role::Orchestrator, "orchestrator.txt"),
    (Role::Researcher, "researcher.txt"),
    (Role::FactChecker, "fact_checker.txt"),
    (Role::Coder, "coder.txt"),
];

#[derive(Debug)]
pub struct PromptStore {
    by_role: HashMap<Role, String>,
}

impl PromptStore {
    pub fn load(root: &Path) -> Result<Self, String> {
        let mut by_role = HashMap::new();
        for (role, file) in PROMPT_FILES {
            let path = root.join("prompts").join(file);
            let text = std::fs::read_to_string(&path)
                .map_err(|e| format!("read prompt {}: {}", file, e))?;
            by_role.insert(role, text);
        }
        Ok(PromptStore { by_role })
    }

    pub fn for_role(&self, role: Role) -> String {
        let raw = self
            .by_role
            .get(&role)
            .or_else(|| self.by_role.get(&Role::Coder))
            .cloned()
            .unwrap_or_default();
        with_runtime_vars(&raw)
    }
}

fn with_runtime_vars(prompt: &str) -> String {
    let today = Utc::now().format("%Y-%m-%d").to_string();
    prompt.replace("{{TODAY_DATE}}", &today)
}
