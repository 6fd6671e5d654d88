//! Checklist catalog: a package of documents looked up by slug or name.

use std::path::Path;

use serde::{Deserialize, Serialize};

use checklist_types::{slugify, ChecklistDocument, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChecklistPackage {
    #[serde(default)]
    pub checklists: Vec<ChecklistDocument>,
}

impl ChecklistPackage {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    /// First checklist whose name slugifies to `slug`.
    pub fn find_by_slug(&self, slug: &str) -> Option<&ChecklistDocument> {
        self.checklists.iter().find(|c| slugify(&c.name) == slug)
    }

    /// Case-insensitive name match.
    pub fn find_by_name(&self, name: &str) -> Option<&ChecklistDocument> {
        let wanted = name.trim().to_lowercase();
        self.checklists
            .iter()
            .find(|c| c.name.trim().to_lowercase() == wanted)
    }

    pub fn slugs(&self) -> Vec<String> {
        self.checklists.iter().map(ChecklistDocument::slug).collect()
    }
}
