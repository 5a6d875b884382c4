use serde::Deserialize;

use crate::recipes::dto::MAX_TEXT_LEN;

#[derive(Debug, Deserialize)]
pub struct LabelQuery {
    /// `1` limits the list to labels used by at least one recipe.
    #[serde(default)]
    pub assigned_only: u8,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenameLabelRequest {
    pub name: String,
}

impl RenameLabelRequest {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name may not be blank".into());
        }
        if self.name.chars().count() > MAX_TEXT_LEN {
            return Err(format!(
                "name may not be longer than {} characters",
                MAX_TEXT_LEN
            ));
        }
        Ok(())
    }
}
