//! Task lists.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::color::normalize_color;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct List {
    id: Uuid,
    provider_id: String,
    name: String,
    description: String,
    color: String,
    modified: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl List {
    pub fn new(provider_id: String, name: String) -> Result<Self> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            provider_id,
            name: validate_name(&name)?,
            description: String::new(),
            color: String::new(),
            modified: now,
            deleted_at: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        provider_id: String,
        name: String,
        description: String,
        color: String,
        modified: DateTime<Utc>,
        deleted_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        Ok(Self {
            id,
            provider_id,
            name: validate_name(&name)?,
            description,
            color: normalize_color(&color)?,
            modified,
            deleted_at,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn color(&self) -> &str {
        &self.color
    }
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }
    pub fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    fn touch(&mut self) {
        self.modified = Utc::now();
    }

    pub fn set_name(&mut self, name: String) -> Result<()> {
        self.name = validate_name(&name)?;
        self.touch();
        Ok(())
    }

    pub fn set_description(&mut self, description: String) {
        self.description = description;
        self.touch();
    }

    pub fn set_color(&mut self, color: &str) -> Result<()> {
        self.color = normalize_color(color)?;
        self.touch();
        Ok(())
    }

    pub fn mark_deleted(&mut self) {
        self.deleted_at = Some(Utc::now());
        self.touch();
    }

    pub fn restore(&mut self) {
        self.deleted_at = None;
        self.touch();
    }

    /// Case-insensitive uniqueness key, used by the store when enforcing the
    /// per-`provider_id` name-uniqueness invariant.
    pub fn name_key(&self) -> String {
        self.name.to_lowercase()
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(Error::Invariant("list name must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_name_rejected() {
        assert!(List::new("p".into(), "  ".into()).is_err());
    }

    #[test]
    fn name_key_is_lowercase() {
        let l = List::new("p".into(), "Home".into()).unwrap();
        assert_eq!(l.name_key(), "home");
    }

    #[test]
    fn mark_deleted_then_restore() {
        let mut l = List::new("p".into(), "Home".into()).unwrap();
        assert!(!l.is_deleted());
        l.mark_deleted();
        assert!(l.is_deleted());
        l.restore();
        assert!(!l.is_deleted());
    }
}
