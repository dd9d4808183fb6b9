//! Tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::recurrence::Recurrence;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Todo,
    InProgress,
    Done,
    Cancelled,
}

impl Status {
    pub fn is_done(self) -> bool {
        matches!(self, Status::Done)
    }
}

/// A single task within a list.
///
/// Mutation goes through the setters below rather than direct field access,
/// so `modified` and the categories/priority invariants stay correct; the
/// store is the only thing allowed to touch `id`/`created`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Task {
    id: Uuid,
    list_id: Uuid,
    summary: String,
    description: String,
    status: Status,
    priority: u8,
    due_date: Option<DateTime<Utc>>,
    start_date: Option<DateTime<Utc>>,
    completed: Option<DateTime<Utc>>,
    created: DateTime<Utc>,
    modified: DateTime<Utc>,
    parent_id: Option<Uuid>,
    categories: Vec<String>,
    recurrence: Option<Recurrence>,
    recur_from_due: bool,
}

impl Task {
    /// Create a brand-new task, not yet persisted.
    pub fn new(list_id: Uuid, summary: String) -> Result<Self> {
        let now = Utc::now();
        let summary = validate_summary(&summary)?;
        Ok(Self {
            id: Uuid::new_v4(),
            list_id,
            summary,
            description: String::new(),
            status: Status::Todo,
            priority: 0,
            due_date: None,
            start_date: None,
            completed: None,
            created: now,
            modified: now,
            parent_id: None,
            categories: Vec::new(),
            recurrence: None,
            recur_from_due: true,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: Uuid,
        list_id: Uuid,
        summary: String,
        description: String,
        status: Status,
        priority: u8,
        due_date: Option<DateTime<Utc>>,
        start_date: Option<DateTime<Utc>>,
        completed: Option<DateTime<Utc>>,
        created: DateTime<Utc>,
        modified: DateTime<Utc>,
        parent_id: Option<Uuid>,
        categories: Vec<String>,
        recurrence: Option<Recurrence>,
        recur_from_due: bool,
    ) -> Result<Self> {
        validate_priority(priority)?;
        validate_dates(start_date, due_date)?;
        Ok(Self {
            id,
            list_id,
            summary: validate_summary(&summary)?,
            description,
            status,
            priority,
            due_date,
            start_date,
            completed,
            created,
            modified,
            parent_id,
            categories: normalize_categories(categories),
            recurrence,
            recur_from_due,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }
    pub fn list_id(&self) -> Uuid {
        self.list_id
    }
    pub fn summary(&self) -> &str {
        &self.summary
    }
    pub fn description(&self) -> &str {
        &self.description
    }
    pub fn status(&self) -> Status {
        self.status
    }
    pub fn priority(&self) -> u8 {
        self.priority
    }
    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }
    pub fn start_date(&self) -> Option<DateTime<Utc>> {
        self.start_date
    }
    pub fn completed(&self) -> Option<DateTime<Utc>> {
        self.completed
    }
    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }
    pub fn modified(&self) -> DateTime<Utc> {
        self.modified
    }
    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }
    pub fn categories(&self) -> &[String] {
        &self.categories
    }
    pub fn recurrence(&self) -> Option<&Recurrence> {
        self.recurrence.as_ref()
    }
    pub fn recur_from_due(&self) -> bool {
        self.recur_from_due
    }

    fn touch(&mut self) {
        self.modified = Utc::now();
    }

    pub fn set_summary(&mut self, summary: String) -> Result<()> {
        self.summary = validate_summary(&summary)?;
        self.touch();
        Ok(())
    }

    pub fn set_description(&mut self, description: String) {
        self.description = description;
        self.touch();
    }

    /// Transition status. Entering `Done` stamps `completed` if unset;
    /// leaving `Done` clears it.
    pub fn set_status(&mut self, status: Status) {
        match status {
            Status::Done if self.completed.is_none() => self.completed = Some(Utc::now()),
            Status::Done => {}
            _ => self.completed = None,
        }
        self.status = status;
        self.touch();
    }

    pub fn set_priority(&mut self, priority: u8) -> Result<()> {
        validate_priority(priority)?;
        self.priority = priority;
        self.touch();
        Ok(())
    }

    pub fn set_due_date(&mut self, due_date: Option<DateTime<Utc>>) -> Result<()> {
        validate_dates(self.start_date, due_date)?;
        self.due_date = due_date;
        self.touch();
        Ok(())
    }

    pub fn set_start_date(&mut self, start_date: Option<DateTime<Utc>>) -> Result<()> {
        validate_dates(start_date, self.due_date)?;
        self.start_date = start_date;
        self.touch();
        Ok(())
    }

    /// Rehome this task under a different list, without touching `modified`.
    /// Used by the pull phase to relink a remote task onto the local list
    /// row it maps to; it isn't a user edit, so it shouldn't look like one.
    pub(crate) fn retarget_list(&mut self, list_id: Uuid) {
        self.list_id = list_id;
    }

    pub fn set_parent_id(&mut self, parent_id: Option<Uuid>) {
        self.parent_id = parent_id;
        self.touch();
    }

    pub fn set_categories(&mut self, categories: Vec<String>) {
        self.categories = normalize_categories(categories);
        self.touch();
    }

    pub fn set_recurrence(&mut self, recurrence: Option<Recurrence>, recur_from_due: bool) {
        self.recurrence = recurrence;
        self.recur_from_due = recur_from_due;
        self.touch();
    }

    /// Comma-joined categories, stable-sorted and deduplicated, as stored.
    pub fn categories_joined(&self) -> String {
        self.categories.join(",")
    }

    /// The base date a recurrence advances from: `due_date` when
    /// `recur_from_due`, else `completed`.
    pub fn recurrence_base(&self) -> Option<DateTime<Utc>> {
        if self.recur_from_due {
            self.due_date
        } else {
            self.completed
        }
    }

    /// Close this instance (mirrors completing a recurring task) and produce
    /// the next occurrence, preserving every other attribute.
    pub fn complete_and_roll_over(&mut self) -> Option<Task> {
        let recurrence = self.recurrence.clone()?;
        let base = self.recurrence_base().unwrap_or_else(Utc::now);
        let next_due = recurrence.next(base);

        self.set_status(Status::Done);

        let mut next = self.clone();
        next.id = Uuid::new_v4();
        next.status = Status::Todo;
        next.completed = None;
        next.due_date = Some(next_due);
        next.created = Utc::now();
        next.modified = next.created;
        Some(next)
    }
}

fn validate_summary(summary: &str) -> Result<String> {
    let trimmed = summary.trim();
    if trimmed.is_empty() {
        return Err(Error::Invariant("task summary must not be empty".into()));
    }
    Ok(trimmed.to_string())
}

fn validate_priority(priority: u8) -> Result<()> {
    if priority > 9 {
        return Err(Error::Invariant(format!(
            "priority {priority} out of range [0,9]"
        )));
    }
    Ok(())
}

fn validate_dates(
    start: Option<DateTime<Utc>>,
    due: Option<DateTime<Utc>>,
) -> Result<()> {
    if let (Some(s), Some(d)) = (start, due) {
        if s > d {
            return Err(Error::Invariant(
                "start_date must be <= due_date".into(),
            ));
        }
    }
    Ok(())
}

/// Case-insensitive dedupe, stable sort (by lowercased key, first-seen
/// casing wins).
fn normalize_categories(categories: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<String> = Vec::new();
    for c in categories {
        let trimmed = c.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_lowercase();
        if seen.insert(key) {
            deduped.push(trimmed);
        }
    }
    deduped.sort_by_key(|c| c.to_lowercase());
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_summary_rejected() {
        assert!(Task::new(Uuid::new_v4(), "   ".into()).is_err());
    }

    #[test]
    fn priority_out_of_range_rejected() {
        let mut t = Task::new(Uuid::new_v4(), "x".into()).unwrap();
        assert!(t.set_priority(10).is_err());
        assert!(t.set_priority(0).is_ok());
        assert!(t.set_priority(9).is_ok());
    }

    #[test]
    fn start_after_due_rejected() {
        let mut t = Task::new(Uuid::new_v4(), "x".into()).unwrap();
        let now = Utc::now();
        t.set_due_date(Some(now)).unwrap();
        assert!(t.set_start_date(Some(now + chrono::Duration::days(1))).is_err());
    }

    #[test]
    fn completing_stamps_completed_once() {
        let mut t = Task::new(Uuid::new_v4(), "x".into()).unwrap();
        t.set_status(Status::Done);
        let first = t.completed();
        assert!(first.is_some());
        t.set_status(Status::Done);
        assert_eq!(t.completed(), first);
    }

    #[test]
    fn categories_deduped_case_insensitively_and_sorted() {
        let mut t = Task::new(Uuid::new_v4(), "x".into()).unwrap();
        t.set_categories(vec!["Work".into(), "home".into(), "work".into()]);
        assert_eq!(t.categories(), &["home".to_string(), "Work".to_string()]);
    }

    #[test]
    fn recurring_completion_rolls_over() {
        let mut t = Task::new(Uuid::new_v4(), "water plants".into()).unwrap();
        t.set_due_date(Some(Utc::now())).unwrap();
        t.set_recurrence(
            Some(crate::model::recurrence::parse_recurrence("daily").unwrap()),
            true,
        );
        let next = t.complete_and_roll_over().expect("recurring task");
        assert_eq!(t.status(), Status::Done);
        assert!(t.completed().is_some());
        assert_eq!(next.status(), Status::Todo);
        assert_ne!(next.id(), t.id());
        assert_eq!(next.summary(), t.summary());
        assert!(next.due_date().unwrap() > t.due_date().unwrap());
    }
}
