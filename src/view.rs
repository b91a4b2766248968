// File: src/view.rs
// Per-session UI state: active tab, filter criteria, the task form and drag.
use crate::cache::LocalCache;
use crate::error::{Error, Result};
use crate::filter::{FilterCriteria, FilterToken};
use crate::model::{Priority, Tag, Task, TaskPatch, parse_due_date, parse_reminder, DATE_FORMAT};
use crate::sync::move_in_sequence;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const TAB_KEY: &str = "activeButton";
pub const CRITERIA_KEY: &str = "filterCriteria";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Tab {
    #[default]
    Today,
    Filter,
}

impl Tab {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Today => "Today",
            Tab::Filter => "Filter",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "today" => Some(Tab::Today),
            "filter" => Some(Tab::Filter),
            _ => None,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Tab::Today => Tab::Filter,
            Tab::Filter => Tab::Today,
        }
    }
}

/// The add/edit form. Date fields hold raw input until submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    /// Id of the task being edited; `None` while adding.
    pub editing: Option<String>,
    pub name: String,
    pub description: String,
    pub due: String,
    pub priority: Priority,
    pub tag: Tag,
    pub reminder: String,
}

/// What a valid draft turns into.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Create(Task),
    Update { id: String, patch: TaskPatch },
}

impl Draft {
    pub fn for_task(task: &Task) -> Self {
        Self {
            editing: Some(task.key().to_string()),
            name: task.name.clone(),
            description: task.description.clone(),
            due: task
                .due
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_default(),
            priority: task.priority,
            tag: task.tag,
            reminder: task
                .reminder
                .map(|r| r.with_timezone(&Local).format("%Y-%m-%dT%H:%M").to_string())
                .unwrap_or_default(),
        }
    }

    pub fn is_blank(&self) -> bool {
        *self == Self::default()
    }

    pub fn validate(&self) -> Result<Submission> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(Error::Validation("Task name is required.".into()));
        }
        let due = match self.due.trim() {
            "" => None,
            raw => Some(
                parse_due_date(raw)
                    .ok_or_else(|| Error::Validation(format!("Invalid due date: {}", raw)))?,
            ),
        };
        let reminder = match self.reminder.trim() {
            "" => None,
            raw => Some(
                parse_reminder(raw)
                    .ok_or_else(|| Error::Validation(format!("Invalid reminder: {}", raw)))?,
            ),
        };

        let mut task = Task::new(name);
        task.description = self.description.trim().to_string();
        task.due = due;
        task.priority = self.priority;
        task.tag = self.tag;
        task.reminder = reminder;

        Ok(match &self.editing {
            None => Submission::Create(task),
            Some(id) => Submission::Update {
                id: id.clone(),
                patch: TaskPatch::from_task(&task),
            },
        })
    }
}

/// An in-progress drag on the Today list, by visible index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Drag {
    pub task_id: String,
    pub from: usize,
    pub over: usize,
}

pub struct ViewState {
    cache: Arc<dyn LocalCache>,
    tab: Tab,
    criteria: FilterCriteria,
    pub draft: Draft,
    form_open: bool,
    drag: Option<Drag>,
}

impl ViewState {
    /// Rehydrate tab and criteria; unreadable entries fall back to defaults.
    pub fn load(cache: Arc<dyn LocalCache>) -> Self {
        let tab = cache
            .get(TAB_KEY)
            .and_then(|raw| Tab::parse(&raw))
            .unwrap_or_default();
        let criteria = cache
            .get(CRITERIA_KEY)
            .and_then(|raw| match serde_json::from_str::<FilterCriteria>(&raw) {
                Ok(c) => Some(c),
                Err(e) => {
                    tracing::warn!(error = %e, "discarding cached filter criteria");
                    None
                }
            })
            .unwrap_or_default();
        Self {
            cache,
            tab,
            criteria,
            draft: Draft::default(),
            form_open: false,
            drag: None,
        }
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn drag(&self) -> Option<&Drag> {
        self.drag.as_ref()
    }

    // --- PERSISTENCE ---

    fn persist_tab(&self) {
        if let Err(e) = self.cache.set(TAB_KEY, self.tab.as_str()) {
            tracing::warn!(error = %e, "failed to cache active tab");
        }
    }

    fn persist_criteria(&self) {
        let saved = serde_json::to_string(&self.criteria)
            .map_err(anyhow::Error::from)
            .and_then(|json| self.cache.set(CRITERIA_KEY, &json));
        if let Err(e) = saved {
            tracing::warn!(error = %e, "failed to cache filter criteria");
        }
    }

    // --- TABS & FILTERS ---

    /// Drafts survive; a drag in progress does not.
    pub fn switch_tab(&mut self, tab: Tab) {
        self.drag = None;
        if self.tab != tab {
            self.tab = tab;
            self.persist_tab();
        }
    }

    pub fn toggle_filter(&mut self, token: FilterToken) {
        self.criteria.toggle(token);
        self.persist_criteria();
    }

    pub fn set_search(&mut self, search: &str) {
        self.criteria.search = search.to_string();
        self.persist_criteria();
    }

    pub fn clear_filters(&mut self) {
        self.criteria.clear();
        self.persist_criteria();
    }

    // --- FORM ---

    pub fn is_form_open(&self) -> bool {
        self.form_open
    }

    /// Show the form for a new task, keeping anything already typed.
    pub fn open_form(&mut self) {
        self.form_open = true;
    }

    pub fn begin_edit(&mut self, task: &Task) {
        self.draft = Draft::for_task(task);
        self.form_open = true;
    }

    pub fn cancel_draft(&mut self) {
        self.draft = Draft::default();
        self.form_open = false;
    }

    /// Validate and clear the draft. On error the draft is left as typed.
    pub fn submit_draft(&mut self) -> Result<Submission> {
        let submission = self.draft.validate()?;
        self.cancel_draft();
        Ok(submission)
    }

    // --- DRAG ---

    pub fn start_drag(&mut self, task_id: &str, index: usize) -> bool {
        if self.tab != Tab::Today {
            return false;
        }
        self.drag = Some(Drag {
            task_id: task_id.to_string(),
            from: index,
            over: index,
        });
        true
    }

    pub fn drag_over(&mut self, index: usize) {
        if let Some(drag) = &mut self.drag {
            drag.over = index;
        }
    }

    pub fn cancel_drag(&mut self) {
        self.drag = None;
    }

    /// End the drag over `visible` (ids in displayed order). Returns the new
    /// sequence when the task actually moved.
    pub fn finish_drag(&mut self, visible: &[String]) -> Option<Vec<String>> {
        let drag = self.drag.take()?;
        if drag.from == drag.over || visible.get(drag.from) != Some(&drag.task_id) {
            return None;
        }
        let over = drag.over.min(visible.len().saturating_sub(1));
        Some(move_in_sequence(visible, drag.from, over))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::filter::DueFilter;

    fn cache() -> Arc<dyn LocalCache> {
        Arc::new(MemoryCache::new())
    }

    #[test]
    fn test_tab_and_criteria_rehydrate() {
        let cache = cache();
        let mut view = ViewState::load(cache.clone());
        assert_eq!(view.tab(), Tab::Today);

        view.switch_tab(Tab::Filter);
        view.toggle_filter(FilterToken::Tag(Tag::Work));
        view.toggle_filter(FilterToken::Due(DueFilter::Overdue));
        view.set_search("wor");

        let restored = ViewState::load(cache);
        assert_eq!(restored.tab(), Tab::Filter);
        assert_eq!(restored.criteria(), view.criteria());
        assert_eq!(restored.criteria().search, "wor");
    }

    #[test]
    fn test_garbage_cache_falls_back_to_defaults() {
        let cache = cache();
        cache.set(TAB_KEY, "sideways").expect("set");
        cache.set(CRITERIA_KEY, "{not json").expect("set");

        let view = ViewState::load(cache);
        assert_eq!(view.tab(), Tab::Today);
        assert_eq!(view.criteria(), &FilterCriteria::default());
    }

    #[test]
    fn test_invalid_draft_is_kept() {
        let mut view = ViewState::load(cache());
        view.draft.name = "   ".into();
        view.draft.description = "typed".into();

        assert!(matches!(view.submit_draft(), Err(Error::Validation(_))));
        assert_eq!(view.draft.description, "typed");

        view.draft.name = "Write report".into();
        view.draft.due = "2030-13-01".into();
        assert!(view.submit_draft().is_err());
        assert_eq!(view.draft.name, "Write report");
    }

    #[test]
    fn test_submit_creates_then_clears() {
        let mut view = ViewState::load(cache());
        view.draft.name = " Buy milk ".into();
        view.draft.due = "2030-06-01".into();
        view.draft.tag = Tag::Work;

        let Ok(Submission::Create(task)) = view.submit_draft() else {
            panic!("expected a new task");
        };
        assert_eq!(task.name, "Buy milk");
        assert_eq!(task.tag, Tag::Work);
        assert_eq!(task.due.map(|d| d.to_string()), Some("2030-06-01".into()));
        assert!(view.draft.is_blank());
    }

    #[test]
    fn test_edit_loads_every_field() {
        let mut task = Task::new("Call Bob");
        task.id = Some("k1".into());
        task.description = "about the thing".into();
        task.priority = Priority::High;
        task.tag = Tag::Education;
        task.due = parse_due_date("2030-01-02");
        task.reminder = parse_reminder("2030-01-02T09:30:00Z");

        let mut view = ViewState::load(cache());
        view.begin_edit(&task);
        assert_eq!(view.draft.editing.as_deref(), Some("k1"));
        assert_eq!(view.draft.tag, Tag::Education);
        assert_eq!(view.draft.priority, Priority::High);
        assert!(!view.draft.reminder.is_empty());

        // Round trip through the form leaves the task unchanged.
        let Ok(Submission::Update { id, patch }) = view.submit_draft() else {
            panic!("expected an update");
        };
        assert_eq!(id, "k1");
        let mut edited = task.clone();
        patch.apply_to(&mut edited);
        assert_eq!(edited, task);

        view.begin_edit(&task);
        assert!(view.is_form_open());
        view.cancel_draft();
        assert!(view.draft.is_blank());
        assert!(!view.is_form_open());
    }

    #[test]
    fn test_tab_switch_keeps_draft_and_clears_drag() {
        let mut view = ViewState::load(cache());
        view.draft.name = "half typed".into();
        assert!(view.start_drag("a", 0));

        view.switch_tab(Tab::Filter);
        assert_eq!(view.drag(), None);
        assert_eq!(view.draft.name, "half typed");
        assert!(!view.start_drag("a", 0));
    }

    #[test]
    fn test_drag_produces_sequence() {
        let ids: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let mut view = ViewState::load(cache());

        assert!(view.start_drag("a", 0));
        view.drag_over(2);
        assert_eq!(
            view.finish_drag(&ids),
            Some(vec!["b".to_string(), "c".to_string(), "a".to_string()])
        );
        assert_eq!(view.drag(), None);

        view.start_drag("b", 1);
        assert_eq!(view.finish_drag(&ids), None);
    }
}
