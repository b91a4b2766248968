// File: src/filter.rs
use crate::model::{DATE_FORMAT, Priority, Tag, Task};
use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DueFilter {
    Overdue,
    Today,
    On(NaiveDate),
}

/// One selectable entry of the filter panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterToken {
    Tag(Tag),
    Priority(Priority),
    Due(DueFilter),
    Completed,
}

impl FilterToken {
    /// Every fixed token, in panel order. Exact-date tokens are entered, not listed.
    pub fn catalog() -> Vec<FilterToken> {
        let mut tokens: Vec<FilterToken> = Tag::ALL.iter().map(|t| FilterToken::Tag(*t)).collect();
        tokens.extend(Priority::ALL.iter().map(|p| FilterToken::Priority(*p)));
        tokens.push(FilterToken::Due(DueFilter::Overdue));
        tokens.push(FilterToken::Due(DueFilter::Today));
        tokens.push(FilterToken::Completed);
        tokens
    }

    pub fn label(&self) -> String {
        match self {
            FilterToken::Tag(tag) => tag.as_str().to_string(),
            FilterToken::Priority(p) => format!("{} priority", p.as_str()),
            FilterToken::Due(DueFilter::Overdue) => "Overdue".to_string(),
            FilterToken::Due(DueFilter::Today) => "Due today".to_string(),
            FilterToken::Due(DueFilter::On(day)) => format!("Due {}", day.format(DATE_FORMAT)),
            FilterToken::Completed => "Completed".to_string(),
        }
    }
}

/// Current filter selection. Each category holds at most one value, so
/// tokens of the same category are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterCriteria {
    pub tag: Option<Tag>,
    pub priority: Option<Priority>,
    pub due: Option<DueFilter>,
    pub show_completed: bool,
    /// Narrows the offered tokens, not the tasks.
    pub search: String,
}

impl FilterCriteria {
    pub fn is_selected(&self, token: FilterToken) -> bool {
        match token {
            FilterToken::Tag(t) => self.tag == Some(t),
            FilterToken::Priority(p) => self.priority == Some(p),
            FilterToken::Due(d) => self.due == Some(d),
            FilterToken::Completed => self.show_completed,
        }
    }

    /// Select `token`, replacing any other value of its category; selecting
    /// the active value clears the category.
    pub fn toggle(&mut self, token: FilterToken) {
        let selected = self.is_selected(token);
        match token {
            FilterToken::Tag(t) => self.tag = (!selected).then_some(t),
            FilterToken::Priority(p) => self.priority = (!selected).then_some(p),
            FilterToken::Due(d) => self.due = (!selected).then_some(d),
            FilterToken::Completed => self.show_completed = !selected,
        }
    }

    pub fn selected_tokens(&self) -> Vec<FilterToken> {
        let mut tokens = Vec::new();
        if let Some(t) = self.tag {
            tokens.push(FilterToken::Tag(t));
        }
        if let Some(p) = self.priority {
            tokens.push(FilterToken::Priority(p));
        }
        if let Some(d) = self.due {
            tokens.push(FilterToken::Due(d));
        }
        if self.show_completed {
            tokens.push(FilterToken::Completed);
        }
        tokens
    }

    pub fn clear(&mut self) {
        let search = std::mem::take(&mut self.search);
        *self = Self {
            search,
            ..Self::default()
        };
    }

    fn matches(&self, task: &Task, today: NaiveDate) -> bool {
        if task.completed && !self.show_completed {
            return false;
        }
        if let Some(tag) = self.tag
            && task.tag != tag
        {
            return false;
        }
        if let Some(priority) = self.priority
            && task.priority != priority
        {
            return false;
        }
        match self.due {
            None => true,
            Some(DueFilter::Overdue) => task.is_overdue(today),
            Some(DueFilter::Today) => task.is_due_on(today),
            Some(DueFilter::On(day)) => task.is_due_on(day),
        }
    }
}

/// Tasks to render, in collection order. Completed tasks only appear when
/// `Completed` is selected; every other selected category must match.
pub fn visible_tasks<'a>(
    all: &'a [Task],
    criteria: &FilterCriteria,
    now: DateTime<Local>,
) -> Vec<&'a Task> {
    let today = now.date_naive();
    all.iter().filter(|t| criteria.matches(t, today)).collect()
}

/// Tokens whose label contains `search` (case-insensitive).
pub fn offered_tokens(search: &str) -> Vec<FilterToken> {
    let needle = search.trim().to_lowercase();
    FilterToken::catalog()
        .into_iter()
        .filter(|t| needle.is_empty() || t.label().to_lowercase().contains(&needle))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2030, 6, 15, 12, 0, 0)
            .single()
            .expect("unambiguous time")
    }

    fn make_task(id: &str, tag: Tag, priority: Priority, completed: bool) -> Task {
        let mut t = Task::new(id);
        t.id = Some(id.to_string());
        t.tag = tag;
        t.priority = priority;
        t.completed = completed;
        t
    }

    fn keys(tasks: &[&Task]) -> Vec<String> {
        tasks.iter().map(|t| t.key().to_string()).collect()
    }

    #[test]
    fn test_completed_hidden_unless_selected() {
        let tasks = vec![
            make_task("open", Tag::Home, Priority::Normal, false),
            make_task("done", Tag::Work, Priority::High, true),
        ];
        let mut criteria = FilterCriteria::default();
        for token in FilterToken::catalog() {
            if token == FilterToken::Completed {
                continue;
            }
            criteria.toggle(token);
            let res = visible_tasks(&tasks, &criteria, now());
            assert!(res.iter().all(|t| !t.completed), "leaked with {:?}", token);
        }

        let mut with_done = FilterCriteria::default();
        with_done.toggle(FilterToken::Completed);
        assert_eq!(keys(&visible_tasks(&tasks, &with_done, now())), vec!["open", "done"]);
    }

    #[test]
    fn test_tag_and_priority_must_both_match() {
        let tasks = vec![
            make_task("home-high", Tag::Home, Priority::High, false),
            make_task("work-high", Tag::Work, Priority::High, false),
            make_task("work-low", Tag::Work, Priority::Low, false),
            make_task("edu-normal", Tag::Education, Priority::Normal, false),
            make_task("work-high-2", Tag::Work, Priority::High, false),
        ];
        let mut criteria = FilterCriteria::default();
        criteria.toggle(FilterToken::Tag(Tag::Work));
        criteria.toggle(FilterToken::Priority(Priority::High));

        let res = visible_tasks(&tasks, &criteria, now());
        assert_eq!(keys(&res), vec!["work-high", "work-high-2"]);
    }

    #[test]
    fn test_due_yesterday_is_overdue_not_today() {
        let mut task = make_task("late", Tag::Home, Priority::Normal, false);
        task.due = Some(now().date_naive() - Duration::days(1));
        let mut today_task = make_task("now", Tag::Home, Priority::Normal, false);
        today_task.due = Some(now().date_naive());
        let undated = make_task("whenever", Tag::Home, Priority::Normal, false);
        let tasks = vec![task, today_task, undated];

        let mut overdue = FilterCriteria::default();
        overdue.toggle(FilterToken::Due(DueFilter::Overdue));
        assert_eq!(keys(&visible_tasks(&tasks, &overdue, now())), vec!["late"]);

        let mut due_today = FilterCriteria::default();
        due_today.toggle(FilterToken::Due(DueFilter::Today));
        assert_eq!(keys(&visible_tasks(&tasks, &due_today, now())), vec!["now"]);
    }

    #[test]
    fn test_same_category_tokens_replace_each_other() {
        let mut criteria = FilterCriteria::default();
        criteria.toggle(FilterToken::Tag(Tag::Home));
        criteria.toggle(FilterToken::Tag(Tag::Work));
        assert_eq!(criteria.selected_tokens(), vec![FilterToken::Tag(Tag::Work)]);

        criteria.toggle(FilterToken::Tag(Tag::Work));
        assert!(criteria.selected_tokens().is_empty());
    }

    #[test]
    fn test_output_keeps_collection_order() {
        let tasks = vec![
            make_task("c", Tag::Home, Priority::Low, false),
            make_task("a", Tag::Home, Priority::High, false),
            make_task("b", Tag::Home, Priority::Normal, false),
        ];
        let res = visible_tasks(&tasks, &FilterCriteria::default(), now());
        assert_eq!(keys(&res), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_search_narrows_offered_tokens() {
        assert_eq!(offered_tokens("").len(), FilterToken::catalog().len());
        assert_eq!(offered_tokens("WORK"), vec![FilterToken::Tag(Tag::Work)]);
        assert_eq!(
            offered_tokens("due"),
            vec![
                FilterToken::Due(DueFilter::Overdue),
                FilterToken::Due(DueFilter::Today)
            ]
        );
        assert!(offered_tokens("zzz").is_empty());
    }

    #[test]
    fn test_criteria_serde_defaults_missing_fields() {
        let criteria: FilterCriteria =
            serde_json::from_str(r#"{"tag":"Work"}"#).expect("partial criteria");
        assert_eq!(criteria.tag, Some(Tag::Work));
        assert!(!criteria.show_completed);
        assert_eq!(criteria.due, None);
    }
}
