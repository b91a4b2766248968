use crate::dashboard::{Dashboard, Notice};
use crate::filter::{FilterToken, offered_tokens};
use crate::model::{Task, format_reminder};
use chrono::Local;
use ratatui::widgets::ListState;
use std::collections::VecDeque;

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum InputMode {
    Normal,
    Form,
    Searching,
    ExactDate,
}

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum FormField {
    Name,
    Description,
    Due,
    Priority,
    Tag,
    Reminder,
}

impl FormField {
    pub const ALL: [FormField; 6] = [
        FormField::Name,
        FormField::Description,
        FormField::Due,
        FormField::Priority,
        FormField::Tag,
        FormField::Reminder,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            FormField::Name => "Task name",
            FormField::Description => "Description",
            FormField::Due => "Due (YYYY-MM-DD)",
            FormField::Priority => "Priority",
            FormField::Tag => "Tag",
            FormField::Reminder => "Reminder (YYYY-MM-DDTHH:MM)",
        }
    }

    pub fn is_text(&self) -> bool {
        !matches!(self, FormField::Priority | FormField::Tag)
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|f| *f == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

pub struct AppState {
    // Session
    pub dashboard: Option<Dashboard>,
    /// Email of the configured account, shown on the sign-in screen.
    pub account_hint: Option<String>,

    // UI State
    pub list_state: ListState,
    pub filter_state: ListState,
    pub mode: InputMode,
    pub field: FormField,
    pub message: String,
    pub alerts: VecDeque<String>,

    // Input Buffers
    pub input_buffer: String,
}

impl AppState {
    pub fn new(account_hint: Option<String>) -> Self {
        let mut l_state = ListState::default();
        l_state.select(Some(0));
        let mut f_state = ListState::default();
        f_state.select(Some(0));

        Self {
            dashboard: None,
            account_hint,
            list_state: l_state,
            filter_state: f_state,
            mode: InputMode::Normal,
            field: FormField::Name,
            message: String::new(),
            alerts: VecDeque::new(),
            input_buffer: String::new(),
        }
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        match &self.dashboard {
            Some(dash) => dash.visible(Local::now()),
            None => Vec::new(),
        }
    }

    pub fn offered_tokens(&self) -> Vec<FilterToken> {
        match &self.dashboard {
            Some(dash) => offered_tokens(&dash.criteria().search),
            None => Vec::new(),
        }
    }

    pub fn get_selected_task(&self) -> Option<&Task> {
        let idx = self.list_state.selected()?;
        self.visible_tasks().into_iter().nth(idx)
    }

    pub fn get_selected_token(&self) -> Option<FilterToken> {
        let idx = self.filter_state.selected()?;
        self.offered_tokens().get(idx).copied()
    }

    /// Keep selections inside the lists after they shrank.
    pub fn clamp_selection(&mut self) {
        let len = self.visible_tasks().len();
        clamp(&mut self.list_state, len);
        let len = self.offered_tokens().len();
        clamp(&mut self.filter_state, len);
    }

    pub fn next(&mut self) {
        let len = self.visible_tasks().len();
        step(&mut self.list_state, len, 1);
    }

    pub fn previous(&mut self) {
        let len = self.visible_tasks().len();
        step(&mut self.list_state, len, -1);
    }

    pub fn next_token(&mut self) {
        let len = self.offered_tokens().len();
        step(&mut self.filter_state, len, 1);
    }

    pub fn previous_token(&mut self) {
        let len = self.offered_tokens().len();
        step(&mut self.filter_state, len, -1);
    }

    pub fn push_notices(&mut self, notices: Vec<Notice>) {
        for notice in notices {
            match notice {
                Notice::Alert(text) => self.alerts.push_back(text),
                Notice::Reminder(r) => {
                    let when = self
                        .dashboard
                        .as_ref()
                        .and_then(|d| d.sync().task(&r.task_id))
                        .and_then(|t| t.reminder)
                        .map(format_reminder)
                        .unwrap_or_default();
                    self.alerts
                        .push_back(format!("Reminder: It's time for \"{}\"! {}", r.name, when));
                }
                Notice::Warning(text) => self.message = format!("Warning: {}", text),
                Notice::Status(text) => self.message = text,
            }
        }
    }

    pub fn reset_input(&mut self) {
        self.input_buffer.clear();
    }
}

fn clamp(state: &mut ListState, len: usize) {
    match state.selected() {
        _ if len == 0 => state.select(Some(0)),
        Some(i) if i >= len => state.select(Some(len - 1)),
        None => state.select(Some(0)),
        _ => {}
    }
}

fn step(state: &mut ListState, len: usize, delta: isize) {
    if len == 0 {
        return;
    }
    let current = state.selected().unwrap_or(0) as isize;
    let next = (current + delta).rem_euclid(len as isize) as usize;
    state.select(Some(next));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_wraps() {
        let mut state = ListState::default();
        state.select(Some(0));
        step(&mut state, 3, -1);
        assert_eq!(state.selected(), Some(2));
        step(&mut state, 3, 1);
        assert_eq!(state.selected(), Some(0));
    }

    #[test]
    fn test_clamp_after_shrink() {
        let mut state = ListState::default();
        state.select(Some(5));
        clamp(&mut state, 2);
        assert_eq!(state.selected(), Some(1));
    }

    #[test]
    fn test_form_field_cycle() {
        assert_eq!(FormField::Reminder.next(), FormField::Name);
        assert_eq!(FormField::Name.prev(), FormField::Reminder);
        assert!(!FormField::Tag.is_text());
    }

    #[test]
    fn test_alerts_queue_in_order() {
        let mut state = AppState::new(None);
        state.push_notices(vec![
            Notice::Alert("first".into()),
            Notice::Warning("flaky".into()),
            Notice::Alert("second".into()),
        ]);
        assert_eq!(state.alerts.pop_front().as_deref(), Some("first"));
        assert_eq!(state.alerts.pop_front().as_deref(), Some("second"));
        assert_eq!(state.message, "Warning: flaky");
    }
}
