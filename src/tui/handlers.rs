// File: src/tui/handlers.rs
use crate::dashboard::Command;
use crate::filter::{DueFilter, FilterToken};
use crate::model::parse_due_date;
use crate::tui::action::Action;
use crate::tui::state::{AppState, FormField, InputMode};
use crate::view::Tab;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

pub fn handle_key_event(key: KeyEvent, state: &mut AppState) -> Option<Action> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(Action::Quit);
    }

    // A blocking alert swallows the next key.
    if state.alerts.pop_front().is_some() {
        return None;
    }

    let Some(dash) = state.dashboard.as_ref() else {
        return match key.code {
            KeyCode::Enter => Some(Action::SignIn),
            KeyCode::Char('q') | KeyCode::Esc => Some(Action::Quit),
            _ => None,
        };
    };
    let tab = dash.view().tab();
    let dragging = dash.view().drag().is_some();

    match state.mode {
        InputMode::Form => handle_form_key(key, state),
        InputMode::Searching => match key.code {
            KeyCode::Enter | KeyCode::Esc => {
                state.mode = InputMode::Normal;
                None
            }
            KeyCode::Backspace => {
                state.input_buffer.pop();
                Some(Action::Dashboard(Command::SearchFilters(
                    state.input_buffer.clone(),
                )))
            }
            KeyCode::Char(c) => {
                state.input_buffer.push(c);
                state.filter_state.select(Some(0));
                Some(Action::Dashboard(Command::SearchFilters(
                    state.input_buffer.clone(),
                )))
            }
            _ => None,
        },
        InputMode::ExactDate => match key.code {
            KeyCode::Enter => {
                let raw = std::mem::take(&mut state.input_buffer);
                state.mode = InputMode::Normal;
                match parse_due_date(&raw) {
                    Some(day) => Some(Action::Dashboard(Command::ToggleFilter(FilterToken::Due(
                        DueFilter::On(day),
                    )))),
                    None => {
                        state.message = format!("Not a date: {}", raw);
                        None
                    }
                }
            }
            KeyCode::Esc => {
                state.mode = InputMode::Normal;
                state.reset_input();
                None
            }
            KeyCode::Backspace => {
                state.input_buffer.pop();
                None
            }
            KeyCode::Char(c) => {
                state.input_buffer.push(c);
                None
            }
            _ => None,
        },
        InputMode::Normal if dragging => match key.code {
            KeyCode::Down | KeyCode::Char('j') => {
                state.next();
                let idx = state.list_state.selected().unwrap_or(0);
                Some(Action::Dashboard(Command::DragOver(idx)))
            }
            KeyCode::Up | KeyCode::Char('k') => {
                state.previous();
                let idx = state.list_state.selected().unwrap_or(0);
                Some(Action::Dashboard(Command::DragOver(idx)))
            }
            KeyCode::Enter | KeyCode::Char('m') => Some(Action::Dashboard(Command::Drop)),
            KeyCode::Esc => Some(Action::Dashboard(Command::CancelDrag)),
            _ => None,
        },
        InputMode::Normal => match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Char('L') => Some(Action::SignOut),
            KeyCode::Char('s') => Some(Action::Retry),
            KeyCode::Tab | KeyCode::Char('t') => {
                Some(Action::Dashboard(Command::SwitchTab(tab.other())))
            }
            KeyCode::Char('1') => Some(Action::Dashboard(Command::SwitchTab(Tab::Today))),
            KeyCode::Char('2') => Some(Action::Dashboard(Command::SwitchTab(Tab::Filter))),
            KeyCode::Char('a') => {
                state.mode = InputMode::Form;
                state.field = FormField::Name;
                Some(Action::Dashboard(Command::OpenForm))
            }
            _ => match tab {
                Tab::Today => handle_today_key(key, state),
                Tab::Filter => handle_filter_key(key, state),
            },
        },
    }
}

fn handle_today_key(key: KeyEvent, state: &mut AppState) -> Option<Action> {
    let selected = state.get_selected_task().map(|t| t.key().to_string());
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => {
            state.next();
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.previous();
            None
        }
        KeyCode::Char('e') | KeyCode::Enter => {
            let id = selected?;
            state.mode = InputMode::Form;
            state.field = FormField::Name;
            Some(Action::Dashboard(Command::EditTask(id)))
        }
        KeyCode::Char('r') => {
            let id = selected?;
            state.mode = InputMode::Form;
            state.field = FormField::Reminder;
            Some(Action::Dashboard(Command::EditTask(id)))
        }
        KeyCode::Char('R') => selected.map(|id| Action::Dashboard(Command::ClearReminder(id))),
        KeyCode::Char(' ') | KeyCode::Char('c') => {
            selected.map(|id| Action::Dashboard(Command::CompleteTask(id)))
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            selected.map(|id| Action::Dashboard(Command::DeleteTask(id)))
        }
        KeyCode::Char('m') => {
            let id = selected?;
            let index = state.list_state.selected().unwrap_or(0);
            state.message = "Moving: j/k to place, Enter to drop, Esc to cancel".to_string();
            Some(Action::Dashboard(Command::StartDrag { id, index }))
        }
        _ => None,
    }
}

fn handle_filter_key(key: KeyEvent, state: &mut AppState) -> Option<Action> {
    match key.code {
        KeyCode::Down | KeyCode::Char('j') => {
            state.next_token();
            None
        }
        KeyCode::Up | KeyCode::Char('k') => {
            state.previous_token();
            None
        }
        KeyCode::Enter | KeyCode::Char(' ') => state
            .get_selected_token()
            .map(|token| Action::Dashboard(Command::ToggleFilter(token))),
        KeyCode::Char('/') => {
            state.mode = InputMode::Searching;
            state.input_buffer = state
                .dashboard
                .as_ref()
                .map(|d| d.criteria().search.clone())
                .unwrap_or_default();
            None
        }
        KeyCode::Char('D') => {
            state.mode = InputMode::ExactDate;
            state.reset_input();
            None
        }
        KeyCode::Char('x') => Some(Action::Dashboard(Command::ClearFilters)),
        _ => None,
    }
}

fn handle_form_key(key: KeyEvent, state: &mut AppState) -> Option<Action> {
    match key.code {
        KeyCode::Esc => {
            state.mode = InputMode::Normal;
            return Some(Action::Dashboard(Command::CancelDraft));
        }
        KeyCode::Enter => {
            // Stays in the form if validation fails; the run loop checks.
            return Some(Action::Dashboard(Command::SubmitDraft));
        }
        KeyCode::Tab | KeyCode::Down => {
            state.field = state.field.next();
            return None;
        }
        KeyCode::BackTab | KeyCode::Up => {
            state.field = state.field.prev();
            return None;
        }
        _ => {}
    }

    let field = state.field;
    let dash = state.dashboard.as_mut()?;
    let draft = &mut dash.view_mut().draft;
    match field {
        FormField::Priority => {
            if matches!(key.code, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) {
                draft.priority = draft.priority.next();
            }
        }
        FormField::Tag => {
            if matches!(key.code, KeyCode::Left | KeyCode::Right | KeyCode::Char(' ')) {
                draft.tag = draft.tag.next();
            }
        }
        _ => {
            let text = match field {
                FormField::Name => &mut draft.name,
                FormField::Description => &mut draft.description,
                FormField::Due => &mut draft.due,
                _ => &mut draft.reminder,
            };
            match key.code {
                KeyCode::Backspace => {
                    text.pop();
                }
                KeyCode::Char(c) => text.push(c),
                _ => {}
            }
        }
    }
    None
}
