// File: src/dashboard.rs
// One signed-in session: the live task collection, its view state and the
// reminder timers, driven by commands from the UI.
use crate::cache::LocalCache;
use crate::error::{Error, Result};
use crate::filter::{FilterCriteria, FilterToken, visible_tasks};
use crate::model::{Task, TaskPatch};
use crate::reminder::{Reminder, ReminderScheduler};
use crate::remote::RemoteTree;
use crate::session::Session;
use crate::sync::{SyncEvent, TaskSync};
use crate::view::{Submission, Tab, ViewState};
use chrono::{DateTime, Local, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    OpenForm,
    SubmitDraft,
    EditTask(String),
    CancelDraft,
    DeleteTask(String),
    CompleteTask(String),
    SetReminder { id: String, at: DateTime<Utc> },
    ClearReminder(String),
    SwitchTab(Tab),
    ToggleFilter(FilterToken),
    SearchFilters(String),
    ClearFilters,
    StartDrag { id: String, index: usize },
    DragOver(usize),
    Drop,
    CancelDrag,
    Reorder(Vec<String>),
}

/// Something the UI must show. Alerts block until acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Alert(String),
    Warning(String),
    Reminder(Reminder),
    Status(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyState {
    /// No tasks at all.
    NoTasks,
    /// Tasks exist and every one is completed.
    AllDone,
}

pub struct Dashboard {
    session: Session,
    sync: TaskSync,
    view: ViewState,
    reminders: ReminderScheduler,
    notifications: bool,
}

impl Dashboard {
    pub async fn open(
        remote: Arc<dyn RemoteTree>,
        session: Session,
        cache: Arc<dyn LocalCache>,
        notifications: bool,
    ) -> Result<(Self, mpsc::UnboundedReceiver<Reminder>)> {
        let sync = TaskSync::connect(remote, &session).await?;
        let (reminders, fired) = ReminderScheduler::new();
        let dashboard = Self {
            session,
            sync,
            view: ViewState::load(cache),
            reminders,
            notifications,
        };
        Ok((dashboard, fired))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sync(&self) -> &TaskSync {
        &self.sync
    }

    pub fn sync_mut(&mut self) -> &mut TaskSync {
        &mut self.sync
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    /// Release the feed and every armed timer.
    pub fn close(&mut self) {
        self.sync.disconnect();
        self.reminders.cancel_all();
    }

    /// The list shown on the Today tab, in collection order.
    pub fn visible(&self, now: DateTime<Local>) -> Vec<&Task> {
        visible_tasks(self.sync.tasks(), self.view.criteria(), now)
    }

    pub fn visible_ids(&self, now: DateTime<Local>) -> Vec<String> {
        self.visible(now)
            .into_iter()
            .map(|t| t.key().to_string())
            .collect()
    }

    pub fn criteria(&self) -> &FilterCriteria {
        self.view.criteria()
    }

    /// Hidden while the form is open or before the first snapshot.
    pub fn empty_state(&self) -> Option<EmptyState> {
        if self.view.is_form_open() || !self.sync.is_loaded() {
            return None;
        }
        let tasks = self.sync.tasks();
        if tasks.is_empty() {
            Some(EmptyState::NoTasks)
        } else if tasks.iter().all(|t| t.completed) {
            Some(EmptyState::AllDone)
        } else {
            None
        }
    }

    // --- INPUT ---

    pub fn handle(&mut self, command: Command) -> Vec<Notice> {
        tracing::debug!(?command, "dashboard command");
        let result = match command {
            Command::OpenForm => {
                self.view.open_form();
                Ok(())
            }
            Command::SubmitDraft => self.submit_draft(),
            Command::EditTask(id) => match self.sync.task(&id) {
                Some(task) => {
                    let task = task.clone();
                    self.view.begin_edit(&task);
                    Ok(())
                }
                None => Err(Error::Validation("That task no longer exists.".into())),
            },
            Command::CancelDraft => {
                self.view.cancel_draft();
                Ok(())
            }
            Command::DeleteTask(id) => self.sync.delete_task(&id),
            Command::CompleteTask(id) => self.sync.complete_task(&id),
            Command::SetReminder { id, at } => self.sync.update_task(&id, TaskPatch::reminder(Some(at))),
            Command::ClearReminder(id) => self.sync.update_task(&id, TaskPatch::reminder(None)),
            Command::SwitchTab(tab) => {
                self.view.switch_tab(tab);
                Ok(())
            }
            Command::ToggleFilter(token) => {
                self.view.toggle_filter(token);
                Ok(())
            }
            Command::SearchFilters(text) => {
                self.view.set_search(&text);
                Ok(())
            }
            Command::ClearFilters => {
                self.view.clear_filters();
                Ok(())
            }
            Command::StartDrag { id, index } => {
                self.view.start_drag(&id, index);
                Ok(())
            }
            Command::DragOver(index) => {
                self.view.drag_over(index);
                Ok(())
            }
            Command::Drop => {
                let visible = self.visible_ids(Local::now());
                match self.view.finish_drag(&visible) {
                    Some(sequence) => self.sync.reorder_tasks(&sequence),
                    None => Ok(()),
                }
            }
            Command::CancelDrag => {
                self.view.cancel_drag();
                Ok(())
            }
            Command::Reorder(sequence) => self.sync.reorder_tasks(&sequence),
        };

        // Optimistic edits may have changed reminders already.
        self.refresh_reminders();
        match result {
            Ok(()) => Vec::new(),
            Err(e) => vec![notice_for(e)],
        }
    }

    fn submit_draft(&mut self) -> Result<()> {
        match self.view.submit_draft()? {
            Submission::Create(task) => self.sync.create_task(&task),
            Submission::Update { id, patch } => self.sync.update_task(&id, patch),
        }
    }

    pub fn on_sync_event(&mut self, event: SyncEvent) -> Vec<Notice> {
        match self.sync.apply(event) {
            Ok(true) => {
                self.refresh_reminders();
                Vec::new()
            }
            Ok(false) => Vec::new(),
            Err(e) => vec![notice_for(e)],
        }
    }

    /// A timer fired. Suppressed if the task has since gone or been completed.
    pub fn on_reminder(&mut self, reminder: Reminder) -> Vec<Notice> {
        if !self.notifications {
            return Vec::new();
        }
        match self.sync.task(&reminder.task_id) {
            Some(task) if !task.completed => {
                tracing::info!(task = %reminder.task_id, "reminder due");
                // The name may have changed since the timer was armed.
                vec![Notice::Reminder(Reminder {
                    name: task.name.clone(),
                    ..reminder
                })]
            }
            _ => Vec::new(),
        }
    }

    fn refresh_reminders(&mut self) {
        self.reminders.sync(self.sync.tasks(), Utc::now());
    }

    pub fn pending_reminders(&self) -> usize {
        self.reminders.pending()
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.close();
    }
}

/// User-facing text for a failed operation.
pub fn notice_for(error: Error) -> Notice {
    match error {
        Error::Subscription(_) => {
            Notice::Warning("Failed to fetch tasks. Please try again later.".into())
        }
        Error::Write { op, .. } => Notice::Alert(format!("Failed to {}.", op)),
        Error::Validation(message) => Notice::Alert(message),
        other => Notice::Alert(other.to_string()),
    }
}
