// File: src/model.rs
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Low, Priority::Normal, Priority::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "Low",
            Priority::Normal => "Normal",
            Priority::High => "High",
        }
    }

    /// Label shown in the filter panel and the task form.
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "Priority 1",
            Priority::Normal => "Priority 2",
            Priority::High => "Priority 3",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Priority::Low => Priority::Normal,
            Priority::Normal => Priority::High,
            Priority::High => Priority::Low,
        }
    }
}

// Unknown values fall back to the default instead of rejecting the record.
impl From<String> for Priority {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Normal,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Tag {
    #[default]
    Home,
    Work,
    Education,
}

impl Tag {
    pub const ALL: [Tag; 3] = [Tag::Home, Tag::Work, Tag::Education];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tag::Home => "Home",
            Tag::Work => "Work",
            Tag::Education => "Education",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Tag::Home => Tag::Work,
            Tag::Work => Tag::Education,
            Tag::Education => Tag::Home,
        }
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "work" => Tag::Work,
            "education" => Tag::Education,
            _ => Tag::Home,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Store-generated key. `None` until the task has been persisted.
    pub id: Option<String>,
    provisional_id: String,
    pub name: String,
    pub due: Option<NaiveDate>,
    pub description: String,
    pub priority: Priority,
    pub tag: Tag,
    pub reminder: Option<DateTime<Utc>>,
    pub completed: bool,
    pub order: Option<i64>,
}

impl Task {
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            provisional_id: format!("provisional-{}", Uuid::new_v4()),
            name: name.to_string(),
            due: None,
            description: String::new(),
            priority: Priority::default(),
            tag: Tag::default(),
            reminder: None,
            completed: false,
            order: None,
        }
    }

    /// Identity used for rendering and for every store operation.
    /// Falls back to the provisional id until the store has assigned a key.
    pub fn key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.provisional_id)
    }

    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Due strictly before `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.due.is_some_and(|d| d < today)
    }

    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.due == Some(day)
    }

    pub fn from_record(key: &str, record: TaskRecord) -> Result<Self, String> {
        let name = record.task_name.trim();
        if name.is_empty() {
            return Err(format!("task {} has an empty name", key));
        }
        let mut task = Task::new(name);
        task.id = Some(key.to_string());
        task.due = record.due_date.as_deref().and_then(parse_due_date);
        task.description = record.description.unwrap_or_default();
        task.priority = record.priority;
        task.tag = record.tag;
        task.reminder = record.reminder_time.as_deref().and_then(parse_reminder);
        task.completed = record.completed.unwrap_or(false);
        task.order = record.order;
        Ok(task)
    }

    pub fn from_value(key: &str, value: &Value) -> Result<Self, String> {
        let record: TaskRecord =
            serde_json::from_value(value.clone()).map_err(|e| format!("task {}: {}", key, e))?;
        Self::from_record(key, record)
    }

    pub fn to_record(&self) -> TaskRecord {
        TaskRecord {
            task_name: self.name.clone(),
            due_date: self.due.map(|d| d.format(DATE_FORMAT).to_string()),
            description: Some(self.description.clone()),
            priority: self.priority,
            tag: self.tag,
            reminder_time: self.reminder.map(|r| r.to_rfc3339()),
            completed: self.completed.then_some(true),
            order: self.order,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.to_record()).unwrap_or(Value::Null)
    }
}

/// The JSON shape of a task inside the remote tree.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    #[serde(default)]
    pub task_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub tag: Tag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
}

/// Partial update. Outer `None` leaves a field untouched; for clearable
/// fields `Some(None)` removes the value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub due: Option<Option<NaiveDate>>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub tag: Option<Tag>,
    pub reminder: Option<Option<DateTime<Utc>>>,
    pub completed: Option<bool>,
    pub order: Option<i64>,
}

impl TaskPatch {
    pub fn completed() -> Self {
        Self {
            completed: Some(true),
            ..Self::default()
        }
    }

    pub fn order(order: i64) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    pub fn reminder(reminder: Option<DateTime<Utc>>) -> Self {
        Self {
            reminder: Some(reminder),
            ..Self::default()
        }
    }

    /// Every editable field of `task`, as written by the edit form.
    pub fn from_task(task: &Task) -> Self {
        Self {
            name: Some(task.name.clone()),
            due: Some(task.due),
            description: Some(task.description.clone()),
            priority: Some(task.priority),
            tag: Some(task.tag),
            reminder: Some(task.reminder),
            completed: None,
            order: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(due) = self.due {
            task.due = due;
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(tag) = self.tag {
            task.tag = tag;
        }
        if let Some(reminder) = self.reminder {
            task.reminder = reminder;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(order) = self.order {
            task.order = Some(order);
        }
    }

    /// Fold a later patch into this one; fields set by `later` win.
    pub fn merge(&mut self, later: &TaskPatch) {
        if later.name.is_some() {
            self.name = later.name.clone();
        }
        if later.due.is_some() {
            self.due = later.due;
        }
        if later.description.is_some() {
            self.description = later.description.clone();
        }
        if later.priority.is_some() {
            self.priority = later.priority;
        }
        if later.tag.is_some() {
            self.tag = later.tag;
        }
        if later.reminder.is_some() {
            self.reminder = later.reminder;
        }
        if later.completed.is_some() {
            self.completed = later.completed;
        }
        if later.order.is_some() {
            self.order = later.order;
        }
    }

    /// Wire form of the patch. Cleared fields are sent as `null`, which the
    /// store treats as a delete of that child.
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(name) = &self.name {
            map.insert("taskName".into(), Value::String(name.clone()));
        }
        if let Some(due) = self.due {
            map.insert(
                "dueDate".into(),
                due.map(|d| Value::String(d.format(DATE_FORMAT).to_string()))
                    .unwrap_or(Value::Null),
            );
        }
        if let Some(description) = &self.description {
            map.insert("description".into(), Value::String(description.clone()));
        }
        if let Some(priority) = self.priority {
            map.insert("priority".into(), Value::String(priority.as_str().into()));
        }
        if let Some(tag) = self.tag {
            map.insert("tag".into(), Value::String(tag.as_str().into()));
        }
        if let Some(reminder) = self.reminder {
            map.insert(
                "reminderTime".into(),
                reminder
                    .map(|r| Value::String(r.to_rfc3339()))
                    .unwrap_or(Value::Null),
            );
        }
        if let Some(completed) = self.completed {
            map.insert("completed".into(), Value::Bool(completed));
        }
        if let Some(order) = self.order {
            map.insert("order".into(), Value::from(order));
        }
        map
    }
}

pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
}

/// Accepts RFC 3339, or a local `YYYY-MM-DDTHH:MM[:SS]` (also with a space
/// instead of `T`) interpreted in the local time zone.
pub fn parse_reminder(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn format_reminder(reminder: DateTime<Utc>) -> String {
    reminder
        .with_timezone(&Local)
        .format("%m/%d/%Y %-I:%M %p")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_record_decoding_with_legacy_blank_fields() {
        let value = json!({
            "taskName": "Buy milk",
            "dueDate": "",
            "description": "2 litres",
            "priority": "High",
            "reminderTime": "",
            "tag": "Work"
        });
        let task = Task::from_value("-Nabc", &value).expect("valid record");

        assert_eq!(task.id.as_deref(), Some("-Nabc"));
        assert_eq!(task.key(), "-Nabc");
        assert_eq!(task.due, None);
        assert_eq!(task.reminder, None);
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.tag, Tag::Work);
        assert!(!task.completed);
        assert_eq!(task.order, None);
    }

    #[test]
    fn test_unknown_enums_fall_back_to_defaults() {
        let value = json!({ "taskName": "x", "priority": "urgent", "tag": "Garden" });
        let task = Task::from_value("k", &value).expect("valid record");
        assert_eq!(task.priority, Priority::Normal);
        assert_eq!(task.tag, Tag::Home);
    }

    #[test]
    fn test_empty_name_is_rejected() {
        let value = json!({ "taskName": "   " });
        assert!(Task::from_value("k", &value).is_err());
        assert!(Task::from_value("k", &json!("not an object")).is_err());
    }

    #[test]
    fn test_local_reminder_format_is_accepted() {
        let parsed = parse_reminder("2030-05-01T14:30").expect("local datetime");
        let back = parsed.with_timezone(&Local);
        assert_eq!(back.format("%Y-%m-%d %H:%M").to_string(), "2030-05-01 14:30");

        let rfc = parse_reminder("2030-05-01T12:00:00Z").expect("rfc3339");
        assert_eq!(rfc.to_rfc3339(), "2030-05-01T12:00:00+00:00");
    }

    #[test]
    fn test_provisional_key_differs_from_store_key() {
        let unsaved = Task::new("X");
        assert!(!unsaved.is_persisted());
        assert!(unsaved.key().starts_with("provisional-"));
        assert_ne!(Task::new("X").key(), unsaved.key());
    }

    #[test]
    fn test_patch_wire_form_clears_with_null() {
        let patch = TaskPatch {
            due: Some(None),
            reminder: Some(None),
            completed: Some(true),
            ..TaskPatch::default()
        };
        let json = Value::Object(patch.to_json());
        assert_eq!(
            json,
            json!({ "dueDate": null, "reminderTime": null, "completed": true })
        );
    }

    #[test]
    fn test_patch_merge_and_apply() {
        let mut task = Task::new("a");
        task.due = NaiveDate::from_ymd_opt(2030, 1, 1);

        let mut pending = TaskPatch::order(4);
        pending.merge(&TaskPatch {
            name: Some("b".into()),
            due: Some(None),
            ..TaskPatch::default()
        });
        pending.apply_to(&mut task);

        assert_eq!(task.name, "b");
        assert_eq!(task.due, None);
        assert_eq!(task.order, Some(4));
    }
}
