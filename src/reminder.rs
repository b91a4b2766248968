// File: src/reminder.rs
use crate::model::Task;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// A reminder that came due. `name` is the task name when the timer was armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub task_id: String,
    pub name: String,
}

struct Armed {
    at: DateTime<Utc>,
    handle: AbortHandle,
}

/// Timer changes needed to match a task collection.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Plan {
    /// (task id, instant, task name)
    pub arm: Vec<(String, DateTime<Utc>, String)>,
    pub cancel: Vec<String>,
}

/// Compare the armed (id, instant) pairs with what `tasks` ask for at `now`.
/// Only open tasks with a reminder strictly after `now` want a timer.
pub fn plan(armed: &HashMap<String, DateTime<Utc>>, tasks: &[Task], now: DateTime<Utc>) -> Plan {
    let mut plan = Plan::default();
    let mut wanted: HashMap<&str, DateTime<Utc>> = HashMap::new();

    for task in tasks {
        let Some(at) = task.reminder else { continue };
        if task.completed || at <= now {
            continue;
        }
        wanted.insert(task.key(), at);
        match armed.get(task.key()) {
            Some(current) if *current == at => {}
            Some(_) => {
                plan.cancel.push(task.key().to_string());
                plan.arm.push((task.key().to_string(), at, task.name.clone()));
            }
            None => plan.arm.push((task.key().to_string(), at, task.name.clone())),
        }
    }
    for id in armed.keys() {
        if !wanted.contains_key(id.as_str()) {
            plan.cancel.push(id.clone());
        }
    }
    plan.cancel.sort();
    plan
}

pub struct ReminderScheduler {
    armed: HashMap<String, Armed>,
    tx: mpsc::UnboundedSender<Reminder>,
}

impl ReminderScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Reminder>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                armed: HashMap::new(),
                tx,
            },
            rx,
        )
    }

    /// Re-evaluate timers after the collection changed.
    pub fn sync(&mut self, tasks: &[Task], now: DateTime<Utc>) {
        let current: HashMap<String, DateTime<Utc>> =
            self.armed.iter().map(|(id, a)| (id.clone(), a.at)).collect();
        let plan = plan(&current, tasks, now);

        for id in &plan.cancel {
            if let Some(armed) = self.armed.remove(id) {
                armed.handle.abort();
                tracing::debug!(task = %id, "reminder cancelled");
            }
        }
        for (id, at, name) in plan.arm {
            let delay = (at - now).to_std().unwrap_or_default();
            let tx = self.tx.clone();
            let reminder = Reminder {
                task_id: id.clone(),
                name,
            };
            let handle = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(reminder);
            })
            .abort_handle();
            tracing::debug!(task = %id, %at, "reminder armed");
            self.armed.insert(id, Armed { at, handle });
        }
    }

    /// Timers that have not fired or been cancelled.
    pub fn pending(&self) -> usize {
        self.armed.values().filter(|a| !a.handle.is_finished()).count()
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.handle.abort();
        }
    }
}

impl Drop for ReminderScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::time::Duration as StdDuration;

    fn task(id: &str, name: &str, reminder: Option<DateTime<Utc>>) -> Task {
        let mut t = Task::new(name);
        t.id = Some(id.to_string());
        t.reminder = reminder;
        t
    }

    #[test]
    fn test_plan_dedupes_by_id_and_instant() {
        let now = Utc::now();
        let at = now + Duration::minutes(5);
        let tasks = vec![task("a", "A", Some(at))];

        let first = plan(&HashMap::new(), &tasks, now);
        assert_eq!(first.arm, vec![("a".to_string(), at, "A".to_string())]);

        let armed: HashMap<String, DateTime<Utc>> = [("a".to_string(), at)].into_iter().collect();
        assert_eq!(plan(&armed, &tasks, now), Plan::default());

        let moved = vec![task("a", "A", Some(at + Duration::minutes(1)))];
        let res = plan(&armed, &moved, now);
        assert_eq!(res.cancel, vec!["a".to_string()]);
        assert_eq!(res.arm.len(), 1);
    }

    #[test]
    fn test_plan_cancels_completed_removed_and_past() {
        let now = Utc::now();
        let future = now + Duration::minutes(5);
        let armed: HashMap<String, DateTime<Utc>> = ["done", "gone", "cleared", "stale"]
            .iter()
            .map(|id| (id.to_string(), future))
            .collect();

        let mut done = task("done", "D", Some(future));
        done.completed = true;
        let tasks = vec![
            done,
            task("cleared", "C", None),
            task("stale", "S", Some(now - Duration::minutes(1))),
        ];
        let res = plan(&armed, &tasks, now);
        assert!(res.arm.is_empty());
        assert_eq!(res.cancel, vec!["cleared", "done", "gone", "stale"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_future_reminder_fires_once() {
        let (mut scheduler, mut rx) = ReminderScheduler::new();
        let now = Utc::now();
        let tasks = vec![task("a", "Stretch", Some(now + Duration::seconds(60)))];

        scheduler.sync(&tasks, now);
        scheduler.sync(&tasks, now);
        assert_eq!(scheduler.pending(), 1);

        let fired = rx.recv().await.expect("reminder");
        assert_eq!(
            fired,
            Reminder {
                task_id: "a".into(),
                name: "Stretch".into()
            }
        );

        tokio::time::sleep(StdDuration::from_secs(300)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_past_reminder_never_fires() {
        let (mut scheduler, mut rx) = ReminderScheduler::new();
        let now = Utc::now();
        scheduler.sync(&[task("a", "A", Some(now - Duration::seconds(1)))], now);
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(StdDuration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completing_cancels_timer() {
        let (mut scheduler, mut rx) = ReminderScheduler::new();
        let now = Utc::now();
        let mut t = task("a", "A", Some(now + Duration::seconds(30)));
        scheduler.sync(std::slice::from_ref(&t), now);

        t.completed = true;
        scheduler.sync(&[t], now);
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(StdDuration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_changed_time_rearms() {
        let (mut scheduler, mut rx) = ReminderScheduler::new();
        let now = Utc::now();
        scheduler.sync(&[task("a", "A", Some(now + Duration::seconds(10)))], now);
        scheduler.sync(&[task("a", "A", Some(now + Duration::seconds(120)))], now);

        tokio::time::sleep(StdDuration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(StdDuration::from_secs(90)).await;
        assert_eq!(rx.try_recv().map(|r| r.task_id), Ok("a".to_string()));
        assert!(rx.try_recv().is_err());
    }
}
