pub mod action;
pub mod handlers;
pub mod state;
pub mod view;

use crate::cache::LocalCache;
use crate::config::Config;
use crate::dashboard::{Dashboard, Notice, notice_for};
use crate::reminder::Reminder;
use crate::remote::RemoteTree;
use crate::session::IdentityProvider;

use action::Action;
use state::{AppState, InputMode};
use view::draw;

use anyhow::Result;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::{io, sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// Everything the terminal UI needs from the outside world.
pub struct Services {
    pub remote: Arc<dyn RemoteTree>,
    pub identity: Arc<dyn IdentityProvider>,
    pub cache: Arc<dyn LocalCache>,
}

pub async fn run(config: Config, services: Services) -> Result<()> {
    // --- 1. TERMINAL SETUP ---
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = event_loop(&mut terminal, &config, &services).await;

    // --- 3. TEARDOWN ---
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    result
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: &Config,
    services: &Services,
) -> Result<()> {
    // --- 2. STATE INIT ---
    let account_hint = config.account.as_ref().map(|a| a.email.clone());
    let mut app_state = AppState::new(account_hint);
    let mut reminders: Option<mpsc::UnboundedReceiver<Reminder>> = None;

    if config.is_offline() {
        app_state.message = "Offline: tasks live in memory for this run.".to_string();
    }

    // A session left signed in by the previous run.
    if let Some(session) = services.identity.restore().await {
        open_dashboard(&mut app_state, &mut reminders, config, services, session).await;
    }

    loop {
        terminal.draw(|f| draw(f, &mut app_state))?;

        // Feed snapshots, write results and due reminders.
        let mut notices: Vec<Notice> = Vec::new();
        if let Some(dash) = app_state.dashboard.as_mut() {
            while let Some(event) = dash.sync_mut().try_next_event() {
                notices.extend(dash.on_sync_event(event));
            }
            if let Some(rx) = reminders.as_mut() {
                while let Ok(reminder) = rx.try_recv() {
                    notices.extend(dash.on_reminder(reminder));
                }
            }
        }
        app_state.push_notices(notices);

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };

        match handlers::handle_key_event(key, &mut app_state) {
            Some(Action::Quit) => break,
            Some(Action::SignIn) => match services.identity.sign_in().await {
                Ok(session) => {
                    open_dashboard(&mut app_state, &mut reminders, config, services, session)
                        .await;
                }
                Err(e) => {
                    // Auth failures are logged only; the screen stays put.
                    tracing::warn!(error = %e, "sign-in failed");
                    app_state.message = "Sign-in failed. See the log for details.".to_string();
                }
            },
            Some(Action::SignOut) => {
                sign_out(&mut app_state, &mut reminders, services.identity.as_ref()).await;
            }
            Some(Action::Retry) => {
                if let Some(dash) = app_state.dashboard.as_mut() {
                    dash.sync_mut().reconnect().await;
                    app_state.message = "Reconnecting...".to_string();
                }
            }
            Some(Action::Dashboard(command)) => {
                if let Some(dash) = app_state.dashboard.as_mut() {
                    let notices = dash.handle(command);
                    let form_open = dash.view().is_form_open();
                    app_state.push_notices(notices);
                    if app_state.mode == InputMode::Form && !form_open {
                        app_state.mode = InputMode::Normal;
                    }
                }
            }
            None => {}
        }
    }

    if let Some(dash) = app_state.dashboard.as_mut() {
        dash.close();
    }
    Ok(())
}

/// Tear the dashboard down only once the identity provider confirms the
/// sign-out; on failure the session stays as it was so the user can retry.
async fn sign_out(
    app_state: &mut AppState,
    reminders: &mut Option<mpsc::UnboundedReceiver<Reminder>>,
    identity: &dyn IdentityProvider,
) -> bool {
    if let Err(e) = identity.sign_out().await {
        tracing::warn!(error = %e, "sign-out failed");
        app_state.message = "Sign-out failed. Press L to try again.".to_string();
        return false;
    }
    // Dropping the dashboard releases the feed and the timers.
    app_state.dashboard = None;
    *reminders = None;
    app_state.mode = InputMode::Normal;
    app_state.message = "Signed out.".to_string();
    true
}

async fn open_dashboard(
    app_state: &mut AppState,
    reminders: &mut Option<mpsc::UnboundedReceiver<Reminder>>,
    config: &Config,
    services: &Services,
    session: crate::session::Session,
) {
    let name = session.display_name.clone();
    match Dashboard::open(
        services.remote.clone(),
        session,
        services.cache.clone(),
        config.notifications,
    )
    .await
    {
        Ok((dash, fired)) => {
            app_state.dashboard = Some(dash);
            *reminders = Some(fired);
            app_state.message = format!("Signed in as {}.", name);
        }
        Err(e) => {
            tracing::error!(error = %e, "could not open the dashboard");
            app_state.push_notices(vec![notice_for(e)]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::config::AccountConfig;
    use crate::remote::MemoryTree;
    use crate::session::ConfigIdentity;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Memory cache whose `remove` can be made to fail.
    struct StuckCache {
        inner: MemoryCache,
        fail_remove: AtomicBool,
    }

    impl LocalCache for StuckCache {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            if self.fail_remove.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.remove(key)
        }
    }

    #[tokio::test]
    async fn test_failed_sign_out_keeps_session() {
        let cache = Arc::new(StuckCache {
            inner: MemoryCache::new(),
            fail_remove: AtomicBool::new(true),
        });
        let account = AccountConfig {
            email: "ada@example.com".into(),
            display_name: "Ada".into(),
            token: String::new(),
        };
        let services = Services {
            remote: Arc::new(MemoryTree::new()),
            identity: Arc::new(ConfigIdentity::new(Some(account), cache.clone())),
            cache: cache.clone(),
        };
        let config = Config::default();
        let mut app_state = AppState::new(Some("ada@example.com".into()));
        let mut reminders = None;

        let session = services.identity.sign_in().await.expect("sign in");
        open_dashboard(&mut app_state, &mut reminders, &config, &services, session).await;
        assert!(app_state.dashboard.is_some());

        assert!(!sign_out(&mut app_state, &mut reminders, services.identity.as_ref()).await);
        assert!(app_state.dashboard.is_some());
        assert!(reminders.is_some());
        assert!(services.identity.restore().await.is_some());

        cache.fail_remove.store(false, Ordering::SeqCst);
        assert!(sign_out(&mut app_state, &mut reminders, services.identity.as_ref()).await);
        assert!(app_state.dashboard.is_none());
        assert!(reminders.is_none());
        assert_eq!(services.identity.restore().await, None);
    }
}
