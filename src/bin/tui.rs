use taskdeck::cache::{FileCache, LocalCache};
use taskdeck::config::Config;
use taskdeck::logging;
use taskdeck::remote::{MemoryTree, RemoteTree, RestTree};
use taskdeck::session::{ConfigIdentity, IdentityProvider};
use taskdeck::tui::{self, Services};

use anyhow::{Context, Result};
use std::{env, sync::Arc};

#[tokio::main]
async fn main() -> Result<()> {
    // --- HANDLE HELP FLAG ---
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 && (args[1] == "--help" || args[1] == "-h") {
        println!("taskdeck - a live-synced task dashboard");
        println!("----------------------------------------");
        println!("Usage: taskdeck");
        println!();
        match Config::get_path_string() {
            Ok(path) => println!("Configuration File: {}", path),
            Err(_) => println!("Configuration Path: ~/.config/taskdeck/config.toml (Standard XDG)"),
        }
        println!();
        println!("Config Options:");
        println!("  database_url = \"https://<project>.firebaseio.com\" (empty = offline)");
        println!("  log_level = \"info\"");
        println!("  notifications = true");
        println!("  [account]");
        println!("  email = \"you@example.com\"");
        println!("  display_name = \"You\" (Optional)");
        println!("  token = \"...\" (Optional)");
        return Ok(());
    }

    // Panic Hook: restore the terminal before printing.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = crossterm::terminal::disable_raw_mode();
        let _ = crossterm::execute!(std::io::stdout(), crossterm::terminal::LeaveAlternateScreen);
        default_hook(info);
    }));

    // First run writes the defaults; a broken file stops here untouched.
    let config = Config::load_or_init()?;

    let _guard = logging::init(&config.log_level).context("failed to start logging")?;
    tracing::info!(offline = config.is_offline(), "taskdeck starting");

    let remote: Arc<dyn RemoteTree> = if config.is_offline() {
        Arc::new(MemoryTree::new())
    } else {
        let token = config.account.as_ref().map(|a| a.token.clone());
        Arc::new(
            RestTree::new(&config.database_url, token)
                .context("invalid database_url in config.toml")?,
        )
    };
    let cache: Arc<dyn LocalCache> =
        Arc::new(FileCache::open_default().context("failed to open the view cache")?);
    let identity: Arc<dyn IdentityProvider> =
        Arc::new(ConfigIdentity::new(config.account.clone(), cache.clone()));

    tui::run(
        config,
        Services {
            remote,
            identity,
            cache,
        },
    )
    .await
}
