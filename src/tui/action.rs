use crate::dashboard::Command;

/// What a key press asks the run loop to do. Session-level actions need the
/// identity provider or an `.await`, so they are not dashboard commands.
#[derive(Debug)]
pub enum Action {
    SignIn,
    SignOut,
    Retry,
    Quit,
    Dashboard(Command),
}
