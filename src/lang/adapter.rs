/// Language adapter contract: how a stored entry point is launched.
pub trait LanguageAdapter: Send + Sync {
    fn language(&self) -> &'static str;

    /// argv that runs `entry` with the session directory as cwd.
    /// `entry` is a file name for interpreters and a command line for shells.
    fn run_command(&self, entry: &str) -> Vec<String>;
}
