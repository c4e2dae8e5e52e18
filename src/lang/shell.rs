use crate::lang::adapter::LanguageAdapter;

/// Hands a whole command line to `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellAdapter {
    shell: String,
}

impl Default for ShellAdapter {
    fn default() -> Self {
        Self::new("/bin/sh")
    }
}

impl ShellAdapter {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl LanguageAdapter for ShellAdapter {
    fn language(&self) -> &'static str {
        "shell"
    }

    fn run_command(&self, entry: &str) -> Vec<String> {
        vec![self.shell.clone(), "-c".to_string(), entry.to_string()]
    }
}
