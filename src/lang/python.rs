use crate::lang::adapter::LanguageAdapter;

/// Runs generated programs with `python3 -B` (no bytecode written into the session).
#[derive(Debug, Clone)]
pub struct PythonAdapter {
    interpreter: String,
}

impl Default for PythonAdapter {
    fn default() -> Self {
        Self::new("python3")
    }
}

impl PythonAdapter {
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

impl LanguageAdapter for PythonAdapter {
    fn language(&self) -> &'static str {
        "python"
    }

    fn run_command(&self, entry: &str) -> Vec<String> {
        vec![self.interpreter.clone(), "-B".to_string(), entry.to_string()]
    }
}
