//! Language adapters.
//!
//! The runner stays language-agnostic; adapters only say how an entry point
//! is launched.

pub mod adapter;
pub mod python;
pub mod shell;

use crate::config::settings::RunnerConfig;
use crate::config::types::{Result, SandboxError};
use crate::lang::adapter::LanguageAdapter;
use crate::lang::python::PythonAdapter;
use crate::lang::shell::ShellAdapter;

pub fn adapter_for(language: &str, config: &RunnerConfig) -> Result<Box<dyn LanguageAdapter>> {
    match language {
        "python" | "py" => Ok(Box::new(PythonAdapter::new(config.python_path.display().to_string()))),
        "shell" | "sh" => Ok(Box::new(ShellAdapter::new(config.shell_path.display().to_string()))),
        _ => Err(SandboxError::Config(format!(
            "unsupported language adapter: {language}"
        ))),
    }
}
