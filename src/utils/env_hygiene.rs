/// Deterministic environment for sandboxed children
///
/// The child never inherits the server's environment. It receives a fixed
/// PATH and locale, with HOME and TMPDIR pointing into its own session
/// directory.
use std::collections::BTreeMap;
use std::path::Path;

pub const SANDBOX_PATH: &str = "/usr/local/bin:/usr/bin:/bin";
pub const SANDBOX_LOCALE: &str = "C.UTF-8";

#[derive(Debug, Clone)]
pub struct EnvHygiene {
    path: String,
    locale: String,
}

impl Default for EnvHygiene {
    fn default() -> Self {
        EnvHygiene {
            path: SANDBOX_PATH.to_string(),
            locale: SANDBOX_LOCALE.to_string(),
        }
    }
}

impl EnvHygiene {
    pub fn new() -> Self {
        Self::default()
    }

    /// The complete variable set for a child running in `session_root`
    pub fn environment(&self, session_root: &Path) -> BTreeMap<String, String> {
        let root = session_root.display().to_string();
        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), self.path.clone());
        env.insert("HOME".to_string(), root.clone());
        env.insert("TMPDIR".to_string(), root);
        env.insert("LANG".to_string(), self.locale.clone());
        env.insert("LC_ALL".to_string(), self.locale.clone());
        env.insert("PYTHONDONTWRITEBYTECODE".to_string(), "1".to_string());
        env.insert("PYTHONUNBUFFERED".to_string(), "1".to_string());
        env.insert("PYTHONIOENCODING".to_string(), "utf-8".to_string());
        env
    }
}
