//! Single-line file holding the client's session token between runs.

use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The stored token: the first line of the file.
    ///
    /// A missing file yields the empty token, which the server rejects and
    /// so triggers a password login.
    pub fn load(&self) -> io::Result<String> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(content.lines().next().unwrap_or("").trim().to_owned()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    /// Replaces the file contents with `token`.
    pub fn store(&self, token: &str) -> io::Result<()> {
        std::fs::write(&self.path, format!("{token}\n"))
    }
}
