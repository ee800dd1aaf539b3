/// Errors that can occur in the SQLite store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database rejected or failed a statement.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A thread panicked while holding the connection lock.
    #[error("database lock poisoned")]
    Poisoned,
}
