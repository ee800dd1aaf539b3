//! `SQLite`-backed implementation of the credential and history stores.
//!
//! All access goes through one connection behind a `Mutex`. Identity and
//! token inserts are single statements, so the PRIMARY KEY and UNIQUE
//! constraints decide collisions atomically. Unsigned 64-bit ids are stored
//! bit-for-bit in signed INTEGER columns.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use dicelog_protocol::DiscordCommand;
use dicelog_session::{
    Credential, CredentialStore, IdentityId, IdentityRecord, InsertOutcome,
    SessionToken,
};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::{DieRoll, DieStats, HistoryStore, StatsQuery, StoreError};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS admins (
        admin_id   INTEGER PRIMARY KEY,
        admin_name TEXT NOT NULL UNIQUE,
        salt       TEXT NOT NULL,
        salthash   TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS sessiontokens (
        token       TEXT PRIMARY KEY,
        admin_id    INTEGER NOT NULL,
        date_issued INTEGER NOT NULL
    );
    CREATE TABLE IF NOT EXISTS commands (
        interaction_id     INTEGER PRIMARY KEY,
        admin_id           INTEGER NOT NULL,
        interaction_type   INTEGER NOT NULL,
        command_id         INTEGER NOT NULL,
        interaction_data   TEXT NOT NULL,
        channel_id         INTEGER NOT NULL,
        channel_name       TEXT NOT NULL,
        user_id            INTEGER NOT NULL,
        username           TEXT NOT NULL,
        user_discriminator TEXT NOT NULL,
        user_display_name  TEXT NOT NULL,
        timestamp          TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS rolls (
        interaction_id INTEGER NOT NULL,
        die_size       INTEGER NOT NULL,
        die_roll       INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_rolls_interaction ON rolls(interaction_id);
";

const DIE_STATS_QUERY: &str = "
    SELECT r.die_size,
           COUNT(*),
           AVG(r.die_roll),
           SUM(CASE WHEN r.die_roll = 1 THEN 1 ELSE 0 END),
           SUM(CASE WHEN r.die_roll = r.die_size THEN 1 ELSE 0 END)
    FROM rolls r
    INNER JOIN commands c ON r.interaction_id = c.interaction_id
    WHERE c.admin_id = ?1
      AND (?2 IS NULL OR c.user_id = ?2)
      AND (?3 IS NULL OR ?4 - unixepoch(c.timestamp) <= ?3)
    GROUP BY r.die_size
    ORDER BY r.die_size
";

/// A store backed by a single SQLite database.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and ensures the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "opened database");
        Self::from_connection(conn)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn identity_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<IdentityRecord> {
    Ok(IdentityRecord {
        id: IdentityId(row.get(0)?),
        name: row.get(1)?,
        credential: Credential {
            salt: row.get(2)?,
            digest: row.get(3)?,
        },
    })
}

// ---------------------------------------------------------------------------
// CredentialStore
// ---------------------------------------------------------------------------

impl CredentialStore for SqliteStore {
    type Error = StoreError;

    fn identity_by_name(
        &self,
        name: &str,
    ) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT admin_id, admin_name, salt, salthash
                 FROM admins WHERE admin_name = ?1",
                params![name],
                identity_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn identity_by_id(
        &self,
        id: IdentityId,
    ) -> Result<Option<IdentityRecord>, StoreError> {
        let conn = self.lock()?;
        let record = conn
            .query_row(
                "SELECT admin_id, admin_name, salt, salthash
                 FROM admins WHERE admin_id = ?1",
                params![id.0],
                identity_from_row,
            )
            .optional()?;
        Ok(record)
    }

    fn insert_identity(
        &self,
        record: &IdentityRecord,
    ) -> Result<InsertOutcome, StoreError> {
        let conn = self.lock()?;
        let result = conn.execute(
            "INSERT INTO admins (admin_id, admin_name, salt, salthash)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                record.id.0,
                record.name,
                record.credential.salt,
                record.credential.digest
            ],
        );
        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(rusqlite::Error::SqliteFailure(err, msg))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                let name_clash =
                    msg.as_deref().is_some_and(|m| m.contains("admin_name"));
                Ok(if name_clash {
                    InsertOutcome::NameTaken
                } else {
                    InsertOutcome::IdTaken
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update_credential(
        &self,
        id: IdentityId,
        credential: &Credential,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE admins SET salt = ?1, salthash = ?2 WHERE admin_id = ?3",
            params![credential.salt, credential.digest, id.0],
        )?;
        Ok(updated > 0)
    }

    fn insert_token(&self, token: &SessionToken) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO sessiontokens (token, admin_id, date_issued)
             VALUES (?1, ?2, ?3)",
            params![token.token, token.identity.0, token.issued_at],
        )?;
        Ok(inserted == 1)
    }

    fn find_token(
        &self,
        token: &str,
    ) -> Result<Option<SessionToken>, StoreError> {
        let conn = self.lock()?;
        let found = conn
            .query_row(
                "SELECT token, admin_id, date_issued
                 FROM sessiontokens WHERE token = ?1",
                params![token],
                |row| {
                    Ok(SessionToken {
                        token: row.get(0)?,
                        identity: IdentityId(row.get(1)?),
                        issued_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// HistoryStore
// ---------------------------------------------------------------------------

impl HistoryStore for SqliteStore {
    type Error = StoreError;

    fn record_command(
        &self,
        identity: IdentityId,
        command: &DiscordCommand,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO commands (
                interaction_id, admin_id, interaction_type, command_id,
                interaction_data, channel_id, channel_name, user_id, username,
                user_discriminator, user_display_name, timestamp
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                command.interaction_id as i64,
                identity.0,
                command.interaction_type,
                command.command_id as i64,
                command.interaction_data,
                command.channel_id as i64,
                command.channel_name,
                command.user_id as i64,
                command.username,
                command.user_discriminator,
                command.user_display_name,
                command.timestamp,
            ],
        )?;
        Ok(())
    }

    fn record_rolls(
        &self,
        interaction_id: u64,
        rolls: &[DieRoll],
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO rolls (interaction_id, die_size, die_roll)
                 VALUES (?1, ?2, ?3)",
            )?;
            for roll in rolls {
                stmt.execute(params![
                    interaction_id as i64,
                    roll.die_size,
                    roll.value
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn die_stats(&self, query: &StatsQuery) -> Result<Vec<DieStats>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(DIE_STATS_QUERY)?;
        let rows = stmt.query_map(
            params![
                query.identity.0,
                query.user_id.map(|u| u as i64),
                query.within_secs.map(|s| i64::try_from(s).unwrap_or(i64::MAX)),
                query.now,
            ],
            |row| {
                Ok(DieStats {
                    die_size: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    average: row.get(2)?,
                    natural_ones: row.get::<_, i64>(3)? as u64,
                    natural_maxima: row.get::<_, i64>(4)? as u64,
                })
            },
        )?;
        let stats = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}
