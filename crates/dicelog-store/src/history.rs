//! Command and roll history.

use dicelog_protocol::DiscordCommand;
use dicelog_session::IdentityId;

/// One die rolled while executing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DieRoll {
    /// Number of faces.
    pub die_size: u32,
    /// Face that came up, in `1..=die_size`.
    pub value: u32,
}

/// Which rolls a statistics report covers.
///
/// Only commands submitted by `identity` are ever included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsQuery {
    pub identity: IdentityId,
    /// Restrict to one chat user; `None` for every user.
    pub user_id: Option<u64>,
    /// Restrict to commands at most this many seconds old; `None` for all time.
    pub within_secs: Option<u64>,
    /// Reference time in unix seconds for `within_secs`.
    pub now: i64,
}

/// Aggregates for one die size.
#[derive(Debug, Clone, PartialEq)]
pub struct DieStats {
    pub die_size: u32,
    pub count: u64,
    pub average: f64,
    /// Rolls that came up 1.
    pub natural_ones: u64,
    /// Rolls that came up `die_size`.
    pub natural_maxima: u64,
}

/// Append-only record of executed commands and the dice they rolled.
pub trait HistoryStore: Send + Sync + 'static {
    /// The error type for history operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Records a command submitted by `identity`.
    ///
    /// A command with an already-recorded `interaction_id` replaces the
    /// earlier record.
    fn record_command(
        &self,
        identity: IdentityId,
        command: &DiscordCommand,
    ) -> Result<(), Self::Error>;

    /// Records the dice rolled for an interaction.
    fn record_rolls(
        &self,
        interaction_id: u64,
        rolls: &[DieRoll],
    ) -> Result<(), Self::Error>;

    /// Per-die-size statistics, ordered by die size.
    fn die_stats(&self, query: &StatsQuery) -> Result<Vec<DieStats>, Self::Error>;
}
