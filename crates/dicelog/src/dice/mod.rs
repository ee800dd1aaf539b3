//! The dice-rolling [`CommandExecutor`].

mod roll;
mod stats;

use std::sync::Arc;

use dicelog_protocol::DiscordCommand;
use dicelog_session::{Clock, IdentityId, SystemClock};
use dicelog_store::HistoryStore;

pub use roll::{
    roll, RollError, RollOutcome, HELP, MAX_DICE_PER_TERM, MAX_REPEAT, MAX_TOTAL_DICE,
};
pub use stats::{report, StatsRequest, StatsRequestError, NO_DATA};

use crate::CommandExecutor;

/// `command_id` of a dice roll.
pub const ROLL_COMMAND: u64 = 1;

/// `command_id` of a statistics report.
pub const STATS_COMMAND: u64 = 2;

/// Rolls dice and reports statistics, recording every die in `history`.
pub struct DiceExecutor<H, K = SystemClock> {
    history: Arc<H>,
    clock: K,
}

impl<H: HistoryStore> DiceExecutor<H> {
    pub fn new(history: Arc<H>) -> Self {
        Self::with_clock(history, SystemClock)
    }
}

impl<H: HistoryStore, K: Clock> DiceExecutor<H, K> {
    /// Uses `clock` as "now" for statistics time windows.
    pub fn with_clock(history: Arc<H>, clock: K) -> Self {
        Self { history, clock }
    }

    fn roll(&self, command: &DiscordCommand) -> String {
        let outcome = roll(&command.interaction_data, &mut rand::rng());
        if !outcome.rolls.is_empty() {
            if let Err(e) =
                self.history.record_rolls(command.interaction_id, &outcome.rolls)
            {
                tracing::warn!(
                    interaction_id = command.interaction_id,
                    error = %e,
                    "rolls not recorded"
                );
            }
        }
        outcome.text
    }
}

impl<H: HistoryStore, K: Clock> CommandExecutor for DiceExecutor<H, K> {
    fn execute(&self, identity: IdentityId, command: &DiscordCommand) -> String {
        match command.command_id {
            ROLL_COMMAND => self.roll(command),
            STATS_COMMAND => report(
                &*self.history,
                identity,
                &command.interaction_data,
                self.clock.now(),
            ),
            other => format!("Invalid command type ({other})"),
        }
    }
}
