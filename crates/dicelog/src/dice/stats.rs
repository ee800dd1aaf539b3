//! Statistics report over recorded rolls.
//!
//! Request syntax: `<user_id|all>;<seconds|all>`.

use std::fmt::Write as _;
use std::num::ParseIntError;

use dicelog_session::IdentityId;
use dicelog_store::{DieStats, HistoryStore, StatsQuery};

/// Reply when no roll matches the request.
pub const NO_DATA: &str = "[No data found]";

const TABLE_HEADER: &str = "\n```\n\
Die Size |     Count | Average | Nat. 1s | Nat. Maxima\n\
-------- | --------- | ------- | ------- | -----------\n";

/// Malformed statistics request. The message is sent back as-is.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StatsRequestError {
    #[error("Bad statistics request (expected <user_id|all>;<seconds|all>)")]
    MissingSeparator,

    #[error("Error in input to statistical report: {0}")]
    InvalidNumber(#[from] ParseIntError),
}

/// Parsed request: optional user filter and optional age limit in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsRequest {
    pub user_id: Option<u64>,
    pub within_secs: Option<u64>,
}

impl StatsRequest {
    pub fn parse(input: &str) -> Result<Self, StatsRequestError> {
        let mut parts = input.split(';');
        let (Some(user), Some(window)) = (parts.next(), parts.next()) else {
            return Err(StatsRequestError::MissingSeparator);
        };
        Ok(Self {
            user_id: all_or_number(user)?,
            within_secs: all_or_number(window)?,
        })
    }
}

fn all_or_number(field: &str) -> Result<Option<u64>, ParseIntError> {
    let field = field.trim();
    if field.eq_ignore_ascii_case("all") {
        Ok(None)
    } else {
        field.parse().map(Some)
    }
}

/// Builds the report text for `identity` at time `now`.
pub fn report<H: HistoryStore>(
    history: &H,
    identity: IdentityId,
    input: &str,
    now: i64,
) -> String {
    let request = match StatsRequest::parse(input) {
        Ok(request) => request,
        Err(e) => return e.to_string(),
    };

    let query = StatsQuery {
        identity,
        user_id: request.user_id,
        within_secs: request.within_secs,
        now,
    };
    match history.die_stats(&query) {
        Ok(stats) if stats.is_empty() => NO_DATA.to_owned(),
        Ok(stats) => render(request.user_id.is_none(), &stats),
        Err(e) => {
            tracing::warn!(%identity, error = %e, "statistics query failed");
            "Error: statistics are unavailable".to_owned()
        }
    }
}

fn render(all_users: bool, stats: &[DieStats]) -> String {
    let mut out = String::from(if all_users {
        "Report for all users:"
    } else {
        "Report for requesting user:"
    });
    out.push_str(TABLE_HEADER);
    for row in stats {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "{:>8} | {:>9} | {:>7.2} | {:>7} | {:>11} ",
            row.die_size,
            row.count,
            row.average,
            row.natural_ones,
            row.natural_maxima
        );
    }
    out.push_str("```");
    out
}
