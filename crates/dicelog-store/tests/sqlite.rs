//! Integration tests for `SqliteStore`.
//!
//! Credential behavior is exercised through `SessionAuthenticator` so the
//! SQLite implementation is held to the same contract as the in-memory one.

use std::sync::Arc;

use dicelog_protocol::DiscordCommand;
use dicelog_session::{
    Credential, CredentialStore, IdentityId, IdentityRecord, InsertOutcome,
    ManualClock, SessionAuthenticator, SessionConfig, SessionToken,
    TokenValidity,
};
use dicelog_store::{DieRoll, HistoryStore, SqliteStore, StatsQuery};

/// `unixepoch('2024-01-01 00:00:00')`.
const NEW_YEAR: i64 = 1_704_067_200;

fn record(id: u32, name: &str) -> IdentityRecord {
    IdentityRecord {
        id: IdentityId(id),
        name: name.into(),
        credential: Credential {
            salt: "salt".into(),
            digest: "digest".into(),
        },
    }
}

fn command(interaction_id: u64, user_id: u64, timestamp: &str) -> DiscordCommand {
    DiscordCommand {
        interaction_id,
        command_id: 1,
        interaction_data: "1d20".into(),
        user_id,
        username: "player".into(),
        timestamp: timestamp.into(),
        ..Default::default()
    }
}

fn rolls(die_size: u32, values: &[u32]) -> Vec<DieRoll> {
    values
        .iter()
        .map(|&value| DieRoll { die_size, value })
        .collect()
}

// =====================================================================
// Credentials and tokens
// =====================================================================

#[test]
fn test_insert_identity_reports_id_and_name_collisions() {
    let store = SqliteStore::open_in_memory().unwrap();

    assert_eq!(
        store.insert_identity(&record(7, "alice")).unwrap(),
        InsertOutcome::Inserted
    );
    assert_eq!(
        store.insert_identity(&record(7, "bob")).unwrap(),
        InsertOutcome::IdTaken
    );
    assert_eq!(
        store.insert_identity(&record(8, "alice")).unwrap(),
        InsertOutcome::NameTaken
    );
    assert_eq!(
        store.identity_by_id(IdentityId(7)).unwrap(),
        Some(record(7, "alice"))
    );
    assert!(store.identity_by_id(IdentityId(8)).unwrap().is_none());
}

#[test]
fn test_insert_token_duplicate_is_rejected_and_original_kept() {
    let store = SqliteStore::open_in_memory().unwrap();
    let token = SessionToken {
        token: "tok".into(),
        identity: IdentityId(1),
        issued_at: 100,
    };

    assert!(store.insert_token(&token).unwrap());
    assert!(!store
        .insert_token(&SessionToken {
            identity: IdentityId(2),
            issued_at: 999,
            ..token.clone()
        })
        .unwrap());
    assert_eq!(store.find_token("tok").unwrap(), Some(token));
    assert_eq!(store.find_token("other").unwrap(), None);
}

#[test]
fn test_authenticator_over_sqlite_full_lifecycle() {
    let clock = ManualClock::new(NEW_YEAR);
    let auth = SessionAuthenticator::with_clock(
        Arc::new(SqliteStore::open_in_memory().unwrap()),
        SessionConfig {
            token_timeout_secs: 60,
        },
        clock.clone(),
    );

    let id = auth.provision_identity("alice", "secret123").unwrap();
    assert!(auth.verify_password("alice", "secret123"));
    assert!(!auth.verify_password("alice", "wrong"));

    let token = auth.issue_token(id).unwrap();
    assert_eq!(auth.is_valid(&token), TokenValidity::Valid(id));
    clock.advance(61);
    assert_eq!(auth.is_valid(&token), TokenValidity::Expired(id));

    auth.change_password(id, "hunter22").unwrap();
    assert!(!auth.verify_password("alice", "secret123"));
    assert!(auth.verify_password("alice", "hunter22"));
}

#[test]
fn test_issue_token_from_many_threads_all_distinct_and_valid() {
    use std::collections::HashSet;

    let auth = SessionAuthenticator::new(
        Arc::new(SqliteStore::open_in_memory().unwrap()),
        SessionConfig::default(),
    );
    let id = auth.provision_identity("alice", "secret123").unwrap();

    let tokens: Vec<String> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    (0..25)
                        .map(|_| auth.issue_token(id).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });

    let distinct: HashSet<&String> = tokens.iter().collect();
    assert_eq!(tokens.len(), 200);
    assert_eq!(distinct.len(), tokens.len());
    for token in &tokens {
        assert_eq!(auth.is_valid(token), TokenValidity::Valid(id));
    }
}

#[test]
fn test_open_file_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dicelog.db");

    let id = {
        let auth = SessionAuthenticator::new(
            Arc::new(SqliteStore::open(&path).unwrap()),
            SessionConfig::default(),
        );
        auth.provision_identity("alice", "secret123").unwrap()
    };

    let auth = SessionAuthenticator::new(
        Arc::new(SqliteStore::open(&path).unwrap()),
        SessionConfig::default(),
    );
    assert_eq!(auth.identity_id("alice"), Some(id));
    assert!(auth.verify_password("alice", "secret123"));
}

// =====================================================================
// History and statistics
// =====================================================================

#[test]
fn test_die_stats_aggregates_per_die_size() {
    let store = SqliteStore::open_in_memory().unwrap();
    let me = IdentityId(1);

    store
        .record_command(me, &command(1, 10, "2024-01-01 00:00:00"))
        .unwrap();
    store.record_rolls(1, &rolls(20, &[1, 20, 9])).unwrap();
    store.record_rolls(1, &rolls(6, &[6, 6])).unwrap();

    let stats = store
        .die_stats(&StatsQuery {
            identity: me,
            user_id: None,
            within_secs: None,
            now: NEW_YEAR,
        })
        .unwrap();

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].die_size, 6);
    assert_eq!(stats[0].count, 2);
    assert_eq!(stats[0].natural_ones, 0);
    assert_eq!(stats[0].natural_maxima, 2);
    assert_eq!(stats[1].die_size, 20);
    assert_eq!(stats[1].count, 3);
    assert!((stats[1].average - 10.0).abs() < f64::EPSILON);
    assert_eq!(stats[1].natural_ones, 1);
    assert_eq!(stats[1].natural_maxima, 1);
}

#[test]
fn test_die_stats_scoped_to_identity_and_user() {
    let store = SqliteStore::open_in_memory().unwrap();

    store
        .record_command(IdentityId(1), &command(1, 10, "2024-01-01 00:00:00"))
        .unwrap();
    store.record_rolls(1, &rolls(6, &[3])).unwrap();
    store
        .record_command(IdentityId(1), &command(2, 11, "2024-01-01 00:00:00"))
        .unwrap();
    store.record_rolls(2, &rolls(6, &[4, 5])).unwrap();
    store
        .record_command(IdentityId(2), &command(3, 10, "2024-01-01 00:00:00"))
        .unwrap();
    store.record_rolls(3, &rolls(6, &[1, 1, 1, 1])).unwrap();

    let query = |user_id| StatsQuery {
        identity: IdentityId(1),
        user_id,
        within_secs: None,
        now: NEW_YEAR,
    };

    let all = store.die_stats(&query(None)).unwrap();
    assert_eq!(all[0].count, 3);

    let one_user = store.die_stats(&query(Some(10))).unwrap();
    assert_eq!(one_user[0].count, 1);

    let nobody = store.die_stats(&query(Some(99))).unwrap();
    assert!(nobody.is_empty());
}

#[test]
fn test_die_stats_time_window_excludes_old_commands() {
    let store = SqliteStore::open_in_memory().unwrap();
    let me = IdentityId(1);

    store
        .record_command(me, &command(1, 10, "2024-01-01 00:00:00"))
        .unwrap();
    store.record_rolls(1, &rolls(8, &[2])).unwrap();
    store
        .record_command(me, &command(2, 10, "2024-01-01T01:00:00Z"))
        .unwrap();
    store.record_rolls(2, &rolls(8, &[8])).unwrap();

    let stats = store
        .die_stats(&StatsQuery {
            identity: me,
            user_id: None,
            within_secs: Some(60),
            now: NEW_YEAR + 3600 + 30,
        })
        .unwrap();

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].count, 1);
    assert_eq!(stats[0].natural_maxima, 1);
}

#[test]
fn test_die_stats_huge_time_window_covers_everything() {
    let store = SqliteStore::open_in_memory().unwrap();
    let me = IdentityId(1);

    store
        .record_command(me, &command(1, 10, "2024-01-01 00:00:00"))
        .unwrap();
    store.record_rolls(1, &rolls(6, &[3, 4])).unwrap();

    let stats = store
        .die_stats(&StatsQuery {
            identity: me,
            user_id: None,
            within_secs: Some(u64::MAX),
            now: NEW_YEAR + 3600,
        })
        .unwrap();

    assert_eq!(stats.len(), 1);
    assert_eq!(stats[0].count, 2);
}

#[test]
fn test_record_command_same_interaction_replaces() {
    let store = SqliteStore::open_in_memory().unwrap();
    let me = IdentityId(1);

    store
        .record_command(me, &command(5, 10, "2024-01-01 00:00:00"))
        .unwrap();
    store
        .record_command(me, &command(5, 42, "2024-01-01 00:00:00"))
        .unwrap();
    store.record_rolls(5, &rolls(4, &[2])).unwrap();

    let stats = store
        .die_stats(&StatsQuery {
            identity: me,
            user_id: Some(42),
            within_secs: None,
            now: NEW_YEAR,
        })
        .unwrap();
    assert_eq!(stats.len(), 1);
}
