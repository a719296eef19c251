//! Integration tests for the request handler.
//!
//! Tests verify each command against an on-disk obfuscated ledger:
//! 1. USER adds once; a duplicate email leaves the file byte-identical
//! 2. REQUEST spends exactly one credit per addon and is idempotent
//! 3. ADDID resolves only the two id-kind tokens
//! 4. FORCEREMOVE drops every record containing the credential
//! 5. SPECIAL inserts unconditionally
//! 6. INFO, empty and unknown commands
//! 7. A corrupt ledger yields the generic failure code
//! 8. Unreadable ledger lines survive every write
//! 9. Concurrent requests are serialized by the ledger lock

use entitlement_core::{
    config::ServerConfig,
    handler::RequestHandler,
    rng::FillerRng,
    status::{Response, StatusCode},
    store::{LedgerStore, SharedLedger},
};
use std::fs;
use std::thread;
use tempfile::TempDir;

struct Fixture {
    dir:     TempDir,
    config:  ServerConfig,
    ledger:  SharedLedger,
    handler: RequestHandler,
}

/// Build a handler over a fresh ledger, seeded with `raw` if non-empty.
fn build(raw: &str) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("tempdir");
    let config = ServerConfig::default_test().with_storage_dir(dir.path());
    let store = LedgerStore::open(&config.storage)
        .expect("open store")
        .with_rng(FillerRng::seeded(42));
    let ledger = SharedLedger::new(store);
    if !raw.is_empty() {
        ledger.transact(|s| s.commit(raw)).unwrap().unwrap();
    }
    let handler = RequestHandler::new(ledger.clone(), &config);
    Fixture { dir, config, ledger, handler }
}

fn status(f: &Fixture, message: &str) -> StatusCode {
    f.handler
        .handle(message)
        .status()
        .unwrap_or_else(|| panic!("expected a status code for {message}"))
}

fn ledger_text(f: &Fixture) -> String {
    f.ledger.transact(|s| s.load_decoded()).unwrap().unwrap()
}

fn ledger_bytes(f: &Fixture) -> Vec<u8> {
    fs::read(f.dir.path().join("ids.txt")).expect("ledger file")
}

fn journal_count(f: &Fixture, event_type: &str) -> i64 {
    f.ledger
        .transact(|s| s.journal().count_by_type(event_type))
        .unwrap()
        .unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// USER
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn user_is_added_to_empty_ledger() {
    let f = build("");
    assert_eq!(status(&f, "USER|e1|s1|a@x.com|t1|0|100|"), StatusCode::UserAdded);
    assert_eq!(ledger_text(&f), "USER|e1|s1|a@x.com|t1|0|100|");
    assert_eq!(journal_count(&f, "record_added"), 1);
}

#[test]
fn duplicate_email_is_rejected_and_file_untouched() {
    let f = build("USER|e1|s1|a@x.com|t1|0|100|");
    let before = ledger_bytes(&f);

    assert_eq!(
        status(&f, "USER|e9|s9|a@x.com|t2|5|900|"),
        StatusCode::DuplicateEmail
    );
    assert_eq!(ledger_bytes(&f), before, "duplicate insert must not rewrite the ledger");
    assert_eq!(journal_count(&f, "record_added"), 0);
}

#[test]
fn similar_email_is_not_a_duplicate() {
    let f = build("USER|||aa@x.com|t1|0|0|");
    assert_eq!(status(&f, "USER|||a@x.com|t1|0|0|"), StatusCode::UserAdded);
    assert_eq!(ledger_text(&f), "USER|||aa@x.com|t1|0|0|,USER|||a@x.com|t1|0|0|");
}

#[test]
fn exempt_record_blocks_standard_insert() {
    let f = build("SPECIAL|||a@x.com|staff|0|0|");
    let before = ledger_bytes(&f);

    assert_eq!(status(&f, "USER|||a@x.com|t1|5|0|"), StatusCode::DuplicateEmail);
    assert_eq!(ledger_bytes(&f), before);
    // The exempt record stays the one REQUEST resolves to.
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::NoCredits);
}

#[test]
fn malformed_user_line_is_internal_error() {
    let f = build("");
    assert_eq!(status(&f, "USER|only|three"), StatusCode::AddUserFailed);
    assert_eq!(status(&f, "USER||||t1|0|0|"), StatusCode::AddUserFailed);
    assert_eq!(status(&f, "USER|||a@x.com|t1|zero|0|"), StatusCode::AddUserFailed);
    assert_eq!(ledger_text(&f), "");
}

// ─────────────────────────────────────────────────────────────────────────────
// REQUEST
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn redeem_twice_spends_one_credit() {
    let f = build("USER|e1|s1|a@x.com|t1|2|400|");

    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::AddonRedeemed);
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::AlreadyRedeemed);
    assert_eq!(ledger_text(&f), "USER|e1|s1|a@x.com|t1|1|400|skin1");
    assert_eq!(journal_count(&f, "addon_redeemed"), 1);
}

#[test]
fn redeem_without_credits_is_rejected() {
    let f = build("USER|e1|s1|a@x.com|t1|0|100|");
    let before = ledger_bytes(&f);
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::NoCredits);
    assert_eq!(ledger_bytes(&f), before);
}

#[test]
fn already_redeemed_wins_over_no_credits() {
    let f = build("USER|||a@x.com|t1|0|100|skin1");
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::AlreadyRedeemed);
}

#[test]
fn addon_check_is_not_substring_based() {
    let f = build("USER|||a@x.com|t1|1|100|skin10");
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::AddonRedeemed);
    assert_eq!(ledger_text(&f), "USER|||a@x.com|t1|0|100|skin10_skin1");
}

#[test]
fn redeem_unknown_email() {
    let f = build("USER|||a@x.com|t1|1|100|");
    assert_eq!(status(&f, "REQUEST|b@x.com|skin1"), StatusCode::EmailNotFound);
    assert_eq!(status(&f, "REQUEST|x.com|skin1"), StatusCode::EmailNotFound);
}

#[test]
fn redeem_uses_first_matching_record() {
    let f = build("SPECIAL|||a@x.com|staff|1|0|,USER|||a@x.com|t1|1|0|");
    assert_eq!(status(&f, "REQUEST|a@x.com|cape"), StatusCode::AddonRedeemed);
    assert_eq!(
        ledger_text(&f),
        "SPECIAL|||a@x.com|staff|0|0|cape,USER|||a@x.com|t1|1|0|"
    );
}

#[test]
fn malformed_redeem_is_internal_error() {
    let f = build("USER|||a@x.com|t1|1|100|");
    assert_eq!(status(&f, "REQUEST|a@x.com"), StatusCode::RedeemFailed);
    assert_eq!(status(&f, "REQUEST|a@x.com|bad_token"), StatusCode::RedeemFailed);
}

// ─────────────────────────────────────────────────────────────────────────────
// ADDID
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn add_primary_and_secondary_ids() {
    let f = build("USER|||a@x.com|t1|0|0|,USER|||b@x.com|t1|0|0|");
    assert_eq!(status(&f, "ADDID|a@x.com|epic|E-1"), StatusCode::GameIdLinked);
    assert_eq!(status(&f, "ADDID|a@x.com|steam|7656"), StatusCode::GameIdLinked);
    assert_eq!(
        ledger_text(&f),
        "USER|E-1|7656|a@x.com|t1|0|0|,USER|||b@x.com|t1|0|0|"
    );
    assert_eq!(journal_count(&f, "game_id_linked"), 2);
}

#[test]
fn unknown_id_kind_is_rejected_before_lookup() {
    let f = build("USER|||a@x.com|t1|0|0|");
    let before = ledger_bytes(&f);
    assert_eq!(status(&f, "ADDID|a@x.com|xbox|X1"), StatusCode::UnknownIdKind);
    assert_eq!(status(&f, "ADDID|nobody@x.com|origin|X1"), StatusCode::UnknownIdKind);
    assert_eq!(status(&f, "ADDID|a@x.com|steamy|X1"), StatusCode::UnknownIdKind);
    assert_eq!(ledger_bytes(&f), before);
}

#[test]
fn add_id_without_matching_record() {
    let f = build("USER|||a@x.com|t1|0|0|");
    assert_eq!(status(&f, "ADDID|b@x.com|epic|E-1"), StatusCode::NoMatchingRecord);
}

#[test]
fn malformed_add_id_is_internal_error() {
    let f = build("USER|||a@x.com|t1|0|0|");
    assert_eq!(status(&f, "ADDID|a@x.com|epic"), StatusCode::AddIdFailed);
    assert_eq!(status(&f, "ADDID|a@x.com|epic|"), StatusCode::AddIdFailed);
    assert_eq!(status(&f, "ADDID|a@x.com|epic|a,b"), StatusCode::AddIdFailed);
}

// ─────────────────────────────────────────────────────────────────────────────
// FORCEREMOVE
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn force_remove_by_email_empties_ledger() {
    let f = build("USER|e1|s1|a@x.com|t1|0|100|");
    assert_eq!(status(&f, "FORCEREMOVE|a@x.com"), StatusCode::RecordsRemoved);
    assert_eq!(ledger_text(&f), "");

    // The empty ledger still round-trips through the store.
    assert_eq!(status(&f, "USER|||b@x.com|t1|0|0|"), StatusCode::UserAdded);
    assert_eq!(ledger_text(&f), "USER|||b@x.com|t1|0|0|");
}

#[test]
fn force_remove_matches_any_field() {
    let f = build(
        "USER|E-1||a@x.com|t1|0|0|,SPECIAL||S-9|b@x.com|staff|0|0|,USER|||c@x.com|t1|0|0|",
    );
    assert_eq!(status(&f, "FORCEREMOVE|S-9"), StatusCode::RecordsRemoved);
    assert_eq!(
        ledger_text(&f),
        "USER|E-1||a@x.com|t1|0|0|,USER|||c@x.com|t1|0|0|"
    );
    assert_eq!(status(&f, "FORCEREMOVE|E-1"), StatusCode::RecordsRemoved);
    assert_eq!(ledger_text(&f), "USER|||c@x.com|t1|0|0|");
    assert_eq!(journal_count(&f, "records_force_removed"), 2);
}

#[test]
fn force_remove_is_substring_based() {
    let f = build("USER|||a@x.com|t1|0|0|,USER|||aa@x.com|t1|0|0|,USER|||b@y.com|t1|0|0|");
    assert_eq!(status(&f, "FORCEREMOVE|a@x.com"), StatusCode::RecordsRemoved);
    assert_eq!(ledger_text(&f), "USER|||b@y.com|t1|0|0|");
}

#[test]
fn force_remove_without_match_leaves_file_untouched() {
    let f = build("USER|||a@x.com|t1|0|0|");
    let before = ledger_bytes(&f);
    assert_eq!(status(&f, "FORCEREMOVE|zzz"), StatusCode::RecordsRemoved);
    assert_eq!(ledger_bytes(&f), before);
}

#[test]
fn force_remove_refuses_empty_credential() {
    let f = build("USER|||a@x.com|t1|0|0|");
    assert_eq!(status(&f, "FORCEREMOVE|"), StatusCode::ForceRemoveFailed);
    assert_eq!(ledger_text(&f), "USER|||a@x.com|t1|0|0|");
}

// ─────────────────────────────────────────────────────────────────────────────
// SPECIAL
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn special_is_inserted_unconditionally() {
    let f = build("USER|||a@x.com|t1|0|0|");
    assert_eq!(status(&f, "SPECIAL|||a@x.com|staff|3|0|"), StatusCode::ExemptAdded);
    assert_eq!(status(&f, "SPECIAL|||a@x.com|staff|3|0|"), StatusCode::ExemptAdded);
    assert_eq!(
        ledger_text(&f),
        "USER|||a@x.com|t1|0|0|,SPECIAL|||a@x.com|staff|3|0|,SPECIAL|||a@x.com|staff|3|0|"
    );
    assert_eq!(journal_count(&f, "exempt_record_added"), 2);
}

#[test]
fn malformed_special_is_internal_error() {
    let f = build("");
    assert_eq!(status(&f, "SPECIAL|||a@x.com"), StatusCode::AddExemptFailed);
}

// ─────────────────────────────────────────────────────────────────────────────
// INFO, empty, unknown, corrupt
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn info_returns_configuration_secrets() {
    let f = build("");
    let expected = format!(
        "SENSITIVE|test-client|test-secret|{}|3141592653",
        f.config.transport.message_key
    );
    assert_eq!(f.handler.handle("INFO"), Response::Payload(expected));
}

#[test]
fn empty_and_unknown_commands() {
    let f = build("");
    assert_eq!(status(&f, ""), StatusCode::EmptyRequest);
    assert_eq!(status(&f, "\r\n"), StatusCode::EmptyRequest);
    assert_eq!(status(&f, "HELLO"), StatusCode::UnknownCommand);
    assert_eq!(status(&f, "request|a@x.com|skin1"), StatusCode::UnknownCommand);
    assert_eq!(f.handler.handle("HELLO").into_wire(), "100");
}

#[test]
fn trailing_line_break_is_ignored() {
    let f = build("USER|||a@x.com|t1|1|0|");
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1\r\n"), StatusCode::AddonRedeemed);
    assert_eq!(ledger_text(&f), "USER|||a@x.com|t1|0|0|skin1");
}

#[test]
fn corrupt_ledger_yields_generic_failure() {
    let f = build("USER|||a@x.com|t1|1|0|");
    let path = f.dir.path().join("ids.txt");
    let mut blob = fs::read_to_string(&path).unwrap();
    blob.pop();
    fs::write(&path, blob).unwrap();

    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::GenericFailure);
    assert_eq!(status(&f, "USER|||b@x.com|t1|0|0|"), StatusCode::GenericFailure);
}

// ─────────────────────────────────────────────────────────────────────────────
// Unreadable lines
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn unreadable_lines_are_kept_not_fatal() {
    let f = build("garbage,USER|||a@x.com|t1|1|0|,also|bad");
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::AddonRedeemed);
    assert_eq!(ledger_text(&f), "garbage,USER|||a@x.com|t1|0|0|skin1,also|bad");
}

#[test]
fn unreadable_lines_survive_every_command() {
    let legacy = "USER|e1|s1|legacy@x.com|t1||100|";
    let f = build(&format!("{legacy},USER|||a@x.com|t|1|0|"));

    assert_eq!(status(&f, "ADDID|a@x.com|epic|E1"), StatusCode::GameIdLinked);
    assert_eq!(status(&f, "REQUEST|a@x.com|skin1"), StatusCode::AddonRedeemed);
    assert_eq!(status(&f, "USER|||b@x.com|t|0|0|"), StatusCode::UserAdded);
    assert_eq!(status(&f, "SPECIAL|||c@x.com|t|0|0|"), StatusCode::ExemptAdded);
    assert_eq!(status(&f, "FORCEREMOVE|c@x.com"), StatusCode::RecordsRemoved);

    assert_eq!(
        ledger_text(&f),
        format!("{legacy},USER|E1||a@x.com|t|0|0|skin1,USER|||b@x.com|t|0|0|")
    );
}

#[test]
fn force_remove_can_drop_unreadable_line() {
    let f = build("USER|e1|s1|legacy@x.com|t1||100|,USER|||a@x.com|t|0|0|");
    assert_eq!(status(&f, "FORCEREMOVE|legacy@x.com"), StatusCode::RecordsRemoved);
    assert_eq!(ledger_text(&f), "USER|||a@x.com|t|0|0|");
}

// ─────────────────────────────────────────────────────────────────────────────
// Concurrency
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn concurrent_redemptions_are_all_applied() {
    const N: usize = 8;
    let f = build(&format!("USER|||a@x.com|t1|{N}|0|"));

    let codes: Vec<StatusCode> = thread::scope(|scope| {
        let workers: Vec<_> = (0..N)
            .map(|i| {
                let handler = &f.handler;
                scope.spawn(move || {
                    handler
                        .handle(&format!("REQUEST|a@x.com|addon{i}"))
                        .status()
                        .expect("status")
                })
            })
            .collect();
        workers.into_iter().map(|w| w.join().unwrap()).collect()
    });

    assert!(
        codes.iter().all(|c| *c == StatusCode::AddonRedeemed),
        "every redemption should succeed: {codes:?}"
    );
    let record = f
        .ledger
        .transact(|s| s.load_records())
        .unwrap()
        .unwrap()
        .remove(0);
    assert_eq!(record.credits, 0, "each redemption spent exactly one credit");
    for i in 0..N {
        assert!(record.has_addon(&format!("addon{i}")), "addon{i} lost: {record}");
    }
    assert_eq!(journal_count(&f, "addon_redeemed"), N as i64);
}
