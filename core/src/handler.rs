//! Request handler: one command in, one status code out.
//!
//! Every ledger command runs inside SharedLedger::transact: the ledger is
//! loaded, one mutation is applied, and the full ledger is committed back
//! before the lock is released.
//!
//! Failure mapping:
//!   - validation outcomes (1xx) are returned without touching the file
//!   - a failure to load the ledger is 301
//!   - any later failure maps to the operation family's own 3xx code
//!   - nothing here panics or propagates an error to the transport

use crate::{
    command::{
        clean, is_valid_game_id, parse_record_command, AddGameIdArgs, CommandKind,
        ForceRemoveArgs, RedeemArgs,
    },
    config::ServerConfig,
    error::{LedgerError, LedgerResult},
    event::LedgerEvent,
    record::{GameIdKind, LedgerLine, RecordKind},
    status::{Response, StatusCode},
    store::{LedgerStore, SharedLedger},
};

pub struct RequestHandler {
    ledger:       SharedLedger,
    info_payload: String,
}

impl RequestHandler {
    pub fn new(ledger: SharedLedger, config: &ServerConfig) -> Self {
        Self {
            ledger,
            info_payload: config.info_payload(),
        }
    }

    pub fn handle(&self, message: &str) -> Response {
        let message = clean(message);
        let kind = CommandKind::classify(&message);

        match kind {
            CommandKind::Empty   => StatusCode::EmptyRequest.into(),
            CommandKind::Unknown => StatusCode::UnknownCommand.into(),
            CommandKind::Info    => Response::Payload(self.info_payload.clone()),
            _ => match self.ledger.transact(|store| apply(kind, &message, store)) {
                Ok(code) => code.into(),
                Err(e) => {
                    log::error!("handle {kind:?}: {e}");
                    StatusCode::GenericFailure.into()
                }
            },
        }
    }
}

fn apply(kind: CommandKind, message: &str, store: &mut LedgerStore) -> StatusCode {
    let lines = match store.load_lines() {
        Ok(lines) => lines,
        Err(e) => {
            log::error!("{kind:?}: cannot load ledger: {e}");
            return StatusCode::GenericFailure;
        }
    };

    let (result, failure) = match kind {
        CommandKind::AddUser     => (add_user(store, lines, message), StatusCode::AddUserFailed),
        CommandKind::Redeem      => (redeem(store, lines, message), StatusCode::RedeemFailed),
        CommandKind::AddGameId   => (add_game_id(store, lines, message), StatusCode::AddIdFailed),
        CommandKind::ForceRemove => (force_remove(store, lines, message), StatusCode::ForceRemoveFailed),
        CommandKind::AddExempt   => (add_exempt(store, lines, message), StatusCode::AddExemptFailed),
        CommandKind::Info | CommandKind::Empty | CommandKind::Unknown => {
            return StatusCode::GenericFailure;
        }
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            log::error!("{kind:?} failed: {e}");
            failure
        }
    }
}

// ── USER ───────────────────────────────────────────────────────

fn add_user(
    store: &mut LedgerStore,
    mut lines: Vec<LedgerLine>,
    message: &str,
) -> LedgerResult<StatusCode> {
    let record = parse_record_command(message, RecordKind::Standard)?;

    // Any record kind holding the email blocks the insert: REQUEST resolves
    // the first match, so a second record for the email could never be spent.
    let duplicate = lines
        .iter()
        .filter_map(LedgerLine::record)
        .any(|r| r.email == record.email);
    if duplicate {
        return Ok(StatusCode::DuplicateEmail);
    }

    let event = LedgerEvent::RecordAdded {
        email: record.email.clone(),
        tier:  record.tier.clone(),
    };
    log::info!("USER: new user added {record}");
    lines.push(record.into());
    store.commit_lines(&lines)?;
    store.journal().record(&event);
    Ok(StatusCode::UserAdded)
}

// ── REQUEST ────────────────────────────────────────────────────

fn redeem(
    store: &mut LedgerStore,
    mut lines: Vec<LedgerLine>,
    message: &str,
) -> LedgerResult<StatusCode> {
    let args = RedeemArgs::parse(message)?;

    // First match in on-disk order wins.
    let Some(record) = lines
        .iter_mut()
        .filter_map(LedgerLine::record_mut)
        .find(|r| r.email == args.email)
    else {
        return Ok(StatusCode::EmailNotFound);
    };
    if record.has_addon(&args.addon) {
        return Ok(StatusCode::AlreadyRedeemed);
    }
    if record.credits == 0 {
        return Ok(StatusCode::NoCredits);
    }

    record.credits -= 1;
    record.add_addon(&args.addon);
    let event = LedgerEvent::AddonRedeemed {
        email:             args.email.clone(),
        addon:             args.addon.clone(),
        credits_remaining: record.credits,
    };

    store.commit_lines(&lines)?;
    store.journal().record(&event);
    log::info!("REQUEST: added {} to {}", args.addon, args.email);
    Ok(StatusCode::AddonRedeemed)
}

// ── ADDID ──────────────────────────────────────────────────────

fn add_game_id(
    store: &mut LedgerStore,
    mut lines: Vec<LedgerLine>,
    message: &str,
) -> LedgerResult<StatusCode> {
    let args = AddGameIdArgs::parse(message)?;

    let Some(kind) = GameIdKind::from_token(&args.kind_token) else {
        return Ok(StatusCode::UnknownIdKind);
    };
    if !is_valid_game_id(&args.game_id) {
        return Err(LedgerError::MalformedCommand {
            command: message.to_string(),
            reason:  "game id is empty or contains a separator".into(),
        });
    }

    let Some(record) = lines
        .iter_mut()
        .filter_map(LedgerLine::record_mut)
        .find(|r| r.email == args.email)
    else {
        return Ok(StatusCode::NoMatchingRecord);
    };
    let before = record.to_string();
    record.set_game_id(kind, &args.game_id);
    log::info!("ADDID: replacing {before} with {record}");

    store.commit_lines(&lines)?;
    store.journal().record(&LedgerEvent::GameIdLinked {
        email:     args.email,
        namespace: args.kind_token,
        game_id:   args.game_id,
    });
    Ok(StatusCode::GameIdLinked)
}

// ── FORCEREMOVE ────────────────────────────────────────────────

/// Drops every line containing the credential, so an email, a game id or any
/// other field value can be used. Unreadable lines are matched on their raw text.
fn force_remove(
    store: &mut LedgerStore,
    mut lines: Vec<LedgerLine>,
    message: &str,
) -> LedgerResult<StatusCode> {
    let args = ForceRemoveArgs::parse(message)?;

    let before = lines.len();
    lines.retain(|l| !l.to_string().contains(&args.credential));
    let removed = before - lines.len();

    if removed > 0 {
        store.commit_lines(&lines)?;
        store.journal().record(&LedgerEvent::RecordsForceRemoved {
            credential: args.credential.clone(),
            removed,
        });
    }
    log::info!("FORCEREMOVE: {removed} record(s) matching {}", args.credential);
    Ok(StatusCode::RecordsRemoved)
}

// ── SPECIAL ────────────────────────────────────────────────────

fn add_exempt(
    store: &mut LedgerStore,
    mut lines: Vec<LedgerLine>,
    message: &str,
) -> LedgerResult<StatusCode> {
    let record = parse_record_command(message, RecordKind::Exempt)?;
    let event = LedgerEvent::ExemptRecordAdded { email: record.email.clone() };

    log::info!("SPECIAL: exempt record added {record}");
    lines.push(record.into());
    store.commit_lines(&lines)?;
    store.journal().record(&event);
    Ok(StatusCode::ExemptAdded)
}
