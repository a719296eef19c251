//! Inbound command grammar.
//!
//! The first `|`-separated token selects the operation. Tokens are
//! case-sensitive. Classification never fails; argument parsing does, and the
//! handler maps that failure to the operation family's internal code.

use crate::{
    error::{LedgerError, LedgerResult},
    record::{is_addon_safe, is_field_safe, EntitlementRecord, RecordKind},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// `USER|primary|secondary|email|tier|credits|cents|addons`
    AddUser,
    /// `REQUEST|email|addon`
    Redeem,
    /// `ADDID|email|epic-or-steam|id`
    AddGameId,
    /// `FORCEREMOVE|credential` (privileged)
    ForceRemove,
    /// `SPECIAL|primary|secondary|email|tier|credits|cents|addons` (privileged)
    AddExempt,
    /// `INFO` (privileged, gated by the transport)
    Info,
    Empty,
    Unknown,
}

impl CommandKind {
    pub fn classify(message: &str) -> Self {
        if message.is_empty() {
            return Self::Empty;
        }
        if message == "INFO" {
            return Self::Info;
        }
        let token = match message.split_once('|') {
            Some((token, _)) => token,
            None => return Self::Unknown,
        };
        match token {
            "USER"        => Self::AddUser,
            "REQUEST"     => Self::Redeem,
            "ADDID"       => Self::AddGameId,
            "FORCEREMOVE" => Self::ForceRemove,
            "SPECIAL"     => Self::AddExempt,
            _             => Self::Unknown,
        }
    }
}

/// Strip the line breaks transports tend to leave on a datagram.
pub fn clean(message: &str) -> String {
    message.replace(['\r', '\n'], "")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemArgs {
    pub email: String,
    pub addon: String,
}

impl RedeemArgs {
    pub fn parse(message: &str) -> LedgerResult<Self> {
        let parts: Vec<&str> = message.split('|').collect();
        if parts.len() != 3 {
            return Err(malformed(message, "expected REQUEST|email|addon"));
        }
        let email: String = parts[1].chars().filter(|c| !c.is_whitespace()).collect();
        let addon = parts[2].trim().to_string();
        if email.is_empty() {
            return Err(malformed(message, "email is empty"));
        }
        if !is_addon_safe(&addon) {
            return Err(malformed(message, "addon is empty or contains a separator"));
        }
        Ok(Self { email, addon })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddGameIdArgs {
    pub email:      String,
    pub kind_token: String,
    pub game_id:    String,
}

impl AddGameIdArgs {
    pub fn parse(message: &str) -> LedgerResult<Self> {
        let parts: Vec<&str> = message.split('|').collect();
        if parts.len() != 4 {
            return Err(malformed(message, "expected ADDID|email|kind|id"));
        }
        if parts[1].is_empty() {
            return Err(malformed(message, "email is empty"));
        }
        Ok(Self {
            email:      parts[1].to_string(),
            kind_token: parts[2].to_string(),
            game_id:    parts[3].to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForceRemoveArgs {
    pub credential: String,
}

impl ForceRemoveArgs {
    pub fn parse(message: &str) -> LedgerResult<Self> {
        let parts: Vec<&str> = message.split('|').collect();
        if parts.len() != 2 {
            return Err(malformed(message, "expected FORCEREMOVE|credential"));
        }
        // An empty credential is a substring of every line.
        if parts[1].is_empty() {
            return Err(malformed(message, "credential is empty"));
        }
        Ok(Self { credential: parts[1].to_string() })
    }
}

/// Parse the record carried by a USER or SPECIAL command.
pub fn parse_record_command(message: &str, expected: RecordKind) -> LedgerResult<EntitlementRecord> {
    let record = EntitlementRecord::parse(message)?;
    if record.kind != expected {
        return Err(malformed(message, "record kind does not match command"));
    }
    if record.email.is_empty() {
        return Err(malformed(message, "email is empty"));
    }
    let fields = [&record.primary_game_id, &record.secondary_game_id, &record.email, &record.tier];
    if !fields.iter().all(|f| is_field_safe(f)) {
        return Err(malformed(message, "field contains a separator"));
    }
    Ok(record)
}

pub fn is_valid_game_id(id: &str) -> bool {
    !id.is_empty() && is_field_safe(id)
}

fn malformed(command: &str, reason: &str) -> LedgerError {
    LedgerError::MalformedCommand { command: command.to_string(), reason: reason.to_string() }
}
