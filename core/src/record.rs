//! Typed view of one ledger line.
//!
//! Wire form (eight fields, fixed order):
//!   KIND|primary_id|secondary_id|email|tier|credits|cents_paid|addon_addon_...
//!
//! KIND is `USER` for Standard records and `SPECIAL` for Exempt ones.

use crate::{
    error::{LedgerError, LedgerResult},
    types::{Cents, Credits, Email},
};
use std::fmt;

pub const FIELD_COUNT: usize = 8;
pub const FIELD_SEPARATOR: char = '|';
pub const RECORD_SEPARATOR: char = ',';
pub const ADDON_SEPARATOR: char = '_';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Subscriber record, subject to pruning and crediting.
    Standard,
    /// Manually inserted record, immune to reconciliation.
    Exempt,
}

impl RecordKind {
    pub fn token(&self) -> &'static str {
        match self {
            Self::Standard => "USER",
            Self::Exempt   => "SPECIAL",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "USER"    => Some(Self::Standard),
            "SPECIAL" => Some(Self::Exempt),
            _         => None,
        }
    }
}

/// Which game-account namespace an id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameIdKind {
    Primary,
    Secondary,
}

impl GameIdKind {
    /// Only the two literal tokens are accepted.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "epic"  => Some(Self::Primary),
            "steam" => Some(Self::Secondary),
            _       => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementRecord {
    pub kind:              RecordKind,
    pub primary_game_id:   String,
    pub secondary_game_id: String,
    pub email:             Email,
    pub tier:              String,
    pub credits:           Credits,
    pub cents_paid:        Cents,
    pub redeemed_addons:   Vec<String>,
}

impl EntitlementRecord {
    pub fn new(kind: RecordKind, email: &str, tier: &str) -> Self {
        Self {
            kind,
            primary_game_id: String::new(),
            secondary_game_id: String::new(),
            email: email.to_string(),
            tier: tier.to_string(),
            credits: 0,
            cents_paid: 0,
            redeemed_addons: Vec::new(),
        }
    }

    pub fn is_exempt(&self) -> bool {
        self.kind == RecordKind::Exempt
    }

    /// Exact-token membership; `skin` never matches `skin1`.
    pub fn has_addon(&self, addon: &str) -> bool {
        self.redeemed_addons.iter().any(|a| a == addon)
    }

    /// Append `addon` unless already present. Returns whether it was added.
    pub fn add_addon(&mut self, addon: &str) -> bool {
        if self.has_addon(addon) {
            return false;
        }
        self.redeemed_addons.push(addon.to_string());
        true
    }

    pub fn set_game_id(&mut self, kind: GameIdKind, id: &str) {
        match kind {
            GameIdKind::Primary   => self.primary_game_id = id.to_string(),
            GameIdKind::Secondary => self.secondary_game_id = id.to_string(),
        }
    }

    /// Parse one pipe-delimited line.
    pub fn parse(line: &str) -> LedgerResult<Self> {
        let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
        if fields.len() != FIELD_COUNT {
            return Err(malformed(line, format!(
                "expected {FIELD_COUNT} fields, found {}",
                fields.len()
            )));
        }

        let kind = RecordKind::from_token(fields[0])
            .ok_or_else(|| malformed(line, format!("unknown record kind '{}'", fields[0])))?;
        let credits = fields[5]
            .parse::<Credits>()
            .map_err(|e| malformed(line, format!("credits: {e}")))?;
        let cents_paid = fields[6]
            .parse::<Cents>()
            .map_err(|e| malformed(line, format!("cents paid: {e}")))?;
        let redeemed_addons = fields[7]
            .split(ADDON_SEPARATOR)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            kind,
            primary_game_id: fields[1].to_string(),
            secondary_game_id: fields[2].to_string(),
            email: fields[3].to_string(),
            tier: fields[4].to_string(),
            credits,
            cents_paid,
            redeemed_addons,
        })
    }
}

impl fmt::Display for EntitlementRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}|{}|{}|{}",
            self.kind.token(),
            self.primary_game_id,
            self.secondary_game_id,
            self.email,
            self.tier,
            self.credits,
            self.cents_paid,
            self.redeemed_addons.join("_"),
        )
    }
}

/// True when `value` can sit inside a field without breaking the line.
pub fn is_field_safe(value: &str) -> bool {
    !value.contains(FIELD_SEPARATOR) && !value.contains(RECORD_SEPARATOR)
}

/// True when `addon` can be stored in the underscore-joined addon field.
pub fn is_addon_safe(addon: &str) -> bool {
    !addon.is_empty() && is_field_safe(addon) && !addon.contains(ADDON_SEPARATOR)
}

/// One segment of the ledger text.
///
/// Segments that do not parse are carried as `Raw` and written back byte for
/// byte; only FORCEREMOVE can drop them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerLine {
    Record(EntitlementRecord),
    Raw(String),
}

impl LedgerLine {
    pub fn parse(line: &str) -> Self {
        match EntitlementRecord::parse(line) {
            Ok(record) => Self::Record(record),
            Err(e) => {
                log::warn!("keeping unreadable ledger line as-is: {e}");
                Self::Raw(line.to_string())
            }
        }
    }

    pub fn record(&self) -> Option<&EntitlementRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Raw(_)         => None,
        }
    }

    pub fn record_mut(&mut self) -> Option<&mut EntitlementRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Raw(_)         => None,
        }
    }

    pub fn into_record(self) -> Option<EntitlementRecord> {
        match self {
            Self::Record(record) => Some(record),
            Self::Raw(_)         => None,
        }
    }
}

impl fmt::Display for LedgerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Record(record) => fmt::Display::fmt(record, f),
            Self::Raw(line)      => f.write_str(line),
        }
    }
}

impl From<EntitlementRecord> for LedgerLine {
    fn from(record: EntitlementRecord) -> Self {
        Self::Record(record)
    }
}

/// Join lines into the ledger's plain text form.
pub fn serialize_ledger(lines: &[LedgerLine]) -> String {
    lines
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn malformed(line: &str, reason: String) -> LedgerError {
    LedgerError::MalformedRecord { line: line.to_string(), reason }
}
