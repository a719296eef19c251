//! Three-digit response codes.
//!
//! 1xx: rejected request (validation outcome, nothing changed)
//! 2xx: success
//! 3xx: internal failure, one code per operation family

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    // ── Rejections ─────────────────────────────────
    UnknownCommand,
    EmptyRequest,
    UnknownIdKind,
    NoMatchingRecord,
    DuplicateEmail,
    NoCredits,
    AlreadyRedeemed,
    EmailNotFound,

    // ── Success ────────────────────────────────────
    GameIdLinked,
    UserAdded,
    AddonRedeemed,
    RecordsRemoved,
    ExemptAdded,

    // ── Internal failures ──────────────────────────
    RedeemFailed,
    GenericFailure,
    AddIdFailed,
    AddUserFailed,
    ForceRemoveFailed,
    AddExemptFailed,
}

impl StatusCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownCommand    => "100",
            Self::EmptyRequest      => "101",
            Self::UnknownIdKind     => "102",
            Self::NoMatchingRecord  => "103",
            Self::DuplicateEmail    => "104",
            Self::NoCredits         => "105",
            Self::AlreadyRedeemed   => "106",
            Self::EmailNotFound     => "107",
            Self::GameIdLinked      => "200",
            Self::UserAdded         => "201",
            Self::AddonRedeemed     => "202",
            Self::RecordsRemoved    => "203",
            Self::ExemptAdded       => "204",
            Self::RedeemFailed      => "300",
            Self::GenericFailure    => "301",
            Self::AddIdFailed       => "302",
            Self::AddUserFailed     => "303",
            Self::ForceRemoveFailed => "304",
            Self::AddExemptFailed   => "305",
        }
    }

    pub fn is_success(&self) -> bool {
        self.code().starts_with('2')
    }

    pub fn is_internal_failure(&self) -> bool {
        self.code().starts_with('3')
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// What goes back to the caller: a status code, or the INFO payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Status(StatusCode),
    Payload(String),
}

impl Response {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(code) => Some(*code),
            Self::Payload(_)   => None,
        }
    }

    pub fn into_wire(self) -> String {
        match self {
            Self::Status(code)    => code.code().to_string(),
            Self::Payload(body)   => body,
        }
    }
}

impl From<StatusCode> for Response {
    fn from(code: StatusCode) -> Self {
        Self::Status(code)
    }
}
