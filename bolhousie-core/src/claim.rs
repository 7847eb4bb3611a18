//! Claim kinds and the stateless win-pattern validator.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ticket::{Ticket, TICKET_SIZE};

/// Marks needed for a Teaser ("early five").
pub const TEASER_MARKS: usize = 5;

/// Winning patterns. Serialized by display name, which is what travels in CLAIM messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClaimKind {
    /// Any five cells marked.
    #[serde(rename = "Teaser")]
    Teaser,
    /// Top row complete.
    #[serde(rename = "Prime Time")]
    PrimeTime,
    /// Middle row complete.
    #[serde(rename = "Intermission")]
    Intermission,
    /// Bottom row complete.
    #[serde(rename = "Late Night")]
    LateNight,
    /// Full house.
    #[serde(rename = "Jackpot")]
    Jackpot,
}

impl ClaimKind {
    pub const ALL: [ClaimKind; 5] = [
        ClaimKind::Teaser,
        ClaimKind::PrimeTime,
        ClaimKind::Intermission,
        ClaimKind::LateNight,
        ClaimKind::Jackpot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Teaser => "Teaser",
            Self::PrimeTime => "Prime Time",
            Self::Intermission => "Intermission",
            Self::LateNight => "Late Night",
            Self::Jackpot => "Jackpot",
        }
    }

    /// What has to be marked, as shown to players.
    pub fn rule(&self) -> &'static str {
        match self {
            Self::Teaser => "Any 5 brands marked",
            Self::PrimeTime => "Top row complete",
            Self::Intermission => "Middle row complete",
            Self::LateNight => "Bottom row complete",
            Self::Jackpot => "Full house - all 15!",
        }
    }

    /// Ticket row a line claim covers.
    pub fn row(&self) -> Option<usize> {
        match self {
            Self::PrimeTime => Some(0),
            Self::Intermission => Some(1),
            Self::LateNight => Some(2),
            Self::Teaser | Self::Jackpot => None,
        }
    }
}

impl fmt::Display for ClaimKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accepts display names ("Prime Time") and constant-style names ("PRIME_TIME"), case-insensitive.
impl FromStr for ClaimKind {
    type Err = UnknownClaimKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "teaser" => Ok(Self::Teaser),
            "primetime" => Ok(Self::PrimeTime),
            "intermission" => Ok(Self::Intermission),
            "latenight" => Ok(Self::LateNight),
            "jackpot" => Ok(Self::Jackpot),
            _ => Err(UnknownClaimKind(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown claim type {0:?}")]
pub struct UnknownClaimKind(pub String);

/// Does `marked` satisfy `kind` on `ticket`? Marks for items not on the ticket are ignored.
pub fn validate(ticket: &Ticket, marked: &HashSet<String>, kind: ClaimKind) -> bool {
    let marked_count = ticket.cells().filter(|i| marked.contains(&i.id)).count();
    match kind {
        ClaimKind::Teaser => marked_count >= TEASER_MARKS,
        ClaimKind::PrimeTime | ClaimKind::Intermission | ClaimKind::LateNight => kind
            .row()
            .and_then(|r| ticket.row(r))
            .is_some_and(|row| row.iter().all(|i| marked.contains(&i.id))),
        ClaimKind::Jackpot => marked_count == TICKET_SIZE,
    }
}

/// Validate by claim name; an unknown name never validates.
pub fn validate_named(ticket: &Ticket, marked: &HashSet<String>, claim_type: &str) -> bool {
    claim_type
        .parse::<ClaimKind>()
        .map(|kind| validate(ticket, marked, kind))
        .unwrap_or(false)
}
