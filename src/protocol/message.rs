use std::{fmt, str::FromStr};

use crate::bet::{self, Bet, BetParseErr, FIELD_SEPARATOR};

/// Any payload containing this marker is a request for the draw results.
pub const WINNERS_MARKER: &str = "Winners, please?";

/// Sent to agencies that ask for results before the draw took place.
pub const NO_WINNERS_YET: &str = "No winners yet";

/// Separates bets in a batch, and documents in a list of winners.
pub const RECORD_SEPARATOR: &str = ";";

const STORED_SUFFIX: &str = " apuestas almacenadas";

#[derive(Debug, PartialEq)]
pub enum Request {
    /// A batch of bets to store
    Bets(Batch),

    /// An agency asks for the winners of the draw
    Winners { agency: u32 },
}

/// The well formed bets of a submitted batch, along with the number of discarded records.
#[derive(Debug, Default, PartialEq)]
pub struct Batch {
    pub bets: Vec<Bet>,
    pub malformed: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum RequestErr {
    #[error("bad agency in winners request: {0}")]
    BadAgency(#[from] BetParseErr),
}

impl FromStr for Request {
    type Err = RequestErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.contains(WINNERS_MARKER) {
            let agency = s.split(FIELD_SEPARATOR).next().unwrap_or_default();
            return Ok(Self::Winners {
                agency: bet::parse_agency(agency)?,
            });
        }

        Ok(Self::Bets(Batch::parse(s)))
    }
}

impl Batch {
    /// Parses a list of bets separated by ';'
    ///
    /// a malformed record never aborts the batch, it's counted and skipped.
    pub fn parse(payload: &str) -> Self {
        let mut batch = Self::default();

        // tolerate a trailing separator
        for record in payload.split(RECORD_SEPARATOR).filter(|record| !record.is_empty()) {
            match record.parse::<Bet>() {
                Ok(bet) => batch.bets.push(bet),
                Err(reason) => {
                    tracing::warn!("discarded a malformed bet {:?}: {}", record, reason);
                    batch.malformed += 1;
                }
            }
        }

        batch
    }

    /// Renders the bets back into a payload ready to be framed
    pub fn render(bets: &[Bet]) -> String {
        bets.iter()
            .map(Bet::to_string)
            .collect::<Vec<_>>()
            .join(RECORD_SEPARATOR)
    }
}

/// Renders a winners request for the given agency
pub fn winners_request(agency: u32) -> String {
    format!("{}{}{}", agency, FIELD_SEPARATOR, WINNERS_MARKER)
}

#[derive(Debug, PartialEq)]
pub enum Response {
    /// Confirms how many bets of a batch were stored
    Stored(usize),

    /// The draw has not taken place yet
    NotYet,

    /// The documents of the winning bets of an agency
    Winners(Vec<String>),
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored(count) => write!(f, "{}{}", count, STORED_SUFFIX),
            Self::NotYet => f.write_str(NO_WINNERS_YET),
            Self::Winners(documents) => {
                f.write_str(&documents.join(RECORD_SEPARATOR))
            }
        }
    }
}

/// Parses a stored bets confirmation, returning the stored count
pub fn parse_stored(payload: &str) -> Option<usize> {
    payload.strip_suffix(STORED_SUFFIX)?.parse().ok()
}

/// Parses the response to a winners request
///
/// returns None while the draw is still pending.
pub fn parse_winners(payload: &str) -> Option<Vec<String>> {
    if payload == NO_WINNERS_YET {
        return None;
    }

    Some(
        payload
            .split(RECORD_SEPARATOR)
            .filter(|document| !document.is_empty())
            .map(String::from)
            .collect(),
    )
}
