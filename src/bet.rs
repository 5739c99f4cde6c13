use std::{fmt, num::ParseIntError, str::FromStr};

use chrono::NaiveDate;

/// The simulated winner number of the lottery contest.
pub const WINNING_NUMBER: i64 = 7574;

/// Separates the fields of a single bet, both on the wire and in storage.
pub const FIELD_SEPARATOR: char = ',';

const BIRTHDATE_FORMAT: &str = "%Y-%m-%d";

/// A single lottery bet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub agency: u32,
    pub first_name: String,
    pub last_name: String,
    pub document: String,
    pub birthdate: NaiveDate,
    pub number: i64,
}

#[derive(thiserror::Error, Debug)]
pub enum BetParseErr {
    #[error("expected 6 fields, found {0}")]
    FieldCount(usize),

    #[error("invalid agency: {0}")]
    Agency(ParseIntError),

    #[error("the agency must be a positive number")]
    ZeroAgency,

    #[error("text fields can't hold control characters")]
    ControlCharacter,

    #[error("invalid birthdate: {0}")]
    Birthdate(chrono::ParseError),

    #[error("invalid number: {0}")]
    Number(ParseIntError),
}

impl Bet {
    pub fn has_won(&self) -> bool {
        self.number == WINNING_NUMBER
    }
}

/// Parses an agency identifier, which must be a positive integer
pub fn parse_agency(raw: &str) -> Result<u32, BetParseErr> {
    match raw.parse() {
        Ok(0) => Err(BetParseErr::ZeroAgency),
        Ok(agency) => Ok(agency),
        Err(err) => Err(BetParseErr::Agency(err)),
    }
}

// rows are stored one per line, so a line break inside a field would split them
fn text_field(raw: &str) -> Result<String, BetParseErr> {
    if raw.chars().any(char::is_control) {
        return Err(BetParseErr::ControlCharacter);
    }

    Ok(raw.into())
}

// agency,first_name,last_name,document,birthdate,number
impl FromStr for Bet {
    type Err = BetParseErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
        let &[agency, first_name, last_name, document, birthdate, number] = fields.as_slice() else {
            return Err(BetParseErr::FieldCount(fields.len()));
        };

        Ok(Self {
            agency: parse_agency(agency)?,
            first_name: text_field(first_name)?,
            last_name: text_field(last_name)?,
            document: text_field(document)?,
            birthdate: NaiveDate::parse_from_str(birthdate, BIRTHDATE_FORMAT)
                .map_err(BetParseErr::Birthdate)?,
            number: number.parse().map_err(BetParseErr::Number)?,
        })
    }
}

impl fmt::Display for Bet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}{sep}{}{sep}{}{sep}{}",
            self.agency,
            self.first_name,
            self.last_name,
            self.document,
            self.birthdate.format(BIRTHDATE_FORMAT),
            self.number,
            sep = FIELD_SEPARATOR,
        )
    }
}
