use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

pub const MAX_SEAT_NUMBER: u16 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatStatus {
    Available,
    Booked,
}

impl SeatStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeatStatus::Available => "available",
            SeatStatus::Booked => "booked",
        }
    }
}

impl FromStr for SeatStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(SeatStatus::Available),
            "booked" => Ok(SeatStatus::Booked),
            other => Err(format!("unknown seat status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub show_id: i64,
    pub row: String,
    pub number: i32,
    pub status: SeatStatus,
}

impl Seat {
    pub fn label(&self) -> String {
        format!("{}{}", self.row, self.number)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LabelError {
    #[error("seat label is empty")]
    Empty,
    #[error("seat label '{0}' must start with a row letter A-Z")]
    InvalidRow(String),
    #[error("seat label '{0}' must end with a seat number between 1 and 999")]
    InvalidNumber(String),
}

/// Externally addressed seat identity: a row letter plus a seat number, e.g. `J15`.
///
/// Parsing is case-insensitive and normalizes the row to upper case, so `a01`
/// and `A1` name the same seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatLabel {
    row: char,
    number: u16,
}

impl SeatLabel {
    pub fn new(row: char, number: u16) -> Result<Self, LabelError> {
        let row = row.to_ascii_uppercase();
        if !row.is_ascii_uppercase() {
            return Err(LabelError::InvalidRow(format!("{}{}", row, number)));
        }
        if number == 0 || number > MAX_SEAT_NUMBER {
            return Err(LabelError::InvalidNumber(format!("{}{}", row, number)));
        }
        Ok(Self { row, number })
    }

    pub fn row(&self) -> char {
        self.row
    }

    pub fn number(&self) -> u16 {
        self.number
    }

    /// Matches a stored seat row/number pair against this label.
    pub fn matches(&self, row: &str, number: i32) -> bool {
        let mut chars = row.chars();
        chars.next() == Some(self.row) && chars.next().is_none() && number == i32::from(self.number)
    }
}

impl fmt::Display for SeatLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.row, self.number)
    }
}

impl FromStr for SeatLabel {
    type Err = LabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut chars = s.chars();
        let row = chars.next().ok_or(LabelError::Empty)?;
        if !row.is_ascii_alphabetic() {
            return Err(LabelError::InvalidRow(s.to_string()));
        }

        let digits = chars.as_str();
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(LabelError::InvalidNumber(s.to_string()));
        }
        let number: u16 = digits
            .parse()
            .map_err(|_| LabelError::InvalidNumber(s.to_string()))?;

        SeatLabel::new(row, number).map_err(|_| LabelError::InvalidNumber(s.to_string()))
    }
}

impl Serialize for SeatLabel {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("at least one seat must be requested")]
    Empty,
    #[error(transparent)]
    InvalidLabel(#[from] LabelError),
    #[error("seat {0} is requested more than once")]
    Duplicate(SeatLabel),
}

/// A validated reservation request: non-empty, well-formed, no duplicates.
///
/// Labels keep the order the client sent them in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatSelection {
    labels: Vec<SeatLabel>,
}

impl SeatSelection {
    pub fn parse<I, S>(raw: I) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let labels = raw
            .into_iter()
            .map(|s| s.as_ref().parse::<SeatLabel>())
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_labels(labels)
    }

    pub fn from_labels(labels: Vec<SeatLabel>) -> Result<Self, SelectionError> {
        if labels.is_empty() {
            return Err(SelectionError::Empty);
        }
        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(*label) {
                return Err(SelectionError::Duplicate(*label));
            }
        }
        Ok(Self { labels })
    }

    pub fn labels(&self) -> &[SeatLabel] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Row letters, index-aligned with [`SeatSelection::numbers`], for array binds.
    pub fn rows(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.row().to_string()).collect()
    }

    pub fn numbers(&self) -> Vec<i32> {
        self.labels.iter().map(|l| i32::from(l.number())).collect()
    }
}
