//! Simulator seed parameter.

use std::fmt;
use std::str::FromStr;

use crate::error::{QxError, QxResult};

/// Longest seed the service accepts, in decimal digits.
pub const MAX_SEED_DIGITS: usize = 10;

/// A validated simulator seed: 1 to 10 ASCII decimal digits.
///
/// The service answers anything else with a 400, so the check runs before
/// a request is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Seed(String);

impl Seed {
    /// Validate a seed given in its decimal string form.
    pub fn parse(raw: &str) -> QxResult<Self> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(QxError::InvalidParameter(format!(
                "invalid seed ({raw}), seeds must be numeric"
            )));
        }
        if raw.len() > MAX_SEED_DIGITS {
            return Err(QxError::InvalidParameter(format!(
                "invalid seed ({raw}), seeds can have a maximum length of {MAX_SEED_DIGITS} digits"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Decimal form as sent on the wire.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Seed {
    type Err = QxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<u64> for Seed {
    type Error = QxError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::parse(&value.to_string())
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
