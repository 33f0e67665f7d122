//! Positive line quantities.
//!
//! A [`Quantity`] is always at least one. Anything the backend would reject as
//! a line quantity (zero, negatives, free text) is refused at parse time, so a
//! value of this type can be sent to the server without further checks.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for quantity parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantityError {
    /// The input was empty or whitespace.
    #[error("quantity is empty")]
    Empty,
    /// The input was not an integer.
    #[error("quantity is not a whole number: {0}")]
    NotANumber(String),
    /// The input was zero or negative.
    #[error("quantity must be at least 1 (got {0})")]
    NotPositive(i64),
    /// The input does not fit in a `u32`.
    #[error("quantity is too large")]
    TooLarge,
}

/// A line quantity of at least one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Quantity(NonZeroU32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(NonZeroU32::MIN);

    /// Create a quantity, returning `None` for zero.
    #[must_use]
    pub const fn new(value: u32) -> Option<Self> {
        match NonZeroU32::new(value) {
            Some(value) => Some(Self(value)),
            None => None,
        }
    }

    /// Parse user input (text field or spinner value).
    ///
    /// # Errors
    ///
    /// Returns an error if the input:
    /// - Is empty
    /// - Is not a whole number
    /// - Is zero or negative
    /// - Exceeds `u32::MAX`
    pub fn parse(input: &str) -> Result<Self, QuantityError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(QuantityError::Empty);
        }

        let value = trimmed
            .parse::<i64>()
            .map_err(|_| QuantityError::NotANumber(trimmed.to_owned()))?;

        if value < 1 {
            return Err(QuantityError::NotPositive(value));
        }

        let value = u32::try_from(value).map_err(|_| QuantityError::TooLarge)?;
        Self::new(value).ok_or(QuantityError::NotPositive(0))
    }

    /// Returns the quantity as a `u32`.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<u32> for Quantity {
    type Error = QuantityError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(QuantityError::NotPositive(0))
    }
}

impl From<Quantity> for u32 {
    fn from(quantity: Quantity) -> Self {
        quantity.get()
    }
}
