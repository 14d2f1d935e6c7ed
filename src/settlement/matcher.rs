//! Number matching: does a bet line win against a round's result?
//!
//! Never fails. Unknown bet types and malformed numbers simply lose.

use serde::{Deserialize, Serialize};

use crate::error::{LottoError, LottoResult};

/// A validated draw: `top_3` is three digits, `bottom_2` two
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinningNumbers {
    pub top_3: String,
    pub bottom_2: String,
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

impl WinningNumbers {
    pub fn parse(top_3: &str, bottom_2: &str) -> LottoResult<Self> {
        let top_3 = top_3.trim();
        let bottom_2 = bottom_2.trim();
        if top_3.len() != 3 || !all_digits(top_3) {
            return Err(LottoError::InvalidResult(format!("top_3 must be 3 digits, got '{}'", top_3)));
        }
        if bottom_2.len() != 2 || !all_digits(bottom_2) {
            return Err(LottoError::InvalidResult(format!("bottom_2 must be 2 digits, got '{}'", bottom_2)));
        }
        Ok(Self { top_3: top_3.to_string(), bottom_2: bottom_2.to_string() })
    }

    /// Last two digits of the top prize
    pub fn two_up(&self) -> &str {
        &self.top_3[self.top_3.len().saturating_sub(2)..]
    }
}

fn sorted_digits(s: &str) -> Vec<u8> {
    let mut digits = s.as_bytes().to_vec();
    digits.sort_unstable();
    digits
}

pub fn is_winner(bet_type: &str, number: &str, draw: &WinningNumbers) -> bool {
    if !all_digits(number) {
        return false;
    }
    match bet_type {
        "3top" => number == draw.top_3,
        "3tod" => number.len() == 3 && sorted_digits(number) == sorted_digits(&draw.top_3),
        "2up" => number == draw.two_up(),
        "2down" => number == draw.bottom_2,
        "run_up" => number.len() == 1 && draw.top_3.contains(number),
        "run_down" => number.len() == 1 && draw.bottom_2.contains(number),
        _ => false,
    }
}
