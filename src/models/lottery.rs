//! Lottery configuration and payout-rate profiles

use std::collections::HashMap;

use chrono::{FixedOffset, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Close dates used by monthly lotteries that don't list their own
pub const DEFAULT_MONTHLY_CLOSE_DATES: [u32; 2] = [1, 16];

/// How a lottery's rounds are laid out on the calendar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    #[default]
    Weekly,
    Monthly,
}

/// The `rules` blob of a lottery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleRules {
    #[serde(default)]
    pub schedule_type: ScheduleType,
    /// Days of month on which a monthly round closes
    #[serde(default)]
    pub close_dates: Vec<u32>,
    /// Same-day window only: after close, sell into the next open day instead of rejecting
    #[serde(default)]
    pub presell_next_round: bool,
}

impl ScheduleRules {
    pub fn monthly() -> Self {
        Self { schedule_type: ScheduleType::Monthly, ..Default::default() }
    }

    /// Sorted, de-duplicated close dates in 1..=31 (defaults when none are valid)
    pub fn monthly_close_dates(&self) -> Vec<u32> {
        let mut dates: Vec<u32> = self
            .close_dates
            .iter()
            .copied()
            .filter(|d| (1..=31).contains(d))
            .collect();
        dates.sort_unstable();
        dates.dedup();
        if dates.is_empty() {
            DEFAULT_MONTHLY_CLOSE_DATES.to_vec()
        } else {
            dates
        }
    }
}

/// A bettable lottery product, owned by a shop or global (template)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotteryConfig {
    pub id: String,
    /// Product code shared by every shop selling the same draw
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub shop_id: Option<String>,
    #[serde(default)]
    pub is_template: bool,
    /// "HH:MM[:SS]" local wall-clock
    #[serde(default)]
    pub open_time: Option<String>,
    #[serde(default)]
    pub close_time: Option<String>,
    #[serde(default)]
    pub result_time: Option<String>,
    /// Weekday codes: "MON" .. "SUN"
    #[serde(default)]
    pub open_days: Vec<String>,
    #[serde(default)]
    pub rules: ScheduleRules,
    #[serde(default)]
    pub rate_profile_id: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Overrides the global local time zone
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
}

fn default_active() -> bool {
    true
}

impl LotteryConfig {
    pub fn new(id: impl Into<String>, code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            code: code.into(),
            name: name.into(),
            shop_id: None,
            is_template: false,
            open_time: None,
            close_time: None,
            result_time: None,
            open_days: Vec::new(),
            rules: ScheduleRules::default(),
            rate_profile_id: None,
            is_active: true,
            utc_offset_minutes: None,
        }
    }

    pub fn is_open_on(&self, day: Weekday) -> bool {
        let code = weekday_code(day);
        self.open_days.iter().any(|d| d.eq_ignore_ascii_case(code))
    }

    /// Local time zone for this lottery, falling back to `default`
    pub fn offset_or(&self, default: FixedOffset) -> FixedOffset {
        self.utc_offset_minutes
            .and_then(|m| FixedOffset::east_opt(m * 60))
            .unwrap_or(default)
    }
}

pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "MON",
        Weekday::Tue => "TUE",
        Weekday::Wed => "WED",
        Weekday::Thu => "THU",
        Weekday::Fri => "FRI",
        Weekday::Sat => "SAT",
        Weekday::Sun => "SUN",
    }
}

/// One entry of a rate profile.
///
/// Legacy profiles store a bare multiplier; newer ones a `{pay, min, max}` record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateEntry {
    Detailed {
        pay: Decimal,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<Decimal>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<Decimal>,
    },
    Scalar(Decimal),
}

/// Named mapping from bet type to payout rate
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub shop_id: Option<String>,
    #[serde(default)]
    pub rates: HashMap<String, RateEntry>,
}
