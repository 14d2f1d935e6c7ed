// ============================================================================
// ROUND SCHEDULER - Which draw does a bet placed "now" belong to?
// ============================================================================
//
// All round-date arithmetic lives here: weekly windows (same-day and
// cross-midnight), monthly close dates, and the global day cutoff. Callers
// never derive dates themselves.
//
// Times are evaluated in the lottery's local wall clock (UTC + fixed offset).

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{LottoError, LottoResult};
use crate::models::{LotteryConfig, ScheduleType};

// ============================================================================
// CLOCK
// ============================================================================

/// Source of "now". The engine takes one so tests can pin the wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Parse "HH:MM" or "HH:MM:SS"
pub fn parse_wall_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|first| first.pred_opt())
        .map(|last| last.day())
        .unwrap_or(28)
}

/// Close dates of one month, clamped to its length
fn close_days_in(year: i32, month: u32, dates: &[u32]) -> Vec<u32> {
    let last = days_in_month(year, month);
    let mut days: Vec<u32> = dates.iter().map(|d| (*d).min(last)).collect();
    days.dedup();
    days
}

fn next_month(date: NaiveDate) -> (i32, u32) {
    if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    }
}

// ============================================================================
// ROUND SCHEDULER
// ============================================================================

#[derive(Debug, Clone)]
pub struct RoundScheduler {
    default_offset: FixedOffset,
    day_cutoff: NaiveTime,
}

impl RoundScheduler {
    pub fn new(default_offset: FixedOffset, day_cutoff: NaiveTime) -> Self {
        Self { default_offset, day_cutoff }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.utc_offset, config.day_cutoff)
    }

    pub fn offset_for(&self, lottery: &LotteryConfig) -> FixedOffset {
        lottery.offset_or(self.default_offset)
    }

    pub fn local_time(&self, lottery: &LotteryConfig, at: DateTime<Utc>) -> NaiveDateTime {
        at.with_timezone(&self.offset_for(lottery)).naive_local()
    }

    /// Calendar day of `at` in the lottery's local time
    pub fn local_day(&self, lottery: &LotteryConfig, at: DateTime<Utc>) -> NaiveDate {
        self.local_time(lottery, at).date()
    }

    /// Calendar day of `at` in the default local time
    pub fn default_local_day(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.default_offset).date_naive()
    }

    /// Local midnight of `day`, as a UTC instant
    pub fn start_of_local_day(&self, lottery: &LotteryConfig, day: NaiveDate) -> DateTime<Utc> {
        let offset = self.offset_for(lottery);
        let midnight = day.and_time(NaiveTime::MIN);
        match offset.from_local_datetime(&midnight).single() {
            Some(local) => local.with_timezone(&Utc),
            None => Utc.from_utc_datetime(&midnight),
        }
    }

    /// Activity before the cutoff belongs to the previous operating day
    pub fn operating_day(&self, local: NaiveDateTime) -> NaiveDate {
        if local.time() < self.day_cutoff {
            local.date().pred_opt().unwrap_or(local.date())
        } else {
            local.date()
        }
    }

    /// Round a bet placed at `now` belongs to, or a rejection when the
    /// lottery is outside its betting window.
    pub fn resolve_betting_round(&self, lottery: &LotteryConfig, now: DateTime<Utc>) -> LottoResult<NaiveDate> {
        let local = self.local_time(lottery, now);
        match lottery.rules.schedule_type {
            ScheduleType::Weekly => self.weekly_round(lottery, local),
            ScheduleType::Monthly => Ok(self.monthly_round(lottery, local)),
        }
    }

    /// Round an operator most likely means when issuing a result without a date.
    ///
    /// Never rejects: after close the same-day round is still "current".
    pub fn current_round(&self, lottery: &LotteryConfig, now: DateTime<Utc>) -> NaiveDate {
        let local = self.local_time(lottery, now);
        let today = local.date();
        match lottery.rules.schedule_type {
            ScheduleType::Monthly => {
                let dates = lottery.rules.monthly_close_dates();
                close_days_in(today.year(), today.month(), &dates)
                    .into_iter()
                    .find(|d| *d >= today.day())
                    .and_then(|d| today.with_day(d))
                    .unwrap_or_else(|| self.first_close_of_next_month(today, &dates))
            }
            ScheduleType::Weekly => {
                let open = lottery.open_time.as_deref().and_then(parse_wall_time);
                let close = lottery.close_time.as_deref().and_then(parse_wall_time);
                match (open, close) {
                    (Some(open), Some(close)) if close < open && local.time() < open => {
                        today.pred_opt().unwrap_or(today)
                    }
                    (_, Some(_)) => today,
                    (_, None) => self.operating_day(local),
                }
            }
        }
    }

    fn weekly_round(&self, lottery: &LotteryConfig, local: NaiveDateTime) -> LottoResult<NaiveDate> {
        let open = lottery.open_time.as_deref().and_then(parse_wall_time);
        let close = lottery.close_time.as_deref().and_then(parse_wall_time);
        let now = local.time();
        let today = local.date();

        let Some(close) = close else {
            let round = self.operating_day(local);
            return self.require_open_day(lottery, round);
        };

        if let Some(open) = open.filter(|open| close < *open) {
            // Cross-midnight: the evening part belongs to today, the early
            // morning part to the round that opened yesterday.
            let round = if now >= open {
                today
            } else if now <= close {
                today.pred_opt().unwrap_or(today)
            } else {
                return Err(LottoError::LotteryClosed(format!(
                    "betting opens at {}",
                    open.format("%H:%M")
                )));
            };
            return self.require_open_day(lottery, round);
        }

        if let Some(open) = open {
            if now < open && self.is_open_day(lottery, today) {
                return Err(LottoError::LotteryClosed(format!(
                    "betting opens at {}",
                    open.format("%H:%M")
                )));
            }
        }

        let before_close = now <= close;
        if before_close && self.is_open_day(lottery, today) {
            return Ok(today);
        }

        if lottery.rules.presell_next_round {
            return self.next_open_day(lottery, today).ok_or(LottoError::NoRoundToday);
        }

        if !self.is_open_day(lottery, today) {
            return Err(LottoError::NoRoundToday);
        }
        Err(LottoError::LotteryClosed(format!("betting closed at {}", close.format("%H:%M"))))
    }

    fn monthly_round(&self, lottery: &LotteryConfig, local: NaiveDateTime) -> NaiveDate {
        let today = local.date();
        let dates = lottery.rules.monthly_close_dates();
        let close = lottery.close_time.as_deref().and_then(parse_wall_time);
        let days = close_days_in(today.year(), today.month(), &dates);

        let today_usable = days.contains(&today.day()) && close.map_or(true, |close| local.time() < close);
        if today_usable {
            return today;
        }

        days.into_iter()
            .find(|d| *d > today.day())
            .and_then(|d| today.with_day(d))
            .unwrap_or_else(|| self.first_close_of_next_month(today, &dates))
    }

    fn first_close_of_next_month(&self, today: NaiveDate, dates: &[u32]) -> NaiveDate {
        let (year, month) = next_month(today);
        let day = close_days_in(year, month, dates).first().copied().unwrap_or(1);
        NaiveDate::from_ymd_opt(year, month, day).unwrap_or(today)
    }

    /// An empty `open_days` list means every day
    fn is_open_day(&self, lottery: &LotteryConfig, day: NaiveDate) -> bool {
        lottery.open_days.is_empty() || lottery.is_open_on(day.weekday())
    }

    fn require_open_day(&self, lottery: &LotteryConfig, round: NaiveDate) -> LottoResult<NaiveDate> {
        if self.is_open_day(lottery, round) {
            Ok(round)
        } else {
            Err(LottoError::NoRoundToday)
        }
    }

    fn next_open_day(&self, lottery: &LotteryConfig, after: NaiveDate) -> Option<NaiveDate> {
        (1..=7)
            .filter_map(|n| after.checked_add_signed(Duration::days(n)))
            .find(|day| self.is_open_day(lottery, *day))
    }

    /// Whether the lottery currently accepts bets for `round`
    pub fn is_betting_open_for(&self, lottery: &LotteryConfig, round: NaiveDate, now: DateTime<Utc>) -> bool {
        matches!(self.resolve_betting_round(lottery, now), Ok(current) if current == round)
    }
}
