// ============================================================================
// TEST HELPERS — Shared fixture for integration tests
// ============================================================================

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

use lottobook::{
    Actor, BetRequest, Config, FixedClock, IssueResult, LotteryConfig, LottoEngine, RateEntry, RateProfile,
    SettlementSummary, Store, SubmitTicket, Ticket,
};

pub const SHOP_A: &str = "shop-a";
pub const SHOP_B: &str = "shop-b";
pub const LOTTERY_A: &str = "hanoi-a";
pub const LOTTERY_B: &str = "hanoi-b";
pub const CODE: &str = "HANOI";

pub fn bangkok() -> FixedOffset {
    FixedOffset::east_opt(7 * 3600).unwrap()
}

/// Bangkok wall clock → UTC
pub fn local(y: i32, m: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
    bangkok().with_ymd_and_hms(y, m, d, h, mi, 0).single().unwrap().with_timezone(&Utc)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Monday 2024-03-04, mid-session
pub fn monday_noon() -> DateTime<Utc> {
    local(2024, 3, 4, 12, 0)
}

pub fn round() -> NaiveDate {
    date(2024, 3, 4)
}

pub fn bet(number: &str, bet_type: &str, amount: Decimal) -> BetRequest {
    BetRequest::new(number, bet_type, amount)
}

pub fn standard_profile() -> RateProfile {
    let mut rates = HashMap::new();
    rates.insert("3top".to_string(), RateEntry::Detailed { pay: dec!(900), min: Some(dec!(1)), max: Some(dec!(500)) });
    rates.insert("3tod".to_string(), RateEntry::Scalar(dec!(150)));
    rates.insert("2up".to_string(), RateEntry::Detailed { pay: dec!(90), min: Some(dec!(1)), max: Some(dec!(1000)) });
    rates.insert("2down".to_string(), RateEntry::Detailed { pay: dec!(90), min: Some(dec!(5)), max: None });
    rates.insert("run_up".to_string(), RateEntry::Scalar(dec!(3)));
    rates.insert("run_down".to_string(), RateEntry::Scalar(dec!(4)));
    RateProfile { id: "std".into(), name: "Standard".into(), shop_id: None, rates }
}

/// Same-day window 08:00-17:00, every day
pub fn shop_lottery(id: &str, shop: &str) -> LotteryConfig {
    let mut lottery = LotteryConfig::new(id, CODE, "Hanoi");
    lottery.shop_id = Some(shop.to_string());
    lottery.open_time = Some("08:00".into());
    lottery.close_time = Some("17:00".into());
    lottery.rate_profile_id = Some("std".into());
    lottery
}

pub struct Harness {
    _dir: TempDir,
    pub engine: Arc<LottoEngine>,
    pub clock: Arc<FixedClock>,
}

impl Harness {
    /// Two shops selling the same HANOI draw, a super-admin and one admin per shop
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let clock = Arc::new(FixedClock::new(monday_noon()));
        let engine = Arc::new(LottoEngine::with_clock(store, &Config::default(), clock.clone()));

        engine.upsert_rate_profile(&standard_profile()).unwrap();
        engine.upsert_lottery(&shop_lottery(LOTTERY_A, SHOP_A)).unwrap();
        engine.upsert_lottery(&shop_lottery(LOTTERY_B, SHOP_B)).unwrap();

        let mut template = shop_lottery("hanoi-template", SHOP_A);
        template.shop_id = None;
        template.is_template = true;
        engine.upsert_lottery(&template).unwrap();

        Self { _dir: dir, engine, clock }
    }

    pub fn member(&self, user_id: &str, shop: &str, balance: Decimal) -> Actor {
        self.engine.open_account(user_id, Some(shop), balance, dec!(0)).unwrap();
        Actor::member(user_id, shop)
    }

    pub fn superadmin(&self) -> Actor {
        Actor::superadmin("root")
    }

    pub fn admin(&self, shop: &str) -> Actor {
        Actor::admin(format!("admin-{}", shop), shop)
    }

    pub fn submit(&self, actor: &Actor, lottery_id: &str, bets: Vec<BetRequest>) -> lottobook::LottoResult<Ticket> {
        self.engine.submit_ticket(actor, SubmitTicket { lottery_id: lottery_id.into(), bets, note: None })
    }

    pub fn issue(&self, top_3: &str, bottom_2: &str) -> SettlementSummary {
        self.engine
            .issue_result(
                &self.superadmin(),
                IssueResult {
                    lottery_id: LOTTERY_A.into(),
                    top_3: top_3.into(),
                    bottom_2: bottom_2.into(),
                    round_date: Some(round()),
                },
            )
            .unwrap()
    }

    pub fn balance(&self, user_id: &str) -> Decimal {
        self.engine.balance_of(user_id).unwrap()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
