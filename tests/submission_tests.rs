//! Ticket submission through the engine: round resolution, pricing, debit.

mod test_helpers;

use chrono::Duration;
use lottobook::{
    BetBound, LedgerReason, LottoError, ScheduleRules, SubmitTicket, TicketFilter, TicketStatus,
};
use rust_decimal_macros::dec;
use test_helpers::*;

#[test]
fn test_submit_debits_and_persists_pending_ticket() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));

    let ticket = h
        .submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(100)), bet("459", "3top", dec!(20))])
        .unwrap();

    assert_eq!(ticket.status, TicketStatus::Pending);
    assert_eq!(ticket.round_date, round());
    assert_eq!(ticket.shop_id, SHOP_A);
    assert_eq!(ticket.total_amount, dec!(120));
    assert_eq!(ticket.lines[0].reward_rate, dec!(90));
    assert_eq!(ticket.lines[1].reward_rate, dec!(900));
    assert_eq!(h.balance("alice"), dec!(880));

    let stored = h.engine.store().ticket(&ticket.id).unwrap().unwrap();
    assert_eq!(stored, ticket);

    let entries = h.engine.store().ledger_entries("alice").unwrap();
    let debit = entries.iter().find(|e| e.reason == LedgerReason::TicketDebit).unwrap();
    assert_eq!(debit.delta, dec!(-120));
    assert_eq!(debit.balance_after, dec!(880));
    assert_eq!(debit.reference, ticket.id);
}

#[test]
fn test_insufficient_funds_writes_nothing() {
    let h = Harness::new();
    let bob = h.member("bob", SHOP_A, dec!(50));

    let err = h.submit(&bob, LOTTERY_A, vec![bet("59", "2up", dec!(60))]).unwrap_err();
    assert_eq!(err, LottoError::InsufficientFunds { shortfall: dec!(10) });

    assert_eq!(h.balance("bob"), dec!(50));
    assert!(h.engine.ticket_history(&bob, &TicketFilter::default()).unwrap().is_empty());
}

#[test]
fn test_one_bad_line_rejects_whole_ticket() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(5000));

    let err = h
        .submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(100)), bet("12", "2up", dec!(1001))])
        .unwrap_err();
    assert_eq!(
        err,
        LottoError::BetLimitViolation { bet_type: "2up".into(), bound: BetBound::Max, limit: dec!(1000) }
    );

    let err = h.submit(&alice, LOTTERY_A, vec![bet("12", "2down", dec!(4))]).unwrap_err();
    assert!(matches!(err, LottoError::BetLimitViolation { bound: BetBound::Min, .. }));

    let err = h.submit(&alice, LOTTERY_A, vec![bet("5a", "2up", dec!(10))]).unwrap_err();
    assert!(matches!(err, LottoError::InvalidBet(_)));

    let err = h.submit(&alice, LOTTERY_A, vec![bet("5", "2up", dec!(10))]).unwrap_err();
    assert!(matches!(err, LottoError::InvalidBet(_)));

    assert_eq!(h.balance("alice"), dec!(5000));
}

#[test]
fn test_lottery_without_profile_has_no_rates() {
    let h = Harness::new();
    let mut bare = shop_lottery("bare", SHOP_A);
    bare.rate_profile_id = None;
    h.engine.upsert_lottery(&bare).unwrap();
    let alice = h.member("alice", SHOP_A, dec!(100));

    let err = h.submit(&alice, "bare", vec![bet("59", "2up", dec!(10))]).unwrap_err();
    assert_eq!(err, LottoError::UnconfiguredRate("2up".into()));
}

#[test]
fn test_window_rejections() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(100));

    h.clock.set(local(2024, 3, 4, 17, 30));
    let err = h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(10))]).unwrap_err();
    assert!(matches!(err, LottoError::LotteryClosed(_)));

    h.clock.set(local(2024, 3, 4, 7, 0));
    let err = h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(10))]).unwrap_err();
    assert!(matches!(err, LottoError::LotteryClosed(_)));

    // Close time itself still sells
    h.clock.set(local(2024, 3, 4, 17, 0));
    assert!(h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(10))]).is_ok());
}

#[test]
fn test_presell_rolls_into_next_open_day() {
    let h = Harness::new();
    let mut weekdays = shop_lottery("weekday", SHOP_A);
    weekdays.open_days = vec!["MON".into(), "WED".into(), "FRI".into()];
    weekdays.rules = ScheduleRules { presell_next_round: true, ..Default::default() };
    h.engine.upsert_lottery(&weekdays).unwrap();
    let alice = h.member("alice", SHOP_A, dec!(100));

    h.clock.set(local(2024, 3, 4, 18, 0));
    let ticket = h.submit(&alice, "weekday", vec![bet("59", "2up", dec!(10))]).unwrap();
    assert_eq!(ticket.round_date, date(2024, 3, 6));

    // Tuesday is not an open day: sells into Wednesday
    h.advance(Duration::hours(6));
    let ticket = h.submit(&alice, "weekday", vec![bet("59", "2up", dec!(10))]).unwrap();
    assert_eq!(ticket.round_date, date(2024, 3, 6));
}

#[test]
fn test_closed_day_without_presell() {
    let h = Harness::new();
    let mut weekdays = shop_lottery("weekday", SHOP_A);
    weekdays.open_days = vec!["TUE".into()];
    h.engine.upsert_lottery(&weekdays).unwrap();
    let alice = h.member("alice", SHOP_A, dec!(100));

    let err = h.submit(&alice, "weekday", vec![bet("59", "2up", dec!(10))]).unwrap_err();
    assert_eq!(err, LottoError::NoRoundToday);
}

#[test]
fn test_inactive_template_and_foreign_lotteries() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(100));

    let mut paused = shop_lottery("paused", SHOP_A);
    paused.is_active = false;
    h.engine.upsert_lottery(&paused).unwrap();

    let bets = || vec![bet("59", "2up", dec!(10))];
    assert_eq!(h.submit(&alice, "paused", bets()).unwrap_err(), LottoError::LotteryInactive);
    assert_eq!(h.submit(&alice, "hanoi-template", bets()).unwrap_err(), LottoError::LotteryInactive);
    assert_eq!(
        h.submit(&alice, LOTTERY_B, bets()).unwrap_err(),
        LottoError::LotteryNotFound(LOTTERY_B.into())
    );
    assert_eq!(
        h.submit(&alice, "nope", bets()).unwrap_err(),
        LottoError::LotteryNotFound("nope".into())
    );
    assert_eq!(h.balance("alice"), dec!(100));
}

#[test]
fn test_commission_recorded_on_ticket() {
    let h = Harness::new();
    h.engine.open_account("carol", Some(SHOP_A), dec!(1000), dec!(2.5)).unwrap();
    let carol = lottobook::Actor::member("carol", SHOP_A);

    let ticket = h.submit(&carol, LOTTERY_A, vec![bet("59", "2up", dec!(150))]).unwrap();
    assert_eq!(ticket.commission_amount, dec!(3.75));
}

#[test]
fn test_oversized_amounts_are_rejected_not_panicking() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));

    let huge = dec!(50000000000000000000000000000);
    let err = h
        .submit(&alice, LOTTERY_A, vec![bet("7", "run_up", huge), bet("8", "run_up", huge)])
        .unwrap_err();
    assert!(matches!(err, LottoError::InvalidBet(_)));
    assert_eq!(h.balance("alice"), dec!(1000));

    h.engine
        .open_account("dave", Some(SHOP_A), dec!(1000), rust_decimal::Decimal::MAX)
        .unwrap();
    let dave = lottobook::Actor::member("dave", SHOP_A);
    let err = h.submit(&dave, LOTTERY_A, vec![bet("7", "run_up", dec!(100))]).unwrap_err();
    assert!(matches!(err, LottoError::InvalidBet(_)));
    assert_eq!(h.balance("dave"), dec!(1000));
    assert!(h.engine.ticket_history(&dave, &TicketFilter::default()).unwrap().is_empty());
}

#[test]
fn test_note_is_trimmed_away_when_blank() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(100));

    let ticket = h
        .engine
        .submit_ticket(
            &alice,
            SubmitTicket { lottery_id: LOTTERY_A.into(), bets: vec![bet("59", "2up", dec!(10))], note: Some("  ".into()) },
        )
        .unwrap();
    assert_eq!(ticket.note, None);
}

#[test]
fn test_history_filters_newest_first() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));
    let bob = h.member("bob", SHOP_A, dec!(1000));

    let first = h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(10))]).unwrap();
    h.advance(Duration::minutes(5));
    let second = h.submit(&alice, LOTTERY_A, vec![bet("12", "2down", dec!(10))]).unwrap();
    h.submit(&bob, LOTTERY_A, vec![bet("12", "2down", dec!(10))]).unwrap();

    let mine = h.engine.ticket_history(&alice, &TicketFilter::default()).unwrap();
    assert_eq!(mine.iter().map(|t| t.id.clone()).collect::<Vec<_>>(), vec![second.id.clone(), first.id]);

    let limited = h.engine.ticket_history(&alice, &TicketFilter { limit: Some(1), ..Default::default() }).unwrap();
    assert_eq!(limited.len(), 1);

    let other_day = TicketFilter { date: Some(date(2024, 3, 5)), ..Default::default() };
    assert!(h.engine.ticket_history(&alice, &other_day).unwrap().is_empty());

    let shop = h.engine.shop_tickets(&h.admin(SHOP_A), SHOP_A, &TicketFilter::default()).unwrap();
    assert_eq!(shop.len(), 3);
    assert!(matches!(
        h.engine.shop_tickets(&h.admin(SHOP_B), SHOP_A, &TicketFilter::default()),
        Err(LottoError::Forbidden(_))
    ));
    assert!(matches!(h.engine.ticket(&bob, &second.id), Err(LottoError::TicketNotFound(_))));
}

#[test]
fn test_lottery_listing_is_shop_scoped() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(0));

    let visible = h.engine.list_lotteries(&alice).unwrap();
    let ids: Vec<&str> = visible.iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, vec![LOTTERY_A]);

    let all = h.engine.list_lotteries(&h.superadmin()).unwrap();
    assert_eq!(all.len(), 3);
}
