//! Result issuance: payouts, re-issue, corrections and cross-shop broadcast.

mod test_helpers;

use chrono::Duration;
use lottobook::{IssueResult, LedgerReason, LottoError, TicketStatus};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use test_helpers::*;

#[test]
fn test_winning_line_pays_stake_times_rate() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));
    let ticket = h
        .submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(100)), bet("34", "2up", dec!(10))])
        .unwrap();
    assert_eq!(h.balance("alice"), dec!(890));

    h.advance(Duration::hours(6));
    let summary = h.issue("459", "12");

    assert_eq!(summary.round_date, round());
    assert_eq!(summary.revision, 1);
    assert_eq!(summary.tickets_processed, 1);
    assert_eq!(summary.winners, 1);
    assert_eq!(summary.total_payout, dec!(9000));
    assert_eq!(h.balance("alice"), dec!(9890));

    let settled = h.engine.store().ticket(&ticket.id).unwrap().unwrap();
    assert_eq!(settled.status, TicketStatus::Win);
    assert_eq!(settled.lines[0].status, TicketStatus::Win);
    assert_eq!(settled.lines[0].winning_amount, dec!(9000));
    assert_eq!(settled.lines[1].status, TicketStatus::Lose);
    assert!(settled.settled_at.is_some());

    let result = h.engine.store().result(LOTTERY_A, round()).unwrap().unwrap();
    assert_eq!((result.top_3.as_str(), result.bottom_2.as_str()), ("459", "12"));
}

#[test]
fn test_reissuing_same_numbers_moves_nothing() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));
    h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(100))]).unwrap();

    h.issue("459", "12");
    let after_first = h.balance("alice");
    let entries_after_first = h.engine.store().ledger_entries("alice").unwrap().len();

    let again = h.issue("459", "12");
    assert_eq!(again.revision, 2);
    assert_eq!(again.net_delta, Decimal::ZERO);
    assert_eq!(h.balance("alice"), after_first);
    assert_eq!(h.engine.store().ledger_entries("alice").unwrap().len(), entries_after_first);
}

#[test]
fn test_correction_converges_to_corrected_numbers() {
    let place = |h: &Harness| {
        let alice = h.member("alice", SHOP_A, dec!(1000));
        let bob = h.member("bob", SHOP_A, dec!(1000));
        h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(100))]).unwrap();
        h.submit(&bob, LOTTERY_A, vec![bet("23", "2up", dec!(50)), bet("5", "run_down", dec!(10))]).unwrap();
    };

    let corrected = Harness::new();
    place(&corrected);
    corrected.issue("123", "45");

    let wrong_first = Harness::new();
    place(&wrong_first);
    wrong_first.issue("459", "12");
    assert_eq!(wrong_first.balance("alice"), dec!(9900));
    let summary = wrong_first.issue("123", "45");
    assert_eq!(summary.revision, 2);

    for user in ["alice", "bob"] {
        assert_eq!(wrong_first.balance(user), corrected.balance(user), "balance of {}", user);
    }
    assert_eq!(wrong_first.balance("alice"), dec!(900));
    // 23 2up at 90 + run_down 5 at 4
    assert_eq!(wrong_first.balance("bob"), dec!(940) + dec!(4500) + dec!(40));
}

#[test]
fn test_ledger_sums_to_balance() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));
    h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(100))]).unwrap();
    h.submit(&alice, LOTTERY_A, vec![bet("459", "3top", dec!(5))]).unwrap();
    h.issue("459", "12");
    h.issue("111", "22");
    h.issue("459", "12");

    let entries = h.engine.store().ledger_entries("alice").unwrap();
    let total: Decimal = entries.iter().map(|e| e.delta).sum();
    assert_eq!(total, h.balance("alice"));
    assert_eq!(entries.last().unwrap().balance_after, h.balance("alice"));
    assert_eq!(entries[0].reason, LedgerReason::Opening);
    assert_eq!(h.balance("alice"), dec!(895) + dec!(9000) + dec!(4500));
}

#[test]
fn test_broadcast_to_every_shop_selling_the_code() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));
    let bob = h.member("bob", SHOP_B, dec!(1000));
    h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(10))]).unwrap();
    h.submit(&bob, LOTTERY_B, vec![bet("59", "2up", dec!(10))]).unwrap();

    let summary = h.issue("459", "12");
    assert_eq!(summary.lottery_ids, vec![LOTTERY_A.to_string(), LOTTERY_B.to_string()]);
    assert_eq!(h.balance("alice"), dec!(1890));
    assert_eq!(h.balance("bob"), dec!(1890));
    assert!(h.engine.store().result(LOTTERY_B, round()).unwrap().is_some());
    assert!(h.engine.store().result("hanoi-template", round()).unwrap().is_none());
}

#[test]
fn test_shop_admin_settles_only_own_shop() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));
    let bob = h.member("bob", SHOP_B, dec!(1000));
    h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(10))]).unwrap();
    let bobs = h.submit(&bob, LOTTERY_B, vec![bet("59", "2up", dec!(10))]).unwrap();

    let request = IssueResult {
        lottery_id: LOTTERY_A.into(),
        top_3: "459".into(),
        bottom_2: "12".into(),
        round_date: Some(round()),
    };
    let summary = h.engine.issue_result(&h.admin(SHOP_A), request.clone()).unwrap();
    assert_eq!(summary.lottery_ids, vec![LOTTERY_A.to_string()]);
    assert_eq!(h.balance("bob"), dec!(990));
    assert_eq!(h.engine.store().ticket(&bobs.id).unwrap().unwrap().status, TicketStatus::Pending);

    let err = h.engine.issue_result(&h.admin(SHOP_B), request).unwrap_err();
    assert!(matches!(err, LottoError::Forbidden(_)));
}

#[test]
fn test_cancelled_tickets_are_left_alone() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));
    let ticket = h.submit(&alice, LOTTERY_A, vec![bet("59", "2up", dec!(100))]).unwrap();
    h.engine.cancel_ticket(&alice, &ticket.id).unwrap();

    let summary = h.issue("459", "12");
    assert_eq!(summary.tickets_processed, 0);
    assert_eq!(h.balance("alice"), dec!(1000));
    let stored = h.engine.store().ticket(&ticket.id).unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Cancelled);
    assert!(stored.settled_at.is_none());
}

#[test]
fn test_issue_validation() {
    let h = Harness::new();
    let alice = h.member("alice", SHOP_A, dec!(1000));

    let request = |top: &str, bottom: &str| IssueResult {
        lottery_id: LOTTERY_A.into(),
        top_3: top.into(),
        bottom_2: bottom.into(),
        round_date: None,
    };

    assert!(matches!(h.engine.issue_result(&alice, request("459", "12")), Err(LottoError::Forbidden(_))));
    assert!(matches!(
        h.engine.issue_result(&h.superadmin(), request("45", "12")),
        Err(LottoError::InvalidResult(_))
    ));
    assert!(matches!(
        h.engine.issue_result(&h.superadmin(), request("459", "1x")),
        Err(LottoError::InvalidResult(_))
    ));

    // No date: the lottery's current round
    let summary = h.engine.issue_result(&h.superadmin(), request("459", "12")).unwrap();
    assert_eq!(summary.round_date, round());
    assert_eq!(h.engine.result_history(Some(LOTTERY_A), None).unwrap().len(), 1);
}
