//! Parallel submissions against shared balances.

mod test_helpers;

use std::sync::Barrier;
use std::sync::Arc;
use std::thread;

use lottobook::{Actor, LottoError, TicketFilter};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use test_helpers::*;

#[test]
fn test_parallel_submissions_never_overdraw() {
    let h = Harness::new();
    h.member("alice", SHOP_A, dec!(500));

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let engine = h.engine.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let actor = Actor::member("alice", SHOP_A);
                barrier.wait();
                engine.submit_ticket(
                    &actor,
                    lottobook::SubmitTicket {
                        lottery_id: LOTTERY_A.into(),
                        bets: vec![bet("59", "2up", dec!(100))],
                        note: None,
                    },
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();
    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let rejected = results
        .iter()
        .filter(|r| matches!(r, Err(LottoError::InsufficientFunds { .. })))
        .count();

    assert_eq!(accepted, 5);
    assert_eq!(rejected, 3);
    assert_eq!(h.balance("alice"), Decimal::ZERO);

    let alice = Actor::member("alice", SHOP_A);
    let tickets = h.engine.ticket_history(&alice, &TicketFilter::default()).unwrap();
    assert_eq!(tickets.len(), 5);
}

#[test]
fn test_parallel_users_keep_their_own_balances() {
    let h = Harness::new();
    let users: Vec<String> = (0..6).map(|i| format!("user-{}", i)).collect();
    for user in &users {
        h.member(user, SHOP_A, dec!(1000));
    }

    let handles: Vec<_> = users
        .iter()
        .cloned()
        .map(|user| {
            let engine = h.engine.clone();
            thread::spawn(move || {
                let actor = Actor::member(user, SHOP_A);
                for _ in 0..10 {
                    engine
                        .submit_ticket(
                            &actor,
                            lottobook::SubmitTicket {
                                lottery_id: LOTTERY_A.into(),
                                bets: vec![bet("12", "2down", dec!(10)), bet("5", "run_up", dec!(5))],
                                note: None,
                            },
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for user in &users {
        assert_eq!(h.balance(user), dec!(850));
    }

    // Everyone wins the 2down line and the run_up line
    let summary = h.issue("456", "12");
    assert_eq!(summary.tickets_processed, 60);
    for user in &users {
        assert_eq!(h.balance(user), dec!(850) + dec!(9000) + dec!(150));
    }
}
