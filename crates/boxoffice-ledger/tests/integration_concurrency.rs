//! Racing payments on one reservation.

mod common;

use std::sync::Arc;

use boxoffice_types::{
    Actor, BoxofficeError, NewPayment, PaymentMethod, ReservationStatus, Role, UserId,
};
use common::harness;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_payments_that_overpay_have_one_winner() {
    for _ in 0..20 {
        let h = Arc::new(harness());
        let r = h.reservation(10_000, &[]).await;

        // Two cashiers, each valid against the untouched balance.
        let tellers = [
            Actor::new(UserId::new(), Role::Cashier),
            Actor::new(UserId::new(), Role::Cashier),
        ];
        let mut handles = Vec::new();
        for (teller, amount) in tellers.into_iter().zip([6_000, 7_000]) {
            let h = Arc::clone(&h);
            let id = r.id;
            handles.push(tokio::spawn(async move {
                h.backoffice
                    .add_payment(id, NewPayment::new(amount, PaymentMethod::Cash), &teller, None)
                    .await
            }));
        }

        let mut won = Vec::new();
        let mut rejected = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(receipt) => won.push(receipt.payment.amount),
                Err(BoxofficeError::AmountExceedsRemaining { .. }) => rejected += 1,
                Err(other) => panic!("unexpected error: {other:?}"),
            }
        }
        assert_eq!(won.len(), 1, "exactly one payment must win");
        assert_eq!(rejected, 1);

        let summary = h.backoffice.reservation_summary(r.id).await.unwrap();
        assert_eq!(summary.total_paid, won[0]);
        assert_eq!(summary.status, ReservationStatus::Partial);
        assert_eq!(h.backoffice.payments_for(r.id).await.unwrap().len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_small_payments_all_land() {
    let h = Arc::new(harness());
    let r = h.reservation(100_000, &[]).await;

    let mut handles = Vec::new();
    for i in 0..50_i64 {
        let h = Arc::clone(&h);
        let id = r.id;
        handles.push(tokio::spawn(async move {
            let teller = Actor::new(UserId::new(), Role::Cashier);
            h.backoffice
                .add_payment(id, NewPayment::new(1_000 + i, PaymentMethod::Cash), &teller, None)
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let expected: i64 = (0..50).map(|i| 1_000 + i).sum();
    let summary = h.backoffice.reservation_summary(r.id).await.unwrap();
    assert_eq!(summary.total_paid, expected);
    assert_eq!(h.backoffice.payments_for(r.id).await.unwrap().len(), 50);
}
