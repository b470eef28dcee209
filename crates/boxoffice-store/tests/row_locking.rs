//! Lost-update protection under real parallelism.

use std::sync::Arc;

use boxoffice_store::{MemoryStore, Store};
use boxoffice_types::{BoxofficeError, Reservation, ReservationStatus};

async fn seed(store: &MemoryStore, total_price: i64) -> Reservation {
    let reservation = Reservation::dummy(total_price);
    let mut tx = store.begin().await.unwrap();
    tx.insert_reservation(&reservation).await.unwrap();
    tx.commit().await.unwrap();
    reservation
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_increments_are_serialized() {
    let store = Arc::new(MemoryStore::new());
    let reservation = seed(&store, 1_000_000).await;

    let mut handles = Vec::new();
    for _ in 0..50 {
        let store = Arc::clone(&store);
        let id = reservation.id;
        handles.push(tokio::spawn(async move {
            let mut tx = store.begin().await.unwrap();
            let mut r = tx.lock_reservation(id).await.unwrap().unwrap();
            tokio::task::yield_now().await;
            r.apply_payment(100).unwrap();
            tx.update_reservation(&r).await.unwrap();
            tx.commit().await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let r = store.reservation(reservation.id).await.unwrap().unwrap();
    assert_eq!(r.total_paid, 5_000, "an update was lost");
    assert_eq!(r.status, ReservationStatus::Partial);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_overpayment_has_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let reservation = seed(&store, 10_000).await;

    let id = reservation.id;
    let attempt = move |store: Arc<MemoryStore>, amount: i64| async move {
        let mut tx = store.begin().await?;
        let mut r = tx
            .lock_reservation(id)
            .await?
            .ok_or(BoxofficeError::ReservationNotFound(id))?;
        r.apply_payment(amount)?;
        tx.update_reservation(&r).await?;
        tx.commit().await
    };

    let (a, b) = tokio::join!(
        tokio::spawn(attempt(Arc::clone(&store), 7_000)),
        tokio::spawn(attempt(Arc::clone(&store), 6_000)),
    );
    let results = [a.unwrap(), b.unwrap()];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(BoxofficeError::AmountExceedsRemaining { .. })
    )));

    let r = store.reservation(id).await.unwrap().unwrap();
    assert!(r.total_paid == 7_000 || r.total_paid == 6_000);
}
