use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::engine::Engine;

/// How often the finisher looks for stays past checkout. Checkout is a
/// calendar-day boundary, so hourly is already generous.
const FINISHER_INTERVAL: Duration = Duration::from_secs(3600);

const COMPACTOR_INTERVAL: Duration = Duration::from_secs(60);

/// Background task that moves active reservations past their checkout date
/// to finished. Neither party drives this transition and no mail is sent.
pub async fn run_finisher(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(FINISHER_INTERVAL);
    loop {
        interval.tick().await;
        let today = chrono::Utc::now().date_naive();
        let due = engine.collect_due_checkouts(today);
        for (reservation_id, _property_id) in due {
            match engine.finish_reservation(reservation_id).await {
                Ok(_) => info!("finished stay {reservation_id}"),
                Err(e) => {
                    // May have been canceled meanwhile — that's fine
                    tracing::debug!("finisher skip {reservation_id}: {e}");
                }
            }
        }
    }
}

/// Background task that compacts the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(COMPACTOR_INTERVAL);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends >= threshold {
            match engine.compact_wal().await {
                Ok(()) => info!("compacted WAL after {appends} appends"),
                Err(e) => tracing::warn!("WAL compaction failed: {e}"),
            }
        }
    }
}
