mod error;
mod guard;
mod mutations;
mod queries;
pub mod rating;

pub use error::EngineError;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{self, Mailer};
use crate::wal::Wal;

pub type SharedPropertyState = Arc<RwLock<PropertyState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());

    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &[(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The reservation lifecycle engine: all listed properties, their
/// reservations, the WAL that makes them durable, and the mailer that
/// carries post-commit notifications.
pub struct Engine {
    pub state: DashMap<Ulid, SharedPropertyState>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub mailer: Arc<Mailer>,
    /// Reverse lookup: reservation id → property id.
    pub(super) reservation_index: DashMap<Ulid, Ulid>,
    /// User → wishlisted property ids.
    pub(super) wishlist_index: DashMap<Ulid, Vec<Ulid>>,
}

/// Apply an event directly to a PropertyState (no locking — caller holds
/// the lock). Rating recomputation happens here, under that same lock, so
/// concurrent evaluations can never aggregate a stale reservation set.
fn apply_to_property(rs: &mut PropertyState, event: &Event, reservation_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::ReservationRequested {
            id,
            property_id,
            guest_id,
            stay,
        } => {
            rs.insert_reservation(Reservation {
                id: *id,
                property_id: *property_id,
                guest_id: *guest_id,
                stay: *stay,
                status: ReservationStatus::Pending,
                evaluation: None,
            });
            reservation_index.insert(*id, *property_id);
        }
        Event::ReservationAccepted { id, .. } => {
            if let Some(r) = rs.reservation_mut(id) {
                r.status = ReservationStatus::Active;
            }
        }
        Event::ReservationRefused { id, .. } => {
            if let Some(r) = rs.reservation_mut(id) {
                r.status = ReservationStatus::Refused;
            }
        }
        Event::ReservationCanceled { id, .. } => {
            if let Some(r) = rs.reservation_mut(id) {
                r.status = ReservationStatus::Canceled;
            }
        }
        Event::ReservationFinished { id, .. } => {
            if let Some(r) = rs.reservation_mut(id) {
                r.status = ReservationStatus::Finished;
            }
        }
        Event::ReservationEvaluated {
            id,
            rating,
            comment,
            ..
        } => {
            if let Some(r) = rs.reservation_mut(id) {
                r.evaluation = Some(Evaluation {
                    rating: *rating,
                    comment: comment.clone(),
                });
            }
            rs.rating = rating::aggregate(&rs.reservations);
        }
        Event::PropertyUpdated { patch, .. } => {
            if let Some(status) = patch.status {
                rs.status = status;
            }
            if let Some(price_cents) = patch.price_cents {
                rs.price_cents = price_cents;
            }
            if let Some(ref description) = patch.description {
                rs.description = description.clone();
            }
        }
        Event::WishlistAdded { user_id, .. } => {
            rs.wishlisted_by.insert(*user_id);
        }
        Event::WishlistRemoved { user_id, .. } => {
            rs.wishlisted_by.remove(user_id);
        }
        // Listed/Delisted are handled at the DashMap level, not here
        Event::PropertyListed { .. } | Event::PropertyDelisted { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf, mailer: Arc<Mailer>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            state: DashMap::new(),
            wal_tx,
            mailer,
            reservation_index: DashMap::new(),
            wishlist_index: DashMap::new(),
        };

        // Replay events — we're the sole owner of these Arcs, so try_read/try_write
        // always succeed instantly (no contention). Never use blocking_read/blocking_write
        // here because this may run inside an async context.
        for event in &events {
            match event {
                Event::PropertyListed { id, owner_id, spec } => {
                    let rs = PropertyState::new(*id, *owner_id, spec.clone());
                    engine.state.insert(*id, Arc::new(RwLock::new(rs)));
                }
                Event::PropertyDelisted { id } => {
                    if let Some(entry) = engine.state.get(id) {
                        let rs = entry.try_read().expect("replay: uncontended read");
                        engine.drop_property_indexes(&rs);
                    }
                    engine.state.remove(id);
                }
                Event::WishlistAdded { property_id, user_id } => {
                    if let Some(entry) = engine.state.get(property_id) {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_property(&mut guard, event, &engine.reservation_index);
                        engine
                            .wishlist_index
                            .entry(*user_id)
                            .or_default()
                            .push(*property_id);
                    }
                }
                Event::WishlistRemoved { property_id, user_id } => {
                    if let Some(entry) = engine.state.get(property_id) {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_property(&mut guard, event, &engine.reservation_index);
                        if let Some(mut wished) = engine.wishlist_index.get_mut(user_id) {
                            wished.retain(|p| p != property_id);
                        }
                    }
                }
                other => {
                    if let Some(property_id) = event_property_id(other)
                        && let Some(entry) = engine.state.get(&property_id)
                    {
                        let rs_arc = entry.clone();
                        let mut guard = rs_arc.try_write().expect("replay: uncontended write");
                        apply_to_property(&mut guard, other, &engine.reservation_index);
                    }
                }
            }
        }
        metrics::gauge!(crate::observability::PROPERTIES_LISTED).set(engine.state.len() as f64);

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub fn get_property(&self, id: &Ulid) -> Option<SharedPropertyState> {
        self.state.get(id).map(|e| e.value().clone())
    }

    pub fn property_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_index.get(reservation_id).map(|e| *e.value())
    }

    /// WAL-append + apply + queue mail in one call. Mail is derived from the
    /// committed event and enqueued only after the append and apply succeed.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut PropertyState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_property(rs, event, &self.reservation_index);
        if let Some(mail) = notify::mail_for_event(rs, event) {
            self.mailer.send(mail);
        }
        Ok(())
    }

    /// Lookup reservation → property, get property, acquire write lock.
    pub(super) async fn resolve_reservation_write(
        &self,
        reservation_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<PropertyState>), EngineError> {
        let property_id = self
            .property_for_reservation(reservation_id)
            .ok_or(EngineError::NotFound(*reservation_id))?;
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = rs.write_owned().await;
        Ok((property_id, guard))
    }

    /// Remove every index entry pointing at this property. Called with the
    /// property already read-locked, right before it leaves the map.
    fn drop_property_indexes(&self, rs: &PropertyState) {
        for r in &rs.reservations {
            self.reservation_index.remove(&r.id);
        }
        for user_id in &rs.wishlisted_by {
            if let Some(mut wished) = self.wishlist_index.get_mut(user_id) {
                wished.retain(|p| p != &rs.id);
            }
        }
    }
}

/// Extract the property id from an event (for per-property events).
fn event_property_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::ReservationRequested { property_id, .. }
        | Event::ReservationAccepted { property_id, .. }
        | Event::ReservationRefused { property_id, .. }
        | Event::ReservationCanceled { property_id, .. }
        | Event::ReservationFinished { property_id, .. }
        | Event::ReservationEvaluated { property_id, .. }
        | Event::WishlistAdded { property_id, .. }
        | Event::WishlistRemoved { property_id, .. } => Some(*property_id),
        Event::PropertyUpdated { id, .. } => Some(*id),
        Event::PropertyListed { .. } | Event::PropertyDelisted { .. } => None,
    }
}
