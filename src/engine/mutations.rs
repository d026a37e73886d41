use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::{RwLock, oneshot};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::guard::{check_no_conflict, validate_stay};
use super::{Engine, EngineError, WalCommand};

fn validate_listing(spec: &PropertySpec) -> Result<(), EngineError> {
    if spec.description.is_empty() {
        return Err(EngineError::Validation("description must not be empty"));
    }
    if spec.description.len() > MAX_DESCRIPTION_LEN {
        return Err(EngineError::LimitExceeded("description too long"));
    }
    if spec.guest_max == 0 {
        return Err(EngineError::Validation("guest capacity must be at least 1"));
    }
    if spec.price_cents < 0 {
        return Err(EngineError::Validation("price must not be negative"));
    }
    Ok(())
}

impl Engine {
    // ── Property lifecycle ───────────────────────────────────

    pub async fn list_property(
        &self,
        owner_id: Ulid,
        spec: PropertySpec,
    ) -> Result<PropertyInfo, EngineError> {
        validate_listing(&spec)?;
        if self.state.len() >= MAX_PROPERTIES {
            return Err(EngineError::LimitExceeded("too many properties"));
        }

        let id = Ulid::new();
        let event = Event::PropertyListed {
            id,
            owner_id,
            spec: spec.clone(),
        };
        self.wal_append(&event).await?;
        let rs = PropertyState::new(id, owner_id, spec);
        let info = super::queries::info_from(&rs);
        self.state.insert(id, Arc::new(RwLock::new(rs)));
        metrics::gauge!(observability::PROPERTIES_LISTED).set(self.state.len() as f64);
        Ok(info)
    }

    pub async fn update_property(
        &self,
        id: Ulid,
        actor: Ulid,
        patch: PropertyPatch,
    ) -> Result<PropertyInfo, EngineError> {
        if let Some(ref description) = patch.description {
            if description.is_empty() {
                return Err(EngineError::Validation("description must not be empty"));
            }
            if description.len() > MAX_DESCRIPTION_LEN {
                return Err(EngineError::LimitExceeded("description too long"));
            }
        }
        let rs = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = rs.write().await;
        if guard.owner_id != actor {
            return Err(EngineError::Unauthorized(actor));
        }

        let event = Event::PropertyUpdated { id, patch };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(super::queries::info_from(&guard))
    }

    /// Delist a property. Refused while any reservation still holds dates —
    /// the owner must refuse or wait out pending/active stays first.
    pub async fn delist_property(&self, id: Ulid, actor: Ulid) -> Result<(), EngineError> {
        let rs = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        if guard.owner_id != actor {
            return Err(EngineError::Unauthorized(actor));
        }
        if guard.reservations.iter().any(|r| r.status.blocks_dates()) {
            return Err(EngineError::HasActiveReservations(id));
        }
        drop(guard);

        let event = Event::PropertyDelisted { id };
        self.wal_append(&event).await?;
        if let Some((_, rs_arc)) = self.state.remove(&id) {
            let guard = rs_arc.read().await;
            self.drop_property_indexes(&guard);
        }
        metrics::gauge!(observability::PROPERTIES_LISTED).set(self.state.len() as f64);
        Ok(())
    }

    // ── Reservation lifecycle ────────────────────────────────

    /// Creation guard and insert happen under the property's write lock, so
    /// two concurrent requests for overlapping stays cannot both pass.
    pub async fn request_reservation(
        &self,
        property_id: Ulid,
        guest_id: Ulid,
        checkin: NaiveDate,
        checkout: NaiveDate,
    ) -> Result<Reservation, EngineError> {
        let stay = validate_stay(checkin, checkout)?;
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = rs.write().await;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_PROPERTY {
            return Err(EngineError::LimitExceeded("too many reservations on property"));
        }

        if let Err(e) = check_no_conflict(&guard, &stay) {
            metrics::counter!(observability::RESERVATION_CONFLICTS_TOTAL).increment(1);
            return Err(e);
        }

        let id = Ulid::new();
        let event = Event::ReservationRequested {
            id,
            property_id,
            guest_id,
            stay,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::RESERVATION_REQUESTS_TOTAL).increment(1);

        Ok(Reservation {
            id,
            property_id,
            guest_id,
            stay,
            status: ReservationStatus::Pending,
            evaluation: None,
        })
    }

    /// Owner accepts a pending request. Accepting an already-active
    /// reservation is an idempotent no-op: no event, no mail.
    pub async fn accept_reservation(
        &self,
        id: Ulid,
        actor: Ulid,
    ) -> Result<Reservation, EngineError> {
        let (property_id, mut guard) = self.resolve_reservation_write(&id).await?;
        if guard.owner_id != actor {
            return Err(EngineError::Unauthorized(actor));
        }
        let status = guard.reservation(&id).ok_or(EngineError::NotFound(id))?.status;
        match status {
            ReservationStatus::Pending => {
                let event = Event::ReservationAccepted { id, property_id };
                self.persist_and_apply(&mut guard, &event).await?;
                metrics::counter!(
                    observability::RESERVATION_TRANSITIONS_TOTAL,
                    "action" => "accept"
                )
                .increment(1);
            }
            ReservationStatus::Active => {}
            from => return Err(EngineError::InvalidTransition { from, action: "accept" }),
        }
        guard.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Owner refuses a pending request. Refusing an already-refused
    /// reservation is an idempotent no-op.
    pub async fn refuse_reservation(
        &self,
        id: Ulid,
        actor: Ulid,
    ) -> Result<Reservation, EngineError> {
        let (property_id, mut guard) = self.resolve_reservation_write(&id).await?;
        if guard.owner_id != actor {
            return Err(EngineError::Unauthorized(actor));
        }
        let status = guard.reservation(&id).ok_or(EngineError::NotFound(id))?.status;
        match status {
            ReservationStatus::Pending => {
                let event = Event::ReservationRefused { id, property_id };
                self.persist_and_apply(&mut guard, &event).await?;
                metrics::counter!(
                    observability::RESERVATION_TRANSITIONS_TOTAL,
                    "action" => "refuse"
                )
                .increment(1);
            }
            ReservationStatus::Refused => {}
            from => return Err(EngineError::InvalidTransition { from, action: "refuse" }),
        }
        guard.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Guest cancels their own pending or active reservation. Canceling an
    /// already-canceled reservation is an idempotent no-op.
    pub async fn cancel_reservation(
        &self,
        id: Ulid,
        actor: Ulid,
    ) -> Result<Reservation, EngineError> {
        let (property_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.reservation(&id).ok_or(EngineError::NotFound(id))?;
        if reservation.guest_id != actor {
            return Err(EngineError::Unauthorized(actor));
        }
        match reservation.status {
            ReservationStatus::Pending | ReservationStatus::Active => {
                let event = Event::ReservationCanceled { id, property_id };
                self.persist_and_apply(&mut guard, &event).await?;
                metrics::counter!(
                    observability::RESERVATION_TRANSITIONS_TOTAL,
                    "action" => "cancel"
                )
                .increment(1);
            }
            ReservationStatus::Canceled => {}
            from => return Err(EngineError::InvalidTransition { from, action: "cancel" }),
        }
        guard.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Move an active stay past its checkout to finished. Driven by the
    /// background finisher, not by either party, so no actor and no mail.
    pub async fn finish_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let (property_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let status = guard.reservation(&id).ok_or(EngineError::NotFound(id))?.status;
        match status {
            ReservationStatus::Active => {
                let event = Event::ReservationFinished { id, property_id };
                self.persist_and_apply(&mut guard, &event).await?;
                metrics::counter!(observability::RESERVATIONS_FINISHED_TOTAL).increment(1);
            }
            ReservationStatus::Finished => {}
            from => return Err(EngineError::InvalidTransition { from, action: "finish" }),
        }
        guard.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Guest leaves the one-time rating + comment on a stay they inhabited.
    /// Recomputes the property aggregate under the same lock.
    pub async fn evaluate_reservation(
        &self,
        id: Ulid,
        actor: Ulid,
        rating: u8,
        comment: String,
    ) -> Result<Reservation, EngineError> {
        let (property_id, mut guard) = self.resolve_reservation_write(&id).await?;
        let reservation = guard.reservation(&id).ok_or(EngineError::NotFound(id))?;
        if reservation.guest_id != actor {
            return Err(EngineError::Unauthorized(actor));
        }
        match reservation.status {
            ReservationStatus::Active | ReservationStatus::Finished => {}
            from => return Err(EngineError::InvalidTransition { from, action: "evaluate" }),
        }
        if reservation.evaluation.is_some() {
            return Err(EngineError::AlreadyEvaluated(id));
        }
        if rating > MAX_RATING {
            return Err(EngineError::Validation("rating must be between 0 and 5"));
        }
        if comment.is_empty() {
            return Err(EngineError::Validation("comment must not be empty"));
        }
        if comment.len() > MAX_COMMENT_LEN {
            return Err(EngineError::LimitExceeded("comment too long"));
        }

        let event = Event::ReservationEvaluated {
            id,
            property_id,
            rating,
            comment,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(observability::EVALUATIONS_TOTAL).increment(1);
        guard.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    // ── Wishlist ─────────────────────────────────────────────

    /// Find-or-create semantics: adding a property already on the wishlist
    /// succeeds without writing anything.
    pub async fn add_to_wishlist(&self, property_id: Ulid, user_id: Ulid) -> Result<(), EngineError> {
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = rs.write().await;
        if guard.wishlisted_by.contains(&user_id) {
            return Ok(());
        }

        let event = Event::WishlistAdded { property_id, user_id };
        self.persist_and_apply(&mut guard, &event).await?;
        self.wishlist_index.entry(user_id).or_default().push(property_id);
        Ok(())
    }

    /// Removing a property that isn't wishlisted is a no-op.
    pub async fn remove_from_wishlist(
        &self,
        property_id: Ulid,
        user_id: Ulid,
    ) -> Result<(), EngineError> {
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let mut guard = rs.write().await;
        if !guard.wishlisted_by.contains(&user_id) {
            return Ok(());
        }

        let event = Event::WishlistRemoved { property_id, user_id };
        self.persist_and_apply(&mut guard, &event).await?;
        if let Some(mut wished) = self.wishlist_index.get_mut(&user_id) {
            wished.retain(|p| p != &property_id);
        }
        Ok(())
    }

    // ── Housekeeping ─────────────────────────────────────────

    /// Active reservations whose stay ended before `today`, ready for the
    /// finisher. Returns (reservation_id, property_id) pairs.
    pub fn collect_due_checkouts(&self, today: NaiveDate) -> Vec<(Ulid, Ulid)> {
        let mut due = Vec::new();
        for entry in self.state.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read() {
                for r in &guard.reservations {
                    if r.status == ReservationStatus::Active && r.stay.checkout < today {
                        due.push((r.id, guard.id));
                    }
                }
            }
        }
        due
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();

        let property_ids: Vec<Ulid> = self.state.iter().map(|e| *e.key()).collect();
        for id in property_ids {
            let entry = match self.state.get(&id) {
                Some(e) => e,
                None => continue,
            };
            let rs = entry.value().clone();
            let guard = rs.try_read().expect("compact: uncontended read");

            events.push(Event::PropertyListed {
                id: guard.id,
                owner_id: guard.owner_id,
                spec: PropertySpec {
                    status: guard.status,
                    accommodation: guard.accommodation,
                    price_cents: guard.price_cents,
                    beds: guard.beds,
                    bedrooms: guard.bedrooms,
                    bathrooms: guard.bathrooms,
                    guest_max: guard.guest_max,
                    description: guard.description.clone(),
                    address: guard.address.clone(),
                    facility: guard.facility,
                },
            });

            for r in &guard.reservations {
                events.push(Event::ReservationRequested {
                    id: r.id,
                    property_id: guard.id,
                    guest_id: r.guest_id,
                    stay: r.stay,
                });
                let status_event = match r.status {
                    ReservationStatus::Pending => None,
                    ReservationStatus::Active => Some(Event::ReservationAccepted {
                        id: r.id,
                        property_id: guard.id,
                    }),
                    ReservationStatus::Refused => Some(Event::ReservationRefused {
                        id: r.id,
                        property_id: guard.id,
                    }),
                    ReservationStatus::Canceled => Some(Event::ReservationCanceled {
                        id: r.id,
                        property_id: guard.id,
                    }),
                    ReservationStatus::Finished => Some(Event::ReservationFinished {
                        id: r.id,
                        property_id: guard.id,
                    }),
                };
                events.extend(status_event);
                if let Some(evaluation) = &r.evaluation {
                    events.push(Event::ReservationEvaluated {
                        id: r.id,
                        property_id: guard.id,
                        rating: evaluation.rating,
                        comment: evaluation.comment.clone(),
                    });
                }
            }

            for user_id in &guard.wishlisted_by {
                events.push(Event::WishlistAdded {
                    property_id: guard.id,
                    user_id: *user_id,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::Wal("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::Wal("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::Wal(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
