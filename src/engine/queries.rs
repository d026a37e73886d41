use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::guard::{check_no_conflict, validate_stay};
use super::rating;
use super::{Engine, EngineError};

pub(super) fn info_from(rs: &PropertyState) -> PropertyInfo {
    PropertyInfo {
        id: rs.id,
        owner_id: rs.owner_id,
        status: rs.status,
        accommodation: rs.accommodation,
        price_cents: rs.price_cents,
        beds: rs.beds,
        bedrooms: rs.bedrooms,
        bathrooms: rs.bathrooms,
        guest_max: rs.guest_max,
        description: rs.description.clone(),
        rating: rs.rating.map(rating::rounded),
    }
}

impl Engine {
    /// Would a request for these dates pass the creation guard right now?
    /// Advisory only — the authoritative check runs again under the write
    /// lock when the request is made.
    pub async fn is_available(
        &self,
        property_id: Ulid,
        checkin: NaiveDate,
        checkout: NaiveDate,
    ) -> Result<bool, EngineError> {
        let stay = validate_stay(checkin, checkout)?;
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = rs.read().await;
        Ok(check_no_conflict(&guard, &stay).is_ok())
    }

    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let property_id = self
            .property_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = rs.read().await;
        guard.reservation(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// All reservations on a property, owner-only.
    pub async fn reservations_of_property(
        &self,
        property_id: Ulid,
        actor: Ulid,
    ) -> Result<Vec<Reservation>, EngineError> {
        let rs = self
            .get_property(&property_id)
            .ok_or(EngineError::NotFound(property_id))?;
        let guard = rs.read().await;
        if guard.owner_id != actor {
            return Err(EngineError::Unauthorized(actor));
        }
        Ok(guard.reservations.clone())
    }

    /// A guest's trips: active stays up next, finished ones behind them,
    /// requests still waiting, plus their wishlist. Canceled and refused
    /// requests don't show up here.
    pub async fn trips(&self, guest_id: Ulid) -> Trips {
        let mut trips = Trips {
            wishlist: self.wishlist(guest_id),
            ..Trips::default()
        };
        let properties: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        for rs in properties {
            let guard = rs.read().await;
            for r in &guard.reservations {
                if r.guest_id != guest_id {
                    continue;
                }
                match r.status {
                    ReservationStatus::Active => trips.upcoming.push(r.clone()),
                    ReservationStatus::Finished => trips.previous.push(r.clone()),
                    ReservationStatus::Pending => trips.pending.push(r.clone()),
                    ReservationStatus::Canceled | ReservationStatus::Refused => {}
                }
            }
        }
        trips
    }

    pub async fn list_properties(&self) -> Vec<PropertyInfo> {
        let properties: Vec<_> = self.state.iter().map(|e| e.value().clone()).collect();
        let mut infos = Vec::with_capacity(properties.len());
        for rs in properties {
            let guard = rs.read().await;
            infos.push(info_from(&guard));
        }
        infos
    }

    pub async fn property_info(&self, id: Ulid) -> Result<PropertyInfo, EngineError> {
        let rs = self.get_property(&id).ok_or(EngineError::NotFound(id))?;
        let guard = rs.read().await;
        Ok(info_from(&guard))
    }

    pub fn wishlist(&self, user_id: Ulid) -> Vec<Ulid> {
        self.wishlist_index
            .get(&user_id)
            .map(|e| e.value().clone())
            .unwrap_or_default()
    }
}
