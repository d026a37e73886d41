use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Closed calendar-date range `[checkin, checkout]`.
///
/// Both endpoints are occupied days: a stay checking out on June 10 still
/// holds the property on June 10, so another stay checking in that day
/// conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub checkin: NaiveDate,
    pub checkout: NaiveDate,
}

impl StayRange {
    pub fn new(checkin: NaiveDate, checkout: NaiveDate) -> Self {
        debug_assert!(checkin < checkout, "checkin must be before checkout");
        Self { checkin, checkout }
    }

    pub fn nights(&self) -> i64 {
        (self.checkout - self.checkin).num_days()
    }

    /// Two closed ranges overlap iff each starts no later than the other ends.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.checkin <= other.checkout && other.checkin <= self.checkout
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        self.checkin <= day && day <= self.checkout
    }
}

/// Listing visibility, controlled by the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyStatus {
    Active,
    Pending,
    Inactive,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Accommodation {
    WholeHouse,
    WholeBedroom,
    SharedBedroom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Active,
    Finished,
    Canceled,
    Refused,
}

impl ReservationStatus {
    /// Pending and active reservations hold their dates against new requests.
    pub fn blocks_dates(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Finished | ReservationStatus::Canceled | ReservationStatus::Refused
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Active => "active",
            ReservationStatus::Finished => "finished",
            ReservationStatus::Canceled => "canceled",
            ReservationStatus::Refused => "refused",
        }
    }
}

/// Where the property is. Feeds the external search index; the engine only
/// stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub country: String,
    pub state: String,
    pub city: String,
    pub neighborhood: String,
}

/// What the property offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facility {
    pub wifi: bool,
    pub washing_machine: bool,
    pub clothes_iron: bool,
    pub towels: bool,
    pub air_conditioning: bool,
    pub refrigerator: bool,
    pub heater: bool,
}

/// One-time rating + comment a guest leaves on a stay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Whole stars, 0 to 5.
    pub rating: u8,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub property_id: Ulid,
    pub guest_id: Ulid,
    pub stay: StayRange,
    pub status: ReservationStatus,
    pub evaluation: Option<Evaluation>,
}

/// The listing payload an owner submits. Address and facility are mandatory
/// sub-records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySpec {
    pub status: PropertyStatus,
    pub accommodation: Accommodation,
    pub price_cents: i64,
    pub beds: u32,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub guest_max: u32,
    pub description: String,
    pub address: Address,
    pub facility: Facility,
}

/// Owner-editable fields; `None` leaves the field untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PropertyPatch {
    pub status: Option<PropertyStatus>,
    pub price_cents: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PropertyState {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub status: PropertyStatus,
    pub accommodation: Accommodation,
    pub price_cents: i64,
    pub beds: u32,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub guest_max: u32,
    pub description: String,
    pub address: Address,
    pub facility: Facility,
    /// Mean of evaluation ratings. Derived from the reservations below,
    /// never set directly. `None` until the first evaluation.
    pub rating: Option<f64>,
    /// All reservations ever made, sorted by `stay.checkin`.
    pub reservations: Vec<Reservation>,
    pub wishlisted_by: HashSet<Ulid>,
}

impl PropertyState {
    pub fn new(id: Ulid, owner_id: Ulid, spec: PropertySpec) -> Self {
        Self {
            id,
            owner_id,
            status: spec.status,
            accommodation: spec.accommodation,
            price_cents: spec.price_cents,
            beds: spec.beds,
            bedrooms: spec.bedrooms,
            bathrooms: spec.bathrooms,
            guest_max: spec.guest_max,
            description: spec.description,
            address: spec.address,
            facility: spec.facility,
            rating: None,
            reservations: Vec::new(),
            wishlisted_by: HashSet::new(),
        }
    }

    /// Insert maintaining sort order by checkin date.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.stay.checkin, |r| r.stay.checkin)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn reservation(&self, id: &Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == *id)
    }

    pub fn reservation_mut(&mut self, id: &Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == *id)
    }

    /// Pending/active reservations whose stay touches the query range.
    /// Binary search skips reservations checking in after the query ends.
    pub fn blocking_overlapping(&self, stay: &StayRange) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound checks in after query.checkout
        // and cannot touch a closed range ending there.
        let right_bound = self
            .reservations
            .partition_point(|r| r.stay.checkin <= stay.checkout);
        let stay = *stay;
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.status.blocks_dates() && r.stay.overlaps(&stay))
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    PropertyListed {
        id: Ulid,
        owner_id: Ulid,
        spec: PropertySpec,
    },
    PropertyUpdated {
        id: Ulid,
        patch: PropertyPatch,
    },
    PropertyDelisted {
        id: Ulid,
    },
    ReservationRequested {
        id: Ulid,
        property_id: Ulid,
        guest_id: Ulid,
        stay: StayRange,
    },
    ReservationAccepted {
        id: Ulid,
        property_id: Ulid,
    },
    ReservationRefused {
        id: Ulid,
        property_id: Ulid,
    },
    ReservationCanceled {
        id: Ulid,
        property_id: Ulid,
    },
    ReservationFinished {
        id: Ulid,
        property_id: Ulid,
    },
    ReservationEvaluated {
        id: Ulid,
        property_id: Ulid,
        rating: u8,
        comment: String,
    },
    WishlistAdded {
        property_id: Ulid,
        user_id: Ulid,
    },
    WishlistRemoved {
        property_id: Ulid,
        user_id: Ulid,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub status: PropertyStatus,
    pub accommodation: Accommodation,
    pub price_cents: i64,
    pub beds: u32,
    pub bedrooms: u32,
    pub bathrooms: u32,
    pub guest_max: u32,
    pub description: String,
    /// Aggregate rating rounded to whole stars for display.
    pub rating: Option<u8>,
}

/// A guest's reservations bucketed the way the trips screen shows them,
/// plus their wishlist. Canceled and refused requests are omitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trips {
    pub upcoming: Vec<Reservation>,
    pub previous: Vec<Reservation>,
    pub pending: Vec<Reservation>,
    pub wishlist: Vec<Ulid>,
}
