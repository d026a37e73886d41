use chrono::{Datelike, NaiveDate};

use crate::limits::*;
use crate::model::{PropertyState, StayRange};

use super::EngineError;

/// Validate a requested stay and build the range. Strict ordering, a
/// bounded calendar window, and a bounded length.
pub(crate) fn validate_stay(
    checkin: NaiveDate,
    checkout: NaiveDate,
) -> Result<StayRange, EngineError> {
    if checkin >= checkout {
        return Err(EngineError::Validation("checkin must be before checkout"));
    }
    if checkin.year() < MIN_VALID_YEAR || checkout.year() > MAX_VALID_YEAR {
        return Err(EngineError::Validation("stay outside supported date window"));
    }
    let stay = StayRange::new(checkin, checkout);
    if stay.nights() > MAX_STAY_NIGHTS {
        return Err(EngineError::LimitExceeded("stay too long"));
    }
    Ok(stay)
}

/// Creation guard: a stay may be booked only if no pending/active
/// reservation on the property touches it. Closed ranges — sharing a
/// calendar day is a conflict.
pub(crate) fn check_no_conflict(rs: &PropertyState, stay: &StayRange) -> Result<(), EngineError> {
    if let Some(existing) = rs.blocking_overlapping(stay).next() {
        return Err(EngineError::Conflict(existing.id));
    }
    Ok(())
}
