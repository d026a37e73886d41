use crate::model::Reservation;

/// Arithmetic mean of evaluation ratings across a property's reservations.
/// `None` while nothing has been evaluated.
pub fn aggregate(reservations: &[Reservation]) -> Option<f64> {
    let mut sum = 0u32;
    let mut count = 0u32;
    for r in reservations {
        if let Some(evaluation) = &r.evaluation {
            sum += u32::from(evaluation.rating);
            count += 1;
        }
    }
    (count > 0).then(|| f64::from(sum) / f64::from(count))
}

/// Display rounding: half-up to whole stars (means are never negative).
pub fn rounded(mean: f64) -> u8 {
    mean.round() as u8
}
