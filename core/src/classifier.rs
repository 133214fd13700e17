//! New-place classification against stored adventures.

use crate::geo::{distance_meters, Coordinate};
use crate::models::Adventure;

/// True when `fix` lies farther than `radius_m` from every adventure.
///
/// Linear in the number of adventures; stops at the first one in range.
pub fn is_new_place<'a, I>(fix: Coordinate, adventures: I, radius_m: f64) -> bool
where
    I: IntoIterator<Item = &'a Adventure>,
{
    !adventures
        .into_iter()
        .any(|adventure| distance_meters(fix, adventure.coordinate()) <= radius_m)
}

/// The closest adventure to `fix`, with its distance in meters.
pub fn nearest<'a, I>(fix: Coordinate, adventures: I) -> Option<(&'a Adventure, f64)>
where
    I: IntoIterator<Item = &'a Adventure>,
{
    adventures
        .into_iter()
        .map(|adventure| (adventure, distance_meters(fix, adventure.coordinate())))
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
}
