use std::time::Duration;

use crate::protocol::frame::PositionFix;

/// mean earth radius, meters
const EARTH_RADIUS: f64 = 6_371_008.8;

/// Stateful gate deciding which fixes are worth forwarding: a fix passes when
/// enough time has elapsed since the last forwarded fix, or when it has moved
/// far enough from it. The very first fix always passes.
///
/// The reference point moves on every positive decision, regardless of what
/// happens to the send afterwards - a timed-out send still counts, there is
/// no re-forwarding of stale fixes.
pub struct PositionFilter {
    deadline_secs: f64,
    min_distance: f64,
    last_forwarded: Option<(f64, (f64, f64))>,
}

impl PositionFilter {
    pub fn new(deadline: Duration, min_distance: f64) -> PositionFilter {
        PositionFilter {
            deadline_secs: deadline.as_secs_f64(),
            min_distance,
            last_forwarded: None,
        }
    }

    pub fn admit(&mut self, fix: &PositionFix) -> bool {
        let location = (fix.latitude, fix.longitude);
        let forward = match self.last_forwarded {
            None => true,
            Some((timestamp, last_location)) => {
                fix.timestamp - timestamp >= self.deadline_secs
                    || earth_distance(last_location, location) >= self.min_distance
            }
        };
        if forward {
            self.last_forwarded = Some((fix.timestamp, location));
        }
        forward
    }
}

/// Great-circle distance in meters between two (latitude, longitude) pairs,
/// by the haversine formula.
fn earth_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat_a, lon_a) = (a.0.to_radians(), a.1.to_radians());
    let (lat_b, lon_b) = (b.0.to_radians(), b.1.to_radians());

    let h = ((lat_b - lat_a) / 2.0).sin().powi(2)
        + lat_a.cos() * lat_b.cos() * ((lon_b - lon_a) / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn fix_at(timestamp: f64, latitude: f64, longitude: f64) -> PositionFix {
        PositionFix {
            timestamp,
            latitude,
            longitude,
            speed: 0.0,
            course: 0.0,
            altitude: 0.0,
            satellites_used: 5,
            hdop: 1.0,
        }
    }

    #[test]
    fn test_first_fix_always_passes() {
        let mut filter = PositionFilter::new(Duration::from_secs(60), 100.0);
        assert!(filter.admit(&fix_at(1000.0, 48.0, 11.0)));
    }

    #[test]
    fn test_stationary_fixes_pass_on_the_deadline() {
        let deadline = 60.0;
        let mut filter = PositionFilter::new(Duration::from_secs(60), 100.0);

        assert!(filter.admit(&fix_at(1000.0, 48.0, 11.0)));
        assert!(!filter.admit(&fix_at(1000.0 + deadline / 2.0, 48.0, 11.0)));
        assert!(filter.admit(&fix_at(1000.0 + deadline, 48.0, 11.0)));
    }

    #[test]
    fn test_displaced_fix_passes_immediately() {
        let mut filter = PositionFilter::new(Duration::from_secs(60), 100.0);

        assert!(filter.admit(&fix_at(1000.0, 48.0, 11.0)));
        // ~0.002 degrees of latitude is roughly 220m
        assert!(filter.admit(&fix_at(1000.1, 48.002, 11.0)));
    }

    #[test]
    fn test_reference_moves_on_forward() {
        let mut filter = PositionFilter::new(Duration::from_secs(60), 100.0);

        assert!(filter.admit(&fix_at(1000.0, 48.0, 11.0)));
        assert!(filter.admit(&fix_at(1000.1, 48.002, 11.0)));
        // close to the *new* reference point, so filtered out again
        assert!(!filter.admit(&fix_at(1000.2, 48.002, 11.0)));
    }

    #[rstest]
    #[case::same_point((48.0, 11.0), (48.0, 11.0), 0.0, 0.1)]
    #[case::one_degree_latitude((0.0, 0.0), (1.0, 0.0), 111_195.0, 100.0)]
    #[case::equator_longitude((0.0, 10.0), (0.0, 11.0), 111_195.0, 100.0)]
    #[case::antipodal((0.0, 0.0), (0.0, 180.0), 20_015_114.0, 20_000.0)]
    fn test_earth_distance(#[case] a: (f64, f64), #[case] b: (f64, f64), #[case] expected: f64, #[case] tolerance: f64) {
        assert!((earth_distance(a, b) - expected).abs() < tolerance);
    }
}
