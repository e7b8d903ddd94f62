//! Same-night pairing of detections.
//!
//! A single detection only constrains a line of sight. Two detections of the same object a
//! few tens of minutes apart also give its angular motion, which lets the projector build a
//! full heliocentric velocity for each distance hypothesis instead of assuming one.
//!
//! Every detection gets at most one partner: the detection closest in time that
//!
//! * lies within `[tracklet_min_dt, tracklet_max_dt]` days,
//! * implies an angular rate within `[tracklet_min_rate, tracklet_max_rate]` deg/day,
//! * comes from the same observatory when both codes are known.
//!
//! Ties are broken by smaller angular separation, then lower detection index. Pairing is not
//! required to be symmetric.
use rayon::prelude::*;

use super::DetectionStore;
use crate::params::LinkParams;
use crate::ref_system::angular_separation;

/// Tracklet partner of every detection (by index), `None` when no admissible partner exists.
pub fn pair_detections(store: &DetectionStore, params: &LinkParams) -> Vec<Option<usize>> {
    let dets = store.detections();

    // detection indices by ascending epoch, ties by index
    let mut order: Vec<usize> = (0..dets.len()).collect();
    order.sort_by(|&a, &b| dets[a].epoch.total_cmp(&dets[b].epoch).then(a.cmp(&b)));
    let epochs: Vec<f64> = order.iter().map(|&i| dets[i].epoch).collect();

    let min_dt = params.tracklet_min_dt;
    let max_dt = params.tracklet_max_dt;

    (0..dets.len())
        .into_par_iter()
        .map(|i| {
            let di = &dets[i];
            let lo = epochs.partition_point(|&t| t < di.epoch - max_dt);
            let hi = epochs.partition_point(|&t| t <= di.epoch + max_dt);

            order[lo..hi]
                .iter()
                .filter(|&&j| j != i)
                .filter_map(|&j| {
                    let dj = &dets[j];
                    let dt = (dj.epoch - di.epoch).abs();
                    if dt < min_dt || dt > max_dt {
                        return None;
                    }
                    if let (Some(a), Some(b)) = (&di.observatory, &dj.observatory) {
                        if a != b {
                            return None;
                        }
                    }
                    let sep = angular_separation(di.ra, di.dec, dj.ra, dj.dec);
                    let rate = sep.to_degrees() / dt;
                    if rate < params.tracklet_min_rate || rate > params.tracklet_max_rate {
                        return None;
                    }
                    Some((dt, sep, j))
                })
                .min_by(|a, b| {
                    a.0.total_cmp(&b.0)
                        .then(a.1.total_cmp(&b.1))
                        .then(a.2.cmp(&b.2))
                })
                .map(|(_, _, j)| j)
        })
        .collect()
}

#[cfg(test)]
mod tracklets_test {
    use super::*;
    use crate::constants::RADEG;
    use crate::detections::Detection;
    use crate::time::hours;
    use nalgebra::Vector3;

    fn det(id: &str, epoch: f64, ra_deg: f64, code: &str) -> Detection {
        Detection::new(id, epoch, Vector3::x(), ra_deg * RADEG, 0.0, 0.1).with_observatory(code)
    }

    fn params() -> LinkParams {
        LinkParams::builder()
            .tracklet_min_dt(hours(0.25))
            .tracklet_max_dt(hours(2.0))
            .tracklet_max_rate(1.5)
            .build()
            .unwrap()
    }

    #[test]
    fn nearest_in_time_partner() {
        let t0 = 60000.0;
        let store = DetectionStore::new(vec![
            det("a", t0, 10.0, "F51"),
            det("b", t0 + hours(1.0), 10.01, "F51"),
            det("c", t0 + hours(1.5), 10.015, "F51"),
            // too fast: 3° in 1 h
            det("d", t0 + hours(1.0), 13.0, "F51"),
            // other site
            det("e", t0 + hours(0.5), 10.005, "G96"),
            // too close in time
            det("f", t0 + hours(0.1), 10.001, "F51"),
        ])
        .unwrap();

        let pairs = pair_detections(&store, &params());
        assert_eq!(pairs[0], Some(1));
        assert_eq!(pairs[1], Some(2));
        assert_eq!(pairs[2], Some(1));
        assert_eq!(pairs[3], None);
        assert_eq!(pairs[4], None);
        assert_eq!(pairs[5], Some(1));
    }

    #[test]
    fn equal_time_tie_uses_separation() {
        let t0 = 60000.0;
        let store = DetectionStore::new(vec![
            // 0.0625 d steps keep both intervals exactly equal
            det("mid", t0 + 0.0625, 10.0, "F51"),
            det("early", t0, 10.02, "F51"),
            det("late", t0 + 0.125, 10.01, "F51"),
        ])
        .unwrap();
        let pairs = pair_detections(&store, &params());
        assert_eq!(pairs[0], Some(2));
    }

    #[test]
    fn empty_store() {
        let store = DetectionStore::new(vec![]).unwrap();
        assert!(pair_detections(&store, &params()).is_empty());
    }
}
