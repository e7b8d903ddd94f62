//! # Detection store
//!
//! The in-memory catalog of astrometric detections to link. A [`Detection`] is immutable once
//! ingested; the [`DetectionStore`] owns all of them, assigns each a dense index (its position
//! in input order) and resolves external identifiers to indices.
//!
//! ## Ingestion paths
//!
//! * [`DetectionStore::new`] – detections that already carry their observer state
//!   (e.g. produced by an upstream survey pipeline).
//! * [`DetectionStore::from_observations`] – raw astrometry (`epoch`, `RA`, `DEC`, observatory
//!   code) resolved through an [`ObserverEphemeris`].
//!
//! Both validate every record and reject duplicated identifiers, so downstream stages can
//! rely on finite angles, positive uncertainties and unique ids.
//!
//! ## Epoch helpers
//!
//! [`distinct_epochs`] and [`night_counts`] implement the two notions of "how many times was
//! this object seen" used by the clustering and scoring stages.
//!
//! ## See also
//! ------------
//! * [`tracklets`] – same-night pairing used to estimate angular motion.
//! * [`ObserverEphemeris`] – observatory and time service.

pub mod tracklets;

use std::collections::HashMap;

use ahash::RandomState;
use itertools::Itertools;
use nalgebra::Vector3;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::constants::{ArcSec, MpcCode, Radian, DPI, MJD, RADSEC};
use crate::link_errors::LinkError;
use crate::observers::ObserverEphemeris;
use crate::ref_system::unit_vector;

/// One astrometric measurement with the heliocentric state of its observer.
///
/// Angles in radians (equatorial J2000), epoch in MJD TT, observer state in AU and AU/day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub id: String,
    pub epoch: MJD,
    pub observer_position: Vector3<f64>,
    pub observer_velocity: Vector3<f64>,
    pub ra: Radian,
    pub dec: Radian,
    /// 1-σ astrometric uncertainty in arcseconds.
    pub astrometric_sigma: ArcSec,
    pub magnitude: Option<f64>,
    pub observatory: Option<MpcCode>,
}

impl Detection {
    pub fn new(
        id: impl Into<String>,
        epoch: MJD,
        observer_position: Vector3<f64>,
        ra: Radian,
        dec: Radian,
        astrometric_sigma: ArcSec,
    ) -> Self {
        Detection {
            id: id.into(),
            epoch,
            observer_position,
            observer_velocity: Vector3::zeros(),
            ra,
            dec,
            astrometric_sigma,
            magnitude: None,
            observatory: None,
        }
    }

    pub fn with_observer_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.observer_velocity = velocity;
        self
    }

    pub fn with_magnitude(mut self, magnitude: f64) -> Self {
        self.magnitude = Some(magnitude);
        self
    }

    pub fn with_observatory(mut self, code: impl Into<MpcCode>) -> Self {
        self.observatory = Some(code.into());
        self
    }

    /// Unit line of sight from the observer.
    #[inline]
    pub fn line_of_sight(&self) -> Vector3<f64> {
        unit_vector(self.ra, self.dec)
    }

    /// Astrometric uncertainty in radians.
    #[inline]
    pub fn sigma_radians(&self) -> Radian {
        self.astrometric_sigma * RADSEC
    }

    fn validate(&self) -> Result<(), LinkError> {
        let invalid = |reason: &str| LinkError::InvalidDetection {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if self.id.is_empty() {
            return Err(invalid("empty identifier"));
        }
        if !self.epoch.is_finite() {
            return Err(invalid("non-finite epoch"));
        }
        if !self.ra.is_finite() {
            return Err(invalid("non-finite right ascension"));
        }
        if !(self.dec.abs() <= std::f64::consts::FRAC_PI_2) {
            return Err(invalid("declination outside [-π/2, π/2]"));
        }
        if !(self.astrometric_sigma > 0.0 && self.astrometric_sigma.is_finite()) {
            return Err(invalid("astrometric uncertainty must be positive"));
        }
        if !self.observer_position.iter().all(|x| x.is_finite())
            || !self.observer_velocity.iter().all(|x| x.is_finite())
        {
            return Err(invalid("non-finite observer state"));
        }
        if self.observer_position.norm() == 0.0 {
            return Err(invalid("observer placed at the Sun"));
        }
        Ok(())
    }
}

/// Raw astrometry before observer resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstrometricObservation {
    pub id: String,
    pub epoch: MJD,
    pub ra: Radian,
    pub dec: Radian,
    pub astrometric_sigma: ArcSec,
    pub magnitude: Option<f64>,
    pub observatory: MpcCode,
}

#[derive(Debug, Clone, Default)]
pub struct DetectionStore {
    detections: Vec<Detection>,
    index: HashMap<String, usize, RandomState>,
}

impl DetectionStore {
    /// Validate and index `detections`. Right ascensions are normalized to [0, 2π).
    ///
    /// Errors
    /// ----------
    /// * [`LinkError::InvalidDetection`] for the first malformed record.
    /// * [`LinkError::DuplicateDetectionId`] if two records share an id.
    pub fn new(detections: Vec<Detection>) -> Result<Self, LinkError> {
        let mut index = HashMap::with_capacity_and_hasher(detections.len(), RandomState::new());
        let mut detections = detections;

        for (i, det) in detections.iter_mut().enumerate() {
            det.validate()?;
            det.ra = det.ra.rem_euclid(DPI);
            if index.insert(det.id.clone(), i).is_some() {
                return Err(LinkError::DuplicateDetectionId(det.id.clone()));
            }
        }

        tracing::debug!(n_detections = detections.len(), "detection store built");
        Ok(DetectionStore { detections, index })
    }

    /// Resolve observer states for raw astrometry and build the store.
    ///
    /// Observer lookups run in parallel; the store keeps the input order.
    pub fn from_observations<E: ObserverEphemeris>(
        observations: &[AstrometricObservation],
        ephemeris: &E,
    ) -> Result<Self, LinkError> {
        let detections = observations
            .par_iter()
            .map(|obs| {
                let (position, velocity) =
                    ephemeris.observer_state(obs.epoch, &obs.observatory)?;
                Ok(Detection {
                    id: obs.id.clone(),
                    epoch: obs.epoch,
                    observer_position: position,
                    observer_velocity: velocity,
                    ra: obs.ra,
                    dec: obs.dec,
                    astrometric_sigma: obs.astrometric_sigma,
                    magnitude: obs.magnitude,
                    observatory: Some(obs.observatory.clone()),
                })
            })
            .collect::<Result<Vec<_>, LinkError>>()?;
        Self::new(detections)
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Detection> {
        self.detections.get(index)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> {
        self.detections.iter()
    }

    /// All epochs, sorted ascending.
    pub fn sorted_epochs(&self) -> Vec<MJD> {
        self.detections
            .iter()
            .map(|d| d.epoch)
            .sorted_by(f64::total_cmp)
            .collect()
    }

    /// Earliest and latest epoch, `None` for an empty store.
    pub fn epoch_span(&self) -> Option<(MJD, MJD)> {
        self.detections
            .iter()
            .map(|d| d.epoch)
            .minmax_by(f64::total_cmp)
            .into_option()
    }
}

/// Number of distinct epochs in an ascending list, epochs closer than `tolerance` days
/// counting once.
pub fn distinct_epochs(sorted_epochs: &[MJD], tolerance: f64) -> usize {
    if sorted_epochs.is_empty() {
        return 0;
    }
    1 + sorted_epochs
        .iter()
        .tuple_windows()
        .filter(|(a, b)| *b - *a > tolerance)
        .count()
}

/// Detections per night for an ascending list of epochs. A gap larger than `night_gap` days
/// starts a new night.
pub fn night_counts(sorted_epochs: &[MJD], night_gap: f64) -> SmallVec<[usize; 4]> {
    let mut counts = SmallVec::new();
    let Some(first) = sorted_epochs.first() else {
        return counts;
    };
    let mut current = 1;
    let mut last = *first;
    for &t in &sorted_epochs[1..] {
        if t - last > night_gap {
            counts.push(current);
            current = 0;
        }
        current += 1;
        last = t;
    }
    counts.push(current);
    counts
}

#[cfg(test)]
mod detections_test {
    use super::*;
    use crate::observers::earth_table::EarthTable;

    fn det(id: &str, epoch: f64) -> Detection {
        Detection::new(id, epoch, Vector3::new(1.0, 0.0, 0.0), 0.5, 0.1, 0.1)
    }

    #[test]
    fn store_indexes_ids() {
        let store = DetectionStore::new(vec![det("a", 1.0), det("b", 0.5)]).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.index_of("b"), Some(1));
        assert_eq!(store.index_of("zz"), None);
        assert_eq!(store.sorted_epochs(), vec![0.5, 1.0]);
        assert_eq!(store.epoch_span(), Some((0.5, 1.0)));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = DetectionStore::new(vec![det("a", 1.0), det("a", 2.0)]).unwrap_err();
        assert_eq!(err, LinkError::DuplicateDetectionId("a".into()));
    }

    #[test]
    fn invalid_records_rejected() {
        let mut bad = det("x", 1.0);
        bad.dec = 2.0;
        assert!(matches!(
            DetectionStore::new(vec![bad]),
            Err(LinkError::InvalidDetection { .. })
        ));

        let mut bad = det("y", 1.0);
        bad.astrometric_sigma = 0.0;
        assert!(DetectionStore::new(vec![bad]).is_err());

        let mut bad = det("z", f64::NAN);
        bad.ra = 1.0;
        assert!(DetectionStore::new(vec![bad]).is_err());
    }

    #[test]
    fn ra_is_normalized() {
        let mut d = det("a", 1.0);
        d.ra = -0.5;
        let store = DetectionStore::new(vec![d]).unwrap();
        assert!((store.get(0).unwrap().ra - (DPI - 0.5)).abs() < 1e-15);
    }

    #[test]
    fn empty_store() {
        let store = DetectionStore::new(vec![]).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.epoch_span(), None);
    }

    #[test]
    fn from_observations_resolves_observer() {
        let table = EarthTable::sample(60000.0, 60010.0, 1.0, |_| {
            (Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 0.0172, 0.0))
        })
        .unwrap();
        let obs = vec![AstrometricObservation {
            id: "o1".into(),
            epoch: 60001.5,
            ra: 1.0,
            dec: 0.2,
            astrometric_sigma: 0.2,
            magnitude: Some(21.0),
            observatory: "500".into(),
        }];
        let store = DetectionStore::from_observations(&obs, &table).unwrap();
        let d = store.get(0).unwrap();
        assert_eq!(d.observer_position, Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(d.observatory.as_deref(), Some("500"));

        let mut unknown = obs.clone();
        unknown[0].observatory = "ZZZ".into();
        assert_eq!(
            DetectionStore::from_observations(&unknown, &table).unwrap_err(),
            LinkError::UnknownObservatory("ZZZ".into())
        );
    }

    #[test]
    fn epoch_counting() {
        let epochs = [1.0, 1.0 + 1e-7, 1.04, 1.08, 2.0, 2.01, 5.0];
        assert_eq!(distinct_epochs(&epochs, 1e-5), 6);
        assert_eq!(night_counts(&epochs, 0.5).as_slice(), &[4, 2, 1]);
        assert_eq!(distinct_epochs(&[], 1e-5), 0);
        assert!(night_counts(&[], 0.5).is_empty());
    }
}
