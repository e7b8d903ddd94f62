//! Synthetic sky shared by the integration tests.
//!
//! Circular heliocentric orbits for the Earth (ecliptic, 1 AU) and for a test asteroid,
//! geocentric observer, no light time. Angles and states in the equatorial J2000 frame the
//! crate works in.
#![allow(dead_code)]

use std::f64::consts::PI;

use heliolink::constants::{GAUSS_GRAV_SQUARED, RADEG, RADSEC};
use heliolink::hypothesis::HypothesisGridConfig;
use heliolink::ref_system::{cartesian_to_radec, ecliptic_to_equatorial};
use heliolink::time::hours;
use heliolink::{Detection, DetectionStore, LinkParams};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

pub const T0: f64 = 60200.0;

/// Circular orbit of radius `a` (AU) with inclination `inclination` (rad) on the ecliptic
/// and phase `phase0` (rad) at `T0`.
#[derive(Debug, Clone, Copy)]
pub struct CircularOrbit {
    pub a: f64,
    pub inclination: f64,
    pub phase0: f64,
}

impl CircularOrbit {
    pub fn earth() -> Self {
        CircularOrbit {
            a: 1.0,
            inclination: 0.0,
            phase0: 0.3,
        }
    }

    /// Asteroid near opposition at `T0`.
    pub fn asteroid(a: f64, inclination: f64) -> Self {
        CircularOrbit {
            a,
            inclination,
            phase0: Self::earth().phase0 + 0.02,
        }
    }

    /// Heliocentric equatorial state at `t` (MJD).
    pub fn state(&self, t: f64) -> (Vector3<f64>, Vector3<f64>) {
        let n = (GAUSS_GRAV_SQUARED / self.a.powi(3)).sqrt();
        let phi = self.phase0 + n * (t - T0);
        let (si, ci) = self.inclination.sin_cos();
        let p = self.a * Vector3::new(phi.cos(), phi.sin() * ci, phi.sin() * si);
        let v = self.a * n * Vector3::new(-phi.sin(), phi.cos() * ci, phi.cos() * si);
        (ecliptic_to_equatorial(&p), ecliptic_to_equatorial(&v))
    }

    /// Geocentric detection of this body at `t`.
    pub fn observe(&self, id: &str, t: f64) -> Detection {
        let (earth_p, earth_v) = CircularOrbit::earth().state(t);
        let (p, _) = self.state(t);
        let (ra, dec, _) = cartesian_to_radec(&(p - earth_p));
        Detection::new(id, t, earth_p, ra, dec, 0.1)
            .with_observer_velocity(earth_v)
            .with_observatory("500")
    }
}

/// Geocentric detection in direction `(ra, dec)` (radians) at `t`.
pub fn field_detection(id: &str, t: f64, ra: f64, dec: f64) -> Detection {
    let (earth_p, earth_v) = CircularOrbit::earth().state(t);
    Detection::new(id, t, earth_p, ra, dec, 0.1)
        .with_observer_velocity(earth_v)
        .with_observatory("500")
}

/// Three detections of a circular 2.5 AU asteroid one hour apart, with 0.1″ astrometric
/// noise, plus ten isolated field detections. Returns the detections and the asteroid ids.
pub fn scenario(seed: u64) -> (Vec<Detection>, Vec<String>) {
    let asteroid = CircularOrbit::asteroid(2.5, 5.0 * RADEG);
    let true_ids: Vec<String> = (0..3).map(|k| format!("ast-{k}")).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 0.1 * RADSEC).unwrap();
    let mut detections: Vec<Detection> = true_ids
        .iter()
        .enumerate()
        .map(|(k, id)| {
            let mut d = asteroid.observe(id, T0 + hours(k as f64));
            d.dec += noise.sample(&mut rng);
            d.ra += noise.sample(&mut rng) / d.dec.cos();
            d
        })
        .collect();

    // field detections on a 6° grid around the track, never within 3° of it or of each other
    let centre = &detections[1];
    let (ra0, dec0) = (centre.ra, centre.dec);
    let jitter = Normal::new(0.0, 0.2 * RADEG).unwrap();
    for k in 0..10 {
        let dra = (-12.0 + 6.0 * (k % 5) as f64) * RADEG;
        let ddec = (if k < 5 { -5.0 } else { 5.0 }) * RADEG;
        let ra = (ra0 + dra / dec0.cos() + jitter.sample(&mut rng)).rem_euclid(2.0 * PI);
        let dec = dec0 + ddec + jitter.sample(&mut rng);
        let t = T0 + hours(0.2 * k as f64);
        detections.push(field_detection(&format!("field-{k}"), t, ra, dec));
    }
    (detections, true_ids)
}

pub fn scenario_store(seed: u64) -> (DetectionStore, Vec<String>) {
    let (detections, ids) = scenario(seed);
    (DetectionStore::new(detections).unwrap(), ids)
}

/// 1–4 AU every 0.1 AU, −5..5 km/s every 1 km/s.
pub fn scenario_grid() -> HypothesisGridConfig {
    HypothesisGridConfig::from_ranges((1.0, 4.0, 0.1), (-5.0, 5.0, 1.0))
}

pub fn scenario_params() -> LinkParams {
    LinkParams::builder().grid(scenario_grid()).build().unwrap()
}
