//! # Observer & site geometry
//!
//! Detections carry the heliocentric state of the observer at the detection epoch. This
//! module provides the **observatory and time service** that produces those states:
//!
//! - [`ObserverEphemeris`] – the injected service:
//!   `(epoch, observatory code) → (position, velocity)` in the heliocentric equatorial J2000 frame.
//! - [`Observer`] – a ground site stored as **geocentric parallax coordinates** (ρ·cosφ, ρ·sinφ)
//!   with its precomputed body-fixed position and rotational velocity.
//! - [`Observatories`](crate::observers::observatories::Observatories) – registry of sites keyed
//!   by MPC code.
//! - [`EarthTable`](crate::observers::earth_table::EarthTable) – reference service built from
//!   tabulated heliocentric Earth states, interpolated with Lagrange polynomials, plus the
//!   site offset.
//!
//! ## Frames & conventions
//!
//! ```text
//! Body-fixed  --(GMST rotation about z)-->  Earth-equatorial ≈ Equatorial J2000
//! ```
//!
//! Precession and nutation are neglected for the site offset: they rotate a vector of
//! ~4·10⁻⁵ AU by well under a degree over decades, far below linking tolerances.
//!
//! ## Units
//!
//! - Longitudes: **degrees** (east positive), elevation: **meters**.
//! - Parallax coordinates: **Earth radii**.
//! - Positions: **AU**, velocities: **AU/day**.
//!
//! ## See also
//! ------------
//! * [`gmst`](crate::time::gmst) – Earth rotation angle.
//! * [`DetectionStore::from_observations`](crate::detections::DetectionStore::from_observations) –
//!   resolves observer states for raw astrometry through this service.

pub mod earth_table;
pub mod observatories;

use nalgebra::Vector3;
use ordered_float::NotNan;

use crate::constants::{
    Degree, EARTH_MAJOR_AXIS, EARTH_MINOR_AXIS, EARTH_ROTATION_RATE, ERAU, MJD,
};
use crate::link_errors::LinkError;
use crate::ref_system::rotmt;
use crate::time::{gmst, mjd_tt_to_utc};

/// Heliocentric observer states for (epoch, observatory) pairs.
///
/// Implementors must be deterministic: the same query always returns the same state.
/// The trait is `Sync` so that detection ingestion can be run from parallel iterators.
pub trait ObserverEphemeris: Sync {
    /// Heliocentric equatorial J2000 position (AU) and velocity (AU/day) of observatory `code`
    /// at `mjd_tt`.
    fn observer_state(
        &self,
        mjd_tt: MJD,
        code: &str,
    ) -> Result<(Vector3<f64>, Vector3<f64>), LinkError>;
}

/// A ground-based (or geocentric) observing site.
#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub struct Observer {
    /// Geodetic longitude in **degrees** east of Greenwich.
    pub longitude: NotNan<f64>,

    /// ρ·cosφ (geocentric latitude φ), in **Earth radii**.
    pub rho_cos_phi: NotNan<f64>,

    /// ρ·sinφ (geocentric latitude φ), in **Earth radii**.
    pub rho_sin_phi: NotNan<f64>,

    /// Optional human-readable site name.
    pub name: Option<String>,

    body_fixed_position: Vector3<NotNan<f64>>,
    body_fixed_velocity: Vector3<NotNan<f64>>,
}

impl Observer {
    /// Create a site from geodetic coordinates.
    ///
    /// Arguments
    /// -----------------
    /// * `longitude`: geodetic longitude in **degrees** (east positive).
    /// * `latitude`: geodetic latitude in **degrees**.
    /// * `elevation`: height above the reference ellipsoid in **meters**.
    /// * `name`: optional site name.
    ///
    /// Errors
    /// ----------
    /// * [`LinkError`] if any input is NaN.
    pub fn new(
        longitude: Degree,
        latitude: Degree,
        elevation: f64,
        name: Option<String>,
    ) -> Result<Observer, LinkError> {
        let (rho_cos_phi, rho_sin_phi) = geodetic_to_parallax(latitude, elevation);
        Observer::from_parallax(longitude, rho_cos_phi, rho_sin_phi, name)
    }

    /// Create a site directly from MPC parallax constants (ρ·cosφ, ρ·sinφ).
    pub fn from_parallax(
        longitude: Degree,
        rho_cos_phi: f64,
        rho_sin_phi: f64,
        name: Option<String>,
    ) -> Result<Observer, LinkError> {
        let lon = longitude.to_radians();
        let position = Vector3::new(
            ERAU * rho_cos_phi * lon.cos(),
            ERAU * rho_cos_phi * lon.sin(),
            ERAU * rho_sin_phi,
        );
        let velocity = Vector3::new(0.0, 0.0, EARTH_ROTATION_RATE).cross(&position);

        Ok(Observer {
            longitude: NotNan::new(longitude)?,
            rho_cos_phi: NotNan::new(rho_cos_phi)?,
            rho_sin_phi: NotNan::new(rho_sin_phi)?,
            name,
            body_fixed_position: to_notnan_vec(&position)?,
            body_fixed_velocity: to_notnan_vec(&velocity)?,
        })
    }

    /// The geocenter ("500"): zero offset.
    pub fn geocenter() -> Observer {
        let zero = Vector3::repeat(NotNan::default());
        Observer {
            longitude: NotNan::default(),
            rho_cos_phi: NotNan::default(),
            rho_sin_phi: NotNan::default(),
            name: Some("Geocentric".into()),
            body_fixed_position: zero,
            body_fixed_velocity: zero,
        }
    }

    /// Body-fixed position in AU.
    pub fn body_fixed_coord(&self) -> Vector3<f64> {
        self.body_fixed_position.map(|x| x.into_inner())
    }

    /// Geocentric position and velocity of the site at `mjd_tt`, equatorial J2000, AU and AU/day.
    ///
    /// The body-fixed vectors are rotated by GMST; sidereal time is evaluated on the UTC scale.
    pub fn geocentric_pv(&self, mjd_tt: MJD) -> (Vector3<f64>, Vector3<f64>) {
        let gst = gmst(mjd_tt_to_utc(mjd_tt));
        let rot = rotmt(-gst, 2);
        (
            rot * self.body_fixed_coord(),
            rot * self.body_fixed_velocity.map(|x| x.into_inner()),
        )
    }
}

fn to_notnan_vec(v: &Vector3<f64>) -> Result<Vector3<NotNan<f64>>, LinkError> {
    Ok(Vector3::new(
        NotNan::new(v.x)?,
        NotNan::new(v.y)?,
        NotNan::new(v.z)?,
    ))
}

/// Geodetic latitude (radians) and height (meters) to parallax coordinates (ρ·cosφ, ρ·sinφ),
/// accounting for Earth oblateness.
pub fn lat_alt_to_parallax(lat: f64, height: f64) -> (f64, f64) {
    let axis_ratio = EARTH_MINOR_AXIS / EARTH_MAJOR_AXIS;

    // parametric latitude
    let u = (lat.sin() * axis_ratio).atan2(lat.cos());

    let rho_sin_phi = axis_ratio * u.sin() + (height / EARTH_MAJOR_AXIS) * lat.sin();
    let rho_cos_phi = u.cos() + (height / EARTH_MAJOR_AXIS) * lat.cos();

    (rho_cos_phi, rho_sin_phi)
}

/// Same as [`lat_alt_to_parallax`] with the latitude in degrees.
pub fn geodetic_to_parallax(lat: Degree, height: f64) -> (f64, f64) {
    lat_alt_to_parallax(lat.to_radians(), height)
}
