//! # Constants and type definitions for heliolink
//!
//! This module centralizes the **physical constants**, **conversion factors**, and **common type
//! aliases** used throughout the linking pipeline.
//!
//! ## Overview
//!
//! - Astronomical and geophysical constants (AU, Gaussian gravitational constant, Earth radius)
//! - Unit conversions (degrees ↔ radians, arcseconds ↔ radians, km/s ↔ AU/day)
//! - Core type aliases used across the crate
//!
//! Internal units are fixed once and for all: **AU** for distances, **AU/day** for velocities,
//! **MJD (TT)** for epochs and **radians** for angles. Conversions happen at the edges
//! (configuration in km/s and arcseconds, for instance).

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// 2π, useful for trigonometric conversions
pub const DPI: f64 = 2. * std::f64::consts::PI;

/// Number of seconds in a Julian day
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Astronomical Unit in kilometers (IAU 2012)
pub const AU: f64 = 149_597_870.7;

/// MJD epoch of J2000.0 (2000-01-01 12:00:00 TT)
pub const T2000: f64 = 51544.5;

/// Degrees → radians
pub const RADEG: f64 = std::f64::consts::PI / 180.0;

/// Arcseconds → radians
pub const RADSEC: f64 = std::f64::consts::PI / 648000.0;

/// km/s → AU/day
pub const KM_S_TO_AU_DAY: f64 = SECONDS_PER_DAY / AU;

/// Earth equatorial radius in meters (GRS1980/WGS84)
pub const EARTH_MAJOR_AXIS: f64 = 6_378_137.0;

/// Earth polar radius in meters (GRS1980/WGS84)
pub const EARTH_MINOR_AXIS: f64 = 6_356_752.3;

/// Earth radius expressed in astronomical units
pub const ERAU: f64 = (EARTH_MAJOR_AXIS / 1000.) / AU;

/// Earth sidereal rotation rate in rad/day
pub const EARTH_ROTATION_RATE: f64 = DPI * 1.00273790934;

/// Gaussian gravitational constant k
pub const GAUSS_GRAV: f64 = 0.01720209895;

/// k² = GM☉ in AU³/day²
pub const GAUSS_GRAV_SQUARED: f64 = GAUSS_GRAV * GAUSS_GRAV;

/// Mean obliquity of the ecliptic at J2000 (radians)
pub const OBLIQUITY_J2000: f64 = 84381.448 * RADSEC;

/// MPC code of the geocenter
pub const GEOCENTER_CODE: &str = "500";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// Angle in degrees
pub type Degree = f64;
/// Angle in arcseconds
pub type ArcSec = f64;
/// Angle in radians
pub type Radian = f64;
/// Distance in astronomical units
pub type Au = f64;
/// Speed in kilometers per second
pub type KmPerSec = f64;
/// MPC code identifying an observatory (3 characters)
pub type MpcCode = String;
/// Modified Julian Date (days, TT scale unless stated otherwise)
pub type MJD = f64;
