//! Time-scale helpers.
//!
//! Detection epochs are carried as MJD in the TT scale. Catalogs usually report UTC, and Earth
//! rotation needs UT; the conversions below go through [`hifitime::Epoch`] so that leap seconds
//! are handled in one place.
use hifitime::{Epoch, TimeScale};
use std::str::FromStr;

use crate::constants::{DPI, MJD, SECONDS_PER_DAY, T2000};
use crate::link_errors::LinkError;

/// Parse an ISO 8601 date (`YYYY-MM-DDTHH:MM:SS[.fff]`, UTC unless a scale suffix is given)
/// into an MJD in the TT scale.
///
/// Arguments
/// -----------------
/// * `date`: the date string.
///
/// Return
/// ----------
/// * The MJD (TT) of the date, or [`LinkError::InvalidDate`] when hifitime cannot parse it.
pub fn iso_to_mjd_tt(date: &str) -> Result<MJD, LinkError> {
    Epoch::from_str(date)
        .map(|e| e.to_mjd_tt_days())
        .map_err(|e| LinkError::InvalidDate(format!("{date}: {e}")))
}

/// Transformation from date in the format YYYY MM DD.FFFFF UTC frame to modified julian date
/// (MJD) TT frame
///
/// This is the layout used by MPC 80-column records.
pub fn frac_date_to_mjd(date_str: &str) -> Result<MJD, LinkError> {
    let invalid = |what: &str| LinkError::InvalidDate(format!("{date_str}: {what}"));

    let parts: Vec<&str> = date_str.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(invalid("expected YYYY MM DD.FFFFF"));
    }

    let year = i32::from_str(parts[0]).map_err(|_| invalid("invalid year"))?;
    let month = u8::from_str(parts[1]).map_err(|_| invalid("invalid month"))?;
    let day_fraction = f64::from_str(parts[2]).map_err(|_| invalid("invalid day"))?;
    if !(1..=12).contains(&month) || !(1.0..32.0).contains(&day_fraction) {
        return Err(invalid("month or day out of range"));
    }

    let day = day_fraction.trunc() as u8;
    let midnight = Epoch::maybe_from_gregorian(year, month, day, 0, 0, 0, 0, TimeScale::UTC)
        .map_err(|e| invalid(&e.to_string()))?;

    // UTC day fraction; days containing a leap second are not special-cased
    Ok(midnight.to_mjd_tt_days() + day_fraction.fract())
}

/// MJD (TT) → MJD (UTC), used as a stand-in for UT1 when computing sidereal time.
///
/// |UT1 − UTC| stays below 0.9 s, well under what site parallax can resolve for linking.
pub fn mjd_tt_to_utc(mjd_tt: MJD) -> MJD {
    Epoch::from_mjd_in_time_scale(mjd_tt, TimeScale::TT).to_mjd_utc_days()
}

/// Convert a duration in hours into days.
#[inline]
pub fn hours(h: f64) -> f64 {
    h / 24.0
}

/// Convert a duration in seconds into days.
#[inline]
pub fn seconds(s: f64) -> f64 {
    s / SECONDS_PER_DAY
}

/// Compute the Greenwich Mean Sidereal Time (GMST) in radians
/// for a given Modified Julian Date (UT time scale).
///
/// IAU 1982 polynomial for GMST at 0h UT plus the rotation accumulated over the fraction of day.
///
/// Arguments
/// -----------------
/// * `tjm`: Modified Julian Date (UT).
///
/// Return
/// ----------
/// * GMST angle in radians, normalized to [0, 2π).
pub fn gmst(tjm: f64) -> f64 {
    const C0: f64 = 24110.54841;
    const C1: f64 = 8640184.812866;
    const C2: f64 = 9.3104e-2;
    const C3: f64 = -6.2e-6;

    // sidereal / solar day ratio
    const RAP: f64 = 1.00273790934;

    let t = (tjm.floor() - T2000) / 36525.0;
    let gmst0 = (((C3 * t + C2) * t + C1) * t + C0) * DPI / SECONDS_PER_DAY;

    (gmst0 + tjm.fract() * DPI * RAP).rem_euclid(DPI)
}
