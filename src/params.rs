//! # Linking run parameters
//!
//! [`LinkParams`] gathers every knob of a linking run: hypothesis grid, projection,
//! propagation, clustering, scoring and resource limits. Build it with
//! [`LinkParams::builder`]; [`LinkParamsBuilder::build`] validates all values so a bad
//! configuration is reported before any state vector is computed.
//!
//! Units
//! -----------------
//! * Distances in AU, times in days, angular rates in deg/day.
//! * `max_v_inf` in km/s, `position_radius` in AU, `velocity_radius` in AU/day.
//!
//! See also
//! -----------------
//! * [`HelioLinker`](crate::linker::HelioLinker) – consumes these parameters.
use std::cmp::Ordering::{Equal, Greater, Less};
use std::fmt;
use std::mem::size_of;

use serde::{Deserialize, Serialize};

use crate::clustering::{ClusterSettings, ClusterSpace, LinkagePolicy, RadiusScaling};
use crate::constants::{Au, KmPerSec, AU, KM_S_TO_AU_DAY, MJD, SECONDS_PER_DAY};
use crate::detections::DetectionStore;
use crate::hypothesis::{Hypothesis, HypothesisGridConfig};
use crate::link_errors::LinkError;
use crate::projection::{ProjectionSettings, TangentialModel, VelocitySource};
use crate::propagation::{PropagationModel, PropagationSettings};
use crate::scoring::{DedupPolicy, ScoringSettings};

/// How the common reference epoch of a run is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum ReferenceEpoch {
    /// Median detection epoch (lower median for an even count).
    #[default]
    Median,
    /// Earliest detection epoch.
    First,
    /// Middle of the observed time span.
    Midpoint,
    /// Explicit epoch, MJD TT.
    Fixed(MJD),
}

impl ReferenceEpoch {
    /// Resolve against the detections of a run. `None` for an empty store.
    pub fn resolve(&self, store: &DetectionStore) -> Option<MJD> {
        if store.is_empty() {
            return None;
        }
        match *self {
            ReferenceEpoch::Fixed(t) => Some(t),
            ReferenceEpoch::First => store.epoch_span().map(|(lo, _)| lo),
            ReferenceEpoch::Midpoint => store.epoch_span().map(|(lo, hi)| 0.5 * (lo + hi)),
            ReferenceEpoch::Median => {
                let epochs = store.sorted_epochs();
                epochs.get((epochs.len() - 1) / 2).copied()
            }
        }
    }
}

/// Configuration parameters of a linking run.
///
/// Defaults
/// -----------------
/// * grid: 1.5–4.0 AU every 0.1 AU, radial velocity 0 km/s, no acceleration
/// * tracklets: 0.01–0.0625 d (~15 min–1.5 h), 0–1.5 deg/day
/// * `min_topocentric_distance`: 0.1 AU
/// * propagation: two-body, 60 d horizon, `max_v_inf` 0 km/s, 0.05 AU minimum radius
/// * clustering: position + velocity, single linkage, 1e5 km and 1e-3 AU/day
/// * thresholds: 3 members, 3 epochs (1 s tolerance), 1 night (0.5 d gap), no minimum
///   timespan
/// * no distance scaling of the clustering radii
/// * scoring: weights 1/1/0/2, `min_score` 0, no `max_rms`, keep-best deduplication at 50 %
///   overlap
/// * `memory_budget_bytes`: 4 GiB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkParams {
    // --- Hypotheses / projection ---
    pub grid: HypothesisGridConfig,
    pub reference_epoch: ReferenceEpoch,
    pub velocity_source: VelocitySource,
    pub tangential_model: TangentialModel,
    /// Minimum topocentric distance of a projected state (AU).
    pub min_topocentric_distance: Au,
    pub tracklet_min_dt: f64,
    pub tracklet_max_dt: f64,
    pub tracklet_min_rate: f64,
    pub tracklet_max_rate: f64,

    // --- Propagation ---
    pub propagation_model: PropagationModel,
    /// Maximum `|Δt|` between a detection and the reference epoch (days).
    pub validity_horizon: f64,
    /// Maximum hyperbolic excess speed (km/s).
    pub max_v_inf: KmPerSec,
    pub min_heliocentric_radius: Au,

    // --- Clustering ---
    pub cluster_space: ClusterSpace,
    pub linkage: LinkagePolicy,
    pub position_radius: Au,
    pub velocity_radius: f64,
    /// States per parallel query task.
    pub shard_size: usize,
    /// Number of X slabs of the spatial index.
    pub partitions: usize,
    pub min_members: usize,
    pub min_epochs: usize,
    pub min_nights: usize,
    /// Shortest accepted arc (days).
    pub min_timespan: f64,
    pub epoch_tolerance: f64,
    pub night_gap: f64,
    /// Radii growing with topocentric distance, `None` for fixed radii.
    pub radius_scaling: Option<RadiusScaling>,

    // --- Scoring ---
    pub member_weight: f64,
    pub night_weight: f64,
    pub time_weight: f64,
    pub scatter_weight: f64,
    pub per_night_product: bool,
    pub min_score: f64,
    /// Largest accepted position RMS of a cluster (AU).
    pub max_rms: Option<Au>,
    pub dedup: DedupPolicy,
    pub overlap_fraction: f64,

    // --- Resources ---
    /// Upper bound on the state table size.
    pub memory_budget_bytes: usize,
}

impl LinkParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent, validating builder starting from the defaults.
    ///
    /// ```rust,no_run
    /// use heliolink::params::LinkParams;
    /// use heliolink::hypothesis::HypothesisGridConfig;
    ///
    /// let params = LinkParams::builder()
    ///     .grid(HypothesisGridConfig::from_ranges((1.0, 4.0, 0.1), (-5.0, 5.0, 1.0)))
    ///     .position_radius(1e-3)
    ///     .min_members(4)
    ///     .build()
    ///     .unwrap();
    /// ```
    pub fn builder() -> LinkParamsBuilder {
        LinkParamsBuilder::new()
    }

    /// Check every value.
    ///
    /// Errors
    /// ----------
    /// * One of the configuration [`LinkError`] variants naming the offending parameter.
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.memory_budget_bytes == 0 {
            return Err(LinkError::InvalidRunParameter(
                "memory_budget_bytes must be > 0".into(),
            ));
        }
        let n_hypotheses = self.grid.size()?;
        let grid_bytes = n_hypotheses.saturating_mul(size_of::<Hypothesis>());
        if grid_bytes > self.memory_budget_bytes {
            return Err(LinkError::InvalidHypothesisGrid(format!(
                "{n_hypotheses} hypotheses need {grid_bytes} bytes, over the {} byte budget",
                self.memory_budget_bytes
            )));
        }
        let proj = |msg: &str| Err(LinkError::InvalidProjectionParameter(msg.into()));
        let prop = |msg: &str| Err(LinkError::InvalidPropagationParameter(msg.into()));
        let clus = |msg: &str| Err(LinkError::InvalidClusteringParameter(msg.into()));
        let scor = |msg: &str| Err(LinkError::InvalidScoringParameter(msg.into()));

        // --- projection ---
        if !ge0(self.min_topocentric_distance) {
            return proj("min_topocentric_distance must be >= 0");
        }
        if !(ge0(self.tracklet_min_dt) && le(self.tracklet_min_dt, self.tracklet_max_dt)) {
            return proj("require 0 <= tracklet_min_dt <= tracklet_max_dt");
        }
        if !(ge0(self.tracklet_min_rate) && le(self.tracklet_min_rate, self.tracklet_max_rate)) {
            return proj("require 0 <= tracklet_min_rate <= tracklet_max_rate");
        }
        if let ReferenceEpoch::Fixed(t) = self.reference_epoch {
            if !t.is_finite() {
                return Err(LinkError::InvalidRunParameter(
                    "fixed reference epoch must be finite".into(),
                ));
            }
        }

        // --- propagation ---
        if !gt0(self.validity_horizon) {
            return prop("validity_horizon must be > 0");
        }
        if !ge0(self.max_v_inf) {
            return prop("max_v_inf must be >= 0");
        }
        if !ge0(self.min_heliocentric_radius) {
            return prop("min_heliocentric_radius must be >= 0");
        }

        // --- clustering ---
        if !(gt0(self.position_radius) && self.position_radius.is_finite()) {
            return clus("position_radius must be > 0 and finite");
        }
        if !(gt0(self.velocity_radius) && self.velocity_radius.is_finite()) {
            return clus("velocity_radius must be > 0 and finite");
        }
        if self.shard_size == 0 || self.partitions == 0 {
            return clus("shard_size and partitions must be >= 1");
        }
        if self.min_members < 2 {
            return clus("min_members must be >= 2");
        }
        if self.min_epochs == 0 || self.min_nights == 0 {
            return clus("min_epochs and min_nights must be >= 1");
        }
        if !ge0(self.epoch_tolerance) || !gt0(self.night_gap) {
            return clus("require epoch_tolerance >= 0 and night_gap > 0");
        }
        if !(ge0(self.min_timespan) && self.min_timespan.is_finite()) {
            return clus("min_timespan must be >= 0 and finite");
        }
        if let Some(scaling) = self.radius_scaling {
            let finite = [
                scaling.change_distance,
                scaling.min_distance,
                scaling.max_distance,
                scaling.bin_ratio,
            ]
            .into_iter()
            .all(f64::is_finite);
            if !(finite && gt0(scaling.change_distance) && gt0(scaling.min_distance)) {
                return clus("radius scaling distances must be > 0 and finite");
            }
            if !(scaling.max_distance > scaling.min_distance && scaling.bin_ratio > 1.0) {
                return clus("radius scaling needs max_distance > min_distance and bin_ratio > 1");
            }
            if scaling.bin_count().is_none() {
                return clus("radius scaling gives too many distance bins");
            }
        }

        // --- scoring ---
        if ![
            self.member_weight,
            self.night_weight,
            self.time_weight,
            self.scatter_weight,
        ]
        .into_iter()
        .all(|w| ge0(w) && w.is_finite())
        {
            return scor("score weights must be finite and >= 0");
        }
        if !self.min_score.is_finite() {
            return scor("min_score must be finite");
        }
        if let Some(max_rms) = self.max_rms {
            if !(gt0(max_rms) && max_rms.is_finite()) {
                return scor("max_rms must be > 0 and finite");
            }
        }
        if !(ge0(self.overlap_fraction) && le(self.overlap_fraction, 1.0)) {
            return scor("overlap_fraction must lie in [0, 1]");
        }

        Ok(())
    }

    pub fn projection_settings(&self, reference_epoch: MJD) -> ProjectionSettings {
        ProjectionSettings {
            reference_epoch,
            min_topocentric_distance: self.min_topocentric_distance,
            velocity_source: self.velocity_source,
            tangential_model: self.tangential_model,
        }
    }

    pub fn propagation_settings(&self) -> PropagationSettings {
        PropagationSettings {
            validity_horizon: self.validity_horizon,
            max_v_inf: self.max_v_inf * KM_S_TO_AU_DAY,
            min_heliocentric_radius: self.min_heliocentric_radius,
        }
    }

    pub fn cluster_settings(&self) -> ClusterSettings {
        ClusterSettings {
            space: self.cluster_space,
            linkage: self.linkage,
            position_radius: self.position_radius,
            velocity_radius: self.velocity_radius,
            shard_size: self.shard_size,
            partitions: self.partitions,
            min_members: self.min_members,
            min_epochs: self.min_epochs,
            min_nights: self.min_nights,
            min_timespan: self.min_timespan,
            epoch_tolerance: self.epoch_tolerance,
            night_gap: self.night_gap,
            radius_scaling: self.radius_scaling,
        }
    }

    pub fn scoring_settings(&self) -> ScoringSettings {
        ScoringSettings {
            member_weight: self.member_weight,
            night_weight: self.night_weight,
            time_weight: self.time_weight,
            scatter_weight: self.scatter_weight,
            per_night_product: self.per_night_product,
            min_score: self.min_score,
            max_rms: self.max_rms,
            dedup: self.dedup,
            overlap_fraction: self.overlap_fraction,
        }
    }
}

impl Default for LinkParams {
    fn default() -> Self {
        LinkParams {
            grid: HypothesisGridConfig::default(),
            reference_epoch: ReferenceEpoch::Median,
            velocity_source: VelocitySource::Tracklet,
            tangential_model: TangentialModel::Zero,
            min_topocentric_distance: 0.1,
            tracklet_min_dt: 0.01,
            tracklet_max_dt: 0.0625,
            tracklet_min_rate: 0.0,
            tracklet_max_rate: 1.5,

            propagation_model: PropagationModel::TwoBody,
            validity_horizon: 60.0,
            max_v_inf: 0.0,
            min_heliocentric_radius: 0.05,

            cluster_space: ClusterSpace::PositionVelocity,
            linkage: LinkagePolicy::Single,
            position_radius: 1.0e5 / AU,
            velocity_radius: 1.0e-3,
            shard_size: 4096,
            partitions: 1,
            min_members: 3,
            min_epochs: 3,
            min_nights: 1,
            min_timespan: 0.0,
            epoch_tolerance: 1.0 / SECONDS_PER_DAY,
            night_gap: 0.5,
            radius_scaling: None,

            member_weight: 1.0,
            night_weight: 1.0,
            time_weight: 0.0,
            scatter_weight: 2.0,
            per_night_product: false,
            min_score: 0.0,
            max_rms: None,
            dedup: DedupPolicy::KeepBest,
            overlap_fraction: 0.5,

            memory_budget_bytes: 4 << 30,
        }
    }
}

// ---- Numeric helpers for PartialOrd (NaN is invalid) ----

#[inline]
fn gt0(x: f64) -> bool {
    x.partial_cmp(&0.0) == Some(Greater)
}

#[inline]
fn ge0(x: f64) -> bool {
    matches!(x.partial_cmp(&0.0), Some(Greater) | Some(Equal))
}

#[inline]
fn le(a: f64, b: f64) -> bool {
    matches!(a.partial_cmp(&b), Some(Less) | Some(Equal))
}

/// Builder for [`LinkParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct LinkParamsBuilder {
    params: LinkParams,
}

macro_rules! setters {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(mut self, v: $ty) -> Self {
                self.params.$name = v;
                self
            }
        )*
    };
}

impl LinkParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: LinkParams::default(),
        }
    }

    setters! {
        grid: HypothesisGridConfig,
        reference_epoch: ReferenceEpoch,
        velocity_source: VelocitySource,
        tangential_model: TangentialModel,
        min_topocentric_distance: Au,
        tracklet_min_dt: f64,
        tracklet_max_dt: f64,
        tracklet_min_rate: f64,
        tracklet_max_rate: f64,
    }

    setters! {
        propagation_model: PropagationModel,
        validity_horizon: f64,
        max_v_inf: KmPerSec,
        min_heliocentric_radius: Au,
    }

    setters! {
        cluster_space: ClusterSpace,
        linkage: LinkagePolicy,
        position_radius: Au,
        velocity_radius: f64,
        shard_size: usize,
        partitions: usize,
        min_members: usize,
        min_epochs: usize,
        min_nights: usize,
        min_timespan: f64,
        epoch_tolerance: f64,
        night_gap: f64,
        radius_scaling: Option<RadiusScaling>,
    }

    setters! {
        member_weight: f64,
        night_weight: f64,
        time_weight: f64,
        scatter_weight: f64,
        per_night_product: bool,
        min_score: f64,
        max_rms: Option<Au>,
        dedup: DedupPolicy,
        overlap_fraction: f64,
        memory_budget_bytes: usize,
    }

    /// Position tolerance given in kilometers.
    pub fn position_radius_km(mut self, km: f64) -> Self {
        self.params.position_radius = km / AU;
        self
    }

    /// Finalize and validate.
    ///
    /// Errors
    /// ----------
    /// * [`LinkError::InvalidHypothesisGrid`] for a malformed grid.
    /// * `InvalidProjectionParameter`, `InvalidPropagationParameter`,
    ///   `InvalidClusteringParameter`, `InvalidScoringParameter` or `InvalidRunParameter`
    ///   for an out-of-range value of the corresponding stage.
    pub fn build(self) -> Result<LinkParams, LinkError> {
        self.params.validate()?;
        Ok(self.params)
    }
}

impl fmt::Display for LinkParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 46;
            writeln!(f, "Heliocentric Linking Parameters")?;
            writeln!(f, "-------------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Hypotheses / projection]")?;
            line!("grid                     = {:?}", self.grid.distance, "Distance grid (AU)")?;
            line!(
                "radial_velocity          = {:?}",
                self.grid.radial_velocity,
                "Radial velocities (km/s)"
            )?;
            line!("reference_epoch          = {:?}", self.reference_epoch, "Common epoch")?;
            line!("velocity_source          = {:?}", self.velocity_source, "State velocity")?;
            line!(
                "tangential_model         = {:?}",
                self.tangential_model,
                "Fallback tangential velocity"
            )?;
            line!(
                "min_topocentric_distance = {:.3} AU",
                self.min_topocentric_distance,
                "Closest accepted projection"
            )?;
            line!(
                "tracklet_min_dt          = {:.4} d",
                self.tracklet_min_dt,
                "Shortest pair interval"
            )?;
            line!(
                "tracklet_max_dt          = {:.4} d",
                self.tracklet_max_dt,
                "Longest pair interval"
            )?;
            line!(
                "tracklet_max_rate        = {:.3} deg/d",
                self.tracklet_max_rate,
                "Fastest accepted motion"
            )?;

            writeln!(f, "\n[Propagation]")?;
            line!("propagation_model        = {:?}", self.propagation_model, "Propagator")?;
            line!(
                "validity_horizon         = {:.1} d",
                self.validity_horizon,
                "Max |Δt| to the reference epoch"
            )?;
            line!(
                "max_v_inf                = {:.2} km/s",
                self.max_v_inf,
                "Max hyperbolic excess speed"
            )?;
            line!(
                "min_heliocentric_radius  = {:.3} AU",
                self.min_heliocentric_radius,
                "Near-singular limit"
            )?;

            writeln!(f, "\n[Clustering]")?;
            line!("cluster_space            = {:?}", self.cluster_space, "Coordinates")?;
            line!("linkage                  = {:?}", self.linkage, "Linkage policy")?;
            line!(
                "position_radius          = {:.0} km",
                self.position_radius * AU,
                "Position tolerance"
            )?;
            line!(
                "velocity_radius          = {:.2e} AU/d",
                self.velocity_radius,
                "Velocity tolerance"
            )?;
            match self.radius_scaling {
                Some(scaling) => line!(
                    "radius_scaling           = {}",
                    format!(
                        "x rho/{} AU, {}-{} AU bins x{}",
                        scaling.change_distance,
                        scaling.min_distance,
                        scaling.max_distance,
                        scaling.bin_ratio
                    ),
                    "Distance-scaled radii"
                )?,
                None => line!("radius_scaling           = {}", "none", "Fixed radii")?,
            }
            line!("partitions               = {}", self.partitions, "Spatial index slabs")?;
            line!("shard_size               = {}", self.shard_size, "States per query task")?;
            line!("min_members              = {}", self.min_members, "Minimum detections")?;
            line!("min_epochs               = {}", self.min_epochs, "Minimum distinct epochs")?;
            line!("min_nights               = {}", self.min_nights, "Minimum nights")?;
            line!("min_timespan             = {:.3} d", self.min_timespan, "Shortest arc")?;

            writeln!(f, "\n[Scoring]")?;
            line!(
                "weights                  = {:?}",
                (self.member_weight, self.night_weight, self.time_weight, self.scatter_weight),
                "Members, nights, timespan, scatter"
            )?;
            line!(
                "per_night_product        = {}",
                self.per_night_product,
                "Per-night count product"
            )?;
            line!("min_score                = {:.3}", self.min_score, "Minimum score")?;
            line!(
                "max_rms                  = {}",
                self.max_rms.map_or("none".into(), |r| format!("{:.0} km", r * AU)),
                "Largest position RMS"
            )?;
            line!("dedup                    = {:?}", self.dedup, "Overlap policy")?;
            line!(
                "overlap_fraction         = {:.2}",
                self.overlap_fraction,
                "Max shared fraction"
            )?;

            writeln!(f, "\n[Resources]")?;
            line!(
                "memory_budget            = {} MiB",
                self.memory_budget_bytes >> 20,
                "State table budget"
            )?;
            Ok(())
        } else {
            write!(
                f,
                "LinkParams(ref={:?}, r_pos={:.0}km, r_vel={:.1e}AU/d, linkage={:?}, \
                 min_members={}, min_epochs={}, min_score={:.2}, dedup={:?})",
                self.reference_epoch,
                self.position_radius * AU,
                self.velocity_radius,
                self.linkage,
                self.min_members,
                self.min_epochs,
                self.min_score,
                self.dedup
            )
        }
    }
}

#[cfg(test)]
mod params_test {
    use super::*;
    use crate::detections::Detection;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    #[test]
    fn defaults_are_valid() {
        let params = LinkParams::builder().build().unwrap();
        assert_eq!(params, LinkParams::default());
        assert_relative_eq!(params.position_radius * AU, 1.0e5);
    }

    #[test]
    fn settings_conversion() {
        let params = LinkParams::builder()
            .max_v_inf(10.0)
            .position_radius_km(5.0e4)
            .build()
            .unwrap();
        assert_relative_eq!(params.propagation_settings().max_v_inf, 10.0 * KM_S_TO_AU_DAY);
        assert_relative_eq!(params.cluster_settings().position_radius * AU, 5.0e4);
        assert_eq!(params.projection_settings(60000.0).reference_epoch, 60000.0);
    }

    #[test]
    fn each_stage_reports_its_own_error() {
        let grid = LinkParams::builder()
            .grid(HypothesisGridConfig::from_ranges((4.0, 1.0, 0.1), (0.0, 0.0, 1.0)))
            .build();
        assert!(matches!(grid, Err(LinkError::InvalidHypothesisGrid(_))));

        let proj = LinkParams::builder().tracklet_min_dt(0.2).tracklet_max_dt(0.1).build();
        assert!(matches!(proj, Err(LinkError::InvalidProjectionParameter(_))));

        let prop = LinkParams::builder().validity_horizon(f64::NAN).build();
        assert!(matches!(prop, Err(LinkError::InvalidPropagationParameter(_))));

        let clus = LinkParams::builder().velocity_radius(0.0).build();
        assert!(matches!(clus, Err(LinkError::InvalidClusteringParameter(_))));
        let clus = LinkParams::builder().min_members(1).build();
        assert!(matches!(clus, Err(LinkError::InvalidClusteringParameter(_))));

        let scor = LinkParams::builder().overlap_fraction(1.5).build();
        assert!(matches!(scor, Err(LinkError::InvalidScoringParameter(_))));

        let run = LinkParams::builder().memory_budget_bytes(0).build();
        assert!(matches!(run, Err(LinkError::InvalidRunParameter(_))));

        for err in [grid, proj, prop, clus, scor, run] {
            assert!(err.unwrap_err().is_configuration_error());
        }
    }

    #[test]
    fn arc_rms_and_radius_scaling_are_validated() {
        let scaling = RadiusScaling {
            change_distance: 0.8,
            min_distance: 0.1,
            max_distance: 5.0,
            bin_ratio: 1.5,
        };
        let params = LinkParams::builder()
            .min_timespan(1.0)
            .max_rms(Some(5.0e3 / AU))
            .radius_scaling(Some(scaling))
            .build()
            .unwrap();
        assert_eq!(params.cluster_settings().min_timespan, 1.0);
        assert_eq!(params.cluster_settings().radius_scaling, Some(scaling));
        assert_eq!(params.scoring_settings().max_rms, Some(5.0e3 / AU));
        assert!(format!("{params:#}").contains("5000 km"));

        let bad = [
            LinkParams::builder().min_timespan(-1.0).build(),
            LinkParams::builder().max_rms(Some(0.0)).build(),
            LinkParams::builder()
                .radius_scaling(Some(RadiusScaling {
                    bin_ratio: 1.0,
                    ..scaling
                }))
                .build(),
            LinkParams::builder()
                .radius_scaling(Some(RadiusScaling {
                    max_distance: 0.05,
                    ..scaling
                }))
                .build(),
            LinkParams::builder()
                .radius_scaling(Some(RadiusScaling {
                    change_distance: f64::NAN,
                    ..scaling
                }))
                .build(),
        ];
        for err in bad {
            assert!(err.unwrap_err().is_configuration_error());
        }
    }

    #[test]
    fn grid_is_checked_against_the_memory_budget() {
        // 26 default hypotheses
        let fits = LinkParams::builder().memory_budget_bytes(26 * size_of::<Hypothesis>());
        assert!(fits.build().is_ok());

        let over = LinkParams::builder()
            .memory_budget_bytes(26 * size_of::<Hypothesis>() - 1)
            .build()
            .unwrap_err();
        assert!(matches!(over, LinkError::InvalidHypothesisGrid(_)));

        let tiny_step = LinkParams::builder()
            .grid(HypothesisGridConfig::from_ranges((1.0, 4.0, 1e-20), (0.0, 0.0, 1.0)))
            .build()
            .unwrap_err();
        assert!(tiny_step.is_configuration_error());
    }

    #[test]
    fn reference_epoch_resolution() {
        let det = |id: &str, t: f64| Detection::new(id, t, Vector3::x(), 0.0, 0.0, 0.1);
        let store = DetectionStore::new(vec![
            det("a", 60003.0),
            det("b", 60000.0),
            det("c", 60001.0),
            det("d", 60010.0),
        ])
        .unwrap();
        assert_eq!(ReferenceEpoch::Median.resolve(&store), Some(60001.0));
        assert_eq!(ReferenceEpoch::First.resolve(&store), Some(60000.0));
        assert_eq!(ReferenceEpoch::Midpoint.resolve(&store), Some(60005.0));
        assert_eq!(ReferenceEpoch::Fixed(59000.0).resolve(&store), Some(59000.0));

        let empty = DetectionStore::new(vec![]).unwrap();
        assert_eq!(ReferenceEpoch::Median.resolve(&empty), None);
    }

    #[test]
    fn display_forms() {
        let params = LinkParams::default();
        let compact = format!("{params}");
        assert!(compact.starts_with("LinkParams("));
        let table = format!("{params:#}");
        assert!(table.contains("[Clustering]"));
        assert!(table.contains("position_radius"));
    }

    #[test]
    fn serde_defaults_fill_missing_fields() {
        let params: LinkParams = serde_json::from_str(r#"{"min_members": 5}"#).unwrap();
        assert_eq!(params.min_members, 5);
        assert_eq!(params.min_epochs, 3);
    }
}
