use rand::Rng;

use super::model::{DerivedSignals, LightCurvePoint, PeriodPower, PhaseFlux, TimeFlux};
use crate::error::{PipelineError, Result};

/// Fold period used when no periodogram peak is available.
pub const DEFAULT_FOLD_PERIOD: f64 = 10.5;

/// Slope of the fixed reference baseline (flux per time unit).
pub const REFERENCE_SLOPE: f64 = 1e-4;

const PHASE_BINS: usize = 64;
/// Longest transit considered by the box search, as a fraction of the period.
const MAX_DURATION_FRACTION: f64 = 0.25;

// ---------------------------------------------------------------------------
// Sample – anything with a time and a flux
// ---------------------------------------------------------------------------

pub trait Sample {
    fn time(&self) -> f64;
    fn flux(&self) -> f64;
}

impl Sample for LightCurvePoint {
    fn time(&self) -> f64 {
        self.time
    }
    fn flux(&self) -> f64 {
        self.flux
    }
}

impl Sample for TimeFlux {
    fn time(&self) -> f64 {
        self.time
    }
    fn flux(&self) -> f64 {
        self.flux
    }
}

// ---------------------------------------------------------------------------
// Detrending
// ---------------------------------------------------------------------------

/// Slow baseline removed by [`detrend`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Baseline {
    /// Least-squares line through the series; the mean flux is kept.
    #[default]
    LinearFit,
    /// `flux - slope * time`.
    FixedSlope(f64),
}

/// Subtract a slowly varying baseline from the flux.
pub fn detrend<S: Sample>(points: &[S], baseline: Baseline) -> Vec<TimeFlux> {
    let slope = match baseline {
        Baseline::FixedSlope(slope) => {
            return points
                .iter()
                .map(|p| TimeFlux {
                    time: p.time(),
                    flux: p.flux() - slope * p.time(),
                })
                .collect();
        }
        Baseline::LinearFit => linear_slope(points),
    };

    let mean_time = mean(points.iter().map(Sample::time));
    points
        .iter()
        .map(|p| TimeFlux {
            time: p.time(),
            flux: p.flux() - slope * (p.time() - mean_time),
        })
        .collect()
}

/// Least-squares slope of flux over time. Zero for fewer than two distinct
/// times.
pub fn linear_slope<S: Sample>(points: &[S]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let mean_time = mean(points.iter().map(Sample::time));
    let mean_flux = mean(points.iter().map(Sample::flux));
    let (cov, var) = points.iter().fold((0.0, 0.0), |(cov, var), p| {
        let dt = p.time() - mean_time;
        (cov + dt * (p.flux() - mean_flux), var + dt * dt)
    });
    if var <= f64::EPSILON {
        0.0
    } else {
        cov / var
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

// ---------------------------------------------------------------------------
// Periodogram
// ---------------------------------------------------------------------------

/// Equally spaced trial-period grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeriodRange {
    pub min: f64,
    pub max: f64,
    pub points: usize,
}

impl Default for PeriodRange {
    fn default() -> Self {
        Self {
            min: 0.5,
            max: 20.0,
            points: 200,
        }
    }
}

impl PeriodRange {
    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.min > 0.0) {
            return Err(PipelineError::InvalidArgument(format!(
                "minimum period must be > 0, got {}",
                self.min
            )));
        }
        if !(self.max.is_finite() && self.max >= self.min) {
            return Err(PipelineError::InvalidArgument(format!(
                "maximum period {} is below minimum {}",
                self.max, self.min
            )));
        }
        if self.points == 0 {
            return Err(PipelineError::InvalidArgument(
                "period grid needs at least one point".into(),
            ));
        }
        Ok(())
    }

    pub fn grid(&self) -> Vec<f64> {
        if self.points == 1 {
            return vec![self.min];
        }
        let step = (self.max - self.min) / (self.points - 1) as f64;
        (0..self.points).map(|i| self.min + i as f64 * step).collect()
    }
}

/// Power spectrum over `range`.
///
/// Power at each trial period is the box-search signal residue: the series is
/// folded into phase bins and the contiguous run of bins (up to a quarter of
/// the period) with the deepest mean dip is scored. Power is zero when no bin
/// run sits below the mean, so it is always non-negative and deterministic,
/// peaking at the period of a recurring transit.
pub fn compute_periodogram<S: Sample>(points: &[S], range: &PeriodRange) -> Result<Vec<PeriodPower>> {
    range.validate()?;
    if points.is_empty() {
        return Ok(Vec::new());
    }

    let mean_flux = mean(points.iter().map(Sample::flux));
    let spectrum = range
        .grid()
        .into_iter()
        .map(|period| PeriodPower {
            period,
            power: box_power(points, period, mean_flux),
        })
        .collect();
    Ok(spectrum)
}

fn box_power<S: Sample>(points: &[S], period: f64, mean_flux: f64) -> f64 {
    let mut sums = [0.0f64; PHASE_BINS];
    let mut counts = [0usize; PHASE_BINS];
    for p in points {
        let bin = ((phase_of(p.time(), period) * PHASE_BINS as f64) as usize).min(PHASE_BINS - 1);
        sums[bin] += p.flux() - mean_flux;
        counts[bin] += 1;
    }

    let total = points.len() as f64;
    let max_width = ((PHASE_BINS as f64 * MAX_DURATION_FRACTION) as usize).max(1);
    let mut best = 0.0f64;
    for start in 0..PHASE_BINS {
        let mut s = 0.0;
        let mut n = 0usize;
        for width in 0..max_width {
            let bin = (start + width) % PHASE_BINS;
            s += sums[bin];
            n += counts[bin];
            if n == 0 || n == points.len() || s >= 0.0 {
                continue;
            }
            let r = n as f64 / total;
            let residue = (s / total).powi(2) / (r * (1.0 - r));
            best = best.max(residue);
        }
    }
    best
}

/// Add bounded non-negative jitter in `[0, amplitude)` to every power value.
pub fn add_jitter<R: Rng + ?Sized>(spectrum: &mut [PeriodPower], rng: &mut R, amplitude: f64) {
    let amplitude = amplitude.max(0.0);
    for entry in spectrum {
        entry.power += rng.random::<f64>() * amplitude;
    }
}

/// Period with the highest power.
pub fn best_period(spectrum: &[PeriodPower]) -> Option<f64> {
    spectrum
        .iter()
        .max_by(|a, b| a.power.total_cmp(&b.power))
        .map(|p| p.period)
}

// ---------------------------------------------------------------------------
// Phase folding
// ---------------------------------------------------------------------------

/// Map each time to `(time mod period) / period` in `[0, 1)` and sort by
/// phase. Ties keep their input order.
pub fn phase_fold<S: Sample>(points: &[S], period: f64) -> Result<Vec<PhaseFlux>> {
    if !(period.is_finite() && period > 0.0) {
        return Err(PipelineError::InvalidArgument(format!(
            "fold period must be > 0, got {period}"
        )));
    }
    let mut folded: Vec<PhaseFlux> = points
        .iter()
        .map(|p| PhaseFlux {
            phase: phase_of(p.time(), period),
            flux: p.flux(),
        })
        .collect();
    folded.sort_by(|a, b| a.phase.total_cmp(&b.phase));
    Ok(folded)
}

fn phase_of(time: f64, period: f64) -> f64 {
    let phase = time.rem_euclid(period) / period;
    // rem_euclid can round up to exactly `period` for tiny negative times
    if phase >= 1.0 {
        0.0
    } else {
        phase
    }
}

// ---------------------------------------------------------------------------
// Full chart set
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalConfig {
    pub baseline: Baseline,
    pub range: PeriodRange,
    /// Fixed fold period; the periodogram peak is used when `None`.
    pub fold_period: Option<f64>,
}

/// Compute every derived series for a light curve.
pub fn derive_signals(points: &[LightCurvePoint], config: &SignalConfig) -> Result<DerivedSignals> {
    let periodogram = compute_periodogram(points, &config.range)?;
    let fold_period = config
        .fold_period
        .or_else(|| best_period(&periodogram))
        .unwrap_or(DEFAULT_FOLD_PERIOD);

    Ok(DerivedSignals {
        raw: points.to_vec(),
        detrended: detrend(points, config.baseline),
        phase_folded: phase_fold(points, fold_period)?,
        periodogram,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn point(time: f64, flux: f64) -> LightCurvePoint {
        LightCurvePoint {
            time,
            flux,
            flux_error: None,
        }
    }

    /// Flat curve with a box dip of `depth` lasting 10% of `period`.
    fn transit_curve(period: f64, depth: f64) -> Vec<LightCurvePoint> {
        (0..1000)
            .map(|i| {
                let t = i as f64 * 0.02;
                let phase = (t % period) / period;
                let dip = if phase > 0.45 && phase < 0.55 { depth } else { 0.0 };
                point(t, 1.0 - dip)
            })
            .collect()
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let none: [LightCurvePoint; 0] = [];
        assert!(detrend(&none, Baseline::LinearFit).is_empty());
        assert!(compute_periodogram(&none, &PeriodRange::default()).unwrap().is_empty());
        assert!(phase_fold(&none, 2.0).unwrap().is_empty());
    }

    #[test]
    fn fixed_slope_matches_reference_formula() {
        let pts = [point(0.0, 1.0), point(100.0, 1.0)];
        let out = detrend(&pts, Baseline::FixedSlope(REFERENCE_SLOPE));
        assert_eq!(out[0].flux, 1.0);
        assert!((out[1].flux - 0.99).abs() < 1e-12);
    }

    #[test]
    fn linear_fit_removes_slow_trend_and_keeps_mean() {
        let pts: Vec<_> = (0..200)
            .map(|i| {
                let t = i as f64 * 0.1;
                let wiggle = if i % 2 == 0 { 0.001 } else { -0.001 };
                point(t, 1.0 + 0.01 * t + wiggle)
            })
            .collect();
        let raw_slope = linear_slope(&pts).abs();
        let once = detrend(&pts, Baseline::LinearFit);
        let twice = detrend(&once, Baseline::LinearFit);

        let once_slope = linear_slope(&once).abs();
        let twice_slope = linear_slope(&twice).abs();
        assert!(once_slope < raw_slope);
        assert!(twice_slope <= once_slope + 1e-12);
        assert!(once_slope < 1e-9);

        // per-point noise survives
        assert!((once[0].flux - once[1].flux).abs() > 0.0015);

        let mean_raw = mean(pts.iter().map(|p| p.flux));
        let mean_out = mean(once.iter().map(|p| p.flux));
        assert!((mean_raw - mean_out).abs() < 1e-9);
    }

    #[test]
    fn invalid_period_is_rejected() {
        let pts = [point(0.0, 1.0)];
        assert!(matches!(phase_fold(&pts, 0.0), Err(PipelineError::InvalidArgument(_))));
        assert!(matches!(phase_fold(&pts, -1.0), Err(PipelineError::InvalidArgument(_))));
        assert!(matches!(phase_fold(&pts, f64::NAN), Err(PipelineError::InvalidArgument(_))));

        let bad = PeriodRange {
            min: 0.0,
            ..PeriodRange::default()
        };
        assert!(compute_periodogram(&pts, &bad).is_err());
    }

    #[test]
    fn phase_fold_sorts_and_is_stable() {
        let pts = [point(2.5, 1.0), point(0.5, 2.0), point(4.5, 3.0), point(-1.5, 4.0)];
        let folded = phase_fold(&pts, 2.0).unwrap();
        let phases: Vec<f64> = folded.iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec![0.25, 0.25, 0.25, 0.25]);
        let fluxes: Vec<f64> = folded.iter().map(|p| p.flux).collect();
        assert_eq!(fluxes, vec![1.0, 2.0, 3.0, 4.0]);

        let pts = [point(1.5, 1.0), point(0.0, 2.0), point(0.5, 3.0)];
        let folded = phase_fold(&pts, 2.0).unwrap();
        let phases: Vec<f64> = folded.iter().map(|p| p.phase).collect();
        assert_eq!(phases, vec![0.0, 0.25, 0.75]);
    }

    #[test]
    fn phase_is_invariant_under_whole_periods() {
        let period = 2.5;
        let base: Vec<_> = (0..40).map(|i| point(i as f64 * 0.25, i as f64)).collect();
        let shifted: Vec<_> = base
            .iter()
            .enumerate()
            .map(|(i, p)| point(p.time + (i % 4) as f64 * period, p.flux))
            .collect();
        let a = phase_fold(&base, period).unwrap();
        let b = phase_fold(&shifted, period).unwrap();
        for (x, y) in a.iter().zip(&b) {
            assert!((x.phase - y.phase).abs() < 1e-12);
        }
        assert!(a.iter().all(|p| (0.0..1.0).contains(&p.phase)));
    }

    #[test]
    fn periodogram_grid_and_peak() {
        let range = PeriodRange::default();
        let grid = range.grid();
        assert_eq!(grid.len(), 200);
        assert_eq!(grid[0], 0.5);
        assert!((grid[199] - 20.0).abs() < 1e-9);

        let pts = transit_curve(10.5, 0.015);
        let spectrum = compute_periodogram(&pts, &range).unwrap();
        assert_eq!(spectrum.len(), 200);
        assert!(spectrum.iter().all(|p| p.power >= 0.0));
        let peak = best_period(&spectrum).unwrap();
        assert!((peak - 10.5).abs() < 0.3, "peak at {peak}");

        let again = compute_periodogram(&pts, &range).unwrap();
        assert_eq!(spectrum, again);
    }

    #[test]
    fn flat_curve_has_zero_power() {
        let pts: Vec<_> = (0..100).map(|i| point(i as f64 * 0.1, 1.0)).collect();
        let spectrum = compute_periodogram(&pts, &PeriodRange::default()).unwrap();
        assert!(spectrum.iter().all(|p| p.power == 0.0));
    }

    #[test]
    fn jitter_is_bounded_and_seeded() {
        let pts = transit_curve(10.5, 0.015);
        let clean = compute_periodogram(&pts, &PeriodRange::default()).unwrap();

        let mut a = clean.clone();
        let mut b = clean.clone();
        add_jitter(&mut a, &mut StdRng::seed_from_u64(7), 0.1);
        add_jitter(&mut b, &mut StdRng::seed_from_u64(7), 0.1);
        assert_eq!(a, b);
        for (j, c) in a.iter().zip(&clean) {
            assert!(j.power >= c.power && j.power < c.power + 0.1);
        }
    }

    #[test]
    fn derived_signals_fold_at_detected_period() {
        let pts = transit_curve(10.5, 0.015);
        let signals = derive_signals(&pts, &SignalConfig::default()).unwrap();
        assert_eq!(signals.raw.len(), pts.len());
        assert_eq!(signals.detrended.len(), pts.len());
        assert_eq!(signals.phase_folded.len(), pts.len());
        assert!(signals
            .phase_folded
            .windows(2)
            .all(|w| w[0].phase <= w[1].phase));

        let fixed = SignalConfig {
            fold_period: Some(-2.0),
            ..SignalConfig::default()
        };
        assert!(derive_signals(&pts, &fixed).is_err());
    }
}
