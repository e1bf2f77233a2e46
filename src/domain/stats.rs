//! Incremental Statistics
//!
//! Deterministic accumulators used by the pool window state. Everything here
//! is a pure function of the (timestamp, value) sequence fed into it, so a
//! replay of the same event stream reproduces the same trajectories exactly.
//! Wall-clock time is never read; callers pass timestamps in.

use chrono::{DateTime, Duration, Utc};
use std::collections::VecDeque;

/// Clamp a value into [0, 1].
pub fn clip01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Exponential moving average with a time-based decay constant.
///
/// Events arrive at irregular intervals, so the smoothing factor is derived
/// from the gap between observations: `alpha = 1 - exp(-dt / tau)`. A 15
/// minute tau therefore weights the last ~15 minutes of observations the way
/// a fixed-period EMA weights its last N samples.
#[derive(Debug, Clone)]
pub struct TimeDecayEma {
    tau_secs: f64,
    value: Option<f64>,
    last_ts: Option<DateTime<Utc>>,
}

impl TimeDecayEma {
    pub fn new(tau_secs: f64) -> Self {
        Self {
            tau_secs,
            value: None,
            last_ts: None,
        }
    }

    /// Fold one observation. The first observation seeds the average.
    pub fn update(&mut self, ts: DateTime<Utc>, x: f64) -> f64 {
        let next = match (self.value, self.last_ts) {
            (Some(prev), Some(last)) => {
                let dt = (ts - last).num_milliseconds().max(0) as f64 / 1000.0;
                let alpha = 1.0 - (-dt / self.tau_secs).exp();
                prev + alpha * (x - prev)
            }
            _ => x,
        };
        self.value = Some(next);
        self.last_ts = Some(ts);
        next
    }

    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// A trailing time window of (timestamp, value) entries.
///
/// Push prunes everything older than the window, keyed off the newest
/// timestamp, so memory stays bounded by event rate times window length.
#[derive(Debug, Clone)]
pub struct TimedRing<T> {
    window: Duration,
    entries: VecDeque<(DateTime<Utc>, T)>,
}

impl<T> TimedRing<T> {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, ts: DateTime<Utc>, value: T) {
        self.entries.push_back((ts, value));
        self.prune(ts);
    }

    /// Evict entries older than the window relative to `now`.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while let Some((ts, _)) = self.entries.front() {
            if *ts < cutoff {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(DateTime<Utc>, T)> {
        self.entries.iter()
    }

    pub fn front(&self) -> Option<&(DateTime<Utc>, T)> {
        self.entries.front()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Ordinary least squares slope of a (timestamp, value) series, per minute.
///
/// Returns None with fewer than 3 points or a degenerate time axis.
pub fn ols_slope_per_min<'a, I>(points: I) -> Option<f64>
where
    I: IntoIterator<Item = &'a (DateTime<Utc>, f64)>,
{
    let pts: Vec<(f64, f64)> = points
        .into_iter()
        .map(|(ts, v)| (ts.timestamp_millis() as f64 / 60_000.0, *v))
        .collect();
    if pts.len() < 3 {
        return None;
    }
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pts.iter().map(|(_, y)| y).sum::<f64>() / n;
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for (x, y) in &pts {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx < 1e-12 {
        return None;
    }
    Some(sxy / sxx)
}

/// Sample mean and standard deviation. None with fewer than 2 values.
pub fn mean_std(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / (n - 1.0);
    Some((mean, var.sqrt()))
}

/// Coefficient of variation (std / mean). None if the mean is ~zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let (mean, std) = mean_std(values)?;
    if mean.abs() < 1e-12 {
        return None;
    }
    Some(std / mean.abs())
}

/// Gini coefficient of a non-negative distribution.
///
/// Negative inputs are floored at zero (net outflows carry no concentration
/// information here). Returns None for empty input or an all-zero total.
pub fn gini(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut xs: Vec<f64> = values.iter().map(|v| v.max(0.0)).collect();
    xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = xs.len() as f64;
    let total: f64 = xs.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let weighted: f64 = xs
        .iter()
        .enumerate()
        .map(|(i, x)| (i as f64 + 1.0) * x)
        .sum();
    Some((2.0 * weighted) / (n * total) - (n + 1.0) / n)
}

/// Jaccard similarity |A ∩ B| / |A ∪ B|; 0.0 when both sets are empty.
pub fn jaccard<S: std::hash::BuildHasher>(
    a: &std::collections::HashSet<String, S>,
    b: &std::collections::HashSet<String, S>,
) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let inter = a.iter().filter(|w| b.contains(*w)).count() as f64;
    let union = (a.len() + b.len()) as f64 - inter;
    inter / union
}
