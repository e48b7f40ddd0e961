//! Descriptive statistics and the point-biserial correlation test

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::statistics::Statistics;
use std::fmt;

/// Summary of a numeric sample, in the layout of a `describe()` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Describe {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation (n - 1); `None` below two values
    pub std: Option<f64>,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

impl Describe {
    /// `None` for an empty sample. Non-finite values are ignored.
    pub fn compute(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.total_cmp(b));

        Some(Describe {
            count: sorted.len(),
            mean: mean(&sorted),
            std: sample_std(&sorted),
            min: sorted[0],
            q1: quantile_sorted(&sorted, 0.25),
            median: quantile_sorted(&sorted, 0.5),
            q3: quantile_sorted(&sorted, 0.75),
            max: sorted[sorted.len() - 1],
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }
}

impl fmt::Display for Describe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "count  {:>16}", self.count)?;
        writeln!(f, "mean   {:>16.6}", self.mean)?;
        match self.std {
            Some(std) => writeln!(f, "std    {:>16.6}", std)?,
            None => writeln!(f, "std    {:>16}", "NaN")?,
        }
        writeln!(f, "min    {:>16.6}", self.min)?;
        writeln!(f, "25%    {:>16.6}", self.q1)?;
        writeln!(f, "50%    {:>16.6}", self.median)?;
        writeln!(f, "75%    {:>16.6}", self.q3)?;
        write!(f, "max    {:>16.6}", self.max)
    }
}

/// Arithmetic mean; NaN for an empty slice
pub fn mean(values: &[f64]) -> f64 {
    values.iter().mean()
}

/// Sample standard deviation (n - 1); `None` below two values
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    Some(values.iter().std_dev())
}

/// Linear-interpolation quantile of an ascending slice
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Correlation {
    pub r: f64,
    pub p_value: f64,
    pub n: usize,
}

impl Correlation {
    pub fn significance(&self) -> &'static str {
        if self.p_value < 0.001 {
            "***"
        } else if self.p_value < 0.01 {
            "**"
        } else if self.p_value < 0.05 {
            "*"
        } else {
            "ns"
        }
    }
}

// Point-biserial correlation between a binary indicator and a continuous
// variable. This is Pearson's r with one side restricted to {0, 1}; the
// p-value comes from Student's t with n - 2 degrees of freedom.
// Returns None when fewer than three pairs exist or either side is constant.
pub fn point_biserial(indicator: &[bool], values: &[f64]) -> Option<Correlation> {
    let n = indicator.len().min(values.len());
    if n < 3 {
        return None;
    }
    let x: Vec<f64> = indicator[..n].iter().map(|&b| if b { 1.0 } else { 0.0 }).collect();
    let y = &values[..n];

    let sx = x.iter().std_dev();
    let sy = y.iter().std_dev();
    if sx == 0.0 || sy == 0.0 || !sx.is_finite() || !sy.is_finite() {
        return None;
    }

    let r = (x.iter().covariance(y.iter()) / (sx * sy)).clamp(-1.0, 1.0);
    let df = (n - 2) as f64;
    let p_value = if (1.0 - r.abs()) < f64::EPSILON {
        0.0
    } else {
        let t = r * (df / (1.0 - r * r)).sqrt();
        student_t_two_sided(t, df)?
    };

    Some(Correlation { r, p_value, n })
}

/// Two-sided tail probability of Student's t distribution;
/// `None` when `df` is not a valid degrees-of-freedom value
pub fn student_t_two_sided(t: f64, df: f64) -> Option<f64> {
    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * (1.0 - t_dist.cdf(t.abs()))).clamp(0.0, 1.0))
}
