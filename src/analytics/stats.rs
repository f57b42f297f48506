//! Small statistics helpers shared by the kernel's analyses. Plain,
//! dependency-free math in the style of the forecast accuracy metrics this
//! crate is adapted from - no external stats crate is pulled in just for
//! OLS and mean/variance.

pub fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

pub fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / xs.len() as f64;
    variance.sqrt()
}

/// Nearest-rank percentile over `xs` (0 ≤ `pct` ≤ 100). Does not mutate
/// `xs`; returns 0.0 for an empty slice.
pub fn percentile(xs: &[f64], pct: f64) -> f64 {
    if xs.is_empty() {
        return 0.0;
    }
    let mut sorted = xs.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = ((pct / 100.0) * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[rank.min(sorted.len() - 1)]
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r2: f64,
}

/// Ordinary least squares fit of `y = slope * x + intercept`. `r2` is the
/// coefficient of determination, always clamped to `[0,1]` - a model no
/// worse than the mean is reported as `r2 = 0`, never negative.
pub fn linear_regression(xs: &[f64], ys: &[f64]) -> Option<Regression> {
    if xs.len() != ys.len() || xs.len() < 2 {
        return None;
    }
    let n = xs.len() as f64;
    let mean_x = mean(xs);
    let mean_y = mean(ys);

    let mut cov = 0.0;
    let mut var_x = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        cov += (x - mean_x) * (y - mean_y);
        var_x += (x - mean_x).powi(2);
    }

    if var_x.abs() < 1e-12 {
        return Some(Regression {
            slope: 0.0,
            intercept: mean_y,
            r2: 0.0,
        });
    }

    let slope = cov / var_x;
    let intercept = mean_y - slope * mean_x;

    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for (x, y) in xs.iter().zip(ys.iter()) {
        let predicted = slope * x + intercept;
        ss_res += (y - predicted).powi(2);
        ss_tot += (y - mean_y).powi(2);
    }

    let r2 = if ss_tot.abs() < 1e-12 {
        1.0
    } else {
        (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
    };

    let _ = n;
    Some(Regression {
        slope,
        intercept,
        r2,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

pub fn confidence_tier(r2: f64) -> ConfidenceTier {
    if r2 >= 0.7 {
        ConfidenceTier::High
    } else if r2 >= 0.4 {
        ConfidenceTier::Medium
    } else {
        ConfidenceTier::Low
    }
}
