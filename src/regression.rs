//src/regression.rs

use statrs::distribution::{ContinuousCDF, StudentsT};

/// Ordinary least squares solution with an intercept.
///
/// `coefficients[0]` is the intercept, the rest follow the predictor order.
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub coefficients: Vec<f64>,
    pub std_errors: Vec<f64>,
    /// In-sample coefficient of determination.
    pub r_squared: f64,
    pub n: usize,
    pub df_resid: usize,
}

impl OlsFit {
    /// Two-sided p-value for `coefficients[i] == 0`.
    pub fn p_value(&self, i: usize) -> f64 {
        two_sided_p(self.coefficients[i] / self.std_errors[i], self.df_resid)
    }
}

/// Two-sided Student-t p-value. NaN when undefined.
pub fn two_sided_p(t: f64, df: usize) -> f64 {
    if df == 0 || t.is_nan() {
        return f64::NAN;
    }
    if t.is_infinite() {
        return 0.0;
    }
    match StudentsT::new(0.0, 1.0, df as f64) {
        Ok(dist) => 2.0 * (1.0 - dist.cdf(t.abs())),
        Err(_) => f64::NAN,
    }
}

/// Fits `y ~ 1 + predictors` by the normal equations.
///
/// Returns `None` when there are fewer rows than coefficients or the design
/// matrix is singular (e.g. a constant predictor).
pub fn ols(predictors: &[Vec<f64>], y: &[f64]) -> Option<OlsFit> {
    let n = y.len();
    if predictors.len() != n || n == 0 {
        return None;
    }
    let p = predictors[0].len() + 1;
    if n < p || predictors.iter().any(|row| row.len() + 1 != p) {
        return None;
    }

    let design = |i: usize, j: usize| if j == 0 { 1.0 } else { predictors[i][j - 1] };

    let mut xtx = vec![vec![0.0; p]; p];
    let mut xty = vec![0.0; p];
    for i in 0..n {
        for a in 0..p {
            let xa = design(i, a);
            xty[a] += xa * y[i];
            for b in 0..p {
                xtx[a][b] += xa * design(i, b);
            }
        }
    }

    let inv = invert(xtx)?;
    let coefficients: Vec<f64> = (0..p)
        .map(|a| (0..p).map(|b| inv[a][b] * xty[b]).sum())
        .collect();

    let mean_y = y.iter().sum::<f64>() / n as f64;
    let mut ssr = 0.0;
    let mut sst = 0.0;
    for i in 0..n {
        let fitted: f64 = (0..p).map(|j| coefficients[j] * design(i, j)).sum();
        ssr += (y[i] - fitted).powi(2);
        sst += (y[i] - mean_y).powi(2);
    }
    let r_squared = if sst > 0.0 { 1.0 - ssr / sst } else { f64::NAN };

    let df_resid = n - p;
    let sigma2 = if df_resid > 0 {
        ssr / df_resid as f64
    } else {
        f64::NAN
    };
    let std_errors = (0..p).map(|j| (sigma2 * inv[j][j]).sqrt()).collect();

    Some(OlsFit {
        coefficients,
        std_errors,
        r_squared,
        n,
        df_resid,
    })
}

/// Gauss-Jordan inverse with partial pivoting; `None` if singular.
fn invert(mut m: Vec<Vec<f64>>) -> Option<Vec<Vec<f64>>> {
    let p = m.len();
    let scale = (0..p).map(|i| m[i][i].abs()).fold(0.0, f64::max);
    if scale == 0.0 || !scale.is_finite() {
        return None;
    }
    let mut inv: Vec<Vec<f64>> = (0..p)
        .map(|i| (0..p).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..p {
        let pivot_row = (col..p).max_by(|&a, &b| m[a][col].abs().total_cmp(&m[b][col].abs()))?;
        if m[pivot_row][col].abs() <= 1e-12 * scale {
            return None;
        }
        m.swap(col, pivot_row);
        inv.swap(col, pivot_row);

        let pivot = m[col][col];
        for j in 0..p {
            m[col][j] /= pivot;
            inv[col][j] /= pivot;
        }
        for row in 0..p {
            if row == col {
                continue;
            }
            let factor = m[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..p {
                m[row][j] -= factor * m[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }
    Some(inv)
}

/// A straight-line fit `y = intercept + slope * x`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Two-sided p-value for `slope == 0`.
    pub p_value: f64,
    pub n: usize,
}

impl LineFit {
    pub fn undefined(n: usize) -> Self {
        Self {
            slope: f64::NAN,
            intercept: f64::NAN,
            r_squared: f64::NAN,
            p_value: f64::NAN,
            n,
        }
    }

    pub fn is_defined(&self) -> bool {
        !self.slope.is_nan()
    }
}

/// Number of distinct values, treating equal floats as one.
pub fn distinct_count(values: &[f64]) -> usize {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup();
    sorted.len()
}

/// Simple regression of `y` on `x`. Pairs with a non-finite member are
/// dropped first; fewer than two distinct `x` values gives `LineFit::undefined`.
pub fn fit_line(x: &[f64], y: &[f64]) -> LineFit {
    let (xs, ys): (Vec<f64>, Vec<f64>) = x
        .iter()
        .zip(y)
        .filter(|(a, b)| a.is_finite() && b.is_finite())
        .map(|(a, b)| (*a, *b))
        .unzip();
    let n = xs.len();
    if distinct_count(&xs) < 2 {
        log::debug!("Regression on {} points with <2 distinct x; undefined", n);
        return LineFit::undefined(n);
    }

    let rows: Vec<Vec<f64>> = xs.iter().map(|&v| vec![v]).collect();
    match ols(&rows, &ys) {
        Some(fit) => LineFit {
            slope: fit.coefficients[1],
            intercept: fit.coefficients[0],
            r_squared: fit.r_squared,
            p_value: fit.p_value(1),
            n,
        },
        None => LineFit::undefined(n),
    }
}
