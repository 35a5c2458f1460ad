//! Curve fitting for numerical transformations.
//!
//! Linear and quadratic models are fitted by ordinary least squares. The
//! exponential model is fitted on `ln|y|` and the rational model on its
//! linearised form `x*y = a*x + b - c*y`; both are then scored on the
//! original scale so all candidates compare by the same error.

use std::fmt;

use tracing::debug;

use crate::error::{Result, TabulaError};
use crate::transform::Example;

use super::heuristics::parse_number;

/// Pivots smaller than this make a system singular.
const SINGULAR: f64 = 1e-12;

/// Candidates whose error is within this of the best are considered tied;
/// the simpler model wins a tie.
const TIE_TOLERANCE: f64 = 1e-9;

// =============================================================================
// LINEAR ALGEBRA
// =============================================================================

/// Solve the least squares problem `features * p ~= targets` through the
/// normal equations. Returns `None` when the system is singular.
pub fn least_squares(features: &[Vec<f64>], targets: &[f64]) -> Option<Vec<f64>> {
    let n = features.first()?.len();
    let mut ata = vec![vec![0.0; n]; n];
    let mut aty = vec![0.0; n];
    for (row, y) in features.iter().zip(targets) {
        for i in 0..n {
            aty[i] += row[i] * y;
            for j in 0..n {
                ata[i][j] += row[i] * row[j];
            }
        }
    }
    solve(ata, aty)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < SINGULAR {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                let delta = factor * a[col][k];
                a[row][k] -= delta;
            }
            let delta = factor * b[col];
            b[row] -= delta;
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}

pub fn mean_squared_error(pairs: &[(f64, f64)], f: impl Fn(f64) -> f64) -> f64 {
    let total: f64 = pairs.iter().map(|(x, y)| (y - f(*x)).powi(2)).sum();
    total / pairs.len() as f64
}

// =============================================================================
// MODELS
// =============================================================================

/// A fitted numeric model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericModel {
    Linear { a: f64, b: f64 },
    Exponential { a: f64, b: f64 },
    Rational { a: f64, b: f64, c: f64 },
    Quadratic { a: f64, b: f64, c: f64 },
}

impl NumericModel {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Linear { .. } => "linear",
            Self::Exponential { .. } => "exponential",
            Self::Rational { .. } => "rational",
            Self::Quadratic { .. } => "quadratic",
        }
    }

    pub fn eval(&self, x: f64) -> f64 {
        match *self {
            Self::Linear { a, b } => a * x + b,
            Self::Exponential { a, b } => a * (b * x).exp(),
            Self::Rational { a, b, c } => (a * x + b) / (x + c),
            Self::Quadratic { a, b, c } => a * x * x + b * x + c,
        }
    }

    fn lua_expr(&self) -> String {
        match *self {
            Self::Linear { a, b } => format!("{} * n + {}", lit(a), lit(b)),
            Self::Exponential { a, b } => format!("{} * math.exp({} * n)", lit(a), lit(b)),
            Self::Rational { a, b, c } => {
                format!("({} * n + {}) / (n + {})", lit(a), lit(b), lit(c))
            }
            Self::Quadratic { a, b, c } => {
                format!("{} * n ^ 2 + {} * n + {}", lit(a), lit(b), lit(c))
            }
        }
    }

    /// Lua source applying the model. NA-like cells become `"MISSING"`,
    /// cells without a number become nil.
    pub fn lua_code(&self) -> String {
        format!(
            r#"local MISSING = {{ ["n/a"] = true, ["na"] = true, ["null"] = true, ["nan"] = true, [""] = true }}

function transform(x)
  if x == nil then return "MISSING" end
  local s = tostring(x)
  if MISSING[s:match("^%s*(.-)%s*$"):lower()] then return "MISSING" end
  local n = tonumber((s:gsub("[^%d%.%-]", "")))
  if n == nil then return nil end
  return {}
end
"#,
            self.lua_expr()
        )
    }
}

impl fmt::Display for NumericModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Linear { a, b } => write!(f, "y = {a} * x + {b}"),
            Self::Exponential { a, b } => write!(f, "y = {a} * exp({b} * x)"),
            Self::Rational { a, b, c } => write!(f, "y = ({a} * x + {b}) / (x + {c})"),
            Self::Quadratic { a, b, c } => write!(f, "y = {a} * x^2 + {b} * x + {c}"),
        }
    }
}

/// Lua numeric literal. Debug formatting keeps full precision and always
/// yields a literal Lua accepts for finite values.
fn lit(v: f64) -> String {
    if v < 0.0 {
        format!("({:?})", v)
    } else {
        format!("{:?}", v)
    }
}

fn fit_linear(pairs: &[(f64, f64)]) -> Option<NumericModel> {
    let features: Vec<Vec<f64>> = pairs.iter().map(|(x, _)| vec![*x, 1.0]).collect();
    let targets: Vec<f64> = pairs.iter().map(|(_, y)| *y).collect();
    let p = least_squares(&features, &targets)?;
    Some(NumericModel::Linear { a: p[0], b: p[1] })
}

fn fit_exponential(pairs: &[(f64, f64)]) -> Option<NumericModel> {
    let sign = pairs.first()?.1.signum();
    if pairs.iter().any(|(_, y)| *y == 0.0 || y.signum() != sign) {
        return None;
    }
    let features: Vec<Vec<f64>> = pairs.iter().map(|(x, _)| vec![*x, 1.0]).collect();
    let targets: Vec<f64> = pairs.iter().map(|(_, y)| y.abs().ln()).collect();
    let p = least_squares(&features, &targets)?;
    Some(NumericModel::Exponential {
        a: sign * p[1].exp(),
        b: p[0],
    })
}

fn fit_rational(pairs: &[(f64, f64)]) -> Option<NumericModel> {
    let features: Vec<Vec<f64>> = pairs.iter().map(|(x, y)| vec![*x, 1.0, -*y]).collect();
    let targets: Vec<f64> = pairs.iter().map(|(x, y)| x * y).collect();
    let p = least_squares(&features, &targets)?;
    let model = NumericModel::Rational {
        a: p[0],
        b: p[1],
        c: p[2],
    };
    pairs
        .iter()
        .all(|(x, _)| (x + p[2]).abs() > SINGULAR)
        .then_some(model)
}

fn fit_quadratic(pairs: &[(f64, f64)]) -> Option<NumericModel> {
    let features: Vec<Vec<f64>> = pairs.iter().map(|(x, _)| vec![x * x, *x, 1.0]).collect();
    let targets: Vec<f64> = pairs.iter().map(|(_, y)| *y).collect();
    let p = least_squares(&features, &targets)?;
    Some(NumericModel::Quadratic {
        a: p[0],
        b: p[1],
        c: p[2],
    })
}

/// Fit every applicable model and keep the one with the lowest error.
///
/// Every example must be numeric on both sides and at least two are
/// needed; the rational and quadratic models need three.
pub fn fit(examples: &[Example]) -> Result<NumericModel> {
    let mut pairs = Vec::with_capacity(examples.len());
    for example in examples {
        match (parse_number(&example.input), parse_number(&example.output)) {
            (Some(x), Some(y)) => pairs.push((x, y)),
            _ => {
                return Err(TabulaError::Generation(format!(
                    "numerical transformation needs numeric examples, got {}",
                    example
                )));
            }
        }
    }
    if pairs.len() < 2 {
        return Err(TabulaError::Generation(
            "at least 2 examples are required for a numerical transformation".to_string(),
        ));
    }

    let mut candidates: Vec<NumericModel> = [fit_linear(&pairs), fit_exponential(&pairs)]
        .into_iter()
        .flatten()
        .collect();
    if pairs.len() >= 3 {
        candidates.extend(fit_rational(&pairs));
        candidates.extend(fit_quadratic(&pairs));
    }

    let scored: Vec<(NumericModel, f64)> = candidates
        .into_iter()
        .map(|m| (m, mean_squared_error(&pairs, |x| m.eval(x))))
        .filter(|(_, mse)| mse.is_finite())
        .collect();
    let best = scored
        .iter()
        .map(|(_, mse)| *mse)
        .fold(f64::INFINITY, f64::min);

    let (model, mse) = scored
        .into_iter()
        .find(|(_, mse)| *mse <= best + TIE_TOLERANCE)
        .ok_or_else(|| {
            TabulaError::Generation("no numeric model could be fitted to the examples".to_string())
        })?;
    debug!(model = model.name(), mse, "Fitted numeric model");
    Ok(model)
}
