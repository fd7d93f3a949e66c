use super::types::{Feature, ScalerKind};
use crate::error::Result;
use crate::table::FieldTable;
use ndarray::{Array2, Axis};

/// Output of [`scale`]: a bare matrix when every column was scaled, the table
/// itself when a single feature was.
#[derive(Debug, Clone)]
pub enum Scaled {
    Matrix(Array2<f64>),
    Table(FieldTable),
}

impl Scaled {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Self::Matrix(m) => m.dim(),
            Self::Table(t) => (t.n_rows(), t.n_cols()),
        }
    }

    /// Numeric view in column order, for the embedding providers.
    pub fn into_matrix(self) -> Result<Array2<f64>> {
        match self {
            Self::Matrix(m) => Ok(m),
            Self::Table(t) => t.to_matrix(),
        }
    }
}

/// Rescales `table` with `kind`, either every column or just `feature`.
///
/// Each column is fitted on its own values at call time; no state is kept
/// between calls. Constant columns are shifted but not divided, so they map
/// to 0 under the standard and min-max scalers.
pub fn scale(table: &FieldTable, kind: ScalerKind, feature: &Feature) -> Result<Scaled> {
    match feature {
        Feature::All => {
            tracing::debug!("Applying {kind} to all {} columns", table.n_cols());
            let mut matrix = table.to_matrix()?;
            for mut column in matrix.axis_iter_mut(Axis(1)) {
                let values: Vec<f64> = column.iter().copied().collect();
                for (dst, v) in column.iter_mut().zip(scale_column(kind, &values)) {
                    *dst = v;
                }
            }
            Ok(Scaled::Matrix(matrix))
        }
        Feature::Column(name) => {
            table.require_columns(&[name])?;
            tracing::debug!("Applying {kind} to feature '{name}'");
            let values = table.values(name)?;
            let scaled = table.with_values(name, scale_column(kind, &values))?;
            Ok(Scaled::Table(scaled))
        }
    }
}

/// Scales one column of values. NaN entries are ignored when fitting and stay
/// NaN.
pub fn scale_column(kind: ScalerKind, values: &[f64]) -> Vec<f64> {
    let finite = || values.iter().copied().filter(|v| !v.is_nan());
    let (shift, divisor) = match kind {
        ScalerKind::Standard => {
            let n = finite().count().max(1) as f64;
            let mean = finite().sum::<f64>() / n;
            let var = finite().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
            (mean, var.sqrt())
        }
        ScalerKind::MinMax => {
            let min = finite().fold(f64::INFINITY, f64::min);
            let max = finite().fold(f64::NEG_INFINITY, f64::max);
            if min.is_finite() && max.is_finite() {
                (min, max - min)
            } else {
                (0.0, 1.0)
            }
        }
        ScalerKind::MaxAbs => (0.0, finite().map(f64::abs).fold(0.0, f64::max)),
    };
    let divisor = if divisor == 0.0 || !divisor.is_finite() {
        1.0
    } else {
        divisor
    };
    values.iter().map(|v| (v - shift) / divisor).collect()
}
