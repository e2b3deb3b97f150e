//! Reference window and goalpost calibration.
//!
//! The window is taken once, from the state-level table, and the same
//! snapshot calibrates every granularity of a run. It is never recomputed
//! per granularity; callers hold it and pass it explicitly.

use crate::error::{NebError, Result};
use crate::model::{
    columns, f64_column, IndexVariableSpec, IndexVariables, Polarity, INDEX_VARIABLES,
    REFERENCE_BASE_YEAR,
};
use polars::prelude::*;
use tracing::info;

/// Immutable historical slice (`period <= cutoff`) of a derived table.
#[derive(Debug, Clone)]
pub struct ReferenceWindow {
    cutoff: i32,
    frame: DataFrame,
}

impl ReferenceWindow {
    pub fn extract(derived: &DataFrame, cutoff: i32) -> Result<Self> {
        let frame = derived
            .clone()
            .lazy()
            .filter(col(columns::PERIOD).lt_eq(lit(cutoff)))
            .collect()?;
        info!(cutoff, rows = frame.height(), "extracted reference window");
        Ok(Self { cutoff, frame })
    }

    pub fn cutoff(&self) -> i32 {
        self.cutoff
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Goalposts for one variable: reference value is the mean over the
    /// base year, half-spread is half the range over the whole window.
    pub fn calibrate(&self, name: &str, polarity: Polarity) -> Result<IndexVariableSpec> {
        let base = self
            .frame
            .clone()
            .lazy()
            .filter(col(columns::PERIOD).eq(lit(REFERENCE_BASE_YEAR)))
            .select([col(name)])
            .collect()?;
        let reference_value = f64_column(&base, name)?
            .mean()
            .ok_or_else(|| NebError::MissingReferenceValue {
                variable: name.to_string(),
                year: REFERENCE_BASE_YEAR,
            })?;

        let values = f64_column(&self.frame, name)?;
        let (max, min) = match (values.max(), values.min()) {
            (Some(max), Some(min)) => (max, min),
            _ => {
                return Err(NebError::MissingReferenceValue {
                    variable: name.to_string(),
                    year: self.cutoff,
                })
            }
        };

        IndexVariableSpec::new(name, polarity, reference_value, (max - min) / 2.0)
    }

    /// Calibrate every index variable. Fails before any row is normalized
    /// if the window is degenerate for one of them.
    pub fn index_variables(&self) -> Result<IndexVariables> {
        let mut specs = Vec::with_capacity(INDEX_VARIABLES.len());
        for (name, polarity) in INDEX_VARIABLES {
            let spec = self.calibrate(name, polarity)?;
            info!(
                variable = %spec.name,
                reference_value = spec.reference_value,
                half_spread = spec.half_spread,
                "calibrated goalposts"
            );
            specs.push(spec);
        }
        Ok(IndexVariables::new(specs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::REFERENCE_CUTOFF_YEAR;

    fn derived() -> DataFrame {
        df![
            "region_key" => ["01", "02", "01", "02", "01"],
            "period" => [2005, 2005, 2010, 2010, 2018],
            "velocity" => [Some(4.0), Some(6.0), Some(2.0), None, Some(100.0)],
            "actualization" => [Some(0.2), Some(0.4), Some(0.1), Some(0.5), Some(9.0)]
        ]
        .unwrap()
    }

    #[test]
    fn test_window_excludes_years_after_cutoff() {
        let window = ReferenceWindow::extract(&derived(), REFERENCE_CUTOFF_YEAR).unwrap();
        assert_eq!(window.len(), 4);
        assert_eq!(window.cutoff(), 2017);
    }

    #[test]
    fn test_calibration() {
        let window = ReferenceWindow::extract(&derived(), REFERENCE_CUTOFF_YEAR).unwrap();
        let vars = window.index_variables().unwrap();
        assert_eq!(vars.len(), 2);

        let velocity = vars.get("velocity").unwrap();
        assert_eq!(velocity.polarity, Polarity::Neg);
        assert!((velocity.reference_value - 5.0).abs() < 1e-12);
        assert!((velocity.half_spread - 2.0).abs() < 1e-12);

        let actualization = vars.get("actualization").unwrap();
        assert_eq!(actualization.polarity, Polarity::Pos);
        assert!((actualization.reference_value - 0.3).abs() < 1e-12);
        assert!((actualization.half_spread - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_flat_window_is_degenerate() {
        let flat = df![
            "region_key" => ["01", "02"],
            "period" => [2005, 2006],
            "velocity" => [3.0, 3.0],
            "actualization" => [0.2, 0.4]
        ]
        .unwrap();
        let window = ReferenceWindow::extract(&flat, REFERENCE_CUTOFF_YEAR).unwrap();
        let err = window.index_variables().unwrap_err();
        assert!(matches!(
            err,
            NebError::DegenerateReferenceWindow { ref variable, .. } if variable == "velocity"
        ));
    }

    #[test]
    fn test_missing_base_year() {
        let late = df![
            "region_key" => ["01", "02"],
            "period" => [2008, 2009],
            "velocity" => [3.0, 5.0],
            "actualization" => [0.2, 0.4]
        ]
        .unwrap();
        let window = ReferenceWindow::extract(&late, REFERENCE_CUTOFF_YEAR).unwrap();
        assert!(matches!(
            window.index_variables(),
            Err(NebError::MissingReferenceValue { year: 2005, .. })
        ));
    }
}
