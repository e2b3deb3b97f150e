//! Goalpost normalization.
//!
//! Affine map anchored at the reference value (score 1.0). One half-spread
//! below the reference lands on 0.7 for positive polarity and on 1.3 for
//! negative polarity.

use crate::error::Result;
use crate::model::{IndexVariableSpec, IndexVariables, Polarity};
use polars::prelude::*;

const SCALE: f64 = 0.6;
const POS_FLOOR: f64 = 0.7;
const NEG_CEILING: f64 = 1.3;

/// Normalize one raw value.
pub fn goalpost(spec: &IndexVariableSpec, raw: f64) -> f64 {
    let position = (raw - (spec.reference_value - spec.half_spread)) / (2.0 * spec.half_spread);
    match spec.polarity {
        Polarity::Pos => position * SCALE + POS_FLOOR,
        Polarity::Neg => NEG_CEILING - position * SCALE,
    }
}

/// Column expression for `<name>_normalized`. Null raw values stay null.
pub fn goalpost_expr(spec: &IndexVariableSpec) -> Expr {
    let position = (col(&spec.name) - lit(spec.reference_value - spec.half_spread))
        / lit(2.0 * spec.half_spread);
    let normalized = match spec.polarity {
        Polarity::Pos => position * lit(SCALE) + lit(POS_FLOOR),
        Polarity::Neg => lit(NEG_CEILING) - position * lit(SCALE),
    };
    normalized.alias(&spec.normalized_column())
}

/// Append a normalized column for every index variable.
pub fn normalize(frame: DataFrame, vars: &IndexVariables) -> Result<DataFrame> {
    let exprs: Vec<Expr> = vars.iter().map(goalpost_expr).collect();
    Ok(frame.lazy().with_columns(exprs).collect()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(polarity: Polarity) -> IndexVariableSpec {
        IndexVariableSpec::new("actualization", polarity, 0.37, 0.11).unwrap()
    }

    #[test]
    fn test_reference_maps_to_one() {
        for polarity in [Polarity::Pos, Polarity::Neg] {
            let s = spec(polarity);
            assert!((goalpost(&s, s.reference_value) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_lower_goalpost() {
        let pos = spec(Polarity::Pos);
        assert_eq!(goalpost(&pos, pos.reference_value - pos.half_spread), 0.7);
        let neg = spec(Polarity::Neg);
        assert_eq!(goalpost(&neg, neg.reference_value - neg.half_spread), 1.3);
    }

    #[test]
    fn test_upper_goalpost() {
        let pos = spec(Polarity::Pos);
        assert!((goalpost(&pos, pos.reference_value + pos.half_spread) - 1.3).abs() < 1e-12);
        let neg = spec(Polarity::Neg);
        assert!((goalpost(&neg, neg.reference_value + neg.half_spread) - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_frame_matches_scalar() {
        let vars = IndexVariables::new(vec![
            IndexVariableSpec::new("velocity", Polarity::Neg, 5.0, 2.0).unwrap(),
            IndexVariableSpec::new("actualization", Polarity::Pos, 0.3, 0.2).unwrap(),
        ]);
        let frame = df![
            "velocity" => [Some(3.0), Some(6.5), None],
            "actualization" => [Some(0.1), Some(0.45), Some(0.3)]
        ]
        .unwrap();

        let out = normalize(frame, &vars).unwrap();
        let velocity = out.column("velocity_normalized").unwrap().f64().unwrap();
        let actualization = out.column("actualization_normalized").unwrap().f64().unwrap();

        let v = vars.get("velocity").unwrap();
        let a = vars.get("actualization").unwrap();
        assert!((velocity.get(0).unwrap() - goalpost(v, 3.0)).abs() < 1e-12);
        assert!((velocity.get(1).unwrap() - goalpost(v, 6.5)).abs() < 1e-12);
        assert_eq!(velocity.get(2), None);
        assert!((actualization.get(0).unwrap() - 0.7).abs() < 1e-12);
        assert!((actualization.get(1).unwrap() - goalpost(a, 0.45)).abs() < 1e-12);
        assert!((actualization.get(2).unwrap() - 1.0).abs() < 1e-12);
    }
}
