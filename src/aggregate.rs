//! Period-wise index aggregation.
//!
//! The derived table is partitioned by period, every partition is
//! normalized and reduced to an index on its own, and the partitions are
//! stacked back together. No value from one period reaches another.

use crate::error::Result;
use crate::model::{columns, IndexVariables};
use crate::normalize::normalize;
use polars::prelude::*;
use tracing::debug;

/// Row-wise geometric mean across `cols`. Null when any score is null,
/// zero or negative.
pub fn geometric_mean(cols: &[String]) -> Expr {
    let Some((first, rest)) = cols.split_first() else {
        return lit(NULL).cast(DataType::Float64);
    };

    let mut product = col(first);
    let mut all_positive = col(first).gt(lit(0.0));
    for name in rest {
        product = product * col(name);
        all_positive = all_positive.and(col(name).gt(lit(0.0)));
    }

    when(all_positive)
        .then(product.pow(lit(1.0 / cols.len() as f64)))
        .otherwise(lit(NULL).cast(DataType::Float64))
}

/// Normalize one period group and append its `index` column.
pub fn index_group(group: DataFrame, vars: &IndexVariables) -> Result<DataFrame> {
    let normalized = normalize(group, vars)?;
    let index = geometric_mean(&vars.normalized_columns()).alias(columns::INDEX);
    Ok(normalized.lazy().with_columns([index]).collect()?)
}

/// Partition by period, index each group independently, concatenate.
/// Every input row appears exactly once in the output.
pub fn index_by_period(frame: DataFrame, vars: &IndexVariables) -> Result<DataFrame> {
    if frame.height() == 0 {
        return index_group(frame, vars);
    }

    let groups = frame.partition_by_stable([columns::PERIOD], true)?;
    debug!(groups = groups.len(), "indexing period groups");

    let indexed = groups
        .into_iter()
        .map(|group| index_group(group, vars))
        .collect::<Result<Vec<_>>>()?;
    stack(indexed)
}

fn stack(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut frames = frames.into_iter();
    let Some(mut stacked) = frames.next() else {
        return Ok(DataFrame::empty());
    };
    for frame in frames {
        stacked.vstack_mut(&frame)?;
    }
    Ok(stacked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IndexVariableSpec, Polarity};

    fn vars() -> IndexVariables {
        IndexVariables::new(vec![
            IndexVariableSpec::new("velocity", Polarity::Neg, 5.0, 2.0).unwrap(),
            IndexVariableSpec::new("actualization", Polarity::Pos, 0.3, 0.2).unwrap(),
        ])
    }

    fn index_of(df: &DataFrame, region: &str, period: i32) -> Option<f64> {
        let keys = df.column("region_key").unwrap().str().unwrap();
        let periods = df.column("period").unwrap().i32().unwrap();
        let index = df.column("index").unwrap().f64().unwrap();
        (0..df.height())
            .find(|&i| keys.get(i) == Some(region) && periods.get(i) == Some(period))
            .and_then(|i| index.get(i))
    }

    #[test]
    fn test_geometric_mean_of_scores() {
        let df = df![
            "region_key" => ["01"],
            "period" => [2010],
            "velocity" => [5.0],
            "actualization" => [0.3]
        ]
        .unwrap();
        let out = index_by_period(df, &vars()).unwrap();
        assert!((index_of(&out, "01", 2010).unwrap() - 1.0).abs() < 1e-12);

        let df = df![
            "region_key" => ["01"],
            "period" => [2010],
            // normalized: 1.3 - (4/4)*0.6 = 0.7 and (0.4/0.4)*0.6+0.7 = 1.3
            "velocity" => [7.0],
            "actualization" => [0.5]
        ]
        .unwrap();
        let out = index_by_period(df, &vars()).unwrap();
        let expected = (0.7f64 * 1.3).sqrt();
        assert!((index_of(&out, "01", 2010).unwrap() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_non_positive_or_missing_scores_give_null_index() {
        let df = df![
            "region_key" => ["01", "02", "04"],
            "period" => [2010, 2010, 2010],
            // velocity 20 normalizes far below zero
            "velocity" => [Some(20.0), None, Some(5.0)],
            "actualization" => [Some(0.3), Some(0.3), Some(0.3)]
        ]
        .unwrap();
        let out = index_by_period(df, &vars()).unwrap();
        assert_eq!(out.height(), 3);
        assert_eq!(index_of(&out, "01", 2010), None);
        assert_eq!(index_of(&out, "02", 2010), None);
        assert!(index_of(&out, "04", 2010).is_some());
    }

    #[test]
    fn test_every_row_kept_once() {
        let df = df![
            "region_key" => ["01", "02", "01", "02", "01"],
            "period" => [2011, 2010, 2010, 2011, 2012],
            "velocity" => [4.0, 5.0, 6.0, 3.0, 5.5],
            "actualization" => [0.2, 0.3, 0.4, 0.25, 0.35]
        ]
        .unwrap();
        let out = index_by_period(df, &vars()).unwrap();
        assert_eq!(out.height(), 5);
        for (region, period) in [("01", 2011), ("02", 2010), ("01", 2010), ("02", 2011), ("01", 2012)] {
            assert!(index_of(&out, region, period).is_some());
        }
    }

    #[test]
    fn test_empty_frame() {
        let df = df![
            "region_key" => Vec::<String>::new(),
            "period" => Vec::<i32>::new(),
            "velocity" => Vec::<f64>::new(),
            "actualization" => Vec::<f64>::new()
        ]
        .unwrap();
        let out = index_by_period(df, &vars()).unwrap();
        assert_eq!(out.height(), 0);
        assert!(out.column("index").is_ok());
    }
}
