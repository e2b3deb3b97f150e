//! Derived ratio indicators.
//!
//! Every ratio is null when either operand is null or the denominator is
//! zero. Nothing here fails on bad arithmetic; incomplete regions simply
//! carry nulls into the later stages.

use crate::error::Result;
use crate::model::columns;
use polars::prelude::*;

/// `numerator / denominator`, undefined results become null.
pub fn ratio(numerator: Expr, denominator: Expr) -> Expr {
    when(denominator.clone().eq(lit(0.0)))
        .then(lit(NULL).cast(DataType::Float64))
        .otherwise(numerator / denominator)
        .fill_nan(lit(NULL).cast(DataType::Float64))
}

/// The four indicator expressions computed from joined raw columns.
pub fn indicator_exprs() -> Vec<Expr> {
    vec![
        col(columns::AVG_SPEED_ANNUAL).alias(columns::VELOCITY),
        ratio(col(columns::BF), col(columns::BA)).alias(columns::ACTUALIZATION),
        (ratio(col(columns::BF), col(columns::POPULATION)) * lit(100.0)).alias(columns::BF_PER_CAPITA),
        ratio(col(columns::BF_MARCH_SHIFT), col(columns::FIRMS)).alias(columns::NEWNESS),
    ]
}

/// Append `velocity`, `actualization`, `bf_per_capita` and `newness`.
pub fn derive_indicators(joined: DataFrame) -> Result<DataFrame> {
    Ok(joined.lazy().with_columns(indicator_exprs()).collect()?)
}
