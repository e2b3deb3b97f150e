use crate::error::Result;
use crate::model::columns;
use polars::prelude::*;
use tracing::{debug, warn};

/// Left-joins secondary tables onto a primary table by (region, period).
pub struct TableJoiner {
    keys: Vec<String>,
}

impl Default for TableJoiner {
    fn default() -> Self {
        Self::new(vec![columns::REGION_KEY.to_string(), columns::PERIOD.to_string()])
    }
}

impl TableJoiner {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys }
    }

    /// One output row per primary row. Secondary tables lose their
    /// `region` label column so it cannot collide with the primary's;
    /// keys missing from a secondary leave that table's columns null.
    pub fn join(&self, primary: DataFrame, secondaries: Vec<DataFrame>) -> Result<DataFrame> {
        let row_count_before = primary.height();
        let key_cols: Vec<Expr> = self.keys.iter().map(|c| col(c)).collect();

        let mut joined = primary.lazy();
        for secondary in secondaries {
            let secondary = if secondary.column(columns::REGION).is_ok() {
                secondary.drop(columns::REGION)?
            } else {
                secondary
            };
            joined = joined.join(
                secondary.lazy(),
                key_cols.clone(),
                key_cols.clone(),
                JoinArgs::new(JoinType::Left),
            );
        }
        let result = joined.collect()?;

        // Duplicate keys in a secondary table multiply rows.
        let row_count_after = result.height();
        if row_count_after != row_count_before {
            warn!(
                before = row_count_before,
                after = row_count_after,
                "join changed the primary row count; secondary keys are not unique"
            );
        } else {
            debug!(rows = row_count_after, "joined source tables");
        }

        Ok(result)
    }
}
