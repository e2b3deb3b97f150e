//! Pipeline entry points.
//!
//! `compute_indexed_table` runs one granularity against a reference
//! window supplied by the caller. `NebRun` is the orchestrator: it takes
//! the window from the state-level table once and hands the same snapshot
//! to the state and us passes.

use crate::aggregate::index_by_period;
use crate::error::Result;
use crate::indicators::derive_indicators;
use crate::joiner::TableJoiner;
use crate::model::{Granularity, IndexVariables, IndexedRow, RawTable, REFERENCE_CUTOFF_YEAR};
use crate::reference::ReferenceWindow;
use crate::shaper::shape_rows;
use polars::prelude::DataFrame;
use tracing::info;

/// The four raw tables of one granularity.
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub bfs: RawTable,
    pub bfs_march_shift: RawTable,
    pub bds: RawTable,
    pub pep: RawTable,
}

/// Join all sources onto business formation and derive the indicators.
pub fn derive_table(sources: &SourceTables) -> Result<DataFrame> {
    let primary = sources.bfs.to_frame()?;
    let secondaries = vec![
        sources.pep.to_frame()?,
        sources.bds.to_frame()?,
        sources.bfs_march_shift.to_frame()?,
    ];
    let joined = TableJoiner::default().join(primary, secondaries)?;
    derive_indicators(joined)
}

/// Normalize, aggregate per period and shape an already derived table.
pub fn index_with_variables(
    granularity: Granularity,
    derived: DataFrame,
    vars: &IndexVariables,
) -> Result<Vec<IndexedRow>> {
    let indexed = index_by_period(derived, vars)?;
    let rows = shape_rows(indexed, granularity)?;
    info!(%granularity, rows = rows.len(), "computed indexed table");
    Ok(rows)
}

/// Indexed table for one granularity, calibrated against `reference`.
pub fn compute_indexed_table(
    granularity: Granularity,
    sources: &SourceTables,
    reference: &ReferenceWindow,
) -> Result<Vec<IndexedRow>> {
    let vars = reference.index_variables()?;
    let derived = derive_table(sources)?;
    index_with_variables(granularity, derived, &vars)
}

/// Result of a full run.
#[derive(Debug, Clone)]
pub struct NebOutput {
    pub state: Vec<IndexedRow>,
    pub us: Vec<IndexedRow>,
    pub variables: IndexVariables,
}

impl NebOutput {
    /// State rows followed by us rows.
    pub fn rows(&self) -> impl Iterator<Item = &IndexedRow> {
        self.state.iter().chain(self.us.iter())
    }

    pub fn len(&self) -> usize {
        self.state.len() + self.us.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct NebRun;

impl NebRun {
    /// Reference window for a run, always taken from state-level data.
    pub fn reference_window(state: &SourceTables) -> Result<ReferenceWindow> {
        let derived = derive_table(state)?;
        ReferenceWindow::extract(&derived, REFERENCE_CUTOFF_YEAR)
    }

    pub fn execute(state: &SourceTables, us: &SourceTables) -> Result<NebOutput> {
        let state_derived = derive_table(state)?;
        let reference = ReferenceWindow::extract(&state_derived, REFERENCE_CUTOFF_YEAR)?;
        let variables = reference.index_variables()?;

        let state_rows = index_with_variables(Granularity::State, state_derived, &variables)?;
        let us_rows = compute_indexed_table(Granularity::Us, us, &reference)?;

        Ok(NebOutput {
            state: state_rows,
            us: us_rows,
            variables,
        })
    }
}
