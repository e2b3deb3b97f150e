pub mod aggregate;
pub mod config;
pub mod error;
pub mod export;
pub mod indicators;
pub mod joiner;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod reference;
pub mod regions;
pub mod shaper;
pub mod source;

pub use error::{NebError, Result};
pub use model::{
    Granularity, IndexVariableSpec, IndexVariables, IndexedRow, Polarity, RawSeriesRow, RawTable,
    SourceTable,
};
pub use pipeline::{compute_indexed_table, derive_table, index_with_variables, NebOutput, NebRun, SourceTables};
pub use reference::ReferenceWindow;
