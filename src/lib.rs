// Ramp Transform - Core Library
// Resolves magnitude specifications against a taxonomy and ramps
// time-indexed tables from baseline toward target values

pub mod error;
pub mod taxonomy;      // Leaf / group / variable namespaces
pub mod magnitude;     // Magnitude spec, resolved entries, flat descriptor map
pub mod resolver;      // Key resolution: leaf → group → variable
pub mod filter;        // Category allow-lists
pub mod builder;       // Magnitude Descriptor Builder
pub mod time_periods;
pub mod ramp;
pub mod table;
pub mod applier;       // Ramp Applier
pub mod transform;     // scale / reduce-demand entry points
pub mod config;
pub mod db;            // SQLite output sink + run log

// Re-export commonly used types
pub use error::{Result, TransformError};
pub use taxonomy::{
    Taxonomy, TaxonomyBuilder, TaxonomyDefinition, TaxonomyIndex,
    LeafDefinition, GroupDefinition, VariableDefinition,
};
pub use magnitude::{
    Bounds, DescriptorMap, MagnitudeKind, MagnitudeSpec, MagnitudeValue, TransformationEntry,
};
pub use resolver::{KeyResolver, ResolvedKey};
pub use filter::CategoryFilter;
pub use builder::DescriptorBuilder;
pub use time_periods::{BaselinePeriod, TimePeriods};
pub use ramp::{RampConfig, RampShape, RampVector};
pub use table::{Column, Table};
pub use applier::{interpolate, ApplyOptions, RampApplier, TableFields};
pub use transform::{
    TransformContext, TransformMode, TransformOutcome, TransformRequest,
};
pub use config::{OutputConfig, OutputKind, TransformConfig};
pub use db::{get_runs, record_run, setup_database, write_table, RunRecord};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
