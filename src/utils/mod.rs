//! Utility functions and types

mod parallel;
mod table;
pub mod data_loader;

pub use parallel::{ordered_map, ParallelConfig};
pub use table::{column_names, labels_to_array1, table_to_array2};
pub use data_loader::{DataLoader, RecordedExplanations};
