pub mod error;
pub mod scan;
pub mod types;
pub mod values;

pub use scan::{ColumnMetadata, Scanner};
pub use values::{Extractor, ValueSet};
