pub mod core;
pub mod edgar;
pub mod fetch;
pub mod pipeline;
pub mod statements;
pub mod utils;
pub mod workbook;

pub use crate::core::{CancelFlag, EngineConfig, EngineError, Warning};
pub use pipeline::{Conversion, Pipeline};
pub use utils::progress::ProgressTracker;
