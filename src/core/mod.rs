pub mod cancel;
pub mod config;
pub mod error;

pub use cancel::CancelFlag;
pub use config::{EngineConfig, SignConvention};
pub use error::{EngineError, Result, Warning, Warnings};
