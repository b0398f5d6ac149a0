pub mod aggregator;
pub mod analysis;
pub mod deadline;
pub mod error;
pub mod model;
pub mod rate_solver;
pub mod time_value;
pub mod types;
pub mod validation;

pub use aggregator::{analyze_request, AnalysisRequest, AnalysisResponse};
pub use error::EngineError;
pub use types::*;

/// Standard result type for all engine operations
pub type EngineResult<T> = Result<T, EngineError>;
