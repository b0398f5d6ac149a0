use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::EngineResult;

/// Wall-clock budget for one request. Checked before every unit of work;
/// once expired, every check fails with `AnalysisTimeout`.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Duration>,
}

impl Deadline {
    pub fn unbounded() -> Self {
        Deadline {
            started: Instant::now(),
            limit: None,
        }
    }

    pub fn after(limit: Duration) -> Self {
        Deadline {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    pub fn from_millis(timeout_ms: Option<u64>) -> Self {
        match timeout_ms {
            Some(ms) => Deadline::after(Duration::from_millis(ms)),
            None => Deadline::unbounded(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn check(&self) -> EngineResult<()> {
        match self.limit {
            Some(limit) if self.started.elapsed() >= limit => Err(EngineError::AnalysisTimeout {
                limit_ms: limit.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }
}

impl Default for Deadline {
    fn default() -> Self {
        Deadline::unbounded()
    }
}
