use std::sync::Arc;

use rand::Rng;

use crate::args::Distribution;
use crate::error::ConfigurationError;

/// Picks the target URL for each dispatch.
///
/// Owned by the pacer, so the round-robin cursor advances exactly once per
/// dispatch in dispatch order no matter how requests complete.
#[derive(Debug, Clone)]
pub struct TargetSelector {
    first: Arc<str>,
    targets: Vec<Arc<str>>,
    distribution: Distribution,
    cursor: usize,
}

impl TargetSelector {
    /// # Errors
    ///
    /// Returns an error when `targets` is empty.
    pub fn new(
        targets: Vec<Arc<str>>,
        distribution: Distribution,
    ) -> Result<Self, ConfigurationError> {
        let first = targets
            .first()
            .cloned()
            .ok_or(ConfigurationError::EmptyUrlList)?;
        Ok(Self {
            first,
            targets,
            distribution,
            cursor: 0,
        })
    }

    #[must_use]
    pub fn single(target: Arc<str>) -> Self {
        Self {
            first: Arc::clone(&target),
            targets: vec![target],
            distribution: Distribution::RoundRobin,
            cursor: 0,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn next_target(&mut self) -> Arc<str> {
        let len = self.targets.len();
        if len <= 1 {
            return Arc::clone(&self.first);
        }
        let idx = match self.distribution {
            Distribution::RoundRobin => {
                let idx = self.cursor;
                self.cursor = self.cursor.saturating_add(1).checked_rem(len).unwrap_or(0);
                idx
            }
            Distribution::Random => rand::thread_rng().gen_range(0..len),
        };
        self.targets
            .get(idx)
            .map_or_else(|| Arc::clone(&self.first), Arc::clone)
    }
}
