//! Allocator configuration.

use crate::error::AllocError;
use crate::size_class::{MAX_SIZE_CLASSES, NUM_SIZE_CLASSES};
use crate::CHUNK_SIZE;

/// Bumps requests that fall in `[from, until)` up to `to` bytes before the
/// normal size adjustment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoundingPolicy {
    pub from: usize,
    pub until: usize,
    pub to: usize,
}

impl RoundingPolicy {
    /// `[448, 512)` rounded to 512.
    pub const DEFAULT: RoundingPolicy = RoundingPolicy {
        from: 448,
        until: 512,
        to: 512,
    };

    #[inline]
    pub const fn apply(&self, size: usize) -> usize {
        if size >= self.from && size < self.until {
            self.to
        } else {
            size
        }
    }
}

/// Tunables for a [`SegAlloc`](crate::SegAlloc).
///
/// All values are fixed once the arena is initialised.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocConfig {
    /// Minimum number of bytes requested from the memory source per growth.
    ///
    /// Default: 4096. Rounded up to a multiple of 8.
    pub chunk_size: usize,

    /// Number of segregated free-list buckets.
    ///
    /// Default: 17. Must be within `1..=MAX_SIZE_CLASSES`.
    pub size_classes: usize,

    /// Optional request rounding applied before size adjustment.
    pub rounding: Option<RoundingPolicy>,
}

impl AllocConfig {
    pub const fn new() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            size_classes: NUM_SIZE_CLASSES,
            rounding: Some(RoundingPolicy::DEFAULT),
        }
    }

    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub const fn with_size_classes(mut self, size_classes: usize) -> Self {
        self.size_classes = size_classes;
        self
    }

    pub const fn with_rounding(mut self, rounding: Option<RoundingPolicy>) -> Self {
        self.rounding = rounding;
        self
    }

    /// Reject configurations the arena layout cannot represent.
    pub fn validate(&self) -> Result<(), AllocError> {
        if self.chunk_size == 0 {
            return Err(AllocError::InvalidConfig("chunk_size must be non-zero"));
        }
        if self.chunk_size > u32::MAX as usize / 2 {
            return Err(AllocError::InvalidConfig("chunk_size exceeds the arena limit"));
        }
        if self.size_classes == 0 || self.size_classes > MAX_SIZE_CLASSES {
            return Err(AllocError::InvalidConfig(
                "size_classes must be within 1..=MAX_SIZE_CLASSES",
            ));
        }
        if let Some(policy) = self.rounding {
            if policy.from > policy.until || policy.to < policy.until {
                return Err(AllocError::InvalidConfig(
                    "rounding target must not shrink requests",
                ));
            }
        }
        Ok(())
    }
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_reference_tuning() {
        let config = AllocConfig::default();
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.size_classes, 17);
        assert_eq!(config.rounding, Some(RoundingPolicy::DEFAULT));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rounding_window_is_half_open() {
        let policy = RoundingPolicy::DEFAULT;
        assert_eq!(policy.apply(447), 447);
        assert_eq!(policy.apply(448), 512);
        assert_eq!(policy.apply(511), 512);
        assert_eq!(policy.apply(512), 512);
        assert_eq!(policy.apply(513), 513);
    }

    #[test]
    fn invalid_configs_rejected() {
        assert!(AllocConfig::new().with_chunk_size(0).validate().is_err());
        assert!(AllocConfig::new().with_size_classes(0).validate().is_err());
        assert!(
            AllocConfig::new()
                .with_size_classes(MAX_SIZE_CLASSES + 1)
                .validate()
                .is_err()
        );
        let shrinking = RoundingPolicy {
            from: 100,
            until: 200,
            to: 50,
        };
        assert!(
            AllocConfig::new()
                .with_rounding(Some(shrinking))
                .validate()
                .is_err()
        );
    }
}
