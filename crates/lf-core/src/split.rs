//! Train/dev/test split vocabulary.
//!
//! [`Split`] is the per-image assignment stored in `images.split`;
//! [`SplitRatio`] is the percentage triple used to compute assignments.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Split membership of a single image.
///
/// Persisted lowercase; parsing is case-insensitive and the empty string
/// maps to [`Split::Unassigned`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Not yet assigned to any split
    #[default]
    #[serde(rename = "")]
    Unassigned,
    /// Training set
    Training,
    /// Development / validation set
    Dev,
    /// Held-out test set
    Test,
}

impl Split {
    /// The three assignable splits, in export order.
    pub const ASSIGNED: [Split; 3] = [Split::Training, Split::Dev, Split::Test];

    /// Canonical storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Unassigned => "",
            Split::Training => "training",
            Split::Dev => "dev",
            Split::Test => "test",
        }
    }

    /// Whether the image has been placed in one of the three splits.
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Split::Unassigned)
    }

    /// Parse a stored or user-supplied value, canonicalizing case.
    pub fn parse(value: &str) -> CoreResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" => Ok(Split::Unassigned),
            "training" => Ok(Split::Training),
            "dev" => Ok(Split::Dev),
            "test" => Ok(Split::Test),
            _ => Err(CoreError::InvalidSplit {
                value: value.to_string(),
            }),
        }
    }
}

impl FromStr for Split {
    type Err = CoreError;

    fn from_str(s: &str) -> CoreResult<Self> {
        Split::parse(s)
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Split::Unassigned => write!(f, "unassigned"),
            other => write!(f, "{}", other.as_str()),
        }
    }
}

/// Percentage triple for train/dev/test. Must sum to exactly 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitRatio {
    pub train_ratio: u32,
    pub dev_ratio: u32,
    pub test_ratio: u32,
}

/// Per-split sizes produced by [`SplitRatio::partition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SplitSizes {
    pub training: usize,
    pub dev: usize,
    pub test: usize,
}

impl SplitSizes {
    pub fn total(&self) -> usize {
        self.training + self.dev + self.test
    }
}

impl SplitRatio {
    /// Build and validate a ratio.
    pub fn new(train_ratio: u32, dev_ratio: u32, test_ratio: u32) -> CoreResult<Self> {
        let ratio = Self {
            train_ratio,
            dev_ratio,
            test_ratio,
        };
        ratio.validate()?;
        Ok(ratio)
    }

    /// Check the sum-to-100 invariant.
    pub fn validate(&self) -> CoreResult<()> {
        let invalid = |reason: String| CoreError::InvalidRatio {
            train: self.train_ratio,
            dev: self.dev_ratio,
            test: self.test_ratio,
            reason,
        };
        let parts = [self.train_ratio, self.dev_ratio, self.test_ratio];
        if let Some(over) = parts.iter().find(|&&p| p > 100) {
            return Err(invalid(format!("{over} is above 100")));
        }
        let sum: u64 = parts.iter().map(|&p| u64::from(p)).sum();
        if sum != 100 {
            return Err(invalid(format!("ratios sum to {sum}, expected 100")));
        }
        Ok(())
    }

    /// Partition `n` items: floor for training and dev, remainder to test.
    ///
    /// `training + dev + test == n` always holds, even for a ratio that
    /// failed [`validate`](Self::validate).
    pub fn partition(&self, n: usize) -> SplitSizes {
        let share = |ratio: u32| n.saturating_mul(ratio.min(100) as usize) / 100;
        let training = share(self.train_ratio).min(n);
        let dev = share(self.dev_ratio).min(n - training);
        SplitSizes {
            training,
            dev,
            test: n - training - dev,
        }
    }

    /// Which split the item at `index` of a shuffled `n`-item list falls into.
    pub fn split_for_index(sizes: &SplitSizes, index: usize) -> Split {
        if index < sizes.training {
            Split::Training
        } else if index < sizes.training + sizes.dev {
            Split::Dev
        } else {
            Split::Test
        }
    }
}

impl Default for SplitRatio {
    fn default() -> Self {
        Self {
            train_ratio: 70,
            dev_ratio: 20,
            test_ratio: 10,
        }
    }
}

impl fmt::Display for SplitRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.train_ratio, self.dev_ratio, self.test_ratio
        )
    }
}

impl FromStr for SplitRatio {
    type Err = CoreError;

    /// Parse `"70/20/10"` (also accepts `:` or `,` separators).
    fn from_str(s: &str) -> CoreResult<Self> {
        let parts: Vec<&str> = s.split(['/', ':', ',']).map(str::trim).collect();
        let invalid = |reason: &str| CoreError::InvalidRatio {
            train: 0,
            dev: 0,
            test: 0,
            reason: format!("'{s}': {reason}"),
        };
        if parts.len() != 3 {
            return Err(invalid("expected three values like 70/20/10"));
        }
        let mut values = [0u32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid("values must be integers"))?;
        }
        SplitRatio::new(values[0], values[1], values[2])
    }
}

#[cfg(test)]
#[path = "split_test.rs"]
mod tests;
