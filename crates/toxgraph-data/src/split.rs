//! Train / validation / test index splits.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{DataError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitFractions {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitFractions {
    fn default() -> Self {
        Self {
            train: 0.8,
            val: 0.1,
            test: 0.1,
        }
    }
}

impl SplitFractions {
    fn validate(&self) -> Result<()> {
        let parts = [self.train, self.val, self.test];
        if parts.iter().any(|f| !(0.0..=1.0).contains(f)) {
            return Err(DataError::InvalidSplit(format!("fractions must lie in [0, 1]: {:?}", self)));
        }
        if (parts.iter().sum::<f64>() - 1.0).abs() > 1e-8 {
            return Err(DataError::InvalidSplit(format!("fractions must sum to 1: {:?}", self)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
    pub test: Vec<usize>,
}

fn cut(indices: Vec<usize>, fractions: SplitFractions) -> Split {
    let len = indices.len();
    let train_end = (fractions.train * len as f64).floor() as usize;
    let val_end = ((fractions.train + fractions.val) * len as f64).floor() as usize;
    let val_end = val_end.clamp(train_end, len);
    Split {
        train: indices[..train_end].to_vec(),
        val: indices[train_end..val_end].to_vec(),
        test: indices[val_end..].to_vec(),
    }
}

/// Contiguous blocks in dataset order.
pub fn consecutive_split(len: usize, fractions: SplitFractions) -> Result<Split> {
    fractions.validate()?;
    Ok(cut((0..len).collect(), fractions))
}

/// Indices shuffled with a seeded RNG, then cut into blocks. The same seed
/// always gives the same split.
pub fn random_split(len: usize, fractions: SplitFractions, seed: u64) -> Result<Split> {
    fractions.validate()?;
    let mut indices: Vec<usize> = (0..len).collect();
    indices.shuffle(&mut StdRng::seed_from_u64(seed));
    Ok(cut(indices, fractions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_consecutive() {
        let split = consecutive_split(10, SplitFractions::default()).unwrap();
        assert_eq!(split.train, (0..8).collect::<Vec<_>>());
        assert_eq!(split.val, vec![8]);
        assert_eq!(split.test, vec![9]);
    }

    #[test]
    fn test_random_is_seeded_partition() {
        let a = random_split(100, SplitFractions::default(), 42).unwrap();
        let b = random_split(100, SplitFractions::default(), 42).unwrap();
        assert_eq!(a, b);
        assert_eq!((a.train.len(), a.val.len(), a.test.len()), (80, 10, 10));

        let mut all: Vec<usize> = a.train.iter().chain(&a.val).chain(&a.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_bad_fractions() {
        let fractions = SplitFractions { train: 0.9, val: 0.2, test: 0.1 };
        assert!(matches!(consecutive_split(10, fractions), Err(DataError::InvalidSplit(_))));
    }
}
