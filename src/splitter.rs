//! Train/validation partitioning, optionally stratified by class.
//!
//! The splitter owns a seedable RNG so both the plain Fisher–Yates shuffle
//! and the stratified variant's final reshuffles are reproducible when
//! constructed with [`DataSplitter::seeded`].

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::data::Point;

/// A dataset partitioned into training and validation subsets.
///
/// `all` is the concatenation of both partitions with the validation tags
/// applied, for combined display.
#[derive(Debug, Clone, Default)]
pub struct SplitData {
    /// Points reserved for training.
    pub training: Vec<Point>,
    /// Points reserved for validation.
    pub validation: Vec<Point>,
    /// `training ++ validation`, tagged.
    pub all: Vec<Point>,
}

/// Per-class partition counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassCounts {
    /// Samples of this class in the training partition.
    pub training: usize,
    /// Samples of this class in the validation partition.
    pub validation: usize,
}

/// Summary of a split.
#[derive(Debug, Clone, Serialize)]
pub struct SplitStatistics {
    /// Total samples across both partitions.
    pub total: usize,
    /// Training partition size.
    pub training: usize,
    /// Validation partition size.
    pub validation: usize,
    /// Achieved validation fraction.
    pub validation_fraction: f64,
    /// Per-class partition counts, keyed by label.
    pub per_class: BTreeMap<u32, ClassCounts>,
}

impl SplitData {
    /// Computes partition counts and the per-class breakdown.
    #[must_use]
    pub fn statistics(&self) -> SplitStatistics {
        let total = self.all.len();
        let mut per_class: BTreeMap<u32, ClassCounts> = BTreeMap::new();
        for point in &self.training {
            per_class.entry(point.label).or_default().training += 1;
        }
        for point in &self.validation {
            per_class.entry(point.label).or_default().validation += 1;
        }
        SplitStatistics {
            total,
            training: self.training.len(),
            validation: self.validation.len(),
            validation_fraction: if total == 0 {
                0.0
            } else {
                self.validation.len() as f64 / total as f64
            },
            per_class,
        }
    }
}

/// Partitions datasets into train/validation subsets.
#[derive(Debug, Clone)]
pub struct DataSplitter {
    rng: ChaCha8Rng,
}

impl Default for DataSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSplitter {
    /// Creates a splitter with entropy-seeded randomness.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Creates a splitter whose shuffles are reproducible for a given seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Splits `data` at `1 - validation_split`, optionally shuffling a copy
    /// first.
    ///
    /// A fraction outside `[0, 1)` yields everything as training with an
    /// empty validation partition; empty input yields empty partitions.
    pub fn split(&mut self, data: &[Point], validation_split: f64, shuffle: bool) -> SplitData {
        if data.is_empty() {
            return SplitData::default();
        }
        if !(0.0..1.0).contains(&validation_split) {
            let training: Vec<Point> = data
                .iter()
                .map(|p| Point {
                    is_validation: false,
                    ..*p
                })
                .collect();
            return SplitData {
                all: training.clone(),
                training,
                validation: Vec::new(),
            };
        }

        let mut shuffled: Vec<Point> = data.to_vec();
        if shuffle {
            shuffled.shuffle(&mut self.rng);
        }

        let cut = (shuffled.len() as f64 * (1.0 - validation_split)).floor() as usize;
        Self::assemble(shuffled, cut)
    }

    /// Splits each class at the same fraction, preserving per-class
    /// proportions in both partitions even under class imbalance.
    ///
    /// Points are shuffled within their class group, split per group, and
    /// the combined training and validation sets are then reshuffled
    /// independently so the per-class block ordering does not survive.
    pub fn stratified_split(&mut self, data: &[Point], validation_split: f64) -> SplitData {
        if data.is_empty() {
            return SplitData::default();
        }
        if !(0.0..1.0).contains(&validation_split) {
            return self.split(data, validation_split, false);
        }

        let mut by_class: BTreeMap<u32, Vec<Point>> = BTreeMap::new();
        for point in data {
            by_class.entry(point.label).or_default().push(*point);
        }

        let mut training = Vec::with_capacity(data.len());
        let mut validation = Vec::new();
        for (_, mut group) in by_class {
            group.shuffle(&mut self.rng);
            let cut = (group.len() as f64 * (1.0 - validation_split)).floor() as usize;
            validation.extend_from_slice(&group[cut..]);
            group.truncate(cut);
            training.append(&mut group);
        }

        training.shuffle(&mut self.rng);
        validation.shuffle(&mut self.rng);

        let cut = training.len();
        training.extend(validation);
        Self::assemble(training, cut)
    }

    fn assemble(mut points: Vec<Point>, cut: usize) -> SplitData {
        for (index, point) in points.iter_mut().enumerate() {
            point.is_validation = index >= cut;
        }
        let validation = points.split_off(cut);
        let training = points;
        let mut all = Vec::with_capacity(training.len() + validation.len());
        all.extend_from_slice(&training);
        all.extend_from_slice(&validation);
        SplitData {
            training,
            validation,
            all,
        }
    }
}
