//! Workload capability and a percentage-mix implementation.

use bytes::Bytes;
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::{BenchError, BenchResult};
use crate::operation::{Operation, OperationKind};

/// Source of operations.
///
/// `next_operation` must be a pure function of the supplied random source so runs are
/// reproducible under a fixed seed. Implementations are shared across phases and must be
/// `Send + Sync`.
pub trait Workload: Send + Sync {
    /// Produces the next operation to issue.
    fn next_operation(&self, rng: &mut dyn RngCore) -> Operation;
}

/// Workload mix defines the share of each operation kind (0.0-1.0, summing to 1.0).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadMix {
    /// Share of vector searches.
    pub search_pct: f32,

    /// Share of point reads.
    pub read_pct: f32,

    /// Share of single inserts.
    pub insert_pct: f32,

    /// Share of updates.
    pub update_pct: f32,

    /// Share of free-form queries.
    pub query_pct: f32,

    /// Share of bulk inserts.
    pub bulk_pct: f32,
}

impl Default for WorkloadMix {
    fn default() -> Self {
        Self {
            search_pct: 0.7,
            read_pct: 0.1,
            insert_pct: 0.2,
            update_pct: 0.0,
            query_pct: 0.0,
            bulk_pct: 0.0,
        }
    }
}

impl WorkloadMix {
    /// Validate that percentages are non-negative and sum to 1.0.
    pub fn validate(&self) -> BenchResult<()> {
        let shares = self.shares();
        if let Some((kind, pct)) = shares.iter().find(|(_, pct)| !pct.is_finite() || *pct < 0.0) {
            return Err(BenchError::invalid_config(format!(
                "workload share for {kind} must be >= 0, got {pct}"
            )));
        }

        let sum: f32 = shares.iter().map(|(_, pct)| pct).sum();
        if (sum - 1.0).abs() > 0.001 {
            return Err(BenchError::invalid_config(format!(
                "workload percentages sum to {sum}, expected 1.0"
            )));
        }

        Ok(())
    }

    /// Search-dominated mix (90% searches).
    pub fn read_heavy() -> Self {
        Self {
            search_pct: 0.9,
            read_pct: 0.05,
            insert_pct: 0.05,
            update_pct: 0.0,
            query_pct: 0.0,
            bulk_pct: 0.0,
        }
    }

    /// Ingest-dominated mix (30% searches, 50% inserts, 10% updates, 10% bulk).
    pub fn write_heavy() -> Self {
        Self {
            search_pct: 0.3,
            read_pct: 0.0,
            insert_pct: 0.5,
            update_pct: 0.1,
            query_pct: 0.0,
            bulk_pct: 0.1,
        }
    }

    /// Balanced mix across every kind.
    pub fn balanced() -> Self {
        Self {
            search_pct: 0.4,
            read_pct: 0.2,
            insert_pct: 0.2,
            update_pct: 0.1,
            query_pct: 0.05,
            bulk_pct: 0.05,
        }
    }

    /// Picks an operation kind from a uniform roll in `[0, 1)`.
    #[must_use]
    pub fn choose(&self, roll: f32) -> OperationKind {
        let mut cumulative = 0.0;
        for (kind, pct) in self.shares() {
            cumulative += pct;
            if roll < cumulative {
                return kind;
            }
        }
        // Rounding can leave the last bucket a hair short of 1.0.
        self.shares()
            .iter()
            .rev()
            .find(|(_, pct)| *pct > 0.0)
            .map_or(OperationKind::VectorSearch, |(kind, _)| *kind)
    }

    fn shares(&self) -> [(OperationKind, f32); 6] {
        [
            (OperationKind::VectorSearch, self.search_pct),
            (OperationKind::Read, self.read_pct),
            (OperationKind::Insert, self.insert_pct),
            (OperationKind::Update, self.update_pct),
            (OperationKind::Query, self.query_pct),
            (OperationKind::BulkInsert, self.bulk_pct),
        ]
    }
}

/// Shape parameters for [`MixedWorkload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixedWorkloadConfig {
    /// Operation kind shares.
    pub mix: WorkloadMix,

    /// Number of distinct document ids to address.
    pub key_space: u64,

    /// Vector dimension for searches.
    pub dimension: usize,

    /// Nearest neighbours requested per search.
    pub top_k: usize,

    /// Payload size for inserts and updates.
    pub payload_bytes: usize,

    /// Documents per bulk insert.
    pub bulk_size: usize,
}

impl Default for MixedWorkloadConfig {
    fn default() -> Self {
        Self {
            mix: WorkloadMix::default(),
            key_space: 100_000,
            dimension: 128,
            top_k: 10,
            payload_bytes: 512,
            bulk_size: 100,
        }
    }
}

/// Workload that draws operations according to a [`WorkloadMix`].
#[derive(Debug, Clone)]
pub struct MixedWorkload {
    config: MixedWorkloadConfig,
}

impl MixedWorkload {
    /// Creates a workload after validating the mix and shape parameters.
    pub fn new(config: MixedWorkloadConfig) -> BenchResult<Self> {
        config.mix.validate()?;
        if config.key_space == 0 {
            return Err(BenchError::invalid_config("key_space must be > 0"));
        }
        if config.dimension == 0 {
            return Err(BenchError::invalid_config("dimension must be > 0"));
        }
        if config.top_k == 0 {
            return Err(BenchError::invalid_config("top_k must be > 0"));
        }
        if config.bulk_size == 0 {
            return Err(BenchError::invalid_config("bulk_size must be > 0"));
        }
        Ok(Self { config })
    }

    /// Returns the configuration this workload was built with.
    #[must_use]
    pub fn config(&self) -> &MixedWorkloadConfig {
        &self.config
    }

    fn payload(&self, rng: &mut dyn RngCore) -> Bytes {
        let mut buf = vec![0u8; self.config.payload_bytes];
        rng.fill_bytes(&mut buf);
        Bytes::from(buf)
    }

    fn key(&self, rng: &mut dyn RngCore) -> u64 {
        rng.gen_range(0..self.config.key_space)
    }
}

impl Workload for MixedWorkload {
    fn next_operation(&self, rng: &mut dyn RngCore) -> Operation {
        let roll: f32 = rng.gen();
        match self.config.mix.choose(roll) {
            OperationKind::VectorSearch => Operation::VectorSearch {
                vector: (0..self.config.dimension)
                    .map(|_| rng.gen_range(-1.0f32..1.0))
                    .collect(),
                top_k: self.config.top_k,
                filter: None,
            },
            OperationKind::Read => Operation::Read { id: self.key(rng) },
            OperationKind::Insert => Operation::Insert {
                id: self.key(rng),
                payload: self.payload(rng),
            },
            OperationKind::Update => Operation::Update {
                id: self.key(rng),
                payload: self.payload(rng),
            },
            OperationKind::Query => {
                let id = self.key(rng);
                Operation::Query {
                    text: "SELECT * FROM documents WHERE id = $id".to_string(),
                    params: vec![("id".to_string(), id.to_string())],
                }
            }
            OperationKind::BulkInsert => Operation::BulkInsert {
                items: (0..self.config.bulk_size)
                    .map(|_| (self.key(rng), self.payload(rng)))
                    .collect(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_workload_mix_validation() {
        assert!(WorkloadMix::default().validate().is_ok());

        let invalid = WorkloadMix {
            search_pct: 0.5,
            insert_pct: 0.5,
            read_pct: 0.5, // Sum > 1.0
            ..Default::default()
        };
        assert!(invalid.validate().is_err());

        let negative = WorkloadMix {
            search_pct: 1.2,
            read_pct: -0.2,
            insert_pct: 0.0,
            ..Default::default()
        };
        assert!(negative.validate().is_err());
    }

    #[test]
    fn test_workload_presets() {
        assert!(WorkloadMix::read_heavy().validate().is_ok());
        assert!(WorkloadMix::write_heavy().validate().is_ok());
        assert!(WorkloadMix::balanced().validate().is_ok());
    }

    #[test]
    fn test_operation_selection() {
        let mix = WorkloadMix::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut counts = [0usize; 3];

        for _ in 0..1000 {
            match mix.choose(rng.gen()) {
                OperationKind::VectorSearch => counts[0] += 1,
                OperationKind::Read => counts[1] += 1,
                OperationKind::Insert => counts[2] += 1,
                other => panic!("unexpected kind {other}"),
            }
        }

        // Search should be ~70% (allow 10% variance)
        assert!(counts[0] > 600 && counts[0] < 800);
        // Insert should be ~20%
        assert!(counts[2] > 150 && counts[2] < 250);
    }

    #[test]
    fn test_choose_edge_roll() {
        let mix = WorkloadMix::write_heavy();
        assert_eq!(mix.choose(0.0), OperationKind::VectorSearch);
        // A roll at the very top falls into the last non-empty bucket.
        assert_eq!(mix.choose(0.999_999_9), OperationKind::BulkInsert);
    }

    #[test]
    fn test_same_seed_same_operations() {
        let workload = MixedWorkload::new(MixedWorkloadConfig {
            mix: WorkloadMix::balanced(),
            dimension: 8,
            payload_bytes: 16,
            bulk_size: 4,
            ..Default::default()
        })
        .unwrap();

        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..50 {
            assert_eq!(workload.next_operation(&mut a), workload.next_operation(&mut b));
        }
    }

    #[test]
    fn test_rejects_empty_key_space() {
        let err = MixedWorkload::new(MixedWorkloadConfig {
            key_space: 0,
            ..Default::default()
        })
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_search_shape() {
        let workload = MixedWorkload::new(MixedWorkloadConfig {
            mix: WorkloadMix {
                search_pct: 1.0,
                read_pct: 0.0,
                insert_pct: 0.0,
                ..Default::default()
            },
            dimension: 32,
            top_k: 5,
            ..Default::default()
        })
        .unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        match workload.next_operation(&mut rng) {
            Operation::VectorSearch { vector, top_k, .. } => {
                assert_eq!(vector.len(), 32);
                assert_eq!(top_k, 5);
            }
            other => panic!("expected search, got {other:?}"),
        }
    }
}
