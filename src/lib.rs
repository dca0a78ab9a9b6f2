//! Per-category top-K token frequencies over a labeled text corpus.
//!
//! Users describe an analysis as a sequence of map/combine/reduce steps
//! over key-value pairs, and the standalone engine runs those steps over
//! disjoint input partitions in parallel. All data stays in process for
//! the lifetime of a run; there is no external shuffle service.

use bytes::Bytes;
use std::hash::Hasher;

pub mod ingest;
pub mod standalone;
pub mod text;
pub mod utils;
pub mod workload;

/////////////////////////////////////////////////////////////////////////////
// Pipeline stage types
/////////////////////////////////////////////////////////////////////////////

/// The output of an application map function.
///
/// There are 2 layers of [`anyhow::Result`]s here. The outer layer
/// accounts for errors that arise while setting up the iterator.
/// The inner layer accounts for individual records that could not be
/// turned into pairs: the engine skips and counts those instead of
/// failing the run.
pub type MapOutput = anyhow::Result<Box<dyn Iterator<Item = anyhow::Result<KeyValue>>>>;

/// A map function takes a key-value pair and auxiliary arguments.
///
/// It returns an iterator that yields new key-value pairs.
pub type MapFn = fn(kv: KeyValue, aux: Bytes) -> MapOutput;

/// A combine function pre-aggregates the values buffered under one key
/// inside a single map worker, before anything crosses the shuffle
/// boundary. It returns the combined value for that key.
///
/// Combining is purely a volume optimization: running a step with its
/// combine function removed must produce identical output.
pub type CombineFn = fn(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    aux: Bytes,
) -> anyhow::Result<Bytes>;

/// A reduce function takes in a key, an iterator over all values grouped
/// under that key, and an auxiliary argument. It returns the pairs it
/// wants to emit, under whatever keys it chooses.
///
/// Pairs emitted by a non-terminal step are re-partitioned by their new
/// key and fed to the next step; pairs emitted by the terminal step become
/// the job's output records.
pub type ReduceFn = fn(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    aux: Bytes,
) -> anyhow::Result<Vec<KeyValue>>;

/// Validates a workload's serialized auxiliary arguments.
///
/// The engine calls this before any stage runs, so a bad configuration
/// (an out-of-range `--max-words`, say) fails the submission instead of
/// surfacing halfway through round one.
pub type CheckArgsFn = fn(aux: Bytes) -> anyhow::Result<()>;

/// One map/combine/reduce round of a job.
///
/// A step without a map function takes the previous step's output pairs
/// straight into the shuffle, re-grouping them by the keys the previous
/// reduce emitted.
#[derive(Copy, Clone)]
pub struct JobStep {
    pub map_fn: Option<MapFn>,
    pub combine_fn: Option<CombineFn>,
    pub reduce_fn: ReduceFn,
}

/// A pipeline application: its steps, in execution order.
///
/// Whenever an analysis must re-group by a different key between two
/// reductions (a single pass cannot both aggregate by one key and rank by
/// another), it carries one step per grouping.
#[derive(Clone)]
pub struct Workload {
    pub steps: Vec<JobStep>,
    pub check_args: Option<CheckArgsFn>,
}

/////////////////////////////////////////////////////////////////////////////
// Key-value pairs
/////////////////////////////////////////////////////////////////////////////

/// A single key-value pair.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct KeyValue {
    /// The key.
    pub key: Bytes,
    /// The value.
    pub value: Bytes,
}

impl KeyValue {
    /// Construct a new key-value pair from the given key and value.
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }

    /// Get the key of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn key(&self) -> Bytes {
        self.key.clone()
    }

    /// Get the value of this key-value pair.
    ///
    /// This method is cheap, since [`Bytes`] are cheaply cloneable.
    #[inline]
    pub fn value(&self) -> Bytes {
        self.value.clone()
    }

    /// Consumes the key-value pair and returns the value.
    #[inline]
    pub fn into_value(self) -> Bytes {
        self.value
    }
}

/// Hashes an intermediate key. Compute a shuffle bucket for a given key
/// by calculating `ihash(key) % num_buckets`.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    hasher.write(key);
    let value = hasher.finish() & 0x7fffffff;
    u32::try_from(value).expect("Failed to compute ihash of value")
}
