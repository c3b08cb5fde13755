//! In-process map → shuffle → reduce executor.
//!
//! A job fans its input splits out to parallel map tasks, routes every emitted
//! `(key, value)` pair to a reduce partition, sorts each partition by key and
//! hands every run of keys belonging to the same group to one reduce call.
//! Partition, sort and group rules all come from the [`ShuffleKey`] the stage
//! chooses, which is how the secondary-sort joins are expressed.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, info};
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::error::{PipelineError, Result};

/// Key of a shuffled record.
///
/// `Ord` is the full sort order inside a partition. `same_group` must agree
/// with it: keys of one group are contiguous once sorted. `partition_hash`
/// must feed identical bytes for every key of a group.
pub trait ShuffleKey: Ord {
    fn same_group(&self, other: &Self) -> bool;
    fn partition_hash<H: Hasher>(&self, state: &mut H);
}

/// Reduce partition of `key` among `partitions` buckets.
pub fn partition_for<K: ShuffleKey>(key: &K, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.partition_hash(&mut hasher);
    (hasher.finish() % partitions.max(1) as u64) as usize
}

/// Named job counters, summed across tasks once a phase completes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Counters(BTreeMap<&'static str, u64>);

impl Counters {
    pub fn increment(&mut self, name: &'static str, by: u64) {
        *self.0.entry(name).or_insert(0) += by;
    }

    pub fn get(&self, name: &str) -> u64 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn merge(&mut self, other: Counters) {
        for (name, value) in other.0 {
            self.increment(name, value);
        }
    }
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, value) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
            first = false;
        }
        Ok(())
    }
}

/// Per-map-task sink: partitioned output buckets plus the task's counters.
pub struct Emitter<K, V> {
    buckets: Vec<Vec<(K, V)>>,
    counters: Counters,
}

impl<K: ShuffleKey, V> Emitter<K, V> {
    fn new(partitions: usize) -> Self {
        Emitter {
            buckets: (0..partitions.max(1)).map(|_| Vec::new()).collect(),
            counters: Counters::default(),
        }
    }

    pub fn emit(&mut self, key: K, value: V) {
        let p = partition_for(&key, self.buckets.len());
        self.buckets[p].push((key, value));
    }

    pub fn increment(&mut self, counter: &'static str, by: u64) {
        self.counters.increment(counter, by);
    }
}

/// Per-partition sink for reduce calls.
pub struct ReduceContext<O> {
    output: Vec<O>,
    counters: Counters,
}

impl<O> ReduceContext<O> {
    pub fn new() -> Self {
        ReduceContext {
            output: Vec::new(),
            counters: Counters::default(),
        }
    }

    pub fn into_parts(self) -> (Vec<O>, Counters) {
        (self.output, self.counters)
    }

    pub fn write(&mut self, record: O) {
        self.output.push(record);
    }

    pub fn increment(&mut self, counter: &'static str, by: u64) {
        self.counters.increment(counter, by);
    }
}

impl<O> Default for ReduceContext<O> {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a finished job: one output vector per reduce partition.
pub struct JobOutput<O> {
    pub partitions: Vec<Vec<O>>,
    pub counters: Counters,
}

impl<O> JobOutput<O> {
    pub fn records(&self) -> impl Iterator<Item = &O> {
        self.partitions.iter().flatten()
    }

    pub fn into_records(self) -> Vec<O> {
        self.partitions.into_iter().flatten().collect()
    }
}

/// A single stage run on a shared worker pool.
pub struct Job<'p> {
    name: &'static str,
    partitions: usize,
    pool: &'p ThreadPool,
}

impl<'p> Job<'p> {
    pub fn new(name: &'static str, partitions: usize, pool: &'p ThreadPool) -> Self {
        Job {
            name,
            partitions: partitions.max(1),
            pool,
        }
    }

    /// Runs map tasks over `splits`, shuffles, then reduces every group.
    ///
    /// A panicking task fails the whole job.
    pub fn run<I, K, V, O, M, R>(&self, splits: Vec<I>, map: M, reduce: R) -> Result<JobOutput<O>>
    where
        I: Send,
        K: ShuffleKey + Send,
        V: Send,
        O: Send,
        M: Fn(I, &mut Emitter<K, V>) + Sync,
        R: Fn(Vec<(K, V)>, &mut ReduceContext<O>) + Sync,
    {
        let partitions = self.partitions;
        let name = self.name;
        info!("[{name}] starting: {} splits, {partitions} partitions", splits.len());

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.pool.install(|| {
                let emitters: Vec<Emitter<K, V>> = splits
                    .into_par_iter()
                    .map(|split| {
                        let mut emitter = Emitter::new(partitions);
                        map(split, &mut emitter);
                        emitter
                    })
                    .collect();

                let mut counters = Counters::default();
                let mut buckets: Vec<Vec<(K, V)>> = (0..partitions).map(|_| Vec::new()).collect();
                for emitter in emitters {
                    counters.merge(emitter.counters);
                    for (bucket, mut records) in buckets.iter_mut().zip(emitter.buckets) {
                        bucket.append(&mut records);
                    }
                }
                debug!("[{name}] map phase done: {counters}");

                let reduced: Vec<(Vec<O>, Counters)> = buckets
                    .into_par_iter()
                    .map(|mut bucket| {
                        bucket.sort_by(|a, b| a.0.cmp(&b.0));
                        let mut ctx = ReduceContext::new();
                        for group in into_groups(bucket) {
                            reduce(group, &mut ctx);
                        }
                        ctx.into_parts()
                    })
                    .collect();

                let mut output = Vec::with_capacity(partitions);
                for (records, task_counters) in reduced {
                    counters.merge(task_counters);
                    output.push(records);
                }
                JobOutput {
                    partitions: output,
                    counters,
                }
            })
        }));

        match outcome {
            Ok(out) => {
                info!("[{name}] finished: {}", out.counters);
                Ok(out)
            }
            Err(payload) => Err(PipelineError::StageFailed {
                stage: name,
                reason: panic_message(payload.as_ref()),
            }),
        }
    }
}

/// Splits a key-sorted vector into contiguous runs of the same group.
pub fn into_groups<K: ShuffleKey, V>(sorted: Vec<(K, V)>) -> Vec<Vec<(K, V)>> {
    let mut groups: Vec<Vec<(K, V)>> = Vec::new();
    for record in sorted {
        match groups.last_mut() {
            Some(group) if group[0].0.same_group(&record.0) => group.push(record),
            _ => groups.push(vec![record]),
        }
    }
    groups
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::hash::Hash;

    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
    struct WordPos {
        word: String,
        pos: u32,
    }

    impl ShuffleKey for WordPos {
        fn same_group(&self, other: &Self) -> bool {
            self.word == other.word
        }
        fn partition_hash<H: Hasher>(&self, state: &mut H) {
            self.word.hash(state);
        }
    }

    fn key(word: &str, pos: u32) -> WordPos {
        WordPos {
            word: word.to_string(),
            pos,
        }
    }

    fn pool() -> ThreadPool {
        rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    #[test]
    fn partition_ignores_secondary_part() {
        for n in 1..8 {
            assert_eq!(partition_for(&key("cat", 1), n), partition_for(&key("cat", 99), n));
        }
    }

    #[test]
    fn groups_are_contiguous_runs() {
        let sorted = vec![(key("a", 1), ()), (key("a", 2), ()), (key("b", 0), ())];
        let groups = into_groups(sorted);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 2);
        assert_eq!(groups[1][0].0.word, "b");
    }

    #[test]
    fn job_delivers_whole_groups_in_secondary_order() {
        let pool = pool();
        let job = Job::new("test", 3, &pool);
        let splits = vec![vec![("b", 3), ("a", 2)], vec![("a", 1), ("b", 1)], vec![("a", 3)]];
        let out = job
            .run(
                splits,
                |split: Vec<(&str, u32)>, em: &mut Emitter<WordPos, u32>| {
                    for (w, p) in split {
                        em.emit(key(w, p), p);
                        em.increment("emitted", 1);
                    }
                },
                |group: Vec<(WordPos, u32)>, ctx: &mut ReduceContext<(String, Vec<u32>)>| {
                    let word = group[0].0.word.clone();
                    let order = group.into_iter().map(|(_, v)| v).collect();
                    ctx.write((word, order));
                },
            )
            .unwrap();

        assert_eq!(out.counters.get("emitted"), 5);
        let mut records = out.into_records();
        records.sort();
        assert_eq!(
            records,
            vec![("a".to_string(), vec![1, 2, 3]), ("b".to_string(), vec![1, 3])]
        );
    }

    #[test]
    fn panicking_task_fails_the_job() {
        let pool = pool();
        let job = Job::new("boom", 2, &pool);
        let res = job.run(
            vec![1u32],
            |_: u32, _: &mut Emitter<WordPos, u32>| panic!("task exploded"),
            |_, _: &mut ReduceContext<u32>| {},
        );
        match res {
            Err(PipelineError::StageFailed { stage, reason }) => {
                assert_eq!(stage, "boom");
                assert!(reason.contains("task exploded"));
            }
            _ => panic!("expected StageFailed"),
        }
    }

    #[test]
    fn counters_display_sorted() {
        let mut c = Counters::default();
        c.increment("b", 2);
        c.increment("a", 1);
        c.increment("b", 1);
        assert_eq!(c.to_string(), "a=1, b=3");
    }
}
