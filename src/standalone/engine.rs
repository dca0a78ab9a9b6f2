use anyhow::{bail, Context, Result};
use bytes::Bytes;
use dashmap::DashMap;
use glob::glob;
use itertools::Itertools;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use super::Job;
use crate::{ihash, utils, CombineFn, JobStep, KeyValue, Workload};

// types related to this engine
type BucketIndex = u32;
type Buckets = DashMap<BucketIndex, Vec<KeyValue>>;

/// What a finished run did.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    /// Steps executed.
    pub steps: usize,
    /// Input files read by the first step.
    pub input_files: usize,
    /// Records the emitter rejected and the run skipped.
    pub records_skipped: u64,
    /// Output records written by the terminal step.
    pub output_records: usize,
}

/// Runs every step of `workload` over the job's input and writes the
/// terminal step's output to `mr-out-{bucket}` files under the job's
/// output directory.
///
/// Either every stage of every step succeeds and the full output is
/// written, or the run fails and writes nothing: a partial tally would
/// silently corrupt the ranking, so there is no degraded mode.
pub fn run_job(job: &Job, workload: &Workload) -> Result<RunSummary> {
    if workload.steps.is_empty() {
        bail!("workload has no steps");
    }
    if job.num_buckets == 0 {
        bail!("a job needs at least one shuffle bucket");
    }

    let serialized_args = Bytes::from(serde_json::to_string(&job.args)?);
    if let Some(check_args) = workload.check_args {
        check_args(serialized_args.clone()).context("invalid workload arguments")?;
    }

    let run_id = Uuid::new_v4();
    let mut carried = read_inputs(&job.input)?;
    if carried.is_empty() {
        bail!("no input files matched `{}`", job.input);
    }

    let mut summary = RunSummary {
        steps: workload.steps.len(),
        input_files: carried.len(),
        ..Default::default()
    };
    info!(%run_id, files = summary.input_files, steps = summary.steps, "starting job");

    let last = workload.steps.len() - 1;
    let mut terminal = Vec::new();
    for (step_no, step) in workload.steps.iter().enumerate() {
        let span = info_span!("step", %run_id, step = step_no + 1);
        let _guard = span.enter();

        let inputs = std::mem::take(&mut carried);
        let (buckets, skipped) =
            perform_map(step, inputs, &serialized_args, job.num_buckets)?;
        summary.records_skipped += skipped;
        debug!(buckets = buckets.len(), "shuffle complete");

        let reduced = perform_reduce(step, buckets, &serialized_args)?;
        let produced: usize = reduced.iter().map(|(_, pairs)| pairs.len()).sum();
        info!(pairs = produced, skipped, "step complete");

        if step_no == last {
            terminal = reduced;
        } else {
            // Shuffle boundary: the next step re-groups these pairs by
            // whatever keys this step's reduce emitted.
            carried = reduced.into_iter().flat_map(|(_, pairs)| pairs).collect();
        }
    }

    summary.output_records = write_output(&job.output, &terminal)?;
    info!(
        %run_id,
        output_records = summary.output_records,
        records_skipped = summary.records_skipped,
        "job complete"
    );
    Ok(summary)
}

/// Reads every file matching the input glob, one `KeyValue` per file with
/// the path as key and the raw contents as value.
fn read_inputs(pattern: &str) -> Result<Vec<KeyValue>> {
    let mut inputs = Vec::new();
    for pathspec in glob(pattern)?.flatten() {
        let mut buf = Vec::new();
        {
            // a scope so that the file is closed right after reading
            let mut file = File::open(&pathspec)
                .with_context(|| format!("opening input `{}`", pathspec.display()))?;
            file.read_to_end(&mut buf)?;
        }
        let filename = pathspec.to_string_lossy().into_owned();
        inputs.push(KeyValue::new(Bytes::from(filename), Bytes::from(buf)));
    }
    Ok(inputs)
}

/// Maps a step's inputs across parallel workers, each over a disjoint
/// partition, and shuffles the (locally combined) pairs into buckets by
/// `ihash(key) % num_buckets`. Returns the buckets and how many records
/// the emitter rejected.
fn perform_map(
    step: &JobStep,
    inputs: Vec<KeyValue>,
    aux: &Bytes,
    num_buckets: u32,
) -> Result<(Buckets, u64)> {
    let buckets = Buckets::new();
    let partition_len = inputs
        .len()
        .div_ceil(rayon::current_num_threads().max(1))
        .max(1);

    let skipped = inputs
        .par_chunks(partition_len)
        .map(|partition| map_partition(step, partition, aux, num_buckets, &buckets))
        .try_reduce(|| 0, |a, b| Ok(a + b))?;

    Ok((buckets, skipped))
}

/// One worker: map a partition of inputs, pre-aggregate the emitted pairs
/// locally, and push them into the shared shuffle buckets. No state is
/// shared with other workers until the bucket insert.
fn map_partition(
    step: &JobStep,
    partition: &[KeyValue],
    aux: &Bytes,
    num_buckets: u32,
    buckets: &Buckets,
) -> Result<u64> {
    let mut local: HashMap<Bytes, Vec<Bytes>> = HashMap::new();
    let mut skipped = 0u64;

    for input_kv in partition {
        match step.map_fn {
            Some(map_fn) => {
                let source = utils::string_from_bytes(input_kv.key()).unwrap_or_default();
                for item in map_fn(input_kv.clone(), aux.clone())? {
                    match item {
                        Ok(KeyValue { key, value }) => local.entry(key).or_default().push(value),
                        Err(error) => {
                            skipped += 1;
                            warn!(source = %source, %error, "skipping malformed record");
                        }
                    }
                }
            }
            // No map function: the pairs are already keyed for this
            // step's grouping and go straight to the shuffle.
            None => local
                .entry(input_kv.key())
                .or_default()
                .push(input_kv.value()),
        }
    }

    spill_local(step.combine_fn, local, aux, num_buckets, buckets)?;
    Ok(skipped)
}

/// Applies the step's combine function to one worker's buffered pairs,
/// then distributes them into the shuffle buckets. Combining here, before
/// the bucket insert, is what keeps shuffle volume proportional to the
/// number of distinct local keys rather than emitted pairs.
fn spill_local(
    combine_fn: Option<CombineFn>,
    local: HashMap<Bytes, Vec<Bytes>>,
    aux: &Bytes,
    num_buckets: u32,
    buckets: &Buckets,
) -> Result<()> {
    for (key, values) in local {
        let bucket_no = ihash(&key) % num_buckets;
        let values = match combine_fn {
            Some(combine_fn) => {
                vec![combine_fn(key.clone(), Box::new(values.into_iter()), aux.clone())?]
            }
            None => values,
        };
        buckets
            .entry(bucket_no)
            .or_default()
            .extend(values.into_iter().map(|value| KeyValue {
                key: key.clone(),
                value,
            }));
    }
    Ok(())
}

/// Reduces every bucket of one step. A key's pairs never span buckets, so
/// buckets reduce independently and in parallel; within a bucket the pairs
/// are sorted and grouped by key. Output pairs stay grouped by bucket so
/// a terminal step can write one file per bucket.
fn perform_reduce(
    step: &JobStep,
    buckets: Buckets,
    aux: &Bytes,
) -> Result<Vec<(BucketIndex, Vec<KeyValue>)>> {
    let reduce_fn = step.reduce_fn;
    let mut reduced = buckets
        .into_par_iter()
        .map(|(bucket_no, mut pairs)| {
            pairs.sort_unstable_by_key(KeyValue::key);
            let mut out = Vec::new();
            for (key, value_group) in &pairs.into_iter().chunk_by(KeyValue::key) {
                let values = value_group.map(KeyValue::into_value);
                out.extend(reduce_fn(key, Box::new(values), aux.clone())?);
            }
            Ok((bucket_no, out))
        })
        .collect::<Result<Vec<_>>>()?;
    reduced.sort_unstable_by_key(|(bucket_no, _)| *bucket_no);
    Ok(reduced)
}

/// Writes the terminal step's output, one `mr-out-{bucket}` file per
/// non-empty bucket, each value verbatim. Runs only after every reduce
/// has succeeded.
fn write_output(output_dir: &str, reduced: &[(BucketIndex, Vec<KeyValue>)]) -> Result<usize> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("creating output directory `{output_dir}`"))?;

    let mut written = 0;
    for (bucket_no, pairs) in reduced {
        if pairs.is_empty() {
            continue;
        }
        let out_pathspec = format!("{output_dir}/mr-out-{bucket_no}");
        let mut out_file = File::create(&out_pathspec)
            .with_context(|| format!("creating output file `{out_pathspec}`"))?;
        for kv in pairs {
            out_file.write_all(&kv.value)?;
            written += 1;
        }
    }
    Ok(written)
}
