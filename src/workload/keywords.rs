//! Top keywords per category.
//!
//! Two rounds. Round one counts how often every token appears within
//! every category across the whole corpus: the emitter turns each record
//! into `((token, category), 1)` pairs, workers pre-sum their own pairs
//! before shuffle, and the reducer totals each `(token, category)` key and
//! re-keys its result by category. Round two regroups those totals by
//! category and keeps the K most frequent tokens of each.
//!
//! A record labeled with several categories contributes its tokens fully
//! and independently to every one of them.

use crate::ingest::{self, RecordFormat};
use crate::{text, utils, JobStep, KeyValue, MapOutput, Workload};
use anyhow::{anyhow, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use clap::Parser;
use serde::{Deserialize, Serialize};

/// Separates token from category in round-one keys. Tokens are lowercase
/// alphabetic runs, so a tab can never occur inside one.
const KEY_SEP: u8 = b'\t';

#[derive(Parser, Debug, Serialize, Deserialize)]
#[clap(no_binary_name = true)]
struct Args {
    /// How many words to keep from the top of each category.
    #[clap(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    max_words: u64,

    /// Input record encoding.
    #[clap(short, long, value_enum, default_value = "csv")]
    format: RecordFormat,
}

fn parse_args(aux: &Bytes) -> Result<Args> {
    Ok(Args::try_parse_from(serde_json::from_slice::<Vec<String>>(aux)?)?)
}

/// Rejects a bad `--max-words` or `--format` before any stage runs.
pub fn check_args(aux: Bytes) -> Result<()> {
    parse_args(&aux).map(|_| ())
}

/// The two-step job: count, then rank.
pub fn workload() -> Workload {
    Workload {
        steps: vec![
            JobStep {
                map_fn: Some(map),
                combine_fn: Some(combine),
                reduce_fn: reduce,
            },
            JobStep {
                map_fn: None,
                combine_fn: None,
                reduce_fn: select_top_k,
            },
        ],
        check_args: Some(check_args),
    }
}

fn pair_key(token: &str, category: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(token.len() + category.len() + 1);
    buf.put_slice(token.as_bytes());
    buf.put_u8(KEY_SEP);
    buf.put_slice(category.as_bytes());
    buf.freeze()
}

fn split_pair_key(key: &Bytes) -> Result<(Bytes, Bytes)> {
    let at = key
        .iter()
        .position(|&b| b == KEY_SEP)
        .ok_or_else(|| anyhow!("intermediate key is missing its separator"))?;
    Ok((key.slice(..at), key.slice(at + 1..)))
}

/// Round-one map: emit `((token, category), 1)` for every token of every
/// category of every record in the input buffer, `|tokens| * |categories|`
/// pairs per record.
///
/// Records with no text or no labels contribute nothing and are not
/// errors. Structurally malformed records surface as `Err` items so the
/// engine can skip and count them instead of failing the run.
pub fn map(kv: KeyValue, aux: Bytes) -> MapOutput {
    let args = parse_args(&aux)?;
    let raw = String::from_utf8(kv.value.as_ref().into())?;

    let mut keys = Vec::new();
    let mut failures = Vec::new();
    for parsed in ingest::parse_records(args.format, &raw) {
        match parsed {
            Ok(record) => {
                let tokens = text::tokenize(&record.text);
                for category in &record.categories {
                    for token in &tokens {
                        keys.push(pair_key(token, category));
                    }
                }
            }
            Err(err) => failures.push(err),
        }
    }

    let mut value_buf = BytesMut::with_capacity(keys.len() * 8);
    let pairs = keys.into_iter().map(move |key| {
        value_buf.put_u64(1);
        Ok(KeyValue {
            key,
            value: value_buf.split().freeze(),
        })
    });
    Ok(Box::new(pairs.chain(failures.into_iter().map(Err))))
}

/// Round-one combine: sum one worker's counts for a `(token, category)`
/// key before anything crosses the shuffle boundary.
pub fn combine(
    _key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Bytes> {
    let count: u64 = values.map(|mut value| value.get_u64()).sum();

    let mut writer = BytesMut::with_capacity(8);
    writer.put_u64(count);
    Ok(writer.freeze())
}

/// Round-one reduce: total the partial counts of one `(token, category)`
/// key and re-key the result by category, carrying `(count, token)` into
/// round two.
pub fn reduce(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    _aux: Bytes,
) -> Result<Vec<KeyValue>> {
    let (token, category) = split_pair_key(&key)?;
    let count: u64 = values.map(|mut value| value.get_u64()).sum();

    let mut value_buf = BytesMut::with_capacity(8 + token.len());
    value_buf.put_u64(count);
    value_buf.put_slice(&token);
    Ok(vec![KeyValue {
        key: category,
        value: value_buf.freeze(),
    }])
}

/// Round-two reduce: rank one category's tokens by global count,
/// descending, and keep the first `--max-words`.
///
/// Equal counts order lexicographically by token, so a run's output does
/// not depend on shuffle arrival order. A category with fewer distinct
/// tokens than K emits all of them, fully ranked.
pub fn select_top_k(
    key: Bytes,
    values: Box<dyn Iterator<Item = Bytes> + '_>,
    aux: Bytes,
) -> Result<Vec<KeyValue>> {
    let args = parse_args(&aux)?;

    let mut ranked = values
        .map(|mut value| {
            let count = value.get_u64();
            let token = String::from_utf8(value.to_vec())?;
            Ok((token, count))
        })
        .collect::<Result<Vec<_>>>()?;
    ranked.sort_unstable_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(args.max_words as usize);
    if ranked.is_empty() {
        return Ok(Vec::new());
    }

    let category = utils::string_from_bytes(key.clone())?;
    let line = format!("{}\t{}\n", category, serde_json::to_string(&ranked)?);
    Ok(vec![KeyValue {
        key,
        value: utils::string_to_bytes(line),
    }])
}
