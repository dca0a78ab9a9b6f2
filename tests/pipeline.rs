//! End-to-end runs of the top-keywords job through the standalone engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use topklite::standalone::{engine, Job};
use topklite::workload;

type Ranking = Vec<(String, u64)>;

fn write_corpus(dir: &Path, files: &[(&str, &str)]) {
    for (name, contents) in files {
        fs::write(dir.join(name), contents).unwrap();
    }
}

fn submit(input: &Path, output: &Path, num_buckets: u32, args: &[&str]) -> Job {
    Job {
        input: input.to_string_lossy().into_owned(),
        workload: "top-keywords".to_string(),
        output: output.to_string_lossy().into_owned(),
        num_buckets,
        args: args.iter().map(|s| s.to_string()).collect(),
    }
}

/// Collects every output line into `category -> ordered (token, count)`.
fn read_rankings(output_dir: &Path) -> BTreeMap<String, Ranking> {
    let mut rankings = BTreeMap::new();
    for entry in fs::read_dir(output_dir).unwrap() {
        let contents = fs::read_to_string(entry.unwrap().path()).unwrap();
        for line in contents.lines() {
            let (category, list) = line.split_once('\t').unwrap();
            let ranking: Ranking = serde_json::from_str(list).unwrap();
            let previous = rankings.insert(category.to_string(), ranking);
            assert!(previous.is_none(), "category `{category}` emitted twice");
        }
    }
    rankings
}

#[test]
fn ranks_top_keywords_per_category() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(
        dir.path(),
        &[
            ("a.csv", "Dark Knight Rises,Action\n"),
            ("b.csv", "Dark Water,Action|Drama\n"),
        ],
    );
    let out = dir.path().join("out");

    let app = workload::named("top-keywords").unwrap();
    let summary = engine::run_job(
        &submit(&dir.path().join("*.csv"), &out, 11, &["--max-words", "2"]),
        &app,
    )
    .unwrap();

    assert_eq!(summary.input_files, 2);
    assert_eq!(summary.records_skipped, 0);

    let rankings = read_rankings(&out);
    // No category beyond the ones present in the corpus.
    assert_eq!(rankings.len(), 2);
    // `dark` leads Action with 2; the count-1 tie resolves to the
    // lexicographically first token.
    assert_eq!(
        rankings["Action"],
        vec![("dark".to_string(), 2), ("knight".to_string(), 1)]
    );
    assert_eq!(
        rankings["Drama"],
        vec![("dark".to_string(), 1), ("water".to_string(), 1)]
    );
}

#[test]
fn multi_category_records_contribute_fully_to_each_label() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), &[("a.csv", "Dark Water,Action|Drama\n")]);
    let out = dir.path().join("out");

    let app = workload::named("top-keywords").unwrap();
    engine::run_job(
        &submit(&dir.path().join("*.csv"), &out, 11, &["--max-words", "10"]),
        &app,
    )
    .unwrap();

    let rankings = read_rankings(&out);
    // No count splitting between categories: both labels see both tokens.
    let expected = vec![("dark".to_string(), 1), ("water".to_string(), 1)];
    assert_eq!(rankings["Action"], expected);
    assert_eq!(rankings["Drama"], expected);
}

#[test]
fn category_totals_are_conserved_across_partitions() {
    let dir = tempfile::tempdir().unwrap();
    // 9 Action (record, token) occurrences spread over three files.
    write_corpus(
        dir.path(),
        &[
            ("a.csv", "Dark Knight Rises,Action\nDark City,Action\n"),
            ("b.csv", "Dark Water,Action|Drama\n"),
            ("c.csv", "The Dark,Action\n"),
        ],
    );
    let out = dir.path().join("out");

    let app = workload::named("top-keywords").unwrap();
    engine::run_job(
        &submit(&dir.path().join("*.csv"), &out, 11, &["--max-words", "100"]),
        &app,
    )
    .unwrap();

    let rankings = read_rankings(&out);
    let action_total: u64 = rankings["Action"].iter().map(|(_, count)| count).sum();
    assert_eq!(action_total, 9);
    assert_eq!(rankings["Action"][0], ("dark".to_string(), 4));
    let drama_total: u64 = rankings["Drama"].iter().map(|(_, count)| count).sum();
    assert_eq!(drama_total, 2);
}

#[test]
fn omitting_the_combiner_does_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(
        dir.path(),
        &[
            ("a.csv", "Dark Knight Rises,Action\nDark Water,Action|Drama\n"),
            ("b.csv", "Knight And Day,Action|Comedy\n"),
        ],
    );
    let out_combined = dir.path().join("out-combined");
    let out_plain = dir.path().join("out-plain");

    let combined = workload::named("top-keywords").unwrap();
    let mut plain = combined.clone();
    plain.steps[0].combine_fn = None;

    engine::run_job(
        &submit(&dir.path().join("*.csv"), &out_combined, 11, &["--max-words", "3"]),
        &combined,
    )
    .unwrap();
    engine::run_job(
        &submit(&dir.path().join("*.csv"), &out_plain, 11, &["--max-words", "3"]),
        &plain,
    )
    .unwrap();

    assert_eq!(read_rankings(&out_combined), read_rankings(&out_plain));
}

#[test]
fn bucket_count_does_not_change_output() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(
        dir.path(),
        &[
            ("a.csv", "Dark Knight Rises,Action\nDark Water,Action|Drama\n"),
            ("b.csv", "Water World,Action\n"),
        ],
    );
    let out_one = dir.path().join("out-one");
    let out_many = dir.path().join("out-many");

    let app = workload::named("top-keywords").unwrap();
    engine::run_job(
        &submit(&dir.path().join("*.csv"), &out_one, 1, &["--max-words", "2"]),
        &app,
    )
    .unwrap();
    engine::run_job(
        &submit(&dir.path().join("*.csv"), &out_many, 11, &["--max-words", "2"]),
        &app,
    )
    .unwrap();

    assert_eq!(read_rankings(&out_one), read_rankings(&out_many));
}

#[test]
fn repeated_runs_are_identical() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(
        dir.path(),
        &[("a.csv", "Dark Water,Action|Drama\nDark Knight Rises,Action\n")],
    );
    let out_first = dir.path().join("out-first");
    let out_second = dir.path().join("out-second");

    let app = workload::named("top-keywords").unwrap();
    for out in [&out_first, &out_second] {
        engine::run_job(
            &submit(&dir.path().join("*.csv"), out, 11, &["--max-words", "2"]),
            &app,
        )
        .unwrap();
    }

    assert_eq!(read_rankings(&out_first), read_rankings(&out_second));
}

#[test]
fn malformed_records_are_skipped_and_counted() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(
        dir.path(),
        &[("a.csv", "this line has no genre field\nDark Water,Drama\n")],
    );
    let out = dir.path().join("out");

    let app = workload::named("top-keywords").unwrap();
    let summary = engine::run_job(
        &submit(&dir.path().join("*.csv"), &out, 11, &["--max-words", "5"]),
        &app,
    )
    .unwrap();

    assert_eq!(summary.records_skipped, 1);
    let rankings = read_rankings(&out);
    assert_eq!(
        rankings["Drama"],
        vec![("dark".to_string(), 1), ("water".to_string(), 1)]
    );
}

#[test]
fn empty_text_records_contribute_nothing_without_failing() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), &[("a.csv", ",Action\nDark Water,Action\n")]);
    let out = dir.path().join("out");

    let app = workload::named("top-keywords").unwrap();
    let summary = engine::run_job(
        &submit(&dir.path().join("*.csv"), &out, 11, &["--max-words", "5"]),
        &app,
    )
    .unwrap();

    assert_eq!(summary.records_skipped, 0);
    assert_eq!(
        read_rankings(&out)["Action"],
        vec![("dark".to_string(), 1), ("water".to_string(), 1)]
    );
}

#[test]
fn jsonl_corpus_is_supported() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(
        dir.path(),
        &[(
            "a.jsonl",
            "{\"text\": \"dark knight rises\", \"categories\": [\"Action\"]}\n{\"text\": \"dark water\", \"categories\": [\"Action\", \"Drama\"]}\n",
        )],
    );
    let out = dir.path().join("out");

    let app = workload::named("top-keywords").unwrap();
    engine::run_job(
        &submit(
            &dir.path().join("*.jsonl"),
            &out,
            11,
            &["--max-words", "2", "--format", "jsonl"],
        ),
        &app,
    )
    .unwrap();

    let rankings = read_rankings(&out);
    assert_eq!(
        rankings["Action"],
        vec![("dark".to_string(), 2), ("knight".to_string(), 1)]
    );
    assert_eq!(
        rankings["Drama"],
        vec![("dark".to_string(), 1), ("water".to_string(), 1)]
    );
}

#[test]
fn invalid_max_words_is_rejected_before_any_stage() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), &[("a.csv", "Dark Water,Drama\n")]);
    let out = dir.path().join("out");

    let app = workload::named("top-keywords").unwrap();
    let result = engine::run_job(
        &submit(&dir.path().join("*.csv"), &out, 11, &["--max-words", "0"]),
        &app,
    );

    assert!(result.is_err());
    assert!(!out.exists());
}
