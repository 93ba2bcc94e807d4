#![cfg(unix)]
#![allow(missing_docs)]

//! Command line behaviour: output format and exit status.

mod common;

use common::{Corpus, init_test_logging};
use std::process::{Command, Output};

fn judgebench(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_judgebench"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("run judgebench")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn all_passing_exits_zero() {
    init_test_logging();
    let corpus = Corpus::new();
    corpus.case(0, "echo a\n").case(1, "echo b\n");
    corpus.write_judge_toml(1);

    let output = judgebench(&["--testcase-dir", corpus.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(
        stdout(&output),
        "Testcase 00 Passed!\nTestcase 01 Passed!\n2 / 2 testcase passed.\n"
    );
}

#[test]
fn failures_exit_one_unless_lenient() {
    init_test_logging();
    let corpus = Corpus::new();
    corpus.case(0, "echo a\n").case(1, "# CRASH\necho b\n");
    corpus.write_judge_toml(1);
    let dir = corpus.path().to_str().unwrap();

    let strict = judgebench(&["--testcase-dir", dir]);
    assert_eq!(strict.status.code(), Some(1));
    assert!(stdout(&strict).ends_with("1 / 2 testcase passed.\n"));

    let lenient = judgebench(&["--testcase-dir", dir, "--lenient"]);
    assert_eq!(lenient.status.code(), Some(0));
}

#[test]
fn max_id_override_changes_the_denominator() {
    init_test_logging();
    let corpus = Corpus::new();
    corpus.case(0, "echo a\n");
    corpus.write_judge_toml(29);

    let output = judgebench(&[
        "--config",
        corpus.file("judge.toml").to_str().unwrap(),
        "--max-id",
        "0",
    ]);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout(&output), "Testcase 00 Passed!\n1 / 1 testcase passed.\n");
}

#[test]
fn json_flag_prints_one_document() {
    init_test_logging();
    let corpus = Corpus::new();
    corpus.case(0, "echo a\n");
    corpus.write_judge_toml(0);

    let output = judgebench(&["--testcase-dir", corpus.path().to_str().unwrap(), "--json"]);

    assert_eq!(output.status.code(), Some(0));
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(doc["summary"]["passed"], 1);
    assert_eq!(doc["cases"][0]["id"], 0);
}

#[test]
fn broken_configuration_exits_two() {
    init_test_logging();
    let corpus = Corpus::new();
    std::fs::write(corpus.file("judge.toml"), "max_idd = 3\n").unwrap();

    let output = judgebench(&["--testcase-dir", corpus.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("Error: "));
}

#[test]
fn failed_project_build_exits_two_without_verdicts() {
    init_test_logging();
    let corpus = Corpus::new();
    corpus.case(0, "echo a\n");
    corpus.write_judge_toml(0);
    let mut text = std::fs::read_to_string(corpus.file("judge.toml")).unwrap();
    text.push_str(
        "\n[candidate.project]\nbuild_dir = \"build\"\n\
         configure = [\"sh\", \"-c\", \"exit 1\"]\nbuild = [\"true\"]\n",
    );
    std::fs::write(corpus.file("judge.toml"), text).unwrap();

    let output = judgebench(&["--testcase-dir", corpus.path().to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("candidate configure failed"));
}
