//! CLI behaviour: full runs, stage-by-stage runs, exports and failures.
//
// Every test works inside its own temp dir; the binary is never run against
// the repository's working directory.

use std::fs;
use std::path::Path;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use regex::Regex;

const CORPUS: &str = "\
chase\tdogs/NNS/nsubj/2 chase/VB/ROOT/0 cats/NNS/dobj/2\t6\t2001,6
chase\tcats/NNS/nsubj/2 chase/VB/ROOT/0 mice/NNS/dobj/2\t4\t2001,4
hunt\tcats/NNS/nsubj/2 hunt/VB/ROOT/0 mice/NNS/dobj/2\t3\t2002,3
hunt\towls/NNS/nsubj/2 hunt/VB/ROOT/0\t2\t2003,2
eat\tcats/NNS/nsubj/2 eat/VB/ROOT/0 fish/NN/dobj/2\t5\t2004,5
";

const GOLD: &str = "\
chase hunt true
hunt eat false
chased eating false
";

fn write_inputs(dir: &assert_fs::TempDir) {
    dir.child("corpus/ngrams.txt").write_str(CORPUS).unwrap();
    dir.child("gold.txt").write_str(GOLD).unwrap();
}

fn cmd(dir: &Path) -> std::process::Command {
    let mut cmd = std::process::Command::cargo_bin("syntactic_similarity").unwrap();
    cmd.current_dir(dir);
    cmd
}

fn output_lines(dir: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for entry in fs::read_dir(dir).unwrap().filter_map(|e| e.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with("part-r-") {
            let content = fs::read_to_string(entry.path()).unwrap();
            lines.extend(content.lines().map(String::from));
        }
    }
    lines.sort();
    lines
}

fn vector_line_regex() -> Regex {
    let number = r"(-?\d+\.\d+(e-?\d+)?|-?\d+e-?\d+|Infinity)";
    Regex::new(&format!(r"^\S+ \S+ \S+\t\[{number}(, {number}){{23}}\]$")).unwrap()
}

#[test]
fn run_writes_well_formed_vectors() {
    let dir = assert_fs::TempDir::new().unwrap();
    write_inputs(&dir);

    cmd(dir.path())
        .args([
            "run", "--corpus", "corpus", "--gold", "gold.txt", "--work-dir", "work", "--output",
            "out", "--partitions", "2", "--split-lines", "2",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("out"));

    dir.child("out/_SUCCESS").assert(predicate::path::exists());
    dir.child("work/totals").assert("L 38\nF 38\n");
    dir.child("work/counts/_SUCCESS").assert(predicate::path::exists());
    dir.child("work/inverted/_SUCCESS").assert(predicate::path::exists());
    dir.child("work/measures/_SUCCESS").assert(predicate::path::exists());

    let lines = output_lines(&dir.path().join("out"));
    assert_eq!(lines.len(), 3);
    let re = vector_line_regex();
    for line in &lines {
        assert!(re.is_match(line), "bad output line: {line}");
        assert!(!line.contains("NaN"));
    }
    // gold words are stemmed, file order is kept
    assert!(lines.iter().any(|l| l.starts_with("chase eat false\t")));
    assert!(lines.iter().any(|l| l.starts_with("chase hunt true\t")));
    assert!(lines.iter().any(|l| l.starts_with("hunt eat false\t")));
}

#[test]
fn stage_by_stage_matches_full_run() {
    let dir = assert_fs::TempDir::new().unwrap();
    write_inputs(&dir);
    let p = dir.path();

    cmd(p)
        .args(["run", "--corpus", "corpus", "--gold", "gold.txt", "--work-dir", "w1"])
        .args(["--output", "full", "--partitions", "3"])
        .assert()
        .success();

    cmd(p)
        .args(["count", "corpus", "w2/counts", "--totals", "w2/totals", "--partitions", "3"])
        .assert()
        .success();
    cmd(p)
        .args(["invert", "w2/counts", "w2/inverted", "--partitions", "3"])
        .assert()
        .success();
    cmd(p)
        .args(["measure", "w2/inverted", "w2/measures", "--totals", "w2/totals"])
        .args(["--partitions", "3"])
        .assert()
        .success();
    cmd(p)
        .args(["join", "w2/measures", "staged", "--gold", "gold.txt", "--partitions", "3"])
        .assert()
        .success();

    assert_eq!(output_lines(&p.join("full")), output_lines(&p.join("staged")));
}

#[test]
fn config_file_drives_the_run() {
    let dir = assert_fs::TempDir::new().unwrap();
    write_inputs(&dir);
    dir.child("pipeline.json")
        .write_str(
            r#"{
                "corpus": "corpus",
                "gold_standard": "gold.txt",
                "work_dir": "work",
                "output_dir": "final",
                "partitions": 1,
                "threads": 1,
                "arff": true,
                "arff_path": "export/data.arff"
            }"#,
        )
        .unwrap();

    cmd(dir.path())
        .args(["run", "--config", "pipeline.json"])
        .assert()
        .success();

    dir.child("final/part-r-00000").assert(predicate::path::exists());
    dir.child("final/part-r-00001").assert(predicate::path::missing());
    dir.child("export/data.arff")
        .assert(predicate::str::starts_with("@relation semantic_similarity"));
    dir.child("export/data.arff")
        .assert(predicate::str::contains("@attribute class {"));
}

#[test]
fn arff_subcommand_uses_timestamped_name() {
    let dir = assert_fs::TempDir::new().unwrap();
    write_inputs(&dir);
    cmd(dir.path())
        .args(["run", "--corpus", "corpus", "--gold", "gold.txt", "--output", "out"])
        .assert()
        .success();

    let assert = cmd(dir.path()).args(["arff", "out"]).assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    let name_re = Regex::new(r"\d{4}_\d{2}_\d{2}_\d{2}_\d{2}_\d{2}_similarity\.arff").unwrap();
    assert!(name_re.is_match(stdout.trim()), "unexpected path: {stdout}");

    let path = dir.path().join(stdout.trim());
    let text = fs::read_to_string(path).unwrap();
    assert!(text.contains("@data"));
}

#[test]
fn measure_without_totals_exits_non_zero() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("inverted/part-r-00000")
        .write_str("chase cat-dobj\tlf=4 l=10\n")
        .unwrap();

    cmd(dir.path())
        .args(["measure", "inverted", "measures", "--totals", "missing-totals"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("total counters have not been found"));

    dir.child("measures").assert(predicate::path::missing());
}

#[test]
fn invalid_config_exits_non_zero() {
    let dir = assert_fs::TempDir::new().unwrap();
    dir.child("bad.json").write_str("{ not json").unwrap();
    cmd(dir.path())
        .args(["run", "--config", "bad.json"])
        .assert()
        .failure()
        .code(1);
}
