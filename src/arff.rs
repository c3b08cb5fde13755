//! Export of the final similarity vectors as a Weka ARFF dataset.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::prelude::*;
use log::{debug, info};

use crate::error::{PipelineError, Result};
use crate::files::{collect_files, is_part_file, read_lines};
use crate::similarity::{SimilarityVector, attribute_names, format_value};

pub const RELATION: &str = "semantic_similarity";

/// Timestamped default export path inside `dir`.
pub fn default_arff_path(dir: &Path) -> PathBuf {
    let local: DateTime<Local> = Local::now();
    dir.join(local.format("%Y_%m_%d_%H_%M_%S_similarity.arff").to_string())
}

/// Reads the similarity vectors at `path`; unparsable lines are skipped and
/// counted.
///
/// For a directory only its `part-r-*` files are read, so exports written
/// next to the vectors are never picked up again.
pub fn read_vectors(path: &Path) -> Result<(Vec<SimilarityVector>, usize)> {
    let mut files = collect_files(path);
    if path.is_dir() {
        files.retain(|f| is_part_file(f));
    }
    if files.is_empty() {
        return Err(PipelineError::MissingInput {
            path: path.to_path_buf(),
        });
    }
    let mut vectors = Vec::new();
    let mut skipped = 0;
    for file in files {
        for line in read_lines(&file)? {
            match SimilarityVector::parse(&line) {
                Some(vector) => vectors.push(vector),
                None => {
                    debug!("skipping non-vector line {line:?}");
                    skipped += 1;
                }
            }
        }
    }
    Ok((vectors, skipped))
}

/// Distinct labels in first-seen order.
pub fn class_values(vectors: &[SimilarityVector]) -> Vec<&str> {
    let mut labels: Vec<&str> = Vec::new();
    for vector in vectors {
        if !labels.contains(&vector.label.as_str()) {
            labels.push(&vector.label);
        }
    }
    labels
}

/// Writes header and `@data` section.
pub fn write_arff<W: Write>(vectors: &[SimilarityVector], mut out: W) -> io::Result<()> {
    writeln!(out, "@relation {RELATION}")?;
    writeln!(out)?;
    for name in attribute_names() {
        writeln!(out, "@attribute {name} numeric")?;
    }
    writeln!(out, "@attribute class {{{}}}", class_values(vectors).join(","))?;
    writeln!(out)?;
    writeln!(out, "@data")?;

    let mut rows = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(out);
    for vector in vectors {
        let mut row: Vec<String> = vector.values.iter().map(|v| format_value(*v)).collect();
        row.push(vector.label.clone());
        rows.write_record(&row)?;
    }
    rows.flush()
}

/// Converts the vectors under `input` into an ARFF file at `output`.
pub fn export(input: &Path, output: &Path) -> Result<usize> {
    let (vectors, skipped) = read_vectors(input)?;
    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
    }
    let file = File::create(output).map_err(|e| PipelineError::io(output, e))?;
    write_arff(&vectors, BufWriter::new(file)).map_err(|e| PipelineError::io(output, e))?;
    info!(
        "exported {} vectors to {} ({skipped} lines skipped)",
        vectors.len(),
        output.display()
    );
    Ok(vectors.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::similarity::VECTOR_LEN;

    fn vector(w1: &str, w2: &str, label: &str, first: f64) -> SimilarityVector {
        let mut values = [0.0; VECTOR_LEN];
        values[0] = first;
        SimilarityVector {
            w1: w1.to_string(),
            w2: w2.to_string(),
            label: label.to_string(),
            values,
        }
    }

    #[test]
    fn header_and_rows() {
        let vectors = vec![
            vector("cat", "dog", "true", 2.0),
            vector("cat", "car", "false", f64::INFINITY),
            vector("dog", "wolf", "true", 0.5),
        ];
        let mut buf = Vec::new();
        write_arff(&vectors, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "@relation semantic_similarity");
        assert_eq!(lines[2], "@attribute freq_distManhattan numeric");
        assert_eq!(lines[2 + VECTOR_LEN], "@attribute class {true,false}");
        assert_eq!(lines[4 + VECTOR_LEN], "@data");

        let rows = &lines[5 + VECTOR_LEN..];
        assert_eq!(rows.len(), 3);
        assert!(rows[0].starts_with("2.0,0.0,"));
        assert!(rows[0].ends_with(",true"));
        assert!(rows[1].starts_with("Infinity,"));
        assert_eq!(rows[2].split(',').count(), VECTOR_LEN + 1);
    }

    #[test]
    fn export_reads_stage_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("final");
        fs::create_dir_all(&input).unwrap();
        fs::write(
            input.join("part-r-00000"),
            format!("{}\nnot a vector\n", vector("cat", "dog", "true", 2.0)),
        )
        .unwrap();
        fs::write(input.join("_SUCCESS"), "").unwrap();

        let out = dir.path().join("export").join("data.arff");
        assert_eq!(export(&input, &out).unwrap(), 1);
        let text = fs::read_to_string(&out).unwrap();
        assert!(text.contains("@attribute class {true}"));
    }

    #[test]
    fn earlier_exports_in_the_stage_directory_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("part-r-00000"),
            format!("{}\n", vector("cat", "dog", "true", 2.0)),
        )
        .unwrap();
        fs::write(dir.path().join("_SUCCESS"), "").unwrap();

        let first = default_arff_path(dir.path());
        export(dir.path(), &first).unwrap();
        let (vectors, skipped) = read_vectors(dir.path()).unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(skipped, 0);

        let second = dir.path().join("again.arff");
        assert_eq!(export(dir.path(), &second).unwrap(), 1);
    }

    #[test]
    fn single_file_input_is_read_whatever_its_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.txt");
        fs::write(&path, format!("{}\n", vector("cat", "dog", "true", 2.0))).unwrap();
        let (vectors, _) = read_vectors(&path).unwrap();
        assert_eq!(vectors.len(), 1);
    }

    #[test]
    fn default_name_is_timestamped() {
        let path = default_arff_path(Path::new("out"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.ends_with("_similarity.arff"));
        assert_eq!(name.len(), "2024_01_01_00_00_00_similarity.arff".len());
    }
}
