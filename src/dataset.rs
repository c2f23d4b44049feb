//! Dataset files and sparse sample conversion.
//!
//! Dense files hold one sample per line with values separated by spaces and
//! no header. Sparse samples are lists of `index:value` pairs.

use crate::error::{GmmError, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A sparse sample: `(index, value)` pairs, unordered.
pub type SparseSample = Vec<(usize, f64)>;

/// Reads a dense dataset.
///
/// Blank lines are skipped. A line with a different number of values than
/// the first one is a `DimensionMismatch`.
pub fn read_dense_dataset<R: BufRead>(reader: R) -> Result<Vec<Vec<f64>>> {
    let mut data: Vec<Vec<f64>> = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }

        let sample = line
            .split_whitespace()
            .map(|token| {
                token.parse::<f64>().map_err(|e| GmmError::Parse {
                    line: line_no,
                    message: format!("'{}': {}", token, e),
                })
            })
            .collect::<Result<Vec<f64>>>()?;

        if let Some(first) = data.first() {
            if first.len() != sample.len() {
                return Err(GmmError::DimensionMismatch {
                    expected: first.len(),
                    found: sample.len(),
                });
            }
        }
        data.push(sample);
    }

    Ok(data)
}

/// Reads a dense dataset file.
pub fn load_dense_dataset<P: AsRef<Path>>(path: P) -> Result<Vec<Vec<f64>>> {
    let file = File::open(path)?;
    read_dense_dataset(BufReader::new(file))
}

/// Writes samples one per line, values separated by single spaces.
pub fn write_dense_dataset<W: Write>(writer: &mut W, data: &[Vec<f64>]) -> Result<()> {
    for sample in data {
        let line: Vec<String> = sample.iter().map(|v| format!("{:?}", v)).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Writes a dense dataset file, replacing any existing one.
pub fn save_dense_dataset<P: AsRef<Path>>(path: P, data: &[Vec<f64>]) -> Result<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_dense_dataset(&mut writer, data)?;
    writer.flush()?;
    Ok(())
}

/// Parses one sparse line of `index:value` tokens.
///
/// `line_no` is only used in error messages.
pub fn parse_sparse_line(line: &str, line_no: usize) -> Result<SparseSample> {
    line.split_whitespace()
        .map(|token| {
            let (index, value) = token.split_once(':').ok_or_else(|| GmmError::Parse {
                line: line_no,
                message: format!("'{}' is not index:value", token),
            })?;
            let index = index.parse::<usize>().map_err(|e| GmmError::Parse {
                line: line_no,
                message: format!("index '{}': {}", index, e),
            })?;
            let value = value.parse::<f64>().map_err(|e| GmmError::Parse {
                line: line_no,
                message: format!("value '{}': {}", value, e),
            })?;
            Ok((index, value))
        })
        .collect()
}

/// Expands a sparse sample to `dim` values.
///
/// Indices at or past `dim` are dropped without error. A repeated index
/// keeps its last value.
pub fn sparse_to_dense(sample: &[(usize, f64)], dim: usize) -> Vec<f64> {
    let mut dense = vec![0.0; dim];
    for &(index, value) in sample {
        if let Some(slot) = dense.get_mut(index) {
            *slot = value;
        }
    }
    dense
}

/// Expands sparse samples to a dense dataset of dimension `max index + 1`.
pub fn sparse_dataset_to_dense(samples: &[SparseSample]) -> Vec<Vec<f64>> {
    let dim = samples
        .iter()
        .flat_map(|s| s.iter().map(|&(index, _)| index + 1))
        .max()
        .unwrap_or(0);

    samples.iter().map(|s| sparse_to_dense(s, dim)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_dense() {
        let text = "1 2.5 -3\n\n4e-2 0 7\n";
        let data = read_dense_dataset(Cursor::new(text)).unwrap();
        assert_eq!(data, vec![vec![1.0, 2.5, -3.0], vec![0.04, 0.0, 7.0]]);
    }

    #[test]
    fn test_read_dense_rejects_ragged_lines() {
        let err = read_dense_dataset(Cursor::new("1 2\n3\n")).unwrap_err();
        assert!(matches!(err, GmmError::DimensionMismatch { expected: 2, found: 1 }));

        let err = read_dense_dataset(Cursor::new("1 x\n")).unwrap_err();
        assert!(matches!(err, GmmError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_write_then_read() {
        let data = vec![vec![0.1, -2.0], vec![1e-9, 3.25]];
        let mut buf = Vec::new();
        write_dense_dataset(&mut buf, &data).unwrap();
        assert_eq!(String::from_utf8(buf.clone()).unwrap(), "0.1 -2.0\n1e-9 3.25\n");
        assert_eq!(read_dense_dataset(Cursor::new(buf)).unwrap(), data);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        let data = vec![vec![1.0, 2.0, 3.0]; 4];
        save_dense_dataset(&path, &data).unwrap();
        assert_eq!(load_dense_dataset(&path).unwrap(), data);
    }

    #[test]
    fn test_parse_sparse_line() {
        assert_eq!(parse_sparse_line("0:1.5 3:-2", 1).unwrap(), vec![(0, 1.5), (3, -2.0)]);
        assert!(parse_sparse_line("", 1).unwrap().is_empty());
        assert!(parse_sparse_line("4", 7).is_err());
        assert!(parse_sparse_line("a:1", 1).is_err());
        assert!(parse_sparse_line("1:b", 1).is_err());
    }

    #[test]
    fn test_sparse_to_dense_drops_out_of_range() {
        let sample = vec![(0, 1.0), (2, 3.0), (9, 4.0)];
        assert_eq!(sparse_to_dense(&sample, 3), vec![1.0, 0.0, 3.0]);
    }

    #[test]
    fn test_sparse_dataset_dimension() {
        let samples = vec![vec![(1, 1.0)], vec![(4, 2.0), (0, 5.0)], vec![]];
        let dense = sparse_dataset_to_dense(&samples);
        assert_eq!(dense.len(), 3);
        assert!(dense.iter().all(|x| x.len() == 5));
        assert_eq!(dense[1], vec![5.0, 0.0, 0.0, 0.0, 2.0]);
        assert_eq!(dense[2], vec![0.0; 5]);
    }
}
