//! Text model dump.
//!
//! ## Layout
//!
//! ```text
//! <K> <covariance-type> <D>
//! <weight>                         \
//! <mean_1> ... <mean_D>             |  repeated K times
//! <var_1> ... <var_D>              /   (diagonal)
//! ```
//!
//! A full covariance is written as D rows of D values instead of the single
//! variance row. Values are separated by single spaces and use the shortest
//! representation that parses back to the same `f64`.

use crate::error::{GmmError, Result};
use crate::gaussian::{Covariance, CovarianceType, Gaussian};
use crate::gmm::{Component, Mixture};
use std::io::{BufRead, Write};

/// Writes `mixture` in the text dump layout.
pub fn write_model<W: Write>(mixture: &Mixture, sink: &mut W) -> Result<()> {
    let dim = mixture.dim().ok_or(GmmError::NotFitted)?;
    if !mixture.is_fitted() {
        return Err(GmmError::NotFitted);
    }

    writeln!(sink, "{} {} {}", mixture.n_components(), mixture.covariance_type(), dim)?;
    for component in mixture.components() {
        writeln!(sink, "{:?}", component.weight)?;
        write_row(sink, component.gaussian.mean())?;

        let values = component.gaussian.covariance().values();
        match mixture.covariance_type() {
            CovarianceType::Diagonal => write_row(sink, values)?,
            CovarianceType::Full => {
                for row in values.chunks(dim) {
                    write_row(sink, row)?;
                }
            }
        }
    }
    sink.flush()?;
    Ok(())
}

fn write_row<W: Write>(sink: &mut W, values: &[f64]) -> Result<()> {
    let line = values
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(" ");
    writeln!(sink, "{}", line)?;
    Ok(())
}

/// Reads a mixture written by [`write_model`].
pub fn read_model<R: BufRead>(reader: R) -> Result<Mixture> {
    let mut lines = Lines::new(reader);

    let header = lines.next_tokens("header")?;
    if header.len() != 3 {
        return Err(GmmError::InvalidModel(format!(
            "header needs 3 fields, found {}",
            header.len()
        )));
    }
    let k: usize = parse_field(&header[0], "component count")?;
    let covariance_type: CovarianceType = header[1].parse()?;
    let dim: usize = parse_field(&header[2], "dimension")?;
    if k == 0 || dim == 0 {
        return Err(GmmError::InvalidModel("empty model".to_string()));
    }

    let mut components = Vec::with_capacity(k);
    for i in 0..k {
        let weight = lines.next_values(1, &format!("weight of component {}", i))?[0];
        let mean = lines.next_values(dim, &format!("mean of component {}", i))?;

        let covariance_values = match covariance_type {
            CovarianceType::Diagonal => lines.next_values(dim, &format!("variances of component {}", i))?,
            CovarianceType::Full => {
                let mut matrix = Vec::with_capacity(dim * dim);
                for _ in 0..dim {
                    matrix.extend(lines.next_values(dim, &format!("covariance of component {}", i))?);
                }
                matrix
            }
        };

        let covariance = Covariance::from_values(covariance_type, dim, covariance_values)?;
        components.push(Component::new(weight, Gaussian::new(mean, covariance)?));
    }

    Mixture::from_components(covariance_type, components)
}

fn parse_field<T: std::str::FromStr>(token: &str, what: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| GmmError::InvalidModel(format!("bad {}: '{}'", what, token)))
}

/// Non-blank lines of a dump, split into tokens.
struct Lines<R> {
    reader: R,
    buf: String,
}

impl<R: BufRead> Lines<R> {
    fn new(reader: R) -> Self {
        Self { reader, buf: String::new() }
    }

    fn next_tokens(&mut self, what: &str) -> Result<Vec<String>> {
        loop {
            self.buf.clear();
            if self.reader.read_line(&mut self.buf)? == 0 {
                return Err(GmmError::InvalidModel(format!("unexpected end of input, expected {}", what)));
            }
            let tokens: Vec<String> = self.buf.split_whitespace().map(str::to_string).collect();
            if !tokens.is_empty() {
                return Ok(tokens);
            }
        }
    }

    fn next_values(&mut self, count: usize, what: &str) -> Result<Vec<f64>> {
        let tokens = self.next_tokens(what)?;
        if tokens.len() != count {
            return Err(GmmError::InvalidModel(format!(
                "{}: expected {} values, found {}",
                what,
                count,
                tokens.len()
            )));
        }
        tokens.iter().map(|t| parse_field(t, what)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal_mixture() -> Mixture {
        Mixture::from_components(
            CovarianceType::Diagonal,
            vec![
                Component::new(0.1, Gaussian::diagonal(vec![0.0, 1e-7], vec![0.01, 2.5]).unwrap()),
                Component::new(0.9, Gaussian::diagonal(vec![-3.25, 4.0], vec![1.0, 1e-6]).unwrap()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_dump_layout() {
        let mut out = Vec::new();
        write_model(&diagonal_mixture(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 1 + 2 * 3);
        assert_eq!(lines[0], "2 diagonal 2");
        assert_eq!(lines[1], "0.1");
        assert_eq!(lines[2], "0.0 1e-7");
        assert_eq!(lines[3], "0.01 2.5");
    }

    #[test]
    fn test_dump_is_exact() {
        let original = diagonal_mixture();
        let mut out = Vec::new();
        write_model(&original, &mut out).unwrap();
        let loaded = read_model(out.as_slice()).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_full_dump() {
        let original = Mixture::from_components(
            CovarianceType::Full,
            vec![Component::new(
                1.0,
                Gaussian::full(vec![1.0, 2.0], vec![2.0, 0.5, 0.5, 1.0]).unwrap(),
            )],
        )
        .unwrap();

        let mut out = Vec::new();
        write_model(&original, &mut out).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();
        assert!(text.starts_with("1 full 2\n"));
        assert!(text.contains("\n2.0 0.5\n0.5 1.0\n"));

        assert_eq!(read_model(out.as_slice()).unwrap(), original);
    }

    #[test]
    fn test_malformed_dumps() {
        let cases = [
            "",
            "2 diagonal\n",
            "1 spherical 1\n1.0\n0.0\n1.0\n",
            "1 diagonal 2\n1.0\n0.0\n1.0 1.0\n",
            "1 diagonal 1\n1.0\n0.0\n-1.0\n",
            "2 diagonal 1\n1.0\n0.0\n1.0\n",
            "1 diagonal 1\nabc\n0.0\n1.0\n",
        ];
        for case in cases {
            assert!(read_model(case.as_bytes()).is_err(), "accepted {:?}", case);
        }
    }

    #[test]
    fn test_unfitted_dump_fails() {
        let mut out = Vec::new();
        let err = write_model(&Mixture::new(2, CovarianceType::Diagonal), &mut out);
        assert!(matches!(err, Err(GmmError::NotFitted)));
    }
}
