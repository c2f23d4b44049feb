//! Binary model snapshots.
//!
//! ## Layout
//!
//! - Magic number (4 bytes): "GMMS"
//! - Version (2 bytes, little endian)
//! - bincode-encoded [`ModelRecord`]

use crate::error::{GmmError, Result};
use crate::gaussian::{Covariance, CovarianceType, Gaussian};
use crate::gmm::{Component, Mixture};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Magic number for snapshot files.
const MAGIC: &[u8; 4] = b"GMMS";

/// Current snapshot version.
const VERSION: u16 = 1;

/// Serializable form of a fitted mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Covariance parameterization.
    pub covariance_type: CovarianceType,
    /// Sample dimension.
    pub dim: usize,
    /// One record per component.
    pub components: Vec<ComponentRecord>,
}

/// Serializable form of one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentRecord {
    /// Mixture weight.
    pub weight: f64,
    /// Mean vector.
    pub mean: Vec<f64>,
    /// Variances (diagonal) or row-major matrix (full).
    pub covariance: Vec<f64>,
}

impl ModelRecord {
    /// Captures the parameters of a fitted mixture.
    pub fn from_mixture(mixture: &Mixture) -> Result<Self> {
        let dim = mixture.dim().filter(|_| mixture.is_fitted()).ok_or(GmmError::NotFitted)?;
        let components = mixture
            .components()
            .iter()
            .map(|c| ComponentRecord {
                weight: c.weight,
                mean: c.gaussian.mean().to_vec(),
                covariance: c.gaussian.covariance().values().to_vec(),
            })
            .collect();

        Ok(Self {
            covariance_type: mixture.covariance_type(),
            dim,
            components,
        })
    }

    /// Rebuilds and validates the mixture.
    pub fn into_mixture(self) -> Result<Mixture> {
        let covariance_type = self.covariance_type;
        let dim = self.dim;
        let components = self
            .components
            .into_iter()
            .map(|c| {
                if c.mean.len() != dim {
                    return Err(GmmError::DimensionMismatch { expected: dim, found: c.mean.len() });
                }
                let covariance = Covariance::from_values(covariance_type, dim, c.covariance)?;
                Ok(Component::new(c.weight, Gaussian::new(c.mean, covariance)?))
            })
            .collect::<Result<Vec<_>>>()?;

        Mixture::from_components(covariance_type, components)
    }
}

/// Writes a binary snapshot of `mixture` to `path`.
pub fn save_snapshot<P: AsRef<Path>>(mixture: &Mixture, path: P) -> Result<()> {
    let record = ModelRecord::from_mixture(mixture)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;
    bincode::serialize_into(&mut writer, &record)?;
    writer.flush()?;
    Ok(())
}

/// Reads a binary snapshot written by [`save_snapshot`].
pub fn load_snapshot<P: AsRef<Path>>(path: P) -> Result<Mixture> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut header = [0u8; 6];
    reader.read_exact(&mut header)?;
    if &header[0..4] != MAGIC {
        return Err(GmmError::InvalidModel("Invalid magic number".to_string()));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version > VERSION {
        return Err(GmmError::InvalidModel(format!("Unsupported snapshot version: {}", version)));
    }

    let record: ModelRecord = bincode::deserialize_from(&mut reader)?;
    record.into_mixture()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mixture() -> Mixture {
        Mixture::from_components(
            CovarianceType::Diagonal,
            vec![
                Component::new(0.4, Gaussian::diagonal(vec![0.5, -0.5], vec![0.2, 0.3]).unwrap()),
                Component::new(0.6, Gaussian::diagonal(vec![3.0, 3.0], vec![1.0, 1.0]).unwrap()),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.gmm");

        let original = mixture();
        save_snapshot(&original, &path).unwrap();
        let loaded = load_snapshot(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bogus.gmm");
        std::fs::write(&path, b"NOPE\x01\x00rest").unwrap();
        assert!(matches!(load_snapshot(&path), Err(GmmError::InvalidModel(_))));
    }

    #[test]
    fn test_record_rejects_inconsistent_dimension() {
        let mut record = ModelRecord::from_mixture(&mixture()).unwrap();
        record.components[1].mean.push(0.0);
        assert!(record.into_mixture().is_err());
    }
}
