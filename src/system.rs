//! Dense linear systems and a sequential reference solver

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::config::ClusterConfig;
use crate::core::errors::{ClusterError, Result, Stage};

/// A square system Ax = b
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSystem")]
pub struct LinearSystem {
    matrix: Vec<Vec<f64>>,
    rhs: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSystem {
    matrix: Vec<Vec<f64>>,
    rhs: Vec<f64>,
}

impl TryFrom<RawSystem> for LinearSystem {
    type Error = ClusterError;

    fn try_from(raw: RawSystem) -> Result<Self> {
        Self::new(raw.matrix, raw.rhs)
    }
}

impl LinearSystem {
    pub fn new(matrix: Vec<Vec<f64>>, rhs: Vec<f64>) -> Result<Self> {
        let size = matrix.len();
        if size == 0 {
            return Err(ClusterError::configuration_field("system must have at least one row", "matrix"));
        }
        if let Some(row) = matrix.iter().position(|row| row.len() != size) {
            return Err(ClusterError::configuration_field(
                format!("row {} has {} entries, expected {}", row, matrix[row].len(), size),
                "matrix",
            ));
        }
        if rhs.len() != size {
            return Err(ClusterError::configuration_field(
                format!("rhs has {} entries, expected {}", rhs.len(), size),
                "rhs",
            ));
        }
        Ok(Self { matrix, rhs })
    }

    /// Random strictly diagonally dominant system; elimination never meets a zero pivot
    pub fn random_diagonally_dominant(size: usize, seed: u64) -> Result<Self> {
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut matrix = vec![vec![0.0; size]; size];
        for (i, row) in matrix.iter_mut().enumerate() {
            let mut off_diagonal = 0.0;
            for (j, entry) in row.iter_mut().enumerate() {
                if i != j {
                    *entry = rng.f64() * 2.0 - 1.0;
                    off_diagonal += entry.abs();
                }
            }
            row[i] = off_diagonal + 1.0 + rng.f64();
        }
        let rhs = (0..size).map(|_| rng.f64() * 20.0 - 10.0).collect();
        Self::new(matrix, rhs)
    }

    pub fn size(&self) -> usize {
        self.rhs.len()
    }

    pub fn matrix(&self) -> &[Vec<f64>] {
        &self.matrix
    }

    pub fn rhs(&self) -> &[f64] {
        &self.rhs
    }

    /// Single-threaded elimination with the same arithmetic as the cluster
    pub fn solve_sequential(&self, pivot_tolerance: f64) -> Result<Vec<f64>> {
        let n = self.size();
        let mut a = self.matrix.clone();
        let mut b = self.rhs.clone();

        for iteration in 0..n.saturating_sub(1) {
            for row in iteration + 1..n {
                let multiplier = checked_div(a[row][iteration], a[iteration][iteration], pivot_tolerance)
                    .ok_or_else(|| {
                        ClusterError::arithmetic(row, Stage::Triangularization, iteration, a[iteration][iteration])
                    })?;
                a[row][iteration] = multiplier;
                for col in iteration + 1..n {
                    a[row][col] -= multiplier * a[iteration][col];
                }
                b[row] -= multiplier * b[iteration];
            }
        }

        let mut x = vec![0.0; n];
        for k in (0..n).rev() {
            let sum: f64 = (k + 1..n).map(|j| a[k][j] * x[j]).sum();
            x[k] = checked_div(b[k] - sum, a[k][k], pivot_tolerance)
                .ok_or_else(|| ClusterError::arithmetic(k, Stage::BackSubstitution, k, a[k][k]))?;
        }
        Ok(x)
    }

    /// Largest absolute entry of Ax - b
    pub fn residual(&self, x: &[f64]) -> f64 {
        self.matrix
            .iter()
            .zip(&self.rhs)
            .map(|(row, b)| {
                let ax: f64 = row.iter().zip(x).map(|(a, x)| a * x).sum();
                (ax - b).abs()
            })
            .fold(0.0, f64::max)
    }
}

/// Divide unless the divisor is non-finite or within `tolerance` of zero
pub(crate) fn checked_div(numerator: f64, divisor: f64, tolerance: f64) -> Option<f64> {
    if !divisor.is_finite() || divisor.abs() <= tolerance {
        None
    } else {
        Some(numerator / divisor)
    }
}

/// On-disk description of a solve: the system plus optional cluster settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemFile {
    #[serde(flatten)]
    pub system: LinearSystem,
    #[serde(default)]
    pub config: ClusterConfig,
}

impl SystemFile {
    /// Load from `.json`, anything else is parsed as YAML
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ClusterError::io(format!("read {}", path.display()), e))?;
        let file: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&contents)?,
            _ => serde_yaml::from_str(&contents)?,
        };
        file.config.validate()?;
        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn approx(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-9)
    }

    #[test]
    fn test_rejects_non_square() {
        assert!(LinearSystem::new(vec![], vec![]).is_err());
        assert!(LinearSystem::new(vec![vec![1.0, 2.0]], vec![1.0]).is_err());
        assert!(LinearSystem::new(vec![vec![1.0]], vec![1.0, 2.0]).is_err());
    }

    #[test]
    fn test_sequential_solve() {
        let system = LinearSystem::new(
            vec![vec![2.0, 1.0, 1.0], vec![4.0, 3.0, 3.0], vec![8.0, 7.0, 9.0]],
            vec![4.0, 10.0, 24.0],
        )
        .unwrap();
        let x = system.solve_sequential(1e-12).unwrap();
        assert!(approx(&x, &[1.0, 1.0, 1.0]), "got {x:?}");
        assert!(system.residual(&x) < 1e-9);
    }

    #[test]
    fn test_sequential_zero_pivot() {
        let system = LinearSystem::new(vec![vec![0.0, 1.0], vec![1.0, 1.0]], vec![1.0, 2.0]).unwrap();
        let err = system.solve_sequential(1e-12).unwrap_err();
        assert!(err.is_arithmetic());
    }

    #[test]
    fn test_sequential_tiny_scale_with_default_tolerance() {
        let system = LinearSystem::new(vec![vec![1e-13, 0.0], vec![0.0, 1e-13]], vec![1e-13, 2e-13]).unwrap();
        let x = system.solve_sequential(ClusterConfig::default().pivot_tolerance).unwrap();
        assert!(approx(&x, &[1.0, 2.0]), "got {x:?}");
    }

    #[test]
    fn test_checked_div_rejects_small_and_non_finite() {
        assert!(checked_div(1.0, 1e-13, 0.0).is_some());
        assert_eq!(checked_div(1.0, 0.0, 0.0), None);
        assert_eq!(checked_div(1.0, -0.0, 0.0), None);
        assert_eq!(checked_div(1.0, 1e-8, 1e-6), None);
        assert_eq!(checked_div(1.0, -1e-6, 1e-6), None);
        assert_eq!(checked_div(1.0, f64::NAN, 0.0), None);
        assert_eq!(checked_div(1.0, f64::INFINITY, 0.0), None);
    }

    #[test]
    fn test_random_is_reproducible_and_solvable() {
        let a = LinearSystem::random_diagonally_dominant(6, 42).unwrap();
        let b = LinearSystem::random_diagonally_dominant(6, 42).unwrap();
        assert_eq!(a, b);

        for (i, row) in a.matrix().iter().enumerate() {
            let off: f64 = row.iter().enumerate().filter(|(j, _)| *j != i).map(|(_, v)| v.abs()).sum();
            assert!(row[i] > off);
        }
        let x = a.solve_sequential(1e-12).unwrap();
        assert!(a.residual(&x) < 1e-9);
    }

    #[test]
    fn test_system_file_yaml() {
        let yaml = "matrix: [[2.0, 0.0], [0.0, 4.0]]\nrhs: [2.0, 8.0]\nconfig:\n  max_pending_requests: 1\n";
        let file: SystemFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(file.system.size(), 2);
        assert_eq!(file.config.max_pending_requests, 1);

        let bad = "matrix: [[2.0, 0.0]]\nrhs: [2.0]\n";
        assert!(serde_yaml::from_str::<SystemFile>(bad).is_err());
    }
}
