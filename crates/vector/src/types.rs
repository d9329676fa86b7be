use serde::Serialize;

/// Square, symmetric matrix of cosine similarities with a unit diagonal
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SimilarityMatrix {
    rows: Vec<Vec<f32>>,
}

impl SimilarityMatrix {
    /// Empty matrix (no nodes)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap rows produced by a backend.
    ///
    /// Returns `None` unless the rows form an `n x n` matrix.
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Option<Self> {
        let n = rows.len();
        if rows.iter().any(|r| r.len() != n) {
            return None;
        }
        Some(Self { rows })
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Similarity between nodes `i` and `j`
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        self.rows.get(i).and_then(|r| r.get(j)).copied()
    }

    /// Row `i`
    pub fn row(&self, i: usize) -> Option<&[f32]> {
        self.rows.get(i).map(Vec::as_slice)
    }

    pub fn rows(&self) -> &[Vec<f32>] {
        &self.rows
    }

    /// Whether `M[i][j]` and `M[j][i]` agree within `tolerance` everywhere
    pub fn is_symmetric(&self, tolerance: f32) -> bool {
        (0..self.len()).all(|i| {
            (i + 1..self.len()).all(|j| (self.rows[i][j] - self.rows[j][i]).abs() <= tolerance)
        })
    }

    /// Largest absolute difference against another matrix of the same size
    pub fn max_abs_diff(&self, other: &SimilarityMatrix) -> Option<f32> {
        if self.len() != other.len() {
            return None;
        }
        Some(
            self.rows
                .iter()
                .flatten()
                .zip(other.rows.iter().flatten())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f32::max),
        )
    }
}

/// Output of [`SimilarityEngine::similarity_matrix`](crate::SimilarityEngine::similarity_matrix)
#[derive(Debug, Clone, Default, Serialize)]
pub struct SimilarityResult {
    /// Pairwise similarities, indexed like `node_ids`
    pub matrix: SimilarityMatrix,

    /// Record ids in matrix order
    pub node_ids: Vec<String>,

    /// Backend that produced the matrix
    pub backend: String,

    /// Records left out because their embedding was missing or malformed
    pub dropped: Vec<String>,
}

impl SimilarityResult {
    /// Matrix index of a record id
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.node_ids.iter().position(|n| n == id)
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_requires_square() {
        assert!(SimilarityMatrix::from_rows(vec![vec![1.0, 0.0]]).is_none());
        assert!(SimilarityMatrix::from_rows(vec![vec![1.0]]).is_some());
        assert!(SimilarityMatrix::from_rows(Vec::new()).unwrap().is_empty());
    }

    #[test]
    fn test_symmetry_check() {
        let m = SimilarityMatrix::from_rows(vec![vec![1.0, 0.5], vec![0.5, 1.0]]).unwrap();
        assert!(m.is_symmetric(0.0));
        let m = SimilarityMatrix::from_rows(vec![vec![1.0, 0.5], vec![0.4, 1.0]]).unwrap();
        assert!(!m.is_symmetric(0.01));
        assert!(m.is_symmetric(0.2));
    }

    #[test]
    fn test_serializes_as_nested_arrays() {
        let m = SimilarityMatrix::from_rows(vec![vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert_eq!(serde_json::to_string(&m).unwrap(), "[[1.0,0.0],[0.0,1.0]]");
    }
}
