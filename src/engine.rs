use anyhow::{Result, bail};
use async_trait::async_trait;

/// One sparse feature row: strictly increasing column indices into a
/// space of `dim` columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub dim: usize,
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseVector {
    #[cfg(test)]
    pub fn zeros(dim: usize) -> Self {
        Self {
            dim,
            indices: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }

    /// Writes the row into a dense buffer of length `dim`.
    pub fn fill_dense(&self, out: &mut [f64]) -> Result<()> {
        for (index, value) in self.iter() {
            let Some(slot) = out.get_mut(index) else {
                bail!(
                    "feature index {index} is out of range for {} columns",
                    out.len()
                );
            };
            *slot = value;
        }
        Ok(())
    }
}

/// A fitted text vectorizer. One output row per input document.
pub trait Vectorizer: Send + Sync {
    fn transform(&self, documents: &[String]) -> Result<Vec<SparseVector>>;

    /// Width of the produced rows, when fixed.
    fn output_dim(&self) -> Option<usize> {
        None
    }
}

/// A fitted classifier. One label per input row.
pub trait Classifier: Send + Sync {
    fn predict(&self, features: &[SparseVector]) -> Result<Vec<String>>;

    fn labels(&self) -> &[String];

    /// Width of the rows this classifier accepts, when fixed.
    fn input_dim(&self) -> Option<usize> {
        None
    }
}

#[async_trait]
pub trait Engine {
    async fn predict(&self, text: String) -> Result<String>;

    fn labels(&self) -> Vec<String>;
}
