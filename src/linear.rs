use anyhow::{Context, Result, bail};
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::{DType, Device, Tensor};
use candle_nn::{Linear, Module};
use serde::Deserialize;
use std::path::Path;

use crate::engine::{Classifier, SparseVector};

/// Label set and input width of an exported linear classifier. The weights
/// live next to it in a safetensors file as `weight` and `bias`.
#[derive(Debug, Clone, Deserialize)]
pub struct LinearClassifierConfig {
    pub classes: Vec<String>,
    pub n_features: usize,
}

pub struct LinearClassifier {
    linear: Linear,
    classes: Vec<String>,
    n_features: usize,
    /// Single decision row for a two-class problem.
    binary: bool,
    dtype: DType,
    device: Device,
}

pub fn select_device(cpu: bool) -> Result<Device> {
    if cpu {
        Ok(Device::Cpu)
    } else if metal_is_available() {
        tracing::info!("Using metal acceleration");
        Ok(Device::new_metal(0)?)
    } else if cuda_is_available() {
        tracing::info!("Using CUDA GPU acceleration");
        Ok(Device::new_cuda(0)?)
    } else {
        tracing::info!(
            "CUDA not available, running on CPU. To run on GPU, build with `--features cuda`"
        );
        Ok(Device::Cpu)
    }
}

/// F64 wherever the device supports it; Metal has no f64 kernels.
fn compute_dtype(device: &Device) -> DType {
    if device.is_metal() {
        DType::F32
    } else {
        DType::F64
    }
}

impl LinearClassifier {
    #[tracing::instrument(skip_all, fields(config = %config_path.display(), weights = %weights_path.display()))]
    pub fn load(config_path: &Path, weights_path: &Path, device: &Device) -> Result<Self> {
        let config = std::fs::read_to_string(config_path)
            .with_context(|| format!("reading classifier config {}", config_path.display()))?;
        let config: LinearClassifierConfig = serde_json::from_str(&config)
            .with_context(|| format!("parsing classifier config {}", config_path.display()))?;

        let mut tensors = candle_core::safetensors::load(weights_path, &Device::Cpu)
            .with_context(|| format!("reading classifier weights {}", weights_path.display()))?;
        let Some(weight) = tensors.remove("weight") else {
            bail!("tensor `weight` missing from {}", weights_path.display());
        };
        let Some(bias) = tensors.remove("bias") else {
            bail!("tensor `bias` missing from {}", weights_path.display());
        };
        let dtype = compute_dtype(device);
        let weight = weight.to_dtype(dtype)?.to_device(device)?;
        let bias = bias.to_dtype(dtype)?.to_device(device)?;

        let classifier = Self::from_parts(config.classes, weight, bias)?;
        if classifier.n_features != config.n_features {
            bail!(
                "classifier config declares {} features but weights have {}",
                config.n_features,
                classifier.n_features
            );
        }

        tracing::info!(
            classes = ?classifier.classes,
            n_features = classifier.n_features,
            "Classifier loaded"
        );
        Ok(classifier)
    }

    pub fn from_parts(classes: Vec<String>, weight: Tensor, bias: Tensor) -> Result<Self> {
        let (rows, n_features) = weight.dims2().context("`weight` must be a matrix")?;
        let bias_rows = bias.dims1().context("`bias` must be a vector")?;

        if classes.len() < 2 {
            bail!("a classifier needs at least two classes, got {}", classes.len());
        }
        if n_features == 0 {
            bail!("`weight` has no feature columns");
        }
        if bias_rows != rows {
            bail!("`bias` has {bias_rows} entries but `weight` has {rows} rows");
        }
        let binary = match rows {
            1 if classes.len() == 2 => true,
            rows if rows == classes.len() => false,
            rows => bail!(
                "`weight` has {rows} rows, which does not fit {} classes",
                classes.len()
            ),
        };

        let device = weight.device().clone();
        let dtype = compute_dtype(&device);
        let weight = weight.to_dtype(dtype)?;
        let bias = bias.to_dtype(dtype)?.to_device(&device)?;

        Ok(Self {
            linear: Linear::new(weight, Some(bias)),
            classes,
            n_features,
            binary,
            dtype,
            device,
        })
    }

    fn decision_function(&self, features: &[SparseVector]) -> Result<Vec<Vec<f64>>> {
        let mut dense = vec![0f64; features.len() * self.n_features];
        for (row, out) in features.iter().zip(dense.chunks_mut(self.n_features)) {
            if row.dim != self.n_features {
                bail!(
                    "feature row has {} columns, classifier expects {}",
                    row.dim,
                    self.n_features
                );
            }
            row.fill_dense(out)?;
        }

        let input = Tensor::from_vec(dense, (features.len(), self.n_features), &Device::Cpu)?
            .to_dtype(self.dtype)?
            .to_device(&self.device)?;
        let scores = self.linear.forward(&input)?;
        Ok(scores
            .to_device(&Device::Cpu)?
            .to_dtype(DType::F64)?
            .to_vec2::<f64>()?)
    }
}

/// Index of the highest score. The first one wins a tie.
fn argmax(scores: &[f64]) -> usize {
    let mut best = 0;
    for (index, &score) in scores.iter().enumerate().skip(1) {
        if score > scores[best] {
            best = index;
        }
    }
    best
}

impl Classifier for LinearClassifier {
    fn predict(&self, features: &[SparseVector]) -> Result<Vec<String>> {
        if features.is_empty() {
            return Ok(Vec::new());
        }

        let scores = self.decision_function(features)?;
        Ok(scores
            .iter()
            .map(|row| {
                let index = if self.binary {
                    usize::from(row[0] > 0.0)
                } else {
                    argmax(row)
                };
                self.classes[index].clone()
            })
            .collect())
    }

    fn labels(&self) -> &[String] {
        &self.classes
    }

    fn input_dim(&self) -> Option<usize> {
        Some(self.n_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn row(dim: usize, entries: &[(usize, f64)]) -> SparseVector {
        SparseVector {
            dim,
            indices: entries.iter().map(|e| e.0).collect(),
            values: entries.iter().map(|e| e.1).collect(),
        }
    }

    fn three_way() -> LinearClassifier {
        let weight = Tensor::new(
            &[[1f32, -1.0, 0.0], [-1.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &Device::Cpu,
        )
        .unwrap();
        let bias = Tensor::new(&[0f32, 0.0, 0.0], &Device::Cpu).unwrap();
        LinearClassifier::from_parts(labels(&["Positive", "Negative", "Neutral"]), weight, bias)
            .unwrap()
    }

    #[test]
    fn test_multiclass_argmax() {
        let classifier = three_way();
        let predictions = classifier
            .predict(&[
                row(3, &[(0, 1.0)]),
                row(3, &[(0, 0.1), (1, 0.8)]),
                row(3, &[(2, 0.5)]),
            ])
            .unwrap();
        assert_eq!(predictions, labels(&["Positive", "Negative", "Neutral"]));
    }

    #[test]
    fn test_ties_pick_first_class() {
        let classifier = three_way();
        let predictions = classifier.predict(&[SparseVector::zeros(3)]).unwrap();
        assert_eq!(predictions, labels(&["Positive"]));
    }

    #[test]
    fn test_binary_decision_row() {
        let weight = Tensor::new(&[[2f32, -2.0]], &Device::Cpu).unwrap();
        let bias = Tensor::new(&[-0.5f32], &Device::Cpu).unwrap();
        let classifier =
            LinearClassifier::from_parts(labels(&["negative", "positive"]), weight, bias).unwrap();

        let predictions = classifier
            .predict(&[
                row(2, &[(0, 1.0)]),
                row(2, &[(1, 1.0)]),
                SparseVector::zeros(2),
            ])
            .unwrap();
        assert_eq!(predictions, labels(&["positive", "negative", "negative"]));
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let classifier = three_way();
        let err = classifier.predict(&[row(5, &[(4, 1.0)])]).unwrap_err();
        assert!(err.to_string().contains("expects 3"));
    }

    #[test]
    fn test_out_of_range_feature_index_is_an_error() {
        let classifier = three_way();
        let err = classifier.predict(&[row(3, &[(7, 1.0)])]).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_scores_keep_double_precision() {
        // Rounded to f32 the first weight becomes 1.0 and the score is exactly 0.
        let weight = Tensor::new(&[[1.0f64 + 1e-12, -1.0]], &Device::Cpu).unwrap();
        let bias = Tensor::new(&[0f64], &Device::Cpu).unwrap();
        let classifier =
            LinearClassifier::from_parts(labels(&["negative", "positive"]), weight, bias).unwrap();

        let predictions = classifier
            .predict(&[row(2, &[(0, 1.0), (1, 1.0)])])
            .unwrap();
        assert_eq!(predictions, labels(&["positive"]));
    }

    #[test]
    fn test_empty_batch() {
        assert!(three_way().predict(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_rejects_shape_that_does_not_fit_classes() {
        let weight = Tensor::zeros((2, 4), DType::F32, &Device::Cpu).unwrap();
        let bias = Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap();
        assert!(
            LinearClassifier::from_parts(labels(&["a", "b", "c"]), weight, bias).is_err()
        );

        let weight = Tensor::zeros((3, 4), DType::F32, &Device::Cpu).unwrap();
        let bias = Tensor::zeros(2, DType::F32, &Device::Cpu).unwrap();
        assert!(
            LinearClassifier::from_parts(labels(&["a", "b", "c"]), weight, bias).is_err()
        );
    }

    #[test]
    fn test_load_from_safetensors() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("classifier.json");
        let weights_path = dir.path().join("classifier.safetensors");

        std::fs::write(
            &config_path,
            r#"{"classes": ["Negative", "Positive"], "n_features": 2}"#,
        )
        .unwrap();
        let tensors = HashMap::from([
            (
                "weight".to_string(),
                Tensor::new(&[[1f32, 0.0], [0.0, 1.0]], &Device::Cpu).unwrap(),
            ),
            (
                "bias".to_string(),
                Tensor::new(&[0f32, 0.0], &Device::Cpu).unwrap(),
            ),
        ]);
        candle_core::safetensors::save(&tensors, &weights_path).unwrap();

        let classifier = LinearClassifier::load(&config_path, &weights_path, &Device::Cpu).unwrap();
        assert_eq!(classifier.input_dim(), Some(2));
        assert_eq!(
            classifier.predict(&[row(2, &[(1, 1.0)])]).unwrap(),
            labels(&["Positive"])
        );

        std::fs::write(
            &config_path,
            r#"{"classes": ["Negative", "Positive"], "n_features": 3}"#,
        )
        .unwrap();
        assert!(LinearClassifier::load(&config_path, &weights_path, &Device::Cpu).is_err());
    }
}
