use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::sync::Arc;

use crate::artifacts::ArtifactFiles;
use crate::engine::{Classifier, Engine, Vectorizer};
use crate::linear::{LinearClassifier, select_device};
use crate::tfidf::TfIdfVectorizer;

/// Vectorizer followed by classifier, one text at a time.
#[derive(Clone)]
pub struct SentimentEngine {
    vectorizer: Arc<dyn Vectorizer>,
    classifier: Arc<dyn Classifier>,
}

impl SentimentEngine {
    pub fn new(vectorizer: Arc<dyn Vectorizer>, classifier: Arc<dyn Classifier>) -> Result<Self> {
        if let (Some(output), Some(input)) = (vectorizer.output_dim(), classifier.input_dim()) {
            if output != input {
                bail!(
                    "vectorizer produces {output} features but classifier expects {input}"
                );
            }
        }
        Ok(Self {
            vectorizer,
            classifier,
        })
    }

    #[tracing::instrument(skip(files))]
    pub fn load(files: &ArtifactFiles, cpu: bool) -> Result<Self> {
        let device = select_device(cpu)?;
        let vectorizer = TfIdfVectorizer::load(&files.vectorizer)?;
        let classifier =
            LinearClassifier::load(&files.classifier_config, &files.classifier_weights, &device)?;
        Self::new(Arc::new(vectorizer), Arc::new(classifier))
    }
}

fn predict_one(vectorizer: &dyn Vectorizer, classifier: &dyn Classifier, text: String) -> Result<String> {
    let features = vectorizer
        .transform(&[text])
        .context("vectorizer transform failed")?;
    if features.len() != 1 {
        bail!("vectorizer returned {} rows for one text", features.len());
    }
    tracing::trace!(nnz = features[0].nnz(), "Text vectorized");

    let labels = classifier
        .predict(&features)
        .context("classifier prediction failed")?;
    labels
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("classifier returned no prediction"))
}

#[async_trait]
impl Engine for SentimentEngine {
    #[tracing::instrument(skip(self, text), fields(text_len = text.len()))]
    async fn predict(&self, text: String) -> Result<String> {
        let vectorizer = self.vectorizer.clone();
        let classifier = self.classifier.clone();
        let label = tokio::task::spawn_blocking(move || {
            predict_one(vectorizer.as_ref(), classifier.as_ref(), text)
        })
        .await??;
        tracing::debug!(%label, "Prediction completed");
        Ok(label)
    }

    fn labels(&self) -> Vec<String> {
        self.classifier.labels().to_vec()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use candle_core::{Device, Tensor};
    use serde_json::json;

    pub const WEIGHTS: [[f32; 5]; 3] = [
        [-1.0, -1.0, 2.0, 2.0, 0.0],
        [0.0, 0.0, 0.0, 0.0, 0.5],
        [2.0, 2.0, -1.0, -1.0, 0.0],
    ];

    pub fn vectorizer_json() -> serde_json::Value {
        json!({
            "vocabulary": { "love": 0, "great": 1, "hate": 2, "awful": 3, "game": 4 },
            "idf": [1.0, 1.0, 1.0, 1.0, 1.0],
        })
    }

    pub fn classes() -> Vec<String> {
        ["Negative", "Neutral", "Positive"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Small three-class model over a five-word vocabulary.
    pub fn toy_engine() -> SentimentEngine {
        let vectorizer =
            TfIdfVectorizer::from_artifact(serde_json::from_value(vectorizer_json()).unwrap())
                .unwrap();
        let weight = Tensor::new(&WEIGHTS, &Device::Cpu).unwrap();
        let bias = Tensor::new(&[0f32, 0.0, 0.0], &Device::Cpu).unwrap();
        let classifier = LinearClassifier::from_parts(classes(), weight, bias).unwrap();
        SentimentEngine::new(Arc::new(vectorizer), Arc::new(classifier)).unwrap()
    }
}
