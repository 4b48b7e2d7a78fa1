//! TF-IDF vectorizer evaluated from an exported, already-fitted artifact.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::engine::{SparseVector, Vectorizer};
use crate::token_pattern::TokenPattern;

pub const DEFAULT_TOKEN_PATTERN: &str = r"(?u)\b\w\w+\b";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Norm {
    L1,
    L2,
}

/// On-disk layout of a fitted vectorizer.
#[derive(Debug, Clone, Deserialize)]
pub struct TfIdfArtifact {
    pub vocabulary: HashMap<String, usize>,
    #[serde(default)]
    pub idf: Option<Vec<f64>>,
    #[serde(default = "default_lowercase")]
    pub lowercase: bool,
    #[serde(default = "default_token_pattern")]
    pub token_pattern: String,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub stop_words: Option<Vec<String>>,
    #[serde(default)]
    pub sublinear_tf: bool,
    #[serde(default = "default_norm")]
    pub norm: Option<Norm>,
}

fn default_lowercase() -> bool {
    true
}

fn default_token_pattern() -> String {
    DEFAULT_TOKEN_PATTERN.to_string()
}

fn default_ngram_range() -> (usize, usize) {
    (1, 1)
}

fn default_norm() -> Option<Norm> {
    Some(Norm::L2)
}

pub struct TfIdfVectorizer {
    /// Term -> column index.
    vocabulary: HashMap<String, usize>,
    idf: Option<Vec<f64>>,
    lowercase: bool,
    token_pattern: TokenPattern,
    ngram_range: (usize, usize),
    stop_words: HashSet<String>,
    sublinear_tf: bool,
    norm: Option<Norm>,
}

impl std::fmt::Debug for TfIdfVectorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TfIdfVectorizer")
            .field("vocabulary_size", &self.vocabulary.len())
            .field("use_idf", &self.idf.is_some())
            .field("ngram_range", &self.ngram_range)
            .field("norm", &self.norm)
            .finish()
    }
}

impl TfIdfVectorizer {
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading vectorizer artifact {}", path.display()))?;
        let vectorizer = Self::from_json(&raw)
            .with_context(|| format!("loading vectorizer artifact {}", path.display()))?;
        tracing::info!(
            vocabulary_size = vectorizer.vocabulary_size(),
            "Vectorizer loaded"
        );
        Ok(vectorizer)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let artifact: TfIdfArtifact = serde_json::from_str(raw)?;
        Self::from_artifact(artifact)
    }

    pub fn from_artifact(artifact: TfIdfArtifact) -> Result<Self> {
        let dim = artifact.vocabulary.len();

        let mut seen = vec![false; dim];
        for (term, &index) in &artifact.vocabulary {
            if index >= dim || seen[index] {
                bail!("vocabulary index {index} for term {term:?} is out of range or duplicated");
            }
            seen[index] = true;
        }

        if let Some(idf) = &artifact.idf {
            if idf.len() != dim {
                bail!(
                    "idf has {} entries but vocabulary has {} terms",
                    idf.len(),
                    dim
                );
            }
        }

        let (min_n, max_n) = artifact.ngram_range;
        if min_n == 0 || min_n > max_n {
            bail!("invalid ngram_range ({min_n}, {max_n})");
        }

        let token_pattern = TokenPattern::new(&artifact.token_pattern)?;

        Ok(Self {
            vocabulary: artifact.vocabulary,
            idf: artifact.idf,
            lowercase: artifact.lowercase,
            token_pattern,
            ngram_range: artifact.ngram_range,
            stop_words: artifact.stop_words.unwrap_or_default().into_iter().collect(),
            sublinear_tf: artifact.sublinear_tf,
            norm: artifact.norm,
        })
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    /// Splits a document into the terms that get looked up in the vocabulary.
    fn analyze(&self, document: &str) -> Vec<String> {
        let document = if self.lowercase {
            document.to_lowercase()
        } else {
            document.to_string()
        };

        let tokens: Vec<&str> = self
            .token_pattern
            .find_tokens(&document)
            .into_iter()
            .filter(|token| !self.stop_words.contains(*token))
            .collect();

        let (min_n, max_n) = self.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n.min(tokens.len()) {
            for window in tokens.windows(n) {
                terms.push(window.join(" "));
            }
        }
        terms
    }

    pub fn transform_one(&self, document: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.analyze(document) {
            if let Some(&index) = self.vocabulary.get(&term) {
                *counts.entry(index).or_insert(0.0) += 1.0;
            }
        }

        let (indices, mut values): (Vec<usize>, Vec<f64>) = counts.into_iter().unzip();

        if self.sublinear_tf {
            for value in &mut values {
                *value = 1.0 + value.ln();
            }
        }

        if let Some(idf) = &self.idf {
            for (value, &index) in values.iter_mut().zip(&indices) {
                *value *= idf[index];
            }
        }

        let length = match self.norm {
            Some(Norm::L2) => values.iter().map(|v| v * v).sum::<f64>().sqrt(),
            Some(Norm::L1) => values.iter().map(|v| v.abs()).sum::<f64>(),
            None => 1.0,
        };
        if length > 0.0 && length != 1.0 {
            for value in &mut values {
                *value /= length;
            }
        }

        SparseVector {
            dim: self.vocabulary.len(),
            indices,
            values,
        }
    }
}

impl Vectorizer for TfIdfVectorizer {
    fn transform(&self, documents: &[String]) -> Result<Vec<SparseVector>> {
        Ok(documents
            .iter()
            .map(|document| self.transform_one(document))
            .collect())
    }

    fn output_dim(&self) -> Option<usize> {
        Some(self.vocabulary.len())
    }
}
