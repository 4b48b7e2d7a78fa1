use anyhow::{Result, bail};
use hf_hub::{Repo, RepoType, api::tokio::Api};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub artifacts_path: Option<PathBuf>,
    pub artifacts_repo: Option<String>,
    pub revision: String,
    pub vectorizer_file: String,
    pub classifier_config_file: String,
    pub classifier_weights_file: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            artifacts_path: None,
            artifacts_repo: None,
            revision: "main".to_string(),
            vectorizer_file: "vectorizer.json".to_string(),
            classifier_config_file: "classifier.json".to_string(),
            classifier_weights_file: "classifier.safetensors".to_string(),
        }
    }
}

/// Local paths of the three artifact files.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactFiles {
    pub vectorizer: PathBuf,
    pub classifier_config: PathBuf,
    pub classifier_weights: PathBuf,
}

/// Locates the artifacts in a local directory, or downloads them from the
/// Hugging Face Hub into the local cache.
#[tracing::instrument(skip(config), fields(path = ?config.artifacts_path, repo = ?config.artifacts_repo))]
pub async fn resolve(config: &ArtifactConfig) -> Result<ArtifactFiles> {
    match (&config.artifacts_path, &config.artifacts_repo) {
        (Some(base_path), _) => {
            if !base_path.is_dir() {
                bail!("Artifacts path {} is not a directory.", base_path.display());
            }

            let files = ArtifactFiles {
                vectorizer: base_path.join(&config.vectorizer_file),
                classifier_config: base_path.join(&config.classifier_config_file),
                classifier_weights: base_path.join(&config.classifier_weights_file),
            };
            for file in [
                &files.vectorizer,
                &files.classifier_config,
                &files.classifier_weights,
            ] {
                if !file.is_file() {
                    bail!("Artifact {} does not exist.", file.display());
                }
            }
            Ok(files)
        }
        (None, Some(repo_id)) => {
            let repo = Repo::with_revision(repo_id.clone(), RepoType::Model, config.revision.clone());
            let api = Api::new()?;
            let api = api.repo(repo);
            tracing::info!("Fetching artifacts from the Hugging Face Hub");
            Ok(ArtifactFiles {
                vectorizer: api.get(&config.vectorizer_file).await?,
                classifier_config: api.get(&config.classifier_config_file).await?,
                classifier_weights: api.get(&config.classifier_weights_file).await?,
            })
        }
        (None, None) => bail!("Either artifacts_path or artifacts_repo must be specified"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch_all(dir: &std::path::Path, config: &ArtifactConfig) {
        for name in [
            &config.vectorizer_file,
            &config.classifier_config_file,
            &config.classifier_weights_file,
        ] {
            std::fs::write(dir.join(name), b"{}").unwrap();
        }
    }

    #[tokio::test]
    async fn test_resolves_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArtifactConfig {
            artifacts_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        touch_all(dir.path(), &config);

        let files = resolve(&config).await.unwrap();
        assert_eq!(files.vectorizer, dir.path().join("vectorizer.json"));
        assert_eq!(files.classifier_config, dir.path().join("classifier.json"));
        assert_eq!(
            files.classifier_weights,
            dir.path().join("classifier.safetensors")
        );
    }

    #[tokio::test]
    async fn test_local_directory_wins_over_repo() {
        let dir = tempfile::tempdir().unwrap();
        let config = ArtifactConfig {
            artifacts_path: Some(dir.path().to_path_buf()),
            artifacts_repo: Some("someone/sentiment".to_string()),
            vectorizer_file: "tfidf.json".to_string(),
            ..Default::default()
        };
        touch_all(dir.path(), &config);

        let files = resolve(&config).await.unwrap();
        assert_eq!(files.vectorizer, dir.path().join("tfidf.json"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vectorizer.json"), b"{}").unwrap();
        let config = ArtifactConfig {
            artifacts_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let err = resolve(&config).await.unwrap_err();
        assert!(err.to_string().contains("classifier.json"));
    }

    #[tokio::test]
    async fn test_path_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();
        let config = ArtifactConfig {
            artifacts_path: Some(file),
            ..Default::default()
        };
        assert!(resolve(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_requires_a_source() {
        let err = resolve(&ArtifactConfig::default()).await.unwrap_err();
        assert!(err.to_string().contains("must be specified"));
    }
}
