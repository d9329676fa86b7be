//! Fetches sentence-transformer files (config, tokenizer, safetensors
//! weights) from the Hugging Face hub into a local models directory.

use crate::error::CatGraphError;
use crate::Result;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

const HF_BASE_URL: &str = "https://huggingface.co";

/// One file of a model repository
#[derive(Debug, Clone)]
pub struct ModelFile {
    /// File name inside the repository (e.g. "tokenizer.json")
    pub name: String,

    /// Lower bound on a complete download, in bytes
    pub min_size: u64,

    /// SHA256 hash for verification
    pub sha256: Option<String>,
}

impl ModelFile {
    fn new(name: &str, min_size: u64) -> Self {
        Self {
            name: name.to_string(),
            min_size,
            sha256: None,
        }
    }
}

/// A sentence-transformer repository on the Hugging Face hub
#[derive(Debug, Clone)]
pub struct SentenceModel {
    /// Repository id, e.g. "sentence-transformers/all-MiniLM-L6-v2"
    pub repo: String,

    /// Files required to run the model
    pub files: Vec<ModelFile>,
}

impl SentenceModel {
    /// BERT-style sentence transformer laid out the standard way
    pub fn bert(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            files: vec![
                ModelFile::new("config.json", 64),
                ModelFile::new("tokenizer.json", 1024),
                ModelFile::new("model.safetensors", 1024 * 1024),
            ],
        }
    }

    /// Directory name under the models dir ("org--name")
    pub fn slug(&self) -> String {
        self.repo.replace('/', "--")
    }

    /// Download URL for a file of this model
    pub fn file_url(&self, file: &ModelFile) -> String {
        format!("{}/{}/resolve/main/{}", HF_BASE_URL, self.repo, file.name)
    }
}

/// Local cache of sentence-transformer models under `models_dir/<slug>/`
pub struct ModelManager {
    models_dir: PathBuf,
    http: Client,
}

fn progress_bar(total: Option<u64>) -> Result<ProgressBar> {
    let style = ProgressStyle::default_bar()
        .template("{msg} {wide_bar} {bytes}/{total_bytes} [{elapsed}]")
        .map_err(|e| anyhow::anyhow!("progress template: {}", e))?;
    let bar = ProgressBar::new(total.unwrap_or(0));
    bar.set_style(style);
    Ok(bar)
}

/// Copy a response body into `out`, ticking `bar`; returns bytes written
async fn stream_to(response: reqwest::Response, out: &mut fs::File, bar: &ProgressBar) -> Result<u64> {
    let mut body = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = body.next().await {
        let bytes = chunk.map_err(|e| CatGraphError::network(format!("body stream: {}", e)))?;
        out.write_all(&bytes).await?;
        written += bytes.len() as u64;
        bar.set_position(written);
    }
    out.flush().await?;
    Ok(written)
}

impl ModelManager {
    pub fn new(models_dir: PathBuf) -> Result<Self> {
        // weights can take a while on slow links
        let http = Client::builder()
            .timeout(Duration::from_secs(60 * 60))
            .build()
            .map_err(|e| CatGraphError::network(format!("HTTP client: {}", e)))?;
        Ok(Self { models_dir, http })
    }

    /// Local directory for a model
    pub fn model_dir(&self, model: &SentenceModel) -> PathBuf {
        self.models_dir.join(model.slug())
    }

    /// Whether every file of the model is present locally
    pub fn is_installed(&self, model: &SentenceModel) -> bool {
        let dir = self.model_dir(model);
        model.files.iter().all(|f| dir.join(&f.name).is_file())
    }

    /// Download whichever model files are missing; returns the model directory
    pub async fn ensure_model(&self, model: &SentenceModel) -> Result<PathBuf> {
        let dir = self.model_dir(model);
        let missing: Vec<&ModelFile> = model
            .files
            .iter()
            .filter(|f| !dir.join(&f.name).is_file())
            .collect();

        if missing.is_empty() {
            debug!("{} already installed at {}", model.repo, dir.display());
            return Ok(dir);
        }

        fs::create_dir_all(&dir).await?;
        for file in missing {
            info!("Fetching {} for {}", file.name, model.repo);
            self.download_file(&model.file_url(file), file, &dir.join(&file.name))
                .await?;
        }
        Ok(dir)
    }

    /// Fetch `url` into `dest`.
    ///
    /// The body lands in `<dest>.part` and is renamed only after the size
    /// floor and optional SHA256 both pass, so `dest` is never partial.
    pub async fn download_file(&self, url: &str, file: &ModelFile, dest: &Path) -> Result<()> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| CatGraphError::network(format!("GET {}: {}", url, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatGraphError::network(format!("GET {} returned {}", url, status)));
        }

        let bar = progress_bar(response.content_length())?;
        bar.set_message(file.name.clone());

        let part = dest.with_extension("part");
        let mut out = fs::File::create(&part).await?;
        let written = stream_to(response, &mut out, &bar).await;
        drop(out);
        bar.finish_and_clear();

        let written = match written {
            Ok(n) => n,
            Err(e) => {
                let _ = fs::remove_file(&part).await;
                return Err(e);
            }
        };

        if written < file.min_size {
            fs::remove_file(&part).await?;
            return Err(CatGraphError::model_unavailable(format!(
                "{} truncated: {} bytes, need at least {}",
                file.name, written, file.min_size
            )));
        }
        if !self.verify_file(&part, file.sha256.as_deref()).await? {
            fs::remove_file(&part).await?;
            return Err(CatGraphError::model_unavailable(format!(
                "Checksum mismatch for {}",
                file.name
            )));
        }

        fs::rename(&part, dest).await?;
        info!("Saved {} ({} bytes)", dest.display(), written);
        Ok(())
    }

    /// `false` if the file is missing or its SHA256 differs from `expected_hash`
    pub async fn verify_file(&self, path: &Path, expected_hash: Option<&str>) -> Result<bool> {
        if !path.is_file() {
            return Ok(false);
        }
        match expected_hash {
            None => Ok(true),
            Some(expected) => {
                let digest = Sha256::digest(fs::read(path).await?);
                Ok(hex::encode(digest).eq_ignore_ascii_case(expected))
            }
        }
    }

    /// Repository ids of models with a config.json on disk
    pub async fn list_installed_models(&self) -> Result<Vec<String>> {
        let mut repos = Vec::new();
        let mut dir = match fs::read_dir(&self.models_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(repos),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if !path.join("config.json").is_file() {
                continue;
            }
            if let Some(slug) = path.file_name().and_then(|s| s.to_str()) {
                repos.push(slug.replacen("--", "/", 1));
            }
        }

        repos.sort();
        Ok(repos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bert_model_files() {
        let model = SentenceModel::bert("sentence-transformers/all-MiniLM-L6-v2");
        let names: Vec<_> = model.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["config.json", "tokenizer.json", "model.safetensors"]);
        assert_eq!(model.slug(), "sentence-transformers--all-MiniLM-L6-v2");
        assert_eq!(
            model.file_url(&model.files[0]),
            "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/config.json"
        );
    }

    #[tokio::test]
    async fn test_verify_file_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"abc").unwrap();

        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        let abc_sha256 = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";
        assert!(manager.verify_file(&path, Some(abc_sha256)).await.unwrap());
        assert!(!manager.verify_file(&path, Some("00")).await.unwrap());
        assert!(manager.verify_file(&path, None).await.unwrap());
        assert!(!manager.verify_file(&dir.path().join("missing"), None).await.unwrap());
    }

    #[tokio::test]
    async fn test_installed_models_listing() {
        let dir = tempfile::tempdir().unwrap();
        let manager = ModelManager::new(dir.path().to_path_buf()).unwrap();
        let model = SentenceModel::bert("org/tiny");
        assert!(!manager.is_installed(&model));

        let model_dir = manager.model_dir(&model);
        std::fs::create_dir_all(&model_dir).unwrap();
        for file in &model.files {
            std::fs::write(model_dir.join(&file.name), b"{}").unwrap();
        }

        assert!(manager.is_installed(&model));
        assert_eq!(manager.list_installed_models().await.unwrap(), vec!["org/tiny"]);
    }
}
