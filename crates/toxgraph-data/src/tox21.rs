//! Tox21: qualitative toxicity of ~8k compounds across 12 assay targets.
//!
//! The gzipped CSV is downloaded once into the cache directory and parsed on
//! every construction. Column `mol_id` is dropped; `smiles` holds the
//! molecules and the remaining 12 columns are the tasks.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use toxgraph_common::cache::cache_subdir;
use toxgraph_common::DatasetConfig;

use crate::csv_dataset::{MoleculeCsvDataset, Sample};
use crate::error::{DataError, Result};
use crate::pipeline::GraphPipeline;

pub const TOX21_URL: &str = "https://data.dgl.ai/dataset/tox21.csv.gz";

pub const TOX21_FILE: &str = "tox21.csv.gz";

pub const TOX21_TASKS: [&str; 12] = [
    "NR-AR",
    "NR-AR-LBD",
    "NR-AhR",
    "NR-Aromatase",
    "NR-ER",
    "NR-ER-LBD",
    "NR-PPAR-gamma",
    "SR-ARE",
    "SR-ATAD5",
    "SR-HSE",
    "SR-MMP",
    "SR-p53",
];

const SMILES_COLUMN: &str = "smiles";
const EXCLUDED_COLUMNS: &[&str] = &["mol_id"];

#[derive(Debug, Clone)]
pub struct Tox21 {
    inner: MoleculeCsvDataset,
}

impl Tox21 {
    /// Download (or reuse the cached copy) and build graphs with `pipeline`.
    pub async fn new(pipeline: GraphPipeline) -> Result<Self> {
        Self::with_source(TOX21_URL, cache_subdir(None, "tox21"), pipeline).await
    }

    /// Build from the `[dataset]` config section. A configured `path` is
    /// read directly and nothing is downloaded.
    pub async fn from_config(config: &DatasetConfig) -> Result<Self> {
        let pipeline = GraphPipeline::from_config(config)?;
        match &config.path {
            Some(path) => Self::load_blocking(path.clone(), pipeline).await,
            None => {
                let cache_dir = cache_subdir(config.cache_dir.as_deref(), "tox21");
                Self::with_source(&config.url, cache_dir, pipeline).await
            }
        }
    }

    pub async fn with_source(url: &str, cache_dir: PathBuf, pipeline: GraphPipeline) -> Result<Self> {
        let path = fetch_cached(url, &cache_dir).await?;
        Self::load_blocking(path, pipeline).await
    }

    /// Parse a local Tox21 CSV (plain or gzipped).
    pub fn from_path(path: &Path, pipeline: &GraphPipeline) -> Result<Self> {
        let inner = MoleculeCsvDataset::from_path(path, SMILES_COLUMN, EXCLUDED_COLUMNS, pipeline)?;
        Ok(Self { inner })
    }

    async fn load_blocking(path: PathBuf, pipeline: GraphPipeline) -> Result<Self> {
        tokio::task::spawn_blocking(move || Self::from_path(&path, &pipeline)).await?
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<Sample> {
        self.inner.get(index)
    }

    pub fn tasks(&self) -> &[String] {
        self.inner.tasks()
    }

    pub fn task_pos_weights(&self) -> Vec<f32> {
        self.inner.task_pos_weights()
    }

    pub fn dataset(&self) -> &MoleculeCsvDataset {
        &self.inner
    }
}

/// Download `url` into `cache_dir` unless a copy already exists there.
pub async fn fetch_cached(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    let file_name = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or(TOX21_FILE);
    let path = cache_dir.join(file_name);
    if path.exists() {
        debug!("Using cached {:?}", path);
        return Ok(path);
    }

    tokio::fs::create_dir_all(cache_dir).await?;
    info!("Downloading {} to {:?}", url, path);

    let response = reqwest::Client::new().get(url).send().await?;
    if !response.status().is_success() {
        return Err(DataError::Download(format!("{}: HTTP {}", url, response.status())));
    }
    let content = response.bytes().await?;

    // write then rename so an interrupted download never looks cached
    let partial = path.with_extension("part");
    tokio::fs::write(&partial, &content).await?;
    tokio::fs::rename(&partial, &path).await?;
    info!("Downloaded {} ({} bytes)", file_name, content.len());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn sample_csv() -> String {
        let mut csv = format!("{},mol_id,smiles\n", TOX21_TASKS.join(","));
        csv.push_str("0,0,1,,,,,,,,,0,TOX3021,CCOc1ccc2nc(S(N)(=O)=O)sc2c1\n");
        csv.push_str("0,0,0,0,0,0,0,,0,,0,0,TOX3020,CCN1C(=O)NC(c2ccccc2)C1=O\n");
        csv
    }

    #[tokio::test]
    async fn test_cached_file_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("tox21.csv")).unwrap();
        file.write_all(sample_csv().as_bytes()).unwrap();

        // the URL is never contacted because the file is already there
        let path = fetch_cached("http://127.0.0.1:9/tox21.csv", dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("tox21.csv"));
    }

    #[tokio::test]
    async fn test_from_config_with_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tox21.csv");
        std::fs::write(&path, sample_csv()).unwrap();

        let config = DatasetConfig {
            path: Some(path),
            ..DatasetConfig::default()
        };
        let ds = Tox21::from_config(&config).await.unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.tasks().len(), 12);
        assert_eq!(ds.tasks()[2], "NR-AhR");

        let sample = ds.get(0).unwrap();
        let mask = sample.mask.to_vec1::<f32>().unwrap();
        assert_eq!(mask.iter().sum::<f32>(), 4.0);
        assert_eq!(sample.graph.ndata("h").unwrap().dims()[1], 74);
    }

    #[tokio::test]
    #[ignore] // requires network access
    async fn test_download_tox21() {
        let dir = tempfile::tempdir().unwrap();
        let ds = Tox21::with_source(TOX21_URL, dir.path().to_path_buf(), GraphPipeline::default())
            .await
            .unwrap();
        assert_eq!(ds.tasks(), TOX21_TASKS.map(String::from).as_slice());
        assert!(ds.len() > 7000);
        assert!(ds.get(0).is_ok());
    }
}
