//! Resolving, downloading and loading pretrained weights.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use tracing::{debug, info};

use crate::checkpoint::{read_legacy, CheckpointFormat};
use crate::classifier::GraphPredictor;
use crate::config::LoaderConfig;
use crate::error::{ModelError, Result};
use crate::registry::{ModelSpec, Registry, WeightSource};

/// Key under which DGL training scripts nest the parameters.
pub const STATE_DICT_KEY: &str = "model_state_dict";

/// Look up `name`, fetch its weights if needed and return the model in
/// inference mode.
///
/// Unknown names fail before any network or disk access.
pub async fn load_pretrained(name: &str, registry: &Registry, config: &LoaderConfig) -> Result<Box<dyn GraphPredictor>> {
    let spec = registry.get(name)?;
    let start = Instant::now();
    info!("Loading pretrained model: {}", spec.name);

    let path = fetch_weights(&spec.weights, &config.weights_dir()).await?;
    let model = load_from_path(spec, &path, config).await?;
    info!("Model {} loaded in {:.2}s", spec.name, start.elapsed().as_secs_f32());
    Ok(model)
}

/// Build `spec`'s architecture from a checkpoint already on disk.
pub async fn load_from_path(spec: &ModelSpec, path: &Path, config: &LoaderConfig) -> Result<Box<dyn GraphPredictor>> {
    let device = select_device(config)?;
    debug!("Using device: {:?}", device);

    let owned = path.to_path_buf();
    let tensors = tokio::task::spawn_blocking(move || read_state_dict(&owned)).await??;
    debug!("{} tensors in {:?}", tensors.len(), path);

    let vb = VarBuilder::from_tensors(tensors, DType::F32, &device);
    let mut model = spec.architecture.build(&spec.name, vb, &device)?;
    model.eval();
    Ok(model)
}

/// Local path of the weights, downloading into `cache_dir` on first use.
pub async fn fetch_weights(source: &WeightSource, cache_dir: &Path) -> Result<PathBuf> {
    match source {
        WeightSource::Path(path) => {
            if path.exists() {
                Ok(path.clone())
            } else {
                Err(ModelError::ModelLoad(format!("weights not found at {:?}", path)))
            }
        }
        WeightSource::Url(url) => download_cached(url, cache_dir).await,
        WeightSource::HfHub { repo, file } => {
            let (repo, file) = (repo.clone(), file.clone());
            let hub_cache = cache_dir.join("hub");
            tokio::task::spawn_blocking(move || {
                use hf_hub::api::sync::ApiBuilder;
                use hf_hub::{Repo, RepoType};

                let api = ApiBuilder::new().with_cache_dir(hub_cache).build()?;
                info!("Fetching {} from {}", file, repo);
                let path = api.repo(Repo::new(repo, RepoType::Model)).get(&file)?;
                Ok::<_, ModelError>(path)
            })
            .await?
        }
    }
}

async fn download_cached(url: &str, cache_dir: &Path) -> Result<PathBuf> {
    let file_name = url
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ModelError::Download(format!("no file name in {}", url)))?;
    let path = cache_dir.join(file_name);
    if path.exists() {
        debug!("Using cached weights {:?}", path);
        return Ok(path);
    }

    tokio::fs::create_dir_all(cache_dir).await?;
    info!("Downloading {}", url);
    let response = reqwest::Client::new().get(url).send().await?;
    if !response.status().is_success() {
        return Err(ModelError::Download(format!("{}: HTTP {}", url, response.status())));
    }
    let bytes = response.bytes().await?;

    let partial = path.with_extension("part");
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, &path).await?;
    info!("Saved {} ({} bytes)", file_name, bytes.len());
    Ok(path)
}

/// Read a parameter map from `.safetensors` or a PyTorch checkpoint in
/// either the zip or the pre-1.6 serialization format.
///
/// PyTorch files may hold the parameters at the top level or under
/// [`STATE_DICT_KEY`]. Tensors are loaded on the CPU.
pub fn read_state_dict(path: &Path) -> Result<HashMap<String, Tensor>> {
    let format = CheckpointFormat::detect(path)?;
    debug!("{:?} is a {:?} checkpoint", path, format);
    let tensors: HashMap<String, Tensor> = match format {
        CheckpointFormat::Safetensors => candle_core::safetensors::load(path, &Device::Cpu)
            .map_err(|e| ModelError::ModelLoad(format!("{:?}: {}", path, e)))?,
        CheckpointFormat::TorchLegacy => read_legacy(path, Some(STATE_DICT_KEY))?,
        CheckpointFormat::TorchZip => {
            let nested = candle_core::pickle::read_all_with_key(path, Some(STATE_DICT_KEY));
            let entries = match nested {
                Ok(entries) if !entries.is_empty() => entries,
                _ => candle_core::pickle::read_all(path)
                    .map_err(|e| ModelError::ModelLoad(format!("{:?}: {}", path, e)))?,
            };
            entries.into_iter().collect()
        }
    };
    if tensors.is_empty() {
        return Err(ModelError::ModelLoad(format!("{:?} holds no tensors", path)));
    }
    Ok(tensors)
}

pub fn select_device(config: &LoaderConfig) -> Result<Device> {
    if !config.use_gpu {
        return Ok(Device::Cpu);
    }

    #[cfg(feature = "cuda")]
    {
        match Device::new_cuda(0) {
            Ok(device) => {
                info!("CUDA device available");
                return Ok(device);
            }
            Err(e) => debug!("CUDA not available: {}, falling back to CPU", e),
        }
    }

    #[cfg(feature = "metal")]
    {
        match Device::new_metal(0) {
            Ok(device) => {
                info!("Metal device available");
                return Ok(device);
            }
            Err(e) => debug!("Metal not available: {}, falling back to CPU", e),
        }
    }

    debug!("No GPU backend compiled in, using CPU");
    Ok(Device::Cpu)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_model_fails_before_io() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoaderConfig::cpu().with_cache_dir(dir.path());
        let err = load_pretrained("NoSuchModel", &Registry::builtin(), &config).await.err().unwrap();
        assert!(matches!(err, ModelError::UnknownModel { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_local_weights() {
        let source = WeightSource::Path(PathBuf::from("/nonexistent/weights.pth"));
        let err = fetch_weights(&source, Path::new("/tmp")).await.unwrap_err();
        assert!(matches!(err, ModelError::ModelLoad(_)));
    }

    #[tokio::test]
    async fn test_cached_url_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("gcn_tox21.pth"), b"x").unwrap();
        let source = WeightSource::Url("http://127.0.0.1:9/gcn_tox21.pth".to_string());
        let path = fetch_weights(&source, dir.path()).await.unwrap();
        assert_eq!(path, dir.path().join("gcn_tox21.pth"));
    }

    #[test]
    fn test_select_cpu() {
        assert!(select_device(&LoaderConfig::cpu()).unwrap().is_cpu());
    }

    #[test]
    fn test_corrupt_checkpoint() {
        let file = tempfile::Builder::new().suffix(".pth").tempfile().unwrap();
        std::fs::write(file.path(), b"not a checkpoint").unwrap();
        assert!(matches!(read_state_dict(file.path()), Err(ModelError::ModelLoad(_))));
    }
}
