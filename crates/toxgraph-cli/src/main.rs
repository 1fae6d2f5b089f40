//! toxgraph: predict Tox21 toxicity with pretrained graph neural networks.

mod report;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use report::{EvaluationReport, PredictionReport};
use toxgraph_common::Config;
use toxgraph_data::{consecutive_split, random_split, SampleBatches, SplitFractions, Tox21};
use toxgraph_model::{load_pretrained, masked_roc_auc, mean_defined, GraphPredictor, LoaderConfig, Registry};

#[derive(Parser, Debug)]
#[command(name = "toxgraph", version, about = "Pretrained GNN toxicity prediction on Tox21")]
struct Cli {
    /// Config file (TOML, or YAML by extension)
    #[arg(long, global = true, env = "TOXGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Run on a GPU when one is available
    #[arg(long, global = true)]
    gpu: bool,

    /// Read the dataset from a local CSV instead of downloading it
    #[arg(long, global = true)]
    dataset: Option<PathBuf>,

    /// Print reports as JSON instead of tables
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Predict the toxicity profile of one dataset sample (default)
    Predict(PredictArgs),
    /// Masked ROC-AUC per task over the dataset
    Evaluate(EvaluateArgs),
    /// List the registered pretrained models
    Models,
}

#[derive(Args, Debug, Default)]
struct PredictArgs {
    /// Registered model name
    #[arg(long)]
    model: Option<String>,

    /// Dataset index of the sample
    #[arg(long)]
    index: Option<usize>,
}

#[derive(Args, Debug)]
struct EvaluateArgs {
    #[arg(long)]
    model: Option<String>,

    #[arg(long)]
    batch_size: Option<usize>,

    /// Subset to score: all, train, val or test
    #[arg(long, default_value = "all")]
    split: String,

    /// Shuffle before splitting (consecutive split otherwise)
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("toxgraph=debug,info")))
        .init();

    let cli = Cli::parse();
    debug!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => Config::from_path(path).with_context(|| format!("reading config {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };
    if cli.gpu {
        config.model.use_gpu = true;
    }
    if let Some(path) = &cli.dataset {
        config.dataset.path = Some(path.clone());
    }

    let registry = Registry::from_config(&config.model).context("building model registry")?;

    match cli.command.unwrap_or(Command::Predict(PredictArgs::default())) {
        Command::Predict(args) => predict(config, &registry, args, cli.json).await,
        Command::Evaluate(args) => evaluate(config, &registry, args, cli.json).await,
        Command::Models => {
            for spec in registry.specs() {
                println!(
                    "{:<12} {:<4} in={} tasks={}",
                    spec.name,
                    spec.architecture.kind(),
                    spec.architecture.in_feats(),
                    spec.architecture.n_tasks()
                );
            }
            Ok(())
        }
    }
}

async fn load_model(config: &Config, registry: &Registry, name: &str) -> anyhow::Result<Box<dyn GraphPredictor>> {
    let mut model = load_pretrained(name, registry, &LoaderConfig::from(&config.model))
        .await
        .with_context(|| format!("loading pretrained model {}", name))?;
    model.eval();
    Ok(model)
}

async fn load_dataset(config: &Config) -> anyhow::Result<Tox21> {
    if config.dataset.name != "tox21" {
        bail!("unsupported dataset '{}' (only tox21 is available)", config.dataset.name);
    }
    Tox21::from_config(&config.dataset).await.context("loading Tox21")
}

async fn predict(mut config: Config, registry: &Registry, args: PredictArgs, json: bool) -> anyhow::Result<()> {
    if let Some(model) = args.model {
        config.model.name = model;
    }
    if let Some(index) = args.index {
        config.inference.sample_index = index;
    }
    // fail on a bad model name before downloading the dataset
    registry.get(&config.model.name)?;

    let dataset = load_dataset(&config).await?;
    info!("Tox21: {} molecules, {} tasks", dataset.len(), dataset.tasks().len());

    let model = load_model(&config, registry, &config.model.name).await?;

    let index = config.inference.sample_index;
    let (smiles, graph, label, mask) = dataset
        .get(index)
        .with_context(|| format!("reading sample {}", index))?
        .into_parts();
    let feats = graph.ndata("h").context("sample graph has no \"h\" node features")?;

    let logits = model.forward(graph.topology(), feats).context("running the model")?;
    info!("Prediction shape: {:?}", logits.dims());

    let logits: Vec<f32> = logits.squeeze(0)?.to_vec1()?;
    let labels: Vec<f32> = label.to_vec1()?;
    let masks: Vec<f32> = mask.to_vec1()?;

    let report = PredictionReport::new(
        &config.model.name,
        index,
        smiles,
        dataset.tasks(),
        &logits,
        &labels,
        &masks,
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_table());
    }
    Ok(())
}

async fn evaluate(mut config: Config, registry: &Registry, args: EvaluateArgs, json: bool) -> anyhow::Result<()> {
    if let Some(model) = args.model {
        config.model.name = model;
    }
    if let Some(batch_size) = args.batch_size {
        config.inference.batch_size = batch_size.max(1);
    }
    registry.get(&config.model.name)?;

    let dataset = load_dataset(&config).await?;
    let model = load_model(&config, registry, &config.model.name).await?;

    let indices = if args.split == "all" {
        (0..dataset.len()).collect()
    } else {
        let split = match args.seed {
            Some(seed) => random_split(dataset.len(), SplitFractions::default(), seed)?,
            None => consecutive_split(dataset.len(), SplitFractions::default())?,
        };
        match args.split.as_str() {
            "train" => split.train,
            "val" => split.val,
            "test" => split.test,
            other => bail!("unknown split '{}' (expected all, train, val or test)", other),
        }
    };
    info!("Scoring {} molecules with {}", indices.len(), config.model.name);

    let mut scores: Vec<Vec<f32>> = Vec::with_capacity(indices.len());
    let mut labels: Vec<Vec<f32>> = Vec::with_capacity(indices.len());
    let mut masks: Vec<Vec<f32>> = Vec::with_capacity(indices.len());
    for batch in SampleBatches::with_indices(dataset.dataset(), indices, config.inference.batch_size) {
        let batch = batch?;
        let feats = batch.graph.ndata("h").context("batched graph has no \"h\" node features")?;
        let logits: Vec<Vec<f32>> = model.forward(batch.graph.topology(), feats)?.to_vec2()?;
        scores.extend(logits.into_iter().map(|row| row.into_iter().map(report::sigmoid).collect::<Vec<_>>()));
        labels.extend(batch.labels.to_vec2::<f32>()?);
        masks.extend(batch.masks.to_vec2::<f32>()?);
    }

    let aucs = masked_roc_auc(&scores, &labels, &masks);
    let report = EvaluationReport::new(
        &config.model.name,
        &args.split,
        scores.len(),
        dataset.tasks(),
        &aucs,
        mean_defined(&aucs),
    );
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.to_table());
    }
    Ok(())
}
