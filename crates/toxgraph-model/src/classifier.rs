//! Multi-task graph classifiers: GNN layers → readout → MLP head.

use candle_core::{DType, Device, Tensor};
use candle_nn::{batch_norm, linear, BatchNorm, BatchNormConfig, Dropout, Linear, Module, ModuleT, VarBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use toxgraph_chem::GraphTopology;

use crate::error::{ModelError, Result};
use crate::layers::{GatLayer, GcnLayer, GnnLayer, HeadAggregation};
use crate::ops::EdgeIndex;
use crate::readout::SumAndMaxReadout;

/// Training enables dropout and batch statistics; inference uses running
/// statistics and is deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Mode {
    Training,
    #[default]
    Inference,
}

/// A model over `(graph, node features)` producing `[num_graphs, n_tasks]`
/// logits.
pub trait GraphPredictor: Send + Sync {
    fn name(&self) -> &str;

    fn in_feats(&self) -> usize;

    fn n_tasks(&self) -> usize;

    fn device(&self) -> &Device;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    /// Switch to inference mode. Calling it again changes nothing.
    fn eval(&mut self) {
        self.set_mode(Mode::Inference);
    }

    fn train(&mut self) {
        self.set_mode(Mode::Training);
    }

    /// Logits for already validated inputs on the model's device.
    fn logits(&self, graph: &GraphTopology, feats: &Tensor) -> Result<Tensor>;

    /// Validate `feats` against the model and the graph, move it to the
    /// model's device and return logits.
    fn forward(&self, graph: &GraphTopology, feats: &Tensor) -> Result<Tensor> {
        let (rows, width) = feats
            .dims2()
            .map_err(|_| ModelError::ShapeMismatch(format!("expected 2-D node features, got {:?}", feats.dims())))?;
        if width != self.in_feats() {
            return Err(ModelError::ShapeMismatch(format!(
                "{} expects {} input features per node, got {}",
                self.name(),
                self.in_feats(),
                width
            )));
        }
        if rows != graph.num_nodes() {
            return Err(ModelError::ShapeMismatch(format!(
                "feature matrix has {} rows but the graph has {} nodes",
                rows,
                graph.num_nodes()
            )));
        }
        let feats = feats.to_device(self.device())?.to_dtype(DType::F32)?;
        self.logits(graph, &feats)
    }
}

// ── Architectures ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcnConfig {
    pub in_feats: usize,
    pub hidden_feats: Vec<usize>,
    pub classifier_hidden_feats: usize,
    pub n_tasks: usize,
    #[serde(default)]
    pub dropout: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatConfig {
    pub in_feats: usize,
    pub hidden_feats: Vec<usize>,
    pub num_heads: Vec<usize>,
    pub classifier_hidden_feats: usize,
    pub n_tasks: usize,
    #[serde(default)]
    pub dropout: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Architecture {
    Gcn(GcnConfig),
    Gat(GatConfig),
}

impl Architecture {
    pub fn in_feats(&self) -> usize {
        match self {
            Architecture::Gcn(c) => c.in_feats,
            Architecture::Gat(c) => c.in_feats,
        }
    }

    pub fn n_tasks(&self) -> usize {
        match self {
            Architecture::Gcn(c) => c.n_tasks,
            Architecture::Gat(c) => c.n_tasks,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Architecture::Gcn(_) => "gcn",
            Architecture::Gat(_) => "gat",
        }
    }

    /// Instantiate the model with parameters from `vb`, in inference mode.
    pub fn build(&self, name: &str, vb: VarBuilder, device: &Device) -> Result<Box<dyn GraphPredictor>> {
        Ok(match self {
            Architecture::Gcn(c) => Box::new(GcnClassifier::load(name, c, vb, device)?),
            Architecture::Gat(c) => Box::new(GatClassifier::load(name, c, vb, device)?),
        })
    }
}

// ── Head ─────────────────────────────────────────────────────────────────────

/// `Dropout → Linear → ReLU → BatchNorm → Linear`
pub struct MlpBinaryClassifier {
    dropout: Dropout,
    hidden: Linear,
    bn: BatchNorm,
    output: Linear,
}

impl MlpBinaryClassifier {
    pub fn load(in_feats: usize, hidden_feats: usize, n_tasks: usize, dropout: f32, vb: VarBuilder) -> Result<Self> {
        let predict = vb.pp("predict");
        Ok(Self {
            dropout: Dropout::new(dropout),
            hidden: linear(in_feats, hidden_feats, predict.pp("1"))?,
            bn: batch_norm(hidden_feats, BatchNormConfig::default(), predict.pp("3"))?,
            output: linear(hidden_feats, n_tasks, predict.pp("4"))?,
        })
    }

    pub fn forward_t(&self, feats: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.dropout.forward_t(feats, train)?;
        let h = self.hidden.forward(&h)?.relu()?;
        let h = self.bn.forward_t(&h, train)?;
        Ok(self.output.forward(&h)?)
    }
}

// ── Classifier ───────────────────────────────────────────────────────────────

/// Stacked GNN layers, sum-and-max readout and an MLP head.
pub struct GnnClassifier<L: GnnLayer> {
    name: String,
    layers: Vec<L>,
    readout: SumAndMaxReadout,
    head: MlpBinaryClassifier,
    in_feats: usize,
    n_tasks: usize,
    mode: Mode,
    device: Device,
}

pub type GcnClassifier = GnnClassifier<GcnLayer>;

pub type GatClassifier = GnnClassifier<GatLayer>;

impl<L: GnnLayer> GnnClassifier<L> {
    #[allow(clippy::too_many_arguments)]
    fn assemble(
        name: &str,
        layers: Vec<L>,
        in_feats: usize,
        classifier_hidden_feats: usize,
        n_tasks: usize,
        dropout: f32,
        vb: VarBuilder,
        device: &Device,
    ) -> Result<Self> {
        let gnn_out = layers
            .last()
            .map(|l| l.out_feats())
            .ok_or_else(|| ModelError::InvalidConfig(format!("{} has no GNN layers", name)))?;
        Ok(Self {
            name: name.to_string(),
            layers,
            readout: SumAndMaxReadout::load(gnn_out, vb.pp("weighted_sum_readout"))?,
            head: MlpBinaryClassifier::load(2 * gnn_out, classifier_hidden_feats, n_tasks, dropout, vb.pp("soft_classifier"))?,
            in_feats,
            n_tasks,
            mode: Mode::Inference,
            device: device.clone(),
        })
    }
}

impl GcnClassifier {
    pub fn load(name: &str, config: &GcnConfig, vb: VarBuilder, device: &Device) -> Result<Self> {
        let mut layers = Vec::with_capacity(config.hidden_feats.len());
        let mut in_feats = config.in_feats;
        for (i, &out_feats) in config.hidden_feats.iter().enumerate() {
            layers.push(GcnLayer::load(in_feats, out_feats, config.dropout, vb.pp("gnn_layers").pp(i.to_string()))?);
            in_feats = out_feats;
        }
        Self::assemble(
            name,
            layers,
            config.in_feats,
            config.classifier_hidden_feats,
            config.n_tasks,
            config.dropout,
            vb,
            device,
        )
    }
}

impl GatClassifier {
    pub fn load(name: &str, config: &GatConfig, vb: VarBuilder, device: &Device) -> Result<Self> {
        if config.num_heads.len() != config.hidden_feats.len() {
            return Err(ModelError::InvalidConfig(format!(
                "{}: {} hidden layers but {} head counts",
                name,
                config.hidden_feats.len(),
                config.num_heads.len()
            )));
        }
        let depth = config.hidden_feats.len();
        let mut layers = Vec::with_capacity(depth);
        let mut in_feats = config.in_feats;
        for (i, (&out_feats, &heads)) in config.hidden_feats.iter().zip(&config.num_heads).enumerate() {
            let aggregation = if i + 1 < depth {
                HeadAggregation::Flatten
            } else {
                HeadAggregation::Mean
            };
            let layer = GatLayer::load(
                in_feats,
                out_feats,
                heads,
                config.dropout,
                aggregation,
                vb.pp("gnn_layers").pp(i.to_string()),
            )?;
            in_feats = layer.out_feats();
            layers.push(layer);
        }
        Self::assemble(
            name,
            layers,
            config.in_feats,
            config.classifier_hidden_feats,
            config.n_tasks,
            config.dropout,
            vb,
            device,
        )
    }
}

impl<L: GnnLayer> GraphPredictor for GnnClassifier<L> {
    fn name(&self) -> &str {
        &self.name
    }

    fn in_feats(&self) -> usize {
        self.in_feats
    }

    fn n_tasks(&self) -> usize {
        self.n_tasks
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        if self.mode != mode {
            debug!("{}: {:?} -> {:?}", self.name, self.mode, mode);
        }
        self.mode = mode;
    }

    fn logits(&self, graph: &GraphTopology, feats: &Tensor) -> Result<Tensor> {
        let train = self.mode == Mode::Training;
        let edges = EdgeIndex::new(graph, &self.device)?;
        let mut h = feats.clone();
        for layer in &self.layers {
            h = layer.forward_t(&edges, &h, train)?;
        }
        let pooled = self.readout.forward(graph, &h)?;
        self.head.forward_t(&pooled, train)
    }
}
