//! Graph convolution and graph attention layers.
//!
//! Parameter names follow the PyTorch checkpoints the pretrained weights
//! ship in, so a `VarBuilder` over such a state dict loads them directly.

use candle_core::{DType, Tensor};
use candle_nn::{batch_norm, linear, linear_no_bias, BatchNorm, BatchNormConfig, Dropout, Linear, Module, ModuleT, VarBuilder};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ops::{aggregate_in_neighbors, edge_softmax, scatter_sum, EdgeIndex};

/// A message-passing layer; `train` toggles dropout and batch statistics.
pub trait GnnLayer: Send + Sync {
    fn out_feats(&self) -> usize;

    fn forward_t(&self, edges: &EdgeIndex, feats: &Tensor, train: bool) -> Result<Tensor>;
}

// ── GCN ──────────────────────────────────────────────────────────────────────

/// Unnormalised graph convolution with residual connection and batch norm:
///
/// `h' = BN(Dropout(ReLU(A·h·W + b) + ReLU(Linear(h))))`
///
/// where `A·h` sums each node's in-neighbours.
pub struct GcnLayer {
    weight: Tensor,
    bias: Tensor,
    res_connection: Linear,
    dropout: Dropout,
    bn_layer: BatchNorm,
    out_feats: usize,
}

impl GcnLayer {
    pub fn load(in_feats: usize, out_feats: usize, dropout: f32, vb: VarBuilder) -> Result<Self> {
        let conv = vb.pp("graph_conv");
        Ok(Self {
            weight: conv.get((in_feats, out_feats), "weight")?,
            bias: conv.get(out_feats, "bias")?,
            res_connection: linear(in_feats, out_feats, vb.pp("res_connection"))?,
            dropout: Dropout::new(dropout),
            bn_layer: batch_norm(out_feats, BatchNormConfig::default(), vb.pp("bn_layer"))?,
            out_feats,
        })
    }
}

impl GnnLayer for GcnLayer {
    fn out_feats(&self) -> usize {
        self.out_feats
    }

    fn forward_t(&self, edges: &EdgeIndex, feats: &Tensor, train: bool) -> Result<Tensor> {
        let conv = aggregate_in_neighbors(edges, feats)?
            .matmul(&self.weight)?
            .broadcast_add(&self.bias)?
            .relu()?;
        let residual = self.res_connection.forward(feats)?.relu()?;
        let h = self.dropout.forward_t(&(conv + residual)?, train)?;
        Ok(self.bn_layer.forward_t(&h, train)?)
    }
}

// ── GAT ──────────────────────────────────────────────────────────────────────

/// How the heads of a GAT layer are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeadAggregation {
    /// Concatenate heads, then ELU (hidden layers)
    Flatten,
    /// Average heads, no activation (last layer)
    Mean,
}

/// Multi-head graph attention with residual connection.
///
/// Scores `LeakyReLU(a_l·Wh_u + a_r·Wh_v)` are softmax-normalised over the
/// incoming edges of `v`. The residual is projected to `heads × head_feats`
/// whenever the input width differs from `head_feats`; otherwise the input
/// is added to every head unchanged.
pub struct GatLayer {
    fc: Linear,
    attn_l: Tensor,
    attn_r: Tensor,
    res_fc: Option<Linear>,
    feat_drop: Dropout,
    attn_drop: Dropout,
    num_heads: usize,
    head_feats: usize,
    aggregation: HeadAggregation,
}

impl GatLayer {
    pub fn load(
        in_feats: usize,
        head_feats: usize,
        num_heads: usize,
        dropout: f32,
        aggregation: HeadAggregation,
        vb: VarBuilder,
    ) -> Result<Self> {
        let gnn = vb.pp("gnn");
        let projected = head_feats * num_heads;
        let res_fc = if in_feats != head_feats {
            Some(linear_no_bias(in_feats, projected, gnn.pp("res_fc"))?)
        } else {
            None
        };
        Ok(Self {
            fc: linear_no_bias(in_feats, projected, gnn.pp("fc"))?,
            attn_l: gnn.get((1, num_heads, head_feats), "attn_l")?,
            attn_r: gnn.get((1, num_heads, head_feats), "attn_r")?,
            res_fc,
            feat_drop: Dropout::new(dropout),
            attn_drop: Dropout::new(dropout),
            num_heads,
            head_feats,
            aggregation,
        })
    }
}

impl GnnLayer for GatLayer {
    fn out_feats(&self) -> usize {
        match self.aggregation {
            HeadAggregation::Flatten => self.head_feats * self.num_heads,
            HeadAggregation::Mean => self.head_feats,
        }
    }

    fn forward_t(&self, edges: &EdgeIndex, feats: &Tensor, train: bool) -> Result<Tensor> {
        let n = edges.num_nodes;
        let shape = (n, self.num_heads, self.head_feats);

        let h = self.feat_drop.forward_t(feats, train)?;
        let projected = self.fc.forward(&h)?.reshape(shape)?;

        let rst = if edges.num_edges == 0 {
            Tensor::zeros(shape, DType::F32, feats.device())?
        } else {
            let el = projected.broadcast_mul(&self.attn_l)?.sum(2)?;
            let er = projected.broadcast_mul(&self.attn_r)?.sum(2)?;
            let scores = (el.index_select(&edges.src, 0)? + er.index_select(&edges.dst, 0)?)?;
            let scores = candle_nn::ops::leaky_relu(&scores, 0.2)?;
            let attention = self.attn_drop.forward_t(&edge_softmax(edges, &scores)?, train)?;
            let messages = projected
                .index_select(&edges.src, 0)?
                .broadcast_mul(&attention.unsqueeze(2)?)?;
            scatter_sum(edges, &messages)?
        };

        let residual = match &self.res_fc {
            Some(fc) => fc.forward(&h)?.reshape(shape)?,
            None => h.reshape((n, 1, self.head_feats))?,
        };
        let rst = rst.broadcast_add(&residual)?;

        Ok(match self.aggregation {
            HeadAggregation::Flatten => rst.flatten_from(1)?.elu(1.0)?,
            HeadAggregation::Mean => rst.mean(1)?,
        })
    }
}
