// ============================================================
// Layer 3 — Component Addressing
// ============================================================
// Names every sub-module of the seq2seq model that can be
// frozen or unfrozen as one unit.
//
// The model has two stacks ("parts"), each with:
//   - a positional embedding
//   - an embedding layer-norm
//   - an ordered list of transformer layers
//   - a final layer-norm
// plus one token embedding shared by both stacks (and tied to
// the output projection).
//
// A ComponentPath is a plain value: no framework types, no
// string paths. The ML layer resolves it to parameter ids
// through a registry built once when the model is loaded.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the two transformer stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Part {
    Encoder,
    Decoder,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartError {
    #[error("invalid part '{0}': choose 'encoder' or 'decoder'")]
    InvalidPart(String),
}

impl FromStr for Part {
    type Err = PartError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encoder" => Ok(Part::Encoder),
            "decoder" => Ok(Part::Decoder),
            other     => Err(PartError::InvalidPart(other.to_string())),
        }
    }
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Part::Encoder => write!(f, "encoder"),
            Part::Decoder => write!(f, "decoder"),
        }
    }
}

/// Address of a freezable unit of the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentPath {
    /// Token embedding shared by encoder, decoder and output head
    SharedEmbedding,
    /// Learned positional embedding of one stack
    PositionEmbedding(Part),
    /// Layer-norm applied right after the embeddings of one stack
    EmbeddingLayerNorm(Part),
    /// Transformer layer `index` (0-based) of one stack
    Layer(Part, usize),
    /// Layer-norm applied after the last layer of one stack
    FinalLayerNorm(Part),
}

impl fmt::Display for ComponentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentPath::SharedEmbedding          => write!(f, "shared"),
            ComponentPath::PositionEmbedding(p)     => write!(f, "{p}.embed_positions"),
            ComponentPath::EmbeddingLayerNorm(p)    => write!(f, "{p}.layernorm_embedding"),
            ComponentPath::Layer(p, i)              => write!(f, "{p}.layers[{i}]"),
            ComponentPath::FinalLayerNorm(p)        => write!(f, "{p}.layer_norm"),
        }
    }
}

/// Number of transformer layers in each stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerLayout {
    pub encoder_layers: usize,
    pub decoder_layers: usize,
}

impl LayerLayout {
    pub fn new(encoder_layers: usize, decoder_layers: usize) -> Self {
        Self { encoder_layers, decoder_layers }
    }

    pub fn layers(&self, part: Part) -> usize {
        match part {
            Part::Encoder => self.encoder_layers,
            Part::Decoder => self.decoder_layers,
        }
    }

    /// Resolve a Python-style index into a layer index.
    /// Negative offsets count from the end: -1 is the last layer.
    pub fn resolve(&self, part: Part, offset: isize) -> Option<usize> {
        let count = self.layers(part);
        if offset < 0 {
            count.checked_sub(offset.unsigned_abs())
        } else {
            let index = offset as usize;
            (index < count).then_some(index)
        }
    }

    /// Every component of the model, in a stable order.
    pub fn all_components(&self) -> Vec<ComponentPath> {
        let mut out = vec![ComponentPath::SharedEmbedding];
        for part in [Part::Encoder, Part::Decoder] {
            out.push(ComponentPath::PositionEmbedding(part));
            out.push(ComponentPath::EmbeddingLayerNorm(part));
            out.extend((0..self.layers(part)).map(|i| ComponentPath::Layer(part, i)));
            out.push(ComponentPath::FinalLayerNorm(part));
        }
        out
    }
}
