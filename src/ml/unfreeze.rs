// ============================================================
// Layer 5 — Layer-Unfreezing Policy
// ============================================================
// Gradual unfreezing: training starts with only the last layer
// of each stack trainable, and after every early epoch one more
// layer (counting from the top) joins the trainable set.
//
//   epoch 0 → offsets {-1}
//   epoch 1 → offsets {-1, -2}
//   epoch 2 → offsets {-1, -2, -3}
//
// A call never freezes anything, so repeated calls are harmless
// and each scheduled set contains the previous one.
//
// Every call also unfreezes the shared token embedding and a
// positional embedding. Which positional embedding is decided by
// SharedUnfreeze. EncoderCoupled picks the ENCODER's even when
// the decoder is addressed.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::component::{ComponentPath, LayerLayout, Part, PartError};
use crate::domain::traits::ParamFlags;

/// Which positional embedding accompanies the shared embedding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SharedUnfreeze {
    /// Encoder positional embedding, whatever part is addressed
    #[default]
    EncoderCoupled,
    /// Positional embedding of the addressed part
    PartScoped,
}

impl FromStr for SharedUnfreeze {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "encoder-coupled" => Ok(SharedUnfreeze::EncoderCoupled),
            "part-scoped"     => Ok(SharedUnfreeze::PartScoped),
            other => Err(format!(
                "unknown shared-unfreeze mode '{other}': choose 'encoder-coupled' or 'part-scoped'"
            )),
        }
    }
}

impl fmt::Display for SharedUnfreeze {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedUnfreeze::EncoderCoupled => write!(f, "encoder-coupled"),
            SharedUnfreeze::PartScoped     => write!(f, "part-scoped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnfreezeError {
    #[error(transparent)]
    InvalidPart(#[from] PartError),

    #[error("layer offset {offset} is out of range for the {part} ({layers} layers)")]
    LayerOutOfRange {
        part:   Part,
        offset: isize,
        layers: usize,
    },
}

/// Unfreeze `offsets` of the part named `part`.
///
/// Nothing is changed unless `part` parses and every offset
/// resolves.
pub fn unfreeze_layers<F: ParamFlags>(
    flags:   &mut F,
    layout:  &LayerLayout,
    part:    &str,
    offsets: &[isize],
    shared:  SharedUnfreeze,
) -> Result<(), UnfreezeError> {
    let part: Part = part.parse()?;
    unfreeze_part(flags, layout, part, offsets, shared)
}

pub fn unfreeze_part<F: ParamFlags>(
    flags:   &mut F,
    layout:  &LayerLayout,
    part:    Part,
    offsets: &[isize],
    shared:  SharedUnfreeze,
) -> Result<(), UnfreezeError> {
    let layers = offsets
        .iter()
        .map(|&offset| {
            layout.resolve(part, offset).ok_or(UnfreezeError::LayerOutOfRange {
                part,
                offset,
                layers: layout.layers(part),
            })
        })
        .collect::<Result<Vec<usize>, _>>()?;

    flags.unfreeze(ComponentPath::SharedEmbedding);
    let positions = match shared {
        SharedUnfreeze::EncoderCoupled => Part::Encoder,
        SharedUnfreeze::PartScoped     => part,
    };
    flags.unfreeze(ComponentPath::PositionEmbedding(positions));

    // The part's layer-norms come with its layers, not on their own.
    for index in &layers {
        flags.unfreeze(ComponentPath::Layer(part, *index));
    }
    if !layers.is_empty() {
        flags.unfreeze(ComponentPath::EmbeddingLayerNorm(part));
        flags.unfreeze(ComponentPath::FinalLayerNorm(part));
    }

    tracing::debug!("Unfroze {} {:?} ({})", part, offsets, shared);
    Ok(())
}

/// Offsets to unfreeze after `epoch` (0-based): the top `epoch + 1` layers.
pub fn schedule_offsets(epoch: usize) -> Vec<isize> {
    (1..=epoch as isize + 1).map(|i| -i).collect()
}
