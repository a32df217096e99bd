// ============================================================
// Layer 5 — Parameter Registry
// ============================================================
// Maps every ComponentPath to the Burn parameter ids it owns.
//
// Burn parameters have no "requires_grad" switch that the
// optimizer respects per module, so freezing is expressed the
// other way round: the optimizer only ever sees gradients for
// the ids that the registry resolves from the TrainableSet.
//
// The registry is built once when the model is loaded. Param
// ids are stable across optimizer steps (the step returns the
// same module with updated tensors), so it never goes stale.

use std::collections::BTreeMap;

use anyhow::{bail, Result};
use burn::{
    module::{Module, ModuleVisitor, ParamId},
    prelude::*,
};

use crate::domain::component::{ComponentPath, LayerLayout, Part};
use crate::domain::trainable::TrainableSet;
use crate::ml::model::Seq2SeqModel;

/// Parameter ids and element count of one component.
#[derive(Debug, Clone, Default)]
struct Slot {
    ids:   Vec<ParamId>,
    numel: usize,
}

/// Collects every float parameter of a sub-module.
struct SlotCollector<'a> {
    slot: &'a mut Slot,
}

impl<B: Backend> ModuleVisitor<B> for SlotCollector<'_> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        self.slot.ids.push(id);
        self.slot.numel += tensor.shape().num_elements();
    }
}

#[derive(Debug, Clone)]
pub struct ParameterRegistry {
    layout: LayerLayout,
    slots:  BTreeMap<ComponentPath, Slot>,
}

impl ParameterRegistry {
    pub fn build<B: Backend>(model: &Seq2SeqModel<B>) -> Self {
        let mut registry = Self {
            layout: model.layout(),
            slots:  BTreeMap::new(),
        };

        registry.register(ComponentPath::SharedEmbedding, &model.shared);

        let enc = &model.encoder;
        registry.register(ComponentPath::PositionEmbedding(Part::Encoder), &enc.embed_positions);
        registry.register(ComponentPath::EmbeddingLayerNorm(Part::Encoder), &enc.layernorm_embedding);
        for (i, layer) in enc.layers.iter().enumerate() {
            registry.register(ComponentPath::Layer(Part::Encoder, i), layer);
        }
        registry.register(ComponentPath::FinalLayerNorm(Part::Encoder), &enc.layer_norm);

        let dec = &model.decoder;
        registry.register(ComponentPath::PositionEmbedding(Part::Decoder), &dec.embed_positions);
        registry.register(ComponentPath::EmbeddingLayerNorm(Part::Decoder), &dec.layernorm_embedding);
        for (i, layer) in dec.layers.iter().enumerate() {
            registry.register(ComponentPath::Layer(Part::Decoder, i), layer);
        }
        registry.register(ComponentPath::FinalLayerNorm(Part::Decoder), &dec.layer_norm);

        tracing::debug!(
            "Parameter registry: {} components, {} parameters",
            registry.slots.len(),
            registry.total_params(),
        );
        registry
    }

    fn register<B: Backend, M: Module<B>>(&mut self, path: ComponentPath, module: &M) {
        let slot = self.slots.entry(path).or_default();
        module.visit(&mut SlotCollector { slot });
    }

    pub fn layout(&self) -> LayerLayout {
        self.layout
    }

    /// Parameter ids of every component in `trainable`.
    pub fn resolve(&self, trainable: &TrainableSet) -> Result<Vec<ParamId>> {
        let mut ids = Vec::new();
        for path in trainable.iter() {
            match self.slots.get(path) {
                Some(slot) => ids.extend(slot.ids.iter().cloned()),
                None       => bail!("Component '{path}' does not exist in this model"),
            }
        }
        Ok(ids)
    }

    /// Number of scalar parameters in `trainable`.
    pub fn trainable_params(&self, trainable: &TrainableSet) -> usize {
        trainable
            .iter()
            .filter_map(|path| self.slots.get(path))
            .map(|slot| slot.numel)
            .sum()
    }

    pub fn total_params(&self) -> usize {
        self.slots.values().map(|slot| slot.numel).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    use crate::domain::traits::ParamFlags;
    use crate::ml::model::tests::tiny_config;

    #[test]
    fn test_registry_covers_every_parameter() {
        let model: Seq2SeqModel<NdArray> = tiny_config(20).init(&Default::default());
        let registry = ParameterRegistry::build(&model);

        assert_eq!(registry.total_params(), model.num_params());

        let everything: TrainableSet = registry.layout().all_components().into_iter().collect();
        assert_eq!(registry.trainable_params(&everything), model.num_params());
    }

    #[test]
    fn test_resolve_selected_components() {
        let model: Seq2SeqModel<NdArray> = tiny_config(20).init(&Default::default());
        let registry = ParameterRegistry::build(&model);

        assert!(registry.resolve(&TrainableSet::frozen()).unwrap().is_empty());

        let mut set = TrainableSet::frozen();
        set.unfreeze(ComponentPath::SharedEmbedding);
        // embedding weight only
        assert_eq!(registry.resolve(&set).unwrap().len(), 1);
        assert_eq!(registry.trainable_params(&set), 20 * 8);

        set.unfreeze(ComponentPath::FinalLayerNorm(Part::Decoder));
        // + layer-norm gamma and beta
        assert_eq!(registry.resolve(&set).unwrap().len(), 3);
    }

    #[test]
    fn test_unknown_component_is_rejected() {
        let model: Seq2SeqModel<NdArray> = tiny_config(20).init(&Default::default());
        let registry = ParameterRegistry::build(&model);

        let mut set = TrainableSet::frozen();
        set.unfreeze(ComponentPath::Layer(Part::Encoder, 42));
        assert!(registry.resolve(&set).is_err());
    }
}
