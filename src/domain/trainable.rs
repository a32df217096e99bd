// ============================================================
// Layer 3 — Trainable Set
// ============================================================
// The set of model components whose parameters the optimizer
// is allowed to update. Everything not in the set is frozen.
//
// The optimizer is always built from the current set, and the
// final set is written as JSON next to the fine-tuned weights.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::domain::component::ComponentPath;
use crate::domain::traits::ParamFlags;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainableSet {
    components: BTreeSet<ComponentPath>,
}

impl TrainableSet {
    /// A set with every component frozen.
    pub fn frozen() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ComponentPath> {
        self.components.iter()
    }

    pub fn is_superset_of(&self, other: &TrainableSet) -> bool {
        self.components.is_superset(&other.components)
    }
}

impl ParamFlags for TrainableSet {
    fn freeze(&mut self, path: ComponentPath) {
        self.components.remove(&path);
    }

    fn unfreeze(&mut self, path: ComponentPath) {
        self.components.insert(path);
    }

    fn is_trainable(&self, path: &ComponentPath) -> bool {
        self.components.contains(path)
    }
}

impl FromIterator<ComponentPath> for TrainableSet {
    fn from_iter<I: IntoIterator<Item = ComponentPath>>(iter: I) -> Self {
        Self { components: iter.into_iter().collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::Part;

    #[test]
    fn test_freeze_and_unfreeze() {
        let mut set = TrainableSet::frozen();
        assert!(set.is_empty());

        set.unfreeze(ComponentPath::SharedEmbedding);
        set.unfreeze(ComponentPath::SharedEmbedding);
        assert_eq!(set.len(), 1);
        assert!(set.is_trainable(&ComponentPath::SharedEmbedding));

        set.freeze(ComponentPath::SharedEmbedding);
        assert!(!set.is_trainable(&ComponentPath::SharedEmbedding));
    }

    #[test]
    fn test_superset() {
        let small: TrainableSet = [ComponentPath::Layer(Part::Encoder, 5)].into_iter().collect();
        let big: TrainableSet = [
            ComponentPath::Layer(Part::Encoder, 5),
            ComponentPath::Layer(Part::Encoder, 4),
        ]
        .into_iter()
        .collect();

        assert!(big.is_superset_of(&small));
        assert!(!small.is_superset_of(&big));
        assert!(small.is_superset_of(&small));
    }

    #[test]
    fn test_json_round_trip() {
        let set: TrainableSet = [
            ComponentPath::SharedEmbedding,
            ComponentPath::FinalLayerNorm(Part::Decoder),
        ]
        .into_iter()
        .collect();
        let json = serde_json::to_string(&set).unwrap();
        let back: TrainableSet = serde_json::from_str(&json).unwrap();
        assert_eq!(set, back);
    }
}
