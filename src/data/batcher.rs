// ============================================================
// Layer 4 — Summary Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<EncodedExample>
// into device tensors.
//
//   Input:  N encoded examples, each with sequences of length L
//   Output: SummaryBatch with tensors of shape [N, L]
//
// All sequences are already padded to the same length by the
// dataset, so batching is a flatten + reshape:
//   [s1_t1, ..., s1_tL, s2_t1, ..., sN_tL] → [N, L]
//
// The host-side label ids are kept next to the tensors: the
// evaluation phase decodes references from them without a
// device round trip.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::EncodedExample;

#[derive(Debug, Clone)]
pub struct SummaryBatch<B: Backend> {
    /// Document token ids — shape: [batch_size, seq_len]
    pub input_ids: Tensor<B, 2, Int>,

    /// 1 = real token, 0 = padding — shape: [batch_size, seq_len]
    pub attention_mask: Tensor<B, 2, Int>,

    /// Summary token ids — shape: [batch_size, seq_len]
    pub labels: Tensor<B, 2, Int>,

    /// The same labels, one Vec per example
    pub label_ids: Vec<Vec<u32>>,
}

impl<B: Backend> SummaryBatch<B> {
    pub fn size(&self) -> usize {
        self.label_ids.len()
    }
}

/// Holds the target device so tensors are created on the
/// correct GPU/CPU.
#[derive(Clone, Debug)]
pub struct SummaryBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> SummaryBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack(&self, rows: &[&[u32]]) -> Tensor<B, 2, Int> {
        let batch_size = rows.len();
        let seq_len    = rows.first().map_or(0, |r| r.len());
        let flat: Vec<i32> = rows
            .iter()
            .flat_map(|r| r.iter().map(|&x| x as i32))
            .collect();

        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len])
    }
}

impl<B: Backend> Batcher<EncodedExample, SummaryBatch<B>> for SummaryBatcher<B> {
    fn batch(&self, items: Vec<EncodedExample>) -> SummaryBatch<B> {
        let input_rows: Vec<&[u32]> = items.iter().map(|e| e.input_ids.as_slice()).collect();
        let mask_rows:  Vec<&[u32]> = items.iter().map(|e| e.attention_mask.as_slice()).collect();
        let label_rows: Vec<&[u32]> = items.iter().map(|e| e.labels.as_slice()).collect();

        let input_ids      = self.stack(&input_rows);
        let attention_mask = self.stack(&mask_rows);
        let labels         = self.stack(&label_rows);

        SummaryBatch {
            input_ids,
            attention_mask,
            labels,
            label_ids: items.into_iter().map(|e| e.labels).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    #[test]
    fn test_batch_shapes_and_values() {
        let device  = Default::default();
        let batcher = SummaryBatcher::<NdArray>::new(device);
        let items = vec![
            EncodedExample { input_ids: vec![5, 6, 1], attention_mask: vec![1, 1, 0], labels: vec![7, 1, 1] },
            EncodedExample { input_ids: vec![8, 9, 4], attention_mask: vec![1, 1, 1], labels: vec![9, 9, 1] },
        ];

        let batch = batcher.batch(items);
        assert_eq!(batch.input_ids.dims(), [2, 3]);
        assert_eq!(batch.attention_mask.dims(), [2, 3]);
        assert_eq!(batch.labels.dims(), [2, 3]);
        assert_eq!(batch.size(), 2);
        assert_eq!(batch.label_ids[1], vec![9, 9, 1]);

        let ids: Vec<i64> = batch.input_ids.into_data().iter::<i64>().collect();
        assert_eq!(ids, vec![5, 6, 1, 8, 9, 4]);
    }
}
