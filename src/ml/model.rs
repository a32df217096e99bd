// ============================================================
// Layer 5 — Seq2Seq Summarisation Model
// ============================================================
// A BART-shaped encoder/decoder transformer in Burn.
//
//   input_ids ──► shared embedding ──► encoder ──► memory
//                                                   │
//   decoder_input_ids ──► shared embedding ──► decoder ◄─┘
//                                                   │
//                          shared embedding^T ◄─────┘  → logits
//
// Each stack is laid out the way the pretrained checkpoint
// names it, because the unfreezing policy addresses these
// sub-modules one by one:
//
//   embed_positions      learned positional embedding
//   layernorm_embedding  layer-norm after the embeddings
//   layers[i]            post-norm transformer layers
//   layer_norm           final layer-norm
//
// Decoder inputs are the right-shifted labels when labels are
// given, and the right-shifted input ids otherwise. This is
// what the pretrained BART forward does, and the training loop
// relies on it: training calls forward without labels,
// evaluation calls it with labels.

use burn::{
    nn::{
        attention::{generate_autoregressive_mask, MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation::gelu,
};

use crate::domain::component::LayerLayout;

#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub vocab_size: usize,
    #[config(default = 1024)]
    pub max_positions: usize,
    #[config(default = 768)]
    pub d_model: usize,
    #[config(default = 12)]
    pub num_heads: usize,
    #[config(default = 6)]
    pub encoder_layers: usize,
    #[config(default = 6)]
    pub decoder_layers: usize,
    #[config(default = 3072)]
    pub d_ff: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
    /// First decoder input token (`</s>` in BART vocabularies)
    #[config(default = 2)]
    pub decoder_start_token_id: usize,
}

impl Seq2SeqConfig {
    pub fn layout(&self) -> LayerLayout {
        LayerLayout::new(self.encoder_layers, self.decoder_layers)
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> Seq2SeqModel<B> {
        let shared = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);

        let encoder = EncoderStack {
            embed_positions:     EmbeddingConfig::new(self.max_positions, self.d_model).init(device),
            layernorm_embedding: LayerNormConfig::new(self.d_model).init(device),
            layers: (0..self.encoder_layers)
                .map(|_| self.build_encoder_layer(device))
                .collect(),
            layer_norm: LayerNormConfig::new(self.d_model).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        };

        let decoder = DecoderStack {
            embed_positions:     EmbeddingConfig::new(self.max_positions, self.d_model).init(device),
            layernorm_embedding: LayerNormConfig::new(self.d_model).init(device),
            layers: (0..self.decoder_layers)
                .map(|_| self.build_decoder_layer(device))
                .collect(),
            layer_norm: LayerNormConfig::new(self.d_model).init(device),
            dropout:    DropoutConfig::new(self.dropout).init(),
        };

        Seq2SeqModel {
            shared,
            encoder,
            decoder,
            decoder_start_token_id: self.decoder_start_token_id,
        }
    }

    fn attention<B: Backend>(&self, device: &B::Device) -> MultiHeadAttention<B> {
        MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device)
    }

    fn build_encoder_layer<B: Backend>(&self, device: &B::Device) -> EncoderLayer<B> {
        EncoderLayer {
            self_attn:      self.attention(device),
            self_attn_norm: LayerNormConfig::new(self.d_model).init(device),
            fc1:            LinearConfig::new(self.d_model, self.d_ff).init(device),
            fc2:            LinearConfig::new(self.d_ff, self.d_model).init(device),
            final_norm:     LayerNormConfig::new(self.d_model).init(device),
            dropout:        DropoutConfig::new(self.dropout).init(),
        }
    }

    fn build_decoder_layer<B: Backend>(&self, device: &B::Device) -> DecoderLayer<B> {
        DecoderLayer {
            self_attn:       self.attention(device),
            self_attn_norm:  LayerNormConfig::new(self.d_model).init(device),
            cross_attn:      self.attention(device),
            cross_attn_norm: LayerNormConfig::new(self.d_model).init(device),
            fc1:             LinearConfig::new(self.d_model, self.d_ff).init(device),
            fc2:             LinearConfig::new(self.d_ff, self.d_model).init(device),
            final_norm:      LayerNormConfig::new(self.d_model).init(device),
            dropout:         DropoutConfig::new(self.dropout).init(),
        }
    }
}

// ─── Layers ───────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct EncoderLayer<B: Backend> {
    pub self_attn:      MultiHeadAttention<B>,
    pub self_attn_norm: LayerNorm<B>,
    pub fc1:            Linear<B>,
    pub fc2:            Linear<B>,
    pub final_norm:     LayerNorm<B>,
    pub dropout:        Dropout,
}

impl<B: Backend> EncoderLayer<B> {
    /// `pad_mask`: [batch, seq], true on padding positions
    pub fn forward(&self, x: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self.self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(pad_mask))
            .context;
        let x = self.self_attn_norm.forward(x + self.dropout.forward(attn));

        let ffn = self.fc2.forward(gelu(self.fc1.forward(x.clone())));
        self.final_norm.forward(x + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct DecoderLayer<B: Backend> {
    pub self_attn:       MultiHeadAttention<B>,
    pub self_attn_norm:  LayerNorm<B>,
    pub cross_attn:      MultiHeadAttention<B>,
    pub cross_attn_norm: LayerNorm<B>,
    pub fc1:             Linear<B>,
    pub fc2:             Linear<B>,
    pub final_norm:      LayerNorm<B>,
    pub dropout:         Dropout,
}

impl<B: Backend> DecoderLayer<B> {
    pub fn forward(
        &self,
        x:           Tensor<B, 3>,
        memory:      Tensor<B, 3>,
        memory_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len, _] = x.dims();
        let causal = generate_autoregressive_mask::<B>(batch_size, seq_len, &x.device());

        let attn = self.self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_attn(causal))
            .context;
        let x = self.self_attn_norm.forward(x + self.dropout.forward(attn));

        let cross = self.cross_attn
            .forward(MhaInput::new(x.clone(), memory.clone(), memory).mask_pad(memory_mask))
            .context;
        let x = self.cross_attn_norm.forward(x + self.dropout.forward(cross));

        let ffn = self.fc2.forward(gelu(self.fc1.forward(x.clone())));
        self.final_norm.forward(x + self.dropout.forward(ffn))
    }
}

// ─── Stacks ───────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct EncoderStack<B: Backend> {
    pub embed_positions:     Embedding<B>,
    pub layernorm_embedding: LayerNorm<B>,
    pub layers:              Vec<EncoderLayer<B>>,
    pub layer_norm:          LayerNorm<B>,
    pub dropout:             Dropout,
}

impl<B: Backend> EncoderStack<B> {
    /// `tok_emb`: [batch, seq, d_model] output of the shared embedding
    pub fn forward(&self, tok_emb: Tensor<B, 3>, pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let pos_emb = position_embedding(&self.embed_positions, &tok_emb);
        let mut x = self.dropout.forward(self.layernorm_embedding.forward(tok_emb + pos_emb));
        for layer in &self.layers {
            x = layer.forward(x, pad_mask.clone());
        }
        self.layer_norm.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct DecoderStack<B: Backend> {
    pub embed_positions:     Embedding<B>,
    pub layernorm_embedding: LayerNorm<B>,
    pub layers:              Vec<DecoderLayer<B>>,
    pub layer_norm:          LayerNorm<B>,
    pub dropout:             Dropout,
}

impl<B: Backend> DecoderStack<B> {
    pub fn forward(
        &self,
        tok_emb:     Tensor<B, 3>,
        memory:      Tensor<B, 3>,
        memory_mask: Tensor<B, 2, Bool>,
    ) -> Tensor<B, 3> {
        let pos_emb = position_embedding(&self.embed_positions, &tok_emb);
        let mut x = self.dropout.forward(self.layernorm_embedding.forward(tok_emb + pos_emb));
        for layer in &self.layers {
            x = layer.forward(x, memory.clone(), memory_mask.clone());
        }
        self.layer_norm.forward(x)
    }
}

/// Self-attention is permutation-invariant, so position must be injected explicitly.
fn position_embedding<B: Backend>(table: &Embedding<B>, tok_emb: &Tensor<B, 3>) -> Tensor<B, 3> {
    let [batch_size, seq_len, _] = tok_emb.dims();
    let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
        .unsqueeze::<2>()
        .repeat_dim(0, batch_size);
    table.forward(positions)
}

// ─── Model ────────────────────────────────────────────────────────────────────

#[derive(Module, Debug)]
pub struct Seq2SeqModel<B: Backend> {
    pub shared:                 Embedding<B>,
    pub encoder:                EncoderStack<B>,
    pub decoder:                DecoderStack<B>,
    pub decoder_start_token_id: usize,
}

pub struct Seq2SeqOutput<B: Backend> {
    /// [batch, seq_len, vocab_size]
    pub logits: Tensor<B, 3>,
    /// Token-level cross-entropy, present when labels were given
    pub loss:   Option<Tensor<B, 1>>,
}

impl<B: Backend> Seq2SeqModel<B> {
    pub fn layout(&self) -> LayerLayout {
        LayerLayout::new(self.encoder.layers.len(), self.decoder.layers.len())
    }

    /// input_ids, attention_mask, labels: [batch, seq_len]
    pub fn forward(
        &self,
        input_ids:      Tensor<B, 2, Int>,
        attention_mask: Tensor<B, 2, Int>,
        labels:         Option<Tensor<B, 2, Int>>,
    ) -> Seq2SeqOutput<B> {
        let pad_mask = attention_mask.equal_elem(0);

        let memory = self.encoder.forward(self.shared.forward(input_ids.clone()), pad_mask.clone());

        let decoder_input_ids = self.shift_right(labels.clone().unwrap_or(input_ids));
        let hidden = self.decoder.forward(
            self.shared.forward(decoder_input_ids),
            memory,
            pad_mask,
        );

        let logits = self.project(hidden);
        let loss   = labels.map(|labels| token_cross_entropy(logits.clone(), labels));
        Seq2SeqOutput { logits, loss }
    }

    /// Prepend the decoder start token and drop the last position.
    fn shift_right(&self, ids: Tensor<B, 2, Int>) -> Tensor<B, 2, Int> {
        let [batch_size, seq_len] = ids.dims();
        let start = Tensor::<B, 2, Int>::full(
            [batch_size, 1],
            self.decoder_start_token_id as i64,
            &ids.device(),
        );
        if seq_len <= 1 {
            return start;
        }
        Tensor::cat(vec![start, ids.slice([0..batch_size, 0..seq_len - 1])], 1)
    }

    /// Output projection tied to the shared embedding.
    fn project(&self, hidden: Tensor<B, 3>) -> Tensor<B, 3> {
        let [batch_size, seq_len, d_model] = hidden.dims();
        let weight = self.shared.weight.val();
        let [vocab_size, _] = weight.dims();

        hidden
            .reshape([batch_size * seq_len, d_model])
            .matmul(weight.transpose())
            .reshape([batch_size, seq_len, vocab_size])
    }
}

/// Cross-entropy over the flattened batch × sequence dimension.
/// Padding positions count like any other label.
pub fn token_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    labels: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [batch_size, seq_len, vocab_size] = logits.dims();
    let ce = CrossEntropyLossConfig::new().init(&logits.device());
    ce.forward(
        logits.reshape([batch_size * seq_len, vocab_size]),
        labels.reshape([batch_size * seq_len]),
    )
}

/// Most likely token at every position, one Vec per example.
pub fn greedy_ids<B: Backend>(logits: Tensor<B, 3>) -> Vec<Vec<u32>> {
    let [batch_size, seq_len, _] = logits.dims();
    let ids: Vec<u32> = logits
        .argmax(2)
        .reshape([batch_size, seq_len])
        .into_data()
        .iter::<i64>()
        .map(|id| id as u32)
        .collect();

    ids.chunks(seq_len.max(1)).map(|row| row.to_vec()).collect()
}
