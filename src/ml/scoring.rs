// ============================================================
// Layer 5 — ROUGE Scoring
// ============================================================
// Compares a generated summary with the reference summary.
//
//   ROUGE-1  unigram overlap
//   ROUGE-2  bigram overlap
//   ROUGE-L     longest common subsequence of tokens
//   ROUGE-Lsum  summary-level LCS: texts are split into sentences
//               on newlines, and each reference sentence is matched
//               against the union of its LCS with every hypothesis
//               sentence
//
// N-gram overlap is clipped: an n-gram counts at most as many
// times as it occurs in the reference. Each metric is reported
// as precision (over the hypothesis), recall (over the
// reference) and their harmonic mean.
//
// Tokens are lowercase alphanumeric runs, so punctuation and
// case never affect the score.
//
// Reference: Lin (2004) ROUGE: A Package for Automatic
//            Evaluation of Summaries

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub precision: f64,
    pub recall:    f64,
    pub fmeasure:  f64,
}

impl Score {
    fn from_overlap(overlap: usize, hyp_total: usize, ref_total: usize) -> Self {
        if overlap == 0 || hyp_total == 0 || ref_total == 0 {
            return Score::default();
        }
        let precision = overlap as f64 / hyp_total as f64;
        let recall    = overlap as f64 / ref_total as f64;
        let fmeasure  = 2.0 * precision * recall / (precision + recall);
        Score { precision, recall, fmeasure }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RougeScores {
    pub rouge1: Score,
    pub rouge2: Score,
    pub rouge_l: Score,
    pub rouge_lsum: Score,
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn ngram_counts(tokens: &[String], n: usize) -> HashMap<&[String], usize> {
    let mut counts = HashMap::new();
    if tokens.len() >= n {
        for gram in tokens.windows(n) {
            *counts.entry(gram).or_insert(0) += 1;
        }
    }
    counts
}

fn rouge_n(reference: &[String], hypothesis: &[String], n: usize) -> Score {
    let ref_counts = ngram_counts(reference, n);
    let hyp_counts = ngram_counts(hypothesis, n);

    let overlap = hyp_counts
        .iter()
        .map(|(gram, &count)| count.min(ref_counts.get(gram).copied().unwrap_or(0)))
        .sum();

    Score::from_overlap(
        overlap,
        hyp_counts.values().sum(),
        ref_counts.values().sum(),
    )
}

/// Positions in `a` of one longest common subsequence with `b`.
fn lcs_positions(a: &[String], b: &[String]) -> Vec<usize> {
    let mut table = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, x) in a.iter().enumerate() {
        for (j, y) in b.iter().enumerate() {
            table[i + 1][j + 1] = if x == y {
                table[i][j] + 1
            } else {
                table[i][j + 1].max(table[i + 1][j])
            };
        }
    }

    let (mut i, mut j) = (a.len(), b.len());
    let mut positions = Vec::new();
    while i > 0 && j > 0 {
        if a[i - 1] == b[j - 1] {
            positions.push(i - 1);
            i -= 1;
            j -= 1;
        } else if table[i - 1][j] >= table[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }
    positions.reverse();
    positions
}

fn rouge_lsum(reference: &str, hypothesis: &str) -> Score {
    let sentences = |text: &str| -> Vec<Vec<String>> {
        text.lines().map(tokenize).filter(|s| !s.is_empty()).collect()
    };
    let ref_sents = sentences(reference);
    let hyp_sents = sentences(hypothesis);

    let count_tokens = |sents: &[Vec<String>]| {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for token in sents.iter().flatten() {
            *counts.entry(token.clone()).or_insert(0) += 1;
        }
        counts
    };
    let mut ref_left = count_tokens(&ref_sents[..]);
    let mut hyp_left = count_tokens(&hyp_sents[..]);

    // A token counts at most as often as it occurs on either side.
    let mut hits = 0usize;
    for sent in &ref_sents {
        let mut union: Vec<usize> = hyp_sents
            .iter()
            .flat_map(|hyp| lcs_positions(sent, hyp))
            .collect();
        union.sort_unstable();
        union.dedup();

        for token in union.iter().map(|&i| &sent[i]) {
            let (Some(r), Some(h)) = (ref_left.get_mut(token), hyp_left.get_mut(token)) else {
                continue;
            };
            if *r > 0 && *h > 0 {
                *r -= 1;
                *h -= 1;
                hits += 1;
            }
        }
    }

    Score::from_overlap(
        hits,
        hyp_sents.iter().map(Vec::len).sum(),
        ref_sents.iter().map(Vec::len).sum(),
    )
}

/// Two-row dynamic programme over token sequences.
fn lcs_length(a: &[String], b: &[String]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            curr[j + 1] = if x == y {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

pub fn rouge(reference: &str, hypothesis: &str) -> RougeScores {
    let ref_tokens = tokenize(reference);
    let hyp_tokens = tokenize(hypothesis);

    RougeScores {
        rouge1:  rouge_n(&ref_tokens, &hyp_tokens, 1),
        rouge2:  rouge_n(&ref_tokens, &hyp_tokens, 2),
        rouge_l: Score::from_overlap(
            lcs_length(&ref_tokens, &hyp_tokens),
            hyp_tokens.len(),
            ref_tokens.len(),
        ),
        rouge_lsum: rouge_lsum(reference, hypothesis),
    }
}

// ─── Epoch-level reporting ────────────────────────────────────────────────────

/// How the per-pair scores of one evaluation epoch are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MetricMode {
    /// Score of the last pair seen
    #[default]
    LastPair,
    /// Mean over every pair
    Aggregate,
}

impl FromStr for MetricMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "last-pair" => Ok(MetricMode::LastPair),
            "aggregate" => Ok(MetricMode::Aggregate),
            other => Err(format!("unknown metric mode '{other}': choose 'last-pair' or 'aggregate'")),
        }
    }
}

impl fmt::Display for MetricMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricMode::LastPair  => write!(f, "last-pair"),
            MetricMode::Aggregate => write!(f, "aggregate"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RougeAccumulator {
    mode:  MetricMode,
    sum:   RougeScores,
    last:  RougeScores,
    count: usize,
}

impl RougeAccumulator {
    pub fn new(mode: MetricMode) -> Self {
        Self {
            mode,
            sum:   RougeScores::default(),
            last:  RougeScores::default(),
            count: 0,
        }
    }

    pub fn add(&mut self, scores: RougeScores) {
        for (acc, s) in [
            (&mut self.sum.rouge1, scores.rouge1),
            (&mut self.sum.rouge2, scores.rouge2),
            (&mut self.sum.rouge_l, scores.rouge_l),
            (&mut self.sum.rouge_lsum, scores.rouge_lsum),
        ] {
            acc.precision += s.precision;
            acc.recall    += s.recall;
            acc.fmeasure  += s.fmeasure;
        }
        self.last   = scores;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` when no pair was scored.
    pub fn finish(&self) -> Option<RougeScores> {
        if self.count == 0 {
            return None;
        }
        match self.mode {
            MetricMode::LastPair  => Some(self.last),
            MetricMode::Aggregate => {
                let n = self.count as f64;
                let mean = |s: Score| Score {
                    precision: s.precision / n,
                    recall:    s.recall / n,
                    fmeasure:  s.fmeasure / n,
                };
                Some(RougeScores {
                    rouge1:  mean(self.sum.rouge1),
                    rouge2:  mean(self.sum.rouge2),
                    rouge_l: mean(self.sum.rouge_l),
                    rouge_lsum: mean(self.sum.rouge_lsum),
                })
            }
        }
    }
}
