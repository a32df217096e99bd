// ============================================================
// Layer 4 — Email Cleaner
// ============================================================
// Cleans raw email bodies before they become training text.
//
// Raw bodies pulled from a mailbox are full of noise:
//   - tracking links and markdown links "[label](https://...)"
//   - non-breaking spaces (U+00A0), soft hyphens (U+00AD)
//     and zero-width non-joiners (U+200C) from HTML mail
//   - carriage returns from Windows clients
//   - "--" signature separators and "**" bold markers
//   - blank lines
//
// Cleaning steps (applied in order):
//   1. Remove plain URLs, then markdown links
//   2. Per line, delete the noise sequences above
//   3. Drop lines left empty
//   4. Join the remaining lines with a single space
//
// The result is one line of text per email, which is what the
// corpus CSV stores in its `body` column.

use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use tokenizers::Tokenizer;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bhttps?://\S+\b").expect("Invalid URL regex"));

static MARKDOWN_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[.*?\]\(https?://.*?\)").expect("Invalid markdown URL regex"));

/// Sequences deleted from every line, in this order.
const LINE_NOISE: [&str; 7] = ["\u{a0}", "\u{200c}", "\r", "--", "  ", "**", "\u{ad}"];

pub struct EmailCleaner;

impl EmailCleaner {
    pub fn new() -> Self {
        Self
    }

    /// Remove plain URLs and markdown links.
    pub fn remove_urls(&self, text: &str) -> String {
        let no_url = URL_PATTERN.replace_all(text, "");
        MARKDOWN_URL_PATTERN.replace_all(&no_url, "").into_owned()
    }

    /// Strip noise characters line by line and drop empty lines.
    pub fn remove_spaces(&self, text: &str) -> Vec<String> {
        text.split('\n')
            .map(|line| {
                LINE_NOISE
                    .iter()
                    .fold(line.to_string(), |acc, noise| acc.replace(noise, ""))
            })
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Apply every cleaning step to one email body.
    pub fn clean(&self, email: &str) -> String {
        let clean = self.remove_urls(email);
        self.remove_spaces(&clean).join(" ")
    }

    /// Number of tokens the model will see for `text`,
    /// special tokens included.
    pub fn count_tokens(&self, tokenizer: &Tokenizer, text: &str) -> Result<usize> {
        let encoding = tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(encoding.get_ids().len())
    }
}

impl Default for EmailCleaner {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_removes_plain_urls() {
        let c = EmailCleaner::new();
        assert_eq!(
            c.remove_urls("see https://example.com/a?b=1 now"),
            "see  now"
        );
    }

    #[test]
    fn test_removes_markdown_links() {
        let c = EmailCleaner::new();
        // The plain-URL pass runs first and eats the URL up to its
        // last word character, leaving "[here]()" behind.
        assert_eq!(c.remove_urls("click [here](http://x.org)."), "click [here]().");
        assert_eq!(c.remove_urls("[a](http://) b"), " b");
    }

    #[test]
    fn test_strips_noise_and_blank_lines() {
        let c = EmailCleaner::new();
        let lines = c.remove_spaces("Bonjour\u{a0}Marc\r\n\n--\n**Merci**\n");
        assert_eq!(lines, vec!["BonjourMarc", "Merci"]);
    }

    #[test]
    fn test_clean_joins_lines() {
        let c = EmailCleaner::new();
        assert_eq!(
            c.clean("Hello\n\nWorld https://x.com/a\nBye"),
            "Hello World  Bye"
        );
    }

    #[test]
    fn test_empty_string() {
        let c = EmailCleaner::new();
        assert_eq!(c.clean(""), "");
    }
}
