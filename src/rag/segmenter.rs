//! Hybrid text segmentation.
//!
//! Splits raw text into retrieval-sized chunks using a combination of
//! paragraph, token-count and sentence-boundary logic:
//! - paragraphs inside the token bounds pass through verbatim,
//! - oversized paragraphs are split at sentence boundaries and re-packed,
//! - undersized paragraphs accumulate across paragraphs until they reach
//!   the minimum.
//!
//! Tokenization is word-boundary based and language-agnostic. The sentence
//! splitter is a regex heuristic; it is not abbreviation-aware.

use regex::Regex;

/// Segments text into chunks bounded by a token range.
///
/// Segmentation is pure and deterministic: the same input always produces
/// the same chunk sequence.
pub struct Segmenter {
    min_tokens: usize,
    max_tokens: usize,
    newline_re: Regex,
    token_re: Regex,
    sentence_re: Regex,
}

impl Segmenter {
    pub fn new(min_tokens: usize, max_tokens: usize) -> Self {
        Self {
            min_tokens,
            max_tokens,
            newline_re: Regex::new(r"\n+").expect("static regex"),
            token_re: Regex::new(r"\b\w+\b").expect("static regex"),
            sentence_re: Regex::new(r"[.!?]\s+").expect("static regex"),
        }
    }

    /// Split `text` into an ordered sequence of chunks.
    pub fn segment(&self, text: &str) -> Vec<String> {
        let normalized = self.newline_re.replace_all(text, "\n");
        let paragraphs: Vec<&str> = normalized
            .split('\n')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();

        let mut chunks = Vec::new();
        let mut pending = String::new();

        for paragraph in paragraphs {
            let tokens = self.count_tokens(paragraph);

            if tokens >= self.min_tokens && tokens <= self.max_tokens {
                chunks.push(paragraph.to_string());
            } else if tokens > self.max_tokens {
                self.split_oversized(paragraph, &mut chunks);
            } else {
                if !pending.is_empty() {
                    pending.push(' ');
                }
                pending.push_str(paragraph);
                if self.count_tokens(&pending) >= self.min_tokens {
                    chunks.push(pending.trim().to_string());
                    pending.clear();
                }
            }
        }

        // Whatever accumulated but never reached the minimum is still a chunk.
        if !pending.is_empty() {
            chunks.push(pending.trim().to_string());
        }

        chunks
    }

    /// Greedily pack sentences of an oversized paragraph into chunks,
    /// flushing the buffer whenever the next sentence would push it past
    /// `max_tokens`.
    fn split_oversized(&self, paragraph: &str, chunks: &mut Vec<String>) {
        let mut buffer = String::new();

        for sentence in self.split_into_sentences(paragraph) {
            let candidate = if buffer.is_empty() {
                sentence.clone()
            } else {
                format!("{} {}", buffer, sentence)
            };

            if self.count_tokens(&candidate) <= self.max_tokens {
                buffer = candidate;
            } else {
                if !buffer.is_empty() {
                    chunks.push(buffer.trim().to_string());
                }
                buffer = sentence;
            }
        }

        if !buffer.is_empty() {
            chunks.push(buffer.trim().to_string());
        }
    }

    fn split_into_sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut start = 0;

        for boundary in self.sentence_re.find_iter(text) {
            // The terminator class is single-byte, so +1 lands after it.
            let end = boundary.start() + 1;
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            start = boundary.end();
        }

        let rest = text[start..].trim();
        if !rest.is_empty() {
            sentences.push(rest.to_string());
        }

        sentences
    }

    /// Word-boundary token count used for all bounds checks.
    pub fn count_tokens(&self, text: &str) -> usize {
        self.token_re.find_iter(text).count()
    }
}
