//! Shingle fingerprints for near-duplicate detection
//!
//! Page text is scanned into tokens, consecutive tokens are joined into
//! fixed-size shingles, and each shingle is hashed with xxh3. Only hashes
//! divisible by the sampling divisor are kept, so a fingerprint is a sampled
//! set of shingle hashes that can be compared with the Jaccard index.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};

use super::tokenizer::tokens;
use crate::config::DedupConfig;

/// Sampled set of shingle hashes for one page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(HashSet<u64>);

impl Fingerprint {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.0.contains(&hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &u64> {
        self.0.iter()
    }

    /// Jaccard index `|A ∩ B| / |A ∪ B|`.
    ///
    /// An empty union yields 0.0, so two empty fingerprints never match.
    pub fn similarity(&self, other: &Fingerprint) -> f64 {
        let (small, large) = if self.len() <= other.len() {
            (&self.0, &other.0)
        } else {
            (&other.0, &self.0)
        };
        let shared = small.iter().filter(|h| large.contains(h)).count();
        let union = self.len() + other.len() - shared;
        if union == 0 {
            return 0.0;
        }
        shared as f64 / union as f64
    }
}

impl FromIterator<u64> for Fingerprint {
    fn from_iter<I: IntoIterator<Item = u64>>(iter: I) -> Self {
        Fingerprint(iter.into_iter().collect())
    }
}

/// Hash a shingle with a fixed, process-independent hash
pub fn hash_shingle(shingle: &str) -> u64 {
    xxhash_rust::xxh3::xxh3_64(shingle.as_bytes())
}

/// Computes fingerprints from page text
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    shingle_size: usize,
    sample_divisor: u64,
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

impl Fingerprinter {
    /// Create a fingerprinter; zero values are clamped to 1
    pub fn new(shingle_size: usize, sample_divisor: u64) -> Self {
        Self {
            shingle_size: shingle_size.max(1),
            sample_divisor: sample_divisor.max(1),
        }
    }

    pub fn from_config(config: &DedupConfig) -> Self {
        Self::new(config.shingle_size, config.sample_divisor)
    }

    /// Build every full-window shingle of `text`, in order
    pub fn shingles(&self, text: &str) -> Vec<String> {
        let mut window: VecDeque<String> = VecDeque::with_capacity(self.shingle_size);
        let mut shingles = Vec::new();

        for token in tokens(text) {
            if window.len() == self.shingle_size {
                window.pop_front();
            }
            window.push_back(token);
            if window.len() == self.shingle_size {
                shingles.push(window.iter().map(String::as_str).collect::<Vec<_>>().join(" "));
            }
        }

        shingles
    }

    /// Compute the sampled fingerprint of `text`
    pub fn fingerprint(&self, text: &str) -> Fingerprint {
        self.shingles(text)
            .iter()
            .map(|s| hash_shingle(s))
            .filter(|h| h % self.sample_divisor == 0)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shingles_sliding_window() {
        let fp = Fingerprinter::default();
        let shingles = fp.shingles("One two, three four five");
        assert_eq!(shingles, vec!["one two three", "two three four", "three four five"]);
    }

    #[test]
    fn test_short_text_has_no_shingles() {
        let fp = Fingerprinter::default();
        assert!(fp.shingles("only two").is_empty());
        assert!(fp.fingerprint("only two").is_empty());
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let fp = Fingerprinter::default();
        let text = "The quick brown fox jumps over the lazy dog";
        assert_eq!(fp.fingerprint(text), fp.fingerprint(text));
        assert_eq!(hash_shingle("the quick brown"), hash_shingle("the quick brown"));
    }

    #[test]
    fn test_repeated_shingles_collapse() {
        let fp = Fingerprinter::default();
        let print = fp.fingerprint("a b c a b c a b c");
        // distinct shingles: "a b c", "b c a", "c a b"
        assert_eq!(print.len(), 3);
    }

    #[test]
    fn test_sampling_keeps_only_divisible_hashes() {
        let text = "lorem ipsum dolor sit amet consectetur adipiscing elit sed do eiusmod tempor";
        let full = Fingerprinter::new(3, 1).fingerprint(text);
        let sampled = Fingerprinter::new(3, 4).fingerprint(text);

        assert!(sampled.len() <= full.len());
        assert!(sampled.iter().all(|h| h % 4 == 0));
        assert!(sampled.iter().all(|h| full.contains(*h)));
    }

    #[test]
    fn test_similarity_bounds() {
        let fp = Fingerprinter::default();
        let a = fp.fingerprint("the quick brown fox jumps over the lazy dog");
        let b = fp.fingerprint("the quick brown fox leaps over the lazy dog");
        let c = fp.fingerprint("lorem ipsum dolor sit amet consectetur adipiscing");

        assert_eq!(a.similarity(&a), 1.0);
        let ab = a.similarity(&b);
        assert!(ab > 0.0 && ab < 1.0, "got {}", ab);
        assert_eq!(a.similarity(&b), b.similarity(&a));
        assert_eq!(a.similarity(&c), 0.0);
    }

    #[test]
    fn test_empty_union_is_not_similar() {
        let empty = Fingerprint::default();
        assert_eq!(empty.similarity(&empty), 0.0);

        let fp = Fingerprinter::default();
        let a = fp.fingerprint("one two three four");
        assert_eq!(a.similarity(&empty), 0.0);
    }

    #[test]
    fn test_identical_text_similarity_one() {
        let fp = Fingerprinter::default();
        let text = "Welcome to the department of informatics home page";
        let a = fp.fingerprint(text);
        let b = fp.fingerprint(text);
        assert_eq!(a.similarity(&b), 1.0);
    }
}
