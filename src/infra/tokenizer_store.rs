// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Loads a Hugging Face tokenizer.json, or builds a word-level
// tokenizer from the training corpus when none is supplied.
//
// The built tokenizer is written as tokenizer JSON and parsed
// back, so a built and a loaded tokenizer behave identically.
//
// Special tokens always take the lowest ids:
//   [PAD]=0  [UNK]=1  [CLS]=2  [SEP]=3  [MASK]=4

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::Tokenizer;

pub const PAD_TOKEN: &str = "[PAD]";
pub const UNK_TOKEN: &str = "[UNK]";
pub const CLS_TOKEN: &str = "[CLS]";
pub const SEP_TOKEN: &str = "[SEP]";
pub const MASK_TOKEN: &str = "[MASK]";

const SPECIAL_TOKENS: [&str; 5] = [PAD_TOKEN, UNK_TOKEN, CLS_TOKEN, SEP_TOKEN, MASK_TOKEN];

pub struct TokenizerStore {
    dir: PathBuf,
}

impl TokenizerStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join("tokenizer.json")
    }

    /// Load the stored tokenizer, or build one from `texts` and store it.
    pub fn load_or_build<'a>(
        &self,
        texts:      impl IntoIterator<Item = &'a str>,
        vocab_size: usize,
    ) -> Result<Tokenizer> {
        if self.path().exists() {
            tracing::info!("Loading existing tokenizer from '{}'", self.path().display());
            self.load()
        } else {
            tracing::info!("Building new tokenizer (vocab_size={})", vocab_size);
            let tokenizer = build_word_level(texts, vocab_size)?;
            self.save(&tokenizer)?;
            Ok(tokenizer)
        }
    }

    pub fn load(&self) -> Result<Tokenizer> {
        load_file(self.path())
    }

    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.path();
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {e}", path.display()))?;
        tracing::debug!("Saved tokenizer to '{}'", path.display());
        Ok(())
    }
}

/// Load any tokenizer.json file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Tokenizer> {
    let path = path.as_ref();
    Tokenizer::from_file(path)
        .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {e}", path.display()))
}

/// Build a lowercase word-level tokenizer holding at most `vocab_size`
/// entries, special tokens included.
pub fn build_word_level<'a>(
    texts:      impl IntoIterator<Item = &'a str>,
    vocab_size: usize,
) -> Result<Tokenizer> {
    anyhow::ensure!(
        vocab_size > SPECIAL_TOKENS.len(),
        "vocab_size must be larger than the {} special tokens",
        SPECIAL_TOKENS.len()
    );

    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in words(text) {
            *freq.entry(word).or_insert(0) += 1;
        }
    }

    // Most frequent first; alphabetical among equals so the ids are stable.
    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size - SPECIAL_TOKENS.len());

    let mut vocab = serde_json::Map::new();
    for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
        vocab.insert(token.to_string(), serde_json::json!(id));
    }
    for (word, _) in &words {
        let id = vocab.len();
        vocab.insert(word.clone(), serde_json::json!(id));
    }

    let added_tokens: Vec<serde_json::Value> = SPECIAL_TOKENS
        .iter()
        .enumerate()
        .map(|(id, token)| {
            serde_json::json!({
                "id": id, "content": token, "single_word": false, "lstrip": false,
                "rstrip": false, "normalized": false, "special": true
            })
        })
        .collect();

    let tokenizer_json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": false,
            "lowercase": true
        },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": UNK_TOKEN
        }
    });

    let tokenizer: Tokenizer = tokenizer_json
        .to_string()
        .parse()
        .map_err(|e| anyhow::anyhow!("Cannot build tokenizer: {e}"))?;

    tracing::info!("Tokenizer built with {} entries", tokenizer.get_vocab_size(true));
    Ok(tokenizer)
}

/// Lowercased word pieces as the Whitespace pre-tokenizer splits them.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_tokens_take_lowest_ids() {
        let tok = build_word_level(["hello world"], 100).unwrap();
        assert_eq!(tok.token_to_id(PAD_TOKEN), Some(0));
        assert_eq!(tok.token_to_id(UNK_TOKEN), Some(1));
        assert_eq!(tok.token_to_id(CLS_TOKEN), Some(2));
        assert_eq!(tok.token_to_id(SEP_TOKEN), Some(3));
        assert_eq!(tok.token_to_id(MASK_TOKEN), Some(4));
    }

    #[test]
    fn test_vocab_is_capped_and_frequency_ordered() {
        let tok = build_word_level(["b a a c c c", "d"], 7).unwrap();
        assert_eq!(tok.get_vocab_size(true), 7);
        assert_eq!(tok.token_to_id("c"), Some(5));
        assert_eq!(tok.token_to_id("a"), Some(6));
        assert_eq!(tok.token_to_id("b"), None);
    }

    #[test]
    fn test_unknown_words_map_to_unk() {
        let tok = build_word_level(["Paris is a city"], 50).unwrap();
        let enc = tok.encode("paris is somewhere", false).unwrap();
        let ids = enc.get_ids();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids[0], tok.token_to_id("paris").unwrap());
        assert_eq!(ids[2], 1);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenizerStore::new(dir.path());
        let built = store.load_or_build(["one two two"], 20).unwrap();
        assert!(store.path().exists());

        let loaded = store.load_or_build(["something else entirely"], 20).unwrap();
        assert_eq!(loaded.token_to_id("two"), built.token_to_id("two"));
        assert_eq!(loaded.token_to_id("else"), None);
    }

    #[test]
    fn test_rejects_tiny_vocab() {
        assert!(build_word_level(["x"], 5).is_err());
    }
}
