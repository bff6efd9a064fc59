//! In-process text generation.
//!
//! A word-level bigram model trained from a text corpus at startup. Like a
//! causal language-model pipeline it continues the prompt: the output is the
//! prompt followed by sampled words, and `max_tokens` bounds the whole
//! sequence (prompt words included). Sampling is seeded from the prompt, so
//! the same prompt always produces the same text.

use super::{ProviderError, TextProvider};
use async_trait::async_trait;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

/// Corpus used when no `LOCAL_MODEL_CORPUS` file is configured.
const DEFAULT_CORPUS: &str = "\
Hello! How can I help you today? I am a small assistant that runs inside this service. \
I can talk about the weather, the news, or anything else you have in mind. \
The weather today is mild and the sky is clear. \
It is a good day to learn something new. \
You can ask me a question and I will do my best to answer it. \
I do not know everything, but I am always happy to help. \
Thank you for the message. Have a nice day and come back soon. \
Tell me more about what you are working on and I will try to help you with it. \
Sometimes the best answer is a simple one. \
I think that is a great question and it deserves a careful answer.";

/// Word-level bigram language model.
#[derive(Debug, Default)]
struct BigramModel {
    vocabulary: Vec<String>,
    index: HashMap<String, usize>,
    /// Followers of each word, repeated once per observed occurrence.
    transitions: HashMap<usize, Vec<usize>>,
    /// Words that open a sentence in the corpus; restart points for dead ends.
    starts: Vec<usize>,
}

impl BigramModel {
    fn train(corpus: &str) -> Self {
        let mut model = BigramModel::default();
        let mut previous: Option<usize> = None;

        for word in corpus.split_whitespace() {
            let id = model.intern(word);

            match previous {
                Some(prev) => model.transitions.entry(prev).or_default().push(id),
                None => model.starts.push(id),
            }

            previous = if ends_sentence(word) {
                None
            } else {
                Some(id)
            };
        }

        if model.starts.is_empty() {
            model.starts = (0..model.vocabulary.len()).collect();
        }

        model
    }

    fn intern(&mut self, word: &str) -> usize {
        if let Some(&id) = self.index.get(word) {
            return id;
        }
        let id = self.vocabulary.len();
        self.vocabulary.push(word.to_string());
        self.index.insert(word.to_string(), id);
        id
    }

    fn lookup(&self, word: &str) -> Option<usize> {
        self.index
            .get(word)
            .or_else(|| self.index.get(&word.to_lowercase()))
            .copied()
    }

    fn next_word(&self, current: Option<usize>, rng: &mut StdRng) -> Option<usize> {
        current
            .and_then(|id| self.transitions.get(&id))
            .and_then(|followers| followers.choose(rng))
            .or_else(|| self.starts.choose(rng))
            .copied()
    }

    fn continue_prompt(&self, prompt: &str, max_tokens: usize) -> Result<String, ProviderError> {
        if self.vocabulary.is_empty() {
            return Err(ProviderError::ModelError(
                "local model has an empty vocabulary".to_string(),
            ));
        }

        let prompt_words: Vec<&str> = prompt.split_whitespace().collect();
        let budget = max_tokens.saturating_sub(prompt_words.len());

        let mut rng = StdRng::seed_from_u64(prompt_seed(prompt));
        let mut current = prompt_words.last().and_then(|w| self.lookup(w));
        let mut continuation = Vec::with_capacity(budget);

        for _ in 0..budget {
            match self.next_word(current, &mut rng) {
                Some(id) => {
                    continuation.push(self.vocabulary[id].as_str());
                    current = if ends_sentence(&self.vocabulary[id]) {
                        None
                    } else {
                        Some(id)
                    };
                }
                None => break,
            }
        }

        let prompt = prompt.trim_end();
        Ok(match (prompt.is_empty(), continuation.is_empty()) {
            (_, true) => prompt.to_string(),
            (true, false) => continuation.join(" "),
            (false, false) => format!("{} {}", prompt, continuation.join(" ")),
        })
    }
}

fn ends_sentence(word: &str) -> bool {
    word.ends_with(&['.', '!', '?'][..])
}

/// 64-bit FNV-1a of the prompt bytes. Fixed algorithm, so seeds (and
/// therefore outputs) are stable across builds.
fn prompt_seed(prompt: &str) -> u64 {
    const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    prompt.bytes().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

/// In-process text provider.
pub struct LocalTextProvider {
    model: Arc<BigramModel>,
    max_tokens: u32,
}

impl LocalTextProvider {
    pub fn from_corpus(corpus: &str, max_tokens: u32) -> Self {
        Self {
            model: Arc::new(BigramModel::train(corpus)),
            max_tokens,
        }
    }

    pub fn with_default_corpus(max_tokens: u32) -> Self {
        Self::from_corpus(DEFAULT_CORPUS, max_tokens)
    }

    /// Number of distinct words the model knows.
    pub fn vocabulary_size(&self) -> usize {
        self.model.vocabulary.len()
    }
}

#[async_trait]
impl TextProvider for LocalTextProvider {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderError> {
        let model = self.model.clone();
        let prompt = prompt.to_string();
        let max_tokens = self.max_tokens as usize;

        tokio::task::spawn_blocking(move || model.continue_prompt(&prompt, max_tokens))
            .await
            .map_err(|e| ProviderError::ModelError(format!("generation task failed: {}", e)))?
    }
}
