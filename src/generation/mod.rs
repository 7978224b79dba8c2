//! Text generation seam
//!
//! Response synthesis, tree building, and generative selection all talk
//! to a [`Generator`]. The in-crate default is extractive and fully
//! deterministic, so every pipeline runs without model weights; LLM
//! backends implement the same trait.

use anyhow::Result;
use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Decoding parameters passed to a generator.
///
/// The extractive default only honors `max_chars`; model-backed
/// generators use the rest.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_chars: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_chars: 1024,
            temperature: 0.1,
            top_p: 0.9,
        }
    }
}

/// Trait for text generators.
pub trait Generator: Send + Sync {
    /// Produce a completion for the prompt.
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String>;

    /// Model name for logs and metadata.
    fn model_name(&self) -> &str;
}

/// Deterministic extractive generator.
///
/// Understands the prompt shapes this crate produces: when the prompt
/// carries `Context:` and `Question:` sections, it returns the context
/// sentences that overlap the question most; otherwise it returns the
/// leading sentences of the prompt body. Crude, but stable, fast, and
/// honest about being model-free.
pub struct ExtractiveGenerator {
    max_sentences: usize,
}

impl ExtractiveGenerator {
    pub fn new(max_sentences: usize) -> Self {
        Self { max_sentences }
    }

    fn tokens(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
            .map(|t| t.to_lowercase())
            .collect()
    }

    /// Split the prompt into (body, question) using the section markers
    /// the synthesis templates emit.
    fn split_prompt(prompt: &str) -> (&str, Option<&str>) {
        let question = prompt
            .rsplit_once("Question:")
            .map(|(_, q)| q.split_once('\n').map_or(q, |(line, _)| line).trim());

        let body = match prompt.split_once("Context:") {
            Some((_, rest)) => rest
                .rsplit_once("Question:")
                .map_or(rest, |(context, _)| context),
            None => prompt,
        };

        (body, question.filter(|q| !q.is_empty()))
    }
}

impl Default for ExtractiveGenerator {
    fn default() -> Self {
        Self::new(3)
    }
}

impl Generator for ExtractiveGenerator {
    fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<String> {
        let (body, question) = Self::split_prompt(prompt);
        let sentences: Vec<&str> = body
            .unicode_sentences()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if sentences.is_empty() {
            return Ok(String::new());
        }

        let picked: Vec<&str> = match question {
            Some(q) => {
                let q_tokens = Self::tokens(q);
                let mut scored: Vec<(usize, usize)> = sentences
                    .iter()
                    .enumerate()
                    .map(|(i, s)| (i, Self::tokens(s).intersection(&q_tokens).count()))
                    .filter(|(_, hits)| *hits > 0)
                    .collect();
                scored.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
                scored.truncate(self.max_sentences);
                // Restore document order for readability.
                scored.sort_by_key(|(i, _)| *i);
                scored.iter().map(|(i, _)| sentences[*i]).collect()
            }
            None => sentences.iter().take(self.max_sentences).copied().collect(),
        };

        let mut answer = picked.join(" ");
        if answer.is_empty() {
            answer = sentences[0].to_string();
        }
        if answer.len() > params.max_chars {
            answer.truncate(params.max_chars);
        }
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        "extractive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extractive_picks_overlapping_sentences() {
        let generator = ExtractiveGenerator::default();
        let prompt = "Context:\nTides rise at dawn. The borrow checker rejects aliased \
                      mutation. Bread needs patience.\n\nQuestion: What does the borrow checker do?\n\nAnswer:";

        let answer = generator.generate(prompt, &GenerationParams::default()).unwrap();
        assert!(answer.contains("borrow checker"));
        assert!(!answer.contains("Bread"));
    }

    #[test]
    fn test_extractive_without_question_takes_lead() {
        let generator = ExtractiveGenerator::new(2);
        let prompt = "First point. Second point. Third point. Fourth point.";

        let answer = generator.generate(prompt, &GenerationParams::default()).unwrap();
        assert!(answer.contains("First point."));
        assert!(answer.contains("Second point."));
        assert!(!answer.contains("Third"));
    }

    #[test]
    fn test_extractive_deterministic() {
        let generator = ExtractiveGenerator::default();
        let prompt = "Context:\nAlpha beta gamma. Delta epsilon.\n\nQuestion: alpha?\n\nAnswer:";
        let a = generator.generate(prompt, &GenerationParams::default()).unwrap();
        let b = generator.generate(prompt, &GenerationParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_max_chars_respected() {
        let generator = ExtractiveGenerator::default();
        let prompt = "A long sentence repeated over and over to exceed the cap. ".repeat(20);
        let params = GenerationParams {
            max_chars: 40,
            ..Default::default()
        };
        let answer = generator.generate(&prompt, &params).unwrap();
        assert!(answer.len() <= 40);
    }
}
