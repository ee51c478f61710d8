//! AI co-host
//!
//! Fills blanks on timeout, summarizes finished stories and writes a
//! retelling for the vault. The local narrator needs no network and is
//! always available; the HTTP narrator talks to an OpenAI-compatible
//! `/chat/completions` endpoint and falls back to the local one on failure.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::template::slot_def;
use crate::config::NarratorConfig;

#[async_trait]
pub trait Narrator: Send + Sync {
    /// A single word or short phrase for a blank
    async fn fill_blank(&self, slot: &str, prompt: &str) -> String;

    async fn summarize(&self, story: &str, focus: Option<&str>) -> String;

    async fn compose_story(&self, prompt: &str, story: &str) -> String;
}

/// Pick the narrator described by the config
pub fn build_narrator(config: &NarratorConfig) -> Arc<dyn Narrator> {
    match config.provider.as_str() {
        "openai" | "http" => match HttpNarrator::new(config) {
            Ok(narrator) => Arc::new(narrator),
            Err(e) => {
                tracing::warn!(error = %e, "HTTP narrator unavailable, using local narrator");
                Arc::new(LocalNarrator)
            }
        },
        _ => Arc::new(LocalNarrator),
    }
}

fn word_bank(slot: &str) -> &'static [&'static str] {
    match slot {
        "verb" => &["sprint", "juggle", "tiptoe", "moonwalk", "negotiate"],
        "verb_past" => &["hacked", "tumbled", "serenaded", "vaporized", "bartered"],
        "verb_ing" => &["glitching", "cartwheeling", "humming", "levitating", "scheming"],
        "adjective" => &["luminous", "soggy", "majestic", "wobbly", "suspicious"],
        "adverb" => &["urgently", "sheepishly", "dramatically", "quietly", "boldly"],
        "number" => &["47", "3", "1,024", "12", "99"],
        "exclamation" => &["Blast!", "Yikes!", "Huzzah!", "Whoa!", "Egads!"],
        "animal" => &["manta ray", "llama", "honey badger", "axolotl", "raccoon"],
        "color" => &["crimson", "teal", "chartreuse", "midnight blue", "gold"],
        "body_part" => &["left antenna", "elbow", "eyebrow", "pinky toe", "kneecap"],
        "place" => &["floating market", "abandoned mall", "cloud palace", "bowling alley"],
        "person_name" => &["Nova Vance", "Captain Pickles", "Dr. Ada Quill", "Rex Moon"],
        "occupation" => &["timeline archivist", "lineworker", "pastry chemist", "lighthouse keeper"],
        "emotion" => &["awe", "glee", "dread", "nostalgia", "smugness"],
        "food" => &["starfruit tart", "cold pizza", "pickled eggs", "cotton candy"],
        "liquid" => &["aurora syrup", "lemonade", "motor oil", "swamp tea"],
        "vehicle" => &["hoverbike", "bucket truck", "submarine", "unicycle"],
        "celebrity" => &["Celeste Halo", "the mayor", "a famous magician", "Grandma Gigawatt"],
        "object" => &["quantum compass", "rubber chicken", "hard hat", "snow globe"],
        "sound" => &["static hiss", "kazoo blast", "thunderclap", "squeak"],
        "relative" => &["great-aunt", "second cousin", "stepbrother", "grandpa"],
        "clothing" => &["gravity boots", "sequined vest", "bowler hat", "hi-vis jacket"],
        "silly_word" => &["zizzle", "flumpf", "snorkeldoodle", "wibbly"],
        _ => &["mystery", "something", "whatsit"],
    }
}

fn stable_index(seed: &str, len: usize) -> usize {
    let hash = seed
        .bytes()
        .fold(2_166_136_261u32, |acc, b| (acc ^ u32::from(b)).wrapping_mul(16_777_619));
    hash as usize % len.max(1)
}

fn sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Deterministic narrator backed by word banks
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalNarrator;

#[async_trait]
impl Narrator for LocalNarrator {
    async fn fill_blank(&self, slot: &str, prompt: &str) -> String {
        let bank = word_bank(slot);
        if bank.is_empty() {
            return slot_def(slot)
                .map(|d| d.example.to_string())
                .unwrap_or_else(|| "something".to_string());
        }
        bank[stable_index(&format!("{slot}:{prompt}"), bank.len())].to_string()
    }

    async fn summarize(&self, story: &str, focus: Option<&str>) -> String {
        let picked = sentences(story);
        let mut summary = match picked.as_slice() {
            [] => "Nothing happened yet, but the crew is ready.".to_string(),
            [only] => only.to_string(),
            [first, .., last] => format!("{} ... {}", first, last),
        };
        if let Some(focus) = focus.map(str::trim).filter(|f| !f.is_empty()) {
            summary.push_str(&format!(" The story is really about {}.", focus));
        }
        summary
    }

    async fn compose_story(&self, prompt: &str, story: &str) -> String {
        let prompt = prompt.trim();
        let opening = if prompt.is_empty() {
            "Gather round for a tale the crew wrote one blank at a time.".to_string()
        } else {
            format!("Gather round for a tale of {}.", prompt.trim_end_matches('.'))
        };
        format!(
            "{} {} And that is how the legend was written, word by ridiculous word.",
            opening,
            story.trim()
        )
    }
}

/// Errors from the HTTP narrator backend
#[derive(Error, Debug)]
pub enum NarratorError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Narrator API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Narrator returned no content")]
    Empty,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    content: Option<String>,
}

/// OpenAI-compatible chat completions narrator
pub struct HttpNarrator {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    fallback: LocalNarrator,
}

impl HttpNarrator {
    pub fn new(config: &NarratorConfig) -> Result<Self, NarratorError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            fallback: LocalNarrator,
        })
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String, NarratorError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
            temperature: 0.9,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(NarratorError::Api { status, message });
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .map(|c| c.trim().trim_matches('"').to_string())
            .filter(|c| !c.is_empty())
            .ok_or(NarratorError::Empty)
    }
}

#[async_trait]
impl Narrator for HttpNarrator {
    async fn fill_blank(&self, slot: &str, prompt: &str) -> String {
        let ask = format!(
            "Give one funny {} for a mad-lib blank labelled \"{}\". Reply with the word or short phrase only.",
            slot.replace('_', " "),
            prompt
        );
        match self.chat("You are a playful co-host for a party word game.", &ask).await {
            Ok(word) => word,
            Err(e) => {
                tracing::warn!(error = %e, slot, "Narrator fill failed, using local word bank");
                self.fallback.fill_blank(slot, prompt).await
            }
        }
    }

    async fn summarize(&self, story: &str, focus: Option<&str>) -> String {
        let mut ask = format!("Summarize this party story in two sentences:\n\n{}", story);
        if let Some(focus) = focus.filter(|f| !f.trim().is_empty()) {
            ask.push_str(&format!("\n\nFocus on: {}", focus));
        }
        match self.chat("You summarize silly collaborative stories.", &ask).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "Narrator summary failed, using local summary");
                self.fallback.summarize(story, focus).await
            }
        }
    }

    async fn compose_story(&self, prompt: &str, story: &str) -> String {
        let ask = format!(
            "Retell this mad-lib story as a short, vivid tale. Direction: {}\n\n{}",
            prompt, story
        );
        match self.chat("You are a dramatic storyteller.", &ask).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Narrator story failed, using local retelling");
                self.fallback.compose_story(prompt, story).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_fill_is_deterministic() {
        let narrator = LocalNarrator;
        let first = narrator.fill_blank("animal", "Animal").await;
        let second = narrator.fill_blank("animal", "Animal").await;
        assert_eq!(first, second);
        assert!(word_bank("animal").contains(&first.as_str()));

        let unknown = narrator.fill_blank("gizmo", "Gizmo").await;
        assert!(!unknown.is_empty());
    }

    #[tokio::test]
    async fn test_local_summary() {
        let narrator = LocalNarrator;
        let summary = narrator
            .summarize("We ran. We hid! We won?", Some("teamwork"))
            .await;
        assert_eq!(summary, "We ran. ... We won? The story is really about teamwork.");

        let empty = narrator.summarize("", None).await;
        assert!(empty.contains("Nothing happened yet"));
    }

    #[tokio::test]
    async fn test_local_compose_includes_story() {
        let story = LocalNarrator.compose_story("a heist.", "We stole the moon.").await;
        assert!(story.starts_with("Gather round for a tale of a heist."));
        assert!(story.contains("We stole the moon."));
    }

    #[tokio::test]
    async fn test_http_narrator_falls_back_when_unreachable() {
        let config = NarratorConfig {
            provider: "openai".into(),
            base_url: "http://127.0.0.1:9".into(),
            request_timeout_ms: 200,
            ..Default::default()
        };
        let narrator = HttpNarrator::new(&config).unwrap();
        let word = narrator.fill_blank("color", "Color").await;
        assert!(word_bank("color").contains(&word.as_str()));
    }
}
