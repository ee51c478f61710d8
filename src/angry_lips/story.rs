//! Story assembly from a template and its turns

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::OnceLock;

use super::model::Turn;

pub const WARMING_UP: &str =
    "This Angry Lips story is still warming up. Fill in more blanks to finish it.";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[\[[^\]]+\]\]").expect("placeholder pattern is valid"))
}

fn slot_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"::([^\]]+)\]\]").expect("slot pattern is valid"))
}

fn fallback(placeholder: &str, turn: Option<&Turn>) -> String {
    let slot = slot_pattern()
        .captures(placeholder)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| turn.and_then(|t| t.part_of_speech.clone()))
        .unwrap_or_else(|| "blank".to_string());
    slot.replace('_', " ")
}

/// Replace each placeholder with its turn's fill
///
/// Turns are matched by placeholder; unfilled blanks fall back to their slot
/// name. Without template text the fills are joined in turn order.
pub fn build_story(template_text: &str, turns: &[Turn]) -> String {
    let story = if template_text.trim().is_empty() {
        let mut ordered: Vec<&Turn> = turns.iter().collect();
        ordered.sort_by_key(|t| t.order_index);
        ordered
            .iter()
            .filter_map(|t| t.fill())
            .collect::<Vec<_>>()
            .join(" ")
    } else {
        let by_placeholder: HashMap<&str, &Turn> = turns
            .iter()
            .filter_map(|t| t.placeholder.as_deref().map(|p| (p, t)))
            .collect();

        placeholder_pattern()
            .replace_all(template_text, |caps: &Captures<'_>| {
                let placeholder = &caps[0];
                let turn = by_placeholder.get(placeholder).copied();
                match turn.and_then(Turn::fill) {
                    Some(text) => text.trim().to_string(),
                    None => fallback(placeholder, turn),
                }
            })
            .into_owned()
    };

    let story = story.trim();
    if story.is_empty() {
        WARMING_UP.to_string()
    } else {
        story.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angry_lips::model::TurnStatus;
    use chrono::Utc;

    fn turn(index: i64, placeholder: Option<&str>, slot: &str, fill: Option<&str>) -> Turn {
        Turn {
            id: format!("t{}", index),
            session_id: "s".into(),
            order_index: index,
            status: if fill.is_some() { TurnStatus::Submitted } else { TurnStatus::Pending },
            prompt: slot.into(),
            part_of_speech: Some(slot.into()),
            creative_nudge: None,
            placeholder: placeholder.map(String::from),
            assigned_user_id: None,
            assigned_handle: None,
            due_at: None,
            expires_at: None,
            submitted_text: fill.map(String::from),
            submission_handle: None,
            submitted_at: None,
            auto_fill_text: None,
            auto_filled: false,
            completed_by: None,
            notified_channels: Vec::new(),
            created_at: Utc::now(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_fills_and_fallbacks() {
        let template = "[[PLACE_1::place]] hosts [[PERSON_NAME_2::person_name]] at [[PLACE_1::place]].";
        let turns = vec![
            turn(0, Some("[[PLACE_1::place]]"), "place", Some(" the moon ")),
            turn(1, Some("[[PERSON_NAME_2::person_name]]"), "person_name", None),
        ];
        assert_eq!(build_story(template, &turns), "the moon hosts person name at the moon.");
    }

    #[test]
    fn test_auto_fill_used_when_not_submitted() {
        let mut t = turn(0, Some("[[VERB_1::verb]]"), "verb", None);
        t.auto_fill_text = Some("zoom".into());
        assert_eq!(build_story("We [[VERB_1::verb]]!", &[t]), "We zoom!");
    }

    #[test]
    fn test_without_template_joins_fills() {
        let turns = vec![
            turn(1, None, "noun", Some("world")),
            turn(0, None, "verb", Some("hello")),
            turn(2, None, "adverb", None),
        ];
        assert_eq!(build_story("", &turns), "hello world");
        assert_eq!(build_story("  ", &[]), WARMING_UP);
    }
}
