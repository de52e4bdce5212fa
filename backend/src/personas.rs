//! Persona registry
//!
//! Preset system prompts keyed by preset id, the fallback prompt, and the
//! expert rows seeded into an empty experts table.

use crate::chat::models::{Expert, NewExpert};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// System prompt used when neither the expert nor a preset supplies one
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a premium luggage brand assistant. Be concise, confident, and proactive with tasteful product suggestions.";

struct Seed {
    slug: &'static str,
    name: &'static str,
    agent_name: &'static str,
    description: &'static str,
    system_prompt: &'static str,
    suggestion_question: &'static str,
}

const SEEDS: [Seed; 4] = [
    Seed {
        slug: "travel-concierge",
        name: "Travel Concierge",
        agent_name: "Kate",
        description: "Curated travel planning and premium trip advice.",
        system_prompt: "You are a travel concierge. Deliver premium trip guidance, thoughtful itineraries, and upscale service tone.",
        suggestion_question: "Can you help me plan a trip \u{2014} what suitcase sizes should I choose for my destination and trip length?",
    },
    Seed {
        slug: "product-specialist",
        name: "Product Specialist",
        agent_name: "Noah",
        description: "Deep product knowledge and feature comparisons.",
        system_prompt: "You are a product specialist. Be precise, technical when needed, and compare options clearly.",
        suggestion_question: "Can you compare durable vs lightweight luggage \u{2014} what are the tradeoffs and your recommendation?",
    },
    Seed {
        slug: "brand-voice",
        name: "Brand Voice",
        agent_name: "Iris",
        description: "Refined tone, storytelling, and brand consistency.",
        system_prompt: "You are the brand voice. Keep responses refined, poetic but practical, and aligned with luxury positioning.",
        suggestion_question: "Can you rewrite my message in a refined premium tone? Here\u{2019}s my draft: ",
    },
    Seed {
        slug: "support-agent",
        name: "Support Agent",
        agent_name: "Alex",
        description: "Calm troubleshooting and resolution-focused help.",
        system_prompt: "You are a support agent. Be calm, empathetic, and focused on resolution steps.",
        suggestion_question: "Can you troubleshoot this step-by-step? My suitcase (handle/wheels/lock) is not working properly.",
    },
];

/// Preset id -> system prompt
static PRESETS: Lazy<HashMap<&'static str, &'static str>> =
    Lazy::new(|| SEEDS.iter().map(|s| (s.slug, s.system_prompt)).collect());

/// System prompt of a preset, if the key is known
pub fn system_prompt_for(preset_id: &str) -> Option<&'static str> {
    PRESETS.get(preset_id).copied()
}

/// Known preset ids, in seed order
pub fn preset_ids() -> impl Iterator<Item = &'static str> {
    SEEDS.iter().map(|s| s.slug)
}

/// Pick the system prompt for a chat turn
///
/// The expert's own non-empty prompt wins, then the preset table, then
/// [`DEFAULT_SYSTEM_PROMPT`].
pub fn resolve_system_prompt(expert: Option<&Expert>, preset_id: Option<&str>) -> String {
    if let Some(prompt) = expert
        .map(|e| e.system_prompt.trim())
        .filter(|p| !p.is_empty())
    {
        return prompt.to_string();
    }
    preset_id
        .and_then(system_prompt_for)
        .unwrap_or(DEFAULT_SYSTEM_PROMPT)
        .to_string()
}

/// Rows inserted when the experts table is empty
pub fn seed_experts() -> Vec<NewExpert> {
    SEEDS
        .iter()
        .enumerate()
        .map(|(i, s)| NewExpert {
            slug: s.slug.to_string(),
            name: s.name.to_string(),
            agent_name: s.agent_name.to_string(),
            description: Some(s.description.to_string()),
            system_prompt: s.system_prompt.to_string(),
            suggestion_question: Some(s.suggestion_question.to_string()),
            sort_order: i as i64,
        })
        .collect()
}
