//! Prompt assembly for the response path.

use whisperengine_config::CharacterProfile;
use whisperengine_memory::{MemoryEntry, MemoryRole, RetrievedMemory};

/// Everything the scatter-gather phase produced for one response.
#[derive(Debug, Default)]
pub struct ContextBundle {
    pub memories: Vec<RetrievedMemory>,
    pub history: Vec<MemoryEntry>,
    pub knowledge_facts: Vec<String>,
    pub summaries: Vec<String>,
    pub universe_context: Vec<String>,
    pub preferred_nickname: Option<String>,
    /// Why the bot is speaking, when the reply is autonomous.
    pub internal_goal: Option<String>,
}

pub fn truncate_for_prompt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}

/// Assemble the system prompt: character definition first, then each context
/// block that actually has content.
pub fn build_system_prompt(
    character: &CharacterProfile,
    user_name: &str,
    bundle: &ContextBundle,
) -> String {
    let mut prompt = character.system_prompt.clone();

    let display_name = bundle
        .preferred_nickname
        .as_deref()
        .unwrap_or(user_name);
    prompt.push_str(&format!("\n\nYou are talking with {display_name}."));

    if !bundle.knowledge_facts.is_empty() {
        prompt.push_str("\n\nWhat you know about them:\n");
        for fact in &bundle.knowledge_facts {
            prompt.push_str(&format!("- {}\n", truncate_for_prompt(fact, 200)));
        }
    }

    if !bundle.memories.is_empty() {
        prompt.push_str("\nRelevant memories:\n");
        for memory in &bundle.memories {
            prompt.push_str(&format!(
                "- {}\n",
                truncate_for_prompt(&memory.entry.content, 500)
            ));
        }
    }

    if !bundle.summaries.is_empty() {
        prompt.push_str("\nPast conversation summaries:\n");
        for summary in &bundle.summaries {
            prompt.push_str(&format!("- {}\n", truncate_for_prompt(summary, 300)));
        }
    }

    if !bundle.universe_context.is_empty() {
        prompt.push_str("\nThings you've heard from others:\n");
        for line in &bundle.universe_context {
            prompt.push_str(&format!("- {}\n", truncate_for_prompt(line, 200)));
        }
    }

    if let Some(goal) = &bundle.internal_goal {
        prompt.push_str(&format!(
            "\n[INTERNAL GOAL] You decided to reply because: {goal}\n"
        ));
    }

    prompt
}

/// Render recent history as alternating chat lines for the completion call.
pub fn history_as_lines(history: &[MemoryEntry], bot_name: &str) -> Vec<(bool, String)> {
    history
        .iter()
        .map(|entry| {
            let is_bot = entry.role == MemoryRole::Bot;
            let speaker = if is_bot {
                bot_name.to_string()
            } else {
                entry
                    .author_name
                    .clone()
                    .unwrap_or_else(|| "User".to_string())
            };
            (is_bot, format!("{speaker}: {}", entry.content))
        })
        .collect()
}
