//! Prompt assembly for completion endpoints.
//!
//! Text completion renders the history through the selected instruct format
//! sequences. Chat completion maps it onto role tagged messages. In both
//! modes the D1JB text is inserted as a system turn one entry above the
//! newest message, and the oldest entries are dropped once the history no
//! longer fits the context budget.

use serde_json::{Value, json};

use crate::domain::{AiChatEntry, InferenceRequest, MessageEntity, text::replace_macros};

/// Rough character-per-token ratio used for the context budget
const CHARS_PER_TOKEN: usize = 4;

/// Instruct format sequences, read from the loosely typed format file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstructSequences {
    pub input: String,
    pub output: String,
    pub system: String,
    pub separator: String,
    pub stop: String,
}

impl InstructSequences {
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            input: field("input_sequence"),
            output: field("output_sequence"),
            system: field("system_sequence"),
            separator: field("separator_sequence"),
            stop: field("stop_sequence"),
        }
    }

    fn turn_end(&self) -> &str {
        if self.separator.is_empty() {
            "\n"
        } else {
            self.separator.as_str()
        }
    }
}

/// Newest entries of `history` that fit the context budget, oldest first
fn fit_history(request: &InferenceRequest) -> &[AiChatEntry] {
    let budget = (request.context_size.saturating_sub(request.response_length) as usize)
        .saturating_mul(CHARS_PER_TOKEN);
    let mut used = 0usize;
    let mut start = request.history.len();
    for (index, entry) in request.history.iter().enumerate().rev() {
        used += entry.username.len() + entry.content.len() + 2;
        if used > budget {
            break;
        }
        start = index;
    }
    &request.history[start..]
}

fn d1jb(request: &InferenceRequest) -> Option<String> {
    let text = replace_macros(&request.d1jb, &request.user_name, &request.character_name);
    (!text.trim().is_empty()).then_some(text)
}

/// Render a text-completion prompt ending with the character's name cue
pub fn build_text_prompt(request: &InferenceRequest) -> String {
    let sequences = InstructSequences::from_value(&request.instruct_sequences);
    let history = fit_history(request);
    let jailbreak = d1jb(request);
    let jailbreak_at = history.len().saturating_sub(1);

    let mut prompt = String::new();
    for (index, entry) in history.iter().enumerate() {
        if index == jailbreak_at {
            if let Some(text) = &jailbreak {
                prompt.push_str(&sequences.system);
                prompt.push_str(text);
                prompt.push_str(sequences.turn_end());
            }
        }
        let prefix = match entry.entity {
            MessageEntity::User => &sequences.input,
            MessageEntity::Ai => &sequences.output,
        };
        prompt.push_str(prefix);
        prompt.push_str(&format!("{}: {}", entry.username, entry.content));
        prompt.push_str(turn_end_for(&sequences, entry.entity));
    }
    if history.is_empty() {
        if let Some(text) = &jailbreak {
            prompt.push_str(&sequences.system);
            prompt.push_str(text);
            prompt.push_str(sequences.turn_end());
        }
    }
    prompt.push_str(&sequences.output);
    prompt.push_str(&format!("{}:", request.character_name));
    prompt
}

fn turn_end_for(sequences: &InstructSequences, entity: MessageEntity) -> &str {
    match entity {
        MessageEntity::Ai if !sequences.stop.is_empty() => sequences.stop.as_str(),
        _ => sequences.turn_end(),
    }
}

/// Stop strings for text completion
pub fn stop_sequences(request: &InferenceRequest) -> Vec<String> {
    let sequences = InstructSequences::from_value(&request.instruct_sequences);
    let mut stops = vec![format!("\n{}:", request.user_name)];
    for sequence in [sequences.input, sequences.stop] {
        let trimmed = sequence.trim();
        if !trimmed.is_empty() && !stops.iter().any(|s| s == trimmed) {
            stops.push(trimmed.to_string());
        }
    }
    stops
}

/// Map the history onto chat-completion messages
pub fn build_chat_messages(request: &InferenceRequest) -> Vec<Value> {
    let history = fit_history(request);
    let jailbreak = d1jb(request);
    let jailbreak_at = history.len().saturating_sub(1);

    let mut messages = Vec::with_capacity(history.len() + 1);
    for (index, entry) in history.iter().enumerate() {
        if index == jailbreak_at {
            if let Some(text) = &jailbreak {
                messages.push(json!({"role": "system", "content": text}));
            }
        }
        let message = match entry.entity {
            MessageEntity::User => json!({
                "role": "user",
                "content": format!("{}: {}", entry.username, entry.content),
            }),
            MessageEntity::Ai => json!({"role": "assistant", "content": entry.content}),
        };
        messages.push(message);
    }
    if history.is_empty() {
        if let Some(text) = jailbreak {
            messages.push(json!({"role": "system", "content": text}));
        }
    }
    messages
}
