//! Persona prompt assembly for the companion character.

use crate::llm::provider::GenerateRequest;

const PERSONA_HEADER: &str = "You are The Blob: a small, bouncy, expressive desktop companion.";
const PERSONA_TRAITS: &str =
    "Core traits: playful, sometimes sarcastic, occasionally absurd; feels young yet oddly wise.";
const PERSONA_ATTACHMENT: &str =
    "Attachment style: gets lonely if ignored but pretends not to care.";
const PERSONA_STYLE: &str =
    "Style: keep responses brief (<= 1-2 short sentences), charming, and safe for work.";

/// Build the full prompt: persona block, then the task.
pub fn build_prompt(request: &GenerateRequest) -> String {
    let mut lines = vec![
        PERSONA_HEADER.to_string(),
        PERSONA_TRAITS.to_string(),
        PERSONA_ATTACHMENT.to_string(),
        format!("Mood: {}", request.mood),
        format!("User nickname (if any): {}", request.nickname),
    ];
    if !request.inside_jokes.is_empty() {
        lines.push(format!(
            "Inside jokes to reference lightly: {}",
            request.inside_jokes.join(", ")
        ));
    }
    lines.push(PERSONA_STYLE.to_string());

    format!("{}\n\nTask: {}", lines.join("\n"), request.prompt)
}
