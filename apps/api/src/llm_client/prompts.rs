// Shared prompt constants.
// Each pipeline stage that needs LLM calls defines its own prompts alongside it.
// This file contains cross-cutting prompt fragments.

/// Appended to every system prompt whose answer is parsed as JSON.
pub const JSON_ONLY_SYSTEM: &str = "\
    Answer with a single JSON object and nothing else: \
    no prose before or after it, no code fences, no comments inside it.";

/// Reminds the model that redaction tokens are placeholders, not content.
pub const REDACTION_INSTRUCTION: &str = "\
    The input has been redacted. Tokens such as [EMAIL], [PHONE], [NAME], \
    [ADDRESS] and [NATIONAL_ID] replace personal data. Never copy them into \
    any output field and never try to reconstruct the original values.";
