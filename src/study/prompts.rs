use crate::study::{QuestionCount, SourceText};

/// Prepended to every prompt whose completion is parsed as JSON.
pub const JSON_ONLY_PREAMBLE: &str = "Return ONLY JSON. No explanation.";

pub fn summary_prompt(text: &SourceText) -> String {
    format!(
        "Summarize clearly with:
- One-line **TL;DR**
- Bullet points
- Bold key terms
TEXT:
{}",
        text.as_str()
    )
}

pub fn qa_prompt(text: &SourceText, count: QuestionCount) -> String {
    format!(
        "Return JSON:
{{\"items\":[{{\"question\":\"...\",\"answer\":\"...\"}}]}}
Make EXACTLY {} Q/A.
TEXT:{}",
        count.get(),
        text.as_str()
    )
}

pub fn mcq_prompt(text: &SourceText, count: QuestionCount) -> String {
    format!(
        "Return JSON:
{{\"items\":[{{\"question\":\"...\", \"options\":[\"A\",\"B\",\"C\",\"D\"], \"answer_index\":0}}]}}
Make EXACTLY {} MCQ. Every question has exactly 4 options and answer_index is the 0-based position of the correct option.
TEXT:{}",
        count.get(),
        text.as_str()
    )
}

/// The gentle register used both for per-question explanations and for chat replies.
pub fn explain_prompt(answer: &str) -> String {
    format!(
        "Explain this in a soft, gentle, cute tone.

Style guidelines:
- Speak calmly.
- No hard words.
- Be emotionally supportive.
- Use very small sentences.
- Sometimes add a soft comforting emoji like 🌸 or 🍃, but not too many.
- Sound like a kind friend helping.

ANSWER TO EXPLAIN:
{}",
        answer.trim()
    )
}

pub fn json_only(prompt: &str) -> String {
    format!("{}\n{}", JSON_ONLY_PREAMBLE, prompt)
}
