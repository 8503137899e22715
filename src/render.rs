//! Telegram presentation: HTML message bodies and reply keyboards.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use teloxide::types::{KeyboardButton, KeyboardMarkup};
use teloxide::utils::html::escape;

use crate::study::{ChatEntry, McqItem, QaItem, QuestionCount, Speaker, StudyMode};

/// Telegram rejects messages over 4096 characters; leave room for entities.
pub const MESSAGE_LIMIT: usize = 4000;

pub const GENERATE_AGAIN: &str = "🚀 Generate again";
pub const CHANGE_MODE: &str = "🔁 Change mode";
pub const NEW_MATERIAL: &str = "📄 New material";

pub const WELCOME_TEXT: &str = "🧞‍♂️ <b>NoteGenie AI</b>\n<i>Your study partner, that actually helps</i> 😉\n\nThis works best with clean, text-based PDFs or typed notes. Scanned pages or heavily designed files may give weaker results.\n\nWhat would you like to do?";
pub const MATERIAL_REQUEST: &str = "Upload a PDF or paste your notes as a message 📄";
pub const HELP_TEXT: &str = "Pick a mode, send a PDF or paste your notes, and Genie does the rest.\n\n• Summary: a TL;DR with the key points\n• Q/A Quiz: questions with answers, tap Explain for a gentle explanation\n• MCQ Quiz: multiple choice with the correct option revealed\n• Chat with Genie: ask anything, one message at a time";
pub const EXPLAIN_ONLY_IN_QA: &str = "Explain works on Q/A quizzes 🍃 Tap 🔁 Change mode and pick Q/A Quiz to use it.";
pub const UNKNOWN_COMMAND_HINT: &str = "I only know /start and /help. Paste your notes or upload a PDF to study something new 📄";
pub const SHORT_MATERIAL_HINT: &str = "That's a bit short to study from 🍃 Paste your notes, upload a PDF, or tap 🚀 Generate again.";
/// Shorter pasted text while studying is answered with a hint instead of replacing the material.
pub const MIN_MATERIAL_WORDS: usize = 3;
pub const WELCOME_BACK: &str = "🧞‍♂️ <b>Genie:</b> Welcome back! I'm happy to study with you together. 🍃";

fn bold_markdown() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*\*(.+?)\*\*").unwrap())
}

fn explain_request() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^\W*explain(?:\s+with\s+genie)?\s*\(?\s*q?\s*(\d+)\s*\)?\s*$").unwrap())
}

/// Escapes model output and turns the bits of markdown it likes to use into Telegram HTML.
pub fn markdown_to_html(text: &str) -> String {
    let escaped = escape(text);
    let bolded = bold_markdown().replace_all(&escaped, "<b>$1</b>");
    bolded
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            match trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
                Some(rest) => format!("• {}", rest),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn render_summary(summary: &str) -> Vec<String> {
    paginate(vec![
        "📝 <b>Summary</b>".to_string(),
        markdown_to_html(summary),
    ])
}

pub fn render_qa_card(position: usize, item: &QaItem) -> String {
    format!(
        "<b>Q{}. {}</b>\n<b>Answer:</b> {}",
        position,
        escape(&item.question),
        escape(&item.answer)
    )
}

pub fn render_explanation(position: usize, explanation: &str) -> String {
    format!(
        "🧞‍♂️ <b>Genie</b> <i>(soft &amp; gentle)</i> on Q{}:\n\n{} ✨",
        position,
        markdown_to_html(explanation)
    )
}

/// Cards in order, each followed by its explanation when one has been generated.
pub fn render_qa_quiz(items: &[QaItem], explanations: &BTreeMap<usize, String>) -> Vec<String> {
    let mut blocks = vec!["🧠 <b>Q/A Quiz</b>".to_string()];
    for (i, item) in items.iter().enumerate() {
        let position = i + 1;
        blocks.push(render_qa_card(position, item));
        if let Some(explanation) = explanations.get(&position) {
            blocks.push(render_explanation(position, explanation));
        }
    }
    blocks.push("Tap <b>✨ Explain</b> under any question number to have Genie explain it.".to_string());
    paginate(blocks)
}

fn option_letter(index: usize) -> char {
    (b'A' + (index % 26) as u8) as char
}

pub fn render_mcq_card(position: usize, item: &McqItem) -> String {
    let options = item
        .options
        .iter()
        .enumerate()
        .map(|(j, option)| format!("{}) {}", option_letter(j), escape(option)))
        .collect::<Vec<_>>()
        .join("\n");
    let correct = item
        .correct_option()
        .map(|option| format!("{}) {}", option_letter(item.answer_index), escape(option)))
        .unwrap_or_else(|| "?".to_string());
    format!(
        "<b>Q{}.</b> {}\n\n{}\n\n<b>Correct Answer:</b> {}",
        position,
        escape(&item.question),
        options,
        correct
    )
}

pub fn render_mcq_quiz(items: &[McqItem]) -> Vec<String> {
    let mut blocks = vec!["🎯 <b>MCQ Quiz</b>".to_string()];
    blocks.extend(
        items
            .iter()
            .enumerate()
            .map(|(i, item)| render_mcq_card(i + 1, item)),
    );
    paginate(blocks)
}

pub fn render_chat_entry(entry: &ChatEntry) -> String {
    match entry.speaker {
        Speaker::User => format!("<b>You:</b> {}", escape(&entry.message)),
        Speaker::Assistant => format!(
            "🧞‍♂️ <b>Genie:</b> {} ✨",
            markdown_to_html(&entry.message)
        ),
    }
}

pub fn render_chat_intro() -> String {
    "💬 <b>Chat with Your Genie</b>\n\nType your message 🌿 Ask anything... ✨".to_string()
}

/// Joins blocks with blank lines into as few messages as fit under `MESSAGE_LIMIT`.
/// A single block longer than the limit is split by [`split_html`].
pub fn paginate(blocks: Vec<String>) -> Vec<String> {
    let mut pages = Vec::new();
    let mut current = String::new();
    for block in blocks {
        for piece in split_html(&block, MESSAGE_LIMIT) {
            let needed = if current.is_empty() { 0 } else { 2 };
            if !current.is_empty()
                && char_len(&current) + needed + char_len(&piece) > MESSAGE_LIMIT
            {
                pages.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(&piece);
        }
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Smallest unit of rendered HTML a page break may not cut through.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Token<'a> {
    Open { name: &'a str, tag: &'a str },
    Close { name: &'a str, tag: &'a str },
    Text(&'a str),
}

impl<'a> Token<'a> {
    fn as_str(&self) -> &'a str {
        match *self {
            Token::Open { tag, .. } | Token::Close { tag, .. } => tag,
            Token::Text(text) => text,
        }
    }
}

fn tag_name(inner: &str) -> &str {
    inner
        .split(|c: char| c.is_whitespace() || c == '>' || c == '/')
        .next()
        .unwrap_or_default()
}

/// Tags, entities and single characters, in order.
fn tokenize(html: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = html;
    while let Some(c) = rest.chars().next() {
        let len = match c {
            '<' => rest.find('>').map_or(c.len_utf8(), |end| end + 1),
            '&' => rest
                .char_indices()
                .take(12)
                .find(|&(_, ch)| ch == ';')
                .map_or(c.len_utf8(), |(end, _)| end + 1),
            _ => c.len_utf8(),
        };
        let (piece, tail) = rest.split_at(len);
        let token = if piece.len() > 2 && piece.starts_with("</") && piece.ends_with('>') {
            Token::Close { name: tag_name(&piece[2..]), tag: piece }
        } else if piece.len() > 1 && piece.starts_with('<') && piece.ends_with('>') {
            Token::Open { name: tag_name(&piece[1..]), tag: piece }
        } else {
            Token::Text(piece)
        };
        tokens.push(token);
        rest = tail;
    }
    tokens
}

fn closing_tags(open: &[(&str, &str)]) -> String {
    open.iter().rev().map(|(name, _)| format!("</{}>", name)).collect()
}

fn opening_tags(open: &[(&str, &str)]) -> String {
    open.iter().map(|(_, tag)| *tag).collect()
}

/// Splits rendered HTML into pieces of at most `limit` characters.
///
/// Cuts fall between tokens, preferably after the last line break, else after
/// the last space. Tags still open at a cut are closed at the end of the piece
/// and reopened at the start of the next one, so every piece parses on its own.
pub fn split_html(block: &str, limit: usize) -> Vec<String> {
    if char_len(block) <= limit {
        return vec![block.to_string()];
    }

    let mut pieces = Vec::new();
    let mut open: Vec<(&str, &str)> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut prefix_len = 0;
    let mut last_line_break: Option<(usize, Vec<(&str, &str)>)> = None;
    let mut last_space: Option<(usize, Vec<(&str, &str)>)> = None;

    for token in tokenize(block) {
        let piece = token.as_str();
        let piece_len = char_len(piece);
        while current_len > prefix_len
            && current_len + piece_len + char_len(&closing_tags(&open)) > limit
        {
            let (tail, carried) = match last_line_break.take().or(last_space.take()) {
                Some((at, stack)) => (current.split_off(at), stack),
                None => (String::new(), open.clone()),
            };
            last_space = None;
            current.truncate(current.trim_end().len());
            current.push_str(&closing_tags(&carried));
            pieces.push(std::mem::take(&mut current));

            current = opening_tags(&carried);
            prefix_len = char_len(&current);
            current.push_str(&tail);
            current_len = char_len(&current);
        }

        current.push_str(piece);
        current_len += piece_len;
        match token {
            Token::Open { name, tag } => open.push((name, tag)),
            Token::Close { name, .. } => {
                if let Some(at) = open.iter().rposition(|(open_name, _)| *open_name == name) {
                    open.remove(at);
                }
            }
            Token::Text("\n") => last_line_break = Some((current.len(), open.clone())),
            Token::Text(text) if text.trim().is_empty() => {
                last_space = Some((current.len(), open.clone()))
            }
            Token::Text(_) => {}
        }
    }

    if current_len > prefix_len {
        pieces.push(current);
    }
    pieces
}

pub fn explain_button_label(position: usize) -> String {
    format!("✨ Explain Q{}", position)
}

/// Accepts the button text and loose typed variants like "explain 3".
pub fn parse_explain_request(text: &str) -> Option<usize> {
    explain_request()
        .captures(text.trim())
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn mode_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(StudyMode::Summary.label()),
            KeyboardButton::new(StudyMode::QaQuiz.label()),
        ],
        vec![
            KeyboardButton::new(StudyMode::McqQuiz.label()),
            KeyboardButton::new(StudyMode::Chat.label()),
        ],
    ])
}

pub fn count_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![QuestionCount::ALLOWED
        .iter()
        .map(|count| KeyboardButton::new(count.to_string()))
        .collect::<Vec<_>>()])
}

fn session_row() -> Vec<KeyboardButton> {
    vec![
        KeyboardButton::new(GENERATE_AGAIN),
        KeyboardButton::new(CHANGE_MODE),
        KeyboardButton::new(NEW_MATERIAL),
    ]
}

/// Keyboard shown while studying; a Q/A quiz gets one explain button per question.
pub fn study_keyboard(mode: StudyMode, qa_items: usize) -> KeyboardMarkup {
    let mut rows: Vec<Vec<KeyboardButton>> = Vec::new();
    match mode {
        StudyMode::QaQuiz => {
            let buttons = (1..=qa_items)
                .map(|i| KeyboardButton::new(explain_button_label(i)))
                .collect::<Vec<_>>();
            rows.extend(buttons.chunks(5).map(|row| row.to_vec()));
            rows.push(session_row());
        }
        StudyMode::Chat => rows.push(vec![
            KeyboardButton::new(CHANGE_MODE),
            KeyboardButton::new(NEW_MATERIAL),
        ]),
        StudyMode::Summary | StudyMode::McqQuiz => rows.push(session_row()),
    }
    KeyboardMarkup::new(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qa(n: usize) -> Vec<QaItem> {
        (1..=n)
            .map(|i| QaItem {
                question: format!("Why <{}>?", i),
                answer: format!("Because {} & more", i),
            })
            .collect()
    }

    #[test]
    fn model_text_is_escaped_before_markup() {
        let html = markdown_to_html("**TL;DR** a < b & c\n- **ATP** powers cells\n* second");
        assert_eq!(
            html,
            "<b>TL;DR</b> a &lt; b &amp; c\n• <b>ATP</b> powers cells\n• second"
        );
    }

    #[test]
    fn summary_keeps_the_tldr_marker() {
        let pages = render_summary("**TL;DR** Light becomes sugar.");
        assert_eq!(pages.len(), 1);
        assert!(pages[0].contains("<b>TL;DR</b>"));
    }

    #[test]
    fn qa_cards_are_numbered_and_escaped() {
        assert_eq!(
            render_qa_card(2, &qa(2)[1]),
            "<b>Q2. Why &lt;2&gt;?</b>\n<b>Answer:</b> Because 2 &amp; more"
        );
    }

    #[test]
    fn explanations_follow_their_question() {
        let mut explanations = BTreeMap::new();
        explanations.insert(1, "gentle".to_string());
        let page = render_qa_quiz(&qa(3), &explanations).join("\n\n");
        let explanation_at = page.find("gentle").unwrap();
        assert!(page.find("Q1.").unwrap() < explanation_at);
        assert!(explanation_at < page.find("Q2.").unwrap());
    }

    #[test]
    fn mcq_reveals_the_labelled_correct_choice() {
        let item = McqItem {
            question: "2 + 2?".into(),
            options: vec!["3".into(), "4".into(), "5".into(), "22".into()],
            answer_index: 1,
        };
        let card = render_mcq_card(1, &item);
        assert!(card.contains("A) 3\nB) 4\nC) 5\nD) 22"));
        assert!(card.ends_with("<b>Correct Answer:</b> B) 4"));
    }

    #[test]
    fn long_quizzes_are_split_under_the_limit() {
        let items: Vec<QaItem> = (0..20)
            .map(|i| QaItem {
                question: format!("Question {} {}", i, "x".repeat(300)),
                answer: "y".repeat(300),
            })
            .collect();
        let pages = render_qa_quiz(&items, &BTreeMap::new());
        assert!(pages.len() > 1);
        assert!(pages.iter().all(|p| p.chars().count() <= MESSAGE_LIMIT));
        let joined = pages.join("\n\n");
        assert!(joined.contains("Q1. ") && joined.contains("Q20. "));
    }

    #[test]
    fn oversized_blocks_are_chunked() {
        let pages = paginate(vec!["z".repeat(MESSAGE_LIMIT * 2 + 10)]);
        assert_eq!(pages.len(), 3);
        assert!(pages.iter().all(|p| p.chars().count() <= MESSAGE_LIMIT));
    }

    fn assert_parses_alone(page: &str) {
        assert!(char_len(page) <= MESSAGE_LIMIT);
        assert_eq!(page.matches("<b>").count(), page.matches("</b>").count(), "{}", page);
        assert_eq!(page.matches("<i>").count(), page.matches("</i>").count(), "{}", page);
        for (at, _) in page.match_indices('&') {
            let rest = &page[at..];
            assert!(
                ["&amp;", "&lt;", "&gt;", "&quot;", "&#"]
                    .iter()
                    .any(|entity| rest.starts_with(entity)),
                "cut entity in {:?}",
                &rest[..rest.len().min(8)]
            );
        }
    }

    #[test]
    fn long_summaries_never_cut_through_tags_or_entities() {
        let pages = render_summary(&format!("{} **Photosynthesis** &amp more", "a".repeat(3985)));
        assert!(pages.len() > 1);
        pages.iter().for_each(|page| assert_parses_alone(page));
        let joined = pages.join("\n");
        assert!(joined.contains("<b>Photosynthesis</b>"));
        assert!(joined.contains("&amp;amp more"));
    }

    #[test]
    fn bold_spans_are_reopened_on_the_next_page() {
        let html = markdown_to_html(&format!("**{}**", "word ".repeat(1000)));
        let pages = paginate(vec![html]);
        assert!(pages.len() > 1);
        pages.iter().for_each(|page| assert_parses_alone(page));
        assert!(pages[0].starts_with("<b>") && pages[0].ends_with("word</b>"));
        assert!(pages[1].starts_with("<b>word"));
    }

    #[test]
    fn pages_break_between_lines() {
        let text = (0..400)
            .map(|i| format!("line {:03} text", i))
            .collect::<Vec<_>>()
            .join("\n");
        let pages = paginate(vec![text]);
        assert_eq!(pages.len(), 2);
        for page in &pages {
            assert!(page.starts_with("line ") && page.ends_with(" text"));
        }
        assert_eq!(pages.join("\n").lines().count(), 400);
    }

    #[test]
    fn explain_requests_are_recognised() {
        assert_eq!(parse_explain_request(&explain_button_label(7)), Some(7));
        assert_eq!(parse_explain_request("explain 3"), Some(3));
        assert_eq!(parse_explain_request("Explain with Genie (Q12)"), Some(12));
        assert_eq!(parse_explain_request("please explain photosynthesis"), None);
        assert_eq!(parse_explain_request("Q3"), None);
    }

    #[test]
    fn qa_keyboard_has_one_button_per_question() {
        let keyboard = study_keyboard(StudyMode::QaQuiz, 10);
        let labels: Vec<String> = keyboard
            .keyboard
            .iter()
            .flatten()
            .map(|button| button.text.clone())
            .collect();
        assert_eq!(keyboard.keyboard.len(), 3);
        assert!(labels.contains(&"✨ Explain Q10".to_string()));
        assert!(labels.contains(&CHANGE_MODE.to_string()));
    }

    #[test]
    fn chat_lines_show_the_speaker() {
        let user = ChatEntry {
            speaker: Speaker::User,
            message: "a<b".into(),
        };
        let genie = ChatEntry {
            speaker: Speaker::Assistant,
            message: "hello 🌸".into(),
        };
        assert_eq!(render_chat_entry(&user), "<b>You:</b> a&lt;b");
        assert_eq!(render_chat_entry(&genie), "🧞‍♂️ <b>Genie:</b> hello 🌸 ✨");
    }
}
