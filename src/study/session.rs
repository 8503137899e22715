use std::collections::BTreeMap;

use crate::study::{
    ChatEntry, McqItem, QaItem, QuestionCount, SourceText, Speaker, StudyError, StudyMode,
    StudyResult,
};

/// Everything one learner has built up in a chat. Lives in memory only.
#[derive(Debug, Clone, PartialEq)]
pub struct StudySession {
    pub mode: StudyMode,
    pub count: QuestionCount,
    source: Option<SourceText>,
    qa_items: Vec<QaItem>,
    mcq_items: Vec<McqItem>,
    explanations: BTreeMap<usize, String>,
    transcript: Vec<ChatEntry>,
}

impl StudySession {
    pub fn new(mode: StudyMode, count: QuestionCount) -> Self {
        Self {
            mode,
            count,
            source: None,
            qa_items: Vec::new(),
            mcq_items: Vec::new(),
            explanations: BTreeMap::new(),
            transcript: Vec::new(),
        }
    }

    /// A Generate action: new material replaces the old one and everything derived from it.
    pub fn replace_source(&mut self, source: SourceText) {
        log::info!("New study material: {} words", source.word_count());
        self.source = Some(source);
        self.qa_items.clear();
        self.mcq_items.clear();
        self.explanations.clear();
    }

    pub fn source(&self) -> StudyResult<&SourceText> {
        self.source.as_ref().ok_or_else(|| {
            StudyError::Input("Please paste some text or upload a PDF first.".to_string())
        })
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn qa_items(&self) -> &[QaItem] {
        &self.qa_items
    }

    pub fn set_qa_items(&mut self, items: Vec<QaItem>) {
        self.qa_items = items;
        self.explanations.clear();
    }

    /// 1-based lookup, matching the numbering shown to the learner.
    pub fn qa_item(&self, position: usize) -> StudyResult<&QaItem> {
        position
            .checked_sub(1)
            .and_then(|i| self.qa_items.get(i))
            .ok_or_else(|| {
                StudyError::Input(format!(
                    "There is no question {} in the current quiz.",
                    position
                ))
            })
    }

    pub fn mcq_items(&self) -> &[McqItem] {
        &self.mcq_items
    }

    pub fn set_mcq_items(&mut self, items: Vec<McqItem>) {
        self.mcq_items = items;
    }

    pub fn explanations(&self) -> &BTreeMap<usize, String> {
        &self.explanations
    }

    /// Re-explaining a question replaces the earlier explanation.
    pub fn record_explanation(&mut self, position: usize, explanation: String) {
        self.explanations.insert(position, explanation);
    }

    pub fn transcript(&self) -> &[ChatEntry] {
        &self.transcript
    }

    pub fn record_exchange(&mut self, question: String, reply: String) {
        self.transcript.push(ChatEntry {
            speaker: Speaker::User,
            message: question,
        });
        self.transcript.push(ChatEntry {
            speaker: Speaker::Assistant,
            message: reply,
        });
    }
}
