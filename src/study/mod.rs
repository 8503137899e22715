pub mod completion;
pub mod error;
pub mod extract;
pub mod modes;
pub mod prompts;
pub mod session;
pub mod source;
pub mod validate;

use std::fmt;

pub use error::{StudyError, StudyResult};

/// The material every prompt of a session is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceText(String);

impl SourceText {
    pub fn new(text: impl Into<String>) -> StudyResult<Self> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(StudyError::Input(
                "Please paste some text or upload a PDF first.".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct QaItem {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct McqItem {
    pub question: String,
    pub options: Vec<String>,
    pub answer_index: usize,
}

impl McqItem {
    /// Only meaningful on validated items.
    pub fn correct_option(&self) -> Option<&str> {
        self.options.get(self.answer_index).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StudyMode {
    Summary,
    QaQuiz,
    McqQuiz,
    Chat,
}

impl StudyMode {
    pub const ALL: [StudyMode; 4] = [
        StudyMode::Summary,
        StudyMode::QaQuiz,
        StudyMode::McqQuiz,
        StudyMode::Chat,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            StudyMode::Summary => "Summary",
            StudyMode::QaQuiz => "Q/A Quiz",
            StudyMode::McqQuiz => "MCQ Quiz",
            StudyMode::Chat => "Chat with Genie",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.label().eq_ignore_ascii_case(label))
    }

    pub fn needs_count(&self) -> bool {
        matches!(self, StudyMode::QaQuiz | StudyMode::McqQuiz)
    }

    pub fn needs_material(&self) -> bool {
        !matches!(self, StudyMode::Chat)
    }
}

impl fmt::Display for StudyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How many questions a quiz asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionCount(usize);

impl QuestionCount {
    pub const ALLOWED: [usize; 4] = [5, 10, 15, 20];

    pub fn new(count: usize) -> StudyResult<Self> {
        if Self::ALLOWED.contains(&count) {
            Ok(Self(count))
        } else {
            Err(StudyError::Input(format!(
                "Please choose one of {} questions.",
                Self::ALLOWED
                    .iter()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            )))
        }
    }

    pub fn parse(text: &str) -> StudyResult<Self> {
        let count = text
            .trim()
            .parse::<usize>()
            .map_err(|_| StudyError::Input("Please send a number.".to_string()))?;
        Self::new(count)
    }

    pub fn get(&self) -> usize {
        self.0
    }
}

impl Default for QuestionCount {
    fn default() -> Self {
        Self(Self::ALLOWED[0])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    pub speaker: Speaker,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_source_text_is_an_input_error() {
        assert!(matches!(SourceText::new("  \n\t "), Err(StudyError::Input(_))));
    }

    #[test]
    fn source_text_is_trimmed() {
        let text = SourceText::new("  Cells divide.\n").unwrap();
        assert_eq!(text.as_str(), "Cells divide.");
        assert_eq!(text.word_count(), 2);
    }

    #[test]
    fn only_offered_counts_are_accepted() {
        for count in QuestionCount::ALLOWED {
            assert_eq!(QuestionCount::new(count).unwrap().get(), count);
        }
        assert!(QuestionCount::new(0).is_err());
        assert!(QuestionCount::new(7).is_err());
        assert!(QuestionCount::parse("ten").is_err());
        assert_eq!(QuestionCount::parse(" 15 ").unwrap().get(), 15);
    }

    #[test]
    fn modes_round_trip_through_their_labels() {
        for mode in StudyMode::ALL {
            assert_eq!(StudyMode::from_label(mode.label()), Some(mode));
        }
        assert_eq!(StudyMode::from_label("q/a quiz"), Some(StudyMode::QaQuiz));
        assert_eq!(StudyMode::from_label("Flashcards"), None);
    }

    #[test]
    fn correct_option_is_looked_up_by_index() {
        let item = McqItem {
            question: "Largest planet?".into(),
            options: vec!["Mars".into(), "Jupiter".into(), "Venus".into(), "Earth".into()],
            answer_index: 1,
        };
        assert_eq!(item.correct_option(), Some("Jupiter"));
    }
}
