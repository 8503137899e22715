use std::sync::Arc;

use crate::study::completion::{Completer, RetryPolicy, DEFAULT_TEMPERATURE};
use crate::study::extract::parse_json;
use crate::study::prompts;
use crate::study::session::StudySession;
use crate::study::validate::{validate_mcq, validate_qa};
use crate::study::{McqItem, QaItem, StudyError, StudyMode, StudyResult};

/// What a Generate action produced for the session's mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Generated {
    Summary(String),
    QaQuiz(Vec<QaItem>),
    McqQuiz(Vec<McqItem>),
    ChatReady,
}

/// Runs the study modes against a completion service.
pub struct StudyHelper {
    completer: Arc<dyn Completer>,
    retry: RetryPolicy,
}

impl StudyHelper {
    pub fn new(completer: Arc<dyn Completer>, retry: RetryPolicy) -> Self {
        Self { completer, retry }
    }

    pub async fn generate(&self, session: &mut StudySession) -> StudyResult<Generated> {
        log::info!("Generating {} ({} questions)", session.mode, session.count.get());
        match session.mode {
            StudyMode::Summary => self.summarize(session).await.map(Generated::Summary),
            StudyMode::QaQuiz => self
                .generate_qa(session)
                .await
                .map(|items| Generated::QaQuiz(items.to_vec())),
            StudyMode::McqQuiz => self
                .generate_mcq(session)
                .await
                .map(|items| Generated::McqQuiz(items.to_vec())),
            StudyMode::Chat => Ok(Generated::ChatReady),
        }
    }

    pub async fn summarize(&self, session: &StudySession) -> StudyResult<String> {
        let prompt = prompts::summary_prompt(session.source()?);
        self.complete_text("Summary", &prompt).await
    }

    pub async fn generate_qa<'s>(&self, session: &'s mut StudySession) -> StudyResult<&'s [QaItem]> {
        let count = session.count;
        let prompt = prompts::json_only(&prompts::qa_prompt(session.source()?, count));
        let prompt = prompt.as_str();
        let completer = self.completer.as_ref();

        let items = self
            .retry
            .run("Q/A quiz", move || async move {
                let raw = completer.complete(prompt, DEFAULT_TEMPERATURE).await?;
                validate_qa(parse_json(&raw)?, count)
            })
            .await?;

        session.set_qa_items(items);
        Ok(session.qa_items())
    }

    pub async fn generate_mcq<'s>(
        &self,
        session: &'s mut StudySession,
    ) -> StudyResult<&'s [McqItem]> {
        let count = session.count;
        let prompt = prompts::json_only(&prompts::mcq_prompt(session.source()?, count));
        let prompt = prompt.as_str();
        let completer = self.completer.as_ref();

        let items = self
            .retry
            .run("MCQ quiz", move || async move {
                let raw = completer.complete(prompt, DEFAULT_TEMPERATURE).await?;
                validate_mcq(parse_json(&raw)?, count)
            })
            .await?;

        session.set_mcq_items(items);
        Ok(session.mcq_items())
    }

    /// Always asks the model again; the session keeps only the newest explanation.
    pub async fn explain(&self, session: &mut StudySession, position: usize) -> StudyResult<String> {
        let prompt = prompts::explain_prompt(&session.qa_item(position)?.answer);
        let explanation = self.complete_text("Explanation", &prompt).await?;
        session.record_explanation(position, explanation.clone());
        Ok(explanation)
    }

    /// Single-turn: only the latest message reaches the model, earlier turns are not sent.
    pub async fn chat(&self, session: &mut StudySession, message: &str) -> StudyResult<String> {
        let message = message.trim();
        if message.is_empty() {
            return Err(StudyError::Input("Type a message for Genie first.".to_string()));
        }
        let reply = self
            .complete_text("Chat", &prompts::explain_prompt(message))
            .await?;
        session.record_exchange(message.to_string(), reply.clone());
        Ok(reply)
    }

    /// Free-form completion; an empty reply is retried like any other bad reply.
    async fn complete_text(&self, label: &str, prompt: &str) -> StudyResult<String> {
        let completer = self.completer.as_ref();
        self.retry
            .run(label, move || async move {
                let text = completer.complete(prompt, DEFAULT_TEMPERATURE).await?;
                if text.trim().is_empty() {
                    return Err(StudyError::EmptyReply(label.to_lowercase()));
                }
                Ok(text)
            })
            .await
    }
}
