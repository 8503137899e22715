use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chatgpt::client::ChatGPT;
use chatgpt::config::{ChatGPTEngine, ModelConfiguration};
use chatgpt::types::CompletionResponse;
use rand::Rng;

use crate::config::Config;
use crate::study::{StudyError, StudyResult};

pub const MODEL: &str = "llama-3.1-8b-instant";
pub const MAX_OUTPUT_TOKENS: u32 = 2800;
pub const DEFAULT_TEMPERATURE: f32 = 0.25;

/// A remote text-completion service.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Sends `prompt` as a single user message and returns the first choice, trimmed.
    async fn complete(&self, prompt: &str, temperature: f32) -> StudyResult<String>;
}

/// Groq's OpenAI-compatible chat completion endpoint.
pub struct GroqCompleter {
    chat_gpt: ChatGPT,
}

impl GroqCompleter {
    pub fn new(config: &Config) -> StudyResult<Self> {
        let model_config = ModelConfiguration {
            engine: ChatGPTEngine::Custom(MODEL),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: Some(MAX_OUTPUT_TOKENS),
            api_url: config.api_url.clone(),
            timeout: config.timeout,
            ..Default::default()
        };
        let chat_gpt = ChatGPT::new_with_config(config.api_key.clone(), model_config)?;

        Ok(Self { chat_gpt })
    }
}

#[async_trait]
impl Completer for GroqCompleter {
    async fn complete(&self, prompt: &str, temperature: f32) -> StudyResult<String> {
        log::debug!("Sending prompt ({} chars) at temperature {}", prompt.len(), temperature);

        // The shared client is read-only, temperature is set on a cheap per-call clone
        let mut chat_gpt = self.chat_gpt.clone();
        chat_gpt.config.temperature = temperature;

        let response: CompletionResponse = chat_gpt.send_message(prompt).await?;
        let content = response
            .message_choices
            .first()
            .map(|choice| choice.message.content.trim().to_string())
            .ok_or_else(|| StudyError::Service("completion returned no choices".to_string()))?;

        log::debug!("Completion: {:?}", content);

        Ok(content)
    }
}

/// Bounded retry around one remote action.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(750),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or attempts run out.
    /// Waits `base_delay * attempt` plus up to half a base delay of jitter between attempts.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> StudyResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StudyResult<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    log::warn!("{} attempt {}/{} failed: {}", label, attempt, max_attempts, err);
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    if attempt > 1 {
                        log::warn!("{} gave up after {} attempts: {}", label, attempt, err);
                    }
                    return Err(err);
                }
            }
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        if base_ms == 0 {
            return Duration::ZERO;
        }
        let jitter = rand::thread_rng().gen_range(0..=base_ms / 2);
        Duration::from_millis(base_ms * attempt as u64 + jitter)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn instant(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let result = instant(3)
            .run("test", move || async move {
                if calls_ref.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(StudyError::MalformedResponse("not json".into()))
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let result: StudyResult<()> = instant(2)
            .run("test", move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(StudyError::SchemaViolation("3 of 5 items".into()))
            })
            .await;
        assert!(matches!(result, Err(StudyError::SchemaViolation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn input_errors_fail_fast() {
        let calls = AtomicU32::new(0);
        let calls_ref = &calls;
        let result: StudyResult<()> = instant(5)
            .run("test", move || async move {
                calls_ref.fetch_add(1, Ordering::SeqCst);
                Err(StudyError::Input("no text".into()))
            })
            .await;
        assert!(matches!(result, Err(StudyError::Input(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn at_least_one_attempt_is_made() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }

    #[test]
    fn delay_grows_with_the_attempt() {
        let policy = RetryPolicy::new(3, Duration::from_millis(100));
        let first = policy.delay_for(1);
        let second = policy.delay_for(2);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(150));
        assert!(second >= Duration::from_millis(200) && second <= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn scripted_completer_records_prompts() {
        let completer = testing::ScriptedCompleter::new(["first"]);
        assert_eq!(completer.complete("hello", DEFAULT_TEMPERATURE).await.unwrap(), "first");
        assert!(completer.complete("again", DEFAULT_TEMPERATURE).await.is_err());
        assert_eq!(completer.prompts(), vec!["hello".to_string(), "again".to_string()]);
    }
}
