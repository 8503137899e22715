mod config;
mod render;
mod study;

use std::future::Future;
use std::sync::Arc;

use dotenv::dotenv;
use study::{
    completion::GroqCompleter,
    modes::{Generated, StudyHelper},
    session::StudySession,
    source::TextSource,
    QuestionCount, StudyError, StudyMode,
};
use teloxide::{
    dispatching::dialogue::InMemStorage,
    net::Download,
    prelude::*,
    types::{ChatAction, ChatId, Document, KeyboardMarkup, ParseMode},
    utils::{command::BotCommands, html::escape},
};

type StudyDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerError = Box<dyn std::error::Error + Send + Sync>;
type HandlerResult = Result<(), HandlerError>;

/// Telegram's bot API refuses to hand out files above 20 MB.
const MAX_DOCUMENT_BYTES: u32 = 20 * 1024 * 1024;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "NoteGenie commands:")]
enum Command {
    #[command(description = "start a new study session")]
    Start,
    #[command(description = "show how to use the bot")]
    Help,
}

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceiveMode {
        session: Option<StudySession>,
    },
    ReceiveCount {
        mode: StudyMode,
        session: Option<StudySession>,
    },
    ReceiveMaterial {
        session: StudySession,
    },
    Studying {
        session: StudySession,
    },
}

/// What a text message means while the learner is studying.
#[derive(Debug, Clone, Copy, PartialEq)]
enum StudyAction {
    GenerateAgain,
    ChangeMode,
    NewMaterial,
    Chat,
    Explain(usize),
    Hint(&'static str),
    Material,
}

fn classify_text(mode: StudyMode, text: &str) -> StudyAction {
    match text {
        render::GENERATE_AGAIN => StudyAction::GenerateAgain,
        render::CHANGE_MODE => StudyAction::ChangeMode,
        render::NEW_MATERIAL => StudyAction::NewMaterial,
        _ if text.trim_start().starts_with('/') => StudyAction::Hint(render::UNKNOWN_COMMAND_HINT),
        _ if mode == StudyMode::Chat => StudyAction::Chat,
        _ => match render::parse_explain_request(text) {
            Some(position) if mode == StudyMode::QaQuiz => StudyAction::Explain(position),
            Some(_) => StudyAction::Hint(render::EXPLAIN_ONLY_IN_QA),
            None if text.split_whitespace().count() < render::MIN_MATERIAL_WORDS => {
                StudyAction::Hint(render::SHORT_MATERIAL_HINT)
            }
            None => StudyAction::Material,
        },
    }
}

#[tokio::main]
async fn main() {
    // A missing .env is fine, the variables may come from the environment itself
    let _ = dotenv();

    pretty_env_logger::init();
    log::info!("Starting NoteGenie bot...");

    let config = match config::Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            log::error!("Invalid configuration: {}", err);
            std::process::exit(1);
        }
    };

    let completer = match GroqCompleter::new(&config) {
        Ok(completer) => completer,
        Err(err) => {
            log::error!("Unable to set up the completion client: {}", err);
            std::process::exit(1);
        }
    };
    log::info!("Completion endpoint: {}", config.api_url);

    let helper = Arc::new(StudyHelper::new(Arc::new(completer), config.retry));

    let bot = Bot::from_env();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::entry().filter_command::<Command>().endpoint(handle_command))
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveMode { session }].endpoint(receive_mode))
            .branch(dptree::case![State::ReceiveCount { mode, session }].endpoint(receive_count))
            .branch(dptree::case![State::ReceiveMaterial { session }].endpoint(receive_material))
            .branch(dptree::case![State::Studying { session }].endpoint(studying)),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new(), helper])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

async fn handle_command(
    bot: Bot,
    dialogue: StudyDialogue,
    cmd: Command,
    msg: Message,
) -> HandlerResult {
    match cmd {
        Command::Start => start(bot, dialogue, msg).await,
        Command::Help => {
            bot.send_message(
                msg.chat.id,
                format!("{}\n\n{}", Command::descriptions(), render::HELP_TEXT),
            )
            .await?;
            Ok(())
        }
    }
}

async fn start(bot: Bot, dialogue: StudyDialogue, msg: Message) -> HandlerResult {
    log::info!("New study session in chat {}", msg.chat.id);
    bot.send_message(msg.chat.id, render::WELCOME_TEXT)
        .parse_mode(ParseMode::Html)
        .reply_markup(render::mode_keyboard())
        .await?;

    dialogue.update(State::ReceiveMode { session: None }).await?;
    Ok(())
}

async fn receive_mode(
    bot: Bot,
    dialogue: StudyDialogue,
    helper: Arc<StudyHelper>,
    session: Option<StudySession>,
    msg: Message,
) -> HandlerResult {
    let Some(mode) = msg.text().and_then(StudyMode::from_label) else {
        bot.send_message(msg.chat.id, "Please choose one of the options 🍃")
            .reply_markup(render::mode_keyboard())
            .await?;
        return Ok(());
    };

    if mode.needs_count() {
        bot.send_message(msg.chat.id, "How many questions?")
            .reply_markup(render::count_keyboard())
            .await?;
        dialogue.update(State::ReceiveCount { mode, session }).await?;
        return Ok(());
    }

    let count = session.as_ref().map(|s| s.count).unwrap_or_default();
    enter_mode(bot, dialogue, helper, session, mode, count, msg.chat.id).await
}

async fn receive_count(
    bot: Bot,
    dialogue: StudyDialogue,
    helper: Arc<StudyHelper>,
    (mode, session): (StudyMode, Option<StudySession>),
    msg: Message,
) -> HandlerResult {
    let count = match QuestionCount::parse(msg.text().unwrap_or_default()) {
        Ok(count) => count,
        Err(err) => {
            bot.send_message(msg.chat.id, err.user_message())
                .reply_markup(render::count_keyboard())
                .await?;
            return Ok(());
        }
    };

    enter_mode(bot, dialogue, helper, session, mode, count, msg.chat.id).await
}

/// Applies the chosen mode and count, then either asks for material or generates right away.
async fn enter_mode(
    bot: Bot,
    dialogue: StudyDialogue,
    helper: Arc<StudyHelper>,
    session: Option<StudySession>,
    mode: StudyMode,
    count: QuestionCount,
    chat_id: ChatId,
) -> HandlerResult {
    let resumed = session.is_some();
    let mut session = session.unwrap_or_else(|| StudySession::new(mode, count));
    session.mode = mode;
    session.count = count;

    if mode.needs_material() && !session.has_source() {
        bot.send_message(chat_id, render::MATERIAL_REQUEST)
            .reply_markup(teloxide::types::KeyboardRemove::new())
            .await?;
        dialogue.update(State::ReceiveMaterial { session }).await?;
        return Ok(());
    }

    if resumed {
        bot.send_message(chat_id, render::WELCOME_BACK)
            .parse_mode(ParseMode::Html)
            .await?;
    }
    let pages = generate_pages(&bot, &helper, &mut session, chat_id).await;
    save_and_show(&bot, &dialogue, session, chat_id, pages).await
}

async fn receive_material(
    bot: Bot,
    dialogue: StudyDialogue,
    helper: Arc<StudyHelper>,
    mut session: StudySession,
    msg: Message,
) -> HandlerResult {
    if !load_material(&bot, &msg, &mut session).await? {
        return Ok(());
    }

    let pages = generate_pages(&bot, &helper, &mut session, msg.chat.id).await;
    save_and_show(&bot, &dialogue, session, msg.chat.id, pages).await
}

async fn studying(
    bot: Bot,
    dialogue: StudyDialogue,
    helper: Arc<StudyHelper>,
    mut session: StudySession,
    msg: Message,
) -> HandlerResult {
    let chat_id = msg.chat.id;

    if msg.document().is_some() {
        if !load_material(&bot, &msg, &mut session).await? {
            return Ok(());
        }
        let pages = generate_pages(&bot, &helper, &mut session, chat_id).await;
        return save_and_show(&bot, &dialogue, session, chat_id, pages).await;
    }

    let Some(text) = msg.text() else {
        bot.send_message(chat_id, "Please send text or a PDF 🍃")
            .reply_markup(keyboard_for(&session))
            .await?;
        return Ok(());
    };

    let pages = match classify_text(session.mode, text) {
        StudyAction::GenerateAgain => generate_pages(&bot, &helper, &mut session, chat_id).await,
        StudyAction::ChangeMode => {
            bot.send_message(chat_id, "Which mode would you like?")
                .reply_markup(render::mode_keyboard())
                .await?;
            dialogue
                .update(State::ReceiveMode {
                    session: Some(session),
                })
                .await?;
            return Ok(());
        }
        StudyAction::NewMaterial => {
            bot.send_message(chat_id, render::MATERIAL_REQUEST)
                .reply_markup(teloxide::types::KeyboardRemove::new())
                .await?;
            dialogue.update(State::ReceiveMaterial { session }).await?;
            return Ok(());
        }
        StudyAction::Hint(hint) => {
            bot.send_message(chat_id, hint)
                .reply_markup(keyboard_for(&session))
                .await?;
            return Ok(());
        }
        StudyAction::Chat => chat_pages(&bot, &helper, &mut session, chat_id, text).await,
        StudyAction::Explain(position) => {
            explain_pages(&bot, &helper, &mut session, chat_id, position).await
        }
        StudyAction::Material => {
            // Pasting new notes is a fresh Generate action
            if !load_material(&bot, &msg, &mut session).await? {
                return Ok(());
            }
            generate_pages(&bot, &helper, &mut session, chat_id).await
        }
    };

    save_and_show(&bot, &dialogue, session, chat_id, pages).await
}

/// Reads pasted text or an uploaded PDF into the session.
/// Returns false (after telling the learner why) when nothing usable was sent.
async fn load_material(
    bot: &Bot,
    msg: &Message,
    session: &mut StudySession,
) -> Result<bool, HandlerError> {
    let document = match msg.document() {
        Some(document) => match check_document(document) {
            Ok(()) => Some(download_document(bot, document).await?),
            Err(err) => {
                bot.send_message(msg.chat.id, err.user_message()).await?;
                return Ok(false);
            }
        },
        None => None,
    };
    let pasted = msg.text().map(str::to_string);

    let source = match TextSource::pick(pasted, document) {
        Ok(source) => source,
        Err(err) => {
            bot.send_message(msg.chat.id, err.user_message()).await?;
            return Ok(false);
        }
    };

    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    let text = tokio::task::spawn_blocking(move || source.into_source_text())
        .await
        .unwrap_or_else(|err| {
            log::warn!("Text extraction task failed: {}", err);
            Err(StudyError::Input(
                "I couldn't read that document. Please try another PDF or paste the text.".to_string(),
            ))
        });

    match text {
        Ok(text) => {
            session.replace_source(text);
            Ok(true)
        }
        Err(err) => {
            bot.send_message(msg.chat.id, err.user_message()).await?;
            Ok(false)
        }
    }
}

fn check_document(document: &Document) -> Result<(), StudyError> {
    let file_name = document.file_name.clone().unwrap_or_default();
    let is_pdf = TextSource::is_pdf_name(&file_name)
        || document
            .mime_type
            .as_ref()
            .map(|mime| mime.essence_str() == "application/pdf")
            .unwrap_or(false);
    if !is_pdf {
        return Err(StudyError::Input(
            "Only PDF documents are supported. You can also paste the text.".to_string(),
        ));
    }
    if document.file.size > MAX_DOCUMENT_BYTES {
        return Err(StudyError::Input(
            "That PDF is larger than 20 MB, which Telegram won't let me download.".to_string(),
        ));
    }
    Ok(())
}

async fn download_document(
    bot: &Bot,
    document: &Document,
) -> Result<(String, Vec<u8>), HandlerError> {
    let file_name = document
        .file_name
        .clone()
        .unwrap_or_else(|| "document.pdf".to_string());
    log::debug!("Downloading {} ({} bytes)", file_name, document.file.size);

    let file = bot.get_file(&document.file.id).await?;
    let mut bytes = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut bytes).await?;

    Ok((file_name, bytes))
}

async fn generate_pages(
    bot: &Bot,
    helper: &StudyHelper,
    session: &mut StudySession,
    chat_id: ChatId,
) -> Vec<String> {
    // We don't really care if the typing indicator fails
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

    match helper.generate(session).await {
        Ok(Generated::Summary(summary)) => render::render_summary(&summary),
        Ok(Generated::QaQuiz(items)) => render::render_qa_quiz(&items, session.explanations()),
        Ok(Generated::McqQuiz(items)) => render::render_mcq_quiz(&items),
        Ok(Generated::ChatReady) => {
            let mut blocks = vec![render::render_chat_intro()];
            blocks.extend(session.transcript().iter().map(render::render_chat_entry));
            render::paginate(blocks)
        }
        Err(err) => {
            log::warn!("{} failed in chat {}: {}", session.mode, chat_id, err);
            vec![escape(&err.user_message())]
        }
    }
}

async fn explain_pages(
    bot: &Bot,
    helper: &StudyHelper,
    session: &mut StudySession,
    chat_id: ChatId,
    position: usize,
) -> Vec<String> {
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

    let reply = match helper.explain(session, position).await {
        Ok(explanation) => render::render_explanation(position, &explanation),
        Err(err) => {
            log::warn!("Explaining Q{} failed in chat {}: {}", position, chat_id, err);
            escape(&err.user_message())
        }
    };

    render::paginate(vec![reply])
}

async fn chat_pages(
    bot: &Bot,
    helper: &StudyHelper,
    session: &mut StudySession,
    chat_id: ChatId,
    text: &str,
) -> Vec<String> {
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

    let reply = match helper.chat(session, text).await {
        Ok(_) => session
            .transcript()
            .last()
            .map(render::render_chat_entry)
            .unwrap_or_default(),
        Err(err) => {
            log::warn!("Chat reply failed in chat {}: {}", chat_id, err);
            escape(&err.user_message())
        }
    };

    render::paginate(vec![reply])
}

fn keyboard_for(session: &StudySession) -> KeyboardMarkup {
    render::study_keyboard(session.mode, session.qa_items().len())
}

async fn save_and_show(
    bot: &Bot,
    dialogue: &StudyDialogue,
    session: StudySession,
    chat_id: ChatId,
    pages: Vec<String>,
) -> HandlerResult {
    let keyboard = keyboard_for(&session);
    save_then_send(dialogue, session, send_pages(bot, chat_id, pages, keyboard)).await
}

/// The session is stored before `send` runs, so a rejected message can't lose it.
async fn save_then_send<F>(dialogue: &StudyDialogue, session: StudySession, send: F) -> HandlerResult
where
    F: Future<Output = HandlerResult>,
{
    dialogue.update(State::Studying { session }).await?;
    send.await
}

/// Every page is HTML; the keyboard rides on the last one.
async fn send_pages(
    bot: &Bot,
    chat_id: ChatId,
    pages: Vec<String>,
    keyboard: KeyboardMarkup,
) -> HandlerResult {
    let last = pages.len().saturating_sub(1);
    for (i, page) in pages.into_iter().enumerate() {
        let request = bot.send_message(chat_id, page).parse_mode(ParseMode::Html);
        if i == last {
            request.reply_markup(keyboard.clone()).await?;
        } else {
            request.await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::study::SourceText;

    #[tokio::test]
    async fn session_survives_a_failed_send() {
        let dialogue = StudyDialogue::new(InMemStorage::<State>::new(), ChatId(42));
        let mut session = StudySession::new(StudyMode::Summary, QuestionCount::default());
        session.replace_source(SourceText::new("Mitochondria make ATP.").unwrap());

        let sent = save_then_send(&dialogue, session, async {
            Err::<(), HandlerError>("Bad Request: can't parse entities".into())
        })
        .await;
        assert!(sent.is_err());

        let saved = dialogue.get().await.unwrap();
        assert!(matches!(
            saved,
            Some(State::Studying { ref session })
                if session.source().unwrap().as_str() == "Mitochondria make ATP."
        ));
    }

    #[test]
    fn explain_outside_a_qa_quiz_gets_a_hint() {
        for mode in [StudyMode::Summary, StudyMode::McqQuiz] {
            assert_eq!(
                classify_text(mode, "explain 3"),
                StudyAction::Hint(render::EXPLAIN_ONLY_IN_QA)
            );
            assert_eq!(
                classify_text(mode, &render::explain_button_label(2)),
                StudyAction::Hint(render::EXPLAIN_ONLY_IN_QA)
            );
        }
        assert_eq!(classify_text(StudyMode::QaQuiz, "explain 3"), StudyAction::Explain(3));
    }

    #[test]
    fn commands_and_scraps_are_not_treated_as_material() {
        assert_eq!(
            classify_text(StudyMode::Summary, "/quiz"),
            StudyAction::Hint(render::UNKNOWN_COMMAND_HINT)
        );
        assert_eq!(
            classify_text(StudyMode::McqQuiz, "ok thanks"),
            StudyAction::Hint(render::SHORT_MATERIAL_HINT)
        );
        assert_eq!(
            classify_text(StudyMode::Summary, "Chloroplasts turn light into sugar."),
            StudyAction::Material
        );
    }

    #[test]
    fn buttons_and_chat_messages_are_routed() {
        assert_eq!(
            classify_text(StudyMode::QaQuiz, render::GENERATE_AGAIN),
            StudyAction::GenerateAgain
        );
        assert_eq!(
            classify_text(StudyMode::Chat, render::CHANGE_MODE),
            StudyAction::ChangeMode
        );
        assert_eq!(
            classify_text(StudyMode::Summary, render::NEW_MATERIAL),
            StudyAction::NewMaterial
        );
        assert_eq!(classify_text(StudyMode::Chat, "hi"), StudyAction::Chat);
        assert_eq!(classify_text(StudyMode::Chat, "explain 3"), StudyAction::Chat);
    }
}
