const MAX_DURATION_MIN: u64 = 7 * 24 * 60; // a poll never runs longer than a week

use teloxide::{
    dispatching::dialogue::{GetChatId, InMemStorage},
    payloads::{SendMessageSetters, SendPhotoSetters, SendPollSetters},
    prelude::Dialogue,
    requests::Requester,
    types::{
        CallbackQuery, ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, Message,
        MessageId, ReplyMarkup,
    },
    Bot,
};

use crate::config::settings;
use crate::tracker::{close_poll_later, PollTracker, TrackedPoll};
use crate::HandlerResult;

/// Which flavor of poll the dialogue is building.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollKind {
    /// Published and left open.
    Classic,
    /// Closed after a delay, with a winner announcement and a prize draw.
    Tirage,
}

/// Scratch record filled in over the dialogue, one per conversation.
#[derive(Clone, Debug)]
pub struct PollDraft {
    pub kind: PollKind,
    pub question: String,
    /// Telegram file id of the illustration, re-sent as-is to the channel.
    pub photo_id: String,
    pub options: Vec<String>,
    pub description: Option<String>,
    pub duration_min: Option<u64>,
}

impl PollDraft {
    fn new(kind: PollKind) -> Self {
        Self {
            kind,
            question: String::new(),
            photo_id: String::new(),
            options: Vec::new(),
            description: None,
            duration_min: None,
        }
    }
}

#[derive(Default, Clone, Debug)]
pub enum PollState {
    #[default]
    Start,
    ReceiveQuestion {
        /// ID of the last prompt message, deleted once answered.
        message_id: MessageId,
        draft: PollDraft,
    },
    ReceivePhoto {
        message_id: MessageId,
        draft: PollDraft,
    },
    ReceiveFirstOption {
        message_id: MessageId,
        draft: PollDraft,
    },
    ReceiveSecondOption {
        message_id: MessageId,
        draft: PollDraft,
    },
    ReceiveDescription {
        message_id: MessageId,
        draft: PollDraft,
    },
    ReceiveDuration {
        message_id: MessageId,
        draft: PollDraft,
    },
}
pub type PollDialogue = Dialogue<PollState, InMemStorage<PollState>>;

pub async fn start_poll_dialogue(bot: Bot, msg: Message, dialogue: PollDialogue) -> HandlerResult {
    start_dialogue(bot, msg, dialogue, PollKind::Classic).await
}

pub async fn start_tirage_dialogue(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
) -> HandlerResult {
    start_dialogue(bot, msg, dialogue, PollKind::Tirage).await
}

/// Starts the dialogue by asking for the poll question.
async fn start_dialogue(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
    kind: PollKind,
) -> HandlerResult {
    log::info!("Starting {kind:?} poll dialogue in chat {}", msg.chat.id);

    log::debug!("Removing trigger message");
    bot.delete_message(msg.chat.id, msg.id).await?;

    let prompt = bot
        .send_message(msg.chat.id, "Quelle est la question du sondage ?")
        .await?;

    dialogue
        .update(PollState::ReceiveQuestion {
            message_id: prompt.id,
            draft: PollDraft::new(kind),
        })
        .await?;

    Ok(())
}

/// Aborts a dialogue in progress, whatever its state.
pub async fn cancel_dialogue(bot: Bot, msg: Message, dialogue: PollDialogue) -> HandlerResult {
    log::info!("Cancelling poll dialogue in chat {}", msg.chat.id);

    bot.delete_message(msg.chat.id, msg.id).await?;
    bot.send_message(msg.chat.id, "Dialogue abandonné.").await?;

    dialogue.update(PollState::Start).await?;
    Ok(())
}

pub async fn receive_question(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
    (message_id, mut draft): (MessageId, PollDraft),
) -> HandlerResult {
    if let Some(text) = msg.text() {
        draft.question = text.to_owned();

        log::debug!("Removing question prompt and answer");
        bot.delete_message(dialogue.chat_id(), message_id).await?;
        bot.delete_message(dialogue.chat_id(), msg.id).await?;

        let prompt = bot
            .send_message(
                dialogue.chat_id(),
                "Envoyez l'image qui illustrera le sondage.",
            )
            .await?;

        dialogue
            .update(PollState::ReceivePhoto {
                message_id: prompt.id,
                draft,
            })
            .await?;
    }

    Ok(())
}

pub async fn receive_photo(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
    (message_id, mut draft): (MessageId, PollDraft),
) -> HandlerResult {
    // Telegram sends several sizes, the last one is the largest.
    if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
        draft.photo_id = photo.file.id.clone();

        log::debug!("Removing photo prompt and answer");
        bot.delete_message(dialogue.chat_id(), message_id).await?;
        bot.delete_message(dialogue.chat_id(), msg.id).await?;

        let prompt = bot
            .send_message(dialogue.chat_id(), "Première option :")
            .await?;

        dialogue
            .update(PollState::ReceiveFirstOption {
                message_id: prompt.id,
                draft,
            })
            .await?;
    }

    Ok(())
}

pub async fn receive_first_option(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
    (message_id, mut draft): (MessageId, PollDraft),
) -> HandlerResult {
    if let Some(text) = msg.text() {
        draft.options.push(text.to_owned());

        log::debug!("Removing first option prompt and answer");
        bot.delete_message(dialogue.chat_id(), message_id).await?;
        bot.delete_message(dialogue.chat_id(), msg.id).await?;

        let prompt = bot
            .send_message(dialogue.chat_id(), "Deuxième option :")
            .await?;

        dialogue
            .update(PollState::ReceiveSecondOption {
                message_id: prompt.id,
                draft,
            })
            .await?;
    }

    Ok(())
}

pub async fn receive_second_option(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
    (message_id, mut draft): (MessageId, PollDraft),
) -> HandlerResult {
    if let Some(text) = msg.text() {
        draft.options.push(text.to_owned());

        log::debug!("Removing second option prompt and answer");
        bot.delete_message(dialogue.chat_id(), message_id).await?;
        bot.delete_message(dialogue.chat_id(), msg.id).await?;

        let prompt = bot
            .send_message(dialogue.chat_id(), "Ajoutez une description (facultatif).")
            .reply_markup(ReplyMarkup::InlineKeyboard(skip_keyboard()))
            .await?;

        dialogue
            .update(PollState::ReceiveDescription {
                message_id: prompt.id,
                draft,
            })
            .await?;
    }

    Ok(())
}

pub async fn receive_description(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
    (message_id, mut draft): (MessageId, PollDraft),
    tracker: PollTracker,
) -> HandlerResult {
    if let Some(text) = msg.text() {
        draft.description = Some(text.to_owned());

        log::debug!("Removing description prompt and answer");
        bot.delete_message(dialogue.chat_id(), message_id).await?;
        bot.delete_message(dialogue.chat_id(), msg.id).await?;

        after_description(bot, dialogue, draft, tracker).await?;
    }

    Ok(())
}

/// Handles the skip button under the description prompt.
pub async fn skip_description(
    bot: Bot,
    callback_query: CallbackQuery,
    dialogue: PollDialogue,
    (message_id, draft): (MessageId, PollDraft),
    tracker: PollTracker,
) -> HandlerResult {
    if callback_query.chat_id().is_some() {
        log::debug!("Removing description prompt");
        bot.delete_message(dialogue.chat_id(), message_id).await?;

        after_description(bot, dialogue, draft, tracker).await?;
    }

    Ok(())
}

/// A classic poll is complete once the description step is done; a tirage
/// still needs its duration.
async fn after_description(
    bot: Bot,
    dialogue: PollDialogue,
    draft: PollDraft,
    tracker: PollTracker,
) -> HandlerResult {
    match draft.kind {
        PollKind::Classic => publish_and_reset(bot, dialogue, tracker, draft).await,
        PollKind::Tirage => {
            let prompt = bot
                .send_message(dialogue.chat_id(), "Durée du sondage, en minutes ?")
                .reply_markup(ReplyMarkup::InlineKeyboard(skip_keyboard()))
                .await?;

            dialogue
                .update(PollState::ReceiveDuration {
                    message_id: prompt.id,
                    draft,
                })
                .await?;

            Ok(())
        }
    }
}

pub async fn receive_duration(
    bot: Bot,
    msg: Message,
    dialogue: PollDialogue,
    (message_id, mut draft): (MessageId, PollDraft),
    tracker: PollTracker,
) -> HandlerResult {
    if let Some(text) = msg.text() {
        let Some(minutes) = parse_duration_min(text) else {
            bot.send_message(
                dialogue.chat_id(),
                format!("Durée invalide, donnez un nombre de minutes entre 1 et {MAX_DURATION_MIN}."),
            )
            .await?;
            return Ok(());
        };
        draft.duration_min = Some(minutes);

        log::debug!("Removing duration prompt and answer");
        bot.delete_message(dialogue.chat_id(), message_id).await?;
        bot.delete_message(dialogue.chat_id(), msg.id).await?;

        publish_and_reset(bot, dialogue, tracker, draft).await?;
    }

    Ok(())
}

/// Handles the skip button under the duration prompt, falling back to the
/// configured default duration.
pub async fn skip_duration(
    bot: Bot,
    callback_query: CallbackQuery,
    dialogue: PollDialogue,
    (message_id, draft): (MessageId, PollDraft),
    tracker: PollTracker,
) -> HandlerResult {
    if callback_query.chat_id().is_some() {
        log::debug!("Removing duration prompt");
        bot.delete_message(dialogue.chat_id(), message_id).await?;

        publish_and_reset(bot, dialogue, tracker, draft).await?;
    }

    Ok(())
}

/// Publishes the draft to the configured channel, registers the poll for vote
/// tracking, arms the closing timer for a tirage and resets the dialogue.
async fn publish_and_reset(
    bot: Bot,
    dialogue: PollDialogue,
    tracker: PollTracker,
    draft: PollDraft,
) -> HandlerResult {
    let channel = ChatId(settings().channel_id);

    log::debug!("Sending illustration to {channel}");
    let mut photo = bot.send_photo(channel, InputFile::file_id(draft.photo_id.clone()));
    if let Some(description) = &draft.description {
        photo = photo.caption(description.clone());
    }
    photo.await?;

    log::debug!("Sending poll to {channel}");
    let sent = bot
        .send_poll(channel, draft.question.clone(), draft.options.clone())
        .is_anonymous(false)
        .allows_multiple_answers(true)
        .await?;

    let Some(poll) = sent.poll() else {
        log::error!("Published message carries no poll, nothing to track");
        return Ok(());
    };

    tracker.register(
        poll.id.clone(),
        TrackedPoll::new(draft.options.clone(), channel, sent.id),
    );

    let confirmation = match draft.kind {
        PollKind::Classic => {
            log::info!("Poll {} published", poll.id);
            "Sondage publié !".to_owned()
        }
        PollKind::Tirage => {
            let minutes = draft
                .duration_min
                .unwrap_or(settings().default_duration_min);
            log::info!("Poll {} published, closing in {} minutes", poll.id, minutes);
            tokio::spawn(close_poll_later(
                bot.clone(),
                tracker.clone(),
                poll.id.clone(),
                minutes,
            ));
            format!("Sondage publié, tirage au sort dans {minutes} minutes !")
        }
    };

    bot.send_message(dialogue.chat_id(), confirmation).await?;

    log::debug!("Resetting dialogue status");
    dialogue.update(PollState::Start).await?;

    Ok(())
}

fn skip_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback("Passer", "skip")]])
}

fn parse_duration_min(text: &str) -> Option<u64> {
    let minutes = text.trim().parse::<u64>().ok()?;
    (1..=MAX_DURATION_MIN).contains(&minutes).then_some(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_minutes() {
        assert_eq!(parse_duration_min("15"), Some(15));
        assert_eq!(parse_duration_min(" 120 "), Some(120));
    }

    #[test]
    fn rejects_zero_and_garbage() {
        assert_eq!(parse_duration_min("0"), None);
        assert_eq!(parse_duration_min("-5"), None);
        assert_eq!(parse_duration_min("douze"), None);
        assert_eq!(parse_duration_min(""), None);
    }

    #[test]
    fn caps_duration_at_one_week() {
        assert_eq!(parse_duration_min("10080"), Some(MAX_DURATION_MIN));
        assert_eq!(parse_duration_min("10081"), None);
    }
}
