use std::sync::Arc;

use log::info;
use sqlx::SqlitePool;
use teloxide::{
    dispatching::DpHandlerDescription, prelude::*, types::Message, utils::command::BotCommands,
    Bot,
};

use crate::cmd_authentication;
use crate::cmd_poll::{self, PollState};
use crate::HandlerResult;

#[derive(BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "Ces commandes sont supportées:"
)]
pub enum Command {
    #[command(description = "affiche ce message.")]
    Help,
    #[command(description = "présente le bot.")]
    Start,
    #[command(description = "affiche l'identifiant du chat.")]
    Id,
    #[command(description = "crée un sondage illustré dans le canal.")]
    Poll,
    #[command(description = "crée un sondage chronométré avec tirage au sort parmi les votants.")]
    Tirage,
    #[command(description = "abandonne le dialogue en cours.")]
    Cancel,
    #[command(description = "s'enregistre comme admin.", parse_with = "split")]
    Authenticate { token: String, name: String },
    #[command(description = "liste les admins.")]
    AdminList,
    #[command(description = "retire un admin.")]
    AdminRemove { name: String },
    #[command(description = "autorise ce chat à utiliser une commande restreinte.")]
    Authorize { command: String },
    #[command(description = "révoque l'autorisation d'une commande pour ce chat.")]
    Unauthorize { command: String },
    #[command(description = "liste les commandes autorisées dans ce chat.")]
    Authorizations,
}

impl Command {
    pub fn shortand(&self) -> &str {
        match self {
            Self::Help => "help",
            Self::Start => "start",
            Self::Id => "id",
            Self::Poll => "poll",
            Self::Tirage => "tirage",
            Self::Cancel => "cancel",
            Self::Authenticate { .. } => "authenticate",
            Self::AdminList => "adminlist",
            Self::AdminRemove { .. } => "adminremove",
            Self::Authorize { .. } => "authorize",
            Self::Unauthorize { .. } => "unauthorize",
            Self::Authorizations => "authorizations",
        }
    }
}

/// Commands that run only in chats present in the authorizations table.
pub const RESTRICTED_COMMANDS: &[Command] = &[Command::Poll, Command::Tirage];

fn verify_authorization() -> Endpoint<'static, DependencyMap, HandlerResult, DpHandlerDescription> {
    dptree::entry().filter_async(
        |command: Command, msg: Message, db: Arc<SqlitePool>| async move {
            if !RESTRICTED_COMMANDS
                .iter()
                .any(|c| c.shortand() == command.shortand())
            {
                return true;
            }

            let authorized =
                cmd_authentication::is_authorized(db.as_ref(), msg.chat.id, command.shortand())
                    .await;
            if !authorized {
                info!(
                    "Command {} refused for chat {}",
                    command.shortand(),
                    msg.chat.id
                );
            }

            authorized
        },
    )
}

fn verify_admin() -> Endpoint<'static, DependencyMap, HandlerResult, DpHandlerDescription> {
    dptree::entry().filter_async(|msg: Message, db: Arc<SqlitePool>| async move {
        let admin = cmd_authentication::is_admin(db.as_ref(), msg.chat.id).await;
        if !admin {
            info!("Admin command refused for chat {}", msg.chat.id);
        }
        admin
    })
}

async fn help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string())
        .await?;
    Ok(())
}

async fn start(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Bonjour ! Je publie des sondages illustrés et des tirages au sort. /help pour la liste des commandes.",
    )
    .await?;
    Ok(())
}

async fn id(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, msg.chat.id.to_string())
        .await?;
    Ok(())
}

/// Replies to a forwarded poll with a closed copy, to preview its final look.
async fn preview(bot: Bot, msg: Message) -> HandlerResult {
    let Some(poll) = msg.poll() else {
        return Ok(());
    };

    bot.send_poll(
        msg.chat.id,
        poll.question.clone(),
        poll.options.iter().map(|option| option.text.clone()),
    )
    .is_closed(true)
    .reply_to_message_id(msg.id)
    .await?;

    Ok(())
}

pub fn command_message_handler(
) -> Endpoint<'static, DependencyMap, HandlerResult, DpHandlerDescription> {
    dptree::entry()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .branch(
                    verify_authorization()
                        .branch(dptree::case![Command::Poll].endpoint(cmd_poll::start_poll_dialogue))
                        .branch(
                            dptree::case![Command::Tirage]
                                .endpoint(cmd_poll::start_tirage_dialogue),
                        ),
                )
                .branch(dptree::case![Command::Cancel].endpoint(cmd_poll::cancel_dialogue))
                .branch(dptree::case![Command::Help].endpoint(help))
                .branch(dptree::case![Command::Start].endpoint(start))
                .branch(dptree::case![Command::Id].endpoint(id))
                .branch(
                    dptree::case![Command::Authenticate { token, name }]
                        .endpoint(cmd_authentication::authenticate),
                )
                .branch(
                    verify_admin()
                        .branch(
                            dptree::case![Command::AdminList]
                                .endpoint(cmd_authentication::admin_list),
                        )
                        .branch(
                            dptree::case![Command::AdminRemove { name }]
                                .endpoint(cmd_authentication::admin_remove),
                        )
                        .branch(
                            dptree::case![Command::Authorize { command }]
                                .endpoint(cmd_authentication::authorize),
                        )
                        .branch(
                            dptree::case![Command::Unauthorize { command }]
                                .endpoint(cmd_authentication::unauthorize),
                        )
                        .branch(
                            dptree::case![Command::Authorizations]
                                .endpoint(cmd_authentication::authorizations),
                        ),
                ),
        )
        .branch(
            dptree::case![PollState::ReceiveQuestion { message_id, draft }]
                .endpoint(cmd_poll::receive_question),
        )
        .branch(
            dptree::case![PollState::ReceivePhoto { message_id, draft }]
                .endpoint(cmd_poll::receive_photo),
        )
        .branch(
            dptree::case![PollState::ReceiveFirstOption { message_id, draft }]
                .endpoint(cmd_poll::receive_first_option),
        )
        .branch(
            dptree::case![PollState::ReceiveSecondOption { message_id, draft }]
                .endpoint(cmd_poll::receive_second_option),
        )
        .branch(
            dptree::case![PollState::ReceiveDescription { message_id, draft }]
                .endpoint(cmd_poll::receive_description),
        )
        .branch(
            dptree::case![PollState::ReceiveDuration { message_id, draft }]
                .endpoint(cmd_poll::receive_duration),
        )
        .branch(
            dptree::entry()
                .filter(|msg: Message| msg.poll().is_some())
                .endpoint(preview),
        )
}

pub fn command_callback_query_handler(
) -> Endpoint<'static, DependencyMap, HandlerResult, DpHandlerDescription> {
    dptree::entry()
        .branch(
            dptree::case![PollState::ReceiveDescription { message_id, draft }]
                .endpoint(cmd_poll::skip_description),
        )
        .branch(
            dptree::case![PollState::ReceiveDuration { message_id, draft }]
                .endpoint(cmd_poll::skip_duration),
        )
}
