use std::sync::Arc;

use sqlx::{Row, SqlitePool};
use teloxide::{
    requests::Requester,
    types::{ChatId, Message},
    Bot,
};

use crate::{commands::RESTRICTED_COMMANDS, config::config, HandlerResult};

/// Registers the sender as admin when the provided token matches ADMIN_TOKEN.
pub async fn authenticate(
    bot: Bot,
    msg: Message,
    (token, name): (String, String),
    db: Arc<SqlitePool>,
) -> HandlerResult {
    if token != config().admin_token {
        bot.send_message(msg.chat.id, "Le token est incorrect.")
            .await?;
        return Ok(());
    }

    sqlx::query(r#"INSERT OR REPLACE INTO admins(telegram_id, "name") VALUES($1, $2)"#)
        .bind(msg.chat.id.to_string())
        .bind(&name)
        .execute(db.as_ref())
        .await?;

    bot.send_message(
        msg.chat.id,
        format!("Bienvenue {name}, tu fais désormais partie des admins."),
    )
    .await?;

    Ok(())
}

pub async fn admin_list(bot: Bot, msg: Message, db: Arc<SqlitePool>) -> HandlerResult {
    let admins = sqlx::query(r#"SELECT "name" FROM admins ORDER BY "name""#)
        .fetch_all(db.as_ref())
        .await?;

    let text = if admins.is_empty() {
        "Aucun admin enregistré.".to_owned()
    } else {
        format!(
            "Admin(s) actuel(s):\n{}",
            admins
                .into_iter()
                .map(|row| format!(" - {}", row.get::<String, _>("name")))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn admin_remove(
    bot: Bot,
    msg: Message,
    name: String,
    db: Arc<SqlitePool>,
) -> HandlerResult {
    let deleted = sqlx::query(r#"DELETE FROM admins WHERE "name" = $1"#)
        .bind(&name)
        .execute(db.as_ref())
        .await?
        .rows_affected();

    let text = if deleted == 0 {
        format!("{name} n'est pas admin.")
    } else {
        format!("{name} a été retiré(e) des admins.")
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Allows the current chat to use a restricted command.
pub async fn authorize(
    bot: Bot,
    msg: Message,
    command: String,
    db: Arc<SqlitePool>,
) -> HandlerResult {
    if !RESTRICTED_COMMANDS.iter().any(|c| c.shortand() == command) {
        bot.send_message(msg.chat.id, "Cette commande n'existe pas ou n'est pas restreinte.")
            .await?;
        return Ok(());
    }

    sqlx::query("INSERT OR IGNORE INTO authorizations(command, chat_id) VALUES($1, $2)")
        .bind(&command)
        .bind(msg.chat.id.to_string())
        .execute(db.as_ref())
        .await?;

    bot.send_message(
        msg.chat.id,
        format!("Ce groupe peut désormais utiliser la commande /{command}"),
    )
    .await?;
    Ok(())
}

pub async fn unauthorize(
    bot: Bot,
    msg: Message,
    command: String,
    db: Arc<SqlitePool>,
) -> HandlerResult {
    sqlx::query("DELETE FROM authorizations WHERE command = $1 AND chat_id = $2")
        .bind(&command)
        .bind(msg.chat.id.to_string())
        .execute(db.as_ref())
        .await?;

    bot.send_message(
        msg.chat.id,
        format!("Ce groupe ne peut désormais plus utiliser la commande /{command}"),
    )
    .await?;
    Ok(())
}

pub async fn authorizations(bot: Bot, msg: Message, db: Arc<SqlitePool>) -> HandlerResult {
    let authorizations = sqlx::query("SELECT command FROM authorizations WHERE chat_id = $1")
        .bind(msg.chat.id.to_string())
        .fetch_all(db.as_ref())
        .await?;

    let text = if authorizations.is_empty() {
        "Ce groupe ne peut utiliser aucune commande restreinte.".to_owned()
    } else {
        format!(
            "Ce groupe peut utiliser les commandes suivantes:\n{}",
            authorizations
                .into_iter()
                .map(|row| format!(" - /{}", row.get::<String, _>("command")))
                .collect::<Vec<_>>()
                .join("\n")
        )
    };

    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

pub async fn is_admin(db: &SqlitePool, chat_id: ChatId) -> bool {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM admins WHERE telegram_id = $1")
        .bind(chat_id.to_string())
        .fetch_one(db)
        .await;

    match count {
        Ok(count) => count > 0,
        Err(e) => {
            log::error!("Admin lookup failed for chat {chat_id}: {e:#?}");
            false
        }
    }
}

pub async fn is_authorized(db: &SqlitePool, chat_id: ChatId, command: &str) -> bool {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM authorizations WHERE chat_id = $1 AND command = $2",
    )
    .bind(chat_id.to_string())
    .bind(command)
    .fetch_one(db)
    .await;

    match count {
        Ok(count) => count > 0,
        Err(e) => {
            log::error!("Authorization lookup failed for chat {chat_id}: {e:#?}");
            false
        }
    }
}
