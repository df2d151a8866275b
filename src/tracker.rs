use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::{seq::SliceRandom, thread_rng, Rng};
use teloxide::{
    payloads::SendMessageSetters,
    requests::Requester,
    types::{ChatId, MessageId, ParseMode, PollAnswer, UserId},
    utils::html::escape,
    Bot,
};

use crate::HandlerResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Voter {
    pub user_id: UserId,
    pub name: String,
}

/// A published poll the bot is still watching. Lives in process memory only,
/// a restart forgets every open poll.
#[derive(Debug, Clone)]
pub struct TrackedPoll {
    /// Option labels, echoed back when votes come in.
    pub options: Vec<String>,
    pub chat_id: ChatId,
    /// ID of the message carrying the poll. Used to stop it.
    pub message_id: MessageId,
    /// One voter list per option, parallel to `options`.
    pub voters: Vec<Vec<Voter>>,
}

impl TrackedPoll {
    pub fn new(options: Vec<String>, chat_id: ChatId, message_id: MessageId) -> Self {
        let voters = vec![Vec::new(); options.len()];
        Self {
            options,
            chat_id,
            message_id,
            voters,
        }
    }
}

/// What a recorded answer should produce in the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEcho {
    pub chat_id: ChatId,
    /// Labels the voter selected. Empty for a retraction.
    pub chosen: Vec<String>,
}

/// Registry of open polls, keyed by Telegram poll id and shared between the
/// dispatcher handlers and the closing tasks.
#[derive(Clone, Default)]
pub struct PollTracker {
    polls: Arc<Mutex<HashMap<String, TrackedPoll>>>,
}

impl PollTracker {
    pub fn register(&self, poll_id: String, poll: TrackedPoll) {
        self.polls.lock().insert(poll_id, poll);
    }

    /// Removes a poll from the registry, typically when its timer fires.
    pub fn take(&self, poll_id: &str) -> Option<TrackedPoll> {
        self.polls.lock().remove(poll_id)
    }

    /// Re-files the voter under each selected option and reports what should
    /// be echoed. Returns `None` for a poll the bot does not track, answers
    /// for old polls arrive after every restart.
    pub fn record_answer(
        &self,
        poll_id: &str,
        voter: Voter,
        option_ids: &[i32],
    ) -> Option<VoteEcho> {
        let mut polls = self.polls.lock();
        let tracked = polls.get_mut(poll_id)?;

        for list in &mut tracked.voters {
            list.retain(|v| v.user_id != voter.user_id);
        }

        let mut chosen = Vec::new();
        for &id in option_ids {
            let Some(label) = tracked.options.get(id as usize) else {
                continue;
            };
            chosen.push(label.clone());
            tracked.voters[id as usize].push(voter.clone());
        }

        Some(VoteEcho {
            chat_id: tracked.chat_id,
            chosen,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    NoVotes,
    Draw,
    Winner { option: usize, votes: usize },
}

/// Scans the per-option vote counts, keeping the running maximum. A shared
/// maximum is a draw.
pub fn decide(voters: &[Vec<Voter>]) -> Outcome {
    let Some(first) = voters.first() else {
        return Outcome::NoVotes;
    };

    let mut best_option = 0;
    let mut best_votes = first.len();
    let mut tied = false;
    for (option, list) in voters.iter().enumerate().skip(1) {
        match list.len().cmp(&best_votes) {
            std::cmp::Ordering::Greater => {
                best_option = option;
                best_votes = list.len();
                tied = false;
            }
            std::cmp::Ordering::Equal => tied = true,
            std::cmp::Ordering::Less => {}
        }
    }

    if best_votes == 0 {
        Outcome::NoVotes
    } else if tied {
        Outcome::Draw
    } else {
        Outcome::Winner {
            option: best_option,
            votes: best_votes,
        }
    }
}

/// Uniformly samples the prize recipient among the winning side.
pub fn pick_prize<'a, R: Rng + ?Sized>(voters: &'a [Voter], rng: &mut R) -> Option<&'a Voter> {
    voters.choose(rng)
}

pub fn mention(voter: &Voter) -> String {
    format!(
        r#"<a href="tg://user?id={}">{}</a>"#,
        voter.user_id.0,
        escape(&voter.name)
    )
}

/// Builds the closing announcement for a finished poll.
pub fn announcement<R: Rng + ?Sized>(poll: &TrackedPoll, rng: &mut R) -> String {
    match decide(&poll.voters) {
        Outcome::NoVotes => "Le sondage est terminé, mais personne n'a voté…".to_owned(),
        Outcome::Draw => {
            "Le sondage est terminé sur une égalité, pas de gagnant cette fois.".to_owned()
        }
        Outcome::Winner { option, votes } => {
            let mut text = format!(
                "Le sondage est terminé ! «{}» l'emporte avec {} voix.",
                escape(&poll.options[option]),
                votes
            );
            if let Some(lucky) = pick_prize(&poll.voters[option], rng) {
                text.push_str(&format!(
                    "\nFélicitations à {}, tiré au sort parmi les votants gagnants !",
                    mention(lucky)
                ));
            }
            text
        }
    }
}

/// Summarizes a vote in the channel, like the poll itself non-anonymously.
pub async fn receive_poll_answer(
    bot: Bot,
    answer: PollAnswer,
    tracker: PollTracker,
) -> HandlerResult {
    let voter = Voter {
        user_id: answer.user.id,
        name: answer.user.full_name(),
    };

    let Some(echo) = tracker.record_answer(&answer.poll_id, voter.clone(), &answer.option_ids)
    else {
        log::debug!("Ignoring answer for untracked poll {}", answer.poll_id);
        return Ok(());
    };

    let text = if echo.chosen.is_empty() {
        format!("{} a retiré son vote.", mention(&voter))
    } else {
        format!(
            "{} a voté {} !",
            mention(&voter),
            echo.chosen
                .iter()
                .map(|label| format!("«{}»", escape(label)))
                .collect::<Vec<_>>()
                .join(" et ")
        )
    };

    bot.send_message(echo.chat_id, text)
        .parse_mode(ParseMode::Html)
        .await?;

    Ok(())
}

/// Closes a poll once its timer fires and announces the outcome. Runs in a
/// spawned task, errors are logged since there is nowhere to propagate them.
pub async fn close_poll_later(bot: Bot, tracker: PollTracker, poll_id: String, duration_min: u64) {
    tokio::time::sleep(std::time::Duration::from_secs(duration_min * 60)).await;

    let Some(tracked) = tracker.take(&poll_id) else {
        log::debug!("Poll {} was already gone when its timer fired", poll_id);
        return;
    };

    log::info!("Closing poll {} after {} minutes", poll_id, duration_min);
    if let Err(e) = bot.stop_poll(tracked.chat_id, tracked.message_id).await {
        log::error!("Could not stop poll {}: {e:#?}", poll_id);
    }

    let text = announcement(&tracked, &mut thread_rng());
    if let Err(e) = bot
        .send_message(tracked.chat_id, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        log::error!("Could not announce the outcome of poll {}: {e:#?}", poll_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn voter(id: u64, name: &str) -> Voter {
        Voter {
            user_id: UserId(id),
            name: name.to_owned(),
        }
    }

    fn tracked() -> TrackedPoll {
        TrackedPoll::new(
            vec!["Oui".to_owned(), "Non".to_owned()],
            ChatId(-100),
            MessageId(42),
        )
    }

    #[test]
    fn vote_lands_under_the_selected_option() {
        let tracker = PollTracker::default();
        tracker.register("p1".to_owned(), tracked());

        let echo = tracker.record_answer("p1", voter(1, "Ada"), &[0]).unwrap();
        assert_eq!(echo.chosen, vec!["Oui".to_owned()]);

        let poll = tracker.take("p1").unwrap();
        assert_eq!(poll.voters[0], vec![voter(1, "Ada")]);
        assert!(poll.voters[1].is_empty());
    }

    #[test]
    fn answer_for_untracked_poll_is_ignored() {
        let tracker = PollTracker::default();
        assert!(tracker.record_answer("p1", voter(1, "Ada"), &[0]).is_none());
    }

    #[test]
    fn revote_moves_the_voter() {
        let tracker = PollTracker::default();
        tracker.register("p1".to_owned(), tracked());

        tracker.record_answer("p1", voter(1, "Ada"), &[0]).unwrap();
        tracker.record_answer("p1", voter(1, "Ada"), &[1]).unwrap();

        let poll = tracker.take("p1").unwrap();
        assert!(poll.voters[0].is_empty());
        assert_eq!(poll.voters[1], vec![voter(1, "Ada")]);
    }

    #[test]
    fn empty_answer_retracts_the_vote() {
        let tracker = PollTracker::default();
        tracker.register("p1".to_owned(), tracked());

        tracker.record_answer("p1", voter(1, "Ada"), &[0]).unwrap();
        let echo = tracker.record_answer("p1", voter(1, "Ada"), &[]).unwrap();
        assert!(echo.chosen.is_empty());

        let poll = tracker.take("p1").unwrap();
        assert!(poll.voters.iter().all(|list| list.is_empty()));
    }

    #[test]
    fn out_of_range_option_is_skipped() {
        let tracker = PollTracker::default();
        tracker.register("p1".to_owned(), tracked());

        let echo = tracker.record_answer("p1", voter(1, "Ada"), &[7]).unwrap();
        assert!(echo.chosen.is_empty());
    }

    #[test]
    fn clear_majority_wins() {
        let mut poll = tracked();
        poll.voters[0] = vec![voter(1, "Ada"), voter(2, "Grace")];
        poll.voters[1] = vec![voter(3, "Alan")];

        assert_eq!(
            decide(&poll.voters),
            Outcome::Winner {
                option: 0,
                votes: 2
            }
        );
    }

    #[test]
    fn equal_counts_are_a_draw() {
        let mut poll = tracked();
        poll.voters[0] = vec![voter(1, "Ada")];
        poll.voters[1] = vec![voter(2, "Grace")];

        assert_eq!(decide(&poll.voters), Outcome::Draw);
    }

    #[test]
    fn no_votes_has_no_winner() {
        assert_eq!(decide(&tracked().voters), Outcome::NoVotes);
    }

    #[test]
    fn prize_voter_comes_from_the_winning_side() {
        let winners = vec![voter(1, "Ada"), voter(2, "Grace"), voter(3, "Alan")];
        let mut rng = StdRng::seed_from_u64(7);

        let lucky = pick_prize(&winners, &mut rng).unwrap();
        assert!(winners.contains(lucky));
        assert!(pick_prize(&[], &mut rng).is_none());
    }

    #[test]
    fn announcement_names_the_winning_option() {
        let mut poll = tracked();
        poll.voters[1] = vec![voter(4, "Linus")];

        let text = announcement(&poll, &mut StdRng::seed_from_u64(1));
        assert!(text.contains("«Non»"));
        assert!(text.contains("1 voix"));
        assert!(text.contains("tg://user?id=4"));
    }

    #[test]
    fn mention_escapes_html_in_names() {
        let text = mention(&voter(9, "<Ada & Co>"));
        assert!(text.contains("&lt;Ada &amp; Co&gt;"));
    }
}
