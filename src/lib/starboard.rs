//! Reposts messages that collect enough ⭐ reactions into the starboard channel.
//!
//! Every entry gets two messages on the board: a header with the star count and the
//! reposted content with a link back to the original.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::PythonistaError;
use crate::serenity;
use crate::setup::StarboardConfig;
use serenity::ChannelId;
use serenity::CreateActionRow;
use serenity::CreateButton;
use serenity::CreateEmbed;
use serenity::CreateEmbedAuthor;
use serenity::CreateEmbedFooter;
use serenity::CreateMessage;
use serenity::EditMessage;
use serenity::MessageId;
use serenity::Reaction;
use serenity::ReactionType;
use serenity::UserId;

pub const STAR_EMOJI: &str = "⭐";
const EMBED_COLOUR: u32 = 0xFFFF00;
/// `strftime` format of the content footer.
const FOOTER_TIME_FORMAT: &str = "%m/%d/%Y %I:%M %p";

/// A message that made it onto the starboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarboardEntry {
    /// The starred message.
    pub msg_id: MessageId,
    /// Channel of the starred message.
    pub channel_id: ChannelId,
    pub stars: i64,
    /// Header message on the board.
    pub bot_message_id: MessageId,
    /// Reposted content on the board.
    pub bot_content_id: MessageId,
}

/// Where starboard entries and the users who starred them are kept.
///
/// Star counts only change through [StarStore::increment_stars] and
/// [StarStore::decrement_stars], so concurrent reactions can't lose updates.
#[async_trait]
pub trait StarStore: Debug + Send + Sync {
    async fn entry(&self, msg: MessageId) -> Result<Option<StarboardEntry>, PythonistaError>;
    /// `false` if there already is an entry for the message.
    async fn add_entry(&self, entry: &StarboardEntry) -> Result<bool, PythonistaError>;
    /// Record starers, ignoring the ones already recorded.
    async fn add_starers(&self, msg: MessageId, users: &[UserId]) -> Result<(), PythonistaError>;
    /// `false` if the user already starred the message.
    async fn add_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError>;
    /// `false` if the user wasn't a starer.
    async fn remove_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError>;
    /// The new count, or `None` if the entry is gone.
    async fn increment_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError>;
    /// The new count, or `None` if the entry is gone.
    async fn decrement_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError>;
    /// Delete an entry along with its starers.
    async fn delete_entry(&self, msg: MessageId) -> Result<(), PythonistaError>;
}

/// [StarStore] backed by the `starboard_entries` and `starers` tables.
#[derive(Debug, Clone)]
pub struct PgStarStore {
    pool: PgPool,
}

impl PgStarStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    msg_id: i64,
    bot_message_id: i64,
    channel: i64,
    stars: i64,
    bot_content_id: i64,
}

impl From<EntryRow> for StarboardEntry {
    fn from(row: EntryRow) -> Self {
        Self {
            msg_id: MessageId::new(row.msg_id as u64),
            channel_id: ChannelId::new(row.channel as u64),
            stars: row.stars,
            bot_message_id: MessageId::new(row.bot_message_id as u64),
            bot_content_id: MessageId::new(row.bot_content_id as u64),
        }
    }
}

/// Postgres has no unsigned integers, snowflakes fit in an i64.
fn sql_id(id: impl Into<u64>) -> i64 {
    id.into() as i64
}

#[async_trait]
impl StarStore for PgStarStore {
    async fn entry(&self, msg: MessageId) -> Result<Option<StarboardEntry>, PythonistaError> {
        let row: Option<EntryRow> =
            sqlx::query_as("SELECT * FROM starboard_entries WHERE msg_id = $1")
                .bind(sql_id(msg))
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(StarboardEntry::from))
    }

    async fn add_entry(&self, entry: &StarboardEntry) -> Result<bool, PythonistaError> {
        let done = sqlx::query(
            "INSERT INTO starboard_entries (msg_id, bot_message_id, channel, stars, bot_content_id)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (msg_id) DO NOTHING",
        )
        .bind(sql_id(entry.msg_id))
        .bind(sql_id(entry.bot_message_id))
        .bind(sql_id(entry.channel_id))
        .bind(entry.stars)
        .bind(sql_id(entry.bot_content_id))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn add_starers(&self, msg: MessageId, users: &[UserId]) -> Result<(), PythonistaError> {
        let mut tx = self.pool.begin().await?;
        for &user in users {
            sqlx::query(
                "INSERT INTO starers (user_id, msg_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(sql_id(user))
            .bind(sql_id(msg))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn add_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError> {
        let done = sqlx::query(
            "INSERT INTO starers (user_id, msg_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(sql_id(user))
        .bind(sql_id(msg))
        .execute(&self.pool)
        .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn remove_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError> {
        let done = sqlx::query("DELETE FROM starers WHERE msg_id = $1 AND user_id = $2")
            .bind(sql_id(msg))
            .bind(sql_id(user))
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn increment_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError> {
        let stars = sqlx::query_scalar(
            "UPDATE starboard_entries SET stars = stars + 1 WHERE msg_id = $1 RETURNING stars",
        )
        .bind(sql_id(msg))
        .fetch_optional(&self.pool)
        .await?;
        Ok(stars)
    }

    async fn decrement_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError> {
        let stars = sqlx::query_scalar(
            "UPDATE starboard_entries SET stars = stars - 1 WHERE msg_id = $1 RETURNING stars",
        )
        .bind(sql_id(msg))
        .fetch_optional(&self.pool)
        .await?;
        Ok(stars)
    }

    async fn delete_entry(&self, msg: MessageId) -> Result<(), PythonistaError> {
        sqlx::query("DELETE FROM starboard_entries WHERE msg_id = $1")
            .bind(sql_id(msg))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Emoji shown in front of the star count.
pub fn star_tier(stars: i64) -> &'static str {
    match stars {
        ..=2 => "✨",
        ..=4 => "💫",
        ..=6 => "⭐",
        _ => "🌟",
    }
}

/// Content of the header message.
pub fn header(stars: i64, channel: ChannelId, msg: MessageId) -> String {
    format!("**{}** {stars} in: <#{channel}> ID: {msg}", star_tier(stars))
}

fn is_star(emoji: &ReactionType) -> bool {
    matches!(emoji, ReactionType::Unicode(e) if e == STAR_EMOJI)
}

/// What a new star did to the stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StarOutcome {
    /// The user already starred this message.
    AlreadyStarred,
    /// The entry now has one more star.
    Counted(StarboardEntry),
    /// The message isn't on the board yet.
    NoEntry,
}

/// What a removed star did to the stored state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnstarOutcome {
    /// Not on the board, or the user never starred it.
    Ignored,
    /// The entry has one less star.
    Counted(StarboardEntry),
    /// The last star is gone and the entry was deleted.
    Removed(StarboardEntry),
}

/// A configured starboard.
#[derive(Debug, Clone)]
pub struct Starboard {
    store: Arc<dyn StarStore>,
    channel: ChannelId,
    entry_requirement: u64,
    remove_on_delete: bool,
}

impl Starboard {
    /// `None` when no starboard channel is configured.
    pub fn new(store: Arc<dyn StarStore>, config: &StarboardConfig) -> Option<Self> {
        Some(Self {
            store,
            channel: config.channel?,
            entry_requirement: config.entry_requirement,
            remove_on_delete: config.remove_on_delete,
        })
    }

    /// Whether a message with `stars` stars deserves an entry.
    pub fn qualifies(&self, stars: u64) -> bool {
        stars >= self.entry_requirement
    }

    /// Count a star on a message that may already be on the board.
    pub async fn record_star(
        &self,
        msg: MessageId,
        user: UserId,
    ) -> Result<StarOutcome, PythonistaError> {
        let Some(mut entry) = self.store.entry(msg).await? else {
            return Ok(StarOutcome::NoEntry);
        };
        if !self.store.add_starer(msg, user).await? {
            return Ok(StarOutcome::AlreadyStarred);
        }

        let Some(stars) = self.store.increment_stars(msg).await? else {
            return Ok(StarOutcome::NoEntry);
        };
        entry.stars = stars;
        Ok(StarOutcome::Counted(entry))
    }

    /// Save a new entry and everyone who starred it so far.
    ///
    /// `false` when another entry for the message got there first.
    pub async fn create_entry(
        &self,
        entry: &StarboardEntry,
        starers: &[UserId],
    ) -> Result<bool, PythonistaError> {
        if !self.store.add_entry(entry).await? {
            return Ok(false);
        }
        self.store.add_starers(entry.msg_id, starers).await?;
        Ok(true)
    }

    /// Take back a star.
    pub async fn record_unstar(
        &self,
        msg: MessageId,
        user: UserId,
    ) -> Result<UnstarOutcome, PythonistaError> {
        let Some(mut entry) = self.store.entry(msg).await? else {
            return Ok(UnstarOutcome::Ignored);
        };
        if !self.store.remove_starer(msg, user).await? {
            return Ok(UnstarOutcome::Ignored);
        }

        let Some(stars) = self.store.decrement_stars(msg).await? else {
            return Ok(UnstarOutcome::Ignored);
        };
        entry.stars = stars;
        if stars <= 0 {
            self.store.delete_entry(msg).await?;
            return Ok(UnstarOutcome::Removed(entry));
        }
        Ok(UnstarOutcome::Counted(entry))
    }

    /// Drop the entry of a deleted message, if the board removes those.
    pub async fn forget(&self, msg: MessageId) -> Result<Option<StarboardEntry>, PythonistaError> {
        if !self.remove_on_delete {
            return Ok(None);
        }
        let Some(entry) = self.store.entry(msg).await? else {
            return Ok(None);
        };
        self.store.delete_entry(msg).await?;
        Ok(Some(entry))
    }

    /// Handle a reaction being added anywhere the bot can see.
    pub async fn handle_star(
        &self,
        ctx: &serenity::Context,
        reaction: &Reaction,
    ) -> Result<(), PythonistaError> {
        if !is_star(&reaction.emoji) || reaction.channel_id == self.channel {
            return Ok(());
        }
        let Some(user) = reaction.user_id else {
            return Ok(());
        };

        match self.record_star(reaction.message_id, user).await? {
            StarOutcome::AlreadyStarred => Ok(()),
            StarOutcome::Counted(entry) => self.edit_header(ctx, &entry).await,
            StarOutcome::NoEntry => self.try_create(ctx, reaction, user).await,
        }
    }

    /// Put a message on the board if it has enough stars.
    async fn try_create(
        &self,
        ctx: &serenity::Context,
        reaction: &Reaction,
        user: UserId,
    ) -> Result<(), PythonistaError> {
        let message = reaction.channel_id.message(ctx, reaction.message_id).await?;
        let count = message
            .reactions
            .iter()
            .find(|r| is_star(&r.reaction_type))
            .map_or(0, |r| r.count);
        if !self.qualifies(count) {
            return Ok(());
        }

        let starers = star_reactors(ctx, &message).await?;
        let stars = count as i64;

        let header_msg = self
            .channel
            .say(ctx, header(stars, message.channel_id, message.id))
            .await?;

        let time = chrono::Local::now().format(FOOTER_TIME_FORMAT).to_string();
        let embed = CreateEmbed::new()
            .colour(EMBED_COLOUR)
            .author(CreateEmbedAuthor::new(message.author.display_name()).icon_url(message.author.face()))
            .description(message.content_safe(ctx))
            .footer(CreateEmbedFooter::new(time));
        let jump = CreateButton::new_link(message.link()).label("Jump to message");
        let content_msg = self
            .channel
            .send_message(
                ctx,
                CreateMessage::new()
                    .embed(embed)
                    .components(vec![CreateActionRow::Buttons(vec![jump])]),
            )
            .await?;

        let entry = StarboardEntry {
            msg_id: message.id,
            channel_id: message.channel_id,
            stars,
            bot_message_id: header_msg.id,
            bot_content_id: content_msg.id,
        };
        if !self.create_entry(&entry, &starers).await? {
            // Another star beat us to it, take our copy back down and count this one there.
            self.delete_board_messages(ctx, &entry).await?;
            return match self.record_star(message.id, user).await? {
                StarOutcome::Counted(entry) => self.edit_header(ctx, &entry).await,
                StarOutcome::AlreadyStarred | StarOutcome::NoEntry => Ok(()),
            };
        }
        tracing::debug!("Message {} made it onto the starboard with {stars} stars.", message.id);
        Ok(())
    }

    /// Handle a reaction being removed.
    pub async fn handle_unstar(
        &self,
        ctx: &serenity::Context,
        reaction: &Reaction,
    ) -> Result<(), PythonistaError> {
        if !is_star(&reaction.emoji) || reaction.channel_id == self.channel {
            return Ok(());
        }
        let Some(user) = reaction.user_id else {
            return Ok(());
        };

        match self.record_unstar(reaction.message_id, user).await? {
            UnstarOutcome::Ignored => Ok(()),
            UnstarOutcome::Counted(entry) => self.edit_header(ctx, &entry).await,
            UnstarOutcome::Removed(entry) => self.delete_board_messages(ctx, &entry).await,
        }
    }

    /// Handle the starred message being deleted.
    pub async fn handle_delete(
        &self,
        ctx: &serenity::Context,
        msg: MessageId,
    ) -> Result<(), PythonistaError> {
        match self.forget(msg).await? {
            Some(entry) => self.delete_board_messages(ctx, &entry).await,
            None => Ok(()),
        }
    }

    async fn edit_header(
        &self,
        ctx: &serenity::Context,
        entry: &StarboardEntry,
    ) -> Result<(), PythonistaError> {
        let content = header(entry.stars, entry.channel_id, entry.msg_id);
        self.channel
            .edit_message(ctx, entry.bot_message_id, EditMessage::new().content(content))
            .await?;
        Ok(())
    }

    async fn delete_board_messages(
        &self,
        ctx: &serenity::Context,
        entry: &StarboardEntry,
    ) -> Result<(), PythonistaError> {
        self.channel.delete_message(ctx, entry.bot_message_id).await?;
        self.channel.delete_message(ctx, entry.bot_content_id).await?;
        Ok(())
    }
}

/// Everyone who reacted ⭐ to `message`.
async fn star_reactors(
    ctx: &serenity::Context,
    message: &serenity::Message,
) -> Result<Vec<UserId>, PythonistaError> {
    const PAGE: u8 = 100;
    let star = ReactionType::Unicode(STAR_EMOJI.to_string());

    let mut users = Vec::new();
    let mut after: Option<UserId> = None;
    loop {
        let page = message
            .reaction_users(ctx, star.clone(), Some(PAGE), after)
            .await?;
        let done = page.len() < PAGE as usize;
        after = page.last().map(|user| user.id);
        users.extend(page.into_iter().map(|user| user.id));
        if done {
            return Ok(users);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::collections::HashSet;

    /// [StarStore] kept in memory, for exercising the board without a database.
    #[derive(Debug, Default)]
    struct MemoryStarStore {
        entries: std::sync::Mutex<HashMap<MessageId, StarboardEntry>>,
        starers: std::sync::Mutex<HashSet<(MessageId, UserId)>>,
    }

    impl MemoryStarStore {
        fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<MessageId, StarboardEntry>> {
            self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }

        fn starers(&self) -> std::sync::MutexGuard<'_, HashSet<(MessageId, UserId)>> {
            self.starers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    #[async_trait]
    impl StarStore for MemoryStarStore {
        async fn entry(&self, msg: MessageId) -> Result<Option<StarboardEntry>, PythonistaError> {
            Ok(self.entries().get(&msg).cloned())
        }

        async fn add_entry(&self, entry: &StarboardEntry) -> Result<bool, PythonistaError> {
            let mut entries = self.entries();
            if entries.contains_key(&entry.msg_id) {
                return Ok(false);
            }
            entries.insert(entry.msg_id, entry.clone());
            Ok(true)
        }

        async fn add_starers(&self, msg: MessageId, users: &[UserId]) -> Result<(), PythonistaError> {
            self.starers().extend(users.iter().map(|&user| (msg, user)));
            Ok(())
        }

        async fn add_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError> {
            Ok(self.starers().insert((msg, user)))
        }

        async fn remove_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError> {
            Ok(self.starers().remove(&(msg, user)))
        }

        async fn increment_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError> {
            Ok(self.entries().get_mut(&msg).map(|entry| {
                entry.stars += 1;
                entry.stars
            }))
        }

        async fn decrement_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError> {
            Ok(self.entries().get_mut(&msg).map(|entry| {
                entry.stars -= 1;
                entry.stars
            }))
        }

        async fn delete_entry(&self, msg: MessageId) -> Result<(), PythonistaError> {
            self.entries().remove(&msg);
            self.starers().retain(|(m, _)| *m != msg);
            Ok(())
        }
    }

    /// Hands control back to the runtime before every call, like a database round trip.
    #[derive(Debug, Default)]
    struct YieldingStore(MemoryStarStore);

    #[async_trait]
    impl StarStore for YieldingStore {
        async fn entry(&self, msg: MessageId) -> Result<Option<StarboardEntry>, PythonistaError> {
            tokio::task::yield_now().await;
            self.0.entry(msg).await
        }

        async fn add_entry(&self, entry: &StarboardEntry) -> Result<bool, PythonistaError> {
            tokio::task::yield_now().await;
            self.0.add_entry(entry).await
        }

        async fn add_starers(&self, msg: MessageId, users: &[UserId]) -> Result<(), PythonistaError> {
            tokio::task::yield_now().await;
            self.0.add_starers(msg, users).await
        }

        async fn add_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError> {
            tokio::task::yield_now().await;
            self.0.add_starer(msg, user).await
        }

        async fn remove_starer(&self, msg: MessageId, user: UserId) -> Result<bool, PythonistaError> {
            tokio::task::yield_now().await;
            self.0.remove_starer(msg, user).await
        }

        async fn increment_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError> {
            tokio::task::yield_now().await;
            self.0.increment_stars(msg).await
        }

        async fn decrement_stars(&self, msg: MessageId) -> Result<Option<i64>, PythonistaError> {
            tokio::task::yield_now().await;
            self.0.decrement_stars(msg).await
        }

        async fn delete_entry(&self, msg: MessageId) -> Result<(), PythonistaError> {
            tokio::task::yield_now().await;
            self.0.delete_entry(msg).await
        }
    }

    fn board_with(store: Arc<dyn StarStore>, requirement: u64, remove_on_delete: bool) -> Starboard {
        let config = StarboardConfig {
            channel: Some(ChannelId::new(1)),
            entry_requirement: requirement,
            remove_on_delete,
        };
        Starboard::new(store, &config).unwrap()
    }

    fn board(requirement: u64) -> Starboard {
        board_with(Arc::new(MemoryStarStore::default()), requirement, true)
    }

    fn entry(stars: i64) -> StarboardEntry {
        StarboardEntry {
            msg_id: msg(),
            channel_id: ChannelId::new(2),
            stars,
            bot_message_id: MessageId::new(3),
            bot_content_id: MessageId::new(4),
        }
    }

    fn msg() -> MessageId {
        MessageId::new(1000)
    }

    fn user(id: u64) -> UserId {
        UserId::new(id)
    }

    #[test]
    fn tiers() {
        assert_eq!(star_tier(1), "✨");
        assert_eq!(star_tier(2), "✨");
        assert_eq!(star_tier(3), "💫");
        assert_eq!(star_tier(6), "⭐");
        assert_eq!(star_tier(7), "🌟");
    }

    #[test]
    fn header_names_channel_and_message() {
        assert_eq!(
            header(5, ChannelId::new(2), MessageId::new(1000)),
            "**💫** 5 in: <#2> ID: 1000"
        );
    }

    #[test]
    fn requirement() {
        let board = board(5);
        assert!(!board.qualifies(4));
        assert!(board.qualifies(5));
    }

    #[test]
    fn no_channel_no_board() {
        let config = StarboardConfig {
            channel: None,
            entry_requirement: 5,
            remove_on_delete: false,
        };
        assert!(Starboard::new(Arc::new(MemoryStarStore::default()), &config).is_none());
    }

    #[tokio::test]
    async fn star_without_entry() {
        let board = board(5);
        assert_eq!(board.record_star(msg(), user(1)).await.unwrap(), StarOutcome::NoEntry);
    }

    #[tokio::test]
    async fn new_starer_is_counted_once() {
        let board = board(5);
        board
            .create_entry(&entry(5), &[1, 2, 3, 4, 5].map(user))
            .await
            .unwrap();

        assert_eq!(
            board.record_star(msg(), user(3)).await.unwrap(),
            StarOutcome::AlreadyStarred
        );
        assert_eq!(
            board.record_star(msg(), user(6)).await.unwrap(),
            StarOutcome::Counted(entry(6))
        );
        assert_eq!(
            board.record_star(msg(), user(6)).await.unwrap(),
            StarOutcome::AlreadyStarred
        );
    }

    #[tokio::test]
    async fn unstar_needs_a_starer() {
        let board = board(1);
        assert_eq!(
            board.record_unstar(msg(), user(1)).await.unwrap(),
            UnstarOutcome::Ignored
        );

        board.create_entry(&entry(2), &[user(1), user(2)]).await.unwrap();
        assert_eq!(
            board.record_unstar(msg(), user(9)).await.unwrap(),
            UnstarOutcome::Ignored
        );
        assert_eq!(
            board.record_unstar(msg(), user(1)).await.unwrap(),
            UnstarOutcome::Counted(entry(1))
        );
        // Already removed.
        assert_eq!(
            board.record_unstar(msg(), user(1)).await.unwrap(),
            UnstarOutcome::Ignored
        );
    }

    #[tokio::test]
    async fn last_star_removes_the_entry() {
        let board = board(1);
        board.create_entry(&entry(1), &[user(1)]).await.unwrap();

        assert_eq!(
            board.record_unstar(msg(), user(1)).await.unwrap(),
            UnstarOutcome::Removed(entry(0))
        );
        assert!(board.store.entry(msg()).await.unwrap().is_none());
        assert!(!board.store.remove_starer(msg(), user(1)).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_stars_are_all_counted() {
        let board = board_with(Arc::new(YieldingStore::default()), 5, true);
        board
            .create_entry(&entry(5), &[1, 2, 3, 4, 5].map(user))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            board.record_star(msg(), user(6)),
            board.record_star(msg(), user(7)),
        );
        let mut counts = [first.unwrap(), second.unwrap()].map(|outcome| match outcome {
            StarOutcome::Counted(entry) => entry.stars,
            other => panic!("expected a counted star, got {other:?}"),
        });
        counts.sort();

        assert_eq!(counts, [6, 7]);
        assert_eq!(board.store.entry(msg()).await.unwrap().unwrap().stars, 7);
    }

    #[tokio::test]
    async fn concurrent_unstars_are_all_counted() {
        let board = board_with(Arc::new(YieldingStore::default()), 1, true);
        board
            .create_entry(&entry(3), &[1, 2, 3].map(user))
            .await
            .unwrap();

        let (first, second) = tokio::join!(
            board.record_unstar(msg(), user(1)),
            board.record_unstar(msg(), user(2)),
        );
        assert!(matches!(first.unwrap(), UnstarOutcome::Counted(_)));
        assert!(matches!(second.unwrap(), UnstarOutcome::Counted(_)));
        assert_eq!(board.store.entry(msg()).await.unwrap().unwrap().stars, 1);

        // The same user twice at once only counts once.
        let (first, second) = tokio::join!(
            board.record_unstar(msg(), user(3)),
            board.record_unstar(msg(), user(3)),
        );
        let removed = [first.unwrap(), second.unwrap()]
            .iter()
            .filter(|outcome| matches!(outcome, UnstarOutcome::Removed(_)))
            .count();
        assert_eq!(removed, 1);
        assert!(board.store.entry(msg()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn only_one_entry_wins_at_the_threshold() {
        let board = board_with(Arc::new(YieldingStore::default()), 5, true);
        let mut late = entry(5);
        late.bot_message_id = MessageId::new(30);
        late.bot_content_id = MessageId::new(40);

        let early = entry(5);
        let early_starers = [1, 2, 3, 4, 5].map(user);
        let late_starers = [1, 2, 3, 4, 5, 6].map(user);

        let (first, second) = tokio::join!(
            board.create_entry(&early, &early_starers),
            board.create_entry(&late, &late_starers),
        );

        assert_eq!((first.unwrap(), second.unwrap()), (true, false));
        assert_eq!(board.store.entry(msg()).await.unwrap(), Some(entry(5)));
        // The losing entry's starers weren't recorded.
        assert!(board.store.add_starer(msg(), user(6)).await.unwrap());
    }

    #[tokio::test]
    async fn deleted_messages_leave_the_board() {
        let board = board_with(Arc::new(MemoryStarStore::default()), 5, true);
        assert_eq!(board.forget(msg()).await.unwrap(), None);

        board.create_entry(&entry(5), &[user(1)]).await.unwrap();
        assert_eq!(board.forget(msg()).await.unwrap(), Some(entry(5)));
        assert!(board.store.entry(msg()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_messages_can_stay_on_the_board() {
        let board = board_with(Arc::new(MemoryStarStore::default()), 5, false);
        board.create_entry(&entry(5), &[user(1)]).await.unwrap();

        assert_eq!(board.forget(msg()).await.unwrap(), None);
        assert_eq!(board.store.entry(msg()).await.unwrap(), Some(entry(5)));
    }
}
