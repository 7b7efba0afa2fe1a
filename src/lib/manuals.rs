//! Documentation and source lookups through the idevision API.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::Clock;
use governor::clock::DefaultClock;
use governor::DefaultKeyedRateLimiter;
use governor::Quota;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use url::Url;

use super::guess::ChannelHints;
use super::guess::Topic;
use crate::error::UserError;
use crate::serenity;
use crate::setup::GuildConfig;

const RTFM_URL: &str = "https://idevision.net/api/public/rtfm.sphinx";
const RTFS_URL: &str = "https://idevision.net/api/public/rtfs";

const FORUM_TIP: &str =
    "\n• Tip: Forum posts with tags will automatically have the relevant libraries used, no need to specify it!";

/// Libraries `rtfm` and `rtfs` know about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Library {
    Wavelink,
    TwitchIO,
    DiscordPy,
    Python,
    Aiohttp,
}

impl Library {
    /// Library named by one of its aliases.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias {
            "wavelink" | "wl" => Some(Library::Wavelink),
            "twitchio" | "tio" => Some(Library::TwitchIO),
            "discordpy" | "dpy" => Some(Library::DiscordPy),
            "python" | "py" => Some(Library::Python),
            "aiohttp" => Some(Library::Aiohttp),
            _ => None,
        }
    }

    /// Library for a guessed channel topic.
    pub fn from_topic(topic: Topic) -> Self {
        match topic {
            Topic::Wavelink => Library::Wavelink,
            Topic::TwitchIO => Library::TwitchIO,
            Topic::DiscordPy => Library::DiscordPy,
            Topic::Python => Library::Python,
        }
    }

    /// Name shown in embed titles.
    pub fn title(self) -> &'static str {
        match self {
            Library::Wavelink => "Wavelink",
            Library::TwitchIO => "Twitchio",
            Library::DiscordPy => "Discordpy",
            Library::Python => "Python",
            Library::Aiohttp => "Aiohttp",
        }
    }

    /// Root of the hosted documentation.
    pub fn docs_url(self) -> Option<&'static str> {
        match self {
            Library::Wavelink => Some("https://wavelink.readthedocs.io/en/latest"),
            Library::TwitchIO => Some("https://twitchio.dev/en/latest/"),
            Library::DiscordPy => Some("https://discordpy.readthedocs.io/en/stable"),
            Library::Python => Some("https://docs.python.org/3"),
            Library::Aiohttp => None,
        }
    }

    /// Name of the library in idevision's source index.
    pub fn source_name(self) -> Option<&'static str> {
        match self {
            Library::Wavelink => Some("wavelink"),
            Library::TwitchIO => Some("twitchio"),
            Library::DiscordPy => Some("discord.py-2"),
            Library::Python => None,
            Library::Aiohttp => Some("aiohttp"),
        }
    }

    /// Embed colour of the library.
    pub fn colour(self) -> serenity::Colour {
        match self {
            Library::Wavelink => serenity::Colour::new(0x18344D),
            Library::TwitchIO => serenity::Colour::new(0xFFDE57),
            Library::DiscordPy => serenity::Colour::new(2644621),
            Library::Python => serenity::Colour::new(0x4584B6),
            Library::Aiohttp => serenity::Colour::new(0xFF0000),
        }
    }
}

/// Remove `flag` from `query`, returning whether it was there.
pub fn take_flag(query: &mut String, flag: &str) -> bool {
    if query.contains(flag) {
        *query = query.replace(flag, "");
        true
    } else {
        false
    }
}

/// Split off a leading library name. Without one the whole query is kept.
pub fn split_library(query: &str) -> (Option<Library>, &str) {
    let query = query.trim();
    let (word, rest) = query
        .split_once(char::is_whitespace)
        .unwrap_or((query, ""));
    match Library::from_alias(word) {
        Some(library) => (Some(library), rest.trim_start()),
        None => (None, query),
    }
}

/// The library to search, what to search for, and a tip for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub library: Library,
    pub query: String,
    pub tip: String,
}

/// Pick a library for a non-empty query.
///
/// A named library wins over the channel's guess. Naming the library the forum tags already
/// pick earns a tip, except in posts tagged as other help.
pub fn resolve(query: &str, hints: &ChannelHints, guild: &GuildConfig) -> Result<Lookup, UserError> {
    let guess = super::guess::guess_topic(hints, guild, true).map(Library::from_topic);
    let (named, rest) = split_library(query);

    let library = named.or(guess).ok_or(UserError::UnknownLibrary)?;

    let other_help = guild
        .other_help_tag
        .is_some_and(|tag| hints.tag_ids.contains(&tag));
    let tip = if named.is_some() && hints.in_forum(guild) && guess == Some(library) && !other_help
    {
        FORUM_TIP.to_string()
    } else {
        String::new()
    };

    Ok(Lookup {
        library,
        query: rest.trim().to_string(),
        tip,
    })
}

/// Python's `str(bool)`, which idevision expects.
fn py_bool(value: bool) -> &'static str {
    if value {
        "True"
    } else {
        "False"
    }
}

pub fn rtfm_url(
    library: Library,
    query: &str,
    labels: bool,
    clear_labels: bool,
) -> Result<Url, UserError> {
    let location = library.docs_url().ok_or(UserError::UnknownLibrary)?;
    Url::parse_with_params(
        RTFM_URL,
        [
            ("query", query),
            ("location", location),
            ("show-labels", py_bool(labels)),
            ("label-labels", py_bool(clear_labels)),
        ],
    )
    .map_err(|_| UserError::BadArgs {
        input: Some(query.to_string()),
    })
}

pub fn rtfs_url(library: Library, query: &str, source: bool) -> Result<Url, UserError> {
    let name = library.source_name().ok_or(UserError::UnknownLibrary)?;
    let format = if source { "source" } else { "links" };
    Url::parse_with_params(
        RTFS_URL,
        [("query", query), ("library", name), ("format", format)],
    )
    .map_err(|_| UserError::BadArgs {
        input: Some(query.to_string()),
    })
}

/// What idevision answers with.
#[derive(Debug, Clone, Deserialize)]
pub struct IdevisionResponse {
    /// Names mapped to urls (or source code), best match first.
    pub nodes: Map<String, Value>,
    pub query_time: Value,
    #[serde(default)]
    pub commit: Option<String>,
}

impl IdevisionResponse {
    /// `query_time` may come as a number or a string.
    pub fn query_time(&self) -> f64 {
        match &self.query_time {
            Value::Number(n) => n.as_f64().unwrap_or_default(),
            Value::String(s) => s.parse().unwrap_or_default(),
            _ => 0.0,
        }
    }

    /// First six characters of the indexed commit.
    pub fn short_commit(&self) -> &str {
        let commit = self.commit.as_deref().unwrap_or_default();
        commit.get(..6).unwrap_or(commit)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str().unwrap_or_default()))
    }
}

/// Markdown links to every node, `code` formats the names as inline code.
pub fn node_links(response: &IdevisionResponse, code: bool) -> Vec<String> {
    response
        .nodes()
        .map(|(name, url)| {
            if code {
                format!("[`{name}`]({url})")
            } else {
                format!("[{name}]({url})")
            }
        })
        .collect()
}

/// Members are keyed per guild, a DM is its own bucket.
type MemberKey = (Option<serenity::GuildId>, serenity::UserId);

/// Allows `rate` uses per `per` for each member.
pub struct MemberCooldown {
    limiter: DefaultKeyedRateLimiter<MemberKey>,
    clock: DefaultClock,
}

impl std::fmt::Debug for MemberCooldown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemberCooldown")
            .field("members", &self.limiter.len())
            .finish()
    }
}

impl Default for MemberCooldown {
    fn default() -> Self {
        Self::new(NonZeroU32::MIN.saturating_add(1), Duration::from_secs(5))
    }
}

impl MemberCooldown {
    /// A burst of `rate` uses, refilled evenly over `per`.
    pub fn new(rate: NonZeroU32, per: Duration) -> Self {
        let quota = Quota::with_period(per / rate.get())
            .unwrap_or_else(|| Quota::per_second(rate))
            .allow_burst(rate);
        Self {
            limiter: DefaultKeyedRateLimiter::keyed(quota),
            clock: DefaultClock::default(),
        }
    }

    /// Record a use, or say how long until the next one is allowed.
    pub fn hit(
        &self,
        guild: Option<serenity::GuildId>,
        user: serenity::UserId,
    ) -> Result<(), UserError> {
        // Members whose buckets have refilled don't need tracking.
        self.limiter.retain_recent();

        self.limiter
            .check_key(&(guild, user))
            .map_err(|not_until| UserError::OnCooldown {
                remaining_cooldown: not_until.wait_time_from(self.clock.now()),
            })
    }
}
