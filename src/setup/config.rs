//! Configuration for running this bot.

use std::collections::HashSet;
use std::marker::PhantomData;

use poise::Framework;
use serde::Deserialize;
use serde::Serialize;
use serenity::ChannelId;
use serenity::EmojiId;
use serenity::ForumTagId;
use serenity::GuildId;
use serenity::RoleId;
use serenity::UserId;

use crate::error::ConfigError;
use crate::serenity;

/// The path to the config file
const CONFIG_PATH: &str = "config.toml";

/// Settings read from [CONFIG_PATH] that modify bot behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Token needed to use a bot account.
    discord_token: String,

    /// Prefix for text commands. Mentioning the bot always works too.
    pub prefix: String,

    /// Owners of the bot. Each id is either a user or a role in the home guild.
    pub owner_ids: Vec<u64>,

    /// See [TokenConfig]
    pub tokens: TokenConfig,

    /// See [DatabaseConfig]
    pub database: DatabaseConfig,

    /// See [LoggingConfig]
    logging: LoggingConfig,

    /// See [GuildConfig]
    pub guild: GuildConfig,

    /// See [StarboardConfig]
    pub starboard: StarboardConfig,

    /// See [SuggestionsConfig]
    pub suggestions: SuggestionsConfig,

    /// See [SnekboxConfig]
    pub snekbox: SnekboxConfig,

    /// See [WebserverConfig]
    pub webserver: WebserverConfig,

    /// Useful developer specific configs.
    dev_utils: DevConfig,
}

impl Config {
    /// Tries to read [CONFIG_PATH] to extract a [Config].
    /// If a file doesn't exists, create the default config file and returns error.
    /// If a file exists but is empty, re-write the default values and return error.
    /// If a file exists but is incomplete, show error and don't change files.
    /// If a file exists and is complete, read file to create a config.
    /// If file existance is indeterminent (e.g. missing permissions), return error.
    pub fn read() -> Result<Config, ConfigError> {
        match std::fs::read_to_string(CONFIG_PATH) {
            Ok(content) if content.trim().is_empty() => {
                write_file(&Config::default())?;
                Err(ConfigError::InvalidConfig {
                    reason: format!("Empty config file! Rewriting {CONFIG_PATH} ..."),
                })
            }
            Ok(content) => Config::from_toml(&content),
            Err(file_error) => match file_error.kind() {
                std::io::ErrorKind::NotFound => {
                    let action = format!("Creating {CONFIG_PATH}...");
                    write_file(&Config::default())?;
                    Err(ConfigError::MissingConfig { action_msg: action })
                }
                _ => Err(ConfigError::IoError(file_error)),
            },
        }
    }

    /// Parse a config, describing the path of the offending key on failure.
    pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
        let to_toml = toml::Deserializer::new(content);
        serde_path_to_error::deserialize(to_toml).map_err(|error| ConfigError::InvalidConfig {
            reason: error.to_string(),
        })
    }

    /// Basic sanity check for if a token was given.
    pub fn token(&self) -> Result<&String, ConfigError> {
        let default_token = Config::default().discord_token;
        let given_token = &self.discord_token;

        let sanity_check = !given_token.is_empty() && !given_token.contains(&default_token);

        if sanity_check {
            Ok(&self.discord_token)
        } else {
            Err(ConfigError::InvalidConfig {
                reason: "Missing discord token".to_string(),
            })
        }
    }

    /// Construct a bug notification notify list based on the config.
    /// Wrapper for [NotifyConfig::notify_list]
    pub fn notify_list<U, E>(&self, fw: &Framework<U, E>) -> HashSet<UserId> {
        self.dev_utils.notifications.notify_list(fw)
    }

    /// Getter for log_dir.
    pub fn log_dir(&self) -> &str {
        &self.logging.log_dir
    }

    /// Is debug mode enabled for console logs
    pub fn console_debug(&self) -> bool {
        self.logging.console_debug
    }

    /// Is file logging enabled.
    pub fn logs_enabled(&self) -> bool {
        self.logging.logs_enabled
    }

    /// Webhook that receives a copy of INFO and above logs.
    pub fn log_webhook(&self) -> Option<&str> {
        non_empty(&self.logging.webhook_url)
    }

    /// Guild that gets commands registered instantly, if any.
    pub fn dev_guild(&self) -> Option<GuildId> {
        self.dev_utils.dev_guild
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: "put_token_here".to_string(),
            prefix: "!".to_string(),
            owner_ids: vec![],

            tokens: TokenConfig {
                pythonista: String::new(),
                github_bot: String::new(),
                idevision: String::new(),
            },

            database: DatabaseConfig {
                dsn: String::new(),
            },

            logging: LoggingConfig {
                console_debug: false,
                logs_enabled: true,
                log_dir: "logs".to_string(),
                webhook_url: String::new(),
            },

            guild: GuildConfig::default(),

            starboard: StarboardConfig {
                channel: None,
                entry_requirement: 5,
                remove_on_delete: false,
            },

            suggestions: SuggestionsConfig {
                webhook_url: String::new(),
            },

            snekbox: SnekboxConfig {
                url: "http://localhost:8060/eval".to_string(),
            },

            webserver: WebserverConfig {
                enabled: false,
                host: "127.0.0.1".to_string(),
                port: 8080,
            },

            dev_utils: DevConfig {
                dev_guild: None,
                notifications: NotifyConfig {
                    enabled: false,
                    add_owners: true,
                    userids: vec![],
                },
            },
        }
    }
}

/// API tokens for third party services. An empty token disables the feature using it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Pythonista API token, used by the moderation feed and the `/dpy/modlog` endpoint.
    pub pythonista: String,
    /// GitHub token used to upload leaked Discord tokens as gists.
    pub github_bot: String,
    /// Optional idevision authorization for `rtfm`/`rtfs`.
    pub idevision: String,
}

impl TokenConfig {
    /// `None` disables the moderation feed and the webhook endpoint.
    pub fn pythonista(&self) -> Option<&str> {
        non_empty(&self.pythonista)
    }

    /// `None` skips GitHub requests.
    pub fn github_bot(&self) -> Option<&str> {
        non_empty(&self.github_bot)
    }

    /// `None` queries idevision anonymously.
    pub fn idevision(&self) -> Option<&str> {
        non_empty(&self.idevision)
    }
}

/// Postgres settings. The starboard is disabled without a dsn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub dsn: String,
}

impl DatabaseConfig {
    /// Connection string, `None` when unset.
    pub fn dsn(&self) -> Option<&str> {
        non_empty(&self.dsn)
    }
}

/// Configs for
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    /// Print debug traces to console?
    console_debug: bool,
    /// Enable writing to log file?
    logs_enabled: bool,
    /// Directory to store log files
    log_dir: String,
    /// Discord webhook to mirror logs into. Empty to disable.
    webhook_url: String,
}

/// Ids of things in the home guild.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuildConfig {
    #[serde(with = "opt_id")]
    pub guild_id: Option<GuildId>,
    #[serde(with = "opt_id")]
    pub moderator_role: Option<RoleId>,
    /// Where discord.py moderation events are posted.
    #[serde(with = "opt_id")]
    pub dpy_mod_logs: Option<ChannelId>,
    #[serde(with = "opt_id")]
    pub help_forum: Option<ChannelId>,
    #[serde(with = "opt_id")]
    pub forum_logs: Option<ChannelId>,
    #[serde(with = "opt_id")]
    pub help_channel: Option<ChannelId>,
    #[serde(with = "opt_id")]
    pub wavelink_dev: Option<ChannelId>,
    #[serde(with = "opt_id")]
    pub twitchio_dev: Option<ChannelId>,
    #[serde(with = "opt_id")]
    pub solved_tag: Option<ForumTagId>,
    /// Forum tag for questions that don't belong to one library.
    #[serde(with = "opt_id")]
    pub other_help_tag: Option<ForumTagId>,
    #[serde(with = "opt_id")]
    pub solved_emoji: Option<EmojiId>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            guild_id: Some(GuildId::new(490948346773635102)),
            moderator_role: Some(RoleId::new(578255729295884308)),
            dpy_mod_logs: None,
            help_forum: None,
            forum_logs: None,
            help_channel: None,
            wavelink_dev: None,
            twitchio_dev: None,
            solved_tag: Some(ForumTagId::new(1006769269201195059)),
            other_help_tag: Some(ForumTagId::new(1006717008613740596)),
            solved_emoji: Some(EmojiId::new(578575442383208468)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarboardConfig {
    /// Channel to repost starred messages in. Unset disables the starboard.
    #[serde(with = "opt_id")]
    pub channel: Option<ChannelId>,
    /// Number of stars needed before a message gets on the board.
    pub entry_requirement: u64,
    /// Remove the board entry when the original message is deleted.
    pub remove_on_delete: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionsConfig {
    pub webhook_url: String,
}

impl SuggestionsConfig {
    /// `None` disables `suggest`.
    pub fn webhook_url(&self) -> Option<&str> {
        non_empty(&self.webhook_url)
    }
}

/// The sandbox `eval` runs code in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnekboxConfig {
    pub url: String,
}

/// HTTP server receiving moderation events pushed to `/dpy/modlog`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebserverConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

/// Optional configs to enable developer-specific behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DevConfig {
    /// Optional guild to automatically update commands quickly.
    #[serde(with = "opt_id")]
    dev_guild: Option<GuildId>,
    /// See [NotifyConfig]
    notifications: NotifyConfig,
}

/// Configs for notification behavior when encountering unexpected errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct NotifyConfig {
    /// Enable this behavior or not. (bot sends a private message)
    enabled: bool,
    /// Whether to automatically add owners to the notify list.
    add_owners: bool,
    /// Additional users to add to the notify list.
    userids: Vec<UserId>,
}

impl NotifyConfig {
    /// Construct a bug notification notify list based on the config.
    fn notify_list<U, E>(&self, fw: &Framework<U, E>) -> HashSet<UserId> {
        let mut notify_list = HashSet::new();

        // If disabled, don't add anyone to the list.
        if !self.enabled {
            return notify_list;
        }

        if self.add_owners {
            notify_list.extend(fw.options().owners.iter().copied());
        }

        notify_list.extend(self.userids.iter().copied());

        notify_list
    }
}

/// Treats an empty (or blank) string as unset.
fn non_empty(value: &str) -> Option<&str> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// Write the given config to [CONFIG_PATH].
fn write_file(config: &Config) -> Result<(), ConfigError> {
    let content = toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidConfig {
        reason: e.to_string(),
    })?;
    std::fs::write(CONFIG_PATH, content).map_err(ConfigError::IoError)
}

/// (De)serializes an optional discord id as a string, where `""` means `None`.
mod opt_id {
    use super::*;

    pub fn serialize<T, S>(val: &Option<T>, ser: S) -> Result<S::Ok, S::Error>
    where
        T: Copy + Into<u64>,
        S: serde::Serializer,
    {
        match val {
            Some(v) => ser.serialize_str(&(*v).into().to_string()),
            None => ser.serialize_str(""),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        T: From<u64>,
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_str(OptVisitor(PhantomData))
    }

    struct OptVisitor<T>(PhantomData<T>);

    impl<T: From<u64>> serde::de::Visitor<'_> for OptVisitor<T> {
        type Value = Option<T>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a discord id as a string, or \"\" for none")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            match v.trim() {
                "" => Ok(None),
                v => {
                    let num: u64 = v.parse().map_err(|_| E::custom("not u64"))?;
                    if num == 0 {
                        return Err(E::custom("discord ids can't be 0"));
                    }
                    Ok(Some(T::from(num)))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_survives_a_round_trip() {
        let written = toml::to_string_pretty(&Config::default()).unwrap();
        let read = Config::from_toml(&written).unwrap();

        assert_eq!(read.prefix, "!");
        assert_eq!(read.guild.guild_id, Some(GuildId::new(490948346773635102)));
        assert_eq!(read.starboard.channel, None);
        assert_eq!(read.dev_guild(), None);
        assert!(read.tokens.pythonista().is_none());
    }

    #[test]
    fn default_token_is_rejected() {
        let config = Config::default();
        assert!(config.token().is_err());
    }

    #[test]
    fn ids_are_read_from_strings() {
        let mut config = Config::default();
        config.starboard.channel = Some(ChannelId::new(42));
        let written = toml::to_string_pretty(&config).unwrap();
        assert!(written.contains("channel = \"42\""));

        let read = Config::from_toml(&written).unwrap();
        assert_eq!(read.starboard.channel, Some(ChannelId::new(42)));
    }

    #[test]
    fn bad_id_names_the_offending_key() {
        let written = toml::to_string_pretty(&Config::default()).unwrap();
        let broken = written.replace("guild_id = \"490948346773635102\"", "guild_id = \"abc\"");

        match Config::from_toml(&broken) {
            Err(ConfigError::InvalidConfig { reason }) => assert!(reason.contains("guild.guild_id")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn blank_tokens_are_unset() {
        assert_eq!(non_empty("   "), None);
        assert_eq!(non_empty(" abc "), Some("abc"));
    }
}
