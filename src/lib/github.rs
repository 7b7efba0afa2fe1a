//! GitHub helpers: issue shorthand links, source highlighting and the rate limited API client.

use std::fmt::Write;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::Method;
use reqwest::StatusCode;
use serde_json::json;
use serde_json::Value;
use tokio::sync::Mutex;

use super::guess::guess_topic;
use super::guess::ChannelHints;
use super::guess::Topic;
use crate::error::GithubError;
use crate::serenity;
use crate::setup::GuildConfig;
use crate::PythonistaError;
use serenity::CreateMessage;
use serenity::EmojiId;
use serenity::Message;
use serenity::MessageFlags;
use serenity::ReactionCollector;
use serenity::ReactionType;

const GITHUB_API_URL: &str = "https://api.github.com/";
const GITHUB_RAW_CONTENT_URL: &str = "https://raw.githubusercontent.com/";

const HIGHLIGHT_EMOJI: char = '📃';
/// How long someone has to ask for a highlight.
const HIGHLIGHT_TIMEOUT: Duration = Duration::from_secs(10);
/// Lines shown around a single highlighted line.
const HIGHLIGHT_CONTEXT: usize = 10;
/// Longest code block that is still sent.
const MAX_HIGHLIGHT_SIZE: usize = 2002;

/// `wl##12`, `##12`. Exactly two `#` are a link request.
static LIB_ISSUE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?P<lib>[a-z]+)?(?P<pounds>#{2,})(?P<number>[0-9]+)").expect("valid regex")
});

static GITHUB_CODE_REGION_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"https?://github\.com/(?P<user>[^/\s]+)/(?P<repo>[^/\s]+)/blob/(?P<hash>[a-zA-Z0-9._-]+)/(?:(?P<path>[^\s#]+)/)?(?P<file>[^/\s#]+)#L(?P<linestart>[0-9]+)(?:-L(?P<lineend>[0-9]+))?",
    )
    .expect("valid regex")
});

/// Repositories reachable through the issue shorthand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repo {
    Wavelink,
    TwitchIO,
    PythonistaBot,
    Mystbin,
    DiscordPy,
}

impl Repo {
    /// `owner/name` on GitHub.
    pub fn path(self) -> &'static str {
        match self {
            Repo::Wavelink => "PythonistaGuild/Wavelink",
            Repo::TwitchIO => "PythonistaGuild/TwitchIO",
            Repo::PythonistaBot => "PythonistaGuild/PythonistaBot",
            Repo::Mystbin => "PythonistaGuild/Mystbin",
            Repo::DiscordPy => "rapptz/discord.py",
        }
    }

    /// Look up an alias like `wl` or `dpy`.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias.to_lowercase().as_str() {
            "wavelink" | "wave" | "wl" => Some(Repo::Wavelink),
            "discordpy" | "discord" | "dpy" => Some(Repo::DiscordPy),
            "twitchio" | "tio" => Some(Repo::TwitchIO),
            "mystbin" | "mb" => Some(Repo::Mystbin),
            "pythonistabot" | "pb" => Some(Repo::PythonistaBot),
            _ => None,
        }
    }

    pub fn from_topic(topic: Topic) -> Option<Self> {
        match topic {
            Topic::TwitchIO => Some(Repo::TwitchIO),
            Topic::Wavelink => Some(Repo::Wavelink),
            Topic::DiscordPy => Some(Repo::DiscordPy),
            Topic::Python => None,
        }
    }

    pub fn issue_url(self, number: &str) -> String {
        format!("https://github.com/{}/issues/{number}", self.path())
    }
}

/// An `alias##number` found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueMention {
    /// `None` if no alias was given, or it isn't a known one.
    pub repo: Option<Repo>,
    pub number: String,
}

impl IssueMention {
    pub fn find(content: &str) -> Option<Self> {
        let caps = LIB_ISSUE_REGEX.captures(content)?;
        if caps["pounds"].len() != 2 {
            return None;
        }
        Some(Self {
            repo: caps.name("lib").and_then(|lib| Repo::from_alias(lib.as_str())),
            number: caps["number"].to_string(),
        })
    }
}

/// A link to lines of a file on GitHub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    pub user: String,
    pub repo: String,
    pub hash: String,
    /// Directory of the file, empty at the repository root.
    pub path: String,
    pub file: String,
    pub line_start: usize,
    pub line_end: Option<usize>,
}

impl CodeRegion {
    pub fn find(content: &str) -> Option<Self> {
        let caps = GITHUB_CODE_REGION_REGEX.captures(content)?;
        Some(Self {
            user: caps["user"].to_string(),
            repo: caps["repo"].to_string(),
            hash: caps["hash"].to_string(),
            path: caps.name("path").map_or("", |m| m.as_str()).to_string(),
            file: caps["file"].to_string(),
            line_start: caps["linestart"].parse().ok()?,
            line_end: caps.name("lineend").and_then(|m| m.as_str().parse().ok()),
        })
    }

    /// Path of the file inside the repository.
    pub fn file_path(&self) -> String {
        if self.path.is_empty() {
            self.file.clone()
        } else {
            format!("{}/{}", self.path, self.file)
        }
    }

    pub fn raw_url(&self) -> String {
        format!(
            "{GITHUB_RAW_CONTENT_URL}{}/{}/{}/{}",
            self.user,
            self.repo,
            self.hash,
            self.file_path()
        )
    }

    /// Used as the code block language.
    fn extension(&self) -> &str {
        self.file.rsplit('.').next().unwrap_or_default()
    }
}

/// Rendered lines of a [CodeRegion].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlight {
    pub path: String,
    /// First shown line, 1-indexed.
    pub min: usize,
    /// Last shown line, 1-indexed.
    pub max: usize,
    /// The fenced code block.
    pub block: String,
}

impl Highlight {
    /// Render the region out of the file's source.
    ///
    /// A single line is shown with `context` lines around it, a range is shown as is.
    /// Returns `None` if the first line isn't in the file.
    pub fn render(region: &CodeRegion, code: &str, context: usize) -> Option<Self> {
        let lines: Vec<&str> = code.lines().collect();
        let highlighted = region.line_start;
        if highlighted == 0 || highlighted > lines.len() {
            return None;
        }

        let (mut min, mut max) = match region.line_end {
            Some(end) if end != 0 => (highlighted, end),
            _ => (
                highlighted.saturating_sub(context),
                highlighted + context,
            ),
        };
        if min > max {
            std::mem::swap(&mut min, &mut max);
        }
        let min = min.max(1);
        let max = max.min(lines.len());

        let width = max.to_string().len();
        let mut block = format!("```{}\n", region.extension());
        for number in min..=max {
            let marker = if number == highlighted { '>' } else { ' ' };
            let line = lines[number - 1];
            let _ = writeln!(block, "{marker}{number:>width$}  {line}");
        }
        block.push_str("```");

        Some(Self {
            path: region.file_path(),
            min,
            max,
            block,
        })
    }
}

/// GitHub API access. Requests are serialized and wait out rate limits before retrying.
#[derive(Debug)]
pub struct GithubClient {
    http: reqwest::Client,
    token: Option<String>,
    lock: Mutex<()>,
}

impl GithubClient {
    pub fn new(http: reqwest::Client, token: Option<String>) -> Self {
        Self {
            http,
            token,
            lock: Mutex::new(()),
        }
    }

    /// Send a request to the API. Returns `Ok(None)` when no token is configured.
    pub async fn request(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<&Value>,
        accept: &str,
    ) -> Result<Option<Value>, PythonistaError> {
        let Some(token) = &self.token else {
            tracing::debug!("No GitHub token, skipping {method} {endpoint}.");
            return Ok(None);
        };
        let url = url::Url::parse(GITHUB_API_URL)
            .and_then(|base| base.join(endpoint))
            .map_err(|e| GithubError {
                message: format!("bad endpoint '{endpoint}': {e}"),
            })?;

        let _guard = self.lock.lock().await;
        loop {
            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .header("Accept", accept)
                .header("User-Agent", "PythonistaBot Moderation Cog")
                .header("Authorization", format!("token {token}"));
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await?;
            let status = response.status();
            let remaining = response
                .headers()
                .get("X-Ratelimit-Remaining")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);

            if status == StatusCode::TOO_MANY_REQUESTS || remaining.as_deref() == Some("0") {
                let delay = ratelimit_delay(response.headers(), now_unix());
                tracing::warn!("GitHub rate limit hit, retrying in {delay:?}.");
                tokio::time::sleep(delay).await;
                continue;
            }

            let js: Value = response.json().await?;
            if status.is_success() {
                return Ok(Some(js));
            }
            let message = js["message"].as_str().unwrap_or("unknown error").to_string();
            return Err(GithubError { message }.into());
        }
    }

    /// Upload `content` as a gist, returning its url.
    pub async fn create_gist(
        &self,
        content: &str,
        description: Option<&str>,
        filename: Option<&str>,
        public: bool,
    ) -> Result<Option<String>, PythonistaError> {
        let filename = filename.unwrap_or("output.txt");
        let mut data = json!({
            "public": public,
            "files": { filename: { "content": content } },
        });
        if let Some(description) = description {
            data["description"] = json!(description);
        }

        let js = self
            .request(Method::POST, "gists", Some(&data), "application/vnd.github.v3+json")
            .await?;
        Ok(js.and_then(|js| js["html_url"].as_str().map(str::to_owned)))
    }

    /// Raw contents of a file. `Ok(None)` if it doesn't exist.
    pub async fn fetch_raw(&self, url: &str) -> Result<Option<String>, PythonistaError> {
        let response = self.http.get(url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.text().await?))
    }
}

fn bruhkitty() -> ReactionType {
    ReactionType::Custom {
        animated: false,
        id: EmojiId::new(710507405347389451),
        name: Some("bruhkitty".to_string()),
    }
}

/// Fetch and render the first code region linked in `content`.
async fn find_highlight(
    github: &GithubClient,
    content: &str,
) -> Result<Option<Highlight>, PythonistaError> {
    let Some(region) = CodeRegion::find(content) else {
        return Ok(None);
    };
    let Some(code) = github.fetch_raw(&region.raw_url()).await? else {
        return Ok(None);
    };
    Ok(Highlight::render(&region, &code, HIGHLIGHT_CONTEXT))
}

/// Link issues written as `lib##number` and offer to show linked GitHub code.
pub async fn on_message(
    ctx: &serenity::Context,
    github: &GithubClient,
    guild: &GuildConfig,
    message: &Message,
) -> Result<(), PythonistaError> {
    if message.author.bot {
        return Ok(());
    }

    if let Some(mention) = IssueMention::find(&message.content) {
        let repo = mention.repo.or_else(|| {
            let hints = ChannelHints::from_cache(&ctx.cache, message.guild_id, message.channel_id);
            guess_topic(&hints, guild, false).and_then(Repo::from_topic)
        });
        match repo {
            Some(repo) => {
                message.channel_id.say(ctx, repo.issue_url(&mention.number)).await?;
            }
            None => {
                message.react(ctx, bruhkitty()).await?;
            }
        }
    }

    let Some(highlight) = find_highlight(github, &message.content).await? else {
        return Ok(());
    };
    message.react(ctx, HIGHLIGHT_EMOJI).await?;

    let me = ctx.cache.current_user().id;
    let requested = ReactionCollector::new(&ctx.shard)
        .message_id(message.id)
        .timeout(HIGHLIGHT_TIMEOUT)
        .filter(move |reaction| {
            reaction.emoji.unicode_eq(&HIGHLIGHT_EMOJI.to_string()) && reaction.user_id != Some(me)
        })
        .await;
    if requested.is_none() {
        return Ok(());
    }

    if highlight.block.chars().count() > MAX_HIGHLIGHT_SIZE {
        message
            .channel_id
            .say(ctx, "You've selected too many lines for me to display!")
            .await?;
        return Ok(());
    }

    let content = format!(
        "Showing lines `{}-{}` in: `{}`\n{}",
        highlight.min, highlight.max, highlight.path, highlight.block
    );
    message
        .channel_id
        .send_message(
            ctx,
            CreateMessage::new()
                .content(content)
                .flags(MessageFlags::SUPPRESS_EMBEDS),
        )
        .await?;
    Ok(())
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// How long to wait before the rate limit lifts.
///
/// Prefers `Retry-After`, then the `X-Ratelimit-Reset` epoch. Falls back to one minute.
fn ratelimit_delay(headers: &HeaderMap, now: u64) -> Duration {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok())
    };

    if let Some(retry_after) = header("Retry-After") {
        return Duration::from_secs_f64(retry_after.max(0.0));
    }
    if let Some(reset) = header("X-Ratelimit-Reset") {
        let wait = (reset as u64).saturating_sub(now);
        return Duration::from_secs(wait.max(1));
    }
    Duration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "line1\nline2\nline3\nline4\nline5\nline6\nline7\nline8\nline9\nline10\nline11\nline12";

    fn region(start: usize, end: Option<usize>) -> CodeRegion {
        CodeRegion {
            user: "PythonistaGuild".into(),
            repo: "Wavelink".into(),
            hash: "main".into(),
            path: "wavelink".into(),
            file: "player.py".into(),
            line_start: start,
            line_end: end,
        }
    }

    #[test]
    fn issue_shorthand() {
        assert_eq!(
            IssueMention::find("see wl##42 please"),
            Some(IssueMention {
                repo: Some(Repo::Wavelink),
                number: "42".into()
            })
        );
        assert_eq!(
            IssueMention::find("DPY##7").unwrap().repo,
            Some(Repo::DiscordPy)
        );
        assert_eq!(IssueMention::find("##7").unwrap().repo, None);
        assert_eq!(IssueMention::find("tio###7"), None);
        assert_eq!(IssueMention::find("#7"), None);
    }

    #[test]
    fn issue_url() {
        assert_eq!(
            Repo::DiscordPy.issue_url("9000"),
            "https://github.com/rapptz/discord.py/issues/9000"
        );
    }

    #[test]
    fn finds_code_regions() {
        let found = CodeRegion::find(
            "look https://github.com/PythonistaGuild/Wavelink/blob/main/wavelink/player.py#L3-L5 here",
        )
        .unwrap();
        assert_eq!(found, region(3, Some(5)));
        assert_eq!(
            found.raw_url(),
            "https://raw.githubusercontent.com/PythonistaGuild/Wavelink/main/wavelink/player.py"
        );

        let root = CodeRegion::find("https://github.com/a/b/blob/abc123/setup.py#L1").unwrap();
        assert_eq!(root.path, "");
        assert_eq!(root.file_path(), "setup.py");
        assert_eq!(root.line_end, None);

        assert!(CodeRegion::find("https://github.com/a/b/blob/main/setup.py").is_none());
    }

    #[test]
    fn renders_a_range() {
        let hl = Highlight::render(&region(3, Some(5)), SOURCE, 10).unwrap();
        assert_eq!(hl.path, "wavelink/player.py");
        assert_eq!((hl.min, hl.max), (3, 5));
        assert_eq!(hl.block, "```py\n>3  line3\n 4  line4\n 5  line5\n```");
    }

    #[test]
    fn single_line_gets_context_clamped_to_file() {
        let hl = Highlight::render(&region(2, None), SOURCE, 10).unwrap();
        assert_eq!((hl.min, hl.max), (1, 12));
        assert!(hl.block.starts_with("```py\n  1  line1\n> 2  line2\n"));
        assert!(hl.block.ends_with(" 12  line12\n```"));
    }

    #[test]
    fn reversed_range_is_swapped() {
        let hl = Highlight::render(&region(5, Some(3)), SOURCE, 10).unwrap();
        assert_eq!((hl.min, hl.max), (3, 5));
        assert!(hl.block.contains(">5  line5"));
    }

    #[test]
    fn line_outside_file_is_ignored() {
        assert!(Highlight::render(&region(13, None), SOURCE, 10).is_none());
        assert!(Highlight::render(&region(0, None), SOURCE, 10).is_none());
    }

    #[test]
    fn ratelimit_delay_prefers_retry_after() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Ratelimit-Reset", "1030".parse().unwrap());
        assert_eq!(ratelimit_delay(&headers, 1000), Duration::from_secs(30));

        headers.insert("Retry-After", "2.5".parse().unwrap());
        assert_eq!(ratelimit_delay(&headers, 1000), Duration::from_millis(2500));

        assert_eq!(ratelimit_delay(&HeaderMap::new(), 0), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn requests_without_token_are_skipped() {
        let client = GithubClient::new(reqwest::Client::new(), None);
        let url = client.create_gist("x", None, None, true).await.unwrap();
        assert_eq!(url, None);
    }
}
