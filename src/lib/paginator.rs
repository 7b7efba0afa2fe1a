//! Button driven pagination of embeds and long text.

use std::time::Duration;

use poise::CreateReply;

use crate::error::PythonistaError;
use crate::serenity;
use crate::Context;
use serenity::ComponentInteractionCollector;
use serenity::CreateActionRow;
use serenity::CreateButton;
use serenity::CreateEmbed;
use serenity::CreateEmbedAuthor;
use serenity::CreateEmbedFooter;
use serenity::CreateInteractionResponse;
use serenity::CreateInteractionResponseMessage;
use serenity::UserId;

/// One page of a [Pager].
#[derive(Debug, Clone)]
pub enum Page {
    Embed(CreateEmbed),
    Text(String),
}

impl Page {
    /// `content` goes above embed pages, text pages are content themselves.
    fn reply(&self, content: Option<&str>) -> CreateReply {
        match (self, content) {
            (Page::Embed(embed), Some(content)) => CreateReply::default()
                .embed(embed.clone())
                .content(content),
            (Page::Embed(embed), None) => CreateReply::default().embed(embed.clone()),
            (Page::Text(text), _) => CreateReply::default().content(text),
        }
    }

    fn update(&self, content: Option<&str>) -> CreateInteractionResponseMessage {
        match (self, content) {
            (Page::Embed(embed), Some(content)) => CreateInteractionResponseMessage::new()
                .embed(embed.clone())
                .content(content),
            (Page::Embed(embed), None) => {
                CreateInteractionResponseMessage::new().embed(embed.clone())
            }
            (Page::Text(text), _) => CreateInteractionResponseMessage::new().content(text),
        }
    }
}

/// A list of entries split over embed pages.
#[derive(bon::Builder)]
pub struct EntryPages {
    entries: Vec<String>,
    #[builder(default = 12)]
    per_page: usize,
    /// Show the total number of entries in the footer.
    #[builder(default = true)]
    show_entry_count: bool,
    /// Don't number the entries.
    #[builder(default = false)]
    nocount: bool,
    #[builder(into)]
    title: Option<String>,
    colour: Option<serenity::Colour>,
    author: Option<CreateEmbedAuthor>,
}

impl EntryPages {
    fn page_count(&self) -> usize {
        self.entries.len().div_ceil(self.per_page.max(1)).max(1)
    }

    /// The description and footer of every page.
    fn texts(&self) -> Vec<(String, Option<String>)> {
        let per_page = self.per_page.max(1);
        let total = self.page_count();

        (0..total)
            .map(|page| {
                let start = page * per_page;
                let lines = self
                    .entries
                    .iter()
                    .enumerate()
                    .skip(start)
                    .take(per_page)
                    .map(|(i, entry)| {
                        if self.nocount {
                            entry.clone()
                        } else {
                            format!("{}. {entry}", i + 1)
                        }
                    })
                    .collect::<Vec<_>>();

                let footer = (total > 1).then(|| {
                    if self.show_entry_count {
                        format!("Page {}/{total} ({} entries)", page + 1, self.entries.len())
                    } else {
                        format!("Page {}/{total}", page + 1)
                    }
                });
                (lines.join("\n"), footer)
            })
            .collect()
    }

    pub fn into_pages(self) -> Vec<Page> {
        self.texts()
            .into_iter()
            .map(|(description, footer)| {
                let mut embed = CreateEmbed::new()
                    .description(description)
                    .colour(self.colour.unwrap_or(serenity::Colour::BLURPLE));
                if let Some(title) = &self.title {
                    embed = embed.title(title);
                }
                if let Some(author) = &self.author {
                    embed = embed.author(author.clone());
                }
                if let Some(footer) = footer {
                    embed = embed.footer(CreateEmbedFooter::new(footer));
                }
                Page::Embed(embed)
            })
            .collect()
    }
}

/// Split `text` into pages wrapped in `prefix` and `suffix`.
///
/// Each page stays under `max_size - 200` characters, leaving room for a footer.
pub fn split_text(text: &str, prefix: &str, suffix: &str, max_size: usize) -> Vec<String> {
    let max_size = max_size.saturating_sub(200);
    let prefix_len = prefix.chars().count();
    let suffix_len = suffix.chars().count();
    let max_line = max_size.saturating_sub(prefix_len + suffix_len + 2).max(1);

    let mut pages = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut count = prefix_len + 1;

    let mut close = |current: &mut Vec<String>, count: &mut usize| {
        pages.push(format!("{prefix}\n{}\n{suffix}", current.join("\n")));
        current.clear();
        *count = prefix_len + 1;
    };

    for line in text.split('\n') {
        let chars = line.chars().collect::<Vec<_>>();
        let chunks = if chars.is_empty() {
            vec![String::new()]
        } else {
            chars.chunks(max_line).map(String::from_iter).collect()
        };

        for chunk in chunks {
            let len = chunk.chars().count();
            if !current.is_empty() && count + len + 1 > max_size.saturating_sub(suffix_len) {
                close(&mut current, &mut count);
            }
            count += len + 1;
            current.push(chunk);
        }
    }
    if !current.is_empty() {
        close(&mut current, &mut count);
    }
    pages
}

/// Text pages, each with `"\nPage p/N"` appended when there's more than one.
pub fn text_pages(text: &str, prefix: &str, suffix: &str, max_size: usize) -> Vec<Page> {
    let pages = split_text(text, prefix, suffix, max_size);
    let total = pages.len();
    pages
        .into_iter()
        .enumerate()
        .map(|(i, page)| {
            if total > 1 {
                Page::Text(format!("{page}\nPage {}/{total}", i + 1))
            } else {
                Page::Text(page)
            }
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    First,
    Previous,
    Next,
    Last,
    Stop,
}

impl Control {
    const ALL: [Control; 5] = [
        Control::First,
        Control::Previous,
        Control::Next,
        Control::Last,
        Control::Stop,
    ];

    fn suffix(self) -> &'static str {
        match self {
            Control::First => "first",
            Control::Previous => "prev",
            Control::Next => "next",
            Control::Last => "last",
            Control::Stop => "stop",
        }
    }

    fn emoji(self) -> char {
        match self {
            Control::First => '⏮',
            Control::Previous => '◀',
            Control::Next => '▶',
            Control::Last => '⏭',
            Control::Stop => '⏹',
        }
    }

    fn parse(custom_id: &str, prefix: &str) -> Option<Self> {
        let suffix = custom_id.strip_prefix(prefix)?.strip_prefix('-')?;
        Self::ALL.into_iter().find(|c| c.suffix() == suffix)
    }

    /// The page to show after pressing this. `None` if it doesn't move.
    fn target(self, current: usize, total: usize) -> Option<usize> {
        match self {
            Control::First => Some(0),
            Control::Last => total.checked_sub(1),
            Control::Next => (current + 1 < total).then_some(current + 1),
            Control::Previous => current.checked_sub(1),
            Control::Stop => None,
        }
    }
}

/// Sends pages and lets the owner flip through them with buttons.
#[derive(bon::Builder)]
pub struct Pager<'a> {
    ctx: Context<'a>,
    pages: Vec<Page>,
    /// Message content kept above embed pages.
    #[builder(into)]
    content: Option<String>,
    /// Add a stop button.
    #[builder(default = false)]
    stop: bool,
    /// Delete the message once the pager stops.
    #[builder(default = true)]
    delete_after: bool,
    /// Let the author of the replied-to message use the buttons instead of the invoker.
    #[builder(default = false)]
    reply_author_takes_paginator: bool,
    /// How long to wait for a button press.
    #[builder(default = Duration::from_secs(180))]
    timeout: Duration,
}

impl Pager<'_> {
    /// Who may press the buttons.
    fn owner(&self) -> UserId {
        if self.reply_author_takes_paginator {
            if let poise::Context::Prefix(prefix) = self.ctx {
                if let Some(replied) = &prefix.msg.referenced_message {
                    return replied.author.id;
                }
            }
        }
        self.ctx.author().id
    }

    fn buttons(&self, id_prefix: &str) -> Vec<CreateActionRow> {
        let buttons = Control::ALL
            .into_iter()
            .filter(|c| self.stop || *c != Control::Stop)
            .map(|c| {
                CreateButton::new(format!("{id_prefix}-{}", c.suffix()))
                    .emoji(c.emoji())
                    .style(serenity::ButtonStyle::Secondary)
            })
            .collect();
        vec![CreateActionRow::Buttons(buttons)]
    }

    /// Send the first page and handle button presses until timeout or stop.
    pub async fn paginate(self) -> Result<(), PythonistaError> {
        let ctx = self.ctx;
        let content = self.content.as_deref();
        let Some(first) = self.pages.first() else {
            return Ok(());
        };
        if self.pages.len() == 1 {
            ctx.send(first.reply(content)).await?;
            return Ok(());
        }

        let id_prefix = ctx.id().to_string();
        let owner = self.owner();
        let handle = ctx
            .send(first.reply(content).components(self.buttons(&id_prefix)))
            .await?;

        let mut current = 0;
        loop {
            let filter_prefix = id_prefix.clone();
            let Some(press) = ComponentInteractionCollector::new(ctx)
                .filter(move |press| press.data.custom_id.starts_with(&filter_prefix))
                .timeout(self.timeout)
                .await
            else {
                break;
            };

            if press.user.id != owner {
                let response = CreateInteractionResponseMessage::new()
                    .content("You cannot use this menu")
                    .ephemeral(true);
                press
                    .create_response(ctx, CreateInteractionResponse::Message(response))
                    .await?;
                continue;
            }

            let Some(control) = Control::parse(&press.data.custom_id, &id_prefix) else {
                continue;
            };
            if control == Control::Stop {
                press
                    .create_response(ctx, CreateInteractionResponse::Acknowledge)
                    .await?;
                break;
            }

            match control.target(current, self.pages.len()) {
                Some(page) => {
                    current = page;
                    let update = self.pages[current].update(content);
                    press
                        .create_response(ctx, CreateInteractionResponse::UpdateMessage(update))
                        .await?;
                }
                None => {
                    press
                        .create_response(ctx, CreateInteractionResponse::Acknowledge)
                        .await?;
                }
            }
        }

        if self.delete_after {
            handle.delete(ctx).await?;
        } else {
            let page = self.pages[current].reply(content).components(vec![]);
            handle.edit(ctx, page).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("entry {i}")).collect()
    }

    #[test]
    fn entries_are_numbered_across_pages() {
        let pages = EntryPages::builder()
            .entries(entries(5))
            .per_page(2)
            .build()
            .texts();

        assert_eq!(pages.len(), 3);
        assert_eq!(pages[0].0, "1. entry 1\n2. entry 2");
        assert_eq!(pages[2].0, "5. entry 5");
        assert_eq!(pages[1].1.as_deref(), Some("Page 2/3 (5 entries)"));
    }

    #[test]
    fn single_page_has_no_footer() {
        let pages = EntryPages::builder()
            .entries(entries(3))
            .nocount(true)
            .build()
            .texts();

        assert_eq!(pages, vec![("entry 1\nentry 2\nentry 3".to_string(), None)]);
    }

    #[test]
    fn footer_without_entry_count() {
        let pages = EntryPages::builder()
            .entries(entries(3))
            .per_page(1)
            .show_entry_count(false)
            .build()
            .texts();
        assert_eq!(pages[2].1.as_deref(), Some("Page 3/3"));
    }

    #[test]
    fn content_stays_above_embed_pages() {
        let pages = EntryPages::builder()
            .entries(entries(9))
            .per_page(8)
            .nocount(true)
            .show_entry_count(false)
            .title("Wavelink: player")
            .build()
            .into_pages();
        assert_eq!(pages.len(), 2);

        let reply = pages[1].reply(Some("tip"));
        assert_eq!(reply.content.as_deref(), Some("tip"));
        let json = serde_json::to_value(&reply.embeds[0]).unwrap();
        assert_eq!(json["title"], "Wavelink: player");
        assert_eq!(json["description"], "entry 9");
        assert_eq!(json["footer"]["text"], "Page 2/2");

        // Text pages are the content.
        let text = Page::Text("code".to_string()).reply(Some("tip"));
        assert_eq!(text.content.as_deref(), Some("code"));
    }

    #[test]
    fn text_fits_in_one_page() {
        assert_eq!(
            split_text("a\nb", "```py", "```", 2000),
            vec!["```py\na\nb\n```".to_string()]
        );
    }

    #[test]
    fn text_pages_respect_max_size() {
        let text = (0..100).map(|i| format!("line number {i}")).collect::<Vec<_>>().join("\n");
        let pages = split_text(&text, "```", "```", 400);

        assert!(pages.len() > 1);
        for page in &pages {
            assert!(page.chars().count() <= 200, "{} chars", page.chars().count());
            assert!(page.starts_with("```\n"));
            assert!(page.ends_with("\n```"));
        }
        // Nothing lost.
        let lines: usize = pages.iter().map(|p| p.lines().count() - 2).sum();
        assert_eq!(lines, 100);
    }

    #[test]
    fn long_lines_are_split() {
        let pages = split_text(&"x".repeat(500), "```", "```", 400);
        assert!(pages.len() >= 3);
        assert!(pages.iter().all(|p| p.chars().count() <= 200));
    }

    #[test]
    fn text_footers() {
        let pages = text_pages(&"y\n".repeat(300), "", "", 400);
        let Page::Text(last) = pages.last().unwrap() else {
            panic!("expected text");
        };
        assert!(last.ends_with(&format!("\nPage {}/{}", pages.len(), pages.len())));

        let single = text_pages("short", "", "", 2000);
        assert!(matches!(&single[..], [Page::Text(t)] if t == "\nshort\n"));
    }

    #[test]
    fn page_moves() {
        assert_eq!(Control::Next.target(0, 3), Some(1));
        assert_eq!(Control::Next.target(2, 3), None);
        assert_eq!(Control::Previous.target(0, 3), None);
        assert_eq!(Control::Previous.target(2, 3), Some(1));
        assert_eq!(Control::First.target(2, 3), Some(0));
        assert_eq!(Control::Last.target(0, 3), Some(2));
        assert_eq!(Control::Stop.target(0, 3), None);
    }

    #[test]
    fn control_ids() {
        assert_eq!(Control::parse("123-next", "123"), Some(Control::Next));
        assert_eq!(Control::parse("123-nope", "123"), None);
        assert_eq!(Control::parse("1234-next", "123"), None);
    }
}
