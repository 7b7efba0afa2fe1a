//! Misc

pub mod backoff;
pub mod codeblock;
pub mod events;
pub mod github;
pub mod guess;
pub mod help_forum;
pub mod info;
pub mod manuals;
pub mod moderation;
pub mod paginator;
pub mod papi;
pub mod server;
pub mod starboard;

use rand::Rng;

use crate::serenity;

/// Wrap `content` in a discord code block.
///
/// Inner triple backticks are replaced so they can't end the block early.
pub fn to_codeblock(content: &str, language: &str, escape_md: bool) -> String {
    let mut content = content.replace("```", "'''");
    if escape_md {
        content = escape_markdown(&content);
    }
    if content.is_empty() {
        content = "<<Eval returned no output.>>".to_string();
    }
    format!("```{language}\n{content}\n```")
}

/// Escape the characters discord treats as markdown.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '_' | '`' | '~' | '|' | '>' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Collapse whitespace and cut `text` to at most `width` chars, ending in `placeholder` when cut.
pub fn shorten(text: &str, width: usize, placeholder: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= width {
        return collapsed;
    }

    let budget = width.saturating_sub(placeholder.chars().count());
    let mut out = String::new();
    for word in collapsed.split(' ') {
        let extra = if out.is_empty() { 0 } else { 1 };
        if out.chars().count() + extra + word.chars().count() > budget {
            break;
        }
        if extra == 1 {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.push_str(placeholder);
    out
}

/// A random soft colour for embeds.
pub fn random_pastel_colour() -> serenity::Colour {
    let hue: f64 = rand::thread_rng().gen_range(0.0..1.0);
    let (r, g, b) = hsv_to_rgb(hue, 0.28, 0.97);
    serenity::Colour::from_rgb(r, g, b)
}

/// Convert hsv in `[0, 1]` to rgb bytes.
fn hsv_to_rgb(h: f64, s: f64, v: f64) -> (u8, u8, u8) {
    let i = (h * 6.0).floor();
    let f = h * 6.0 - i;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    let (r, g, b) = match i as u32 % 6 {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    let byte = |x: f64| (x * 255.0).round() as u8;
    (byte(r), byte(g), byte(b))
}

/// Discord's markdown for a timestamp rendered in the reader's timezone.
///
/// Styles: `F` long date time, `f` short date time, `R` relative.
pub fn format_dt(ts: &serenity::Timestamp, style: char) -> String {
    format!("<t:{}:{style}>", ts.unix_timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codeblock_replaces_inner_fences() {
        let block = to_codeblock("print('```')", "py", false);
        assert_eq!(block, "```py\nprint(''''')\n```");
    }

    #[test]
    fn empty_codeblock_says_so() {
        assert_eq!(
            to_codeblock("", "py", true),
            "```py\n<<Eval returned no output.>>\n```"
        );
    }

    #[test]
    fn markdown_is_escaped() {
        assert_eq!(escape_markdown("*hi* _there_"), "\\*hi\\* \\_there\\_");
    }

    #[test]
    fn shorten_cuts_on_words() {
        assert_eq!(shorten("hello   world", 20, "..."), "hello world");
        assert_eq!(shorten("one two three four", 12, "..."), "one two...");
    }

    #[test]
    fn pastel_colours_are_light() {
        for _ in 0..32 {
            let colour = random_pastel_colour();
            assert!(colour.r() >= 170 && colour.g() >= 170 && colour.b() >= 170);
        }
    }

    #[test]
    fn timestamps_use_discord_markdown() {
        let ts = serenity::Timestamp::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(format_dt(&ts, 'R'), "<t:1700000000:R>");
    }
}
