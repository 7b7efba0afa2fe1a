//! Pulls code out of discord markdown code blocks.

/// Code given to a command, with the language tag if it came in a fenced block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Codeblock {
    /// `Some` only when the input was a complete triple backtick block.
    pub language: Option<String>,
    pub content: String,
}

impl Codeblock {
    /// Parse a command argument.
    ///
    /// Accepts plain text, `` `inline` `` code and ```` ```lang\nfenced``` ```` blocks.
    pub fn parse(argument: &str) -> Self {
        let argument = argument.trim();
        if !argument.starts_with('`') {
            return Self {
                language: None,
                content: argument.to_string(),
            };
        }

        let ticks = argument.chars().take_while(|&c| c == '`').count();

        if ticks >= 3 {
            let inner = &argument[3..];
            let inner = inner.strip_suffix("```").unwrap_or(inner);
            return match inner.split_once('\n') {
                Some((lang, body)) if !lang.contains(char::is_whitespace) => Self {
                    language: Some(lang.to_string()),
                    content: body.trim_end_matches('\n').to_string(),
                },
                _ => Self {
                    language: Some(String::new()),
                    content: inner.trim_matches('\n').to_string(),
                },
            };
        }

        let fence = &argument[..ticks];
        let inner = &argument[ticks..];
        let inner = inner.strip_suffix(fence).unwrap_or(inner);
        Self {
            language: None,
            content: inner.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_taken_as_is() {
        let block = Codeblock::parse("print(1)");
        assert_eq!(block.language, None);
        assert_eq!(block.content, "print(1)");
    }

    #[test]
    fn fenced_block_keeps_language() {
        let block = Codeblock::parse("```py\nimport this\nprint(2)\n```");
        assert_eq!(block.language.as_deref(), Some("py"));
        assert_eq!(block.content, "import this\nprint(2)");
    }

    #[test]
    fn fenced_block_without_language() {
        let block = Codeblock::parse("```\nx = 1\n```");
        assert_eq!(block.language.as_deref(), Some(""));
        assert_eq!(block.content, "x = 1");
    }

    #[test]
    fn single_line_fence_is_all_code() {
        let block = Codeblock::parse("```print(3)```");
        assert_eq!(block.language.as_deref(), Some(""));
        assert_eq!(block.content, "print(3)");
    }

    #[test]
    fn inline_code() {
        let block = Codeblock::parse("`1 + 1`");
        assert_eq!(block.language, None);
        assert_eq!(block.content, "1 + 1");
    }
}
