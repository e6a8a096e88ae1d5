//! Template lexer (tokenizer).
//!
//! Converts raw template source text into a stream of [`Token`]s: text
//! literals, variable references (`{{ }}`), block tags (`{% %}`), and
//! comments (`{# #}`). Every token remembers the line it started on so
//! compile errors can point at the offending tag.

use forme_core::error::FormeError;

/// The kind and payload of a lexer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    /// A literal text segment.
    Text(String),
    /// A variable expression: `{{ expression }}`.
    Variable(String),
    /// A block tag: `{% tag arg1 arg2 %}`, split the way Django's
    /// `Token.split_contents` splits it (quoted strings stay whole).
    Block {
        /// The tag name (first word).
        name: String,
        /// The remaining words.
        args: Vec<String>,
    },
    /// A comment: `{# comment text #}`.
    Comment(String),
}

/// A token together with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// What was lexed.
    pub kind: TokenKind,
    /// The line the token starts on.
    pub line: usize,
}

impl Token {
    /// Returns the tag name if this is a block token.
    pub fn block_name(&self) -> Option<&str> {
        match &self.kind {
            TokenKind::Block { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Returns the tag name followed by its arguments, as Django's
    /// `split_contents` does. Non-block tokens yield an empty list.
    pub fn split_contents(&self) -> Vec<String> {
        match &self.kind {
            TokenKind::Block { name, args } => {
                let mut parts = Vec::with_capacity(args.len() + 1);
                parts.push(name.clone());
                parts.extend(args.iter().cloned());
                parts
            }
            _ => Vec::new(),
        }
    }
}

/// Tokenizes a template source string into a sequence of [`Token`]s.
///
/// # Errors
///
/// Returns a `TemplateSyntaxError` if a tag, variable or comment is opened
/// but never closed.
pub fn tokenize(source: &str) -> Result<Vec<Token>, FormeError> {
    let mut tokens = Vec::new();
    let mut remaining = source;
    let mut line = 1;

    while !remaining.is_empty() {
        let Some((pos, tag_type)) = find_next_open(remaining) else {
            tokens.push(Token {
                kind: TokenKind::Text(remaining.to_string()),
                line,
            });
            break;
        };

        if pos > 0 {
            let text = &remaining[..pos];
            tokens.push(Token {
                kind: TokenKind::Text(text.to_string()),
                line,
            });
            line += count_lines(text);
        }

        let after_open = &remaining[pos + 2..];
        let closer = tag_type.closer();
        let Some(end) = after_open.find(closer) else {
            return Err(FormeError::TemplateSyntaxError(format!(
                "Unclosed {} on line {line}: expected '{closer}'",
                tag_type.description()
            )));
        };

        let content = after_open[..end].trim();
        let kind = match tag_type {
            TagType::Variable => TokenKind::Variable(content.to_string()),
            TagType::Block => parse_block_content(content),
            TagType::Comment => TokenKind::Comment(content.to_string()),
        };
        tokens.push(Token { kind, line });

        line += count_lines(&after_open[..end]);
        remaining = &after_open[end + 2..];
    }

    Ok(tokens)
}

#[derive(Debug, Clone, Copy)]
enum TagType {
    Variable,
    Block,
    Comment,
}

impl TagType {
    const fn closer(self) -> &'static str {
        match self {
            Self::Variable => "}}",
            Self::Block => "%}",
            Self::Comment => "#}",
        }
    }

    const fn description(self) -> &'static str {
        match self {
            Self::Variable => "variable tag",
            Self::Block => "block tag",
            Self::Comment => "comment tag",
        }
    }
}

fn count_lines(s: &str) -> usize {
    s.matches('\n').count()
}

/// Finds the next template tag opening in the source.
fn find_next_open(s: &str) -> Option<(usize, TagType)> {
    [
        ("{{", TagType::Variable),
        ("{%", TagType::Block),
        ("{#", TagType::Comment),
    ]
    .into_iter()
    .filter_map(|(opener, tag_type)| s.find(opener).map(|pos| (pos, tag_type)))
    .min_by_key(|(pos, _)| *pos)
}

/// Parses the content inside `{% ... %}` into a block token.
fn parse_block_content(content: &str) -> TokenKind {
    let mut parts = split_block_args(content).into_iter();
    TokenKind::Block {
        name: parts.next().unwrap_or_default(),
        args: parts.collect(),
    }
}

/// Splits block tag content into words, keeping quoted strings whole.
pub fn split_block_args(content: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for ch in content.chars() {
        match ch {
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                current.push(ch);
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                current.push(ch);
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }

    if !current.is_empty() {
        parts.push(current);
    }

    parts
}
