//! Punctuation smartening
//!
//! Straight quotes, backtick quotes, double hyphens and runs of three dots in
//! body text are replaced by their typographic forms. Whether a straight quote
//! opens or closes is decided from the characters around it, looking through
//! inline markup but never across block elements.

use crate::{
    dom::{Document, Element, Node},
    error::KepubError,
    transform::{SideEffect, Transform, TransformContext, counted},
};

/// Elements whose text is reproduced verbatim
const SKIPPED_TAGS: [&str; 8] = ["code", "kbd", "math", "pre", "samp", "script", "style", "tt"];

/// Elements quotes never pair across
const BLOCK_TAGS: [&str; 19] = [
    "address",
    "blockquote",
    "body",
    "caption",
    "dd",
    "div",
    "dt",
    "figcaption",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "li",
    "p",
    "section",
    "td",
    "th",
];

/// Multi-character sequences, longest first
const SEQUENCES: [(&str, &str); 6] = [
    ("---", "\u{2014}"),
    ("--", "\u{2014}"),
    (". . .", "\u{2026}"),
    ("...", "\u{2026}"),
    ("``", "\u{201c}"),
    ("''", "\u{201d}"),
];

/// Characters after which a quote opens
const OPENERS: [char; 8] = ['(', '[', '{', '-', '\u{2013}', '\u{2014}', '\u{201c}', '\u{2018}'];

/// Stands in for markup that reads as part of a word, such as `<code>` or `&foo;`
const WORD: char = 'x';

/// Replaces straight punctuation with typographic punctuation
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartenPunctuation;

/// A stretch of body content, in document order
enum Piece<'a> {
    Text(&'a mut String),
    Word,
    Break,
}

impl SmartenPunctuation {
    fn collect<'a>(element: &'a mut Element, pieces: &mut Vec<Piece<'a>>) {
        let block = BLOCK_TAGS.contains(&element.local_name());
        if block {
            pieces.push(Piece::Break);
        }

        for child in element.children.iter_mut() {
            match child {
                Node::Text(text) => pieces.push(Piece::Text(text)),
                Node::Element(child) if SKIPPED_TAGS.contains(&child.local_name()) => {
                    pieces.push(Piece::Word)
                }
                Node::Element(child) => Self::collect(child, pieces),
                Node::EntityRef(_) | Node::CData(_) => pieces.push(Piece::Word),
                Node::Comment(_) | Node::Pi(_) => {}
            }
        }

        if block {
            pieces.push(Piece::Break);
        }
    }

    fn smarten(pieces: &mut [Piece]) -> usize {
        let mut count = 0;
        for piece in pieces.iter_mut() {
            if let Piece::Text(text) = piece {
                count += replace_sequences(text);
            }
        }

        // First character after each piece, within the same block
        let mut following = vec![None; pieces.len()];
        let mut next = None;
        for (index, piece) in pieces.iter().enumerate().rev() {
            following[index] = next;
            next = match piece {
                Piece::Text(text) => text.chars().next().or(next),
                Piece::Word => Some(WORD),
                Piece::Break => None,
            };
        }

        let mut previous = None;
        for (piece, following) in pieces.iter_mut().zip(following) {
            match piece {
                Piece::Text(text) => {
                    let (smartened, replaced) =
                        smarten_quotes(text.as_str(), previous, following);
                    if replaced > 0 {
                        **text = smartened;
                        count += replaced;
                    }
                    previous = text.chars().last().or(previous);
                }
                Piece::Word => previous = Some(WORD),
                Piece::Break => previous = None,
            }
        }

        count
    }
}

fn replace_sequences(text: &mut String) -> usize {
    let mut count = 0;
    for (from, to) in SEQUENCES {
        let found = text.matches(from).count();
        if found > 0 {
            *text = text.replace(from, to);
            count += found;
        }
    }

    count
}

/// Curls the straight quotes of `text`
///
/// `previous` and `following` are the characters around the text, `None` at
/// block boundaries.
fn smarten_quotes(
    text: &str,
    mut previous: Option<char>,
    following: Option<char>,
) -> (String, usize) {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut count = 0;

    for (index, &ch) in chars.iter().enumerate() {
        let next = chars.get(index + 1).copied().or(following);
        let smart = match ch {
            '"' if opens(previous, next) => '\u{201c}',
            '"' => '\u{201d}',
            '`' => '\u{2018}',
            // Elided digits, as in '80s
            '\'' if next.is_some_and(|c| c.is_ascii_digit())
                && !previous.is_some_and(char::is_alphanumeric) =>
            {
                '\u{2019}'
            }
            '\'' if opens(previous, next) => '\u{2018}',
            '\'' => '\u{2019}',
            ch => ch,
        };

        if smart != ch {
            count += 1;
        }
        result.push(smart);
        previous = Some(smart);
    }

    (result, count)
}

/// A quote opens when it follows a boundary and precedes text
fn opens(previous: Option<char>, next: Option<char>) -> bool {
    let after_boundary = previous.is_none_or(|c| c.is_whitespace() || OPENERS.contains(&c));
    let before_text = next.is_some_and(|c| !c.is_whitespace());
    after_boundary && before_text
}

impl Transform for SmartenPunctuation {
    fn name(&self) -> &'static str {
        "punctuation smartening"
    }

    fn apply(
        &self,
        doc: &mut Document,
        ctx: &mut TransformContext,
    ) -> Result<Vec<SideEffect>, KepubError> {
        let Some(body) = doc.body_mut() else {
            return Ok(vec![]);
        };

        let mut pieces = Vec::new();
        Self::collect(body, &mut pieces);
        let count = Self::smarten(&mut pieces);
        if count > 0 {
            ctx.debug(format!("{count} punctuation marks smartened"));
        }

        Ok(counted(count, SideEffect::Smartened))
    }
}
