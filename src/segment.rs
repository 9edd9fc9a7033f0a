//! Sentence segmentation
//!
//! Span wrapping only needs to know where sentence-like units start and end,
//! so segmentation is a pluggable capability. [PunctuationSegmenter] is the
//! built-in fallback used when no locale-aware segmenter is supplied.

use std::ops::Range;

/// Characters ending a sentence when followed by whitespace or the end of the text
const TERMINATORS: [char; 4] = ['.', '!', '?', ':'];

/// Full-width terminators, which need no following whitespace in CJK text
const FULL_WIDTH_TERMINATORS: [char; 3] = ['\u{3002}', '\u{ff01}', '\u{ff1f}'];

/// Characters that may trail a terminator and still belong to the sentence
const CLOSERS: [char; 7] = [
    '\'', '"', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}', '\u{2026}',
];

/// Splits text into sentence-like units
pub trait SentenceSegmenter {
    /// Returns the byte ranges of the sentences of `text`, in order
    ///
    /// Ranges never overlap and never start or end with whitespace; whatever
    /// lies between them is kept outside of the sentence spans.
    fn segment(&self, text: &str, locale: Option<&str>) -> Vec<Range<usize>>;
}

/// Punctuation and whitespace based sentence boundaries
///
/// A sentence ends after `.`, `!`, `?` or `:` (plus any closing quotes or
/// ellipsis) when followed by whitespace or the end of the text, and at every
/// line break. For Chinese and Japanese locales the full-width terminators
/// `。！？` end a sentence even without following whitespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct PunctuationSegmenter;

impl PunctuationSegmenter {
    fn is_cjk(locale: Option<&str>) -> bool {
        locale
            .and_then(|locale| locale.split(['-', '_']).next())
            .is_some_and(|lang| matches!(lang.to_ascii_lowercase().as_str(), "zh" | "ja"))
    }
}

impl SentenceSegmenter for PunctuationSegmenter {
    fn segment(&self, text: &str, locale: Option<&str>) -> Vec<Range<usize>> {
        let cjk = Self::is_cjk(locale);

        let mut ranges = Vec::new();
        let mut start: Option<usize> = None;
        let mut end = 0;

        let mut chars = text.char_indices().peekable();
        while let Some((index, ch)) = chars.next() {
            if ch.is_whitespace() {
                if ch == '\n' {
                    if let Some(start) = start.take() {
                        ranges.push(start..end);
                    }
                }
                continue;
            }

            start.get_or_insert(index);
            end = index + ch.len_utf8();

            let full_width = FULL_WIDTH_TERMINATORS.contains(&ch);
            if !full_width && !TERMINATORS.contains(&ch) {
                continue;
            }

            while let Some(&(index, next)) = chars.peek() {
                if !CLOSERS.contains(&next) {
                    break;
                }
                end = index + next.len_utf8();
                chars.next();
            }

            let at_boundary = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_boundary || (full_width && cjk) {
                if let Some(start) = start.take() {
                    ranges.push(start..end);
                }
            }
        }

        if let Some(start) = start {
            ranges.push(start..end);
        }

        ranges
    }
}

#[cfg(test)]
mod tests {
    use crate::segment::{PunctuationSegmenter, SentenceSegmenter};

    fn sentences<'a>(text: &'a str, locale: Option<&str>) -> Vec<&'a str> {
        PunctuationSegmenter
            .segment(text, locale)
            .into_iter()
            .map(|range| &text[range])
            .collect()
    }

    #[test]
    fn test_two_sentences() {
        let ranges = PunctuationSegmenter.segment("Hello. World.", None);
        assert_eq!(ranges, vec![0..6, 7..13]);
    }

    /// Leading and trailing whitespace stays outside of the ranges
    #[test]
    fn test_whitespace_outside() {
        assert_eq!(
            sentences("  One!  Two?  ", None),
            vec!["One!", "Two?"]
        );
        assert!(sentences(" \n\t ", None).is_empty());
        assert!(sentences("", None).is_empty());
    }

    #[test]
    fn test_no_terminator() {
        assert_eq!(sentences("no punctuation here", None), vec!["no punctuation here"]);
    }

    #[test]
    fn test_inner_punctuation() {
        assert_eq!(
            sentences("Pi is 3.14 roughly. Wait... what", None),
            vec!["Pi is 3.14 roughly.", "Wait...", "what"]
        );
    }

    #[test]
    fn test_closing_quotes() {
        assert_eq!(
            sentences("\u{201c}Stop!\u{201d} she said. Then: nothing.", None),
            vec!["\u{201c}Stop!\u{201d}", "she said.", "Then:", "nothing."]
        );
    }

    #[test]
    fn test_line_breaks() {
        assert_eq!(
            sentences("first line\nsecond line", None),
            vec!["first line", "second line"]
        );
    }

    #[test]
    fn test_cjk_terminators() {
        let text = "你好。世界！";
        assert_eq!(sentences(text, Some("zh-CN")), vec!["你好。", "世界！"]);
        assert_eq!(sentences(text, Some("en")), vec![text]);
    }
}
