//! Syntax highlighting using syntect-assets (bat themes)
//!
//! Diff lines are highlighted one at a time without parser state carried
//! between them, so a line's spans depend only on its text and language.
//! Results live in a bounded cache owned by the highlighter.

use moka::sync::Cache;
use std::path::Path;
use std::sync::Arc;
use syntect::easy::HighlightLines;
use syntect::highlighting::{FontStyle, Style};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect_assets::assets::HighlightingAssets;
use tracing::debug;

/// Highlighted lines kept in memory
const CACHE_CAPACITY: u64 = 10_000;

/// Foreground and modifiers for one span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStyle {
    pub fg: (u8, u8, u8),
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
}

/// A highlighted byte range within a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyntaxSpan {
    pub start: usize,
    pub end: usize,
    pub style: TextStyle,
}

pub struct SyntaxHighlighter {
    assets: HighlightingAssets,
    theme_name: String,
    cache: Cache<(String, String), Arc<Vec<SyntaxSpan>>>,
}

impl SyntaxHighlighter {
    /// Theme falls back to `$BAT_THEME`, then the bat default.
    pub fn new(theme_name: Option<&str>) -> Self {
        let theme_name = theme_name
            .map(|s| s.to_string())
            .or_else(|| std::env::var("BAT_THEME").ok())
            .unwrap_or_else(|| HighlightingAssets::default_theme().to_string());
        debug!(theme = %theme_name, "syntax highlighter ready");
        Self {
            assets: HighlightingAssets::from_binary(),
            theme_name,
            cache: Cache::new(CACHE_CAPACITY),
        }
    }

    /// Spans for a single line of `file_path`. Empty when the language is
    /// unknown to the parser or highlighting fails.
    pub fn highlight_line(&self, text: &str, file_path: &str) -> Arc<Vec<SyntaxSpan>> {
        let Ok(syntax_set) = self.assets.get_syntax_set() else {
            return Arc::default();
        };
        let syntax = find_syntax(syntax_set, file_path);
        let key = (syntax.name.clone(), text.to_string());
        self.cache
            .get_with(key, || Arc::new(self.highlight_uncached(text, syntax, syntax_set)))
    }

    fn highlight_uncached(&self, text: &str, syntax: &SyntaxReference, syntax_set: &SyntaxSet) -> Vec<SyntaxSpan> {
        let theme = self.assets.get_theme(&self.theme_name);
        let mut highlighter = HighlightLines::new(syntax, theme);
        let line = format!("{text}\n");
        let Ok(ranges) = highlighter.highlight_line(&line, syntax_set) else {
            return Vec::new();
        };

        let mut spans = Vec::with_capacity(ranges.len());
        let mut offset = 0usize;
        for (style, segment) in ranges {
            let len = segment.trim_end_matches('\n').len();
            if len > 0 {
                spans.push(SyntaxSpan {
                    start: offset,
                    end: offset + len,
                    style: to_text_style(style),
                });
            }
            offset += segment.len();
        }
        spans.retain(|span| span.end <= text.len());
        spans
    }
}

fn find_syntax<'a>(syntax_set: &'a SyntaxSet, file_path: &str) -> &'a SyntaxReference {
    syntax_set
        .find_syntax_for_file(file_path)
        .ok()
        .flatten()
        .or_else(|| {
            Path::new(file_path)
                .extension()
                .and_then(|ext| ext.to_str())
                .and_then(|ext| syntax_set.find_syntax_by_extension(ext))
        })
        .unwrap_or_else(|| syntax_set.find_syntax_plain_text())
}

fn to_text_style(style: Style) -> TextStyle {
    TextStyle {
        fg: (style.foreground.r, style.foreground.g, style.foreground.b),
        bold: style.font_style.contains(FontStyle::BOLD),
        italic: style.font_style.contains(FontStyle::ITALIC),
        underline: style.font_style.contains(FontStyle::UNDERLINE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans_cover_line() {
        let highlighter = SyntaxHighlighter::new(None);
        let text = "fn main() { let x = 1; }";
        let spans = highlighter.highlight_line(text, "src/main.rs");
        assert!(!spans.is_empty());
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans.last().unwrap().end, text.len());
        assert!(spans.windows(2).all(|w| w[0].end <= w[1].start));
    }

    #[test]
    fn test_repeated_line_is_cached() {
        let highlighter = SyntaxHighlighter::new(None);
        let a = highlighter.highlight_line("let y = 2;", "lib.rs");
        let b = highlighter.highlight_line("let y = 2;", "other.rs");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_empty_line_has_no_spans() {
        let highlighter = SyntaxHighlighter::new(None);
        assert!(highlighter.highlight_line("", "a.rs").is_empty());
    }
}
