//! Flattening and wrapping for viewport rendering
//!
//! A diff becomes one linear sequence of rows so that a viewport can render
//! only `visible_range` of it. With wrapping on, long lines occupy several
//! physical rows; only the first carries the line number.

use super::DiffFile;
use std::ops::Range;
use unicode_width::UnicodeWidthChar;

/// Columns a tab occupies when rendered
pub const TAB_WIDTH: usize = 4;

/// A logical row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffRow {
    FileHeader { file: usize },
    /// Unchanged lines omitted before `hunk`
    Gap { file: usize, hunk: usize, hidden: u32 },
    /// Spacer before `file`
    FileGap { file: usize },
    Content { file: usize, hunk: usize, line: usize },
}

/// A physical row. `line_start` and `line_length` count characters of the
/// line's content; they are zero for non-content rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WrappedRow {
    pub row: DiffRow,
    pub line_start: usize,
    pub line_length: usize,
    pub is_continuation: bool,
}

impl WrappedRow {
    fn single(row: DiffRow) -> Self {
        Self {
            row,
            line_start: 0,
            line_length: 0,
            is_continuation: false,
        }
    }
}

/// Logical rows in display order.
pub fn flatten_rows(files: &[DiffFile]) -> Vec<DiffRow> {
    let mut rows = Vec::new();

    for (file_index, file) in files.iter().enumerate() {
        if file_index > 0 {
            rows.push(DiffRow::FileGap { file: file_index });
        }
        rows.push(DiffRow::FileHeader { file: file_index });

        for (hunk_index, hunk) in file.hunks.iter().enumerate() {
            if hunk_index > 0 {
                let prev = &file.hunks[hunk_index - 1];
                let prev_end = old_side_start(prev.old_start, prev.old_count).saturating_add(prev.old_count);
                let hidden = old_side_start(hunk.old_start, hunk.old_count).saturating_sub(prev_end);
                if hidden > 0 {
                    rows.push(DiffRow::Gap {
                        file: file_index,
                        hunk: hunk_index,
                        hidden,
                    });
                }
            }
            for line_index in 0..hunk.lines.len() {
                rows.push(DiffRow::Content {
                    file: file_index,
                    hunk: hunk_index,
                    line: line_index,
                });
            }
        }
    }

    rows
}

/// First old-side line a hunk covers. A hunk that only inserts names the
/// line it follows.
fn old_side_start(start: u32, count: u32) -> u32 {
    if count == 0 {
        start.saturating_add(1)
    } else {
        start
    }
}

/// Physical rows for a viewport `width` columns wide.
///
/// Without wrapping every line is one row showing the window that starts
/// `horizontal_scroll` characters in.
pub fn flatten(files: &[DiffFile], width: usize, wrap: bool, horizontal_scroll: usize) -> Vec<WrappedRow> {
    let width = width.max(1);
    let mut wrapped = Vec::new();

    for row in flatten_rows(files) {
        let DiffRow::Content { file, hunk, line } = row else {
            wrapped.push(WrappedRow::single(row));
            continue;
        };
        let content = &files[file].hunks[hunk].lines[line].content;

        if wrap {
            for (i, (line_start, line_length)) in segment_line(content, width).into_iter().enumerate() {
                wrapped.push(WrappedRow {
                    row,
                    line_start,
                    line_length,
                    is_continuation: i > 0,
                });
            }
        } else {
            let (line_start, line_length) = window(content, horizontal_scroll, width);
            wrapped.push(WrappedRow {
                row,
                line_start,
                line_length,
                is_continuation: false,
            });
        }
    }

    wrapped
}

fn char_width(c: char) -> usize {
    if c == '\t' {
        TAB_WIDTH
    } else {
        c.width().unwrap_or(0)
    }
}

/// Split a line into `(start, length)` character runs no wider than `width`.
/// An empty line still yields one run.
fn segment_line(content: &str, width: usize) -> Vec<(usize, usize)> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut columns = 0;

    for c in content.chars() {
        let w = char_width(c);
        if count > 0 && columns + w > width {
            segments.push((start, count));
            start += count;
            count = 0;
            columns = 0;
        }
        count += 1;
        columns += w;
    }

    if count > 0 || segments.is_empty() {
        segments.push((start, count));
    }
    segments
}

fn window(content: &str, scroll: usize, width: usize) -> (usize, usize) {
    let start = scroll.min(content.chars().count());
    let mut columns = 0;
    let mut length = 0;
    for c in content.chars().skip(start) {
        let w = char_width(c);
        if columns + w > width {
            break;
        }
        columns += w;
        length += 1;
    }
    (start, length)
}

/// Characters `[start, start + len)` of `content`.
pub fn slice_columns(content: &str, start: usize, len: usize) -> &str {
    let begin = content
        .char_indices()
        .nth(start)
        .map_or(content.len(), |(i, _)| i);
    let end = content[begin..]
        .char_indices()
        .nth(len)
        .map_or(content.len(), |(i, _)| begin + i);
    &content[begin..end]
}

/// Row indices a viewport should render, clamped to the row count.
pub fn visible_range(scroll_top: usize, viewport_height: usize, total_rows: usize) -> Range<usize> {
    let start = scroll_top.min(total_rows);
    let end = start.saturating_add(viewport_height).min(total_rows);
    start..end
}

pub fn max_line_number(files: &[DiffFile]) -> u32 {
    files
        .iter()
        .flat_map(|f| f.hunks.iter())
        .flat_map(|h| h.lines.iter())
        .flat_map(|l| [l.old_line_number, l.new_line_number])
        .flatten()
        .max()
        .unwrap_or(0)
}

/// Digits needed for the line-number gutter.
pub fn line_number_width(max_line: u32) -> usize {
    max_line.max(1).to_string().len()
}

/// Memoized `flatten` output.
///
/// Recomputed only when the content generation, width, wrap mode or (when
/// not wrapping) the horizontal scroll changes.
#[derive(Debug, Default)]
pub struct WrapCache {
    key: Option<WrapKey>,
    rows: Vec<WrappedRow>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WrapKey {
    generation: u64,
    width: usize,
    wrap: bool,
    scroll: usize,
}

impl WrapCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(
        &mut self,
        files: &[DiffFile],
        generation: u64,
        width: usize,
        wrap: bool,
        horizontal_scroll: usize,
    ) -> &[WrappedRow] {
        let key = WrapKey {
            generation,
            width,
            wrap,
            scroll: if wrap { 0 } else { horizontal_scroll },
        };
        if self.key != Some(key) {
            self.rows = flatten(files, width, wrap, horizontal_scroll);
            self.key = Some(key);
        }
        &self.rows
    }

    pub fn invalidate(&mut self) {
        self.key = None;
    }
}
