//! Rendering

use super::app::{App, Focus, LoadedDiff, Mode};
use crate::diff::{slice_columns, visible_range, ChangeType, DiffLine, DiffRow, LineKind, SegmentKind, WrappedRow};
use crate::revlog::strip_ansi;
use crate::syntax::SyntaxSpan;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

/// Height of the thread panel under the diff
const THREAD_PANEL_HEIGHT: u16 = 8;

const SHORT_ID_LEN: usize = 12;

pub fn draw(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(f.area());

    let panes = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(chunks[0]);

    render_log(f, app, panes[0]);

    let has_thread = app
        .focused_entry()
        .zip(app.diff.as_ref())
        .is_some_and(|(entry, diff)| diff.threads.contains_key(&entry.id) || diff.stale_threads() > 0);
    if has_thread {
        let right = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(0), Constraint::Length(THREAD_PANEL_HEIGHT)])
            .split(panes[1]);
        render_diff(f, app, right[0]);
        render_threads(f, app, right[1]);
    } else {
        render_diff(f, app, panes[1]);
    }

    render_status(f, app, chunks[1]);

    if let Mode::Comment { input, .. } = &app.mode {
        let area = centered_rect(60, 30, f.area());
        f.render_widget(Clear, area);
        f.render_widget(input, area);
    }
    if app.show_help {
        render_help(f);
    }
}

fn pane_block(title: String, focused: bool) -> Block<'static> {
    let border = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    Block::default().borders(Borders::ALL).border_style(border).title(title)
}

fn render_log(f: &mut Frame, app: &App, area: Rect) {
    let mut title = format!(" Log ({}", app.commits.len());
    if app.has_more {
        title.push('+');
    }
    title.push(')');
    if app.log_loading {
        title.push_str(" loading...");
    }
    title.push(' ');

    let items: Vec<ListItem> = app
        .commits
        .iter()
        .map(|commit| {
            let mut style = Style::default();
            if commit.is_working_copy {
                style = style.add_modifier(Modifier::BOLD);
            }
            if commit.immutable {
                style = style.fg(Color::Blue);
            }
            let lines: Vec<Line> = commit
                .display_lines
                .iter()
                .map(|line| Line::styled(strip_ansi(line), style))
                .collect();
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(pane_block(title, app.focus == Focus::Log))
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));
    let mut state = ListState::default();
    if !app.commits.is_empty() {
        state.select(Some(app.selected));
    }
    f.render_stateful_widget(list, area, &mut state);
}

fn render_diff(f: &mut Frame, app: &mut App, area: Rect) {
    let title = match (&app.diff, app.selected_commit()) {
        (Some(diff), _) => format!(
            " {} {} ",
            short_id(&diff.revision.change_id),
            diff.revision.description
        ),
        (None, Some(_)) if app.diff_loading => " Loading diff... ".to_string(),
        _ => " Diff ".to_string(),
    };
    let block = pane_block(title, app.focus == Focus::Diff);
    let inner = block.inner(area);
    f.render_widget(block, area);

    let Some(diff) = &app.diff else {
        return;
    };
    if diff.files.is_empty() {
        f.render_widget(Paragraph::new(" (empty revision)"), inner);
        return;
    }

    // marker, two line numbers, prefix
    let gutter = 2 + (diff.number_width + 1) * 2 + 1;
    let width = (inner.width as usize).saturating_sub(gutter).max(1);
    let height = inner.height as usize;
    app.viewport = (width, height);

    let rows = app
        .wrap_cache
        .rows(&diff.files, diff.generation, width, app.wrap, app.horizontal_scroll);
    app.scroll_top = app.scroll_top.min(rows.len().saturating_sub(1));
    let focused = diff.index.get(app.focused_hunk).map(|e| (e.file_index, e.hunk_index));

    let lines: Vec<Line> = rows[visible_range(app.scroll_top, height, rows.len())]
        .iter()
        .map(|row| render_row(app.highlighter.as_ref(), diff, row, focused))
        .collect();
    f.render_widget(Paragraph::new(lines), inner);
}

/// Ids are stored in full; headers show the same prefix length jj does.
fn short_id(id: &str) -> &str {
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

fn render_row(
    highlighter: Option<&crate::syntax::SyntaxHighlighter>,
    diff: &LoadedDiff,
    row: &WrappedRow,
    focused: Option<(usize, usize)>,
) -> Line<'static> {
    match row.row {
        DiffRow::FileHeader { file } => {
            let file = &diff.files[file];
            let kind = match file.change_type {
                ChangeType::Added => "added",
                ChangeType::Modified => "modified",
                ChangeType::Deleted => "deleted",
                ChangeType::Renamed => "renamed",
                ChangeType::Copied => "copied",
            };
            let mut spans = vec![
                Span::styled(
                    format!("── {} ", file.display_name()),
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                ),
                Span::styled(format!("({kind}) "), Style::default().fg(Color::DarkGray)),
                Span::styled(format!("+{}", file.additions), Style::default().fg(Color::Green)),
                Span::raw(" "),
                Span::styled(format!("-{}", file.deletions), Style::default().fg(Color::Red)),
            ];
            if file.is_binary {
                spans.push(Span::styled(" binary", Style::default().fg(Color::Yellow)));
            }
            Line::from(spans)
        }
        DiffRow::FileGap { .. } => Line::default(),
        DiffRow::Gap { hidden, .. } => Line::styled(
            format!("  ⋯ {hidden} unchanged lines"),
            Style::default().fg(Color::DarkGray),
        ),
        DiffRow::Content { file, hunk, line } => {
            let diff_line = &diff.files[file].hunks[hunk].lines[line];
            if diff_line.kind == LineKind::HunkHeader {
                return render_hunk_header(diff, file, hunk, diff_line, focused == Some((file, hunk)));
            }
            render_content(highlighter, diff, (file, hunk, line), diff_line, row)
        }
    }
}

fn render_hunk_header(diff: &LoadedDiff, file: usize, hunk: usize, line: &DiffLine, focused: bool) -> Line<'static> {
    let id = diff.hunk_id(file, hunk).unwrap_or("?");
    let marker = if focused { "▶ " } else { "  " };
    let mut spans = vec![
        Span::styled(marker, Style::default().fg(Color::Yellow)),
        Span::styled(format!("{id} "), Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
        Span::styled(line.content.clone(), Style::default().fg(Color::Magenta)),
    ];
    let count = diff.comment_count(id);
    if count > 0 {
        spans.push(Span::styled(format!("  ● {count}"), Style::default().fg(Color::Yellow)));
    }
    Line::from(spans)
}

fn render_content(
    highlighter: Option<&crate::syntax::SyntaxHighlighter>,
    diff: &LoadedDiff,
    key: (usize, usize, usize),
    line: &DiffLine,
    row: &WrappedRow,
) -> Line<'static> {
    let width = diff.number_width;
    let number = |n: Option<u32>| n.map_or_else(|| " ".repeat(width), |n| format!("{n:>width$}"));
    let gutter = if row.is_continuation {
        format!("  {} {} ", " ".repeat(width), " ".repeat(width))
    } else {
        format!("  {} {} ", number(line.old_line_number), number(line.new_line_number))
    };

    let base = match line.kind {
        LineKind::Addition => Style::default().fg(Color::Green),
        LineKind::Deletion => Style::default().fg(Color::Red),
        _ => Style::default(),
    };
    let prefix = if row.is_continuation { " " } else { line.prefix() };

    let mut spans = vec![
        Span::styled(gutter, Style::default().fg(Color::DarkGray)),
        Span::styled(prefix.to_string(), base),
    ];

    let window = byte_window(&line.content, row.line_start, row.line_length);

    let ranges: Vec<(usize, usize, Style)> = if let Some(segments) = diff.word_diffs.get(&key) {
        let emphasis = base.add_modifier(Modifier::BOLD | Modifier::UNDERLINED);
        let mut offset = 0;
        segments
            .iter()
            .map(|segment| {
                let start = offset;
                offset += segment.text.len();
                let style = if segment.kind == SegmentKind::Unchanged { base } else { emphasis };
                (start, offset, style)
            })
            .collect()
    } else if let (Some(highlighter), LineKind::Context) = (highlighter, line.kind) {
        let file_path = &diff.files[key.0].name;
        highlighter
            .highlight_line(&line.content, file_path)
            .iter()
            .map(|span: &SyntaxSpan| (span.start, span.end, syntax_style(span)))
            .collect()
    } else {
        Vec::new()
    };

    spans.extend(styled_window(&line.content, window, &ranges, base));
    Line::from(spans)
}

/// Byte range of characters `[start, start + len)`.
fn byte_window(content: &str, start: usize, len: usize) -> std::ops::Range<usize> {
    let begin = content
        .char_indices()
        .nth(start)
        .map_or(content.len(), |(i, _)| i);
    begin..begin + slice_columns(content, start, len).len()
}

fn syntax_style(span: &SyntaxSpan) -> Style {
    let (r, g, b) = span.style.fg;
    let mut style = Style::default().fg(Color::Rgb(r, g, b));
    if span.style.bold {
        style = style.add_modifier(Modifier::BOLD);
    }
    if span.style.italic {
        style = style.add_modifier(Modifier::ITALIC);
    }
    if span.style.underline {
        style = style.add_modifier(Modifier::UNDERLINED);
    }
    style
}

/// Spans covering `window` of `content`, styled by byte `ranges` and `base`
/// elsewhere. Tabs are expanded.
fn styled_window(
    content: &str,
    window: std::ops::Range<usize>,
    ranges: &[(usize, usize, Style)],
    base: Style,
) -> Vec<Span<'static>> {
    let expand = |s: &str| s.replace('\t', "    ");
    let mut spans = Vec::new();
    let mut pos = window.start;

    for &(start, end, style) in ranges {
        let start = start.max(pos);
        let end = end.min(window.end);
        if start >= end || !content.is_char_boundary(start) || !content.is_char_boundary(end) {
            continue;
        }
        if start > pos {
            spans.push(Span::styled(expand(&content[pos..start]), base));
        }
        spans.push(Span::styled(expand(&content[start..end]), style));
        pos = end;
    }
    if pos < window.end {
        spans.push(Span::styled(expand(&content[pos..window.end]), base));
    }
    spans
}

fn render_threads(f: &mut Frame, app: &App, area: Rect) {
    let (Some(diff), Some(entry)) = (&app.diff, app.focused_entry()) else {
        return;
    };

    let mut lines = Vec::new();
    if let Some(thread) = diff.threads.get(&entry.id).filter(|t| !t.stale) {
        for comment in &thread.comments {
            lines.push(Line::from(vec![
                Span::styled(format!("{} ", comment.id), Style::default().fg(Color::DarkGray)),
                Span::styled(
                    format!("({}/{}) ", comment.author, comment.kind),
                    Style::default().fg(Color::Yellow),
                ),
                Span::raw(comment.text.clone()),
            ]));
        }
    }
    for (id, thread) in diff.threads.iter().filter(|(_, t)| t.stale) {
        lines.push(Line::styled(
            format!(
                "{id} (stale) {} lines {}: {} comments",
                thread.anchor.file_path,
                thread.anchor.line_range.display(),
                thread.comments.len()
            ),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let title = format!(" {} {} ", entry.id, entry.file_path);
    let panel = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false });
    f.render_widget(panel, area);
}

fn render_status(f: &mut Frame, app: &App, area: Rect) {
    let content = match (&app.message, app.focus) {
        (Some(msg), _) => msg.clone(),
        (None, Focus::Log) => " j/k: select | Enter: diff | L: more | R: reload | w: wrap | ?: help | q: quit".to_string(),
        (None, Focus::Diff) => {
            " j/k: scroll | ]/[: hunk | c: comment | D: delete thread | h/l: pan | w: wrap | Tab: log | ?: help".to_string()
        }
    };
    let style = if app.stale_working_copy {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Yellow)
    };
    let status = Paragraph::new(content)
        .style(style)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(status, area);
}

fn render_help(f: &mut Frame) {
    let area = centered_rect(60, 70, f.area());

    let help_text = [
        "",
        "  Log:",
        "    j / k     Select revision",
        "    g / G     First / last revision",
        "    L         Load more revisions",
        "    R         Reload the log",
        "    U         Update a stale working copy",
        "",
        "  Diff:",
        "    j / k     Scroll",
        "    ^d / ^u   Half page down / up",
        "    ] / [     Next / previous hunk",
        "    h / l     Scroll sideways (wrap off)",
        "    w         Toggle wrap",
        "    c         Comment on the focused hunk",
        "    D         Delete the focused hunk's comments",
        "",
        "  Other:",
        "    Tab       Switch pane",
        "    ?         Toggle this help",
        "    q         Quit",
        "",
    ];

    let help = Paragraph::new(help_text.join("\n"))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" Help ")
                .style(Style::default().bg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(help, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
