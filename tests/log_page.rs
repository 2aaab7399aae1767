mod common;

use common::{header_line, FakeGateway};
use jjdeck::revlog::{LogError, LogQuery, LogRequests};

fn log_text(changes: &[&str]) -> String {
    let mut text = String::new();
    for (i, change) in changes.iter().enumerate() {
        let gutter = if i == 0 { "@  " } else { "○  " };
        text.push_str(&header_line(gutter, change, &format!("work on {change}")));
        text.push('\n');
        text.push_str("│  \n");
    }
    text
}

/// Split at arbitrary byte positions that fall on char boundaries.
fn chunked(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        current.push(c);
        if current.len() >= size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[test]
fn test_page_limit_and_has_more() {
    let gateway = FakeGateway::new();
    gateway.set_log(chunked(&log_text(&["aaaa", "bbbb", "cccc"]), 7), 0, "");

    let page = LogRequests::fetch_page(gateway.as_ref(), &LogQuery::new(2)).unwrap();
    assert!(page.has_more);
    let changes: Vec<&str> = page.commits.iter().map(|c| c.change_id.as_str()).collect();
    assert_eq!(changes, vec!["aaaa", "bbbb"]);

    let first = &page.commits[0];
    assert!(first.is_working_copy);
    assert_eq!(first.commit_id, "aaaa-commit");
    assert_eq!(first.description, "work on aaaa");
    assert_eq!(first.display_lines.len(), 2);
    assert!(first.display_lines[0].starts_with("@  aaaa ada"));
    assert!(!page.commits[1].is_working_copy);
}

#[test]
fn test_page_without_more() {
    let gateway = FakeGateway::new();
    gateway.set_log(vec![log_text(&["aaaa", "bbbb"])], 0, "");

    let page = LogRequests::fetch_page(gateway.as_ref(), &LogQuery::new(2)).unwrap();
    assert!(!page.has_more);
    assert_eq!(page.commits.len(), 2);
}

#[test]
fn test_stale_working_copy_is_reported() {
    let gateway = FakeGateway::new();
    gateway.set_log(
        Vec::new(),
        1,
        "Error: The working copy is stale (not updated since operation 1234).\nHint: Run `jj workspace update-stale` to update it.\n",
    );

    let err = LogRequests::fetch_page(gateway.as_ref(), &LogQuery::new(10)).unwrap_err();
    assert!(matches!(err, LogError::StaleWorkingCopy { .. }));
    assert!(err.is_stale_working_copy());
}

#[test]
fn test_failed_command_carries_stderr() {
    let gateway = FakeGateway::new();
    gateway.set_log(Vec::new(), 1, "Error: Revision `nope` doesn't exist\n");

    let query = LogQuery::new(10).with_revset("nope");
    match LogRequests::fetch_page(gateway.as_ref(), &query).unwrap_err() {
        LogError::Command { code, stderr } => {
            assert_eq!(code, 1);
            assert_eq!(stderr, "Error: Revision `nope` doesn't exist");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_description_mentioning_stale_working_copy_still_loads() {
    let gateway = FakeGateway::new();
    let description = "fix: warn when the working copy is stale";
    let mut text = log_text(&["aaaa"]);
    text.push_str(&header_line("○  ", "bbbb", description));
    text.push_str(&format!("\n│  {description}\n"));
    gateway.set_log(vec![text], 0, "");

    let page = LogRequests::fetch_page(gateway.as_ref(), &LogQuery::new(10)).unwrap();
    assert_eq!(page.commits.len(), 2);
    assert_eq!(page.commits[1].description, description);
}
