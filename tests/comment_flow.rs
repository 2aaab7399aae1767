mod common;

use common::{diff_text, header_line, service, FakeGateway};
use jjdeck::comments::{CommentError, CommentStore, NewComment};
use jjdeck::diff::parse_diff;
use jjdeck::export::{export, ExportFormat};
use jjdeck::gateway::{Gateway, RevisionInfo};
use jjdeck::revlog::parse_log_output;
use std::path::Path;
use tempfile::tempdir;

const FIRST: &[&str] = &["alpha", "beta"];
const SECOND: &[&str] = &["fn second() {", "let y = 2;"];

fn note(hunk: &str, text: &str) -> NewComment {
    NewComment {
        hunk_id: hunk.to_string(),
        text: text.to_string(),
        author: "human".to_string(),
        kind: "feedback".to_string(),
    }
}

#[test]
fn test_add_then_list() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST), (60, SECOND)]));
    let mut comments = service(&gateway, dir.path());

    let id = comments.add("@", note("h2", "why not reuse the helper?")).unwrap();
    assert!(id.starts_with("cmt_"));

    let reports = comments.list("@").unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].change_id, "kxqp");
    assert_eq!(reports[0].description, "Fix parser");
    let (hunk_id, thread) = &reports[0].hunks[0];
    assert_eq!(hunk_id, "h2");
    assert!(!thread.stale);
    assert_eq!(thread.anchor.file_path, "a.rs");
    assert_eq!(thread.anchor.context_lines, vec!["fn second() {", "let y = 2;"]);
    assert_eq!(thread.comments[0].id, id);
    assert_eq!(thread.comments[0].text, "why not reuse the helper?");

    // second comment on the same hunk joins the thread
    comments.add("kxqp", note("h2", "and add a test")).unwrap();
    let reports = comments.list("@").unwrap();
    assert_eq!(reports[0].hunks.len(), 1);
    assert_eq!(reports[0].hunks[0].1.comments.len(), 2);
}

#[test]
fn test_rewrite_relocates_once() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST), (60, SECOND)]));
    let mut comments = service(&gateway, dir.path());
    comments.add("@", note("h2", "rename this")).unwrap();

    // the first hunk was squashed away and the second moved down
    gateway.set_revision("kxqp", "c2", "Fix parser", &diff_text("a.rs", &[(63, SECOND)]));
    let reports = comments.list("@").unwrap();
    let (hunk_id, thread) = &reports[0].hunks[0];
    assert_eq!(hunk_id, "h1");
    assert!(!thread.stale);
    assert_eq!(thread.anchor.line_range.new_start, 63);
    assert_eq!(reports[0].commit_id, "c2");

    // the relocation was persisted with the new commit hash
    let requests_before = gateway.diff_requests().len();
    let again = comments.list("@").unwrap();
    assert_eq!(again[0].hunks[0].0, "h1");
    assert_eq!(gateway.diff_requests().len(), requests_before);

    let mut store = CommentStore::open(dir.path(), Path::new("/work/repo"));
    assert_eq!(store.state().revisions["kxqp"].commit_hash, "c2");
}

#[test]
fn test_vanished_hunk_is_kept_stale() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST)]));
    let mut comments = service(&gateway, dir.path());
    comments.add("@", note("h1", "keep me")).unwrap();

    gateway.set_revision("kxqp", "c2", "Fix parser", &diff_text("b.rs", &[(10, FIRST)]));
    let reports = comments.list("@").unwrap();
    let (hunk_id, thread) = &reports[0].hunks[0];
    assert_eq!(hunk_id, "h1");
    assert!(thread.stale);
    assert_eq!(thread.comments[0].text, "keep me");

    let text = export(&reports, ExportFormat::Text).unwrap();
    assert!(text.contains("  h1 (stale) a.rs lines 10-12\n"));
    let json: serde_json::Value = serde_json::from_str(&export(&reports, ExportFormat::Json).unwrap()).unwrap();
    assert_eq!(json["revisions"][0]["hunks"][0]["stale"], true);

    // a new comment on the live h1 does not join the stale thread
    comments.add("@", note("h1", "new hunk")).unwrap();
    let reports = comments.list("@").unwrap();
    let ids: Vec<&str> = reports[0].hunks.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["h1-stale", "h1"]);
    assert_eq!(reports[0].hunks[1].1.anchor.file_path, "b.rs");
    assert_eq!(reports[0].hunks[1].1.comments.len(), 1);
}

#[test]
fn test_delete_comment_prunes_empty_entries() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST), (60, SECOND)]));
    let mut comments = service(&gateway, dir.path());
    let first = comments.add("@", note("h1", "one")).unwrap();
    let second = comments.add("@", note("h2", "two")).unwrap();

    comments.delete_comment(&first).unwrap();
    let reports = comments.list("@").unwrap();
    assert_eq!(reports[0].hunks.len(), 1);
    assert_eq!(reports[0].hunks[0].0, "h2");

    comments.delete_comment(&second).unwrap();
    assert!(comments.list("@").unwrap().is_empty());
    let mut store = CommentStore::open(dir.path(), Path::new("/work/repo"));
    assert!(store.state().revisions.is_empty());

    assert!(matches!(
        comments.delete_comment(&second),
        Err(CommentError::CommentNotFound(_))
    ));
}

#[test]
fn test_delete_hunk() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST), (60, SECOND)]));
    let mut comments = service(&gateway, dir.path());
    comments.add("@", note("h2", "one")).unwrap();
    comments.add("@", note("h2", "two")).unwrap();

    assert!(matches!(
        comments.delete_hunk("@", "h1"),
        Err(CommentError::NoCommentsForHunk(_))
    ));
    assert_eq!(comments.delete_hunk("@", "h2").unwrap(), 2);
    assert!(comments.list("@").unwrap().is_empty());
}

#[test]
fn test_hunks_report_comment_counts() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST), (60, SECOND)]));
    let mut comments = service(&gateway, dir.path());
    comments.add("@", note("h2", "one")).unwrap();

    let (revision, hunks) = comments.hunks("@").unwrap();
    assert_eq!(revision.commit_id, "c1");
    let counts: Vec<(&str, usize)> = hunks.iter().map(|h| (h.entry.id.as_str(), h.comments)).collect();
    assert_eq!(counts, vec![("h1", 0), ("h2", 1)]);
}

#[test]
fn test_user_errors() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST)]));
    let info = |change: &str| RevisionInfo {
        change_id: change.to_string(),
        commit_id: format!("{change}-c"),
        description: String::new(),
    };
    gateway.set_revset("all()", vec![info("aaaa"), info("bbbb")]);
    let mut comments = service(&gateway, dir.path());

    let err = comments.add("@", note("h7", "x")).unwrap_err();
    assert!(matches!(err, CommentError::HunkNotFound(ref id) if id == "h7"));
    assert!(err.is_user_error());

    assert!(matches!(comments.add("@", note("h1", "   ")), Err(CommentError::EmptyText)));
    assert!(matches!(
        comments.add("all()", note("h1", "x")),
        Err(CommentError::AmbiguousRevset(_))
    ));
    let err = comments.add("none()", note("h1", "x")).unwrap_err();
    assert_eq!(err.to_string(), "No revisions found for revset: none()");

    // nothing was written
    assert!(comments.list("@").unwrap().is_empty());
    assert!(!comments.store().path().exists());
}

#[test]
fn test_dashboard_comments_visible_to_cli() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    let change = "kxqpmnwzvtlsoyrruqqrmnnwpzvlkstx";
    let commit_id = format!("{change}-commit");
    gateway.set_revision(change, &commit_id, "Fix parser", &diff_text("a.rs", &[(10, FIRST)]));

    // the dashboard names the revision by what the log reported
    let log = parse_log_output(&format!("{}\n", header_line("@  ", change, "Fix parser")));
    let revision = RevisionInfo::from(&log[0]);
    let files = parse_diff(&gateway.fetch_diff(&revision.commit_id).unwrap());
    let mut dashboard = service(&gateway, dir.path());
    dashboard.add_on(&revision, &files, note("h1", "from the dashboard")).unwrap();

    let mut cli = service(&gateway, dir.path());
    let requests_before = gateway.diff_requests().len();
    let reports = cli.list("@").unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].change_id, change);
    assert_eq!(reports[0].hunks[0].1.comments[0].text, "from the dashboard");
    // stored ids already match, so nothing was relocated
    assert_eq!(gateway.diff_requests().len(), requests_before);

    assert_eq!(cli.delete_hunk("@", "h1").unwrap(), 1);
    assert!(cli.list("@").unwrap().is_empty());
}

#[test]
fn test_open_dashboard_keeps_cli_comments() {
    let dir = tempdir().unwrap();
    let gateway = FakeGateway::new();
    gateway.set_revision("kxqp", "c1", "Fix parser", &diff_text("a.rs", &[(10, FIRST), (60, SECOND)]));
    let mut dashboard = service(&gateway, dir.path());
    let mut cli = service(&gateway, dir.path());

    dashboard.add("@", note("h1", "first")).unwrap();
    cli.add("@", note("h2", "from the cli")).unwrap();
    dashboard.add("@", note("h1", "second")).unwrap();

    let reports = cli.list("@").unwrap();
    let texts: Vec<&str> = reports[0]
        .hunks
        .iter()
        .flat_map(|(_, thread)| thread.comments.iter().map(|c| c.text.as_str()))
        .collect();
    assert_eq!(texts, vec!["first", "second", "from the cli"]);
}
