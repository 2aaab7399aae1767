//! Unified diff parser for git-format output

use super::{ChangeType, DiffFile, DiffLine, Hunk, LineKind};

/// Parse git-format diff text into files.
///
/// Files without hunks (binary, pure renames, mode changes) are kept.
pub fn parse_diff(text: &str) -> Vec<DiffFile> {
    let mut files = Vec::new();
    let mut current_file: Option<DiffFile> = None;
    let mut current_hunk: Option<Hunk> = None;
    let mut old_line = 0u32;
    let mut new_line = 0u32;
    // lines still expected by the open hunk, per side
    let mut old_left = 0u32;
    let mut new_left = 0u32;

    for line in text.lines() {
        if line.starts_with("diff --git ") {
            finish_file(&mut files, &mut current_file, &mut current_hunk);
            let (old_path, new_path) = parse_diff_git_line(line);
            let mut file = DiffFile::new(new_path.clone().or(old_path.clone()).unwrap_or_default());
            file.prev_name = old_path;
            current_file = Some(file);
            old_left = 0;
            new_left = 0;
            continue;
        }

        let Some(file) = current_file.as_mut() else {
            continue;
        };

        if line.starts_with('\\') {
            // "\ No newline at end of file"
            continue;
        }

        if old_left > 0 || new_left > 0 {
            let Some(hunk) = current_hunk.as_mut() else {
                continue;
            };
            let (kind, content) = match line.chars().next() {
                Some('+') => (LineKind::Addition, &line[1..]),
                Some('-') => (LineKind::Deletion, &line[1..]),
                Some(' ') => (LineKind::Context, &line[1..]),
                // some tools strip the space from blank context lines
                None => (LineKind::Context, ""),
                Some(_) => {
                    old_left = 0;
                    new_left = 0;
                    continue;
                }
            };

            let (old_no, new_no) = match kind {
                LineKind::Addition => {
                    new_left = new_left.saturating_sub(1);
                    file.additions += 1;
                    let no = new_line;
                    new_line = new_line.saturating_add(1);
                    (None, Some(no))
                }
                LineKind::Deletion => {
                    old_left = old_left.saturating_sub(1);
                    file.deletions += 1;
                    let no = old_line;
                    old_line = old_line.saturating_add(1);
                    (Some(no), None)
                }
                _ => {
                    old_left = old_left.saturating_sub(1);
                    new_left = new_left.saturating_sub(1);
                    let numbers = (Some(old_line), Some(new_line));
                    old_line = old_line.saturating_add(1);
                    new_line = new_line.saturating_add(1);
                    numbers
                }
            };

            hunk.lines.push(DiffLine {
                kind,
                content: content.to_string(),
                old_line_number: old_no,
                new_line_number: new_no,
            });
            continue;
        }

        if line.starts_with("@@") {
            if let Some(hunk) = current_hunk.take() {
                file.hunks.push(hunk);
            }
            if let Some((old_start, old_count, new_start, new_count)) = parse_hunk_header(line) {
                old_line = old_start;
                new_line = new_start;
                old_left = old_count;
                new_left = new_count;
                current_hunk = Some(Hunk {
                    header: line.to_string(),
                    old_start,
                    old_count,
                    new_start,
                    new_count,
                    lines: vec![DiffLine {
                        kind: LineKind::HunkHeader,
                        content: line.to_string(),
                        old_line_number: None,
                        new_line_number: None,
                    }],
                });
            }
        } else if line.starts_with("new file") {
            file.change_type = ChangeType::Added;
        } else if line.starts_with("deleted file") {
            file.change_type = ChangeType::Deleted;
        } else if let Some(from) = line.strip_prefix("rename from ") {
            file.change_type = ChangeType::Renamed;
            file.prev_name = Some(unquote_path(from));
        } else if let Some(to) = line.strip_prefix("rename to ") {
            file.name = unquote_path(to);
        } else if let Some(from) = line.strip_prefix("copy from ") {
            file.change_type = ChangeType::Copied;
            file.prev_name = Some(unquote_path(from));
        } else if let Some(to) = line.strip_prefix("copy to ") {
            file.name = unquote_path(to);
        } else if line.starts_with("GIT binary patch")
            || (line.starts_with("Binary files ") && line.ends_with(" differ"))
        {
            file.is_binary = true;
        } else if let Some(path) = line.strip_prefix("+++ ") {
            if let Some(path) = marker_path(path, "b/") {
                file.name = path;
            }
        }
    }

    finish_file(&mut files, &mut current_file, &mut current_hunk);
    files
}

fn finish_file(files: &mut Vec<DiffFile>, file: &mut Option<DiffFile>, hunk: &mut Option<Hunk>) {
    if let Some(mut f) = file.take() {
        if let Some(h) = hunk.take() {
            f.hunks.push(h);
        }
        if !matches!(f.change_type, ChangeType::Renamed | ChangeType::Copied) {
            f.prev_name = None;
        }
        files.push(f);
    }
}

/// Parse `diff --git a/old b/new`, with either path possibly quoted.
fn parse_diff_git_line(line: &str) -> (Option<String>, Option<String>) {
    let rest = line.strip_prefix("diff --git ").unwrap_or(line);

    let (old, rest) = if rest.starts_with('"') {
        match take_quoted(rest) {
            Some(parsed) => parsed,
            None => return (None, None),
        }
    } else {
        match rest.find(" b/").or_else(|| rest.find(" \"b/")) {
            Some(idx) => (rest[..idx].to_string(), &rest[idx + 1..]),
            None => return (None, None),
        }
    };

    let new = if rest.starts_with('"') {
        take_quoted(rest).map(|(path, _)| path)
    } else {
        Some(rest.to_string())
    };

    (
        Some(strip_side(old, "a/")),
        new.map(|path| strip_side(path, "b/")),
    )
}

/// Path from a `---`/`+++` line; `None` for `/dev/null`.
fn marker_path(raw: &str, side: &str) -> Option<String> {
    let path = unquote_path(raw.trim_end());
    if path == "/dev/null" {
        None
    } else {
        Some(strip_side(path, side))
    }
}

fn strip_side(path: String, prefix: &str) -> String {
    match path.strip_prefix(prefix) {
        Some(stripped) => stripped.to_string(),
        None => path,
    }
}

fn unquote_path(raw: &str) -> String {
    if raw.starts_with('"') {
        take_quoted(raw).map(|(path, _)| path).unwrap_or_else(|| raw.to_string())
    } else {
        raw.to_string()
    }
}

/// Parse a C-style quoted path (git quotes paths with special characters,
/// escaping non-ASCII bytes as octal). Returns the path and what follows it.
fn take_quoted(s: &str) -> Option<(String, &str)> {
    let body = s.strip_prefix('"')?;
    let raw = body.as_bytes();
    let mut bytes = Vec::new();
    let mut i = 0;

    while i < raw.len() {
        match raw[i] {
            b'"' => {
                let path = String::from_utf8_lossy(&bytes).into_owned();
                return Some((path, body[i + 1..].trim_start()));
            }
            b'\\' => {
                let escaped = *raw.get(i + 1)?;
                i += 2;
                match escaped {
                    b'n' => bytes.push(b'\n'),
                    b't' => bytes.push(b'\t'),
                    b'r' => bytes.push(b'\r'),
                    b'0'..=b'7' => {
                        let mut value = u32::from(escaped - b'0');
                        let mut digits = 1;
                        while digits < 3 && i < raw.len() && (b'0'..=b'7').contains(&raw[i]) {
                            value = value * 8 + u32::from(raw[i] - b'0');
                            i += 1;
                            digits += 1;
                        }
                        bytes.push(value as u8);
                    }
                    other => bytes.push(other),
                }
            }
            other => {
                bytes.push(other);
                i += 1;
            }
        }
    }
    None
}

/// Parse `@@ -old_start[,old_count] +new_start[,new_count] @@ [section]`
fn parse_hunk_header(line: &str) -> Option<(u32, u32, u32, u32)> {
    let line = line.trim_start_matches('@').trim();
    let mut parts = line.split_whitespace();

    let old_part = parts.next()?.strip_prefix('-')?;
    let new_part = parts.next()?.strip_prefix('+')?;

    let (old_start, old_count) = parse_range(old_part)?;
    let (new_start, new_count) = parse_range(new_part)?;
    Some((old_start, old_count, new_start, new_count))
}

fn parse_range(s: &str) -> Option<(u32, u32)> {
    if let Some((start, count)) = s.split_once(',') {
        Some((start.parse().ok()?, count.parse().ok()?))
    } else {
        Some((s.parse().ok()?, 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index 1111111..2222222 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,4 +1,4 @@ mod intro
 fn main() {
-    let x = 1;
+    let x = 2;
     println!(\"{}\", x);
 }
@@ -20,3 +20,4 @@ fn tail() {
 a
+b
 c
 d
diff --git a/new.txt b/new.txt
new file mode 100644
index 0000000..3333333
--- /dev/null
+++ b/new.txt
@@ -0,0 +1,2 @@
+hello
+world
\\ No newline at end of file
diff --git a/gone.txt b/gone.txt
deleted file mode 100644
index 4444444..0000000
--- a/gone.txt
+++ /dev/null
@@ -1 +0,0 @@
-bye
diff --git a/old_name.rs b/new_name.rs
similarity index 100%
rename from old_name.rs
rename to new_name.rs
diff --git a/logo.png b/logo.png
index 5555555..6666666 100644
Binary files a/logo.png and b/logo.png differ
";

    #[test]
    fn test_parse_files_and_kinds() {
        let files = parse_diff(SAMPLE);
        assert_eq!(files.len(), 5);

        assert_eq!(files[0].name, "src/lib.rs");
        assert_eq!(files[0].change_type, ChangeType::Modified);
        assert_eq!(files[0].hunks.len(), 2);
        assert_eq!(files[0].additions, 2);
        assert_eq!(files[0].deletions, 1);
        assert_eq!(files[0].prev_name, None);

        assert_eq!(files[1].change_type, ChangeType::Added);
        assert_eq!(files[1].hunks[0].new_count, 2);
        assert_eq!(files[2].change_type, ChangeType::Deleted);
        assert_eq!(files[2].hunks[0].old_count, 1);
        assert_eq!(files[2].hunks[0].new_start, 0);

        assert_eq!(files[3].change_type, ChangeType::Renamed);
        assert_eq!(files[3].name, "new_name.rs");
        assert_eq!(files[3].prev_name.as_deref(), Some("old_name.rs"));
        assert!(files[3].hunks.is_empty());
        assert_eq!(files[3].display_name(), "old_name.rs → new_name.rs");

        assert!(files[4].is_binary);
        assert!(files[4].hunks.is_empty());
    }

    #[test]
    fn test_line_numbers() {
        let files = parse_diff(SAMPLE);
        let hunk = &files[0].hunks[0];
        assert_eq!(hunk.lines[0].kind, LineKind::HunkHeader);
        assert_eq!(hunk.header, "@@ -1,4 +1,4 @@ mod intro");

        for line in &hunk.lines {
            match line.kind {
                LineKind::Context => {
                    assert!(line.old_line_number.is_some() && line.new_line_number.is_some())
                }
                LineKind::Deletion => {
                    assert!(line.old_line_number.is_some() && line.new_line_number.is_none())
                }
                LineKind::Addition => {
                    assert!(line.old_line_number.is_none() && line.new_line_number.is_some())
                }
                LineKind::HunkHeader => {
                    assert!(line.old_line_number.is_none() && line.new_line_number.is_none())
                }
            }
        }

        assert_eq!(hunk.lines[2].content, "    let x = 1;");
        assert_eq!(hunk.lines[2].old_line_number, Some(2));
        assert_eq!(hunk.lines[3].new_line_number, Some(2));
        assert_eq!(hunk.lines[4].old_line_number, Some(3));
        assert_eq!(hunk.lines[4].new_line_number, Some(3));

        let second = &files[0].hunks[1];
        assert_eq!(second.lines[2].new_line_number, Some(21));
        assert_eq!(second.lines[3].old_line_number, Some(21));
    }

    #[test]
    fn test_no_newline_marker_ignored() {
        let files = parse_diff(SAMPLE);
        let contents: Vec<&str> = files[1].hunks[0].lines[1..].iter().map(|l| l.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "world"]);
    }

    #[test]
    fn test_quoted_paths() {
        let (old, new) = parse_diff_git_line(r#"diff --git "a/dir/na\303\257ve file.txt" "b/dir/na\303\257ve file.txt""#);
        assert_eq!(old.as_deref(), Some("dir/naïve file.txt"));
        assert_eq!(new.as_deref(), Some("dir/naïve file.txt"));

        let (old, new) = parse_diff_git_line("diff --git a/with space.txt b/with space.txt");
        assert_eq!(old.as_deref(), Some("with space.txt"));
        assert_eq!(new.as_deref(), Some("with space.txt"));
    }

    #[test]
    fn test_git_binary_patch() {
        let text = "diff --git a/bin.dat b/bin.dat\nnew file mode 100644\nGIT binary patch\nliteral 4\nLcmZ?d00001\n\n";
        let files = parse_diff(text);
        assert_eq!(files.len(), 1);
        assert!(files[0].is_binary);
        assert_eq!(files[0].change_type, ChangeType::Added);
    }

    #[test]
    fn test_hunk_line_that_looks_like_header() {
        let text = "diff --git a/a.md b/a.md\n--- a/a.md\n+++ b/a.md\n@@ -1,2 +1,2 @@\n--- old rule\n+++ new rule\n keep\n";
        let files = parse_diff(text);
        let lines = &files[0].hunks[0].lines;
        assert_eq!(lines[1].kind, LineKind::Deletion);
        assert_eq!(lines[1].content, "-- old rule");
        assert_eq!(lines[2].kind, LineKind::Addition);
        assert_eq!(files[0].name, "a.md");
    }

    #[test]
    fn test_hunk_header_default_counts() {
        assert_eq!(parse_hunk_header("@@ -3 +4 @@"), Some((3, 1, 4, 1)));
        assert_eq!(parse_hunk_header("@@ -0,0 +1,2 @@ section"), Some((0, 0, 1, 2)));
        assert_eq!(parse_hunk_header("@@ garbage @@"), None);
    }

    #[test]
    fn test_line_numbers_at_u32_limit() {
        let text = "\
diff --git a/huge.txt b/huge.txt
--- a/huge.txt
+++ b/huge.txt
@@ -4294967295,2 +4294967295,3 @@
 same
-old
+new
+more
";
        let files = parse_diff(text);
        let lines = &files[0].hunks[0].lines;
        assert_eq!(lines[1].old_line_number, Some(u32::MAX));
        assert_eq!(lines[1].new_line_number, Some(u32::MAX));
        assert_eq!(lines[2].old_line_number, Some(u32::MAX));
        assert_eq!(lines[4].new_line_number, Some(u32::MAX));
    }
}
