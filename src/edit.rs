//! Read-modify-write operations over marker-bracketed regions.
//!
//! Every path goes through the sandbox before any I/O, every span is resolved
//! against the snapshot just read, and every new content string is fully built
//! before the first write. Operations touching two files write the target
//! first, then the source; there is no rollback if the second write fails.

use crate::errors::{AppError, AppResult};
use crate::range::TextRange;
use crate::sandbox::AllowedRoots;
use regex::{Captures, Regex, RegexBuilder};
use std::io;
use std::path::Path;
use tracing::debug;

pub async fn copy_to_new_file(roots: &AllowedRoots, source: &str, range: &TextRange, target: &str) -> AppResult<String> {
    let source_path = roots.validate(source).await?;
    let target_path = roots.validate(target).await?;

    let content = read_text(&source_path).await?;
    let span = range.resolve(&content).ok_or(AppError::RangeNotFound)?;
    debug!(source = %source_path.display(), target = %target_path.display(), bytes = span.text().len(), "copy range");

    write_text(&target_path, span.text()).await?;
    Ok(format!("Copied {} characters from {source} to {target}", span.char_len()))
}

pub async fn cut_to_new_file(roots: &AllowedRoots, source: &str, range: &TextRange, target: &str) -> AppResult<String> {
    let source_path = roots.validate(source).await?;
    let target_path = roots.validate(target).await?;
    // the source write would clobber the cut text
    if source_path == target_path {
        return Err(AppError::SchemaInvalid("source and target are the same file".into()));
    }

    let content = read_text(&source_path).await?;
    let span = range.resolve(&content).ok_or(AppError::RangeNotFound)?;
    let remaining = span.splice("");
    debug!(source = %source_path.display(), target = %target_path.display(), bytes = span.text().len(), "cut range");

    write_text(&target_path, span.text()).await?;
    write_text(&source_path, &remaining).await?;
    Ok(format!("Moved {} characters from {source} to {target}", span.char_len()))
}

pub async fn append_to_file(roots: &AllowedRoots, source: &str, range: &TextRange, target: &str) -> AppResult<String> {
    let source_path = roots.validate(source).await?;
    let target_path = roots.validate(target).await?;

    let content = read_text(&source_path).await?;
    let span = range.resolve(&content).ok_or(AppError::RangeNotFound)?;
    let existing = match tokio::fs::read_to_string(&target_path).await {
        Ok(text) => text,
        Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    let mut appended = existing;
    appended.push_str(span.text());
    debug!(source = %source_path.display(), target = %target_path.display(), bytes = span.text().len(), "append range");

    write_text(&target_path, &appended).await?;
    Ok(format!("Appended {} characters from {source} to {target}", span.char_len()))
}

/// Inserts `inserted` where the bracketed text begins, leaving that text in place.
pub async fn insert_at_position(roots: &AllowedRoots, path: &str, position: &TextRange, inserted: &str) -> AppResult<String> {
    let file = roots.validate(path).await?;
    let content = read_text(&file).await?;
    let span = position.resolve(&content).ok_or(AppError::RangeNotFound)?;
    let updated = span.insert_before(inserted);
    debug!(path = %file.display(), offset = span.start, bytes = inserted.len(), "insert at position");

    write_text(&file, &updated).await?;
    Ok(format!("Inserted {} characters into {path}", inserted.chars().count()))
}

pub async fn delete_range(roots: &AllowedRoots, path: &str, range: &TextRange) -> AppResult<String> {
    let file = roots.validate(path).await?;
    let content = read_text(&file).await?;
    let span = range.resolve(&content).ok_or(AppError::RangeNotFound)?;
    let updated = span.splice("");
    debug!(path = %file.display(), start = span.start, end = span.end, "delete range");

    write_text(&file, &updated).await?;
    Ok(format!("Deleted {} characters from {path}", span.char_len()))
}

pub async fn replace_block(roots: &AllowedRoots, path: &str, range: &TextRange, replacement: &str) -> AppResult<String> {
    let file = roots.validate(path).await?;
    let content = read_text(&file).await?;
    let span = range.resolve(&content).ok_or(AppError::RangeNotFound)?;
    let updated = span.splice(replacement);
    debug!(path = %file.display(), start = span.start, end = span.end, bytes = replacement.len(), "replace block");

    write_text(&file, &updated).await?;
    Ok(format!(
        "Replaced {} characters with {} characters in {path}",
        span.char_len(),
        replacement.chars().count()
    ))
}

/// Whole-file regex substitution. Does not use markers.
pub async fn replace_by_pattern(
    roots: &AllowedRoots,
    path: &str,
    pattern: &str,
    flags: &str,
    replacement: &str,
) -> AppResult<String> {
    let compiled = Pattern::compile(pattern, flags)?;
    let template = Template::parse(replacement, &compiled.regex);
    let file = roots.validate(path).await?;
    let content = read_text(&file).await?;

    let (updated, count) = compiled.apply(&content, &template);
    if count == 0 {
        return Ok(format!("No matches for pattern /{pattern}/{flags} in {path}"));
    }
    debug!(path = %file.display(), count, global = compiled.global, "replace by pattern");

    write_text(&file, &updated).await?;
    Ok(format!("Replaced {count} match(es) of /{pattern}/{flags} in {path}"))
}

async fn read_text(path: &Path) -> AppResult<String> {
    Ok(tokio::fs::read_to_string(path).await?)
}

async fn write_text(path: &Path, content: &str) -> AppResult<()> {
    Ok(tokio::fs::write(path, content).await?)
}

/// A compiled pattern plus the `g` flag, which the regex itself has no notion of.
pub struct Pattern {
    regex: Regex,
    global: bool,
}

impl Pattern {
    pub fn compile(pattern: &str, flags: &str) -> AppResult<Self> {
        let mut builder = RegexBuilder::new(pattern);
        let mut global = false;
        for flag in flags.chars() {
            match flag {
                'g' => global = true,
                'i' => { builder.case_insensitive(true); }
                'm' => { builder.multi_line(true); }
                's' => { builder.dot_matches_new_line(true); }
                'x' => { builder.ignore_whitespace(true); }
                'u' => {}
                other => return Err(AppError::InvalidPattern(format!("unsupported flag '{other}'"))),
            }
        }
        let regex = builder.build().map_err(|e| AppError::InvalidPattern(e.to_string()))?;
        Ok(Self { regex, global })
    }

    /// Returns the new content and how many matches were replaced.
    pub fn apply(&self, content: &str, template: &Template) -> (String, usize) {
        let limit = if self.global { 0 } else { 1 };
        let mut count = 0;
        let updated = self.regex.replacen(content, limit, |caps: &Captures| {
            count += 1;
            template.expand(content, caps)
        });
        (updated.into_owned(), count)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Piece {
    Literal(String),
    Group(usize),
    Named(String),
    Whole,
    Prefix,
    Suffix,
}

/// A replacement string with `$1`, `$<name>`, `$&`, `` $` ``, `$'` and `$$`
/// references. Unresolvable references stay literal.
#[derive(Debug)]
pub struct Template {
    pieces: Vec<Piece>,
}

impl Template {
    pub fn parse(replacement: &str, regex: &Regex) -> Self {
        let groups = regex.captures_len();
        let mut pieces = Vec::new();
        let mut literal = String::new();
        let mut rest = replacement;

        while let Some(idx) = rest.find('$') {
            literal.push_str(&rest[..idx]);
            let tail = &rest[idx + 1..];
            let (piece, consumed) = match tail.chars().next() {
                Some('$') => (None, 1),
                Some('&') => (Some(Piece::Whole), 1),
                Some('`') => (Some(Piece::Prefix), 1),
                Some('\'') => (Some(Piece::Suffix), 1),
                Some('<') => match tail.find('>') {
                    Some(close) if regex.capture_names().flatten().any(|n| n == &tail[1..close]) => {
                        (Some(Piece::Named(tail[1..close].to_string())), close + 1)
                    }
                    _ => (None, 0),
                },
                Some(c) if c.is_ascii_digit() => group_reference(tail, groups),
                _ => (None, 0),
            };
            match piece {
                Some(p) => {
                    if !literal.is_empty() {
                        pieces.push(Piece::Literal(std::mem::take(&mut literal)));
                    }
                    pieces.push(p);
                }
                // `$$` is an escaped dollar; anything unrecognized keeps its `$`
                None => literal.push('$'),
            }
            rest = &tail[consumed..];
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            pieces.push(Piece::Literal(literal));
        }
        Self { pieces }
    }

    fn expand(&self, haystack: &str, caps: &Captures) -> String {
        let whole = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
        let mut out = String::new();
        for piece in &self.pieces {
            match piece {
                Piece::Literal(s) => out.push_str(s),
                Piece::Group(i) => out.push_str(caps.get(*i).map(|m| m.as_str()).unwrap_or("")),
                Piece::Named(n) => out.push_str(caps.name(n).map(|m| m.as_str()).unwrap_or("")),
                Piece::Whole => out.push_str(&haystack[whole.clone()]),
                Piece::Prefix => out.push_str(&haystack[..whole.start]),
                Piece::Suffix => out.push_str(&haystack[whole.end..]),
            }
        }
        out
    }
}

/// Two-digit references win when that group exists, otherwise one digit.
fn group_reference(tail: &str, groups: usize) -> (Option<Piece>, usize) {
    let digits: Vec<usize> = tail
        .chars()
        .take(2)
        .map_while(|c| c.to_digit(10))
        .map(|d| d as usize)
        .collect();
    if digits.len() == 2 {
        let n = digits[0] * 10 + digits[1];
        if n > 0 && n < groups {
            return (Some(Piece::Group(n)), 2);
        }
    }
    match digits.first() {
        Some(&n) if n > 0 && n < groups => (Some(Piece::Group(n)), 1),
        _ => (None, 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;
    use assert_fs::TempDir;
    use proptest::prelude::*;

    fn setup() -> (TempDir, AllowedRoots) {
        let tmp = TempDir::new().unwrap();
        let roots = AllowedRoots::new(&[tmp.path()]).unwrap();
        (tmp, roots)
    }

    fn p(tmp: &TempDir, name: &str) -> String {
        tmp.child(name).path().display().to_string()
    }

    fn read(tmp: &TempDir, name: &str) -> String {
        std::fs::read_to_string(tmp.child(name).path()).unwrap()
    }

    fn sub(pattern: &str, flags: &str, replacement: &str, content: &str) -> String {
        let compiled = Pattern::compile(pattern, flags).unwrap();
        let template = Template::parse(replacement, &compiled.regex);
        compiled.apply(content, &template).0
    }

    #[tokio::test]
    async fn copy_leaves_source_untouched() {
        let (tmp, roots) = setup();
        tmp.child("src.txt").write_str("head\n<begin>\nbody\n<end>\ntail").unwrap();
        tmp.child("dst.txt").write_str("old").unwrap();

        let msg = copy_to_new_file(&roots, &p(&tmp, "src.txt"), &TextRange::new("<begin>\n", "<end>"), &p(&tmp, "dst.txt"))
            .await
            .unwrap();
        assert!(msg.starts_with("Copied 5 characters"));
        assert_eq!(read(&tmp, "dst.txt"), "body\n");
        assert_eq!(read(&tmp, "src.txt"), "head\n<begin>\nbody\n<end>\ntail");
    }

    #[tokio::test]
    async fn cut_onto_its_own_source_is_refused() {
        let (tmp, roots) = setup();
        tmp.child("same.txt").write_str("keep [x] this").unwrap();
        let aliased = format!("{}/./same.txt", tmp.path().display());

        let err = cut_to_new_file(&roots, &p(&tmp, "same.txt"), &TextRange::new("[", "]"), &aliased)
            .await
            .unwrap_err();
        assert!(matches!(&err, AppError::SchemaInvalid(m) if m.contains("same file")), "{err:?}");
        assert_eq!(read(&tmp, "same.txt"), "keep [x] this");
    }

    #[tokio::test]
    async fn cut_conserves_content() {
        let (tmp, roots) = setup();
        let original = "alpha [keep me] omega";
        tmp.child("src.txt").write_str(original).unwrap();

        cut_to_new_file(&roots, &p(&tmp, "src.txt"), &TextRange::new("[", "]"), &p(&tmp, "new.txt"))
            .await
            .unwrap();
        let extracted = read(&tmp, "new.txt");
        let source = read(&tmp, "src.txt");
        assert_eq!(extracted, "keep me");
        assert_eq!(source, "alpha [] omega");
        let start = original.find('[').unwrap() + 1;
        let rebuilt = format!("{}{}{}", &source[..start], extracted, &source[start..]);
        assert_eq!(rebuilt, original);
    }

    #[tokio::test]
    async fn append_creates_then_extends_target() {
        let (tmp, roots) = setup();
        tmp.child("src.txt").write_str("<<one>> <<two>>").unwrap();
        let range = TextRange::new("<<", ">>");

        append_to_file(&roots, &p(&tmp, "src.txt"), &range, &p(&tmp, "log.txt")).await.unwrap();
        append_to_file(&roots, &p(&tmp, "src.txt"), &range, &p(&tmp, "log.txt")).await.unwrap();
        assert_eq!(read(&tmp, "log.txt"), "oneone");
    }

    #[tokio::test]
    async fn insert_keeps_bracketed_text() {
        let (tmp, roots) = setup();
        tmp.child("f.rs").write_str("fn main() {\n    run();\n}\n").unwrap();

        insert_at_position(&roots, &p(&tmp, "f.rs"), &TextRange::new("{\n", "}"), "    init();\n")
            .await
            .unwrap();
        assert_eq!(read(&tmp, "f.rs"), "fn main() {\n    init();\n    run();\n}\n");
    }

    #[tokio::test]
    async fn delete_and_replace_splice_exactly() {
        let (tmp, roots) = setup();
        tmp.child("a.txt").write_str("x\r\n<a>\r\nold\r\n</a>\r\ny").unwrap();
        let range = TextRange::new("<a>\r\n", "</a>");

        replace_block(&roots, &p(&tmp, "a.txt"), &range, "new\r\n").await.unwrap();
        assert_eq!(read(&tmp, "a.txt"), "x\r\n<a>\r\nnew\r\n</a>\r\ny");

        delete_range(&roots, &p(&tmp, "a.txt"), &range).await.unwrap();
        assert_eq!(read(&tmp, "a.txt"), "x\r\n<a>\r\n</a>\r\ny");
    }

    #[tokio::test]
    async fn missing_marker_leaves_file_unmodified() {
        let (tmp, roots) = setup();
        tmp.child("a.txt").write_str("nothing to see").unwrap();

        let err = delete_range(&roots, &p(&tmp, "a.txt"), &TextRange::new("BEGIN", "END")).await.unwrap_err();
        assert!(matches!(err, AppError::RangeNotFound));
        tmp.child("a.txt").assert("nothing to see");
    }

    #[tokio::test]
    async fn range_not_found_writes_no_target() {
        let (tmp, roots) = setup();
        tmp.child("src.txt").write_str("abc").unwrap();

        let err = cut_to_new_file(&roots, &p(&tmp, "src.txt"), &TextRange::new("x", "y"), &p(&tmp, "out.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::RangeNotFound));
        assert!(!tmp.child("out.txt").path().exists());
        tmp.child("src.txt").assert("abc");
    }

    #[tokio::test]
    async fn target_outside_sandbox_is_denied_before_reading() {
        let (tmp, roots) = setup();
        let outside = TempDir::new().unwrap();
        tmp.child("src.txt").write_str("[x]").unwrap();

        let target = outside.child("stolen.txt").path().display().to_string();
        let err = copy_to_new_file(&roots, &p(&tmp, "src.txt"), &TextRange::new("[", "]"), &target)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessDenied(_)));
        assert!(!outside.child("stolen.txt").path().exists());
    }

    #[tokio::test]
    async fn missing_source_surfaces_io_error() {
        let (tmp, roots) = setup();
        let err = delete_range(&roots, &p(&tmp, "ghost.txt"), &TextRange::new("a", "b")).await.unwrap_err();
        match err {
            AppError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn replace_by_pattern_first_or_all() {
        let (tmp, roots) = setup();
        tmp.child("a.txt").write_str("aaa").unwrap();
        replace_by_pattern(&roots, &p(&tmp, "a.txt"), "a", "", "b").await.unwrap();
        assert_eq!(read(&tmp, "a.txt"), "baa");

        tmp.child("a.txt").write_str("aaa").unwrap();
        let msg = replace_by_pattern(&roots, &p(&tmp, "a.txt"), "a", "g", "b").await.unwrap();
        assert_eq!(read(&tmp, "a.txt"), "bbb");
        assert!(msg.starts_with("Replaced 3 match(es)"));
    }

    #[tokio::test]
    async fn replace_by_pattern_without_match_does_not_write() {
        let (tmp, roots) = setup();
        tmp.child("a.txt").write_str("abc").unwrap();
        let msg = replace_by_pattern(&roots, &p(&tmp, "a.txt"), "z+", "g", "y").await.unwrap();
        assert!(msg.starts_with("No matches"));
        tmp.child("a.txt").assert("abc");
    }

    #[tokio::test]
    async fn bad_pattern_is_rejected_before_io() {
        let (_tmp, roots) = setup();
        let err = replace_by_pattern(&roots, "/definitely/not/allowed", "(", "", "x").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidPattern(_)));
        let err = replace_by_pattern(&roots, "/definitely/not/allowed", "a", "gq", "x").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidPattern(_)));
    }

    #[test]
    fn back_references() {
        assert_eq!(sub(r"(\w+) (\w+)", "", "$2 $1", "hello world"), "world hello");
        assert_eq!(sub(r"(?P<word>o+)", "g", "[$<word>]", "foo bot"), "f[oo] b[o]t");
        assert_eq!(sub("b", "", "<$&>", "abc"), "a<b>c");
        assert_eq!(sub("b", "", "$`|$'", "abc"), "aa|cc");
        assert_eq!(sub("b", "", "$$1", "abc"), "a$1c");
        // no second group: `$2` is literal, and `$1` followed by a digit stays one digit
        assert_eq!(sub("(b)", "", "$2", "abc"), "a$2c");
        assert_eq!(sub("(b)", "", "$10", "abc"), "ab0c");
        assert_eq!(sub("b", "", "cost: $", "abc"), "acost: $c");
    }

    #[test]
    fn flags_map_onto_builder() {
        assert_eq!(sub("A", "gi", "x", "aAa"), "xxx");
        assert_eq!(sub("^b", "gm", "x", "a\nb\nb"), "a\nx\nx");
        assert_eq!(sub("a.b", "s", "x", "a\nb"), "x");
        assert_eq!(sub("a.b", "", "x", "a\nb"), "a\nb");
        assert_eq!(sub("a b", "x", "-", "ab"), "-");
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

        #[test]
        fn replace_block_round_trip(
            head in "[a-z \r\n]{0,30}",
            middle in "[a-z \r\n]{0,30}",
            tail in "[a-z \r\n]{0,30}",
            replacement in "[a-z \r\n]{0,30}",
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let (tmp, roots) = setup();
            let original = format!("{head}@@{middle}##{tail}");
            tmp.child("f.txt").write_str(&original).unwrap();

            rt.block_on(replace_block(&roots, &p(&tmp, "f.txt"), &TextRange::new("@@", "##"), &replacement)).unwrap();
            let start = head.len() + 2;
            let end = start + middle.len();
            let expected = format!("{}{}{}", &original[..start], replacement, &original[end..]);
            prop_assert_eq!(read(&tmp, "f.txt"), expected);
        }
    }
}
