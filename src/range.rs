//! Locating a region of text by the markers around it.

use serde::Deserialize;
use std::ops::Range;

/// A location specifier: the text just before and just after a region.
/// Must be resolved again against every new content snapshot.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TextRange {
    pub before_text: String,
    pub after_text: String,
}

impl TextRange {
    pub fn resolve<'c>(&self, content: &'c str) -> Option<ResolvedSpan<'c>> {
        find_range(content, &self.before_text, &self.after_text)
    }
}

#[cfg(test)]
impl TextRange {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self { before_text: before.into(), after_text: after.into() }
    }
}

/// Byte offsets `[start, end)` tied to the content they were computed from.
///
/// The borrow keeps a span from outliving its snapshot, so a span can never be
/// applied to content read after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedSpan<'c> {
    content: &'c str,
    pub start: usize,
    pub end: usize,
}

impl<'c> ResolvedSpan<'c> {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn text(&self) -> &'c str {
        &self.content[self.range()]
    }

    pub fn char_len(&self) -> usize {
        self.text().chars().count()
    }

    pub fn before(&self) -> &'c str {
        &self.content[..self.start]
    }

    pub fn after(&self) -> &'c str {
        &self.content[self.end..]
    }

    /// The snapshot with the span swapped for `replacement`.
    pub fn splice(&self, replacement: &str) -> String {
        let mut out = String::with_capacity(self.content.len() - (self.end - self.start) + replacement.len());
        out.push_str(self.before());
        out.push_str(replacement);
        out.push_str(self.after());
        out
    }

    /// The snapshot with `inserted` placed at the span's start, span kept.
    pub fn insert_before(&self, inserted: &str) -> String {
        let mut out = String::with_capacity(self.content.len() + inserted.len());
        out.push_str(self.before());
        out.push_str(inserted);
        out.push_str(&self.content[self.start..]);
        out
    }
}

/// Finds the text between the first `before` and the nearest `after` that follows it.
///
/// Both markers match literally. The returned span excludes the markers.
/// An empty `before` anchors at the start of the content; an empty `after`
/// matches immediately, giving an empty span.
pub fn find_range<'c>(content: &'c str, before: &str, after: &str) -> Option<ResolvedSpan<'c>> {
    // Later `before` hits end further right, so they can only see a subset of
    // the `after` hits the first one sees: the first one decides.
    let start = content.find(before)? + before.len();
    let end = start + content[start..].find(after)?;
    Some(ResolvedSpan { content, start, end })
}
