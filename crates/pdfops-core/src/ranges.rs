//! Page range parsing.
//!
//! Range specs use 1-based page numbers (`"1-3, 5, 8-10"`); the parsed
//! [`PageIndexSet`] holds zero-based indices validated against a page count.

use std::collections::BTreeSet;

use tracing::debug;

use crate::command::Warning;

/// Sorted, deduplicated zero-based page indices, all below the page count
/// they were built against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageIndexSet(Vec<usize>);

impl PageIndexSet {
    pub fn all(total_pages: usize) -> Self {
        Self((0..total_pages).collect())
    }

    /// Build from arbitrary indices, dropping anything `>= total_pages`.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>, total_pages: usize) -> Self {
        let set: BTreeSet<usize> = indices
            .into_iter()
            .filter(|&index| index < total_pages)
            .collect();
        Self(set.into_iter().collect())
    }

    /// Build from 1-based page numbers, dropping zero and out-of-range pages.
    pub fn from_page_numbers(pages: &[usize], total_pages: usize) -> Self {
        Self::from_indices(
            pages.iter().filter(|&&p| p >= 1).map(|&p| p - 1),
            total_pages,
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.0.binary_search(&index).is_ok()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().copied()
    }

    /// 1-based page numbers, the form lopdf page APIs expect.
    pub fn page_numbers(&self) -> Vec<u32> {
        self.0.iter().map(|&i| i as u32 + 1).collect()
    }
}

impl IntoIterator for PageIndexSet {
    type Item = usize;
    type IntoIter = std::vec::IntoIter<usize>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Parse a range spec such as `"1-3, 5"` against `total_pages`.
///
/// Unparseable segments are ignored, out-of-bounds pages are dropped, and
/// reversed ranges contribute nothing. Empty or `"all"` selects every page.
pub fn parse(spec: &str, total_pages: usize) -> PageIndexSet {
    parse_with_warnings(spec, total_pages).0
}

/// Like [`parse`], also reporting the segments that were ignored.
pub fn parse_with_warnings(spec: &str, total_pages: usize) -> (PageIndexSet, Vec<Warning>) {
    let spec = spec.trim();
    if spec.is_empty() || spec.eq_ignore_ascii_case("all") {
        return (PageIndexSet::all(total_pages), Vec::new());
    }

    let mut pages = BTreeSet::new();
    let mut warnings = Vec::new();

    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let bounds = match part.split_once('-') {
            Some((start, end)) => parse_number(start).zip(parse_number(end)),
            None => parse_number(part).map(|page| (page, page)),
        };

        let Some((start, end)) = bounds else {
            debug!(segment = part, "ignoring unparseable page range segment");
            warnings.push(Warning::IgnoredRangeSegment {
                segment: part.to_string(),
            });
            continue;
        };

        // Narrow to the valid window first so huge bounds never iterate.
        let low = start.max(1);
        let high = end.min(total_pages as i64);
        for page in low..=high {
            pages.insert((page - 1) as usize);
        }
    }

    (PageIndexSet(pages.into_iter().collect()), warnings)
}

fn parse_number(text: &str) -> Option<i64> {
    text.trim().parse().ok()
}
