use std::ops::Range;

use anyhow::{Context, Result};
use regex::Regex;

use crate::pipeline::patterns::{Boundary, RuleTable, next_line_start};

/// A header-anchored block of text. `inline` is whatever followed the colon on
/// the header line; `body` runs from the next line up to the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block<'t> {
    pub rule: &'static str,
    pub inline: &'t str,
    pub body: &'t str,
    pub range: Range<usize>,
}

impl Block<'_> {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if !self.inline.is_empty() {
            lines.push(self.inline.to_string());
        }
        lines.extend(
            self.body
                .lines()
                .map(|line| line.trim())
                .filter(|line| !line.is_empty())
                .map(ToOwned::to_owned),
        );
        lines
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SplitItems {
    pub items: Vec<String>,
    pub dropped: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct BlockReader {
    boundary: Boundary,
    enumerated: Regex,
    bullet: Regex,
}

impl BlockReader {
    pub fn new() -> Result<Self> {
        Ok(Self {
            boundary: Boundary::new()?,
            enumerated: Regex::new(r"^(?P<marker>\d{1,3})[.)](?:[ \t]+(?P<body>.*)|[ \t]*$)")
                .context("failed to compile enumerated item regex")?,
            bullet: Regex::new(r"^[-*•–][ \t]*").context("failed to compile bullet regex")?,
        })
    }

    /// Tries anchors in precedence order and returns the first block that has
    /// any text. An anchor followed directly by another header is skipped.
    pub fn find_block<'t>(&self, text: &'t str, anchors: &RuleTable) -> Option<Block<'t>> {
        anchors
            .rules()
            .iter()
            .find_map(|rule| {
                rule.regex
                    .captures_iter(text)
                    .filter_map(|captures| {
                        let whole = captures.get(0)?;
                        let inline = captures
                            .name("inline")
                            .map(|m| m.as_str().trim())
                            .unwrap_or("");
                        Some(self.block_at(text, rule.name, whole.start(), whole.end(), inline))
                    })
                    .find(|block| !block.inline.is_empty() || !block.body.trim().is_empty())
            })
    }

    /// Every anchored block in the text, across all anchors, in document order.
    pub fn all_blocks<'t>(&self, text: &'t str, anchors: &RuleTable) -> Vec<Block<'t>> {
        let mut blocks = anchors
            .rules()
            .iter()
            .flat_map(|rule| {
                rule.regex.captures_iter(text).filter_map(|captures| {
                    let whole = captures.get(0)?;
                    let inline = captures
                        .name("inline")
                        .map(|m| m.as_str().trim())
                        .unwrap_or("");
                    Some(self.block_at(text, rule.name, whole.start(), whole.end(), inline))
                })
            })
            .collect::<Vec<Block<'t>>>();
        blocks.sort_by_key(|block| block.range.start);
        blocks.dedup_by_key(|block| block.range.start);
        blocks
    }

    fn block_at<'t>(
        &self,
        text: &'t str,
        rule: &'static str,
        header_start: usize,
        header_end: usize,
        inline: &'t str,
    ) -> Block<'t> {
        let body_start = next_line_start(text, header_end);
        let body_end = self.boundary.block_end(text, body_start);

        Block {
            rule,
            inline,
            body: &text[body_start..body_end],
            range: header_start..body_end,
        }
    }

    /// Splits block lines into list items on leading `N.` / `N)` markers.
    /// Unmarked lines continue the open item. Without any markers every line
    /// is its own item. Markers with no text are dropped.
    pub fn split_items(&self, lines: &[String]) -> SplitItems {
        let enumerated = lines.iter().any(|line| self.enumerated.is_match(line));
        let mut split = SplitItems::default();

        if !enumerated {
            split.items = lines
                .iter()
                .map(|line| self.bullet.replace(line, "").trim().to_string())
                .filter(|line| !line.is_empty())
                .collect();
            return split;
        }

        let mut active: Option<(String, String)> = None;
        let finish = |item: Option<(String, String)>, split: &mut SplitItems| {
            if let Some((marker, text)) = item {
                if text.trim().is_empty() {
                    split
                        .dropped
                        .push(format!("enumerated item {marker} has no text"));
                } else {
                    split.items.push(text.trim().to_string());
                }
            }
        };

        for line in lines {
            if let Some(captures) = self.enumerated.captures(line) {
                finish(active.take(), &mut split);
                let marker = captures
                    .name("marker")
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                let body = captures
                    .name("body")
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default();
                active = Some((marker, body));
                continue;
            }

            match active.as_mut() {
                Some((_, text)) => {
                    if !text.is_empty() {
                        text.push(' ');
                    }
                    text.push_str(line.trim());
                }
                None => split.items.push(line.trim().to_string()),
            }
        }
        finish(active.take(), &mut split);

        split
    }
}
