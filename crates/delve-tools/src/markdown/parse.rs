//! Line-oriented markdown block scanner.
//!
//! Produces line-numbered (1-based) blocks: ATX and setext headers,
//! paragraphs, fenced code, pipe tables, and ordered/unordered lists, plus
//! inline links found outside code.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static ATX_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(#{1,6})(?:[ \t]+(.*?))?(?:[ \t]+#+)?[ \t]*$").unwrap());
static SETEXT_UNDERLINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(=+|-+)[ \t]*$").unwrap());
static THEMATIC_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}((\*[ \t]*){3,}|(-[ \t]*){3,}|(_[ \t]*){3,})$").unwrap());
static FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ {0,3}(`{3,}|~{3,})[ \t]*([^`\s]*)").unwrap());
static UNORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]*[-*+][ \t]+(.*)$").unwrap());
static ORDERED_ITEM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[ \t]*\d{1,9}[.)][ \t]+(.*)$").unwrap());
static TABLE_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[ \t]*\|?[ \t]*:?-+:?[ \t]*(\|[ \t]*:?-+:?[ \t]*)*\|?[ \t]*$").unwrap());
static INLINE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(!?)\[([^\]]*)\]\(\s*<?([^)\s>]+)>?(?:\s+"[^"]*")?\s*\)"#).unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub line: usize,
    pub level: usize,
    pub text: String,
    /// Setext headers own their underline, so sections start one line later.
    #[serde(skip)]
    pub setext: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paragraph {
    pub line: usize,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CodeBlock {
    pub start_line: usize,
    pub end_line: usize,
    pub language: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub line: usize,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct List {
    pub line: usize,
    #[serde(skip)]
    pub ordered: bool,
    pub items: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Link {
    pub line: usize,
    pub text: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Header(Header),
    Paragraph(Paragraph),
    Code(CodeBlock),
    Table(Table),
    List(List),
}

/// Scanned document structure.
#[derive(Debug, Clone, Default)]
pub struct Blocks {
    pub blocks: Vec<Block>,
    pub links: Vec<Link>,
}

pub fn scan(content: &str) -> Blocks {
    let lines: Vec<&str> = content.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    let mut out = Blocks::default();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        if line.trim().is_empty() || THEMATIC_BREAK.is_match(line) {
            i += 1;
            continue;
        }

        if let Some(caps) = FENCE.captures(line) {
            let marker = &caps[1];
            let language = Some(caps[2].to_string()).filter(|l| !l.is_empty());
            let close = (i + 1..lines.len()).find(|&j| lines[j].trim_start().starts_with(marker));
            let end = close.unwrap_or(lines.len());
            out.blocks.push(Block::Code(CodeBlock {
                start_line: i + 1,
                end_line: close.map(|j| j + 1).unwrap_or(lines.len()),
                language,
                content: lines[i + 1..end].join("\n"),
            }));
            i = end + 1;
            continue;
        }

        if let Some(caps) = ATX_HEADER.captures(line) {
            let text = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            collect_links(text, i + 1, &mut out.links);
            out.blocks.push(Block::Header(Header {
                line: i + 1,
                level: caps[1].len(),
                text: text.to_string(),
                setext: false,
            }));
            i += 1;
            continue;
        }

        if line.contains('|') && lines.get(i + 1).is_some_and(|next| TABLE_SEPARATOR.is_match(next)) {
            let header = split_row(line);
            let mut rows = Vec::new();
            let mut j = i + 2;
            while j < lines.len() && lines[j].contains('|') && !lines[j].trim().is_empty() {
                collect_links(lines[j], j + 1, &mut out.links);
                rows.push(split_row(lines[j]));
                j += 1;
            }
            collect_links(line, i + 1, &mut out.links);
            out.blocks.push(Block::Table(Table {
                line: i + 1,
                header,
                rows,
            }));
            i = j;
            continue;
        }

        if let Some(ordered) = list_kind(line) {
            let start = i;
            let mut items = Vec::new();
            while i < lines.len() {
                let current = lines[i];
                match list_item(current, ordered) {
                    Some(item) => items.push(item.to_string()),
                    // Indented continuation of the previous item.
                    None if !items.is_empty()
                        && current.starts_with([' ', '\t'])
                        && !current.trim().is_empty()
                        && list_kind(current).is_none() =>
                    {
                        if let Some(last) = items.last_mut() {
                            last.push(' ');
                            last.push_str(current.trim());
                        }
                    }
                    None => break,
                }
                collect_links(current, i + 1, &mut out.links);
                i += 1;
            }
            out.blocks.push(Block::List(List {
                line: start + 1,
                ordered,
                items,
            }));
            continue;
        }

        // Setext header: a single text line underlined with === or ---.
        if let Some(caps) = lines.get(i + 1).and_then(|next| SETEXT_UNDERLINE.captures(next)) {
            let level = if caps[1].starts_with('=') { 1 } else { 2 };
            collect_links(line, i + 1, &mut out.links);
            out.blocks.push(Block::Header(Header {
                line: i + 1,
                level,
                text: line.trim().to_string(),
                setext: true,
            }));
            i += 2;
            continue;
        }

        let start = i;
        let mut text = Vec::new();
        while i < lines.len() {
            let current = lines[i];
            if current.trim().is_empty() || (i > start && starts_block(&lines, i)) {
                break;
            }
            collect_links(current, i + 1, &mut out.links);
            text.push(current.trim().trim_start_matches('>').trim());
            i += 1;
        }
        out.blocks.push(Block::Paragraph(Paragraph {
            line: start + 1,
            content: text.join("\n"),
        }));
    }

    out
}

/// Whether line `i` opens a block that interrupts a paragraph.
fn starts_block(lines: &[&str], i: usize) -> bool {
    let line = lines[i];
    ATX_HEADER.is_match(line)
        || FENCE.is_match(line)
        || THEMATIC_BREAK.is_match(line)
        || list_kind(line).is_some()
        || (line.contains('|') && lines.get(i + 1).is_some_and(|next| TABLE_SEPARATOR.is_match(next)))
}

/// `Some(true)` for an ordered item, `Some(false)` for unordered.
fn list_kind(line: &str) -> Option<bool> {
    if ORDERED_ITEM.is_match(line) {
        Some(true)
    } else if UNORDERED_ITEM.is_match(line) && !THEMATIC_BREAK.is_match(line) {
        Some(false)
    } else {
        None
    }
}

fn list_item(line: &str, ordered: bool) -> Option<&str> {
    let re = if ordered { &ORDERED_ITEM } else { &UNORDERED_ITEM };
    if list_kind(line) != Some(ordered) {
        return None;
    }
    re.captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn collect_links(text: &str, line: usize, links: &mut Vec<Link>) {
    for caps in INLINE_LINK.captures_iter(text) {
        if !caps[1].is_empty() {
            // Image, not a link.
            continue;
        }
        links.push(Link {
            line,
            text: caps[2].trim().to_string(),
            url: caps[3].to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(blocks: &Blocks) -> Vec<(usize, usize, &str)> {
        blocks
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Header(h) => Some((h.line, h.level, h.text.as_str())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_atx_and_setext_headers() {
        let doc = "# Title\n\nIntro text.\n\nSection\n-------\n\n### Deep ###\n";
        let blocks = scan(doc);
        assert_eq!(
            headers(&blocks),
            vec![(1, 1, "Title"), (5, 2, "Section"), (8, 3, "Deep")]
        );
    }

    #[test]
    fn test_hash_without_space_is_not_header() {
        let blocks = scan("#hashtag text");
        assert!(headers(&blocks).is_empty());
        assert!(matches!(blocks.blocks[0], Block::Paragraph(_)));
    }

    #[test]
    fn test_fenced_code_hides_headers() {
        let doc = "# Real\n```rust\n# not a header\nfn main() {}\n```\nafter";
        let blocks = scan(doc);
        assert_eq!(headers(&blocks), vec![(1, 1, "Real")]);
        let code = blocks
            .blocks
            .iter()
            .find_map(|b| match b {
                Block::Code(c) => Some(c),
                _ => None,
            })
            .unwrap();
        assert_eq!(code.start_line, 2);
        assert_eq!(code.end_line, 5);
        assert_eq!(code.language.as_deref(), Some("rust"));
        assert_eq!(code.content, "# not a header\nfn main() {}");
    }

    #[test]
    fn test_table_rows_and_line() {
        let doc = "Intro\n\n| Name | Value |\n|------|:-----:|\n| a | 1 |\n| b | 2 |\n\nTail";
        let blocks = scan(doc);
        let table = blocks
            .blocks
            .iter()
            .find_map(|b| match b {
                Block::Table(t) => Some(t),
                _ => None,
            })
            .unwrap();
        assert_eq!(table.line, 3);
        assert_eq!(table.header, vec!["Name", "Value"]);
        assert_eq!(table.rows, vec![vec!["a", "1"], vec!["b", "2"]]);
    }

    #[test]
    fn test_lists_with_continuation() {
        let doc = "- one\n- two\n  continued\n\n1. first\n2. second";
        let blocks = scan(doc);
        let lists: Vec<&List> = blocks
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::List(l) => Some(l),
                _ => None,
            })
            .collect();
        assert_eq!(lists.len(), 2);
        assert!(!lists[0].ordered);
        assert_eq!(lists[0].items, vec!["one", "two continued"]);
        assert!(lists[1].ordered);
        assert_eq!(lists[1].line, 5);
        assert_eq!(lists[1].items, vec!["first", "second"]);
    }

    #[test]
    fn test_paragraph_spans_lines_until_blank() {
        let blocks = scan("line one\nline two\n\nnext");
        assert_eq!(
            blocks.blocks[0],
            Block::Paragraph(Paragraph {
                line: 1,
                content: "line one\nline two".into()
            })
        );
        assert!(matches!(&blocks.blocks[1], Block::Paragraph(p) if p.line == 4));
    }

    #[test]
    fn test_links_skip_images_and_code() {
        let doc = "See [docs](https://example.com/docs) and ![logo](logo.png).\n```\n[hidden](https://x.y)\n```";
        let blocks = scan(doc);
        assert_eq!(
            blocks.links,
            vec![Link {
                line: 1,
                text: "docs".into(),
                url: "https://example.com/docs".into()
            }]
        );
    }

    #[test]
    fn test_thematic_break_is_not_setext_or_list() {
        let blocks = scan("Para\n\n---\n\n* * *\n");
        assert_eq!(blocks.blocks.len(), 1);
        assert!(headers(&blocks).is_empty());
    }
}
