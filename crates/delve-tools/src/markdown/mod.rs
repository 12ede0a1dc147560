//! Structural queries over one markdown document.
//!
//! Every query returns the text handed to the model: JSON for structured
//! results, grid tables for tables, and a short sentence when nothing
//! matches.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::json;

pub mod grid;
pub mod parse;

use parse::{Block, Blocks, CodeBlock, Header, Link, List, Paragraph, Table};

const INTRO_KEYWORDS: &[&str] = &[
    "abstract",
    "summary",
    "executive summary",
    "introduction",
    "intro",
    "overview",
    "about",
    "preface",
    "foreword",
    "background",
    "context",
    "getting started",
    "what is",
    "description",
];

const INTRO_MAX_WORDS: usize = 300;
const INTRO_MAX_PARAGRAPHS: usize = 3;
const METADATA_CELL_WIDTH: usize = 40;
const TABLE_CELL_WIDTH: usize = 15;

static MARKDOWN_LINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\([^)]+\)").unwrap());

/// A parsed document.
#[derive(Debug, Clone)]
pub struct MarkdownDocument {
    content: String,
    blocks: Blocks,
}

/// A header's section body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub header: Header,
    pub content: String,
    pub content_lines: String,
    pub word_count: usize,
}

/// Result of introduction extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intro {
    ExplicitHeader {
        #[serde(flatten)]
        section: Section,
    },
    InferredParagraphs {
        header: Header,
        content: String,
        content_lines: String,
        word_count: usize,
        paragraphs_count: usize,
    },
}

impl Intro {
    fn kind(&self) -> &'static str {
        match self {
            Intro::ExplicitHeader { .. } => "Explicit Header",
            Intro::InferredParagraphs { .. } => "Inferred Paragraphs",
        }
    }

    fn content(&self) -> &str {
        match self {
            Intro::ExplicitHeader { section } => &section.content,
            Intro::InferredParagraphs { content, .. } => content,
        }
    }

    fn word_count(&self) -> usize {
        match self {
            Intro::ExplicitHeader { section } => section.word_count,
            Intro::InferredParagraphs { word_count, .. } => *word_count,
        }
    }
}

impl MarkdownDocument {
    pub fn parse(content: impl Into<String>) -> Self {
        let content = content.into();
        let blocks = parse::scan(&content);
        Self { content, blocks }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn headers(&self) -> Vec<&Header> {
        self.blocks
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Header(h) => Some(h),
                _ => None,
            })
            .collect()
    }

    pub fn paragraphs(&self) -> Vec<&Paragraph> {
        self.blocks
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Paragraph(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn tables(&self) -> Vec<&Table> {
        self.blocks
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Table(t) => Some(t),
                _ => None,
            })
            .collect()
    }

    pub fn lists(&self) -> Vec<&List> {
        self.blocks
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::List(l) => Some(l),
                _ => None,
            })
            .collect()
    }

    pub fn code_blocks(&self) -> Vec<&CodeBlock> {
        self.blocks
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Code(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Links with an http(s) target.
    pub fn http_links(&self) -> Vec<&Link> {
        self.blocks
            .links
            .iter()
            .filter(|l| l.url.to_lowercase().starts_with("http"))
            .collect()
    }

    /// Body under the header at `line`, up to the line before the next header
    /// of the same or a higher level.
    pub fn section(&self, line: usize) -> Option<Section> {
        let headers = self.headers();
        let target = headers.iter().find(|h| h.line == line)?;
        let lines: Vec<&str> = self.content.split('\n').collect();

        let end_line = headers
            .iter()
            .find(|h| h.line > target.line && h.level <= target.level)
            .map(|h| h.line - 1)
            .unwrap_or(lines.len())
            .min(lines.len());
        let body_start = if target.setext { target.line + 1 } else { target.line };

        let content = lines
            .get(body_start.min(end_line)..end_line)
            .unwrap_or_default()
            .iter()
            .map(|l| l.trim_end_matches('\r'))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
        let word_count = content.split_whitespace().count();

        Some(Section {
            header: (*target).clone(),
            content_lines: format!("{}-{}", body_start + 1, end_line),
            content,
            word_count,
        })
    }

    pub fn intro(&self) -> Option<Intro> {
        let headers = self.headers();
        let explicit = headers.iter().find(|h| {
            let text = h.text.to_lowercase();
            INTRO_KEYWORDS.iter().any(|k| text.contains(k))
        });
        if let Some(header) = explicit {
            return self.section(header.line).map(|section| Intro::ExplicitHeader { section });
        }

        let title = headers.first()?;
        let mut chosen: Vec<&Paragraph> = Vec::new();
        let mut word_count = 0;
        for paragraph in self.paragraphs().into_iter().filter(|p| p.line > title.line) {
            let words = paragraph.content.split_whitespace().count();
            if word_count + words > INTRO_MAX_WORDS {
                break;
            }
            chosen.push(paragraph);
            word_count += words;
            if chosen.len() >= INTRO_MAX_PARAGRAPHS {
                break;
            }
        }
        let (first, last) = (chosen.first()?, chosen.last()?);

        Some(Intro::InferredParagraphs {
            header: (*title).clone(),
            content: chosen
                .iter()
                .map(|p| p.content.trim())
                .collect::<Vec<_>>()
                .join("\n\n"),
            content_lines: format!("{}-{}", first.line, last.line),
            word_count,
            paragraphs_count: chosen.len(),
        })
    }

    // --- Tool-facing renderings ---

    pub fn get_headers(&self) -> serde_json::Result<String> {
        let headers = self.headers();
        if headers.is_empty() {
            return Ok("No headers found".into());
        }
        serde_json::to_string_pretty(&json!({ "Header": headers }))
    }

    pub fn get_header_by_line(&self, line: usize) -> serde_json::Result<String> {
        match self.section(line) {
            Some(section) => serde_json::to_string_pretty(&section),
            None => Ok(format!("No header at line {line}")),
        }
    }

    pub fn get_intro(&self) -> serde_json::Result<String> {
        if let Some(intro) = self.intro() {
            return serde_json::to_string_pretty(&intro);
        }
        if self.headers().is_empty() {
            Ok("No structure found for intro extraction".into())
        } else {
            Ok("No introductory content found".into())
        }
    }

    pub fn get_tables_metadata(&self) -> String {
        let tables = self.tables();
        if tables.is_empty() {
            return "No tables found".into();
        }
        let headers: Vec<String> = ["Table #", "Line", "Columns", "Rows", "Headers Preview"]
            .iter()
            .map(|h| h.to_string())
            .collect();
        let rows: Vec<Vec<String>> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| {
                vec![
                    (i + 1).to_string(),
                    t.line.to_string(),
                    t.header.len().to_string(),
                    t.rows.len().to_string(),
                    t.header.join(", "),
                ]
            })
            .collect();
        grid::grid_table(&headers, &rows, METADATA_CELL_WIDTH)
    }

    pub fn get_table_by_line(&self, line: usize) -> String {
        let Some(table) = self.tables().into_iter().find(|t| t.line == line) else {
            return format!("No table at line {line}");
        };
        let clean = |cell: &String| MARKDOWN_LINK.replace_all(cell, "$1").trim().to_string();
        let headers: Vec<String> = table.header.iter().map(clean).collect();
        let rows: Vec<Vec<String>> = table
            .rows
            .iter()
            .map(|row| row.iter().map(clean).collect())
            .collect();
        grid::grid_table(&headers, &rows, TABLE_CELL_WIDTH)
    }

    pub fn get_paragraphs(&self) -> serde_json::Result<String> {
        let paragraphs = self.paragraphs();
        if paragraphs.is_empty() {
            return Ok("No paragraphs found".into());
        }
        serde_json::to_string_pretty(&json!({ "Paragraph": paragraphs }))
    }

    pub fn get_lists(&self) -> serde_json::Result<String> {
        let lists = self.lists();
        if lists.is_empty() {
            return Ok("No lists found".into());
        }
        let (ordered, unordered): (Vec<&List>, Vec<&List>) = lists.into_iter().partition(|l| l.ordered);
        serde_json::to_string_pretty(&json!({
            "Ordered list": ordered,
            "Unordered list": unordered,
        }))
    }

    pub fn get_code_blocks(&self) -> serde_json::Result<String> {
        let blocks = self.code_blocks();
        if blocks.is_empty() {
            return Ok("No code blocks found".into());
        }
        serde_json::to_string_pretty(&json!({ "Code block": blocks }))
    }

    pub fn get_links(&self) -> serde_json::Result<String> {
        let links = self.http_links();
        if links.is_empty() {
            return Ok("No HTTP links found".into());
        }
        serde_json::to_string_pretty(&links)
    }

    /// Bird's-eye view: title, intro, outline, statistics.
    pub fn get_overview(&self) -> String {
        let headers = self.headers();
        let Some(title) = headers.first() else {
            return "Empty document found".into();
        };

        let intro = self.intro();
        let paragraphs = self.paragraphs();
        let code_blocks = self.code_blocks();
        let tables = self.tables();
        let lists = self.lists();
        let links = self.http_links();
        let estimated_words: usize = paragraphs.iter().map(|p| p.content.split_whitespace().count()).sum();

        let yes_no = |b: bool| if b { "Yes" } else { "No" };
        let bullets = |items: Vec<String>| {
            if items.is_empty() {
                "None".to_string()
            } else {
                items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
            }
        };

        let structure = headers
            .iter()
            .map(|h| format!("{}H{}: {} (line {})", "  ".repeat(h.level - 1), h.level, h.text, h.line))
            .collect::<Vec<_>>()
            .join("\n");
        let code_detail = bullets(
            code_blocks
                .iter()
                .map(|c| {
                    format!(
                        "{} code block (lines {}-{})",
                        c.language.as_deref().unwrap_or("unknown"),
                        c.start_line,
                        c.end_line
                    )
                })
                .collect(),
        );
        let table_detail = bullets(tables.iter().map(|t| format!("Table at line {}", t.line)).collect());
        let header_list = headers.iter().map(|h| format!("- {}", h.text)).collect::<Vec<_>>().join("\n");

        format!(
            "# Document Overview: {title}

## Introduction/Abstract
- **Found**: {found}
- **Type**: {kind}
- **Word Count**: {intro_words}

{intro_content}

## Document Structure
{structure}

## Content Statistics
- **Total Sections**: {sections}
- **Paragraphs**: {paragraph_count}
- **Estimated Words**: {estimated_words}
- **Code Blocks**: {code_count}
- **Tables**: {table_count}
- **Lists**: {list_count}
- **External Links**: {link_count}

## Code Blocks Detail
{code_detail}

## Tables Detail
{table_detail}

## Content Types Present
- **Has Introduction**: {found}
- **Has Code**: {has_code}
- **Has Tables**: {has_tables}
- **Has Lists**: {has_lists}
- **Has External Links**: {has_links}

## All Headers List
{header_list}
",
            title = title.text,
            found = yes_no(intro.is_some()),
            kind = intro.as_ref().map(Intro::kind).unwrap_or("None"),
            intro_words = intro.as_ref().map(Intro::word_count).unwrap_or(0),
            intro_content = intro.as_ref().map(Intro::content).unwrap_or("No introduction found"),
            sections = headers.len(),
            paragraph_count = paragraphs.len(),
            code_count = code_blocks.len(),
            table_count = tables.len(),
            list_count = lists.len(),
            link_count = links.len(),
            has_code = yes_no(!code_blocks.is_empty()),
            has_tables = yes_no(!tables.is_empty()),
            has_lists = yes_no(!lists.is_empty()),
            has_links = yes_no(!links.is_empty()),
        )
    }
}
