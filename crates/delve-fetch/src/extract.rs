//! HTML to markdown-like text, restricted to the page's main content.
//!
//! Output keeps the structure the document tools query: `#` headings,
//! paragraphs separated by blank lines, `-`/`1.` list items, fenced code and
//! pipe tables.

use scraper::{ElementRef, Html, Selector};

/// Tried in order; the first one with visible text wins, else `<body>`.
const MAIN_CONTENT_SELECTORS: [&str; 7] = [
    "article",
    "main",
    "[role='main']",
    "#content",
    ".content",
    ".post-content",
    ".entry-content",
];

/// Never rendered.
const SKIPPED: [&str; 13] = [
    "script", "style", "noscript", "template", "head", "nav", "footer", "aside", "form", "button", "svg",
    "iframe", "img",
];

const INLINE: [&str; 18] = [
    "a", "abbr", "b", "cite", "code", "em", "i", "kbd", "label", "mark", "q", "s", "small", "span", "strong",
    "sub", "sup", "time",
];

/// Convert an HTML page to text.
pub fn html_to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = main_content(&document).unwrap_or_else(|| document.root_element());
    let mut renderer = Renderer::default();
    renderer.block(root);
    tidy(&renderer.out)
}

/// True when a content type should go through HTML extraction.
pub fn is_html(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|ct| {
        let ct = ct.to_ascii_lowercase();
        ct.contains("html") || ct.contains("xml")
    })
}

fn main_content(document: &Html) -> Option<ElementRef<'_>> {
    for selector_str in MAIN_CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            let found = document
                .select(&selector)
                .find(|el| el.text().any(|t| !t.trim().is_empty()));
            if found.is_some() {
                return found;
            }
        }
    }
    Selector::parse("body")
        .ok()
        .and_then(|body| document.select(&body).next())
}

#[derive(Default)]
struct Renderer {
    out: String,
}

impl Renderer {
    fn block(&mut self, el: ElementRef<'_>) {
        let name = el.value().name();
        if SKIPPED.contains(&name) {
            return;
        }
        match name {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = usize::from(name.as_bytes()[1] - b'0');
                let text = inline_text(el);
                if !text.is_empty() {
                    self.paragraph(&format!("{} {text}", "#".repeat(level)));
                }
            }
            "p" => self.paragraph(&inline_text(el)),
            "pre" => {
                let code: String = el.text().collect();
                let code = code.trim_matches('\n');
                if !code.trim().is_empty() {
                    self.paragraph(&format!("```\n{code}\n```"));
                }
            }
            "ul" | "ol" => {
                let mut lines = Vec::new();
                list_lines(el, name == "ol", 0, &mut lines);
                self.paragraph(&lines.join("\n"));
            }
            "table" => self.table(el),
            "hr" => self.paragraph("---"),
            _ => self.container(el),
        }
    }

    /// Mixed content: inline runs become paragraphs between block children.
    fn container(&mut self, el: ElementRef<'_>) {
        let mut run = String::new();
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                run.push_str(text);
            } else if let Some(child) = ElementRef::wrap(child) {
                let name = child.value().name();
                if INLINE.contains(&name) || name == "br" {
                    push_element(child, &mut run);
                } else {
                    self.paragraph(&collapse(&run));
                    run.clear();
                    self.block(child);
                }
            }
        }
        self.paragraph(&collapse(&run));
    }

    fn table(&mut self, el: ElementRef<'_>) {
        let mut rows: Vec<Vec<String>> = el
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "tr")
            .map(|tr| {
                tr.children()
                    .filter_map(ElementRef::wrap)
                    .filter(|c| matches!(c.value().name(), "th" | "td"))
                    .map(|cell| inline_text(cell).replace('|', "/"))
                    .collect::<Vec<_>>()
            })
            .filter(|row| !row.is_empty())
            .collect();
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return;
        }
        for row in &mut rows {
            row.resize(width, String::new());
        }

        let render = |row: &[String]| format!("| {} |", row.join(" | "));
        let separator = vec!["---".to_string(); width];
        let mut lines = vec![render(rows[0].as_slice()), render(separator.as_slice())];
        lines.extend(rows[1..].iter().map(|r| render(r.as_slice())));
        self.paragraph(&lines.join("\n"));
    }

    fn paragraph(&mut self, text: &str) {
        let text = text.trim_end();
        if text.trim().is_empty() {
            return;
        }
        self.out.push_str("\n\n");
        self.out.push_str(text);
        self.out.push_str("\n\n");
    }
}

fn list_lines(list: ElementRef<'_>, ordered: bool, depth: usize, lines: &mut Vec<String>) {
    let indent = "  ".repeat(depth);
    let items = list
        .children()
        .filter_map(ElementRef::wrap)
        .filter(|c| c.value().name() == "li");
    for (n, item) in items.enumerate() {
        let mut text = String::new();
        let mut nested = Vec::new();
        for child in item.children() {
            if let Some(t) = child.value().as_text() {
                text.push_str(t);
            } else if let Some(child) = ElementRef::wrap(child) {
                match child.value().name() {
                    "ul" | "ol" => nested.push(child),
                    _ => push_element(child, &mut text),
                }
            }
        }
        let text = collapse(&text);
        if !text.is_empty() {
            let marker = if ordered { format!("{}.", n + 1) } else { "-".to_string() };
            lines.push(format!("{indent}{marker} {text}"));
        }
        for sub in nested {
            list_lines(sub, sub.value().name() == "ol", depth + 1, lines);
        }
    }
}

fn inline_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    push_children(el, &mut out);
    collapse(&out)
}

fn push_children(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
        } else if let Some(child) = ElementRef::wrap(child) {
            push_element(child, out);
        }
    }
}

fn push_element(el: ElementRef<'_>, out: &mut String) {
    let name = el.value().name();
    if SKIPPED.contains(&name) {
        return;
    }
    match name {
        "br" => out.push(' '),
        "a" => {
            let text = inline_text(el);
            match el.value().attr("href") {
                Some(href) if href.starts_with("http") && !text.is_empty() => {
                    out.push_str(&format!("[{text}]({href})"));
                }
                _ => out.push_str(&text),
            }
        }
        "code" => {
            let text = inline_text(el);
            if !text.is_empty() {
                out.push_str(&format!("`{text}`"));
            }
        }
        _ if INLINE.contains(&name) => push_children(el, out),
        _ => {
            // Block element in inline context.
            out.push(' ');
            push_children(el, out);
            out.push(' ');
        }
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trim trailing spaces and squeeze blank-line runs to one.
fn tidy(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank = false;
    for line in raw.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank = true;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank = false;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html><head><title>Release notes</title><style>body{}</style></head>
<body>
  <nav><a href="/">Home</a> <a href="/blog">Blog</a></nav>
  <article>
    <h1>Release 2.0</h1>
    <p>This   release adds <strong>streaming</strong> and
       <a href="https://example.com/docs">new docs</a>.</p>
    <h2>Changes</h2>
    <ul>
      <li>Faster parser</li>
      <li>Fixes
        <ol><li>crash on empty input</li></ol>
      </li>
    </ul>
    <table>
      <tr><th>Version</th><th>Date</th></tr>
      <tr><td>2.0</td><td>2024-05-01</td></tr>
    </table>
    <pre><code>cargo install tool
tool --help</code></pre>
    <script>track()</script>
  </article>
  <footer>Copyright</footer>
</body></html>"#;

    #[test]
    fn test_extracts_article_structure() {
        let text = html_to_markdown(PAGE);
        assert!(text.starts_with("# Release 2.0\n\n"));
        assert!(text.contains(
            "This release adds streaming and [new docs](https://example.com/docs)."
        ));
        assert!(text.contains("## Changes\n\n- Faster parser\n- Fixes\n  1. crash on empty input"));
        assert!(text.contains("| Version | Date |\n| --- | --- |\n| 2.0 | 2024-05-01 |"));
        assert!(text.contains("```\ncargo install tool\ntool --help\n```"));
        assert!(!text.contains("Home"));
        assert!(!text.contains("track()"));
        assert!(!text.contains("Copyright"));
    }

    #[test]
    fn test_falls_back_to_body() {
        let text = html_to_markdown("<html><body><div>Loose text<p>Para</p></div></body></html>");
        assert_eq!(text, "Loose text\n\nPara");
    }

    #[test]
    fn test_empty_page_is_blank() {
        assert!(html_to_markdown("<html><body><script>x()</script></body></html>").trim().is_empty());
    }

    #[test]
    fn test_extracted_text_is_queryable() {
        let doc = html_to_markdown(PAGE);
        assert_eq!(doc.lines().filter(|l| l.starts_with('#')).count(), 2);
    }

    #[test]
    fn test_content_type_detection() {
        assert!(is_html(Some("text/html; charset=utf-8")));
        assert!(is_html(None));
        assert!(!is_html(Some("text/plain")));
        assert!(!is_html(Some("text/markdown")));
    }
}
