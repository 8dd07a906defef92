//! HTML parsing helpers shared by the cleaner, the web crawler, and the email source.
//!
//! Three operations are exposed: boilerplate-stripping article extraction (favoring
//! precision via a link-density check), `<a href>` harvesting, and an HTML-to-Markdown
//! conversion used by the text cleaner when the extractor emitted HTML.

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;

/// Containers stripped before any text extraction.
const EXCLUDED_TAGS: [&str; 7] = [
    "script", "style", "header", "footer", "nav", "aside", "head",
];

/// Block-level elements that force a line break in extracted text.
const BLOCK_TAGS: [&str; 14] = [
    "p",
    "div",
    "section",
    "article",
    "li",
    "ul",
    "ol",
    "br",
    "tr",
    "blockquote",
    "pre",
    "figure",
    "main",
    "form",
];

/// Candidate selectors tried in priority order when hunting for the article container.
static ARTICLE_SELECTORS: LazyLock<Vec<Selector>> = LazyLock::new(|| {
    ["article", "main", "[role=\"main\"]", "#content", ".content"]
        .iter()
        .filter_map(|raw| Selector::parse(raw).ok())
        .collect()
});

static ANCHOR_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("anchor selector"));

static ROW_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("tr").expect("row selector"));

static CELL_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("th, td").expect("cell selector"));

/// Cheap check for markup, used to decide whether cleanup should run the converter.
pub fn looks_like_html(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["<html", "<body", "<div", "<p>", "<p ", "<table", "<!doctype"]
        .iter()
        .any(|marker| lower.contains(marker))
}

/// Extract the main article text from an HTML document.
///
/// Tries common article containers first and keeps the longest candidate whose link
/// density stays low; falls back to the whole document with boilerplate containers
/// removed, emitted as whitespace-separated text.
pub fn extract_article_text(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector in ARTICLE_SELECTORS.iter() {
        let mut best: Option<String> = None;
        for element in document.select(selector) {
            let text = block_text(element);
            let trimmed = text.trim();
            if trimmed.chars().count() < 80 {
                continue;
            }
            if link_density(element) > 0.5 {
                continue;
            }
            if best.as_ref().map(|b| trimmed.len() > b.len()).unwrap_or(true) {
                best = Some(trimmed.to_string());
            }
        }
        if let Some(text) = best {
            return text;
        }
    }

    block_text(document.root_element())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collect every `<a href>` value in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR_SELECTOR)
        .filter_map(|element| element.value().attr("href"))
        .map(str::to_string)
        .collect()
}

/// Convert an HTML document to Markdown-flavored plain text.
///
/// Boilerplate containers are removed, `<h1..h6>` become Markdown headings, `<table>`
/// becomes a Markdown table with a separator row after the first row, and remaining
/// block elements emit their text on separate lines.
pub fn to_markdown(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines = Vec::new();
    let mut current = String::new();
    walk_markdown(document.root_element(), &mut lines, &mut current);
    flush_line(&mut current, &mut lines);
    lines.join("\n")
}

fn walk_markdown(element: ElementRef<'_>, lines: &mut Vec<String>, current: &mut String) {
    let name = element.value().name();
    if EXCLUDED_TAGS.contains(&name) {
        return;
    }
    if let Some(level) = heading_level(name) {
        flush_line(current, lines);
        let text = inline_text(element);
        if !text.is_empty() {
            lines.push(format!("{} {text}", "#".repeat(level)));
        }
        return;
    }
    if name == "table" {
        flush_line(current, lines);
        lines.extend(table_to_markdown(element));
        return;
    }

    let block = BLOCK_TAGS.contains(&name);
    if block {
        flush_line(current, lines);
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    walk_markdown(child_element, lines, current);
                }
            }
            _ => {}
        }
    }
    if block {
        flush_line(current, lines);
    }
}

fn heading_level(name: &str) -> Option<usize> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

fn flush_line(current: &mut String, lines: &mut Vec<String>) {
    let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
    if !normalized.is_empty() {
        lines.push(normalized);
    }
    current.clear();
}

fn inline_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn table_to_markdown(table: ElementRef<'_>) -> Vec<String> {
    let mut lines = Vec::new();
    for (index, row) in table.select(&ROW_SELECTOR).enumerate() {
        let cells: Vec<String> = row.select(&CELL_SELECTOR).map(inline_text).collect();
        if cells.is_empty() {
            continue;
        }
        lines.push(format!("| {} |", cells.join(" | ")));
        if index == 0 {
            let separator: Vec<&str> = cells.iter().map(|_| "---").collect();
            lines.push(format!("| {} |", separator.join(" | ")));
        }
    }
    lines
}

/// Text of an element with boilerplate removed and block boundaries as newlines.
fn block_text(element: ElementRef<'_>) -> String {
    let mut lines = Vec::new();
    let mut current = String::new();
    walk_blocks(element, &mut lines, &mut current);
    flush_line(&mut current, &mut lines);
    lines.join("\n")
}

fn walk_blocks(element: ElementRef<'_>, lines: &mut Vec<String>, current: &mut String) {
    let name = element.value().name();
    if EXCLUDED_TAGS.contains(&name) {
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block {
        flush_line(current, lines);
    }
    for child in element.children() {
        match child.value() {
            Node::Text(text) => current.push_str(text),
            Node::Element(_) => {
                if let Some(child_element) = ElementRef::wrap(child) {
                    walk_blocks(child_element, lines, current);
                }
            }
            _ => {}
        }
    }
    if block {
        flush_line(current, lines);
    }
}

fn link_density(element: ElementRef<'_>) -> f64 {
    let total: usize = element.text().map(str::len).sum();
    if total == 0 {
        return 1.0;
    }
    let linked: usize = element
        .select(&ANCHOR_SELECTOR)
        .flat_map(|anchor| anchor.text())
        .map(str::len)
        .sum();
    linked as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_markup() {
        assert!(looks_like_html("<html><body>x</body></html>"));
        assert!(looks_like_html("<div class=\"a\">x</div>"));
        assert!(!looks_like_html("# heading\n\nplain markdown"));
    }

    #[test]
    fn markdown_promotes_headings_and_strips_boilerplate() {
        let html = r#"
            <html><head><title>ignored</title></head><body>
            <nav>menu menu menu</nav>
            <h1>Quarterly Report</h1>
            <p>Revenue grew.</p>
            <script>alert(1)</script>
            <footer>contact us</footer>
            </body></html>
        "#;
        let markdown = to_markdown(html);
        assert!(markdown.contains("# Quarterly Report"));
        assert!(markdown.contains("Revenue grew."));
        assert!(!markdown.contains("menu"));
        assert!(!markdown.contains("alert"));
        assert!(!markdown.contains("contact us"));
    }

    #[test]
    fn markdown_tables_get_a_separator_row() {
        let html = "<table><tr><th>Name</th><th>Qty</th></tr><tr><td>A</td><td>1</td></tr></table>";
        let markdown = to_markdown(html);
        let lines: Vec<&str> = markdown.lines().collect();
        assert_eq!(lines[0], "| Name | Qty |");
        assert_eq!(lines[1], "| --- | --- |");
        assert_eq!(lines[2], "| A | 1 |");
    }

    #[test]
    fn article_extraction_prefers_the_article_container() {
        let body = "Body of the article. ".repeat(20);
        let html = format!(
            "<html><body><nav>a b c</nav><article><p>{body}</p></article>\
             <div>unrelated sidebar text that is fairly long as well {}</div></body></html>",
            "filler ".repeat(30)
        );
        let text = extract_article_text(&html);
        assert!(text.contains("Body of the article."));
        assert!(!text.contains("sidebar"));
    }

    #[test]
    fn article_extraction_falls_back_to_whole_document() {
        let html = "<html><body><p>short page</p></body></html>";
        let text = extract_article_text(html);
        assert_eq!(text, "short page");
    }

    #[test]
    fn link_heavy_candidates_are_rejected() {
        let links: String = (0..30)
            .map(|i| format!("<a href=\"/{i}\">link number {i} with text</a> "))
            .collect();
        let html = format!("<html><body><article>{links}</article><p>tiny</p></body></html>");
        let text = extract_article_text(&html);
        // The link farm is skipped; extraction falls back to the full document text.
        assert!(text.contains("tiny"));
    }

    #[test]
    fn links_are_collected_in_order() {
        let html = r#"<a href="/one">1</a><div><a href="https://x.test/two">2</a></div>"#;
        assert_eq!(extract_links(html), vec!["/one", "https://x.test/two"]);
    }
}
