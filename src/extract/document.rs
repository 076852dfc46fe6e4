//! Immutable snapshot of a rendered proforma page.
//!
//! Parses the rendered HTML exactly once (via the `scraper` crate) into
//! owned tables, leaf elements, download anchors, and visible text. The
//! extraction passes work on this snapshot only — no browser handle
//! outlives the parse. Parsing is synchronous because `scraper`'s DOM
//! types are `!Send`; callers snapshot the HTML string first and parse
//! outside the rendering session.

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

/// Substring of the portal's attachment download endpoint.
pub const DOWNLOAD_ENDPOINT: &str = "ExeGENBajarArchivoGeneral";

/// Inline tags considered label carriers by the leaf-element strategy.
const LEAF_TAGS: [&str; 6] = ["span", "b", "strong", "em", "label", "font"];

/// A parsed page, ready for the extraction passes.
#[derive(Debug, Clone, Default)]
pub struct Document {
    /// URL the page was rendered from; base for resolving relative hrefs.
    pub url: String,
    /// Visible text with line breaks preserved and intra-line whitespace
    /// collapsed to single spaces.
    pub text: String,
    /// Every table row in document order.
    pub rows: Vec<TableRow>,
    /// Childless inline elements with their sibling context.
    pub leaves: Vec<LeafElement>,
    /// Anchors pointing at the portal's download endpoint.
    pub download_links: Vec<DownloadLink>,
}

/// One `<tr>` with its cells in order.
#[derive(Debug, Clone, Default)]
pub struct TableRow {
    pub cells: Vec<TableCell>,
    /// Whitespace-collapsed text of the whole row.
    pub text: String,
}

/// One `<td>` or `<th>`.
#[derive(Debug, Clone)]
pub struct TableCell {
    /// Whitespace-collapsed, trimmed cell text.
    pub text: String,
    /// True for `<th>`.
    pub header: bool,
}

impl TableRow {
    /// Texts of the `<td>` cells only — item rows are matched on these.
    pub fn data_cells(&self) -> Vec<&str> {
        self.cells
            .iter()
            .filter(|c| !c.header)
            .map(|c| c.text.as_str())
            .collect()
    }
}

/// A childless inline element and the texts the leaf-element strategy
/// inspects: its following sibling and its parent's following sibling.
#[derive(Debug, Clone)]
pub struct LeafElement {
    pub text: String,
    pub next_text: Option<String>,
    pub parent_next_text: Option<String>,
}

/// A download anchor with the candidate caption cells from its table row
/// (cells containing the anchor itself are excluded), in document order.
#[derive(Debug, Clone)]
pub struct DownloadLink {
    /// Absolute URL of the download endpoint.
    pub url: String,
    pub caption_candidates: Vec<String>,
}

impl Document {
    /// Parse rendered HTML into a snapshot.
    pub fn parse(html: &str, url: &str) -> Self {
        let dom = Html::parse_document(html);

        Self {
            url: url.to_string(),
            text: visible_text(&dom),
            rows: collect_rows(&dom),
            leaves: collect_leaves(&dom),
            download_links: collect_download_links(&dom, url),
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn element_text(el: ElementRef) -> String {
    collapse_ws(&el.text().collect::<String>())
}

// ── Tables ──────────────────────────────────────────────────────

fn collect_rows(dom: &Html) -> Vec<TableRow> {
    let row_sel = Selector::parse("table tr").expect("row selector is valid");
    let cell_sel = Selector::parse("td, th").expect("cell selector is valid");

    dom.select(&row_sel)
        .map(|row| TableRow {
            cells: row
                .select(&cell_sel)
                .map(|cell| TableCell {
                    text: element_text(cell),
                    header: cell.value().name() == "th",
                })
                .collect(),
            text: element_text(row),
        })
        .collect()
}

// ── Leaf elements ───────────────────────────────────────────────

fn collect_leaves(dom: &Html) -> Vec<LeafElement> {
    let sel = Selector::parse(&LEAF_TAGS.join(",")).expect("leaf selector is valid");

    dom.select(&sel)
        .filter(|el| el.children().all(|c| !c.value().is_element()))
        .map(|el| LeafElement {
            text: element_text(el),
            next_text: next_sibling_text(el),
            parent_next_text: el
                .parent()
                .and_then(ElementRef::wrap)
                .and_then(next_sibling_text),
        })
        .collect()
}

fn next_sibling_text(el: ElementRef) -> Option<String> {
    el.next_siblings()
        .find_map(ElementRef::wrap)
        .map(element_text)
}

// ── Download anchors ────────────────────────────────────────────

fn collect_download_links(dom: &Html, base_url: &str) -> Vec<DownloadLink> {
    let anchor_sel = Selector::parse(&format!("a[href*=\"{DOWNLOAD_ENDPOINT}\"]"))
        .expect("anchor selector is valid");
    let cell_sel = Selector::parse("td, th").expect("cell selector is valid");
    let base = Url::parse(base_url).ok();

    let mut links = Vec::new();
    for anchor in dom.select(&anchor_sel) {
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let Some(url) = absolutize(href, base.as_ref()) else {
            continue;
        };

        // Walk up to the containing row; anchors outside a table are
        // unnamed and dropped, matching the page's layout.
        let Some(row) = containing_row(anchor) else {
            continue;
        };

        // Identify the cells holding the anchor itself so they never
        // become its caption.
        let ancestors: HashSet<_> = anchor.ancestors().map(|n| n.id()).collect();
        let caption_candidates = row
            .select(&cell_sel)
            .filter(|cell| !ancestors.contains(&cell.id()))
            .map(element_text)
            .collect();

        links.push(DownloadLink {
            url,
            caption_candidates,
        });
    }
    links
}

fn containing_row(el: ElementRef) -> Option<ElementRef> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "tr")
}

fn absolutize(href: &str, base: Option<&Url>) -> Option<String> {
    if let Ok(abs) = Url::parse(href) {
        return Some(abs.to_string());
    }
    base.and_then(|b| b.join(href).ok()).map(|u| u.to_string())
}

// ── Visible text ────────────────────────────────────────────────

/// Render the document's visible text the way a browser's `innerText`
/// would: block elements break lines, scripts and styles are invisible,
/// and whitespace inside a line collapses to single spaces.
fn visible_text(dom: &Html) -> String {
    let mut raw = String::new();
    push_visible_text(*dom.root_element(), &mut raw);

    raw.lines()
        .map(collapse_ws)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn push_visible_text(node: NodeRef<Node>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(t) => out.push_str(&t),
            Node::Element(el) => {
                let name = el.name();
                if matches!(name, "script" | "style" | "noscript" | "head") {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = is_block(name);
                if block {
                    out.push('\n');
                }
                push_visible_text(child, out);
                if block {
                    out.push('\n');
                } else if matches!(name, "td" | "th") {
                    out.push(' ');
                }
            }
            _ => {}
        }
    }
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div"
            | "table"
            | "tr"
            | "li"
            | "ul"
            | "ol"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "section"
            | "article"
            | "header"
            | "footer"
            | "form"
            | "fieldset"
            | "blockquote"
            | "pre"
            | "hr"
    )
}
