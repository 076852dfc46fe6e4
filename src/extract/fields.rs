//! Label → value resolution over a schema-less page.
//!
//! The portal renders supplier profile fields with no stable markup:
//! sometimes a label cell followed by a value cell, sometimes an inline
//! `<span>` pair, sometimes plain text. `resolve` runs a strategy cascade
//! and returns the first acceptable value; a miss is an empty string,
//! never an error.

use crate::extract::document::{collapse_ws, Document};
use regex::Regex;

/// Values longer than this are assumed to be layout noise, not field data.
pub const MAX_VALUE_LEN: usize = 150;

/// Label-cell match tolerance: a cell may exceed the label by this many
/// characters (trailing colon, spaces, icon glyph) and still count as a
/// pure label.
const LABEL_SLACK: usize = 8;

/// Profile labels that can trail a matched value on the same text line.
/// The regex strategy truncates a captured value at the first of these.
const STOP_LABELS: &str = "Raz[oó]n\\s+Social|Correo\\s+electr[oó]nico|Tel[eé]fono|Pa[íi]s|Provincia|Cant[oó]n|Direcci[oó]n";

/// Find the value associated with any of `labels` in the document.
///
/// Strategies, first success wins:
/// 1. a table cell that is essentially the label → next cell in its row;
/// 2. a childless inline element that is essentially the label → its next
///    sibling's text, else its parent's next sibling's text;
/// 3. a case-insensitive `label: value` match over the visible text,
///    truncated before any other known label on the same line.
pub fn resolve(doc: &Document, labels: &[&str]) -> String {
    resolve_with_limit(doc, labels, MAX_VALUE_LEN)
}

/// `resolve` with an explicit value-length ceiling.
pub fn resolve_with_limit(doc: &Document, labels: &[&str], max_len: usize) -> String {
    let label_norms: Vec<String> = labels.iter().map(|l| normalize_label(l)).collect();

    if let Some(v) = from_table_cells(doc, &label_norms, max_len) {
        return v;
    }
    if let Some(v) = from_leaf_elements(doc, &label_norms, max_len) {
        return v;
    }
    if let Some(v) = from_full_text(doc, labels, max_len) {
        return v;
    }
    String::new()
}

// ── Strategy 1: label cell → value cell ─────────────────────────

fn from_table_cells(doc: &Document, label_norms: &[String], max_len: usize) -> Option<String> {
    for row in &doc.rows {
        for (idx, cell) in row.cells.iter().enumerate() {
            if !is_pure_label(&cell.text, label_norms) {
                continue;
            }
            if let Some(next) = row.cells.get(idx + 1) {
                let val = next.text.trim();
                if acceptable(val, max_len) {
                    return Some(val.to_string());
                }
            }
        }
    }
    None
}

// ── Strategy 2: leaf element → sibling text ─────────────────────

fn from_leaf_elements(doc: &Document, label_norms: &[String], max_len: usize) -> Option<String> {
    for leaf in &doc.leaves {
        if !is_pure_label(&leaf.text, label_norms) {
            continue;
        }
        for candidate in [&leaf.next_text, &leaf.parent_next_text].into_iter().flatten() {
            let val = candidate.trim();
            if acceptable(val, max_len) {
                return Some(val.to_string());
            }
        }
    }
    None
}

// ── Strategy 3: regex over visible text ─────────────────────────

fn from_full_text(doc: &Document, labels: &[&str], max_len: usize) -> Option<String> {
    let stop_re = Regex::new(&format!("(?i){STOP_LABELS}")).expect("stop-label regex is valid");

    for label in labels {
        let pattern = format!("(?i){}\\s*:?\\s*([^\\n\\r]+)", regex::escape(label));
        let re = Regex::new(&pattern).expect("label regex is valid");

        let Some(caps) = re.captures(&doc.text) else {
            continue;
        };
        let mut val = caps[1].trim().to_string();

        // Another field's label on the same line marks the value's end.
        if let Some(m) = stop_re.find(&val) {
            if m.start() > 0 {
                val = val[..m.start()].trim().to_string();
            }
        }
        if acceptable(&val, max_len) {
            return Some(val);
        }
    }
    None
}

// ── Matching helpers ────────────────────────────────────────────

/// True when `text` is essentially one of the labels: the normalized text
/// contains the normalized label and is at most [`LABEL_SLACK`] characters
/// longer.
fn is_pure_label(text: &str, label_norms: &[String]) -> bool {
    let n = normalize_label(text);
    let n_len = n.chars().count();
    label_norms
        .iter()
        .any(|lbl| n.contains(lbl.as_str()) && n_len <= lbl.chars().count() + LABEL_SLACK)
}

fn acceptable(val: &str, max_len: usize) -> bool {
    let len = val.chars().count();
    len > 0 && len <= max_len
}

/// Normalize for label comparison: strip diacritics, collapse whitespace,
/// lowercase.
fn normalize_label(text: &str) -> String {
    let folded: String = collapse_ws(text).chars().map(fold_diacritic).collect();
    folded.to_lowercase().trim().to_string()
}

/// Fold the Spanish diacritic range to ASCII. The portal's label set is
/// closed, so a table beats pulling in a normalization crate.
fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' => 'a',
        'é' | 'è' | 'ë' | 'ê' => 'e',
        'í' | 'ì' | 'ï' | 'î' => 'i',
        'ó' | 'ò' | 'ö' | 'ô' => 'o',
        'ú' | 'ù' | 'ü' | 'û' => 'u',
        'ñ' => 'n',
        'Á' | 'À' | 'Ä' | 'Â' => 'A',
        'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'Ó' | 'Ò' | 'Ö' | 'Ô' => 'O',
        'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'Ñ' => 'N',
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::document::Document;

    #[test]
    fn test_table_cell_strategy() {
        let html = r#"
            <table>
              <tr><td>Razón Social:</td><td>FERRETERIA ANDINA CIA. LTDA.</td></tr>
            </table>"#;
        let doc = Document::parse(html, "https://example.gob.ec/p");
        let val = resolve(&doc, &["Razón Social", "Razon Social"]);
        assert_eq!(val, "FERRETERIA ANDINA CIA. LTDA.");
    }

    #[test]
    fn test_label_matches_without_diacritics() {
        let html = r#"<table><tr><td>Razon Social</td><td>ACME</td></tr></table>"#;
        let doc = Document::parse(html, "https://example.gob.ec/p");
        assert_eq!(resolve(&doc, &["Razón Social"]), "ACME");
    }

    #[test]
    fn test_long_cell_is_not_a_label() {
        // The label appears inside a sentence — well past the slack
        // window, so the preceding cell must not be taken as its value.
        // With the label at end of line the regex fallback finds nothing.
        let html = r#"<table><tr>
            <td>NOPE</td>
            <td>Esta celda menciona la Razón Social</td></tr></table>"#;
        let doc = Document::parse(html, "https://example.gob.ec/p");
        assert_eq!(resolve(&doc, &["Razón Social"]), "");
    }

    #[test]
    fn test_leaf_element_strategy() {
        let html = r#"<div><span>Teléfono:</span><span>02 255 5555</span></div>"#;
        let doc = Document::parse(html, "https://example.gob.ec/p");
        assert_eq!(resolve(&doc, &["Teléfono", "Telefono"]), "02 255 5555");
    }

    #[test]
    fn test_full_text_strategy_truncates_at_next_label() {
        let html = r#"<p>País: Ecuador Provincia: Pichincha</p>"#;
        let doc = Document::parse(html, "https://example.gob.ec/p");
        assert_eq!(resolve(&doc, &["País", "Pais"]), "Ecuador");
        assert_eq!(resolve(&doc, &["Provincia"]), "Pichincha");
    }

    #[test]
    fn test_missing_label_returns_empty() {
        let doc = Document::parse("<p>nothing here</p>", "https://example.gob.ec/p");
        assert_eq!(resolve(&doc, &["Cantón", "Canton"]), "");
    }

    #[test]
    fn test_oversized_value_rejected() {
        let long_val = "x".repeat(200);
        let html = format!("<table><tr><td>Dirección</td><td>{long_val}</td></tr></table>");
        let doc = Document::parse(&html, "https://example.gob.ec/p");
        assert_eq!(resolve(&doc, &["Dirección", "Direccion"]), "");
    }
}
