//! Heuristic extraction engine for supplier proforma pages.
//!
//! Given a [`Document`] snapshot of one supplier's rendered page, produce
//! the full [`ExtractionResult`]: profile fields, priced line items, the
//! reconciled total, discovered attachments, and the process display code.
//! The engine never fails — missing data degrades to empty strings and a
//! zero total.

pub mod document;
pub mod fields;
pub mod numeric;

use document::Document;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// An item row has exactly this many `<td>` cells on the portal.
const ITEM_ROW_CELLS: usize = 9;

/// Placeholder captions that are never real attachment names.
const CAPTION_STOPLIST: [&str; 4] = [
    "descripción del archivo",
    "descargar archivo",
    "archivo para adjuntar",
    "descripción",
];

/// Supplier profile fields as found on the page. Absent fields are empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupplierProfile {
    pub ruc: String,
    pub legal_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    pub province: String,
    pub canton: String,
    pub address: String,
}

/// One priced row of the supplier's offer, numerics already normalized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferItem {
    pub number: String,
    pub cpc: String,
    pub description: String,
    pub unit: String,
    pub quantity: f64,
    pub unit_value: f64,
    pub total_value: f64,
}

/// A downloadable supporting document linked from the offer page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferAttachment {
    pub name: String,
    pub url: String,
}

/// Everything extracted from one supplier's page. Transient — the sweep
/// orchestrator maps it onto store records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub profile: SupplierProfile,
    pub items: Vec<OfferItem>,
    pub attachments: Vec<OfferAttachment>,
    /// Declared total if the page carries one, else the sum of item totals.
    pub total: f64,
    /// Human-readable process code (`NIC-…`), empty if absent.
    pub display_code: String,
}

/// Run every extraction pass over the snapshot.
pub fn extract_offer(doc: &Document, ruc: &str) -> ExtractionResult {
    let (items, declared_total) = scan_tables(doc);
    let total = match declared_total {
        Some(t) => t,
        None => items.iter().map(|i| i.total_value).sum(),
    };

    ExtractionResult {
        profile: extract_profile(doc, ruc),
        attachments: discover_attachments(doc),
        display_code: extract_display_code(doc),
        items,
        total,
    }
}

// ── Profile ─────────────────────────────────────────────────────

fn extract_profile(doc: &Document, ruc: &str) -> SupplierProfile {
    SupplierProfile {
        ruc: ruc.to_string(),
        legal_name: fields::resolve(doc, &["Razón Social", "Razon Social"]),
        email: fields::resolve(
            doc,
            &["Correo electrónico", "Correo electronico", "Correo Electrónico"],
        ),
        phone: fields::resolve(doc, &["Teléfono", "Telefono"]),
        country: fields::resolve(doc, &["País", "Pais"]),
        province: fields::resolve(doc, &["Provincia"]),
        canton: fields::resolve(doc, &["Cantón", "Canton"]),
        address: fields::resolve(doc, &["Dirección", "Direccion"]),
    }
}

// ── Process display code ────────────────────────────────────────

fn extract_display_code(doc: &Document) -> String {
    let re = Regex::new(r"NIC-\d{5,}-\d{4}-\d+").expect("display-code regex is valid");
    re.find(&doc.text)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default()
}

// ── Items and declared total ────────────────────────────────────

/// Walk every table row once: a `TOTAL: **n**` marker row yields the
/// declared total and is excluded from item parsing; a nine-cell row whose
/// first cell is a pure integer becomes an item; everything else is
/// ignored.
fn scan_tables(doc: &Document) -> (Vec<OfferItem>, Option<f64>) {
    let total_re = Regex::new(r"\*\*(\d+\.?\d*)\*\*").expect("total regex is valid");
    let number_re = Regex::new(r"^\d+$").expect("item-number regex is valid");

    let mut items = Vec::new();
    let mut declared_total = None;

    for row in &doc.rows {
        if row.text.to_uppercase().contains("TOTAL:") && row.text.contains("**") {
            if let Some(caps) = total_re.captures(&row.text) {
                if let Ok(total) = caps[1].parse::<f64>() {
                    declared_total = Some(total);
                }
            }
            continue;
        }

        let cells = row.data_cells();
        if cells.len() != ITEM_ROW_CELLS {
            continue;
        }
        let number = cells[0].trim();
        if !number_re.is_match(number) {
            continue;
        }

        let cpc = cells[1].trim();
        let product_name = cells[2].trim();
        let detail = cells[3].trim();
        items.push(OfferItem {
            number: number.to_string(),
            cpc: cpc.to_string(),
            description: format!("[{cpc}] {product_name} - {detail}"),
            unit: cells[4].trim().to_string(),
            quantity: numeric::normalize(cells[5]),
            unit_value: numeric::normalize(cells[6]),
            total_value: numeric::normalize(cells[7]),
        });
    }

    (items, declared_total)
}

// ── Attachments ─────────────────────────────────────────────────

/// Name each download anchor from its row: the first sibling cell with
/// more than two characters of text, unless it is a stoplisted
/// placeholder. Duplicate names keep the first URL seen.
fn discover_attachments(doc: &Document) -> Vec<OfferAttachment> {
    let mut seen = std::collections::HashSet::new();
    let mut attachments = Vec::new();

    for link in &doc.download_links {
        let Some(name) = link
            .caption_candidates
            .iter()
            .find(|text| text.chars().count() > 2)
        else {
            continue;
        };

        let lowered = name.to_lowercase();
        if CAPTION_STOPLIST.iter().any(|stop| lowered.contains(stop)) {
            continue;
        }
        if !seen.insert(name.clone()) {
            continue;
        }
        attachments.push(OfferAttachment {
            name: name.clone(),
            url: link.url.clone(),
        });
    }
    attachments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_row(cells: &[&str]) -> String {
        let tds: String = cells.iter().map(|c| format!("<td>{c}</td>")).collect();
        format!("<tr>{tds}</tr>")
    }

    fn page(body: &str) -> Document {
        Document::parse(
            &format!("<html><body>{body}</body></html>"),
            "https://www.compraspublicas.gob.ec/ProcesoContratacion/compras/NCO/FrmNCOProformaRegistrada.cpe?id=abc&ruc=123",
        )
    }

    #[test]
    fn test_nine_cell_row_with_integer_number_is_an_item() {
        let doc = page(&format!(
            "<table>{}</table>",
            item_row(&["1", "CPC1", "Name", "Desc", "Kg", "2", "10.5", "21.0", "x"])
        ));
        let result = extract_offer(&doc, "1790012345001");
        assert_eq!(result.items.len(), 1);
        let item = &result.items[0];
        assert_eq!(item.number, "1");
        assert_eq!(item.description, "[CPC1] Name - Desc");
        assert_eq!(item.unit, "Kg");
        assert_eq!(item.quantity, 2.0);
        assert_eq!(item.unit_value, 10.5);
        assert_eq!(item.total_value, 21.0);
        assert_eq!(result.total, 21.0);
    }

    #[test]
    fn test_non_integer_number_cell_rejects_row() {
        let doc = page(&format!(
            "<table>{}</table>",
            item_row(&["1.", "CPC1", "Name", "Desc", "Kg", "2", "10.5", "21.0", "x"])
        ));
        let result = extract_offer(&doc, "1790012345001");
        assert!(result.items.is_empty());
        assert_eq!(result.total, 0.0);
    }

    #[test]
    fn test_wrong_cell_count_rejects_row() {
        let doc = page(&format!(
            "<table>{}</table>",
            item_row(&["1", "CPC1", "Name", "Desc", "Kg", "2", "10.5", "21.0"])
        ));
        assert!(extract_offer(&doc, "1790012345001").items.is_empty());
    }

    #[test]
    fn test_declared_total_row_wins_and_is_not_an_item() {
        let doc = page(&format!(
            "<table>{}{}<tr><td colspan=\"9\">Total: **150.00**</td></tr></table>",
            item_row(&["1", "C1", "A", "B", "Kg", "1", "40.0", "40.0", "x"]),
            item_row(&["2", "C2", "C", "D", "Kg", "1", "60.0", "60.0", "x"]),
        ));
        let result = extract_offer(&doc, "1790012345001");
        assert_eq!(result.items.len(), 2);
        // Declared total overrides the 100.0 the items sum to.
        assert_eq!(result.total, 150.00);
    }

    #[test]
    fn test_total_falls_back_to_item_sum() {
        let doc = page(&format!(
            "<table>{}{}</table>",
            item_row(&["1", "C1", "A", "B", "Kg", "1", "90.0", "90.0", "x"]),
            item_row(&["2", "C2", "C", "D", "Kg", "2", "30.0", "60.0", "x"]),
        ));
        let result = extract_offer(&doc, "1790012345001");
        assert_eq!(result.total, 150.0);
    }

    #[test]
    fn test_profile_fields_resolved() {
        let doc = page(
            r#"<table>
                 <tr><td>Razón Social:</td><td>ACME CIA. LTDA.</td></tr>
                 <tr><td>Correo electrónico</td><td>ventas@acme.ec</td></tr>
                 <tr><td>Cantón</td><td>Quito</td></tr>
               </table>"#,
        );
        let result = extract_offer(&doc, "1790012345001");
        assert_eq!(result.profile.ruc, "1790012345001");
        assert_eq!(result.profile.legal_name, "ACME CIA. LTDA.");
        assert_eq!(result.profile.email, "ventas@acme.ec");
        assert_eq!(result.profile.canton, "Quito");
        assert_eq!(result.profile.phone, "");
    }

    #[test]
    fn test_display_code_from_visible_text() {
        let doc = page("<p>Proceso: NIC-637055-2024-2 | Proformas</p>");
        assert_eq!(extract_offer(&doc, "x").display_code, "NIC-637055-2024-2");

        let none = page("<p>sin código</p>");
        assert_eq!(extract_offer(&none, "x").display_code, "");
    }

    #[test]
    fn test_attachments_dedupe_and_stoplist() {
        let doc = page(
            r#"<table>
                 <tr><td>Oferta firmada</td>
                     <td><a href="/e/ExeGENBajarArchivoGeneral?id=1">bajar</a></td></tr>
                 <tr><td>Oferta firmada</td>
                     <td><a href="/e/ExeGENBajarArchivoGeneral?id=2">bajar</a></td></tr>
                 <tr><td>Descripción</td>
                     <td><a href="/e/ExeGENBajarArchivoGeneral?id=3">bajar</a></td></tr>
               </table>"#,
        );
        let result = extract_offer(&doc, "x");
        assert_eq!(result.attachments.len(), 1);
        assert_eq!(result.attachments[0].name, "Oferta firmada");
        assert!(result.attachments[0].url.ends_with("id=1"));
    }

    #[test]
    fn test_short_caption_cells_are_skipped() {
        let doc = page(
            r#"<table><tr>
                 <td>1</td>
                 <td>Acta de entrega</td>
                 <td><a href="/e/ExeGENBajarArchivoGeneral?id=7">bajar</a></td>
               </tr></table>"#,
        );
        let result = extract_offer(&doc, "x");
        assert_eq!(result.attachments.len(), 1);
        assert_eq!(result.attachments[0].name, "Acta de entrega");
    }

    #[test]
    fn test_empty_page_degrades_quietly() {
        let doc = page("");
        let result = extract_offer(&doc, "0990000000001");
        assert!(result.items.is_empty());
        assert!(result.attachments.is_empty());
        assert_eq!(result.total, 0.0);
        assert_eq!(result.profile.legal_name, "");
    }
}
