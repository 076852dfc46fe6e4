//! SOCE portal constants and URL construction.

/// Host every proforma page and attachment lives on. The document proxy
/// refuses anything else.
pub const PORTAL_HOST: &str = "www.compraspublicas.gob.ec";

/// Registered-proforma page for one supplier within one process.
///
/// Stored portal codes sometimes carry trailing commas from the portal's
/// own listings; they are stripped before building the URL.
pub fn proforma_url(portal_code: &str, ruc: &str) -> String {
    let code = portal_code.trim_end_matches(',');
    format!(
        "https://{PORTAL_HOST}/ProcesoContratacion/compras/NCO/FrmNCOProformaRegistrada.cpe?id={code}&ruc={ruc}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proforma_url_shape() {
        let url = proforma_url("abc123", "1790012345001");
        assert_eq!(
            url,
            "https://www.compraspublicas.gob.ec/ProcesoContratacion/compras/NCO/FrmNCOProformaRegistrada.cpe?id=abc123&ruc=1790012345001"
        );
    }

    #[test]
    fn test_trailing_commas_stripped() {
        let url = proforma_url("abc123,,", "179");
        assert!(url.contains("id=abc123&"));
    }
}
