//! Output-mode helpers shared by the CLI commands.
//!
//! Global flags are plumbed through environment variables so every
//! module can check them without threading arguments.

/// Suppress non-essential output.
pub fn is_quiet() -> bool {
    std::env::var("PROFORMA_QUIET").is_ok()
}

/// Machine-readable JSON output.
pub fn is_json() -> bool {
    std::env::var("PROFORMA_JSON").is_ok()
}

/// Print a JSON value to stdout.
pub fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("  Error serializing output: {e}"),
    }
}
