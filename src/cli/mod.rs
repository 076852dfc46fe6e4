//! CLI command implementations.

pub mod admin;
pub mod output;
pub mod serve;
pub mod sweep_cmd;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for a CLI command. `verbose` raises the default
/// directive to debug.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "proforma_runtime=debug"
    } else {
        "proforma_runtime=info"
    };
    let filter = EnvFilter::from_default_env().add_directive(default.parse().expect("valid directive"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
