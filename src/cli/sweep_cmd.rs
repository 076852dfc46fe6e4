//! Run a sweep from the terminal with a live progress bar.

use crate::cli::output;
use crate::events::{self, SweepEvent};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::store::sqlite::SqliteStore;
use crate::store::Store;
use crate::sweep::SweepRunner;
use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;

pub async fn run(process_id: i64, db_path: Option<PathBuf>) -> Result<()> {
    let path = db_path.unwrap_or_else(SqliteStore::default_path);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&path)
            .with_context(|| format!("failed to open database at {}", path.display()))?,
    );

    let renderer: Arc<dyn Renderer> = Arc::new(
        ChromiumRenderer::new()
            .await
            .context("a sweep needs Chromium")?,
    );

    let (tx, mut rx) = events::channel();
    let runner = SweepRunner::new(store, renderer);
    let handle = tokio::spawn(async move { runner.run(process_id, tx).await });

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .expect("progress template is valid")
            .progress_chars("=> "),
    );

    let mut failure: Option<String> = None;
    while let Some(event) = rx.recv().await {
        if output::is_json() {
            output::print_json(&event);
        }
        match event {
            SweepEvent::Start { total } => bar.set_length(total as u64),
            SweepEvent::Progress {
                name, eta_seconds, ..
            } => {
                let eta = eta_seconds
                    .map(|s| format!(" (~{s}s left)"))
                    .unwrap_or_default();
                bar.set_message(format!("{name}{eta}"));
            }
            SweepEvent::Result {
                supplier_id,
                status,
            } => {
                bar.inc(1);
                if !output::is_quiet() {
                    bar.println(format!("  {supplier_id}: {}", status.as_str()));
                }
            }
            SweepEvent::Done { ok, no_data, error } => {
                bar.finish_with_message(format!("done — ok {ok}, no-data {no_data}, error {error}"));
            }
            SweepEvent::Error { message } => {
                bar.abandon_with_message("sweep failed");
                failure = Some(message);
            }
        }
    }

    let _ = handle.await;
    if let Some(message) = failure {
        bail!(message);
    }
    Ok(())
}
