//! Headless walkthrough of the editor core.
//!
//! ```bash
//! cargo run -p myth-story -- notes.json
//! RUST_LOG=myth_plate_core=debug cargo run -p myth-story
//! ```
//!
//! The document is loaded from and autosaved to the given path
//! (`myth-story.json` by default). `MYTH_CONFIG` may point to an editor
//! config JSON file.

mod layout;
mod persistence;
mod script;

use std::env;
use std::path::PathBuf;

use anyhow::Context as _;
use myth_plate_core::{EditorConfig, EditorSession};

use crate::layout::GridLayout;
use crate::persistence::FilePersistence;

const DEFAULT_DOCUMENT: &str = "myth-story.json";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let document = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DOCUMENT));
    let config = load_config()?;
    tracing::info!(document = %document.display(), "opening session");

    let mut session = EditorSession::open(config, FilePersistence::new(document));
    script::run(&mut session, &GridLayout::default())?;

    let json = session.snapshot().to_json_pretty()?;
    println!("{json}");
    Ok(())
}

fn load_config() -> anyhow::Result<EditorConfig> {
    let Some(path) = env::var_os("MYTH_CONFIG") else {
        return Ok(EditorConfig::default());
    };
    let path = PathBuf::from(path);
    let json = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    EditorConfig::from_json_str(&json)
        .with_context(|| format!("invalid config {}", path.display()))
}
