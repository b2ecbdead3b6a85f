use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use gacha_core::write_text_atomic;
use gacha_gateway::{RenderOptions, RenderService};
use minijinja::Environment;
use serde_json::Value;
use tracing::debug;

/// Renders cards to HTML files with minijinja instead of screenshotting them.
///
/// The returned `file://` URL points at the rendered page; the clip rectangle is only
/// recorded in the log.
pub struct FileRenderService {
    output_dir: PathBuf,
    counter: AtomicU64,
}

impl FileRenderService {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            counter: AtomicU64::new(1),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

pub fn render_template(template: &str, context: &Value) -> Result<String> {
    let mut environment = Environment::new();
    environment
        .add_template("card", template)
        .context("failed to parse card template")?;
    environment
        .get_template("card")
        .context("card template not registered")?
        .render(context)
        .context("failed to render card template")
}

#[async_trait]
impl RenderService for FileRenderService {
    async fn render(&self, template: &str, context: &Value, options: &RenderOptions) -> Result<String> {
        let html = render_template(template, context)?;
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.output_dir.join(format!("card-{index}.html"));
        write_text_atomic(&path, &html)?;
        let absolute = std::fs::canonicalize(&path)
            .with_context(|| format!("failed to resolve {}", path.display()))?;
        debug!(
            path = %absolute.display(),
            width = options.clip.width,
            height = options.clip.height,
            "card rendered"
        );
        Ok(format!("file://{}", absolute.display()))
    }
}
