//! Static HTML publisher
//!
//! Fills the page template with the dashboard's current state and replaces
//! `index.html` in the output directory. The progress bar can additionally
//! be rasterised to `progress.png`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::format::escape_html;
use crate::page::{Dashboard, PageState};
use crate::poller::{Frame, Publisher};
use crate::progress;
use crate::table::Highlight;

const PAGE_TEMPLATE: &str = include_str!("../resources/page.html");
const PAGE_FILE: &str = "index.html";
const PROGRESS_FILE: &str = "progress.png";

/// HTML table with one `<tr>` per row, highlighted rows carrying a class.
pub fn render_table<I, C>(id: &str, columns: &[&str], rows: I) -> String
where
    I: IntoIterator<Item = (C, Highlight)>,
    C: AsRef<[String]>,
{
    let mut html = format!(r#"<table id="{}" class="table"><thead><tr>"#, escape_html(id));
    for column in columns {
        html.push_str(&format!("<th>{}</th>", escape_html(column)));
    }
    html.push_str("</tr></thead><tbody>");
    for (cells, highlight) in rows {
        match highlight {
            Highlight::None => html.push_str("<tr>"),
            _ => html.push_str(&format!(r#"<tr class="{}">"#, highlight.css_class())),
        }
        for cell in cells.as_ref() {
            html.push_str(&format!("<td>{}</td>", cell));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

pub struct HtmlRenderer {
    output_dir: PathBuf,
    refresh_secs: u64,
    column_width: u32,
    png: bool,
}

impl HtmlRenderer {
    pub fn new(output_dir: impl AsRef<Path>, refresh_secs: u64, column_width: u32, png: bool) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
            refresh_secs,
            column_width,
            png,
        }
    }

    pub fn page_path(&self) -> PathBuf {
        self.output_dir.join(PAGE_FILE)
    }

    /// Fill the page template for a frame.
    pub fn render_page(&self, frame: &Frame<'_>) -> String {
        let (title, overlay, content, refresh, script) = match frame {
            Frame::Loading => (
                "Loading".to_string(),
                overlay("Loading...", false),
                String::new(),
                true,
                String::new(),
            ),
            Frame::Failed(message) => (
                "Error".to_string(),
                overlay(message, true),
                String::new(),
                false,
                String::new(),
            ),
            Frame::Live(dashboard) | Frame::Final(dashboard) => (
                dashboard.title(),
                String::new(),
                render_body(dashboard),
                matches!(frame, Frame::Live(_)),
                dashboard.scroll_to().map(scroll_script).unwrap_or_default(),
            ),
        };

        let refresh = if refresh {
            format!(r#"<meta http-equiv="refresh" content="{}">"#, self.refresh_secs)
        } else {
            String::new()
        };

        let title = escape_html(&title);
        let column_width = self.column_width.to_string();
        let updated = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        fill_template(PAGE_TEMPLATE, |name| match name {
            "TITLE" => Some(title.as_str()),
            "REFRESH" => Some(refresh.as_str()),
            "COLUMN_WIDTH" => Some(column_width.as_str()),
            "OVERLAY" => Some(overlay.as_str()),
            "CONTENT" => Some(content.as_str()),
            "UPDATED" => Some(updated.as_str()),
            "SCRIPT" => Some(script.as_str()),
            _ => None,
        })
    }

    async fn write_png(&self, dashboard: &Dashboard) -> Result<()> {
        let PageState::Build(page) = dashboard.state() else {
            return Ok(());
        };
        let Some(bar) = &page.progress else {
            return Ok(());
        };
        let path = self.output_dir.join(PROGRESS_FILE);
        progress::render_svg_to_png(&bar.render_svg(), &path).await?;
        tracing::debug!("Wrote progress bar to {:?}", path);
        Ok(())
    }
}

/// Substitute `{{NAME}}` placeholders in one pass over the template.
///
/// Substituted text is never rescanned. Unknown placeholders are kept as-is.
fn fill_template<'a>(template: &str, value: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}").and_then(|end| value(&after[..end]).map(|v| (end, v))) {
            Some((end, v)) => {
                out.push_str(v);
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn overlay(message: &str, error: bool) -> String {
    format!(
        r#"<div id="loading_overlay"><p{}>{}</p></div>"#,
        if error { r#" class="error""# } else { "" },
        escape_html(message)
    )
}

fn render_body(dashboard: &Dashboard) -> String {
    let ctx = dashboard.context();
    match dashboard.state() {
        PageState::Build(page) => page.render(ctx),
        PageState::Jail(page) => page.render(ctx),
        PageState::Index(page) => page.render(ctx),
    }
}

/// Jump to an element once the page has loaded.
fn scroll_script(anchor: &str) -> String {
    let target = serde_json::Value::String(format!("#{}", anchor.trim_start_matches('#')));
    format!(
        "<script>window.location.hash = {};</script>",
        target.to_string().replace('<', "\\u003c")
    )
}

/// Replace a file by writing a sibling and renaming it over the original.
async fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let tmp = path.with_extension("html.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl Publisher for HtmlRenderer {
    async fn publish(&self, frame: Frame<'_>) -> Result<()> {
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .context("Failed to create output directory")?;

        let html = self.render_page(&frame);
        write_atomic(&self.page_path(), &html).await?;

        if self.png {
            if let Frame::Live(dashboard) | Frame::Final(dashboard) = frame {
                self.write_png(dashboard).await?;
            }
        }
        Ok(())
    }
}
