//! Segmented progress bar
//!
//! The bar is laid out in whole pixels from the build counters, emitted as an
//! SVG fragment for the page and optionally rasterised to PNG.

use anyhow::{Context, Result};
use pkgwatch_common::{PortCategory, Stats};
use resvg::tiny_skia;
use resvg::usvg::{Options, Tree};
use std::fmt;
use std::path::Path;

pub const BAR_HEIGHT: u32 = 10;
const TRACK_COLOR: &str = "#E3E3E3";
const BORDER_COLOR: &str = "black";
/// Room taken by the widest percent label ("100%")
const PERCENT_LABEL_WIDTH: u32 = 36;
const LABEL_GAP: u32 = 20;

/// Segment draw order and fill colours
const SEGMENTS: [(PortCategory, &str); 5] = [
    (PortCategory::Built, "#00CC00"),
    (PortCategory::Failed, "#E00000"),
    (PortCategory::Ignored, "#FF9900"),
    (PortCategory::Fetched, "#228B22"),
    (PortCategory::Skipped, "#CC6633"),
];

/// Bar width left in a column once the percent label is placed beside it
pub fn bar_width(column_width: u32) -> u32 {
    column_width.saturating_sub(PERCENT_LABEL_WIDTH + LABEL_GAP)
}

/// Share of queued packages with a result
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PercentDone(pub f64);

impl PercentDone {
    pub fn from_stats(stats: &Stats) -> Self {
        if stats.queued == 0 {
            return PercentDone(0.0);
        }
        let done = stats.queued - stats.remaining();
        PercentDone(done as f64 * 100.0 / stats.queued as f64)
    }
}

impl fmt::Display for PercentDone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pct = self.0;
        if pct > 0.0 && pct < 1.0 {
            write!(f, "< 1%")
        } else {
            write!(f, "{}%", pct.floor() as i64)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub category: PortCategory,
    pub x: u32,
    pub width: u32,
    pub color: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressLayout {
    pub width: u32,
    pub height: u32,
    pub segments: Vec<Segment>,
    pub percent: PercentDone,
    pub remaining: i64,
}

/// Lay the bar out for `stats` at `width` pixels.
///
/// Returns `None` when there is no room to draw a bar.
pub fn layout(stats: &Stats, width: u32) -> Option<ProgressLayout> {
    if width < 3 {
        return None;
    }
    let inner = width - 2;
    let remaining = stats.remaining();
    let percent = PercentDone::from_stats(stats);
    let mut segments = Vec::new();

    if stats.queued > 0 {
        let limit = if remaining > 0 { inner - 1 } else { inner };
        let mut filled = 0u32;
        for (category, color) in SEGMENTS {
            let count = stats.count(category);
            if count <= 0 {
                continue;
            }
            let share = (count as f64 * inner as f64 / stats.queued as f64).round();
            let wanted = (share as u32).max(1);
            let seg_width = wanted.min(limit.saturating_sub(filled));
            if seg_width == 0 {
                continue;
            }
            segments.push(Segment {
                category,
                x: 1 + filled,
                width: seg_width,
                color,
            });
            filled += seg_width;
        }
    }

    Some(ProgressLayout {
        width,
        height: BAR_HEIGHT,
        segments,
        percent,
        remaining,
    })
}

impl ProgressLayout {
    pub fn filled(&self) -> u32 {
        self.segments.iter().map(|s| s.width).sum()
    }

    pub fn render_svg(&self) -> String {
        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height,
        );
        svg.push_str(&format!(
            r#"<rect x="0.5" y="0.5" width="{}" height="{}" fill="{}" stroke="{}" stroke-width="1"/>"#,
            self.width - 1,
            self.height - 1,
            TRACK_COLOR,
            BORDER_COLOR,
        ));
        for segment in &self.segments {
            svg.push_str(&format!(
                r#"<rect class="{}" x="{}" y="1" width="{}" height="{}" fill="{}"/>"#,
                segment.category,
                segment.x,
                segment.width,
                self.height - 2,
                segment.color,
            ));
        }
        svg.push_str("</svg>");
        svg
    }
}

/// Rasterise an SVG document to a PNG file.
pub async fn render_svg_to_png(svg_content: &str, output_path: &Path) -> Result<()> {
    let options = Options::default();
    let tree = Tree::from_str(svg_content, &options).context("Failed to parse SVG")?;

    let size = tree.size();
    let width = size.width().ceil() as u32;
    let height = size.height().ceil() as u32;

    let mut pixmap = tiny_skia::Pixmap::new(width, height).context("Failed to create pixmap")?;
    resvg::render(&tree, tiny_skia::Transform::default(), &mut pixmap.as_mut());

    let png = pixmap.encode_png().context("Failed to encode PNG")?;
    tokio::fs::write(output_path, png)
        .await
        .with_context(|| format!("Failed to write {}", output_path.display()))?;

    Ok(())
}
