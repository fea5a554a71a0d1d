//! Detail page of a single build

use pkgwatch_common::{BuildSnapshot, Job, PortCategory, Ports, Snap, Stats};
use std::collections::BTreeMap;
use std::ops::Range;

use super::PageContext;
use crate::format::{
    escape_html, format_build_name, format_duration, format_jail_name, format_log,
    format_master_name, format_origin, format_pkgname, format_pt_name, format_set_name,
    format_skipped, format_start_to_end, is_stopped, translate_status,
};
use crate::progress::{self, PercentDone, ProgressLayout};
use crate::rate::{self, ImpulseReading, ImpulseTracker, PkgRate};
use crate::renderer::render_table;
use crate::table::{AppendCursors, DiffTable, KeyedRow, StatusTable};

const BUILDER_COLUMNS: [&str; 5] = ["Builder", "Package", "Origin", "Status", "Elapsed"];

/// One row of the builders table
#[derive(Debug, Clone, PartialEq)]
pub struct BuilderRow {
    pub id: String,
    pub pkgname: Option<String>,
    pub origin: Option<String>,
    pub flavor: Option<String>,
    pub status: String,
    pub elapsed: String,
}

impl KeyedRow for BuilderRow {
    fn row_id(&self) -> &str {
        &self.id
    }
}

impl BuilderRow {
    fn from_job(job: &Job, now: i64) -> Self {
        let elapsed = match job.started {
            Some(started) if started != 0 => format_start_to_end(Some(started), Some(now)),
            _ => String::new(),
        };
        Self {
            id: job.id.clone(),
            pkgname: job.pkgname().map(String::from),
            origin: job.origin().map(String::from),
            flavor: job.flavor().map(String::from),
            status: job.status.clone(),
            elapsed,
        }
    }

    /// Builder state shown when no package is assigned
    fn state(&self) -> &str {
        self.status.split(':').next().unwrap_or_default()
    }

    pub fn is_idle(&self) -> bool {
        self.pkgname.is_none() && self.state() == "idle"
    }

    fn cells(&self, ctx: &PageContext) -> Vec<String> {
        let status = match &self.pkgname {
            Some(pkgname) => format_log(&ctx.data_url, pkgname, false, &self.status),
            None => escape_html(self.state()),
        };
        vec![
            escape_html(&self.id),
            self.pkgname.as_deref().map(format_pkgname).unwrap_or_default(),
            format_origin(self.origin.as_deref(), self.flavor.as_deref()),
            status,
            self.elapsed.clone(),
        ]
    }
}

/// Identifying fields shown at the top of the page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildInfo {
    pub mastername: String,
    pub buildname: String,
    pub jailname: String,
    pub setname: String,
    pub ptname: String,
    pub overlays: Option<String>,
    pub git_hash: Option<String>,
}

impl BuildInfo {
    fn from_snapshot(data: &BuildSnapshot) -> Self {
        let git_hash = data.git_hash.as_deref().filter(|h| !h.is_empty()).map(|hash| {
            if data.git_dirty.as_deref() == Some("yes") {
                format!("{} (dirty)", hash)
            } else {
                hash.to_string()
            }
        });
        Self {
            mastername: data.mastername.clone(),
            buildname: data.buildname.clone(),
            jailname: data.jailname.clone(),
            setname: data.setname.clone(),
            ptname: data.ptname.clone(),
            overlays: data.overlays.clone().filter(|o| !o.is_empty()),
            git_hash,
        }
    }
}

/// Counters at snapshot time with the derived build rates
#[derive(Debug, Clone, PartialEq)]
pub struct SnapPanel {
    pub snap: Snap,
    pub pkghour: PkgRate,
    pub impulse: ImpulseReading,
}

#[derive(Debug, Clone)]
pub struct BuildPage {
    pub info: Option<BuildInfo>,
    /// Translated build status
    pub status: Option<String>,
    pub builders: DiffTable<BuilderRow>,
    pub stats: Option<Stats>,
    pub percent: Option<PercentDone>,
    pub progress: Option<ProgressLayout>,
    pub snap: Option<SnapPanel>,
    pub tables: BTreeMap<PortCategory, StatusTable>,
    cursors: AppendCursors,
    impulse: ImpulseTracker,
}

impl BuildPage {
    pub fn new(impulse: ImpulseTracker) -> Self {
        Self {
            info: None,
            status: None,
            builders: DiffTable::new(),
            stats: None,
            percent: None,
            progress: None,
            snap: None,
            tables: BTreeMap::new(),
            cursors: AppendCursors::default(),
            impulse,
        }
    }

    pub fn title(&self) -> String {
        match &self.info {
            Some(info) => format!("Bulk results for {} {}", info.mastername, info.buildname),
            None => "Bulk results".to_string(),
        }
    }

    pub fn table(&self, category: PortCategory) -> Option<&StatusTable> {
        self.tables.get(&category)
    }

    /// Apply a build snapshot. Returns `false` once the build has stopped.
    pub fn process(&mut self, ctx: &PageContext, data: &BuildSnapshot, bar_width: u32, wall_now: i64) -> bool {
        // Current producers report time relative to the build start.
        let now = data
            .snap
            .as_ref()
            .and_then(|snap| snap.now)
            .filter(|now| *now != 0)
            .unwrap_or(wall_now);

        if let Some(stats) = &data.stats {
            self.stats = Some(stats.clone());
            self.relayout(bar_width);
        }

        self.info = Some(BuildInfo::from_snapshot(data));

        if let Some(status) = data.status_text() {
            self.status = Some(translate_status(Some(status)));
        }
        // No status reported means the build is still considered running.
        let stopped = data
            .status_text()
            .is_some_and(|status| is_stopped(&translate_status(Some(status))));

        if let Some(jobs) = &data.jobs {
            let mut batch = self.builders.batch();
            for job in jobs {
                let row = BuilderRow::from_job(job, now);
                if stopped && row.is_idle() {
                    continue;
                }
                batch.queue(row);
            }
            let summary = batch.commit();
            tracing::debug!(
                "Builders: {} added, {} changed, {} unchanged",
                summary.added,
                summary.changed,
                summary.unchanged
            );
        }

        if let (Some(stats), Some(snap)) = (&data.stats, &data.snap) {
            let attempted = stats.attempted();
            self.snap = Some(SnapPanel {
                snap: snap.clone(),
                pkghour: rate::lifetime_rate(attempted, snap.elapsed),
                impulse: self.impulse.record(attempted, snap.elapsed),
            });
        }

        if let Some(ports) = &data.ports {
            self.update_ports(ctx, data, ports);
        }

        !stopped
    }

    /// Lay the progress bar out again for `width` pixels.
    pub fn relayout(&mut self, width: u32) {
        if let Some(stats) = &self.stats {
            self.percent = Some(PercentDone::from_stats(stats));
            self.progress = progress::layout(stats, width);
        }
    }

    fn update_ports(&mut self, ctx: &PageContext, data: &BuildSnapshot, ports: &Ports) {
        for table in self.tables.values_mut() {
            table.settle();
        }

        for category in PortCategory::ALL {
            let len = ports.len(category);
            if category.is_append_only() {
                if len == 0 {
                    continue;
                }
                let range = self.cursors.advance(category, len);
                if range.is_empty() {
                    continue;
                }
                let count = range.len();
                let rows = port_rows(ctx, data, ports, category, range);
                self.tables.entry(category).or_default().append(rows);
                tracing::debug!("Appended {} {} rows", count, category);
            } else {
                let rows = port_rows(ctx, data, ports, category, 0..len);
                self.tables.entry(category).or_default().replace_all(rows);
            }
        }
    }

    pub fn render(&self, ctx: &PageContext) -> String {
        let mut html = String::new();

        if let Some(info) = &self.info {
            html.push_str(&self.render_info(ctx, info));
        }
        html.push_str(&self.render_stats());
        if self.builders.is_visible() {
            let rows = self.builders.iter().map(|(row, hl)| (row.cells(ctx), hl));
            html.push_str(&section("jobs", "Builders", &render_table("builders_table", &BUILDER_COLUMNS, rows)));
        }
        for category in PortCategory::ALL {
            let Some(table) = self.tables.get(&category) else {
                continue;
            };
            if !table.is_visible() {
                continue;
            }
            let title = format!("{} ports", capitalize(category.as_str()));
            let id = format!("{}_table", category);
            html.push_str(&section(
                category.as_str(),
                &title,
                &render_table(&id, category.columns(), table.iter()),
            ));
        }
        html
    }

    fn render_info(&self, ctx: &PageContext, info: &BuildInfo) -> String {
        let mut fields = vec![
            ("Master", format_master_name(ctx, &info.mastername)),
            ("Build", format_build_name(ctx, &info.mastername, &info.buildname)),
            ("Jail", format_jail_name(&info.jailname)),
            ("Set", format_set_name(&info.setname)),
            ("Ports tree", format_pt_name(&info.ptname)),
        ];
        if let Some(overlays) = &info.overlays {
            fields.push(("Overlays", escape_html(overlays)));
        }
        if let Some(hash) = &info.git_hash {
            fields.push(("Git hash", escape_html(hash)));
        }
        if let Some(status) = &self.status {
            fields.push(("Status", escape_html(status)));
        }

        let mut html = String::from(r#"<div id="build_info_div"><dl class="dl-horizontal">"#);
        for (label, value) in fields {
            html.push_str(&format!("<dt>{}</dt><dd>{}</dd>", label, value));
        }
        html.push_str("</dl></div>");
        html
    }

    fn render_stats(&self) -> String {
        let Some(stats) = &self.stats else {
            return String::new();
        };

        let mut html = String::from(r#"<div id="progress_col">"#);
        if let Some(bar) = &self.progress {
            html.push_str(&bar.render_svg());
        }
        if let Some(percent) = &self.percent {
            html.push_str(&format!(r#" <span id="progresspct">{}</span>"#, percent));
        }
        html.push_str("</div>");

        html.push_str(r#"<table id="stats" class="table table-condensed"><tr>"#);
        for label in ["Queued", "Built", "Failed", "Skipped", "Ignored", "Fetched", "Remaining", "Elapsed"] {
            html.push_str(&format!("<th>{}</th>", label));
        }
        html.push_str("</tr><tr>");
        for category in [
            PortCategory::Queued,
            PortCategory::Built,
            PortCategory::Failed,
            PortCategory::Skipped,
            PortCategory::Ignored,
            PortCategory::Fetched,
            PortCategory::Remaining,
        ] {
            html.push_str(&format!(
                r#"<td id="stats_{}">{}</td>"#,
                category,
                stats.count(category)
            ));
        }
        html.push_str(&format!(
            r#"<td id="stats_elapsed">{}</td></tr></table>"#,
            format_start_to_end(stats.elapsed, None)
        ));

        if let Some(panel) = &self.snap {
            html.push_str(&format!(
                concat!(
                    r#"<table id="snap" class="table table-condensed">"#,
                    "<tr><th>Elapsed</th><th>Rate</th><th>Recent rate</th></tr>",
                    r#"<tr><td id="snap_elapsed">{}</td><td id="snap_pkghour">{}</td>"#,
                    r#"<td class="impulse" title="{}"><span id="snap_impulse">{}</span></td></tr></table>"#,
                ),
                format_start_to_end(panel.snap.elapsed, None),
                panel.pkghour,
                escape_html(&panel.impulse.horizon.title()),
                panel.impulse.rate,
            ));
        }
        html
    }
}

fn section(id: &str, title: &str, body: &str) -> String {
    format!(
        r#"<div id="{id}_div" class="section"><h2 id="{id}">{title}</h2>{body}</div>"#,
        id = id,
        title = escape_html(title),
        body = body,
    )
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Number rows from `start + 1` and prepend the number to each row's cells.
fn numbered<T>(start: usize, rows: &[T], cells: impl Fn(&T) -> Vec<String>) -> Vec<Vec<String>> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let mut out = vec![(start + i + 1).to_string()];
            out.extend(cells(row));
            out
        })
        .collect()
}

fn duration_cell(elapsed: Option<i64>) -> String {
    format_duration(elapsed.filter(|e| *e != 0))
}

/// Format the rows of one category within `range`.
fn port_rows(
    ctx: &PageContext,
    data: &BuildSnapshot,
    ports: &Ports,
    category: PortCategory,
    range: Range<usize>,
) -> Vec<Vec<String>> {
    let start = range.start;
    match category {
        PortCategory::Built => numbered(start, &ports.built[range], |r| {
            vec![
                format_pkgname(&r.pkgname),
                format_origin(Some(&r.origin), r.flavor.as_deref()),
                format_log(&ctx.data_url, &r.pkgname, false, "success"),
                duration_cell(r.elapsed),
            ]
        }),
        PortCategory::Failed => numbered(start, &ports.failed[range], |r| {
            vec![
                format_pkgname(&r.pkgname),
                format_origin(Some(&r.origin), r.flavor.as_deref()),
                escape_html(&r.phase),
                format_skipped(data.skipped_count(&r.pkgname), &r.pkgname),
                format_log(&ctx.data_url, &r.pkgname, true, &r.errortype),
                duration_cell(r.elapsed),
            ]
        }),
        PortCategory::Skipped => numbered(start, &ports.skipped[range], |r| {
            vec![
                format_pkgname(&r.pkgname),
                format_origin(Some(&r.origin), r.flavor.as_deref()),
                format_pkgname(&r.depends),
            ]
        }),
        PortCategory::Ignored => numbered(start, &ports.ignored[range], |r| {
            vec![
                format_pkgname(&r.pkgname),
                format_origin(Some(&r.origin), r.flavor.as_deref()),
                format_skipped(data.skipped_count(&r.pkgname), &r.pkgname),
                escape_html(&r.reason),
            ]
        }),
        PortCategory::Fetched => numbered(start, &ports.fetched[range], |r| {
            vec![
                format_pkgname(&r.pkgname),
                format_origin(Some(&r.origin), r.flavor.as_deref()),
            ]
        }),
        PortCategory::Remaining => numbered(start, &ports.remaining[range], |r| {
            vec![format_pkgname(&r.pkgname), escape_html(&r.status)]
        }),
        PortCategory::Queued => numbered(start, &ports.queued[range], |r| {
            let reason = if r.reason == "listed" {
                escape_html(&r.reason)
            } else {
                format_origin(Some(&r.reason), None)
            };
            vec![
                format_pkgname(&r.pkgname),
                format_origin(Some(&r.origin), r.flavor.as_deref()),
                reason,
            ]
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Highlight;
    use pkgwatch_common::{PageKind, ServerStyle, Snapshot};
    use serde_json::{Value, json};

    fn ctx() -> PageContext {
        PageContext::new(
            PageKind::Build,
            ServerStyle::Hosted,
            Some("m".to_string()),
            Some("b".to_string()),
        )
    }

    fn page() -> BuildPage {
        BuildPage::new(ImpulseTracker::new(8, 120, 600))
    }

    fn snapshot(value: Value) -> BuildSnapshot {
        match Snapshot::from_value(value).unwrap() {
            Snapshot::Build(build) => *build,
            other => panic!("expected build snapshot, got {:?}", other.kind()),
        }
    }

    fn doc(built: &[&str], status: &str) -> Value {
        let built: Vec<Value> = built
            .iter()
            .map(|p| json!({"pkgname": p, "origin": format!("misc/{}", p), "elapsed": 10}))
            .collect();
        json!({
            "mastername": "m",
            "buildname": "b",
            "status": status,
            "stats": {"queued": 10, "built": built.len(), "failed": 0},
            "snap": {"built": built.len(), "elapsed": 600, "now": 700},
            "jobs": [
                {"id": "01", "status": "build:misc/x", "pkgname": "x-1", "origin": "misc/x", "started": 640},
                {"id": "02", "status": "idle:"}
            ],
            "ports": {
                "built": built,
                "remaining": [{"pkgname": "r-1", "status": "waiting"}]
            }
        })
    }

    #[test]
    fn test_builder_elapsed_uses_producer_clock() {
        let mut page = page();
        page.process(&ctx(), &snapshot(doc(&[], "parallel_build:")), 300, 1_700_000_000);
        let busy = page.builders.row("01").unwrap();
        assert_eq!(busy.elapsed, "00:01:00");
        let idle = page.builders.row("02").unwrap();
        assert!(idle.is_idle());
        assert_eq!(idle.cells(&ctx())[3], "idle");
    }

    #[test]
    fn test_idle_builders_hidden_once_stopped() {
        let mut page = page();
        let keep = page.process(&ctx(), &snapshot(doc(&[], "stopped:done:")), 300, 0);
        assert!(!keep);
        assert_eq!(page.status.as_deref(), Some("stopped:done:"));
        assert!(page.builders.row("01").is_some());
        assert!(page.builders.row("02").is_none());
    }

    #[test]
    fn test_append_only_tables_grow_from_cursor() {
        let mut page = page();
        page.process(&ctx(), &snapshot(doc(&["a-1", "b-1"], "parallel_build:")), 300, 0);
        let built = page.table(PortCategory::Built).unwrap();
        assert_eq!(built.len(), 2);
        assert!(built.iter().all(|(_, h)| h == Highlight::None));

        page.process(&ctx(), &snapshot(doc(&["a-1", "b-1", "c-1"], "parallel_build:")), 300, 0);
        let built = page.table(PortCategory::Built).unwrap();
        assert_eq!(built.len(), 3);
        let rows: Vec<_> = built.iter().collect();
        assert_eq!(rows[2].0[0], "3");
        assert_eq!(rows[2].1, Highlight::FadeIn);
        assert_eq!(rows[0].1, Highlight::None);

        // The same snapshot again renders nothing new.
        page.process(&ctx(), &snapshot(doc(&["a-1", "b-1", "c-1"], "parallel_build:")), 300, 0);
        let built = page.table(PortCategory::Built).unwrap();
        assert_eq!(built.len(), 3);
        assert!(built.iter().all(|(_, h)| h == Highlight::None));
    }

    #[test]
    fn test_same_snapshot_twice_leaves_builders_untouched() {
        let mut page = page();
        let data = snapshot(doc(&["a-1"], "parallel_build:"));
        page.process(&ctx(), &data, 300, 0);
        page.process(&ctx(), &data, 300, 0);
        assert!(page.builders.iter().all(|(_, h)| h == Highlight::None));
        assert_eq!(page.builders.len(), 2);
    }

    #[test]
    fn test_remaining_table_is_replaced() {
        let mut page = page();
        page.process(&ctx(), &snapshot(doc(&[], "parallel_build:")), 300, 0);
        assert!(page.table(PortCategory::Remaining).unwrap().is_visible());

        let mut next = doc(&[], "parallel_build:");
        next["ports"]["remaining"] = json!([]);
        page.process(&ctx(), &snapshot(next), 300, 0);
        let remaining = page.table(PortCategory::Remaining).unwrap();
        assert!(!remaining.is_visible());
        assert!(remaining.is_empty());
    }

    #[test]
    fn test_failed_rows_carry_skip_counts() {
        let mut page = page();
        let data = snapshot(json!({
            "mastername": "m",
            "buildname": "b",
            "ports": {
                "failed": [{"pkgname": "f-1", "origin": "misc/f", "phase": "build",
                            "errortype": "compiler_error", "elapsed": 0}],
                "queued": [{"pkgname": "q-1", "origin": "misc/q", "reason": "listed"},
                           {"pkgname": "q-2", "origin": "misc/q2", "reason": "misc/q"}]
            },
            "skipped": {"f-1": 2}
        }));
        page.process(&ctx(), &data, 300, 0);

        let failed: Vec<_> = page.table(PortCategory::Failed).unwrap().iter().collect();
        let cells = failed[0].0;
        assert_eq!(cells[3], "build");
        assert!(cells[4].contains("Packages skipped due to f-1"));
        assert!(cells[5].contains("logs/errors/f-1.log"));
        assert_eq!(cells[6], "");

        let queued: Vec<_> = page.table(PortCategory::Queued).unwrap().iter().collect();
        assert_eq!(queued[0].0[3], "listed");
        assert!(queued[1].0[3].contains("freshports.org/misc/q/"));
    }

    #[test]
    fn test_rates_and_progress() {
        let mut page = page();
        page.process(&ctx(), &snapshot(doc(&["a-1", "b-1", "c-1", "d-1", "e-1"], "parallel_build:")), 300, 0);
        let panel = page.snap.as_ref().unwrap();
        assert_eq!(panel.pkghour.to_string(), "30");
        assert_eq!(panel.impulse.rate.to_string(), "--");
        assert_eq!(page.percent.unwrap().to_string(), "50%");
        assert_eq!(page.progress.as_ref().unwrap().width, 300);
    }

    #[test]
    fn test_render_contains_sections() {
        let mut page = page();
        page.process(&ctx(), &snapshot(doc(&["a-1"], "parallel_build:")), 300, 0);
        let html = page.render(&ctx());
        assert!(html.contains(r#"id="build_info_div""#));
        assert!(html.contains(r#"id="builders_table""#));
        assert!(html.contains(r#"id="built_table""#));
        assert!(html.contains(r#"id="remaining_table""#));
        assert!(!html.contains(r#"id="failed_table""#));
        assert!(html.contains(r#"<span id="progresspct">10%</span>"#));
        assert!(html.contains("Still calculating..."));
    }
}
