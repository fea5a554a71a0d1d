//! Build history of one master

use pkgwatch_common::{BuildSummary, JailSnapshot};

use super::{PageContext, STAT_COLUMNS, StatCounts};
use crate::format::{
    build_url, escape_html, format_build_name, format_elapsed_value, format_jail_name,
    format_master_name, format_pt_name, format_set_name, translate_status,
};
use crate::renderer::render_table;
use crate::table::{DiffTable, KeyedRow};

#[derive(Debug, Clone, PartialEq)]
pub struct BuildRow {
    pub mastername: String,
    pub buildname: String,
    pub counts: StatCounts,
    /// Translated status
    pub status: String,
    pub elapsed: String,
}

impl KeyedRow for BuildRow {
    fn row_id(&self) -> &str {
        &self.buildname
    }
}

impl BuildRow {
    fn from_summary(mastername: &str, buildname: &str, build: &BuildSummary) -> Self {
        Self {
            mastername: mastername.to_string(),
            buildname: buildname.to_string(),
            counts: StatCounts::from_stats(build.stats.as_ref()),
            status: translate_status(build.status.as_deref()),
            elapsed: format_elapsed_value(build.elapsed.as_ref()),
        }
    }

    fn cells(&self, ctx: &PageContext) -> Vec<String> {
        let mut cells = vec![format_build_name(ctx, &self.mastername, &self.buildname)];
        cells.extend(self.counts.cells().iter().map(|n| n.to_string()));
        cells.push(escape_html(&self.status));
        cells.push(self.elapsed.clone());
        cells
    }
}

/// Summary of the master's most recent build
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestInfo {
    pub mastername: String,
    pub buildname: String,
    pub status: String,
    pub jailname: String,
    pub setname: String,
    pub ptname: String,
}

#[derive(Debug, Clone, Default)]
pub struct JailPage {
    pub builds: DiffTable<BuildRow>,
    pub latest: Option<LatestInfo>,
}

impl JailPage {
    /// Apply a history snapshot. History pages never stop polling.
    pub fn process(&mut self, data: &JailSnapshot) -> bool {
        let mut batch = self.builds.batch();
        for (buildname, build) in &data.builds.builds {
            batch.queue(BuildRow::from_summary(&data.mastername, buildname, build));
        }
        let summary = batch.commit();
        tracing::debug!(
            "Builds: {} added, {} changed, {} unchanged",
            summary.added,
            summary.changed,
            summary.unchanged
        );

        if let Some(latest) = data.builds.latest_summary() {
            let mastername = if latest.mastername.is_empty() {
                data.mastername.clone()
            } else {
                latest.mastername.clone()
            };
            self.latest = Some(LatestInfo {
                mastername,
                buildname: latest.buildname.clone(),
                status: translate_status(latest.status.as_deref()),
                jailname: latest.jailname.clone(),
                setname: latest.setname.clone(),
                ptname: latest.ptname.clone(),
            });
        }

        true
    }

    pub fn render(&self, ctx: &PageContext) -> String {
        let mut html = String::new();

        if let Some(latest) = &self.latest {
            html.push_str(&format!(
                concat!(
                    r#"<div id="masterinfo_div"><dl class="dl-horizontal">"#,
                    "<dt>Master</dt><dd>{}</dd>",
                    "<dt>Status</dt><dd>{}</dd>",
                    "<dt>Jail</dt><dd>{}</dd>",
                    "<dt>Set</dt><dd>{}</dd>",
                    "<dt>Ports tree</dt><dd>{}</dd>",
                    r#"<dt><a id="latest_url" href="{}">Latest build</a></dt><dd id="latest_build">{}</dd>"#,
                    "</dl></div>",
                ),
                format_master_name(ctx, &latest.mastername),
                escape_html(&latest.status),
                format_jail_name(&latest.jailname),
                format_set_name(&latest.setname),
                format_pt_name(&latest.ptname),
                escape_html(&build_url(&latest.mastername, &latest.buildname)),
                format_build_name(ctx, &latest.mastername, &latest.buildname),
            ));
        }

        if self.builds.is_visible() {
            let mut columns = vec!["Build"];
            columns.extend(STAT_COLUMNS);
            columns.extend(["Status", "Elapsed"]);
            let rows = self.builds.iter().map(|(row, hl)| (row.cells(ctx), hl));
            html.push_str(r#"<div id="builds_div"><h2 id="builds">Builds</h2>"#);
            html.push_str(&render_table("builds_table", &columns, rows));
            html.push_str("</div>");
        }
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Highlight;
    use pkgwatch_common::{PageKind, ServerStyle, Snapshot};
    use serde_json::{Value, json};

    fn snapshot(value: Value) -> JailSnapshot {
        match Snapshot::from_value(value).unwrap() {
            Snapshot::Jail(jail) => jail,
            other => panic!("expected jail snapshot, got {:?}", other.kind()),
        }
    }

    fn doc(b2_built: i64) -> Value {
        json!({
            "mastername": "m",
            "builds": {
                "latest": "b2",
                "b1": {"mastername": "m", "buildname": "b1", "status": "stopped:done:",
                       "stats": {"queued": 3, "built": 3}, "elapsed": 3600},
                "b2": {"mastername": "m", "buildname": "b2", "status": "parallel_build:",
                       "jailname": "131amd64", "ptname": "default",
                       "stats": {"queued": "10", "built": b2_built, "failed": "x"}}
            }
        })
    }

    #[test]
    fn test_rows_keyed_by_build_name() {
        let mut page = JailPage::default();
        assert!(page.process(&snapshot(doc(2))));
        assert_eq!(page.builds.len(), 2);
        let b1 = page.builds.row("b1").unwrap();
        assert_eq!(b1.elapsed, "01:00:00");
        assert_eq!(b1.status, "stopped:done:");
        let b2 = page.builds.row("b2").unwrap();
        assert_eq!(b2.counts.failed, 0);
        assert_eq!(b2.counts.remaining, 8);
        assert_eq!(b2.elapsed, "");
    }

    #[test]
    fn test_only_changed_builds_flash() {
        let mut page = JailPage::default();
        page.process(&snapshot(doc(2)));
        page.process(&snapshot(doc(5)));
        assert_eq!(page.builds.highlight("b1"), Some(Highlight::None));
        assert_eq!(page.builds.highlight("b2"), Some(Highlight::Flash));
        assert_eq!(page.builds.row("b2").unwrap().counts.remaining, 5);
    }

    #[test]
    fn test_latest_panel() {
        let mut page = JailPage::default();
        page.process(&snapshot(doc(2)));
        let latest = page.latest.as_ref().unwrap();
        assert_eq!(latest.buildname, "b2");
        assert_eq!(latest.jailname, "131amd64");
        assert_eq!(latest.status, "parallel_build:");

        let ctx = PageContext::new(PageKind::Jail, ServerStyle::Hosted, Some("m".into()), None);
        let html = page.render(&ctx);
        assert!(html.contains(r#"href="build.html?mastername=m&amp;build=b2""#));
        assert!(html.contains(r##"<a href="#top">m</a>"##));
        assert!(html.contains(r#"id="builds_table""#));
    }
}
