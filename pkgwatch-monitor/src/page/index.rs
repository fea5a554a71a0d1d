//! Overview of the latest build of every master

use pkgwatch_common::{BuildSummary, IndexSnapshot};
use std::collections::BTreeMap;

use super::{PageContext, STAT_COLUMNS, StatCounts};
use crate::format::{
    escape_html, format_build_name, format_elapsed_value, format_jail_name, format_master_name,
    format_port_set, translate_status,
};
use crate::renderer::render_table;
use crate::table::{DiffTable, Highlight, KeyedRow};

#[derive(Debug, Clone, PartialEq)]
pub struct MasterRow {
    pub mastername: String,
    pub buildname: String,
    pub jailname: String,
    pub setname: String,
    pub ptname: String,
    pub counts: StatCounts,
    pub status: String,
    pub elapsed: String,
}

impl KeyedRow for MasterRow {
    fn row_id(&self) -> &str {
        &self.mastername
    }
}

impl MasterRow {
    fn from_summary(key: &str, latest: &BuildSummary) -> Self {
        let mastername = if latest.mastername.is_empty() {
            key.to_string()
        } else {
            latest.mastername.clone()
        };
        Self {
            mastername,
            buildname: latest.buildname.clone(),
            jailname: latest.jailname.clone(),
            setname: latest.setname.clone(),
            ptname: latest.ptname.clone(),
            counts: StatCounts::from_stats(latest.stats.as_ref()),
            status: translate_status(latest.status.as_deref()),
            elapsed: format_elapsed_value(latest.elapsed.as_ref()),
        }
    }

    /// Group heading: ports tree and set
    pub fn portset(&self) -> String {
        format_port_set(&self.ptname, &self.setname)
    }

    fn cells(&self, ctx: &PageContext) -> Vec<String> {
        let mut cells = vec![
            format_master_name(ctx, &self.mastername),
            format_build_name(ctx, &self.mastername, &self.buildname),
            format_jail_name(&self.jailname),
        ];
        cells.extend(self.counts.cells().iter().map(|n| n.to_string()));
        cells.push(escape_html(&self.status));
        cells.push(self.elapsed.clone());
        cells
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexPage {
    pub masters: DiffTable<MasterRow>,
}

impl IndexPage {
    /// Apply an overview snapshot. The overview never stops polling.
    pub fn process(&mut self, data: &IndexSnapshot) -> bool {
        let mut batch = self.masters.batch();
        for (key, entry) in &data.masternames {
            let Some(latest) = &entry.latest else {
                tracing::debug!("Master {} has no build yet", key);
                continue;
            };
            batch.queue(MasterRow::from_summary(key, latest));
        }
        let summary = batch.commit();
        tracing::debug!(
            "Masters: {} added, {} changed, {} unchanged",
            summary.added,
            summary.changed,
            summary.unchanged
        );
        true
    }

    pub fn render(&self, ctx: &PageContext) -> String {
        if !self.masters.is_visible() {
            return String::new();
        }

        let mut groups: BTreeMap<String, Vec<(Vec<String>, Highlight)>> = BTreeMap::new();
        for (row, hl) in self.masters.iter() {
            groups.entry(row.portset()).or_default().push((row.cells(ctx), hl));
        }

        let mut columns = vec!["Master", "Build", "Jail"];
        columns.extend(STAT_COLUMNS);
        columns.extend(["Status", "Elapsed"]);

        let mut html = String::from(r#"<div id="latest_builds_div"><h2 id="latest_builds">Latest builds</h2>"#);
        for (n, (portset, rows)) in groups.into_iter().enumerate() {
            html.push_str(&format!("<h3>{}</h3>", portset));
            let id = format!("latest_builds_table_{}", n);
            html.push_str(&render_table(&id, &columns, rows));
        }
        html.push_str("</div>");
        html
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkgwatch_common::{PageKind, ServerStyle, Snapshot};
    use serde_json::{Value, json};

    fn snapshot(value: Value) -> IndexSnapshot {
        match Snapshot::from_value(value).unwrap() {
            Snapshot::Index(index) => index,
            other => panic!("expected index snapshot, got {:?}", other.kind()),
        }
    }

    fn doc(status: &str) -> Value {
        json!({
            "masternames": {
                "131amd64-default": {"latest": {
                    "mastername": "131amd64-default", "buildname": "b1",
                    "jailname": "131amd64", "ptname": "default", "setname": "",
                    "status": status, "stats": {"queued": 4, "built": 1}
                }},
                "140amd64-py": {"latest": {
                    "mastername": "140amd64-py", "buildname": "b7",
                    "jailname": "140amd64", "ptname": "default", "setname": "py311",
                    "status": "stopped:done:", "elapsed": "00:10:00"
                }},
                "empty": {}
            }
        })
    }

    #[test]
    fn test_rows_keyed_by_master() {
        let mut page = IndexPage::default();
        assert!(page.process(&snapshot(doc("parallel_build:"))));
        assert_eq!(page.masters.len(), 2);
        let row = page.masters.row("131amd64-default").unwrap();
        assert_eq!(row.counts.remaining, 3);
        assert_eq!(row.portset(), "default");
        let row = page.masters.row("140amd64-py").unwrap();
        assert_eq!(row.portset(), "default-py311");
        assert_eq!(row.elapsed, "00:10:00");
    }

    #[test]
    fn test_repeat_snapshot_changes_nothing() {
        let mut page = IndexPage::default();
        page.process(&snapshot(doc("parallel_build:")));
        page.process(&snapshot(doc("parallel_build:")));
        assert!(page.masters.iter().all(|(_, hl)| hl == Highlight::None));

        page.process(&snapshot(doc("stopped:done:")));
        assert_eq!(page.masters.highlight("131amd64-default"), Some(Highlight::Flash));
        assert_eq!(page.masters.highlight("140amd64-py"), Some(Highlight::None));
    }

    #[test]
    fn test_render_groups_by_port_set() {
        let mut page = IndexPage::default();
        page.process(&snapshot(doc("parallel_build:")));
        let ctx = PageContext::new(PageKind::Index, ServerStyle::Hosted, None, None);
        let html = page.render(&ctx);
        assert!(html.contains("<h3>default</h3>"));
        assert!(html.contains("<h3>default-py311</h3>"));
        assert!(html.contains("jail.html?mastername=131amd64-default"));
        assert!(html.contains("build.html?mastername=140amd64-py&amp;build=b7"));
    }
}
