//! Page processors
//!
//! A [`Dashboard`] owns the state of one page and feeds each fetched document
//! to the handler for its kind. Handlers report whether polling should go on.

pub mod build;
pub mod index;
pub mod jail;

use pkgwatch_common::{PageKind, ServerStyle, Snapshot, Stats};
use serde_json::Value;
use std::ops::ControlFlow;

use crate::config::{MonitorConfig, PageConfig};
use crate::error::MonitorError;
use crate::progress;
use crate::rate::ImpulseTracker;

pub use build::BuildPage;
pub use index::IndexPage;
pub use jail::JailPage;

/// Identity of the page being rendered and where its data lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageContext {
    pub kind: PageKind,
    pub style: ServerStyle,
    pub mastername: Option<String>,
    pub buildname: Option<String>,
    /// Data directory relative to the source root, with trailing `/`
    pub data_url: String,
}

impl PageContext {
    pub fn new(
        kind: PageKind,
        style: ServerStyle,
        mastername: Option<String>,
        buildname: Option<String>,
    ) -> Self {
        let mut ctx = Self {
            kind,
            style,
            mastername,
            buildname,
            data_url: String::new(),
        };
        ctx.data_url = ctx.compute_data_url();
        ctx
    }

    /// Validate the configured page parameters.
    ///
    /// Hosted pages locate their data by master and build, so those must be
    /// given; inline pages sit next to their data.
    pub fn from_config(page: &PageConfig, style: ServerStyle) -> Result<Self, MonitorError> {
        let mastername = page.mastername.clone().filter(|m| !m.is_empty());
        let buildname = page.build.clone().filter(|b| !b.is_empty());

        if style == ServerStyle::Hosted {
            match page.kind {
                PageKind::Build if mastername.is_none() || buildname.is_none() => {
                    return Err(MonitorError::MissingBuild);
                }
                PageKind::Jail if mastername.is_none() => {
                    return Err(MonitorError::MissingMastername);
                }
                _ => {}
            }
        }

        Ok(Self::new(page.kind, style, mastername, buildname))
    }

    fn compute_data_url(&self) -> String {
        if self.style == ServerStyle::Inline {
            return String::new();
        }
        let master = self.mastername.as_deref().unwrap_or_default();
        let build = self.buildname.as_deref().unwrap_or_default();
        match self.kind {
            PageKind::Build => format!("data/{}/{}/", master, build),
            PageKind::Jail => format!("data/{}/", master),
            PageKind::Index => "data/".to_string(),
        }
    }
}

/// Per-kind page state
#[derive(Debug, Clone)]
pub enum PageState {
    Build(Box<BuildPage>),
    Jail(JailPage),
    Index(IndexPage),
}

/// Settings shared by all page handlers
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub column_width: u32,
    pub update_interval_secs: u64,
    pub first_period_secs: u64,
    pub target_period_secs: u64,
    pub anchor: Option<String>,
}

impl DashboardSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            column_width: config.progress.column_width,
            update_interval_secs: config.poll.update_interval_secs,
            first_period_secs: config.rate.first_period_secs,
            target_period_secs: config.rate.target_period_secs,
            anchor: config.page.anchor.clone().filter(|a| !a.is_empty()),
        }
    }

    fn impulse_tracker(&self) -> ImpulseTracker {
        ImpulseTracker::new(
            self.update_interval_secs,
            self.first_period_secs,
            self.target_period_secs,
        )
    }
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// State of one monitored page across polls
#[derive(Debug, Clone)]
pub struct Dashboard {
    ctx: PageContext,
    settings: DashboardSettings,
    state: PageState,
    loading: bool,
    bar_width: u32,
    pending_anchor: Option<String>,
    scroll_to: Option<String>,
}

impl Dashboard {
    pub fn new(ctx: PageContext, settings: DashboardSettings) -> Self {
        let state = Self::blank_state(ctx.kind, &settings);
        let bar_width = progress::bar_width(settings.column_width);
        let pending_anchor = settings.anchor.clone();
        Self {
            ctx,
            settings,
            state,
            loading: true,
            bar_width,
            pending_anchor,
            scroll_to: None,
        }
    }

    fn blank_state(kind: PageKind, settings: &DashboardSettings) -> PageState {
        match kind {
            PageKind::Build => PageState::Build(Box::new(BuildPage::new(settings.impulse_tracker()))),
            PageKind::Jail => PageState::Jail(JailPage::default()),
            PageKind::Index => PageState::Index(IndexPage::default()),
        }
    }

    pub fn context(&self) -> &PageContext {
        &self.ctx
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    /// Whether the loading overlay is still shown
    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Anchor to jump to on this render, set once after the first load
    pub fn scroll_to(&self) -> Option<&str> {
        self.scroll_to.as_deref()
    }

    pub fn bar_width(&self) -> u32 {
        self.bar_width
    }

    pub fn title(&self) -> String {
        match &self.state {
            PageState::Build(page) => page.title(),
            PageState::Jail(_) => match &self.ctx.mastername {
                Some(master) => format!("Builds for {}", master),
                None => "Builds".to_string(),
            },
            PageState::Index(_) => "Build overview".to_string(),
        }
    }

    /// Feed one fetched document to the page.
    pub fn process(&mut self, data: Value) -> Result<ControlFlow<()>, MonitorError> {
        self.process_at(data, chrono::Utc::now().timestamp())
    }

    /// [`Dashboard::process`] with an explicit wall clock.
    pub fn process_at(&mut self, data: Value, wall_now: i64) -> Result<ControlFlow<()>, MonitorError> {
        self.scroll_to = None;
        let snapshot = Snapshot::from_value(data)?;

        let kind = snapshot.kind();
        let switched = kind != self.ctx.kind;
        if switched {
            tracing::warn!(
                "Configured {} page received {} data, switching page type",
                self.ctx.kind,
                kind
            );
            self.ctx.kind = kind;
            self.state = Self::blank_state(kind, &self.settings);
        }

        let keep_polling = match (snapshot, &mut self.state) {
            (Snapshot::Build(data), PageState::Build(page)) => {
                if self.ctx.buildname.as_deref() == Some("latest") {
                    tracing::info!("Following latest build: {}", data.buildname);
                }
                self.ctx.buildname = Some(data.buildname.clone());
                if !data.mastername.is_empty() {
                    self.ctx.mastername = Some(data.mastername.clone());
                }
                page.process(&self.ctx, &data, self.bar_width, wall_now)
            }
            (Snapshot::Jail(data), PageState::Jail(page)) => {
                if !data.mastername.is_empty() {
                    self.ctx.mastername = Some(data.mastername.clone());
                }
                page.process(&data)
            }
            (Snapshot::Index(data), PageState::Index(page)) => page.process(&data),
            // State was reset to the snapshot kind above.
            _ => true,
        };

        if switched {
            self.ctx.data_url = self.ctx.compute_data_url();
        }

        if self.loading {
            self.first_load_setup();
        }

        if keep_polling {
            Ok(ControlFlow::Continue(()))
        } else {
            Ok(ControlFlow::Break(()))
        }
    }

    /// Recompute the bar width from the column and redraw it.
    pub fn resize(&mut self) {
        self.bar_width = progress::bar_width(self.settings.column_width);
        if let PageState::Build(page) = &mut self.state {
            page.relayout(self.bar_width);
        }
    }

    fn first_load_setup(&mut self) {
        self.resize();
        self.loading = false;
        self.scroll_to = self.pending_anchor.take();
        tracing::debug!("First load complete for {} page", self.ctx.kind);
    }
}

/// Counter columns shared by the history and overview tables
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatCounts {
    pub queued: i64,
    pub built: i64,
    pub failed: i64,
    pub skipped: i64,
    pub ignored: i64,
    pub fetched: i64,
    pub remaining: i64,
}

impl StatCounts {
    pub fn from_stats(stats: Option<&Stats>) -> Self {
        match stats {
            Some(s) => Self {
                queued: s.queued,
                built: s.built,
                failed: s.failed,
                skipped: s.skipped,
                ignored: s.ignored,
                fetched: s.fetched,
                remaining: s.remaining(),
            },
            None => Self::default(),
        }
    }

    /// Cells in column order
    pub fn cells(&self) -> [i64; 7] {
        [
            self.queued,
            self.built,
            self.failed,
            self.skipped,
            self.ignored,
            self.fetched,
            self.remaining,
        ]
    }
}

pub const STAT_COLUMNS: [&str; 7] = [
    "Queued", "Built", "Failed", "Skipped", "Ignored", "Fetched", "Remaining",
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn page(kind: PageKind, master: Option<&str>, build: Option<&str>) -> PageConfig {
        PageConfig {
            kind,
            mastername: master.map(String::from),
            build: build.map(String::from),
            anchor: None,
        }
    }

    #[test]
    fn test_hosted_build_requires_master_and_build() {
        let err = PageContext::from_config(&page(PageKind::Build, Some("m"), None), ServerStyle::Hosted)
            .unwrap_err();
        assert!(matches!(err, MonitorError::MissingBuild));
        let err = PageContext::from_config(&page(PageKind::Jail, Some(""), None), ServerStyle::Hosted)
            .unwrap_err();
        assert!(matches!(err, MonitorError::MissingMastername));

        let ctx = PageContext::from_config(&page(PageKind::Index, None, None), ServerStyle::Hosted)
            .unwrap();
        assert_eq!(ctx.data_url, "data/");
    }

    #[test]
    fn test_data_urls() {
        let ctx = PageContext::from_config(
            &page(PageKind::Build, Some("m"), Some("b")),
            ServerStyle::Hosted,
        )
        .unwrap();
        assert_eq!(ctx.data_url, "data/m/b/");
        let ctx = PageContext::from_config(&page(PageKind::Jail, Some("m"), None), ServerStyle::Hosted)
            .unwrap();
        assert_eq!(ctx.data_url, "data/m/");
        let ctx = PageContext::from_config(&page(PageKind::Build, None, None), ServerStyle::Inline)
            .unwrap();
        assert_eq!(ctx.data_url, "");
    }

    fn build_doc(status: &str) -> Value {
        json!({
            "mastername": "m",
            "buildname": "b1",
            "status": status,
            "stats": {"queued": 10, "built": 4, "failed": 1},
            "jobs": [{"id": "01", "status": "idle:"}]
        })
    }

    fn dashboard(kind: PageKind, anchor: Option<&str>) -> Dashboard {
        let ctx = PageContext::new(kind, ServerStyle::Hosted, Some("m".into()), Some("latest".into()));
        let settings = DashboardSettings {
            anchor: anchor.map(String::from),
            ..DashboardSettings::default()
        };
        Dashboard::new(ctx, settings)
    }

    #[test]
    fn test_build_stops_only_on_stopped_status() {
        let mut dash = dashboard(PageKind::Build, None);
        let flow = dash.process_at(build_doc("parallel_build:"), 0).unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));
        let flow = dash.process_at(build_doc("stopped:done:"), 0).unwrap();
        assert_eq!(flow, ControlFlow::Break(()));

        let mut dash = dashboard(PageKind::Build, None);
        let flow = dash.process_at(build_doc("not_stopped:"), 0).unwrap();
        assert_eq!(flow, ControlFlow::Continue(()));
    }

    #[test]
    fn test_latest_build_is_adopted() {
        let mut dash = dashboard(PageKind::Build, None);
        dash.process_at(build_doc("parallel_build:"), 0).unwrap();
        assert_eq!(dash.context().buildname.as_deref(), Some("b1"));
        assert_eq!(dash.title(), "Bulk results for m b1");
    }

    #[test]
    fn test_first_load_hides_overlay_and_jumps_once() {
        let mut dash = dashboard(PageKind::Build, Some("failed"));
        assert!(dash.is_loading());
        dash.process_at(build_doc("parallel_build:"), 0).unwrap();
        assert!(!dash.is_loading());
        assert_eq!(dash.scroll_to(), Some("failed"));
        dash.process_at(build_doc("parallel_build:"), 0).unwrap();
        assert_eq!(dash.scroll_to(), None);
    }

    #[test]
    fn test_jail_and_index_always_continue() {
        let mut dash = dashboard(PageKind::Jail, None);
        let doc = json!({"mastername": "m", "builds": {"b1": {"status": "stopped:done:"}}});
        assert_eq!(dash.process_at(doc, 0).unwrap(), ControlFlow::Continue(()));

        let mut dash = dashboard(PageKind::Index, None);
        let doc = json!({"masternames": {"m": {"latest": {"mastername": "m", "status": "stopped:done:"}}}});
        assert_eq!(dash.process_at(doc, 0).unwrap(), ControlFlow::Continue(()));
    }

    #[test]
    fn test_kind_mismatch_switches_page() {
        let mut dash = dashboard(PageKind::Build, None);
        let doc = json!({"masternames": {"m": {"latest": {"mastername": "m"}}}});
        dash.process_at(doc, 0).unwrap();
        assert_eq!(dash.context().kind, PageKind::Index);
        assert!(matches!(dash.state(), PageState::Index(_)));
        assert_eq!(dash.context().data_url, "data/");
    }

    #[test]
    fn test_kind_switch_moves_data_url() {
        let mut dash = dashboard(PageKind::Build, None);
        assert_eq!(dash.context().data_url, "data/m/latest/");
        let doc = json!({"mastername": "m", "builds": {"b1": {"buildname": "b1"}}});
        dash.process_at(doc, 0).unwrap();
        assert_eq!(dash.context().kind, PageKind::Jail);
        assert_eq!(dash.context().data_url, "data/m/");
    }

    #[test]
    fn test_build_without_jobs_stops_on_stopped_status() {
        let mut dash = dashboard(PageKind::Build, None);
        let doc = json!({"buildname": "b", "status": "parallel_build:"});
        assert_eq!(dash.process_at(doc, 0).unwrap(), ControlFlow::Continue(()));
        let doc = json!({"buildname": "b", "status": "stopped:done:"});
        assert_eq!(dash.process_at(doc, 0).unwrap(), ControlFlow::Break(()));
    }

    #[test]
    fn test_mistyped_fields_do_not_stop_monitoring() {
        let mut dash = dashboard(PageKind::Build, None);
        let doc = json!({
            "mastername": "m",
            "buildname": "b1",
            "status": "parallel_build:",
            "jobs": [{"id": "01", "status": null}, {"id": "02", "pkgname": 42, "status": "build:"}]
        });
        assert_eq!(dash.process_at(doc, 0).unwrap(), ControlFlow::Continue(()));

        let mut dash = dashboard(PageKind::Jail, None);
        let doc = json!({"mastername": "m", "builds": {"b1": {"buildname": "b1"}, "b2": 5}});
        assert_eq!(dash.process_at(doc, 0).unwrap(), ControlFlow::Continue(()));
    }

    #[test]
    fn test_unknown_data_is_fatal() {
        let mut dash = dashboard(PageKind::Build, None);
        let err = dash.process_at(json!({"hello": 1}), 0).unwrap_err();
        assert_eq!(err.to_string(), "Invalid request. Unknown data type.");
    }

    #[test]
    fn test_stat_counts_default_to_zero() {
        assert_eq!(StatCounts::from_stats(None).cells(), [0; 7]);
        let stats = Stats {
            queued: 10,
            built: 4,
            failed: 1,
            ..Stats::default()
        };
        assert_eq!(StatCounts::from_stats(Some(&stats)).remaining, 5);
    }
}
