//! Typed views of the `.data.json` status documents.

use crate::count::{loose, loose_map, loose_opt, loose_string, loose_string_opt};
use crate::types::{PageKind, PortCategory};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::warn;

/// Errors raised while interpreting a fetched document
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("Invalid request. Unknown data type.")]
    UnknownDataType,

    #[error("Unknown data type \"{0}\". Try flushing cache.")]
    UnknownCategory(String),

    #[error("Malformed snapshot: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Build counters as written by the producer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    #[serde(default, deserialize_with = "loose")]
    pub queued: i64,
    #[serde(default, deserialize_with = "loose")]
    pub built: i64,
    #[serde(default, deserialize_with = "loose")]
    pub failed: i64,
    #[serde(default, deserialize_with = "loose")]
    pub skipped: i64,
    #[serde(default, deserialize_with = "loose")]
    pub ignored: i64,
    #[serde(default, deserialize_with = "loose")]
    pub fetched: i64,
    /// Seconds since the build started, when the producer reports it
    #[serde(default, deserialize_with = "loose_opt")]
    pub elapsed: Option<i64>,
}

impl Stats {
    /// Packages still waiting for a result
    pub fn remaining(&self) -> i64 {
        self.queued - self.built - self.failed - self.skipped - self.ignored - self.fetched
    }

    /// Packages a builder has finished with, successfully or not
    pub fn attempted(&self) -> i64 {
        self.built + self.failed
    }

    pub fn count(&self, category: PortCategory) -> i64 {
        match category {
            PortCategory::Built => self.built,
            PortCategory::Failed => self.failed,
            PortCategory::Skipped => self.skipped,
            PortCategory::Ignored => self.ignored,
            PortCategory::Fetched => self.fetched,
            PortCategory::Remaining => self.remaining(),
            PortCategory::Queued => self.queued,
        }
    }
}

/// Point-in-time copy of the counters taken with the clock values used for
/// rate calculation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snap {
    #[serde(default, deserialize_with = "loose")]
    pub queued: i64,
    #[serde(default, deserialize_with = "loose")]
    pub built: i64,
    #[serde(default, deserialize_with = "loose")]
    pub failed: i64,
    #[serde(default, deserialize_with = "loose")]
    pub skipped: i64,
    #[serde(default, deserialize_with = "loose")]
    pub ignored: i64,
    #[serde(default, deserialize_with = "loose")]
    pub fetched: i64,
    #[serde(default, deserialize_with = "loose_opt")]
    pub elapsed: Option<i64>,
    /// Producer clock, relative to the build start
    #[serde(default, deserialize_with = "loose_opt")]
    pub now: Option<i64>,
}

/// One builder slot
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    #[serde(default, deserialize_with = "loose_string")]
    pub id: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub status: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub pkgname: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub origin: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub flavor: Option<String>,
    #[serde(default, deserialize_with = "loose_opt")]
    pub started: Option<i64>,
}

impl Job {
    pub fn pkgname(&self) -> Option<&str> {
        non_empty(&self.pkgname)
    }

    pub fn origin(&self) -> Option<&str> {
        non_empty(&self.origin)
    }

    pub fn flavor(&self) -> Option<&str> {
        non_empty(&self.flavor)
    }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuiltPort {
    #[serde(default, deserialize_with = "loose_string")]
    pub pkgname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub origin: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub flavor: Option<String>,
    #[serde(default, deserialize_with = "loose_opt")]
    pub elapsed: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailedPort {
    #[serde(default, deserialize_with = "loose_string")]
    pub pkgname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub origin: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub flavor: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub phase: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub errortype: String,
    #[serde(default, deserialize_with = "loose_opt")]
    pub elapsed: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkippedPort {
    #[serde(default, deserialize_with = "loose_string")]
    pub pkgname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub origin: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub flavor: Option<String>,
    /// Package whose failure caused the skip
    #[serde(default, deserialize_with = "loose_string")]
    pub depends: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnoredPort {
    #[serde(default, deserialize_with = "loose_string")]
    pub pkgname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub origin: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub flavor: Option<String>,
    #[serde(default, deserialize_with = "loose_string")]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FetchedPort {
    #[serde(default, deserialize_with = "loose_string")]
    pub pkgname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub origin: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub flavor: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemainingPort {
    #[serde(default, deserialize_with = "loose_string")]
    pub pkgname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueuedPort {
    #[serde(default, deserialize_with = "loose_string")]
    pub pkgname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub origin: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub flavor: Option<String>,
    /// `listed` or the origin that pulled this package in
    #[serde(default, deserialize_with = "loose_string")]
    pub reason: String,
}

/// Per-category package lists
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(try_from = "BTreeMap<String, Value>")]
pub struct Ports {
    pub built: Vec<BuiltPort>,
    pub failed: Vec<FailedPort>,
    pub skipped: Vec<SkippedPort>,
    pub ignored: Vec<IgnoredPort>,
    pub fetched: Vec<FetchedPort>,
    pub remaining: Vec<RemainingPort>,
    pub queued: Vec<QueuedPort>,
}

/// Producer key that is not a result category and is never displayed
const IGNORED_PORTS_KEY: &str = "tobuild";

impl Ports {
    pub fn len(&self, category: PortCategory) -> usize {
        match category {
            PortCategory::Built => self.built.len(),
            PortCategory::Failed => self.failed.len(),
            PortCategory::Skipped => self.skipped.len(),
            PortCategory::Ignored => self.ignored.len(),
            PortCategory::Fetched => self.fetched.len(),
            PortCategory::Remaining => self.remaining.len(),
            PortCategory::Queued => self.queued.len(),
        }
    }
}

/// Decode a list element by element, dropping the rows that do not fit.
fn rows<T: DeserializeOwned>(value: Value) -> Vec<T> {
    match value {
        Value::Null => Vec::new(),
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value(item) {
                Ok(row) => Some(row),
                Err(e) => {
                    warn!("Skipping malformed row: {}", e);
                    None
                }
            })
            .collect(),
        other => {
            warn!("Expected a list of rows, got {}", other);
            Vec::new()
        }
    }
}

fn lenient_rows<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_null()).map(rows))
}

/// Optional sub-document; a malformed one reads as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.is_null())
        .and_then(|v| match serde_json::from_value(v) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!("Ignoring malformed field: {}", e);
                None
            }
        }))
}

/// Name → entry map; entries that do not decode are dropped.
fn lenient_entries<'de, D, T>(deserializer: D) -> Result<BTreeMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let Some(Value::Object(map)) = value else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .filter_map(|(key, entry)| match serde_json::from_value(entry) {
            Ok(decoded) => Some((key, decoded)),
            Err(e) => {
                warn!("Skipping malformed entry {}: {}", key, e);
                None
            }
        })
        .collect())
}

impl TryFrom<BTreeMap<String, Value>> for Ports {
    type Error = String;

    fn try_from(map: BTreeMap<String, Value>) -> Result<Self, Self::Error> {
        let mut ports = Ports::default();
        for (key, value) in map {
            if key == IGNORED_PORTS_KEY {
                continue;
            }
            let category: PortCategory = key
                .parse()
                .map_err(|_| format!("unknown port category \"{}\"", key))?;
            match category {
                PortCategory::Built => ports.built = rows(value),
                PortCategory::Failed => ports.failed = rows(value),
                PortCategory::Skipped => ports.skipped = rows(value),
                PortCategory::Ignored => ports.ignored = rows(value),
                PortCategory::Fetched => ports.fetched = rows(value),
                PortCategory::Remaining => ports.remaining = rows(value),
                PortCategory::Queued => ports.queued = rows(value),
            }
        }
        Ok(ports)
    }
}

/// `status` is a string on current producers and the worker list on old ones
#[derive(Debug, Clone, PartialEq)]
pub enum StatusField {
    Text(String),
    Legacy(Vec<Job>),
}

fn status_field<'de, D>(deserializer: D) -> Result<Option<StatusField>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(StatusField::Text(text)),
        Some(Value::Number(n)) => Some(StatusField::Text(n.to_string())),
        Some(list @ Value::Array(_)) => Some(StatusField::Legacy(rows(list))),
        _ => None,
    })
}

/// Status document of a single build
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildSnapshot {
    #[serde(default, deserialize_with = "loose_string")]
    pub mastername: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub buildname: String,
    #[serde(default, alias = "jail", deserialize_with = "loose_string")]
    pub jailname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub setname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub ptname: String,
    #[serde(default, deserialize_with = "status_field")]
    pub status: Option<StatusField>,
    #[serde(default, deserialize_with = "lenient")]
    pub stats: Option<Stats>,
    #[serde(default, deserialize_with = "lenient")]
    pub snap: Option<Snap>,
    #[serde(default, deserialize_with = "lenient_rows")]
    pub jobs: Option<Vec<Job>>,
    #[serde(default, deserialize_with = "lenient")]
    pub ports: Option<Ports>,
    /// Package → number of packages skipped because of it
    #[serde(default, deserialize_with = "loose_map")]
    pub skipped: BTreeMap<String, i64>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub overlays: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub git_hash: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub git_dirty: Option<String>,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub svn_url: Option<String>,
}

impl BuildSnapshot {
    /// Rewrite the legacy worker-list `status` into `jobs`.
    ///
    /// A leading `main` worker carries the build status; without one the
    /// build status is unknown.
    pub fn normalize(&mut self) {
        if self.jobs.is_some() {
            return;
        }
        if !matches!(self.status, Some(StatusField::Legacy(_))) {
            return;
        }
        if let Some(StatusField::Legacy(mut jobs)) = self.status.take() {
            if jobs.first().is_some_and(|job| job.id == "main") {
                let main = jobs.remove(0);
                self.status = Some(StatusField::Text(main.status));
            }
            self.jobs = Some(jobs);
        }
    }

    /// Raw colon-delimited build status
    pub fn status_text(&self) -> Option<&str> {
        match &self.status {
            Some(StatusField::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Skip count attached to failed and ignored rows
    pub fn skipped_count(&self, pkgname: &str) -> i64 {
        self.skipped.get(pkgname).copied().unwrap_or(0)
    }
}

/// Summary row of one build in the history and overview documents
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BuildSummary {
    #[serde(default, deserialize_with = "loose_string")]
    pub mastername: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub buildname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub jailname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub setname: String,
    #[serde(default, deserialize_with = "loose_string")]
    pub ptname: String,
    #[serde(default, deserialize_with = "loose_string_opt")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub stats: Option<Stats>,
    /// Seconds, or text already formatted by the producer
    #[serde(default)]
    pub elapsed: Option<Value>,
}

impl BuildSummary {
    /// Remaining count, 0 without stats
    pub fn remaining(&self) -> i64 {
        self.stats.as_ref().map(Stats::remaining).unwrap_or(0)
    }
}

/// Builds of one master, keyed by build name
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct JailBuilds {
    /// Name of the most recent build
    pub latest: Option<String>,
    pub builds: BTreeMap<String, BuildSummary>,
}

const LATEST_KEY: &str = "latest";

impl JailBuilds {
    pub fn latest_summary(&self) -> Option<&BuildSummary> {
        self.latest.as_ref().and_then(|name| self.builds.get(name))
    }
}

impl From<Value> for JailBuilds {
    fn from(value: Value) -> Self {
        let mut out = JailBuilds::default();
        let map = match value {
            Value::Object(map) => map,
            Value::Null => return out,
            other => {
                warn!("Expected a map of builds, got {}", other);
                return out;
            }
        };
        for (key, value) in map {
            if key == LATEST_KEY {
                out.latest = match value {
                    Value::String(name) => Some(name),
                    Value::Object(ref fields) => fields
                        .get("buildname")
                        .and_then(Value::as_str)
                        .map(String::from),
                    _ => None,
                };
                continue;
            }
            if !value.is_object() {
                warn!("Skipping build {}: expected an object, got {}", key, value);
                continue;
            }
            match serde_json::from_value(value) {
                Ok(summary) => {
                    out.builds.insert(key, summary);
                }
                Err(e) => warn!("Skipping malformed build {}: {}", key, e),
            }
        }
        out
    }
}

/// Build history document of one master
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JailSnapshot {
    #[serde(default, deserialize_with = "loose_string")]
    pub mastername: String,
    #[serde(default)]
    pub builds: JailBuilds,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MasterEntry {
    #[serde(default, deserialize_with = "lenient")]
    pub latest: Option<BuildSummary>,
}

/// Overview document listing every master
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default, deserialize_with = "lenient_entries")]
    pub masternames: BTreeMap<String, MasterEntry>,
}

/// A fetched document, classified by its shape
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Build(Box<BuildSnapshot>),
    Jail(JailSnapshot),
    Index(IndexSnapshot),
}

fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64() != Some(0.0),
        Some(_) => true,
    }
}

impl Snapshot {
    /// Classify and decode a document.
    ///
    /// The same endpoint may serve any of the three shapes (file:// and
    /// inline layouts), so the kind is detected from the keys present.
    pub fn from_value(value: Value) -> Result<Self, SnapshotError> {
        let kind = {
            let object = value.as_object().ok_or(SnapshotError::UnknownDataType)?;
            if is_set(object.get("buildname")) {
                if let Some(Value::Object(ports)) = object.get("ports") {
                    if let Some(unknown) = ports
                        .keys()
                        .find(|k| *k != IGNORED_PORTS_KEY && k.parse::<PortCategory>().is_err())
                    {
                        return Err(SnapshotError::UnknownCategory(unknown.clone()));
                    }
                }
                PageKind::Build
            } else if is_set(object.get("builds")) {
                PageKind::Jail
            } else if is_set(object.get("masternames")) {
                PageKind::Index
            } else {
                return Err(SnapshotError::UnknownDataType);
            }
        };

        match kind {
            PageKind::Build => {
                let mut build: BuildSnapshot = serde_json::from_value(value)?;
                build.normalize();
                Ok(Snapshot::Build(Box::new(build)))
            }
            PageKind::Jail => Ok(Snapshot::Jail(serde_json::from_value(value)?)),
            PageKind::Index => Ok(Snapshot::Index(serde_json::from_value(value)?)),
        }
    }

    pub fn kind(&self) -> PageKind {
        match self {
            Snapshot::Build(_) => PageKind::Build,
            Snapshot::Jail(_) => PageKind::Jail,
            Snapshot::Index(_) => PageKind::Index,
        }
    }
}
