use serde::{Deserialize, Serialize};

/// Which page a monitor instance is rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    /// One build of one master
    #[default]
    Build,
    /// Build history of one master
    Jail,
    /// Latest build of every master
    Index,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Build => "build",
            PageKind::Jail => "jail",
            PageKind::Index => "index",
        }
    }
}

impl std::fmt::Display for PageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "build" => Ok(PageKind::Build),
            "jail" => Ok(PageKind::Jail),
            "index" | "" => Ok(PageKind::Index),
            _ => Err(format!("Unhandled page type '{}'", s)),
        }
    }
}

/// How the data directory is laid out relative to the pages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServerStyle {
    /// Pages live at the top and read `data/<master>/<build>/`
    #[default]
    Hosted,
    /// Pages are copied next to each `.data.json`
    Inline,
}

/// Result category of a package row in `ports`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortCategory {
    Built,
    Failed,
    Skipped,
    Ignored,
    Fetched,
    Remaining,
    Queued,
}

impl PortCategory {
    /// Display order of the result tables
    pub const ALL: [PortCategory; 7] = [
        PortCategory::Built,
        PortCategory::Failed,
        PortCategory::Skipped,
        PortCategory::Ignored,
        PortCategory::Fetched,
        PortCategory::Remaining,
        PortCategory::Queued,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PortCategory::Built => "built",
            PortCategory::Failed => "failed",
            PortCategory::Skipped => "skipped",
            PortCategory::Ignored => "ignored",
            PortCategory::Fetched => "fetched",
            PortCategory::Remaining => "remaining",
            PortCategory::Queued => "queued",
        }
    }

    /// Categories whose lists only ever grow during a build.
    ///
    /// `remaining` shrinks as packages finish, so it is redrawn wholesale.
    pub fn is_append_only(&self) -> bool {
        !matches!(self, PortCategory::Remaining)
    }

    /// Column headings of the table for this category
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            PortCategory::Built => &["#", "Package", "Origin", "Log", "Duration"],
            PortCategory::Failed => {
                &["#", "Package", "Origin", "Phase", "Skipped", "Log", "Duration"]
            }
            PortCategory::Skipped => &["#", "Package", "Origin", "Reason"],
            PortCategory::Ignored => &["#", "Package", "Origin", "Skipped", "Reason"],
            PortCategory::Fetched => &["#", "Package", "Origin"],
            PortCategory::Remaining => &["#", "Package", "Status"],
            PortCategory::Queued => &["#", "Package", "Origin", "Reason"],
        }
    }
}

impl std::fmt::Display for PortCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PortCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "built" => Ok(PortCategory::Built),
            "failed" => Ok(PortCategory::Failed),
            "skipped" => Ok(PortCategory::Skipped),
            "ignored" => Ok(PortCategory::Ignored),
            "fetched" => Ok(PortCategory::Fetched),
            "remaining" => Ok(PortCategory::Remaining),
            "queued" => Ok(PortCategory::Queued),
            _ => Err(format!("Unknown port category: {}", s)),
        }
    }
}
