pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod page;
pub mod poller;
pub mod progress;
pub mod rate;
pub mod renderer;
pub mod source;
pub mod table;

pub use error::MonitorError;
pub use page::{Dashboard, DashboardSettings, PageContext};
pub use poller::{Poller, Termination};
