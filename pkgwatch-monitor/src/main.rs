use pkgwatch_monitor::config;
use pkgwatch_monitor::page::{Dashboard, DashboardSettings, PageContext};
use pkgwatch_monitor::poller::{Frame, PollSettings, Poller, Publisher, Termination, TokioSleeper};
use pkgwatch_monitor::renderer::HtmlRenderer;
use pkgwatch_monitor::source::DataSource;

use anyhow::{Context, Result};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = std::env::args().nth(1).unwrap_or_else(|| "config.toml".to_string());
    config::read_config(&config_path)?;
    let config = config::CONFIG.get().context("Configuration not loaded")?;

    // Initialize logging
    let _logging_guard = pkgwatch_monitor::logging::init_logging(
        &config.log_dir,
        "pkgwatch-monitor",
        &config.log_level,
    )?;

    tracing::info!("pkgwatch monitor starting...");
    tracing::info!("Writing pages to {}", config.output_dir);

    let renderer = HtmlRenderer::new(
        &config.output_dir,
        config.poll.update_interval_secs,
        config.progress.column_width,
        config.progress.png,
    );

    let ctx = match PageContext::from_config(&config.page, config.source.server_style) {
        Ok(ctx) => ctx,
        Err(e) => {
            tracing::error!("{}", e);
            renderer.publish(Frame::Failed(&e.to_string())).await?;
            anyhow::bail!(e);
        }
    };
    tracing::info!("Monitoring {} page", ctx.kind);

    let source = DataSource::from_config(&config.source, &ctx)?;
    let dashboard = Dashboard::new(ctx, DashboardSettings::from_config(config));
    let mut poller = Poller::new(
        source,
        renderer,
        TokioSleeper,
        dashboard,
        PollSettings::from_config(&config.poll),
    );

    let termination = tokio::select! {
        termination = poller.run() => termination,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            return Ok(());
        }
    };

    match termination {
        Termination::Finished => {
            tracing::info!("Build finished, final page written");
            Ok(())
        }
        Termination::GaveUp { attempts } => {
            tracing::error!("No data available after {} attempts", attempts);
            anyhow::bail!("no data available after {} attempts", attempts)
        }
        Termination::Fatal(e) => {
            tracing::error!("Monitoring stopped: {}", e);
            Err(e.into())
        }
    }
}
