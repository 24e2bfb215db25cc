use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tutor_timesheet_util::{TimesheetConfig, TimesheetService};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let service = TimesheetService::new(TimesheetConfig::default());

    match service.run() {
        Ok(summary) => {
            info!(
                "Timesheets written to {}",
                summary.output_dir.display()
            );
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            Err(e.into())
        }
    }
}
