//! Application options assembled once at startup

use std::time::Duration;

use crate::config::settings::Settings;
use crate::deploy::driver::DriverOptions;
use crate::stack::layout::StackLayout;
use crate::utils::CooldownOptions;

/// Everything the stage pipeline needs, derived from [`Settings`] plus CLI
/// overrides. Constructed once at startup; no stage mutates shared state.
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Source settings document (topology, paths, required keys)
    pub settings: Settings,

    /// Host filesystem layout
    pub layout: StackLayout,

    /// Deployment driver configuration
    pub driver: DriverOptions,

    /// Timeout for the external health probe
    pub probe_timeout: Duration,
}

impl AppOptions {
    pub fn from_settings(settings: Settings) -> Self {
        let layout = StackLayout::new(settings.data_root.clone(), settings.backup_dir.clone());
        let driver = DriverOptions {
            grace_period: Duration::from_secs(settings.timing.grace_period_secs),
            poll: CooldownOptions {
                base_delay: Duration::from_secs(settings.timing.poll_base_delay_secs),
                max_delay: Duration::from_secs(settings.timing.poll_max_delay_secs),
                multiplier: 2.0,
            },
            log_tail_lines: settings.timing.log_tail_lines,
        };
        let probe_timeout = Duration::from_secs(settings.timing.probe_timeout_secs);

        Self {
            settings,
            layout,
            driver,
            probe_timeout,
        }
    }
}
