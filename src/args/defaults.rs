use std::time::Duration;

pub(crate) const DEFAULT_CONCURRENCY: usize = 20;
pub(crate) const DEFAULT_RATE: u64 = 20;
pub(crate) const DEFAULT_DURATION: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub(crate) const DEFAULT_CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Config files looked up in the working directory when `--config` is absent.
pub(crate) const DEFAULT_CONFIG_FILES: [&str; 2] = ["loadsim.toml", "loadsim.json"];
