pub(crate) mod completions;
pub(crate) mod daemon;
pub(crate) mod install;
pub(crate) mod relay;

use anyhow::Context;
use rxwatch::MonitorConfig;
use std::path::Path;
use std::sync::Arc;

pub(crate) mod icons {
    pub const INFO: &str = "ℹ";
    pub const SUCCESS: &str = "✓";
    pub const WARNING: &str = "⚠";
    pub const ERROR: &str = "✗";
}

pub(crate) fn load_config(path: &Path) -> anyhow::Result<Arc<MonitorConfig>> {
    let config = MonitorConfig::load(path)
        .with_context(|| format!("Cannot start without a valid config ({})", path.display()))?;
    Ok(Arc::new(config))
}
