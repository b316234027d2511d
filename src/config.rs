//! Gate configuration - passed from higher layers or read from the environment.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POPUP_URL: &str = "popup.html";
pub const DEFAULT_TAB_URL: &str = "index.html";
pub const DEFAULT_POPUP_WIDTH: u32 = 360;
pub const DEFAULT_POPUP_HEIGHT: u32 = 600;
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct GateConfig {
    pub app: String,
    pub popup_url: String,
    pub popup_width: u32,
    pub popup_height: u32,
    pub tab_url: String,
    /// Abandon in-flight requests after this long without a decision.
    /// `None` disables expiry; only a surface-close event abandons.
    pub inactivity_timeout: Option<Duration>,
    pub sweep_interval: Duration,
    pub store_dir: Option<PathBuf>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            app: "beegate".into(),
            popup_url: DEFAULT_POPUP_URL.into(),
            popup_width: DEFAULT_POPUP_WIDTH,
            popup_height: DEFAULT_POPUP_HEIGHT,
            tab_url: DEFAULT_TAB_URL.into(),
            inactivity_timeout: None,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            store_dir: None,
        }
    }
}

impl GateConfig {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), ..Default::default() }
    }

    pub fn with_popup(mut self, url: impl Into<String>, width: u32, height: u32) -> Self {
        self.popup_url = url.into();
        self.popup_width = width;
        self.popup_height = height;
        self
    }
    pub fn with_tab_url(mut self, url: impl Into<String>) -> Self { self.tab_url = url.into(); self }
    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self { self.inactivity_timeout = Some(timeout); self }
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self { self.sweep_interval = interval; self }
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self { self.store_dir = Some(dir.into()); self }

    /// Overlay `BEEGATE_*` environment variables on the defaults.
    ///
    /// `BEEGATE_INACTIVITY_SECS=0` disables expiry.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(app) = env("BEEGATE_APP") {
            config.app = app;
        }
        if let Some(url) = env("BEEGATE_POPUP_URL") {
            config.popup_url = url;
        }
        if let Some(width) = env_parse("BEEGATE_POPUP_WIDTH") {
            config.popup_width = width;
        }
        if let Some(height) = env_parse("BEEGATE_POPUP_HEIGHT") {
            config.popup_height = height;
        }
        if let Some(url) = env("BEEGATE_TAB_URL") {
            config.tab_url = url;
        }
        if let Some(secs) = env_parse::<u64>("BEEGATE_INACTIVITY_SECS") {
            config.inactivity_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = env_parse::<u64>("BEEGATE_SWEEP_SECS") {
            config.sweep_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(root) = env("BEEGATE_ROOT") {
            config.store_dir = Some(PathBuf::from(root));
        }
        config
    }

    /// Location of the file-backed store: `$BEEGATE_ROOT/<app>/store.json`,
    /// falling back to the platform data dir.
    #[cfg(feature = "native")]
    pub fn store_path(&self) -> PathBuf {
        let root = self
            .store_dir
            .clone()
            .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")));
        root.join(&self.app).join("store.json")
    }
}

fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = env(key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable config value");
            None
        }
    }
}
