//! Engine configuration.

use std::time::Duration;

use super::step::StepDefinition;

/// Default auto-save tick.
pub const DEFAULT_AUTO_SAVE_INTERVAL: Duration = Duration::from_millis(5000);

/// Default number of save retries.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default linear retry step for saves.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1000);

/// Everything needed to build a [`WorkflowEngine`](super::WorkflowEngine).
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// Workflow id; keys persisted state.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Ordered step registry.
    pub steps: Vec<StepDefinition>,
    /// Whether `previous_step` and backward jumps are allowed.
    pub allow_back_navigation: bool,
    /// Whether the auto-save timer runs.
    pub auto_save: bool,
    /// Auto-save tick.
    pub auto_save_interval: Duration,
    /// Save retries before giving up.
    pub max_retries: u32,
    /// Linear step between save retries.
    pub retry_delay: Duration,
}

impl WorkflowConfig {
    /// Config with defaults: back navigation and auto-save on.
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<StepDefinition>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            steps,
            allow_back_navigation: true,
            auto_save: true,
            auto_save_interval: DEFAULT_AUTO_SAVE_INTERVAL,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }

    /// Forbid backward navigation.
    pub fn without_back_navigation(mut self) -> Self {
        self.allow_back_navigation = false;
        self
    }

    /// Enable or disable the auto-save timer.
    pub fn with_auto_save(mut self, enabled: bool) -> Self {
        self.auto_save = enabled;
        self
    }

    /// Set the auto-save tick.
    pub fn with_auto_save_interval(mut self, interval: Duration) -> Self {
        self.auto_save_interval = interval;
        self
    }

    /// Set the save retry policy.
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }
}
