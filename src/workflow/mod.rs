//! Multi-step workflow engine.
//!
//! A workflow is an ordered [`StepRegistry`] walked by a [`WorkflowEngine`].
//! The engine gates transitions on validators and dependencies, notifies
//! listeners of every state change and keeps the state persisted through a
//! [`PersistenceAdapter`](crate::storage::PersistenceAdapter).
//!
//! ## Example
//!
//! ```no_run
//! use stepwise::workflow::{StepDefinition, WorkflowConfig, WorkflowEngine};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = WorkflowConfig::new(
//!     "onboarding",
//!     "Onboarding",
//!     vec![
//!         StepDefinition::new("profile", "Profile"),
//!         StepDefinition::new("review", "Review").depends_on(["profile"]),
//!     ],
//! );
//! let mut engine = WorkflowEngine::builder(config).build().await?;
//! engine.next_step();
//! engine.destroy().await;
//! # Ok(())
//! # }
//! ```

mod autosave;
mod config;
mod definition;
mod engine;
mod events;
mod state;
mod step;

pub use autosave::AutoSaveScheduler;
pub use config::{
    WorkflowConfig, DEFAULT_AUTO_SAVE_INTERVAL, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY,
};
pub use definition::{parse_definition, parse_definition_str, StepSpec, WorkflowDefinition};
pub use engine::{
    step_data, EngineBuilder, WorkflowEngine, DATA_FIELD, DEPENDENCIES_FIELD, NAVIGATION_FIELD,
};
pub use events::{Direction, EventBus, EventKind, EventMetadata, ListenerId, WorkflowEvent};
pub use state::{progress_percent, InitialState, WorkflowState, STATE_VERSION};
pub use step::{FieldMessages, StepData, StepDefinition, StepRegistry, ValidationResult, Validator};
