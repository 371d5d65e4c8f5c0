pub mod conditions;
pub mod loader;
pub mod policy;
pub mod rules;
pub mod settings;
pub mod types;

pub use conditions::{Condition, Scope};
pub use loader::{RuleFile, RuleLoader};
pub use policy::GatePolicy;
pub use rules::{Consequence, Rule};
pub use settings::{GitTreeLimits, GuardSettings, SchedulerSettings, Settings};
pub use types::{is_severity_at_least, Severity, Stage};
