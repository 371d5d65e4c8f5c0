pub mod guard;
pub mod machine;
pub mod store;

pub use guard::{DirtyTreeRecord, GuardRuntimeState};
pub use machine::{HookEvent, HookState, HookStateMachine};
pub use store::{GitConfigStore, GuardStateStore, MemoryStateStore};
