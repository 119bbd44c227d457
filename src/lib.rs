pub mod call;
pub mod call_log_sink;
pub mod components;
pub mod config;
pub mod contacts;
pub mod rules;
pub mod screening;
pub mod storage;

pub use call::{CallContext, CallEvent, Direction};
pub use call_log_sink::{BlockedCallSink, CallLogSink};
pub use components::decision_engine::{decide, decide_guarded};
pub use components::{BlockReason, Decision, Verdict};
pub use config::Config;
pub use contacts::{ContactDirectory, StaticContactDirectory};
pub use rules::{BlockedPrefix, RuleError, RuleSnapshot};
pub use screening::{CallResponse, ScreeningAdapter, ScreeningOutcome};
pub use storage::{BlockedCallRecord, CallLogStore, MemoryRuleStore, RuleStore, SqliteRuleStore};
