use crate::call::{CallContext, CallEvent, Direction};
use crate::call_log_sink::BlockedCallSink;
use crate::components::decision_engine::decide_guarded;
use crate::components::{Decision, Verdict};
use crate::config::ScreeningConfig;
use crate::contacts::ContactDirectory;
use crate::rules::RuleSnapshot;
use crate::storage::{BlockedCallRecord, RuleStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Call disposition handed back to the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallResponse {
    pub disallow_call: bool,
    pub reject_call: bool,
    pub skip_call_log: bool,
    pub skip_notification: bool,
}

impl CallResponse {
    /// Blocked calls are rejected silently but stay in the system call log.
    pub fn for_verdict(verdict: Verdict) -> Self {
        let block = verdict == Verdict::Block;
        Self {
            disallow_call: block,
            reject_call: block,
            skip_call_log: false,
            skip_notification: block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreeningOutcome {
    pub caller_number: String,
    pub direction: Direction,
    pub decision: Decision,
    pub response: CallResponse,
    pub elapsed_ms: u64,
}

/// Turns platform call events into verdicts.
///
/// Gathers the rule snapshot and contact status, runs the decision engine
/// under the screening budget and queues a call-log record for blocked calls.
/// Always answers: every failure resolves to an allow.
#[derive(Clone)]
pub struct ScreeningAdapter {
    rules: Arc<dyn RuleStore>,
    contacts: Arc<dyn ContactDirectory>,
    sink: Arc<dyn BlockedCallSink>,
    budget: Duration,
    contact_timeout: Duration,
    slow_warning: Duration,
}

impl ScreeningAdapter {
    pub fn new(
        rules: Arc<dyn RuleStore>,
        contacts: Arc<dyn ContactDirectory>,
        sink: Arc<dyn BlockedCallSink>,
        config: &ScreeningConfig,
    ) -> Self {
        Self {
            rules,
            contacts,
            sink,
            budget: config.budget(),
            contact_timeout: config.contact_lookup_timeout(),
            slow_warning: config.slow_warning(),
        }
    }

    pub async fn screen(&self, event: &CallEvent) -> ScreeningOutcome {
        let start = Instant::now();
        let number = event.caller_number();
        log::debug!("Screening {:?} call from {:?}", event.direction, number);

        if event.direction == Direction::Outgoing {
            return self.respond(number, event.direction, Decision::allow(), start);
        }

        let mut evaluation = tokio::spawn(self.clone().evaluate(number.clone()));
        let (decision, contact_name) =
            match tokio::time::timeout(self.budget, &mut evaluation).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    log::error!("Screening evaluation failed: {e}");
                    (Decision::internal_error(), None)
                }
                Err(_) => {
                    evaluation.abort();
                    log::warn!(
                        "Screening budget of {}ms exceeded, allowing call",
                        self.budget.as_millis()
                    );
                    (Decision::timed_out(), None)
                }
            };

        let outcome = self.respond(number, event.direction, decision, start);

        if outcome.decision.is_blocked() {
            self.sink.record(BlockedCallRecord::new(
                outcome.caller_number.clone(),
                outcome.decision.reason.matched_reason(),
                contact_name,
            ));
        }

        outcome
    }

    fn respond(
        &self,
        caller_number: String,
        direction: Direction,
        decision: Decision,
        start: Instant,
    ) -> ScreeningOutcome {
        let elapsed = start.elapsed();
        if elapsed > self.slow_warning {
            log::warn!("Slow screening: {}ms", elapsed.as_millis());
        }
        log::info!("Call screened: {decision}");

        ScreeningOutcome {
            caller_number,
            direction,
            response: CallResponse::for_verdict(decision.verdict),
            decision,
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    async fn evaluate(self, number: String) -> (Decision, Option<String>) {
        let (rules, contact_name) =
            tokio::join!(self.fetch_rules(), self.lookup_contact(number.clone()));

        let context = CallContext::incoming(number, contact_name.is_some());
        (decide_guarded(&context, &rules), contact_name)
    }

    /// One consistent snapshot, or the permissive rule set if unreadable.
    async fn fetch_rules(&self) -> RuleSnapshot {
        let store = Arc::clone(&self.rules);
        match tokio::task::spawn_blocking(move || store.snapshot()).await {
            Ok(Ok(rules)) => rules,
            Ok(Err(e)) => {
                log::warn!("Rule store unreadable ({e:#}), screening with no rules");
                RuleSnapshot::permissive()
            }
            Err(e) => {
                log::error!("Rule store read failed: {e}");
                RuleSnapshot::permissive()
            }
        }
    }

    /// Contact display name; `None` on no match, denial, error or timeout.
    async fn lookup_contact(&self, number: String) -> Option<String> {
        if number.trim().is_empty() {
            return None;
        }

        let directory = Arc::clone(&self.contacts);
        let lookup = tokio::task::spawn_blocking(move || directory.lookup(&number));
        match tokio::time::timeout(self.contact_timeout, lookup).await {
            Ok(Ok(Ok(name))) => name,
            Ok(Ok(Err(e))) => {
                log::warn!("Contact lookup failed ({e:#}), treating caller as unknown");
                None
            }
            Ok(Err(e)) => {
                log::error!("Contact lookup task failed: {e}");
                None
            }
            Err(_) => {
                log::warn!(
                    "Contact lookup exceeded {}ms, treating caller as unknown",
                    self.contact_timeout.as_millis()
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::BlockReason;
    use crate::contacts::{Contact, StaticContactDirectory};
    use crate::storage::MemoryRuleStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<BlockedCallRecord>>,
    }

    impl BlockedCallSink for RecordingSink {
        fn record(&self, record: BlockedCallRecord) {
            self.records.lock().unwrap().push(record);
        }
    }

    struct PanickingContacts;

    impl ContactDirectory for PanickingContacts {
        fn lookup(&self, _number: &str) -> anyhow::Result<Option<String>> {
            panic!("contacts provider crashed");
        }
    }

    fn adapter(
        rules: RuleSnapshot,
        contacts: Arc<dyn ContactDirectory>,
    ) -> (ScreeningAdapter, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let adapter = ScreeningAdapter::new(
            Arc::new(MemoryRuleStore::new(rules)),
            contacts,
            sink.clone(),
            &ScreeningConfig::default(),
        );
        (adapter, sink)
    }

    fn alice() -> Arc<dyn ContactDirectory> {
        Arc::new(
            StaticContactDirectory::new(
                vec![Contact {
                    name: "Alice".to_string(),
                    number: "+44 20 7123 456".to_string(),
                }],
                true,
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_call_response_for_verdict() {
        let block = CallResponse::for_verdict(Verdict::Block);
        assert!(block.disallow_call && block.reject_call && block.skip_notification);
        assert!(!block.skip_call_log);

        let allow = CallResponse::for_verdict(Verdict::Allow);
        assert!(!allow.disallow_call && !allow.reject_call && !allow.skip_notification);
    }

    #[tokio::test]
    async fn test_outgoing_allowed_without_logging() {
        let rules = RuleSnapshot {
            block_all: true,
            ..RuleSnapshot::permissive()
        };
        let (adapter, sink) = adapter(rules, alice());

        let outcome = adapter.screen(&CallEvent::outgoing("tel:+48221234567")).await;
        assert_eq!(outcome.decision, Decision::allow());
        assert!(!outcome.response.disallow_call);
        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_block_is_logged_with_contact_name() {
        let rules = RuleSnapshot {
            block_all: true,
            ..RuleSnapshot::permissive()
        };
        let (adapter, sink) = adapter(rules, alice());

        let outcome = adapter.screen(&CallEvent::incoming("tel:+44207123456")).await;
        assert_eq!(outcome.decision, Decision::block(BlockReason::BlockAllActive));
        assert!(outcome.response.reject_call);

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].phone_number, "+44207123456");
        assert_eq!(records[0].matched_reason, "Block All Calls");
        assert_eq!(records[0].contact_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_known_contact_passes_unknown_blocking() {
        let rules = RuleSnapshot {
            block_unknown: true,
            ..RuleSnapshot::permissive()
        };
        let (adapter, sink) = adapter(rules, alice());

        let outcome = adapter.screen(&CallEvent::incoming("tel:+44207123456")).await;
        assert_eq!(outcome.decision, Decision::allow());

        let outcome = adapter.screen(&CallEvent::incoming("tel:+44207999999")).await;
        assert_eq!(outcome.decision, Decision::block(BlockReason::UnknownCaller));
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_denied_contacts_treated_as_unknown() {
        let rules = RuleSnapshot {
            block_unknown: true,
            ..RuleSnapshot::permissive()
        };
        let denied = Arc::new(StaticContactDirectory::empty(false).unwrap());
        let (adapter, _sink) = adapter(rules, denied);

        let outcome = adapter.screen(&CallEvent::incoming("tel:+15551234567")).await;
        assert_eq!(outcome.decision, Decision::block(BlockReason::UnknownCaller));
    }

    #[tokio::test]
    async fn test_crashing_contacts_treated_as_unknown() {
        let rules = RuleSnapshot {
            blocked_prefixes: vec!["+48".to_string()],
            ..RuleSnapshot::permissive()
        };
        let (adapter, _sink) = adapter(rules, Arc::new(PanickingContacts));

        let outcome = adapter.screen(&CallEvent::incoming("tel:+48221234567")).await;
        assert_eq!(
            outcome.decision,
            Decision::block(BlockReason::PrefixMatch("+48".to_string()))
        );
    }

    #[tokio::test]
    async fn test_withheld_caller_screened() {
        let rules = RuleSnapshot {
            block_unknown: true,
            block_international: true,
            ..RuleSnapshot::permissive()
        };
        let (adapter, sink) = adapter(rules, alice());

        let outcome = adapter.screen(&CallEvent::withheld()).await;
        assert_eq!(outcome.caller_number, "");
        assert_eq!(outcome.decision, Decision::block(BlockReason::UnknownCaller));
        assert_eq!(sink.records.lock().unwrap()[0].phone_number, "");
    }
}
