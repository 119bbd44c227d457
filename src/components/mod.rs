//! Decision types shared by the engine, the screening adapter and the call log.

pub mod decision_engine;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Allow,
    Block,
}

/// Why a verdict was reached. Exactly one accompanies every decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "prefix")]
pub enum BlockReason {
    None,
    BlockAllActive,
    PrefixMatch(String),
    UnknownCaller,
    International,
    /// Fallback allow: the screening deadline elapsed first.
    TimedOut,
    /// Fallback allow: evaluation faulted.
    InternalError,
}

impl BlockReason {
    /// Value stored in the blocked-call log: the prefix itself, or the policy label.
    pub fn matched_reason(&self) -> String {
        match self {
            BlockReason::PrefixMatch(prefix) => prefix.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::None => write!(f, "None"),
            BlockReason::BlockAllActive => write!(f, "Block All Calls"),
            BlockReason::PrefixMatch(prefix) => write!(f, "Prefix {prefix}"),
            BlockReason::UnknownCaller => write!(f, "Unknown Caller"),
            BlockReason::International => write!(f, "International"),
            BlockReason::TimedOut => write!(f, "Timed Out"),
            BlockReason::InternalError => write!(f, "Internal Error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub verdict: Verdict,
    pub reason: BlockReason,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: BlockReason::None,
        }
    }

    pub fn block(reason: BlockReason) -> Self {
        Self {
            verdict: Verdict::Block,
            reason,
        }
    }

    pub fn timed_out() -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: BlockReason::TimedOut,
        }
    }

    pub fn internal_error() -> Self {
        Self {
            verdict: Verdict::Allow,
            reason: BlockReason::InternalError,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.verdict == Verdict::Block
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.verdict, &self.reason) {
            (Verdict::Allow, BlockReason::None) => write!(f, "ALLOW"),
            (Verdict::Allow, reason) => write!(f, "ALLOW ({reason})"),
            (Verdict::Block, reason) => write!(f, "BLOCK ({reason})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matched_reason_keeps_prefix_verbatim() {
        assert_eq!(BlockReason::PrefixMatch("+48".to_string()).matched_reason(), "+48");
        assert_eq!(BlockReason::BlockAllActive.matched_reason(), "Block All Calls");
        assert_eq!(BlockReason::UnknownCaller.matched_reason(), "Unknown Caller");
    }

    #[test]
    fn test_decision_display() {
        assert_eq!(Decision::allow().to_string(), "ALLOW");
        assert_eq!(Decision::timed_out().to_string(), "ALLOW (Timed Out)");
        assert_eq!(
            Decision::block(BlockReason::PrefixMatch("+48".to_string())).to_string(),
            "BLOCK (Prefix +48)"
        );
    }

    #[test]
    fn test_reason_serializes_with_prefix_payload() {
        let json = serde_json::to_string(&BlockReason::PrefixMatch("+48".to_string())).unwrap();
        assert_eq!(json, r#"{"type":"PrefixMatch","prefix":"+48"}"#);

        let json = serde_json::to_string(&BlockReason::International).unwrap();
        assert_eq!(json, r#"{"type":"International"}"#);
    }
}
