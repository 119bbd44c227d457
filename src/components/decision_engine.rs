//! Decision Engine Component
//!
//! Pure allow/block evaluation over one call and one rule snapshot. Policies are
//! checked in a fixed precedence order and the first applicable one wins:
//! outgoing → block-all → prefix list → unknown caller → international → allow.

use crate::call::{CallContext, Direction};
use crate::components::{BlockReason, Decision};
use crate::rules::RuleSnapshot;
use std::panic::{self, AssertUnwindSafe};

/// Evaluate a call against the rules. Total: every input yields one decision.
pub fn decide(context: &CallContext, rules: &RuleSnapshot) -> Decision {
    // 1. Outgoing calls are never screened
    if context.direction == Direction::Outgoing {
        return Decision::allow();
    }

    let number = context.caller_number.as_str();
    let withheld = number.trim().is_empty();

    // 2. Block-all dominates everything else
    if rules.block_all {
        return Decision::block(BlockReason::BlockAllActive);
    }

    // 3. Explicit prefixes, first match in stored order
    if !withheld {
        if let Some(prefix) = first_matching_prefix(number, &rules.blocked_prefixes) {
            return Decision::block(BlockReason::PrefixMatch(prefix.to_string()));
        }
    }

    // 4. Unknown callers; a withheld number is never a contact
    if rules.block_unknown && !context.is_known_contact {
        return Decision::block(BlockReason::UnknownCaller);
    }

    // 5. International numbers
    if rules.block_international
        && !withheld
        && is_international(number, rules.home_country_code())
    {
        return Decision::block(BlockReason::International);
    }

    Decision::allow()
}

/// [`decide`] with any fault inside evaluation turned into an allow.
pub fn decide_guarded(context: &CallContext, rules: &RuleSnapshot) -> Decision {
    guard(|| decide(context, rules))
}

pub(crate) fn guard<F>(evaluate: F) -> Decision
where
    F: FnOnce() -> Decision,
{
    match panic::catch_unwind(AssertUnwindSafe(evaluate)) {
        Ok(decision) => decision,
        Err(_) => {
            log::error!("Decision evaluation faulted, allowing call");
            Decision::internal_error()
        }
    }
}

/// First prefix in list order the number starts with. Blank entries never match.
pub fn first_matching_prefix<'a>(number: &str, prefixes: &'a [String]) -> Option<&'a str> {
    prefixes
        .iter()
        .map(String::as_str)
        .filter(|prefix| !prefix.is_empty())
        .find(|prefix| number.starts_with(prefix))
}

/// Only `+`-prefixed numbers can be classified; local formats never are.
pub fn is_international(number: &str, home_country_code: &str) -> bool {
    number.starts_with('+') && !number.starts_with(home_country_code)
}
