use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Everything the decision engine knows about one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    /// Raw number from the platform. Blank for withheld callers.
    pub caller_number: String,
    pub direction: Direction,
    /// False when the lookup found nothing, failed, or was not permitted.
    pub is_known_contact: bool,
}

impl CallContext {
    pub fn incoming(caller_number: impl Into<String>, is_known_contact: bool) -> Self {
        Self {
            caller_number: caller_number.into(),
            direction: Direction::Incoming,
            is_known_contact,
        }
    }

    pub fn outgoing(caller_number: impl Into<String>) -> Self {
        Self {
            caller_number: caller_number.into(),
            direction: Direction::Outgoing,
            is_known_contact: false,
        }
    }
}

/// A "screen this call" event as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallEvent {
    /// Call handle, usually a `tel:` URI. `None` for withheld numbers.
    pub handle: Option<String>,
    pub direction: Direction,
}

impl CallEvent {
    pub fn incoming(handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            direction: Direction::Incoming,
        }
    }

    pub fn outgoing(handle: impl Into<String>) -> Self {
        Self {
            handle: Some(handle.into()),
            direction: Direction::Outgoing,
        }
    }

    pub fn withheld() -> Self {
        Self {
            handle: None,
            direction: Direction::Incoming,
        }
    }

    /// Scheme-specific part of the handle, or an empty string when absent.
    pub fn caller_number(&self) -> String {
        let handle = match &self.handle {
            Some(handle) => handle.trim(),
            None => return String::new(),
        };

        let number = match handle.split_once(':') {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("tel") => rest,
            _ => handle,
        };

        number.replace("%2B", "+").replace("%2b", "+").trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_number_from_tel_uri() {
        assert_eq!(CallEvent::incoming("tel:+48221234567").caller_number(), "+48221234567");
        assert_eq!(CallEvent::incoming("TEL:%2B44207123456").caller_number(), "+44207123456");
        assert_eq!(CallEvent::incoming(" 5551234567 ").caller_number(), "5551234567");
    }

    #[test]
    fn test_withheld_caller_has_blank_number() {
        assert_eq!(CallEvent::withheld().caller_number(), "");
        assert_eq!(CallEvent::incoming("tel:").caller_number(), "");
    }
}
