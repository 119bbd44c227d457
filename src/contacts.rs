use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Shortest trailing digit run two differently formatted numbers must share.
const MIN_MATCH_DIGITS: usize = 7;

#[derive(Debug, Error)]
pub enum ContactError {
    #[error("contacts permission denied")]
    PermissionDenied,
}

/// Answers "is this number one of the user's contacts?".
///
/// Implementations may block; the screening adapter runs them off the async
/// runtime and under their own timeout. Any error is treated as "not a contact".
pub trait ContactDirectory: Send + Sync {
    /// Display name of the matching contact, or `None` when there is no match.
    fn lookup(&self, number: &str) -> Result<Option<String>>;
}

/// Used when no contact source is available: nobody is a known contact.
pub struct NoContacts;

impl ContactDirectory for NoContacts {
    fn lookup(&self, _number: &str) -> Result<Option<String>> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub number: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContactsFile {
    #[serde(default)]
    contacts: Vec<Contact>,
}

/// Contact list held in memory, loadable from a YAML file.
pub struct StaticContactDirectory {
    contacts: Vec<(String, String)>,
    permission_granted: bool,
    non_digits: Regex,
}

impl StaticContactDirectory {
    pub fn new(contacts: Vec<Contact>, permission_granted: bool) -> Result<Self> {
        let non_digits = Regex::new(r"[^0-9]")?;
        let contacts = contacts
            .into_iter()
            .map(|c| (non_digits.replace_all(&c.number, "").into_owned(), c.name))
            .filter(|(digits, _)| !digits.is_empty())
            .collect();

        Ok(Self {
            contacts,
            permission_granted,
            non_digits,
        })
    }

    pub fn empty(permission_granted: bool) -> Result<Self> {
        Self::new(Vec::new(), permission_granted)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, permission_granted: bool) -> Result<Self> {
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!("Failed to read contacts file: {}", path.as_ref().display())
        })?;
        let file: ContactsFile = serde_yaml::from_str(&content).with_context(|| {
            format!("Failed to parse contacts file: {}", path.as_ref().display())
        })?;

        log::info!(
            "Loaded {} contacts from {}",
            file.contacts.len(),
            path.as_ref().display()
        );
        Self::new(file.contacts, permission_granted)
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Loose comparison: equal digits, or one ends with the other and the
    /// shorter still carries enough digits to identify a subscriber.
    fn numbers_match(a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
        short.len() >= MIN_MATCH_DIGITS && long.ends_with(short)
    }
}

impl ContactDirectory for StaticContactDirectory {
    fn lookup(&self, number: &str) -> Result<Option<String>> {
        if !self.permission_granted {
            return Err(ContactError::PermissionDenied.into());
        }

        let digits = self.non_digits.replace_all(number, "");
        if digits.is_empty() {
            return Ok(None);
        }

        Ok(self
            .contacts
            .iter()
            .find(|(contact_digits, _)| Self::numbers_match(contact_digits, &digits))
            .map(|(_, name)| name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> StaticContactDirectory {
        StaticContactDirectory::new(
            vec![
                Contact {
                    name: "Alice".to_string(),
                    number: "+1 (555) 123-4567".to_string(),
                },
                Contact {
                    name: "Office".to_string(),
                    number: "+44 20 7123 456".to_string(),
                },
                Contact {
                    name: "Nobody".to_string(),
                    number: "n/a".to_string(),
                },
            ],
            true,
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_ignores_formatting() {
        let dir = directory();
        assert_eq!(dir.lookup("+15551234567").unwrap(), Some("Alice".to_string()));
        assert_eq!(dir.lookup("555-123-4567").unwrap(), Some("Alice".to_string()));
        assert_eq!(dir.lookup("+44207123456").unwrap(), Some("Office".to_string()));
    }

    #[test]
    fn test_lookup_misses() {
        let dir = directory();
        assert_eq!(dir.lookup("+48221234567").unwrap(), None);
        // Too few digits to match on the tail alone
        assert_eq!(dir.lookup("4567").unwrap(), None);
        assert_eq!(dir.lookup("").unwrap(), None);
        assert_eq!(dir.lookup("anonymous").unwrap(), None);
    }

    #[test]
    fn test_contacts_without_digits_are_skipped() {
        assert_eq!(directory().len(), 2);
    }

    #[test]
    fn test_permission_denied_is_an_error() {
        let dir = StaticContactDirectory::empty(false).unwrap();
        let err = dir.lookup("+15551234567").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ContactError>(),
            Some(ContactError::PermissionDenied)
        ));
    }

    #[test]
    fn test_no_contacts_knows_nobody() {
        assert_eq!(NoContacts.lookup("+15551234567").unwrap(), None);
    }

    #[test]
    fn test_missing_contacts_file_is_an_error() {
        assert!(StaticContactDirectory::from_file("/nonexistent/contacts.yaml", true).is_err());
    }

    #[test]
    fn test_parse_contacts_yaml() {
        let yaml = r#"
contacts:
  - name: Alice
    number: "+1 555 123 4567"
  - name: Bob
    number: "+48 22 123 45 67"
"#;
        let file: ContactsFile = serde_yaml::from_str(yaml).unwrap();
        let dir = StaticContactDirectory::new(file.contacts, true).unwrap();
        assert_eq!(dir.len(), 2);
        assert_eq!(dir.lookup("+48221234567").unwrap(), Some("Bob".to_string()));
    }
}
