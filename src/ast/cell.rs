//! Cell identifiers and their allocator.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors raised when creating or validating cell identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CellIdError {
    /// The allocator has issued every identifier it can represent.
    #[error("Cell id allocator exhausted after {issued} ids")]
    AllocatorExhausted { issued: u64 },

    /// The supplied identifier is empty or contains whitespace.
    #[error("Invalid cell id: {id:?}")]
    Invalid { id: String },
}

/// Opaque identifier of one cell.
///
/// Ids issued by a [`CellManager`] are bijective base-26 letter strings
/// (`a`..`z`, `aa`, `ab`, ...). They order by length first and then
/// lexicographically, which is exactly creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CellId(String);

impl CellId {
    /// Wrap an existing identifier, rejecting empty or whitespace ids.
    pub fn new(id: impl Into<String>) -> Result<Self, CellIdError> {
        let id = id.into();
        if id.is_empty() || id.chars().any(char::is_whitespace) {
            return Err(CellIdError::Invalid { id });
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Ord for CellId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for CellId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CellId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CellId {
    type Error = CellIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for CellId {
    type Error = CellIdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<CellId> for String {
    fn from(id: CellId) -> Self {
        id.0
    }
}

/// Issues unique, creation-ordered cell ids.
///
/// Deterministic: two managers driven by the same sequence of calls
/// produce identical id streams.
#[derive(Debug, Clone, Default)]
pub struct CellManager {
    issued: u64,
}

impl CellManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next cell id.
    pub fn create_cell_id(&mut self) -> Result<CellId, CellIdError> {
        let next = self
            .issued
            .checked_add(1)
            .ok_or(CellIdError::AllocatorExhausted { issued: self.issued })?;
        self.issued = next;
        Ok(CellId(encode(next)))
    }

    /// Number of ids issued so far.
    pub fn issued(&self) -> u64 {
        self.issued
    }
}

/// Bijective base-26: 1 -> "a", 26 -> "z", 27 -> "aa".
fn encode(mut n: u64) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'a' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8_lossy(&letters).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_encode_boundaries() {
        assert_eq!(encode(1), "a");
        assert_eq!(encode(26), "z");
        assert_eq!(encode(27), "aa");
        assert_eq!(encode(52), "az");
        assert_eq!(encode(53), "ba");
        assert_eq!(encode(702), "zz");
        assert_eq!(encode(703), "aaa");
    }

    #[test]
    fn test_ids_are_distinct_and_increasing() {
        let mut manager = CellManager::new();
        let ids: Vec<CellId> = (0..2000).map(|_| manager.create_cell_id().unwrap()).collect();

        let unique: HashSet<&CellId> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert!(ids.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(manager.issued(), 2000);
    }

    #[test]
    fn test_allocators_are_deterministic() {
        let mut a = CellManager::new();
        let mut b = CellManager::new();
        for _ in 0..100 {
            assert_eq!(a.create_cell_id().unwrap(), b.create_cell_id().unwrap());
        }
    }

    #[test]
    fn test_exhaustion() {
        let mut manager = CellManager { issued: u64::MAX - 1 };
        assert!(manager.create_cell_id().is_ok());
        assert_eq!(
            manager.create_cell_id(),
            Err(CellIdError::AllocatorExhausted { issued: u64::MAX })
        );
    }

    #[test]
    fn test_new_rejects_invalid_ids() {
        assert!(CellId::new("").is_err());
        assert!(CellId::new("a b").is_err());
        assert_eq!(CellId::new("Hbol").unwrap().as_str(), "Hbol");
    }

    #[test]
    fn test_serde_validates() {
        let id: CellId = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(id.to_string(), "abc");
        assert!(serde_json::from_str::<CellId>("\"\"").is_err());
    }
}
