//! 网元素标识：字符串 id 与确定性的弧 id 生成器.
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

/// Identity of a place, transition or arc. Unique within one [`PetriNet`].
///
/// [`PetriNet`]: crate::net::PetriNet
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct ElementId(String);

impl ElementId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementId")?;
        f.debug_tuple("").field(&self.0).finish()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ElementId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Deref for ElementId {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ElementId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<String> for ElementId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl PartialEq<str> for ElementId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for ElementId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Monotonic counter for arcs synthesised by `connect_*`, scoped to one net.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcIdSequence {
    prefix: String,
    next: u64,
}

impl ArcIdSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// 返回下一个未被 `taken` 占用的 id.
    pub fn next_free(&mut self, taken: impl Fn(&str) -> bool) -> ElementId {
        loop {
            let candidate = format!("{}{}", self.prefix, self.next);
            self.next += 1;
            if !taken(&candidate) {
                return ElementId(candidate);
            }
        }
    }
}

impl Default for ArcIdSequence {
    fn default() -> Self {
        Self::new("arc")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_ids_are_detected() {
        assert!(ElementId::new("").is_blank());
        assert!(ElementId::new("  \t").is_blank());
        assert!(!ElementId::new("p1").is_blank());
    }

    #[test]
    fn sequence_skips_taken_ids() {
        let mut sequence = ArcIdSequence::new("a");
        let first = sequence.next_free(|candidate| candidate == "a0" || candidate == "a1");
        assert_eq!(first, "a2");
        let second = sequence.next_free(|_| false);
        assert_eq!(second, "a3");
    }
}
