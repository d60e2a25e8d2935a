use core::cmp::Ordering;
use core::fmt;

use serde::{Deserialize, Serialize};

use crate::{Error, NodeId, Result};

/// One counter per node: how many broadcasts of each author are known.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorClock(Vec<u64>);

impl VectorClock {
    pub fn new(n: usize) -> Self {
        Self(vec![0; n])
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, node: NodeId) -> Option<u64> {
        self.0.get(node).copied()
    }

    pub fn increment(&mut self, node: NodeId) -> Result<()> {
        let n = self.0.len();
        let entry = self
            .0
            .get_mut(node)
            .ok_or(Error::UnknownNode { id: node, n })?;
        *entry += 1;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }
}

impl From<Vec<u64>> for VectorClock {
    fn from(entries: Vec<u64>) -> Self {
        Self(entries)
    }
}

impl fmt::Display for VectorClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}

// Componentwise: clocks of different sizes, or that each lead somewhere, are
// incomparable.
impl PartialOrd for VectorClock {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.0.len() != other.0.len() {
            return None;
        }
        let mut ordering = Ordering::Equal;
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            match (ordering, a.cmp(b)) {
                (_, Ordering::Equal) => {}
                (Ordering::Equal, o) => ordering = o,
                (current, o) if current == o => {}
                _ => return None,
            }
        }
        Some(ordering)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    fn clock(entries: &[u64]) -> VectorClock {
        VectorClock::from(entries.to_vec())
    }

    #[test]
    fn test_partial_order() {
        assert!(clock(&[0, 0, 0]) <= clock(&[0, 0, 0]));
        assert!(clock(&[0, 0, 0]) < clock(&[1, 0, 0]));
        assert!(clock(&[1, 0, 0]) <= clock(&[1, 1, 0]));
        assert!(clock(&[1, 2, 0]) > clock(&[1, 1, 0]));

        assert_eq!(clock(&[1, 0, 0]).partial_cmp(&clock(&[0, 1, 0])), None);
        assert!(!(clock(&[1, 0, 0]) <= clock(&[0, 1, 0])));
        assert_eq!(clock(&[0, 0]).partial_cmp(&clock(&[0, 0, 0])), None);
    }

    #[test]
    fn test_increment() -> Result<()> {
        let mut c = VectorClock::new(3);
        c.increment(0)?;
        c.increment(2)?;
        c.increment(2)?;
        assert_eq!(c.as_slice(), &[1, 0, 2]);
        assert_eq!(c.get(2), Some(2));
        assert_eq!(c.get(3), None);
        assert!(matches!(
            c.increment(3),
            Err(Error::UnknownNode { id: 3, n: 3 })
        ));
        Ok(())
    }

    #[quickcheck]
    fn prop_increment_moves_strictly_forward(entries: Vec<u64>, node: usize) -> bool {
        let entries: Vec<u64> = entries.into_iter().map(|e| e % 1000).collect();
        if entries.is_empty() {
            return true;
        }
        let before = VectorClock::from(entries);
        let mut after = before.clone();
        match after.increment(node % before.len()) {
            Ok(()) => before < after && !(after <= before),
            Err(_) => false,
        }
    }
}
