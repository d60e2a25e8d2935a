use std::collections::BTreeSet;

use crate::{NodeId, Path};

/// Bitset over node ids.
///
/// Sets are only ever grown, so the last word is non-zero and two equal sets
/// always have equal words, which keeps the derived `Ord` meaningful.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeSet {
    words: Vec<u64>,
}

impl NodeSet {
    pub fn insert(&mut self, node: NodeId) {
        let (word, bit) = (node / 64, node % 64);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << bit;
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.words
            .get(node / 64)
            .map_or(false, |word| word & (1u64 << (node % 64)) != 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    pub fn is_disjoint(&self, other: &NodeSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    pub fn is_subset(&self, other: &NodeSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    pub fn union_with(&mut self, other: &NodeSet) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(other.words.iter()) {
            *a |= b;
        }
    }
}

impl FromIterator<NodeId> for NodeSet {
    fn from_iter<I: IntoIterator<Item = NodeId>>(iter: I) -> Self {
        let mut set = NodeSet::default();
        for node in iter {
            set.insert(node);
        }
        set
    }
}

/// The distinct paths a relay broadcast reached us through.
#[derive(Debug, Clone, Default)]
pub struct PathSet {
    paths: BTreeSet<Path>,
}

impl PathSet {
    /// Returns false if the path was already known.
    pub fn insert(&mut self, path: Path) -> bool {
        self.paths.insert(path)
    }

    /// Forgets every path going through `node`, returning how many were dropped.
    pub fn remove_through(&mut self, node: NodeId) -> usize {
        let before = self.paths.len();
        self.paths.retain(|path| !path.contains(&node));
        before - self.paths.len()
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.paths.iter()
    }

    /// Whether at least `needed` of the known paths are pairwise node-disjoint,
    /// ignoring `author` and `local` which every path shares.
    ///
    /// This is an exact answer over the observed paths, found by backtracking.
    /// Paths are never spliced together: a Byzantine relay can claim any prefix,
    /// so only whole observed paths witness an independent route.
    ///
    /// Each call rebuilds the interiors, which is quadratic in the number of
    /// stored paths. A faulty neighbor can keep that number growing until the
    /// broadcast delivers, since paths are only bounded by the graph.
    pub fn has_disjoint_paths(&self, author: NodeId, local: NodeId, needed: usize) -> bool {
        if needed == 0 {
            return true;
        }
        if self.paths.len() < needed {
            return false;
        }

        let (direct, interiors) = self.interiors(author, local);
        let needed = needed - usize::from(direct);
        needed == 0 || pack(&interiors, 0, &NodeSet::default(), needed)
    }

    /// Size of the largest set of pairwise disjoint paths.
    pub fn max_disjoint_paths(&self, author: NodeId, local: NodeId) -> usize {
        let mut found = 0;
        while found < self.paths.len() && self.has_disjoint_paths(author, local, found + 1) {
            found += 1;
        }
        found
    }

    // Interior node sets, deduplicated and with supersets dropped: a path
    // whose interior contains another path's interior can always be swapped
    // for it. An empty interior (straight from the author) is reported apart
    // since it is disjoint from everything, itself included.
    fn interiors(&self, author: NodeId, local: NodeId) -> (bool, Vec<NodeSet>) {
        let mut direct = false;
        let mut sets: Vec<NodeSet> = Vec::with_capacity(self.paths.len());
        for path in &self.paths {
            let interior: NodeSet = path
                .iter()
                .copied()
                .filter(|n| *n != author && *n != local)
                .collect();
            if interior.is_empty() {
                direct = true;
            } else {
                sets.push(interior);
            }
        }

        sets.sort_by_key(NodeSet::len);
        let mut kept: Vec<NodeSet> = Vec::with_capacity(sets.len());
        for set in sets {
            if !kept.iter().any(|k| k.is_subset(&set)) {
                kept.push(set);
            }
        }
        (direct, kept)
    }
}

fn pack(sets: &[NodeSet], start: usize, used: &NodeSet, needed: usize) -> bool {
    if needed == 0 {
        return true;
    }
    for i in start..sets.len() {
        if sets.len() - i < needed {
            break;
        }
        if sets[i].is_disjoint(used) {
            let mut next = used.clone();
            next.union_with(&sets[i]);
            if pack(sets, i + 1, &next, needed - 1) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    const AUTHOR: NodeId = 0;
    const LOCAL: NodeId = 9;

    fn path_set(paths: &[&[NodeId]]) -> PathSet {
        let mut set = PathSet::default();
        for p in paths {
            set.insert(p.to_vec());
        }
        set
    }

    // Turns arbitrary input into simple paths over relays 1..=8.
    fn simple_paths(raw: Vec<Vec<u8>>) -> Vec<Path> {
        raw.into_iter()
            .take(8)
            .map(|hops| {
                let mut seen = BTreeSet::new();
                let mut path = vec![AUTHOR];
                for h in hops.into_iter().take(4) {
                    let node = (h % 8) as NodeId + 1;
                    if seen.insert(node) {
                        path.push(node);
                    }
                }
                path
            })
            .collect()
    }

    fn brute_force_max(paths: &PathSet) -> usize {
        let interiors: Vec<NodeSet> = paths
            .iter()
            .map(|p| {
                p.iter()
                    .copied()
                    .filter(|n| *n != AUTHOR && *n != LOCAL)
                    .collect()
            })
            .collect();
        let mut best = 0;
        for mask in 0u32..(1 << interiors.len()) {
            let chosen: Vec<&NodeSet> = interiors
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s)
                .collect();
            let pairwise = chosen.iter().enumerate().all(|(i, a)| {
                chosen[i + 1..].iter().all(|b| a.is_disjoint(b))
            });
            if pairwise {
                best = best.max(chosen.len());
            }
        }
        best
    }

    #[test]
    fn test_node_set_operations() {
        let a: NodeSet = [1, 70, 3].into_iter().collect();
        let b: NodeSet = [2, 4].into_iter().collect();
        let c: NodeSet = [1, 3].into_iter().collect();

        assert_eq!(a.len(), 3);
        assert!(a.contains(70) && !a.contains(71));
        assert!(a.is_disjoint(&b));
        assert!(!a.is_disjoint(&c));
        assert!(c.is_subset(&a));
        assert!(!a.is_subset(&c));
        assert!(NodeSet::default().is_subset(&b));

        let mut u = b.clone();
        u.union_with(&a);
        assert_eq!(u.len(), 5);
        assert_eq!(u, [1, 2, 3, 4, 70].into_iter().collect());
    }

    #[test]
    fn test_disjoint_paths_ignore_author_and_local() {
        let paths = path_set(&[&[AUTHOR, 1, 2], &[AUTHOR, 3, 4]]);
        assert!(paths.has_disjoint_paths(AUTHOR, LOCAL, 2));
        assert!(!paths.has_disjoint_paths(AUTHOR, LOCAL, 3));
        assert_eq!(paths.max_disjoint_paths(AUTHOR, LOCAL), 2);
    }

    #[test]
    fn test_shared_relay_counts_once() {
        let paths = path_set(&[&[AUTHOR, 1, 2], &[AUTHOR, 3, 2], &[AUTHOR, 2]]);
        assert_eq!(paths.max_disjoint_paths(AUTHOR, LOCAL), 1);
    }

    #[test]
    fn test_direct_path_counts_once() {
        let paths = path_set(&[&[AUTHOR], &[AUTHOR, 1]]);
        assert_eq!(paths.max_disjoint_paths(AUTHOR, LOCAL), 2);
    }

    #[test]
    fn test_conflicting_short_path_is_skipped() {
        let paths = path_set(&[&[AUTHOR, 2, 3], &[AUTHOR, 1, 2, 5], &[AUTHOR, 3, 4, 6]]);
        assert!(paths.has_disjoint_paths(AUTHOR, LOCAL, 2));
        assert!(!paths.has_disjoint_paths(AUTHOR, LOCAL, 3));
    }

    #[test]
    fn test_greedy_by_length_would_miss_this() {
        // Shortest first takes {1, 2} and is stuck at one path.
        let paths = path_set(&[&[AUTHOR, 1, 2], &[AUTHOR, 1, 3, 4], &[AUTHOR, 2, 5, 6]]);
        assert_eq!(paths.max_disjoint_paths(AUTHOR, LOCAL), 2);
    }

    #[test]
    fn test_paths_through_one_relay_collapse() {
        let mut paths = path_set(&[&[AUTHOR, 5]]);
        for relay in 10..60 {
            paths.insert(vec![AUTHOR, relay, 5]);
        }
        assert_eq!(paths.len(), 51);

        let (direct, interiors) = paths.interiors(AUTHOR, LOCAL);
        assert!(!direct);
        assert_eq!(interiors, vec![[5].into_iter().collect::<NodeSet>()]);
        assert!(!paths.has_disjoint_paths(AUTHOR, LOCAL, 2));
    }

    #[test]
    fn test_remove_through() {
        let mut paths = path_set(&[&[AUTHOR, 1, 2], &[AUTHOR, 3, 4], &[AUTHOR, 2]]);
        assert_eq!(paths.remove_through(2), 2);
        assert_eq!(paths.len(), 1);
        assert_eq!(paths.remove_through(2), 0);
    }

    #[quickcheck]
    fn prop_matches_brute_force(raw: Vec<Vec<u8>>) -> bool {
        let mut paths = PathSet::default();
        for p in simple_paths(raw) {
            paths.insert(p);
        }
        paths.max_disjoint_paths(AUTHOR, LOCAL) == brute_force_max(&paths)
    }

    #[quickcheck]
    fn prop_disjointness_is_monotone(raw: Vec<Vec<u8>>, extra: Vec<Vec<u8>>, needed: u8) -> bool {
        let needed = (needed % 4) as usize + 1;
        let mut paths = PathSet::default();
        for p in simple_paths(raw) {
            paths.insert(p);
        }
        let before = paths.has_disjoint_paths(AUTHOR, LOCAL, needed);
        for p in simple_paths(extra) {
            paths.insert(p);
        }
        !before || paths.has_disjoint_paths(AUTHOR, LOCAL, needed)
    }
}
