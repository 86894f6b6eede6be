//! Formal geometric records
//!
//! Canonical records for collinear and concyclic point sets, plus the
//! order-insensitive keys used by the pair→line and triple→circle indices.
//! Records are replaced, never mutated: a merge builds a fresh record and
//! tombstones the old ones, which keeps structural sharing explicit and the
//! provenance unions append-only.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeSet;

use crate::comb::VarId;
use crate::num::{NumCircle, NumLine};
use crate::proof::ProofId;

/// Index of a point in the engine's point table.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PointId(pub usize);

impl PointId {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Handle to a formal line record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId(pub usize);

/// Handle to a formal circle record.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CircleId(pub usize);

/// Unordered point pair; both orders alias the same key.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PairKey(pub PointId, pub PointId);

impl PairKey {
    pub fn new(a: PointId, b: PointId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }
}

/// Unordered point triple.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TripleKey(pub PointId, pub PointId, pub PointId);

impl TripleKey {
    pub fn new(a: PointId, b: PointId, c: PointId) -> Self {
        let mut t = [a, b, c];
        t.sort();
        Self(t[0], t[1], t[2])
    }
}

/// A maximal known-collinear point set.
///
/// Invariants: `points` is ordered by numeric position along `value`, every
/// member lies on `value` up to tolerance, and every pair drawn from
/// `points` maps to this record in the pair→line index.
#[derive(Debug, Clone)]
pub struct FormalLine {
    pub points: Vec<PointId>,
    pub main_pair: (PointId, PointId),
    /// Direction variable shared by every pair on the line.
    pub dir: VarId,
    pub value: NumLine,
    pub sources: BTreeSet<ProofId>,
}

impl FormalLine {
    pub fn contains(&self, p: PointId) -> bool {
        self.points.contains(&p)
    }

    /// All unordered pairs on the line.
    pub fn pairs(&self) -> impl Iterator<Item = PairKey> + '_ {
        let pts = &self.points;
        pts.iter().enumerate().flat_map(move |(i, &a)| {
            pts[i + 1..].iter().map(move |&b| PairKey::new(a, b))
        })
    }
}

/// A maximal known-concyclic point set, possibly with known centers.
///
/// Invariants: the three `defining` points are numerically non-degenerate,
/// every member of `points` lies on `value` up to tolerance, and every
/// non-collinear triple drawn from `points` maps to this record in the
/// triple→circle index.
#[derive(Debug, Clone)]
pub struct FormalCircle {
    pub defining: [PointId; 3],
    pub points: Vec<PointId>,
    pub centers: Vec<PointId>,
    pub value: NumCircle,
    pub sources: BTreeSet<ProofId>,
}

impl FormalCircle {
    pub fn contains(&self, p: PointId) -> bool {
        self.points.contains(&p)
    }

    /// All unordered triples on the circle.
    pub fn triples(&self) -> impl Iterator<Item = TripleKey> + '_ {
        let pts = &self.points;
        pts.iter().enumerate().flat_map(move |(i, &a)| {
            pts[i + 1..].iter().enumerate().flat_map(move |(j, &b)| {
                pts[i + 1 + j + 1..]
                    .iter()
                    .map(move |&c| TripleKey::new(a, b, c))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::num::NumPoint;

    #[test]
    fn pair_key_is_order_insensitive() {
        assert_eq!(
            PairKey::new(PointId(3), PointId(1)),
            PairKey::new(PointId(1), PointId(3))
        );
    }

    #[test]
    fn triple_key_sorts() {
        let k = TripleKey::new(PointId(5), PointId(0), PointId(2));
        assert_eq!(k, TripleKey(PointId(0), PointId(2), PointId(5)));
    }

    #[test]
    fn line_pairs_enumerates_all() {
        let line = FormalLine {
            points: vec![PointId(0), PointId(1), PointId(2)],
            main_pair: (PointId(0), PointId(2)),
            dir: VarId(0),
            value: NumLine::through(NumPoint::new(0.0, 0.0), NumPoint::new(1.0, 0.0)).unwrap(),
            sources: BTreeSet::new(),
        };
        let pairs: Vec<PairKey> = line.pairs().collect();
        assert_eq!(pairs.len(), 3);
    }

    #[test]
    fn circle_triples_enumerates_all() {
        let circle = FormalCircle {
            defining: [PointId(0), PointId(1), PointId(2)],
            points: vec![PointId(0), PointId(1), PointId(2), PointId(3)],
            centers: vec![],
            value: NumCircle::new(NumPoint::new(0.0, 0.0), 1.0),
            sources: BTreeSet::new(),
        };
        assert_eq!(circle.triples().count(), 4);
    }
}
