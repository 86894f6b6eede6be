//! Exact linear combinations over named variables
//!
//! [`LinComb`] is the currency of the three elimination systems: a sparse map
//! from variable id to a nonzero `BigRational` coefficient, plus the set of
//! proof nodes witnessing every reduction that produced it. Term storage is a
//! `BTreeMap` keyed by creation order, so iteration, normalization and the
//! derived hash key are deterministic across runs.
//!
//! Invariant: no stored coefficient is zero. Every mutating operation
//! re-establishes this.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, Neg, Sub};

use num_traits::{One, Signed, Zero};

use crate::proof::ProofId;
use crate::Rat;

/// Index of a symbolic variable inside its owning elimination core.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub usize);

impl VarId {
    /// Access the underlying index.
    #[inline]
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Canonical hashable form of a combination's coefficients.
///
/// Sources are deliberately excluded: two combinations derived along
/// different routes but equal as equations must collide in the similarity
/// tables.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CombKey(pub Vec<(VarId, Rat)>);

/// A rational linear combination of variables with provenance.
#[derive(Clone, Debug, Default)]
pub struct LinComb {
    terms: BTreeMap<VarId, Rat>,
    sources: BTreeSet<ProofId>,
}

impl LinComb {
    /// The empty combination (the equation `0 = 0`).
    pub fn zero() -> Self {
        Self::default()
    }

    /// A single term `c · v`. The zero coefficient yields the empty comb.
    pub fn term(v: VarId, c: Rat) -> Self {
        let mut out = Self::zero();
        out.add_term(v, c);
        out
    }

    /// The variable `v` with coefficient one.
    pub fn var(v: VarId) -> Self {
        Self::term(v, Rat::one())
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn coeff(&self, v: VarId) -> Option<&Rat> {
        self.terms.get(&v)
    }

    pub fn contains(&self, v: VarId) -> bool {
        self.terms.contains_key(&v)
    }

    /// Iterate terms in variable-creation order.
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &Rat)> {
        self.terms.iter().map(|(v, c)| (*v, c))
    }

    /// The term with the largest variable id, if any.
    pub fn leading(&self) -> Option<(VarId, &Rat)> {
        self.terms.iter().next_back().map(|(v, c)| (*v, c))
    }

    /// Add `c · v` in place, dropping the term if the sum cancels.
    pub fn add_term(&mut self, v: VarId, c: Rat) {
        if c.is_zero() {
            return;
        }
        match self.terms.get_mut(&v) {
            Some(cur) => {
                *cur += c;
                if cur.is_zero() {
                    self.terms.remove(&v);
                }
            }
            None => {
                self.terms.insert(v, c);
            }
        }
    }

    /// Overwrite the coefficient of `v` (used by mod-1 constant reduction).
    pub fn set_term(&mut self, v: VarId, c: Rat) {
        if c.is_zero() {
            self.terms.remove(&v);
        } else {
            self.terms.insert(v, c);
        }
    }

    /// Multiply every coefficient by `c`.
    pub fn scaled(&self, c: &Rat) -> Self {
        if c.is_zero() {
            let mut out = Self::zero();
            out.sources = self.sources.clone();
            return out;
        }
        Self {
            terms: self.terms.iter().map(|(v, k)| (*v, k * c)).collect(),
            sources: self.sources.clone(),
        }
    }

    /// `self − c · other`, the elementary reduction step.
    pub fn minus_scaled(&self, other: &Self, c: &Rat) -> Self {
        let mut out = self.clone();
        for (v, k) in other.iter() {
            out.add_term(v, -(k * c));
        }
        out.absorb_sources(other);
        out
    }

    /// Normalize by the leading coefficient: returns the comb with leading
    /// coefficient one, together with the coefficient divided out. `None`
    /// for the empty comb.
    pub fn normalized(&self) -> Option<(Self, Rat)> {
        let (_, lead) = self.leading()?;
        let lead = lead.clone();
        Some((self.scaled(&(Rat::one() / &lead)), lead))
    }

    /// Substitute the numeric value of each variable and sum.
    pub fn numeric_value(&self, value_of: impl Fn(VarId) -> f64) -> f64 {
        self.iter()
            .map(|(v, c)| rat_to_f64(c) * value_of(v))
            .sum()
    }

    /// The proof nodes witnessing this combination.
    pub fn sources(&self) -> &BTreeSet<ProofId> {
        &self.sources
    }

    pub fn add_source(&mut self, s: ProofId) {
        self.sources.insert(s);
    }

    /// Union the other comb's sources into this one.
    pub fn absorb_sources(&mut self, other: &Self) {
        self.sources.extend(other.sources.iter().copied());
    }

    pub fn extend_sources(&mut self, it: impl IntoIterator<Item = ProofId>) {
        self.sources.extend(it);
    }

    /// Canonical hashable form of the coefficients (sources excluded).
    pub fn key(&self) -> CombKey {
        CombKey(self.terms.iter().map(|(v, c)| (*v, c.clone())).collect())
    }

    /// Render with caller-supplied variable names, for statements and traces.
    pub fn render(&self, name_of: impl Fn(VarId) -> String) -> String {
        if self.is_empty() {
            return "0".to_string();
        }
        let mut out = String::new();
        for (i, (v, c)) in self.iter().enumerate() {
            let mag = c.abs();
            let sign = if c.is_negative() {
                if i == 0 {
                    "-"
                } else {
                    " - "
                }
            } else if i == 0 {
                ""
            } else {
                " + "
            };
            out.push_str(sign);
            if !mag.is_one() {
                out.push_str(&format!("{mag}·"));
            }
            out.push_str(&name_of(v));
        }
        out
    }
}

impl Add<&LinComb> for &LinComb {
    type Output = LinComb;
    fn add(self, rhs: &LinComb) -> LinComb {
        let mut out = self.clone();
        for (v, c) in rhs.iter() {
            out.add_term(v, c.clone());
        }
        out.absorb_sources(rhs);
        out
    }
}

impl Sub<&LinComb> for &LinComb {
    type Output = LinComb;
    fn sub(self, rhs: &LinComb) -> LinComb {
        let mut out = self.clone();
        for (v, c) in rhs.iter() {
            out.add_term(v, -c.clone());
        }
        out.absorb_sources(rhs);
        out
    }
}

impl Neg for &LinComb {
    type Output = LinComb;
    fn neg(self) -> LinComb {
        LinComb {
            terms: self.terms.iter().map(|(v, c)| (*v, -c.clone())).collect(),
            sources: self.sources.clone(),
        }
    }
}

/// Exact-to-float conversion for the numeric consistency checks.
pub fn rat_to_f64(r: &Rat) -> f64 {
    use num_traits::ToPrimitive;
    r.to_f64().unwrap_or_else(|| {
        let n = r.numer().to_f64().unwrap_or(f64::INFINITY);
        let d = r.denom().to_f64().unwrap_or(f64::INFINITY);
        n / d
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rat {
        Rat::new(n.into(), d.into())
    }

    #[test]
    fn add_cancels_to_empty() {
        let a = LinComb::term(VarId(0), r(2, 3));
        let b = LinComb::term(VarId(0), r(-2, 3));
        assert!((&a + &b).is_empty());
    }

    #[test]
    fn minus_scaled_eliminates_a_variable() {
        // a = 2x + y, b = x + 3z; a − 2·b = y − 6z.
        let mut a = LinComb::term(VarId(0), r(2, 1));
        a.add_term(VarId(1), r(1, 1));
        let mut b = LinComb::term(VarId(0), r(1, 1));
        b.add_term(VarId(2), r(3, 1));
        let out = a.minus_scaled(&b, &r(2, 1));
        assert!(!out.contains(VarId(0)));
        assert_eq!(out.coeff(VarId(1)), Some(&r(1, 1)));
        assert_eq!(out.coeff(VarId(2)), Some(&r(-6, 1)));
    }

    #[test]
    fn normalized_leading_coefficient_is_one() {
        let mut a = LinComb::term(VarId(3), r(4, 1));
        a.add_term(VarId(1), r(2, 1));
        let (n, lead) = a.normalized().unwrap();
        assert_eq!(lead, r(4, 1));
        assert_eq!(n.coeff(VarId(3)), Some(&r(1, 1)));
        assert_eq!(n.coeff(VarId(1)), Some(&r(1, 2)));
    }

    #[test]
    fn keys_ignore_sources() {
        let mut a = LinComb::term(VarId(0), r(1, 2));
        let b = LinComb::term(VarId(0), r(1, 2));
        a.add_source(ProofId(7));
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn sources_accumulate_through_ops() {
        let mut a = LinComb::term(VarId(0), r(1, 1));
        a.add_source(ProofId(1));
        let mut b = LinComb::term(VarId(1), r(1, 1));
        b.add_source(ProofId(2));
        let c = &a + &b;
        assert!(c.sources().contains(&ProofId(1)));
        assert!(c.sources().contains(&ProofId(2)));
    }
}
