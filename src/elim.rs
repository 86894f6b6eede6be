//! Linear elimination cores
//!
//! One [`ElimCore`] per symbolic system, maintaining a reduced row-echelon
//! set of defining equations over [`LinComb`]s with exact rational
//! arithmetic. `force_zero` asserts an equation, `simplify` reduces a comb
//! against the current pivot set, and every accepted equation is
//! sanity-checked against the numeric oracle before it is allowed in.
//!
//! ## Invariants
//! - Each pivot has coefficient one in its own defining comb and appears in
//!   no other defining comb (full RREF, restored by back-substitution).
//! - The numeric value of every stored defining comb is below [`ATOM`]
//!   (mod 1 for the angle system).
//! - Pivot choice is the newest variable in the reduced comb, so lower-index
//!   pivots stay irreducible and runs are reproducible.
//!
//! The three domain facades fix semantics: [`ElimAngle`] works mod 1 (a unit
//! is a half-turn), [`ElimDistMul`] works in log-space with one constant
//! variable per prime, [`ElimDistAdd`] works over signed segment lengths.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::{BTreeMap, BTreeSet};

use num_bigint::BigInt;
use num_traits::{One, Signed, ToPrimitive, Zero};
use rustc_hash::FxHashMap;

use crate::comb::{LinComb, VarId};
use crate::num::{dist_mod1, ATOM};
use crate::proof::ProofId;
use crate::Rat;

/// Errors surfaced by the elimination cores.
#[derive(Debug, thiserror::Error)]
pub enum ElimError {
    #[error("numeric inconsistency in the {system} system: `{equation} = 0` evaluates to {value}")]
    NumericInconsistency {
        system: &'static str,
        equation: String,
        value: f64,
    },
    #[error("ratio constant {0} is not a positive rational")]
    BadRatioConstant(Rat),
}

#[derive(Debug, Clone)]
struct VarInfo {
    name: String,
    value: f64,
    encountered: bool,
    is_const: bool,
}

/// Gauss–Jordan state over exact rational linear combinations.
#[derive(Debug)]
pub struct ElimCore {
    system: &'static str,
    vars: Vec<VarInfo>,
    pivots: Vec<VarId>,
    defs: FxHashMap<VarId, LinComb>,
    unit: VarId,
    modulo: bool,
}

impl ElimCore {
    /// A fresh core. `modulo` selects mod-1 semantics (the angle system).
    pub fn new(system: &'static str, modulo: bool) -> Self {
        let mut core = Self {
            system,
            vars: Vec::new(),
            pivots: Vec::new(),
            defs: FxHashMap::default(),
            unit: VarId(0),
            modulo,
        };
        core.unit = core.new_const_var(1.0, "1");
        core
    }

    /// Create a fresh basis variable carrying its numeric oracle value.
    pub fn new_var(&mut self, value: f64, name: impl Into<String>) -> VarId {
        let id = VarId(self.vars.len());
        self.vars.push(VarInfo {
            name: name.into(),
            value,
            encountered: false,
            is_const: false,
        });
        id
    }

    /// Create a constant variable: never chosen as a pivot.
    pub fn new_const_var(&mut self, value: f64, name: impl Into<String>) -> VarId {
        let id = self.new_var(value, name);
        self.vars[id.as_usize()].is_const = true;
        id
    }

    /// The constant-one variable of this system.
    pub fn unit(&self) -> VarId {
        self.unit
    }

    /// `(p/q) · unit`.
    pub fn const_frac(&self, x: Rat) -> LinComb {
        LinComb::term(self.unit, x)
    }

    /// Whether the comb mentions only constant variables.
    pub fn is_constant(&self, c: &LinComb) -> bool {
        c.iter().all(|(v, _)| self.vars[v.as_usize()].is_const)
    }

    /// Whether `v` has ever been touched by a forced equation.
    pub fn encountered(&self, v: VarId) -> bool {
        self.vars[v.as_usize()].encountered
    }

    pub fn var_name(&self, v: VarId) -> &str {
        &self.vars[v.as_usize()].name
    }

    pub fn var_value(&self, v: VarId) -> f64 {
        self.vars[v.as_usize()].value
    }

    /// Numeric oracle value of a comb.
    pub fn value_of(&self, c: &LinComb) -> f64 {
        c.numeric_value(|v| self.vars[v.as_usize()].value)
    }

    /// Residual magnitude of `c = 0` under the oracle (mod 1 if applicable).
    pub fn numeric_residual(&self, c: &LinComb) -> f64 {
        let v = self.value_of(c);
        if self.modulo {
            dist_mod1(v)
        } else {
            v.abs()
        }
    }

    /// Render a comb with this core's variable names.
    pub fn render(&self, c: &LinComb) -> String {
        c.render(|v| self.vars[v.as_usize()].name.clone())
    }

    /// Live pivot variables in creation order.
    pub fn pivots(&self) -> &[VarId] {
        &self.pivots
    }

    /// The defining comb of a pivot, if `v` is one.
    pub fn defining(&self, v: VarId) -> Option<&LinComb> {
        self.defs.get(&v)
    }

    /// Canonical class representative: in the mod-1 system the unit
    /// coefficient is folded into `[0, 1)`. Stored defining combs are kept
    /// *value-exact* instead (their oracle value is ≈ 0 absolutely, not just
    /// mod 1), so fractional back-substitution coefficients stay sound; this
    /// folding is applied only where combs are compared or hashed.
    pub fn canon(&self, c: LinComb) -> LinComb {
        self.post_reduce(c)
    }

    /// Whether `v` is a constant (unit or prime-log) variable.
    pub fn is_const_var(&self, v: VarId) -> bool {
        self.vars[v.as_usize()].is_const
    }

    /// Split into (non-constant part, constant part).
    pub fn split_const(&self, c: &LinComb) -> (LinComb, LinComb) {
        let mut var_part = LinComb::zero();
        let mut const_part = LinComb::zero();
        for (v, k) in c.iter() {
            if self.vars[v.as_usize()].is_const {
                const_part.add_term(v, k.clone());
            } else {
                var_part.add_term(v, k.clone());
            }
        }
        var_part.extend_sources(c.sources().iter().copied());
        const_part.extend_sources(c.sources().iter().copied());
        (var_part, const_part)
    }

    fn post_reduce(&self, mut c: LinComb) -> LinComb {
        if self.modulo {
            if let Some(k) = c.coeff(self.unit) {
                let frac = k - k.floor();
                c.set_term(self.unit, frac);
            }
        }
        c
    }

    /// Reduce `c` against the pivot set. The result carries the union of the
    /// input's sources and those of every defining comb it was reduced by.
    pub fn simplify(&self, c: &LinComb) -> LinComb {
        let mut out = c.clone();
        let present: Vec<VarId> = out
            .iter()
            .filter(|(v, _)| self.defs.contains_key(v))
            .map(|(v, _)| v)
            .collect();
        for v in present {
            if let Some(k) = out.coeff(v).cloned() {
                // Defining combs are pivot-free apart from v itself, so one
                // subtraction per pivot suffices.
                out = out.minus_scaled(&self.defs[&v], &k);
            }
        }
        out
    }

    /// Whether `c = 0` is already implied (mod 1 where applicable).
    pub fn is_zero(&self, c: &LinComb) -> bool {
        self.canon(self.simplify(c)).is_empty()
    }

    /// Assert `c = 0`. Returns `Ok(true)` when new information was added,
    /// `Ok(false)` when the equation was already implied, and an error when
    /// the assertion contradicts the numeric oracle.
    pub fn force_zero(
        &mut self,
        c: &LinComb,
        causes: &BTreeSet<ProofId>,
    ) -> Result<bool, ElimError> {
        let residual = self.numeric_residual(c);
        if residual >= ATOM {
            return Err(ElimError::NumericInconsistency {
                system: self.system,
                equation: self.render(c),
                value: residual,
            });
        }

        let mut red = self.simplify(c);
        red.extend_sources(causes.iter().copied());
        if self.modulo {
            // Make the representative value-exact: the reduced value is some
            // whole number of turns, and folding it in now means the later
            // division by the pivot coefficient lands on the branch of the
            // mod-1 solution set that the configuration actually realizes.
            let whole = self.value_of(&red).round();
            if whole != 0.0 {
                red.add_term(self.unit, -Rat::from_integer(BigInt::from(whole as i64)));
            }
        }
        if red.is_empty() {
            return Ok(false);
        }

        // Newest non-constant variable becomes the pivot.
        let pivot = red
            .iter()
            .filter(|(v, _)| !self.vars[v.as_usize()].is_const)
            .map(|(v, _)| v)
            .max();
        let pivot = match pivot {
            Some(p) => p,
            None => {
                // A nonzero constant survived reduction: the system is
                // inconsistent regardless of tolerance.
                return Err(ElimError::NumericInconsistency {
                    system: self.system,
                    equation: self.render(&red),
                    value: self.value_of(&red),
                });
            }
        };

        for (v, _) in red.iter() {
            self.vars[v.as_usize()].encountered = true;
        }

        let lead = red.coeff(pivot).cloned().unwrap_or_else(Rat::one);
        let eq = red.scaled(&(Rat::one() / lead));

        // Back-substitute to keep full RREF: no earlier defining comb may
        // mention the new pivot.
        for p in self.pivots.clone() {
            let mentions = self.defs[&p].coeff(pivot).cloned();
            if let Some(k) = mentions {
                let updated = self.defs[&p].minus_scaled(&eq, &k);
                self.defs.insert(p, updated);
            }
        }

        tracing::debug!(
            system = self.system,
            pivot = %self.var_name(pivot),
            equation = %self.render(&eq),
            "new defining equation"
        );
        self.defs.insert(pivot, eq);
        self.pivots.push(pivot);
        Ok(true)
    }
}

// ============================================================================
// Domain facades
// ============================================================================

/// An angle-valued combination: ℚ-linear over direction variables, mod 1.
#[derive(Clone, Debug)]
pub struct Angle(pub LinComb);

/// A log-distance combination: vanishing means the ratio is one.
#[derive(Clone, Debug)]
pub struct DistMul(pub LinComb);

/// A signed-segment combination over ℝ.
#[derive(Clone, Debug)]
pub struct DistAdd(pub LinComb);

/// Directed angles mod 1 (1 = half-turn, ½ = right angle).
#[derive(Debug)]
pub struct ElimAngle {
    pub core: ElimCore,
}

impl ElimAngle {
    pub fn new() -> Self {
        Self {
            core: ElimCore::new("angle", true),
        }
    }

    /// A direction variable for a point pair; `value` in half-turns.
    pub fn new_dir(&mut self, value: f64, name: impl Into<String>) -> VarId {
        self.core.new_var(value, name)
    }

    /// The right-angle constant ½.
    pub fn right_angle(&self) -> Angle {
        Angle(self.core.const_frac(Rat::new(BigInt::one(), BigInt::from(2))))
    }

    /// A constant of `deg` degrees (the unit is 180°).
    pub fn const_degrees(&self, deg: &Rat) -> Angle {
        Angle(self.core.const_frac(deg / Rat::from_integer(BigInt::from(180))))
    }

    pub fn simplify(&self, a: &Angle) -> Angle {
        Angle(self.core.simplify(&a.0))
    }

    pub fn is_zero(&self, a: &Angle) -> bool {
        self.core.is_zero(&a.0)
    }

    pub fn force_zero(&mut self, a: &Angle, causes: &BTreeSet<ProofId>) -> Result<bool, ElimError> {
        self.core.force_zero(&a.0, causes)
    }

    /// If the angle is symbolically constant, its value as a fraction of a
    /// half-turn in `[0, 1)`.
    pub fn as_constant(&self, a: &Angle) -> Option<Rat> {
        let red = self.core.simplify(&a.0);
        if red.is_empty() {
            return Some(Rat::zero());
        }
        if red.len() == 1 {
            if let Some(k) = red.coeff(self.core.unit()) {
                return Some(k - k.floor());
            }
        }
        None
    }
}

/// Multiplicative distances: variables are `log |ab|`, constants are prime
/// logs, `is_one` means the underlying comb vanishes.
#[derive(Debug)]
pub struct ElimDistMul {
    pub core: ElimCore,
    primes: BTreeMap<u64, VarId>,
}

impl ElimDistMul {
    pub fn new() -> Self {
        Self {
            core: ElimCore::new("dist-mul", false),
            primes: BTreeMap::new(),
        }
    }

    /// A log-length variable; `dist` is the oracle distance.
    pub fn new_log(&mut self, dist: f64, name: impl Into<String>) -> VarId {
        self.core.new_var(dist.ln(), name)
    }

    fn log_prime(&mut self, p: u64) -> VarId {
        if let Some(&v) = self.primes.get(&p) {
            return v;
        }
        let v = self
            .core
            .new_const_var((p as f64).ln(), format!("log {p}"));
        self.primes.insert(p, v);
        v
    }

    /// `log (p/q)` as an exact integer combination of prime logs.
    pub fn const_ratio(&mut self, ratio: &Rat) -> Result<DistMul, ElimError> {
        if !ratio.is_positive() {
            return Err(ElimError::BadRatioConstant(ratio.clone()));
        }
        let mut out = LinComb::zero();
        for (n, sign) in [(ratio.numer(), 1i64), (ratio.denom(), -1i64)] {
            let n = n
                .to_u64()
                .ok_or_else(|| ElimError::BadRatioConstant(ratio.clone()))?;
            for (p, e) in factorize(n) {
                let v = self.log_prime(p);
                out.add_term(v, Rat::from_integer(BigInt::from(sign * e as i64)));
            }
        }
        Ok(DistMul(out))
    }

    /// If the comb reduces to an integer combination of prime logs, the
    /// rational it is the log of.
    pub fn as_const_ratio(&self, m: &DistMul) -> Option<Rat> {
        let red = self.core.simplify(&m.0);
        let mut out = Rat::one();
        for (v, c) in red.iter() {
            let p = self
                .primes
                .iter()
                .find(|(_, &pv)| pv == v)
                .map(|(&p, _)| p)?;
            if !c.is_integer() {
                return None;
            }
            let e = c.numer().to_i64()?;
            let base = Rat::from_integer(BigInt::from(p));
            let mut acc = Rat::one();
            for _ in 0..e.unsigned_abs() {
                acc *= base.clone();
            }
            if e < 0 {
                acc = Rat::one() / acc;
            }
            out *= acc;
        }
        Some(out)
    }

    pub fn simplify(&self, m: &DistMul) -> DistMul {
        DistMul(self.core.simplify(&m.0))
    }

    pub fn is_one(&self, m: &DistMul) -> bool {
        self.core.is_zero(&m.0)
    }

    /// Assert the multiplicatively-interpreted comb equals one.
    pub fn force_one(&mut self, m: &DistMul, causes: &BTreeSet<ProofId>) -> Result<bool, ElimError> {
        self.core.force_zero(&m.0, causes)
    }
}

/// Signed segment lengths along oriented lines.
#[derive(Debug)]
pub struct ElimDistAdd {
    pub core: ElimCore,
}

impl ElimDistAdd {
    pub fn new() -> Self {
        Self {
            core: ElimCore::new("dist-add", false),
        }
    }

    pub fn new_len(&mut self, dist: f64, name: impl Into<String>) -> VarId {
        self.core.new_var(dist, name)
    }

    pub fn const_frac(&self, x: Rat) -> DistAdd {
        DistAdd(self.core.const_frac(x))
    }

    pub fn simplify(&self, a: &DistAdd) -> DistAdd {
        DistAdd(self.core.simplify(&a.0))
    }

    pub fn is_zero(&self, a: &DistAdd) -> bool {
        self.core.is_zero(&a.0)
    }

    pub fn force_zero(&mut self, a: &DistAdd, causes: &BTreeSet<ProofId>) -> Result<bool, ElimError> {
        self.core.force_zero(&a.0, causes)
    }
}

/// Trial-division factorization; inputs are predicate constants, so small.
fn factorize(mut n: u64) -> Vec<(u64, u32)> {
    let mut out = Vec::new();
    let mut p = 2u64;
    while p * p <= n {
        if n % p == 0 {
            let mut e = 0u32;
            while n % p == 0 {
                n /= p;
                e += 1;
            }
            out.push((p, e));
        }
        p += if p == 2 { 1 } else { 2 };
    }
    if n > 1 {
        out.push((n, 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: i64, d: i64) -> Rat {
        Rat::new(n.into(), d.into())
    }

    fn no_cause() -> BTreeSet<ProofId> {
        BTreeSet::new()
    }

    #[test]
    fn force_then_implied() {
        let mut core = ElimCore::new("dist-add", false);
        let x = core.new_var(2.0, "x");
        let y = core.new_var(2.0, "y");
        let c = &LinComb::var(x) - &LinComb::var(y);
        assert!(core.force_zero(&c, &no_cause()).unwrap());
        assert!(core.is_zero(&c));
        // Redundant re-assertion adds nothing.
        assert!(!core.force_zero(&c, &no_cause()).unwrap());
    }

    #[test]
    fn rref_invariant_after_back_substitution() {
        let mut core = ElimCore::new("dist-add", false);
        let x = core.new_var(1.0, "x");
        let y = core.new_var(1.0, "y");
        let z = core.new_var(1.0, "z");
        core.force_zero(&(&LinComb::var(x) - &LinComb::var(z)), &no_cause())
            .unwrap();
        core.force_zero(&(&LinComb::var(y) - &LinComb::var(x)), &no_cause())
            .unwrap();
        // Every pivot: coefficient one in its own comb, absent elsewhere.
        for &p in core.pivots() {
            assert_eq!(core.defining(p).unwrap().coeff(p), Some(&r(1, 1)));
            for &q in core.pivots() {
                if p != q {
                    assert!(!core.defining(q).unwrap().contains(p));
                }
            }
        }
        // Transitivity falls out of reduction.
        assert!(core.is_zero(&(&LinComb::var(z) - &LinComb::var(y))));
    }

    #[test]
    fn stored_defs_agree_with_oracle() {
        let mut core = ElimCore::new("dist-add", false);
        let x = core.new_var(3.0, "x");
        let y = core.new_var(1.0, "y");
        let mut c = LinComb::var(x);
        c.add_term(y, r(-3, 1));
        core.force_zero(&c, &no_cause()).unwrap();
        for &p in core.pivots() {
            assert!(core.numeric_residual(core.defining(p).unwrap()) < ATOM);
        }
    }

    #[test]
    fn numeric_inconsistency_is_fatal() {
        let mut core = ElimCore::new("dist-add", false);
        let x = core.new_var(2.0, "x");
        let y = core.new_var(5.0, "y");
        let c = &LinComb::var(x) - &LinComb::var(y);
        assert!(core.force_zero(&c, &no_cause()).is_err());
    }

    #[test]
    fn angle_constants_reduce_mod_one() {
        let mut angles = ElimAngle::new();
        let a = angles.new_dir(0.25, "d(a,b)");
        let b = angles.new_dir(0.75, "d(c,d)");
        // a − b + ½ ≡ 0 (mod 1): numerically 0.25 − 0.75 + 0.5 = 0.
        let mut plus = &LinComb::var(a) - &LinComb::var(b);
        plus.add_term(angles.core.unit(), r(1, 2));
        assert!(angles.force_zero(&Angle(plus), &no_cause()).unwrap());
        // The same fact phrased a full turn away is already implied.
        let mut minus = &LinComb::var(a) - &LinComb::var(b);
        minus.add_term(angles.core.unit(), r(-1, 2));
        assert!(angles.is_zero(&Angle(minus)));
    }

    #[test]
    fn angle_as_constant() {
        let mut angles = ElimAngle::new();
        let a = angles.new_dir(0.25, "d(a,b)");
        let b = angles.new_dir(0.75, "d(c,d)");
        let mut c = &LinComb::var(a) - &LinComb::var(b);
        c.add_term(angles.core.unit(), r(1, 2));
        angles.force_zero(&Angle(c), &no_cause()).unwrap();
        let diff = Angle(&LinComb::var(a) - &LinComb::var(b));
        assert_eq!(angles.as_constant(&diff), Some(r(1, 2)));
        let free = Angle(LinComb::var(a));
        assert_eq!(angles.as_constant(&free), None);
    }

    #[test]
    fn prime_logs_compose() {
        let mut mul = ElimDistMul::new();
        let four = mul.const_ratio(&r(4, 1)).unwrap();
        let two = mul.const_ratio(&r(2, 1)).unwrap();
        assert_eq!(four.0.key(), two.0.scaled(&r(2, 1)).key());
        assert_eq!(mul.as_const_ratio(&four), Some(r(4, 1)));
        let half = mul.const_ratio(&r(1, 2)).unwrap();
        assert_eq!(mul.as_const_ratio(&half), Some(r(1, 2)));
    }

    #[test]
    fn force_one_certifies_ratio() {
        let mut mul = ElimDistMul::new();
        let ab = mul.new_log(2.0, "l(a,b)");
        let cd = mul.new_log(1.0, "l(c,d)");
        // |ab| / |cd| = 2.
        let ratio = mul.const_ratio(&r(2, 1)).unwrap();
        let c = &(&LinComb::var(ab) - &LinComb::var(cd)) - &ratio.0;
        assert!(mul.force_one(&DistMul(c), &no_cause()).unwrap());
        // |ab|² / |cd|² = 4 follows linearly.
        let mut sq = LinComb::term(ab, r(2, 1));
        sq.add_term(cd, r(-2, 1));
        let four = mul.const_ratio(&r(4, 1)).unwrap();
        assert!(mul.is_one(&DistMul(&sq - &four.0)));
    }

    #[test]
    fn sources_flow_through_reduction() {
        let mut core = ElimCore::new("dist-add", false);
        let x = core.new_var(1.0, "x");
        let y = core.new_var(1.0, "y");
        let cause = BTreeSet::from([ProofId(11)]);
        core.force_zero(&(&LinComb::var(x) - &LinComb::var(y)), &cause)
            .unwrap();
        let red = core.simplify(&LinComb::var(y));
        assert!(red.sources().contains(&ProofId(11)));
    }

    #[test]
    fn encountered_marks_touched_variables() {
        let mut core = ElimCore::new("dist-add", false);
        let x = core.new_var(1.0, "x");
        let y = core.new_var(1.0, "y");
        let z = core.new_var(9.0, "z");
        assert!(!core.encountered(x));
        core.force_zero(&(&LinComb::var(x) - &LinComb::var(y)), &no_cause())
            .unwrap();
        assert!(core.encountered(x) && core.encountered(y));
        assert!(!core.encountered(z));
    }
}
