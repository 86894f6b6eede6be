//! Engine state and the geometric fact database
//!
//! [`Ddar`] owns every structure the closure mutates: the point table, the
//! three elimination cores, the pair/triple indices, the formal line and
//! circle sets, and the proof arena. The saturation passes live in
//! `saturate`; this module provides construction, predicate translation
//! (`force_pred` / `check_pred`), the three database actions
//! (`force_collinear`, `force_concyclic`, `force_equal_points`), and proof
//! extraction.
//!
//! ## Canonicalization
//! Merged points survive through `point_subst`: every public entry point
//! first replaces each point by its canonical survivor, so stale ids keep
//! working after merges. Pair and triple keys are built from canonical ids
//! only.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeSet;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::comb::{LinComb, VarId};
use crate::elim::{Angle, DistAdd, DistMul, ElimAngle, ElimDistAdd, ElimDistMul};
use crate::geom::{CircleId, FormalCircle, FormalLine, LineId, PairKey, PointId, TripleKey};
use crate::num::{self, close, collinear, distance, NumCircle, NumLine, NumPoint, ATOM};
use crate::pred::{Pred, PredName};
use crate::proof::{ProofForest, ProofId};
use crate::{DdarError, Rat};

/// Result of a `check_pred` query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The predicate is certified by the symbolic state.
    Proved,
    /// The predicate does not follow from the current state.
    Unknown,
    /// For `acompute`: the angle as an exact fraction of a half-turn.
    Value(Rat),
}

#[derive(Debug, Clone)]
struct PointRec {
    name: String,
    pos: NumPoint,
    alive: bool,
}

/// An ordered triangle, the unit of the similarity bookkeeping.
pub type Tri = (PointId, PointId, PointId);

/// The deductive closure engine.
#[derive(Debug)]
pub struct Ddar {
    points: Vec<PointRec>,
    point_subst: Vec<PointId>,
    pub(crate) forest: ProofForest,

    pub(crate) angles: ElimAngle,
    pub(crate) dmul: ElimDistMul,
    pub(crate) dadd: ElimDistAdd,

    pair_to_dir: FxHashMap<PairKey, VarId>,
    pair_to_dist_mul: FxHashMap<PairKey, VarId>,
    pair_to_dist_add: FxHashMap<PairKey, VarId>,

    pair_to_line: FxHashMap<PairKey, LineId>,
    triple_to_circle: FxHashMap<TripleKey, CircleId>,
    lines: Vec<Option<FormalLine>>,
    circles: Vec<Option<FormalCircle>>,

    pub(crate) known_similar: FxHashSet<(Tri, Tri)>,
    pub(crate) dist_mul_cache: FxHashMap<PairKey, DistMul>,
    pub(crate) direction_cache: FxHashMap<PairKey, Angle>,
    /// Two-point equal-distance groups `(center, p, q)`; merge evidence only.
    pub(crate) small_circles: Vec<(PointId, PointId, PointId)>,

    merge_nodes: Vec<ProofId>,
}

impl Ddar {
    /// Build an engine over named points with concrete coordinates.
    ///
    /// Pair variables are created here, once, for every numerically distinct
    /// pair; numerically identical pairs get none and are left to the merge
    /// pass.
    pub fn new(points: Vec<(String, f64, f64)>) -> Result<Self, DdarError> {
        let mut seen: FxHashSet<String> = FxHashSet::default();
        for (name, _, _) in &points {
            if !seen.insert(name.clone()) {
                return Err(DdarError::DuplicateName(name.clone()));
            }
        }
        let recs: Vec<PointRec> = points
            .into_iter()
            .map(|(name, x, y)| PointRec {
                name,
                pos: NumPoint::new(x, y),
                alive: true,
            })
            .collect();
        let n = recs.len();
        let mut engine = Self {
            points: recs,
            point_subst: (0..n).map(PointId).collect(),
            forest: ProofForest::new(),
            angles: ElimAngle::new(),
            dmul: ElimDistMul::new(),
            dadd: ElimDistAdd::new(),
            pair_to_dir: FxHashMap::default(),
            pair_to_dist_mul: FxHashMap::default(),
            pair_to_dist_add: FxHashMap::default(),
            pair_to_line: FxHashMap::default(),
            triple_to_circle: FxHashMap::default(),
            lines: Vec::new(),
            circles: Vec::new(),
            known_similar: FxHashSet::default(),
            dist_mul_cache: FxHashMap::default(),
            direction_cache: FxHashMap::default(),
            small_circles: Vec::new(),
            merge_nodes: Vec::new(),
        };
        for i in 0..n {
            for j in (i + 1)..n {
                let (a, b) = (PointId(i), PointId(j));
                let d = distance(engine.pos(a), engine.pos(b));
                if d < ATOM {
                    continue;
                }
                let key = PairKey::new(a, b);
                let label = format!("{},{}", engine.name(a), engine.name(b));
                let dir = engine
                    .angles
                    .new_dir(num::direction(engine.pos(a), engine.pos(b)), format!("d({label})"));
                let log = engine.dmul.new_log(d, format!("l({label})"));
                let len = engine.dadd.new_len(d, format!("s({label})"));
                engine.pair_to_dir.insert(key, dir);
                engine.pair_to_dist_mul.insert(key, log);
                engine.pair_to_dist_add.insert(key, len);
            }
        }
        Ok(engine)
    }

    // ------------------------------------------------------------------
    // Point bookkeeping
    // ------------------------------------------------------------------

    /// Canonical survivor of `p` under all merges so far.
    pub fn canonical(&self, mut p: PointId) -> PointId {
        while self.point_subst[p.as_usize()] != p {
            p = self.point_subst[p.as_usize()];
        }
        p
    }

    pub fn pos(&self, p: PointId) -> NumPoint {
        self.points[p.as_usize()].pos
    }

    pub fn name(&self, p: PointId) -> &str {
        &self.points[p.as_usize()].name
    }

    /// Live canonical points in creation order.
    pub fn alive_points(&self) -> Vec<PointId> {
        (0..self.points.len())
            .map(PointId)
            .filter(|p| self.points[p.as_usize()].alive)
            .collect()
    }

    /// Look a point up by name (merged names resolve to their survivor).
    pub fn point_by_name(&self, name: &str) -> Option<PointId> {
        (0..self.points.len())
            .map(PointId)
            .find(|&p| self.points[p.as_usize()].name == name)
            .map(|p| self.canonical(p))
    }

    // ------------------------------------------------------------------
    // Pair variables
    // ------------------------------------------------------------------

    pub(crate) fn try_dir_var(&self, a: PointId, b: PointId) -> Option<VarId> {
        self.pair_to_dir
            .get(&PairKey::new(self.canonical(a), self.canonical(b)))
            .copied()
    }

    pub(crate) fn try_mul_var(&self, a: PointId, b: PointId) -> Option<VarId> {
        self.pair_to_dist_mul
            .get(&PairKey::new(self.canonical(a), self.canonical(b)))
            .copied()
    }

    pub(crate) fn try_add_var(&self, a: PointId, b: PointId) -> Option<VarId> {
        self.pair_to_dist_add
            .get(&PairKey::new(self.canonical(a), self.canonical(b)))
            .copied()
    }

    fn degenerate(&self, a: PointId, b: PointId) -> DdarError {
        DdarError::DegeneratePair(self.name(a).to_string(), self.name(b).to_string())
    }

    fn dir_comb(&self, a: PointId, b: PointId) -> Result<LinComb, DdarError> {
        self.try_dir_var(a, b)
            .map(LinComb::var)
            .ok_or_else(|| self.degenerate(a, b))
    }

    fn mul_comb(&self, a: PointId, b: PointId) -> Result<LinComb, DdarError> {
        self.try_mul_var(a, b)
            .map(LinComb::var)
            .ok_or_else(|| self.degenerate(a, b))
    }

    fn add_comb(&self, a: PointId, b: PointId) -> Result<LinComb, DdarError> {
        self.try_add_var(a, b)
            .map(LinComb::var)
            .ok_or_else(|| self.degenerate(a, b))
    }

    // ------------------------------------------------------------------
    // Lines and circles
    // ------------------------------------------------------------------

    pub fn line(&self, id: LineId) -> Option<&FormalLine> {
        self.lines.get(id.0).and_then(|l| l.as_ref())
    }

    pub fn circle(&self, id: CircleId) -> Option<&FormalCircle> {
        self.circles.get(id.0).and_then(|c| c.as_ref())
    }

    /// Live lines with their handles.
    pub fn live_lines(&self) -> impl Iterator<Item = (LineId, &FormalLine)> {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(i, l)| l.as_ref().map(|l| (LineId(i), l)))
    }

    /// Live circles with their handles.
    pub fn live_circles(&self) -> impl Iterator<Item = (CircleId, &FormalCircle)> {
        self.circles
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_ref().map(|c| (CircleId(i), c)))
    }

    /// The line through `a` and `b`, if one is known.
    pub fn line_through(&self, a: PointId, b: PointId) -> Option<&FormalLine> {
        let key = PairKey::new(self.canonical(a), self.canonical(b));
        self.pair_to_line.get(&key).and_then(|&id| self.line(id))
    }

    fn install_line(&mut self, line: FormalLine) -> LineId {
        let id = LineId(self.lines.len());
        for pk in line.pairs() {
            self.pair_to_line.insert(pk, id);
        }
        self.lines.push(Some(line));
        id
    }

    fn install_circle(&mut self, circle: FormalCircle) -> CircleId {
        let id = CircleId(self.circles.len());
        for tk in circle.triples() {
            let (a, b, c) = (tk.0, tk.1, tk.2);
            if collinear(self.pos(a), self.pos(b), self.pos(c)) {
                continue;
            }
            self.triple_to_circle.insert(tk, id);
        }
        self.circles.push(Some(circle));
        id
    }

    // ------------------------------------------------------------------
    // Predicate rendering
    // ------------------------------------------------------------------

    /// Human-readable form used in proof statements.
    pub fn render_pred(&self, pred: &Pred) -> String {
        let pts: Vec<&str> = pred.points.iter().map(|&p| self.name(p)).collect();
        let mut out = format!("{}({}", pred.name, pts.join(" "));
        if !pred.constants.is_empty() {
            let ks: Vec<String> = pred.constants.iter().map(|k| k.to_string()).collect();
            out.push_str(&format!("; {}", ks.join(", ")));
        }
        out.push(')');
        out
    }

    fn canonical_pred(&self, pred: &Pred) -> Pred {
        Pred {
            name: pred.name,
            points: pred.points.iter().map(|&p| self.canonical(p)).collect(),
            constants: pred.constants.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Translation to combs
    // ------------------------------------------------------------------

    fn angle_comb(&self, pred: &Pred) -> Result<Angle, DdarError> {
        let p = &pred.points;
        let comb = match pred.name {
            PredName::Para => &self.dir_comb(p[0], p[1])? - &self.dir_comb(p[2], p[3])?,
            PredName::Perp => {
                let mut c = &self.dir_comb(p[0], p[1])? - &self.dir_comb(p[2], p[3])?;
                c.add_term(self.angles.core.unit(), -Rat::new(1.into(), 2.into()));
                c
            }
            PredName::AConst => {
                let mut c = &self.dir_comb(p[0], p[1])? - &self.dir_comb(p[2], p[3])?;
                c.add_term(
                    self.angles.core.unit(),
                    -(&pred.constants[0] / Rat::from_integer(180.into())),
                );
                c
            }
            PredName::SAngle => {
                // Vertex is the middle point: the directed angle from the ray
                // to the first point onto the ray to the last.
                let mut c = &self.dir_comb(p[1], p[2])? - &self.dir_comb(p[1], p[0])?;
                c.add_term(
                    self.angles.core.unit(),
                    -(&pred.constants[0] / Rat::from_integer(180.into())),
                );
                c
            }
            PredName::EqAngle => {
                let lhs = &self.dir_comb(p[0], p[1])? - &self.dir_comb(p[2], p[3])?;
                let rhs = &self.dir_comb(p[4], p[5])? - &self.dir_comb(p[6], p[7])?;
                &lhs - &rhs
            }
            PredName::AngEq => {
                let mut c = LinComb::zero();
                let n = p.len() / 2;
                for i in 0..n {
                    let d = self.dir_comb(p[2 * i], p[2 * i + 1])?;
                    c = &c + &d.scaled(&pred.constants[i]);
                }
                c.add_term(
                    self.angles.core.unit(),
                    -(&pred.constants[n] / Rat::from_integer(180.into())),
                );
                c
            }
            _ => unreachable!("not an angle predicate"),
        };
        Ok(Angle(comb))
    }

    fn mul_comb_of(&mut self, pred: &Pred) -> Result<DistMul, DdarError> {
        let p = &pred.points;
        let comb = match pred.name {
            PredName::Cong => &self.mul_comb(p[0], p[1])? - &self.mul_comb(p[2], p[3])?,
            PredName::EqRatio => {
                let lhs = &self.mul_comb(p[0], p[1])? - &self.mul_comb(p[2], p[3])?;
                let rhs = &self.mul_comb(p[4], p[5])? - &self.mul_comb(p[6], p[7])?;
                &lhs - &rhs
            }
            PredName::RConst => {
                let base = &self.mul_comb(p[0], p[1])? - &self.mul_comb(p[2], p[3])?;
                let k = self.dmul.const_ratio(&pred.constants[0])?;
                &base - &k.0
            }
            PredName::DistMeq => {
                let n = p.len() / 2;
                let mut c = LinComb::zero();
                for i in 0..n {
                    let l = self.mul_comb(p[2 * i], p[2 * i + 1])?;
                    c = &c + &l.scaled(&pred.constants[i]);
                }
                let k = self.dmul.const_ratio(&pred.constants[n])?;
                &c - &k.0
            }
            _ => unreachable!("not a dist-mul predicate"),
        };
        Ok(DistMul(comb))
    }

    fn add_comb_of(&self, pred: &Pred) -> Result<DistAdd, DdarError> {
        let p = &pred.points;
        let comb = match pred.name {
            PredName::DistSeq => {
                let n = p.len() / 2;
                let mut c = LinComb::zero();
                for i in 0..n {
                    let s = self.add_comb(p[2 * i], p[2 * i + 1])?;
                    c = &c + &s.scaled(&pred.constants[i]);
                }
                c.add_term(self.dadd.core.unit(), pred.constants[n].clone());
                c
            }
            _ => unreachable!("not a dist-add predicate"),
        };
        Ok(DistAdd(comb))
    }

    // ------------------------------------------------------------------
    // Public surface
    // ------------------------------------------------------------------

    /// Assert a predicate. Returns whether new information was added.
    pub fn force_pred(&mut self, pred: &Pred) -> Result<bool, DdarError> {
        pred.validate()?;
        let pred = self.canonical_pred(pred);
        let statement = self.render_pred(&pred);
        let cause = self.forest.add(pred.name.as_str(), statement, []);
        let causes = BTreeSet::from([cause]);
        let p = &pred.points;
        let changed = match pred.name {
            PredName::Coll => self.force_collinear(p.clone(), cause)?,
            PredName::Cyclic => self.force_concyclic(p.clone(), Vec::new(), cause)?,
            PredName::CyclicWithCenters => {
                let k = pred.center_count().ok_or_else(|| {
                    DdarError::NumericMismatch("center count must be an integer".into())
                })?;
                let centers: Vec<PointId> = p[..k].to_vec();
                let rim: Vec<PointId> = p[k..].to_vec();
                let mut distinct: Vec<PointId> = Vec::new();
                for &q in &rim {
                    if !distinct.iter().any(|&r| close(self.pos(r), self.pos(q))) {
                        distinct.push(q);
                    }
                }
                if distinct.len() < 3 {
                    // Degenerate: not enough rim to pin a circle; record the
                    // equal radii from each given center instead.
                    let mut changed = false;
                    for &o in &centers {
                        for w in distinct.windows(2) {
                            let c = &self.mul_comb(o, w[0])? - &self.mul_comb(o, w[1])?;
                            changed |= self.dmul.force_one(&DistMul(c), &causes)?;
                        }
                    }
                    changed
                } else {
                    self.force_concyclic(rim, centers, cause)?
                }
            }
            PredName::Para
            | PredName::Perp
            | PredName::AConst
            | PredName::SAngle
            | PredName::EqAngle
            | PredName::AngEq => {
                let a = self.angle_comb(&pred)?;
                self.angles.force_zero(&a, &causes)?
            }
            PredName::Cong | PredName::EqRatio | PredName::RConst | PredName::DistMeq => {
                let m = self.mul_comb_of(&pred)?;
                self.dmul.force_one(&m, &causes)?
            }
            PredName::DistSeq => {
                let s = self.add_comb_of(&pred)?;
                self.dadd.force_zero(&s, &causes)?
            }
            PredName::Overlap => self.force_equal_points(p[0], p[1], cause)?,
            PredName::ACompute => {
                tracing::warn!(pred = %self.render_pred(&pred), "acompute is a query, not a fact; ignored");
                false
            }
        };
        Ok(changed)
    }

    /// Decide a predicate against the current symbolic state.
    pub fn check_pred(&mut self, pred: &Pred) -> Result<CheckOutcome, DdarError> {
        pred.validate()?;
        let pred = self.canonical_pred(pred);
        let p = &pred.points;
        let proved = match pred.name {
            PredName::Coll => self.check_collinear(p),
            PredName::Cyclic => self.check_concyclic(&p[..], &[]),
            PredName::CyclicWithCenters => {
                let k = pred.center_count().unwrap_or(0);
                self.check_concyclic(&p[k..], &p[..k])
                    || self.check_equal_radii(&p[..k], &p[k..])
            }
            PredName::Overlap => self.canonical(p[0]) == self.canonical(p[1]),
            PredName::ACompute => {
                let a = Angle(&self.dir_comb(p[0], p[1])? - &self.dir_comb(p[2], p[3])?);
                return Ok(match self.angles.as_constant(&a) {
                    Some(v) => CheckOutcome::Value(v),
                    None => CheckOutcome::Unknown,
                });
            }
            PredName::Para
            | PredName::Perp
            | PredName::AConst
            | PredName::SAngle
            | PredName::EqAngle
            | PredName::AngEq => {
                let a = self.angle_comb(&pred)?;
                self.angles.is_zero(&a)
            }
            PredName::Cong | PredName::EqRatio | PredName::RConst | PredName::DistMeq => {
                let m = self.mul_comb_of(&pred)?;
                self.dmul.is_one(&m)
            }
            PredName::DistSeq => {
                let s = self.add_comb_of(&pred)?;
                self.dadd.is_zero(&s)
            }
        };
        Ok(if proved {
            CheckOutcome::Proved
        } else {
            CheckOutcome::Unknown
        })
    }

    pub(crate) fn check_collinear(&self, pts: &[PointId]) -> bool {
        let mut distinct: Vec<PointId> = Vec::new();
        for &p in pts {
            if !distinct.contains(&p) {
                distinct.push(p);
            }
        }
        if distinct.len() <= 2 {
            return true;
        }
        match self.line_through(distinct[0], distinct[1]) {
            Some(line) => distinct.iter().all(|&p| line.contains(p)),
            None => false,
        }
    }

    /// Degenerate `cyclic_with_centers` fallback: every rim point is
    /// symbolically equidistant from every center.
    fn check_equal_radii(&self, centers: &[PointId], rim: &[PointId]) -> bool {
        if centers.is_empty() || rim.len() < 2 {
            return false;
        }
        centers.iter().all(|&o| {
            rim[1..].iter().all(|&p| {
                match (self.try_mul_var(o, rim[0]), self.try_mul_var(o, p)) {
                    (Some(u), Some(v)) => self
                        .dmul
                        .is_one(&DistMul(&LinComb::var(u) - &LinComb::var(v))),
                    _ => false,
                }
            })
        })
    }

    pub(crate) fn check_concyclic(&self, pts: &[PointId], centers: &[PointId]) -> bool {
        // Find any live circle containing every rim point and center.
        self.live_circles().any(|(_, c)| {
            pts.iter().all(|&p| c.contains(p))
                && centers.iter().all(|&o| c.centers.contains(&o))
        })
    }

    /// Derive the proof trace of a satisfied predicate, or `None` when it
    /// does not (yet) follow.
    pub fn get_proof(&mut self, pred: &Pred) -> Result<Option<String>, DdarError> {
        pred.validate()?;
        let pred = self.canonical_pred(pred);
        let p = &pred.points;
        let roots: BTreeSet<ProofId> = match pred.name {
            PredName::Coll => match self.line_through(p[0], p[1]) {
                Some(line) if p.iter().all(|&q| line.contains(q)) => line.sources.clone(),
                _ => return Ok(None),
            },
            PredName::Cyclic | PredName::CyclicWithCenters => {
                let k = if pred.name == PredName::CyclicWithCenters {
                    pred.center_count().unwrap_or(0)
                } else {
                    0
                };
                let (centers, rim) = p.split_at(k);
                match self
                    .live_circles()
                    .find(|(_, c)| {
                        rim.iter().all(|&q| c.contains(q))
                            && centers.iter().all(|&o| c.centers.contains(&o))
                    })
                    .map(|(_, c)| c.sources.clone())
                {
                    Some(s) => s,
                    None => return Ok(None),
                }
            }
            PredName::Overlap => {
                if self.canonical(p[0]) != self.canonical(p[1]) {
                    return Ok(None);
                }
                self.merge_nodes.iter().copied().collect()
            }
            PredName::ACompute => {
                let a = Angle(&self.dir_comb(p[0], p[1])? - &self.dir_comb(p[2], p[3])?);
                let red = self.angles.simplify(&a);
                if self.angles.as_constant(&a).is_none() {
                    return Ok(None);
                }
                red.0.sources().clone()
            }
            PredName::Para
            | PredName::Perp
            | PredName::AConst
            | PredName::SAngle
            | PredName::EqAngle
            | PredName::AngEq => {
                let a = self.angle_comb(&pred)?;
                let red = self.angles.core.canon(self.angles.simplify(&a).0);
                if !red.is_empty() {
                    return Ok(None);
                }
                red.sources().clone()
            }
            PredName::Cong | PredName::EqRatio | PredName::RConst | PredName::DistMeq => {
                let m = self.mul_comb_of(&pred)?;
                let red = self.dmul.simplify(&m);
                if !red.0.is_empty() {
                    return Ok(None);
                }
                red.0.sources().clone()
            }
            PredName::DistSeq => {
                let s = self.add_comb_of(&pred)?;
                let red = self.dadd.simplify(&s);
                if !red.0.is_empty() {
                    return Ok(None);
                }
                red.0.sources().clone()
            }
        };
        Ok(Some(self.forest.render_trace(&roots)))
    }

    // ------------------------------------------------------------------
    // force_collinear
    // ------------------------------------------------------------------

    /// Assert that `pts` lie on one line, merging every touching line.
    pub fn force_collinear(
        &mut self,
        pts: Vec<PointId>,
        cause: ProofId,
    ) -> Result<bool, DdarError> {
        let mut distinct: Vec<PointId> = Vec::new();
        for p in pts {
            let p = self.canonical(p);
            if !distinct.contains(&p) {
                distinct.push(p);
            }
        }
        if distinct.len() < 3 {
            return Ok(false);
        }

        // Widest pair anchors the numeric line.
        let (wa, wb) = self.widest_pair(&distinct);
        if distance(self.pos(wa), self.pos(wb)) < ATOM {
            return Err(DdarError::NumericMismatch(format!(
                "cannot assert collinearity over numerically identical points `{}`",
                self.name(wa)
            )));
        }
        let base = NumLine::through(self.pos(wa), self.pos(wb))
            .expect("widest pair is numerically distinct");
        for &p in &distinct {
            if base.distance(self.pos(p)) >= ATOM {
                return Err(DdarError::NumericMismatch(format!(
                    "point `{}` is not numerically collinear with `{}` and `{}`",
                    self.name(p),
                    self.name(wa),
                    self.name(wb)
                )));
            }
        }

        // Transitive closure through the pair→line index.
        let (group, found) = self.collect_lines(&distinct);
        if found.len() == 1 {
            let line = self.line(found[0]).expect("collected line is live");
            if distinct.iter().all(|&p| line.contains(p)) {
                return Ok(false);
            }
        }

        // Order along the base line.
        let mut ordered: Vec<PointId> = group.iter().copied().collect();
        ordered.sort_by(|&x, &y| {
            base.position(self.pos(x))
                .partial_cmp(&base.position(self.pos(y)))
                .expect("line positions are finite")
        });

        let mut sources: BTreeSet<ProofId> = BTreeSet::from([cause]);
        let mut old_dirs: Vec<VarId> = Vec::new();
        for &id in &found {
            let line = self.lines[id.0].take().expect("collected line is live");
            sources.extend(line.sources.iter().copied());
            old_dirs.push(line.dir);
        }

        let dir = self
            .try_dir_var(wa, wb)
            .expect("widest pair is numerically distinct");
        let line = FormalLine {
            points: ordered.clone(),
            main_pair: (wa, wb),
            dir,
            value: base,
            sources: sources.clone(),
        };
        let id = self.install_line(line);
        tracing::debug!(
            line = ?id,
            points = %self.render_points(&ordered),
            "collinear group"
        );

        // All touching lines share one direction.
        for old in old_dirs {
            if old != dir {
                let a = Angle(&LinComb::var(old) - &LinComb::var(dir));
                self.angles.force_zero(&a, &sources)?;
            }
        }
        // Every pair on the line shares the line's direction.
        for (i, &x) in ordered.iter().enumerate() {
            for &y in &ordered[i + 1..] {
                let Some(v) = self.try_dir_var(x, y) else {
                    continue;
                };
                if v != dir {
                    let a = Angle(&LinComb::var(v) - &LinComb::var(dir));
                    self.angles.force_zero(&a, &sources)?;
                }
            }
        }

        // Additive segment law, anchored at the first ordered point:
        // |p0 b| + |b c| = |p0 c| for consecutive b, c.
        let anchor = ordered[0];
        for w in ordered.windows(2).skip(1) {
            let (b, c) = (w[0], w[1]);
            let (ab, bc, ac) = match (
                self.try_add_var(anchor, b),
                self.try_add_var(b, c),
                self.try_add_var(anchor, c),
            ) {
                (Some(x), Some(y), Some(z)) => (x, y, z),
                // A numerically identical pair inside the group: left for
                // the merge pass.
                _ => continue,
            };
            let mut law = &LinComb::var(ab) + &LinComb::var(bc);
            law.add_term(ac, -Rat::from_integer(1.into()));
            self.dadd.force_zero(&DistAdd(law), &sources)?;
        }

        Ok(true)
    }

    fn widest_pair(&self, pts: &[PointId]) -> (PointId, PointId) {
        let mut best = (pts[0], pts[1]);
        let mut best_d = -1.0f64;
        for (i, &a) in pts.iter().enumerate() {
            for &b in &pts[i + 1..] {
                let d = distance(self.pos(a), self.pos(b));
                if d > best_d {
                    best_d = d;
                    best = (a, b);
                }
            }
        }
        best
    }

    /// BFS through the pair→line index: all points and lines transitively
    /// connected to the seed set through shared pairs.
    fn collect_lines(&self, seed: &[PointId]) -> (BTreeSet<PointId>, Vec<LineId>) {
        let mut group: BTreeSet<PointId> = seed.iter().copied().collect();
        let mut found: Vec<LineId> = Vec::new();
        let mut frontier: Vec<PairKey> = Vec::new();
        for (i, &a) in seed.iter().enumerate() {
            for &b in &seed[i + 1..] {
                frontier.push(PairKey::new(a, b));
            }
        }
        let mut visited: FxHashSet<PairKey> = FxHashSet::default();
        while let Some(pk) = frontier.pop() {
            if !visited.insert(pk) {
                continue;
            }
            let Some(id) = self.pair_to_line.get(&pk).copied() else {
                continue;
            };
            if self.line(id).is_none() || found.contains(&id) {
                continue;
            }
            found.push(id);
            let pts = self.line(id).expect("live line").points.clone();
            for p in pts {
                if group.insert(p) {
                    for &q in &group {
                        if q != p {
                            frontier.push(PairKey::new(p, q));
                        }
                    }
                }
            }
        }
        (group, found)
    }

    pub(crate) fn render_points(&self, pts: &[PointId]) -> String {
        pts.iter()
            .map(|&p| self.name(p))
            .collect::<Vec<_>>()
            .join(" ")
    }

    // ------------------------------------------------------------------
    // force_concyclic
    // ------------------------------------------------------------------

    /// Assert that `pts` lie on one circle (with the given known centers),
    /// merging every circle that shares a defining triple.
    pub fn force_concyclic(
        &mut self,
        pts: Vec<PointId>,
        centers: Vec<PointId>,
        cause: ProofId,
    ) -> Result<bool, DdarError> {
        let mut rim: Vec<PointId> = Vec::new();
        for p in pts {
            let p = self.canonical(p);
            if !rim.contains(&p) {
                rim.push(p);
            }
        }
        let mut ctr: Vec<PointId> = Vec::new();
        for c in centers {
            let c = self.canonical(c);
            if !ctr.contains(&c) {
                ctr.push(c);
            }
        }
        if rim.len() < 3 {
            return Ok(false);
        }
        if self.numerically_collinear(&rim) {
            return Err(DdarError::NumericMismatch(format!(
                "concyclic set `{}` is numerically collinear; assert coll instead",
                self.render_points(&rim)
            )));
        }

        // Transitive closure through the triple→circle index.
        let (group, group_centers, found) = self.collect_circles(&rim, &ctr);
        if found.len() == 1 {
            let c = self.circle(found[0]).expect("collected circle is live");
            if rim.iter().all(|&p| c.contains(p)) && ctr.iter().all(|&o| c.centers.contains(&o)) {
                return Ok(false);
            }
        }

        // Numeric value: inherit, else center + radius, else three points.
        let inherited = found
            .first()
            .and_then(|&id| self.circle(id))
            .map(|c| (c.value, c.defining));
        let (value, defining) = match inherited {
            Some(v) => v,
            None => {
                let value = if let Some(&o) = group_centers.first() {
                    NumCircle::new(self.pos(o), distance(self.pos(o), self.pos(group[0])))
                } else {
                    match self.spanning_triple(&group) {
                        Some((a, b, c)) => NumCircle::through(self.pos(a), self.pos(b), self.pos(c))
                            .expect("spanning triple is non-degenerate"),
                        None => {
                            return Err(DdarError::NumericMismatch(format!(
                                "no three numerically independent points among `{}`",
                                self.render_points(&group)
                            )))
                        }
                    }
                };
                let defining = match self.spanning_triple(&group) {
                    Some(t) => [t.0, t.1, t.2],
                    None => {
                        return Err(DdarError::NumericMismatch(format!(
                            "no three numerically independent points among `{}`",
                            self.render_points(&group)
                        )))
                    }
                };
                (value, defining)
            }
        };

        for &p in &group {
            if value.distance(self.pos(p)) >= ATOM {
                return Err(DdarError::NumericMismatch(format!(
                    "point `{}` is not numerically concyclic with the asserted set",
                    self.name(p)
                )));
            }
        }
        for &o in &group_centers {
            if distance(self.pos(o), value.center) >= ATOM {
                return Err(DdarError::NumericMismatch(format!(
                    "point `{}` is not numerically the center of the asserted circle",
                    self.name(o)
                )));
            }
        }

        let mut sources: BTreeSet<ProofId> = BTreeSet::from([cause]);
        for &id in &found {
            let c = self.circles[id.0].take().expect("collected circle is live");
            sources.extend(c.sources.iter().copied());
        }

        let circle = FormalCircle {
            defining,
            points: group.clone(),
            centers: group_centers.clone(),
            value,
            sources: sources.clone(),
        };
        let id = self.install_circle(circle);
        tracing::debug!(
            circle = ?id,
            points = %self.render_points(&group),
            centers = %self.render_points(&group_centers),
            "concyclic group"
        );

        // Inscribed-angle closure: on a common chord every rim vertex sees
        // the same directed angle.
        self.force_inscribed(&group, &sources)?;

        // Known centers are equidistant from every rim point.
        for &o in &group_centers {
            let p0 = group[0];
            for &p in &group[1..] {
                let (a, b) = match (self.try_mul_var(o, p0), self.try_mul_var(o, p)) {
                    (Some(a), Some(b)) => (a, b),
                    _ => continue,
                };
                let c = &LinComb::var(a) - &LinComb::var(b);
                self.dmul.force_one(&DistMul(c), &sources)?;
            }
        }

        Ok(true)
    }

    fn numerically_collinear(&self, pts: &[PointId]) -> bool {
        self.spanning_triple(pts).is_none()
    }

    /// Three pairwise-distinct, non-collinear points from `pts`, if any.
    pub(crate) fn spanning_triple(&self, pts: &[PointId]) -> Option<(PointId, PointId, PointId)> {
        for (i, &a) in pts.iter().enumerate() {
            for (j, &b) in pts.iter().enumerate().skip(i + 1) {
                if close(self.pos(a), self.pos(b)) {
                    continue;
                }
                for &c in pts.iter().skip(j + 1) {
                    if !close(self.pos(a), self.pos(c))
                        && !close(self.pos(b), self.pos(c))
                        && !collinear(self.pos(a), self.pos(b), self.pos(c))
                    {
                        return Some((a, b, c));
                    }
                }
            }
        }
        None
    }

    fn collect_circles(
        &self,
        rim: &[PointId],
        centers: &[PointId],
    ) -> (Vec<PointId>, Vec<PointId>, Vec<CircleId>) {
        let mut group: BTreeSet<PointId> = rim.iter().copied().collect();
        let mut ctr: BTreeSet<PointId> = centers.iter().copied().collect();
        let mut found: Vec<CircleId> = Vec::new();
        let mut frontier: Vec<TripleKey> = triples_of(&group);
        let mut visited: FxHashSet<TripleKey> = FxHashSet::default();
        while let Some(tk) = frontier.pop() {
            if !visited.insert(tk) {
                continue;
            }
            let Some(id) = self.triple_to_circle.get(&tk).copied() else {
                continue;
            };
            if self.circle(id).is_none() || found.contains(&id) {
                continue;
            }
            found.push(id);
            let c = self.circle(id).expect("live circle");
            let (pts, cs) = (c.points.clone(), c.centers.clone());
            ctr.extend(cs);
            for p in pts {
                if group.insert(p) {
                    let existing: Vec<PointId> = group.iter().copied().collect();
                    for (i, &x) in existing.iter().enumerate() {
                        for &y in &existing[i + 1..] {
                            if x != p && y != p {
                                frontier.push(TripleKey::new(p, x, y));
                            }
                        }
                    }
                }
            }
        }
        (
            group.into_iter().collect(),
            ctr.into_iter().collect(),
            found,
        )
    }

    /// For every chord `{y, y2}` and every pair of rim witnesses, the
    /// inscribed angles agree: `∠(x y, x y2) = ∠(c' y, c' y2)`.
    fn force_inscribed(
        &mut self,
        rim: &[PointId],
        sources: &BTreeSet<ProofId>,
    ) -> Result<(), DdarError> {
        for (i, &y) in rim.iter().enumerate() {
            for &y2 in &rim[i + 1..] {
                let witnesses: Vec<PointId> = rim
                    .iter()
                    .copied()
                    .filter(|&w| w != y && w != y2)
                    .collect();
                if witnesses.len() < 2 {
                    continue;
                }
                let cprime = witnesses[0];
                let Some(base) = self.chord_angle(cprime, y, y2) else {
                    continue;
                };
                for &x in &witnesses[1..] {
                    let Some(seen) = self.chord_angle(x, y, y2) else {
                        continue;
                    };
                    let eq = Angle(&seen - &base);
                    self.angles.force_zero(&eq, sources)?;
                }
            }
        }
        Ok(())
    }

    /// `dir(x, y2) − dir(x, y)`, if both pairs have variables.
    pub(crate) fn chord_angle(&self, x: PointId, y: PointId, y2: PointId) -> Option<LinComb> {
        let a = self.try_dir_var(x, y2)?;
        let b = self.try_dir_var(x, y)?;
        Some(&LinComb::var(a) - &LinComb::var(b))
    }

    // ------------------------------------------------------------------
    // force_equal_points
    // ------------------------------------------------------------------

    /// Merge `b` into `a`: every object through one gains the other, `b` is
    /// dropped, and all distances from other points transfer.
    pub fn force_equal_points(
        &mut self,
        a: PointId,
        b: PointId,
        cause: ProofId,
    ) -> Result<bool, DdarError> {
        let a = self.canonical(a);
        let b = self.canonical(b);
        if a == b {
            return Ok(false);
        }
        if !close(self.pos(a), self.pos(b)) {
            return Err(DdarError::NumericMismatch(format!(
                "cannot merge `{}` and `{}`: coordinates differ",
                self.name(a),
                self.name(b)
            )));
        }
        tracing::debug!(a = %self.name(a), b = %self.name(b), "merging points");
        let causes = BTreeSet::from([cause]);

        // Lines containing exactly one of the pair gain the other.
        let one_sided: Vec<LineId> = self
            .live_lines()
            .filter(|(_, l)| l.contains(b) != l.contains(a))
            .map(|(id, _)| id)
            .collect();
        for id in one_sided {
            let Some(line) = self.line(id) else { continue };
            let mut pts = line.points.clone();
            if line.contains(b) {
                pts.push(a);
            } else {
                pts.push(b);
            }
            self.force_collinear(pts, cause)?;
        }

        // Same for circles.
        let one_sided: Vec<CircleId> = self
            .live_circles()
            .filter(|(_, c)| c.contains(b) != c.contains(a))
            .map(|(id, _)| id)
            .collect();
        for id in one_sided {
            let Some(c) = self.circle(id) else { continue };
            let (mut pts, ctr) = (c.points.clone(), c.centers.clone());
            if c.contains(b) {
                pts.push(a);
            } else {
                pts.push(b);
            }
            self.force_concyclic(pts, ctr, cause)?;
        }

        // All three systems: pairs through b alias pairs through a.
        for x in self.alive_points() {
            if x == a || x == b {
                continue;
            }
            if let (Some(u), Some(v)) = (self.try_mul_var(x, a), self.try_mul_var(x, b)) {
                if u != v {
                    self.dmul
                        .force_one(&DistMul(&LinComb::var(u) - &LinComb::var(v)), &causes)?;
                }
            }
            if let (Some(u), Some(v)) = (self.try_add_var(x, a), self.try_add_var(x, b)) {
                if u != v {
                    self.dadd
                        .force_zero(&DistAdd(&LinComb::var(u) - &LinComb::var(v)), &causes)?;
                }
            }
            if let (Some(u), Some(v)) = (self.try_dir_var(x, a), self.try_dir_var(x, b)) {
                if u != v {
                    self.angles
                        .force_zero(&Angle(&LinComb::var(u) - &LinComb::var(v)), &causes)?;
                }
            }
        }

        // Rebuild every object that still mentions b, with b dropped.
        let with_b: Vec<LineId> = self
            .live_lines()
            .filter(|(_, l)| l.contains(b))
            .map(|(id, _)| id)
            .collect();
        for id in with_b {
            let mut line = self.lines[id.0].take().expect("live line");
            for pk in line.pairs() {
                self.pair_to_line.remove(&pk);
            }
            line.points.retain(|&p| p != b);
            if line.points.len() < 2 {
                continue;
            }
            if line.main_pair.0 == b || line.main_pair.1 == b {
                line.main_pair = self.widest_pair(&line.points);
            }
            self.install_line(line);
        }
        let with_b: Vec<CircleId> = self
            .live_circles()
            .filter(|(_, c)| c.contains(b) || c.centers.contains(&b) || c.defining.contains(&b))
            .map(|(id, _)| id)
            .collect();
        for id in with_b {
            let mut circle = self.circles[id.0].take().expect("live circle");
            let stale: Vec<TripleKey> = circle.triples().collect();
            for tk in stale {
                if self.triple_to_circle.get(&tk) == Some(&id) {
                    self.triple_to_circle.remove(&tk);
                }
            }
            circle.points.retain(|&p| p != b);
            circle.centers.retain(|&p| p != b);
            if circle.defining.contains(&b) {
                match self.spanning_triple(&circle.points) {
                    Some(t) => circle.defining = [t.0, t.1, t.2],
                    None => continue, // degenerate remnant; drop the record
                }
            }
            if circle.points.len() >= 3 {
                self.install_circle(circle);
            }
        }

        self.point_subst[b.as_usize()] = a;
        self.points[b.as_usize()].alive = false;
        self.merge_nodes.push(cause);
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Caches
    // ------------------------------------------------------------------

    /// Refresh the per-pair simplification caches. Called at the start of
    /// each outer iteration and between mutating passes.
    pub(crate) fn update_cache(&mut self) {
        self.dist_mul_cache.clear();
        self.direction_cache.clear();
        let alive = self.alive_points();
        for (i, &a) in alive.iter().enumerate() {
            for &b in &alive[i + 1..] {
                let key = PairKey::new(a, b);
                if let Some(v) = self.try_mul_var(a, b) {
                    let red = self.dmul.simplify(&DistMul(LinComb::var(v)));
                    self.dist_mul_cache.insert(key, red);
                }
                if let Some(v) = self.try_dir_var(a, b) {
                    let red = self.angles.simplify(&Angle(LinComb::var(v)));
                    self.direction_cache.insert(key, red);
                }
            }
        }
    }

    pub(crate) fn cached_mul(&self, a: PointId, b: PointId) -> Option<&DistMul> {
        self.dist_mul_cache
            .get(&PairKey::new(self.canonical(a), self.canonical(b)))
    }

    pub(crate) fn cached_dir(&self, a: PointId, b: PointId) -> Option<&Angle> {
        self.direction_cache
            .get(&PairKey::new(self.canonical(a), self.canonical(b)))
    }

    /// Internal: record a derivation step.
    pub(crate) fn add_node(
        &mut self,
        rule: &str,
        statement: String,
        parents: &BTreeSet<ProofId>,
    ) -> ProofId {
        self.forest.add(rule, statement, parents.iter().copied())
    }
}

fn triples_of(group: &BTreeSet<PointId>) -> Vec<TripleKey> {
    let v: Vec<PointId> = group.iter().copied().collect();
    let mut out = Vec::new();
    for (i, &a) in v.iter().enumerate() {
        for (j, &b) in v.iter().enumerate().skip(i + 1) {
            for &c in v.iter().skip(j + 1) {
                out.push(TripleKey::new(a, b, c));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(points: &[(&str, f64, f64)]) -> Ddar {
        Ddar::new(
            points
                .iter()
                .map(|(n, x, y)| (n.to_string(), *x, *y))
                .collect(),
        )
        .unwrap()
    }

    fn pred(e: &Ddar, name: &str, pts: &[&str]) -> Pred {
        pred_k(e, name, pts, &[])
    }

    fn pred_k(e: &Ddar, name: &str, pts: &[&str], ks: &[Rat]) -> Pred {
        Pred::new(
            name.parse().unwrap(),
            pts.iter().map(|n| e.point_by_name(n).unwrap()).collect(),
            ks.to_vec(),
        )
        .unwrap()
    }

    fn r(n: i64, d: i64) -> Rat {
        Rat::new(n.into(), d.into())
    }

    #[test]
    fn force_then_check_roundtrip() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 2.0, 0.0),
            ("c", 1.0, 3.0),
            ("d", 3.0, 3.0),
        ]);
        // ab and cd are parallel horizontals... cd runs from (1,3) to (3,3).
        let p = pred(&e, "para", &["a", "b", "c", "d"]);
        assert_eq!(e.check_pred(&p).unwrap(), CheckOutcome::Unknown);
        assert!(e.force_pred(&p).unwrap());
        assert_eq!(e.check_pred(&p).unwrap(), CheckOutcome::Proved);
        // Re-forcing is redundancy, not an error.
        assert!(!e.force_pred(&p).unwrap());
    }

    #[test]
    fn collinear_roundtrip_and_pair_index() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 1.0, 1.0),
            ("c", 2.0, 2.0),
            ("d", 3.0, 3.0),
            ("x", 5.0, 0.0),
        ]);
        let p = pred(&e, "coll", &["a", "b", "c"]);
        assert!(e.force_pred(&p).unwrap());
        assert_eq!(e.check_pred(&p).unwrap(), CheckOutcome::Proved);
        // Any sub-pair resolves to a line containing both endpoints.
        let (a, c) = (
            e.point_by_name("a").unwrap(),
            e.point_by_name("c").unwrap(),
        );
        let line = e.line_through(a, c).unwrap();
        assert!(line.contains(a) && line.contains(c));
        // Extending merges into one bigger line.
        let q = pred(&e, "coll", &["b", "c", "d"]);
        assert!(e.force_pred(&q).unwrap());
        let all = pred(&e, "coll", &["a", "b", "c", "d"]);
        assert_eq!(e.check_pred(&all).unwrap(), CheckOutcome::Proved);
        assert_eq!(e.live_lines().count(), 1);
        // Points are ordered by position.
        let line = e.line_through(a, c).unwrap();
        let names: Vec<&str> = line.points.iter().map(|&p| e.name(p)).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        // An unrelated point is not on it.
        let off = pred(&e, "coll", &["a", "b", "x"]);
        assert_eq!(e.check_pred(&off).unwrap(), CheckOutcome::Unknown);
    }

    #[test]
    fn collinear_forces_segment_arithmetic() {
        let mut e = engine(&[("a", 0.0, 0.0), ("b", 1.0, 0.0), ("c", 3.0, 0.0)]);
        let p = pred(&e, "coll", &["a", "b", "c"]);
        e.force_pred(&p).unwrap();
        // |ab| + |bc| = |ac| in the additive system.
        let ds = pred_k(
            &e,
            "distseq",
            &["a", "b", "b", "c", "a", "c"],
            &[r(1, 1), r(1, 1), r(-1, 1), r(0, 1)],
        );
        assert_eq!(e.check_pred(&ds).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn collinear_rejects_off_line_point() {
        let mut e = engine(&[("a", 0.0, 0.0), ("b", 1.0, 0.0), ("c", 0.5, 2.0)]);
        let p = pred(&e, "coll", &["a", "b", "c"]);
        assert!(e.force_pred(&p).is_err());
    }

    #[test]
    fn concyclic_roundtrip_with_center() {
        let mut e = engine(&[
            ("o", 0.0, 0.0),
            ("p", 1.0, 0.0),
            ("q", 0.0, 1.0),
            ("r", -1.0, 0.0),
            ("s", 0.0, -1.0),
        ]);
        let p = pred_k(
            &e,
            "cyclic_with_centers",
            &["o", "p", "q", "r", "s"],
            &[r(1, 1)],
        );
        assert!(e.force_pred(&p).unwrap());
        assert_eq!(e.check_pred(&p).unwrap(), CheckOutcome::Proved);
        // Equal radii were recorded multiplicatively.
        let cong = pred(&e, "cong", &["o", "p", "o", "s"]);
        assert_eq!(e.check_pred(&cong).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn concyclic_collinear_rim_is_rejected() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 1.0, 0.0),
            ("c", 2.0, 0.0),
            ("d", 3.0, 0.0),
        ]);
        let p = pred(&e, "cyclic", &["a", "b", "c", "d"]);
        assert!(e.force_pred(&p).is_err());
    }

    #[test]
    fn inscribed_angles_follow_from_cyclic() {
        // Four points on the unit circle.
        let (a, b, c, d) = (
            (1.0, 0.0),
            (0.0, 1.0),
            (-1.0, 0.0),
            (2.0f64.sqrt() / -2.0, 2.0f64.sqrt() / -2.0),
        );
        let mut e = engine(&[("a", a.0, a.1), ("b", b.0, b.1), ("c", c.0, c.1), ("d", d.0, d.1)]);
        let p = pred(&e, "cyclic", &["a", "b", "c", "d"]);
        e.force_pred(&p).unwrap();
        // Chord ab seen from c and from d.
        let eq = pred(&e, "eqangle", &["c", "a", "c", "b", "d", "a", "d", "b"]);
        assert_eq!(e.check_pred(&eq).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn merge_collapses_points_and_transfers_distances() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 2.0, 2.0),
            ("x", 1.0, 1.0),
            ("y", 1.0, 1.0),
            ("z", 4.0, 0.0),
        ]);
        let p = pred(&e, "overlap", &["x", "y"]);
        assert!(e.force_pred(&p).unwrap());
        // Symmetric check.
        let q = pred(&e, "overlap", &["y", "x"]);
        assert_eq!(e.check_pred(&q).unwrap(), CheckOutcome::Proved);
        // Distances through the merged point agree symbolically.
        let cong = pred(&e, "cong", &["z", "x", "z", "y"]);
        assert_eq!(e.check_pred(&cong).unwrap(), CheckOutcome::Proved);
        // The dead point is gone from the live set.
        assert_eq!(e.alive_points().len(), 4);
    }

    #[test]
    fn merge_rejects_distant_points() {
        let mut e = engine(&[("x", 0.0, 0.0), ("y", 1.0, 0.0)]);
        let p = pred(&e, "overlap", &["x", "y"]);
        assert!(e.force_pred(&p).is_err());
    }

    #[test]
    fn acompute_reports_constant_angles() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 1.0, 0.0),
            ("c", 0.0, 0.5),
            ("d", 0.0, 2.0),
        ]);
        let perp = pred(&e, "perp", &["a", "b", "c", "d"]);
        e.force_pred(&perp).unwrap();
        let q = pred(&e, "acompute", &["a", "b", "c", "d"]);
        assert_eq!(e.check_pred(&q).unwrap(), CheckOutcome::Value(r(1, 2)));
        // Forcing a query warns and adds nothing.
        assert!(!e.force_pred(&q).unwrap());
    }

    #[test]
    fn eqangle_and_proof_trace() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 1.0, 0.0),
            ("c", 0.0, 1.0),
            ("d", 1.0, 1.0),
        ]);
        let p1 = pred(&e, "para", &["a", "b", "c", "d"]);
        let p2 = pred(&e, "para", &["a", "c", "b", "d"]);
        e.force_pred(&p1).unwrap();
        e.force_pred(&p2).unwrap();
        let goal = pred(&e, "eqangle", &["a", "b", "a", "c", "c", "d", "b", "d"]);
        assert_eq!(e.check_pred(&goal).unwrap(), CheckOutcome::Proved);
        let trace = e.get_proof(&goal).unwrap().unwrap();
        assert!(trace.contains("para(a b c d)"));
        assert!(trace.contains("para(a c b d)"));
        // An unproven goal yields no trace.
        let open = pred(&e, "perp", &["a", "b", "b", "d"]);
        assert!(e.get_proof(&open).unwrap().is_none());
    }

    #[test]
    fn rconst_links_to_distmeq_through_ratio_algebra() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 2.0, 0.0),
            ("c", 5.0, 0.0),
            ("d", 6.0, 0.0),
        ]);
        let p = pred_k(&e, "rconst", &["a", "b", "c", "d"], &[r(2, 1)]);
        e.force_pred(&p).unwrap();
        // Then |ab| = 2|cd| also as distmeq with ratio 2.
        let q = pred_k(
            &e,
            "distmeq",
            &["a", "b", "c", "d"],
            &[r(1, 1), r(-1, 1), r(2, 1)],
        );
        assert_eq!(e.check_pred(&q).unwrap(), CheckOutcome::Proved);
    }
}
