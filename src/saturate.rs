//! Saturation passes
//!
//! The outer loop refreshes the per-pair caches and sweeps six rules until a
//! full sweep adds nothing:
//!
//! 1. similar triangles (SSS / AA / SAS / SSA hash collisions)
//! 2. concyclic-by-angle (equal inscribed angles over a common chord)
//! 3. equal-radius circles (points equidistant from a common center)
//! 4. point merging (numerically identical points on two non-tangent objects)
//! 5. add↔mul distance transfer (rational length ratios cross systems)
//! 6. arc↔chord transfer on each known circle
//!
//! Passes scan points in construction order and hash exact rational keys, so
//! the collision sets and the resulting proof traces are reproducible.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::collections::BTreeSet;

use num_traits::Signed;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::comb::{CombKey, LinComb};
use crate::elim::{Angle, DistAdd, DistMul};
use crate::engine::{Ddar, Tri};
use crate::geom::PointId;
use crate::num::{self, close, dist_mod1, distance, mod1, NumCircle, ATOM};
use crate::proof::ProofId;
use crate::{DdarError, Rat};

/// Options for the outer closure loop.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClosureOpts {
    /// Bound on outer iterations; `None` runs to fixpoint.
    pub max_rounds: Option<usize>,
    /// Emit a per-pass summary at info level.
    pub verbose: bool,
    /// Print a progress dot per pass to stderr.
    pub progress_dots: bool,
}

impl Ddar {
    /// Run all saturation passes to fixpoint (or to the round budget).
    pub fn deduction_closure(&mut self, opts: &ClosureOpts) -> Result<(), DdarError> {
        let mut round = 0usize;
        loop {
            round += 1;
            if let Some(max) = opts.max_rounds {
                if round > max {
                    tracing::info!(round, "closure stopped by round budget");
                    break;
                }
            }
            let mut changed = false;
            let passes: [(&str, fn(&mut Ddar) -> Result<bool, DdarError>); 6] = [
                ("similar_triangles", Ddar::pass_similar_triangles),
                ("concyclic_by_angle", Ddar::pass_concyclic_by_angle),
                ("equal_radius_circles", Ddar::pass_equal_radius_circles),
                ("merge_points", Ddar::pass_merge_points),
                ("transfer_add_mul", Ddar::pass_transfer_add_mul),
                ("arc_chord", Ddar::pass_arc_chord),
            ];
            for (name, pass) in passes {
                self.update_cache();
                let hit = pass(self)?;
                changed |= hit;
                if opts.progress_dots {
                    eprint!(".");
                }
                if opts.verbose {
                    tracing::info!(round, pass = name, hit, "pass done");
                }
            }
            tracing::debug!(
                round,
                changed,
                lines = self.live_lines().count(),
                circles = self.live_circles().count(),
                "closure round"
            );
            if !changed {
                break;
            }
        }
        if opts.progress_dots {
            eprintln!();
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Pass 1: similar triangles
    // ------------------------------------------------------------------

    fn pass_similar_triangles(&mut self) -> Result<bool, DdarError> {
        let mut sss: FxHashMap<(CombKey, CombKey), TableSlot> = FxHashMap::default();
        let mut aa: FxHashMap<(CombKey, CombKey), TableSlot> = FxHashMap::default();
        let mut sas: FxHashMap<(CombKey, CombKey, i8), TableSlot> = FxHashMap::default();
        let mut ssa: FxHashMap<(CombKey, CombKey, i8), TableSlot> = FxHashMap::default();
        let mut pending: Vec<(Tri, Tri, BTreeSet<ProofId>, &'static str)> = Vec::new();

        let pts = self.alive_points();
        for &a in &pts {
            for &b in &pts {
                for &c in &pts {
                    if a == b || a == c || b == c {
                        continue;
                    }
                    let orient = num::orientation(self.pos(a), self.pos(b), self.pos(c));
                    if orient == 0 {
                        continue;
                    }
                    let vars = (
                        self.try_dir_var(a, b),
                        self.try_dir_var(a, c),
                        self.try_dir_var(b, c),
                        self.try_mul_var(a, b),
                        self.try_mul_var(a, c),
                        self.try_mul_var(b, c),
                    );
                    let (Some(dab), Some(dac), Some(dbc), Some(mab), Some(mac), Some(mbc)) = vars
                    else {
                        continue;
                    };
                    // Untouched triangles only collide with themselves.
                    let touched = [dab, dac, dbc]
                        .iter()
                        .any(|&v| self.angles.core.encountered(v))
                        || [mab, mac, mbc].iter().any(|&v| self.dmul.core.encountered(v));
                    if !touched {
                        continue;
                    }

                    // The four invariants, in reduced form via the caches.
                    let (mul_ab, mul_ac, mul_cb) = (
                        self.cached_mul(a, b).expect("cached").clone(),
                        self.cached_mul(a, c).expect("cached").clone(),
                        self.cached_mul(c, b).expect("cached").clone(),
                    );
                    let (dir_ab, dir_ac, dir_cb) = (
                        self.cached_dir(a, b).expect("cached").clone(),
                        self.cached_dir(a, c).expect("cached").clone(),
                        self.cached_dir(c, b).expect("cached").clone(),
                    );
                    let r1 = &mul_ac.0 - &mul_ab.0;
                    let r2 = &mul_cb.0 - &mul_ac.0;
                    let a1 = self.angles.core.canon(&dir_ab.0 - &dir_ac.0);
                    let a2 = self.angles.core.canon(&dir_cb.0 - &dir_ac.0);

                    let tri = (a, b, c);
                    let srcs_r: BTreeSet<ProofId> = r1
                        .sources()
                        .iter()
                        .chain(r2.sources().iter())
                        .copied()
                        .collect();
                    let srcs_a: BTreeSet<ProofId> = a1
                        .sources()
                        .iter()
                        .chain(a2.sources().iter())
                        .copied()
                        .collect();
                    probe(
                        &mut sss,
                        (r1.key(), r2.key()),
                        tri,
                        srcs_r.clone(),
                        "simtri_sss",
                        &mut pending,
                    );
                    probe(
                        &mut aa,
                        (a1.key(), a2.key()),
                        tri,
                        srcs_a.clone(),
                        "simtri_aa",
                        &mut pending,
                    );
                    let mut srcs_ar = srcs_a;
                    srcs_ar.extend(srcs_r);
                    probe(
                        &mut sas,
                        (a1.key(), r1.key(), orient),
                        tri,
                        srcs_ar.clone(),
                        "simtri_sas",
                        &mut pending,
                    );
                    // SSA is ambiguous unless the side opposite the angle is
                    // the longer one.
                    if distance(self.pos(c), self.pos(b))
                        > distance(self.pos(c), self.pos(a)) + ATOM
                    {
                        probe(
                            &mut ssa,
                            (a1.key(), r2.key(), orient),
                            tri,
                            srcs_ar,
                            "simtri_ssa",
                            &mut pending,
                        );
                    }
                }
            }
        }

        let mut changed = false;
        for (t1, t2, srcs, rule) in pending {
            changed |= self.force_similar(t1, t2, &srcs, rule)?;
        }
        Ok(changed)
    }

    /// Assert two triangles similar: two directed-angle equalities (signed by
    /// the numeric orientations) and two side-ratio equalities.
    fn force_similar(
        &mut self,
        t1: Tri,
        t2: Tri,
        srcs: &BTreeSet<ProofId>,
        rule: &'static str,
    ) -> Result<bool, DdarError> {
        if self.known_similar.contains(&(t1, t2)) {
            return Ok(false);
        }
        let (a, b, c) = t1;
        let (d, e, f) = t2;
        let s1 = num::orientation(self.pos(a), self.pos(b), self.pos(c));
        let s2 = num::orientation(self.pos(d), self.pos(e), self.pos(f));
        if s1 == 0 || s2 == 0 {
            return Ok(false);
        }
        let statement = format!(
            "simtri({} {} {}, {} {} {})",
            self.name(a),
            self.name(b),
            self.name(c),
            self.name(d),
            self.name(e),
            self.name(f)
        );
        let node = self.add_node(rule, statement, srcs);
        let causes = BTreeSet::from([node]);
        let same_hand = s1 == s2;

        let mut changed = false;
        // Angles at the first and third vertex of the correspondence.
        for ((p, q, r), (u, v, w)) in [((a, b, c), (d, e, f)), ((c, b, a), (f, e, d))] {
            let (Some(pq), Some(pr), Some(uv), Some(uw)) = (
                self.try_dir_var(p, q),
                self.try_dir_var(p, r),
                self.try_dir_var(u, v),
                self.try_dir_var(u, w),
            ) else {
                continue;
            };
            let lhs = &LinComb::var(pq) - &LinComb::var(pr);
            let rhs = &LinComb::var(uv) - &LinComb::var(uw);
            let comb = if same_hand { &lhs - &rhs } else { &lhs + &rhs };
            changed |= self.angles.force_zero(&Angle(comb), &causes)?;
        }
        // |pr|/|pq| matches on both sides, for the same two vertices.
        for ((p, q, r), (u, v, w)) in [((a, b, c), (d, e, f)), ((c, b, a), (f, e, d))] {
            let (Some(pq), Some(pr), Some(uv), Some(uw)) = (
                self.try_mul_var(p, q),
                self.try_mul_var(p, r),
                self.try_mul_var(u, v),
                self.try_mul_var(u, w),
            ) else {
                continue;
            };
            let lhs = &LinComb::var(pr) - &LinComb::var(pq);
            let rhs = &LinComb::var(uw) - &LinComb::var(uv);
            changed |= self.dmul.force_one(&DistMul(&lhs - &rhs), &causes)?;
        }

        for image in sim_images(t1, t2) {
            self.known_similar.insert(image);
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Pass 2: concyclic by angle
    // ------------------------------------------------------------------

    fn pass_concyclic_by_angle(&mut self) -> Result<bool, DdarError> {
        let pts = self.alive_points();
        let mut pending_coll: Vec<(Vec<PointId>, BTreeSet<ProofId>)> = Vec::new();
        let mut pending_cyc: Vec<(Vec<PointId>, Vec<PointId>, BTreeSet<ProofId>)> = Vec::new();

        for (i, &a) in pts.iter().enumerate() {
            for &b in &pts[i + 1..] {
                // Bucket every third point by its inscribed angle on chord ab.
                let mut buckets: Vec<(CombKey, Vec<PointId>, BTreeSet<ProofId>, LinComb)> =
                    Vec::new();
                let mut center_cands: Vec<(PointId, LinComb, BTreeSet<ProofId>)> = Vec::new();
                for &c in &pts {
                    if c == a || c == b {
                        continue;
                    }
                    let (Some(da), Some(db)) = (self.cached_dir(c, a), self.cached_dir(c, b))
                    else {
                        continue;
                    };
                    let kappa = self.angles.core.canon(&da.0 - &db.0);
                    if kappa.is_empty() {
                        if !self.check_collinear(&[a, b, c]) {
                            pending_coll
                                .push((vec![a, b, c], kappa.sources().iter().copied().collect()));
                        }
                    } else {
                        let key = kappa.key();
                        match buckets.iter_mut().find(|(k, ..)| *k == key) {
                            Some((_, members, srcs, _)) => {
                                members.push(c);
                                srcs.extend(kappa.sources().iter().copied());
                            }
                            None => buckets.push((
                                key,
                                vec![c],
                                kappa.sources().iter().copied().collect(),
                                kappa.clone(),
                            )),
                        }
                    }
                    // Equidistant from a and b: candidate center.
                    if let (Some(ma), Some(mb)) = (self.cached_mul(c, a), self.cached_mul(c, b)) {
                        let diff = &ma.0 - &mb.0;
                        if diff.is_empty() {
                            let mut srcs: BTreeSet<ProofId> =
                                diff.sources().iter().copied().collect();
                            srcs.extend(kappa.sources().iter().copied());
                            center_cands.push((c, kappa, srcs));
                        }
                    }
                }

                for (_, members, srcs, _) in &buckets {
                    if members.len() < 2 {
                        continue;
                    }
                    let mut rim = vec![a, b];
                    rim.extend(members.iter().copied());
                    if self.check_concyclic(&rim, &[]) || self.spanning_triple(&rim).is_none() {
                        continue;
                    }
                    pending_cyc.push((rim, Vec::new(), srcs.clone()));
                }

                // The central angle doubles the inscribed angle.
                for (o, kappa_o, osrcs) in &center_cands {
                    for (_, members, srcs, kappa) in &buckets {
                        if members.contains(o) {
                            continue;
                        }
                        let doubled = kappa.scaled(&Rat::from_integer(2.into()));
                        let test = self.angles.core.canon(kappa_o - &doubled);
                        if !test.is_empty() {
                            continue;
                        }
                        let mut rim = vec![a, b];
                        rim.extend(members.iter().copied());
                        if self.check_concyclic(&rim, &[*o]) || self.spanning_triple(&rim).is_none()
                        {
                            continue;
                        }
                        let mut all = srcs.clone();
                        all.extend(osrcs.iter().copied());
                        all.extend(test.sources().iter().copied());
                        pending_cyc.push((rim, vec![*o], all));
                    }
                }
            }
        }

        let mut changed = false;
        for (pts, srcs) in pending_coll {
            if self.check_collinear(&pts) {
                continue;
            }
            let statement = format!("coll({})", self.render_points(&pts));
            let node = self.add_node("coll_from_angle", statement, &srcs);
            changed |= self.force_collinear(pts, node)?;
        }
        for (rim, centers, srcs) in pending_cyc {
            if self.check_concyclic(&rim, &centers) {
                continue;
            }
            let statement = if centers.is_empty() {
                format!("cyclic({})", self.render_points(&rim))
            } else {
                format!(
                    "cyclic_with_centers({}; {})",
                    self.render_points(&centers),
                    self.render_points(&rim)
                )
            };
            let rule = if centers.is_empty() {
                "cyclic_from_angle"
            } else {
                "center_from_angle"
            };
            let node = self.add_node(rule, statement, &srcs);
            changed |= self.force_concyclic(rim, centers, node)?;
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Pass 3: equal-radius circles
    // ------------------------------------------------------------------

    fn pass_equal_radius_circles(&mut self) -> Result<bool, DdarError> {
        self.small_circles.clear();
        let pts = self.alive_points();
        let mut pending: Vec<(PointId, Vec<PointId>, BTreeSet<ProofId>)> = Vec::new();

        for &o in &pts {
            let mut buckets: Vec<(CombKey, Vec<PointId>, BTreeSet<ProofId>)> = Vec::new();
            for &x in &pts {
                if x == o {
                    continue;
                }
                let Some(m) = self.cached_mul(o, x) else {
                    continue;
                };
                let key = m.0.key();
                match buckets.iter_mut().find(|(k, ..)| *k == key) {
                    Some((_, members, srcs)) => {
                        members.push(x);
                        srcs.extend(m.0.sources().iter().copied());
                    }
                    None => {
                        buckets.push((key, vec![x], m.0.sources().iter().copied().collect()))
                    }
                }
            }
            for (_, members, srcs) in buckets {
                if members.len() >= 3 && self.spanning_triple(&members).is_some() {
                    if !self.check_concyclic(&members, &[o]) {
                        pending.push((o, members, srcs));
                    }
                } else if members.len() == 2 {
                    self.small_circles.push((o, members[0], members[1]));
                }
            }
        }

        let mut changed = false;
        for (o, members, srcs) in pending {
            if self.check_concyclic(&members, &[o]) {
                continue;
            }
            let statement = format!(
                "cyclic_with_centers({}; {})",
                self.name(o),
                self.render_points(&members)
            );
            let node = self.add_node("circle_from_radii", statement, &srcs);
            changed |= self.force_concyclic(members, vec![o], node)?;
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Pass 4: point merging
    // ------------------------------------------------------------------

    fn pass_merge_points(&mut self) -> Result<bool, DdarError> {
        let pts = self.alive_points();
        let mut changed = false;
        for (i, &a0) in pts.iter().enumerate() {
            for &b0 in &pts[i + 1..] {
                let (a, b) = (self.canonical(a0), self.canonical(b0));
                if a == b || !close(self.pos(a), self.pos(b)) {
                    continue;
                }
                // Witness objects that carry both points, with the direction
                // of each object at the shared location.
                let mut witnesses: Vec<(f64, BTreeSet<ProofId>)> = Vec::new();
                for (_, line) in self.live_lines() {
                    if line.contains(a) && line.contains(b) {
                        witnesses.push((line.value.direction(), line.sources.clone()));
                    }
                }
                for (_, circle) in self.live_circles() {
                    if circle.contains(a) && circle.contains(b) {
                        witnesses
                            .push((circle.value.tangent_direction(self.pos(a)), circle.sources.clone()));
                    }
                }
                for &(o, p, q) in &self.small_circles {
                    let (o, p, q) = (self.canonical(o), self.canonical(p), self.canonical(q));
                    if (p, q) != (a, b) && (q, p) != (a, b) {
                        continue;
                    }
                    let ring = NumCircle::new(self.pos(o), distance(self.pos(o), self.pos(a)));
                    let mut srcs = BTreeSet::new();
                    if let Some(m) = self.cached_mul(o, p) {
                        srcs.extend(m.0.sources().iter().copied());
                    }
                    if let Some(m) = self.cached_mul(o, q) {
                        srcs.extend(m.0.sources().iter().copied());
                    }
                    witnesses.push((ring.tangent_direction(self.pos(a)), srcs));
                }

                // Two transversal witnesses pin the point.
                let hit = (0..witnesses.len()).find_map(|x| {
                    (x + 1..witnesses.len())
                        .find(|&y| dist_mod1(witnesses[x].0 - witnesses[y].0) >= ATOM)
                        .map(|y| (x, y))
                });
                if let Some((x, y)) = hit {
                    let mut srcs = witnesses[x].1.clone();
                    srcs.extend(witnesses[y].1.iter().copied());
                    let statement = format!("overlap({} {})", self.name(a), self.name(b));
                    let node = self.add_node("merge", statement, &srcs);
                    self.force_equal_points(a, b, node)?;
                    changed = true;
                }
            }
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Pass 5: add↔mul distance transfer
    // ------------------------------------------------------------------

    fn pass_transfer_add_mul(&mut self) -> Result<bool, DdarError> {
        let pts = self.alive_points();
        let mut pairs: Vec<(PointId, PointId)> = Vec::new();
        for (i, &a) in pts.iter().enumerate() {
            for &b in &pts[i + 1..] {
                if self.try_mul_var(a, b).is_some() && self.try_add_var(a, b).is_some() {
                    pairs.push((a, b));
                }
            }
        }
        let mut changed = false;

        // Mul → add: log combs equal up to a constant force the rational
        // ratio additively.
        let mut by_mul: FxHashMap<CombKey, Vec<(PointId, PointId, LinComb, BTreeSet<ProofId>)>> =
            FxHashMap::default();
        for &(a, b) in &pairs {
            let m = self.cached_mul(a, b).expect("pair has a mul var").clone();
            let (var_part, const_part) = self.dmul.core.split_const(&m.0);
            by_mul.entry(var_part.key()).or_default().push((
                a,
                b,
                const_part,
                m.0.sources().iter().copied().collect(),
            ));
        }
        let mut mul_groups: Vec<_> = by_mul.into_iter().collect();
        mul_groups.sort_by(|(k1, _), (k2, _)| k1.cmp(k2));
        for (_, group) in mul_groups {
            if group.len() < 2 {
                continue;
            }
            let (a0, b0, base_const, base_srcs) = &group[0];
            for (a, b, konst, srcs) in &group[1..] {
                let diff = konst - base_const;
                let Some(ratio) = self.dmul.as_const_ratio(&DistMul(diff)) else {
                    continue;
                };
                let (Some(sa), Some(sb)) = (self.try_add_var(*a, *b), self.try_add_var(*a0, *b0))
                else {
                    continue;
                };
                // |ab| = (p/q)·|a0 b0|  ⇒  q·s(ab) − p·s(a0 b0) = 0.
                let mut comb = LinComb::term(sa, Rat::from_integer(ratio.denom().clone()));
                comb.add_term(sb, -Rat::from_integer(ratio.numer().clone()));
                if self.dadd.is_zero(&DistAdd(comb.clone())) {
                    continue;
                }
                let statement = format!(
                    "|{} {}| = {}·|{} {}|",
                    self.name(*a),
                    self.name(*b),
                    ratio,
                    self.name(*a0),
                    self.name(*b0)
                );
                let mut all = base_srcs.clone();
                all.extend(srcs.iter().copied());
                let node = self.add_node("transfer_mul_to_add", statement, &all);
                changed |= self.dadd.force_zero(&DistAdd(comb), &BTreeSet::from([node]))?;
            }
        }

        // Add → mul: segment combs proportional by a rational scalar force
        // the log constant multiplicatively.
        let mut by_add: FxHashMap<CombKey, Vec<(PointId, PointId, Rat, BTreeSet<ProofId>)>> =
            FxHashMap::default();
        for &(a, b) in &pairs {
            let v = self.try_add_var(a, b).expect("pair has an add var");
            let red = self.dadd.simplify(&DistAdd(LinComb::var(v)));
            let Some((norm, lead)) = red.0.normalized() else {
                continue;
            };
            by_add.entry(norm.key()).or_default().push((
                a,
                b,
                lead,
                red.0.sources().iter().copied().collect(),
            ));
        }
        let mut add_groups: Vec<_> = by_add.into_iter().collect();
        add_groups.sort_by(|(k1, _), (k2, _)| k1.cmp(k2));
        for (_, group) in add_groups {
            if group.len() < 2 {
                continue;
            }
            let (a0, b0, lead0, base_srcs) = &group[0];
            for (a, b, lead, srcs) in &group[1..] {
                let ratio = lead / lead0;
                if !ratio.is_positive() {
                    continue;
                }
                let (Some(ma), Some(mb)) = (self.try_mul_var(*a, *b), self.try_mul_var(*a0, *b0))
                else {
                    continue;
                };
                let Ok(konst) = self.dmul.const_ratio(&ratio) else {
                    continue;
                };
                let comb = &(&LinComb::var(ma) - &LinComb::var(mb)) - &konst.0;
                if self.dmul.is_one(&DistMul(comb.clone())) {
                    continue;
                }
                let statement = format!(
                    "|{} {}| / |{} {}| = {}",
                    self.name(*a),
                    self.name(*b),
                    self.name(*a0),
                    self.name(*b0),
                    ratio
                );
                let mut all = base_srcs.clone();
                all.extend(srcs.iter().copied());
                let node = self.add_node("transfer_add_to_mul", statement, &all);
                changed |= self.dmul.force_one(&DistMul(comb), &BTreeSet::from([node]))?;
            }
        }
        Ok(changed)
    }

    // ------------------------------------------------------------------
    // Pass 6: arc ↔ chord
    // ------------------------------------------------------------------

    fn pass_arc_chord(&mut self) -> Result<bool, DdarError> {
        let ids: Vec<_> = self
            .live_circles()
            .filter(|(_, c)| c.points.len() >= 4)
            .map(|(id, _)| id)
            .collect();
        let mut changed = false;

        for id in ids {
            let Some(circle) = self.circle(id) else { continue };
            let pts = circle.points.clone();
            let center = circle.value.center;
            let circle_srcs = circle.sources.clone();

            // One entry per chord, oriented positively around the center.
            struct ChordEntry {
                p: PointId,
                q: PointId,
                arc: LinComb,
                arc_val: f64,
                chord: LinComb,
                srcs: BTreeSet<ProofId>,
            }
            let mut entries: Vec<ChordEntry> = Vec::new();
            for (i, &p0) in pts.iter().enumerate() {
                for &q0 in &pts[i + 1..] {
                    let (p, q) =
                        if num::orientation(center, self.pos(p0), self.pos(q0)) >= 0 {
                            (p0, q0)
                        } else {
                            (q0, p0)
                        };
                    let Some(&w) = pts.iter().find(|&&w| w != p && w != q) else {
                        continue;
                    };
                    let (Some(dq), Some(dp)) = (self.cached_dir(q, w), self.cached_dir(p, w))
                    else {
                        continue;
                    };
                    let Some(chord) = self.cached_mul(p, q) else { continue };
                    let arc = self.angles.core.canon(&dq.0 - &dp.0);
                    let arc_val = mod1(self.angles.core.value_of(&arc));
                    let mut srcs: BTreeSet<ProofId> = circle_srcs.clone();
                    srcs.extend(arc.sources().iter().copied());
                    srcs.extend(chord.0.sources().iter().copied());
                    entries.push(ChordEntry {
                        p,
                        q,
                        arc,
                        arc_val,
                        chord: chord.0.clone(),
                        srcs,
                    });
                }
            }

            // Equal arcs (up to sign) subtend equal chords.
            let mut by_arc: FxHashMap<CombKey, Vec<usize>> = FxHashMap::default();
            for (idx, e) in entries.iter().enumerate() {
                let k1 = e.arc.key();
                let k2 = self.angles.core.canon(-&e.arc).key();
                by_arc.entry(k1.min(k2)).or_default().push(idx);
            }
            let mut arc_groups: Vec<_> = by_arc.into_iter().collect();
            arc_groups.sort_by(|(k1, _), (k2, _)| k1.cmp(k2));
            for (_, group) in arc_groups {
                for pair in group.windows(2) {
                    let (e0, e1) = (&entries[pair[0]], &entries[pair[1]]);
                    let comb = &e0.chord - &e1.chord;
                    if self.dmul.is_one(&DistMul(comb.clone())) {
                        continue;
                    }
                    let statement = format!(
                        "cong({} {}, {} {})",
                        self.name(e0.p),
                        self.name(e0.q),
                        self.name(e1.p),
                        self.name(e1.q)
                    );
                    let mut srcs = e0.srcs.clone();
                    srcs.extend(e1.srcs.iter().copied());
                    let node = self.add_node("arc_to_chord", statement, &srcs);
                    changed |= self.dmul.force_one(&DistMul(comb), &BTreeSet::from([node]))?;
                }
            }

            // Equal chords subtend equal arcs, with the sign picked by the
            // numeric oracle.
            let mut by_chord: FxHashMap<CombKey, Vec<usize>> = FxHashMap::default();
            for (idx, e) in entries.iter().enumerate() {
                by_chord.entry(e.chord.key()).or_default().push(idx);
            }
            let mut chord_groups: Vec<_> = by_chord.into_iter().collect();
            chord_groups.sort_by(|(k1, _), (k2, _)| k1.cmp(k2));
            for (_, group) in chord_groups {
                for pair in group.windows(2) {
                    let (e0, e1) = (&entries[pair[0]], &entries[pair[1]]);
                    let comb = if dist_mod1(e0.arc_val - e1.arc_val) < ATOM {
                        &e0.arc - &e1.arc
                    } else if dist_mod1(e0.arc_val + e1.arc_val) < ATOM {
                        &e0.arc + &e1.arc
                    } else {
                        continue;
                    };
                    let comb = self.angles.core.canon(comb);
                    if self.angles.is_zero(&Angle(comb.clone())) {
                        continue;
                    }
                    let statement = format!(
                        "arc({} {}) = arc({} {})",
                        self.name(e0.p),
                        self.name(e0.q),
                        self.name(e1.p),
                        self.name(e1.q)
                    );
                    let mut srcs = e0.srcs.clone();
                    srcs.extend(e1.srcs.iter().copied());
                    let node = self.add_node("chord_to_arc", statement, &srcs);
                    changed |= self.angles.force_zero(&Angle(comb), &BTreeSet::from([node]))?;
                }
            }
        }
        Ok(changed)
    }
}

type TableSlot = (Tri, BTreeSet<ProofId>);
type PendingSim = (Tri, Tri, BTreeSet<ProofId>, &'static str);

/// Insert a triangle under its invariant key; a collision with a different
/// ordered triple enqueues a similarity. The first occupant stays.
fn probe<K: std::hash::Hash + Eq>(
    table: &mut FxHashMap<K, TableSlot>,
    key: K,
    tri: Tri,
    srcs: BTreeSet<ProofId>,
    rule: &'static str,
    pending: &mut Vec<PendingSim>,
) {
    use std::collections::hash_map::Entry;
    match table.entry(key) {
        Entry::Occupied(prev) => {
            let (other, other_srcs) = prev.get();
            // A permuted ordering of the same triangle is a real collision
            // (isoceles and equilateral self-similarities); only the
            // identical ordered triple is vacuous.
            if *other != tri {
                let mut all = other_srcs.clone();
                all.extend(srcs);
                pending.push((*other, tri, all, rule));
            }
        }
        Entry::Vacant(slot) => {
            slot.insert((tri, srcs));
        }
    }
}

/// The twelve images of a similarity under simultaneous vertex permutation
/// and side swap.
fn sim_images(t1: Tri, t2: Tri) -> Vec<(Tri, Tri)> {
    const PERMS: [[usize; 3]; 6] = [
        [0, 1, 2],
        [1, 2, 0],
        [2, 0, 1],
        [0, 2, 1],
        [2, 1, 0],
        [1, 0, 2],
    ];
    let a = [t1.0, t1.1, t1.2];
    let b = [t2.0, t2.1, t2.2];
    let mut out = Vec::with_capacity(12);
    for p in PERMS {
        let u = (a[p[0]], a[p[1]], a[p[2]]);
        let v = (b[p[0]], b[p[1]], b[p[2]]);
        out.push((u, v));
        out.push((v, u));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CheckOutcome;
    use crate::pred::Pred;

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

    fn close_all(e: &mut Ddar) {
        e.deduction_closure(&ClosureOpts::default()).unwrap();
    }

    fn r(n: i64, d: i64) -> Rat {
        Rat::new(n.into(), d.into())
    }

    #[test]
    fn sss_collision_yields_similarity_and_symmetry_images() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 4.0, 0.0),
            ("c", 1.0, 2.0),
            ("d", 10.0, 0.0),
            ("e", 14.0, 0.0),
            ("f", 11.0, 2.0),
        ]);
        for (u, v, x, y) in [("a", "b", "d", "e"), ("a", "c", "d", "f"), ("b", "c", "e", "f")] {
            let p = pred(&e, "cong", &[u, v, x, y]);
            e.force_pred(&p).unwrap();
        }
        close_all(&mut e);

        let id = |n: &str| e.point_by_name(n).unwrap();
        let t1 = (id("a"), id("b"), id("c"));
        let t2 = (id("d"), id("e"), id("f"));
        for image in sim_images(t1, t2) {
            assert!(e.known_similar.contains(&image), "missing image {image:?}");
        }
        // The similarity carried its angle equalities into the angle system.
        let goal = pred(&e, "eqangle", &["a", "b", "a", "c", "d", "e", "d", "f"]);
        assert_eq!(e.check_pred(&goal).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn right_angles_on_a_chord_become_concyclic() {
        let s = 2.0f64.sqrt();
        let mut e = engine(&[
            ("d", 0.0, 0.0),
            ("c", 4.0, 0.0),
            ("p", 2.0, 2.0),
            ("q", 2.0 + s, s),
        ]);
        for name in [["p", "d", "p", "c"], ["q", "d", "q", "c"]] {
            let p = pred(&e, "perp", &name);
            e.force_pred(&p).unwrap();
        }
        close_all(&mut e);
        let goal = pred(&e, "cyclic", &["d", "c", "p", "q"]);
        assert_eq!(e.check_pred(&goal).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn equal_radii_build_a_circle_with_center() {
        let mut e = engine(&[
            ("o", 0.0, 0.0),
            ("a", 2.0, 0.0),
            ("b", 0.0, 2.0),
            ("c", -2.0, 0.0),
        ]);
        for pts in [["o", "a", "o", "b"], ["o", "b", "o", "c"]] {
            let p = pred(&e, "cong", &pts);
            e.force_pred(&p).unwrap();
        }
        close_all(&mut e);
        let goal = pred_k(
            &e,
            "cyclic_with_centers",
            &["o", "a", "b", "c"],
            &[r(1, 1)],
        );
        assert_eq!(e.check_pred(&goal).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn merge_via_two_lines() {
        let mut e = engine(&[
            ("a", 0.0, 0.0),
            ("b", 2.0, 2.0),
            ("c", 0.0, 2.0),
            ("d", 2.0, 0.0),
            ("x", 1.0, 1.0),
            ("y", 1.0, 1.0),
            ("z", 5.0, 0.0),
        ]);
        for pts in [
            vec!["a", "b", "x"],
            vec!["a", "b", "y"],
            vec!["c", "d", "x"],
            vec!["c", "d", "y"],
        ] {
            let p = pred(&e, "coll", &pts);
            e.force_pred(&p).unwrap();
        }
        close_all(&mut e);
        let goal = pred(&e, "overlap", &["x", "y"]);
        assert_eq!(e.check_pred(&goal).unwrap(), CheckOutcome::Proved);
        assert_eq!(e.alive_points().len(), 6);
        // Distances to the survivor agree from anywhere.
        let cong = pred(&e, "cong", &["z", "x", "z", "y"]);
        assert_eq!(e.check_pred(&cong).unwrap(), CheckOutcome::Proved);
        // A proof trace exists for the merge.
        let trace = e.get_proof(&goal).unwrap().unwrap();
        assert!(trace.contains("overlap"));
    }

    #[test]
    fn midpoint_ratio_crosses_between_systems() {
        let mut e = engine(&[("a", 0.0, 0.0), ("b", 2.0, 0.0), ("c", 4.0, 0.0)]);
        let coll = pred(&e, "coll", &["a", "b", "c"]);
        e.force_pred(&coll).unwrap();
        let half = pred(&e, "cong", &["a", "b", "b", "c"]);
        e.force_pred(&half).unwrap();
        close_all(&mut e);
        // |ac| / |ab| = 2 exists only through the add system's segment law.
        let goal = pred_k(&e, "rconst", &["a", "c", "a", "b"], &[r(2, 1)]);
        assert_eq!(e.check_pred(&goal).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn equal_chords_rotate_around_a_circle() {
        let mut e = engine(&[
            ("o", 0.0, 0.0),
            ("a", 1.0, 0.0),
            ("b", 0.0, 1.0),
            ("c", -1.0, 0.0),
            ("d", 0.0, -1.0),
        ]);
        let cyc = pred_k(
            &e,
            "cyclic_with_centers",
            &["o", "a", "b", "c", "d"],
            &[r(1, 1)],
        );
        e.force_pred(&cyc).unwrap();
        for pts in [["a", "b", "b", "c"], ["b", "c", "c", "d"]] {
            let p = pred(&e, "cong", &pts);
            e.force_pred(&p).unwrap();
        }
        close_all(&mut e);
        // The diagonals span two equal arcs each, so they are congruent.
        let goal = pred(&e, "cong", &["a", "c", "b", "d"]);
        assert_eq!(e.check_pred(&goal).unwrap(), CheckOutcome::Proved);
    }

    #[test]
    fn closure_is_idempotent() {
        let mut e = engine(&[
            ("o", 0.0, 0.0),
            ("a", 2.0, 0.0),
            ("b", 0.0, 2.0),
            ("c", -2.0, 0.0),
        ]);
        for pts in [["o", "a", "o", "b"], ["o", "b", "o", "c"]] {
            let p = pred(&e, "cong", &pts);
            e.force_pred(&p).unwrap();
        }
        close_all(&mut e);
        let lines = e.live_lines().count();
        let circles = e.live_circles().count();
        let sims = e.known_similar.len();
        let pivots = (
            e.angles.core.pivots().len(),
            e.dmul.core.pivots().len(),
            e.dadd.core.pivots().len(),
        );
        close_all(&mut e);
        assert_eq!(lines, e.live_lines().count());
        assert_eq!(circles, e.live_circles().count());
        assert_eq!(sims, e.known_similar.len());
        assert_eq!(
            pivots,
            (
                e.angles.core.pivots().len(),
                e.dmul.core.pivots().len(),
                e.dadd.core.pivots().len(),
            )
        );
    }

    #[test]
    fn round_budget_stops_early() {
        let mut e = engine(&[("a", 0.0, 0.0), ("b", 1.0, 0.0), ("c", 2.0, 0.0)]);
        let p = pred(&e, "coll", &["a", "b", "c"]);
        e.force_pred(&p).unwrap();
        let opts = ClosureOpts {
            max_rounds: Some(1),
            ..ClosureOpts::default()
        };
        e.deduction_closure(&opts).unwrap();
    }
}
