//! Predicate surface
//!
//! The engine consumes predicate objects: a recognized name, a point list,
//! and rational constants. This module owns the name enumeration, arity
//! validation, and point substitution; the translation into equations and
//! database actions lives in the engine.

#![forbid(unsafe_code)]
#![allow(missing_docs)]

use std::fmt;
use std::str::FromStr;

use num_traits::ToPrimitive;
use rustc_hash::FxHashMap;

use crate::geom::PointId;
use crate::Rat;

/// Errors raised while building or validating a predicate.
#[derive(Debug, thiserror::Error)]
pub enum PredError {
    #[error("unknown predicate name `{0}`")]
    UnknownName(String),
    #[error("malformed `{name}` predicate: {reason} (got {points} points, {constants} constants)")]
    BadShape {
        name: PredName,
        reason: &'static str,
        points: usize,
        constants: usize,
    },
}

/// Recognized predicate kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum PredName {
    Coll,
    Cyclic,
    CyclicWithCenters,
    Para,
    Perp,
    SAngle,
    AConst,
    EqAngle,
    AngEq,
    Cong,
    EqRatio,
    RConst,
    DistMeq,
    DistSeq,
    Overlap,
    ACompute,
}

impl PredName {
    pub fn as_str(self) -> &'static str {
        match self {
            PredName::Coll => "coll",
            PredName::Cyclic => "cyclic",
            PredName::CyclicWithCenters => "cyclic_with_centers",
            PredName::Para => "para",
            PredName::Perp => "perp",
            PredName::SAngle => "s_angle",
            PredName::AConst => "aconst",
            PredName::EqAngle => "eqangle",
            PredName::AngEq => "angeq",
            PredName::Cong => "cong",
            PredName::EqRatio => "eqratio",
            PredName::RConst => "rconst",
            PredName::DistMeq => "distmeq",
            PredName::DistSeq => "distseq",
            PredName::Overlap => "overlap",
            PredName::ACompute => "acompute",
        }
    }
}

impl fmt::Display for PredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PredName {
    type Err = PredError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "coll" => PredName::Coll,
            "cyclic" => PredName::Cyclic,
            "cyclic_with_centers" => PredName::CyclicWithCenters,
            "para" => PredName::Para,
            "perp" => PredName::Perp,
            "s_angle" => PredName::SAngle,
            "aconst" => PredName::AConst,
            "eqangle" => PredName::EqAngle,
            "angeq" => PredName::AngEq,
            "cong" => PredName::Cong,
            "eqratio" => PredName::EqRatio,
            "rconst" => PredName::RConst,
            "distmeq" => PredName::DistMeq,
            "distseq" => PredName::DistSeq,
            "overlap" => PredName::Overlap,
            "acompute" => PredName::ACompute,
            other => return Err(PredError::UnknownName(other.to_string())),
        })
    }
}

/// A predicate instance over engine points.
#[derive(Debug, Clone)]
pub struct Pred {
    pub name: PredName,
    pub points: Vec<PointId>,
    pub constants: Vec<Rat>,
}

impl Pred {
    /// Build and shape-check a predicate.
    pub fn new(name: PredName, points: Vec<PointId>, constants: Vec<Rat>) -> Result<Self, PredError> {
        let pred = Self {
            name,
            points,
            constants,
        };
        pred.validate()?;
        Ok(pred)
    }

    fn bad(&self, reason: &'static str) -> PredError {
        PredError::BadShape {
            name: self.name,
            reason,
            points: self.points.len(),
            constants: self.constants.len(),
        }
    }

    /// Arity and shape validation.
    pub fn validate(&self) -> Result<(), PredError> {
        let np = self.points.len();
        let nc = self.constants.len();
        let ok = match self.name {
            PredName::Coll => np >= 3 && nc == 0,
            PredName::Cyclic => np >= 4 && nc == 0,
            PredName::CyclicWithCenters => {
                // constants[0] = number of leading center points.
                nc == 1
                    && self.center_count().is_some()
                    && np >= self.center_count().unwrap_or(usize::MAX) + 2
            }
            PredName::Para | PredName::Perp => np == 4 && nc == 0,
            PredName::SAngle => np == 3 && nc == 1,
            PredName::AConst => np == 4 && nc == 1,
            PredName::EqAngle | PredName::EqRatio => np == 8 && nc == 0,
            PredName::AngEq | PredName::DistMeq | PredName::DistSeq => {
                np >= 2 && np % 2 == 0 && nc == np / 2 + 1
            }
            PredName::Cong => np == 4 && nc == 0,
            PredName::RConst => np == 4 && nc == 1,
            PredName::Overlap => np == 2 && nc == 0,
            PredName::ACompute => np == 4 && nc == 0,
        };
        if ok {
            Ok(())
        } else {
            Err(self.bad("wrong arity"))
        }
    }

    /// For `cyclic_with_centers`: how many leading points are centers.
    pub fn center_count(&self) -> Option<usize> {
        self.constants.first().and_then(|k| {
            if k.is_integer() {
                k.numer().to_usize()
            } else {
                None
            }
        })
    }

    /// Substituted copy: each point replaced by its image under `map`
    /// (points absent from the map are kept).
    pub fn replace_points(&self, map: &FxHashMap<PointId, PointId>) -> Pred {
        Pred {
            name: self.name,
            points: self
                .points
                .iter()
                .map(|p| *map.get(p).unwrap_or(p))
                .collect(),
            constants: self.constants.clone(),
        }
    }
}
