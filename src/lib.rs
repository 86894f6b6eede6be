//! Crate root: public surface, core aliases, and engine-wide invariants
//!
//! This crate implements a deductive closure engine for plane Euclidean
//! geometry ("DDAR"): given named points with concrete coordinates and a set
//! of assumed predicates, it saturates a symbolic database until every fact
//! derivable by its fixed rule set is present, and can decide and trace goal
//! predicates.
//!
//! ## Invariants (engine-wide)
//!
//! - **Exact symbolic state.** The three elimination systems (directed
//!   angles mod 1, log-distances, signed segment lengths) hold reduced
//!   row-echelon equation sets over `BigRational` coefficients. Floating
//!   point exists only in the numeric oracle (`num`), which *suggests*
//!   facts; elimination certifies them.
//!
//! - **Numeric–symbolic agreement.** Every stored defining equation
//!   evaluates below [`num::ATOM`] under the oracle. A forced fact that
//!   contradicts the oracle is a fatal, precise error — never a silent
//!   wrong state.
//!
//! - **Provenance everywhere.** Each combination carries the proof nodes
//!   witnessing every reduction that produced it; lines and circles carry
//!   the union of the assertions they were merged from. `get_proof`
//!   topologically sorts that DAG into a readable trace.
//!
//! - **Determinism.** Points scan in construction order, pivots are chosen
//!   by creation index, and collision tables hash exact rationals, so two
//!   runs produce the same lines, circles, similarities and traces.

#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms)]

/// Exact rational scalar used across the crate.
pub type Rat = num_rational::BigRational;

/// Linear combinations over named variables with provenance.
pub mod comb;
/// Gauss–Jordan elimination cores and the three domain facades.
pub mod elim;
/// Engine state, predicate translation, and the geometric database.
pub mod engine;
/// Formal line / circle records and index keys.
pub mod geom;
/// Floating-point oracle: tolerance tests, directions, lines, circles.
pub mod num;
/// Predicate names, arity validation, and substitution.
pub mod pred;
/// Proof-node arena and trace rendering.
pub mod proof;
/// The saturation passes and the outer closure loop.
pub mod saturate;
/// Convenience surface for stating whole problems over point names.
pub mod api;

pub use comb::{CombKey, LinComb, VarId};
pub use engine::{CheckOutcome, Ddar};
pub use geom::{CircleId, FormalCircle, FormalLine, LineId, PairKey, PointId, TripleKey};
pub use num::ATOM;
pub use pred::{Pred, PredError, PredName};
pub use proof::{ProofForest, ProofId, ProofNode};
pub use saturate::ClosureOpts;

/// Errors surfaced by the engine.
///
/// Numeric inconsistencies and malformed predicates are fatal for the
/// deduction that raised them; redundancy (re-asserting an implied fact) is
/// not an error and shows up as `Ok(false)` from the force routines.
#[derive(Debug, thiserror::Error)]
pub enum DdarError {
    /// An elimination core rejected a forced equation.
    #[error(transparent)]
    Elim(#[from] elim::ElimError),
    /// A predicate failed name or arity validation.
    #[error(transparent)]
    Pred(#[from] pred::PredError),
    /// A pair of numerically identical points was used where distinct
    /// points are required.
    #[error("numerically identical points `{0}` and `{1}` have no pair variables")]
    DegeneratePair(String, String),
    /// Asserted points fail a numeric collinearity / concyclicity /
    /// identity check.
    #[error("numeric mismatch: {0}")]
    NumericMismatch(String),
    /// Two construction points share a name.
    #[error("duplicate point name `{0}`")]
    DuplicateName(String),
    /// A name did not resolve to a constructed point.
    #[error("unknown point `{0}`")]
    UnknownPoint(String),
}
