#![allow(clippy::new_without_default)]

//! Canonical LR(1) table generation. Given a [`cfgram::Grammar`], this
//! library computes the canonical collection of LR(1) item sets (the
//! [`StateGraph`](stategraph/struct.StateGraph.html)) and from it a
//! deterministic action table (the
//! [`StateTable`](statetable/struct.StateTable.html)) usable by a
//! table-driven bottom-up parser.
//!
//! This is the canonical construction, not LALR: two states with equal cores
//! but different lookaheads are kept distinct. Shift/reduce and
//! reduce/reduce conflicts are resolved with a fixed, documented policy
//! (shift wins; the later-numbered production wins) and reported alongside
//! the finished table rather than aborting generation.

use std::hash::Hash;

use cfgram::Grammar;
use num_traits::{AsPrimitive, PrimInt, Unsigned};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

mod builder;
mod itemset;
mod stategraph;
pub mod statetable;

pub use crate::stategraph::StateGraph;
pub use crate::statetable::{Action, Conflict, StateTable};

pub(crate) type StIdxStorageT = u32;

/// `StIdx` is a wrapper for a state index. State indices are assigned
/// sequentially in discovery order, starting from 0 for the initial
/// (augmented) state.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StIdx(StIdxStorageT);

impl StIdx {
    pub(crate) fn max_value() -> StIdx {
        StIdx(StIdxStorageT::MAX)
    }
}

impl From<usize> for StIdx {
    fn from(v: usize) -> Self {
        if v > StIdxStorageT::MAX as usize {
            panic!("Overflow");
        }
        StIdx(v as StIdxStorageT)
    }
}

impl From<StIdx> for usize {
    fn from(st: StIdx) -> Self {
        st.0 as usize
    }
}

impl From<StIdx> for u32 {
    fn from(st: StIdx) -> Self {
        st.0
    }
}

/// Build the canonical LR(1) automaton and action table for `grm`.
/// Construction always runs to completion: ambiguities surface as
/// [`Conflict`](statetable/enum.Conflict.html) records on the returned
/// [`StateTable`], never as errors.
pub fn from_grammar<StorageT: 'static + Hash + PrimInt + Unsigned>(
    grm: &Grammar<StorageT>,
) -> (StateGraph<StorageT>, StateTable<StorageT>)
where
    usize: AsPrimitive<StorageT>,
{
    let firsts = grm.firsts();
    let sg = builder::build_stategraph(grm, &firsts);
    let st = StateTable::new(grm, &sg);
    (sg, st)
}
