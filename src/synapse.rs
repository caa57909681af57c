//! Synapses and permanence arithmetic.
//!
//! A synapse carries a permanence value in `[0, 1]` and a cached
//! `connected` flag that is recomputed on every permanence assignment
//! (`connected ⇔ permanence ≥ connected_perm`). Proximal synapses point at
//! a coordinate in an input data space; distal synapses point at another
//! cell in the same region.
//!
//! Reinforcement uses a deferred-clamp pattern: every synapse on a segment
//! is first decremented without a floor, then the active subset gets
//! `inc + dec` added back, and finally all permanences are clamped to 0.
//! This computes `active ? +inc : −dec` in two linear passes without
//! tracking membership, and without double-clamping the net increment.

use serde::{Deserialize, Serialize};

use crate::cell::CellId;

/// Learning parameters shared by a class of synapses (proximal or distal).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SynapseParams {
    /// Synapses with permanence at or above this value are connected.
    pub connected_perm: f32,
    /// Permanence assigned to newly created distal synapses.
    pub initial_perm: f32,
    /// Amount permanences are incremented during learning.
    pub perm_inc: f32,
    /// Amount permanences are decremented during learning.
    pub perm_dec: f32,
}

impl Default for SynapseParams {
    fn default() -> Self {
        let connected_perm = 0.2;
        Self {
            connected_perm,
            initial_perm: connected_perm + 0.1,
            perm_inc: 0.015,
            perm_dec: 0.015,
        }
    }
}

/// Permanence value plus its derived connected flag.
///
/// All mutation goes through [`Permanence::set`] so the flag can never go
/// stale.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Permanence {
    value: f32,
    connected: bool,
}

impl Permanence {
    pub fn new(params: &SynapseParams, value: f32) -> Self {
        let mut p = Self::default();
        p.set(params, value);
        p
    }

    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    #[inline]
    pub fn set(&mut self, params: &SynapseParams, value: f32) {
        self.value = value;
        self.connected = value >= params.connected_perm;
    }

    /// Increase by `perm_inc`, clamped to 1.
    #[inline]
    pub fn increase(&mut self, params: &SynapseParams) {
        self.set(params, (self.value + params.perm_inc).min(1.0));
    }

    /// Increase by `amount`, clamped to `max`.
    #[inline]
    pub fn increase_by(&mut self, params: &SynapseParams, amount: f32, max: f32) {
        self.set(params, (self.value + amount).min(max));
    }

    /// Decrease by `perm_dec`, floored at 0.
    #[inline]
    pub fn decrease(&mut self, params: &SynapseParams) {
        self.set(params, (self.value - params.perm_dec).max(0.0));
    }

    /// Decrease by `amount`, floored at `min`.
    #[inline]
    pub fn decrease_by(&mut self, params: &SynapseParams, amount: f32, min: f32) {
        self.set(params, (self.value - amount).max(min));
    }

    /// Decrease by `perm_dec` with no floor; pair with
    /// [`Permanence::clamp_after_decrease`].
    #[inline]
    pub fn decrease_no_limit(&mut self, params: &SynapseParams) {
        self.set(params, self.value - params.perm_dec);
    }

    /// Restore the lower bound after a run of unfloored decrements.
    #[inline]
    pub fn clamp_after_decrease(&mut self, params: &SynapseParams) {
        if self.value < 0.0 {
            self.set(params, 0.0);
        }
    }
}

/// A lateral synapse from a cell elsewhere in the region.
///
/// The source cell is referenced by id; the synapse does not own it.
#[derive(Debug, Clone)]
pub struct DistalSynapse {
    pub perm: Permanence,
    /// The cell whose activity drives this synapse.
    pub src: CellId,
}

impl DistalSynapse {
    pub fn new(params: &SynapseParams, src: CellId, permanence: f32) -> Self {
        Self {
            perm: Permanence::new(params, permanence),
            src,
        }
    }
}

/// A feed-forward synapse from one value of an input data space.
#[derive(Debug, Clone)]
pub struct ProximalSynapse {
    pub perm: Permanence,
    /// Index into the owning region's input list.
    pub input: usize,
    /// Coordinate within the input data space.
    pub x: usize,
    pub y: usize,
    /// Value index at that coordinate.
    pub v: usize,
    /// Euclidean distance to the column's receptive-field center, in the
    /// destination region's hypercolumn coordinates.
    pub distance_to_input: f32,
}

impl ProximalSynapse {
    pub fn new(
        params: &SynapseParams,
        input: usize,
        x: usize,
        y: usize,
        v: usize,
        permanence: f32,
        distance_to_input: f32,
    ) -> Self {
        Self {
            perm: Permanence::new(params, permanence),
            input,
            x,
            y,
            v,
            distance_to_input,
        }
    }
}
