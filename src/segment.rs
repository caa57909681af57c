//! Distal dendrite segments.
//!
//! A segment aggregates distal synapses and fires when enough connected
//! synapses see active source cells. Per step it caches which synapses are
//! active (by source cell id) so that later phases — and deferred update
//! records — can refer to the activity snapshot without holding references
//! into the synapse list.

use crate::cell::{Cell, CellId};
use crate::pool::{Pool, Recycle};
use crate::synapse::{DistalSynapse, SynapseParams};

pub type SegmentId = usize;

/// Upper bound on how far into the future a segment may predict.
pub const MAX_TIME_STEPS: usize = 10;

/// A distal segment owned by a cell.
///
/// `num_prediction_steps` is how many steps ahead this segment predicts its
/// cell will activate; a segment predicting exactly one step ahead is a
/// sequence segment. The flag is derived, never stored independently.
#[derive(Default)]
pub struct Segment {
    /// Active connected synapses required for the segment to fire.
    pub activation_threshold: usize,
    num_prediction_steps: usize,
    is_sequence: bool,
    /// Step counter value when this segment was created.
    pub creation_time: i64,

    pub is_active: bool,
    pub was_active: bool,

    pub synapses: Vec<DistalSynapse>,

    /// Source cells of synapses active this step (connected or not).
    pub active_synapses: Vec<CellId>,
    /// Source cells of synapses active in the previous step.
    pub prev_active_synapses: Vec<CellId>,

    pub active_connected_count: usize,
    pub prev_active_connected_count: usize,
    pub active_learning_count: usize,
    pub prev_active_learning_count: usize,
    pub connected_count: usize,
    pub prev_connected_count: usize,
}

impl Recycle for Segment {
    fn retire(&mut self) {
        self.activation_threshold = 0;
        self.num_prediction_steps = 0;
        self.is_sequence = false;
        self.creation_time = 0;
        self.is_active = false;
        self.was_active = false;
        self.synapses.clear();
        self.active_synapses.clear();
        self.prev_active_synapses.clear();
        self.active_connected_count = 0;
        self.prev_active_connected_count = 0;
        self.active_learning_count = 0;
        self.prev_active_learning_count = 0;
        self.connected_count = 0;
        self.prev_connected_count = 0;
    }
}

impl Segment {
    /// Prepare a freshly allocated segment.
    pub fn init(&mut self, creation_time: i64, activation_threshold: usize) {
        self.creation_time = creation_time;
        self.activation_threshold = activation_threshold;
    }

    #[inline]
    pub fn num_prediction_steps(&self) -> usize {
        self.num_prediction_steps
    }

    #[inline]
    pub fn is_sequence(&self) -> bool {
        self.is_sequence
    }

    /// Set how many steps ahead this segment predicts, clamped to
    /// `[1, MAX_TIME_STEPS]`. Updates the derived sequence flag.
    pub fn set_num_prediction_steps(&mut self, steps: usize) {
        self.num_prediction_steps = steps.clamp(1, MAX_TIME_STEPS);
        self.is_sequence = self.num_prediction_steps == 1;
    }

    /// Rotate current activity into the previous-step fields. Must run
    /// before any recomputation for the new step.
    pub fn next_time_step(&mut self) {
        self.was_active = self.is_active;
        self.is_active = false;
        self.prev_connected_count = self.connected_count;
        self.prev_active_connected_count = self.active_connected_count;
        self.active_connected_count = 0;
        self.prev_active_learning_count = self.active_learning_count;
        self.active_learning_count = 0;
        self.prev_active_synapses.clear();
        std::mem::swap(&mut self.prev_active_synapses, &mut self.active_synapses);
    }

    /// Recompute activity caches and counts in one pass over the synapses.
    pub fn process(&mut self, cells: &Pool<Cell>) {
        self.connected_count = 0;
        self.active_connected_count = 0;
        self.active_learning_count = 0;
        self.active_synapses.clear();

        for syn in &self.synapses {
            let src = cells.get(syn.src);
            if src.is_active {
                self.active_synapses.push(syn.src);
                if syn.perm.is_connected() {
                    self.active_connected_count += 1;
                }
                if src.is_learning {
                    self.active_learning_count += 1;
                }
            }
            if syn.perm.is_connected() {
                self.connected_count += 1;
            }
        }

        self.is_active = self.active_connected_count >= self.activation_threshold;
    }

    /// Whether enough synapses saw their source cell both active and in
    /// the learning state during the previous step.
    pub fn was_active_from_learning(&self, cells: &Pool<Cell>) -> bool {
        let count = self
            .synapses
            .iter()
            .filter(|syn| {
                let src = cells.get(syn.src);
                src.was_active && src.was_learning
            })
            .count();
        count >= self.activation_threshold
    }

    #[inline]
    pub fn active_synapse_count(&self) -> usize {
        self.active_synapses.len()
    }

    #[inline]
    pub fn prev_active_synapse_count(&self) -> usize {
        self.prev_active_synapses.len()
    }

    /// Positive reinforcement relative to a captured activity snapshot.
    ///
    /// Every synapse is decremented without a floor, each snapshot member
    /// gets `inc + dec` added back, then all permanences are clamped to 0.
    pub fn update_permanences(&mut self, snapshot: &[CellId], params: &SynapseParams) {
        for syn in &mut self.synapses {
            syn.perm.decrease_no_limit(params);
        }
        for &src in snapshot {
            if let Some(syn) = self.synapses.iter_mut().find(|s| s.src == src) {
                syn.perm
                    .increase_by(params, params.perm_dec + params.perm_inc, 1.0);
            }
        }
        for syn in &mut self.synapses {
            syn.perm.clamp_after_decrease(params);
        }
    }

    /// Negative reinforcement: decrement each synapse named in the
    /// snapshot, floored at 0.
    pub fn decrease_permanences(&mut self, snapshot: &[CellId], params: &SynapseParams) {
        for &src in snapshot {
            if let Some(syn) = self.synapses.iter_mut().find(|s| s.src == src) {
                syn.perm.decrease(params);
            }
        }
    }

    /// Add a new synapse at initial permanence to each of the given cells.
    ///
    /// Callers must have excluded cells that already source a synapse on
    /// this segment.
    pub fn create_synapses_to_learning_cells(&mut self, sources: &[CellId], params: &SynapseParams) {
        for &src in sources {
            self.synapses
                .push(DistalSynapse::new(params, src, params.initial_perm));
        }
    }

    /// Drop synapses whose permanence reached exactly 0. Returns true if
    /// the segment is left with no synapses.
    pub fn remove_zero_synapses(&mut self) -> bool {
        self.synapses.retain(|syn| syn.perm.value() > 0.0);
        self.synapses.is_empty()
    }
}
