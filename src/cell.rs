//! Context-sensitive cells.
//!
//! Each column owns `cells_per_col` cells. A cell carries the current and
//! previous step's activity/learning/prediction flags, its distal segments
//! and a queue of pending segment-update records. The prediction flags are
//! computed fresh each step; rotation moves the current flags into the
//! `was_*` fields.

use crate::pool::{Pool, Recycle};
use crate::segment::{Segment, SegmentId};
use crate::segment_update::UpdateId;

pub type CellId = usize;

#[derive(Default)]
pub struct Cell {
    /// Row-major index of the owning column within its region.
    pub column: usize,
    /// Position within the column.
    pub index: usize,

    pub is_active: bool,
    pub was_active: bool,
    pub is_learning: bool,
    pub was_learning: bool,
    is_predicting: bool,
    pub was_predicted: bool,
    pub is_segment_predicting: bool,
    pub was_segment_predicted: bool,

    num_prediction_steps: usize,
    prev_num_prediction_steps: usize,

    /// Distal segments owned by this cell.
    pub segments: Vec<SegmentId>,
    /// Deferred reinforcement records awaiting a trigger.
    pub pending_updates: Vec<UpdateId>,
}

impl Recycle for Cell {
    fn retire(&mut self) {
        self.column = 0;
        self.index = 0;
        self.is_active = false;
        self.was_active = false;
        self.is_learning = false;
        self.was_learning = false;
        self.is_predicting = false;
        self.was_predicted = false;
        self.is_segment_predicting = false;
        self.was_segment_predicted = false;
        self.num_prediction_steps = 0;
        self.prev_num_prediction_steps = 0;
        self.segments.clear();
        self.pending_updates.clear();
    }
}

impl Cell {
    pub fn init(&mut self, column: usize, index: usize) {
        self.column = column;
        self.index = index;
    }

    #[inline]
    pub fn is_predicting(&self) -> bool {
        self.is_predicting
    }

    #[inline]
    pub fn num_prediction_steps(&self) -> usize {
        self.num_prediction_steps
    }

    #[inline]
    pub fn prev_num_prediction_steps(&self) -> usize {
        self.prev_num_prediction_steps
    }

    /// Rotate current state into the previous-step fields and reset.
    ///
    /// The cell's segments are rotated by the owning region in the same
    /// pass (they live in the region's segment pool).
    pub fn next_time_step(&mut self) {
        self.was_predicted = self.is_predicting;
        self.was_segment_predicted = self.is_segment_predicting;
        self.was_active = self.is_active;
        self.was_learning = self.is_learning;
        self.is_predicting = false;
        self.is_segment_predicting = false;
        self.is_active = false;
        self.is_learning = false;
        self.prev_num_prediction_steps = self.num_prediction_steps;
        self.num_prediction_steps = 0;
    }

    /// Mark the cell predictive with the given segment's prediction steps.
    ///
    /// The first active segment found defines `num_prediction_steps`; each
    /// subsequent one lowers it to the minimum, so the cell ends up with
    /// the earliest predicted activation across its segments.
    pub fn set_predicting(&mut self, num_prediction_steps: usize) {
        if self.is_predicting {
            self.num_prediction_steps = self.num_prediction_steps.min(num_prediction_steps);
        } else {
            self.num_prediction_steps = num_prediction_steps;
        }
        self.is_predicting = true;
    }

    /// The segment that was active in the previous step, if any. Sequence
    /// segments are preferred; otherwise the one with the most previously
    /// active connected synapses wins.
    pub fn previous_active_segment(&self, segments: &Pool<Segment>) -> Option<SegmentId> {
        let mut best = None;
        let mut found_sequence = false;
        let mut most_syns = 0;

        for &sid in &self.segments {
            let seg = segments.get(sid);
            let active_syns = seg.prev_active_connected_count;
            if active_syns >= seg.activation_threshold {
                if seg.is_sequence() {
                    found_sequence = true;
                    if active_syns > most_syns {
                        most_syns = active_syns;
                        best = Some(sid);
                    }
                } else if !found_sequence && active_syns > most_syns {
                    most_syns = active_syns;
                    best = Some(sid);
                }
            }
        }

        best
    }

    /// Find the segment with the most active synapses among those
    /// predicting exactly `num_prediction_steps` ahead.
    ///
    /// The match is aggressive: synapse activity counts regardless of
    /// connection, and the count may be below the activation threshold,
    /// but it must reach `min_overlap_to_reuse` (the owning column's
    /// segment-reuse threshold).
    pub fn best_matching_segment(
        &self,
        num_prediction_steps: usize,
        previous: bool,
        min_overlap_to_reuse: usize,
        segments: &Pool<Segment>,
    ) -> Option<SegmentId> {
        let mut best = None;
        let mut best_count = min_overlap_to_reuse;

        for &sid in &self.segments {
            let seg = segments.get(sid);
            if seg.num_prediction_steps() != num_prediction_steps {
                continue;
            }

            let syn_count = if previous {
                seg.prev_active_synapse_count()
            } else {
                seg.active_synapse_count()
            };

            if syn_count >= best_count {
                best_count = syn_count;
                best = Some(sid);
            }
        }

        best
    }

    /// Best matching previous-step segment for one prediction step beyond
    /// the cell's current earliest prediction.
    pub fn best_matching_previous_segment(
        &self,
        min_overlap_to_reuse: usize,
        segments: &Pool<Segment>,
    ) -> Option<SegmentId> {
        self.best_matching_segment(
            self.num_prediction_steps + 1,
            true,
            min_overlap_to_reuse,
            segments,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synapse::SynapseParams;

    #[test]
    fn test_rotation_moves_state() {
        let mut cell = Cell::default();
        cell.is_active = true;
        cell.is_learning = true;
        cell.set_predicting(3);

        cell.next_time_step();

        assert!(cell.was_active && cell.was_learning && cell.was_predicted);
        assert!(!cell.is_active && !cell.is_learning && !cell.is_predicting());
        assert_eq!(cell.prev_num_prediction_steps(), 3);
        assert_eq!(cell.num_prediction_steps(), 0);
    }

    #[test]
    fn test_double_rotation_clears_previous() {
        let mut cell = Cell::default();
        cell.is_active = true;

        cell.next_time_step();
        assert!(cell.was_active);

        cell.next_time_step();
        assert!(!cell.was_active, "two rotations with no compute clear was_active");
        assert_eq!(cell.prev_num_prediction_steps(), 0);
    }

    #[test]
    fn test_set_predicting_takes_minimum() {
        let mut cell = Cell::default();
        cell.set_predicting(4);
        assert_eq!(cell.num_prediction_steps(), 4);

        cell.set_predicting(2);
        assert_eq!(cell.num_prediction_steps(), 2);

        cell.set_predicting(7);
        assert_eq!(cell.num_prediction_steps(), 2, "later segments can only lower");
    }

    fn pooled_segment(
        segments: &mut Pool<Segment>,
        steps: usize,
        threshold: usize,
        prev_active_connected: usize,
        prev_active_total: usize,
    ) -> SegmentId {
        let sid = segments.alloc();
        let seg = segments.get_mut(sid);
        seg.init(0, threshold);
        seg.set_num_prediction_steps(steps);
        seg.prev_active_connected_count = prev_active_connected;
        // Fake previous activity snapshot of the right size.
        let params = SynapseParams::default();
        let srcs: Vec<CellId> = (0..prev_active_total).collect();
        seg.create_synapses_to_learning_cells(&srcs, &params);
        seg.prev_active_synapses = srcs;
        sid
    }

    #[test]
    fn test_previous_active_segment_prefers_sequence() {
        let mut segments: Pool<Segment> = Pool::new();
        let mut cell = Cell::default();

        let non_seq = pooled_segment(&mut segments, 3, 1, 5, 5);
        let seq = pooled_segment(&mut segments, 1, 1, 2, 2);
        cell.segments.push(seq);
        cell.segments.push(non_seq);

        // Sequence segment wins even though the non-sequence one has more
        // active synapses, because it is seen first.
        assert_eq!(cell.previous_active_segment(&segments), Some(seq));
    }

    #[test]
    fn test_previous_active_segment_respects_threshold() {
        let mut segments: Pool<Segment> = Pool::new();
        let mut cell = Cell::default();

        let sid = pooled_segment(&mut segments, 1, 4, 2, 2);
        cell.segments.push(sid);

        assert_eq!(cell.previous_active_segment(&segments), None);
    }

    #[test]
    fn test_best_matching_segment_filters_steps_and_reuse_threshold() {
        let mut segments: Pool<Segment> = Pool::new();
        let mut cell = Cell::default();

        let weak = pooled_segment(&mut segments, 2, 9, 0, 1);
        let strong = pooled_segment(&mut segments, 2, 9, 0, 3);
        let other_steps = pooled_segment(&mut segments, 1, 9, 0, 8);
        cell.segments.extend([weak, strong, other_steps]);

        assert_eq!(cell.best_matching_segment(2, true, 2, &segments), Some(strong));
        assert_eq!(
            cell.best_matching_segment(2, true, 4, &segments),
            None,
            "below the reuse threshold nothing matches"
        );
    }
}
