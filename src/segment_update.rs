//! Deferred segment reinforcement records.
//!
//! Temporal pooling never mutates segments inline. Instead each cell
//! queues `SegmentUpdate` records describing proposed changes — reinforce
//! these synapses, grow synapses to those learning cells, maybe create a
//! whole new segment — and the records are consumed later by
//! [`apply_segment_updates`] once the cell's fate (became active, stopped
//! predicting, kept predicting longer) is known.
//!
//! The active-synapse snapshot is copied at enqueue time (by source cell
//! id), and the learning-cell candidates are sampled at enqueue time too;
//! both therefore survive any later structural change to the segment.
//! Structural pruning is only allowed once the cell's queue has fully
//! drained, so a queued record can never name a synapse or segment that
//! has been recycled.

use rand::rngs::StdRng;
use rand::Rng;

use crate::cell::{Cell, CellId};
use crate::column::{Column, Grid};
use crate::pool::{Pool, Recycle};
use crate::segment::{Segment, SegmentId};
use crate::synapse::SynapseParams;

pub type UpdateId = usize;

/// Why an update record was enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateKind {
    /// Queued in phase 1 because the cell's column received input.
    #[default]
    DueToActive,
    /// Queued in phase 2 because the cell entered the predictive state.
    DueToPredictive,
}

/// What happened to the cell, deciding how its queue is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyTrigger {
    /// The cell is now a learning cell: reinforce positively.
    Active,
    /// The cell stopped predicting: reinforce negatively.
    Inactive,
    /// The cell still predicts, but its one-step prediction failed to
    /// occur (it now predicts further out).
    LongerPrediction,
}

/// A pending change to one of a cell's segments (or a new segment).
#[derive(Default)]
pub struct SegmentUpdate {
    pub cell: CellId,
    /// Target segment; `None` means a new segment is to be created.
    pub segment: Option<SegmentId>,
    pub add_new_synapses: bool,
    /// Prediction steps carried to a newly created segment.
    pub num_prediction_steps: usize,
    /// Step counter value when this record was enqueued.
    pub creation_time: i64,
    pub kind: UpdateKind,
    /// Source cells of the segment's active synapses, captured at enqueue.
    pub active_snapshot: Vec<CellId>,
    /// Learning cells to grow new synapses to, sampled at enqueue.
    pub learning_cells: Vec<CellId>,
}

impl Recycle for SegmentUpdate {
    fn retire(&mut self) {
        self.cell = 0;
        self.segment = None;
        self.add_new_synapses = false;
        self.num_prediction_steps = 0;
        self.creation_time = 0;
        self.kind = UpdateKind::DueToActive;
        self.active_snapshot.clear();
        self.learning_cells.clear();
    }
}

/// Randomly sample `m` cells from `candidates` without replacement, by
/// Vitter-style reservoir substitution: for each `i` in
/// `[n − m, n)`, pick a uniform position `p ≤ i`; if the cell at `p` was
/// already chosen, substitute the cell at `i` itself.
fn random_sample(candidates: &[CellId], m: usize, rng: &mut StdRng) -> Vec<CellId> {
    let n = candidates.len();
    debug_assert!(m <= n);

    let mut result = Vec::with_capacity(m);
    for i in (n - m)..n {
        let pos = rng.gen_range(0..=i);
        let pick = candidates[pos];
        if result.contains(&pick) {
            result.push(candidates[i]);
        } else {
            result.push(pick);
        }
    }
    result
}

/// Enqueue a deferred update on `cell_id`.
///
/// Captures the (previous or current) active-synapse snapshot of
/// `segment`, and — when `add_new_synapses` — samples up to
/// `new_synapse_count − |snapshot|` learning cells from the prediction
/// window (`prediction_radius` hypercolumns around the cell's column, or
/// the whole region when −1), excluding cells already sourcing a synapse
/// on the segment.
#[allow(clippy::too_many_arguments)]
pub fn enqueue_update(
    cell_id: CellId,
    previous: bool,
    segment: Option<SegmentId>,
    add_new_synapses: bool,
    kind: UpdateKind,
    step: i64,
    grid: &Grid,
    prediction_radius: i64,
    new_synapse_count: usize,
    columns: &[Column],
    cells: &mut Pool<Cell>,
    segments: &Pool<Segment>,
    updates: &mut Pool<SegmentUpdate>,
    rng: &mut StdRng,
) -> UpdateId {
    let active_snapshot: Vec<CellId> = match segment {
        Some(sid) => {
            let seg = segments.get(sid);
            if previous {
                seg.prev_active_synapses.clone()
            } else {
                seg.active_synapses.clone()
            }
        }
        None => Vec::new(),
    };

    let mut learning_cells = Vec::new();
    if add_new_synapses {
        let existing: Vec<CellId> = match segment {
            Some(sid) => segments.get(sid).synapses.iter().map(|s| s.src).collect(),
            None => Vec::new(),
        };

        let column = &columns[cells.get(cell_id).column];
        let window = if prediction_radius > -1 {
            grid.columns_within_hypercolumn_radius(column.position, prediction_radius as usize)
        } else {
            grid.full_area()
        };

        // Collect candidates in deterministic x-major order over the window.
        let mut candidates = Vec::new();
        for x in window.min_x..=window.max_x {
            for y in window.min_y..=window.max_y {
                let col = &columns[grid.index(x, y)];
                for &cid in &col.cells {
                    let cell = cells.get(cid);
                    if cell.was_learning && !existing.contains(&cid) {
                        candidates.push(cid);
                    }
                }
            }
        }

        let mut target = new_synapse_count;
        if segment.is_some() {
            target = target.saturating_sub(active_snapshot.len());
        }
        target = target.min(candidates.len());

        if target > 0 {
            learning_cells = random_sample(&candidates, target, rng);
        }
    }

    let uid = updates.alloc();
    let info = updates.get_mut(uid);
    info.cell = cell_id;
    info.segment = segment;
    info.add_new_synapses = add_new_synapses;
    info.num_prediction_steps = 1;
    info.creation_time = step;
    info.kind = kind;
    info.active_snapshot = active_snapshot;
    info.learning_cells = learning_cells;

    cells.get_mut(cell_id).pending_updates.push(uid);
    uid
}

/// Consume the cell's pending update queue for the given trigger.
///
/// A record is left in the queue when it was created this step due to the
/// predictive state (not yet falsifiable), or when the trigger is
/// [`ApplyTrigger::LongerPrediction`] and the record predicts more than one
/// step ahead (only one-step predictions are punishable there).
///
/// Segments touched by reinforcement are remembered, and — only if the
/// queue fully drained — pruned afterwards: synapses at exactly zero
/// permanence are removed, and a segment left empty is removed from the
/// cell and recycled. If records remain queued the modified set is
/// discarded without pruning, since those records may still reference the
/// affected objects.
pub fn apply_segment_updates(
    cell_id: CellId,
    cur_time: i64,
    trigger: ApplyTrigger,
    seg_active_threshold: usize,
    distal_params: &SynapseParams,
    cells: &mut Pool<Cell>,
    segments: &mut Pool<Segment>,
    updates: &mut Pool<SegmentUpdate>,
) {
    let pending = std::mem::take(&mut cells.get_mut(cell_id).pending_updates);
    let mut remaining = Vec::new();
    let mut modified: Vec<SegmentId> = Vec::new();

    for uid in pending {
        let apply = {
            let info = updates.get(uid);
            let fresh_predictive =
                info.creation_time == cur_time && info.kind == UpdateKind::DueToPredictive;
            let unpunishable =
                trigger == ApplyTrigger::LongerPrediction && info.num_prediction_steps > 1;
            !fresh_predictive && !unpunishable
        };

        if !apply {
            remaining.push(uid);
            continue;
        }

        let (target, add_new, steps) = {
            let info = updates.get(uid);
            (info.segment, info.add_new_synapses, info.num_prediction_steps)
        };

        if let Some(sid) = target {
            let info = updates.get(uid);
            let seg = segments.get_mut(sid);
            if trigger == ApplyTrigger::Active {
                seg.update_permanences(&info.active_snapshot, distal_params);
            } else {
                seg.decrease_permanences(&info.active_snapshot, distal_params);
            }
            if !modified.contains(&sid) {
                modified.push(sid);
            }
        }

        if add_new && trigger == ApplyTrigger::Active {
            match target {
                None => {
                    let info = updates.get(uid);
                    if !info.learning_cells.is_empty() {
                        let learning = info.learning_cells.clone();
                        let sid = segments.alloc();
                        let seg = segments.get_mut(sid);
                        seg.init(cur_time, seg_active_threshold);
                        seg.set_num_prediction_steps(steps);
                        seg.create_synapses_to_learning_cells(&learning, distal_params);
                        cells.get_mut(cell_id).segments.push(sid);
                    }
                }
                Some(sid) => {
                    let info = updates.get(uid);
                    if !info.learning_cells.is_empty() {
                        segments
                            .get_mut(sid)
                            .create_synapses_to_learning_cells(&info.learning_cells, distal_params);
                    }
                }
            }
        }

        updates.release(uid);
    }

    let queue_empty = remaining.is_empty();
    cells.get_mut(cell_id).pending_updates = remaining;

    if queue_empty {
        for sid in modified {
            if segments.get_mut(sid).remove_zero_synapses() {
                cells.get_mut(cell_id).segments.retain(|&s| s != sid);
                segments.release(sid);
            }
        }
    }
}
