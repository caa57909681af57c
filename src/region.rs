//! Regions: the spatial and temporal pooling layers.
//!
//! A region owns a 2-D grid of columns, each with a stack of cells. One
//! `step()` runs the full pipeline against the region's current inputs:
//!
//! 1. rotate every proximal segment, cell and distal segment to the next
//!    time step,
//! 2. spatial pooling — overlap, local inhibition, permanence adaptation,
//!    duty cycles and boosting,
//! 3. temporal pooling — cell active/learning states, predictive states
//!    with queued reinforcement, and finally the trigger-gated application
//!    of the queued updates.
//!
//! Regions are themselves data spaces, so one region's output (cell
//! activity and/or whole-column activity) can feed another region
//! downstream.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::cell::Cell;
use crate::column::{Column, Grid};
use crate::dataspace::DataSpace;
use crate::pool::Pool;
use crate::segment::{Segment, MAX_TIME_STEPS};
use crate::segment_update::{
    apply_segment_updates, enqueue_update, ApplyTrigger, SegmentUpdate, UpdateKind,
};
use crate::synapse::SynapseParams;
use crate::utils::Point;

/// How the inhibition radius is determined.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inhibition {
    /// Recomputed from the region-wide average connected receptive field
    /// size, at initialization and after each spatial learning pass.
    Automatic,
    /// Fixed radius, in hypercolumns.
    Radius(f32),
}

/// A time window gating a learning behavior. −1 means open-ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearningPeriod {
    pub start: i64,
    pub end: i64,
}

impl Default for LearningPeriod {
    fn default() -> Self {
        Self { start: -1, end: -1 }
    }
}

impl LearningPeriod {
    pub fn allows(&self, step: i64) -> bool {
        (self.start == -1 || self.start <= step) && (self.end == -1 || self.end >= step)
    }
}

/// Construction parameters for a region. Percentages are fractions in
/// (0, 1] here; the configuration layer converts from (0, 100].
#[derive(Debug, Clone)]
pub struct RegionParams {
    pub width: usize,
    pub height: usize,
    pub cells_per_col: usize,
    pub hypercolumn_diameter: usize,

    /// Active connected synapses required for a distal segment to fire.
    pub seg_active_threshold: usize,
    /// Furthest distance, in hypercolumns, for new distal synapse sources
    /// (−1 = whole region).
    pub prediction_radius: i64,
    /// Distal synapses added when no matching ones are found in learning.
    pub new_synapse_count: usize,
    /// Per-column segment-reuse threshold is drawn from this range.
    pub min_overlap_to_reuse_segment: (usize, usize),

    pub pct_input_per_column: f32,
    pub pct_min_overlap: f32,
    pub pct_local_activity: f32,

    /// `None` = unlimited boosting.
    pub max_boost: Option<f32>,
    pub boost_rate: f32,

    pub spatial_learning: LearningPeriod,
    pub temporal_learning: LearningPeriod,
    pub boosting: LearningPeriod,

    pub inhibition: Inhibition,

    /// Bypass spatial pooling: the sole input's activity is copied
    /// one-to-one into column activity.
    pub hardcoded_spatial: bool,

    pub output_column_activity: bool,
    pub output_cell_activity: bool,
}

pub struct Region {
    id: String,
    pub params: RegionParams,
    grid: Grid,
    pub proximal_params: SynapseParams,
    pub distal_params: SynapseParams,

    inhibition_radius: f32,
    num_output_values: usize,

    pub columns: Vec<Column>,
    pub cells: Pool<Cell>,
    pub segments: Pool<Segment>,
    pub updates: Pool<SegmentUpdate>,

    /// Input radius per input, parallel to the input list the network
    /// resolves for this region (−1 = unrestricted).
    pub input_radii: Vec<i64>,

    step_counter: i64,
    rng: StdRng,
}

impl Region {
    pub fn new(
        id: String,
        params: RegionParams,
        proximal_params: SynapseParams,
        distal_params: SynapseParams,
        input_radii: Vec<i64>,
        seed: u64,
    ) -> Self {
        assert!(params.width > 0 && params.height > 0);
        assert!(params.cells_per_col > 0);
        assert!(params.hypercolumn_diameter > 0);
        assert_eq!(params.width % params.hypercolumn_diameter, 0);
        assert_eq!(params.height % params.hypercolumn_diameter, 0);

        let grid = Grid {
            width: params.width,
            height: params.height,
            hypercolumn_diameter: params.hypercolumn_diameter,
        };

        let num_output_values = (params.output_column_activity as usize)
            + if params.output_cell_activity {
                params.cells_per_col
            } else {
                0
            };

        let mut rng = StdRng::seed_from_u64(seed);

        let (reuse_min, reuse_max) = params.min_overlap_to_reuse_segment;
        let mut columns = Vec::with_capacity(params.width * params.height);
        let mut cells: Pool<Cell> = Pool::new();

        for y in 0..params.height {
            for x in 0..params.width {
                let reuse = rng.gen_range(reuse_min..=reuse_max);
                let mut column = Column::new(
                    Point::new(x, y),
                    params.hypercolumn_diameter,
                    params.seg_active_threshold,
                    reuse,
                    params.max_boost,
                    &mut rng,
                );

                let col_index = grid.index(x, y);
                for cell_index in 0..params.cells_per_col {
                    let cid = cells.alloc();
                    cells.get_mut(cid).init(col_index, cell_index);
                    column.cells.push(cid);
                }

                columns.push(column);
            }
        }

        let inhibition_radius = match params.inhibition {
            Inhibition::Radius(r) => r,
            Inhibition::Automatic => 0.0,
        };

        Self {
            id,
            params,
            grid,
            proximal_params,
            distal_params,
            inhibition_radius,
            num_output_values,
            columns,
            cells,
            segments: Pool::new(),
            updates: Pool::new(),
            input_radii,
            step_counter: 0,
            rng,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn step_counter(&self) -> i64 {
        self.step_counter
    }

    pub(crate) fn set_step_counter(&mut self, step: i64) {
        self.step_counter = step;
    }

    #[inline]
    pub fn inhibition_radius(&self) -> f32 {
        self.inhibition_radius
    }

    #[inline]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn column(&self, x: usize, y: usize) -> &Column {
        &self.columns[self.grid.index(x, y)]
    }

    pub fn cell(&self, x: usize, y: usize, index: usize) -> &Cell {
        let col = &self.columns[self.grid.index(x, y)];
        self.cells.get(col.cells[index])
    }

    /// Build every column's proximal receptive field and seed the
    /// inhibition state. Called once, after the input list is known.
    pub fn initialize(&mut self, inputs: &[&dyn DataSpace]) {
        if !self.params.hardcoded_spatial {
            let Self {
                columns,
                input_radii,
                grid,
                proximal_params,
                params,
                rng,
                ..
            } = self;
            for column in columns.iter_mut() {
                column.create_proximal_synapses(
                    inputs,
                    input_radii,
                    grid,
                    proximal_params,
                    params.pct_input_per_column,
                    params.pct_min_overlap,
                    rng,
                );
            }

            if self.params.inhibition == Inhibition::Automatic {
                self.inhibition_radius = self.average_receptive_field_size();
            }
            self.determine_desired_local_activities();

            debug!(
                region = %self.id,
                inhibition_radius = self.inhibition_radius,
                "region initialized"
            );
        }

        self.step_counter = 0;
    }

    /// Run one time step against the given inputs.
    pub fn step(&mut self, inputs: &[&dyn DataSpace]) {
        self.rotate_time_step();
        self.step_counter += 1;
        trace!(region = %self.id, step = self.step_counter, "stepping");

        self.perform_spatial_pooling(inputs);
        self.perform_temporal_pooling();
    }

    /// Push every column's and cell's current state back to become the
    /// previous state.
    fn rotate_time_step(&mut self) {
        let Self {
            columns,
            cells,
            segments,
            ..
        } = self;

        for column in columns.iter_mut() {
            column.proximal.next_time_step();

            for &cid in &column.cells {
                cells.get_mut(cid).next_time_step();
                for &sid in &cells.get(cid).segments {
                    segments.get_mut(sid).next_time_step();
                }
            }
        }
    }

    fn perform_spatial_pooling(&mut self, inputs: &[&dyn DataSpace]) {
        if self.params.hardcoded_spatial {
            // The sole input's activity dictates column activity directly.
            let input = inputs[0];
            for column in self.columns.iter_mut() {
                column.is_active = input.is_active(column.position.x, column.position.y, 0);
                column.is_inhibited = false;
            }
            return;
        }

        let allow_spatial = self.params.spatial_learning.allows(self.step_counter);
        let allow_boosting = self.params.boosting.allows(self.step_counter);
        let boost_rate = self.params.boost_rate;
        let step = self.step_counter;

        // Phase 1: input overlap.
        {
            let Self {
                columns,
                proximal_params,
                ..
            } = self;
            for column in columns.iter_mut() {
                column.compute_overlap(inputs, proximal_params);
            }
        }

        // Phase 2: winners after local inhibition.
        let decisions: Vec<(bool, bool)> = (0..self.columns.len())
            .map(|ci| {
                let column = &self.columns[ci];
                if column.overlap > 0.0 {
                    if self.is_within_kth_score(ci, column.desired_local_activity) {
                        (true, false)
                    } else {
                        (false, true)
                    }
                } else {
                    (false, false)
                }
            })
            .collect();
        for (column, (active, inhibited)) in self.columns.iter_mut().zip(decisions) {
            column.is_active = active;
            column.is_inhibited = inhibited;
        }

        // Phase 3: learning, duty cycles and boosting.
        for ci in 0..self.columns.len() {
            if allow_spatial && self.columns[ci].is_active {
                let Self {
                    columns,
                    proximal_params,
                    ..
                } = self;
                columns[ci].proximal.adapt_permanences(inputs, proximal_params);
            }

            let max_duty = self.max_duty_cycle_within_radius(ci);
            let Self {
                columns,
                proximal_params,
                ..
            } = self;
            let column = &mut columns[ci];
            column.max_duty_cycle = max_duty;
            column.update_active_duty_cycle();
            column.update_overlap_duty_cycle();

            if allow_boosting {
                column.perform_boosting(boost_rate, step, proximal_params);
            }
        }

        if allow_spatial && self.params.inhibition == Inhibition::Automatic {
            self.inhibition_radius = self.average_receptive_field_size();
            self.determine_desired_local_activities();
        }
    }

    fn perform_temporal_pooling(&mut self) {
        let temporal_learning = self.params.temporal_learning.allows(self.step_counter);
        let cells_per_col = self.params.cells_per_col;
        let step = self.step_counter;

        // Phase 1: active and learning states for winning columns.
        for ci in 0..self.columns.len() {
            if !self.columns[ci].is_active {
                continue;
            }

            let mut predicted = false;
            let mut learn_cell_chosen = false;

            for k in 0..cells_per_col {
                let cid = self.columns[ci].cells[k];
                if !self.cells.get(cid).was_predicted {
                    continue;
                }

                if let Some(sid) = self.cells.get(cid).previous_active_segment(&self.segments) {
                    if self.segments.get(sid).is_sequence() {
                        predicted = true;
                        let from_learning = temporal_learning
                            && self.segments.get(sid).was_active_from_learning(&self.cells);

                        let cell = self.cells.get_mut(cid);
                        cell.is_active = true;
                        if from_learning {
                            cell.is_learning = true;
                            learn_cell_chosen = true;
                        }
                    }
                }
            }

            if !predicted {
                // Burst: every cell in the column becomes active.
                for k in 0..cells_per_col {
                    let cid = self.columns[ci].cells[k];
                    self.cells.get_mut(cid).is_active = true;
                }
            }

            if temporal_learning && !learn_cell_chosen {
                let (best_cell, best_segment) = self.columns[ci].best_matching_cell(
                    1,
                    true,
                    &self.cells,
                    &self.segments,
                    &mut self.rng,
                );

                self.cells.get_mut(best_cell).is_learning = true;

                let uid = enqueue_update(
                    best_cell,
                    true,
                    best_segment,
                    true,
                    UpdateKind::DueToActive,
                    step,
                    &self.grid,
                    self.params.prediction_radius,
                    self.params.new_synapse_count,
                    &self.columns,
                    &mut self.cells,
                    &self.segments,
                    &mut self.updates,
                    &mut self.rng,
                );
                self.updates.get_mut(uid).num_prediction_steps = 1;
            }
        }

        // Phase 2: predictive states plus queued reinforcement.
        for ci in 0..self.columns.len() {
            for k in 0..cells_per_col {
                let cid = self.columns[ci].cells[k];

                // Cache each segment's activity for the rest of the step.
                for idx in 0..self.cells.get(cid).segments.len() {
                    let sid = self.cells.get(cid).segments[idx];
                    let Self {
                        cells, segments, ..
                    } = self;
                    segments.get_mut(sid).process(cells);
                }

                for idx in 0..self.cells.get(cid).segments.len() {
                    let sid = self.cells.get(cid).segments[idx];
                    if !self.segments.get(sid).is_active {
                        continue;
                    }

                    // Every active segment is inspected so the lowest
                    // prediction-step count wins, and so each one gets a
                    // reinforcement record.
                    let steps = self.segments.get(sid).num_prediction_steps();
                    let is_sequence = self.segments.get(sid).is_sequence();

                    let cell = self.cells.get_mut(cid);
                    cell.set_predicting(steps);
                    if is_sequence {
                        cell.is_segment_predicting = true;
                    }

                    if temporal_learning {
                        enqueue_update(
                            cid,
                            false,
                            Some(sid),
                            false,
                            UpdateKind::DueToPredictive,
                            step,
                            &self.grid,
                            self.params.prediction_radius,
                            self.params.new_synapse_count,
                            &self.columns,
                            &mut self.cells,
                            &self.segments,
                            &mut self.updates,
                            &mut self.rng,
                        );
                    }
                }

                // Reinforce a segment that could have predicted this
                // activation one step earlier. Predictions already at the
                // time-step ceiling enqueue nothing, preventing runaway
                // chains and duplicate segments.
                if temporal_learning
                    && self.cells.get(cid).is_predicting()
                    && self.cells.get(cid).num_prediction_steps() != MAX_TIME_STEPS
                {
                    let reuse = self.columns[ci].min_overlap_to_reuse_segment;
                    let predictive_segment = self
                        .cells
                        .get(cid)
                        .best_matching_previous_segment(reuse, &self.segments);

                    let uid = enqueue_update(
                        cid,
                        true,
                        predictive_segment,
                        true,
                        UpdateKind::DueToPredictive,
                        step,
                        &self.grid,
                        self.params.prediction_radius,
                        self.params.new_synapse_count,
                        &self.columns,
                        &mut self.cells,
                        &self.segments,
                        &mut self.updates,
                        &mut self.rng,
                    );
                    if predictive_segment.is_none() {
                        let steps = self.cells.get(cid).num_prediction_steps() + 1;
                        self.updates.get_mut(uid).num_prediction_steps = steps;
                    }
                }
            }
        }

        // Phase 3: apply queued updates for cells whose fate is known.
        if temporal_learning {
            for ci in 0..self.columns.len() {
                for k in 0..cells_per_col {
                    let cid = self.columns[ci].cells[k];
                    let cell = self.cells.get(cid);

                    let trigger = if cell.is_learning {
                        Some(ApplyTrigger::Active)
                    } else if !cell.is_predicting() && cell.was_predicted {
                        Some(ApplyTrigger::Inactive)
                    } else if cell.is_predicting()
                        && cell.was_predicted
                        && cell.num_prediction_steps() > 1
                        && cell.prev_num_prediction_steps() == 1
                    {
                        Some(ApplyTrigger::LongerPrediction)
                    } else {
                        None
                    };

                    if let Some(trigger) = trigger {
                        apply_segment_updates(
                            cid,
                            step,
                            trigger,
                            self.params.seg_active_threshold,
                            &self.distal_params,
                            &mut self.cells,
                            &mut self.segments,
                            &mut self.updates,
                        );
                    }
                }
            }
        }
    }

    /// True iff fewer than `k` neighbors within the inhibition window have
    /// strictly greater overlap than column `ci`. Ties favor inclusion.
    pub fn is_within_kth_score(&self, ci: usize, k: usize) -> bool {
        let column = &self.columns[ci];
        let window = self.grid.columns_within_hypercolumn_radius(
            column.position,
            (self.inhibition_radius + 0.5) as usize,
        );

        let mut greater = 0;
        for (x, y) in window.iter() {
            if self.columns[self.grid.index(x, y)].overlap > column.overlap {
                greater += 1;
            }
        }
        greater < k
    }

    /// Mean over all columns of the furthest connected proximal synapse
    /// distance, in hypercolumn grid space.
    pub fn average_receptive_field_size(&self) -> f32 {
        let sum: f32 = self
            .columns
            .iter()
            .map(|column| column.proximal.max_connected_distance())
            .sum();
        sum / self.columns.len() as f32
    }

    fn determine_desired_local_activities(&mut self) {
        let Self {
            columns,
            grid,
            params,
            inhibition_radius,
            ..
        } = self;
        for column in columns.iter_mut() {
            column.determine_desired_local_activity(grid, *inhibition_radius, params.pct_local_activity);
        }
    }

    /// Maximum slow active duty cycle among columns within the inhibition
    /// window of column `ci`.
    fn max_duty_cycle_within_radius(&self, ci: usize) -> f32 {
        let column = &self.columns[ci];
        let window = self.grid.columns_within_hypercolumn_radius(
            column.position,
            (self.inhibition_radius + 0.5) as usize,
        );

        let mut max_duty = 0.0f32;
        for (x, y) in window.iter() {
            let duty = self.columns[self.grid.index(x, y)].active_duty_cycle;
            if duty > max_duty {
                max_duty = duty;
            }
        }
        max_duty
    }

    pub fn is_cell_active(&self, x: usize, y: usize, index: usize) -> bool {
        self.cell(x, y, index).is_active
    }

    pub fn is_cell_predicted(&self, x: usize, y: usize, index: usize) -> bool {
        self.cell(x, y, index).is_predicting()
    }

    pub fn is_cell_learning(&self, x: usize, y: usize, index: usize) -> bool {
        self.cell(x, y, index).is_learning
    }
}

impl DataSpace for Region {
    fn size_x(&self) -> usize {
        self.params.width
    }

    fn size_y(&self) -> usize {
        self.params.height
    }

    fn num_values(&self) -> usize {
        self.num_output_values
    }

    fn hypercolumn_diameter(&self) -> usize {
        self.params.hypercolumn_diameter
    }

    fn is_active(&self, x: usize, y: usize, v: usize) -> bool {
        assert!(v < self.num_output_values);
        let column = &self.columns[self.grid.index(x, y)];

        if self.params.output_column_activity && v == self.num_output_values - 1 {
            column.is_active
        } else {
            let cell = self.cells.get(column.cells[v]);
            cell.is_active || cell.is_predicting()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region_params(width: usize, height: usize, cells_per_col: usize) -> RegionParams {
        RegionParams {
            width,
            height,
            cells_per_col,
            hypercolumn_diameter: 1,
            seg_active_threshold: 1,
            prediction_radius: -1,
            new_synapse_count: 3,
            min_overlap_to_reuse_segment: (1, 1),
            pct_input_per_column: 1.0,
            pct_min_overlap: 0.1,
            pct_local_activity: 1.0,
            max_boost: Some(4.0),
            boost_rate: 0.01,
            spatial_learning: LearningPeriod::default(),
            temporal_learning: LearningPeriod::default(),
            boosting: LearningPeriod::default(),
            inhibition: Inhibition::Radius(1.0),
            hardcoded_spatial: false,
            output_column_activity: false,
            output_cell_activity: true,
        }
    }

    fn new_region(params: RegionParams) -> Region {
        Region::new(
            "r".into(),
            params,
            SynapseParams::default(),
            SynapseParams::default(),
            vec![-1],
            0,
        )
    }

    #[test]
    fn test_learning_period_windows() {
        let open = LearningPeriod::default();
        assert!(open.allows(1));
        assert!(open.allows(1_000_000));

        let bounded = LearningPeriod { start: 5, end: 10 };
        assert!(!bounded.allows(4));
        assert!(bounded.allows(5));
        assert!(bounded.allows(10));
        assert!(!bounded.allows(11));

        // End 0 disables the behavior entirely; the clock starts at 1.
        let disabled = LearningPeriod { start: -1, end: 0 };
        assert!(!disabled.allows(1));
    }

    #[test]
    #[should_panic]
    fn test_dimensions_must_divide_by_hypercolumn() {
        let mut params = region_params(3, 1, 1);
        params.hypercolumn_diameter = 2;
        new_region(params);
    }

    #[test]
    fn test_region_construction() {
        let region = new_region(region_params(4, 2, 3));
        assert_eq!(region.columns.len(), 8);
        assert_eq!(region.cells.live(), 24);
        for column in &region.columns {
            assert_eq!(column.cells.len(), 3);
            assert!(column.boost >= 1.0);
            assert_eq!(column.boost, column.min_boost);
            assert_eq!(column.min_overlap_to_reuse_segment, 1);
        }
    }

    #[test]
    fn test_kth_score_ties_favor_inclusion() {
        let mut region = new_region(region_params(3, 1, 1));
        region.columns[0].overlap = 2.0;
        region.columns[1].overlap = 2.0;
        region.columns[2].overlap = 1.0;

        // Column 1 has no strictly greater neighbor, so it is within the
        // 1st score despite the tie with column 0.
        assert!(region.is_within_kth_score(1, 1));
        assert!(!region.is_within_kth_score(2, 1));
    }

    #[test]
    fn test_output_values_cell_and_column_activity() {
        let mut params = region_params(2, 1, 2);
        params.output_column_activity = true;
        let mut region = new_region(params);

        assert_eq!(region.num_values(), 3);

        region.columns[0].is_active = true;
        let cid = region.columns[0].cells[1];
        region.cells.get_mut(cid).is_active = true;

        assert!(!DataSpace::is_active(&region, 0, 0, 0));
        assert!(DataSpace::is_active(&region, 0, 0, 1));
        assert!(DataSpace::is_active(&region, 0, 0, 2), "column slot is last");
        assert!(!DataSpace::is_active(&region, 1, 0, 2));
    }

    #[test]
    fn test_rotation_is_stable_under_double_step() {
        let mut region = new_region(region_params(2, 1, 2));
        let cid = region.columns[0].cells[0];
        region.cells.get_mut(cid).is_active = true;

        region.rotate_time_step();
        assert!(region.cells.get(cid).was_active);
        assert!(!region.cells.get(cid).is_active);

        region.rotate_time_step();
        assert!(!region.cells.get(cid).was_active);
    }
}
