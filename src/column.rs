//! Columns and their proximal (feed-forward) segments.
//!
//! A column owns one proximal segment sampling the input spaces, and a
//! fixed stack of cells. The spatial pooler works at column granularity:
//! overlap with the current input, local inhibition against neighboring
//! columns, permanence adaptation for winners, and homeostatic boosting
//! for losers.

use itertools::iproduct;
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::cell::{Cell, CellId};
use crate::dataspace::DataSpace;
use crate::pool::Pool;
use crate::segment::{Segment, SegmentId};
use crate::synapse::{ProximalSynapse, SynapseParams};
use crate::utils::{Area, Point};

/// Exponential moving average alpha for the slow duty cycles.
pub const EMA_ALPHA: f32 = 0.005;
/// Alpha for the fast active duty cycle.
pub const FAST_EMA_ALPHA: f32 = 0.008;

/// A column's min boost and max boost are jittered up to this far from 1.0
/// and the configured maximum, to break overlap ties between unboosted (or
/// fully boosted) columns.
pub const BOOST_VARIANCE: f32 = 0.01;

/// Boost rises while the active duty cycle is below this fraction of the
/// neighborhood maximum.
pub const INCREASE_BOOST_THRESHOLD: f32 = 0.01;
/// Boost falls once both active duty cycles exceed this fraction of the
/// neighborhood maximum.
pub const DECREASE_BOOST_THRESHOLD: f32 = 0.65;

/// Region column-grid geometry, shared by window computations.
#[derive(Debug, Clone, Copy)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    pub hypercolumn_diameter: usize,
}

impl Grid {
    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        debug_assert!(x < self.width && y < self.height);
        y * self.width + x
    }

    #[inline]
    pub fn full_area(&self) -> Area {
        Area::new(0, 0, self.width - 1, self.height - 1)
    }

    /// The columns within `radius` hypercolumns of the hypercolumn
    /// containing `pos`, clipped to the grid.
    pub fn columns_within_hypercolumn_radius(&self, pos: Point, radius: usize) -> Area {
        let d = self.hypercolumn_diameter as isize;
        let r = radius as isize;
        let hx = pos.x as isize / d;
        let hy = pos.y as isize / d;

        let min_x = ((hx - r) * d).max(0) as usize;
        let min_y = ((hy - r) * d).max(0) as usize;
        let max_x = ((hx + r + 1) * d - 1).min(self.width as isize - 1) as usize;
        let max_y = ((hy + r + 1) * d - 1).min(self.height as isize - 1) as usize;

        Area::new(min_x, min_y, max_x, max_y)
    }
}

/// The feed-forward dendrite segment of a column.
///
/// Holds potential synapses onto the region's inputs and the per-step
/// activity counts the overlap computation needs. Unlike distal segments
/// it is owned inline by its column and never pooled.
#[derive(Default)]
pub struct ProximalSegment {
    pub synapses: Vec<ProximalSynapse>,
    pub activation_threshold: usize,

    pub active_connected_count: usize,
    pub prev_active_connected_count: usize,
    /// Synapses above initial permanence but inactive this step; penalizes
    /// overlap so broad detectors do not shadow every subpattern.
    pub inactive_well_connected_count: usize,
    pub connected_count: usize,
    pub prev_connected_count: usize,
}

impl ProximalSegment {
    /// Rotate current counts into the previous-step fields.
    pub fn next_time_step(&mut self) {
        self.prev_connected_count = self.connected_count;
        self.prev_active_connected_count = self.active_connected_count;
        self.active_connected_count = 0;
        self.inactive_well_connected_count = 0;
    }

    /// Recompute activity counts against the current inputs in one pass.
    pub fn process(&mut self, inputs: &[&dyn DataSpace], params: &SynapseParams) {
        self.connected_count = 0;
        self.active_connected_count = 0;
        self.inactive_well_connected_count = 0;

        for syn in &self.synapses {
            let active = inputs[syn.input].is_active(syn.x, syn.y, syn.v);
            if active {
                if syn.perm.is_connected() {
                    self.active_connected_count += 1;
                }
            } else if syn.perm.value() > params.initial_perm {
                self.inactive_well_connected_count += 1;
            }
            if syn.perm.is_connected() {
                self.connected_count += 1;
            }
        }
    }

    /// The main spatial learning rule: increment active synapses,
    /// decrement inactive ones, both clamped to [0, 1]. Synapses whose
    /// permanence reaches exactly 0 are removed; the segment persists.
    pub fn adapt_permanences(&mut self, inputs: &[&dyn DataSpace], params: &SynapseParams) {
        for syn in &mut self.synapses {
            if inputs[syn.input].is_active(syn.x, syn.y, syn.v) {
                syn.perm.increase(params);
            } else {
                syn.perm.decrease(params);
            }
        }
        self.synapses.retain(|syn| syn.perm.value() > 0.0);
    }

    /// Nudge unconnected synapses up toward the connection threshold (and
    /// over-connected ones back down to it), both by `amount`. Runs while
    /// a column sits at its boost cap.
    pub fn boost_permanences(&mut self, amount: f32, params: &SynapseParams) {
        for syn in &mut self.synapses {
            if syn.perm.value() < params.connected_perm {
                syn.perm.increase_by(params, amount, params.connected_perm);
            } else if syn.perm.value() > params.connected_perm {
                syn.perm.decrease_by(params, amount, params.connected_perm);
            }
        }
    }

    /// Set every connected synapse to exactly the connection threshold.
    ///
    /// Runs on the first step of a boost episode so synapses from inactive
    /// inputs are easy to lose and the column can be repurposed for a
    /// smaller subpattern.
    pub fn snap_down_connected(&mut self, params: &SynapseParams) {
        for syn in &mut self.synapses {
            if syn.perm.value() > params.connected_perm {
                syn.perm.set(params, params.connected_perm);
            }
        }
    }

    /// Largest distance-to-input among connected synapses; the column's
    /// connected receptive field size.
    pub fn max_connected_distance(&self) -> f32 {
        self.synapses
            .iter()
            .filter(|syn| syn.perm.is_connected())
            .map(|syn| syn.distance_to_input)
            .fold(0.0, f32::max)
    }
}

/// One candidate input value during receptive-field sampling.
#[derive(Clone, Copy, Default)]
struct SamplePoint {
    x: usize,
    y: usize,
    v: usize,
    distance: f32,
    weight: f32,
}

/// A vertical stack of cells sharing one feed-forward receptive field.
#[derive(Default)]
pub struct Column {
    pub position: Point,
    pub hypercolumn_position: Point,

    pub proximal: ProximalSegment,
    pub cells: Vec<CellId>,

    /// Minimum active connected synapses for the column to compete.
    pub min_overlap: usize,
    pub overlap: f32,
    pub is_active: bool,
    pub is_inhibited: bool,

    pub boost: f32,
    pub min_boost: f32,
    /// `None` means boosting is unlimited.
    pub max_boost: Option<f32>,
    pub prev_boost_time: i64,

    pub active_duty_cycle: f32,
    pub fast_active_duty_cycle: f32,
    pub overlap_duty_cycle: f32,
    pub max_duty_cycle: f32,

    pub desired_local_activity: usize,
    /// Active-synapse count at which an existing segment is re-used to
    /// represent new activity instead of growing a fresh one. Randomized
    /// per column within the region's configured range.
    pub min_overlap_to_reuse_segment: usize,
}

impl Column {
    pub fn new(
        position: Point,
        hypercolumn_diameter: usize,
        activation_threshold: usize,
        min_overlap_to_reuse_segment: usize,
        region_max_boost: Option<f32>,
        rng: &mut StdRng,
    ) -> Self {
        // A random low boost floor breaks overlap ties between columns;
        // the cap gets a similar jitter so fully boosted columns differ.
        let min_boost = 1.0 + rng.gen::<f32>() * BOOST_VARIANCE;
        let max_boost = region_max_boost.map(|mb| mb - rng.gen::<f32>() * BOOST_VARIANCE);

        Self {
            position,
            hypercolumn_position: Point::new(
                position.x / hypercolumn_diameter,
                position.y / hypercolumn_diameter,
            ),
            proximal: ProximalSegment {
                activation_threshold,
                ..ProximalSegment::default()
            },
            cells: Vec::new(),
            min_overlap: 0,
            overlap: 0.0,
            is_active: false,
            is_inhibited: false,
            boost: min_boost,
            min_boost,
            max_boost,
            prev_boost_time: 0,
            active_duty_cycle: 1.0,
            fast_active_duty_cycle: 1.0,
            overlap_duty_cycle: 1.0,
            max_duty_cycle: 0.0,
            desired_local_activity: 0,
            min_overlap_to_reuse_segment,
        }
    }

    /// Build this column's proximal receptive field.
    ///
    /// For each input space: restrict candidate hypercolumns to a square
    /// of `input_radius` around the column's proportionally mapped center
    /// (all of them for −1), expand to individual input values, then draw
    /// `pct_input_per_column × volume` values without replacement,
    /// weighted 1 inside the radius and 0 outside. Each drawn value gets a
    /// synapse with permanence sampled from a normal distribution centered
    /// on the connection threshold, recording its distance to the field
    /// center in destination (region) coordinates.
    #[allow(clippy::too_many_arguments)]
    pub fn create_proximal_synapses(
        &mut self,
        inputs: &[&dyn DataSpace],
        input_radii: &[i64],
        grid: &Grid,
        params: &SynapseParams,
        pct_input_per_column: f32,
        pct_min_overlap: f32,
        rng: &mut StdRng,
    ) {
        let mut min_overlap = 0usize;

        let dest_hcols_x = grid.width / grid.hypercolumn_diameter;
        let dest_hcols_y = grid.height / grid.hypercolumn_diameter;
        let dest_hcol_x = self.position.x / grid.hypercolumn_diameter;
        let dest_hcol_y = self.position.y / grid.hypercolumn_diameter;

        // The center of this column's hypercolumn as a fraction of the
        // region, mapped proportionally into each input space.
        let input_center_x = (dest_hcol_x as f32 + 0.5) / dest_hcols_x as f32;
        let input_center_y = (dest_hcol_y as f32 + 0.5) / dest_hcols_y as f32;

        let permanence_dist = Normal::new(params.connected_perm as f64, params.perm_inc as f64)
            .expect("permanence increase must be positive");

        for (input_index, input) in inputs.iter().enumerate() {
            let input_radius = input_radii[input_index];
            let src_d = input.hypercolumn_diameter();
            let src_hcols_x = input.size_x() / src_d;
            let src_hcols_y = input.size_y() / src_d;

            let src_hcol_x =
                ((input_center_x * src_hcols_x as f32) as usize).min(src_hcols_x - 1);
            let src_hcol_y =
                ((input_center_y * src_hcols_y as f32) as usize).min(src_hcols_y - 1);

            let area_hcols = if input_radius == -1 {
                Area::new(0, 0, src_hcols_x - 1, src_hcols_y - 1)
            } else {
                let r = input_radius as usize;
                Area::new(
                    src_hcol_x.saturating_sub(r),
                    src_hcol_y.saturating_sub(r),
                    (src_hcol_x + r).min(src_hcols_x - 1),
                    (src_hcol_y + r).min(src_hcols_y - 1),
                )
            };

            let area_cols = Area::new(
                area_hcols.min_x * src_d,
                area_hcols.min_y * src_d,
                (area_hcols.max_x + 1) * src_d - 1,
                (area_hcols.max_y + 1) * src_d - 1,
            );

            let input_volume = area_cols.area() * input.num_values();
            let mut synapses_per_segment =
                (input_volume as f32 * pct_input_per_column + 0.5) as usize;
            synapses_per_segment = synapses_per_segment.min(input_volume);

            min_overlap += (synapses_per_segment as f32 * pct_min_overlap).ceil() as usize;

            // Expand candidate hypercolumns into individual input values,
            // weighting each by membership in the radius.
            let mut samples: Vec<SamplePoint> = Vec::with_capacity(input_volume);
            let mut sum_weight = 0.0f32;
            for hy in area_hcols.min_y..=area_hcols.max_y {
                for hx in area_hcols.min_x..=area_hcols.max_x {
                    let dx = src_hcol_x as f32 - hx as f32;
                    let dy = src_hcol_y as f32 - hy as f32;
                    let distance_src = (dx * dx + dy * dy).sqrt();

                    let ddx = dx * (dest_hcols_x as f32 / src_hcols_x as f32);
                    let ddy = dy * (dest_hcols_y as f32 / src_hcols_y as f32);
                    let distance_dst = (ddx * ddx + ddy * ddy).sqrt();

                    let weight = if input_radius == -1 || distance_src < (input_radius + 1) as f32
                    {
                        1.0
                    } else {
                        0.0
                    };

                    for (y, x, v) in iproduct!(0..src_d, 0..src_d, 0..input.num_values()) {
                        samples.push(SamplePoint {
                            x: hx * src_d + x,
                            y: hy * src_d + y,
                            v,
                            distance: distance_dst,
                            weight,
                        });
                        sum_weight += weight;
                    }
                }
            }
            debug_assert_eq!(samples.len(), input_volume);

            // Weighted draw without replacement: pick a point in
            // [0, sum_weight), scan linearly to it, then swap the pick
            // into the used prefix and subtract its weight.
            let mut num_samples = 0;
            while num_samples < synapses_per_segment {
                let cur_sample = rng.gen::<f32>() * sum_weight;

                let mut accumulated = 0.0f32;
                let mut pos = num_samples;
                for candidate in num_samples..samples.len() {
                    pos = candidate;
                    accumulated += samples[candidate].weight;
                    if accumulated >= cur_sample {
                        break;
                    }
                }

                sum_weight -= samples[pos].weight;

                let permanence = permanence_dist.sample(rng) as f32;
                let point = samples[pos];
                self.proximal.synapses.push(ProximalSynapse::new(
                    params,
                    input_index,
                    point.x,
                    point.y,
                    point.v,
                    permanence.clamp(0.0, 1.0),
                    point.distance,
                ));

                samples.swap(num_samples, pos);
                num_samples += 1;
            }
        }

        self.min_overlap = min_overlap.max(1);
    }

    /// The spatial pooler overlap with the current input.
    ///
    /// Zero below `min_overlap`; otherwise the active connected count,
    /// scaled down by the share of well-connected-but-inactive synapses
    /// and scaled up by the boost factor.
    pub fn compute_overlap(&mut self, inputs: &[&dyn DataSpace], params: &SynapseParams) {
        self.proximal.process(inputs, params);

        let active_connected = self.proximal.active_connected_count;
        if active_connected < self.min_overlap {
            self.overlap = 0.0;
        } else {
            let penalty = active_connected as f32
                / (active_connected + self.proximal.inactive_well_connected_count) as f32;
            self.overlap = active_connected as f32 * penalty * self.boost;
        }
    }

    /// Recompute the desired number of winners within the inhibition
    /// window; runs whenever the inhibition radius changes.
    pub fn determine_desired_local_activity(
        &mut self,
        grid: &Grid,
        inhibition_radius: f32,
        pct_local_activity: f32,
    ) {
        let window = grid
            .columns_within_hypercolumn_radius(self.position, (inhibition_radius + 0.5) as usize);
        self.desired_local_activity = (window.area() as f32 * pct_local_activity + 0.5) as usize;
    }

    /// EMA updates for the post-inhibition activity duty cycles.
    pub fn update_active_duty_cycle(&mut self) {
        let mut cycle = (1.0 - EMA_ALPHA) * self.active_duty_cycle;
        if self.is_active {
            cycle += EMA_ALPHA;
        }
        self.active_duty_cycle = cycle;

        let mut fast = (1.0 - FAST_EMA_ALPHA) * self.fast_active_duty_cycle;
        if self.is_active {
            fast += FAST_EMA_ALPHA;
        }
        self.fast_active_duty_cycle = fast;
    }

    /// EMA update for how often overlap (with boost factored back out)
    /// reaches the minimum.
    pub fn update_overlap_duty_cycle(&mut self) {
        let mut cycle = (1.0 - EMA_ALPHA) * self.overlap_duty_cycle;
        if self.overlap / self.boost >= self.min_overlap as f32 {
            cycle += EMA_ALPHA;
        }
        self.overlap_duty_cycle = cycle;
    }

    /// The homeostatic boosting rule.
    ///
    /// An under-active column raises its boost linearly each step; on the
    /// first step of a boost episode its connected permanences are first
    /// snapped down to the connection threshold. At the cap, permanences
    /// are nudged toward the threshold instead. A recovered column decays
    /// its boost back to the floor.
    pub fn perform_boosting(
        &mut self,
        boost_rate: f32,
        step_counter: i64,
        params: &SynapseParams,
    ) {
        if self.active_duty_cycle < self.max_duty_cycle * INCREASE_BOOST_THRESHOLD {
            let below_cap = match self.max_boost {
                Some(max) => self.boost < max,
                None => true,
            };

            if below_cap {
                if self.prev_boost_time < step_counter - 1 {
                    // New boost episode begins.
                    self.proximal.snap_down_connected(params);
                }

                self.boost += boost_rate;
                if let Some(max) = self.max_boost {
                    self.boost = self.boost.min(max);
                }
                self.prev_boost_time = step_counter;
            } else {
                self.proximal.boost_permanences(boost_rate, params);
            }
        } else if self.boost > self.min_boost
            && self.active_duty_cycle > self.max_duty_cycle * DECREASE_BOOST_THRESHOLD
            && self.fast_active_duty_cycle > self.max_duty_cycle * DECREASE_BOOST_THRESHOLD
        {
            self.boost = (self.boost - boost_rate).max(self.min_boost);
        }
    }

    /// The cell with the best matching segment for exactly
    /// `num_prediction_steps`, judged at t−1 when `previous`.
    ///
    /// If no cell has a qualifying segment, the cell with the fewest
    /// segments wins, ties broken uniformly at random (1-in-k reservoir
    /// selection), and no segment is returned — signaling that a new one
    /// should be created.
    pub fn best_matching_cell(
        &self,
        num_prediction_steps: usize,
        previous: bool,
        cells: &Pool<Cell>,
        segments: &Pool<Segment>,
        rng: &mut StdRng,
    ) -> (CellId, Option<SegmentId>) {
        let mut best_cell = None;
        let mut best_segment = None;
        let mut best_count = 0;

        for &cid in &self.cells {
            let cell = cells.get(cid);
            if let Some(sid) = cell.best_matching_segment(
                num_prediction_steps,
                previous,
                self.min_overlap_to_reuse_segment,
                segments,
            ) {
                let seg = segments.get(sid);
                let syn_count = if previous {
                    seg.prev_active_synapse_count()
                } else {
                    seg.active_synapse_count()
                };

                if syn_count > best_count {
                    best_cell = Some(cid);
                    best_segment = Some(sid);
                    best_count = syn_count;
                }
            }
        }

        if let Some(cid) = best_cell {
            return (cid, best_segment);
        }

        // No qualifying segment anywhere: pick among the cells with the
        // fewest segments, each with equal probability.
        let mut fewest = usize::MAX;
        let mut same_count = 0;
        let mut chosen = self.cells[0];
        for &cid in &self.cells {
            let num_segments = cells.get(cid).segments.len();

            if num_segments < fewest {
                same_count = 1;
            } else if num_segments == fewest {
                same_count += 1;
            }

            if num_segments < fewest
                || (num_segments == fewest && rng.gen_range(0..same_count) == 0)
            {
                fewest = num_segments;
                chosen = cid;
            }
        }

        (chosen, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// Minimal input space for proximal tests.
    struct TestSpace {
        w: usize,
        h: usize,
        v: usize,
        bits: Vec<bool>,
    }

    impl TestSpace {
        fn new(w: usize, h: usize, v: usize) -> Self {
            Self {
                w,
                h,
                v,
                bits: vec![false; w * h * v],
            }
        }

        fn set(&mut self, x: usize, y: usize, v: usize) {
            self.bits[(y * self.w + x) * self.v + v] = true;
        }
    }

    impl DataSpace for TestSpace {
        fn size_x(&self) -> usize {
            self.w
        }
        fn size_y(&self) -> usize {
            self.h
        }
        fn num_values(&self) -> usize {
            self.v
        }
        fn hypercolumn_diameter(&self) -> usize {
            1
        }
        fn is_active(&self, x: usize, y: usize, v: usize) -> bool {
            self.bits[(y * self.w + x) * self.v + v]
        }
    }

    fn grid_1x4() -> Grid {
        Grid {
            width: 4,
            height: 1,
            hypercolumn_diameter: 1,
        }
    }

    fn new_column(rng: &mut StdRng) -> Column {
        Column::new(Point::new(0, 0), 1, 1, 1, None, rng)
    }

    #[test]
    fn test_grid_radius_window() {
        let grid = Grid {
            width: 8,
            height: 8,
            hypercolumn_diameter: 2,
        };

        let area = grid.columns_within_hypercolumn_radius(Point::new(4, 4), 1);
        assert_eq!(area, Area::new(2, 2, 7, 7));

        // Clipped at the grid edges.
        let area = grid.columns_within_hypercolumn_radius(Point::new(0, 0), 1);
        assert_eq!(area, Area::new(0, 0, 3, 3));
    }

    #[test]
    fn test_proximal_sampling_covers_requested_fraction() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut col = new_column(&mut rng);
        let space = TestSpace::new(4, 1, 1);
        let inputs: Vec<&dyn DataSpace> = vec![&space];

        col.create_proximal_synapses(
            &inputs,
            &[-1],
            &grid_1x4(),
            &SynapseParams::default(),
            1.0,
            0.1,
            &mut rng,
        );

        assert_eq!(col.proximal.synapses.len(), 4);
        assert_eq!(col.min_overlap, 1);

        // All four input values sampled exactly once.
        let mut coords: Vec<usize> = col.proximal.synapses.iter().map(|s| s.x).collect();
        coords.sort_unstable();
        assert_eq!(coords, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_overlap_zero_without_connected_synapses() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut col = new_column(&mut rng);
        let params = SynapseParams::default();

        let mut space = TestSpace::new(2, 1, 1);
        space.set(0, 0, 0);
        space.set(1, 0, 0);

        // Two active but unconnected synapses, high boost.
        for x in 0..2 {
            col.proximal.synapses.push(ProximalSynapse::new(
                &params,
                0,
                x,
                0,
                0,
                params.connected_perm - 0.05,
                0.0,
            ));
        }
        col.min_overlap = 1;
        col.boost = 10.0;

        let inputs: Vec<&dyn DataSpace> = vec![&space];
        col.compute_overlap(&inputs, &params);
        assert_eq!(col.overlap, 0.0);
    }

    #[test]
    fn test_overlap_gated_by_min_overlap() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut col = new_column(&mut rng);
        let params = SynapseParams::default();

        let mut space = TestSpace::new(2, 1, 1);
        space.set(0, 0, 0);

        for x in 0..2 {
            col.proximal.synapses.push(ProximalSynapse::new(
                &params,
                0,
                x,
                0,
                0,
                params.connected_perm,
                0.0,
            ));
        }

        let inputs: Vec<&dyn DataSpace> = vec![&space];

        col.min_overlap = 2;
        col.compute_overlap(&inputs, &params);
        assert_eq!(col.overlap, 0.0, "one active synapse is below min_overlap 2");

        col.min_overlap = 1;
        col.boost = 2.0;
        col.compute_overlap(&inputs, &params);
        assert!((col.overlap - 2.0).abs() < 1e-6, "1 active * penalty 1 * boost 2");
    }

    #[test]
    fn test_overlap_penalizes_inactive_well_connected() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut col = new_column(&mut rng);
        let params = SynapseParams::default();

        let mut space = TestSpace::new(2, 1, 1);
        space.set(0, 0, 0);

        col.proximal.synapses.push(ProximalSynapse::new(
            &params, 0, 0, 0, 0, 0.9, 0.0,
        ));
        // Strongly connected but inactive.
        col.proximal.synapses.push(ProximalSynapse::new(
            &params, 0, 1, 0, 0, 0.9, 0.0,
        ));
        col.min_overlap = 1;
        col.boost = 1.0;

        let inputs: Vec<&dyn DataSpace> = vec![&space];
        col.compute_overlap(&inputs, &params);
        assert!((col.overlap - 0.5).abs() < 1e-6, "1 active * (1 / (1 + 1))");
    }

    #[test]
    fn test_adapt_permanences_prunes_dead_synapses() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut col = new_column(&mut rng);
        let params = SynapseParams {
            perm_dec: 0.1,
            ..SynapseParams::default()
        };

        let mut space = TestSpace::new(2, 1, 1);
        space.set(0, 0, 0);

        col.proximal.synapses.push(ProximalSynapse::new(
            &params, 0, 0, 0, 0, 0.5, 0.0,
        ));
        col.proximal.synapses.push(ProximalSynapse::new(
            &params, 0, 1, 0, 0, 0.1, 0.0,
        ));

        let inputs: Vec<&dyn DataSpace> = vec![&space];
        col.proximal.adapt_permanences(&inputs, &params);

        // The inactive synapse hit exactly zero and was pruned.
        assert_eq!(col.proximal.synapses.len(), 1);
        assert_eq!(col.proximal.synapses[0].x, 0);
        assert!((col.proximal.synapses[0].perm.value() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_boost_episode_snaps_down_connected_permanences() {
        let mut rng = StdRng::seed_from_u64(6);
        let mut col = new_column(&mut rng);
        let params = SynapseParams::default();

        col.proximal.synapses.push(ProximalSynapse::new(
            &params, 0, 0, 0, 0, 0.8, 0.0,
        ));
        col.max_boost = Some(4.0);
        col.active_duty_cycle = 0.0;
        col.max_duty_cycle = 1.0;
        col.prev_boost_time = 0;

        let boost_before = col.boost;
        col.perform_boosting(0.1, 10, &params);

        assert!((col.proximal.synapses[0].perm.value() - params.connected_perm).abs() < 1e-6);
        assert!((col.boost - (boost_before + 0.1)).abs() < 1e-6);
        assert_eq!(col.prev_boost_time, 10);

        // The next consecutive boosted step does not snap again.
        col.proximal.synapses[0].perm.set(&params, 0.5);
        col.perform_boosting(0.1, 11, &params);
        assert!((col.proximal.synapses[0].perm.value() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_boost_at_cap_nudges_permanences() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut col = new_column(&mut rng);
        let params = SynapseParams::default();

        col.proximal.synapses.push(ProximalSynapse::new(
            &params, 0, 0, 0, 0, 0.1, 0.0,
        ));
        col.max_boost = Some(2.0);
        col.boost = 2.0;
        col.active_duty_cycle = 0.0;
        col.max_duty_cycle = 1.0;

        col.perform_boosting(0.05, 10, &params);
        assert!((col.proximal.synapses[0].perm.value() - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_boost_decays_when_recovered() {
        let mut rng = StdRng::seed_from_u64(8);
        let mut col = new_column(&mut rng);
        let params = SynapseParams::default();

        col.boost = 2.0;
        col.active_duty_cycle = 0.9;
        col.fast_active_duty_cycle = 0.9;
        col.max_duty_cycle = 1.0;

        col.perform_boosting(0.1, 10, &params);
        assert!((col.boost - 1.9).abs() < 1e-6);

        // Decay floors at the column's jittered minimum.
        col.boost = col.min_boost + 0.05;
        col.perform_boosting(0.1, 11, &params);
        assert!((col.boost - col.min_boost).abs() < 1e-6);
    }

    #[test]
    fn test_duty_cycle_ema() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut col = new_column(&mut rng);

        col.active_duty_cycle = 1.0;
        col.is_active = false;
        col.update_active_duty_cycle();
        assert!((col.active_duty_cycle - (1.0 - EMA_ALPHA)).abs() < 1e-6);
        assert!((col.fast_active_duty_cycle - (1.0 - FAST_EMA_ALPHA)).abs() < 1e-6);

        col.is_active = true;
        col.update_active_duty_cycle();
        let expected = (1.0 - EMA_ALPHA) * (1.0 - EMA_ALPHA) + EMA_ALPHA;
        assert!((col.active_duty_cycle - expected).abs() < 1e-6);
    }

    #[test]
    fn test_overlap_duty_cycle_divides_out_boost() {
        let mut rng = StdRng::seed_from_u64(10);
        let mut col = new_column(&mut rng);

        col.min_overlap = 2;
        col.boost = 2.0;
        col.overlap = 4.0; // 2 active connected * boost 2
        col.overlap_duty_cycle = 0.0;

        col.update_overlap_duty_cycle();
        assert!((col.overlap_duty_cycle - EMA_ALPHA).abs() < 1e-6);
    }

    #[test]
    fn test_best_matching_cell_fewest_segments_deterministic() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut col = new_column(&mut rng);
        let mut cells: Pool<Cell> = Pool::new();
        let mut segments: Pool<Segment> = Pool::new();

        for index in 0..3 {
            let cid = cells.alloc();
            cells.get_mut(cid).init(0, index);
            col.cells.push(cid);
        }
        // Cell 1 has one (non-matching) segment; 0 and 2 tie at zero.
        let sid = segments.alloc();
        segments.get_mut(sid).init(0, 1);
        cells.get_mut(1).segments.push(sid);

        let mut tie_rng1 = StdRng::seed_from_u64(42);
        let (cell_a, seg_a) = col.best_matching_cell(1, true, &cells, &segments, &mut tie_rng1);
        assert!(seg_a.is_none());
        assert_ne!(cell_a, 1, "cell with more segments never wins the tie");

        let mut tie_rng2 = StdRng::seed_from_u64(42);
        let (cell_b, _) = col.best_matching_cell(1, true, &cells, &segments, &mut tie_rng2);
        assert_eq!(cell_a, cell_b, "tie-break is stable under a fixed seed");
    }
}
