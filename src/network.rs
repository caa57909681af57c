//! The network: input spaces and regions stepping in lockstep.
//!
//! Regions are stepped in declaration order, so a downstream region sees
//! its upstream regions' just-computed activity within the same step.
//! External drivers mutate the input spaces between steps; the engine only
//! reads them.

use std::path::Path;

use tracing::{debug, info};

use crate::config::NetworkConfig;
use crate::dataspace::DataSpace;
use crate::error::{CorticalError, Result};
use crate::input_space::InputSpace;
use crate::region::Region;
use crate::snapshot::{
    CellSnapshot, ColumnSnapshot, DistalSegmentSnapshot, DistalSynapseSnapshot, NetworkSnapshot,
    ProximalSegmentSnapshot, ProximalSynapseSnapshot, RegionSnapshot, SourceKind,
};
use crate::synapse::{DistalSynapse, Permanence, ProximalSynapse};

/// A resolved input binding: which data space a region reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceRef {
    Input(usize),
    Region(usize),
}

pub struct Network {
    input_spaces: Vec<InputSpace>,
    regions: Vec<Region>,
    /// Per region, the resolved sources in binding order.
    bindings: Vec<Vec<SourceRef>>,
    time: i64,
}

impl Network {
    /// Build a network from a validated description.
    ///
    /// Regions resolve their inputs against input spaces and
    /// earlier-declared regions; receptive fields are sampled immediately,
    /// so the network is ready to step.
    pub fn from_config(config: &NetworkConfig) -> Result<Self> {
        config.validate()?;

        let input_spaces: Vec<InputSpace> = config
            .input_spaces
            .iter()
            .map(|space| {
                InputSpace::new(space.id.clone(), space.size_x, space.size_y, space.num_values)
            })
            .collect();

        let mut regions: Vec<Region> = Vec::new();
        let mut bindings: Vec<Vec<SourceRef>> = Vec::new();

        for (ri, region_config) in config.regions.iter().enumerate() {
            let mut region_bindings = Vec::new();
            let mut radii = Vec::new();

            for binding in &region_config.inputs {
                let source = input_spaces
                    .iter()
                    .position(|space| space.id() == binding.id)
                    .map(SourceRef::Input)
                    .or_else(|| {
                        regions
                            .iter()
                            .position(|region| region.id() == binding.id)
                            .map(SourceRef::Region)
                    })
                    .ok_or_else(|| CorticalError::UnknownInput {
                        id: binding.id.clone(),
                    })?;
                region_bindings.push(source);
                radii.push(binding.radius);
            }

            let params = region_config.to_params();

            if region_config.hardcoded_spatial {
                let source = Self::resolve_source(&input_spaces, &regions, region_bindings[0]);
                if source.size_x() != params.width
                    || source.size_y() != params.height
                    || source.num_values() != 1
                {
                    return Err(CorticalError::Config(format!(
                        "region {}: hardcodedSpatial input must be {}x{} with one value",
                        region_config.id, params.width, params.height
                    )));
                }
            }

            let proximal = region_config
                .proximal_synapse_params
                .unwrap_or(config.proximal_synapse_params)
                .to_params();
            let distal = region_config
                .distal_synapse_params
                .unwrap_or(config.distal_synapse_params)
                .to_params();

            let mut region = Region::new(
                region_config.id.clone(),
                params,
                proximal,
                distal,
                radii,
                config.seed.wrapping_add(ri as u64),
            );

            {
                let views: Vec<&dyn DataSpace> = region_bindings
                    .iter()
                    .map(|&source| Self::resolve_source(&input_spaces, &regions, source))
                    .collect();
                region.initialize(&views);
            }

            regions.push(region);
            bindings.push(region_bindings);
        }

        info!(
            inputs = input_spaces.len(),
            regions = regions.len(),
            seed = config.seed,
            "network built"
        );

        Ok(Self {
            input_spaces,
            regions,
            bindings,
            time: 0,
        })
    }

    fn resolve_source<'a>(
        input_spaces: &'a [InputSpace],
        regions: &'a [Region],
        source: SourceRef,
    ) -> &'a dyn DataSpace {
        match source {
            SourceRef::Input(i) => &input_spaces[i],
            SourceRef::Region(j) => &regions[j],
        }
    }

    /// Advance the whole network one time step.
    pub fn step(&mut self) {
        self.time += 1;

        for ri in 0..self.regions.len() {
            let (upstream, rest) = self.regions.split_at_mut(ri);
            let region = &mut rest[0];

            let views: Vec<&dyn DataSpace> = self.bindings[ri]
                .iter()
                .map(|&source| match source {
                    SourceRef::Input(i) => &self.input_spaces[i] as &dyn DataSpace,
                    SourceRef::Region(j) => &upstream[j] as &dyn DataSpace,
                })
                .collect();

            region.step(&views);
        }
    }

    #[inline]
    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn input_spaces(&self) -> &[InputSpace] {
        &self.input_spaces
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn input_space(&self, id: &str) -> Option<&InputSpace> {
        self.input_spaces.iter().find(|space| space.id() == id)
    }

    pub fn input_space_mut(&mut self, id: &str) -> Option<&mut InputSpace> {
        self.input_spaces.iter_mut().find(|space| space.id() == id)
    }

    pub fn region(&self, id: &str) -> Option<&Region> {
        self.regions.iter().find(|region| region.id() == id)
    }

    /// Capture all learned state into a snapshot.
    pub fn capture_snapshot(&self) -> NetworkSnapshot {
        let regions = self
            .regions
            .iter()
            .enumerate()
            .map(|(ri, region)| self.capture_region(ri, region))
            .collect();

        NetworkSnapshot {
            time: self.time,
            regions,
        }
    }

    fn capture_region(&self, ri: usize, region: &Region) -> RegionSnapshot {
        let width = region.size_x();

        let columns = region
            .columns
            .iter()
            .map(|column| {
                let proximal = ProximalSegmentSnapshot {
                    connected_count: column.proximal.connected_count,
                    prev_connected_count: column.proximal.prev_connected_count,
                    activation_threshold: column.proximal.activation_threshold,
                    synapses: column
                        .proximal
                        .synapses
                        .iter()
                        .map(|syn| {
                            let (source_kind, source_index) =
                                match self.bindings[ri][syn.input] {
                                    SourceRef::Input(i) => (SourceKind::InputSpace, i),
                                    SourceRef::Region(j) => (SourceKind::Region, j),
                                };
                            ProximalSynapseSnapshot {
                                permanence: syn.perm.value(),
                                source_kind,
                                source_index,
                                x: syn.x,
                                y: syn.y,
                                v: syn.v,
                                distance_to_input: syn.distance_to_input,
                            }
                        })
                        .collect(),
                };

                let cells = column
                    .cells
                    .iter()
                    .map(|&cid| {
                        let segments = region
                            .cells
                            .get(cid)
                            .segments
                            .iter()
                            .map(|&sid| {
                                let seg = region.segments.get(sid);
                                DistalSegmentSnapshot {
                                    num_prediction_steps: seg.num_prediction_steps(),
                                    connected_count: seg.connected_count,
                                    prev_connected_count: seg.prev_connected_count,
                                    activation_threshold: seg.activation_threshold,
                                    creation_time: seg.creation_time,
                                    synapses: seg
                                        .synapses
                                        .iter()
                                        .map(|syn| {
                                            let src = region.cells.get(syn.src);
                                            DistalSynapseSnapshot {
                                                permanence: syn.perm.value(),
                                                x: src.column % width,
                                                y: src.column / width,
                                                cell_index: src.index,
                                            }
                                        })
                                        .collect(),
                                }
                            })
                            .collect();
                        CellSnapshot { segments }
                    })
                    .collect();

                ColumnSnapshot {
                    overlap_duty_cycle: column.overlap_duty_cycle,
                    active_duty_cycle: column.active_duty_cycle,
                    fast_active_duty_cycle: column.fast_active_duty_cycle,
                    min_boost: column.min_boost,
                    max_boost: column.max_boost.unwrap_or(-1.0),
                    boost: column.boost,
                    prev_boost_time: column.prev_boost_time,
                    proximal,
                    cells,
                }
            })
            .collect();

        RegionSnapshot {
            width,
            height: region.size_y(),
            cells_per_col: region.params.cells_per_col,
            step_counter: region.step_counter(),
            columns,
        }
    }

    /// Restore learned state from a snapshot.
    ///
    /// The snapshot is validated in full against the running network
    /// first; an incompatible snapshot is rejected without touching any
    /// state.
    pub fn apply_snapshot(&mut self, snapshot: &NetworkSnapshot) -> Result<()> {
        self.validate_snapshot(snapshot)?;

        self.time = snapshot.time;

        for (ri, region_snapshot) in snapshot.regions.iter().enumerate() {
            let bindings = self.bindings[ri].clone();
            let region = &mut self.regions[ri];
            region.set_step_counter(region_snapshot.step_counter);

            for (ci, column_snapshot) in region_snapshot.columns.iter().enumerate() {
                let proximal_params = region.proximal_params;
                let distal_params = region.distal_params;
                let column = &mut region.columns[ci];

                column.overlap_duty_cycle = column_snapshot.overlap_duty_cycle;
                column.active_duty_cycle = column_snapshot.active_duty_cycle;
                column.fast_active_duty_cycle = column_snapshot.fast_active_duty_cycle;
                column.min_boost = column_snapshot.min_boost;
                column.max_boost = if column_snapshot.max_boost < 0.0 {
                    None
                } else {
                    Some(column_snapshot.max_boost)
                };
                column.boost = column_snapshot.boost;
                column.prev_boost_time = column_snapshot.prev_boost_time;

                column.proximal.synapses.clear();
                for syn in &column_snapshot.proximal.synapses {
                    let target = match syn.source_kind {
                        SourceKind::InputSpace => SourceRef::Input(syn.source_index),
                        SourceKind::Region => SourceRef::Region(syn.source_index),
                    };
                    let binding_index = bindings
                        .iter()
                        .position(|&b| b == target)
                        .expect("validated above");
                    column.proximal.synapses.push(ProximalSynapse::new(
                        &proximal_params,
                        binding_index,
                        syn.x,
                        syn.y,
                        syn.v,
                        syn.permanence,
                        syn.distance_to_input,
                    ));
                }
                column.proximal.connected_count = column_snapshot.proximal.connected_count;
                column.proximal.prev_connected_count =
                    column_snapshot.proximal.prev_connected_count;
                column.proximal.activation_threshold =
                    column_snapshot.proximal.activation_threshold;

                let cell_ids = column.cells.clone();
                let grid = *region.grid();

                for (cell_snapshot, &cid) in column_snapshot.cells.iter().zip(&cell_ids) {
                    // Drop current segments and queued updates before
                    // rebuilding from the snapshot.
                    let old_segments = std::mem::take(&mut region.cells.get_mut(cid).segments);
                    for sid in old_segments {
                        region.segments.release(sid);
                    }
                    let old_updates =
                        std::mem::take(&mut region.cells.get_mut(cid).pending_updates);
                    for uid in old_updates {
                        region.updates.release(uid);
                    }

                    for seg_snapshot in &cell_snapshot.segments {
                        let sid = region.segments.alloc();
                        let seg = region.segments.get_mut(sid);
                        seg.init(seg_snapshot.creation_time, seg_snapshot.activation_threshold);
                        seg.set_num_prediction_steps(seg_snapshot.num_prediction_steps);
                        seg.connected_count = seg_snapshot.connected_count;
                        seg.prev_connected_count = seg_snapshot.prev_connected_count;

                        for syn in &seg_snapshot.synapses {
                            let src_column = &region.columns[grid.index(syn.x, syn.y)];
                            let src = src_column.cells[syn.cell_index];
                            seg.synapses.push(DistalSynapse {
                                perm: Permanence::new(&distal_params, syn.permanence),
                                src,
                            });
                        }

                        region.cells.get_mut(cid).segments.push(sid);
                    }
                }
            }
        }

        debug!(time = self.time, "snapshot applied");
        Ok(())
    }

    fn validate_snapshot(&self, snapshot: &NetworkSnapshot) -> Result<()> {
        if snapshot.regions.len() != self.regions.len() {
            return Err(CorticalError::SnapshotMismatch(format!(
                "snapshot has {} regions, network has {}",
                snapshot.regions.len(),
                self.regions.len()
            )));
        }

        for (ri, (region_snapshot, region)) in
            snapshot.regions.iter().zip(&self.regions).enumerate()
        {
            if region_snapshot.width != region.size_x()
                || region_snapshot.height != region.size_y()
                || region_snapshot.cells_per_col != region.params.cells_per_col
            {
                return Err(CorticalError::SnapshotMismatch(format!(
                    "region {} dimensions differ: snapshot {}x{}x{}, network {}x{}x{}",
                    region.id(),
                    region_snapshot.width,
                    region_snapshot.height,
                    region_snapshot.cells_per_col,
                    region.size_x(),
                    region.size_y(),
                    region.params.cells_per_col
                )));
            }

            if region_snapshot.columns.len() != region.columns.len() {
                return Err(CorticalError::SnapshotMismatch(format!(
                    "region {} has {} columns in snapshot, {} in network",
                    region.id(),
                    region_snapshot.columns.len(),
                    region.columns.len()
                )));
            }

            for column_snapshot in &region_snapshot.columns {
                if column_snapshot.cells.len() != region.params.cells_per_col {
                    return Err(CorticalError::SnapshotMismatch(format!(
                        "region {} column has {} cells in snapshot",
                        region.id(),
                        column_snapshot.cells.len()
                    )));
                }

                for syn in &column_snapshot.proximal.synapses {
                    let target = match syn.source_kind {
                        SourceKind::InputSpace => SourceRef::Input(syn.source_index),
                        SourceKind::Region => SourceRef::Region(syn.source_index),
                    };
                    let Some(binding_index) =
                        self.bindings[ri].iter().position(|&b| b == target)
                    else {
                        return Err(CorticalError::SnapshotMismatch(format!(
                            "region {} proximal synapse references a data space that is not among its inputs",
                            region.id()
                        )));
                    };

                    let source = Self::resolve_source(
                        &self.input_spaces,
                        &self.regions,
                        self.bindings[ri][binding_index],
                    );
                    if syn.x >= source.size_x()
                        || syn.y >= source.size_y()
                        || syn.v >= source.num_values()
                    {
                        return Err(CorticalError::SnapshotMismatch(format!(
                            "region {} proximal synapse coordinate ({}, {}, {}) out of range",
                            region.id(),
                            syn.x,
                            syn.y,
                            syn.v
                        )));
                    }
                }

                for cell_snapshot in &column_snapshot.cells {
                    for seg_snapshot in &cell_snapshot.segments {
                        for syn in &seg_snapshot.synapses {
                            if syn.x >= region.size_x()
                                || syn.y >= region.size_y()
                                || syn.cell_index >= region.params.cells_per_col
                            {
                                return Err(CorticalError::SnapshotMismatch(format!(
                                    "region {} distal synapse coordinate ({}, {}, {}) out of range",
                                    region.id(),
                                    syn.x,
                                    syn.y,
                                    syn.cell_index
                                )));
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Write a snapshot of the learned state to a file.
    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        let bytes = self.capture_snapshot().to_bytes()?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    /// Load a snapshot file and restore the learned state.
    pub fn load_snapshot(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)?;
        let snapshot = NetworkSnapshot::from_bytes(&bytes)?;
        self.apply_snapshot(&snapshot)
    }
}
