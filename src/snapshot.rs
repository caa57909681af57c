//! Binary snapshots of learned state.
//!
//! A snapshot records, per region in declaration order: dimensions, then
//! per column in row-major order its duty cycles and boost state, the
//! proximal segment block, and per cell the distal segment blocks. Synapse
//! records carry the permanence, a tag identifying the source data space
//! (input space vs region, with its index in the network), the coordinate
//! triple, and — for proximal synapses — the distance to the input.
//!
//! Encoding is bincode. Loading validates dimensions and coordinates
//! against the running network before any state is touched; an
//! incompatible snapshot leaves the network unchanged.

use serde::{Deserialize, Serialize};

/// Which kind of data space a proximal synapse reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceKind {
    InputSpace,
    Region,
}

/// One proximal synapse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximalSynapseSnapshot {
    pub permanence: f32,
    pub source_kind: SourceKind,
    /// Index of the source within the network's input spaces or regions.
    pub source_index: usize,
    pub x: usize,
    pub y: usize,
    pub v: usize,
    pub distance_to_input: f32,
}

/// One distal synapse; the source cell lives in the same region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistalSynapseSnapshot {
    pub permanence: f32,
    pub x: usize,
    pub y: usize,
    pub cell_index: usize,
}

/// The proximal segment block of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProximalSegmentSnapshot {
    pub connected_count: usize,
    pub prev_connected_count: usize,
    pub activation_threshold: usize,
    pub synapses: Vec<ProximalSynapseSnapshot>,
}

/// A distal segment block of a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistalSegmentSnapshot {
    pub num_prediction_steps: usize,
    pub connected_count: usize,
    pub prev_connected_count: usize,
    pub activation_threshold: usize,
    pub creation_time: i64,
    pub synapses: Vec<DistalSynapseSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub segments: Vec<DistalSegmentSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    pub overlap_duty_cycle: f32,
    pub active_duty_cycle: f32,
    pub fast_active_duty_cycle: f32,
    pub min_boost: f32,
    /// −1 encodes an unlimited boost cap.
    pub max_boost: f32,
    pub boost: f32,
    pub prev_boost_time: i64,
    pub proximal: ProximalSegmentSnapshot,
    pub cells: Vec<CellSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionSnapshot {
    pub width: usize,
    pub height: usize,
    pub cells_per_col: usize,
    pub step_counter: i64,
    /// Row-major column order.
    pub columns: Vec<ColumnSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSnapshot {
    pub time: i64,
    pub regions: Vec<RegionSnapshot>,
}

impl NetworkSnapshot {
    /// Encode to compact binary.
    pub fn to_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode from binary.
    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_snapshot() -> NetworkSnapshot {
        NetworkSnapshot {
            time: 17,
            regions: vec![RegionSnapshot {
                width: 2,
                height: 1,
                cells_per_col: 1,
                step_counter: 17,
                columns: vec![
                    ColumnSnapshot {
                        overlap_duty_cycle: 0.5,
                        active_duty_cycle: 0.9,
                        fast_active_duty_cycle: 0.8,
                        min_boost: 1.004,
                        max_boost: -1.0,
                        boost: 1.004,
                        prev_boost_time: 3,
                        proximal: ProximalSegmentSnapshot {
                            connected_count: 1,
                            prev_connected_count: 1,
                            activation_threshold: 1,
                            synapses: vec![ProximalSynapseSnapshot {
                                permanence: 0.21,
                                source_kind: SourceKind::InputSpace,
                                source_index: 0,
                                x: 1,
                                y: 0,
                                v: 0,
                                distance_to_input: 0.5,
                            }],
                        },
                        cells: vec![CellSnapshot {
                            segments: vec![DistalSegmentSnapshot {
                                num_prediction_steps: 1,
                                connected_count: 1,
                                prev_connected_count: 0,
                                activation_threshold: 1,
                                creation_time: 4,
                                synapses: vec![DistalSynapseSnapshot {
                                    permanence: 0.3,
                                    x: 1,
                                    y: 0,
                                    cell_index: 0,
                                }],
                            }],
                        }],
                    },
                    ColumnSnapshot {
                        overlap_duty_cycle: 0.1,
                        active_duty_cycle: 0.2,
                        fast_active_duty_cycle: 0.3,
                        min_boost: 1.009,
                        max_boost: 3.995,
                        boost: 2.1,
                        prev_boost_time: 16,
                        proximal: ProximalSegmentSnapshot {
                            connected_count: 0,
                            prev_connected_count: 0,
                            activation_threshold: 1,
                            synapses: vec![],
                        },
                        cells: vec![CellSnapshot { segments: vec![] }],
                    },
                ],
            }],
        }
    }

    #[test]
    fn test_binary_round_trip() {
        let snapshot = sample_snapshot();
        let bytes = snapshot.to_bytes().unwrap();
        let restored = NetworkSnapshot::from_bytes(&bytes).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn test_truncated_bytes_rejected() {
        let bytes = sample_snapshot().to_bytes().unwrap();
        assert!(NetworkSnapshot::from_bytes(&bytes[..bytes.len() / 2]).is_err());
    }
}
