//! Cortical - a Hierarchical Temporal Memory learning engine.
//!
//! Cortical implements the two-phase online learning loop of the cortical
//! learning algorithm family: a **spatial pooler** that converts dense
//! binary input into a sparse set of active columns, and a **temporal
//! pooler** that learns sequences of that sparse code over cells within
//! those columns, producing per-step predictions of upcoming activity.
//!
//! # Key Characteristics
//!
//! - Sparse distributed representations over a 2-D column grid
//! - Adaptive receptive fields with homeostatic boosting and local
//!   inhibition
//! - Per-cell distal segments learning multi-step sequence context
//! - Deferred, trigger-gated segment reinforcement with pooled object
//!   lifecycles
//! - Deterministic given a seed: identical runs produce identical column,
//!   cell and synapse state at every step
//!
//! # Architecture
//!
//! A [`Network`] owns external [`InputSpace`]s and learning [`Region`]s,
//! stepped in declaration order on a shared integer time counter. Each
//! region owns a grid of columns; each column owns one proximal segment
//! and a fixed stack of cells; each cell owns distal segments whose
//! synapses reference other cells of the same region.
//!
//! # Examples
//!
//! ```
//! use cortical::{Network, NetworkConfig};
//!
//! let json = r#"{
//!     "seed": 7,
//!     "input_spaces": [
//!         { "id": "sensor", "size_x": 8, "size_y": 1, "num_values": 1 }
//!     ],
//!     "regions": [{
//!         "id": "layer1",
//!         "size_x": 8, "size_y": 1,
//!         "cells_per_column": 4,
//!         "segment_activate_threshold": 1,
//!         "inhibition": { "radius": { "radius": 8.0 } },
//!         "min_overlap_to_reuse_segment": { "min": 1, "max": 1 },
//!         "new_number_synapses": 2,
//!         "percentage_input_per_column": 100.0,
//!         "percentage_min_overlap": 10.0,
//!         "percentage_local_activity": 13.0,
//!         "inputs": [ { "id": "sensor" } ]
//!     }]
//! }"#;
//!
//! let config = NetworkConfig::from_json(json).unwrap();
//! let mut network = Network::from_config(&config).unwrap();
//!
//! // Drive the input and run a few steps.
//! network.input_space_mut("sensor").unwrap().set_active(0, 0, 0, true);
//! for _ in 0..5 {
//!     network.step();
//! }
//! assert_eq!(network.time(), 5);
//! ```
//!
//! # Determinism
//!
//! A single seeded random stream per region governs receptive-field
//! sampling, initial permanence draws, boost jitter, tie-breaks and
//! learning-cell sampling. Two networks built from the same description
//! and driven with the same inputs are bit-identical at every step.

pub mod cell;
pub mod column;
pub mod config;
pub mod dataspace;
pub mod error;
pub mod input_space;
pub mod network;
pub mod pool;
pub mod region;
pub mod segment;
pub mod segment_update;
pub mod snapshot;
pub mod synapse;
pub mod utils;

// Re-exports for convenient access
pub use cell::{Cell, CellId};
pub use column::{Column, Grid, ProximalSegment};
pub use config::{InputSpaceConfig, NetworkConfig, RegionConfig, SynapseParamsConfig};
pub use dataspace::DataSpace;
pub use error::{CorticalError, Result};
pub use input_space::InputSpace;
pub use network::Network;
pub use pool::{Pool, Recycle};
pub use region::{Inhibition, LearningPeriod, Region, RegionParams};
pub use segment::{Segment, SegmentId, MAX_TIME_STEPS};
pub use segment_update::{ApplyTrigger, SegmentUpdate, UpdateId, UpdateKind};
pub use snapshot::NetworkSnapshot;
pub use synapse::{DistalSynapse, Permanence, ProximalSynapse, SynapseParams};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name
pub const NAME: &str = "Cortical";

/// Get version string
pub fn version() -> String {
    format!("{} v{}", NAME, VERSION)
}
