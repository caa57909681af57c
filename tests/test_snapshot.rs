//! Snapshot round-trip tests: trained state must survive save / load
//! bit-for-bit.

use cortical::config::{
    InhibitionConfig, InputBindingConfig, InputSpaceConfig, RangeConfig, RegionConfig,
    SynapseParamsConfig,
};
use cortical::{Network, NetworkConfig};

fn trained_config() -> NetworkConfig {
    NetworkConfig {
        seed: 11,
        proximal_synapse_params: SynapseParamsConfig::default(),
        distal_synapse_params: SynapseParamsConfig::default(),
        input_spaces: vec![InputSpaceConfig {
            id: "in".into(),
            size_x: 1,
            size_y: 3,
            num_values: 1,
        }],
        regions: vec![RegionConfig {
            id: "r".into(),
            size_x: 1,
            size_y: 3,
            cells_per_column: 2,
            hypercolumn_diameter: 1,
            prediction_radius: -1,
            segment_activate_threshold: 1,
            inhibition: InhibitionConfig::Radius { radius: 3.0 },
            min_overlap_to_reuse_segment: RangeConfig { min: 1, max: 1 },
            new_number_synapses: 2,
            percentage_input_per_column: 100.0,
            percentage_min_overlap: 10.0,
            percentage_local_activity: 20.0,
            boost: Default::default(),
            spatial_learning_period: Default::default(),
            temporal_learning_period: Default::default(),
            boosting_period: Default::default(),
            proximal_synapse_params: None,
            distal_synapse_params: None,
            hardcoded_spatial: true,
            output_column_activity: false,
            output_cell_activity: true,
            inputs: vec![InputBindingConfig {
                id: "in".into(),
                radius: -1,
            }],
        }],
    }
}

fn train(network: &mut Network, steps: usize) {
    for t in 0..steps {
        let input = network.input_space_mut("in").unwrap();
        input.deactivate_all();
        input.set_active(0, t % 3, 0, true);
        network.step();
    }
}

#[test]
fn test_trained_state_round_trips_bit_equal() {
    let mut network = Network::from_config(&trained_config()).unwrap();
    train(&mut network, 60);

    let snapshot = network.capture_snapshot();
    assert!(
        snapshot.regions[0]
            .columns
            .iter()
            .any(|c| c.cells.iter().any(|cell| !cell.segments.is_empty())),
        "training must have grown distal segments"
    );

    // A fresh network has different state until the snapshot lands.
    let mut restored = Network::from_config(&trained_config()).unwrap();
    restored.apply_snapshot(&snapshot).unwrap();

    let recaptured = restored.capture_snapshot();
    assert_eq!(snapshot, recaptured, "every duty cycle, boost, segment and permanence must match");
    assert_eq!(restored.time(), network.time());
    assert_eq!(
        restored.regions()[0].step_counter(),
        network.regions()[0].step_counter()
    );
}

#[test]
fn test_snapshot_survives_binary_encoding() {
    let mut network = Network::from_config(&trained_config()).unwrap();
    train(&mut network, 30);

    let snapshot = network.capture_snapshot();
    let bytes = snapshot.to_bytes().unwrap();
    let decoded = cortical::NetworkSnapshot::from_bytes(&bytes).unwrap();
    assert_eq!(snapshot, decoded);
}

#[test]
fn test_snapshot_file_round_trip() {
    let dir = std::env::temp_dir().join("cortical_snapshot_test");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("state.bin");

    let mut network = Network::from_config(&trained_config()).unwrap();
    train(&mut network, 30);
    network.save_snapshot(&path).unwrap();

    let mut restored = Network::from_config(&trained_config()).unwrap();
    restored.load_snapshot(&path).unwrap();

    assert_eq!(network.capture_snapshot(), restored.capture_snapshot());

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_snapshot_against_wrong_topology_is_rejected() {
    let mut network = Network::from_config(&trained_config()).unwrap();
    train(&mut network, 10);
    let snapshot = network.capture_snapshot();

    let mut config = trained_config();
    config.regions[0].cells_per_column = 3;
    config.seed = 11;
    let mut other = Network::from_config(&config).unwrap();

    let before = other.capture_snapshot();
    assert!(other.apply_snapshot(&snapshot).is_err());
    assert_eq!(
        other.capture_snapshot(),
        before,
        "a rejected snapshot must not disturb existing state"
    );
}
