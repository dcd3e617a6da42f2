use super::{PipeParameters, WaterNetwork};
use crate::core::material_properties::PipeMaterial;
use crate::core::units::millimetres_to_metres;
use crate::errors::ConfigurationError;
use crate::input::{Floor, HouseProfile, NodeSpec, ProfileSet};
use tracing::debug;

pub const STREET_NODE: &str = "street";
pub const SERVICE_ENTRY_NODE: &str = "entry";
pub const SERVICE_MAIN_PIPE: &str = "service_main";

const STREET_ELEVATION_M: f64 = -1.0;
const BASEMENT_ELEVATION_M: f64 = -2.5;
const MAIN_FLOOR_ELEVATION_M: f64 = 0.;
const UPPER_FLOOR_ELEVATION_M: f64 = 3.0;
const UPPER_FLOOR_RANGE_M: (f64, f64) = (1.5, 4.0);
/// explicit main-floor elevations may sit this far either side of the floor datum, in m
const MAIN_FLOOR_TOLERANCE_M: f64 = 1.0;

const DEFAULT_BRANCH_DIAMETER_MM: f64 = 13.0;
const DEFAULT_MANIFOLD_LENGTH_M: f64 = 2.0;
/// elbows, tees and a stop valve on a typical branch run
const DEFAULT_BRANCH_MINOR_LOSS: f64 = 1.5;

/// Somewhere a house-day can get its network from.
pub trait NetworkProvider {
    fn provide(&self) -> Result<WaterNetwork, ConfigurationError>;
}

/// Builds a fresh network from a house profile.
pub struct ProfileNetworkProvider<'a> {
    profile: &'a HouseProfile,
}

impl<'a> ProfileNetworkProvider<'a> {
    pub fn new(profile: &'a HouseProfile) -> Self {
        Self { profile }
    }
}

impl NetworkProvider for ProfileNetworkProvider<'_> {
    fn provide(&self) -> Result<WaterNetwork, ConfigurationError> {
        build_network(self.profile)
    }
}

/// Hands out copies of a network built elsewhere.
pub struct SuppliedNetworkProvider {
    network: WaterNetwork,
}

impl SuppliedNetworkProvider {
    pub fn new(network: WaterNetwork) -> Result<Self, ConfigurationError> {
        network.validate()?;
        Ok(Self { network })
    }
}

impl NetworkProvider for SuppliedNetworkProvider {
    fn provide(&self) -> Result<WaterNetwork, ConfigurationError> {
        Ok(self.network.clone())
    }
}

pub struct NetworkBuilder<'a> {
    profiles: &'a ProfileSet,
}

impl<'a> NetworkBuilder<'a> {
    pub fn new(profiles: &'a ProfileSet) -> Self {
        Self { profiles }
    }

    pub fn build(&self, profile_id: &str) -> Result<WaterNetwork, ConfigurationError> {
        build_network(self.profiles.profile(profile_id)?)
    }
}

/// Build the network for a profile: the street supply and service main, then either the
/// profile's explicit topology or the default household layout.
pub fn build_network(profile: &HouseProfile) -> Result<WaterNetwork, ConfigurationError> {
    let mut network = WaterNetwork::new();
    let main = &profile.service_main;
    let entry_elevation = if profile.has_basement {
        BASEMENT_ELEVATION_M
    } else {
        MAIN_FLOOR_ELEVATION_M
    };

    network.add_reservoir(STREET_NODE, STREET_ELEVATION_M, profile.supply_head_m)?;
    network.add_junction(SERVICE_ENTRY_NODE, entry_elevation, vec![], true)?;
    network.add_pipe(
        SERVICE_MAIN_PIPE,
        STREET_NODE,
        SERVICE_ENTRY_NODE,
        PipeParameters {
            material: main.material,
            diameter_m: millimetres_to_metres(main.diameter_mm),
            length_m: main.length_m,
            roughness_c: main
                .roughness_c
                .unwrap_or_else(|| main.material.hazen_williams_c()),
            minor_loss: 0.,
            trunk: true,
        },
    )?;

    match (&profile.nodes, &profile.segments) {
        (Some(nodes), Some(segments)) => {
            for node in nodes {
                network.add_junction(
                    &node.name,
                    node_elevation(node)?,
                    node.fixtures.clone(),
                    false,
                )?;
            }
            for segment in segments {
                network.add_pipe(
                    &segment.name,
                    &segment.from,
                    &segment.to,
                    PipeParameters {
                        material: segment.material,
                        diameter_m: millimetres_to_metres(segment.diameter_mm),
                        length_m: segment.length_m,
                        roughness_c: segment
                            .roughness_c
                            .unwrap_or_else(|| segment.material.hazen_williams_c()),
                        minor_loss: segment.minor_loss,
                        trunk: segment.trunk,
                    },
                )?;
            }
        }
        _ => add_default_topology(&mut network, profile)?,
    }

    if let Some(name) = &profile.default_demand_node {
        network.set_default_demand_node(name)?;
    }

    network.validate()?;
    debug!("built household network: {network}");
    Ok(network)
}

fn node_elevation(node: &NodeSpec) -> Result<f64, ConfigurationError> {
    match (node.floor, node.elevation_m) {
        (Floor::Basement, None) => Ok(BASEMENT_ELEVATION_M),
        (Floor::Main, None) => Ok(MAIN_FLOOR_ELEVATION_M),
        (Floor::Upper, None) => Ok(UPPER_FLOOR_ELEVATION_M),
        (Floor::Basement, Some(elevation)) if elevation < 0. => Ok(elevation),
        (Floor::Main, Some(elevation)) if elevation.abs() <= MAIN_FLOOR_TOLERANCE_M => {
            Ok(elevation)
        }
        (Floor::Upper, Some(elevation))
            if (UPPER_FLOOR_RANGE_M.0..=UPPER_FLOOR_RANGE_M.1).contains(&elevation) =>
        {
            Ok(elevation)
        }
        (floor, Some(elevation)) => Err(ConfigurationError::InvalidTopology(format!(
            "node '{}' has elevation {elevation} m, implausible for floor {floor:?}",
            node.name
        ))),
    }
}

fn add_default_topology(
    network: &mut WaterNetwork,
    profile: &HouseProfile,
) -> Result<(), ConfigurationError> {
    let main = &profile.service_main;
    let branch_material = profile.branch_material.unwrap_or(main.material);
    let utility_elevation = if profile.has_basement {
        BASEMENT_ELEVATION_M
    } else {
        MAIN_FLOOR_ELEVATION_M
    };

    network.add_junction("manifold", utility_elevation, vec![], false)?;
    network.add_pipe(
        "manifold_trunk",
        SERVICE_ENTRY_NODE,
        "manifold",
        PipeParameters {
            material: main.material,
            diameter_m: millimetres_to_metres(main.diameter_mm),
            length_m: DEFAULT_MANIFOLD_LENGTH_M,
            roughness_c: main
                .roughness_c
                .unwrap_or_else(|| main.material.hazen_williams_c()),
            minor_loss: 0.5,
            trunk: true,
        },
    )?;

    let mut rooms: Vec<(&str, f64, &[&str], f64)> = vec![
        (
            "kitchen",
            MAIN_FLOOR_ELEVATION_M,
            &["kitchen_faucet", "dishwasher"],
            8.,
        ),
        (
            "bathroom",
            MAIN_FLOOR_ELEVATION_M,
            &["toilet", "shower", "bathroom_faucet"],
            6.,
        ),
        ("laundry", utility_elevation, &["washing_machine"], 5.),
        ("outdoor", MAIN_FLOOR_ELEVATION_M, &["hose_bib"], 10.),
    ];
    if profile.has_upper_floor {
        rooms.push((
            "upstairs_bathroom",
            UPPER_FLOOR_ELEVATION_M,
            &["toilet", "shower", "bathroom_faucet"],
            9.,
        ));
    }

    for (room, elevation, fixtures, length_m) in rooms {
        network.add_junction(
            room,
            elevation,
            fixtures.iter().map(|f| f.to_string()).collect(),
            false,
        )?;
        network.add_pipe(
            &format!("{room}_branch"),
            "manifold",
            room,
            branch(branch_material, length_m),
        )?;
    }

    network.set_default_demand_node("kitchen")
}

fn branch(material: PipeMaterial, length_m: f64) -> PipeParameters {
    PipeParameters {
        material,
        diameter_m: millimetres_to_metres(DEFAULT_BRANCH_DIAMETER_MM),
        length_m,
        roughness_c: material.hazen_williams_c(),
        minor_loss: DEFAULT_BRANCH_MINOR_LOSS,
        trunk: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::network::NodeIndex;
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[fixture]
    fn profiles() -> ProfileSet {
        ProfileSet::bundled().unwrap()
    }

    #[rstest]
    fn should_build_every_bundled_profile(profiles: ProfileSet) {
        let builder = NetworkBuilder::new(&profiles);
        for name in profiles.profiles.keys() {
            let network = builder.build(name).unwrap();
            assert!(network.validate().is_ok(), "{name}");
            assert_eq!(network.reservoir_indices().count(), 1);
            assert!(network.service_entry().is_some());
        }
    }

    #[rstest]
    fn should_fail_for_unknown_profile(profiles: ProfileSet) {
        assert!(matches!(
            NetworkBuilder::new(&profiles).build("lighthouse"),
            Err(ConfigurationError::UnknownProfile(_))
        ));
    }

    #[rstest]
    fn default_topology_should_follow_the_floors(profiles: ProfileSet) {
        let network = NetworkBuilder::new(&profiles).build("family_home").unwrap();

        let upstairs = network.node_index("upstairs_bathroom").unwrap();
        assert_eq!(network.node(upstairs).elevation_m, 3.0);
        let laundry = network.node_index("laundry").unwrap();
        assert!(network.node(laundry).elevation_m < 0.);

        let branch = network.pipe(network.pipe_index("kitchen_branch").unwrap());
        assert_eq!(branch.material, PipeMaterial::Pex);
        assert_eq!(branch.roughness_c, 160.);

        let starter = NetworkBuilder::new(&profiles).build("starter_home").unwrap();
        assert!(starter.node_index("upstairs_bathroom").is_none());
    }

    #[rstest]
    fn should_build_explicit_topology(profiles: ProfileSet) {
        let network = NetworkBuilder::new(&profiles).build("bungalow").unwrap();

        let garden = network.node_index("garden_tap").unwrap();
        assert_relative_eq!(network.node(garden).elevation_m, -0.3);
        assert_eq!(
            network.default_demand_node(),
            network.node_index("kitchen")
        );
        let ensuite = network.pipe(network.pipe_index("ensuite_branch").unwrap());
        assert_relative_eq!(ensuite.diameter_m, 0.012);
        assert_eq!(ensuite.roughness_c, PipeMaterial::Pex.hazen_williams_c());
    }

    #[rstest]
    #[case(Floor::Upper, Some(5.0), false)]
    #[case(Floor::Upper, Some(2.4), true)]
    #[case(Floor::Basement, Some(0.5), false)]
    #[case(Floor::Basement, None, true)]
    #[case(Floor::Main, Some(-0.3), true)]
    fn should_check_floor_elevations(
        #[case] floor: Floor,
        #[case] elevation_m: Option<f64>,
        #[case] plausible: bool,
    ) {
        let node = NodeSpec {
            name: "room".into(),
            floor,
            elevation_m,
            fixtures: vec![],
        };
        assert_eq!(node_elevation(&node).is_ok(), plausible);
    }

    #[rstest]
    fn supplied_provider_should_hand_out_copies(profiles: ProfileSet) {
        let network = NetworkBuilder::new(&profiles).build("starter_home").unwrap();
        let provider = SuppliedNetworkProvider::new(network.clone()).unwrap();

        let mut first = provider.provide().unwrap();
        first.set_demand(NodeIndex(2), 1e-4);
        let second = provider.provide().unwrap();

        assert_eq!(second.node(NodeIndex(2)), network.node(NodeIndex(2)));
    }
}
