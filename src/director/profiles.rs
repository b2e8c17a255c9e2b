//! Match profiles the director asks the backend to fill

use crate::error::Result;
use crate::extensions::{build_extensions, Extension, SelectionFilter};
use crate::types::{DoubleRangeFilter, Pool, Profile, StringEqualsFilter, TagPresentFilter};
use rand::seq::SliceRandom;
use rand::Rng;

pub const WORLDS: [&str; 4] = ["Dune", "Nova", "Pandora", "Orion"];
pub const REGIONS: [&str; 4] = ["us-east-1", "us-east-2", "us-west-1", "us-west-2"];

const SKILL_LEVELS: [(f64, f64); 3] = [(0.0, 10.0), (10.0, 100.0), (100.0, 1000.0)];
const LATENCIES: [(f64, f64); 4] = [(0.0, 25.0), (25.0, 50.0), (50.0, 75.0), (75.0, 100.0)];

/// Produces the profile set once per director run
pub trait ProfileGenerator: Send + Sync {
    fn generate(&self) -> Result<Vec<Profile>>;
}

/// One profile per world and region, each with a single session pool and a
/// filter selecting ready servers labelled with the same world and region.
#[derive(Debug, Clone, Default)]
pub struct WorldRegionProfiles;

impl WorldRegionProfiles {
    pub fn new() -> Self {
        Self
    }

    /// Generate with a caller-supplied RNG for the skill and latency ranges
    pub fn generate_with_rng<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Profile>> {
        let mut profiles = Vec::with_capacity(WORLDS.len() * REGIONS.len());

        for world in WORLDS {
            for region in REGIONS {
                let skill = pick(&SKILL_LEVELS, rng);
                let latency = pick(&LATENCIES, rng);

                let pool = Pool {
                    name: format!("pool_mode_{}", world),
                    tag_present_filters: vec![TagPresentFilter {
                        tag: "mode.session".to_string(),
                    }],
                    string_equals_filters: vec![
                        StringEqualsFilter {
                            string_arg: "world".to_string(),
                            value: world.to_string(),
                        },
                        StringEqualsFilter {
                            string_arg: "region".to_string(),
                            value: region.to_string(),
                        },
                    ],
                    double_range_filters: vec![
                        DoubleRangeFilter {
                            double_arg: "skill".to_string(),
                            min: skill.0,
                            max: skill.1,
                        },
                        DoubleRangeFilter {
                            double_arg: "latency".to_string(),
                            min: latency.0,
                            max: latency.1,
                        },
                    ],
                };

                let filter = SelectionFilter::new()
                    .with_label("region", region)
                    .with_label("world", world)
                    .with_field("status.state", "Ready");

                profiles.push(Profile {
                    name: format!("world_based_profile_{}_{}", world, region),
                    pools: vec![pool],
                    extensions: build_extensions([Extension::Filter(filter)])?,
                });
            }
        }

        Ok(profiles)
    }
}

fn pick<R: Rng + ?Sized>(ranges: &[(f64, f64)], rng: &mut R) -> (f64, f64) {
    ranges.choose(rng).copied().unwrap_or(ranges[0])
}

impl ProfileGenerator for WorldRegionProfiles {
    fn generate(&self) -> Result<Vec<Profile>> {
        self.generate_with_rng(&mut rand::thread_rng())
    }
}

/// Serves a fixed list, mostly useful in tests
#[derive(Debug, Clone, Default)]
pub struct StaticProfiles {
    profiles: Vec<Profile>,
}

impl StaticProfiles {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self { profiles }
    }
}

impl ProfileGenerator for StaticProfiles {
    fn generate(&self) -> Result<Vec<Profile>> {
        Ok(self.profiles.clone())
    }
}
