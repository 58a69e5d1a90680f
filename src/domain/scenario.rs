//! Scenario bands and the cross-pairing tables used by the simulators.
//!
//! A battery or grid scenario is not computed from the consumption channel with
//! the same label. The pessimistic battery scenario drains with the highest
//! consumption band, the optimistic one with the lowest. The grid simulator
//! additionally reads the battery channel opposite to its own label. Keep these
//! tables the only place the pairing is expressed.

use serde::{Deserialize, Serialize};

/// One of the three parallel forecast channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    Min,
    Med,
    Max,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Self::Min, Self::Med, Self::Max];
}

/// Maps a target scenario to the source channel that backs it.
#[derive(Debug, Clone, Copy)]
pub struct Pairing {
    name: &'static str,
    sources: Bands<Scenario>,
}

impl Pairing {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn source_for(&self, target: Scenario) -> Scenario {
        self.sources.get(target)
    }
}

/// Battery scenario -> consumption channel.
pub const BATTERY_CONSUMPTION_PAIRING: Pairing = Pairing {
    name: "battery/consumption",
    sources: Bands {
        min: Scenario::Max,
        med: Scenario::Med,
        max: Scenario::Min,
    },
};

/// Grid scenario -> consumption channel.
pub const GRID_CONSUMPTION_PAIRING: Pairing = Pairing {
    name: "grid/consumption",
    sources: Bands {
        min: Scenario::Max,
        med: Scenario::Med,
        max: Scenario::Min,
    },
};

/// Grid scenario -> battery capacity channel.
pub const GRID_BATTERY_PAIRING: Pairing = Pairing {
    name: "grid/battery",
    sources: Bands {
        min: Scenario::Max,
        med: Scenario::Med,
        max: Scenario::Min,
    },
};

/// A value per scenario.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bands<T> {
    pub min: T,
    pub med: T,
    pub max: T,
}

impl<T: Copy> Bands<T> {
    pub fn uniform(value: T) -> Self {
        Self {
            min: value,
            med: value,
            max: value,
        }
    }

    pub fn get(&self, scenario: Scenario) -> T {
        match scenario {
            Scenario::Min => self.min,
            Scenario::Med => self.med,
            Scenario::Max => self.max,
        }
    }

    /// Reads the channel that `pairing` assigns to `target`.
    pub fn paired(&self, pairing: &Pairing, target: Scenario) -> T {
        self.get(pairing.source_for(target))
    }

    pub fn from_fn(mut f: impl FnMut(Scenario) -> T) -> Self {
        Self {
            min: f(Scenario::Min),
            med: f(Scenario::Med),
            max: f(Scenario::Max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::collections::HashSet;

    #[rstest]
    #[case(Scenario::Min, Scenario::Max)]
    #[case(Scenario::Med, Scenario::Med)]
    #[case(Scenario::Max, Scenario::Min)]
    fn test_battery_uses_opposite_consumption(#[case] battery: Scenario, #[case] consumption: Scenario) {
        assert_eq!(BATTERY_CONSUMPTION_PAIRING.source_for(battery), consumption);
    }

    #[rstest]
    #[case(Scenario::Min, Scenario::Max)]
    #[case(Scenario::Med, Scenario::Med)]
    #[case(Scenario::Max, Scenario::Min)]
    fn test_grid_uses_opposite_consumption(#[case] grid: Scenario, #[case] consumption: Scenario) {
        assert_eq!(GRID_CONSUMPTION_PAIRING.source_for(grid), consumption);
    }

    #[rstest]
    #[case(Scenario::Min, Scenario::Max)]
    #[case(Scenario::Med, Scenario::Med)]
    #[case(Scenario::Max, Scenario::Min)]
    fn test_grid_reads_inverted_battery_channel(#[case] grid: Scenario, #[case] battery: Scenario) {
        assert_eq!(GRID_BATTERY_PAIRING.source_for(grid), battery);
    }

    #[test]
    fn test_every_scenario_maps_to_a_distinct_source() {
        for pairing in [BATTERY_CONSUMPTION_PAIRING, GRID_CONSUMPTION_PAIRING, GRID_BATTERY_PAIRING] {
            let sources: HashSet<_> = Scenario::ALL.iter().map(|&s| pairing.source_for(s)).collect();
            assert_eq!(sources.len(), 3, "{}", pairing.name());
        }
    }

    #[test]
    fn test_bands_paired_lookup() {
        let consumption = Bands {
            min: 100.0,
            med: 200.0,
            max: 300.0,
        };
        assert_eq!(consumption.paired(&BATTERY_CONSUMPTION_PAIRING, Scenario::Min), 300.0);
        assert_eq!(consumption.paired(&BATTERY_CONSUMPTION_PAIRING, Scenario::Max), 100.0);
    }
}
