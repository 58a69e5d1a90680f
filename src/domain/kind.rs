use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The four published forecasts, in pipeline dependency order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ForecastKind {
    /// Panel power (W), 15-minute points, single scenario
    Solar,
    /// Household draw (W), hourly, three quantile bands
    Consumption,
    /// Battery capacity (%), hourly, three scenarios
    Battery,
    /// Grid exchange (Wh per hour, export positive), hourly, three scenarios
    Grid,
}

impl ForecastKind {
    pub const ALL: [ForecastKind; 4] = [Self::Solar, Self::Consumption, Self::Battery, Self::Grid];

    /// Forecasts that must be available before this one can be computed.
    pub fn upstream(&self) -> &'static [ForecastKind] {
        match self {
            Self::Solar | Self::Consumption => &[],
            Self::Battery => &[Self::Solar, Self::Consumption],
            Self::Grid => &[Self::Solar, Self::Consumption, Self::Battery],
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Solar | Self::Consumption | Self::Grid => "Wh",
            Self::Battery => "%",
        }
    }
}
