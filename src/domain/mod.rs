pub mod kind;
pub mod scenario;
pub mod series;
pub mod summary;
pub mod time;

pub use kind::ForecastKind;
pub use scenario::{
    Bands, Pairing, Scenario, BATTERY_CONSUMPTION_PAIRING, GRID_BATTERY_PAIRING, GRID_CONSUMPTION_PAIRING,
};
pub use series::{rest_of_today, today, Aggregation, ChannelNames, ForecastPoint, ForecastSeries};
pub use summary::{daily_summaries, headline, DailySummary, Headline};
