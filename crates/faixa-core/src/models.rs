/// Declare a UUID-backed identifier newtype
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        impl $name {
            /// Generate a new random identifier
            pub fn new() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }
    };
}

pub mod dataset;
pub mod geometry;
pub mod network;
pub mod staging;
pub mod vegetation;

pub use dataset::{
    DatasetFiles, DatasetId, DatasetRecord, DatasetStatus, DatasetUpdate, FileRole,
    NormalizationSummary, StageCounters,
};
pub use geometry::{Geometry, GeometryType};
pub use network::{
    Line, LineId, LineUpsert, NewSpan, Scenario, ScenarioId, ScenarioStatus, ScenarioType,
    ScenarioUpsert, Span, SpanId, Structure, StructureId, StructureUpsert,
};
pub use staging::{CsvTable, KmlLayer, StagedFeature, StagedRow};
pub use vegetation::{
    Crossing, LateralRisk, RiskSource, SpanRiskInputs, Treatment, Tree, TreeId, TreeUpsert,
    VegetationRisk,
};
