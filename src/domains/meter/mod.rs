pub mod repository;
pub mod service;
pub mod types;

pub use repository::{MeterRepository, SqliteMeterRepository};
pub use service::MeterService;
pub use types::{
    FailedUnitGroup, NewMeterInput, NewMeterRecord, OldMeterInput, OldMeterRecord, PendingUnit,
    UnitSide,
};
