pub mod activities;
pub mod dashboard;
pub mod integration_code;
pub mod jobs;
pub mod pivot_sync;
pub mod reservations;
pub mod schedule_sync;
pub mod slot_generation;
pub mod tariff_sync;
pub mod unit_of_work;
