//! Core domain types shared by every layer:
//! - Stage names in pipeline order
//! - Run and stage status enums

mod status;

pub use status::{RunStatus, StageName, StageRunStatus, UnknownStage};
