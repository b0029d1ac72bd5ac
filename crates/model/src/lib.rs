//! `tradecast-model` — dispatch domain entities.
//!
//! Plain serde structs with lifecycle helper methods. Persistence lives in
//! `tradecast-infra`; these types carry no storage concerns.

pub mod job;
pub mod lead;
pub mod outreach;
pub mod staging;
pub mod technician;

pub use job::{Job, JobStatus, Trade, Urgency};
pub use lead::ColdLead;
pub use outreach::{
    DispatchMethod, LeadSource, Outreach, OutreachStatus, PipelineStats, Recipient,
    RecipientTarget,
};
pub use staging::StagingRecord;
pub use technician::Technician;
