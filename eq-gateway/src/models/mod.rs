//! Domain models for eq-gateway

mod analysis;
mod context;
mod job;
mod meeting;

pub use analysis::{
    ActionItem, Decision, InteractionAnalysis, MarketIntelligence, ProductFeedback, Risk,
    RiskSeverity, Summaries,
};
pub use context::RequestContext;
pub use job::{JobStatus, JobType, UploadJob};
pub use meeting::{CleanedChunk, MeetingOutput};
