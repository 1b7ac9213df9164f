// src/types/mod.rs
pub mod response;

pub use response::{
    ChartPaths, GeneratedCv, GeneratedStats, HealthStatus, JobDetail, JobList, JobStats,
    JobSummary, MessageResponse, ScrapedJob, SkillStat, SyncResponse,
};
