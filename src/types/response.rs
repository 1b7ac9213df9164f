// src/types/response.rs
//! Backend API request and response bodies.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct ScrapeRequest<'a> {
    pub url: &'a str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<serde_json::Value>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedJob {
    #[serde(default)]
    pub job_id: Option<i64>,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub full_description: Option<String>,
}

impl ScrapedJob {
    /// Full description when the backend sent one, else the summary.
    pub fn description_text(&self) -> &str {
        self.full_description
            .as_deref()
            .or(self.description.as_deref())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub id: i64,
    #[serde(default)]
    pub url: Option<String>,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub scraped_at: Option<String>,
}

impl JobSummary {
    pub fn scraped_date(&self) -> Option<NaiveDate> {
        self.scraped_at.as_deref().and_then(parse_timestamp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<JobSummary>,
    #[serde(default)]
    pub total: Option<u64>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetail {
    pub id: i64,
    #[serde(default)]
    pub url: Option<String>,
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub poster: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub full_description: Option<String>,
    #[serde(default)]
    pub scraped_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedCv {
    #[serde(default)]
    pub job_id: Option<i64>,
    pub cv_markdown: String,
    pub cv_pdf: String,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillStat {
    pub name: String,
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    #[serde(default)]
    pub total_jobs: u64,
    #[serde(default)]
    pub technologies: Vec<SkillStat>,
    #[serde(default)]
    pub languages: Vec<SkillStat>,
    #[serde(default)]
    pub soft_skills: Vec<SkillStat>,
    #[serde(default)]
    pub hard_skills: Vec<SkillStat>,
    #[serde(default)]
    pub market_summary: Option<String>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub chart_data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartPaths {
    #[serde(default)]
    pub technologies: Option<String>,
    #[serde(default)]
    pub languages: Option<String>,
    #[serde(default)]
    pub soft_skills: Option<String>,
    #[serde(default)]
    pub hard_skills: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedStats {
    #[serde(default)]
    pub message: Option<String>,
    pub stats: JobStats,
    #[serde(default)]
    pub charts: ChartPaths,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub auth: Option<String>,
}

/// Backend error body: `{"detail": "..."}`. Validation failures carry a list.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl ErrorBody {
    pub(crate) fn message(&self) -> Option<String> {
        match &self.detail {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Array(items) => {
                let messages: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(|m| m.as_str()))
                    .collect();
                if messages.is_empty() {
                    Some(self.detail.to_string())
                } else {
                    Some(messages.join("; "))
                }
            }
            other => Some(other.to_string()),
        }
    }
}

fn parse_timestamp(value: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|dt| dt.date())
        .ok()
}
