use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of a portfolio record.
///
/// `Processing` is the only non-terminal value; `Ready` and `Error` are
/// written once and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortfolioStatus {
    Processing,
    Ready,
    Error,
}

impl PortfolioStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortfolioStatus::Processing => "PROCESSING",
            PortfolioStatus::Ready => "READY",
            PortfolioStatus::Error => "ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PortfolioStatus::Processing)
    }
}

impl fmt::Display for PortfolioStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortfolioStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PROCESSING" => Ok(PortfolioStatus::Processing),
            "READY" => Ok(PortfolioStatus::Ready),
            "ERROR" => Ok(PortfolioStatus::Error),
            other => Err(format!("unknown portfolio status '{other}'")),
        }
    }
}

/// Structured portfolio payload written by the extraction worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioData {
    pub name: String,
    pub title: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
    #[serde(default)]
    pub experience: Vec<Experience>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub skill_categories: Vec<SkillCategory>,
    #[serde(default)]
    pub soft_skills: Vec<String>,
    #[serde(default)]
    pub education: Vec<Education>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    pub company: String,
    pub role: String,
    pub start_date: String,
    pub end_date: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    pub year: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillCategory {
    pub name: String,
    pub skills: Vec<String>,
}

/// A portfolio as seen by readers: `data` is present iff `status == Ready`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioRecord {
    pub id: Uuid,
    pub status: PortfolioStatus,
    pub data: Option<PortfolioData>,
}

impl PortfolioRecord {
    /// Builds a record, dropping any payload that does not belong to a ready portfolio.
    pub fn new(id: Uuid, status: PortfolioStatus, data: Option<PortfolioData>) -> Self {
        let data = match status {
            PortfolioStatus::Ready => data,
            _ => None,
        };
        Self { id, status, data }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct PortfolioRow {
    pub id: Uuid,
    pub status: String,
    pub data_id: Option<Uuid>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PortfolioDataRow {
    pub id: Uuid,
    pub name: String,
    pub title: String,
    pub summary: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub photo: Option<String>,
    pub linked_in: Option<String>,
    pub github: Option<String>,
    pub soft_skills: Vec<String>,
    pub experience: Json<Vec<Experience>>,
    pub projects: Json<Vec<Project>>,
    pub skill_categories: Json<Vec<SkillCategory>>,
    pub education: Json<Vec<Education>>,
}

impl From<PortfolioDataRow> for PortfolioData {
    fn from(row: PortfolioDataRow) -> Self {
        Self {
            name: row.name,
            title: row.title,
            summary: row.summary,
            email: row.email,
            phone: row.phone,
            location: row.location,
            photo: row.photo,
            linked_in: row.linked_in,
            github: row.github,
            experience: row.experience.0,
            projects: row.projects.0,
            skill_categories: row.skill_categories.0,
            soft_skills: row.soft_skills,
            education: row.education.0,
        }
    }
}
