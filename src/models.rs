use crate::errors::AppError;
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Progression {
    #[default]
    NotStarted,
    InProgress,
    Done,
}

impl Progression {
    pub fn as_u8(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::InProgress => 1,
            Self::Done => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "not-started",
            Self::InProgress => "in-progress",
            Self::Done => "done",
        }
    }
}

impl TryFrom<i64> for Progression {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::NotStarted),
            1 => Ok(Self::InProgress),
            2 => Ok(Self::Done),
            other => Err(AppError::InvalidProgressionValue(format!(
                "{} is not one of 0, 1, 2",
                other
            ))),
        }
    }
}

impl TryFrom<u8> for Progression {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::try_from(i64::from(value))
    }
}

impl From<Progression> for u8 {
    fn from(value: Progression) -> Self {
        value.as_u8()
    }
}

impl FromStr for Progression {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let parsed = trimmed.parse::<i64>().map_err(|_| {
            AppError::InvalidProgressionValue(format!("{:?} is not a number", trimmed))
        })?;
        Self::try_from(parsed)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub progression: Progression,
    #[serde(default, alias = "estimatedWorkingHours")]
    pub estimated_working_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub issues: Vec<Issue>,
    #[serde(default, alias = "createdAt")]
    pub created_at: Option<String>,
}

impl Todo {
    /// Drops hour estimates that are negative or not finite.
    pub fn sanitize(&mut self) {
        for issue in &mut self.issues {
            if let Some(hours) = issue.estimated_working_hours {
                if !hours.is_finite() || hours < 0.0 {
                    tracing::warn!(hours, "discarding invalid estimated working hours");
                    issue.estimated_working_hours = None;
                }
            }
        }
    }

    /// True when there is at least one issue and every issue is done.
    pub fn is_completed(&self) -> bool {
        !self.issues.is_empty()
            && self
                .issues
                .iter()
                .all(|issue| issue.progression == Progression::Done)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<Issue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<Issue>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodoRecord {
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoRecord {
    pub id: i64,
    pub title: String,
    pub completed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub model: String,
    pub todo: Todo,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisassembleResponse {
    pub model: String,
    pub index: usize,
}
