//! Project model for schele-service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Construction project owned by a client.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub project_id: Uuid,
    pub client_id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
    pub deleted_utc: Option<DateTime<Utc>>,
}

/// Input for creating a project.
#[derive(Debug, Clone, Validate)]
pub struct CreateProject {
    pub client_id: Uuid,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub description: Option<String>,
}

/// Input for updating a project.
#[derive(Debug, Clone, Default, Validate)]
pub struct UpdateProject {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    #[validate(length(max = 50))]
    pub code: Option<String>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    pub description: Option<String>,
}
