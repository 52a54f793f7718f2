use serde::Serialize;

use crate::validation::FieldErrors;

/// Uniform JSON envelope for every endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<FieldErrors>,
}

impl<T> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            errors: None,
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: None,
        }
    }

    pub fn validation(message: impl Into<String>, errors: FieldErrors) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors: Some(errors),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OverviewDto {
    pub stats: crate::db::EnrollmentStats,
    pub active_courses: Vec<ActiveCourseDto>,
    pub recent_activity: Vec<ActivityDto>,
}

#[derive(Debug, Serialize)]
pub struct ActiveCourseDto {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub progress_percentage: f32,
}

#[derive(Debug, Serialize)]
pub struct ActivityDto {
    pub action: String,
    pub description: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CourseDto {
    pub id: i32,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub duration_hours: Option<f32>,
    pub module_count: Option<i32>,
    pub featured_image: Option<String>,
    pub status: String,
    pub progress_percentage: f32,
    pub start_date: Option<String>,
    pub completion_date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PaginationDto {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct CoursePageDto {
    pub courses: Vec<CourseDto>,
    pub pagination: PaginationDto,
}

#[derive(Debug, Serialize)]
pub struct CertificateDto {
    pub id: i32,
    pub certificate_number: String,
    pub verification_code: String,
    pub status: String,
    pub issued_date: String,
    pub expiry_date: Option<String>,
    pub course_title: Option<String>,
}
