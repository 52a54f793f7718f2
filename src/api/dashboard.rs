use axum::{
    Json,
    extract::{Query, State},
    http::HeaderMap,
};
use base64ct::{Base64, Encoding};
use serde::Deserialize;
use std::sync::Arc;
use tower_sessions::Session;

use super::auth::{client_info, session_user_id};
use super::types::{
    ActiveCourseDto, ActivityDto, ApiResponse, CertificateDto, CourseDto, CoursePageDto,
    OverviewDto, PaginationDto,
};
use super::{ApiError, AppState};
use crate::constants::{limits, pagination};
use crate::db::{ActivityEntry, ProfileUpdate};
use crate::services::SanitizedUser;
use crate::uploads;
use crate::validation::{SanitizeKind, sanitize};

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
pub struct CoursesQuery {
    pub status: Option<String>,
    pub page: Option<u64>,
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub position: Option<String>,
}

#[derive(Deserialize)]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
    #[serde(default)]
    pub confirm_password: String,
}

#[derive(Deserialize)]
pub struct UploadPhotoRequest {
    pub filename: String,
    pub content_base64: String,
}

#[derive(serde::Serialize)]
pub struct ProfileResponse {
    pub profile: SanitizedUser,
}

#[derive(serde::Serialize)]
pub struct PhotoResponse {
    pub profile_image: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /dashboard/overview
pub async fn overview(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<OverviewDto>>, ApiError> {
    let user_id = session_user_id(&session).await?;

    let stats = state
        .store()
        .enrollment_stats(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load stats: {e}")))?;

    let active_courses = state
        .store()
        .active_enrollments(user_id, limits::DASHBOARD_ACTIVE_COURSES)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load courses: {e}")))?
        .into_iter()
        .filter_map(|(enrollment, course)| {
            course.map(|course| ActiveCourseDto {
                id: course.id,
                title: course.title,
                slug: course.slug,
                progress_percentage: enrollment.progress_percentage,
            })
        })
        .collect();

    let recent_activity = state
        .store()
        .recent_activity_for_user(user_id, limits::DASHBOARD_RECENT_ACTIVITY)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load activity: {e}")))?
        .into_iter()
        .map(|entry| ActivityDto {
            action: entry.action,
            description: entry.description,
            created_at: entry.created_at,
        })
        .collect();

    Ok(Json(ApiResponse::success(
        "OK",
        OverviewDto {
            stats,
            active_courses,
            recent_activity,
        },
    )))
}

/// GET /dashboard/courses?status=active&page=1
pub async fn courses(
    State(state): State<Arc<AppState>>,
    session: Session,
    Query(query): Query<CoursesQuery>,
) -> Result<Json<ApiResponse<CoursePageDto>>, ApiError> {
    let user_id = session_user_id(&session).await?;

    let status = query.status.as_deref().filter(|s| *s != "all");
    if let Some(status) = status
        && !["active", "completed", "dropped"].contains(&status)
    {
        return Err(ApiError::validation(format!("Invalid status: {status}")));
    }

    let page = query.page.unwrap_or(1).max(1);
    let per_page = pagination::COURSES_PER_PAGE;

    let (rows, total) = state
        .store()
        .enrollment_page(user_id, status, page, per_page)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load courses: {e}")))?;

    let courses = rows
        .into_iter()
        .filter_map(|(enrollment, course)| {
            course.map(|course| CourseDto {
                id: course.id,
                title: course.title,
                slug: course.slug,
                description: course.description,
                category: course.category,
                level: course.level,
                duration_hours: course.duration_hours,
                module_count: course.module_count,
                featured_image: course.featured_image,
                status: enrollment.status,
                progress_percentage: enrollment.progress_percentage,
                start_date: enrollment.start_date,
                completion_date: enrollment.completion_date,
            })
        })
        .collect();

    Ok(Json(ApiResponse::success(
        "OK",
        CoursePageDto {
            courses,
            pagination: PaginationDto {
                page,
                limit: per_page,
                total,
                pages: total.div_ceil(per_page),
            },
        },
    )))
}

/// GET /dashboard/certificates
pub async fn certificates(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<Vec<CertificateDto>>>, ApiError> {
    let user_id = session_user_id(&session).await?;

    let certificates = state
        .store()
        .certificates(user_id)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load certificates: {e}")))?
        .into_iter()
        .map(|(certificate, course)| CertificateDto {
            id: certificate.id,
            certificate_number: certificate.certificate_number,
            verification_code: certificate.verification_code,
            status: certificate.status,
            issued_date: certificate.issued_date,
            expiry_date: certificate.expiry_date,
            course_title: course.map(|c| c.title),
        })
        .collect();

    Ok(Json(ApiResponse::success("OK", certificates)))
}

/// GET /dashboard/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> Result<Json<ApiResponse<ProfileResponse>>, ApiError> {
    let user_id = session_user_id(&session).await?;
    let profile = state.auth.current_user(user_id).await?;

    Ok(Json(ApiResponse::success("OK", ProfileResponse { profile })))
}

/// PUT /dashboard/profile
/// Allow-listed fields only; values are sanitized before storage
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = session_user_id(&session).await?;

    let clean = |value: Option<String>| value.map(|v| sanitize(&v, SanitizeKind::Text));
    let update = ProfileUpdate {
        first_name: clean(payload.first_name),
        last_name: clean(payload.last_name),
        phone: clean(payload.phone),
        company: clean(payload.company),
        position: clean(payload.position),
    };

    if update.is_empty() {
        return Err(ApiError::validation("No valid fields to update"));
    }

    state
        .store()
        .update_user_profile(user_id, update)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update profile: {e}")))?;

    let client = client_info(&headers);
    state
        .store()
        .record_activity(
            user_id,
            ActivityEntry {
                action: "profile_update",
                entity_type: Some("user"),
                entity_id: Some(user_id),
                description: Some("Profile updated"),
                ip_address: client.ip_address.as_deref(),
                user_agent: client.user_agent.as_deref(),
            },
        )
        .await
        .map_err(|e| ApiError::internal(format!("Failed to log activity: {e}")))?;

    Ok(Json(ApiResponse::message("Profile updated successfully")))
}

/// PUT /dashboard/password
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    session: Session,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = session_user_id(&session).await?;

    if payload.current_password.is_empty()
        || payload.new_password.is_empty()
        || payload.confirm_password.is_empty()
    {
        return Err(ApiError::validation("All password fields are required"));
    }

    if payload.new_password != payload.confirm_password {
        return Err(ApiError::validation(
            "New password confirmation does not match",
        ));
    }

    let client = client_info(&headers);
    state
        .auth
        .change_password(
            user_id,
            &payload.current_password,
            &payload.new_password,
            &client,
        )
        .await?;

    Ok(Json(ApiResponse::message("Password changed successfully")))
}

/// POST /dashboard/profile/photo
/// Base64 payload validated as a real image before it touches disk
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    session: Session,
    Json(payload): Json<UploadPhotoRequest>,
) -> Result<Json<ApiResponse<PhotoResponse>>, ApiError> {
    let user_id = session_user_id(&session).await?;

    let bytes = Base64::decode_vec(&payload.content_base64)
        .map_err(|_| ApiError::validation("Invalid file encoding"))?;

    let (uploads_path, upload_config) = {
        let config = state.config().read().await;
        (config.general.uploads_path.clone(), config.uploads.clone())
    };

    let errors = uploads::validate_image(&upload_config, &payload.filename, &bytes);
    if let Some(first) = errors.into_iter().next() {
        return Err(ApiError::validation(first));
    }

    let extension = std::path::Path::new(&payload.filename)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("jpg")
        .to_lowercase();
    let filename = format!("user{user_id}_avatar.{extension}");

    let dir = std::path::Path::new(&uploads_path);
    if !dir.exists() {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to create uploads dir: {e}")))?;
    }

    tokio::fs::write(dir.join(&filename), &bytes)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to write photo: {e}")))?;

    state
        .store()
        .set_user_profile_image(user_id, &filename)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to update profile image: {e}")))?;

    Ok(Json(ApiResponse::success(
        "Profile photo updated",
        PhotoResponse {
            profile_image: filename,
        },
    )))
}
