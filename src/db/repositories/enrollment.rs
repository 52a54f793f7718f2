use anyhow::{Context, Result};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};

use crate::entities::{course_enrollments, courses, user_certificates};

/// Read-side queries for the learner dashboard.
pub struct EnrollmentRepository {
    conn: DatabaseConnection,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct EnrollmentStats {
    pub total_courses: u64,
    pub active_courses: u64,
    pub completed_courses: u64,
    pub total_certificates: u64,
}

impl EnrollmentRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn stats(&self, user_id: i32) -> Result<EnrollmentStats> {
        let total_courses = course_enrollments::Entity::find()
            .filter(course_enrollments::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await
            .context("Failed to count enrollments")?;

        let active_courses = course_enrollments::Entity::find()
            .filter(course_enrollments::Column::UserId.eq(user_id))
            .filter(course_enrollments::Column::Status.eq("active"))
            .count(&self.conn)
            .await?;

        let completed_courses = course_enrollments::Entity::find()
            .filter(course_enrollments::Column::UserId.eq(user_id))
            .filter(course_enrollments::Column::Status.eq("completed"))
            .count(&self.conn)
            .await?;

        let total_certificates = user_certificates::Entity::find()
            .filter(user_certificates::Column::UserId.eq(user_id))
            .count(&self.conn)
            .await?;

        Ok(EnrollmentStats {
            total_courses,
            active_courses,
            completed_courses,
            total_certificates,
        })
    }

    pub async fn active_with_courses(
        &self,
        user_id: i32,
        limit: u64,
    ) -> Result<Vec<(course_enrollments::Model, Option<courses::Model>)>> {
        course_enrollments::Entity::find()
            .filter(course_enrollments::Column::UserId.eq(user_id))
            .filter(course_enrollments::Column::Status.eq("active"))
            .order_by_desc(course_enrollments::Column::UpdatedAt)
            .limit(limit)
            .find_also_related(courses::Entity)
            .all(&self.conn)
            .await
            .context("Failed to query active enrollments")
    }

    /// One page of enrollments, optionally filtered by status.
    /// Returns the rows plus the unfiltered total for the pagination block.
    pub async fn page_with_courses(
        &self,
        user_id: i32,
        status: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<(course_enrollments::Model, Option<courses::Model>)>, u64)> {
        let mut query = course_enrollments::Entity::find()
            .filter(course_enrollments::Column::UserId.eq(user_id));

        if let Some(status) = status {
            query = query.filter(course_enrollments::Column::Status.eq(status));
        }

        let paginator = query
            .order_by_desc(course_enrollments::Column::UpdatedAt)
            .find_also_related(courses::Entity)
            .paginate(&self.conn, per_page);

        let total = paginator
            .num_items()
            .await
            .context("Failed to count enrollment page")?;
        let rows = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .context("Failed to fetch enrollment page")?;

        Ok((rows, total))
    }

    pub async fn certificates_with_courses(
        &self,
        user_id: i32,
    ) -> Result<Vec<(user_certificates::Model, Option<courses::Model>)>> {
        user_certificates::Entity::find()
            .filter(user_certificates::Column::UserId.eq(user_id))
            .order_by_desc(user_certificates::Column::IssuedDate)
            .find_also_related(courses::Entity)
            .all(&self.conn)
            .await
            .context("Failed to query certificates")
    }
}
