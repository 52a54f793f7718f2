pub mod prelude;

pub mod activity_logs;
pub mod contact_submissions;
pub mod course_enrollments;
pub mod courses;
pub mod newsletter_subscribers;
pub mod user_certificates;
pub mod user_sessions;
pub mod users;
