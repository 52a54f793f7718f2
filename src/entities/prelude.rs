pub use super::activity_logs::Entity as ActivityLogs;
pub use super::contact_submissions::Entity as ContactSubmissions;
pub use super::course_enrollments::Entity as CourseEnrollments;
pub use super::courses::Entity as Courses;
pub use super::newsletter_subscribers::Entity as NewsletterSubscribers;
pub use super::user_certificates::Entity as UserCertificates;
pub use super::user_sessions::Entity as UserSessions;
pub use super::users::Entity as Users;
