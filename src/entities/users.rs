use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub first_name: String,

    pub last_name: String,

    #[sea_orm(unique)]
    pub email: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub phone: Option<String>,

    pub company: Option<String>,

    pub position: Option<String>,

    /// Relative path under the uploads directory
    pub profile_image: Option<String>,

    /// "user" or "admin"
    pub role: String,

    /// "active" or "inactive"
    pub status: String,

    /// Failed logins since the last successful one
    pub login_attempts: i32,

    /// Set only once `login_attempts` reaches the configured maximum
    pub locked_until: Option<String>,

    pub reset_token: Option<String>,

    pub reset_expires: Option<String>,

    /// Argon2 hash of the remember-me cookie value
    pub remember_token: Option<String>,

    pub verification_token: Option<String>,

    pub last_login: Option<String>,

    pub created_at: String,

    pub updated_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::user_sessions::Entity")]
    UserSessions,
    #[sea_orm(has_many = "super::activity_logs::Entity")]
    ActivityLogs,
    #[sea_orm(has_many = "super::course_enrollments::Entity")]
    CourseEnrollments,
    #[sea_orm(has_many = "super::user_certificates::Entity")]
    UserCertificates,
}

impl Related<super::user_sessions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::UserSessions.def()
    }
}

impl Related<super::activity_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ActivityLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
