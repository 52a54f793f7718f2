pub mod pagination {

    pub const COURSES_PER_PAGE: u64 = 12;
}

pub mod limits {

    pub const DASHBOARD_ACTIVE_COURSES: u64 = 5;

    pub const DASHBOARD_RECENT_ACTIVITY: u64 = 10;

    pub const ADMIN_ACTIVITY_LIMIT: u64 = 50;
}
