pub mod auth_service;
pub mod auth_service_impl;
pub use auth_service::{
    AuthError, AuthService, ClientInfo, LoginOutcome, Registration, SanitizedUser,
};
pub use auth_service_impl::SeaOrmAuthService;

pub mod sweeper;
pub use sweeper::SessionSweeper;
