use chrono::{Duration, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};

use traindesk::config::SecurityConfig;
use traindesk::db::Store;
use traindesk::entities::users;
use traindesk::services::{
    AuthError, AuthService, ClientInfo, Registration, SeaOrmAuthService,
};

const WRONG_PASSWORD_MESSAGE: &str = "Invalid email or password";

async fn setup() -> (Store, SeaOrmAuthService) {
    // One pooled connection: every query must see the same in-memory database
    let store = Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("Failed to open in-memory store");
    let auth = SeaOrmAuthService::new(store.clone(), SecurityConfig::default());
    (store, auth)
}

fn ana() -> Registration {
    Registration {
        first_name: "Ana".to_string(),
        last_name: "Lee".to_string(),
        email: "ana@x.com".to_string(),
        password: "password1".to_string(),
        ..Default::default()
    }
}

fn client() -> ClientInfo {
    ClientInfo {
        ip_address: Some("203.0.113.7".to_string()),
        user_agent: Some("test-agent".to_string()),
    }
}

async fn fetch_user(store: &Store, email: &str) -> users::Model {
    store
        .get_user_by_email(email)
        .await
        .unwrap()
        .expect("user should exist")
}

#[tokio::test]
async fn register_login_and_lockout_scenario() {
    let (store, auth) = setup().await;

    let user = auth.register(ana(), &client()).await.unwrap();
    assert_eq!(user.email, "ana@x.com");
    assert_eq!(user.role, "user");
    assert_eq!(user.status, "active");
    // Sanitized: no secret fields exist on the DTO, and serialization
    // carries no hash either
    let json = serde_json::to_value(&user).unwrap();
    assert!(json.get("password_hash").is_none());
    assert!(json.get("reset_token").is_none());
    assert!(json.get("login_attempts").is_none());

    // Fresh registration logs straight in and gets a session row
    let outcome = auth
        .login("ana@x.com", "password1", false, &client())
        .await
        .unwrap();
    assert_eq!(outcome.session_id.len(), 128);
    assert!(
        store
            .get_valid_session(&outcome.session_id)
            .await
            .unwrap()
            .is_some()
    );

    // Five wrong passwords in a row lock the account
    for attempt in 1..=5 {
        let err = auth
            .login("ana@x.com", "wrong", false, &client())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), WRONG_PASSWORD_MESSAGE, "attempt {attempt}");
    }

    let locked = fetch_user(&store, "ana@x.com").await;
    assert_eq!(locked.login_attempts, 5);
    assert!(locked.locked_until.is_some());

    // Even the correct password now answers with the lockout message
    let err = auth
        .login("ana@x.com", "password1", false, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountLocked));

    // And the rejected attempt did not grow the counter
    assert_eq!(fetch_user(&store, "ana@x.com").await.login_attempts, 5);
}

#[tokio::test]
async fn successful_login_clears_stale_lock_state() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    // Simulate a lock whose window has already elapsed
    let user = fetch_user(&store, "ana@x.com").await;
    let mut active: users::ActiveModel = user.into();
    active.login_attempts = Set(7);
    active.locked_until = Set(Some((Utc::now() - Duration::minutes(1)).to_rfc3339()));
    active.update(&store.conn).await.unwrap();

    auth.login("ana@x.com", "password1", false, &client())
        .await
        .unwrap();

    let user = fetch_user(&store, "ana@x.com").await;
    assert_eq!(user.login_attempts, 0);
    assert!(user.locked_until.is_none());
    assert!(user.last_login.is_some());
}

#[tokio::test]
async fn failed_login_after_expired_lock_rearms_the_window() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    let user = fetch_user(&store, "ana@x.com").await;
    let mut active: users::ActiveModel = user.into();
    active.login_attempts = Set(5);
    active.locked_until = Set(Some((Utc::now() - Duration::minutes(1)).to_rfc3339()));
    active.update(&store.conn).await.unwrap();

    let err = auth
        .login("ana@x.com", "wrong", false, &client())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), WRONG_PASSWORD_MESSAGE);

    let user = fetch_user(&store, "ana@x.com").await;
    assert_eq!(user.login_attempts, 6);
    assert!(user.locked_until.as_deref().is_some_and(traindesk::db::is_future));
}

#[tokio::test]
async fn unknown_email_answers_like_wrong_password_without_writes() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    let unknown = auth
        .login("nobody@x.com", "password1", false, &client())
        .await
        .unwrap_err();
    let wrong = auth
        .login("ana@x.com", "not-the-password", false, &client())
        .await
        .unwrap_err();

    assert_eq!(unknown.to_string(), wrong.to_string());

    // No phantom row appeared for the unknown address
    assert!(store.get_user_by_email("nobody@x.com").await.unwrap().is_none());
}

#[tokio::test]
async fn inactive_account_is_rejected_without_counting_an_attempt() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    let user = fetch_user(&store, "ana@x.com").await;
    let mut active: users::ActiveModel = user.into();
    active.status = Set("inactive".to_string());
    active.update(&store.conn).await.unwrap();

    let err = auth
        .login("ana@x.com", "password1", false, &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::AccountInactive));
    assert_eq!(fetch_user(&store, "ana@x.com").await.login_attempts, 0);
}

#[tokio::test]
async fn duplicate_email_fails_validation_and_writes_nothing() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    let err = auth.register(ana(), &client()).await.unwrap_err();
    let AuthError::Invalid(errors) = err else {
        panic!("expected field errors, got {err}");
    };
    assert_eq!(errors["email"], vec!["Email already exists"]);

    let count = users::Entity::find()
        .filter(users::Column::Email.eq("ana@x.com"))
        .all(&store.conn)
        .await
        .unwrap()
        .len();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn registration_validates_fields_together() {
    let (_store, auth) = setup().await;

    let err = auth
        .register(
            Registration {
                first_name: "A".to_string(),
                last_name: String::new(),
                email: "not-an-email".to_string(),
                password: "short".to_string(),
                ..Default::default()
            },
            &client(),
        )
        .await
        .unwrap_err();

    let AuthError::Invalid(errors) = err else {
        panic!("expected field errors, got {err}");
    };
    assert_eq!(
        errors["first_name"],
        vec!["First name must be at least 2 characters"]
    );
    assert_eq!(errors["last_name"], vec!["Last name is required"]);
    assert_eq!(errors["email"], vec!["Please enter a valid email address"]);
    assert_eq!(
        errors["password"],
        vec!["Password must be at least 8 characters"]
    );
}

#[tokio::test]
async fn reset_token_is_single_use_and_expires() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    // Unknown email reports success but stores nothing
    auth.request_password_reset("ghost@x.com", &client())
        .await
        .unwrap();

    auth.request_password_reset("ana@x.com", &client())
        .await
        .unwrap();
    let token = fetch_user(&store, "ana@x.com")
        .await
        .reset_token
        .expect("token should be issued");

    auth.reset_password(&token, "password2!", &client())
        .await
        .unwrap();

    // New password works, old one does not
    auth.login("ana@x.com", "password2!", false, &client())
        .await
        .unwrap();
    assert_eq!(
        auth.login("ana@x.com", "password1", false, &client())
            .await
            .unwrap_err()
            .to_string(),
        WRONG_PASSWORD_MESSAGE
    );

    // Second use of the same token fails
    let err = auth
        .reset_password(&token, "password3!", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidResetToken));
}

#[tokio::test]
async fn expired_reset_token_is_rejected() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    auth.request_password_reset("ana@x.com", &client())
        .await
        .unwrap();

    let user = fetch_user(&store, "ana@x.com").await;
    let token = user.reset_token.clone().unwrap();
    let mut active: users::ActiveModel = user.into();
    active.reset_expires = Set(Some((Utc::now() - Duration::minutes(1)).to_rfc3339()));
    active.update(&store.conn).await.unwrap();

    let err = auth
        .reset_password(&token, "password2!", &client())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidResetToken));
}

#[tokio::test]
async fn short_replacement_password_is_rejected_but_token_survives() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    auth.request_password_reset("ana@x.com", &client())
        .await
        .unwrap();
    let token = fetch_user(&store, "ana@x.com").await.reset_token.unwrap();

    let err = auth
        .reset_password(&token, "tiny", &client())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Password must be at least 8 characters long."
    );

    // Policy failure must not burn the token
    auth.reset_password(&token, "password2!", &client())
        .await
        .unwrap();
}

#[tokio::test]
async fn change_password_requires_the_current_one() {
    let (_store, auth) = setup().await;
    let user = auth.register(ana(), &client()).await.unwrap();

    let err = auth
        .change_password(user.id, "guess", "password2!", &client())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Current password is incorrect");

    let err = auth
        .change_password(user.id, "password1", "password1", &client())
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "New password must be different from current password"
    );

    auth.change_password(user.id, "password1", "password2!", &client())
        .await
        .unwrap();
    auth.login("ana@x.com", "password2!", false, &client())
        .await
        .unwrap();
}

#[tokio::test]
async fn remember_me_stores_only_a_hash() {
    let (store, auth) = setup().await;
    auth.register(ana(), &client()).await.unwrap();

    let outcome = auth
        .login("ana@x.com", "password1", true, &client())
        .await
        .unwrap();
    let token = outcome.remember_token.expect("token should be minted");

    let stored = fetch_user(&store, "ana@x.com")
        .await
        .remember_token
        .expect("hash should be stored");
    assert_ne!(stored, token);
    assert!(stored.starts_with("$argon2"));
}

#[tokio::test]
async fn logout_deletes_the_session_row() {
    let (store, auth) = setup().await;
    let user = auth.register(ana(), &client()).await.unwrap();

    let outcome = auth
        .login("ana@x.com", "password1", false, &client())
        .await
        .unwrap();

    auth.logout(user.id, &outcome.session_id, &client())
        .await
        .unwrap();

    assert!(
        store
            .get_valid_session(&outcome.session_id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn expired_sessions_are_invisible_and_sweepable() {
    let (store, _auth) = setup().await;

    let user = store
        .get_user_by_email("admin@traindesk.local")
        .await
        .unwrap()
        .expect("seeded admin");

    let live = store
        .create_session(user.id, None, None, 3600)
        .await
        .unwrap();
    let dead = store.create_session(user.id, None, None, 0).await.unwrap();

    // Lazy expiry: the lapsed row reads as absent even though it exists
    assert!(store.get_valid_session(&live.id).await.unwrap().is_some());
    assert!(store.get_valid_session(&dead.id).await.unwrap().is_none());

    let swept = store.delete_expired_sessions().await.unwrap();
    assert_eq!(swept, 1);
    assert!(store.get_valid_session(&live.id).await.unwrap().is_some());
}

#[tokio::test]
async fn login_activity_is_recorded() {
    let (store, auth) = setup().await;
    let user = auth.register(ana(), &client()).await.unwrap();

    auth.login("ana@x.com", "password1", false, &client())
        .await
        .unwrap();

    let entries = store.recent_activity_for_user(user.id, 10).await.unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert!(actions.contains(&"register"));
    assert!(actions.contains(&"login"));
    assert_eq!(entries[0].ip_address.as_deref(), Some("203.0.113.7"));
}
