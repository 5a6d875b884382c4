use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{
    email::normalize_email,
    password::{hash_password, verify_password},
    repo::UserStore,
    repo_types::{NewUser, User, UserChanges},
};
use crate::db::is_unique_violation;

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("users must have an email address")]
    EmptyEmail,
    #[error("email already registered")]
    EmailTaken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("user not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Profile fields a user may change on their own account.
#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub email: Option<String>,
    pub name: Option<String>,
    pub password: Option<String>,
}

pub async fn create_user(
    users: &dyn UserStore,
    email: &str,
    password: &str,
    name: &str,
) -> Result<User, AccountError> {
    create_account(users, email, password, name, false).await
}

/// Same as [`create_user`], with staff and superuser flags forced on.
pub async fn create_superuser(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<User, AccountError> {
    create_account(users, email, password, "", true).await
}

async fn create_account(
    users: &dyn UserStore,
    email: &str,
    password: &str,
    name: &str,
    admin: bool,
) -> Result<User, AccountError> {
    let email = normalize_email(email);
    if email.is_empty() {
        return Err(AccountError::EmptyEmail);
    }
    if users.find_by_email(&email).await?.is_some() {
        warn!(%email, "email already registered");
        return Err(AccountError::EmailTaken);
    }

    let new_user = NewUser {
        email,
        name: name.to_string(),
        password_hash: hash_password(password)?,
        is_staff: admin,
        is_superuser: admin,
    };
    let user = users.create(new_user).await.map_err(|e| {
        if is_unique_violation(&e) {
            AccountError::EmailTaken
        } else {
            AccountError::Internal(e)
        }
    })?;

    info!(user_id = %user.id, email = %user.email, superuser = user.is_superuser, "user created");
    Ok(user)
}

/// Checks credentials of an active account.
pub async fn authenticate(
    users: &dyn UserStore,
    email: &str,
    password: &str,
) -> Result<User, AccountError> {
    let email = normalize_email(email);
    let Some(user) = users.find_by_email(&email).await? else {
        warn!(%email, "login unknown email");
        return Err(AccountError::InvalidCredentials);
    };
    if !user.is_active {
        warn!(user_id = %user.id, "login to inactive account");
        return Err(AccountError::InvalidCredentials);
    }
    if !verify_password(password, &user.password_hash)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AccountError::InvalidCredentials);
    }
    Ok(user)
}

pub async fn update_profile(
    users: &dyn UserStore,
    user_id: Uuid,
    update: ProfileUpdate,
) -> Result<User, AccountError> {
    let mut changes = UserChanges {
        name: update.name,
        ..UserChanges::default()
    };

    if let Some(email) = update.email {
        let email = normalize_email(&email);
        if email.is_empty() {
            return Err(AccountError::EmptyEmail);
        }
        if let Some(existing) = users.find_by_email(&email).await? {
            if existing.id != user_id {
                return Err(AccountError::EmailTaken);
            }
        }
        changes.email = Some(email);
    }
    if let Some(password) = update.password {
        changes.password_hash = Some(hash_password(&password)?);
    }

    let updated = users.update(user_id, changes).await.map_err(|e| {
        if is_unique_violation(&e) {
            AccountError::EmailTaken
        } else {
            AccountError::Internal(e)
        }
    })?;
    updated.ok_or(AccountError::NotFound)
}
