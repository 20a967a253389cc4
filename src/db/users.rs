use tracing::instrument;

use super::Pool;
use crate::error::{AppError, Result};
use crate::model::{Role, User};

const USER_COLUMNS: &str =
    "id, name, email, password_hash, role, phone, address, created_at";

#[derive(Debug, Clone)]
pub struct NewUser<'a> {
    pub name: &'a str,
    pub email: &'a str,
    pub password_hash: &'a str,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

#[instrument(skip_all)]
pub async fn create(pool: &Pool, new: NewUser<'_>) -> Result<User> {
    let sql = format!(
        "INSERT INTO users (name, email, password_hash, role) VALUES (?, ?, ?, ?) RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(new.name)
        .bind(new.email)
        .bind(new.password_hash)
        .bind(new.role)
        .fetch_one(pool)
        .await
        .map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => AppError::conflict("email already registered"),
            other => other,
        })
}

#[instrument(skip_all)]
pub async fn get(pool: &Pool, id: i64) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn get_by_email(pool: &Pool, email: &str) -> Result<Option<User>> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?");
    Ok(sqlx::query_as::<_, User>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?)
}

#[instrument(skip_all)]
pub async fn update_profile(pool: &Pool, id: i64, update: &ProfileUpdate) -> Result<User> {
    let sql = format!(
        "UPDATE users SET name = COALESCE(?, name), phone = COALESCE(?, phone), \
         address = COALESCE(?, address) WHERE id = ? RETURNING {USER_COLUMNS}"
    );
    sqlx::query_as::<_, User>(&sql)
        .bind(update.name.as_deref())
        .bind(update.phone.as_deref())
        .bind(update.address.as_deref())
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

#[instrument(skip_all)]
pub async fn set_password_hash(pool: &Pool, id: i64, password_hash: &str) -> Result<()> {
    let res = sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
        .bind(password_hash)
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::not_found("user not found"));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_role(pool: &Pool, id: i64, role: Role) -> Result<User> {
    let sql = format!("UPDATE users SET role = ? WHERE id = ? RETURNING {USER_COLUMNS}");
    sqlx::query_as::<_, User>(&sql)
        .bind(role)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("user not found"))
}

/// Newest first. `role` narrows the listing when given.
#[instrument(skip_all)]
pub async fn list(pool: &Pool, role: Option<Role>, limit: u32, offset: u32) -> Result<(Vec<User>, i64)> {
    let sql = format!(
        "SELECT {USER_COLUMNS} FROM users WHERE (? IS NULL OR role = ?) ORDER BY id DESC LIMIT ? OFFSET ?"
    );
    let users = sqlx::query_as::<_, User>(&sql)
        .bind(role)
        .bind(role)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE (? IS NULL OR role = ?)")
        .bind(role)
        .bind(role)
        .fetch_one(pool)
        .await?;
    Ok((users, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn new_user<'a>(email: &'a str, role: Role) -> NewUser<'a> {
        NewUser {
            name: "قارئ",
            email,
            password_hash: "$argon2id$fake",
            role,
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() {
        let pool = setup_pool().await;
        create(&pool, new_user("a@example.com", Role::Customer)).await.unwrap();
        let err = create(&pool, new_user("a@example.com", Role::Customer))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(msg) if msg.contains("email")));
    }

    #[tokio::test]
    async fn profile_update_keeps_unset_fields() {
        let pool = setup_pool().await;
        let user = create(&pool, new_user("b@example.com", Role::Customer)).await.unwrap();
        let updated = update_profile(
            &pool,
            user.id,
            &ProfileUpdate {
                phone: Some("07700000000".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.name, "قارئ");
        assert_eq!(updated.phone.as_deref(), Some("07700000000"));
    }

    #[tokio::test]
    async fn list_filters_by_role() {
        let pool = setup_pool().await;
        create(&pool, new_user("c1@example.com", Role::Customer)).await.unwrap();
        create(&pool, new_user("o1@example.com", Role::BookstoreOwner)).await.unwrap();
        create(&pool, new_user("o2@example.com", Role::BookstoreOwner)).await.unwrap();

        let (owners, total) = list(&pool, Some(Role::BookstoreOwner), 10, 0).await.unwrap();
        assert_eq!(total, 2);
        assert!(owners.iter().all(|u| u.role == Role::BookstoreOwner));

        let (all, total) = list(&pool, None, 2, 0).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(all.len(), 2);
    }
}
