//! User and identity-link repositories (PostgreSQL)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use varco_core::{
    IdentityLinkStore, LocalUser, NewUser, Result, UserId, UserStore, VarcoError,
};

const USER_COLUMNS: &str = "id, username, email, given_name, family_name, fiscal_code, \
     mobile_phone, roles, active, last_login_at, created_at, updated_at";

fn map_user(row: &sqlx::postgres::PgRow) -> std::result::Result<LocalUser, sqlx::Error> {
    Ok(LocalUser {
        id: UserId::from_uuid(row.try_get::<Uuid, _>("id")?),
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        given_name: row.try_get("given_name")?,
        family_name: row.try_get("family_name")?,
        fiscal_code: row.try_get("fiscal_code")?,
        mobile_phone: row.try_get("mobile_phone")?,
        roles: row.try_get::<Vec<String>, _>("roles")?,
        active: row.try_get("active")?,
        last_login_at: row.try_get::<Option<DateTime<Utc>>, _>("last_login_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn db_err(e: sqlx::Error) -> VarcoError {
    VarcoError::database(e.to_string())
}

/// PostgreSQL implementation of `UserStore`
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self))]
    async fn find_by_id(&self, id: UserId) -> Result<Option<LocalUser>> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.map(|r| map_user(&r)).transpose().map_err(db_err)
    }

    #[instrument(skip(self, email))]
    async fn find_by_email(&self, email: &str) -> Result<Vec<LocalUser>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter().map(map_user).collect::<std::result::Result<_, _>>().map_err(db_err)
    }

    #[instrument(skip(self))]
    async fn find_by_username(&self, username: &str) -> Result<Option<LocalUser>> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| map_user(&r)).transpose().map_err(db_err)
    }

    #[instrument(skip(self))]
    async fn username_exists(&self, username: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(row.is_some())
    }

    /// The user row and its identity link commit in one transaction;
    /// a failure on either leaves nothing behind.
    #[instrument(skip(self, user))]
    async fn create_linked(
        &self,
        user: &NewUser,
        provider: &str,
        authname: &str,
    ) -> Result<LocalUser> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let id = UserId::new();
        let now = Utc::now();

        let row = sqlx::query(&format!(
            "INSERT INTO users (id, username, email, given_name, family_name, fiscal_code, \
             mobile_phone, roles, active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9, $9) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id.into_uuid())
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.given_name)
        .bind(&user.family_name)
        .bind(&user.fiscal_code)
        .bind(&user.mobile_phone)
        .bind(&user.roles)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let created = map_user(&row).map_err(db_err)?;

        sqlx::query(
            "INSERT INTO identity_links (provider, authname, user_id, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(provider)
        .bind(authname)
        .bind(created.id.into_uuid())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(created)
    }

    #[instrument(skip(self, user))]
    async fn update(&self, user: &LocalUser) -> Result<LocalUser> {
        let row = sqlx::query(&format!(
            "UPDATE users SET email = $2, given_name = $3, family_name = $4, \
             fiscal_code = $5, mobile_phone = $6, roles = $7, active = $8, \
             last_login_at = $9, updated_at = $10 \
             WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(user.id.into_uuid())
        .bind(&user.email)
        .bind(&user.given_name)
        .bind(&user.family_name)
        .bind(&user.fiscal_code)
        .bind(&user.mobile_phone)
        .bind(&user.roles)
        .bind(user.active)
        .bind(user.last_login_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        map_user(&row).map_err(db_err)
    }
}

/// PostgreSQL implementation of `IdentityLinkStore`
pub struct PgIdentityLinkStore {
    pool: PgPool,
}

impl PgIdentityLinkStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityLinkStore for PgIdentityLinkStore {
    #[instrument(skip(self))]
    async fn find_user(&self, provider: &str, authname: &str) -> Result<Option<UserId>> {
        let row = sqlx::query(
            "SELECT user_id FROM identity_links WHERE provider = $1 AND authname = $2",
        )
        .bind(provider)
        .bind(authname)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|r| r.try_get::<Uuid, _>("user_id").map(UserId::from_uuid))
            .transpose()
            .map_err(db_err)
    }

    #[instrument(skip(self))]
    async fn link(&self, provider: &str, authname: &str, user_id: UserId) -> Result<()> {
        sqlx::query(
            "INSERT INTO identity_links (provider, authname, user_id, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(provider)
        .bind(authname)
        .bind(user_id.into_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
