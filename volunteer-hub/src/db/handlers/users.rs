//! Database repository for users.

use crate::types::{abbrev_uuid, UserId};
use crate::{
    api::models::users::Role,
    db::{
        errors::{DbError, Result},
        handlers::repository::Repository,
        models::users::{UserCreateDBRequest, UserDBResponse, UserUpdateDBRequest},
    },
};
use chrono::{DateTime, Utc};
use sqlx::{Connection, FromRow, PgConnection};
use tracing::instrument;
use uuid::Uuid;

/// Filter for listing users
#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub skip: i64,
    pub limit: i64,
    pub role: Option<Role>,
    pub search: Option<String>,
}

impl UserFilter {
    pub fn new(skip: i64, limit: i64) -> Self {
        Self {
            skip,
            limit,
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: Option<Role>) -> Self {
        self.role = role;
        self
    }

    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search.filter(|s| !s.trim().is_empty());
        self
    }
}

#[derive(Debug, Clone, FromRow)]
struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub phone: Option<String>,
    pub password_hash: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<(Vec<Role>, User)> for UserDBResponse {
    fn from((roles, user): (Vec<Role>, User)) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            phone: user.phone,
            created_at: user.created_at,
            updated_at: user.updated_at,
            last_login: user.last_login,
            is_admin: user.is_admin,
            roles,
            password_hash: user.password_hash,
            deleted_at: user.deleted_at,
        }
    }
}

pub struct Users<'c> {
    db: &'c mut PgConnection,
}

#[async_trait::async_trait]
impl<'c> Repository for Users<'c> {
    type CreateRequest = UserCreateDBRequest;
    type UpdateRequest = UserUpdateDBRequest;
    type Response = UserDBResponse;
    type Id = UserId;
    type Filter = UserFilter;

    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let user_id = Uuid::new_v4();
        let roles = with_visitor(&request.roles);

        let mut tx = self.db.begin().await?;
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, display_name, phone, is_admin, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.display_name)
        .bind(&request.phone)
        .bind(request.is_admin)
        .bind(&request.password_hash)
        .fetch_one(&mut *tx)
        .await?;

        for role in &roles {
            sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                .bind(user_id)
                .bind(role)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(UserDBResponse::from((roles, user)))
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        match user {
            Some(user) => {
                let roles = self.roles_for(user.id).await?;
                Ok(Some(UserDBResponse::from((roles, user))))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(limit = filter.limit, skip = filter.skip), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT u.* FROM users u
            WHERE u.deleted_at IS NULL
              AND ($1::user_role IS NULL OR EXISTS (
                    SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = $1))
              AND ($2::text IS NULL
                    OR u.username ILIKE '%' || $2 || '%'
                    OR u.email ILIKE '%' || $2 || '%'
                    OR u.display_name ILIKE '%' || $2 || '%')
            ORDER BY u.created_at DESC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.role)
        .bind(&filter.search)
        .bind(filter.limit)
        .bind(filter.skip)
        .fetch_all(&mut *self.db)
        .await?;

        let mut result = Vec::with_capacity(users.len());
        for user in users {
            let roles = self.roles_for(user.id).await?;
            result.push(UserDBResponse::from((roles, user)));
        }
        Ok(result)
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1").bind(id).execute(&mut *self.db).await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        // Touches two tables, so take a transaction (nested as a savepoint if the caller has one)
        let mut tx = self.db.begin().await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET
                display_name = COALESCE($2, display_name),
                phone = COALESCE($3, phone),
                password_hash = COALESCE($4, password_hash),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.display_name)
        .bind(&request.phone)
        .bind(&request.password_hash)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DbError::NotFound)?;

        if let Some(roles) = &request.roles {
            sqlx::query("DELETE FROM user_roles WHERE user_id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;

            for role in with_visitor(roles) {
                sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
                    .bind(id)
                    .bind(role)
                    .execute(&mut *tx)
                    .await?;
            }
        }
        tx.commit().await?;

        let roles = self.roles_for(id).await?;
        Ok(UserDBResponse::from((roles, user)))
    }
}

/// Every account keeps the Visitor role, whatever else it is granted.
fn with_visitor(roles: &[Role]) -> Vec<Role> {
    let mut unique = Vec::with_capacity(roles.len() + 1);
    for role in roles.iter().copied().chain(std::iter::once(Role::Visitor)) {
        if !unique.contains(&role) {
            unique.push(role);
        }
    }
    unique
}

impl<'c> Users<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    async fn roles_for(&mut self, user_id: UserId) -> Result<Vec<Role>> {
        let roles = sqlx::query_scalar::<_, Role>("SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role")
            .bind(user_id)
            .fetch_all(&mut *self.db)
            .await?;
        Ok(roles)
    }

    #[instrument(skip(self, email), err)]
    pub async fn get_user_by_email(&mut self, email: &str) -> Result<Option<UserDBResponse>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE lower(email) = lower($1) AND deleted_at IS NULL")
            .bind(email)
            .fetch_optional(&mut *self.db)
            .await?;

        match user {
            Some(user) => {
                let roles = self.roles_for(user.id).await?;
                Ok(Some(UserDBResponse::from((roles, user))))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), err)]
    pub async fn count(&mut self, filter: &UserFilter) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM users u
            WHERE u.deleted_at IS NULL
              AND ($1::user_role IS NULL OR EXISTS (
                    SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = $1))
              AND ($2::text IS NULL
                    OR u.username ILIKE '%' || $2 || '%'
                    OR u.email ILIKE '%' || $2 || '%'
                    OR u.display_name ILIKE '%' || $2 || '%')
            "#,
        )
        .bind(filter.role)
        .bind(&filter.search)
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Grant a role if the user does not already hold it.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn add_role(&mut self, user_id: UserId, role: Role) -> Result<()> {
        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(role)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn record_login(&mut self, user_id: UserId) -> Result<()> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Replace identifying data with placeholders and mark the account deleted.
    /// The row is kept so assignment history and audit trails stay consistent.
    #[instrument(skip(self), fields(user_id = %abbrev_uuid(&user_id)), err)]
    pub async fn anonymize(&mut self, user_id: UserId) -> Result<()> {
        let short = abbrev_uuid(&user_id);
        let result = sqlx::query(
            r#"
            UPDATE users SET
                username = $2,
                email = $3,
                display_name = NULL,
                phone = NULL,
                password_hash = NULL,
                is_admin = FALSE,
                deleted_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(user_id)
        .bind(format!("deleted-{short}-{}", Uuid::new_v4().simple()))
        .bind(format!("deleted-{}@anonymized.invalid", user_id.simple()))
        .execute(&mut *self.db)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }

        sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role <> 'VISITOR'")
            .bind(user_id)
            .execute(&mut *self.db)
            .await?;
        Ok(())
    }

    /// Live accounts with admin rights, by flag or by the `ADMIN` role.
    #[instrument(skip(self), err)]
    pub async fn count_admins(&mut self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM users u
            WHERE u.deleted_at IS NULL
              AND (u.is_admin OR EXISTS (
                  SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = 'ADMIN'
              ))
            "#,
        )
        .fetch_one(&mut *self.db)
        .await?;
        Ok(count)
    }

    /// Whether removing `user` would leave no admin behind.
    pub async fn is_last_admin(&mut self, user: &UserDBResponse) -> Result<bool> {
        Ok(user.holds_admin() && self.count_admins().await? <= 1)
    }
}

#[cfg(test)]
mod tests {
    use super::super::repository::Repository;
    use super::*;
    use sqlx::PgPool;

    fn create_request(username: &str, roles: Vec<Role>) -> UserCreateDBRequest {
        UserCreateDBRequest {
            username: username.to_string(),
            email: format!("{username}@example.org"),
            display_name: Some(format!("{username} display")),
            phone: None,
            is_admin: false,
            roles,
            password_hash: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_create_user_always_has_visitor(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("ada", vec![Role::Volunteer])).await.unwrap();
        assert_eq!(user.username, "ada");
        assert!(user.roles.contains(&Role::Volunteer));
        assert!(user.roles.contains(&Role::Visitor));

        let fetched = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(fetched.roles.len(), 2);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_get_user_by_email_is_case_insensitive(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let created = repo.create(&create_request("grace", vec![])).await.unwrap();
        let found = repo.get_user_by_email("GRACE@example.org").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_update_roles_keeps_visitor(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("linus", vec![Role::Staff])).await.unwrap();
        let update = UserUpdateDBRequest {
            roles: Some(vec![Role::Donor]),
            ..Default::default()
        };
        let updated = repo.update(user.id, &update).await.unwrap();

        assert!(updated.roles.contains(&Role::Donor));
        assert!(updated.roles.contains(&Role::Visitor));
        assert!(!updated.roles.contains(&Role::Staff));
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_list_filters_by_role_and_search(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        repo.create(&create_request("vol-one", vec![Role::Volunteer])).await.unwrap();
        repo.create(&create_request("vol-two", vec![Role::Volunteer])).await.unwrap();
        repo.create(&create_request("donor", vec![Role::Donor])).await.unwrap();

        let volunteers = UserFilter::new(0, 10).with_role(Some(Role::Volunteer));
        assert_eq!(repo.list(&volunteers).await.unwrap().len(), 2);
        assert_eq!(repo.count(&volunteers).await.unwrap(), 2);

        let search = UserFilter::new(0, 10).with_search(Some("two".to_string()));
        let found = repo.list(&search).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].username, "vol-two");
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_anonymize_scrubs_identity(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Users::new(&mut conn);

        let user = repo.create(&create_request("erase-me", vec![Role::Volunteer])).await.unwrap();
        repo.anonymize(user.id).await.unwrap();

        let after = repo.get_by_id(user.id).await.unwrap().unwrap();
        assert!(after.deleted_at.is_some());
        assert!(after.display_name.is_none());
        assert_ne!(after.email, user.email);
        assert_eq!(after.roles, vec![Role::Visitor]);
        assert!(repo.get_user_by_email(&user.email).await.unwrap().is_none());

        // second anonymisation finds nothing to do
        assert!(matches!(repo.anonymize(user.id).await, Err(DbError::NotFound)));
    }
}
