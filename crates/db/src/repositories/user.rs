use sqlx::Row;

use dealdesk_core::domain::user::{User, UserId};

use super::{RepositoryError, UserFilter, UserRepository};
use crate::DbPool;

pub struct SqlUserRepository {
    pool: DbPool,
}

impl SqlUserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: String =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let department: Option<String> =
        row.try_get("department").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let role: Option<String> =
        row.try_get("role").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(User { user_id: UserId(id), name, email, department, role })
}

#[async_trait::async_trait]
impl UserRepository for SqlUserRepository {
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, department, role FROM sales_user WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    async fn list(&self, filter: &UserFilter) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, name, email, department, role FROM sales_user
             WHERE (?1 IS NULL OR department = ?1)
               AND (?2 IS NULL OR role = ?2)
             ORDER BY rowid",
        )
        .bind(filter.department.as_deref())
        .bind(filter.role.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_user).collect()
    }

    async fn upsert(&self, user: User) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO sales_user (id, name, email, department, role)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                department = excluded.department,
                role = excluded.role",
        )
        .bind(&user.user_id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.department)
        .bind(&user.role)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
