use serde::Serialize;
use sqlx::sqlite::SqlitePool;

#[derive(Clone)]
pub struct CustomerStore {
    pool: SqlitePool,
}

/// Customer record. Only the identifier matters to authentication.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: String,
    pub company_name: String,
    pub contact_email: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Partial update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct CustomerUpdate {
    pub company_name: Option<String>,
    pub contact_email: Option<String>,
}

impl CustomerStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a customer with the given id.
    pub async fn create(
        &self,
        id: &str,
        company_name: &str,
        contact_email: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT INTO customers (id, company_name, contact_email) VALUES (?, ?, ?)")
            .bind(id)
            .bind(company_name)
            .bind(contact_email)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_by_id(&self, id: &str) -> Result<Option<Customer>, sqlx::Error> {
        sqlx::query_as(
            "SELECT id, company_name, contact_email, created_at, updated_at FROM customers WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    pub async fn exists(&self, id: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM customers WHERE id = ?")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 > 0)
    }

    /// Apply a partial update. Returns the updated record, or None if the customer is gone.
    pub async fn update(
        &self,
        id: &str,
        update: &CustomerUpdate,
    ) -> Result<Option<Customer>, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE customers SET
                company_name = COALESCE(?, company_name),
                contact_email = COALESCE(?, contact_email),
                updated_at = datetime('now')
             WHERE id = ?",
        )
        .bind(update.company_name.as_deref())
        .bind(update.contact_email.as_deref())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get_by_id(id).await
    }

    /// Delete a customer and, by cascade, its API keys.
    pub async fn delete(&self, id: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
