use sqlx::Row;

use dealdesk_core::domain::customer::{Customer, CustomerId};

use super::{CustomerFilter, CustomerRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCustomerRepository {
    pool: DbPool,
}

impl SqlCustomerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let name: String = row.try_get("name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let industry: Option<String> =
        row.try_get("industry").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let contact_person: Option<String> =
        row.try_get("contact_person").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let email: Option<String> =
        row.try_get("email").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let phone: Option<String> =
        row.try_get("phone").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(Customer { customer_id: CustomerId(id), name, industry, contact_person, email, phone })
}

#[async_trait::async_trait]
impl CustomerRepository for SqlCustomerRepository {
    async fn find_by_id(&self, id: &CustomerId) -> Result<Option<Customer>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, industry, contact_person, email, phone FROM customer WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_customer).transpose()
    }

    async fn list(&self, filter: &CustomerFilter) -> Result<Vec<Customer>, RepositoryError> {
        // instr() keeps the match case-sensitive and free of LIKE wildcards.
        let rows = sqlx::query(
            "SELECT id, name, industry, contact_person, email, phone FROM customer
             WHERE (?1 IS NULL OR industry = ?1)
               AND (?2 IS NULL OR instr(name, ?2) > 0)
             ORDER BY rowid",
        )
        .bind(filter.industry.as_deref())
        .bind(filter.keyword.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_customer).collect()
    }

    async fn upsert(&self, customer: Customer) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO customer (id, name, industry, contact_person, email, phone)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                industry = excluded.industry,
                contact_person = excluded.contact_person,
                email = excluded.email,
                phone = excluded.phone",
        )
        .bind(&customer.customer_id.0)
        .bind(&customer.name)
        .bind(&customer.industry)
        .bind(&customer.contact_person)
        .bind(&customer.email)
        .bind(&customer.phone)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dealdesk_core::domain::customer::CustomerId;

    use super::SqlCustomerRepository;
    use crate::repositories::{CustomerFilter, CustomerRepository};
    use crate::{connect_with_settings, migrations, DemoDataset};

    async fn seeded() -> SqlCustomerRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDataset::load(&pool).await.expect("seed");
        SqlCustomerRepository::new(pool)
    }

    #[tokio::test]
    async fn industry_filter_is_exact_match() {
        let repo = seeded().await;
        let telecom = repo
            .list(&CustomerFilter { industry: Some("通信".to_string()), keyword: None })
            .await
            .expect("list");

        let ids: Vec<_> = telecom.iter().map(|c| c.customer_id.0.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn keyword_filter_matches_name_substring() {
        let repo = seeded().await;
        let found = repo
            .list(&CustomerFilter { industry: None, keyword: Some("楽天".to_string()) })
            .await
            .expect("list");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].customer_id, CustomerId("3".to_string()));

        let wildcard = repo
            .list(&CustomerFilter { industry: None, keyword: Some("%".to_string()) })
            .await
            .expect("list");
        assert!(wildcard.is_empty());
    }

    #[tokio::test]
    async fn unfiltered_list_returns_everything_in_insertion_order() {
        let repo = seeded().await;
        let all = repo.list(&CustomerFilter::default()).await.expect("list");

        let ids: Vec<_> = all.iter().map(|c| c.customer_id.0.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }
}
