use chrono::NaiveDate;
use sqlx::Row;

use dealdesk_core::domain::customer::CustomerId;
use dealdesk_core::domain::deal::{Deal, DealFilter, DealId, DealStage};
use dealdesk_core::domain::user::UserId;

use super::{DealRepository, RepositoryError};
use crate::DbPool;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct SqlDealRepository {
    pool: DbPool,
}

impl SqlDealRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_deal(row: &sqlx::sqlite::SqliteRow) -> Result<Deal, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_id: String =
        row.try_get("customer_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let customer_name: Option<String> =
        row.try_get("customer_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sales_user_id: String =
        row.try_get("sales_user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let sales_user_name: Option<String> =
        row.try_get("sales_user_name").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let stage_str: String =
        row.try_get("deal_stage").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let deal_amount: Option<i64> =
        row.try_get("deal_amount").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let service_type: Option<String> =
        row.try_get("service_type").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_contact_str: Option<String> =
        row.try_get("last_contact_date").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let notes: Option<String> =
        row.try_get("notes").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let deal_stage = stage_str
        .parse::<DealStage>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let last_contact_date = last_contact_str
        .map(|raw| NaiveDate::parse_from_str(&raw, DATE_FORMAT))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("last_contact_date: {e}")))?;

    Ok(Deal {
        deal_id: DealId(id),
        customer_id: CustomerId(customer_id),
        customer_name,
        sales_user_id: UserId(sales_user_id),
        sales_user_name,
        deal_stage,
        deal_amount,
        service_type,
        last_contact_date,
        notes,
    })
}

#[async_trait::async_trait]
impl DealRepository for SqlDealRepository {
    async fn find_by_id(&self, id: &DealId) -> Result<Option<Deal>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, customer_name, sales_user_id, sales_user_name, deal_stage,
                    deal_amount, service_type, last_contact_date, notes
             FROM deal WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_deal).transpose()
    }

    async fn list(&self, filter: &DealFilter) -> Result<Vec<Deal>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, customer_name, sales_user_id, sales_user_name, deal_stage,
                    deal_amount, service_type, last_contact_date, notes
             FROM deal
             WHERE (?1 IS NULL OR sales_user_id = ?1)
               AND (?2 IS NULL OR customer_id = ?2)
               AND (?3 IS NULL OR deal_stage = ?3)
               AND (?4 IS NULL OR service_type = ?4)
             ORDER BY rowid",
        )
        .bind(filter.sales_user_id.as_ref().map(UserId::as_str))
        .bind(filter.customer_id.as_ref().map(CustomerId::as_str))
        .bind(filter.deal_stage.map(DealStage::as_str))
        .bind(filter.service_type.as_deref())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_deal).collect()
    }

    async fn upsert(&self, deal: Deal) -> Result<(), RepositoryError> {
        let last_contact = deal.last_contact_date.map(|date| date.format(DATE_FORMAT).to_string());

        sqlx::query(
            "INSERT INTO deal (
                id, customer_id, customer_name, sales_user_id, sales_user_name,
                deal_stage, deal_amount, service_type, last_contact_date, notes
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                customer_id = excluded.customer_id,
                customer_name = excluded.customer_name,
                sales_user_id = excluded.sales_user_id,
                sales_user_name = excluded.sales_user_name,
                deal_stage = excluded.deal_stage,
                deal_amount = excluded.deal_amount,
                service_type = excluded.service_type,
                last_contact_date = excluded.last_contact_date,
                notes = excluded.notes",
        )
        .bind(&deal.deal_id.0)
        .bind(&deal.customer_id.0)
        .bind(&deal.customer_name)
        .bind(&deal.sales_user_id.0)
        .bind(&deal.sales_user_name)
        .bind(deal.deal_stage.as_str())
        .bind(deal.deal_amount)
        .bind(&deal.service_type)
        .bind(last_contact)
        .bind(&deal.notes)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use dealdesk_core::domain::deal::{DealFilter, DealId, DealStage};
    use dealdesk_core::domain::user::UserId;

    use super::SqlDealRepository;
    use crate::repositories::DealRepository;
    use crate::{connect_with_settings, migrations, DemoDataset};

    async fn seeded() -> SqlDealRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        DemoDataset::load(&pool).await.expect("seed");
        SqlDealRepository::new(pool)
    }

    #[tokio::test]
    async fn find_decodes_every_column() {
        let repo = seeded().await;
        let deal = repo
            .find_by_id(&DealId("1".to_string()))
            .await
            .expect("find")
            .expect("deal 1 is seeded");

        assert_eq!(deal.deal_stage, DealStage::Negotiation);
        assert_eq!(deal.deal_amount, Some(50_000_000));
        assert_eq!(deal.customer_name.as_deref(), Some("KDDI株式会社"));
        assert_eq!(deal.last_contact_date, NaiveDate::from_ymd_opt(2026, 2, 25));
    }

    #[tokio::test]
    async fn filters_combine_conjunctively() {
        let repo = seeded().await;

        let mine = repo
            .list(&DealFilter {
                sales_user_id: Some(UserId("1".to_string())),
                ..DealFilter::default()
            })
            .await
            .expect("list");
        let ids: Vec<_> = mine.iter().map(|d| d.deal_id.0.as_str()).collect();
        assert_eq!(ids, vec!["1", "2", "5"]);

        let mine_lost = repo
            .list(&DealFilter {
                sales_user_id: Some(UserId("1".to_string())),
                deal_stage: Some(DealStage::Lost),
                ..DealFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(mine_lost.len(), 1);
        assert_eq!(mine_lost[0].deal_id, DealId("5".to_string()));

        let infra = repo
            .list(&DealFilter {
                service_type: Some("通信インフラ構築".to_string()),
                ..DealFilter::default()
            })
            .await
            .expect("list");
        assert_eq!(infra.len(), 2);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_deal_in_place() {
        let repo = seeded().await;
        let mut deal = repo
            .find_by_id(&DealId("3".to_string()))
            .await
            .expect("find")
            .expect("deal 3 is seeded");
        deal.deal_stage = DealStage::Proposal;
        deal.deal_amount = None;
        repo.upsert(deal).await.expect("upsert");

        let all = repo.list(&DealFilter::default()).await.expect("list");
        assert_eq!(all.len(), 5);
        assert_eq!(all[2].deal_stage, DealStage::Proposal);
        assert_eq!(all[2].deal_amount, None);
    }
}
