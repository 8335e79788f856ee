use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

const DEMO_USER_IDS: &[&str] = &["1", "2"];
const DEMO_CUSTOMER_IDS: &[&str] = &["1", "2", "3"];

/// Expected shape of each seeded deal: id, owner, stage.
const DEMO_DEALS: &[(&str, &str, &str)] = &[
    ("1", "1", "negotiation"),
    ("2", "1", "proposal"),
    ("3", "2", "prospect"),
    ("4", "2", "won"),
    ("5", "1", "lost"),
];

/// Demo sales dataset used for local development and the offline agent.
///
/// Loading is idempotent: existing rows with the same ids are left untouched.
pub struct DemoDataset;

impl DemoDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;
        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        tracing::debug!(
            event_name = "db.seed.loaded",
            users = DEMO_USER_IDS.len(),
            customers = DEMO_CUSTOMER_IDS.len(),
            deals = DEMO_DEALS.len(),
            "demo dataset loaded"
        );

        Ok(SeedResult {
            users_seeded: DEMO_USER_IDS.len(),
            customers_seeded: DEMO_CUSTOMER_IDS.len(),
            deals_seeded: DEMO_DEALS.len(),
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let users_present = count_ids(pool, "sales_user", DEMO_USER_IDS).await?;
        checks.push(("users", users_present == DEMO_USER_IDS.len() as i64));

        let customers_present = count_ids(pool, "customer", DEMO_CUSTOMER_IDS).await?;
        checks.push(("customers", customers_present == DEMO_CUSTOMER_IDS.len() as i64));

        for (deal_id, owner, stage) in DEMO_DEALS {
            let deal_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM deal d
                    JOIN customer c ON c.id = d.customer_id
                    JOIN sales_user u ON u.id = d.sales_user_id
                    WHERE d.id = ?1 AND d.sales_user_id = ?2 AND d.deal_stage = ?3
                      AND d.customer_name = c.name AND d.sales_user_name = u.name)",
            )
            .bind(deal_id)
            .bind(owner)
            .bind(stage)
            .fetch_one(pool)
            .await?;
            checks.push((*deal_id, deal_ok == 1));
        }

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }
}

async fn count_ids(pool: &DbPool, table: &str, ids: &[&str]) -> Result<i64, RepositoryError> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!("SELECT COUNT(1) FROM {table} WHERE id IN ({placeholders})");
    let mut query = sqlx::query_scalar::<_, i64>(&sql);
    for id in ids {
        query = query.bind(*id);
    }
    Ok(query.fetch_one(pool).await?)
}

#[derive(Debug)]
pub struct SeedResult {
    pub users_seeded: usize,
    pub customers_seeded: usize,
    pub deals_seeded: usize,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
