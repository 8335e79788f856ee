use std::sync::Arc;

use async_trait::async_trait;

use dealdesk_core::domain::customer::CustomerId;
use dealdesk_core::domain::deal::{Deal, DealFilter, DealId, DealStage};
use dealdesk_core::domain::user::UserId;
use dealdesk_db::repositories::DealRepository;

use super::{
    group_thousands, lookup_failed, or_none, ParameterSpec, Tool, ToolArguments,
    ToolDeclaration, ToolError,
};

pub const SEARCH_DEALS: &str = "search_deals";
pub const GET_DEAL_DETAILS: &str = "get_deal_details";

pub struct SearchDealsTool {
    deals: Arc<dyn DealRepository>,
}

pub struct GetDealDetailsTool {
    deals: Arc<dyn DealRepository>,
}

impl SearchDealsTool {
    pub fn new(deals: Arc<dyn DealRepository>) -> Self {
        Self { deals }
    }

    fn filter(args: &ToolArguments) -> Result<DealFilter, ToolError> {
        let deal_stage = args
            .string("deal_stage")
            .map(|stage| stage.parse::<DealStage>())
            .transpose()
            .map_err(|error| ToolError::InvalidArguments {
                tool: SEARCH_DEALS.to_string(),
                reason: error.to_string(),
            })?;

        Ok(DealFilter {
            sales_user_id: args.string("sales_user_id").map(UserId),
            customer_id: args.string("customer_id").map(CustomerId),
            deal_stage,
            service_type: None,
        })
    }
}

#[async_trait]
impl Tool for SearchDealsTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: SEARCH_DEALS,
            description: "営業担当者、案件ステージ、顧客IDで案件を検索します。このツールは案件ID、顧客名、ステージ、金額、サービスなど全ての情報を返すので、通常はget_deal_detailsを追加で呼ぶ必要はありません。",
            parameters: vec![
                ParameterSpec::string("sales_user_id", "営業担当者のユーザーID"),
                ParameterSpec::string(
                    "deal_stage",
                    "案件ステージ（prospect/見込み、proposal/提案、negotiation/商談、won/受注、lost/失注）",
                )
                .one_of(DealStage::accepted_values()),
                ParameterSpec::string("customer_id", "顧客ID"),
            ],
        }
    }

    async fn execute(&self, args: ToolArguments) -> Result<String, ToolError> {
        let filter = Self::filter(&args)?;

        let deals = match self.deals.list(&filter).await {
            Ok(deals) => deals,
            Err(error) => return Ok(lookup_failed(SEARCH_DEALS, error)),
        };
        if deals.is_empty() {
            return Ok("該当する案件が見つかりませんでした。".to_string());
        }

        let mut output = format!("{}件の案件が見つかりました:\n\n", deals.len());
        for deal in &deals {
            output.push_str(&format!(
                "- 案件ID: {}\n  顧客: {}\n  ステージ: {}\n  金額: {}\n  サービス: {}\n\n",
                deal.deal_id,
                or_none(deal.customer_name.as_deref()),
                deal.deal_stage.label(),
                amount(deal),
                or_none(deal.service_type.as_deref()),
            ));
        }
        Ok(output)
    }
}

impl GetDealDetailsTool {
    pub fn new(deals: Arc<dyn DealRepository>) -> Self {
        Self { deals }
    }
}

#[async_trait]
impl Tool for GetDealDetailsTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: GET_DEAL_DETAILS,
            description: "指定された案件IDの詳細情報を取得します。注意: search_dealsで既に主要な情報（顧客名、ステージ、金額）が取得できるため、特定の詳細情報（メモや最終接触日）が必要な場合のみ使用してください。",
            parameters: vec![ParameterSpec::string("deal_id", "案件ID").required()],
        }
    }

    async fn execute(&self, args: ToolArguments) -> Result<String, ToolError> {
        let deal_id = args.required_string(GET_DEAL_DETAILS, "deal_id")?;

        let deal = match self.deals.find_by_id(&DealId(deal_id.clone())).await {
            Ok(Some(deal)) => deal,
            Ok(None) => return Ok(format!("案件ID {deal_id} は見つかりませんでした。")),
            Err(error) => return Ok(lookup_failed(GET_DEAL_DETAILS, error)),
        };

        let last_contact = deal
            .last_contact_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "なし".to_string());

        Ok(format!(
            "案件詳細:\n- 案件ID: {}\n- 顧客: {}\n- 営業担当: {}\n- ステージ: {}\n- 金額: {}\n- サービス種別: {}\n- 最終接触日: {}\n- メモ: {}",
            deal.deal_id,
            or_none(deal.customer_name.as_deref()),
            or_none(deal.sales_user_name.as_deref()),
            deal.deal_stage.label(),
            amount(&deal),
            or_none(deal.service_type.as_deref()),
            last_contact,
            or_none(deal.notes.as_deref()),
        ))
    }
}

fn amount(deal: &Deal) -> String {
    match deal.deal_amount {
        Some(amount) => format!("{}円", group_thousands(amount)),
        None => "なし".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;
    use serde_json::{json, Map, Value};

    use dealdesk_core::domain::customer::CustomerId;
    use dealdesk_core::domain::deal::{Deal, DealId, DealStage};
    use dealdesk_core::domain::user::UserId;
    use dealdesk_db::repositories::{DealRepository, InMemoryDealRepository};

    use super::{GetDealDetailsTool, SearchDealsTool, SEARCH_DEALS};
    use crate::llm::FunctionCall;
    use crate::tools::{Tool, ToolArguments, ToolError, ToolRegistry};

    fn args(value: Value) -> ToolArguments {
        match value {
            Value::Object(map) => ToolArguments::new(map),
            _ => ToolArguments::new(Map::new()),
        }
    }

    fn deal(id: &str, owner: &str, stage: DealStage, amount: Option<i64>) -> Deal {
        Deal {
            deal_id: DealId(id.to_string()),
            customer_id: CustomerId(id.to_string()),
            customer_name: Some(format!("顧客{id}")),
            sales_user_id: UserId(owner.to_string()),
            sales_user_name: Some("山田太郎".to_string()),
            deal_stage: stage,
            deal_amount: amount,
            service_type: Some("技術人材派遣".to_string()),
            last_contact_date: NaiveDate::from_ymd_opt(2024, 10, 15),
            notes: None,
        }
    }

    async fn repo() -> Arc<InMemoryDealRepository> {
        let repo = InMemoryDealRepository::default();
        for row in [
            deal("1", "1", DealStage::Negotiation, Some(50_000_000)),
            deal("2", "1", DealStage::Proposal, None),
            deal("3", "2", DealStage::Negotiation, Some(8_000_000)),
        ] {
            repo.upsert(row).await.expect("seed deal");
        }
        Arc::new(repo)
    }

    #[tokio::test]
    async fn criteria_combine() {
        let tool = SearchDealsTool::new(repo().await);
        let output = tool
            .execute(args(json!({"sales_user_id": "1", "deal_stage": "商談"})))
            .await
            .expect("execute");

        assert_eq!(
            output,
            "1件の案件が見つかりました:\n\n- 案件ID: 1\n  顧客: 顧客1\n  ステージ: 商談\n  金額: 50,000,000円\n  サービス: 技術人材派遣\n\n"
        );
    }

    #[tokio::test]
    async fn registry_accepts_wire_and_label_stage_values() {
        let mut registry = ToolRegistry::new();
        registry.register(SearchDealsTool::new(repo().await));

        for stage in ["negotiation", "商談"] {
            let call = FunctionCall {
                name: SEARCH_DEALS.to_string(),
                args: match json!({"sales_user_id": "1", "deal_stage": stage}) {
                    Value::Object(map) => map,
                    _ => Map::new(),
                },
            };
            let output = registry.execute(&call).await.expect("stage accepted");
            assert!(output.starts_with("1件の案件が見つかりました"), "{stage}: {output}");
        }
    }

    #[tokio::test]
    async fn registry_rejects_unknown_stage_before_dispatch() {
        let mut registry = ToolRegistry::new();
        registry.register(SearchDealsTool::new(repo().await));
        let call = FunctionCall {
            name: SEARCH_DEALS.to_string(),
            args: match json!({"deal_stage": "closed"}) {
                Value::Object(map) => map,
                _ => Map::new(),
            },
        };

        let result = registry.execute(&call).await;

        assert!(matches!(
            result,
            Err(ToolError::InvalidArguments { ref reason, .. }) if reason.contains("negotiation")
        ));
    }

    #[tokio::test]
    async fn missing_amount_renders_as_none() {
        let tool = SearchDealsTool::new(repo().await);
        let output = tool.execute(args(json!({"deal_stage": "提案"}))).await.expect("execute");
        assert!(output.contains("  金額: なし\n"));
    }

    #[tokio::test]
    async fn empty_result_is_reported_in_text() {
        let tool = SearchDealsTool::new(repo().await);
        let output = tool.execute(args(json!({"deal_stage": "受注"}))).await.expect("execute");
        assert_eq!(output, "該当する案件が見つかりませんでした。");
    }

    #[tokio::test]
    async fn unknown_stage_is_invalid_arguments() {
        let tool = SearchDealsTool::new(repo().await);
        let result = tool.execute(args(json!({"deal_stage": "保留"}))).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments { .. })));
    }

    #[tokio::test]
    async fn details_include_contact_date_and_notes() {
        let tool = GetDealDetailsTool::new(repo().await);
        let output = tool.execute(args(json!({"deal_id": "3"}))).await.expect("execute");

        assert_eq!(
            output,
            "案件詳細:\n- 案件ID: 3\n- 顧客: 顧客3\n- 営業担当: 山田太郎\n- ステージ: 商談\n- 金額: 8,000,000円\n- サービス種別: 技術人材派遣\n- 最終接触日: 2024-10-15\n- メモ: なし"
        );
    }

    #[tokio::test]
    async fn unknown_deal_is_reported_in_text_on_every_lookup() {
        let tool = GetDealDetailsTool::new(repo().await);

        let first = tool.execute(args(json!({"deal_id": "999"}))).await.expect("execute");
        let second = tool.execute(args(json!({"deal_id": "999"}))).await.expect("execute");

        assert_eq!(first, "案件ID 999 は見つかりませんでした。");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn repeated_detail_lookups_are_identical() {
        let tool = GetDealDetailsTool::new(repo().await);

        let first = tool.execute(args(json!({"deal_id": "1"}))).await.expect("execute");
        let second = tool.execute(args(json!({"deal_id": "1"}))).await.expect("execute");

        assert_eq!(first, second);
    }
}
