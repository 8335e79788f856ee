use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use dealdesk_core::domain::customer::{Customer, CustomerId};
use dealdesk_db::repositories::{CustomerFilter, CustomerRepository, RepositoryError};

use super::{lookup_failed, or_none, ParameterSpec, Tool, ToolArguments, ToolDeclaration, ToolError};

pub const SEARCH_CUSTOMERS: &str = "search_customers";
pub const GET_CUSTOMER_DETAILS: &str = "get_customer_details";

pub struct SearchCustomersTool {
    customers: Arc<dyn CustomerRepository>,
}

pub struct GetCustomerDetailsTool {
    customers: Arc<dyn CustomerRepository>,
}

impl SearchCustomersTool {
    pub fn new(customers: Arc<dyn CustomerRepository>) -> Self {
        Self { customers }
    }

    /// Union of every industry match followed by keyword matches, first
    /// occurrence wins. No criteria lists everything.
    async fn collect(
        &self,
        industries: &[String],
        keyword: Option<String>,
    ) -> Result<Vec<Customer>, RepositoryError> {
        if industries.is_empty() && keyword.is_none() {
            return self.customers.list(&CustomerFilter::default()).await;
        }

        let mut found = Vec::new();
        for industry in industries {
            let filter = CustomerFilter { industry: Some(industry.clone()), keyword: None };
            found.extend(self.customers.list(&filter).await?);
        }
        if let Some(keyword) = keyword {
            let filter = CustomerFilter { industry: None, keyword: Some(keyword) };
            found.extend(self.customers.list(&filter).await?);
        }

        let mut seen = HashSet::new();
        found.retain(|customer| seen.insert(customer.customer_id.clone()));
        Ok(found)
    }
}

#[async_trait]
impl Tool for SearchCustomersTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: SEARCH_CUSTOMERS,
            description: "業界やキーワードで顧客を検索します。複数の条件を指定可能です。",
            parameters: vec![
                ParameterSpec::string_array(
                    "industries",
                    "業界のリスト（例: ['IT', '通信', '製造']）。指定した業界のいずれかに該当する顧客を検索します。",
                ),
                ParameterSpec::string("keyword", "顧客名に含まれるキーワード（部分一致）"),
            ],
        }
    }

    async fn execute(&self, args: ToolArguments) -> Result<String, ToolError> {
        let industries = args.string_list("industries");
        let keyword = args.string("keyword");

        let customers = match self.collect(&industries, keyword).await {
            Ok(customers) => customers,
            Err(error) => return Ok(lookup_failed(SEARCH_CUSTOMERS, error)),
        };
        if customers.is_empty() {
            return Ok("該当する顧客が見つかりませんでした。".to_string());
        }

        let mut output = format!("{}件の顧客が見つかりました:\n\n", customers.len());
        for customer in &customers {
            output.push_str(&format!(
                "- {} (ID: {})\n  業界: {}\n  担当者: {}\n\n",
                customer.name,
                customer.customer_id,
                or_none(customer.industry.as_deref()),
                or_none(customer.contact_person.as_deref()),
            ));
        }
        Ok(output)
    }
}

impl GetCustomerDetailsTool {
    pub fn new(customers: Arc<dyn CustomerRepository>) -> Self {
        Self { customers }
    }
}

#[async_trait]
impl Tool for GetCustomerDetailsTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: GET_CUSTOMER_DETAILS,
            description: "指定された顧客IDの詳細情報を取得します。",
            parameters: vec![ParameterSpec::string("customer_id", "顧客ID").required()],
        }
    }

    async fn execute(&self, args: ToolArguments) -> Result<String, ToolError> {
        let customer_id = args.required_string(GET_CUSTOMER_DETAILS, "customer_id")?;

        match self.customers.find_by_id(&CustomerId(customer_id.clone())).await {
            Ok(Some(customer)) => Ok(format!(
                "顧客詳細:\n- 顧客名: {}\n- 業界: {}\n- 担当者: {}\n- メール: {}\n- 電話番号: {}",
                customer.name,
                or_none(customer.industry.as_deref()),
                or_none(customer.contact_person.as_deref()),
                or_none(customer.email.as_deref()),
                or_none(customer.phone.as_deref()),
            )),
            Ok(None) => Ok(format!("顧客ID {customer_id} は見つかりませんでした。")),
            Err(error) => Ok(lookup_failed(GET_CUSTOMER_DETAILS, error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use dealdesk_core::domain::customer::{Customer, CustomerId};
    use dealdesk_db::repositories::{CustomerRepository, InMemoryCustomerRepository};

    use super::{GetCustomerDetailsTool, SearchCustomersTool};
    use crate::tools::{Tool, ToolArguments};

    fn args(value: Value) -> ToolArguments {
        match value {
            Value::Object(map) => ToolArguments::new(map),
            _ => ToolArguments::new(Map::new()),
        }
    }

    fn customer(id: &str, name: &str, industry: &str) -> Customer {
        Customer {
            customer_id: CustomerId(id.to_string()),
            name: name.to_string(),
            industry: Some(industry.to_string()),
            contact_person: Some("鈴木一郎".to_string()),
            email: None,
            phone: None,
        }
    }

    async fn repo() -> Arc<InMemoryCustomerRepository> {
        let repo = InMemoryCustomerRepository::default();
        for row in [
            customer("1", "KDDI株式会社", "通信"),
            customer("2", "ソフトバンク株式会社", "通信"),
            customer("3", "トヨタ自動車株式会社", "製造"),
        ] {
            repo.upsert(row).await.expect("seed customer");
        }
        Arc::new(repo)
    }

    #[tokio::test]
    async fn industry_and_keyword_results_are_merged_without_duplicates() {
        let tool = SearchCustomersTool::new(repo().await);
        let output = tool
            .execute(args(json!({"industries": ["通信", "製造"], "keyword": "KDDI"})))
            .await
            .expect("execute");

        assert!(output.starts_with("3件の顧客が見つかりました:\n\n"));
        assert_eq!(output.matches("KDDI株式会社").count(), 1);
        let kddi = output.find("KDDI").expect("kddi listed");
        let toyota = output.find("トヨタ").expect("toyota listed");
        assert!(kddi < toyota);
    }

    #[tokio::test]
    async fn no_criteria_lists_every_customer() {
        let tool = SearchCustomersTool::new(repo().await);
        let output = tool.execute(args(json!({}))).await.expect("execute");
        assert!(output.starts_with("3件の顧客が見つかりました"));
        assert!(output.contains("- KDDI株式会社 (ID: 1)\n  業界: 通信\n  担当者: 鈴木一郎\n\n"));
    }

    #[tokio::test]
    async fn no_match_is_reported_in_text() {
        let tool = SearchCustomersTool::new(repo().await);
        let output = tool.execute(args(json!({"keyword": "存在しない"}))).await.expect("execute");
        assert_eq!(output, "該当する顧客が見つかりませんでした。");
    }

    #[tokio::test]
    async fn details_fill_missing_fields_with_none() {
        let tool = GetCustomerDetailsTool::new(repo().await);
        let output = tool.execute(args(json!({"customer_id": "3"}))).await.expect("execute");

        assert_eq!(
            output,
            "顧客詳細:\n- 顧客名: トヨタ自動車株式会社\n- 業界: 製造\n- 担当者: 鈴木一郎\n- メール: なし\n- 電話番号: なし"
        );
    }

    #[tokio::test]
    async fn unknown_customer_is_reported_in_text() {
        let tool = GetCustomerDetailsTool::new(repo().await);
        let output = tool.execute(args(json!({"customer_id": "42"}))).await.expect("execute");
        assert_eq!(output, "顧客ID 42 は見つかりませんでした。");
    }

    #[tokio::test]
    async fn repeated_detail_lookups_are_identical() {
        let tool = GetCustomerDetailsTool::new(repo().await);

        let first = tool.execute(args(json!({"customer_id": "1"}))).await.expect("execute");
        let second = tool.execute(args(json!({"customer_id": "1"}))).await.expect("execute");

        assert_eq!(first, second);
    }
}
