use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Utc};

use crate::llm::{GenerateRequest, GenerativeModel};

use super::{ParameterSpec, Tool, ToolArguments, ToolDeclaration, ToolError};

pub const SEARCH_LATEST_NEWS: &str = "search_latest_news";

const NEWS_TEMPERATURE: f32 = 0.1;

/// Company news through the model's grounded web search.
pub struct SearchLatestNewsTool {
    model: Arc<dyn GenerativeModel>,
}

impl SearchLatestNewsTool {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self { model }
    }
}

pub fn news_query(company_name: &str, keywords: &[String]) -> String {
    let mut query = format!("{company_name} 最新ニュース");
    if !keywords.is_empty() {
        query.push(' ');
        query.push_str(&keywords.join(" "));
    }
    query
}

pub fn news_prompt(company_name: &str, query: &str, year: i32) -> String {
    format!(
        "「{company_name}」の最新ニュース（{year}年）を検索し、実在するニュース記事を3〜5件、以下の形式で教えてください。\n\n\
         検索クエリ: {query}\n\n\
         各ニュースは以下の形式で出力してください:\n\
         1. **タイトル**: [ニュースタイトル]\n   - 日付: YYYY-MM-DD\n   - 概要: [100文字程度の要約]\n   - ソース: [情報源]\n"
    )
}

#[async_trait]
impl Tool for SearchLatestNewsTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: SEARCH_LATEST_NEWS,
            description: "企業の最新ニュースを検索します（Google Search使用）。各企業ごとに1回ずつ呼び出してください。",
            parameters: vec![
                ParameterSpec::string("company_name", "企業名（例: 'KDDI株式会社', 'ソフトバンク'）")
                    .required(),
                ParameterSpec::string_array(
                    "keywords",
                    "追加の検索キーワード（任意。例: ['5G', 'データセンター']）",
                ),
            ],
        }
    }

    async fn execute(&self, args: ToolArguments) -> Result<String, ToolError> {
        let company_name = args.required_string(SEARCH_LATEST_NEWS, "company_name")?;
        let query = news_query(&company_name, &args.string_list("keywords"));

        let mut request = GenerateRequest::prompt(news_prompt(&company_name, &query, Utc::now().year()));
        request.temperature = Some(NEWS_TEMPERATURE);
        request.grounded_search = true;

        match self.model.generate(request).await {
            Ok(response) => match response.text().filter(|text| !text.trim().is_empty()) {
                Some(text) => Ok(format!("{company_name}の最新ニュース:\n\n{text}")),
                None => Ok(format!("{company_name}に関するニュースが見つかりませんでした。")),
            },
            Err(error) => {
                tracing::error!(
                    event_name = "agent.tool.news_failed",
                    company = %company_name,
                    error = %error,
                    "news search failed"
                );
                Ok(format!("ニュース検索中にエラーが発生しました: {error}"))
            }
        }
    }
}
