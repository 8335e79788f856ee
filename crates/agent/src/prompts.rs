//! Prompt text sent to the model.

use dealdesk_core::domain::deal::Deal;
use dealdesk_core::domain::user::UserId;

use crate::tools::group_thousands;

pub const SALES_ASSISTANT_INSTRUCTION: &str = r#"あなたは営業支援AIアシスタントです。
営業担当者の案件管理、顧客情報検索、最新ニュース収集をサポートします。

利用可能なツール:
- get_user_info: ユーザー情報を取得
- search_customers: 顧客を検索
- get_customer_details: 顧客詳細を取得
- search_deals: 案件を検索
- get_deal_details: 案件詳細を取得
- search_latest_news: 最新ニュースを検索

ツール使用時のガイドライン:
1. search_dealsのdeal_stageパラメータ:
   - ユーザーが特定のステージを指定していない場合は、パラメータを省略して全件検索する
   - 「私の案件」「担当案件」などの質問では、deal_stageを指定せずにsales_user_idのみで検索する
   - ステージの指定がある場合のみdeal_stageを使用する（例：「商談中の案件」「失注した案件」）

2. search_customersのkeywordパラメータ:
   - ユーザーが明示的にキーワードを指定していない場合は、パラメータを省略して全件検索する
   - 「顧客一覧」「全ての顧客」などの質問では、keywordを省略する

3. ユーザーに追加情報を聞き返すのは、必須パラメータが不明な場合のみにする
   - オプションパラメータが不明な場合は、省略して実行する
   - 不要な確認質問は避け、すぐにツールを実行する

回答時のガイドライン:
1. 必要なツールを適切に使用して情報を収集する
2. 簡潔で分かりやすい回答を心がける
3. Markdown形式で構造化された回答を返す
4. 数値やデータは正確に伝える
5. ユーザーの質問に直接答える
6. 「私」という一人称を使ってユーザーに話しかける場合、ユーザー自身の情報を指す
"#;

pub const NO_DEALS_CONTEXT: &str = "現在、あなたの担当案件はありません。";
pub const CONTEXT_UNAVAILABLE: &str = "データ取得中にエラーが発生しました。";

/// First user turn of every agent run; carries the caller's id so the model can
/// scope `search_deals` without asking.
pub fn opening_turn(user_id: &UserId, query: &str) -> String {
    format!("現在のユーザーID: {user_id}\n\nユーザーからの質問: {query}")
}

pub fn deal_context(deals: &[Deal]) -> String {
    if deals.is_empty() {
        return NO_DEALS_CONTEXT.to_string();
    }

    let mut blocks = vec!["【あなたの担当案件】".to_string()];
    for deal in deals {
        let amount = deal
            .deal_amount
            .map(|amount| format!("¥{}", group_thousands(amount)))
            .unwrap_or_else(|| "未設定".to_string());
        let last_contact = deal
            .last_contact_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "未記録".to_string());

        blocks.push(format!(
            "\n- 顧客: {}\n  案件ID: {}\n  ステージ: {}\n  サービス種別: {}\n  金額: {}\n  最終接触日: {}\n  メモ: {}",
            deal.customer_name.as_deref().unwrap_or("不明"),
            deal.deal_id,
            deal.deal_stage.label(),
            deal.service_type.as_deref().unwrap_or("未設定"),
            amount,
            last_contact,
            deal.notes.as_deref().unwrap_or("なし"),
        ));
    }
    blocks.join("\n")
}

pub fn copilot_prompt(context: &str, query: &str) -> String {
    format!(
        r#"あなたは営業支援AIアシスタントです。
以下のデータを参考に、ユーザーの質問に日本語で丁寧に回答してください。

{context}

【質問】
{query}

【回答のガイドライン】
- 上記のデータに基づいて具体的に回答してください
- データにない情報を推測で補わないでください
- 営業活動に役立つ実用的なアドバイスを提供してください

【出力形式】
回答は必ずMarkdown形式で出力してください。
- セクションごとに見出し（## または ###）を必ず付けてください
- 箇条書きは - を使用してください
- 重要な語句は **太字** で強調してください
- 企業名や案件情報は必ず見出しで区切ってください
- セクション間には水平線（---）を入れて区切りを明確にしてください

例:
## 担当案件一覧

---

### KDDI株式会社
- 案件ID: 1
- **ステージ**: 商談

---

### ソフトバンク株式会社
- 案件ID: 2
- **ステージ**: 提案
"#
    )
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use dealdesk_core::domain::customer::CustomerId;
    use dealdesk_core::domain::deal::{Deal, DealId, DealStage};
    use dealdesk_core::domain::user::UserId;

    use super::{copilot_prompt, deal_context, opening_turn, NO_DEALS_CONTEXT};

    #[test]
    fn opening_turn_carries_user_id() {
        assert_eq!(
            opening_turn(&UserId("2".to_string()), "私の担当案件は？"),
            "現在のユーザーID: 2\n\nユーザーからの質問: 私の担当案件は？"
        );
    }

    #[test]
    fn deal_context_formats_each_deal() {
        let deals = vec![Deal {
            deal_id: DealId("1".to_string()),
            customer_id: CustomerId("1".to_string()),
            customer_name: Some("KDDI株式会社".to_string()),
            sales_user_id: UserId("1".to_string()),
            sales_user_name: None,
            deal_stage: DealStage::Negotiation,
            deal_amount: Some(50_000_000),
            service_type: None,
            last_contact_date: NaiveDate::from_ymd_opt(2024, 10, 15),
            notes: None,
        }];

        assert_eq!(
            deal_context(&deals),
            "【あなたの担当案件】\n\n- 顧客: KDDI株式会社\n  案件ID: 1\n  ステージ: 商談\n  サービス種別: 未設定\n  金額: ¥50,000,000\n  最終接触日: 2024-10-15\n  メモ: なし"
        );
    }

    #[test]
    fn empty_deal_list_has_dedicated_context() {
        assert_eq!(deal_context(&[]), NO_DEALS_CONTEXT);
    }

    #[test]
    fn copilot_prompt_embeds_context_and_query() {
        let prompt = copilot_prompt("【あなたの担当案件】", "次にやるべきことは？");
        assert!(prompt.contains("\n\n【あなたの担当案件】\n\n【質問】\n次にやるべきことは？\n\n【回答のガイドライン】"));
        assert!(prompt.ends_with("- **ステージ**: 提案\n"));
    }
}
