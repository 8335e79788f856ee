use std::sync::Arc;

use async_trait::async_trait;

use dealdesk_core::domain::user::{User, UserId};
use dealdesk_db::repositories::UserRepository;

use super::{lookup_failed, or_none, ParameterSpec, Tool, ToolArguments, ToolDeclaration, ToolError};

pub const GET_USER_INFO: &str = "get_user_info";

pub struct GetUserInfoTool {
    users: Arc<dyn UserRepository>,
}

impl GetUserInfoTool {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl Tool for GetUserInfoTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: GET_USER_INFO,
            description: "指定されたユーザーIDのユーザー情報（名前、メールアドレス、部署、役職）を取得します。",
            parameters: vec![
                ParameterSpec::string("user_id", "ユーザーID（例: 1, 2, 3）").required()
            ],
        }
    }

    async fn execute(&self, args: ToolArguments) -> Result<String, ToolError> {
        let user_id = args.required_string(GET_USER_INFO, "user_id")?;

        match self.users.find_by_id(&UserId(user_id.clone())).await {
            Ok(Some(user)) => Ok(format_user(&user)),
            Ok(None) => Ok(format!("ユーザーID {user_id} は見つかりませんでした。")),
            Err(error) => Ok(lookup_failed(GET_USER_INFO, error)),
        }
    }
}

fn format_user(user: &User) -> String {
    format!(
        "ユーザー情報:\n- 名前: {}\n- メール: {}\n- 部署: {}\n- 役職: {}",
        user.name,
        user.email,
        or_none(user.department.as_deref()),
        or_none(user.role.as_deref()),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{json, Map, Value};

    use dealdesk_core::domain::user::{User, UserId};
    use dealdesk_db::repositories::{InMemoryUserRepository, UserRepository};

    use super::GetUserInfoTool;
    use crate::tools::{Tool, ToolArguments};

    fn args(value: Value) -> ToolArguments {
        match value {
            Value::Object(map) => ToolArguments::new(map),
            _ => ToolArguments::new(Map::new()),
        }
    }

    async fn tool() -> GetUserInfoTool {
        let repo = InMemoryUserRepository::default();
        repo.upsert(User {
            user_id: UserId("1".to_string()),
            name: "山田太郎".to_string(),
            email: "yamada@example.com".to_string(),
            department: Some("営業部".to_string()),
            role: None,
        })
        .await
        .expect("seed user");
        GetUserInfoTool::new(Arc::new(repo))
    }

    #[tokio::test]
    async fn formats_found_user_with_missing_fields_as_none() {
        let output = tool().await.execute(args(json!({"user_id": "1"}))).await.expect("execute");

        assert_eq!(
            output,
            "ユーザー情報:\n- 名前: 山田太郎\n- メール: yamada@example.com\n- 部署: 営業部\n- 役職: なし"
        );
    }

    #[tokio::test]
    async fn reports_unknown_user_in_text() {
        let output = tool().await.execute(args(json!({"user_id": "99"}))).await.expect("execute");
        assert_eq!(output, "ユーザーID 99 は見つかりませんでした。");
    }
}
