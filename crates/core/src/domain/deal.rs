use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::customer::CustomerId;
use crate::domain::user::UserId;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DealId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DealStage {
    Prospect,
    Proposal,
    Negotiation,
    Won,
    Lost,
}

/// A sales opportunity. `customer_name` and `sales_user_name` are denormalised
/// at write time so read paths never join.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub deal_id: DealId,
    pub customer_id: CustomerId,
    pub customer_name: Option<String>,
    pub sales_user_id: UserId,
    pub sales_user_name: Option<String>,
    pub deal_stage: DealStage,
    /// Whole yen.
    pub deal_amount: Option<i64>,
    pub service_type: Option<String>,
    pub last_contact_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Conjunctive filter over deals; `None` fields match everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DealFilter {
    pub sales_user_id: Option<UserId>,
    pub customer_id: Option<CustomerId>,
    pub deal_stage: Option<DealStage>,
    pub service_type: Option<String>,
}

impl DealId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DealId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl DealStage {
    pub const ALL: [DealStage; 5] =
        [Self::Prospect, Self::Proposal, Self::Negotiation, Self::Won, Self::Lost];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prospect => "prospect",
            Self::Proposal => "proposal",
            Self::Negotiation => "negotiation",
            Self::Won => "won",
            Self::Lost => "lost",
        }
    }

    /// Label shown to sales staff and used in formatted tool output.
    pub fn label(self) -> &'static str {
        match self {
            Self::Prospect => "見込み",
            Self::Proposal => "提案",
            Self::Negotiation => "商談",
            Self::Won => "受注",
            Self::Lost => "失注",
        }
    }

    /// Every spelling `from_str` accepts verbatim: wire names, then labels.
    pub fn accepted_values() -> Vec<&'static str> {
        Self::ALL
            .iter()
            .map(|stage| stage.as_str())
            .chain(Self::ALL.iter().map(|stage| stage.label()))
            .collect()
    }
}

impl std::fmt::Display for DealStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for DealStage {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        Self::ALL
            .into_iter()
            .find(|stage| {
                stage.label() == trimmed || stage.as_str().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| DomainError::UnknownDealStage(trimmed.to_string()))
    }
}

impl DealFilter {
    pub fn is_empty(&self) -> bool {
        self.sales_user_id.is_none()
            && self.customer_id.is_none()
            && self.deal_stage.is_none()
            && self.service_type.is_none()
    }

    pub fn matches(&self, deal: &Deal) -> bool {
        self.sales_user_id.as_ref().map_or(true, |id| &deal.sales_user_id == id)
            && self.customer_id.as_ref().map_or(true, |id| &deal.customer_id == id)
            && self.deal_stage.map_or(true, |stage| deal.deal_stage == stage)
            && self
                .service_type
                .as_deref()
                .map_or(true, |service| deal.service_type.as_deref() == Some(service))
    }
}
