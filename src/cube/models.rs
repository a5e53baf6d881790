//! Wire types for the cube endpoints and the one step that turns a decoded
//! body into either data or an error envelope.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::error::CubeError;

/// `category` of a rebalance the cube owner made by hand.
pub const USER_REBALANCING: &str = "user_rebalancing";

/// `category` of a rebalance the service made (dividends, splits, delistings).
pub const SYS_REBALANCING: &str = "sys_rebalancing";

pub const STATUS_SUCCESS: &str = "success";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Health of a cube as observed on the all-daily-data endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CubeStatus {
    Active,
    InvalidFormat,
    NotFound,
    Closed,
    UnknownError,
}

impl CubeStatus {
    pub fn is_active(self) -> bool {
        self == CubeStatus::Active
    }
}

impl fmt::Display for CubeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CubeStatus::Active => "active",
            CubeStatus::InvalidFormat => "invalid id format",
            CubeStatus::NotFound => "does not exist",
            CubeStatus::Closed => "closed",
            CubeStatus::UnknownError => "unknown error",
        };
        f.write_str(label)
    }
}

/// One point of a cube's net-value history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyValue {
    pub date: NaiveDate,
    pub value: f64,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub time: Option<i64>,
}

/// One element of the all-daily-data array. The first element is the cube;
/// later ones (when present) are benchmark indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavSeries {
    #[serde(default, deserialize_with = "null_as_default")]
    pub symbol: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub list: Vec<DailyValue>,
}

/// Identity and valuation of a cube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicInfo {
    pub name: String,
    pub created_on: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Buy => f.write_str("buy"),
            Direction::Sell => f.write_str("sell"),
        }
    }
}

/// A single holding change inside a rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLeg {
    #[serde(default, deserialize_with = "null_as_default")]
    pub stock_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stock_symbol: String,
    /// Weight before the trade, in percent. Absent for a new position.
    #[serde(default)]
    pub prev_weight: Option<f64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub target_weight: f64,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl TradeLeg {
    pub fn prev_weight_or_zero(&self) -> f64 {
        self.prev_weight.unwrap_or(0.0)
    }

    pub fn direction(&self) -> Direction {
        if self.target_weight > self.prev_weight_or_zero() {
            Direction::Buy
        } else {
            Direction::Sell
        }
    }
}

/// One entry of the rebalancing history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalancingEvent {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    /// Unix timestamp in milliseconds.
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(
        default,
        rename = "rebalancing_histories",
        deserialize_with = "null_as_default"
    )]
    pub legs: Vec<TradeLeg>,
}

impl RebalancingEvent {
    /// True for rebalances the owner made that went through.
    pub fn is_successful_user_rebalance(&self) -> bool {
        self.category == USER_REBALANCING && self.status == STATUS_SUCCESS
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RebalanceHistoryPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default, rename = "totalCount")]
    pub total_count: Option<u64>,
    /// Raw records; see [`RebalanceHistoryPage::into_events`].
    #[serde(default, deserialize_with = "null_as_default")]
    pub list: Vec<Value>,
}

impl RebalanceHistoryPage {
    /// Decode each record on its own. Records that do not decode are logged
    /// and dropped so the rest of the page stays usable.
    pub fn into_events(self) -> Vec<RebalancingEvent> {
        self.list
            .into_iter()
            .enumerate()
            .filter_map(|(index, record)| match serde_json::from_value(record) {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(index, error = %e, "skipping undecodable rebalancing record");
                    None
                }
            })
            .collect()
    }
}

/// Object the service returns instead of data when a request is refused.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ErrorEnvelope {
    pub error_code: Option<i64>,
    pub description: Option<String>,
}

impl ErrorEnvelope {
    /// Code for "this cube does not exist".
    pub const CUBE_NOT_FOUND: i64 = 20809;

    fn from_object(object: &Map<String, Value>) -> Self {
        // Seen as both `20809` and `"20809"`.
        let error_code = object.get("error_code").and_then(|code| match code {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        });
        let description = object
            .get("error_description")
            .and_then(Value::as_str)
            .map(str::to_string);

        Self {
            error_code,
            description,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.error_code == Some(Self::CUBE_NOT_FOUND)
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.error_code, &self.description) {
            (Some(code), Some(desc)) => write!(f, "error {code}: {desc}"),
            (Some(code), None) => write!(f, "error {code}"),
            (None, Some(desc)) => f.write_str(desc),
            (None, None) => f.write_str("unrecognized error response"),
        }
    }
}

/// A decoded response, classified once right after decoding.
#[derive(Debug, Clone)]
pub enum RemoteReply<T> {
    ErrorEnvelope(ErrorEnvelope),
    Data(T),
}

/// All-daily-data answers with an array on success and an object on failure.
pub fn classify_nav(value: Value) -> Result<RemoteReply<Vec<NavSeries>>, CubeError> {
    match value {
        Value::Array(items) => serde_json::from_value(Value::Array(items))
            .map(RemoteReply::Data)
            .map_err(|e| CubeError::UnexpectedShape {
                endpoint: "nav_daily",
                detail: e.to_string(),
            }),
        Value::Object(object) => Ok(RemoteReply::ErrorEnvelope(ErrorEnvelope::from_object(
            &object,
        ))),
        other => Err(CubeError::UnexpectedShape {
            endpoint: "nav_daily",
            detail: format!("expected array or object, got {}", json_kind(&other)),
        }),
    }
}

/// Rebalancing history answers with an object either way; only a successful
/// page carries `list`.
pub fn classify_history(value: Value) -> Result<RemoteReply<RebalanceHistoryPage>, CubeError> {
    match value {
        Value::Object(object) if object.contains_key("list") => {
            serde_json::from_value(Value::Object(object))
                .map(RemoteReply::Data)
                .map_err(|e| CubeError::UnexpectedShape {
                    endpoint: "rebalancing_history",
                    detail: e.to_string(),
                })
        }
        Value::Object(object) => Ok(RemoteReply::ErrorEnvelope(ErrorEnvelope::from_object(
            &object,
        ))),
        other => Err(CubeError::UnexpectedShape {
            endpoint: "rebalancing_history",
            detail: format!("expected object, got {}", json_kind(&other)),
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
