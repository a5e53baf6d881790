//! Client for xueqiu.com portfolios ("cubes").
//!
//! A cube is addressed by its `ZH` symbol. Two endpoints are used:
//!
//! - `cubes/nav_daily/all.json` for the daily net-value series, which also
//!   drives status classification
//! - `cubes/rebalancing/history.json` for the list of rebalances
//!
//! Both need a session cookie from a logged-in browser; see [`XueqiuHttp`].

mod client;
mod error;
mod http;
mod id;
pub mod models;

pub use client::{filter_events_on, ClientContext, CubeClient, StatusReport};
pub use error::CubeError;
pub use http::{
    FetchError, XueqiuHttp, BROWSER_USER_AGENT, DEFAULT_REQUEST_TIMEOUT, XUEQIU_BASE_URL,
};
pub use id::{CubeId, CubeIdError};
pub use models::{
    BasicInfo, CubeStatus, DailyValue, Direction, ErrorEnvelope, NavSeries, RebalancingEvent,
    TradeLeg,
};
