pub mod app;
pub mod calendar;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod cube;
pub mod duration;
pub mod notify;
pub mod poll;
pub mod report;
pub mod schedule;
pub mod watchlist;
