//! Plain-text report of a poll cycle.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::calendar::CalendarZone;
use crate::cube::{RebalancingEvent, StatusReport, TradeLeg};
use crate::poll::{CubeOutcome, CubeSnapshot, CycleReport};

const INDENT: &str = "    ";

/// A rendered report ready for delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub subject: String,
    pub lines: Vec<String>,
}

impl Report {
    pub fn body(&self) -> String {
        self.lines.join("\n")
    }
}

/// Holdings traded by more than one portfolio, mapped to those portfolios.
///
/// Each portfolio is counted once per holding however many times it lists it.
pub fn shared_holdings<P, H>(portfolios: P) -> BTreeMap<String, Vec<String>>
where
    P: IntoIterator<Item = (String, H)>,
    H: IntoIterator<Item = String>,
{
    let mut by_holding: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for (portfolio, holdings) in portfolios {
        for holding in holdings {
            by_holding.entry(holding).or_default().insert(portfolio.clone());
        }
    }

    by_holding
        .into_iter()
        .filter(|(_, portfolios)| portfolios.len() > 1)
        .map(|(holding, portfolios)| (holding, portfolios.into_iter().collect()))
        .collect()
}

fn holding_label(leg: &TradeLeg) -> String {
    match (leg.stock_name.is_empty(), leg.stock_symbol.is_empty()) {
        (false, false) => format!("{} ({})", leg.stock_name, leg.stock_symbol),
        (false, true) => leg.stock_name.clone(),
        (true, false) => leg.stock_symbol.clone(),
        (true, true) => "unknown holding".to_string(),
    }
}

fn format_price(price: Option<f64>) -> String {
    price.map_or_else(|| "n/a".to_string(), |p| format!("{p}"))
}

/// One line per holding change.
pub fn format_leg(leg: &TradeLeg, event: &RebalancingEvent, zone: &CalendarZone) -> String {
    let time = match leg.updated_at.or(event.updated_at) {
        Some(at) => zone
            .naive_of_millis(at)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| at.to_string()),
        None => "n/a".to_string(),
    };

    format!(
        "[*] {} | {} | {:.2}% -> {:.2}% | price: {} | time: {}",
        holding_label(leg),
        leg.direction(),
        leg.prev_weight_or_zero(),
        leg.target_weight,
        format_price(leg.price),
        time,
    )
}

fn describe_skip(status: &StatusReport) -> String {
    let mut text = status.status.to_string();
    if let (Some(last), Some(days)) = (status.last_valuation, status.days_since) {
        text.push_str(&format!(" (last valuation {last}, {days} days ago)"));
    }
    text
}

fn snapshot_lines(snapshot: &CubeSnapshot, zone: &CalendarZone, lines: &mut Vec<String>) {
    lines.push(format!("{INDENT}current value: {}", snapshot.current_value));
    lines.push(format!("{INDENT}created on: {}", snapshot.created_on));

    if let Some(status) = snapshot.status.as_ref().filter(|s| s.needs_review) {
        lines.push(format!(
            "{INDENT}[!] last valuation {} days ago; close to the closed threshold",
            status.days_since.unwrap_or_default()
        ));
    }

    if let Some(error) = &snapshot.events_error {
        lines.push(format!("{INDENT}[?] could not read rebalancing history: {error}"));
        return;
    }

    let legs: Vec<String> = snapshot
        .events
        .iter()
        .flat_map(|event| event.legs.iter().map(move |leg| format_leg(leg, event, zone)))
        .collect();

    if legs.is_empty() && snapshot.events.is_empty() {
        lines.push(format!("{INDENT}[-] no rebalancing on this day"));
    } else if legs.is_empty() {
        lines.push(format!(
            "{INDENT}[*] {} rebalance(s) without holding details",
            snapshot.events.len()
        ));
    } else {
        lines.extend(legs.into_iter().map(|line| format!("{INDENT}{line}")));
    }
}

/// Render a cycle as report lines.
pub fn render(cycle: &CycleReport, zone: &CalendarZone) -> Report {
    let subject = format!("Cube activity report - {}", cycle.date);
    let mut lines = vec![format!("Rebalancing activity for {}", cycle.date)];

    let (mut reported, mut skipped) = (0usize, 0usize);
    for result in &cycle.results {
        match &result.outcome {
            CubeOutcome::Reported(snapshot) => {
                reported += 1;
                lines.push(format!(">>> {} {}", result.cube_id, snapshot.name));
                snapshot_lines(snapshot, zone, &mut lines);
            }
            CubeOutcome::Skipped { status } => {
                skipped += 1;
                lines.push(format!(
                    ">>> {} skipped: {}",
                    result.cube_id,
                    describe_skip(status)
                ));
            }
            CubeOutcome::Failed { error } => {
                lines.push(format!(">>> {} failed: {error}", result.cube_id));
            }
        }
    }

    let shared = shared_holdings(cycle.reported().map(|(_, snapshot)| {
        let holdings: Vec<String> = snapshot
            .events
            .iter()
            .flat_map(|event| event.legs.iter().map(holding_label))
            .collect();
        (snapshot.name.clone(), holdings)
    }));
    if !shared.is_empty() {
        lines.push("Traded by more than one cube:".to_string());
        for (holding, portfolios) in &shared {
            lines.push(format!("{INDENT}{holding}: {}", portfolios.join(", ")));
        }
    }

    if cycle.stopped {
        lines.push("Stopped on request before all cubes were read.".to_string());
    }
    lines.push(format!(
        "Summary: {} cubes, {reported} reported, {skipped} skipped, {} failed",
        cycle.results.len(),
        cycle.failed_count()
    ));

    Report { subject, lines }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cube::{CubeId, CubeStatus};
    use crate::poll::CubeResult;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn leg(name: &str, symbol: &str, prev: Option<f64>, target: f64) -> TradeLeg {
        TradeLeg {
            stock_name: name.to_string(),
            stock_symbol: symbol.to_string(),
            prev_weight: prev,
            target_weight: target,
            price: Some(12.5),
            updated_at: None,
        }
    }

    fn snapshot(name: &str, legs: Vec<TradeLeg>, at: i64) -> CubeSnapshot {
        let events = if legs.is_empty() {
            Vec::new()
        } else {
            vec![RebalancingEvent {
                id: Some(1),
                category: "user_rebalancing".to_string(),
                status: "success".to_string(),
                updated_at: Some(at),
                legs,
            }]
        };
        CubeSnapshot {
            status: None,
            name: name.to_string(),
            created_on: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            current_value: 1.23,
            events,
            events_error: None,
        }
    }

    #[test]
    fn shared_holdings_keeps_multi_portfolio_entries() {
        let shared = shared_holdings(vec![
            ("A".to_string(), vec!["X".to_string(), "Y".to_string(), "X".to_string()]),
            ("B".to_string(), vec!["X".to_string()]),
            ("C".to_string(), vec!["Z".to_string()]),
        ]);
        assert_eq!(shared.len(), 1);
        assert_eq!(shared["X"], vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn format_leg_describes_trade() {
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 2, 15, 0).unwrap().timestamp_millis();
        let event = snapshot("A", vec![leg("Moutai", "SH600519", None, 5.0)], at).events[0].clone();
        let line = format_leg(&event.legs[0], &event, &CalendarZone::Utc);
        assert_eq!(
            line,
            "[*] Moutai (SH600519) | buy | 0.00% -> 5.00% | price: 12.5 | time: 2024-06-03 02:15:00"
        );
    }

    #[test]
    fn format_leg_without_any_timestamp() {
        let mut event = snapshot("A", vec![leg("Moutai", "SH600519", Some(5.0), 0.0)], 0).events[0].clone();
        event.updated_at = None;
        let line = format_leg(&event.legs[0], &event, &CalendarZone::Utc);
        assert!(line.ends_with("| sell | 5.00% -> 0.00% | price: 12.5 | time: n/a"), "{line}");
    }

    #[test]
    fn render_covers_every_outcome() {
        let at = Utc.with_ymd_and_hms(2024, 6, 3, 2, 0, 0).unwrap().timestamp_millis();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let cycle = CycleReport {
            date,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            results: vec![
                CubeResult {
                    cube_id: CubeId::new("ZH000001"),
                    outcome: CubeOutcome::Reported(snapshot(
                        "Alpha",
                        vec![leg("Moutai", "SH600519", Some(20.0), 10.0)],
                        at,
                    )),
                },
                CubeResult {
                    cube_id: CubeId::new("ZH000002"),
                    outcome: CubeOutcome::Reported(snapshot(
                        "Beta",
                        vec![leg("Moutai", "SH600519", None, 3.0)],
                        at,
                    )),
                },
                CubeResult {
                    cube_id: CubeId::new("ZH000003"),
                    outcome: CubeOutcome::Reported(snapshot("Gamma", Vec::new(), at)),
                },
                CubeResult {
                    cube_id: CubeId::new("ZH000004"),
                    outcome: CubeOutcome::Skipped {
                        status: StatusReport {
                            status: CubeStatus::Closed,
                            last_valuation: NaiveDate::from_ymd_opt(2024, 5, 1),
                            days_since: Some(33),
                            needs_review: false,
                        },
                    },
                },
                CubeResult {
                    cube_id: CubeId::new("ZH000005"),
                    outcome: CubeOutcome::Failed {
                        error: "boom".to_string(),
                    },
                },
            ],
            stopped: false,
        };

        let report = render(&cycle, &CalendarZone::Utc);
        assert_eq!(report.subject, "Cube activity report - 2024-06-03");

        let body = report.body();
        assert!(body.contains(">>> ZH000001 Alpha"));
        assert!(body.contains("| sell | 20.00% -> 10.00% |"));
        assert!(body.contains("| buy | 0.00% -> 3.00% |"));
        assert!(body.contains("[-] no rebalancing on this day"));
        assert!(body.contains(">>> ZH000004 skipped: closed (last valuation 2024-05-01, 33 days ago)"));
        assert!(body.contains(">>> ZH000005 failed: boom"));
        assert!(body.contains("Moutai (SH600519): Alpha, Beta"));
        assert_eq!(
            report.lines.last().map(String::as_str),
            Some("Summary: 5 cubes, 3 reported, 1 skipped, 1 failed")
        );
    }
}
