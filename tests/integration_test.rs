//! End-to-end tests: CSV source -> pipeline -> crossover detection -> SQLite -> JSON

use chrono::{Duration, NaiveDate};
use rust_decimal_macros::dec;
use std::io::Write;
use ticker_metrics::prelude::*;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Business days starting at `start`, skipping weekends
fn business_days(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    use chrono::{Datelike, Weekday};
    let mut dates = Vec::with_capacity(count);
    let mut day = start;
    while dates.len() < count {
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(day);
        }
        day += Duration::days(1);
    }
    dates
}

/// 150 falling bars, then 150 rising bars, with two reported quarters
fn v_shaped_bundle() -> RawBundle {
    let dates = business_days(d(2023, 1, 2), 300);
    let prices = dates
        .iter()
        .enumerate()
        .map(|(i, &date)| {
            let close = if i < 150 {
                300.0 - i as f64
            } else {
                150.0 + 2.0 * (i as f64 - 150.0)
            };
            PriceRow::new(date, close).unwrap()
        })
        .collect();

    let fundamentals = vec![
        FundamentalsQuarter::new(d(2023, 3, 31))
            .with_book_value(dec!(10000))
            .with_shares_out(dec!(100))
            .with_total_debt(dec!(500))
            .with_cash(dec!(200)),
        FundamentalsQuarter::new(d(2023, 6, 30))
            .with_book_value(dec!(12000))
            .with_shares_out(dec!(100)),
    ];

    RawBundle::new("TEST", prices, fundamentals)
}

#[test]
fn test_strictly_rising_series() {
    let dates = business_days(d(2024, 1, 1), 260);
    let prices = dates
        .iter()
        .enumerate()
        .map(|(i, &date)| PriceRow::new(date, 100.0 + i as f64).unwrap())
        .collect();
    let bundle = RawBundle::new("TEST", prices, vec![]);

    let output = process_bundle(&bundle, &PipelineConfig::default()).unwrap();
    assert_eq!(output.rows.len(), 260);

    assert!(output.rows[48].sma50.is_none());
    assert!(output.rows[49].sma50.is_some());
    assert!(output.rows[198].sma200.is_none());
    assert!(output.rows[199].sma200.is_some());
    assert!(output.rows[250].high_52w.is_none());
    assert!(output.rows[251].high_52w.is_some());

    let last = output.rows.last().unwrap();
    assert_eq!(last.is_52w_high, Some(true));
    assert_eq!(last.pct_from_52w_high, Some(0.0));

    // Rising series: fast average is always above once both exist, so no events
    let (events, contexts) = detect_crossovers("TEST", &output.rows);
    assert!(events.is_empty());
    assert!(contexts.is_empty());
}

#[test]
fn test_fundamentals_flow_into_ratios() {
    let bundle = v_shaped_bundle();
    let output = process_bundle(&bundle, &PipelineConfig::default()).unwrap();

    let before_first_quarter = output.rows.iter().find(|r| r.date == d(2023, 3, 30)).unwrap();
    assert_eq!(before_first_quarter.bvps, None);
    assert_eq!(before_first_quarter.ev, None);

    let q1 = output.rows.iter().find(|r| r.date == d(2023, 5, 15)).unwrap();
    assert_eq!(q1.bvps, Some(100.0));
    assert_eq!(q1.pb, Some(q1.close / 100.0));
    assert_eq!(q1.ev, Some(q1.close * 100.0 + 500.0 - 200.0));

    // Second quarter reports no debt or cash: the earlier values carry forward
    let q2 = output.rows.iter().find(|r| r.date == d(2023, 8, 1)).unwrap();
    assert_eq!(q2.bvps, Some(120.0));
    assert_eq!(q2.ev, Some(q2.close * 100.0 + 500.0 - 200.0));
}

#[test]
fn test_golden_cross_after_bottom() {
    let config = PipelineConfig::new(100).unwrap();
    let bundle = v_shaped_bundle();
    let output = process_bundle(&bundle, &config).unwrap();

    let (events, contexts) = detect_crossovers(&bundle.ticker, &output.rows);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, SignalType::GoldenCross);
    assert_eq!(contexts.len(), 1);

    let ctx = &contexts[0];
    assert!(ctx.sma50_prev < ctx.sma200_prev);
    assert!(ctx.sma50_cur >= ctx.sma200_cur);
    assert_eq!(ctx.date, events[0].date);

    let row = output.rows.iter().find(|r| r.date == ctx.date).unwrap();
    assert_eq!(row.sma50, Some(ctx.sma50_cur));
    assert_eq!(row.sma200, Some(ctx.sma200_cur));
}

#[test]
fn test_short_history_is_informational() {
    let bundle = v_shaped_bundle();
    let config = PipelineConfig::new(500).unwrap();
    let output = process_bundle(&bundle, &config).unwrap();

    assert!(output.is_short_history(&config));
    assert_eq!(output.rows.len(), 300);
    assert!(output.rows.iter().all(|r| r.sma200.is_none()));
}

#[test]
fn test_empty_bundle() {
    let output = process_bundle(&RawBundle::new("TEST", vec![], vec![]), &PipelineConfig::default()).unwrap();
    assert!(output.metrics.is_empty());
    assert!(output.rows.is_empty());
    let (events, _) = detect_crossovers("TEST", &output.rows);
    assert!(events.is_empty());
}

#[test]
#[cfg(feature = "rusqlite-support")]
fn test_csv_to_store_and_export() {
    let dir = tempfile::tempdir().unwrap();
    let prices_path = dir.path().join("prices.csv");
    let funds_path = dir.path().join("fundamentals.csv");

    let bundle = v_shaped_bundle();
    let mut f = std::fs::File::create(&prices_path).unwrap();
    writeln!(f, "date,close").unwrap();
    for row in &bundle.prices {
        writeln!(f, "{},{}", row.date, row.close).unwrap();
    }
    let mut f = std::fs::File::create(&funds_path).unwrap();
    writeln!(f, "period_end,total_debt,cash,shares_out,book_value").unwrap();
    writeln!(f, "2023-03-31,500,200,100,10000").unwrap();

    let source = CsvSource::new(&prices_path).with_fundamentals(&funds_path);
    let fetched = fetch_raw_bundle(&source, "TEST", HistoryPeriod::Max, &RetryPolicy::default()).unwrap();
    assert_eq!(fetched.prices.len(), 300);
    assert_eq!(fetched.fundamentals_q.len(), 1);

    let config = PipelineConfig::new(100).unwrap();
    let output = process_bundle(&fetched, &config).unwrap();
    let (events, contexts) = detect_crossovers(&fetched.ticker, &output.rows);

    let db_path = dir.path().join("data").join("app.db");
    let mut store = MetricsStore::open(&db_path).unwrap();
    store.upsert_ticker("TEST").unwrap();
    store.upsert_daily("TEST", &output.metrics).unwrap();
    store.upsert_signals("TEST", &events).unwrap();

    // Re-running the same data is idempotent
    store.upsert_daily("TEST", &output.metrics).unwrap();
    store.upsert_signals("TEST", &events).unwrap();
    assert_eq!(store.count_daily("TEST").unwrap(), 300);
    assert_eq!(store.count_signals("TEST").unwrap(), events.len());
    assert_eq!(store.load_signals("TEST").unwrap(), events);
    assert_eq!(store.load_daily("TEST").unwrap(), output.rows);

    let payload = ExportPayload {
        ticker: "TEST".to_string(),
        generated_at: chrono::Utc::now(),
        metrics: output.rows.clone(),
        signals: events.clone(),
        notes: ExportNotes {
            rows: output.len(),
            min_sma_days: config.long_window,
            data_source: source.name().to_string(),
            short_history: output.is_short_history(&config),
            event_contexts: contexts,
        },
    };
    let out_path = dir.path().join("out").join("TEST.json");
    payload.write_json(&out_path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out_path).unwrap()).unwrap();
    assert_eq!(json["metrics"].as_array().unwrap().len(), 300);
    assert_eq!(json["metrics"][0]["date"], "2023-01-02");
    assert!(json["metrics"][0]["sma50"].is_null());
    assert_eq!(json["notes"]["short_history"], false);
    assert_eq!(
        json["signals"].as_array().unwrap().len(),
        json["notes"]["event_contexts"].as_array().unwrap().len()
    );
}
