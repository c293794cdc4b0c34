//! Unit tests for domain models: coordinates, requester ids, and the
//! watershed report rendering.

use watershed_relay::models::watershed::{OUTSIDE_DATASET_MESSAGE, REPORT_HEADING};
use watershed_relay::models::{Coordinate, HucLevel, RequesterId, WatershedStack};
use watershed_relay::AppError;

fn level(name: &str) -> Option<HucLevel> {
    Some(HucLevel {
        name: name.to_owned(),
    })
}

// ── Coordinate ──────────────────────────────────────────────────────────────

#[test]
fn coordinate_accepts_range_bounds() {
    assert!(Coordinate::new(180.0, 90.0).is_ok());
    assert!(Coordinate::new(-180.0, -90.0).is_ok());
}

#[test]
fn coordinate_rejects_out_of_range_and_non_finite() {
    assert!(matches!(
        Coordinate::new(180.5, 0.0),
        Err(AppError::Protocol(_))
    ));
    assert!(matches!(
        Coordinate::new(0.0, -90.1),
        Err(AppError::Protocol(_))
    ));
    assert!(Coordinate::new(f64::NAN, 0.0).is_err());
    assert!(Coordinate::new(0.0, f64::INFINITY).is_err());
}

#[test]
fn coordinate_renders_key_and_wkt_lon_first() {
    let point = Coordinate::new(-122.5, 47.25).expect("valid");
    assert_eq!(point.canonical_key(), "-122.5,47.25");
    assert_eq!(point.to_wkt(), "POINT(-122.5 47.25)");
    assert_eq!(point.to_string(), "(-122.5, 47.25)");
}

#[test]
fn canonical_key_survives_json_round_trip() {
    let point = Coordinate::new(-121.987_654_321, 46.000_000_1).expect("valid");
    let json = serde_json::to_string(&point).expect("serialize");
    let back: Coordinate = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back.canonical_key(), point.canonical_key());
}

// ── RequesterId ─────────────────────────────────────────────────────────────

#[test]
fn requester_id_accepts_string_and_integer_json() {
    let text: RequesterId = serde_json::from_str(r#""D024BE91L""#).expect("string");
    assert_eq!(text.as_str(), "D024BE91L");

    let number: RequesterId = serde_json::from_str("-1001234").expect("integer");
    assert_eq!(number.as_str(), "-1001234");
}

#[test]
fn requester_id_serializes_as_plain_string() {
    let json = serde_json::to_string(&RequesterId::new("C1")).expect("serialize");
    assert_eq!(json, r#""C1""#);
}

// ── WatershedStack ──────────────────────────────────────────────────────────

#[test]
fn report_lists_present_levels_in_a_code_block() {
    let stack = WatershedStack {
        huc2: level("Pacific Northwest Region"),
        huc4: level("Puget Sound"),
        huc12: level("Thornton Creek"),
        ..WatershedStack::default()
    };

    assert_eq!(
        stack.render_report(),
        format!(
            "{REPORT_HEADING}\n```\nLevel  2: Pacific Northwest Region\nLevel  4: Puget Sound\nLevel 12: Thornton Creek\n```"
        )
    );
}

#[test]
fn report_for_point_outside_dataset_is_fixed_message() {
    let stack = WatershedStack {
        huc2: level("ignored"),
        point_not_in_dataset: true,
        ..WatershedStack::default()
    };
    assert_eq!(stack.render_report(), OUTSIDE_DATASET_MESSAGE);
}

#[test]
fn levels_skip_absent_entries_in_order() {
    let stack = WatershedStack {
        huc16: level("Sixteen"),
        huc6: level("Basin"),
        ..WatershedStack::default()
    };
    let digits: Vec<u8> = stack.levels().map(|(digits, _)| digits).collect();
    assert_eq!(digits, vec![6, 16]);
}

#[test]
fn stack_deserializes_worker_field_names() {
    let stack: WatershedStack = serde_json::from_str(
        r#"{"huc8":{"name":"Lake Washington"},"pointNotInDataset":false,"extra":1}"#,
    )
    .expect("deserialize");
    assert_eq!(stack.huc8, level("Lake Washington"));
    assert!(stack.huc2.is_none());
}
