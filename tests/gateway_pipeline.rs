//! End-to-end: raw serial lines through the gateway loop into a file-backed store,
//! read back the way the external viewers do.

use std::io::Cursor;

use chrono::NaiveDateTime;
use meshcom_gateway::frame::processor::{FrameProcessor, TIME_FORMAT};
use meshcom_gateway::gateway::Gateway;
use meshcom_gateway::serial::LineReader;
use meshcom_gateway::storage::SchemaStore;
use rusqlite::Connection;
use tempfile::tempdir;

const CALLSIGN: &str = "IK5XMK-98";

fn run_lines(db: &std::path::Path, input: &str) {
    let store = SchemaStore::open(db).unwrap();
    let reader = LineReader::new(Cursor::new(input.as_bytes().to_vec()));
    let mut gateway = Gateway::new(reader, FrameProcessor::new(store, CALLSIGN));
    gateway.run().unwrap();
}

#[test]
fn noisy_message_line_is_stored_with_local_src_and_arrival_time() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("meshcom.db");

    run_lines(
        &db,
        "noise{\"type\":\"msg\",\"dst\":\"123\",\"msg\":\"hello\",\"time\":\"01/01/1970 00:00:00\"}tail\n",
    );

    let conn = Connection::open(&db).unwrap();
    let (id, src, dst, msg, time): (i64, String, String, String, String) = conn
        .query_row("SELECT id, src, dst, msg, time FROM msg", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?))
        })
        .unwrap();
    assert_eq!(id, 1);
    assert_eq!(src, CALLSIGN);
    assert_eq!(dst, "123");
    assert_eq!(msg, "hello");
    assert_ne!(time, "01/01/1970 00:00:00", "device time must be replaced");
    let stamped = NaiveDateTime::parse_from_str(&time, TIME_FORMAT).unwrap();
    let now = chrono::Local::now().naive_local();
    assert!((now - stamped).num_seconds().abs() < 120);
}

#[test]
fn device_supplied_src_is_kept() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("meshcom.db");
    run_lines(&db, "{\"type\":\"pos\",\"src\":\"DL1ABC-12\",\"lat\":\"48.1\"}\n");

    let conn = Connection::open(&db).unwrap();
    let src: String = conn
        .query_row("SELECT src FROM pos", [], |r| r.get(0))
        .unwrap();
    assert_eq!(src, "DL1ABC-12");
}

#[test]
fn new_field_grows_the_table_and_old_rows_read_null() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("meshcom.db");
    run_lines(
        &db,
        concat!(
            "{\"type\":\"msg\",\"dst\":\"*\",\"msg\":\"first\"}\n",
            "{\"type\":\"msg\",\"dst\":\"*\",\"msg\":\"second\",\"priority\":\"high\"}\n",
            "{\"type\":\"msg\",\"dst\":\"*\",\"msg\":\"third\"}\n",
        ),
    );

    let conn = Connection::open(&db).unwrap();
    let rows: Vec<(String, Option<String>)> = conn
        .prepare("SELECT msg, priority FROM msg ORDER BY id")
        .unwrap()
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(
        rows,
        vec![
            ("first".to_string(), None),
            ("second".to_string(), Some("high".to_string())),
            ("third".to_string(), None),
        ]
    );
}

#[test]
fn schema_survives_restart_without_duplicate_columns() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("meshcom.db");
    run_lines(&db, "{\"type\":\"tele\",\"batt\":\"91\",\"temp\":\"20.5\"}\n");
    // a second gateway process starts with an empty column cache
    run_lines(&db, "{\"type\":\"tele\",\"batt\":\"90\",\"hum\":\"40\"}\n");

    let store = SchemaStore::open(&db).unwrap();
    assert_eq!(
        store.columns("tele").unwrap(),
        vec!["id", "time", "type", "batt", "temp", "src", "hum"]
    );
}

#[test]
fn watermark_polling_sees_only_new_rows() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("meshcom.db");
    run_lines(&db, "{\"type\":\"msg\",\"msg\":\"a\"}\n{\"type\":\"msg\",\"msg\":\"b\"}\n");

    let conn = Connection::open(&db).unwrap();
    let watermark: i64 = conn
        .query_row("SELECT MAX(id) FROM msg", [], |r| r.get(0))
        .unwrap();

    run_lines(&db, "{\"type\":\"msg\",\"msg\":\"c\",\"rssi\":\"-97\"}\n");

    let fresh: Vec<String> = conn
        .prepare("SELECT msg FROM msg WHERE id > ?1 ORDER BY id")
        .unwrap()
        .query_map([watermark], |r| r.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(fresh, vec!["c".to_string()]);
}

#[test]
fn malformed_lines_leave_the_store_untouched() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("meshcom.db");
    run_lines(
        &db,
        concat!(
            "MeshCom 4.34 (build Jan 2026)\n",
            "} reversed {\n",
            "{\"type\":\"msg\",\"msg\":\n",
            "\u{1b}[0m\n",
        ),
    );
    let store = SchemaStore::open(&db).unwrap();
    assert!(store.tables().unwrap().is_empty());
}

#[test]
fn prune_keeps_newest_row_per_table() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("meshcom.db");
    run_lines(
        &db,
        concat!(
            "{\"type\":\"pos\",\"src\":\"A\",\"lat\":\"1\"}\n",
            "{\"type\":\"pos\",\"src\":\"B\",\"lat\":\"2\"}\n",
            "{\"type\":\"msg\",\"msg\":\"only\"}\n",
        ),
    );

    let mut store = SchemaStore::open(&db).unwrap();
    let reports = store.prune_to_newest().unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].table, "pos");
    assert_eq!(reports[0].deleted, 1);

    let conn = Connection::open(&db).unwrap();
    let src: String = conn
        .query_row("SELECT src FROM pos", [], |r| r.get(0))
        .unwrap();
    assert_eq!(src, "B");
}
