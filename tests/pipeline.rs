use anyhow::Result;
use serde_json::{json, Value};
use sf1join::{
    geo::GeoRecord,
    pipeline,
    store::{geo_table_ddl, DuckStore, TableLoad},
    CancelToken, Config, SegmentMatch,
};
use std::{fs, path::Path};
use tempfile::tempdir;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const LABELS: &str = r#"{
    "P1": {
        "name": "TOTAL POPULATION",
        "universe": "Total population",
        "labels": { "P0010001": { "text": "Total" } }
    },
    "P2": {
        "name": "URBAN AND RURAL",
        "universe": "Total population",
        "labels": { "P0020001": { "text": "Total:" } }
    }
}"#;

fn init_tracing() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn header_line(sumlev: &str, logrecno: u64, zcta5: &str) -> Vec<u8> {
    let mut rec = GeoRecord::blank();
    rec.set("FILEID", "SF1ST");
    rec.set("STUSAB", "US");
    rec.set("SUMLEV", sumlev);
    rec.set("CHARITER", "000");
    rec.set("LOGRECNO", &format!("{:07}", logrecno));
    rec.set("ZCTA5", zcta5);
    let mut line = rec.to_line();
    line.extend(b"\r\n");
    line
}

/// Two ZCTAs at logrecno 1 and 3, a state row at 2, two segments.
fn seed(work: &Path) -> Result<Config> {
    let labels = work.join("sf1_labels.json");
    fs::write(&labels, LABELS)?;

    let mut cfg = Config::new(work, &labels);
    cfg.segment_count = 2;

    let script = work.join("schema.sql");
    let segment = |table: &str, vars: &[&str]| {
        let vars: Vec<String> = vars.iter().map(|v| format!("{} INTEGER", v)).collect();
        format!(
            "CREATE TABLE {} (FILEID VARCHAR, STUSAB VARCHAR, CHARITER VARCHAR, \
             CIFSN VARCHAR, LOGRECNO VARCHAR, {});\n",
            table,
            vars.join(", ")
        )
    };
    fs::write(
        &script,
        format!(
            "{}\n{}{}",
            geo_table_ddl("geo2010").replacen(" IF NOT EXISTS", "", 1),
            segment("sf1_01", &["P0010001"]),
            segment("sf1_02", &["P0020001", "P0020002"])
        ),
    )?;
    cfg.schema_script = Some(script);

    let mut header = header_line("880", 1, "01001");
    header.extend(header_line("040", 2, ""));
    header.extend(header_line("880", 3, "01002"));
    fs::write(cfg.geo_input(), header)?;

    fs::write(
        cfg.segment_input(1),
        "SF1ST,US,000,01,0000001,100\nSF1ST,US,000,01,0000002,999\nSF1ST,US,000,01,0000003,300\nSF1ST,US,000,01,0000004,400\n",
    )?;
    fs::write(
        cfg.segment_input(2),
        "SF1ST,US,000,02,0000001,10,90\nSF1ST,US,000,02,0000003,30,70\n",
    )?;
    Ok(cfg)
}

fn read_output(path: &Path) -> Result<Vec<Value>> {
    fs::read_to_string(path)?
        .lines()
        .map(|l| Ok(serde_json::from_str(l)?))
        .collect()
}

#[test]
fn end_to_end_produces_labelled_records() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let cfg = seed(dir.path())?;
    let store = DuckStore::open(cfg.database_path())?;

    let report = pipeline::run(&cfg, &store, &CancelToken::new())?;

    assert_eq!(report.filter.matched, 2);
    assert_eq!(report.filter.bounds.map(|b| (b.min, b.max)), Some((1, 3)));
    assert_eq!(
        fs::read(cfg.geo_filtered())?.len(),
        2 * (sf1join::geo::RECORD_WIDTH + 1)
    );
    assert_eq!(
        fs::read_to_string(cfg.segment_filtered(1))?,
        "SF1ST,US,000,01,0000001,100\nSF1ST,US,000,01,0000002,999\nSF1ST,US,000,01,0000003,300\n"
    );

    let load = report.load.as_ref().expect("tables loaded");
    assert_eq!(load.geo, TableLoad::Loaded(2));
    assert_eq!(load.segments, vec![(1, TableLoad::Loaded(3)), (2, TableLoad::Loaded(2))]);

    let export = report.export.as_ref().expect("rows exported");
    assert_eq!(export.total_row_estimate, 2);
    assert_eq!(export.rows, 2);
    assert_eq!(export.assembly.emitted, 4);
    assert_eq!(export.assembly.unresolved, 2);
    assert_eq!(export.misses.unknown_label, 2);
    assert_eq!(export.misses.distinct_columns, 1);

    let records = read_output(&cfg.output_path())?;
    assert_eq!(
        records,
        vec![
            json!({"zcta5": "01001", "name": "TOTAL POPULATION", "universe": "Total population",
                   "text": "Total", "key": "P0010001", "value": 100}),
            json!({"zcta5": "01001", "name": "URBAN AND RURAL", "universe": "Total population",
                   "text": "Total:", "key": "P0020001", "value": 10}),
            json!({"zcta5": "01002", "name": "TOTAL POPULATION", "universe": "Total population",
                   "text": "Total", "key": "P0010001", "value": 300}),
            json!({"zcta5": "01002", "name": "URBAN AND RURAL", "universe": "Total population",
                   "text": "Total:", "key": "P0020001", "value": 30}),
        ]
    );

    let on_disk: Value = serde_json::from_str(&fs::read_to_string(cfg.report_path())?)?;
    assert_eq!(on_disk["export"]["rows"], 2);
    Ok(())
}

#[test]
fn rerun_resumes_every_stage() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let cfg = seed(dir.path())?;
    let store = DuckStore::open(cfg.database_path())?;

    pipeline::run(&cfg, &store, &CancelToken::new())?;
    let first = fs::read(cfg.output_path())?;

    let again = pipeline::run(&cfg, &store, &CancelToken::new())?;
    assert!(again.filter.resumed);
    let load = again.load.as_ref().expect("tables checked");
    assert_eq!(load.geo, TableLoad::Resumed(2));
    assert!(load
        .segments
        .iter()
        .all(|(_, l)| matches!(l, TableLoad::Resumed(_))));
    assert_eq!(fs::read(cfg.output_path())?, first);
    Ok(())
}

#[test]
fn exact_matching_and_small_chunks() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let mut cfg = seed(dir.path())?;
    cfg.segment_match = SegmentMatch::Exact;
    cfg.chunk_size = 1;
    let store = DuckStore::open_in_memory()?;

    let report = pipeline::run(&cfg, &store, &CancelToken::new())?;

    assert_eq!(
        fs::read_to_string(cfg.segment_filtered(1))?,
        "SF1ST,US,000,01,0000001,100\nSF1ST,US,000,01,0000003,300\n"
    );
    let export = report.export.as_ref().expect("rows exported");
    assert_eq!(export.chunks, 2);
    assert_eq!(read_output(&cfg.output_path())?.len(), 4);
    Ok(())
}

#[test]
fn missing_segment_file_is_not_fatal() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let cfg = seed(dir.path())?;
    fs::remove_file(cfg.segment_input(2))?;
    let store = DuckStore::open_in_memory()?;

    let report = pipeline::run(&cfg, &store, &CancelToken::new())?;

    let load = report.load.as_ref().expect("tables loaded");
    assert_eq!(load.segments[1], (2, TableLoad::MissingFile));
    let export = report.export.as_ref().expect("rows exported");
    assert_eq!(export.segments_joined, 1);
    assert_eq!(export.segments_skipped, vec![2]);

    let records = read_output(&cfg.output_path())?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["key"] == "P0010001"));
    Ok(())
}

#[test]
fn duplicate_segment_keys_are_all_exported_across_chunks() -> Result<()> {
    init_tracing();
    let dir = tempdir()?;
    let mut cfg = seed(dir.path())?;
    cfg.chunk_size = 1;
    fs::write(
        cfg.segment_input(2),
        "SF1ST,US,000,02,0000001,10,90
SF1ST,US,000,02,0000001,11,89
SF1ST,US,000,02,0000003,30,70
",
    )?;
    let store = DuckStore::open_in_memory()?;

    let report = pipeline::run(&cfg, &store, &CancelToken::new())?;

    let export = report.export.as_ref().expect("rows exported");
    assert_eq!(export.total_row_estimate, 3);
    assert_eq!(export.rows, 3);
    let values: Vec<Value> = read_output(&cfg.output_path())?
        .into_iter()
        .filter(|r| r["key"] == "P0020001")
        .map(|r| r["value"].clone())
        .collect();
    assert_eq!(values, vec![json!(10), json!(11), json!(30)]);
    Ok(())
}
