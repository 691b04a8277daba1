//! End-to-end tests: specification JSON → Flux script → replayed result → samples

use chrono::{Duration, FixedOffset, TimeZone, Utc};
use sensorflux::query::{
    compile, decode, resolve, QueryError, QuerySpec, SensorQueryRequest, Value,
};
use sensorflux::{Config, QueryService, Record, ReplayClient, ServiceError, StoreError};
use std::io::Write;
use std::sync::Arc;

const SCENARIO: &str = r#"{
    "bucket": "b",
    "measurement": "temp",
    "fields": ["value"],
    "filters": [{"key": "sensor_mac", "value": "AA:BB"}],
    "aggregate": {"enable": true, "every": "5m", "fn": "mean", "create_empty": false},
    "range": {"start": "-1h", "stop": "now()"}
}"#;

const RESULT: &str = "\
#group,false,false,true,true,false,false,true,true
#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string
#default,_result,,,,,,,
,result,table,_start,_stop,_time,_value,sensor_mac,sensor_type
,,0,2024-01-15T13:00:00Z,2024-01-15T14:00:00Z,2024-01-15T13:05:00Z,21.5,AA:BB,temperature
,,0,2024-01-15T13:00:00Z,2024-01-15T14:00:00Z,2024-01-15T13:10:00Z,,AA:BB,temperature
,,0,2024-01-15T13:00:00Z,2024-01-15T14:00:00Z,2024-01-15T13:15:00Z,22,AA:BB,temperature
";

fn scenario() -> QuerySpec {
    serde_json::from_str(SCENARIO).unwrap()
}

#[test]
fn scenario_compiles_to_eight_stages() {
    let spec = scenario();
    spec.validate().unwrap();

    let script = compile(&spec);
    let lines: Vec<&str> = script.lines().collect();

    assert_eq!(
        lines,
        vec![
            r#"from(bucket: "b")"#,
            r#" |> range(start: -1h, stop: now())"#,
            r#" |> filter(fn: (r) => r._measurement == "temp")"#,
            r#" |> filter(fn: (r) => r._field == "value")"#,
            r#" |> filter(fn: (r) => r.sensor_mac == "AA:BB")"#,
            r#" |> aggregateWindow(every: 5m, fn: mean, createEmpty: false)"#,
            r#" |> group(columns: ["sensor_mac", "sensor_type", "receive_no"])"#,
            r#" |> drop(fn: (column) => column != "_value" and column != "_time" and column != "sensor_type" and column != "sensor_mac")"#,
        ]
    );
    assert_eq!(compile(&spec), script);
}

#[test]
fn sum_aggregate_is_rejected() {
    let mut spec = scenario();
    spec.aggregate.func = "sum".to_string();

    assert!(matches!(
        spec.validate(),
        Err(QueryError::InvalidAggregateFunction(f)) if f == "sum"
    ));
}

#[test]
fn future_start_is_rejected() {
    let mut spec = scenario();
    spec.range.start = "2030-01-01T00:00:00Z".to_string();

    let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();
    assert!(matches!(
        spec.validate_at(now),
        Err(QueryError::FutureTime(_))
    ));
}

#[test]
fn non_canonical_timestamps_never_reach_the_script() {
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();

    for start in ["2019-8-28T22:00:00Z", "2019-08-28T2:0:0Z", "+2019-08-28T22:00:00Z"] {
        let mut spec = scenario();
        spec.range.start = start.to_string();
        assert!(
            matches!(spec.validate_at(now), Err(QueryError::MalformedTime(_))),
            "{}",
            start
        );
    }

    let mut spec = scenario();
    spec.range.start = "2019-08-28T22:00:00Z".to_string();
    spec.validate_at(now).unwrap();
}

#[test]
fn relative_times_resolve_against_one_instant() {
    let now = Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap();

    assert_eq!(resolve("now()", now).unwrap(), now);
    assert_eq!(resolve("-90m", now).unwrap(), now - Duration::minutes(90));
    assert!(matches!(resolve("5m", now), Err(QueryError::FutureTime(_))));
}

#[test]
fn decoding_nothing_yields_empty_samples() {
    let samples = decode(Vec::<Result<Record, StoreError>>::new()).unwrap();
    assert!(samples.is_empty());
}

#[test]
fn float32_values_are_widened() {
    let t = Utc.with_ymd_and_hms(2024, 1, 15, 13, 5, 0).unwrap();
    let row = Record::new(t)
        .with("_value", Value::Float32(1.5))
        .with("sensor_type", Value::String("temperature".to_string()));

    let samples = decode(vec![Ok::<_, StoreError>(row)]).unwrap();
    assert_eq!(samples[0].value, Some(1.5));
}

#[tokio::test]
async fn replayed_result_is_decoded_in_order() {
    let client = Arc::new(ReplayClient::new(RESULT));
    let service = QueryService::new(client.clone(), &Config::default().store).unwrap();

    let samples = service.run(&scenario()).await.unwrap();

    let values: Vec<Option<f64>> = samples.iter().map(|s| s.value).collect();
    assert_eq!(values, vec![Some(21.5), None, Some(22.0)]);
    assert!(samples.iter().all(|s| s.tag == "temperature"));
    assert_eq!(client.submitted(), vec![compile(&scenario())]);
}

#[tokio::test]
async fn invalid_spec_never_reaches_the_store() {
    let client = Arc::new(ReplayClient::new(RESULT));
    let service = QueryService::new(client.clone(), &Config::default().store).unwrap();

    let mut spec = scenario();
    spec.fields.clear();

    assert!(matches!(
        service.run(&spec).await,
        Err(ServiceError::Query(QueryError::EmptyRequiredField(_)))
    ));
    assert!(client.submitted().is_empty());
}

#[test]
fn sensor_request_maps_to_utc_spec() {
    let request: SensorQueryRequest = serde_json::from_str(
        r#"{
            "measurement": "env",
            "start": "2024-01-15 08:00:00",
            "stop": "2024-01-15 09:30:00",
            "interval": "10m",
            "filter": {"sensor_mac": "AA:BB", "receive_no": "3"}
        }"#,
    )
    .unwrap();

    let tz = FixedOffset::east_opt(8 * 3600).unwrap();
    let spec = request.to_spec("plant", &tz).unwrap();
    spec.validate().unwrap();

    let script = compile(&spec);
    assert!(script.contains("range(start: 2024-01-15T00:00:00Z, stop: 2024-01-15T01:30:00Z)"));
    assert!(script.contains(r#"r.sensor_mac == "AA:BB" and r.receive_no == "3""#));
    assert!(script.contains("aggregateWindow(every: 10m, fn: mean, createEmpty: false)"));
    assert!(matches!(
        request.filter.require_complete(),
        Err(QueryError::EmptyRequiredField(_))
    ));
}

#[tokio::test]
async fn config_file_drives_the_service() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "[store]\norg = \"plant\"\nbucket = \"b\"\ntoken = \"t\"\nmax_concurrent_queries = 2"
    )
    .unwrap();

    let config = Config::load(file.path()).unwrap();
    config.store.validate().unwrap();

    let service = QueryService::new(Arc::new(ReplayClient::new(RESULT)), &config.store).unwrap();
    assert_eq!(service.bucket(), "b");
    assert_eq!(service.run(&scenario()).await.unwrap().len(), 3);
}
