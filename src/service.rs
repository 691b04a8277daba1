//! Query Service
//!
//! Runs queries end to end against an injected [`StoreClient`]:
//!
//! ```text
//! validate → compile → acquire permit → submit ─┐
//!                                                ├─ within timeout
//!                         decode ← rows ←────────┘
//! ```
//!
//! The service is built once at startup and shared by reference. It never
//! retries; every failure is returned to the caller as is.
//!
//! Row streams are blocking iterators, so decoding runs on the blocking pool.
//! The permit moves with it: a decode that outlives its deadline keeps its
//! slot until the stream is drained.

use crate::config::{ConfigError, StoreConfig};
use crate::query::{
    decode_with, DecodeOptions, FluxQuery, QueryError, Sample, SensorQueryRequest,
};
use crate::store::{StoreClient, StoreError};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::Instrument;

/// Errors returned by [`QueryService`]
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Validation or decoding failed
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    /// The store session failed
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The service settings are unusable
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The decode task panicked or was cancelled
    #[error("Decode task failed: {0}")]
    Decode(#[from] tokio::task::JoinError),

    /// The query did not finish before the deadline
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    /// The service was closed
    #[error("Query service is closed")]
    Closed,
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Validates, compiles, submits and decodes queries
pub struct QueryService {
    client: Arc<dyn StoreClient>,
    org: String,
    bucket: String,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl QueryService {
    /// Create a service over a store session
    ///
    /// Fails when `max_concurrent_queries` is zero, since no query could ever
    /// run.
    pub fn new(client: Arc<dyn StoreClient>, config: &StoreConfig) -> ServiceResult<Self> {
        if config.max_concurrent_queries == 0 {
            return Err(ConfigError::Invalid(
                "store: max_concurrent_queries must be at least 1".to_string(),
            )
            .into());
        }

        Ok(Self {
            client,
            org: config.org.clone(),
            bucket: config.bucket.clone(),
            timeout: Duration::from_secs(config.query_timeout_secs),
            permits: Arc::new(Semaphore::new(config.max_concurrent_queries)),
        })
    }

    /// Override the per-query deadline
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Default bucket for sensor requests
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Reject all queries from now on; queries already running finish
    pub fn close(&self) {
        self.permits.close();
    }

    /// Run a query, decoding with the default columns
    pub async fn run<Q>(&self, query: &Q) -> ServiceResult<Vec<Sample>>
    where
        Q: FluxQuery + Sync + ?Sized,
    {
        self.run_with(query, &DecodeOptions::default()).await
    }

    /// Map a sensor request onto the configured bucket and run it
    pub async fn run_request(&self, request: &SensorQueryRequest) -> ServiceResult<Vec<Sample>> {
        let spec = request.to_local_spec(&self.bucket)?;
        self.run(&spec).await
    }

    /// Run a query, decoding the columns named in `options`
    pub async fn run_with<Q>(&self, query: &Q, options: &DecodeOptions) -> ServiceResult<Vec<Sample>>
    where
        Q: FluxQuery + Sync + ?Sized,
    {
        let query_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("query", id = %query_id, store = self.client.name());

        self.execute(query, options).instrument(span).await
    }

    async fn execute<Q>(&self, query: &Q, options: &DecodeOptions) -> ServiceResult<Vec<Sample>>
    where
        Q: FluxQuery + Sync + ?Sized,
    {
        query.validate_at(Utc::now())?;
        let script = query.to_flux();
        tracing::debug!(script = %script, "Compiled query");

        let started = Instant::now();

        // Waiting for a permit counts against the deadline
        let submit = async {
            let permit = self
                .permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| ServiceError::Closed)?;

            let rows = self.client.query(&self.org, &script).await?;
            let options = options.clone();

            let samples = tokio::task::spawn_blocking(move || {
                let _permit = permit;
                decode_with(rows, &options)
            })
            .await??;
            Ok::<_, ServiceError>(samples)
        };

        let samples = match tokio::time::timeout(self.timeout, submit).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Query timed out");
                return Err(ServiceError::Timeout(self.timeout));
            }
        };

        tracing::info!(
            rows = samples.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Query complete"
        );
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{AggregateFn, QuerySpec};
    use crate::query::Value;
    use crate::store::{Record, ReplayClient, Rows, StoreResult};
    use async_trait::async_trait;

    const RESULT: &str = "\
#datatype,string,long,dateTime:RFC3339,double,string,string
#default,_result,,,,,
,result,table,_time,_value,sensor_mac,sensor_type
,,0,2024-01-15T13:05:00Z,21.5,AA:BB,temperature
,,0,2024-01-15T13:10:00Z,,AA:BB,temperature
";

    fn config() -> StoreConfig {
        StoreConfig {
            bucket: "sensors".to_string(),
            org: "plant".to_string(),
            ..StoreConfig::default()
        }
    }

    fn spec() -> QuerySpec {
        QuerySpec::builder("sensors", "temp")
            .filter("sensor_mac", "AA:BB")
            .aggregate("5m", AggregateFn::Mean)
            .range("-1h", "now()")
            .build()
    }

    struct SlowClient;

    #[async_trait]
    impl StoreClient for SlowClient {
        fn name(&self) -> &str {
            "slow"
        }

        async fn query(&self, _org: &str, _script: &str) -> StoreResult<Rows> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Box::new(std::iter::empty()))
        }
    }

    /// Answers at once, then delivers each row after a blocking pause
    struct SlowRowsClient {
        rows: usize,
        pause: Duration,
    }

    #[async_trait]
    impl StoreClient for SlowRowsClient {
        fn name(&self) -> &str {
            "slow-rows"
        }

        async fn query(&self, _org: &str, _script: &str) -> StoreResult<Rows> {
            let pause = self.pause;
            let time = Utc::now();
            Ok(Box::new((0..self.rows).map(move |i| {
                std::thread::sleep(pause);
                Ok(Record::new(time)
                    .with("_value", Value::Float64(i as f64))
                    .with("sensor_type", Value::String("temperature".to_string())))
            })))
        }
    }

    struct DownClient;

    #[async_trait]
    impl StoreClient for DownClient {
        fn name(&self) -> &str {
            "down"
        }

        async fn query(&self, _org: &str, _script: &str) -> StoreResult<Rows> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_run_decodes_rows() {
        let client = Arc::new(ReplayClient::new(RESULT));
        let service = QueryService::new(client.clone(), &config()).unwrap();

        let samples = service.run(&spec()).await.unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, Some(21.5));
        assert_eq!(samples[0].tag, "temperature");
        assert_eq!(samples[1].value, None);

        let submitted = client.submitted();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0], crate::query::compile(&spec()));
    }

    #[tokio::test]
    async fn test_invalid_query_is_never_submitted() {
        let client = Arc::new(ReplayClient::new(RESULT));
        let service = QueryService::new(client.clone(), &config()).unwrap();

        let mut bad = spec();
        bad.aggregate.func = "sum".to_string();

        let result = service.run(&bad).await;
        assert!(matches!(
            result,
            Err(ServiceError::Query(QueryError::InvalidAggregateFunction(_)))
        ));
        assert!(client.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_custom_decode_columns() {
        let service = QueryService::new(Arc::new(ReplayClient::new(RESULT)), &config()).unwrap();
        let options = DecodeOptions::default().tag_column("sensor_mac");

        let samples = service.run_with(&spec(), &options).await.unwrap();
        assert!(samples.iter().all(|s| s.tag == "AA:BB"));
    }

    #[tokio::test]
    async fn test_store_error_is_surfaced() {
        let service = QueryService::new(Arc::new(DownClient), &config()).unwrap();

        let result = service.run(&spec()).await;
        assert!(matches!(
            result,
            Err(ServiceError::Store(StoreError::Connection(_)))
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let service = QueryService::new(Arc::new(SlowClient), &config())
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        let result = service.run(&spec()).await;
        assert!(matches!(result, Err(ServiceError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_closed_service_rejects_queries() {
        let service = QueryService::new(Arc::new(ReplayClient::new(RESULT)), &config()).unwrap();
        service.close();

        assert!(matches!(
            service.run(&spec()).await,
            Err(ServiceError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_upstream_error_table() {
        let body = "\
#datatype,string,string
,error,reference
,bucket not found,404
";
        let service = QueryService::new(Arc::new(ReplayClient::new(body)), &config()).unwrap();

        let result = service.run(&spec()).await;
        assert!(matches!(
            result,
            Err(ServiceError::Query(QueryError::UpstreamIteration(message))) if message.contains("bucket not found")
        ));
    }

    #[tokio::test]
    async fn test_timeout_covers_decoding() {
        let client = SlowRowsClient {
            rows: 5,
            pause: Duration::from_millis(100),
        };
        let service = QueryService::new(Arc::new(client), &config())
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        let started = Instant::now();
        let result = service.run(&spec()).await;

        assert!(matches!(result, Err(ServiceError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_permit_wait_counts_against_deadline() {
        let client = SlowRowsClient {
            rows: 5,
            pause: Duration::from_millis(100),
        };
        let store = StoreConfig {
            max_concurrent_queries: 1,
            ..config()
        };
        let service = QueryService::new(Arc::new(client), &store)
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        // The first decode keeps the only permit after its deadline passes
        assert!(matches!(
            service.run(&spec()).await,
            Err(ServiceError::Timeout(_))
        ));

        let started = Instant::now();
        assert!(matches!(
            service.run(&spec()).await,
            Err(ServiceError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_zero_permits_is_rejected() {
        let store = StoreConfig {
            max_concurrent_queries: 0,
            ..config()
        };

        let result = QueryService::new(Arc::new(ReplayClient::new(RESULT)), &store);
        assert!(matches!(
            result,
            Err(ServiceError::Config(ConfigError::Invalid(_)))
        ));
    }
}
