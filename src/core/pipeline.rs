use crate::core::aggregation::{AggregationEngine, Query};
use crate::core::decoder::ArchiveDecoder;
use crate::core::merger::RecordMerger;
use crate::core::{
    ArchiveBlob, ConfigProvider, DecodedArchive, Pipeline, ReportSink, ResultTable, RunSummary,
    Storage, TransformResult,
};
use crate::utils::error::{EtlError, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinError;

/// What one archive produced: its tables, or the reason it was dropped.
#[derive(Debug)]
pub struct ArchiveOutcome {
    pub archive: String,
    pub result: Result<DecodedArchive>,
}

fn join_error(what: &str, e: JoinError) -> EtlError {
    EtlError::ProcessingError {
        message: format!("{} worker failed: {}", what, e),
    }
}

/// Decodes every blob on the blocking pool, at most `max_parallel` at a time.
/// Outcomes come back in the order the blobs were supplied. A worker that
/// dies only costs its own archive.
pub async fn decode_archives<F>(
    decode: Arc<F>,
    blobs: Vec<ArchiveBlob>,
    max_parallel: usize,
) -> Result<Vec<ArchiveOutcome>>
where
    F: Fn(&str, &[u8]) -> Result<DecodedArchive> + Send + Sync + 'static,
{
    let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
    let mut handles = Vec::with_capacity(blobs.len());

    for blob in blobs {
        let permit = Arc::clone(&permits)
            .acquire_owned()
            .await
            .map_err(|e| EtlError::ProcessingError {
                message: format!("Decode scheduler closed: {}", e),
            })?;
        let decode = Arc::clone(&decode);
        let archive = blob.name.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            decode(&blob.name, &blob.bytes)
        });
        handles.push((archive, handle));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for (archive, handle) in handles {
        let result = handle.await.unwrap_or_else(|e| {
            Err(EtlError::CorruptArchiveError {
                archive: archive.clone(),
                message: format!("decoder worker failed: {}", e),
            })
        });
        outcomes.push(ArchiveOutcome { archive, result });
    }
    Ok(outcomes)
}

/// Runs all six queries concurrently over one engine. Results follow
/// `Query::ALL` order.
pub async fn run_queries(engine: Arc<AggregationEngine>) -> Result<Vec<ResultTable>> {
    let handles: Vec<_> = Query::ALL
        .into_iter()
        .map(|query| {
            let engine = Arc::clone(&engine);
            tokio::task::spawn_blocking(move || engine.run(query))
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await.map_err(|e| join_error("Query", e))?);
    }
    Ok(results)
}

/// Hands every result to the sink concurrently. A failed write is recorded
/// in `summary` and never affects the other writes.
pub async fn write_results<K: ReportSink + 'static>(
    sink: Arc<K>,
    results: Vec<ResultTable>,
    summary: &mut RunSummary,
) {
    let handles: Vec<_> = results
        .into_iter()
        .map(|table| {
            let sink = Arc::clone(&sink);
            let name = table.name.clone();
            let handle = tokio::spawn(async move { sink.write(&table.name, &table).await });
            (name, handle)
        })
        .collect();

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(location)) => {
                tracing::info!("💾 {} written to {}", name, location);
                summary.results_written.push((name, location));
            }
            Ok(Err(e)) => {
                tracing::warn!("❌ Failed to write {}: {}", name, e);
                summary.results_failed.push((name, e.to_string()));
            }
            Err(e) => {
                tracing::warn!("❌ Writer for {} panicked: {}", name, e);
                summary.results_failed.push((name, e.to_string()));
            }
        }
    }
}

/// Zipped trip archives in, six aggregate reports out.
pub struct TripPipeline<S: Storage, K: ReportSink, C: ConfigProvider> {
    source: S,
    sink: Arc<K>,
    config: C,
    decoder: Arc<ArchiveDecoder>,
    merger: RecordMerger,
}

impl<S: Storage, K: ReportSink + 'static, C: ConfigProvider> TripPipeline<S, K, C> {
    pub fn new(source: S, sink: K, config: C) -> Self {
        let decoder = ArchiveDecoder::new(config.table_extension());
        let merger = RecordMerger::new(config.schema_mismatch_policy(), config.column_mapping());
        Self {
            source,
            sink: Arc::new(sink),
            config,
            decoder: Arc::new(decoder),
            merger,
        }
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// Decodes already-retrieved blobs; failed archives are logged and
    /// recorded, the rest are returned in supplied order.
    pub async fn decode_blobs(
        &self,
        blobs: Vec<ArchiveBlob>,
        summary: &mut RunSummary,
    ) -> Result<Vec<DecodedArchive>> {
        summary.archives_total += blobs.len();
        let decoder = Arc::clone(&self.decoder);
        let decode = Arc::new(move |name: &str, bytes: &[u8]| decoder.decode(name, bytes));
        let outcomes = decode_archives(
            decode,
            blobs,
            self.config.max_parallel_archives(),
        )
        .await?;

        let mut decoded = Vec::with_capacity(outcomes.len());
        for outcome in outcomes {
            match outcome.result {
                Ok(archive) => decoded.push(archive),
                Err(e) => {
                    tracing::warn!("⚠️ Dropping archive {}: {}", outcome.archive, e);
                    summary.archives_failed.push((outcome.archive, e.to_string()));
                }
            }
        }
        Ok(decoded)
    }

    /// The core without the storage ends: blobs in, ordered results out.
    pub async fn analyze_blobs(&self, blobs: Vec<ArchiveBlob>) -> Result<TransformResult> {
        let mut summary = RunSummary::default();
        let archives = self.decode_blobs(blobs, &mut summary).await?;
        self.transform(archives, summary).await
    }
}

#[async_trait::async_trait]
impl<S: Storage, K: ReportSink + 'static, C: ConfigProvider> Pipeline for TripPipeline<S, K, C> {
    async fn extract(&self) -> Result<(Vec<DecodedArchive>, RunSummary)> {
        let mut summary = RunSummary::default();
        let names = self
            .source
            .list_files(self.config.archive_extension())
            .await?;
        tracing::debug!("Found {} archives in {}", names.len(), self.config.input_path());

        let mut blobs = Vec::with_capacity(names.len());
        for name in names {
            match self.source.read_file(&name).await {
                Ok(bytes) => blobs.push(ArchiveBlob { name, bytes }),
                Err(e) => {
                    tracing::warn!("⚠️ Could not read archive {}: {}", name, e);
                    summary.archives_total += 1;
                    summary.archives_failed.push((name, e.to_string()));
                }
            }
        }

        let archives = self.decode_blobs(blobs, &mut summary).await?;
        Ok((archives, summary))
    }

    async fn transform(
        &self,
        archives: Vec<DecodedArchive>,
        mut summary: RunSummary,
    ) -> Result<TransformResult> {
        let merger = self.merger.clone();
        let outcome = tokio::task::spawn_blocking(move || merger.merge(archives))
            .await
            .map_err(|e| join_error("Merge", e))??;

        summary.tables_merged = outcome.report.tables_merged;
        summary.empty_tables_skipped = outcome.report.empty_tables_skipped;
        summary.tables_rejected = outcome.report.tables_rejected;
        summary.rows_merged = outcome.dataset.len();
        tracing::info!(
            "Merged {} rows from {} tables",
            summary.rows_merged,
            summary.tables_merged
        );

        let dataset = Arc::new(outcome.dataset);
        let engine = Arc::new(AggregationEngine::new(Arc::clone(&dataset)));
        let results = run_queries(engine).await?;

        Ok(TransformResult {
            dataset,
            results,
            summary,
        })
    }

    async fn load(&self, result: TransformResult) -> Result<RunSummary> {
        let mut summary = result.summary;
        write_results(Arc::clone(&self.sink), result.results, &mut summary).await;
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OutputFormat, SchemaMismatchPolicy, Value};
    use std::collections::HashMap;
    use std::io::{Cursor, Write};
    use tokio::sync::Mutex;
    use zip::write::{SimpleFileOptions, ZipWriter};

    #[derive(Clone, Default)]
    struct MockStorage {
        files: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    }

    impl MockStorage {
        async fn put(&self, path: &str, data: Vec<u8>) {
            self.files.lock().await.insert(path.to_string(), data);
        }
    }

    impl Storage for MockStorage {
        async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
            let files = self.files.lock().await;
            files.get(path).cloned().ok_or_else(|| {
                EtlError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("File not found: {}", path),
                ))
            })
        }

        async fn write_file(&self, path: &str, data: &[u8]) -> Result<()> {
            let mut files = self.files.lock().await;
            files.insert(path.to_string(), data.to_vec());
            Ok(())
        }

        async fn list_files(&self, extension: &str) -> Result<Vec<String>> {
            let files = self.files.lock().await;
            let mut names: Vec<String> = files
                .keys()
                .filter(|k| {
                    k.rsplit_once('.')
                        .is_some_and(|(_, ext)| ext.eq_ignore_ascii_case(extension))
                })
                .cloned()
                .collect();
            names.sort();
            Ok(names)
        }
    }

    /// Records writes and fails the ones listed in `reject`.
    #[derive(Default)]
    struct MockSink {
        written: Mutex<Vec<String>>,
        reject: Vec<String>,
    }

    impl ReportSink for MockSink {
        async fn write(&self, name: &str, _table: &ResultTable) -> Result<String> {
            if self.reject.iter().any(|r| r == name) {
                return Err(EtlError::SinkError {
                    name: name.to_string(),
                    message: "disk full".to_string(),
                });
            }
            self.written.lock().await.push(name.to_string());
            Ok(format!("mock://{}", name))
        }
    }

    struct MockConfig {
        policy: SchemaMismatchPolicy,
    }

    impl ConfigProvider for MockConfig {
        fn input_path(&self) -> &str {
            "mock-in"
        }

        fn output_path(&self) -> &str {
            "mock-out"
        }

        fn schema_mismatch_policy(&self) -> SchemaMismatchPolicy {
            self.policy
        }

        fn output_format(&self) -> OutputFormat {
            OutputFormat::Csv
        }

        fn max_parallel_archives(&self) -> usize {
            2
        }
    }

    const HEADER: &str =
        "trip_id,start_time,tripduration,from_station_id,from_station_name,gender,birthyear\n";

    fn zip_of(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in files {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    fn trips_csv(rows: &[&str]) -> Vec<u8> {
        let mut csv = HEADER.to_string();
        for row in rows {
            csv.push_str(row);
            csv.push('\n');
        }
        csv.into_bytes()
    }

    fn pipeline(policy: SchemaMismatchPolicy) -> TripPipeline<MockStorage, MockSink, MockConfig> {
        TripPipeline::new(MockStorage::default(), MockSink::default(), MockConfig { policy })
    }

    fn blob(name: &str, bytes: Vec<u8>) -> ArchiveBlob {
        ArchiveBlob {
            name: name.to_string(),
            bytes,
        }
    }

    #[tokio::test]
    async fn test_two_archives_one_empty() {
        let pipeline = pipeline(SchemaMismatchPolicy::Drop);
        let blobs = vec![
            blob(
                "a.zip",
                zip_of(&[(
                    "a.csv",
                    &trips_csv(&[
                        "1,2019-01-01T08:00,100,1,A,Male,1980",
                        "2,2019-01-01T09:00,200,2,B,Female,1990",
                    ]),
                )]),
            ),
            blob("b.zip", zip_of(&[("b.csv", HEADER.as_bytes())])),
        ];

        let result = pipeline.analyze_blobs(blobs).await.unwrap();

        assert_eq!(result.summary.empty_tables_skipped, 1);
        assert!(result.summary.archives_failed.is_empty());
        let names: Vec<&str> = result.results.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            Query::ALL.iter().map(|q| q.name()).collect::<Vec<_>>()
        );
        assert_eq!(
            result.results[0].rows,
            vec![vec![Value::from("2019-01-01"), Value::Float(150.0)]]
        );
        assert_eq!(
            result.results[1].rows,
            vec![vec![Value::from("2019-01-01"), Value::Int(2)]]
        );
    }

    #[tokio::test]
    async fn test_undecodable_archive_does_not_affect_siblings() {
        let pipeline = pipeline(SchemaMismatchPolicy::Drop);
        let mut bad = trips_csv(&["1,2019-01-01 08:00:00,100,1,A,Male,1980"]);
        bad.extend_from_slice(b"2,2019-01-01 09:00:00,100,1,\xff\xfe,Male,1980\n");
        let blobs = vec![
            blob("bad.zip", zip_of(&[("bad.csv", &bad)])),
            blob("junk.zip", b"PK not really".to_vec()),
            blob(
                "good.zip",
                zip_of(&[("good.csv", &trips_csv(&["3,2019-01-02 08:00:00,50,2,B,,"]))]),
            ),
        ];

        let result = pipeline.analyze_blobs(blobs).await.unwrap();

        assert_eq!(result.summary.archives_total, 3);
        let failed: Vec<&str> = result
            .summary
            .archives_failed
            .iter()
            .map(|(name, _)| name.as_str())
            .collect();
        assert_eq!(failed, vec!["bad.zip", "junk.zip"]);
        assert_eq!(result.dataset.len(), 1);
        assert_eq!(
            result.results[1].rows,
            vec![vec![Value::from("2019-01-02"), Value::Int(1)]]
        );
    }

    #[tokio::test]
    async fn test_zero_archives_yield_six_empty_results() {
        let pipeline = pipeline(SchemaMismatchPolicy::Drop);

        let result = pipeline.analyze_blobs(Vec::new()).await.unwrap();

        assert!(result.dataset.is_empty());
        assert_eq!(result.results.len(), 6);
        assert!(result.results.iter().all(|t| t.is_empty()));
    }

    #[tokio::test]
    async fn test_abort_policy_fails_transform() {
        let pipeline = pipeline(SchemaMismatchPolicy::Abort);
        let blobs = vec![blob(
            "q.zip",
            zip_of(&[
                ("a.csv", &trips_csv(&["1,2019-01-01 08:00:00,100,1,A,Male,1980"])),
                ("b.csv", b"other,columns\n1,2\n"),
            ]),
        )];

        let err = pipeline.analyze_blobs(blobs).await.unwrap_err();
        assert!(matches!(err, EtlError::SchemaMismatchError { .. }));
    }

    #[tokio::test]
    async fn test_extract_reads_archives_in_name_order() {
        let pipeline = pipeline(SchemaMismatchPolicy::Drop);
        let second = trips_csv(&["2,2019-01-02 08:00:00,1,1,A,,"]);
        let first = trips_csv(&["1,2019-01-01 08:00:00,1,1,A,,"]);
        pipeline
            .source
            .put("2_second.ZIP", zip_of(&[("t.csv", &second)]))
            .await;
        pipeline
            .source
            .put("1_first.zip", zip_of(&[("t.csv", &first)]))
            .await;
        pipeline.source.put("ignored.txt", b"hello".to_vec()).await;

        let (archives, summary) = pipeline.extract().await.unwrap();

        assert_eq!(summary.archives_total, 2);
        let order: Vec<&str> = archives.iter().map(|a| a.archive.as_str()).collect();
        assert_eq!(order, vec!["1_first.zip", "2_second.ZIP"]);
    }

    #[tokio::test]
    async fn test_panicking_decode_worker_only_drops_its_archive() {
        let decoder = ArchiveDecoder::default();
        let decode = Arc::new(move |name: &str, bytes: &[u8]| {
            if name == "poison.zip" {
                panic!("decoder blew up on {}", name);
            }
            decoder.decode(name, bytes)
        });
        let good = zip_of(&[("t.csv", &trips_csv(&["1,2019-01-01 08:00:00,1,1,A,,"]))]);
        let blobs = vec![
            blob("first.zip", good.clone()),
            blob("poison.zip", good.clone()),
            blob("last.zip", good),
        ];

        let outcomes = decode_archives(decode, blobs, 2).await.unwrap();

        let names: Vec<&str> = outcomes.iter().map(|o| o.archive.as_str()).collect();
        assert_eq!(names, vec!["first.zip", "poison.zip", "last.zip"]);
        assert!(outcomes[0].result.is_ok());
        assert!(matches!(
            &outcomes[1].result,
            Err(EtlError::CorruptArchiveError { archive, .. }) if archive == "poison.zip"
        ));
        assert!(outcomes[2].result.is_ok());
    }

    #[tokio::test]
    async fn test_failed_write_does_not_block_siblings() {
        let sink = MockSink {
            written: Mutex::new(Vec::new()),
            reject: vec![Query::DailyTripCount.name().to_string()],
        };
        let pipeline = TripPipeline::new(
            MockStorage::default(),
            sink,
            MockConfig {
                policy: SchemaMismatchPolicy::Drop,
            },
        );

        let transformed = pipeline.analyze_blobs(Vec::new()).await.unwrap();
        let summary = pipeline.load(transformed).await.unwrap();

        assert_eq!(summary.results_written.len(), 5);
        assert_eq!(summary.results_failed.len(), 1);
        assert_eq!(summary.results_failed[0].0, "daily_trip_count");
        assert!(summary.has_failures());
        assert_eq!(pipeline.sink.written.lock().await.len(), 5);
    }
}
