mod common;

use std::time::Duration;

use serial_test::serial;

use clickhouse_buffer::buffer::{MemoryBuffer, SyncBuffer};
use clickhouse_buffer::{Client, Error, Options, Rower, Value, View};

use common::{eventually, MockClickhouse, SampleRow};

#[ctor::ctor]
fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn sample_view() -> View {
    View::new("sample_table", vec!["id", "label", "at"])
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_happy_path_one_full_batch() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(3)
        .with_flush_interval(Duration::from_millis(200));
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(3)));
    for id in 1..=3 {
        writer.write_row(&SampleRow::new(id)).await;
    }

    assert!(eventually(Duration::from_millis(550), || mock.insert_calls() == 1).await);

    let batches = mock.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);
    for (i, row) in batches[0].iter().enumerate() {
        assert_eq!(row.values()[0], Value::Int64(i as i64 + 1));
    }
    assert!(client.retry_client().is_none());

    client.close().await;
    assert_eq!(mock.insert_calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_terminal_errors_are_surfaced_but_never_retried() {
    let mock = MockClickhouse::new();
    mock.fail_with(60);
    let options = Options::new()
        .with_batch_size(1)
        .with_flush_interval(Duration::from_millis(10))
        .with_retry(true);
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(1)));
    let errors = writer.errors();

    for id in 1..=3 {
        writer.write_row(&SampleRow::new(id)).await;
    }

    for _ in 0..3 {
        let err = tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .expect("error item within deadline")
            .expect("error stream open");
        assert!(matches!(err, Error::Exception { code: 60, .. }));
    }

    // the classifier rejects retry entirely for terminal codes
    tokio::time::sleep(Duration::from_millis(200)).await;
    let retry = client.retry_client().expect("retry enabled");
    assert_eq!(retry.metrics(), (0, 0, 0));
    assert!(mock.batches().is_empty());

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_transient_error_then_success_is_redelivered() {
    let mock = MockClickhouse::new();
    mock.fail_with(1002);
    let options = Options::new()
        .with_batch_size(1)
        .with_flush_interval(Duration::from_millis(10))
        .with_retry(true);
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(1)));
    let errors = writer.errors();

    writer.write_row(&SampleRow::new(1)).await;

    let err = tokio::time::timeout(Duration::from_secs(2), errors.recv())
        .await
        .expect("error item within deadline")
        .expect("error stream open");
    assert!(matches!(err, Error::Exception { code: 1002, .. }));

    mock.succeed();

    let retry = client.retry_client().expect("retry enabled");
    assert!(eventually(Duration::from_secs(2), || retry.metrics() == (1, 0, 0)).await);
    assert_eq!(mock.rows().len(), 1);
    // only the first synchronous failure reaches the error stream
    assert!(errors.try_recv().is_err());

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_transient_errors_exhaust_all_cycles() {
    let mock = MockClickhouse::new();
    mock.fail_with(1002);
    let options = Options::new()
        .with_batch_size(1)
        .with_flush_interval(Duration::from_millis(10))
        .with_retry(true);
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(1)));
    let errors = writer.errors();

    for id in 1..=3 {
        writer.write_row(&SampleRow::new(id)).await;
    }
    for _ in 0..3 {
        let err = tokio::time::timeout(Duration::from_secs(2), errors.recv())
            .await
            .expect("error item within deadline")
            .expect("error stream open");
        assert!(matches!(err, Error::Exception { code: 1002, .. }));
    }

    let retry = client.retry_client().expect("retry enabled");
    assert!(eventually(Duration::from_secs(5), || retry.metrics() == (0, 3, 0)).await);
    assert!(mock.batches().is_empty());

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_interval_flush_of_partial_batch() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(100)
        .with_flush_interval(Duration::from_millis(50));
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(100)));
    writer.write_row(&SampleRow::new(1)).await;
    writer.write_row(&SampleRow::new(2)).await;

    assert!(eventually(Duration::from_millis(500), || mock.rows().len() == 2).await);
    assert_eq!(mock.insert_calls(), 1);

    client.close().await;
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_empty_ticks_do_not_insert() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(10)
        .with_flush_interval(Duration::from_millis(20));
    let client = Client::with_options(mock.clone(), options);

    let _writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(10)));
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(mock.insert_calls(), 0);
    client.close().await;
    assert_eq!(mock.insert_calls(), 0);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_close_flushes_residual_rows() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(100)
        .with_flush_interval(Duration::from_secs(10));
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(100)));
    writer.write_row(&SampleRow::new(1)).await;
    writer.write_row(&SampleRow::new(2)).await;

    client.close().await;

    let batches = mock.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_row_order_is_preserved_across_batches() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(2)
        .with_flush_interval(Duration::from_secs(10));
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(2)));
    for id in 1..=5 {
        writer.write_row(&SampleRow::new(id)).await;
    }
    client.close().await;

    let batches = mock.batches();
    assert_eq!(
        batches.iter().map(|b| b.len()).collect::<Vec<_>>(),
        vec![2, 2, 1]
    );
    let ids: Vec<_> = mock.rows().iter().map(|r| r.values()[0].clone()).collect();
    assert_eq!(
        ids,
        (1..=5).map(Value::Int64).collect::<Vec<_>>()
    );
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_try_write_after_close_is_silent() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(1)
        .with_flush_interval(Duration::from_millis(10));
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(1)));
    writer.try_write_row(&SampleRow::new(1)).await;
    assert!(eventually(Duration::from_secs(1), || mock.rows().len() == 1).await);

    client.close().await;

    // neither blocks nor panics after shutdown
    writer.try_write_row(&SampleRow::new(2)).await;
    writer.try_write_vector(SampleRow::new(3).row()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mock.rows().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_error_stream_closes_with_the_writer() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(1)
        .with_flush_interval(Duration::from_millis(10));
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(MemoryBuffer::new(1)));
    let errors = writer.errors();

    writer.write_row(&SampleRow::new(1)).await;
    client.close().await;

    // drained and closed, not hanging
    assert!(errors.recv().await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_single_writer_instance_per_view_name() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(2)
        .with_flush_interval(Duration::from_secs(10));
    let client = Client::with_options(mock.clone(), options);

    let first = client.writer(sample_view(), Box::new(MemoryBuffer::new(2)));
    // second call returns the same pipeline, the new buffer is ignored
    let second = client.writer(sample_view(), Box::new(MemoryBuffer::new(2)));

    first.write_row(&SampleRow::new(1)).await;
    second.write_row(&SampleRow::new(2)).await;
    client.close().await;

    let batches = mock.batches();
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_concurrent_producers_with_sync_buffer() {
    let mock = MockClickhouse::new();
    let options = Options::new()
        .with_batch_size(10)
        .with_flush_interval(Duration::from_millis(20));
    let client = Client::with_options(mock.clone(), options);

    let writer = client.writer(sample_view(), Box::new(SyncBuffer::new(10)));
    let tasks: Vec<_> = (0..4i64)
        .map(|t| {
            let writer = writer.clone();
            tokio::spawn(async move {
                for i in 0..25i64 {
                    writer.write_row(&SampleRow::new(t * 25 + i)).await;
                }
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    client.close().await;
    assert_eq!(mock.rows().len(), 100);
}
