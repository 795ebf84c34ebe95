use super::test_support::{MockBehavior, MockTransport};
use super::*;
use crate::args::{Distribution, HttpMethod};
use crate::error::{AppError, AppResult, ConfigurationError};
use crate::metrics::{RunFacts, TransportErrorKind, spawn_result_aggregator};
use crate::shutdown::{CancelSignal, shutdown_channel, watch_shutdown};
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::Instant;

fn run_async_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::validation(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

fn run_paused_test<F>(future: F) -> AppResult<()>
where
    F: Future<Output = AppResult<()>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .start_paused(true)
        .build()
        .map_err(|err| AppError::validation(format!("Failed to build runtime: {}", err)))?;
    runtime.block_on(future)
}

fn template(urls: &[&str]) -> AppResult<RequestTemplate> {
    Ok(RequestTemplate::new(
        HttpMethod::Get,
        urls.iter().map(|url| (*url).to_owned()).collect(),
        vec![],
        None,
    )?)
}

fn first_url(tpl: &RequestTemplate) -> AppResult<Arc<str>> {
    tpl.urls()
        .first()
        .cloned()
        .ok_or_else(|| AppError::validation("Template has no URL"))
}

fn pool_settings(capacity: usize) -> PoolSettings {
    PoolSettings {
        capacity,
        request_timeout: Duration::from_secs(30),
        latency_correction: false,
    }
}

#[test]
fn template_rejects_invalid_targets() -> AppResult<()> {
    let cases: [(&[&str], &str); 4] = [
        (&[], "empty"),
        (&["ftp://example.com"], "scheme"),
        (&["not a url"], "parse"),
        (&["http://"], "host"),
    ];
    for (urls, label) in cases {
        let result = template(urls);
        let matched = match (label, &result) {
            ("empty", Err(AppError::Configuration(ConfigurationError::EmptyUrlList)))
            | (
                "scheme",
                Err(AppError::Configuration(ConfigurationError::UnsupportedScheme { .. })),
            )
            | ("parse", Err(AppError::Configuration(ConfigurationError::InvalidUrl { .. }))) => {
                true
            }
            ("host", Err(AppError::Configuration(_))) => true,
            _ => false,
        };
        if !matched {
            return Err(AppError::validation(format!(
                "Case {} produced {:?}",
                label,
                result.map(|tpl| tpl.urls().len())
            )));
        }
    }
    Ok(())
}

#[test]
fn template_rejects_invalid_header_name() -> AppResult<()> {
    let result = RequestTemplate::new(
        HttpMethod::Get,
        vec!["http://localhost".to_owned()],
        vec![("bad header".to_owned(), "v".to_owned())],
        None,
    );
    match result {
        Err(ConfigurationError::InvalidHeaderName { name, .. }) if name == "bad header" => Ok(()),
        other => Err(AppError::validation(format!(
            "Expected invalid header name, got {:?}",
            other.map(|tpl| tpl.headers().len())
        ))),
    }
}

#[test]
fn template_keeps_header_order_and_duplicates() -> AppResult<()> {
    let headers = vec![
        ("X-Trace".to_owned(), "a".to_owned()),
        ("Accept".to_owned(), "text/plain".to_owned()),
        ("X-Trace".to_owned(), "b".to_owned()),
    ];
    let tpl = RequestTemplate::new(
        HttpMethod::Post,
        vec!["https://example.com/api".to_owned()],
        headers.clone(),
        Some(Bytes::from_static(b"{\"a\":1}")),
    )?;
    let dispatch = Dispatch::new(0, first_url(&tpl)?, Instant::now());
    let resolved = tpl.resolve(&dispatch);
    let no_content_type = !resolved
        .headers
        .iter()
        .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
    if resolved.headers.as_ref() == headers.as_slice()
        && no_content_type
        && resolved.body.as_deref() == Some(b"{\"a\":1}".as_slice())
    {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Unexpected resolved request: {:?}",
            resolved
        )))
    }
}

#[test]
fn dynamic_body_renders_placeholders_per_dispatch() -> AppResult<()> {
    let tpl = RequestTemplate::new(
        HttpMethod::Post,
        vec!["http://localhost/users".to_owned()],
        vec![],
        Some(Bytes::from_static(b"{\"id\":{{userId}},\"seq\":{{ seq }},\"x\":\"{{unknown}}\"}")),
    )?
    .with_dynamic_body(true);
    let dispatch = Dispatch::new(4, Arc::from("http://localhost/users"), Instant::now());
    let body = tpl
        .resolve(&dispatch)
        .body
        .ok_or_else(|| AppError::validation("Missing body"))?;
    if body.as_ref() == b"{\"id\":5,\"seq\":4,\"x\":\"{{unknown}}\"}" {
        Ok(())
    } else {
        Err(AppError::validation(format!(
            "Unexpected body: {}",
            String::from_utf8_lossy(&body)
        )))
    }
}

#[test]
fn static_body_is_sent_verbatim() -> AppResult<()> {
    let raw = Bytes::from_static(b"{{userId}}");
    let tpl = RequestTemplate::new(
        HttpMethod::Put,
        vec!["http://localhost".to_owned()],
        vec![],
        Some(raw.clone()),
    )?;
    let dispatch = Dispatch::new(9, Arc::from("http://localhost"), Instant::now());
    if tpl.resolve(&dispatch).body == Some(raw) {
        Ok(())
    } else {
        Err(AppError::validation("Static body was modified"))
    }
}

#[test]
fn round_robin_selector_wraps_in_order() -> AppResult<()> {
    let urls: Vec<Arc<str>> = vec![Arc::from("a"), Arc::from("b"), Arc::from("c")];
    let mut selector = TargetSelector::new(urls, Distribution::RoundRobin)?;
    let picked: Vec<String> = (0..7).map(|_| selector.next_target().to_string()).collect();
    if picked == ["a", "b", "c", "a", "b", "c", "a"] {
        Ok(())
    } else {
        Err(AppError::validation(format!("Unexpected order: {:?}", picked)))
    }
}

#[test]
fn random_selector_stays_within_targets() -> AppResult<()> {
    let urls: Vec<Arc<str>> = vec![Arc::from("a"), Arc::from("b")];
    let mut selector = TargetSelector::new(urls, Distribution::Random)?;
    for _ in 0..50 {
        let target = selector.next_target();
        if target.as_ref() != "a" && target.as_ref() != "b" {
            return Err(AppError::validation(format!("Unexpected target {}", target)));
        }
    }
    Ok(())
}

#[test]
fn selector_rejects_empty_targets() -> AppResult<()> {
    match TargetSelector::new(vec![], Distribution::RoundRobin) {
        Err(ConfigurationError::EmptyUrlList) => Ok(()),
        _ => Err(AppError::validation("Expected EmptyUrlList")),
    }
}

#[test]
fn tick_schedule_anchors_every_tick_to_start() -> AppResult<()> {
    run_paused_test(async {
        let start = Instant::now();
        let schedule = TickSchedule::new(start, 3, Duration::from_secs(2));
        if schedule.total_ticks() != 6 {
            return Err(AppError::validation(format!(
                "Expected 6 ticks, got {}",
                schedule.total_ticks()
            )));
        }
        let third = schedule.due(3).duration_since(start);
        let first = schedule.due(1).duration_since(start);
        if third != Duration::from_secs(1) || first != Duration::from_nanos(333_333_333) {
            return Err(AppError::validation(format!(
                "Unexpected due times: {:?} {:?}",
                first, third
            )));
        }
        let latest = schedule.latest_due(start + Duration::from_millis(1_700));
        if latest == 5 && schedule.interval() == Duration::from_nanos(333_333_333) {
            Ok(())
        } else {
            Err(AppError::validation(format!("Unexpected latest tick {}", latest)))
        }
    })
}

#[test]
fn zero_duration_schedule_has_no_ticks() -> AppResult<()> {
    run_paused_test(async {
        let schedule = TickSchedule::new(Instant::now(), 50, Duration::ZERO);
        let mut pacer = RatePacer::paced(schedule, TargetSelector::single(Arc::from("a")));
        let mut cancel = CancelSignal::never();
        match pacer.next_dispatch(&mut cancel).await {
            Pace::Exhausted => Ok(()),
            other => Err(AppError::validation(format!("Expected Exhausted, got {:?}", other))),
        }
    })
}

#[test]
fn immediate_pacer_emits_count_without_delay() -> AppResult<()> {
    run_paused_test(async {
        let start = Instant::now();
        let mut pacer = RatePacer::immediate(5, TargetSelector::single(Arc::from("a")));
        let mut cancel = CancelSignal::never();
        let mut seqs = Vec::new();
        loop {
            match pacer.next_dispatch(&mut cancel).await {
                Pace::Dispatch(dispatch) => seqs.push(dispatch.seq()),
                Pace::Exhausted => break,
                Pace::Cancelled => return Err(AppError::validation("Unexpected cancel")),
            }
        }
        if seqs == [0, 1, 2, 3, 4] && Instant::now() == start {
            Ok(())
        } else {
            Err(AppError::validation(format!("Unexpected dispatches {:?}", seqs)))
        }
    })
}

#[test]
fn paced_pacer_spaces_dispatches_by_interval() -> AppResult<()> {
    run_paused_test(async {
        let start = Instant::now();
        let schedule = TickSchedule::new(start, 10, Duration::from_secs(2));
        let mut pacer = RatePacer::paced(schedule, TargetSelector::single(Arc::from("a")));
        let mut cancel = CancelSignal::never();
        let mut offsets = Vec::new();
        while let Pace::Dispatch(_) = pacer.next_dispatch(&mut cancel).await {
            offsets.push(Instant::now().duration_since(start));
        }
        let expected: Vec<Duration> = (0..20).map(|n| Duration::from_millis(n * 100)).collect();
        if offsets == expected && pacer.skipped_ticks() == 0 {
            Ok(())
        } else {
            Err(AppError::validation(format!("Unexpected offsets {:?}", offsets)))
        }
    })
}

#[test]
fn late_pacer_skips_ahead_instead_of_bursting() -> AppResult<()> {
    run_paused_test(async {
        let start = Instant::now();
        let schedule = TickSchedule::new(start, 10, Duration::from_secs(2));
        let mut pacer = RatePacer::paced(schedule, TargetSelector::single(Arc::from("a")));
        let mut cancel = CancelSignal::never();
        tokio::time::advance(Duration::from_millis(550)).await;

        let first = match pacer.next_dispatch(&mut cancel).await {
            Pace::Dispatch(dispatch) => dispatch,
            other => return Err(AppError::validation(format!("Expected dispatch, got {:?}", other))),
        };
        let second_at = match pacer.next_dispatch(&mut cancel).await {
            Pace::Dispatch(_) => Instant::now().duration_since(start),
            other => return Err(AppError::validation(format!("Expected dispatch, got {:?}", other))),
        };

        let first_scheduled = first.scheduled_at().duration_since(start);
        if first.seq() == 0
            && first_scheduled == Duration::from_millis(500)
            && pacer.skipped_ticks() == 5
            && second_at == Duration::from_millis(600)
        {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "Unexpected catch-up: scheduled {:?}, skipped {}, second at {:?}",
                first_scheduled,
                pacer.skipped_ticks(),
                second_at
            )))
        }
    })
}

#[test]
fn small_lag_is_not_corrected() -> AppResult<()> {
    run_paused_test(async {
        let start = Instant::now();
        let schedule = TickSchedule::new(start, 10, Duration::from_secs(1));
        let mut pacer = RatePacer::paced(schedule, TargetSelector::single(Arc::from("a")));
        let mut cancel = CancelSignal::never();
        tokio::time::advance(Duration::from_millis(80)).await;
        match pacer.next_dispatch(&mut cancel).await {
            Pace::Dispatch(dispatch)
                if pacer.skipped_ticks() == 0 && dispatch.scheduled_at() == start =>
            {
                Ok(())
            }
            other => Err(AppError::validation(format!("Unexpected pace {:?}", other))),
        }
    })
}

#[test]
fn pacer_stops_on_cancellation() -> AppResult<()> {
    run_paused_test(async {
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let (mut cancel, _forwarder) = watch_shutdown(shutdown_rx);
        let schedule = TickSchedule::new(Instant::now(), 1, Duration::from_secs(60));
        let mut pacer = RatePacer::paced(schedule, TargetSelector::single(Arc::from("a")));

        if !matches!(pacer.next_dispatch(&mut cancel).await, Pace::Dispatch(_)) {
            return Err(AppError::validation("Expected first dispatch"));
        }
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            drop(shutdown_tx.send(()));
        });
        match pacer.next_dispatch(&mut cancel).await {
            Pace::Cancelled => Ok(()),
            other => Err(AppError::validation(format!("Expected Cancelled, got {:?}", other))),
        }
    })
}

#[test]
fn pool_bounds_concurrency_and_records_every_dispatch() -> AppResult<()> {
    run_paused_test(async {
        let transport = MockTransport::new(MockBehavior::Slow {
            status: 200,
            delay: Duration::from_millis(100),
        });
        let tpl = Arc::new(template(&["http://localhost"])?);
        let (sink, collector) = spawn_result_aggregator(None);
        let mut pool = WorkerPool::new(
            pool_settings(2),
            transport.clone(),
            tpl,
            sink,
            CancelSignal::never(),
        );
        let start = Instant::now();
        for seq in 0..6 {
            pool.submit(Dispatch::new(seq, Arc::from("http://localhost"), start));
        }
        pool.drain().await?;
        let peak = pool.peak_in_flight();
        let elapsed = Instant::now().duration_since(start);
        drop(pool);
        let stats = collector.await?.freeze(RunFacts::default());

        let waves_ok = elapsed >= Duration::from_millis(300) && elapsed < Duration::from_millis(310);
        if stats.total == 6 && stats.successes == 6 && peak == 2 && waves_ok {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "Unexpected pool run: total {}, peak {}, elapsed {:?}",
                stats.total, peak, elapsed
            )))
        }
    })
}

#[test]
fn pool_latency_correction_counts_queue_time() -> AppResult<()> {
    run_paused_test(async {
        let transport = MockTransport::new(MockBehavior::Slow {
            status: 200,
            delay: Duration::from_millis(100),
        });
        let (sink, collector) = spawn_result_aggregator(None);
        let mut pool = WorkerPool::new(
            PoolSettings {
                latency_correction: true,
                ..pool_settings(1)
            },
            transport,
            Arc::new(template(&["http://localhost"])?),
            sink,
            CancelSignal::never(),
        );
        let start = Instant::now();
        pool.submit(Dispatch::new(0, Arc::from("http://localhost"), start));
        pool.submit(Dispatch::new(1, Arc::from("http://localhost"), start));
        pool.drain().await?;
        drop(pool);
        let stats = collector.await?.freeze(RunFacts::default());
        // The second request waits 100ms for a permit before its own 100ms.
        if stats.latency.max_us == 200_000 && stats.latency.min_us == 100_000 {
            Ok(())
        } else {
            Err(AppError::validation(format!("Unexpected latency {:?}", stats.latency)))
        }
    })
}

#[test]
fn panicking_worker_still_records_an_outcome() -> AppResult<()> {
    run_paused_test(async {
        let (sink, collector) = spawn_result_aggregator(None);
        let mut pool = WorkerPool::new(
            pool_settings(2),
            MockTransport::new(MockBehavior::Panic),
            Arc::new(template(&["http://localhost"])?),
            sink,
            CancelSignal::never(),
        );
        for seq in 0..3 {
            pool.submit(Dispatch::new(seq, Arc::from("http://localhost"), Instant::now()));
        }
        pool.drain().await?;
        drop(pool);
        let stats = collector.await?.freeze(RunFacts::default());

        if stats.total == 3
            && stats.transport_errors_of(TransportErrorKind::Other) == 3
            && stats.kinds_total() == stats.total
        {
            Ok(())
        } else {
            Err(AppError::validation(format!("Unexpected panicked run {:?}", stats)))
        }
    })
}

#[test]
fn pool_cancels_queued_and_aborts_in_flight() -> AppResult<()> {
    run_paused_test(async {
        let transport = MockTransport::new(MockBehavior::Slow {
            status: 200,
            delay: Duration::from_secs(60),
        });
        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let (cancel, _forwarder) = watch_shutdown(shutdown_rx);
        let (sink, collector) = spawn_result_aggregator(None);
        let mut pool = WorkerPool::new(
            pool_settings(2),
            transport.clone(),
            Arc::new(template(&["http://localhost"])?),
            sink,
            cancel,
        );
        for seq in 0..5 {
            pool.submit(Dispatch::new(seq, Arc::from("http://localhost"), Instant::now()));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(shutdown_tx.send(()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        pool.abort_in_flight();
        pool.drain().await?;
        drop(pool);
        let stats = collector.await?.freeze(RunFacts::default());

        if stats.total == 5
            && stats.transport_errors_of(TransportErrorKind::Cancelled) == 5
            && transport.calls() == 2
        {
            Ok(())
        } else {
            Err(AppError::validation(format!(
                "Unexpected cancel accounting: total {}, calls {}",
                stats.total,
                transport.calls()
            )))
        }
    })
}

async fn serve_once(listener: TcpListener, response: &'static [u8]) -> AppResult<()> {
    let (mut stream, _) = listener.accept().await?;
    let mut buf = vec![0_u8; 4096];
    let _ = stream.read(&mut buf).await?;
    stream.write_all(response).await?;
    stream.flush().await?;
    Ok(())
}

#[test]
fn reqwest_transport_reports_status_and_body_size() -> AppResult<()> {
    run_async_test(async {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(serve_once(
            listener,
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 5\r\nConnection: close\r\n\r\nnope!",
        ));

        let transport = ReqwestTransport::new(&ClientOptions::default())?;
        let tpl = template(&[&format!("http://{}/missing", addr)])?;
        let dispatch = Dispatch::new(0, first_url(&tpl)?, Instant::now());
        let response = transport
            .send(&tpl.resolve(&dispatch), Duration::from_secs(5))
            .await
            .map_err(|kind| AppError::validation(format!("Transport failed: {}", kind.as_str())))?;
        server.await??;

        if response == (TransportResponse { status: 404, body_bytes: 5 }) {
            Ok(())
        } else {
            Err(AppError::validation(format!("Unexpected response {:?}", response)))
        }
    })
}

#[test]
fn reqwest_transport_classifies_refused_connection() -> AppResult<()> {
    run_async_test(async {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
            listener.local_addr()?.port()
        };
        let transport = ReqwestTransport::new(&ClientOptions::default())?;
        let tpl = template(&[&format!("http://127.0.0.1:{}/", port)])?;
        let dispatch = Dispatch::new(0, first_url(&tpl)?, Instant::now());
        match transport
            .send(&tpl.resolve(&dispatch), Duration::from_secs(5))
            .await
        {
            Err(TransportErrorKind::Connect) => Ok(()),
            other => Err(AppError::validation(format!("Expected connect error, got {:?}", other))),
        }
    })
}

#[test]
fn reqwest_transport_times_out_slow_server() -> AppResult<()> {
    run_async_test(async {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                tokio::time::sleep(Duration::from_millis(500)).await;
                drop(stream);
            }
        });
        let transport = ReqwestTransport::new(&ClientOptions::default())?;
        let tpl = template(&[&format!("http://{}/", addr)])?;
        let dispatch = Dispatch::new(0, first_url(&tpl)?, Instant::now());
        let result = transport
            .send(&tpl.resolve(&dispatch), Duration::from_millis(50))
            .await;
        server.abort();
        match result {
            Err(TransportErrorKind::Timeout) => Ok(()),
            other => Err(AppError::validation(format!("Expected timeout, got {:?}", other))),
        }
    })
}
