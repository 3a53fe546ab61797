//! A search box that debounces keystrokes and sends each settled query through a
//! dedup → rate-limit → retry → timeout stack.
//!
//! Run with `cargo run --example search_box`.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use call_shaping::shaping::{
    Debounce, DebounceSettings, Deduplicator, QueueError, RateLimitSettings, RateLimiter, Retry,
    RetrySettings, TimeoutError, with_timeout,
};
use tokio::{sync::mpsc, time::sleep};
use tracing::info;

type SearchError = Arc<QueueError<TimeoutError<io::Error>>>;

static BACKEND_CALLS: AtomicUsize = AtomicUsize::new(0);

/// A flaky backend: every third call stalls past the deadline.
async fn search_backend(query: String) -> Result<Vec<String>, io::Error> {
    let call = BACKEND_CALLS.fetch_add(1, Ordering::SeqCst);
    let latency = if call % 3 == 2 { 2_000 } else { 80 };
    sleep(Duration::from_millis(latency)).await;
    Ok((1..=3).map(|n| format!("{query} result {n}")).collect())
}

#[derive(Clone)]
struct SearchClient {
    dedup: Deduplicator<String, Vec<String>, SearchError>,
    limiter: RateLimiter,
    retry: Retry,
}

impl SearchClient {
    fn new() -> Result<Self, call_shaping::Error> {
        Ok(Self {
            dedup: Deduplicator::new()?,
            limiter: RateLimiter::new(
                RateLimitSettings::builder()
                    .max_requests(2)
                    .interval(Duration::from_secs(1))
                    .build(),
            )?,
            retry: Retry::new(
                RetrySettings::builder()
                    .max_retries(2)
                    .delay(Duration::from_millis(200))
                    .build(),
            )?,
        })
    }

    async fn search(&self, query: String) -> Result<Vec<String>, SearchError> {
        let limiter = self.limiter.clone();
        let retry = self.retry;
        let key = query.clone();
        self.dedup
            .execute(key, move || async move {
                limiter
                    .execute(move || {
                        retry.run(move || {
                            with_timeout(search_backend(query.clone()), Duration::from_millis(500))
                        })
                    })
                    .await
                    .map_err(Arc::new)
            })
            .await
    }
}

#[tokio::main]
async fn main() -> Result<(), call_shaping::Error> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let client = SearchClient::new()?;
    let (queries, mut settled) = mpsc::unbounded_channel::<String>();

    let on_input = Debounce::new(
        move |query: String| {
            let _ = queries.send(query);
        },
        DebounceSettings::builder()
            .wait(Duration::from_millis(150))
            .max_wait(Duration::from_millis(600))
            .build(),
    )?;

    let typing = tokio::spawn(async move {
        for word in ["rust", "tokio"] {
            let mut typed = String::new();
            for ch in word.chars() {
                typed.push(ch);
                on_input.call(typed.clone());
                sleep(Duration::from_millis(60)).await;
            }
            sleep(Duration::from_millis(400)).await;
        }
        on_input.flush();
    });

    let mut searches = Vec::new();
    while let Some(query) = settled.recv().await {
        info!(message = "Query settled.", %query);
        let client = client.clone();
        searches.push(tokio::spawn(async move {
            let outcome = client.search(query.clone()).await;
            (query, outcome)
        }));
    }
    typing.await?;

    for search in searches {
        match search.await? {
            (query, Ok(results)) => info!(message = "Search finished.", %query, ?results),
            (query, Err(error)) => info!(message = "Search failed.", %query, %error),
        }
    }

    Ok(())
}
