use tokio::sync::mpsc;
use url::Url;

use crate::error::{Result, SyncError};

/// Runs `fut` on the runtime and hands its output back to the event loop.
pub fn run_async_to_loop<T, Fut>(tx: &mpsc::UnboundedSender<T>, fut: Fut)
where
    T: Send + 'static,
    Fut: std::future::Future<Output = T> + Send + 'static,
{
    let tx = tx.clone();
    tokio::spawn(async move {
        let res = fut.await;
        // The loop is gone when the session ends; nothing left to deliver to.
        let _ = tx.send(res);
    });
}

pub fn normalize_url(input: &str) -> String {
    let trimmed = input.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

/// WebSocket endpoint served next to the REST API: same host, `ws`/`wss`, `/events`.
pub fn stream_url_for(backend_url: &str) -> Result<Url> {
    let mut url = Url::parse(&normalize_url(backend_url))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|()| SyncError::Config(format!("cannot derive a stream url from {url}")))?;
    url.set_path("/events");
    url.set_query(None);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adds_scheme_and_trims() {
        assert_eq!(normalize_url(" chat.example.com/ "), "https://chat.example.com");
        assert_eq!(normalize_url("http://localhost:5000/"), "http://localhost:5000");
        assert_eq!(normalize_url("ws://localhost:5000"), "ws://localhost:5000");
    }

    #[test]
    fn derives_stream_url() {
        assert_eq!(
            stream_url_for("http://localhost:5000").unwrap().as_str(),
            "ws://localhost:5000/events"
        );
        assert_eq!(
            stream_url_for("https://chat.example.com/api").unwrap().as_str(),
            "wss://chat.example.com/events"
        );
    }

    #[test]
    fn non_web_backend_has_no_stream_url() {
        assert!(matches!(stream_url_for("file:///tmp/x"), Err(SyncError::Config(_))));
        assert!(matches!(
            stream_url_for("mailto:ops@example.com"),
            Err(SyncError::Config(_))
        ));
    }

    #[tokio::test]
    async fn async_result_reaches_loop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        run_async_to_loop(&tx, async { 41 + 1 });
        assert_eq!(rx.recv().await, Some(42));
    }
}
