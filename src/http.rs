use std::io;
use std::thread;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("HTTP status {status}{detail}")]
    Status { status: u16, detail: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("response decode failed: {0}")]
    Decode(#[source] io::Error),

    #[error("request failed after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<FetchError>,
    },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct RequestPolicy {
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
    pub(crate) attempts: usize,
    pub(crate) retry_delay: Duration,
}

fn should_retry_http_status(status: u16) -> bool {
    status == 408 || status == 429 || (500..=599).contains(&status)
}

fn status_error(status: u16, response: ureq::Response) -> FetchError {
    let response_body = response.into_string().ok().unwrap_or_default();
    let body = response_body.trim();
    let detail = if body.is_empty() {
        String::new()
    } else {
        let truncated = body.chars().take(240).collect::<String>();
        format!(" ({truncated})")
    };
    FetchError::Status { status, detail }
}

/// GETs `url` and returns the body, retrying retryable statuses and transport errors.
pub(crate) fn get_text_with_retries(url: &str, policy: &RequestPolicy) -> Result<String, FetchError> {
    let attempts = policy.attempts.max(1);
    let agent = ureq::AgentBuilder::new()
        .timeout_connect(policy.connect_timeout)
        .timeout_read(policy.read_timeout)
        .timeout_write(policy.read_timeout)
        .build();

    let mut last_error = None;
    for attempt in 1..=attempts {
        let err = match agent.get(url).set("Accept", "application/json").call() {
            Ok(response) => return response.into_string().map_err(FetchError::Decode),
            Err(ureq::Error::Status(status, response)) => {
                let err = status_error(status, response);
                if !should_retry_http_status(status) {
                    return Err(err);
                }
                err
            }
            Err(ureq::Error::Transport(err)) => FetchError::Transport(err.to_string()),
        };

        tracing::debug!(url, attempt, attempts, error = %err, "listing request attempt failed");
        last_error = Some(err);
        if attempt < attempts {
            thread::sleep(policy.retry_delay);
        }
    }

    let last = last_error.unwrap_or_else(|| {
        FetchError::Transport("exhausted attempts without a concrete error".to_string())
    });
    if attempts == 1 {
        return Err(last);
    }
    Err(FetchError::Exhausted {
        attempts,
        last: Box::new(last),
    })
}

/// Local HTTP server that answers each connection with the next scripted reply.
#[cfg(test)]
pub(crate) mod test_server {
    use std::collections::VecDeque;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{SocketAddr, TcpListener, TcpStream};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    #[derive(Debug, Clone)]
    pub(crate) struct Reply {
        status: u16,
        body: String,
        delay: Duration,
    }

    impl Reply {
        pub(crate) fn ok(body: &str) -> Self {
            Self::status(200, body)
        }

        pub(crate) fn status(status: u16, body: &str) -> Self {
            Self {
                status,
                body: body.to_string(),
                delay: Duration::ZERO,
            }
        }

        /// Holds the response back for `delay` after reading the request.
        pub(crate) fn after(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn send(self, stream: TcpStream) {
            let mut reader = BufReader::new(&stream);
            let mut line = String::new();
            while reader.read_line(&mut line).is_ok_and(|read| read > 0)
                && !line.trim().is_empty()
            {
                line.clear();
            }

            thread::sleep(self.delay);
            let mut stream = &stream;
            let _ = write!(
                stream,
                "HTTP/1.1 {} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                self.status,
                self.body.len(),
                self.body
            );
            let _ = stream.flush();
        }
    }

    #[derive(Debug)]
    pub(crate) struct TestServer {
        addr: SocketAddr,
        requests: Arc<AtomicUsize>,
        closing: Arc<AtomicBool>,
        accept_thread: Option<JoinHandle<()>>,
    }

    impl TestServer {
        pub(crate) fn spawn(script: Vec<Reply>) -> Self {
            let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind test server");
            let addr = listener.local_addr().expect("local addr");
            let requests = Arc::new(AtomicUsize::new(0));
            let closing = Arc::new(AtomicBool::new(false));

            let accept_thread = {
                let requests = Arc::clone(&requests);
                let closing = Arc::clone(&closing);
                let mut script = VecDeque::from(script);
                thread::spawn(move || {
                    for stream in listener.incoming() {
                        if closing.load(Ordering::SeqCst) {
                            break;
                        }
                        let Ok(stream) = stream else { break };
                        requests.fetch_add(1, Ordering::SeqCst);
                        let reply = script
                            .pop_front()
                            .unwrap_or_else(|| Reply::status(404, "script exhausted"));
                        thread::spawn(move || reply.send(stream));
                    }
                })
            };

            Self {
                addr,
                requests,
                closing,
                accept_thread: Some(accept_thread),
            }
        }

        pub(crate) fn listing_url(&self) -> String {
            format!("http://{}/listing", self.addr)
        }

        pub(crate) fn request_count(&self) -> usize {
            self.requests.load(Ordering::SeqCst)
        }
    }

    impl Drop for TestServer {
        fn drop(&mut self) {
            self.closing.store(true, Ordering::SeqCst);
            // Wake the blocking accept so the thread sees the flag.
            let _ = TcpStream::connect(self.addr);
            if let Some(handle) = self.accept_thread.take() {
                let _ = handle.join();
            }
        }
    }
}
