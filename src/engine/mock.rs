//! In-process engine and probe doubles for unit tests, plus a tiny HTTP
//! server for the code paths that really go over the network.

use super::{DocumentOptions, EngineDocument, EngineModule, EnginePage, RenderEngine, Surface, Viewport};
use crate::config::ResourceLocation;
use crate::error::{EngineError, ProbeError};
use crate::loader::{ResourceProbe, WorkerSource};
use futures::future::{BoxFuture, FutureExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// US Letter in points.
pub(crate) const LETTER: (f32, f32) = (612.0, 792.0);

pub(crate) struct MockModule {
    loads: AtomicUsize,
    binds: AtomicUsize,
    bind_failures_left: AtomicUsize,
    load_panics_left: AtomicUsize,
    fail_load: bool,
    bind_delay: Duration,
    pages: Vec<(f32, f32)>,
    bound_to: Mutex<Option<ResourceLocation>>,
}

impl Default for MockModule {
    fn default() -> Self {
        Self {
            loads: AtomicUsize::new(0),
            binds: AtomicUsize::new(0),
            bind_failures_left: AtomicUsize::new(0),
            load_panics_left: AtomicUsize::new(0),
            fail_load: false,
            bind_delay: Duration::ZERO,
            pages: vec![LETTER],
            bound_to: Mutex::new(None),
        }
    }
}

impl MockModule {
    pub(crate) fn with_pages(mut self, pages: Vec<(f32, f32)>) -> Self {
        self.pages = pages;
        self
    }

    pub(crate) fn with_bind_delay(mut self, delay: Duration) -> Self {
        self.bind_delay = delay;
        self
    }

    /// The next `n` binds fail.
    pub(crate) fn failing_binds(self, n: usize) -> Self {
        self.bind_failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` loads panic.
    pub(crate) fn panicking_loads(self, n: usize) -> Self {
        self.load_panics_left.store(n, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub(crate) fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub(crate) fn binds(&self) -> usize {
        self.binds.load(Ordering::SeqCst)
    }

    pub(crate) fn bound_to(&self) -> Option<ResourceLocation> {
        self.bound_to.lock().unwrap().clone()
    }
}

impl EngineModule for MockModule {
    fn name(&self) -> &str {
        "mock"
    }

    fn version(&self) -> &str {
        "0.0.0"
    }

    fn load(&self) -> Result<(), EngineError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self
            .load_panics_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            panic!("module initialiser blew up");
        }
        if self.fail_load {
            return Err(EngineError::new("module unavailable"));
        }
        Ok(())
    }

    fn bind(&self, worker: &WorkerSource) -> Result<Arc<dyn RenderEngine>, EngineError> {
        self.binds.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.bind_delay);
        *self.bound_to.lock().unwrap() = Some(worker.location.clone());

        let failing = self
            .bind_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::new("worker script failed to start"));
        }

        Ok(Arc::new(MockEngine {
            pages: self.pages.clone(),
        }))
    }
}

pub(crate) struct MockEngine {
    pages: Vec<(f32, f32)>,
}

impl RenderEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    fn open_document(
        &self,
        bytes: Vec<u8>,
        _options: &DocumentOptions,
    ) -> Result<Box<dyn EngineDocument + '_>, EngineError> {
        if !bytes.starts_with(b"%PDF") {
            return Err(EngineError::new("Invalid PDF structure"));
        }
        Ok(Box::new(MockDocument { pages: &self.pages }))
    }
}

struct MockDocument<'a> {
    pages: &'a [(f32, f32)],
}

impl EngineDocument for MockDocument<'_> {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page(&self, number: usize) -> Result<Box<dyn EnginePage + '_>, EngineError> {
        let &(width, height) = number
            .checked_sub(1)
            .and_then(|i| self.pages.get(i))
            .ok_or_else(|| EngineError::new(format!("no page {number}")))?;
        Ok(Box::new(MockPage { width, height }))
    }
}

struct MockPage {
    width: f32,
    height: f32,
}

impl EnginePage for MockPage {
    fn viewport(&self, scale: f32) -> Viewport {
        Viewport::new(self.width, self.height, scale)
    }

    fn render(&self, _viewport: &Viewport, surface: &mut Surface, _smoothing: bool) -> Result<(), EngineError> {
        surface.fill([255, 255, 255, 255]);
        Ok(())
    }
}

pub(crate) struct MockProbe {
    calls: AtomicUsize,
    exists: bool,
}

impl MockProbe {
    pub(crate) fn found() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            exists: true,
        }
    }

    pub(crate) fn missing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            exists: false,
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ResourceProbe for MockProbe {
    fn probe<'a>(&'a self, location: &'a ResourceLocation) -> BoxFuture<'a, Result<(), ProbeError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = if self.exists {
            Ok(())
        } else {
            Err(ProbeError::Status {
                url: location.to_string(),
                status: 404,
            })
        };
        async move { outcome }.boxed()
    }
}

/// Serve HTTP on an ephemeral local port until the test ends.
///
/// `respond` gets the request line (`"HEAD /x HTTP/1.1"`) and returns the
/// raw response, status line included. Returns the base URL.
pub(crate) async fn serve_http<F>(respond: F) -> String
where
    F: Fn(&str) -> Vec<u8> + Send + Sync + 'static,
{
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let respond = Arc::new(respond);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let respond = Arc::clone(&respond);
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream);
                let mut request_line = String::new();
                if reader.read_line(&mut request_line).await.is_err() {
                    return;
                }
                let mut header = String::new();
                while reader.read_line(&mut header).await.is_ok_and(|n| n > 2) {
                    header.clear();
                }

                let response = respond(request_line.trim_end());
                let mut stream = reader.into_inner();
                // the client may hang up early
                let _ = stream.write_all(&response).await;
                let _ = stream.shutdown().await;
            });
        }
    });

    base
}

/// A complete response with a `Content-Length` body.
pub(crate) fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n", body.len());
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str("\r\n");

    let mut response = head.into_bytes();
    response.extend_from_slice(body);
    response
}
