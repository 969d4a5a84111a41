// src/reload/http.rs

//! Static file server for `serve`.
//!
//! Serves the build output directory over HTTP and injects a small client
//! script into every HTML page. The script connects to the live-reload
//! WebSocket server and reloads the page on each `reload` message.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderValue, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower_http::services::ServeDir;
use tracing::{info, warn};

/// Path the injected `<script>` tag loads the client from.
pub const CLIENT_PATH: &str = "/__assetpipe/reload.js";

/// Pages larger than this are served without the client script.
const MAX_INJECT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct StaticServer {
    addr: SocketAddr,
    dir: PathBuf,
    shutdown: Option<oneshot::Sender<()>>,
}

impl StaticServer {
    /// Bind `host:port` and serve `dir` in the background. Injected pages
    /// connect to the reload server on `ws_port`.
    ///
    /// Port 0 picks a free port; see [`StaticServer::local_addr`].
    pub async fn start(host: &str, port: u16, dir: &Path, ws_port: u16) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let app = router(dir, ws_port);
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = server.await {
                warn!(error = %e, "static file server stopped");
            }
        });

        info!(%addr, dir = %dir.display(), "serving build output");
        Ok(Self {
            addr,
            dir: dir.to_path_buf(),
            shutdown: Some(shutdown),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Drop for StaticServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// Routes: the client script at [`CLIENT_PATH`], everything else from `dir`.
pub fn router(dir: &Path, ws_port: u16) -> Router {
    let script: Arc<str> = client_script(ws_port).into();
    Router::new()
        .route(CLIENT_PATH, get(serve_client))
        .fallback_service(ServeDir::new(dir))
        .layer(middleware::from_fn(inject_into_html))
        .with_state(script)
}

async fn serve_client(State(script): State<Arc<str>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/javascript; charset=utf-8")],
        script.to_string(),
    )
}

async fn inject_into_html(req: Request, next: Next) -> Response {
    let res = next.run(req).await;
    let is_html = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return res;
    }

    let (mut parts, body) = res.into_parts();
    let bytes = match to_bytes(body, MAX_INJECT_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "could not buffer page for reload client");
            return Response::from_parts(parts, Body::empty());
        }
    };

    let page = inject_client(&String::from_utf8_lossy(&bytes));
    parts.headers.remove(header::CONTENT_LENGTH);
    parts
        .headers
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    Response::from_parts(parts, Body::from(page))
}

/// Insert the client `<script>` before the last `</body>`, or append it.
pub fn inject_client(html: &str) -> String {
    let tag = format!(r#"<script src="{CLIENT_PATH}"></script>"#);
    match html.to_ascii_lowercase().rfind("</body>") {
        Some(at) => format!("{}{tag}{}", &html[..at], &html[at..]),
        None => format!("{html}{tag}"),
    }
}

fn client_script(ws_port: u16) -> String {
    format!(
        r#"(function () {{
  var url = "ws://" + (location.hostname || "127.0.0.1") + ":{ws_port}";
  function connect() {{
    var ws = new WebSocket(url);
    ws.onmessage = function (event) {{
      var msg = JSON.parse(event.data);
      if (msg.type === "reload") location.reload();
    }};
    ws.onclose = function () {{ setTimeout(connect, 1000); }};
  }}
  connect();
}})();
"#
    )
}
