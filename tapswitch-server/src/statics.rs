//! Minimal static file responder for `/`.

use std::path::{Component, Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Serve one GET request from `dir`, then let the connection close.
pub async fn respond<S>(
    mut stream: S,
    method: &str,
    path: &str,
    dir: Option<&Path>,
) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let Some(dir) = dir else {
        return write_status(&mut stream, 404, "Not Found").await;
    };
    if method != "GET" {
        return write_status(&mut stream, 405, "Method Not Allowed").await;
    }
    let Some(file) = resolve(dir, path) else {
        return write_status(&mut stream, 404, "Not Found").await;
    };

    match tokio::fs::read(&file).await {
        Ok(body) => {
            debug!(file = %file.display(), bytes = body.len(), "serving static file");
            let head = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                content_type(&file),
                body.len()
            );
            stream.write_all(head.as_bytes()).await?;
            stream.write_all(&body).await?;
            stream.flush().await?;
            stream.shutdown().await
        }
        Err(_) => write_status(&mut stream, 404, "Not Found").await,
    }
}

/// Map a request path onto a file below `dir`, refusing any traversal.
fn resolve(dir: &Path, path: &str) -> Option<PathBuf> {
    let path = path.strip_prefix('/')?;
    let path = if path.is_empty() { "index.html" } else { path };

    let relative = Path::new(path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(dir.join(relative))
}

fn content_type(file: &Path) -> &'static str {
    match file.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("json") => "application/json",
        Some("wasm") => "application/wasm",
        Some("png") => "image/png",
        Some("ico") => "image/x-icon",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

async fn write_status<S>(stream: &mut S, code: u16, reason: &str) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    let body = format!("{} {}\n", code, reason);
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        code,
        reason,
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.flush().await?;
    stream.shutdown().await
}
