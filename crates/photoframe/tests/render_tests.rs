//! Rendering screens from image files on disk and over HTTP

use image::{DynamicImage, Rgb, RgbImage};
use photoframe::config::ScreenConfig;
use photoframe::render::{RenderSettings, ScreenRenderer, render_file};
use photoframe::scheduler::ImageProducer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

const SETTINGS: RenderSettings = RenderSettings {
    width: 800,
    height: 600,
    jpeg_quality: 90,
};

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 200, 40])))
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Serve one HTTP response per connection, returning the base URL and the
/// request lines seen
async fn serve(status: &'static str, body: Vec<u8>) -> (String, UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let text = String::from_utf8_lossy(&request);
            let _ = tx.send(text.lines().next().unwrap_or_default().to_string());

            let header = format!(
                "HTTP/1.1 {}\r\nContent-Type: image/png\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            );
            let _ = stream.write_all(header.as_bytes()).await;
            let _ = stream.write_all(&body).await;
            let _ = stream.shutdown().await;
        }
    });

    (format!("http://{}", addr), rx)
}

fn http_renderer(url: String) -> ScreenRenderer {
    let mut screen = ScreenConfig::image_file("unused");
    screen.url = Some(url);
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    ScreenRenderer::with_client(vec![screen], SETTINGS, client)
}

fn write_png(path: &std::path::Path, width: u32, height: u32) {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 40, 40])))
        .save(path)
        .unwrap();
}

#[tokio::test]
async fn test_render_file_to_display_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tall.png");
    write_png(&path, 300, 900);

    let jpeg = render_file(path, SETTINGS).await.unwrap();

    assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (800, 600));
}

#[tokio::test]
async fn test_renderer_wraps_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("one.png");
    write_png(&path, 64, 48);

    let renderer = ScreenRenderer::new(
        vec![ScreenConfig::image_file(path.to_string_lossy())],
        SETTINGS,
    );

    assert!(renderer.render_screen(0).await.is_some());
    assert!(renderer.render_screen(3).await.is_some());
}

#[tokio::test]
async fn test_file_url_source() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("url.png");
    write_png(&path, 10, 10);

    let mut screen = ScreenConfig::image_file("unused");
    screen.location = None;
    screen.url = Some(format!("file://{}", path.display()));

    let renderer = ScreenRenderer::new(vec![screen], SETTINGS);
    assert!(renderer.render_screen(0).await.is_some());
}

#[tokio::test]
async fn test_unsupported_sources_yield_none() {
    let mut html = ScreenConfig::image_file("unused");
    html.kind = photoframe::config::ScreenType::Html;
    html.url = Some("https://example.com".to_string());

    let mut ftp = ScreenConfig::image_file("unused");
    ftp.url = Some("ftp://example.com/picture.jpg".to_string());

    let renderer = ScreenRenderer::new(vec![html, ftp], SETTINGS);
    assert!(renderer.render_screen(0).await.is_none());
    assert!(renderer.render_screen(1).await.is_none());

    let empty = ScreenRenderer::new(Vec::new(), SETTINGS);
    assert!(empty.render_screen(0).await.is_none());
}

mod http {
    use super::*;

    #[tokio::test]
    async fn test_fetched_image_is_composed() {
        let (base, mut requests) = serve("200 OK", png_bytes(160, 90)).await;
        let renderer = http_renderer(format!("{}/snapshots/{{HH}}.png", base));

        let jpeg = renderer.render_screen(0).await.unwrap();

        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (800, 600));

        // The hour placeholder was expanded before the request went out
        let request_line = requests.recv().await.unwrap();
        assert!(request_line.starts_with("GET /snapshots/"));
        assert!(!request_line.contains("{HH}"));
        assert!(!request_line.contains("%7BHH%7D"));
    }

    #[tokio::test]
    async fn test_http_error_status_yields_none() {
        let (base, _requests) = serve("404 Not Found", b"missing".to_vec()).await;
        let renderer = http_renderer(format!("{}/gone.png", base));

        assert!(renderer.render_screen(0).await.is_none());
    }

    #[tokio::test]
    async fn test_non_image_body_yields_none() {
        let (base, _requests) = serve("200 OK", b"<html>nope</html>".to_vec()).await;
        let renderer = http_renderer(format!("{}/page", base));

        assert!(renderer.render_screen(0).await.is_none());
    }

    #[tokio::test]
    async fn test_unreachable_host_yields_none() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let renderer = http_renderer(format!("http://{}/frame.png", addr));
        assert!(renderer.render_screen(0).await.is_none());
    }
}

#[tokio::test]
async fn test_corrupt_file_yields_none() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jpg");
    std::fs::write(&path, b"definitely not a jpeg").unwrap();

    let renderer = ScreenRenderer::new(
        vec![ScreenConfig::image_file(path.to_string_lossy())],
        SETTINGS,
    );
    assert!(renderer.render_screen(0).await.is_none());
}
