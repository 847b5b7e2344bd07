use std::io::Cursor;
use std::sync::Mutex;
use std::time::Duration;

use actix_web::{web, App, HttpResponse, HttpServer};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use shared::TaskResult;

use crate::mq::{PublishError, ResultPublisher};

pub fn sample_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 128]));
    DynamicImage::ImageRgb8(img)
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    sample_image(width, height)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

struct Fixture {
    png: Vec<u8>,
}

async fn serve_image(fixture: web::Data<Fixture>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("image/png")
        .body(fixture.png.clone())
}

async fn serve_partial(fixture: web::Data<Fixture>) -> HttpResponse {
    HttpResponse::PartialContent()
        .content_type("image/png")
        .body(fixture.png.clone())
}

async fn serve_garbage() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("image/png")
        .body("definitely not a png")
}

/// Starts an HTTP server on an ephemeral loopback port and returns its base URL.
/// Must be called from inside an actix runtime.
pub fn spawn_fixture_server() -> String {
    let fixture = web::Data::new(Fixture {
        png: png_bytes(64, 48),
    });
    let server = HttpServer::new(move || {
        App::new()
            .app_data(fixture.clone())
            .route("/image.png", web::get().to(serve_image))
            .route("/partial.png", web::get().to(serve_partial))
            .route("/garbage.png", web::get().to(serve_garbage))
    })
    .workers(1)
    .bind(("127.0.0.1", 0))
    .unwrap();

    let addr = server.addrs()[0];
    actix_web::rt::spawn(server.run());
    format!("http://{}", addr)
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<TaskResult>>,
}

impl RecordingPublisher {
    pub fn published(&self) -> Vec<TaskResult> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResultPublisher for RecordingPublisher {
    async fn publish(&self, result: &TaskResult) -> Result<(), PublishError> {
        self.published.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// Behaves like a broker that never answers the connection attempt.
pub struct UnreachablePublisher;

#[async_trait]
impl ResultPublisher for UnreachablePublisher {
    async fn publish(&self, _result: &TaskResult) -> Result<(), PublishError> {
        Err(PublishError::ConnectTimeout(Duration::from_secs(30)))
    }
}
