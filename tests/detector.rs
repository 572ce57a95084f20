// 该文件是 Anjian （安检） 项目的一部分。
// tests/detector.rs - HTTP 检测服务集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use tokio::{
  io::{AsyncReadExt, AsyncWriteExt},
  net::TcpListener,
  task::JoinHandle,
};
use url::Url;

use anjian::{
  FromUrl,
  detection::ConfidenceThreshold,
  detector::{Detector, DetectorError, HttpDetector},
  input::ImageUpload,
};

fn upload() -> ImageUpload {
  let mut bytes = Cursor::new(Vec::new());
  RgbImage::new(8, 6)
    .write_to(&mut bytes, ImageFormat::Png)
    .unwrap();
  ImageUpload::from_bytes("bag.png", bytes.into_inner()).unwrap()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
  haystack
    .windows(needle.len())
    .position(|window| window == needle)
}

fn content_length(head: &str) -> Option<usize> {
  head.lines().find_map(|line| {
    let (name, value) = line.split_once(':')?;
    name
      .trim()
      .eq_ignore_ascii_case("content-length")
      .then(|| value.trim().parse().ok())
      .flatten()
  })
}

/// 只应答一次请求的 HTTP 服务，返回收到的完整请求
async fn serve_once(status: &'static str, body: &'static str) -> (Url, JoinHandle<String>) {
  let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
  let address = listener.local_addr().unwrap();
  let url = Url::parse(&format!("http://{}/api/v1/detect", address)).unwrap();

  let handle = tokio::spawn(async move {
    let (mut stream, _) = listener.accept().await.unwrap();
    let mut request = Vec::new();
    let mut buffer = [0u8; 4096];
    loop {
      let n = stream.read(&mut buffer).await.unwrap();
      if n == 0 {
        break;
      }
      request.extend_from_slice(&buffer[..n]);
      let Some(end) = find(&request, b"\r\n\r\n") else {
        continue;
      };
      let head = String::from_utf8_lossy(&request[..end]).into_owned();
      let complete = match content_length(&head) {
        Some(length) => request.len() >= end + 4 + length,
        None => request.ends_with(b"0\r\n\r\n"),
      };
      if complete {
        break;
      }
    }

    let response = format!(
      "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
      status,
      body.len(),
      body
    );
    stream.write_all(response.as_bytes()).await.unwrap();
    stream.shutdown().await.unwrap();
    String::from_utf8_lossy(&request).into_owned()
  });

  (url, handle)
}

#[tokio::test]
async fn posts_image_and_confidence_as_multipart() {
  let (url, server) = serve_once("200 OK", "[]").await;
  let detector = HttpDetector::from_url(&url).unwrap();

  let threshold = ConfidenceThreshold::parse("0.7").unwrap();
  let payload = detector.detect(&upload(), threshold).await.unwrap();
  assert_eq!(payload.as_array().map(Vec::len), Some(0));

  let request = server.await.unwrap();
  assert!(request.starts_with("POST /api/v1/detect "));
  assert!(request.contains("multipart/form-data; boundary="));
  assert!(request.contains("name=\"image\"; filename=\"bag.png\""));
  assert!(request.contains("Content-Type: image/png"));
  assert!(request.contains("name=\"confidence\"\r\n\r\n0.7\r\n"));
}

#[tokio::test]
async fn error_status_is_a_failure() {
  let (url, server) = serve_once("500 Internal Server Error", r#"{"detail":"boom"}"#).await;
  let detector = HttpDetector::from_url(&url).unwrap();

  let result = detector
    .detect(&upload(), ConfidenceThreshold::default())
    .await;
  match result {
    Err(DetectorError::Status(500, body)) => assert!(body.contains("boom")),
    other => panic!("unexpected result {:?}", other),
  }
  server.await.unwrap();
}

#[tokio::test]
async fn detections_are_returned_unfiltered() {
  let (url, server) = serve_once(
    "200 OK",
    r#"[{"label":"knife","confidence":0.3,"box":[1,2,3,4]}]"#,
  )
  .await;
  let detector = HttpDetector::from_url(&url).unwrap();

  let payload = detector
    .detect(&upload(), ConfidenceThreshold::default())
    .await
    .unwrap();
  assert_eq!(payload[0]["label"], "knife");
  server.await.unwrap();
}
