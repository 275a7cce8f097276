mod detect;
mod health;
mod metrics;

use crate::server::SharedState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/detect", post(detect::detect))
        .route("/health", get(health::healthcheck))
        .route("/metrics", get(metrics::metrics_handler))
}

#[cfg(test)]
mod tests {
    use crate::{
        model_service::{HandDetection, HandDetector, ModelError},
        server::{build_router, SharedState},
        telemetry::Metrics,
    };
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use http_body_util::BodyExt;
    use image::{ImageBuffer, Rgb, RgbImage};
    use serde_json::Value;
    use std::{io::Cursor, sync::Arc};
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-HAND-DETECTION-BOUNDARY";

    /// Reports a hand whenever the top-left pixel is pure white.
    struct MockDetector {}

    #[async_trait]
    impl HandDetector for MockDetector {
        async fn detect(&self, image: RgbImage) -> Result<HandDetection, ModelError> {
            if image.get_pixel(0, 0).0 == [255, 255, 255] {
                Ok(HandDetection {
                    present: true,
                    best_score: 0.91,
                })
            } else {
                Ok(HandDetection::none())
            }
        }
    }

    struct FailingDetector {}

    #[async_trait]
    impl HandDetector for FailingDetector {
        async fn detect(&self, _image: RgbImage) -> Result<HandDetection, ModelError> {
            Err(ModelError::Inference("session crashed".to_string()))
        }
    }

    fn router_with(detector: Arc<dyn HandDetector>, report_detector_score: bool) -> Router {
        let state = SharedState {
            detector,
            metrics: Arc::new(Metrics::new().unwrap()),
            report_detector_score,
        };
        build_router(state, 16 * 1024 * 1024)
    }

    fn png(color: [u8; 3]) -> Vec<u8> {
        let img = ImageBuffer::<Rgb<u8>, Vec<u8>>::from_pixel(32, 32, Rgb(color));
        let mut image_data: Vec<u8> = Vec::new();
        img.write_to(&mut Cursor::new(&mut image_data), image::ImageFormat::Png)
            .unwrap();
        image_data
    }

    fn multipart_request(field_name: &str, data: &[u8]) -> Request<Body> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field_name}\"; filename=\"frame.png\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_detect_rejects_non_image_bytes() {
        let router = router_with(Arc::new(MockDetector {}), false);

        let (status, json) = send(router, multipart_request("image", b"plain text")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "invalid image");
    }

    #[tokio::test]
    async fn test_detect_without_hand() {
        let router = router_with(Arc::new(MockDetector {}), false);

        let (status, json) = send(router, multipart_request("image", &png([10, 10, 10]))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hand"], false);
        assert_eq!(json["confidence"], 0.0);
    }

    #[tokio::test]
    async fn test_detect_with_hand_reports_placeholder_confidence() {
        let router = router_with(Arc::new(MockDetector {}), false);

        let (status, json) =
            send(router, multipart_request("image", &png([255, 255, 255]))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["hand"], true);
        assert_eq!(json["confidence"], 1.0);
    }

    #[tokio::test]
    async fn test_detect_can_report_detector_score() {
        let router = router_with(Arc::new(MockDetector {}), true);

        let (_, json) = send(router, multipart_request("image", &png([255, 255, 255]))).await;

        assert_eq!(json["hand"], true);
        let confidence = json["confidence"].as_f64().unwrap();
        assert!((confidence - 0.91).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_detect_requires_image_field() {
        let router = router_with(Arc::new(MockDetector {}), false);

        let (status, json) = send(router, multipart_request("file", &png([0, 0, 0]))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("image"));
    }

    #[tokio::test]
    async fn test_detect_rejects_non_multipart_body() {
        let router = router_with(Arc::new(MockDetector {}), false);
        let request = Request::builder()
            .method(Method::POST)
            .uri("/detect")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();

        let (status, json) = send(router, request).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].is_string());
    }

    #[tokio::test]
    async fn test_detector_failure_is_server_error() {
        let router = router_with(Arc::new(FailingDetector {}), false);

        let (status, json) = send(router, multipart_request("image", &png([0, 0, 0]))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(json["error"].as_str().unwrap().contains("session crashed"));
    }

    #[tokio::test]
    async fn test_health() {
        let router = router_with(Arc::new(MockDetector {}), false);
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let (status, json) = send(router, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["model_loaded"], true);
    }
}
