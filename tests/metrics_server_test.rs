//! Metrics Server Integration Tests
//!
//! Tests for Prometheus metrics HTTP endpoint.

mod common;

#[cfg(test)]
mod tests {
    use super::common::TestApp;
    use gcs_file_api::metrics;
    use gcs_file_api::metrics::server::MetricsServer;
    use gcs_file_api::validation::UploadPolicy;
    use std::time::Duration;

    async fn start_metrics_server() -> (MetricsServer, String) {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        let addr = server.start().await.expect("Server should start");
        (server, format!("http://{}", addr))
    }

    #[tokio::test]
    async fn test_metrics_endpoint_returns_prometheus_format() {
        let (mut server, base) = start_metrics_server().await;
        metrics::record_transfer("upload", "success");

        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}/metrics", base))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .expect("Should connect to metrics server");

        assert!(response.status().is_success());
        let content_type = response
            .headers()
            .get("content-type")
            .expect("Should have content-type")
            .to_str()
            .unwrap()
            .to_string();
        assert!(
            content_type.contains("text/plain"),
            "Content-Type should be Prometheus text format"
        );

        let body = response.text().await.unwrap();
        assert!(body.contains("# HELP gcs_file_api_transfers_total"));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_metrics_health_and_unknown_path() {
        let (mut server, base) = start_metrics_server().await;
        let client = reqwest::Client::new();

        let response = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.text().await.unwrap(), r#"{"status":"healthy"}"#);

        let response = client.get(format!("{}/nope", base)).send().await.unwrap();
        assert_eq!(response.status(), 404);

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_transfers_are_counted() {
        let (app, _) = TestApp::in_memory(UploadPolicy::new(
            1024,
            Some(vec!["txt".to_string()]),
        ))
        .await;

        let violations_before = metrics::POLICY_VIOLATIONS_TOTAL
            .with_label_values(&["type"])
            .get();
        let uploads_before = metrics::TRANSFERS_TOTAL
            .with_label_values(&["upload", "success"])
            .get();

        app.upload("ok.txt", "text/plain", b"fine".to_vec()).await;
        app.upload("bad.exe", "application/octet-stream", b"MZ".to_vec())
            .await;

        assert!(
            metrics::TRANSFERS_TOTAL
                .with_label_values(&["upload", "success"])
                .get()
                > uploads_before
        );
        assert!(
            metrics::POLICY_VIOLATIONS_TOTAL
                .with_label_values(&["type"])
                .get()
                > violations_before
        );

        let (mut server, base) = start_metrics_server().await;
        let body = reqwest::get(format!("{}/metrics", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(body.contains("gcs_file_api_policy_violations_total"));
        assert!(body.contains("gcs_file_api_backend_duration_seconds"));
        assert!(body.contains("gcs_file_api_bytes_total"));

        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_metrics_server_shutdown() {
        let (mut server, base) = start_metrics_server().await;
        server.shutdown().await;

        let result = reqwest::Client::new()
            .get(format!("{}/metrics", base))
            .timeout(Duration::from_secs(2))
            .send()
            .await;
        assert!(result.is_err(), "Server should not accept after shutdown");
    }
}
