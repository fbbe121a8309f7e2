//! Integration tests for the control API server

#[cfg(feature = "server")]
mod server_tests {
    use chrono::Utc;
    use sati_sensor_agent::core::{
        InterventionArbiter, IntentMismatchTracker, IntentSettings, StressFusionEngine,
    };
    use sati_sensor_agent::monitor::Monitor;
    use sati_sensor_agent::server::{run, ServerConfig};
    use sati_sensor_agent::transparency::create_shared_log;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_monitor() -> Arc<Monitor> {
        Arc::new(Monitor::new(
            StressFusionEngine::new(None),
            InterventionArbiter::new(300.0).unwrap(),
            IntentMismatchTracker::new(IntentSettings::new(30.0, 2.0).unwrap()),
            create_shared_log(),
            Utc::now(),
        ))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (addr, shutdown_tx) = run(ServerConfig::new(0), test_monitor())
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_state_before_and_after_tick() {
        let monitor = test_monitor();
        let (addr, shutdown_tx) = run(ServerConfig::new(0), monitor.clone())
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let body: serde_json::Value = client
            .get(format!("http://{}/state", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert!(body["fusion"].is_null());
        assert_eq!(body["paused"], false);

        monitor.tick(Utc::now());

        let body: serde_json::Value = client
            .get(format!("http://{}/state", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(body["fusion"]["level"], "CALM");
        assert_eq!(body["fusion"]["score"], 0.0);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_intent_endpoints() {
        let monitor = test_monitor();
        let (addr, shutdown_tx) = run(ServerConfig::new(0), monitor.clone())
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let url = format!("http://{}/intent", addr);

        let response = client
            .put(&url)
            .json(&serde_json::json!({ "intent": "  Writing the quarterly report " }))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["current_intent"], "Writing the quarterly report");
        assert_eq!(
            monitor.intent_state(Utc::now()).current_intent,
            "Writing the quarterly report"
        );

        let response = client
            .put(&url)
            .json(&serde_json::json!({ "intent": "   " }))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "EMPTY_INTENT");

        let response = client
            .delete(&url)
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::NO_CONTENT);
        assert!(monitor.intent_state(Utc::now()).current_intent.is_empty());

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_cors_headers() {
        let (addr, shutdown_tx) = run(ServerConfig::new(0), test_monitor())
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .request(reqwest::Method::OPTIONS, format!("http://{}/intent", addr))
            .header("Origin", "http://localhost")
            .header("Access-Control-Request-Method", "PUT")
            .send()
            .await
            .expect("Failed to send request");

        assert!(
            response.status().is_success() || response.status() == reqwest::StatusCode::NO_CONTENT,
            "CORS preflight failed: {}",
            response.status()
        );

        let _ = shutdown_tx.send(());
    }
}
