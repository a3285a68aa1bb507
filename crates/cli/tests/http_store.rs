//! `HttpStepStore` against a mocked test API.

use devdrive::{StepStore, TaskBlock};
use devdrive_cli::config::ApiSettings;
use devdrive_cli::store::HttpStepStore;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store(server: &MockServer) -> HttpStepStore {
	HttpStepStore::new(&ApiSettings {
		api_key: "secret-key".into(),
		api_url: server.uri(),
	})
	.unwrap()
}

fn tasks() -> Vec<TaskBlock> {
	vec![TaskBlock {
		id: "step-0-1".into(),
		block_type: "instructions".into(),
		step_type: "instruction".into(),
		step_description: "tap Login".into(),
	}]
}

#[tokio::test]
async fn sync_puts_tasks_with_version() {
	let server = MockServer::start().await;
	Mock::given(method("PUT"))
		.and(path("/api/v1/tests/update/t-1"))
		.and(header("authorization", "Bearer secret-key"))
		.and(body_json(json!({
			"tasks": [{
				"id": "step-0-1",
				"type": "instructions",
				"step_type": "instruction",
				"step_description": "tap Login",
			}],
			"expected_version": 7,
		})))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "t-1", "version": 8})))
		.expect(1)
		.mount(&server)
		.await;

	let version = store(&server).sync_steps("t-1", &tasks(), Some(7)).await.unwrap();
	assert_eq!(version, 8);

	let requests = server.received_requests().await.unwrap();
	let agent = requests[0].headers.get("user-agent").unwrap().to_str().unwrap();
	assert!(agent.starts_with("devdrive-cli/"), "{agent}");
}

#[tokio::test]
async fn missing_version_is_omitted() {
	let server = MockServer::start().await;
	Mock::given(method("PUT"))
		.and(path("/api/v1/tests/update/t-2"))
		.and(body_json(json!({"tasks": []})))
		.respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "t-2", "version": 1})))
		.expect(1)
		.mount(&server)
		.await;

	assert_eq!(store(&server).sync_steps("t-2", &[], None).await.unwrap(), 1);
}

#[tokio::test]
async fn conflict_is_reported() {
	let server = MockServer::start().await;
	Mock::given(method("PUT"))
		.and(path("/api/v1/tests/update/t-1"))
		.respond_with(
			ResponseTemplate::new(409).set_body_json(json!({"error": "version mismatch", "detail": "expected 3, found 4"})),
		)
		.mount(&server)
		.await;

	let err = store(&server).sync_steps("t-1", &tasks(), Some(3)).await.unwrap_err();
	let message = err.to_string();
	assert!(message.contains("version conflict"), "{message}");
	assert!(message.contains("expected 3, found 4"), "{message}");
}

#[tokio::test]
async fn server_error_carries_message() {
	let server = MockServer::start().await;
	Mock::given(method("PUT"))
		.respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "database unavailable"})))
		.mount(&server)
		.await;

	let err = store(&server).sync_steps("t-1", &[], None).await.unwrap_err();
	let message = err.to_string();
	assert!(message.contains("500"), "{message}");
	assert!(message.contains("database unavailable"), "{message}");
}
