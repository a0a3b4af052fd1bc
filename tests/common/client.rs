//! Thin client over the agent's action endpoint.

use serde_json::{json, Value};

pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Post an action and decode the reply body. The endpoint always answers
    /// 200 for well-formed actions.
    pub async fn action(&self, body: Value) -> Value {
        let response = self
            .client
            .post(format!("{}/appliances", self.base_url))
            .json(&body)
            .send()
            .await
            .expect("Request failed");
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        response.json().await.expect("Reply was not JSON")
    }

    pub async fn get(&self) -> Value {
        self.action(json!({"action": "get"})).await
    }

    pub async fn register(&self, url: &str) -> Value {
        self.action(json!({"action": "register", "url": url})).await
    }

    pub async fn unregister(&self, uuid: &str) -> Value {
        self.action(json!({"action": "unregister", "uuid": uuid}))
            .await
    }

    pub async fn download_appliance(&self, uuid: &str) -> Value {
        self.action(json!({"action": "downloadappliance", "uuid": uuid}))
            .await
    }

    pub async fn download_queue(&self) -> Value {
        self.action(json!({"action": "downloadqueue"})).await
    }

    /// `getappliances` looks up one appliance by its own uuid.
    pub async fn get_appliances(&self, uuid: &str) -> Value {
        self.action(json!({"action": "getappliances", "uuid": uuid}))
            .await
    }

    pub async fn get_installed_appliances(&self) -> Value {
        self.action(json!({"action": "getinstalledappliances"})).await
    }

    pub async fn delete_appliance(&self, uuid: &str) -> Value {
        self.action(json!({"action": "deleteappliance", "uuid": uuid}))
            .await
    }
}
