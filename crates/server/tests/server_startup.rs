use std::io::Write;
use std::net::TcpListener;
use std::path::Path;
use std::time::Duration;

use redeemer_core::{
    testing::fixtures, CreateOrderRequest, OrderStore, SqliteOrderStore, SqliteStockLedger,
    StockLedger,
};
use reqwest::Client;
use tempfile::{NamedTempFile, TempDir};
use tokio::time::{sleep, timeout};

fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn config_with_db(port: u16, db_path: &Path) -> String {
    format!(
        r#"
[auth]
method = "none"

[server]
host = "127.0.0.1"
port = {}

[database]
path = "{}"
"#,
        port,
        db_path.display()
    )
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

async fn spawn_server(config_path: &Path) -> tokio::process::Child {
    tokio::process::Command::new(env!("CARGO_BIN_EXE_redeemer"))
        .env("REDEEMER_CONFIG", config_path)
        .env("RUST_LOG", "error")
        .kill_on_drop(true)
        .spawn()
        .expect("Failed to spawn server")
}

async fn wait_for_server(port: u16, max_attempts: u32) -> bool {
    let client = Client::new();
    for _ in 0..max_attempts {
        if client
            .get(format!("http://127.0.0.1:{}/api/v1/health", port))
            .send()
            .await
            .is_ok()
        {
            return true;
        }
        sleep(Duration::from_millis(50)).await;
    }
    false
}

/// Run the binary against `config` and expect it to exit with failure.
async fn assert_exits_with_error(config_path: &Path) {
    let result = timeout(
        Duration::from_secs(5),
        tokio::process::Command::new(env!("CARGO_BIN_EXE_redeemer"))
            .env("REDEEMER_CONFIG", config_path)
            .env("RUST_LOG", "error")
            .output(),
    )
    .await
    .expect("Command timed out")
    .expect("Failed to execute command");

    assert!(!result.status.success());
}

#[tokio::test]
async fn test_health_and_config_endpoints() {
    let port = get_available_port();
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&config_with_db(port, &temp_dir.path().join("test.db")));

    let mut server = spawn_server(config.path()).await;
    assert!(wait_for_server(port, 40).await, "Server did not start in time");

    let client = Client::new();
    let health: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/api/v1/health", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["fulfillment_running"], false);

    let config_json: serde_json::Value = client
        .get(format!("http://127.0.0.1:{}/api/v1/config", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(config_json["auth"]["method"], "none");
    assert_eq!(config_json["server"]["port"], port);
    assert!(config_json.get("driver").is_none());

    server.kill().await.ok();
}

#[tokio::test]
async fn test_startup_releases_stale_reservations() {
    let port = get_available_port();
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");

    let (claimed_id, waiting_id) = {
        let orders = SqliteOrderStore::new(&db_path).unwrap();
        let claimed = orders
            .create(CreateOrderRequest {
                uid: "5123456789".to_string(),
                target_amount: 180,
            })
            .unwrap();
        let waiting = orders
            .create(CreateOrderRequest {
                uid: "5123456789".to_string(),
                target_amount: 60,
            })
            .unwrap();
        orders.claim(&claimed.id).unwrap();

        let ledger = SqliteStockLedger::new(&db_path).unwrap();
        ledger.import(&fixtures::code_batch(&[60, 120])).unwrap();
        ledger.reserve(&[1, 2], &claimed.id).unwrap();
        (claimed.id, waiting.id)
    };

    let config = write_config(&config_with_db(port, &db_path));
    let mut server = spawn_server(config.path()).await;
    assert!(wait_for_server(port, 40).await, "Server did not start in time");

    let summary: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/stock/summary", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(summary["reserved"], 0);
    assert_eq!(summary["free"], 2);

    let claimed: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/orders/{}", port, claimed_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(claimed["status"], "error");
    assert_eq!(claimed["error_reason"], "interrupted");

    let waiting: serde_json::Value = Client::new()
        .get(format!("http://127.0.0.1:{}/api/v1/orders/{}", port, waiting_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(waiting["status"], "pending");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_orders_persist_across_restarts() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let client = Client::new();

    let port = get_available_port();
    let config = write_config(&config_with_db(port, &db_path));
    let mut server = spawn_server(config.path()).await;
    assert!(wait_for_server(port, 40).await, "Server did not start in time");

    let created: serde_json::Value = client
        .post(format!("http://127.0.0.1:{}/api/v1/orders", port))
        .json(&serde_json::json!({ "uid": "5123456789", "target_amount": 60 }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let order_id = created["id"].as_str().unwrap().to_string();
    server.kill().await.ok();

    let port = get_available_port();
    let config = write_config(&config_with_db(port, &db_path));
    let mut server = spawn_server(config.path()).await;
    assert!(wait_for_server(port, 40).await, "Server did not restart in time");

    let response = client
        .get(format!("http://127.0.0.1:{}/api/v1/orders/{}", port, order_id))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
    let order: serde_json::Value = response.json().await.unwrap();
    assert_eq!(order["status"], "pending");

    server.kill().await.ok();
}

#[tokio::test]
async fn test_missing_config_file_exits_with_error() {
    assert_exits_with_error(Path::new("/nonexistent/config.toml")).await;
}

#[tokio::test]
async fn test_missing_auth_section_exits_with_error() {
    let config = write_config(
        r#"
[server]
port = 8080
"#,
    );
    assert_exits_with_error(config.path()).await;
}

#[tokio::test]
async fn test_enabled_fulfillment_without_driver_exits_with_error() {
    let config = write_config(
        r#"
[auth]
method = "none"

[fulfillment]
enabled = true
"#,
    );
    assert_exits_with_error(config.path()).await;
}
