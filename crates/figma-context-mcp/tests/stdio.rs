//! Stdio transport over in-memory pipes.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf};

use figma_context::{FigmaAuth, FigmaService};
use figma_context_mcp::{SessionRegistry, SessionState, StdioTransport, ToolRegistry};

// ─────────────────────── helpers ───────────────────────

struct Client {
    writer: WriteHalf<DuplexStream>,
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
}

impl Client {
    async fn send(&mut self, message: Value) {
        self.send_raw(&message.to_string()).await;
    }

    async fn send_raw(&mut self, line: &str) {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        self.writer.flush().await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.lines.next_line())
            .await
            .expect("timed out waiting for reply")
            .unwrap()
            .expect("stdout closed");
        serde_json::from_str(&line).unwrap()
    }
}

fn transport(dir: &tempfile::TempDir) -> Arc<StdioTransport> {
    let figma = FigmaService::with_base_url(FigmaAuth::api_key("test"), "http://127.0.0.1:9");
    let tools = ToolRegistry::figma(Arc::new(figma), dir.path().to_path_buf());
    let registry = Arc::new(SessionRegistry::new(tools));
    Arc::new(StdioTransport::new(registry, Duration::from_secs(1)).unwrap())
}

fn connect(
    transport: Arc<StdioTransport>,
) -> (Client, tokio::task::JoinHandle<figma_context_mcp::types::McpResult<()>>) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let (server_read, server_write) = tokio::io::split(server);
    let (client_read, client_write) = tokio::io::split(client);

    let task = tokio::spawn(async move {
        transport
            .run_with(BufReader::new(server_read), server_write)
            .await
    });

    (
        Client {
            writer: client_write,
            lines: BufReader::new(client_read).lines(),
        },
        task,
    )
}

fn initialize() -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": { "name": "stdio-test", "version": "1.0" }
        }
    })
}

// ─────────────────────── tests ───────────────────────

#[tokio::test]
async fn handshake_then_tools_list() {
    let dir = tempfile::tempdir().unwrap();
    let transport = transport(&dir);
    let (mut client, _task) = connect(transport.clone());

    client.send(initialize()).await;
    let init = client.recv().await;
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(transport.session().state(), SessionState::Active);

    client
        .send(json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    client
        .send(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}))
        .await;
    let list = client.recv().await;
    assert_eq!(list["id"], 2);
    let names: Vec<&str> = list["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    for tool in ["get_figma_data", "download_figma_images", "get_node_screenshot"] {
        assert!(names.contains(&tool), "missing {tool}");
    }
}

#[tokio::test]
async fn malformed_line_gets_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let (mut client, _task) = connect(transport(&dir));

    client.send_raw("{this is not json").await;
    let resp = client.recv().await;
    assert_eq!(resp["error"]["code"], -32700);
    assert!(resp["id"].is_null());

    // The stream keeps working after a bad line.
    client.send(initialize()).await;
    assert!(client.recv().await["result"].is_object());
}

#[tokio::test]
async fn request_before_initialize_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (mut client, _task) = connect(transport(&dir));

    client
        .send(json!({"jsonrpc": "2.0", "id": 7, "method": "tools/list"}))
        .await;
    let resp = client.recv().await;
    assert_eq!(resp["id"], 7);
    assert_eq!(resp["error"]["code"], -32001);
}

#[tokio::test]
async fn eof_closes_session() {
    let dir = tempfile::tempdir().unwrap();
    let transport = transport(&dir);
    let (mut client, task) = connect(transport.clone());

    client.send(initialize()).await;
    client.recv().await;

    let Client { mut writer, lines } = client;
    writer.shutdown().await.unwrap();
    drop(writer);
    drop(lines);

    let result = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("transport did not stop on EOF")
        .unwrap();
    tokio_test::assert_ok!(result);
    assert_eq!(transport.session().state(), SessionState::Closed);
}

#[tokio::test]
async fn second_stdio_transport_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let figma = FigmaService::with_base_url(FigmaAuth::api_key("test"), "http://127.0.0.1:9");
    let registry = Arc::new(SessionRegistry::new(ToolRegistry::figma(
        Arc::new(figma),
        dir.path().to_path_buf(),
    )));

    let _first = StdioTransport::new(registry.clone(), Duration::from_secs(1)).unwrap();
    assert!(StdioTransport::new(registry, Duration::from_secs(1)).is_err());
}
