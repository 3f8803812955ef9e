//! Child-process stdio transport: newline-delimited JSON-RPC frames over
//! the child's stdin/stdout, with a dedicated reader task routing replies
//! by id to per-request completion slots.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::{Adapter, Tool, TransportError};
use crate::mcp::protocol::{self, JsonRpcRequest, JsonRpcResponse, RawTool, RequestIdGenerator};
use crate::registry::ServerRecord;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

type PendingMap = Arc<Mutex<HashMap<i64, oneshot::Sender<JsonRpcResponse>>>>;

pub struct StdioAdapter {
	command: String,
	args: Vec<String>,
	env: Option<HashMap<String, String>>,
	name: String,
	id_gen: RequestIdGenerator,
	pending: PendingMap,
	stdin: tokio::sync::Mutex<Option<tokio::process::ChildStdin>>,
	state: Mutex<Option<Running>>,
	tools: Mutex<Vec<Tool>>,
}

struct Running {
	child: Child,
	reader_task: tokio::task::JoinHandle<()>,
}

impl StdioAdapter {
	pub fn new(record: &ServerRecord) -> Result<Self, TransportError> {
		let command = record
			.command
			.clone()
			.ok_or(TransportError::MissingField("command"))?;
		Ok(StdioAdapter {
			command,
			args: record.args.clone(),
			env: record.env.clone(),
			name: record.name.clone(),
			id_gen: RequestIdGenerator::default(),
			pending: Arc::new(Mutex::new(HashMap::new())),
			stdin: tokio::sync::Mutex::new(None),
			state: Mutex::new(None),
			tools: Mutex::new(Vec::new()),
		})
	}

	async fn send_request(&self, method: &str, params: Value) -> Result<JsonRpcResponse, TransportError> {
		let id = self.id_gen.next();
		let request = JsonRpcRequest::call(id, method, params);
		let (tx, rx) = oneshot::channel();
		self.pending.lock().insert(id, tx);

		let write_result = self.write_frame(&request).await;
		if let Err(err) = write_result {
			self.pending.lock().remove(&id);
			return Err(err);
		}

		match tokio::time::timeout(DEFAULT_TIMEOUT, rx).await {
			Ok(Ok(response)) => Ok(response),
			Ok(Err(_)) => Err(TransportError::ConnectionClosed),
			Err(_) => {
				self.pending.lock().remove(&id);
				Err(TransportError::Timeout(DEFAULT_TIMEOUT))
			}
		}
	}

	async fn send_notification(&self, method: &str, params: Option<Value>) -> Result<(), TransportError> {
		let request = JsonRpcRequest::notification(method, params);
		self.write_frame(&request).await
	}

	async fn write_frame(&self, request: &JsonRpcRequest) -> Result<(), TransportError> {
		let mut line = serde_json::to_string(request).map_err(|e| TransportError::MalformedResponse(e.to_string()))?;
		line.push('\n');
		let mut guard = self.stdin.lock().await;
		let Some(stdin) = guard.as_mut() else {
			return Err(TransportError::ConnectionClosed);
		};
		stdin.write_all(line.as_bytes()).await.map_err(TransportError::Write)?;
		stdin.flush().await.map_err(TransportError::Write)?;
		Ok(())
	}
}

#[async_trait]
impl Adapter for StdioAdapter {
	async fn start(&self) -> Result<(), TransportError> {
		if self.state.lock().is_some() {
			return Ok(());
		}

		let mut command = Command::new(&self.command);
		command
			.args(&self.args)
			.stdin(std::process::Stdio::piped())
			.stdout(std::process::Stdio::piped())
			.stderr(std::process::Stdio::piped())
			.kill_on_drop(true);
		if let Some(env) = &self.env {
			command.envs(env);
		}

		let mut child = command.spawn().map_err(TransportError::Spawn)?;
		let stdin = child.stdin.take().ok_or(TransportError::ConnectionClosed)?;
		let stdout = child.stdout.take().ok_or(TransportError::ConnectionClosed)?;

		let pending = self.pending.clone();
		let server_name = self.name.clone();
		let reader_task = tokio::spawn(async move {
			let mut lines = BufReader::new(stdout).lines();
			loop {
				match lines.next_line().await {
					Ok(Some(line)) => {
						let line = line.trim();
						if line.is_empty() {
							continue;
						}
						match serde_json::from_str::<JsonRpcResponse>(line) {
							Ok(response) => {
								if let Some(Value::Number(n)) = &response.id {
									if let Some(id) = n.as_i64() {
										if let Some(tx) = pending.lock().remove(&id) {
											let _ = tx.send(response);
										}
									}
								}
							}
							Err(err) => {
								debug!(target: "mcprelay::transport", server = %server_name, %err, "non-JSON-RPC line from child, ignoring");
							}
						}
					}
					Ok(None) => break,
					Err(err) => {
						warn!(target: "mcprelay::transport", server = %server_name, %err, "error reading child stdout");
						break;
					}
				}
			}
		});

		*self.stdin.lock().await = Some(stdin);
		*self.state.lock() = Some(Running { child, reader_task });

		let init = self.send_request("initialize", protocol::initialize_params()).await?;
		if init.carries_outcome() {
			self.send_notification("notifications/initialized", None).await?;
		}

		let list = self.send_request("tools/list", serde_json::json!({})).await?;
		let tools = list
			.result
			.as_ref()
			.and_then(|r| r.get("tools"))
			.and_then(|t| serde_json::from_value::<Vec<RawTool>>(t.clone()).ok())
			.unwrap_or_default();
		*self.tools.lock() = tools
			.into_iter()
			.map(|t| Tool {
				local_name: t.name,
				description: t.description,
				input_schema: t.input_schema,
			})
			.collect();

		Ok(())
	}

	async fn stop(&self) {
		let running = self.state.lock().take();
		*self.stdin.lock().await = None;
		if let Some(mut running) = running {
			running.reader_task.abort();
			let _ = running.child.start_kill();
			let _ = running.child.wait().await;
		}
		self.tools.lock().clear();
		self.pending.lock().clear();
	}

	fn tools(&self) -> Vec<Tool> {
		self.tools.lock().clone()
	}

	async fn call_tool(&self, local_name: &str, arguments: Value) -> Result<String, TransportError> {
		let response = self
			.send_request("tools/call", serde_json::json!({ "name": local_name, "arguments": arguments }))
			.await?;
		Ok(protocol::render_call_result(&response))
	}
}
