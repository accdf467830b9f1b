//! Parallel Tool Discovery — C3.
//!
//! Fans a discovery round out across servers with one `tokio::spawn` task per server, mirroring
//! `orchestration.rs::execute_parallel`'s fork-and-collect shape. Each task gets its own
//! `CancellationToken` and timeout, independent of whatever context the caller is running under
//! and of the other tasks in the round — one slow or wedged server never blocks the rest, and
//! there is no guaranteed ordering among results (§4.3).

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;
use crate::fingerprint::Protocol;
use crate::transport::{McpPrompt, McpResource, McpTool, Transport};

pub struct ServerDiscovery {
    pub server_name: String,
    pub protocol: Protocol,
    pub tools: Vec<McpTool>,
    pub prompts: Vec<McpPrompt>,
    pub resources: Vec<McpResource>,
}

pub type DiscoveryOutcome = Result<ServerDiscovery, (String, TransportError)>;

/// Runs discovery against every transport concurrently and returns one outcome per transport, in
/// completion order (not input order — §4.3 makes no ordering guarantee).
pub async fn discover_all(transports: Vec<Box<dyn Transport>>, per_task_timeout: Duration) -> Vec<DiscoveryOutcome> {
    let mut tasks = Vec::with_capacity(transports.len());

    for mut transport in transports {
        tasks.push(tokio::spawn(async move {
            let cancel = CancellationToken::new();
            let server_name = transport.server_name().to_string();
            let protocol = transport.protocol();

            let body = async {
                transport.connect(cancel.clone()).await?;
                let tools = transport.list_tools(cancel.clone()).await?;
                let prompts = transport.list_prompts(cancel.clone()).await.unwrap_or_default();
                let resources = transport.list_resources(cancel.clone()).await.unwrap_or_default();
                transport.close().await;
                Ok::<_, TransportError>((tools, prompts, resources))
            };

            match tokio::time::timeout(per_task_timeout, body).await {
                Ok(Ok((tools, prompts, resources))) => {
                    log::info!(
                        "discovery on '{}' found {} tools, {} prompts, {} resources",
                        server_name,
                        tools.len(),
                        prompts.len(),
                        resources.len()
                    );
                    Ok(ServerDiscovery {
                        server_name,
                        protocol,
                        tools,
                        prompts,
                        resources,
                    })
                }
                Ok(Err(e)) => {
                    log::warn!("discovery on '{}' failed: {}", server_name, e);
                    Err((server_name, e))
                }
                Err(_elapsed) => {
                    log::warn!("discovery on '{}' timed out after {:?}", server_name, per_task_timeout);
                    Err((server_name.clone(), TransportError::Timeout { server: server_name }))
                }
            }
        }));
    }

    let mut results = Vec::with_capacity(tasks.len());
    for task in tasks {
        match task.await {
            Ok(outcome) => results.push(outcome),
            Err(join_err) => results.push(Err((
                "<unknown>".to_string(),
                TransportError::Call {
                    server: "<unknown>".to_string(),
                    tool: "discover".to_string(),
                    cause: format!("discovery task panicked or was cancelled: {}", join_err),
                },
            ))),
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value as JsonValue;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct StubTransport {
        name: String,
        connected: Arc<AtomicBool>,
        delay: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn connect(&mut self, _cancel: CancellationToken) -> Result<(), TransportError> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                return Err(TransportError::Connect {
                    server: self.name.clone(),
                    cause: "stub failure".to_string(),
                });
            }
            self.connected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn list_tools(&self, _cancel: CancellationToken) -> Result<Vec<McpTool>, TransportError> {
            Ok(vec![])
        }

        async fn call_tool(
            &self,
            _name: &str,
            _args: JsonValue,
            _cancel: CancellationToken,
        ) -> Result<crate::transport::CallResult, TransportError> {
            unimplemented!()
        }

        async fn list_prompts(&self, _cancel: CancellationToken) -> Result<Vec<McpPrompt>, TransportError> {
            Ok(vec![])
        }

        async fn get_prompt(&self, _name: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
            unimplemented!()
        }

        async fn list_resources(&self, _cancel: CancellationToken) -> Result<Vec<McpResource>, TransportError> {
            Ok(vec![])
        }

        async fn get_resource(&self, _uri: &str, _cancel: CancellationToken) -> Result<JsonValue, TransportError> {
            unimplemented!()
        }

        async fn close(&mut self) {}

        fn server_name(&self) -> &str {
            &self.name
        }

        fn protocol(&self) -> Protocol {
            Protocol::Stdio
        }
    }

    #[tokio::test]
    async fn one_slow_server_does_not_block_the_others() {
        let slow = Box::new(StubTransport {
            name: "slow".into(),
            connected: Arc::new(AtomicBool::new(false)),
            delay: Duration::from_millis(200),
            fail: false,
        });
        let fast = Box::new(StubTransport {
            name: "fast".into(),
            connected: Arc::new(AtomicBool::new(false)),
            delay: Duration::from_millis(1),
            fail: false,
        });

        let start = std::time::Instant::now();
        let results = discover_all(vec![slow, fast], Duration::from_secs(5)).await;
        assert!(start.elapsed() < Duration::from_millis(250));
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn one_failing_server_does_not_fail_the_whole_round() {
        let bad = Box::new(StubTransport {
            name: "bad".into(),
            connected: Arc::new(AtomicBool::new(false)),
            delay: Duration::from_millis(1),
            fail: true,
        });
        let good = Box::new(StubTransport {
            name: "good".into(),
            connected: Arc::new(AtomicBool::new(false)),
            delay: Duration::from_millis(1),
            fail: false,
        });

        let results = discover_all(vec![bad, good], Duration::from_secs(5)).await;
        let failures = results.iter().filter(|r| r.is_err()).count();
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(failures, 1);
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn per_task_timeout_is_enforced_independently() {
        let stuck = Box::new(StubTransport {
            name: "stuck".into(),
            connected: Arc::new(AtomicBool::new(false)),
            delay: Duration::from_secs(60),
            fail: false,
        });

        let results = discover_all(vec![stuck], Duration::from_millis(20)).await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err((_, TransportError::Timeout { .. }))));
    }
}
