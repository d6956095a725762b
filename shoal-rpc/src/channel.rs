//! TCP-backed admin channel.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::debug;
use uuid::Uuid;

use shoal_core::{
    AdminApi, EditTopologyReply, FailoverParams, FailoverParamsPatch, MemberRecord, PromoteOpts,
    ReplicaSetRecord, Result, ServerRecord, ShoalError, TopologyPatch,
};

use crate::envelope::{call_expr, decode_envelope, REPLY_SENTINEL};

/// One persistent admin channel to the coordinating node.
///
/// Requests are sequenced: a call blocks until its reply envelope (or the
/// lack of one) has been consumed. A connection closed mid-reply surfaces as
/// [`ShoalError::BrokenPipe`], distinct from a malformed envelope.
pub struct AdminChannel<S> {
    stream: BufReader<S>,
}

impl AdminChannel<TcpStream> {
    /// Connects to the coordinating node's admin socket.
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ShoalError::rpc(format!("connect to {} timed out", addr)))??;
        debug!("admin channel connected to {}", addr);
        Ok(Self::new(stream))
    }
}

impl<S> AdminChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Sends one procedure call and decodes its reply envelope.
    async fn eval(&mut self, procedure: &str, args: &[Value]) -> Result<Value> {
        let request = call_expr(procedure, args)?;
        debug!("-> {}", request.trim_end());
        self.stream.write_all(request.as_bytes()).await?;
        self.stream.flush().await?;

        let mut raw = String::new();
        loop {
            let mut line = String::new();
            let read = self.stream.read_line(&mut line).await?;
            if read == 0 {
                return Err(ShoalError::broken_pipe(format!(
                    "connection closed while waiting for a reply to {}",
                    procedure
                )));
            }
            let terminated = line.trim_end() == REPLY_SENTINEL;
            raw.push_str(&line);
            if terminated {
                break;
            }
        }
        decode_envelope(&raw)?.into_result()
    }
}

fn from_reply<T: DeserializeOwned>(value: Value, procedure: &str) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| ShoalError::decode(format!("unexpected {} reply: {}", procedure, e)))
}

fn to_arg<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value)
        .map_err(|e| ShoalError::decode(format!("failed to encode request argument: {}", e)))
}

#[async_trait]
impl<S> AdminApi for AdminChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + Sync,
{
    async fn get_servers(&mut self) -> Result<Vec<ServerRecord>> {
        let ret = self.eval("get_servers", &[]).await?;
        from_reply(ret, "get_servers")
    }

    async fn get_replicasets(&mut self) -> Result<Vec<ReplicaSetRecord>> {
        let ret = self.eval("get_replicasets", &[]).await?;
        from_reply(ret, "get_replicasets")
    }

    async fn get_membership_members(&mut self) -> Result<Vec<MemberRecord>> {
        let ret = self.eval("get_membership_members", &[]).await?;
        from_reply(ret, "get_membership_members")
    }

    async fn edit_topology(&mut self, patch: &TopologyPatch) -> Result<EditTopologyReply> {
        let ret = self.eval("edit_topology", &[to_arg(patch)?]).await?;
        from_reply(ret, "edit_topology")
    }

    async fn is_healthy(&mut self) -> Result<bool> {
        let ret = self.eval("is_healthy", &[]).await?;
        from_reply(ret, "is_healthy")
    }

    async fn get_failover_params(&mut self) -> Result<FailoverParams> {
        let ret = self.eval("get_failover_params", &[]).await?;
        from_reply(ret, "get_failover_params")
    }

    async fn set_failover_params(&mut self, patch: &FailoverParamsPatch) -> Result<()> {
        self.eval("set_failover_params", &[to_arg(patch)?]).await?;
        Ok(())
    }

    async fn failover_promote(
        &mut self,
        leaders: &BTreeMap<Uuid, Uuid>,
        opts: PromoteOpts,
    ) -> Result<()> {
        self.eval("failover_promote", &[to_arg(leaders)?, to_arg(&opts)?])
            .await?;
        Ok(())
    }

    async fn get_twophase_version(&mut self, uri: &str) -> Result<u32> {
        let ret = self
            .eval("get_twophase_version", &[Value::String(uri.to_string())])
            .await?;
        from_reply(ret, "get_twophase_version")
    }
}
