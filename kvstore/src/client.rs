use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
};
use tracing::debug;

use crate::{
    message::{StoreReply, StoreRequest, read_message, write_message},
    storage::{Storage, StorageError},
};

/// [`Storage`] backed by a remote [`StoreServer`](crate::StoreServer).
///
/// Every call opens its own connection, so a client can be shared freely
/// between tasks. A batch `get` sends its keys one after another on a single
/// connection and collects the answers in the same order.
#[derive(Debug, Clone, Copy)]
pub struct StoreClient {
    addr: SocketAddr,
}

impl StoreClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    async fn connect(&self) -> Result<Connection, StorageError> {
        let stream = TcpStream::connect(self.addr).await?;
        let (reader, writer) = stream.into_split();
        Ok(Connection {
            reader: BufReader::new(reader),
            writer,
        })
    }
}

struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Connection {
    async fn call(&mut self, request: &StoreRequest) -> Result<StoreReply, StorageError> {
        write_message(&mut self.writer, request).await?;
        read_message::<_, StoreReply>(&mut self.reader)
            .await?
            .ok_or_else(|| StorageError::Protocol("store closed the connection".to_string()))
    }

    async fn close(mut self) {
        if let Err(error) = self.writer.shutdown().await {
            debug!(?error, "failed to shutdown store connection cleanly");
        }
    }
}

fn expect_ack(reply: StoreReply) -> Result<(), StorageError> {
    match reply {
        StoreReply::Ack => Ok(()),
        other => Err(StorageError::Protocol(format!(
            "expected ack, got {other:?}"
        ))),
    }
}

#[async_trait]
impl Storage for StoreClient {
    async fn put(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut conn = self.connect().await?;
        let reply = conn
            .call(&StoreRequest::Put {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await?;
        conn.close().await;
        expect_ack(reply)
    }

    async fn get(&self, keys: &[String]) -> Result<Vec<Option<String>>, StorageError> {
        let mut conn = self.connect().await?;
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            match conn.call(&StoreRequest::Get { key: key.clone() }).await? {
                StoreReply::Value { value } => values.push(value),
                other => {
                    return Err(StorageError::Protocol(format!(
                        "expected value for {key}, got {other:?}"
                    )));
                }
            }
        }
        conn.close().await;
        Ok(values)
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.connect().await?;
        let reply = conn
            .call(&StoreRequest::Remove {
                key: key.to_string(),
            })
            .await?;
        conn.close().await;
        expect_ack(reply)
    }
}
