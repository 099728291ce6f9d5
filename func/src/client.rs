use std::net::SocketAddr;

use anyhow::{Context, Result, anyhow, bail};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::debug;
use warble::Payload;

use crate::{
    dispatcher::EventType,
    message::{AbsenceKind, FuncReply, FuncRequest, read_message, write_message},
};

/// What an event produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Payload(Payload),
    Absent { kind: AbsenceKind, message: String },
    /// The handler refused the payload.
    Rejected { message: String },
}

/// Client for a [`FuncServer`](crate::FuncServer). Each call uses its own
/// connection.
#[derive(Debug, Clone, Copy)]
pub struct FuncClient {
    addr: SocketAddr,
}

impl FuncClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub async fn hook(&self, event_type: EventType, function: &str) -> Result<()> {
        let reply = self
            .call(&FuncRequest::Hook {
                event_type,
                function: function.to_string(),
            })
            .await?;
        expect_ack(reply)
    }

    pub async fn unhook(&self, event_type: EventType) -> Result<()> {
        let reply = self.call(&FuncRequest::Unhook { event_type }).await?;
        expect_ack(reply)
    }

    /// Fires an event. Absence and rejection are normal outcomes; `Err` means
    /// the event could not be served.
    pub async fn event(&self, event_type: EventType, payload: Payload) -> Result<EventOutcome> {
        let reply = self
            .call(&FuncRequest::Event {
                event_type,
                payload,
            })
            .await?;
        match reply {
            FuncReply::Payload { payload } => Ok(EventOutcome::Payload(payload)),
            FuncReply::Absent { kind, message } => Ok(EventOutcome::Absent { kind, message }),
            FuncReply::Rejected { message } => Ok(EventOutcome::Rejected { message }),
            FuncReply::Error { message } => Err(anyhow!("event {event_type} failed: {message}")),
            FuncReply::Ack => {
                bail!("func service acknowledged event {event_type} without a result")
            }
        }
    }

    async fn call(&self, request: &FuncRequest) -> Result<FuncReply> {
        let stream = TcpStream::connect(self.addr)
            .await
            .with_context(|| format!("failed to connect to {}", self.addr))?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_message(&mut writer, request).await?;
        let reply = read_message::<_, FuncReply>(&mut reader)
            .await?
            .context("func service closed the connection without replying")?;

        if let Err(error) = writer.shutdown().await {
            debug!(?error, "failed to shutdown func connection cleanly");
        }
        Ok(reply)
    }
}

fn expect_ack(reply: FuncReply) -> Result<()> {
    match reply {
        FuncReply::Ack => Ok(()),
        FuncReply::Error { message } => bail!("func service rejected request: {message}"),
        other => bail!("unexpected reply from func service: {other:?}"),
    }
}
