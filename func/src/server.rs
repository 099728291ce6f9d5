use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};
use warble::{Application, Payload, WarbleError};

use crate::{
    dispatcher::{DispatchError, Dispatcher, EventType},
    message::{AbsenceKind, FuncReply, FuncRequest, read_message, write_message},
};

/// TCP front end for a [`Dispatcher`].
pub struct FuncServer<A> {
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<A>>,
}

impl<A: Application + 'static> FuncServer<A> {
    pub fn new(listener: TcpListener, dispatcher: Arc<Dispatcher<A>>) -> Self {
        Self {
            listener,
            dispatcher,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let FuncServer {
            listener,
            dispatcher,
        } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("func service shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &dispatcher);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result<A: Application + 'static>(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    dispatcher: &Arc<Dispatcher<A>>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, dispatcher),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler<A: Application + 'static>(
    stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &Arc<Dispatcher<A>>,
) {
    let dispatcher = Arc::clone(dispatcher);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, dispatcher).await {
            warn!(peer = %peer, error = ?err, "func connection closed with error");
        }
    });
}

async fn handle_connection<A: Application>(
    stream: TcpStream,
    dispatcher: Arc<Dispatcher<A>>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(request) = read_message::<_, FuncRequest>(&mut reader).await? {
        let reply = handle_request(&dispatcher, request).await;
        write_message(&mut writer, &reply).await?;
    }

    Ok(())
}

async fn handle_request<A: Application>(
    dispatcher: &Dispatcher<A>,
    request: FuncRequest,
) -> FuncReply {
    match request {
        FuncRequest::Hook {
            event_type,
            function,
        } => {
            dispatcher.hook(event_type, function);
            FuncReply::Ack
        }
        FuncRequest::Unhook { event_type } => {
            dispatcher.unhook(event_type);
            FuncReply::Ack
        }
        FuncRequest::Event {
            event_type,
            payload,
        } => {
            let outcome = dispatcher.execute(event_type, &payload).await;
            event_reply(event_type, outcome)
        }
    }
}

fn event_reply(event_type: EventType, outcome: Result<Payload, DispatchError>) -> FuncReply {
    let err = match outcome {
        Ok(payload) => {
            debug!(event_type, bytes = payload.len(), "event handled");
            return FuncReply::Payload { payload };
        }
        Err(err) => err,
    };

    if let DispatchError::Handler(WarbleError::MalformedPayload(reason)) = &err {
        info!(event_type, %reason, "event payload rejected");
        return FuncReply::Rejected {
            message: reason.clone(),
        };
    }

    let message = err.to_string();
    let kind = match &err {
        DispatchError::NotConfigured(_) => Some(AbsenceKind::NotConfigured),
        DispatchError::UnknownHandler(_) => Some(AbsenceKind::UnknownHandler),
        DispatchError::Handler(WarbleError::NotFound(_)) => Some(AbsenceKind::NotFound),
        DispatchError::Handler(WarbleError::AlreadyExists(_)) => Some(AbsenceKind::AlreadyExists),
        DispatchError::Handler(_) => None,
    };

    match kind {
        Some(kind) => {
            info!(event_type, %kind, %message, "event produced no result");
            FuncReply::Absent { kind, message }
        }
        None => {
            warn!(event_type, error = ?err, "event failed");
            FuncReply::Error { message }
        }
    }
}
