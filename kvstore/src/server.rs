use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::BufReader,
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{debug, info, warn};

use crate::{
    message::{StoreReply, StoreRequest, read_message, write_message},
    store::ConcurrentStore,
};

/// TCP front end for a [`ConcurrentStore`].
///
/// Each accepted connection gets its own task; requests on one connection are
/// answered in order. When the shutdown future resolves the server stops
/// accepting and writes the snapshot, if the store has a persistence path.
pub struct StoreServer {
    listener: TcpListener,
    store: Arc<ConcurrentStore>,
}

impl StoreServer {
    pub fn new(listener: TcpListener, store: Arc<ConcurrentStore>) -> Self {
        Self { listener, store }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let StoreServer { listener, store } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    handle_shutdown(&store);
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &store);
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

fn handle_shutdown(store: &ConcurrentStore) {
    info!(entries = store.len(), "store shutting down");
    let Some(path) = store.persistence_path() else {
        return;
    };
    match store.persist() {
        Ok(()) => info!(path = %path.display(), "snapshot flushed"),
        Err(err) => warn!(path = %path.display(), error = ?err, "failed to flush snapshot"),
    }
}

fn handle_accept_result(
    result: std::io::Result<(TcpStream, SocketAddr)>,
    store: &Arc<ConcurrentStore>,
) {
    match result {
        Ok((stream, peer)) => spawn_connection_handler(stream, peer, store),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_connection_handler(stream: TcpStream, peer: SocketAddr, store: &Arc<ConcurrentStore>) {
    let store = Arc::clone(store);
    tokio::spawn(async move {
        if let Err(err) = handle_connection(stream, store).await {
            warn!(peer = %peer, error = ?err, "store connection closed with error");
        }
    });
}

async fn handle_connection(stream: TcpStream, store: Arc<ConcurrentStore>) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    while let Some(request) = read_message::<_, StoreRequest>(&mut reader).await? {
        let reply = apply_request(&store, request);
        write_message(&mut writer, &reply).await?;
    }

    Ok(())
}

fn apply_request(store: &ConcurrentStore, request: StoreRequest) -> StoreReply {
    match request {
        StoreRequest::Put { key, value } => {
            debug!(%key, "put");
            store.put(key, value);
            StoreReply::Ack
        }
        StoreRequest::Get { key } => {
            let value = store.get(&key);
            debug!(%key, found = value.is_some(), "get");
            StoreReply::Value { value }
        }
        StoreRequest::Remove { key } => {
            let existed = store.remove(&key);
            debug!(%key, existed, "remove");
            StoreReply::Ack
        }
    }
}
