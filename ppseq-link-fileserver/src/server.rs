use std::{future::Future, sync::Arc};

use ppseq_core::link::{DeviceLink, LinkError};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
    select,
};

use crate::protocol::{
    encode_bool, error_response, parse_content_length, parse_request_line, response, Request,
    Verb,
};

/// A server that exposes a [`DeviceLink`] to [`FileServerLink`](crate::FileServerLink) clients.
pub struct FileServer<L: DeviceLink + 'static> {
    link: Arc<L>,
    port: u16,
    shutdown: Option<Box<dyn Future<Output = ()> + Send + Unpin>>,
}

impl<L: DeviceLink + 'static> FileServer<L> {
    /// Create a new [`FileServer`].
    ///
    /// # Arguments
    ///
    /// * `port` - The port to listen on
    /// * `link` - The link that serves the requests
    pub fn new(port: u16, link: L) -> Self {
        Self {
            link: Arc::new(link),
            port,
            shutdown: None,
        }
    }

    /// Configure graceful shutdown with a custom shutdown signal.
    ///
    /// # Arguments
    ///
    /// * `signal` - A future that completes when the server should shut down
    pub fn with_graceful_shutdown<F>(mut self, signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shutdown = Some(Box::new(Box::pin(signal)));
        self
    }

    /// Run the server on all interfaces.
    ///
    /// # Errors
    ///
    /// Returns an error if binding the port or accepting a connection fails.
    pub async fn run(&mut self) -> Result<(), LinkError> {
        let listener = TcpListener::bind(("0.0.0.0", self.port)).await?;
        self.serve(listener).await
    }

    /// Run the server on an already bound listener.
    ///
    /// Every client is served on its own task, so a slow client does not block the others.
    pub async fn serve(&mut self, listener: TcpListener) -> Result<(), LinkError> {
        tracing::info!("File server listening on {}", listener.local_addr()?);
        if let Some(shutdown) = self.shutdown.take() {
            select! {
                result = self.accept_loop(&listener) => result,
                _ = shutdown => Ok(()),
            }
        } else {
            self.accept_loop(&listener).await
        }
    }

    async fn accept_loop(&mut self, listener: &TcpListener) -> Result<(), LinkError> {
        loop {
            let (stream, peer) = listener.accept().await?;
            tracing::debug!("Client {} connected", peer);
            let link = self.link.clone();
            tokio::spawn(async move {
                match handle_client(link.as_ref(), stream).await {
                    Ok(()) => tracing::debug!("Client {} disconnected", peer),
                    Err(e) => tracing::warn!("Client {}: {}", peer, e),
                }
            });
        }
    }
}

async fn read_request<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Result<Request, LinkError>>, LinkError> {
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        if !line.trim().is_empty() {
            break;
        }
    }
    let head = parse_request_line(&line);

    let mut len = 0;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).await? == 0 {
            return Err(LinkError::new("Connection closed inside a request"));
        }
        if header.trim_end_matches(['\r', '\n']).is_empty() {
            break;
        }
        if let Some(n) = parse_content_length(&header)? {
            len = n;
        }
    }
    let mut data = vec![0; len];
    reader.read_exact(&mut data).await?;

    Ok(Some(head.map(|(verb, path)| Request { verb, path, data })))
}

fn execute<L: DeviceLink + ?Sized>(link: &L, request: Request) -> Result<Vec<u8>, LinkError> {
    let Request { verb, path, data } = request;
    tracing::trace!("{} {}", verb, path);
    match verb {
        Verb::Put => link.put(&path, &data).map(|()| Vec::new()),
        Verb::Get => link.get(&path),
        Verb::Del => link.del(&path).map(|()| Vec::new()),
        Verb::Exists => link.exists(&path).map(|e| encode_bool(e).to_vec()),
        Verb::Dir => link.dir(&path).map(|files| {
            files
                .iter()
                .map(|f| format!("{f}\n"))
                .collect::<String>()
                .into_bytes()
        }),
        Verb::Size => link.size(&path).map(|n| format!("{n}\n").into_bytes()),
    }
}

async fn handle_client<L: DeviceLink + ?Sized>(
    link: &L,
    stream: TcpStream,
) -> Result<(), LinkError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    while let Some(request) = read_request(&mut reader).await? {
        let reply = match request.and_then(|r| execute(link, r)) {
            Ok(body) => response(&body),
            Err(e) => error_response(&e.to_string()),
        };
        writer.write_all(&reply).await?;
    }
    Ok(())
}
