use std::{
    io::{self, BufReader, Write},
    net::{SocketAddr, TcpStream, ToSocketAddrs},
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex, PoisonError,
    },
    time::Duration,
};

use ppseq_core::link::{DeviceLink, LinkError};

use crate::protocol::{
    decode_bool, decode_list, decode_size, read_response, Request, Verb, DEFAULT_PORT,
};

struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Connection {
    fn open(addr: &SocketAddr, timeout: Option<Duration>) -> io::Result<Self> {
        let stream = if let Some(timeout) = timeout {
            TcpStream::connect_timeout(addr, timeout)
        } else {
            TcpStream::connect(addr)
        }?;

        stream.set_write_timeout(timeout)?;
        stream.set_read_timeout(timeout)?;
        stream.set_nodelay(true)?;

        Ok(Self {
            reader: BufReader::new(stream.try_clone()?),
            writer: stream,
        })
    }

    fn transact(&mut self, requests: &[Request]) -> io::Result<Vec<Result<Vec<u8>, LinkError>>> {
        let mut buf = Vec::new();
        requests.iter().for_each(|r| r.write_to(&mut buf));
        self.writer.write_all(&buf)?;
        requests
            .iter()
            .map(|_| read_response(&mut self.reader))
            .collect()
    }
}

/// Options for [`FileServerLink`].
#[derive(Clone, Debug)]
pub struct FileServerOption {
    /// Timeout for connecting and for each read and write. `None` means no timeout.
    pub timeout: Option<Duration>,
    /// Number of reconnect attempts after a failed transfer before the link goes offline.
    pub retries: usize,
}

impl Default for FileServerOption {
    fn default() -> Self {
        Self {
            timeout: Some(Duration::from_secs(5)),
            retries: 1,
        }
    }
}

/// A [`DeviceLink`] to the file server of a timing device.
///
/// The connection is opened on first use and reopened after a transport failure.
/// When a transfer still fails after [`FileServerOption::retries`] reconnects,
/// the link marks itself offline and fails fast until [`FileServerLink::reconnect`] succeeds.
pub struct FileServerLink {
    addr: SocketAddr,
    option: FileServerOption,
    connection: Mutex<Option<Connection>>,
    online: AtomicBool,
}

impl FileServerLink {
    /// Creates a new [`FileServerLink`].
    #[must_use]
    pub const fn new(addr: SocketAddr, option: FileServerOption) -> Self {
        Self {
            addr,
            option,
            connection: Mutex::new(None),
            online: AtomicBool::new(true),
        }
    }

    /// Creates a link to `host`, given as `name` or `name:port`. The default port is 2001.
    pub fn with_host(host: &str, option: FileServerOption) -> Result<Self, LinkError> {
        let addr = if host.contains(':') {
            host.to_socket_addrs()
        } else {
            (host, DEFAULT_PORT).to_socket_addrs()
        }?
        .next()
        .ok_or_else(|| LinkError::new(format!("Cannot resolve {host}")))?;
        Ok(Self::new(addr, option))
    }

    /// Address of the file server.
    #[must_use]
    pub const fn addr(&self) -> &SocketAddr {
        &self.addr
    }

    /// Opens a fresh connection and brings the link back online.
    pub fn reconnect(&self) -> Result<(), LinkError> {
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *connection = None;
        *connection = Some(Connection::open(&self.addr, self.option.timeout)?);
        self.online.store(true, Ordering::Release);
        tracing::info!("File server {} is online", self.addr);
        Ok(())
    }

    fn transact(&self, requests: &[Request]) -> Result<Vec<Result<Vec<u8>, LinkError>>, LinkError> {
        if !self.is_online() {
            return Err(LinkError::offline());
        }
        let mut connection = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let mut last = None;
        for attempt in 0..=self.option.retries {
            let result = match connection.as_mut() {
                Some(c) => c.transact(requests),
                None => Connection::open(&self.addr, self.option.timeout).and_then(|c| {
                    connection.insert(c).transact(requests)
                }),
            };
            match result {
                Ok(responses) => return Ok(responses),
                Err(e) => {
                    tracing::warn!(
                        "Transfer to {} failed (attempt {}): {}",
                        self.addr,
                        attempt + 1,
                        e
                    );
                    *connection = None;
                    last = Some(e);
                }
            }
        }

        self.online.store(false, Ordering::Release);
        tracing::error!("File server {} is offline", self.addr);
        Err(last.map_or_else(LinkError::offline, |e| {
            LinkError::new(format!("{}: {}", self.addr, e))
        }))
    }

    fn request(&self, request: Request) -> Result<Vec<u8>, LinkError> {
        self.transact(std::slice::from_ref(&request))?
            .pop()
            .unwrap_or_else(|| Err(LinkError::new("Missing response")))
    }
}

impl DeviceLink for FileServerLink {
    fn put(&self, path: &str, data: &[u8]) -> Result<(), LinkError> {
        self.request(Request::put(path, data))?;
        Ok(())
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, LinkError> {
        self.request(Request::new(Verb::Get, path))
    }

    fn del(&self, path: &str) -> Result<(), LinkError> {
        self.request(Request::new(Verb::Del, path))?;
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool, LinkError> {
        decode_bool(&self.request(Request::new(Verb::Exists, path))?)
    }

    fn dir(&self, pattern: &str) -> Result<Vec<String>, LinkError> {
        Ok(decode_list(&self.request(Request::new(Verb::Dir, pattern))?))
    }

    fn size(&self, path: &str) -> Result<u64, LinkError> {
        decode_size(&self.request(Request::new(Verb::Size, path))?)
    }

    fn put_many(&self, files: &[(String, Vec<u8>)]) -> Result<(), LinkError> {
        if files.is_empty() {
            return Ok(());
        }
        let requests = files
            .iter()
            .map(|(path, data)| Request::put(path.as_str(), data.as_slice()))
            .collect::<Vec<_>>();
        self.transact(&requests)?
            .into_iter()
            .try_for_each(|r| r.map(|_| ()))
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    fn unused_addr() -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        Ok(listener.local_addr()?)
    }

    #[test]
    fn goes_offline_after_retries() -> anyhow::Result<()> {
        let link = FileServerLink::new(
            unused_addr()?,
            FileServerOption {
                timeout: Some(Duration::from_millis(200)),
                retries: 1,
            },
        );
        assert!(link.is_online());
        assert!(link.get("/tmp/a").is_err());
        assert!(!link.is_online());
        assert_eq!(Err(LinkError::offline()), link.get("/tmp/a"));
        assert!(link.reconnect().is_err());
        assert!(!link.is_online());
        Ok(())
    }

    #[test]
    fn with_host() -> anyhow::Result<()> {
        let link = FileServerLink::with_host("127.0.0.1", FileServerOption::default())?;
        assert_eq!(DEFAULT_PORT, link.addr().port());
        let link = FileServerLink::with_host("127.0.0.1:2101", FileServerOption::default())?;
        assert_eq!(2101, link.addr().port());
        Ok(())
    }
}
