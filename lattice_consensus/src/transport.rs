//! Handing typed records to peers.
//!
//! Delivery is fire-and-forget. Nothing in verification ever waits on, or
//! learns about, the outcome of a send.

use std::{
    fmt::{self, Display},
    io,
    net::{ToSocketAddrs, UdpSocket},
};

use lattice_trie::exact_rlp;
use log::{trace, warn};
use rlp::{Rlp, RlpStream};
use serde::{Deserialize, Serialize};

/// A network endpoint carried by seed and peer records.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Endpoint {
    /// Host address, textual.
    pub ip: String,
    /// UDP port.
    pub port: u16,
}

impl Endpoint {
    /// An endpoint at `ip:port`.
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    pub(crate) fn append_to(&self, stream: &mut RlpStream) {
        stream.begin_list(2);
        stream.append(&self.ip.as_bytes());
        stream.append(&self.port);
    }

    pub(crate) fn decode_from(rlp: &Rlp<'_>) -> Option<Self> {
        if rlp.item_count().ok()? != 2 {
            return None;
        }

        let ip = String::from_utf8(rlp.val_at::<Vec<u8>>(0).ok()?).ok()?;
        Some(Self {
            ip,
            port: rlp.val_at(1).ok()?,
        })
    }

    /// The RLP form `[ip, port]`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut stream = RlpStream::new();
        self.append_to(&mut stream);
        stream.out().to_vec()
    }

    /// Inverse of [`Endpoint::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::decode_from(&exact_rlp(bytes)?)
    }

    /// RLP list of endpoints.
    pub fn list_to_bytes(endpoints: &[Endpoint]) -> Vec<u8> {
        let mut stream = RlpStream::new_list(endpoints.len());
        for endpoint in endpoints {
            endpoint.append_to(&mut stream);
        }
        stream.out().to_vec()
    }

    /// Inverse of [`Endpoint::list_to_bytes`].
    pub fn list_from_bytes(bytes: &[u8]) -> Option<Vec<Endpoint>> {
        let rlp = exact_rlp(bytes)?;
        if !rlp.is_list() {
            return None;
        }

        rlp.iter().map(|item| Self::decode_from(&item)).collect()
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Something that can deliver a payload to an endpoint.
pub trait Transport {
    /// Sends `payload` to `endpoint`, without reporting failures.
    fn send(&self, endpoint: &Endpoint, payload: &[u8]);
}

/// A [`Transport`] over a single UDP socket.
#[derive(Debug)]
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Binds the local socket used for every send.
    pub fn bind(local: impl ToSocketAddrs) -> io::Result<Self> {
        Ok(Self {
            socket: UdpSocket::bind(local)?,
        })
    }
}

impl Transport for UdpTransport {
    fn send(&self, endpoint: &Endpoint, payload: &[u8]) {
        match self
            .socket
            .send_to(payload, (endpoint.ip.as_str(), endpoint.port))
        {
            Ok(sent) => trace!("sent {sent} bytes to {endpoint}"),
            Err(e) => warn!("failed to send {} bytes to {endpoint}: {e}", payload.len()),
        }
    }
}
