//! UDP transport: one datagram in, one datagram out.
//!
//! Inbound datagrams carry a sealed command (see envelope.rs). A datagram
//! that does not open is handled as an empty request. Status codes go back in
//! the clear; the INFO payload is sealed before it leaves.

use crate::{
    command::clean,
    config::TransportConfig,
    envelope::MessageEnvelope,
    error::LedgerResult,
    handler::RequestHandler,
    status::{Response, StatusCode},
};
use std::net::{SocketAddr, UdpSocket};

const MAX_DATAGRAM: usize = 65_507;

pub struct DatagramServer {
    socket:               UdpSocket,
    handler:              RequestHandler,
    envelope:             MessageEnvelope,
    allow_plaintext_info: bool,
}

impl DatagramServer {
    pub fn bind(config: &TransportConfig, handler: RequestHandler) -> LedgerResult<Self> {
        let socket = UdpSocket::bind(&config.listen_addr)?;
        let envelope = MessageEnvelope::from_base64_key(&config.message_key)?;
        log::info!("listening on {}", socket.local_addr()?);
        Ok(Self {
            socket,
            handler,
            envelope,
            allow_plaintext_info: config.allow_plaintext_info,
        })
    }

    pub fn local_addr(&self) -> LedgerResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Build the reply for one datagram. Never fails; every request gets
    /// exactly one response.
    pub fn respond(&self, datagram: &[u8]) -> String {
        let raw = clean(&String::from_utf8_lossy(datagram));

        if raw == "INFO" && self.allow_plaintext_info {
            log::warn!("serving INFO over plaintext");
            return self.handler.handle(&raw).into_wire();
        }

        let message = match self.envelope.open(&raw) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("dropping undecryptable datagram: {e}");
                String::new()
            }
        };

        match self.handler.handle(&message) {
            Response::Status(code) => code.code().to_string(),
            Response::Payload(body) => match self.envelope.seal(&body) {
                Ok(sealed) => sealed,
                Err(e) => {
                    log::error!("cannot seal payload: {e}");
                    StatusCode::GenericFailure.code().to_string()
                }
            },
        }
    }

    /// Receive one datagram and answer it.
    pub fn serve_once(&self) -> LedgerResult<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (len, peer) = self.socket.recv_from(&mut buf)?;
        let reply = self.respond(&buf[..len]);
        self.socket.send_to(reply.as_bytes(), peer)?;
        Ok(())
    }

    /// Serve until the process exits. Socket errors are logged, not fatal.
    pub fn serve_forever(&self) {
        loop {
            if let Err(e) = self.serve_once() {
                log::error!("serve: {e}");
            }
        }
    }
}
