// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client Library (C11): the symmetric counterpart to the session handler,
//! for user programs that stream files into the daemon.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod error;

use ltsmd_core::StorageDest;
use ltsmd_wire::{recv, send, DataHeader, FileInfo, LoginInfo, PacketBody, StateFlags};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;

pub use error::ClientError;

/// One connection to the daemon, past the CONNECT handshake.
pub struct Client {
    reader: BufReader<tokio::net::tcp::OwnedReadHalf>,
    writer: BufWriter<tokio::net::tcp::OwnedWriteHalf>,
}

/// A file open for writing; created by `Client::open`.
pub struct OpenSession<'a> {
    client: &'a mut Client,
}

impl Client {
    /// Connect to `addr` and perform the CONNECT handshake.
    pub async fn connect(
        addr: impl tokio::net::ToSocketAddrs,
        login: LoginInfo,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await.map_err(ltsmd_wire::ProtocolError::from)?;
        let (read_half, write_half) = stream.into_split();
        let mut client = Self { reader: BufReader::new(read_half), writer: BufWriter::new(write_half) };

        let request = ltsmd_wire::Packet::new(StateFlags::CONNECT, PacketBody::Login(login));
        client.roundtrip(request, StateFlags::CONNECT | StateFlags::REPLY).await?;
        Ok(client)
    }

    /// `open(fs, path, desc, storage_dest)` (§4.11): begin writing a file.
    pub async fn open(
        &mut self,
        filesystem_name: impl Into<String>,
        relative_path: impl Into<String>,
        description: impl Into<String>,
        storage_dest: StorageDest,
    ) -> Result<OpenSession<'_>, ClientError> {
        let info = FileInfo {
            filesystem_name: filesystem_name.into(),
            relative_path: relative_path.into(),
            description: description.into(),
            storage_dest,
        };
        let request = ltsmd_wire::Packet::new(StateFlags::OPEN, PacketBody::File(info));
        self.roundtrip(request, StateFlags::OPEN | StateFlags::REPLY).await?;
        Ok(OpenSession { client: self })
    }

    /// `disconnect` (§4.11): end the session. `DISCONNECT` carries no reply.
    pub async fn disconnect(mut self) -> Result<(), ClientError> {
        let request = ltsmd_wire::Packet::new(StateFlags::DISCONNECT, PacketBody::None);
        send(&mut self.writer, &request).await?;
        self.writer.flush().await.map_err(ltsmd_wire::ProtocolError::from)?;
        Ok(())
    }

    async fn roundtrip(
        &mut self,
        request: ltsmd_wire::Packet,
        allowed: StateFlags,
    ) -> Result<ltsmd_wire::Packet, ClientError> {
        send(&mut self.writer, &request).await?;
        self.writer.flush().await.map_err(ltsmd_wire::ProtocolError::from)?;
        let reply = recv(&mut self.reader, allowed).await?;
        if reply.is_error() {
            let error = reply.error.clone().unwrap_or(ltsmd_wire::ErrorEnvelope {
                code: -1,
                message: "server returned ERROR with no envelope".to_string(),
            });
            return Err(ClientError::Remote { code: error.code, message: error.message });
        }
        Ok(reply)
    }
}

impl OpenSession<'_> {
    /// `write(bytes)` (§4.11): send a DATA header plus payload and await
    /// `DATA|REPLY`.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        let request = ltsmd_wire::Packet::new(
            StateFlags::DATA,
            PacketBody::Data(DataHeader { payload_bytes: bytes.len() as u64 }),
        );
        send(&mut self.client.writer, &request).await?;
        self.client.writer.write_all(bytes).await.map_err(ltsmd_wire::ProtocolError::from)?;
        self.client.writer.flush().await.map_err(ltsmd_wire::ProtocolError::from)?;
        let reply = recv(&mut self.client.reader, StateFlags::DATA | StateFlags::REPLY).await?;
        if reply.is_error() {
            let error = reply.error.clone().unwrap_or(ltsmd_wire::ErrorEnvelope {
                code: -1,
                message: "server returned ERROR with no envelope".to_string(),
            });
            return Err(ClientError::Remote { code: error.code, message: error.message });
        }
        Ok(())
    }

    /// `close` (§4.11): end the file, awaiting `CLOSE|REPLY`.
    pub async fn close(self) -> Result<(), ClientError> {
        let request = ltsmd_wire::Packet::new(StateFlags::CLOSE, PacketBody::None);
        self.client
            .roundtrip(request, StateFlags::CLOSE | StateFlags::REPLY)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltsmd_wire::Packet;
    use tokio::net::TcpListener;

    /// A stand-in server that accepts one connection and replies to every
    /// request with the mirrored state bits plus `REPLY`.
    async fn run_echo_server(listener: TcpListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut writer = BufWriter::new(write_half);
        loop {
            let request = match recv(&mut reader, StateFlags::all()).await {
                Ok(p) => p,
                Err(_) => return,
            };
            let flags = request.state_flags();
            if flags.contains(StateFlags::DISCONNECT) {
                return;
            }
            if flags.contains(StateFlags::DATA) {
                if let PacketBody::Data(header) = &request.body {
                    let mut payload = vec![0u8; header.payload_bytes as usize];
                    tokio::io::AsyncReadExt::read_exact(&mut reader, &mut payload).await.unwrap();
                }
            }
            let reply = Packet::reply(flags, PacketBody::None);
            send(&mut writer, &reply).await.unwrap();
            writer.flush().await.unwrap();
        }
    }

    #[tokio::test]
    async fn connect_open_write_close_disconnect_happy_path() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(run_echo_server(listener));

        let login = LoginInfo {
            node: "node-alpha".into(),
            password: "".into(),
            hostname: "localhost".into(),
            port: addr.port(),
        };
        let mut client = Client::connect(addr, login).await.unwrap();
        let mut session = client.open("/lustre", "/lustre/a/b.bin", "", StorageDest::Lustre).await.unwrap();
        session.write(b"hello").await.unwrap();
        session.close().await.unwrap();
        client.disconnect().await.unwrap();
    }
}
