//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

//! Reference transport speaking newline-delimited JSON over TCP to a
//! speaker-side adapter. The real speaker's native wire format (gRPC) is
//! out of scope; deployments front the speaker with a shim exposing this
//! framing, and tests substitute an in-process [`SpeakerRpc`] stub.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::warn;
use vxplane_utils::worker::Worker;
use vxplane_utils::Receiver;

use crate::api::{
    GlobalInfo, Path, SpeakerRpc, Table, VrfMsg, WatchEvent,
};
use crate::error::Error;

#[derive(Debug, Deserialize, Serialize)]
enum Request {
    Watch,
    AddPath { table: Table, path: Path },
    DeletePath { table: Table, path: Path },
    GetGlobal,
    AddVrf { vrf: VrfMsg },
}

#[derive(Debug, Deserialize, Serialize)]
enum Response {
    Ok,
    Global(GlobalInfo),
    Error(String),
}

// One connection per request; the watch call keeps its connection open and
// turns incoming lines into events.
#[derive(Debug)]
pub struct JsonTransport {
    target: String,
}

// ===== impl JsonTransport =====

impl JsonTransport {
    pub fn new<S>(target: S) -> JsonTransport
    where
        S: Into<String>,
    {
        JsonTransport { target: target.into() }
    }

    async fn call(&self, request: &Request) -> Result<Response, Error> {
        let mut stream =
            TcpStream::connect(&self.target).await.map_err(Error::Io)?;

        let mut line =
            serde_json::to_string(request).map_err(Error::Decode)?;
        line.push('\n');
        stream.write_all(line.as_bytes()).await.map_err(Error::Io)?;

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        let len =
            reader.read_line(&mut response).await.map_err(Error::Io)?;
        if len == 0 {
            return Err(Error::Io(
                std::io::ErrorKind::UnexpectedEof.into(),
            ));
        }
        serde_json::from_str(&response).map_err(Error::Decode)
    }

    fn unit_response(response: Response) -> Result<(), Error> {
        match response {
            Response::Ok => Ok(()),
            Response::Error(reason) => Err(Error::Rejected(reason)),
            Response::Global(_) => {
                Err(Error::Rejected("unexpected response".to_owned()))
            }
        }
    }
}

#[async_trait]
impl SpeakerRpc for JsonTransport {
    async fn watch(&self) -> Result<Receiver<WatchEvent>, Error> {
        let mut stream =
            TcpStream::connect(&self.target).await.map_err(Error::Io)?;

        let mut line =
            serde_json::to_string(&Request::Watch).map_err(Error::Decode)?;
        line.push('\n');
        stream.write_all(line.as_bytes()).await.map_err(Error::Io)?;

        let (event_tx, event_rx) = mpsc::channel(16);
        Worker::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        match serde_json::from_str::<WatchEvent>(&line) {
                            Ok(event) => {
                                if event_tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            // A malformed event never stops the stream.
                            Err(error) => {
                                warn!(%error, "invalid watch event");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        warn!(%error, "watch stream failed");
                        break;
                    }
                }
            }
        })
        .forget();

        Ok(event_rx)
    }

    async fn add_path(&self, table: Table, path: Path) -> Result<(), Error> {
        let response = self.call(&Request::AddPath { table, path }).await?;
        Self::unit_response(response)
    }

    async fn delete_path(
        &self,
        table: Table,
        path: Path,
    ) -> Result<(), Error> {
        let response =
            self.call(&Request::DeletePath { table, path }).await?;
        Self::unit_response(response)
    }

    async fn get_global(&self) -> Result<GlobalInfo, Error> {
        match self.call(&Request::GetGlobal).await? {
            Response::Global(global) => Ok(global),
            Response::Error(reason) => Err(Error::Rejected(reason)),
            Response::Ok => {
                Err(Error::Rejected("unexpected response".to_owned()))
            }
        }
    }

    async fn add_vrf(&self, vrf: VrfMsg) -> Result<(), Error> {
        let response = self.call(&Request::AddVrf { vrf }).await?;
        Self::unit_response(response)
    }
}
