// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level request/response types for the Pool RPC Server (§4.6).
//!
//! Requests and simple responses are array messages (§4.1); a handful of
//! responses are followed by an out-of-band scalar message or an SCM_RIGHTS
//! fd, which the listener sends separately after writing the array.

use indexmap::IndexMap;

use pool_wire::WireError;

#[derive(Debug, Clone)]
pub struct GetOptionsWire {
    pub app_root: String,
    pub use_global_queue: bool,
    pub extra: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub enum Request {
    Get(GetOptionsWire),
    Close { session_id: u32 },
    Clear,
    Detach { detach_key: String },
    SetMaxIdleTime { seconds: u64 },
    SetMax { n: usize },
    SetMaxPerApp { n: usize },
    GetActive,
    GetCount,
    GetGlobalQueueSize,
    Inspect,
    ToXml { include_sensitive: bool },
    Exit { immediately: bool },
}

impl Request {
    /// Parse one already-decoded array message's elements into a `Request`.
    /// Unknown verbs or malformed arguments are protocol errors (§9 Open
    /// Questions: "the spec defines exactly one reply shape per command...
    /// anything else is a protocol error").
    pub fn decode(elements: &[Vec<u8>]) -> Result<Self, WireError> {
        let verb = elements
            .first()
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| WireError::Protocol("empty request".into()))?;

        let arg = |i: usize| -> Result<String, WireError> {
            elements
                .get(i)
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .ok_or_else(|| WireError::Protocol(format!("{verb}: missing argument {i}")))
        };

        match verb.as_str() {
            "get" => {
                let mut app_root = None;
                let mut use_global_queue = false;
                let mut extra = IndexMap::new();
                let mut i = 1;
                while i + 1 < elements.len() {
                    let key = String::from_utf8_lossy(&elements[i]).into_owned();
                    let value = String::from_utf8_lossy(&elements[i + 1]).into_owned();
                    match key.as_str() {
                        "app_root" => app_root = Some(value),
                        "use_global_queue" => use_global_queue = value == "1" || value == "true",
                        _ => {
                            extra.insert(key, value);
                        }
                    }
                    i += 2;
                }
                let app_root = app_root
                    .ok_or_else(|| WireError::Protocol("get: missing app_root".into()))?;
                Ok(Request::Get(GetOptionsWire {
                    app_root,
                    use_global_queue,
                    extra,
                }))
            }
            "close" => Ok(Request::Close {
                session_id: arg(1)?
                    .parse()
                    .map_err(|_| WireError::Protocol("close: bad session id".into()))?,
            }),
            "clear" => Ok(Request::Clear),
            "detach" => Ok(Request::Detach {
                detach_key: arg(1)?,
            }),
            "setMaxIdleTime" => Ok(Request::SetMaxIdleTime {
                seconds: arg(1)?
                    .parse()
                    .map_err(|_| WireError::Protocol("setMaxIdleTime: bad value".into()))?,
            }),
            "setMax" => Ok(Request::SetMax {
                n: arg(1)?
                    .parse()
                    .map_err(|_| WireError::Protocol("setMax: bad value".into()))?,
            }),
            "setMaxPerApp" => Ok(Request::SetMaxPerApp {
                n: arg(1)?
                    .parse()
                    .map_err(|_| WireError::Protocol("setMaxPerApp: bad value".into()))?,
            }),
            "getActive" => Ok(Request::GetActive),
            "getCount" => Ok(Request::GetCount),
            "getGlobalQueueSize" => Ok(Request::GetGlobalQueueSize),
            "inspect" => Ok(Request::Inspect),
            "toXml" => Ok(Request::ToXml {
                include_sensitive: elements.get(1).map(Vec::as_slice) == Some(b"1"),
            }),
            "exit" => Ok(Request::Exit {
                immediately: elements.get(1).map(Vec::as_slice) == Some(b"immediately"),
            }),
            other => Err(WireError::Protocol(format!("unknown command: {other}"))),
        }
    }

    /// Encode this request into the array-message elements a client sends.
    /// Inverse of [`Request::decode`], used by `poolctl`.
    pub fn encode(&self) -> Vec<Vec<u8>> {
        match self {
            Request::Get(opts) => {
                let mut elements = vec![b"get".to_vec(), b"app_root".to_vec(), opts.app_root.clone().into_bytes()];
                if opts.use_global_queue {
                    elements.push(b"use_global_queue".to_vec());
                    elements.push(b"1".to_vec());
                }
                for (k, v) in &opts.extra {
                    elements.push(k.clone().into_bytes());
                    elements.push(v.clone().into_bytes());
                }
                elements
            }
            Request::Close { session_id } => {
                vec![b"close".to_vec(), session_id.to_string().into_bytes()]
            }
            Request::Clear => vec![b"clear".to_vec()],
            Request::Detach { detach_key } => {
                vec![b"detach".to_vec(), detach_key.clone().into_bytes()]
            }
            Request::SetMaxIdleTime { seconds } => vec![
                b"setMaxIdleTime".to_vec(),
                seconds.to_string().into_bytes(),
            ],
            Request::SetMax { n } => vec![b"setMax".to_vec(), n.to_string().into_bytes()],
            Request::SetMaxPerApp { n } => {
                vec![b"setMaxPerApp".to_vec(), n.to_string().into_bytes()]
            }
            Request::GetActive => vec![b"getActive".to_vec()],
            Request::GetCount => vec![b"getCount".to_vec()],
            Request::GetGlobalQueueSize => vec![b"getGlobalQueueSize".to_vec()],
            Request::Inspect => vec![b"inspect".to_vec()],
            Request::ToXml { include_sensitive } => {
                let mut elements = vec![b"toXml".to_vec()];
                if *include_sensitive {
                    elements.push(b"1".to_vec());
                }
                elements
            }
            Request::Exit { immediately } => {
                let mut elements = vec![b"exit".to_vec()];
                if *immediately {
                    elements.push(b"immediately".to_vec());
                }
                elements
            }
        }
    }
}

/// The array-message half of a response. Some variants are followed by an
/// out-of-band scalar or fd, handled by the listener after writing this.
#[derive(Debug, Clone)]
pub enum Response {
    /// `get` success: status array, the fd follows separately.
    Ok { pid: i32, session_id: u32 },
    SpawnException { message: String, has_error_page: bool },
    BusyException(String),
    IoException(String),
    SecurityException(String),
    True,
    False,
    Count(u64),
    Text(String),
    PassedSecurity,
    ExitCommandReceived,
    /// `close`/`clear`/`setMax*` acknowledge with no payload.
    Empty,
}

impl Response {
    pub fn encode(&self) -> Vec<Vec<u8>> {
        match self {
            Response::Ok { pid, session_id } => {
                vec![b"ok".to_vec(), pid.to_string().into_bytes(), session_id.to_string().into_bytes()]
            }
            Response::SpawnException {
                message,
                has_error_page,
            } => vec![
                b"SpawnException".to_vec(),
                message.clone().into_bytes(),
                if *has_error_page { b"1".to_vec() } else { b"0".to_vec() },
            ],
            Response::BusyException(msg) => vec![b"BusyException".to_vec(), msg.clone().into_bytes()],
            Response::IoException(msg) => vec![b"IOException".to_vec(), msg.clone().into_bytes()],
            Response::SecurityException(msg) => {
                vec![b"SecurityException".to_vec(), msg.clone().into_bytes()]
            }
            Response::True => vec![b"true".to_vec()],
            Response::False => vec![b"false".to_vec()],
            Response::Count(n) => vec![n.to_string().into_bytes()],
            Response::Text(s) => vec![s.clone().into_bytes()],
            Response::PassedSecurity => vec![b"Passed security".to_vec()],
            Response::ExitCommandReceived => vec![b"exit command received".to_vec()],
            Response::Empty => vec![],
        }
    }

    /// Parse one already-decoded array message's elements into a `Response`.
    /// Inverse of [`Response::encode`], used by `poolctl`.
    pub fn decode(elements: &[Vec<u8>]) -> Result<Self, WireError> {
        let text = |b: &[u8]| String::from_utf8_lossy(b).into_owned();
        let tag = elements
            .first()
            .map(|b| text(b))
            .ok_or_else(|| WireError::Protocol("empty response".into()))?;

        match tag.as_str() {
            "ok" => {
                let pid = elements
                    .get(1)
                    .map(|b| text(b))
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| WireError::Protocol("ok: missing pid".into()))?;
                let session_id = elements
                    .get(2)
                    .map(|b| text(b))
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| WireError::Protocol("ok: missing session id".into()))?;
                Ok(Response::Ok { pid, session_id })
            }
            "SpawnException" => Ok(Response::SpawnException {
                message: elements.get(1).map(|b| text(b)).unwrap_or_default(),
                has_error_page: elements.get(2).map(Vec::as_slice) == Some(b"1"),
            }),
            "BusyException" => Ok(Response::BusyException(
                elements.get(1).map(|b| text(b)).unwrap_or_default(),
            )),
            "IOException" => Ok(Response::IoException(
                elements.get(1).map(|b| text(b)).unwrap_or_default(),
            )),
            "SecurityException" => Ok(Response::SecurityException(
                elements.get(1).map(|b| text(b)).unwrap_or_default(),
            )),
            "true" => Ok(Response::True),
            "false" => Ok(Response::False),
            "Passed security" => Ok(Response::PassedSecurity),
            "exit command received" => Ok(Response::ExitCommandReceived),
            other => {
                if let Ok(n) = other.parse::<u64>() {
                    Ok(Response::Count(n))
                } else {
                    Ok(Response::Text(other.to_string()))
                }
            }
        }
    }
}
