// src/daemon/protocol.rs

//! WapkgQuack wire format
//!
//! Requests are single UTF-8 datagrams:
//!
//! ```text
//! wq/0.1;<command>;<arg>;<arg>...
//! ```
//!
//! Empty fields are dropped. Notifications are newline-terminated lines,
//! the first one being `quack!<kind>`:
//!
//! ```text
//! quack!packages-changed
//! distro/stock
//! pak:5
//! ```

use crate::error::{Error, Result};
use crate::index::AvailablePackage;
use crate::progress::format_progress;
use std::fmt::Write;
use std::net::{IpAddr, SocketAddr};

/// Leading field of every request
pub const PROTOCOL_TAG: &str = "wq/0.1";

/// Leading token of every notification
pub const NOTIFICATION_TAG: &str = "quack!";

/// Largest datagram read from the socket
pub const MAX_DATAGRAM: usize = 65536;

/// A parsed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Subscribe(SocketAddr),
    Unsubscribe(SocketAddr),
    UpdateIndex,
    /// Package names, or paths of package archives
    Install { distro: String, packages: Vec<String> },
    Remove { distro: String, packages: Vec<String> },
    /// Distribution name, or path of an installer archive
    DistInstall {
        source: String,
        name: Option<String>,
        token: Option<String>,
    },
    Packages(String),
    PackagesAvailable(String),
    Dists,
    DistsAvailable,
    Wd,
    Sources,
    PushSources(Vec<String>),
}

impl Request {
    /// Parse a request datagram
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(datagram)
            .map_err(|_| Error::ProtocolError("datagram is not UTF-8".to_string()))?;

        let mut fields = text
            .trim_end_matches(['\r', '\n'])
            .split(';')
            .filter(|field| !field.is_empty());

        if fields.next() != Some(PROTOCOL_TAG) {
            return Err(Error::ProtocolError("missing protocol tag".to_string()));
        }
        let command = fields
            .next()
            .ok_or_else(|| Error::ProtocolError("missing command".to_string()))?;
        let args: Vec<String> = fields.map(str::to_string).collect();

        let request = match (command, args.as_slice()) {
            ("subscribe", [addr, port]) => Request::Subscribe(parse_endpoint(addr, port)?),
            ("unsubscribe", [addr, port]) => Request::Unsubscribe(parse_endpoint(addr, port)?),
            ("update-index", []) => Request::UpdateIndex,
            ("install", [distro, packages @ ..]) if !packages.is_empty() => Request::Install {
                distro: distro.clone(),
                packages: packages.to_vec(),
            },
            ("remove", [distro, packages @ ..]) if !packages.is_empty() => Request::Remove {
                distro: distro.clone(),
                packages: packages.to_vec(),
            },
            ("dist-install", [source, rest @ ..]) if rest.len() <= 2 => Request::DistInstall {
                source: source.clone(),
                name: rest.first().cloned(),
                token: rest.get(1).cloned(),
            },
            ("packages", [distro]) => Request::Packages(distro.clone()),
            ("packages-available", [distro]) => Request::PackagesAvailable(distro.clone()),
            ("dists", []) => Request::Dists,
            ("dists-available", []) => Request::DistsAvailable,
            ("wd", []) => Request::Wd,
            ("sources", []) => Request::Sources,
            ("push-sources", sources) => Request::PushSources(sources.to_vec()),
            _ => {
                return Err(Error::ProtocolError(format!(
                    "unknown command or wrong arguments: {command} ({} args)",
                    args.len()
                )));
            }
        };
        Ok(request)
    }

    /// Command name, for logs
    pub fn command(&self) -> &'static str {
        match self {
            Request::Subscribe(_) => "subscribe",
            Request::Unsubscribe(_) => "unsubscribe",
            Request::UpdateIndex => "update-index",
            Request::Install { .. } => "install",
            Request::Remove { .. } => "remove",
            Request::DistInstall { .. } => "dist-install",
            Request::Packages(_) => "packages",
            Request::PackagesAvailable(_) => "packages-available",
            Request::Dists => "dists",
            Request::DistsAvailable => "dists-available",
            Request::Wd => "wd",
            Request::Sources => "sources",
            Request::PushSources(_) => "push-sources",
        }
    }
}

fn parse_endpoint(addr: &str, port: &str) -> Result<SocketAddr> {
    let ip: IpAddr = addr
        .parse()
        .map_err(|_| Error::ProtocolError(format!("invalid address: {addr}")))?;
    let port: u16 = port
        .parse()
        .map_err(|_| Error::ProtocolError(format!("invalid port: {port}")))?;
    Ok(SocketAddr::new(ip, port))
}

/// A message pushed to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Text(String),
    PackagesChanged {
        distro: String,
        packages: Vec<(String, i64)>,
    },
    Packages {
        distro: String,
        packages: Vec<(String, i64)>,
    },
    PackagesAvailable {
        distro: String,
        packages: Vec<AvailablePackage>,
    },
    Dists(Vec<String>),
    DistsAvailable(Vec<String>),
    DistsChanged(Vec<String>),
    Wd(String),
    Sources(Vec<String>),
    /// Number of indices now cached
    IndexUpdated(usize),
    Progress {
        token: String,
        current: u64,
        total: Option<u64>,
    },
    Done {
        token: String,
        ok: bool,
    },
}

impl Notification {
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Text(_) => "text",
            Notification::PackagesChanged { .. } => "packages-changed",
            Notification::Packages { .. } => "packages",
            Notification::PackagesAvailable { .. } => "packages-available",
            Notification::Dists(_) => "dists",
            Notification::DistsAvailable(_) => "dists-available",
            Notification::DistsChanged(_) => "dists-changed",
            Notification::Wd(_) => "wd",
            Notification::Sources(_) => "sources",
            Notification::IndexUpdated(_) => "index-updated",
            Notification::Progress { .. } => "progress",
            Notification::Done { .. } => "done",
        }
    }

    /// Wire form, every line newline-terminated
    pub fn encode(&self) -> String {
        let mut out = format!("{NOTIFICATION_TAG}{}\n", self.kind());

        // Writing into a String cannot fail
        let mut line = |s: &str| {
            let _ = writeln!(out, "{s}");
        };

        match self {
            Notification::Text(text) => line(text.as_str()),
            Notification::PackagesChanged { distro, packages }
            | Notification::Packages { distro, packages } => {
                line(&format!("distro/{distro}"));
                for (name, revision) in packages {
                    line(&format!("{name}:{revision}"));
                }
            }
            Notification::PackagesAvailable { distro, packages } => {
                line(&format!("distro/{distro}"));
                for package in packages {
                    line(&format!("{}:{}", package.name, package.revision_label()));
                }
            }
            Notification::Dists(names)
            | Notification::DistsAvailable(names)
            | Notification::DistsChanged(names)
            | Notification::Sources(names) => names.iter().for_each(|n| line(n.as_str())),
            Notification::Wd(path) => line(path.as_str()),
            Notification::IndexUpdated(count) => line(&count.to_string()),
            Notification::Progress {
                token,
                current,
                total,
            } => {
                line(token.as_str());
                line(&format_progress(*current, *total));
            }
            Notification::Done { token, ok } => {
                line(token.as_str());
                line(if *ok { "ok" } else { "failed" });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Request> {
        Request::parse(s.as_bytes())
    }

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            parse("wq/0.1;subscribe;127.0.0.1;5000").unwrap(),
            Request::Subscribe("127.0.0.1:5000".parse().unwrap())
        );
        assert_eq!(
            parse("wq/0.1;install;stock;pak;;skin\n").unwrap(),
            Request::Install {
                distro: "stock".to_string(),
                packages: vec!["pak".to_string(), "skin".to_string()],
            }
        );
        assert_eq!(
            parse("wq/0.1;dist-install;stock;mine;42").unwrap(),
            Request::DistInstall {
                source: "stock".to_string(),
                name: Some("mine".to_string()),
                token: Some("42".to_string()),
            }
        );
        assert_eq!(parse("wq/0.1;dists;").unwrap(), Request::Dists);
        assert_eq!(parse("wq/0.1;push-sources").unwrap(), Request::PushSources(Vec::new()));
    }

    #[test]
    fn test_parse_rejects() {
        assert!(parse("hello").is_err());
        assert!(parse("wq/0.2;dists").is_err());
        assert!(parse("wq/0.1").is_err());
        assert!(parse("wq/0.1;install;stock").is_err());
        assert!(parse("wq/0.1;subscribe;localhost;5000").is_err());
        assert!(parse("wq/0.1;subscribe;127.0.0.1;99999").is_err());
        assert!(parse("wq/0.1;frobnicate").is_err());
        assert!(Request::parse(&[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_encode_notifications() {
        let changed = Notification::PackagesChanged {
            distro: "stock".to_string(),
            packages: vec![("pak".to_string(), 5)],
        };
        assert_eq!(changed.encode(), "quack!packages-changed\ndistro/stock\npak:5\n");

        let available = Notification::PackagesAvailable {
            distro: "stock".to_string(),
            packages: vec![AvailablePackage {
                name: "meta".to_string(),
                revision: None,
            }],
        };
        assert_eq!(available.encode(), "quack!packages-available\ndistro/stock\nmeta:virtual\n");

        let progress = Notification::Progress {
            token: "7".to_string(),
            current: 128,
            total: None,
        };
        assert_eq!(progress.encode(), "quack!progress\n7\n128/?\n");

        let done = Notification::Done {
            token: "7".to_string(),
            ok: false,
        };
        assert_eq!(done.encode(), "quack!done\n7\nfailed\n");

        assert_eq!(Notification::Text("hi".to_string()).encode(), "quack!text\nhi\n");
        assert_eq!(Notification::Dists(Vec::new()).encode(), "quack!dists\n");
    }
}
