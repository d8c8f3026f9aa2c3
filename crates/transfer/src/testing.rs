//! Scripted in-memory remote filesystem for unit tests.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};

use sitedeploy_ftp::FtpError;

use crate::TransferError;
use crate::connection::{BoxFuture, Connector, RemoteFs};

/// A failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// Connection drops; the connection stays dead afterwards.
    Reset,
    /// Server refuses the operation.
    Denied,
}

impl Fault {
    fn error(self) -> TransferError {
        match self {
            Fault::Reset => TransferError::Ftp(FtpError::disconnected("connection reset by peer")),
            Fault::Denied => TransferError::Ftp(FtpError::from_reply(553, "Permission denied")),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockServer {
    pub home: String,
    pub dirs: BTreeSet<String>,
    pub connects: u32,
    pub commands: Vec<String>,
    /// Every path a `put` was attempted on, in order.
    pub put_attempts: Vec<String>,
    pub stored: Vec<String>,
    pub put_faults: HashMap<String, VecDeque<Fault>>,
    /// Faults for `make_dir`, keyed by absolute directory path.
    pub dir_faults: HashMap<String, VecDeque<Fault>>,
    pub connect_faults: VecDeque<Fault>,
}

pub(crate) type Shared = Arc<Mutex<MockServer>>;

/// Server whose login lands in `home`, with `dirs` already present.
pub(crate) fn server(home: &str, dirs: &[&str]) -> Shared {
    let mut all: BTreeSet<String> = dirs.iter().map(|d| d.to_string()).collect();
    all.insert("/".into());
    all.insert(home.to_string());
    Arc::new(Mutex::new(MockServer {
        home: home.to_string(),
        dirs: all,
        ..Default::default()
    }))
}

pub(crate) fn fail_put(server: &Shared, path: &str, faults: &[Fault]) {
    server
        .lock()
        .unwrap()
        .put_faults
        .entry(path.to_string())
        .or_default()
        .extend(faults.iter().copied());
}

pub(crate) fn fail_mkd(server: &Shared, path: &str, faults: &[Fault]) {
    server
        .lock()
        .unwrap()
        .dir_faults
        .entry(path.to_string())
        .or_default()
        .extend(faults.iter().copied());
}

pub(crate) struct MockConnector {
    pub server: Shared,
}

impl Connector for MockConnector {
    fn connect(&self) -> BoxFuture<'_, Result<Box<dyn RemoteFs>, TransferError>> {
        Box::pin(async move {
            let mut s = self.server.lock().unwrap();
            s.connects += 1;
            if let Some(fault) = s.connect_faults.pop_front() {
                return Err(fault.error());
            }
            Ok(Box::new(MockFs {
                server: self.server.clone(),
                cwd: s.home.clone(),
                alive: true,
            }) as Box<dyn RemoteFs>)
        })
    }
}

pub(crate) struct MockFs {
    server: Shared,
    cwd: String,
    alive: bool,
}

impl MockFs {
    fn absolute(&self, path: &str) -> String {
        if path.starts_with('/') {
            path.to_string()
        } else if self.cwd == "/" {
            format!("/{path}")
        } else {
            format!("{}/{path}", self.cwd)
        }
    }

    fn check_alive(&self) -> Result<(), TransferError> {
        if self.alive {
            Ok(())
        } else {
            Err(Fault::Reset.error())
        }
    }
}

impl RemoteFs for MockFs {
    fn pwd(&mut self) -> BoxFuture<'_, Result<String, TransferError>> {
        Box::pin(async move {
            self.check_alive()?;
            self.server.lock().unwrap().commands.push("PWD".into());
            Ok(self.cwd.clone())
        })
    }

    fn change_dir<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Result<(), TransferError>> {
        Box::pin(async move {
            self.check_alive()?;
            let target = self.absolute(path);
            let mut s = self.server.lock().unwrap();
            s.commands.push(format!("CWD {path}"));
            if s.dirs.contains(&target) {
                drop(s);
                self.cwd = target;
                Ok(())
            } else {
                Err(TransferError::Ftp(FtpError::from_reply(
                    550,
                    "No such file or directory",
                )))
            }
        })
    }

    fn make_dir<'a>(&'a mut self, path: &'a str) -> BoxFuture<'a, Result<(), TransferError>> {
        Box::pin(async move {
            self.check_alive()?;
            let target = self.absolute(path);
            let mut s = self.server.lock().unwrap();
            s.commands.push(format!("MKD {path}"));
            if let Some(fault) = s.dir_faults.get_mut(&target).and_then(VecDeque::pop_front) {
                if fault == Fault::Reset {
                    self.alive = false;
                }
                return Err(fault.error());
            }
            if s.dirs.insert(target) {
                Ok(())
            } else {
                Err(TransferError::Ftp(FtpError::from_reply(550, "File exists")))
            }
        })
    }

    fn put<'a>(
        &'a mut self,
        _local: &'a Path,
        name: &'a str,
    ) -> BoxFuture<'a, Result<u64, TransferError>> {
        Box::pin(async move {
            self.check_alive()?;
            let target = self.absolute(name);
            let mut s = self.server.lock().unwrap();
            s.commands.push(format!("STOR {name}"));
            s.put_attempts.push(target.clone());
            let fault = s.put_faults.get_mut(&target).and_then(VecDeque::pop_front);
            match fault {
                Some(fault) => {
                    if fault == Fault::Reset {
                        self.alive = false;
                    }
                    Err(fault.error())
                }
                None => {
                    s.stored.push(target);
                    Ok(0)
                }
            }
        })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, ()> {
        Box::pin(async move {
            self.server.lock().unwrap().commands.push("QUIT".into());
        })
    }
}
