#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use nbench_remoting::{
    Connector, RemoteCommand, RemoteFs, RemoteSession, RemotingError, RemotingResult,
    SessionState,
};

/// Remote files of one host, shared between all sessions to it.
pub type Disk = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

/// In-memory session recording every remote operation.
pub struct MemSession {
    pub host: String,
    pub state: SessionState,
    pub disk: Disk,
    pub ops: Arc<Mutex<Vec<String>>>,
    pub script_output: String,
    /// Break the channel on the append with this index.
    pub fail_on_append: Option<usize>,
    appends: usize,
}

impl MemSession {
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            state: SessionState::Opened,
            disk: Disk::default(),
            ops: Arc::default(),
            script_output: String::new(),
            fail_on_append: None,
            appends: 0,
        }
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.disk.lock().unwrap().get(path).cloned()
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Sizes of every append, in order.
    pub fn append_sizes(&self) -> Vec<usize> {
        self.ops()
            .iter()
            .filter_map(|op| op.strip_prefix("append "))
            .filter_map(|rest| rest.rsplit(' ').next())
            .filter_map(|n| n.parse().ok())
            .collect()
    }

    fn record(&self, op: String) {
        self.ops.lock().unwrap().push(op);
    }
}

#[async_trait]
impl RemoteSession for MemSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn state(&self) -> SessionState {
        self.state
    }

    async fn close(&mut self) -> RemotingResult<()> {
        self.record("close".into());
        self.state = SessionState::Closed;
        Ok(())
    }
}

#[async_trait]
impl RemoteFs for MemSession {
    async fn check_exists(&mut self, path: &str) -> RemotingResult<bool> {
        self.record(format!("exists {}", path));
        Ok(self.disk.lock().unwrap().contains_key(path))
    }

    async fn make_dirs(&mut self, dir: &str) -> RemotingResult<()> {
        self.record(format!("mkdir {}", dir));
        Ok(())
    }

    async fn delete_file(&mut self, path: &str) -> RemotingResult<()> {
        self.record(format!("delete {}", path));
        self.disk.lock().unwrap().remove(path);
        Ok(())
    }

    async fn append_bytes(&mut self, path: &str, data: &[u8]) -> RemotingResult<()> {
        if self.fail_on_append == Some(self.appends) {
            self.state = SessionState::Broken;
            return Err(RemotingError::transport("connection reset by peer").with_host(&self.host));
        }
        self.appends += 1;
        self.record(format!("append {} {}", path, data.len()));
        self.disk
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }

    async fn file_size(&mut self, path: &str) -> RemotingResult<u64> {
        Ok(self
            .disk
            .lock()
            .unwrap()
            .get(path)
            .map_or(0, |f| f.len() as u64))
    }
}

#[async_trait]
impl RemoteCommand for MemSession {
    async fn run_script(&mut self, script: &str) -> RemotingResult<String> {
        self.record(format!("run {}", script));
        Ok(self.script_output.clone())
    }
}

/// Connector handing out [`MemSession`]s bound to per-host disks.
#[derive(Default)]
pub struct MemConnector {
    pub disks: Mutex<HashMap<String, Disk>>,
    pub failing: HashSet<String>,
    pub script_output: HashMap<String, String>,
    pub calls: Mutex<Vec<String>>,
    pub ops: Arc<Mutex<Vec<String>>>,
}

impl MemConnector {
    pub fn failing(keys: &[&str]) -> Self {
        Self {
            failing: keys.iter().map(|k| k.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn disk(&self, key: &str) -> Disk {
        self.disks
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl Connector<String> for MemConnector {
    type Session = MemSession;

    async fn connect(&self, key: &String) -> RemotingResult<MemSession> {
        self.calls.lock().unwrap().push(key.clone());
        if self.failing.contains(key) {
            return Err(RemotingError::connect(key, "WinRM listener not reachable"));
        }
        let mut session = MemSession::new(key);
        session.disk = self.disk(key);
        session.ops = self.ops.clone();
        session.script_output = self.script_output.get(key).cloned().unwrap_or_default();
        Ok(session)
    }
}

pub fn keys(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}
