//! In-process stand-in for the queue store: just enough RESP to serve
//! `PING`, `LPUSH` and `BRPOP`.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use crucible::handlers::Stores;
use crucible::protocol::{ProtocolError, Value};
use crucible::store::AuditEntry;
use crucible::store::memory::{
    MemoryAudits, MemoryMaterials, MemoryMissions, MemoryTransmutations,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

#[derive(Default)]
struct Lists {
    data: Mutex<HashMap<Bytes, VecDeque<Bytes>>>,
    pushed: Notify,
    failing_pops: AtomicUsize,
}

impl Lists {
    fn push_front(&self, key: Bytes, value: Bytes) -> usize {
        let mut data = self.data.lock().unwrap();
        let list = data.entry(key).or_default();
        list.push_front(value);
        let len = list.len();
        drop(data);
        self.pushed.notify_waiters();
        len
    }

    fn pop_back(&self, key: &[u8]) -> Option<Bytes> {
        self.data.lock().unwrap().get_mut(key)?.pop_back()
    }

    fn len(&self, key: &[u8]) -> usize {
        self.data.lock().unwrap().get(key).map_or(0, VecDeque::len)
    }

    /// Consumes one scheduled pop failure, if any remain.
    fn take_pop_failure(&self) -> bool {
        self.failing_pops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

pub struct FakeStore {
    addr: String,
    lists: Arc<Lists>,
}

impl FakeStore {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let lists = Arc::new(Lists::default());

        let shared = Arc::clone(&lists);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, Arc::clone(&shared)));
            }
        });

        Self { addr, lists }
    }

    pub fn addr(&self) -> String {
        self.addr.clone()
    }

    pub fn len(&self, key: &str) -> usize {
        self.lists.len(key.as_bytes())
    }

    /// Answers the next `count` `BRPOP`s with an error reply.
    pub fn fail_next_pops(&self, count: usize) {
        self.lists.failing_pops.store(count, Ordering::SeqCst);
    }

    /// Scheduled pop failures not yet served.
    pub fn pending_pop_failures(&self) -> usize {
        self.lists.failing_pops.load(Ordering::SeqCst)
    }

    /// Pushes straight into the list, bypassing the client.
    pub fn push_raw(&self, key: &str, value: &[u8]) {
        self.lists
            .push_front(Bytes::copy_from_slice(key.as_bytes()), Bytes::copy_from_slice(value));
    }
}

async fn serve(mut stream: TcpStream, lists: Arc<Lists>) {
    let mut buf = BytesMut::new();
    loop {
        let value = loop {
            match Value::parse(&buf) {
                Ok((value, consumed)) => {
                    let _ = buf.split_to(consumed);
                    break value;
                }
                Err(ProtocolError::Incomplete) => match stream.read_buf(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                },
                Err(_) => return,
            }
        };

        let Value::Array(Some(items)) = value else {
            return;
        };
        let args: Vec<Bytes> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Bulk(Some(data)) => Some(data),
                _ => None,
            })
            .collect();

        let reply = match args.as_slice() {
            [cmd] if cmd.eq_ignore_ascii_case(b"PING") => Value::Simple("PONG".into()),
            [cmd, key, value] if cmd.eq_ignore_ascii_case(b"LPUSH") => {
                let len = lists.push_front(key.clone(), value.clone());
                Value::Integer(len as i64)
            }
            [cmd, _key, _timeout]
                if cmd.eq_ignore_ascii_case(b"BRPOP") && lists.take_pop_failure() =>
            {
                Value::Error("LOADING dataset is being loaded".into())
            }
            [cmd, key, _timeout] if cmd.eq_ignore_ascii_case(b"BRPOP") => {
                match wait_pop(&lists, key, &mut stream).await {
                    Some(payload) => Value::Array(Some(vec![
                        Value::Bulk(Some(key.clone())),
                        Value::Bulk(Some(payload)),
                    ])),
                    None => return,
                }
            }
            _ => Value::Error("ERR unknown command".into()),
        };

        if stream.write_all(&reply.into_bytes()).await.is_err() {
            return;
        }
    }
}

/// Blocks until `key` has an element. Returns `None` if the client hangs up
/// first, so a cancelled pop never swallows a job.
async fn wait_pop(lists: &Lists, key: &[u8], stream: &mut TcpStream) -> Option<Bytes> {
    loop {
        let notified = lists.pushed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();

        if let Some(payload) = lists.pop_back(key) {
            return Some(payload);
        }

        let mut probe = [0u8; 1];
        tokio::select! {
            _ = &mut notified => {}
            read = stream.read(&mut probe) => {
                if matches!(read, Ok(0) | Err(_)) {
                    return None;
                }
            }
        }
    }
}

pub struct MemoryStores {
    pub transmutations: Arc<MemoryTransmutations>,
    pub missions: Arc<MemoryMissions>,
    pub materials: Arc<MemoryMaterials>,
    pub audits: Arc<MemoryAudits>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self {
            transmutations: Arc::new(MemoryTransmutations::new()),
            missions: Arc::new(MemoryMissions::new()),
            materials: Arc::new(MemoryMaterials::new()),
            audits: Arc::new(MemoryAudits::new()),
        }
    }

    pub fn stores(&self) -> Stores {
        Stores {
            transmutations: self.transmutations.clone(),
            missions: self.missions.clone(),
            materials: self.materials.clone(),
            audits: self.audits.clone(),
        }
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Waits up to five seconds for at least `count` audit entries.
pub async fn wait_for_audits(audits: &MemoryAudits, count: usize) -> Vec<AuditEntry> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let entries = audits.entries().await;
        if entries.len() >= count || tokio::time::Instant::now() >= deadline {
            return entries;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
