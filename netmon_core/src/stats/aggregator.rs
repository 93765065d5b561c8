use crate::config::StatsConfig;
use crate::decode::{PacketRecord, Protocol};
use crate::sink::PacketSink;
use fxhash::FxHashMap;
use log::trace;
use parking_lot::Mutex;
use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BinaryHeap};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 有方向的连接标识，A→B 与 B→A 是两个不同的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub source_address: IpAddr,
    pub dest_address: IpAddr,
    pub source_port: u16,
    pub dest_port: u16,
    pub protocol: Protocol,
}

impl From<&PacketRecord> for ConnectionKey {
    fn from(record: &PacketRecord) -> Self {
        Self {
            source_address: record.source_address,
            dest_address: record.dest_address,
            source_port: record.source_port,
            dest_port: record.dest_port,
            protocol: record.protocol,
        }
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} → {}:{}",
            self.source_address, self.source_port, self.dest_address, self.dest_port
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub packets: u64,
    pub bytes: u64,
    /// 首次出现的序号，排序时用于稳定打破平局
    pub first_seen: u64,
    last_seen: u64,
}

struct AggregateState {
    total_packets: u64,
    total_bytes: u64,
    protocol_counts: FxHashMap<Protocol, u64>,
    protocol_bytes: FxHashMap<Protocol, u64>,
    connections: FxHashMap<ConnectionKey, ConnectionStats>,
    // last_seen -> key，仅在设置了连接上限时维护
    recency: BTreeMap<u64, ConnectionKey>,
    interface_counts: FxHashMap<Arc<str>, u64>,
    interface_bytes: FxHashMap<Arc<str>, u64>,
    next_seq: u64,
    evicted_connections: u64,
}

impl AggregateState {
    fn new() -> Self {
        Self {
            total_packets: 0,
            total_bytes: 0,
            protocol_counts: FxHashMap::default(),
            protocol_bytes: FxHashMap::default(),
            connections: FxHashMap::default(),
            recency: BTreeMap::new(),
            interface_counts: FxHashMap::default(),
            interface_bytes: FxHashMap::default(),
            next_seq: 0,
            evicted_connections: 0,
        }
    }
}

/// 排名：包数多者在前，包数相同时先出现者在前
#[derive(Clone, Copy)]
struct Ranked(ConnectionKey, ConnectionStats);

impl Ranked {
    fn rank(&self) -> (u64, Reverse<u64>) {
        (self.1.packets, Reverse(self.1.first_seen))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

// 容量为 n 的小顶堆，一次遍历选出排名最高的 n 个连接
fn select_top<'a, I>(connections: I, n: usize) -> BinaryHeap<Reverse<Ranked>>
where
    I: Iterator<Item = (&'a ConnectionKey, &'a ConnectionStats)>,
{
    let mut heap = BinaryHeap::with_capacity(n);
    if n == 0 {
        return heap;
    }
    for (key, stats) in connections {
        let candidate = Ranked(*key, *stats);
        if heap.len() < n {
            heap.push(Reverse(candidate));
        } else if let Some(mut worst) = heap.peek_mut() {
            if candidate > worst.0 {
                *worst = Reverse(candidate);
            }
        }
    }
    heap
}

#[derive(Debug, Clone, Copy)]
enum Selection {
    Counters,
    Top(usize),
    All,
}

/// 某一时刻的一致性统计副本
#[derive(Debug, Clone)]
pub struct StatsSnapshot {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub protocol_counts: BTreeMap<Protocol, u64>,
    pub protocol_bytes: BTreeMap<Protocol, u64>,
    /// 当前跟踪的连接数
    pub connection_count: usize,
    /// `snapshot_top` 按排名排列，`snapshot_all` 按首次出现顺序排列，`snapshot` 为空
    pub connections: Vec<(ConnectionKey, ConnectionStats)>,
    /// 仅多接口模式下有内容
    pub interface_counts: BTreeMap<String, u64>,
    pub interface_bytes: BTreeMap<String, u64>,
    pub evicted_connections: u64,
    pub started_at: Instant,
}

impl StatsSnapshot {
    pub fn empty(started_at: Instant) -> Self {
        Self {
            total_packets: 0,
            total_bytes: 0,
            protocol_counts: BTreeMap::new(),
            protocol_bytes: BTreeMap::new(),
            connection_count: 0,
            connections: Vec::new(),
            interface_counts: BTreeMap::new(),
            interface_bytes: BTreeMap::new(),
            evicted_connections: 0,
            started_at,
        }
    }

    pub fn protocol_count(&self, protocol: Protocol) -> u64 {
        self.protocol_counts.get(&protocol).copied().unwrap_or(0)
    }

    pub fn protocol_byte_count(&self, protocol: Protocol) -> u64 {
        self.protocol_bytes.get(&protocol).copied().unwrap_or(0)
    }

    pub fn connection(&self, key: &ConnectionKey) -> Option<&ConnectionStats> {
        self.connections.iter().find(|(k, _)| k == key).map(|(_, stats)| stats)
    }

    /// 按包数降序取前 `n` 个连接，包数相同时先出现的在前
    pub fn top_connections(&self, n: usize) -> Vec<(ConnectionKey, ConnectionStats)> {
        let mut sorted = self.connections.clone();
        sorted.sort_by(|a, b| Ranked(b.0, b.1).cmp(&Ranked(a.0, a.1)));
        sorted.truncate(n);
        sorted
    }

    /// 经过的秒数，至少为 1
    pub fn elapsed_secs(elapsed: Duration) -> u64 {
        elapsed.as_secs().max(1)
    }
}

/// 线程安全的统计累加器，所有捕获会话并发写入，渲染线程读取快照
pub struct StatsAggregator {
    state: Mutex<AggregateState>,
    started_at: Instant,
    max_connections: Option<usize>,
    track_interfaces: bool,
}

impl StatsAggregator {
    pub fn new() -> Self {
        Self::with_config(&StatsConfig::default(), false)
    }

    pub fn with_config(config: &StatsConfig, track_interfaces: bool) -> Self {
        Self {
            state: Mutex::new(AggregateState::new()),
            started_at: Instant::now(),
            max_connections: config.max_connections,
            track_interfaces,
        }
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// 唯一的修改入口，一个记录的所有计数在同一个临界区内更新
    pub fn record(&self, record: &PacketRecord) {
        let key = ConnectionKey::from(record);
        let bytes = u64::from(record.length);

        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.total_packets += 1;
        state.total_bytes += bytes;
        *state.protocol_counts.entry(record.protocol).or_insert(0) += 1;
        *state.protocol_bytes.entry(record.protocol).or_insert(0) += bytes;

        let seq = state.next_seq;
        state.next_seq += 1;
        let bounded = self.max_connections.is_some();

        match state.connections.get_mut(&key) {
            Some(entry) => {
                entry.packets += 1;
                entry.bytes += bytes;
                if bounded {
                    state.recency.remove(&entry.last_seen);
                    state.recency.insert(seq, key);
                }
                entry.last_seen = seq;
            }
            None => {
                state.connections.insert(
                    key,
                    ConnectionStats {
                        packets: 1,
                        bytes,
                        first_seen: seq,
                        last_seen: seq,
                    },
                );
                if bounded {
                    state.recency.insert(seq, key);
                }
            }
        }

        if let Some(max) = self.max_connections {
            while state.connections.len() > max {
                let Some((_, oldest)) = state.recency.pop_first() else {
                    break;
                };
                state.connections.remove(&oldest);
                state.evicted_connections += 1;
                trace!("淘汰最久未活动的连接: {} {}", oldest.protocol, oldest);
            }
        }

        if self.track_interfaces {
            bump(&mut state.interface_counts, &record.interface_name, 1);
            bump(&mut state.interface_bytes, &record.interface_name, bytes);
        }
    }

    /// 只复制计数，不复制连接表
    pub fn snapshot(&self) -> StatsSnapshot {
        self.capture(Selection::Counters)
    }

    /// 计数加排名前 `n` 的连接，锁内只遍历一次连接表
    pub fn snapshot_top(&self, n: usize) -> StatsSnapshot {
        self.capture(Selection::Top(n))
    }

    /// 完整复制连接表，锁内耗时随连接数增长
    pub fn snapshot_all(&self) -> StatsSnapshot {
        self.capture(Selection::All)
    }

    fn capture(&self, selection: Selection) -> StatsSnapshot {
        let mut snapshot = StatsSnapshot::empty(self.started_at);
        let mut top = BinaryHeap::new();
        {
            let state = self.state.lock();
            snapshot.total_packets = state.total_packets;
            snapshot.total_bytes = state.total_bytes;
            snapshot.protocol_counts = state.protocol_counts.iter().map(|(p, c)| (*p, *c)).collect();
            snapshot.protocol_bytes = state.protocol_bytes.iter().map(|(p, c)| (*p, *c)).collect();
            snapshot.connection_count = state.connections.len();
            snapshot.interface_counts = state
                .interface_counts
                .iter()
                .map(|(name, c)| (name.to_string(), *c))
                .collect();
            snapshot.interface_bytes = state
                .interface_bytes
                .iter()
                .map(|(name, c)| (name.to_string(), *c))
                .collect();
            snapshot.evicted_connections = state.evicted_connections;

            match selection {
                Selection::Counters => {}
                Selection::Top(n) => top = select_top(state.connections.iter(), n),
                Selection::All => {
                    snapshot.connections = state.connections.iter().map(|(k, s)| (*k, *s)).collect();
                }
            }
        }

        // 排序在锁外完成
        match selection {
            Selection::Counters => {}
            Selection::Top(_) => {
                snapshot.connections = top
                    .into_sorted_vec()
                    .into_iter()
                    .map(|Reverse(Ranked(key, stats))| (key, stats))
                    .collect();
            }
            Selection::All => snapshot.connections.sort_by_key(|(_, stats)| stats.first_seen),
        }
        snapshot
    }
}

impl Default for StatsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketSink for StatsAggregator {
    fn deliver(&self, record: PacketRecord) {
        self.record(&record);
    }
}

fn bump(counters: &mut FxHashMap<Arc<str>, u64>, name: &Arc<str>, amount: u64) {
    match counters.get_mut(&**name) {
        Some(counter) => *counter += amount,
        None => {
            counters.insert(Arc::clone(name), amount);
        }
    }
}
