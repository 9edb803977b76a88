use std::time::Duration;

/// Tunables for one mesh node. Mirrors the constants named throughout
/// spec.md §4; every interval is a `Duration` rather than a raw tick count
/// since the job runner is built over tokio time rather than a FreeRTOS
/// tick counter.
#[derive(Debug, Clone)]
pub struct MeshConfig {
    pub is_root: bool,

    /// Cap on `Topology::children`.
    pub max_children: usize,

    /// Inclusive channel range the Connect Job scans during Search phase.
    pub min_channel: u8,
    pub max_channel: u8,

    pub search_probe_interval: Duration,
    pub probes_per_channel: u32,
    pub first_parent_wait: Duration,
    pub max_parents_to_consider: usize,
    pub connect_timeout: Duration,

    pub status_send_interval: Duration,
    pub keep_alive_timeout: Duration,
    pub root_unreachable_timeout: Duration,
    pub fragment_timeout: Duration,

    /// Capacity of the `(from, id)` duplicate-suppression cache (§9).
    pub dedup_cache_capacity: usize,

    pub send_queue_capacity: usize,
    pub recv_queue_capacity: usize,
    /// Fixed at 16 by spec.md §4.4; kept configurable for tests.
    pub event_queue_capacity: usize,

    /// Upper bound on how long the job runner blocks on `RQ.pop` between
    /// checking job due times (§4.14's `MIN_TIMEOUT`).
    pub job_runner_min_timeout: Duration,
}

impl MeshConfig {
    pub fn new(is_root: bool) -> Self {
        Self { is_root, ..Self::default() }
    }

    pub fn set_max_children(&mut self, max_children: usize) {
        self.max_children = max_children;
    }

    pub fn set_channel_range(&mut self, min_channel: u8, max_channel: u8) {
        self.min_channel = min_channel;
        self.max_channel = max_channel;
    }

    pub fn set_search_probe_interval(&mut self, interval: Duration) {
        self.search_probe_interval = interval;
    }

    pub fn set_probes_per_channel(&mut self, probes: u32) {
        self.probes_per_channel = probes;
    }

    pub fn set_first_parent_wait(&mut self, wait: Duration) {
        self.first_parent_wait = wait;
    }

    pub fn set_max_parents_to_consider(&mut self, max: usize) {
        self.max_parents_to_consider = max;
    }

    pub fn set_connect_timeout(&mut self, timeout: Duration) {
        self.connect_timeout = timeout;
    }

    pub fn set_status_send_interval(&mut self, interval: Duration) {
        self.status_send_interval = interval;
    }

    pub fn set_keep_alive_timeout(&mut self, timeout: Duration) {
        self.keep_alive_timeout = timeout;
    }

    pub fn set_root_unreachable_timeout(&mut self, timeout: Duration) {
        self.root_unreachable_timeout = timeout;
    }

    pub fn set_fragment_timeout(&mut self, timeout: Duration) {
        self.fragment_timeout = timeout;
    }

    pub fn set_dedup_cache_capacity(&mut self, capacity: usize) {
        self.dedup_cache_capacity = capacity;
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            is_root: false,
            max_children: 10,
            min_channel: 1,
            max_channel: 11,
            search_probe_interval: Duration::from_millis(500),
            probes_per_channel: 3,
            first_parent_wait: Duration::from_secs(3),
            max_parents_to_consider: 5,
            connect_timeout: Duration::from_secs(5),
            status_send_interval: Duration::from_secs(5),
            keep_alive_timeout: Duration::from_secs(15),
            root_unreachable_timeout: Duration::from_secs(10),
            fragment_timeout: Duration::from_secs(5),
            dedup_cache_capacity: 64,
            send_queue_capacity: 32,
            recv_queue_capacity: 32,
            event_queue_capacity: 16,
            job_runner_min_timeout: Duration::from_millis(200),
        }
    }
}
