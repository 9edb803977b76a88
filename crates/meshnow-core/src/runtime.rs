//! The top-level mesh runtime (§6 "User API (provided)"): `init` / `deinit`
//! / `start` / `stop`, `send`, and the data-callback registry. This is the
//! one piece of the design spec.md's §1 calls "out of scope" for the
//! *platform* wrapper (NVS, `app_main`, the ESP-IDF component glue) but
//! explicitly specifies as "provided" at the library boundary (§6) — the
//! entry point the user's application actually calls. Grounded on the
//! init/start/stop lifecycle and task-spawning shape of
//! `styrene-rns-transport::transport::Transport`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use meshnow_wire::Address;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use meshnow_wire::Payload;

use crate::callbacks::{CallbackHandle, CallbackRegistry, DataCallback};
use crate::collaborators::{IpStackAdapter, KeyValueStore, LinkLayer};
use crate::config::MeshConfig;
use crate::dedup::DedupCache;
use crate::error::MeshError;
use crate::event::EventBus;
use crate::fragment::FragmentTable;
use crate::jobs::{ConnectJob, FragmentGcJob, JobContext, NeighborCheckJob, StatusJob, UnreachableTimeoutJob};
use crate::packet_handler::{self, PacketHandlerCtx};
use crate::queue::{new_packet_id, ReceiveItem, ReceiveQueue, ReceiveQueueHandle, SendItem, SendQueue, SendQueueHandle};
use crate::send::{ControlPlane, SendBehavior, SendWorker};
use crate::state::StateMachine;
use crate::topology::Topology;

/// Control-plane state behind the single global lock (§5): the Topology
/// Store, State Machine, Fragment Table, duplicate-suppression cache, and
/// every Job's phase-local state.
struct Inner {
    config: MeshConfig,
    this_mac: Address,
    topology: Topology,
    state_machine: StateMachine,
    fragments: FragmentTable,
    dedup: DedupCache,
    connect_job: ConnectJob,
    status_job: StatusJob,
    neighbor_check_job: NeighborCheckJob,
    unreachable_job: UnreachableTimeoutJob,
    fragment_gc_job: FragmentGcJob,
}

impl ControlPlane for Inner {
    fn this_mac(&self) -> Address {
        self.this_mac
    }

    fn is_root(&self) -> bool {
        self.config.is_root
    }

    fn topology(&self) -> &Topology {
        &self.topology
    }
}

struct Tasks {
    cancel: CancellationToken,
    job_runner: JoinHandle<()>,
    send_worker: JoinHandle<()>,
}

struct MeshState<L, I, K> {
    link: Arc<L>,
    ip_stack: Arc<I>,
    kv: Arc<K>,
    inner: Arc<AsyncMutex<Inner>>,
    event_bus: EventBus,
    send_queue: SendQueue,
    data_callbacks: Arc<CallbackRegistry>,
    recv_queue: ReceiveQueue,
    recv_handle: AsyncMutex<Option<ReceiveQueueHandle>>,
    send_handle: AsyncMutex<Option<SendQueueHandle>>,
    running: AtomicBool,
    tasks: AsyncMutex<Option<Tasks>>,
}

/// A handle to one mesh node. Cheaply `Clone`-able; every clone shares the
/// same runtime state (§3: "Topology store, state, event bus ... are each
/// single instances owned by the mesh runtime").
pub struct Mesh<L, I, K> {
    state: Arc<MeshState<L, I, K>>,
}

impl<L, I, K> Clone for Mesh<L, I, K> {
    fn clone(&self) -> Self {
        Self { state: self.state.clone() }
    }
}

impl<L, I, K> Mesh<L, I, K>
where
    L: LinkLayer + 'static,
    I: IpStackAdapter + 'static,
    K: KeyValueStore + 'static,
{
    /// §6 `init(config)`. `this_mac` stands in for the platform's own MAC
    /// address query, which is itself out of scope (§1).
    pub fn init(config: MeshConfig, this_mac: Address, link: Arc<L>, ip_stack: Arc<I>, kv: Arc<K>) -> Self {
        let is_root = config.is_root;
        let connect_job = ConnectJob::new(is_root, &config, kv.as_ref());
        let inner = Inner {
            topology: Topology::new(config.max_children),
            state_machine: StateMachine::new(is_root, this_mac),
            fragments: FragmentTable::new(),
            dedup: DedupCache::new(config.dedup_cache_capacity),
            connect_job,
            status_job: StatusJob::new(),
            neighbor_check_job: NeighborCheckJob::new(),
            unreachable_job: UnreachableTimeoutJob::new(),
            fragment_gc_job: FragmentGcJob::new(),
            config,
            this_mac,
        };
        let (recv_queue, recv_handle) = ReceiveQueue::new(inner.config.recv_queue_capacity);
        let (send_queue, send_handle) = SendQueue::new(inner.config.send_queue_capacity);
        let event_bus = EventBus::new(inner.config.event_queue_capacity);

        let state = Arc::new(MeshState {
            link,
            ip_stack,
            kv,
            inner: Arc::new(AsyncMutex::new(inner)),
            event_bus,
            send_queue,
            data_callbacks: Arc::new(CallbackRegistry::new()),
            recv_queue,
            recv_handle: AsyncMutex::new(Some(recv_handle)),
            send_handle: AsyncMutex::new(Some(send_handle)),
            running: AtomicBool::new(false),
            tasks: AsyncMutex::new(None),
        });

        let recv_queue_for_cb = state.recv_queue.clone();
        state.link.register_recv(Box::new(move |from, bytes, rssi| {
            let Ok(packet) = meshnow_wire::Packet::decode(bytes) else {
                log::warn!("mesh({this_mac}): dropping malformed frame from {from}");
                return;
            };
            let item = ReceiveItem { packet, link_sender: from, rssi };
            // The link layer calls back from its own context, possibly not
            // an async one; `try_push` never blocks, matching §5's
            // "suspension points ... the job runner must never hold the
            // lock across these" by simply never taking one here.
            if !recv_queue_for_cb.try_push(item) {
                log::warn!("mesh({this_mac}): receive queue full, dropping frame from {from}");
            }
        }));

        log::info!("mesh({this_mac}): initialized (root = {is_root})");
        Self { state }
    }

    /// §6 `deinit()`. Requires the mesh to be stopped.
    pub async fn deinit(self) -> Result<(), MeshError> {
        if self.state.running.load(Ordering::SeqCst) {
            return Err(MeshError::AlreadyStarted);
        }
        Ok(())
    }

    pub fn subscribe_events(&self) -> tokio::sync::broadcast::Receiver<crate::event::Event> {
        self.state.event_bus.subscribe()
    }

    pub fn register_data_callback(&self, callback: DataCallback) -> CallbackHandle {
        self.state.data_callbacks.register(callback)
    }

    pub fn unregister_data_callback(&self, handle: CallbackHandle) {
        self.state.data_callbacks.unregister(handle)
    }

    /// §6 `start()`: spins up the Job Runner and Send Worker tasks.
    pub async fn start(&self) -> Result<(), MeshError> {
        if self.state.running.swap(true, Ordering::SeqCst) {
            return Err(MeshError::AlreadyStarted);
        }

        let recv_handle = self.state.recv_handle.lock().await.take().ok_or(MeshError::AlreadyStarted)?;
        let send_handle = self.state.send_handle.lock().await.take().ok_or(MeshError::AlreadyStarted)?;

        let cancel = CancellationToken::new();

        let send_worker = SendWorker::new(send_handle, self.state.inner.clone(), self.state.link.clone());
        let send_worker_cancel = cancel.child_token();
        let send_worker_task = tokio::spawn(send_worker.run(send_worker_cancel));

        let job_runner_mesh = self.clone();
        let job_runner_cancel = cancel.child_token();
        let job_runner_task = tokio::spawn(async move {
            job_runner_mesh.run_job_runner(recv_handle, job_runner_cancel).await;
        });

        *self.state.tasks.lock().await =
            Some(Tasks { cancel, job_runner: job_runner_task, send_worker: send_worker_task });

        log::info!("mesh({}): started", self.state.inner.lock().await.this_mac);
        Ok(())
    }

    /// §6 `stop()`: cooperative shutdown, waiting for both long-running
    /// tasks to observe the stop flag and exit (§5's wait-bits handshake,
    /// rendered here as plain `JoinHandle` awaits).
    pub async fn stop(&self) -> Result<(), MeshError> {
        if !self.state.running.swap(false, Ordering::SeqCst) {
            return Err(MeshError::NotStarted);
        }
        let Some(tasks) = self.state.tasks.lock().await.take() else {
            return Err(MeshError::NotStarted);
        };
        tasks.cancel.cancel();
        let _ = tasks.job_runner.await;
        let _ = tasks.send_worker.await;
        log::info!("mesh({}): stopped", self.state.inner.lock().await.this_mac);
        Ok(())
    }

    /// §6 `send(dest_addr, bytes)`: fragments if necessary and enqueues via
    /// `FullyResolve`.
    pub async fn send(&self, dest: Address, bytes: &[u8]) -> Result<(), MeshError> {
        if !self.state.running.load(Ordering::SeqCst) {
            return Err(MeshError::NotStarted);
        }
        if bytes.len() > meshnow_wire::MAX_CUSTOM_PAYLOAD {
            return Err(MeshError::PayloadTooLarge { len: bytes.len(), max: meshnow_wire::MAX_CUSTOM_PAYLOAD });
        }
        let this_mac = self.state.inner.lock().await.this_mac;
        self.state
            .send_queue
            .push(SendItem {
                id: new_packet_id(),
                payload: Payload::CustomData { data: bytes.to_vec() },
                behavior: SendBehavior::fully_resolve(this_mac, dest, None),
            })
            .await;
        Ok(())
    }

    /// §6 IP-stack adaptor `transmit(buffer, len)`: the stack hands the
    /// core a datagram, first 6 bytes the destination address; fragmented
    /// into `DataFragment`s if it exceeds one frame.
    pub async fn transmit_ip_datagram(&self, datagram: &[u8]) -> Result<(), MeshError> {
        if datagram.len() < 6 {
            return Err(MeshError::PayloadTooLarge { len: datagram.len(), max: 1500 });
        }
        let dest = Address::from_slice(&datagram[..6]).ok_or(MeshError::PayloadTooLarge { len: 6, max: 6 })?;
        let payload = &datagram[6..];
        let this_mac = self.state.inner.lock().await.this_mac;

        if payload.len() <= meshnow_wire::MAX_FRAG_PAYLOAD {
            self.state
                .send_queue
                .push(SendItem {
                    id: new_packet_id(),
                    payload: Payload::DataFragment {
                        frag_id: new_packet_id(),
                        frag_num: 0,
                        total_size: payload.len() as u16,
                        data: payload.to_vec(),
                    },
                    behavior: SendBehavior::fully_resolve(this_mac, dest, None),
                })
                .await;
            return Ok(());
        }

        let frag_id = new_packet_id();
        let total_size = payload.len() as u16;
        for (num, chunk) in payload.chunks(meshnow_wire::MAX_FRAG_PAYLOAD).enumerate() {
            self.state
                .send_queue
                .push(SendItem {
                    id: new_packet_id(),
                    payload: Payload::DataFragment { frag_id, frag_num: num as u8, total_size, data: chunk.to_vec() },
                    behavior: SendBehavior::fully_resolve(this_mac, dest, None),
                })
                .await;
        }
        Ok(())
    }

    /// §4.14's cooperative loop: wait on RQ up to `min(MIN_TIMEOUT, next
    /// job due)`, run the Packet Handler on anything that arrived, then
    /// fire every due job.
    async fn run_job_runner(&self, mut rq: ReceiveQueueHandle, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let timeout = {
                let guard = self.state.inner.lock().await;
                self.next_timeout(&guard)
            };

            let item = tokio::select! {
                _ = cancel.cancelled() => return,
                item = rq.pop_timeout(timeout) => item,
            };
            if let Some(item) = item {
                self.handle_received(item).await;
            }

            self.run_due_jobs().await;
            tokio::task::yield_now().await;
        }
    }

    fn next_timeout(&self, inner: &Inner) -> Duration {
        let now = Instant::now();
        let min_timeout = inner.config.job_runner_min_timeout;
        let jobs: [Option<Instant>; 5] = [
            inner.connect_job.next_action_at(&inner.config),
            inner.status_job.next_action_at(&inner.config),
            inner.neighbor_check_job.next_action_at(&inner.config, &inner.topology),
            inner.unreachable_job.next_action_at(&inner.config),
            inner.fragment_gc_job.next_action_at(&inner.config, &inner.fragments),
        ];
        let earliest = jobs.into_iter().flatten().min();
        match earliest {
            Some(due) if due > now => min_timeout.min(due - now),
            Some(_) => Duration::ZERO,
            None => min_timeout,
        }
    }

    async fn handle_received(&self, item: ReceiveItem) {
        let mut guard = self.state.inner.lock().await;
        let inner = &mut *guard;
        let mut ctx = PacketHandlerCtx {
            this_mac: inner.this_mac,
            is_root: inner.config.is_root,
            config: &inner.config,
            topology: &mut inner.topology,
            state_machine: &mut inner.state_machine,
            fragments: &mut inner.fragments,
            dedup: &mut inner.dedup,
            connect_job: &mut inner.connect_job,
            unreachable_job: &mut inner.unreachable_job,
            event_bus: &self.state.event_bus,
            send_queue: &self.state.send_queue,
            link: self.state.link.as_ref(),
            kv: self.state.kv.as_ref(),
            ip_stack: self.state.ip_stack.as_ref(),
            data_callbacks: &self.state.data_callbacks,
        };
        packet_handler::handle_packet(&mut ctx, item.packet, item.link_sender, item.rssi).await;
    }

    async fn run_due_jobs(&self) {
        let now = Instant::now();
        let mut guard = self.state.inner.lock().await;
        let inner = &mut *guard;

        macro_rules! fire_if_due {
            ($job:expr, $due_at:expr) => {
                if $due_at.map(|at| at <= now).unwrap_or(false) {
                    let mut ctx = JobContext {
                        this_mac: inner.this_mac,
                        is_root: inner.config.is_root,
                        config: &inner.config,
                        topology: &mut inner.topology,
                        state_machine: &mut inner.state_machine,
                        fragments: &mut inner.fragments,
                        event_bus: &self.state.event_bus,
                        send_queue: &self.state.send_queue,
                        link: self.state.link.as_ref(),
                        kv: self.state.kv.as_ref(),
                    };
                    $job.perform_action(&mut ctx).await;
                }
            };
        }

        let connect_due = inner.connect_job.next_action_at(&inner.config);
        fire_if_due!(inner.connect_job, connect_due);
        let status_due = inner.status_job.next_action_at(&inner.config);
        fire_if_due!(inner.status_job, status_due);
        let neighbor_due = inner.neighbor_check_job.next_action_at(&inner.config, &inner.topology);
        fire_if_due!(inner.neighbor_check_job, neighbor_due);
        let unreachable_due = inner.unreachable_job.next_action_at(&inner.config);
        fire_if_due!(inner.unreachable_job, unreachable_due);
        let gc_due = inner.fragment_gc_job.next_action_at(&inner.config, &inner.fragments);
        fire_if_due!(inner.fragment_gc_job, gc_due);
    }
}
