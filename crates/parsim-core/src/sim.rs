//! # parsim-core::sim
//!
//! The per-thread Scheduler: one independent simulation loop over one
//! TimeVortex. Components are pinned here and interact with the engine only
//! through the contexts defined in this module. The loop pops the next
//! activity, advances the clock, dispatches, and examines latched OS
//! signals between iterations.

use crate::{
    activity::{
        Activity, CLOCK_PRIORITY, EVENT_PRIORITY, EXIT_PRIORITY, STOP_PRIORITY, SYNC_PRIORITY,
    },
    clock::{ClockHandler, ClockMap},
    component::Component,
    event::Event,
    exit::{ExitState, EMPTY_QUEUE_MESSAGE},
    factory::Factory,
    link::{Link, LinkMap, RecvQueue},
    signals::SignalFlags,
    sync::{SyncManager, SyncType},
    timelord::{TimeConverter, TimeLord},
    vortex::TimeVortex,
    wireup::ThreadSeed,
};
use bytes::Bytes;
use fxhash::FxHashMap;
use indexmap::IndexMap;
use parsim_types::{
    config::ConfigComponent,
    errors::SimError,
    id::{parent_id, ComponentId, HandlerToken, LinkId, RankInfo, WorldShape},
    params::Params,
    time::{SimTime, MAX_SIM_TIME},
};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

/// Why a run ended early.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AbortKind {
    Signal,
    Deadline,
}

/// One delivery observation, for determinism auditing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    pub rank: u32,
    pub thread: u32,
    pub time: SimTime,
    pub component: ComponentId,
    pub payload_hash: u64,
}

pub type TraceSink = Arc<Mutex<Vec<TraceRecord>>>;

#[derive(Clone, Debug, Default)]
pub struct SchedulerStats {
    pub events_delivered: u64,
    pub clock_ticks: u64,
    pub sync_rounds: u64,
    pub rank_epochs: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Phase {
    Build,
    Init,
    Setup,
    Run,
    Complete,
    Done,
}

struct ComponentSlot {
    name: String,
    imp: Option<Box<dyn Component>>,
}

pub struct Scheduler {
    rank: RankInfo,
    world: WorldShape,
    lord: TimeLord,
    factory: Arc<Factory>,
    vortex: TimeVortex,
    links: Vec<Link>,
    link_maps: FxHashMap<ComponentId, LinkMap>,
    components: IndexMap<ComponentId, ComponentSlot>,
    pending_build: Vec<ConfigComponent>,
    clocks: ClockMap,
    exit: ExitState,
    signals: SignalFlags,
    sync: Option<SyncManager>,
    current_cycle: SimTime,
    current_priority: i32,
    end_sim: bool,
    end_cycle: SimTime,
    aborted: Option<AbortKind>,
    phase: Phase,
    untimed_sent: u64,
    stop_at: Option<SimTime>,
    heartbeat: Option<SimTime>,
    trace: Option<TraceSink>,
    pub stats: SchedulerStats,
}

impl Scheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        seed: ThreadSeed,
        rank: u32,
        world: WorldShape,
        lord: TimeLord,
        factory: Arc<Factory>,
        signals: SignalFlags,
        sync: Option<SyncManager>,
        stop_at: Option<SimTime>,
        heartbeat: Option<SimTime>,
        trace: Option<TraceSink>,
    ) -> Self {
        Self {
            rank: RankInfo::new(rank, seed.thread),
            world,
            lord,
            factory,
            vortex: TimeVortex::new(),
            links: seed.links,
            link_maps: seed.link_maps,
            components: IndexMap::new(),
            pending_build: seed.components,
            clocks: ClockMap::new(),
            exit: ExitState::new(),
            signals,
            sync,
            current_cycle: 0,
            current_priority: 0,
            end_sim: false,
            end_cycle: 0,
            aborted: None,
            phase: Phase::Build,
            untimed_sent: 0,
            stop_at,
            heartbeat,
            trace,
            stats: SchedulerStats::default(),
        }
    }

    pub fn now(&self) -> SimTime {
        self.current_cycle
    }

    pub fn end_cycle(&self) -> SimTime {
        self.end_cycle
    }

    pub fn aborted(&self) -> Option<AbortKind> {
        self.aborted.clone()
    }

    pub fn vortex_len(&self) -> usize {
        self.vortex.len()
    }

    // ---------------------------------------------------------------- build

    /// Constructs this partition's components in id order.
    pub fn build_components(&mut self) -> Result<(), SimError> {
        let pending = std::mem::take(&mut self.pending_build);
        let factory = Arc::clone(&self.factory);
        for cfg in pending {
            let links = self.link_maps.get(&cfg.id).cloned().unwrap_or_default();
            let mut ctx = BuildCtx {
                sched: &mut *self,
                id: cfg.id,
                name: &cfg.name,
                params: &cfg.params,
                links: &links,
                subs: &cfg.sub_components,
            };
            let imp = factory.create(&cfg.ty, &mut ctx).map_err(|e| {
                SimError::ComponentFailure(cfg.name.clone(), "construct", e.to_string())
            })?;
            tracing::debug!(component = %cfg.name, ty = %cfg.ty, id = cfg.id, "component built");
            self.components.insert(
                cfg.id,
                ComponentSlot {
                    name: cfg.name,
                    imp: Some(imp),
                },
            );
        }
        Ok(())
    }

    // --------------------------------------------------------------- phases

    /// The untimed init loop: phases repeat until no rank sent anything.
    pub fn init_phases(&mut self) -> Result<(), SimError> {
        self.phase = Phase::Init;
        let mut phase = 0u32;
        loop {
            let ids: Vec<ComponentId> = self.components.keys().copied().collect();
            for id in ids {
                self.with_component(id, "init", |comp, ctx| comp.init(ctx, phase))?;
            }
            let outstanding = self.exchange_untimed()?;
            tracing::trace!(phase, outstanding, "untimed init phase complete");
            phase += 1;
            if outstanding == 0 {
                break;
            }
        }
        Ok(())
    }

    pub fn setup(&mut self) -> Result<(), SimError> {
        self.phase = Phase::Setup;
        let ids: Vec<ComponentId> = self.components.keys().copied().collect();
        for id in ids {
            self.with_component(id, "setup", |comp, ctx| comp.setup(ctx))?;
        }
        Ok(())
    }

    /// The untimed complete loop after Run. Timed sends fail from here on.
    pub fn complete_phases(&mut self) -> Result<(), SimError> {
        self.prepare_for_complete();
        self.phase = Phase::Complete;
        let mut phase = 0u32;
        loop {
            let ids: Vec<ComponentId> = self.components.keys().copied().collect();
            for id in ids {
                self.with_component(id, "complete", |comp, ctx| comp.complete(ctx, phase))?;
            }
            let outstanding = self.exchange_untimed()?;
            phase += 1;
            if outstanding == 0 {
                break;
            }
        }
        Ok(())
    }

    fn prepare_for_complete(&mut self) {
        for link in &mut self.links {
            link.closed = true;
        }
    }

    /// Finish pass, then destruction in reverse-construction order.
    pub fn finish(&mut self) {
        self.phase = Phase::Done;
        let ids: Vec<ComponentId> = self.components.keys().copied().collect();
        for id in ids {
            let _ = self.with_component(id, "finish", |comp, ctx| {
                comp.finish(ctx);
                Ok(())
            });
        }
        while self.components.pop().is_some() {}
    }

    pub fn emergency_shutdown_all(&mut self) {
        for slot in self.components.values_mut() {
            if let Some(imp) = slot.imp.as_mut() {
                imp.emergency_shutdown();
            }
        }
    }

    // ------------------------------------------------------------------ run

    /// The main dispatch loop.
    pub fn run(&mut self) -> Result<(), SimError> {
        self.phase = Phase::Run;

        // Guard stop: the queue must never empty during Run.
        self.vortex.insert(
            MAX_SIM_TIME,
            STOP_PRIORITY,
            Activity::Stop {
                message: Some(EMPTY_QUEUE_MESSAGE.to_string()),
            },
        );
        if let Some(at) = self.stop_at {
            self.vortex.insert(at, STOP_PRIORITY, Activity::Stop { message: None });
        }
        if let Some(period) = self.heartbeat {
            self.vortex
                .insert(period, CLOCK_PRIORITY, Activity::Heartbeat { period });
        }
        if let Some(sm) = self.sync.as_mut() {
            let first = sm.compute_next(0);
            self.vortex.insert(first, SYNC_PRIORITY, Activity::Sync);
        }

        while !self.end_sim {
            let queued = self.vortex.pop()?;
            self.current_cycle = queued.time;
            self.current_priority = queued.priority;
            match queued.activity {
                Activity::Event(ev) => self.dispatch_event(ev)?,
                Activity::Clock { factor } => self.dispatch_clock(factor)?,
                Activity::Sync => self.execute_sync()?,
                Activity::Exit => self.execute_exit()?,
                Activity::Stop { message } => {
                    if let Some(msg) = message {
                        tracing::info!("*** {msg} ***");
                    }
                    self.end_cycle = self.current_cycle.max(self.exit.end_cycle());
                    self.end_sim = true;
                }
                Activity::Heartbeat { period } => {
                    tracing::info!(
                        cycle = self.current_cycle,
                        queued = self.vortex.len(),
                        "heartbeat"
                    );
                    let next = self.current_cycle.saturating_add(period);
                    self.vortex
                        .insert(next, CLOCK_PRIORITY, Activity::Heartbeat { period });
                }
            }
            self.poll_signals()?;
        }
        if self.end_cycle < self.current_cycle {
            self.end_cycle = self.current_cycle;
        }
        Ok(())
    }

    fn dispatch_event(&mut self, ev: Event) -> Result<(), SimError> {
        let idx = (ev.delivery_info & 0xffff_ffff) as usize;
        if idx >= self.links.len() {
            return Err(SimError::ComponentFailure(
                format!("link#{idx}"),
                "deliver",
                "delivery cookie out of range".to_string(),
            ));
        }
        self.stats.events_delivered += 1;
        metrics::counter!("parsim_events_delivered").increment(1);

        let owner = self.links[idx].owner;
        if let Some(sink) = &self.trace {
            sink.lock().expect("trace sink poisoned").push(TraceRecord {
                rank: self.rank.rank,
                thread: self.rank.thread,
                time: ev.delivery_time,
                component: owner,
                payload_hash: fxhash::hash64(&ev.payload),
            });
        }

        match self.links[idx].handler {
            Some(comp) => {
                tracing::trace!(link = idx, component = comp, time = ev.delivery_time, "deliver");
                self.with_component(comp, "handle_event", |c, ctx| c.handle_event(ctx, idx, ev))
            }
            None => {
                self.links[idx].poll_buf.push_back(ev);
                Ok(())
            }
        }
    }

    fn dispatch_clock(&mut self, factor: SimTime) -> Result<(), SimError> {
        let mut clock = match self.clocks.take(factor) {
            Some(c) => c,
            // Every handler unregistered through a path that already
            // dropped the clock; the stale activity is a no-op.
            None => return Ok(()),
        };
        self.stats.clock_ticks += 1;
        metrics::counter!("parsim_clock_ticks").increment(1);

        let cycle = self.current_cycle;
        let mut kept = Vec::with_capacity(clock.handlers.len());
        for handler in clock.handlers.drain(..) {
            let unregister = self.with_component(handler.component, "on_clock", |c, ctx| {
                c.on_clock(ctx, handler.token, cycle)
            })?;
            if !unregister {
                kept.push(handler);
            }
        }
        clock.handlers = kept;

        // A handler may have registered this period anew mid-tick. The fresh
        // registration already scheduled its own activity at the next edge,
        // so merge the handler lists and schedule at most once per factor.
        let fresh_scheduled = match self.clocks.take(factor) {
            Some(mut fresh) => {
                clock.handlers.append(&mut fresh.handlers);
                true
            }
            None => false,
        };

        if clock.handlers.is_empty() {
            // The clock removes itself by not rescheduling.
            return Ok(());
        }
        clock.next_fire = cycle.saturating_add(factor);
        if !fresh_scheduled {
            self.vortex
                .insert(clock.next_fire, CLOCK_PRIORITY, Activity::Clock { factor });
        }
        self.clocks.put_back(factor, clock);
        Ok(())
    }

    // ----------------------------------------------------------------- sync

    fn execute_sync(&mut self) -> Result<(), SimError> {
        let mut sm = self.sync.take().expect("sync activity without a manager");
        let res = self.run_sync_round(&mut sm);
        self.sync = Some(sm);
        res
    }

    fn run_sync_round(&mut self, sm: &mut SyncManager) -> Result<(), SimError> {
        self.stats.sync_rounds += 1;
        metrics::counter!("parsim_sync_rounds").increment(1);
        let epoch_was_rank = sm.next_type == SyncType::Rank;

        match sm.next_type {
            SyncType::Rank => {
                self.stats.rank_epochs += 1;
                // All threads must arrive so every outbound event reached
                // its queue, then the thread queues flush first.
                sm.shared.exec_barriers[0].wait()?;
                let local = sm.thread_sync.drain_timed();
                self.insert_incoming(local);
                sm.shared.exec_barriers[1].wait()?;

                if sm.rank.thread == 0 {
                    let (end, usr, alrm) = self.signals.snapshot_wire();
                    sm.rank_sync.exchange_timed(&*sm.transport)?;
                    let merged = sm.transport.allreduce_or([end, usr, alrm])?;
                    if merged[0] != 0 {
                        sm.shared.abort_flag.store(true, Ordering::SeqCst);
                    }
                    if merged[1] != 0 {
                        sm.shared.sig_usr.store(merged[1], Ordering::SeqCst);
                    }
                    if merged[2] != 0 {
                        sm.shared.sig_alrm.store(true, Ordering::SeqCst);
                    }
                }
                sm.shared.exec_barriers[2].wait()?;

                let remote = sm.rank_sync.take_inbound(sm.rank.thread);
                self.insert_incoming(remote);
                self.apply_epoch_flags(sm);
                sm.shared.exec_barriers[3].wait()?;
            }
            SyncType::Thread => {
                sm.shared.exec_barriers[0].wait()?;
                let local = sm.thread_sync.drain_timed();
                self.insert_incoming(local);
                if sm.world.ranks == 1 && sm.rank.thread == 0 {
                    let (end, usr, alrm) = self.signals.snapshot_wire();
                    if end != 0 {
                        sm.shared.abort_flag.store(true, Ordering::SeqCst);
                    }
                    if usr != 0 {
                        sm.shared.sig_usr.store(usr, Ordering::SeqCst);
                    }
                    if alrm != 0 {
                        sm.shared.sig_alrm.store(true, Ordering::SeqCst);
                    }
                }
                sm.shared.exec_barriers[1].wait()?;
                self.apply_epoch_flags(sm);
                sm.shared.exec_barriers[3].wait()?;
            }
        }

        // The end-of-simulation predicate rides every epoch that is global
        // in scope: rank epochs always, thread epochs only when this is a
        // single-rank world.
        if !self.end_sim && (epoch_was_rank || sm.world.ranks == 1) {
            self.vortex
                .insert(self.current_cycle, EXIT_PRIORITY, Activity::Exit);
        }

        let next = sm.compute_next(self.current_cycle);
        if !self.end_sim {
            self.vortex.insert(next, SYNC_PRIORITY, Activity::Sync);
        }
        sm.shared.exec_barriers[4].wait()?;
        Ok(())
    }

    /// The global end-of-simulation check. In a multi-partition world this
    /// is scheduled at every (global) sync epoch, after the epoch's events
    /// dispatched; single-partition worlds schedule it on demand when the
    /// last primary releases.
    fn execute_exit(&mut self) -> Result<(), SimError> {
        let count = self.exit.count();
        match self.sync.take() {
            None => {
                if count == 0 && !self.end_sim {
                    self.vortex.insert(
                        self.current_cycle,
                        STOP_PRIORITY,
                        Activity::Stop { message: None },
                    );
                    self.end_cycle = self.exit.end_cycle().max(self.current_cycle);
                }
                Ok(())
            }
            Some(sm) => {
                let res = self.execute_exit_shared(&sm);
                self.sync = Some(sm);
                res
            }
        }
    }

    fn execute_exit_shared(&mut self, sm: &SyncManager) -> Result<(), SimError> {
        let me = sm.rank.thread as usize;
        sm.shared.thread_primaries[me].store(self.exit.count(), Ordering::SeqCst);
        sm.shared.thread_end_cycles[me].store(self.exit.end_cycle(), Ordering::SeqCst);
        sm.shared.exit_barriers[0].wait()?;
        if sm.rank.thread == 0 {
            let local: u64 = sm
                .shared
                .thread_primaries
                .iter()
                .map(|a| a.load(Ordering::SeqCst))
                .sum();
            let global = if sm.world.ranks > 1 {
                sm.transport.allreduce_sum(local)?
            } else {
                local
            };
            if global == 0 {
                let local_end = sm
                    .shared
                    .thread_end_cycles
                    .iter()
                    .map(|a| a.load(Ordering::SeqCst))
                    .max()
                    .unwrap_or(0);
                let global_end = if sm.world.ranks > 1 {
                    sm.transport.allreduce_max(local_end)?
                } else {
                    local_end
                };
                sm.shared
                    .global_end_cycle
                    .store(global_end, Ordering::SeqCst);
                sm.shared.end_flag.store(true, Ordering::SeqCst);
            } else if sm.world.ranks > 1 {
                // Keep the collective call counts identical on every rank.
                let _ = sm.transport.allreduce_max(0)?;
            }
        }
        sm.shared.exit_barriers[1].wait()?;
        if sm.shared.end_flag.load(Ordering::SeqCst) && !self.end_sim {
            self.end_cycle = sm
                .shared
                .global_end_cycle
                .load(Ordering::SeqCst)
                .max(self.exit.end_cycle());
            self.vortex.insert(
                self.current_cycle,
                STOP_PRIORITY,
                Activity::Stop { message: None },
            );
        }
        Ok(())
    }

    fn apply_epoch_flags(&mut self, sm: &SyncManager) {
        if sm.rank.thread == 0 {
            match sm.shared.sig_usr.swap(0, Ordering::SeqCst) {
                1 => self.print_status(false),
                2 => self.print_status(true),
                _ => {}
            }
        }
        if sm.shared.sig_alrm.load(Ordering::SeqCst) && self.aborted.is_none() {
            tracing::warn!(cycle = self.current_cycle, "wall-clock deadline reached");
            self.aborted = Some(AbortKind::Deadline);
            self.end_cycle = self.current_cycle;
            self.end_sim = true;
        }
        if sm.shared.abort_flag.load(Ordering::SeqCst) && self.aborted.is_none() {
            tracing::warn!(cycle = self.current_cycle, "end signal observed during sync");
            self.aborted = Some(AbortKind::Signal);
            self.end_cycle = self.current_cycle;
            self.end_sim = true;
        }
    }

    fn insert_incoming(&mut self, events: Vec<Event>) {
        for mut ev in events {
            let idx = (ev.delivery_info & 0xffff_ffff) as usize;
            ev.delivery_info = idx as u64;

            // Direct interthread delivery: events that are due this very
            // epoch and target a push-style link skip the vortex and run
            // from the drain. This trades the vortex-governed total order
            // for one less queue hop, which is why it is opt-in.
            #[cfg(feature = "direct-interthread")]
            {
                if ev.delivery_time == self.current_cycle {
                    if let Some(comp) = self.links.get(idx).and_then(|l| l.handler) {
                        self.stats.events_delivered += 1;
                        if let Err(e) =
                            self.with_component(comp, "handle_event", |c, ctx| {
                                c.handle_event(ctx, idx, ev)
                            })
                        {
                            tracing::error!(error = %e, "direct interthread delivery failed");
                        }
                        continue;
                    }
                }
            }

            let (time, priority) = (ev.delivery_time, ev.priority);
            self.vortex.insert(time, priority, Activity::Event(ev));
        }
    }

    fn exchange_untimed(&mut self) -> Result<u64, SimError> {
        let sent = self.untimed_sent;
        self.untimed_sent = 0;
        if self.world.partitions() == 1 {
            // Local untimed deliveries were deposited directly.
            return Ok(sent);
        }
        let mut sm = self.sync.take().expect("untimed exchange without a manager");
        sm.shared.untimed_sent.fetch_add(sent, Ordering::SeqCst);
        let res = (|| {
            sm.shared.untimed_barriers[0].wait()?;
            let local = sm.thread_sync.drain_untimed();
            self.deliver_untimed(local);
            sm.shared.untimed_barriers[1].wait()?;
            if sm.rank.thread == 0 {
                if sm.world.ranks > 1 {
                    sm.rank_sync.exchange_untimed(&*sm.transport)?;
                }
                let local_count = sm.shared.untimed_sent.swap(0, Ordering::SeqCst);
                let global = if sm.world.ranks > 1 {
                    sm.transport.allreduce_sum(local_count)?
                } else {
                    local_count
                };
                sm.shared.untimed_global.store(global, Ordering::SeqCst);
            }
            sm.shared.untimed_barriers[2].wait()?;
            let remote = sm.rank_sync.take_untimed_inbound(sm.rank.thread);
            self.deliver_untimed(remote);
            Ok(sm.shared.untimed_global.load(Ordering::SeqCst))
        })();
        self.sync = Some(sm);
        res
    }

    fn deliver_untimed(&mut self, events: Vec<Event>) {
        for ev in events {
            let idx = (ev.delivery_info & 0xffff_ffff) as usize;
            if let Some(link) = self.links.get_mut(idx) {
                link.untimed_buf.push_back(ev.payload);
            } else {
                tracing::warn!(cookie = ev.delivery_info, "untimed event for unknown link");
            }
        }
    }

    // -------------------------------------------------------------- signals

    fn poll_signals(&mut self) -> Result<(), SimError> {
        if self.world.partitions() > 1 {
            // Multi-partition runs pick signals up at sync epochs so all
            // partitions act on them in the same simulated cycle.
            return Ok(());
        }
        if self.signals.usr1.take() {
            self.print_status(false);
        }
        if self.signals.usr2.take() {
            self.print_status(true);
        }
        if self.signals.alrm.take() {
            tracing::warn!(cycle = self.current_cycle, "wall-clock deadline reached");
            self.aborted = Some(AbortKind::Deadline);
            self.end_cycle = self.current_cycle;
            self.end_sim = true;
        }
        if self.signals.end.take() {
            tracing::warn!(cycle = self.current_cycle, "end signal received");
            self.emergency_shutdown_all();
            self.aborted = Some(AbortKind::Signal);
            self.end_cycle = self.current_cycle;
            self.end_sim = true;
        }
        Ok(())
    }

    fn print_status(&self, full: bool) {
        tracing::info!(
            rank = %self.rank,
            cycle = self.current_cycle,
            "simulation status"
        );
        if full {
            tracing::info!(
                queued = self.vortex.len(),
                components = self.components.len(),
                clocks = self.clocks.len(),
                primaries = self.exit.count(),
                "simulation status detail"
            );
        }
    }

    // ------------------------------------------------------------- plumbing

    fn with_component<R>(
        &mut self,
        id: ComponentId,
        op: &'static str,
        f: impl FnOnce(&mut dyn Component, &mut SimCtx) -> Result<R, SimError>,
    ) -> Result<R, SimError> {
        let imp = self
            .components
            .get_mut(&id)
            .and_then(|slot| slot.imp.take());
        let mut imp = match imp {
            Some(imp) => imp,
            None => {
                return Err(SimError::ComponentFailure(
                    format!("#{id}"),
                    op,
                    "component instance unavailable".to_string(),
                ))
            }
        };
        let mut ctx = SimCtx {
            sched: &mut *self,
            comp: id,
        };
        let res = f(imp.as_mut(), &mut ctx);
        if let Some(slot) = self.components.get_mut(&id) {
            slot.imp = Some(imp);
        }
        res.map_err(|e| {
            let name = self
                .components
                .get(&id)
                .map(|s| s.name.clone())
                .unwrap_or_else(|| format!("#{id}"));
            SimError::ComponentFailure(name, op, e.to_string())
        })
    }

    fn send_on(
        &mut self,
        from: ComponentId,
        link_id: LinkId,
        delay_cycles: SimTime,
        payload: Bytes,
    ) -> Result<(), SimError> {
        let (pair_idx, latency) = {
            let link = self
                .links
                .get(link_id)
                .ok_or(SimError::LinkUnconfigured(link_id))?;
            link.check_sendable()?;
            (link.pair, link.latency)
        };
        let deliver_at = self
            .current_cycle
            .saturating_add(latency)
            .saturating_add(delay_cycles);
        debug_assert!(deliver_at > self.current_cycle, "zero-latency delivery");
        let pair = self
            .links
            .get(pair_idx)
            .ok_or(SimError::LinkUnconfigured(link_id))?;
        let ev = Event {
            delivery_info: pair.delivery_info,
            delivery_time: deliver_at,
            priority: EVENT_PRIORITY,
            payload,
        };
        tracing::trace!(from, link = link_id, deliver_at, "send");
        match &pair.queue {
            RecvQueue::Unconfigured => Err(SimError::LinkUnconfigured(link_id)),
            RecvQueue::LocalVortex => {
                self.vortex
                    .insert(deliver_at, EVENT_PRIORITY, Activity::Event(ev));
                Ok(())
            }
            RecvQueue::ThreadSync { timed, .. } => timed
                .send(ev)
                .map_err(|_| SimError::Transport("thread inbox closed".to_string())),
            RecvQueue::RankSync { timed, .. } => {
                timed.lock().expect("rank queue poisoned").push(ev);
                Ok(())
            }
        }
    }

    fn send_untimed_on(
        &mut self,
        from: ComponentId,
        link_id: LinkId,
        payload: Bytes,
    ) -> Result<(), SimError> {
        if !matches!(self.phase, Phase::Init | Phase::Complete) {
            return Err(SimError::ComponentFailure(
                format!("#{from}"),
                "send_untimed",
                "untimed data is only legal during init/complete phases".to_string(),
            ));
        }
        let pair_idx = {
            let link = self
                .links
                .get(link_id)
                .ok_or(SimError::LinkUnconfigured(link_id))?;
            if !link.configured {
                return Err(SimError::LinkUnconfigured(link_id));
            }
            link.pair
        };
        self.untimed_sent += 1;
        let pair_queue = self.links[pair_idx].queue.clone();
        let ev = Event {
            delivery_info: self.links[pair_idx].delivery_info,
            delivery_time: 0,
            priority: EVENT_PRIORITY,
            payload,
        };
        match pair_queue {
            RecvQueue::Unconfigured => Err(SimError::LinkUnconfigured(link_id)),
            RecvQueue::LocalVortex => {
                // Same partition: straight into the pair's untimed buffer.
                self.links[pair_idx].untimed_buf.push_back(ev.payload);
                Ok(())
            }
            RecvQueue::ThreadSync { untimed, .. } => untimed
                .send(ev)
                .map_err(|_| SimError::Transport("thread inbox closed".to_string())),
            RecvQueue::RankSync { untimed, .. } => {
                untimed.lock().expect("rank queue poisoned").push(ev);
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Contexts
// ---------------------------------------------------------------------------

/// The runtime context a component sees during dispatch. All engine access
/// goes through here; there are no process-wide singletons.
pub struct SimCtx<'a> {
    sched: &'a mut Scheduler,
    comp: ComponentId,
}

impl<'a> SimCtx<'a> {
    pub fn now(&self) -> SimTime {
        self.sched.current_cycle
    }

    pub fn component_id(&self) -> ComponentId {
        self.comp
    }

    pub fn rank(&self) -> RankInfo {
        self.sched.rank
    }

    pub fn timelord(&self) -> TimeLord {
        self.sched.lord
    }

    /// Resolves one of this component's ports to its link.
    pub fn link(&self, port: &str) -> Result<LinkId, SimError> {
        self.sched
            .link_maps
            .get(&parent_id(self.comp))
            .and_then(|lm| lm.get(port))
            .ok_or_else(|| SimError::NoSuchPort(self.comp, port.to_string()))
    }

    /// Sends `payload` after `delay` units of the link's default timebase.
    /// Delivery is at `now + latency + delay`; the latency makes it strictly
    /// in the future.
    pub fn send(&mut self, link: LinkId, delay: SimTime, payload: Bytes) -> Result<(), SimError> {
        let tc = self
            .sched
            .links
            .get(link)
            .ok_or(SimError::LinkUnconfigured(link))?
            .default_tc;
        self.sched.send_on(self.comp, link, tc.to_core(delay), payload)
    }

    /// Sends with the delay given directly in core cycles.
    pub fn send_cycles(
        &mut self,
        link: LinkId,
        delay: SimTime,
        payload: Bytes,
    ) -> Result<(), SimError> {
        self.sched.send_on(self.comp, link, delay, payload)
    }

    /// Polls a handler-less link for an event that is due.
    pub fn recv(&mut self, link: LinkId) -> Result<Option<Event>, SimError> {
        let now = self.sched.current_cycle;
        let l = self
            .sched
            .links
            .get_mut(link)
            .ok_or(SimError::LinkUnconfigured(link))?;
        if l.handler.is_some() {
            return Err(SimError::LinkNotPolled(link));
        }
        if l.poll_buf.front().is_some_and(|ev| ev.delivery_time <= now) {
            return Ok(l.poll_buf.pop_front());
        }
        Ok(None)
    }

    /// Installs push-style delivery on a link; events then arrive through
    /// `Component::handle_event` instead of `recv`.
    pub fn set_handler(&mut self, link: LinkId) -> Result<(), SimError> {
        let comp = parent_id(self.comp);
        let l = self
            .sched
            .links
            .get_mut(link)
            .ok_or(SimError::LinkUnconfigured(link))?;
        l.handler = Some(comp);
        Ok(())
    }

    /// Units for bare numeric delays passed to [`SimCtx::send`].
    pub fn set_default_timebase(&mut self, link: LinkId, tc: TimeConverter) -> Result<(), SimError> {
        let l = self
            .sched
            .links
            .get_mut(link)
            .ok_or(SimError::LinkUnconfigured(link))?;
        l.default_tc = tc;
        Ok(())
    }

    pub fn send_untimed(&mut self, link: LinkId, payload: Bytes) -> Result<(), SimError> {
        self.sched.send_untimed_on(self.comp, link, payload)
    }

    pub fn recv_untimed(&mut self, link: LinkId) -> Result<Option<Bytes>, SimError> {
        let l = self
            .sched
            .links
            .get_mut(link)
            .ok_or(SimError::LinkUnconfigured(link))?;
        Ok(l.untimed_buf.pop_front())
    }

    /// Installs a handler on the shared clock with this period.
    pub fn register_clock(
        &mut self,
        period: &str,
        token: HandlerToken,
    ) -> Result<TimeConverter, SimError> {
        let tc = self
            .sched
            .lord
            .converter(period)
            .map_err(|e| SimError::ComponentFailure(format!("#{}", self.comp), "register_clock", e.to_string()))?;
        self.register_clock_tc(tc, token)?;
        Ok(tc)
    }

    pub fn register_clock_tc(
        &mut self,
        tc: TimeConverter,
        token: HandlerToken,
    ) -> Result<(), SimError> {
        let handler = ClockHandler {
            component: parent_id(self.comp),
            token,
        };
        let now = self.sched.current_cycle;
        if self.sched.clocks.register(tc, now, handler) {
            let first = now.saturating_add(tc.factor());
            self.sched
                .vortex
                .insert(first, CLOCK_PRIORITY, Activity::Clock { factor: tc.factor() });
        }
        Ok(())
    }

    /// Re-installs a handler on an existing clock; returns the cycle of the
    /// next edge.
    pub fn reregister_clock(
        &mut self,
        tc: TimeConverter,
        token: HandlerToken,
    ) -> Result<SimTime, SimError> {
        let handler = ClockHandler {
            component: parent_id(self.comp),
            token,
        };
        self.sched.clocks.reregister(tc, handler)
    }

    /// The cycle at which this converter's clock will next fire.
    pub fn next_clock_cycle(&self, tc: TimeConverter) -> Result<SimTime, SimError> {
        self.sched.clocks.next_cycle(tc)
    }

    /// Releases this component's primary hold on the simulation.
    pub fn primary_component_done(&mut self) {
        let now = self.sched.current_cycle;
        let comp = parent_id(self.comp);
        let last = self.sched.exit.done(comp, now);
        let thread = self.sched.rank.thread as usize;
        if let Some(sm) = self.sched.sync.as_ref() {
            sm.shared.thread_primaries[thread].store(self.sched.exit.count(), Ordering::SeqCst);
            sm.shared.thread_end_cycles[thread]
                .store(self.sched.exit.end_cycle(), Ordering::SeqCst);
        } else if last {
            self.sched
                .vortex
                .insert(now, EXIT_PRIORITY, Activity::Exit);
        }
    }
}

/// The context a component constructor sees. Parameters are settled here;
/// port lookups come from the wire-up result.
pub struct BuildCtx<'a> {
    sched: &'a mut Scheduler,
    id: ComponentId,
    name: &'a str,
    params: &'a Params,
    links: &'a LinkMap,
    subs: &'a [ConfigComponent],
}

impl<'a> BuildCtx<'a> {
    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn params(&self) -> &Params {
        self.params
    }

    pub fn timelord(&self) -> TimeLord {
        self.sched.lord
    }

    pub fn link(&self, port: &str) -> Result<LinkId, SimError> {
        self.links
            .get(port)
            .ok_or_else(|| SimError::NoSuchPort(self.id, port.to_string()))
    }

    /// Optional port: components with both push and poll styles use this.
    pub fn maybe_link(&self, port: &str) -> Option<LinkId> {
        self.links.get(port)
    }

    pub fn set_handler(&mut self, link: LinkId) -> Result<(), SimError> {
        let comp = parent_id(self.id);
        let l = self
            .sched
            .links
            .get_mut(link)
            .ok_or(SimError::LinkUnconfigured(link))?;
        l.handler = Some(comp);
        Ok(())
    }

    pub fn set_default_timebase(&mut self, link: LinkId, tc: TimeConverter) -> Result<(), SimError> {
        let l = self
            .sched
            .links
            .get_mut(link)
            .ok_or(SimError::LinkUnconfigured(link))?;
        l.default_tc = tc;
        Ok(())
    }

    /// Registers this component as primary: the simulation cannot end until
    /// it calls `primary_component_done`.
    pub fn register_primary(&mut self) {
        self.sched.exit.register(parent_id(self.id));
        let thread = self.sched.rank.thread as usize;
        if let Some(sm) = self.sched.sync.as_ref() {
            sm.shared.thread_primaries[thread].store(self.sched.exit.count(), Ordering::SeqCst);
        }
    }

    pub fn register_clock(
        &mut self,
        period: &str,
        token: HandlerToken,
    ) -> Result<TimeConverter, SimError> {
        let tc = self.sched.lord.converter(period).map_err(|e| {
            SimError::ComponentFailure(self.name.to_string(), "register_clock", e.to_string())
        })?;
        let handler = ClockHandler {
            component: parent_id(self.id),
            token,
        };
        let now = self.sched.current_cycle;
        if self.sched.clocks.register(tc, now, handler) {
            let first = now.saturating_add(tc.factor());
            self.sched
                .vortex
                .insert(first, CLOCK_PRIORITY, Activity::Clock { factor: tc.factor() });
        }
        Ok(tc)
    }

    /// Declared sub-component records for this component.
    pub fn sub_components(&self) -> &[ConfigComponent] {
        self.subs
    }

    /// Builds the sub-component at `slot`. The returned instance is owned
    /// exclusively by the parent; its link ports were merged into the
    /// parent's map as `sub_name.port`.
    pub fn build_sub_component(&mut self, slot: usize) -> Result<Box<dyn Component>, SimError> {
        let cfg = self
            .subs
            .get(slot)
            .cloned()
            .ok_or_else(|| {
                SimError::ComponentFailure(
                    self.name.to_string(),
                    "build_sub",
                    format!("no sub-component slot {slot}"),
                )
            })?;
        // Project the parent's map down to the sub's bare port names.
        let mut sub_links = LinkMap::new();
        let prefix = format!("{}.", cfg.name);
        for (key, link) in self.links.iter() {
            if let Some(bare) = key.strip_prefix(&prefix) {
                sub_links.insert(bare, link);
            }
        }
        let factory = Arc::clone(&self.sched.factory);
        let mut ctx = BuildCtx {
            sched: &mut *self.sched,
            id: cfg.id,
            name: &cfg.name,
            params: &cfg.params,
            links: &sub_links,
            subs: &cfg.sub_components,
        };
        factory.create(&cfg.ty, &mut ctx)
    }
}
