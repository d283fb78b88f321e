//! Engine-level integration tests: link latency arithmetic, untimed phases,
//! stop precedence, clock calibration, determinism auditing, and the error
//! contract.

use bytes::Bytes;
use parsim_core::component::{BuildCtx, Component, SimCtx};
use parsim_core::event::Event;
use parsim_core::factory::Factory;
use parsim_core::runtime::{RunError, RunMode, RunOutcome, Runtime, RuntimeConfig};
use parsim_core::sim::TraceSink;
use parsim_core::transport::SoloTransport;
use parsim_core::vortex::TimeVortex;
use parsim_core::activity::{Activity, EVENT_PRIORITY, STOP_PRIORITY, SYNC_PRIORITY};
use parsim_types::config::ConfigGraph;
use parsim_types::errors::SimError;
use parsim_types::id::{HandlerToken, LinkId, WorldShape};
use parsim_types::time::SimTime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

fn solo(factory: Factory, config: RuntimeConfig) -> Runtime {
    Runtime::new(config, factory, Arc::new(SoloTransport), WorldShape::new(1, 1))
}

/// Sends a burst of events in `setup` with fixed extra delays.
struct Burst {
    link: LinkId,
    delays: Vec<SimTime>,
}

impl Component for Burst {
    fn setup(&mut self, ctx: &mut SimCtx) -> Result<(), SimError> {
        for d in &self.delays {
            ctx.send_cycles(self.link, *d, Bytes::from_static(b"burst"))?;
        }
        Ok(())
    }
}

/// Records delivery times and releases its primary hold after `expect`
/// receipts.
struct Recorder {
    expect: u64,
    seen: u64,
    times: Arc<Mutex<Vec<SimTime>>>,
}

impl Component for Recorder {
    fn handle_event(&mut self, ctx: &mut SimCtx, _link: LinkId, event: Event)
        -> Result<(), SimError> {
        self.times.lock().unwrap().push(event.delivery_time);
        self.seen += 1;
        if self.seen == self.expect {
            ctx.primary_component_done();
        }
        Ok(())
    }
}

fn burst_factory(delays: Vec<SimTime>, expect: u64, times: Arc<Mutex<Vec<SimTime>>>) -> Factory {
    let mut f = Factory::new();
    let delays_for_ctor = delays.clone();
    f.register_fn("burst", &["out"], move |ctx: &mut BuildCtx| {
        let link = ctx.link("out")?;
        Ok(Box::new(Burst {
            link,
            delays: delays_for_ctor.clone(),
        }) as Box<dyn Component>)
    });
    f.register_fn("recorder", &["in"], move |ctx: &mut BuildCtx| {
        let link = ctx.link("in")?;
        ctx.set_handler(link)?;
        ctx.register_primary();
        Ok(Box::new(Recorder {
            expect,
            seen: 0,
            times: Arc::clone(&times),
        }) as Box<dyn Component>)
    });
    f
}

fn two_node_graph(latency: &str) -> ConfigGraph {
    let mut g = ConfigGraph::new();
    let a = g.add_component("src", "burst");
    let b = g.add_component("dst", "recorder");
    g.add_link(a, "wire", "out", latency);
    g.add_link(b, "wire", "in", latency);
    g
}

#[test]
fn events_arrive_at_now_plus_latency_plus_delay() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let factory = burst_factory(vec![0, 5, 17], 3, Arc::clone(&times));
    let runtime = solo(factory, RuntimeConfig::default());
    let summary = runtime.run(two_node_graph("1ns")).unwrap();

    // 1ns latency at a 1ps base is 1000 cycles.
    assert_eq!(*times.lock().unwrap(), vec![1000, 1005, 1017]);
    assert_eq!(summary.events_delivered, 3);
    assert_eq!(summary.end_cycle, 1017);
    assert_eq!(summary.outcome, RunOutcome::Clean);
}

#[test]
fn stop_action_lets_same_cycle_events_run_first() {
    // S6: an ordinary event and a StopAction share delivery time 42; the
    // event has the lower priority value and must dispatch first.
    let times = Arc::new(Mutex::new(Vec::new()));
    let factory = burst_factory(vec![0], 99, Arc::clone(&times));
    let config = RuntimeConfig {
        stop_at: Some("42ps".to_string()),
        ..RuntimeConfig::default()
    };
    let runtime = solo(factory, config);
    let summary = runtime.run(two_node_graph("42ps")).unwrap();

    assert_eq!(*times.lock().unwrap(), vec![42]);
    assert_eq!(summary.end_cycle, 42);
    assert_eq!(summary.outcome, RunOutcome::Clean);
}

#[test]
fn vortex_pops_a_large_scramble_in_key_order() {
    // A deterministic LCG scramble; pops must be sorted by
    // (time, priority, insertion order).
    let mut vortex = TimeVortex::new();
    let mut state = 0x2545_f491_4f6c_dd1du64;
    for _ in 0..1000 {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        let time = (state >> 33) % 512;
        let priority = match (state >> 8) % 3 {
            0 => SYNC_PRIORITY,
            1 => EVENT_PRIORITY,
            _ => STOP_PRIORITY,
        };
        vortex.insert(time, priority, Activity::Sync);
    }
    let mut keys = Vec::new();
    while !vortex.is_empty() {
        let q = vortex.pop().unwrap();
        keys.push((q.time, q.priority, q.seq));
    }
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn clock_at_2_2_ghz_ticks_2200_times_in_a_microsecond() {
    // S3, with a timebase fine enough that the 2.2 GHz period does not
    // truncate away the fractional picoseconds.
    let ticks = Arc::new(AtomicU64::new(0));
    let mut factory = Factory::new();
    let probe_ticks = Arc::clone(&ticks);
    register_tick_probe(&mut factory, probe_ticks);

    let config = RuntimeConfig {
        timebase: "1fs".to_string(),
        stop_at: Some("1us".to_string()),
        ..RuntimeConfig::default()
    };
    let runtime = solo(factory, config);
    let mut g = ConfigGraph::new();
    g.add_component("probe", "tick_probe");
    let summary = runtime.run(g).unwrap();

    assert_eq!(ticks.load(Ordering::SeqCst), 2200);
    assert_eq!(summary.clock_ticks, 2200);
}

struct TickProbe {
    ticks: Arc<AtomicU64>,
}

impl Component for TickProbe {
    fn on_clock(
        &mut self,
        _ctx: &mut SimCtx,
        _token: HandlerToken,
        _cycle: SimTime,
    ) -> Result<bool, SimError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }
}

fn register_tick_probe(factory: &mut Factory, ticks: Arc<AtomicU64>) {
    factory.register_fn("tick_probe", &[], move |ctx: &mut BuildCtx| {
        ctx.register_clock("2.2GHz", 0)?;
        Ok(Box::new(TickProbe {
            ticks: Arc::clone(&ticks),
        }) as Box<dyn Component>)
    });
}

/// Untimed-phase pair: the greeter sends in phase 0, the listener records
/// the phase in which the data showed up.
struct Greeter {
    link: LinkId,
}

impl Component for Greeter {
    fn init(&mut self, ctx: &mut SimCtx, phase: u32) -> Result<(), SimError> {
        if phase == 0 {
            ctx.send_untimed(self.link, Bytes::from_static(b"hello"))?;
        }
        Ok(())
    }
}

struct Listener {
    link: LinkId,
    got: Arc<Mutex<Vec<(u32, Bytes)>>>,
}

impl Component for Listener {
    fn init(&mut self, ctx: &mut SimCtx, phase: u32) -> Result<(), SimError> {
        while let Some(payload) = ctx.recv_untimed(self.link)? {
            self.got.lock().unwrap().push((phase, payload));
        }
        Ok(())
    }
}

#[test]
fn untimed_data_crosses_before_setup() {
    let got = Arc::new(Mutex::new(Vec::new()));
    let mut factory = Factory::new();
    factory.register_fn("greeter", &["p"], |ctx: &mut BuildCtx| {
        let link = ctx.link("p")?;
        Ok(Box::new(Greeter { link }) as Box<dyn Component>)
    });
    let got_for_ctor = Arc::clone(&got);
    factory.register_fn("listener", &["p"], move |ctx: &mut BuildCtx| {
        let link = ctx.link("p")?;
        Ok(Box::new(Listener {
            link,
            got: Arc::clone(&got_for_ctor),
        }) as Box<dyn Component>)
    });

    let mut g = ConfigGraph::new();
    let a = g.add_component("hi", "greeter");
    let b = g.add_component("ear", "listener");
    g.add_link(a, "wire", "p", "1ns");
    g.add_link(b, "wire", "p", "1ns");

    let config = RuntimeConfig {
        stop_at: Some("1ns".to_string()),
        ..RuntimeConfig::default()
    };
    let runtime = solo(factory, config);
    runtime.run(g).unwrap();

    let got = got.lock().unwrap();
    assert_eq!(got.len(), 1);
    // Sent in phase 0, visible in the following phase.
    assert_eq!(got[0].0, 1);
    assert_eq!(&got[0].1[..], b"hello");
}

#[test]
fn identical_runs_produce_identical_event_traces() {
    // Property: for one partitioning and identical inputs, the sequence of
    // (time, recipient, payload hash) tuples is identical run to run.
    let run_once = || {
        let times = Arc::new(Mutex::new(Vec::new()));
        let factory = burst_factory(vec![0, 3, 3, 9, 27], 5, Arc::clone(&times));
        let mut runtime = solo(factory, RuntimeConfig::default());
        let sink: TraceSink = Arc::new(Mutex::new(Vec::new()));
        runtime.set_trace(Arc::clone(&sink));
        runtime.run(two_node_graph("1ns")).unwrap();
        let trace = sink.lock().unwrap().clone();
        trace
    };
    let first = run_once();
    let second = run_once();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn structural_errors_abort_before_construction() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let factory = burst_factory(vec![0], 1, times);
    let runtime = solo(factory, RuntimeConfig::default());

    // Dangling link: only one endpoint connected.
    let mut g = ConfigGraph::new();
    let a = g.add_component("src", "burst");
    g.add_component("dst", "recorder");
    g.add_link(a, "wire", "out", "1ns");

    let err = runtime.run(g).unwrap_err();
    assert!(matches!(err, RunError::Structural(_)));
    assert_eq!(err.exit_code(), 1);
}

#[test]
fn unknown_component_type_is_structural() {
    let runtime = solo(Factory::new(), RuntimeConfig::default());
    let mut g = ConfigGraph::new();
    g.add_component("who", "no_such_type");
    let err = runtime.run(g).unwrap_err();
    assert!(matches!(err, RunError::Structural(_)));
}

#[test]
fn end_signal_aborts_gracefully() {
    let ticks = Arc::new(AtomicU64::new(0));
    let mut factory = Factory::new();
    register_tick_probe(&mut factory, Arc::clone(&ticks));
    let config = RuntimeConfig {
        timebase: "1ps".to_string(),
        stop_at: Some("1us".to_string()),
        ..RuntimeConfig::default()
    };
    let runtime = solo(factory, config);
    runtime.signals().end.raise();

    let mut g = ConfigGraph::new();
    g.add_component("probe", "tick_probe");
    let summary = runtime.run(g).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Signal);
    // The signal latched before the run, so the first dispatch sees it.
    assert!(ticks.load(Ordering::SeqCst) <= 1);
}

#[test]
fn alarm_signal_ends_with_deadline_outcome() {
    let ticks = Arc::new(AtomicU64::new(0));
    let mut factory = Factory::new();
    register_tick_probe(&mut factory, Arc::clone(&ticks));
    let config = RuntimeConfig {
        stop_at: Some("1us".to_string()),
        ..RuntimeConfig::default()
    };
    let runtime = solo(factory, config);
    runtime.signals().alrm.raise();

    let mut g = ConfigGraph::new();
    g.add_component("probe", "tick_probe");
    let summary = runtime.run(g).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Deadline);
}

/// Attempts a timed send during the complete phase; the link is closed.
struct LateSender {
    link: LinkId,
}

impl Component for LateSender {
    fn complete(&mut self, ctx: &mut SimCtx, phase: u32) -> Result<(), SimError> {
        if phase == 0 {
            ctx.send(self.link, 0, Bytes::from_static(b"too late"))?;
        }
        Ok(())
    }
}

#[test]
fn timed_send_after_prepare_for_complete_is_fatal() {
    let mut factory = Factory::new();
    factory.register_fn("late", &["p"], |ctx: &mut BuildCtx| {
        let link = ctx.link("p")?;
        Ok(Box::new(LateSender { link }) as Box<dyn Component>)
    });
    factory.register_fn("peer", &["p"], |_ctx: &mut BuildCtx| {
        Ok(Box::new(Idle) as Box<dyn Component>)
    });

    let mut g = ConfigGraph::new();
    let a = g.add_component("late", "late");
    let b = g.add_component("peer", "peer");
    g.add_link(a, "wire", "p", "1ns");
    g.add_link(b, "wire", "p", "1ns");

    let config = RuntimeConfig {
        stop_at: Some("1ns".to_string()),
        ..RuntimeConfig::default()
    };
    let runtime = solo(factory, config);
    let err = runtime.run(g).unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

struct Idle;
impl Component for Idle {}

#[test]
fn init_only_run_dumps_wireup_without_running() {
    let times = Arc::new(Mutex::new(Vec::new()));
    let factory = burst_factory(vec![0], 1, times);
    let config = RuntimeConfig {
        run_mode: RunMode::Init,
        ..RuntimeConfig::default()
    };
    let runtime = solo(factory, config);
    let summary = runtime.run(two_node_graph("1ns")).unwrap();
    assert_eq!(summary.events_delivered, 0);
    let dump = summary.init_dump.expect("init dump present");
    assert_eq!(dump["rank"], 0);
    assert_eq!(dump["threads"][0]["components"].as_array().unwrap().len(), 2);
    // One link pair: two halves in the arena.
    assert_eq!(dump["threads"][0]["links"].as_array().unwrap().len(), 2);
}

#[test]
fn untimed_data_crosses_ranks() {
    use parsim_core::transport::LocalTransport;
    use std::time::Duration;

    let got = Arc::new(Mutex::new(Vec::new()));
    let world = WorldShape::new(2, 1);
    let transports = LocalTransport::cluster(2, Duration::from_secs(30));

    let handles: Vec<_> = transports
        .into_iter()
        .map(|transport| {
            let got = Arc::clone(&got);
            std::thread::spawn(move || {
                let mut factory = Factory::new();
                factory.register_fn("greeter", &["p"], |ctx: &mut BuildCtx| {
                    let link = ctx.link("p")?;
                    Ok(Box::new(Greeter { link }) as Box<dyn Component>)
                });
                let got_for_ctor = Arc::clone(&got);
                factory.register_fn("listener", &["p"], move |ctx: &mut BuildCtx| {
                    let link = ctx.link("p")?;
                    Ok(Box::new(Listener {
                        link,
                        got: Arc::clone(&got_for_ctor),
                    }) as Box<dyn Component>)
                });

                let mut g = ConfigGraph::new();
                let a = g.add_component("hi", "greeter");
                let b = g.add_component("ear", "listener");
                g.add_link(a, "wire", "p", "1ns");
                g.add_link(b, "wire", "p", "1ns");

                let config = RuntimeConfig {
                    partitioner: "linear".to_string(),
                    stop_at: Some("1ns".to_string()),
                    ..RuntimeConfig::default()
                };
                let runtime = Runtime::new(config, factory, Arc::new(transport), world);
                runtime.run(g).unwrap()
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let got = got.lock().unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].0, 1, "untimed data must land in the following phase");
    assert_eq!(&got[0].1[..], b"hello");
}

/// A parent that owns one sub-component and forwards deliveries to it.
struct Nest {
    sub: Box<dyn Component>,
}

impl Component for Nest {
    fn handle_event(&mut self, ctx: &mut SimCtx, link: LinkId, event: Event)
        -> Result<(), SimError> {
        self.sub.handle_event(ctx, link, event)
    }
}

struct InnerRecorder {
    count: Arc<AtomicU64>,
}

impl Component for InnerRecorder {
    fn handle_event(&mut self, ctx: &mut SimCtx, _link: LinkId, _event: Event)
        -> Result<(), SimError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        ctx.primary_component_done();
        Ok(())
    }
}

#[test]
fn sub_components_receive_through_their_parent() {
    let count = Arc::new(AtomicU64::new(0));
    let mut factory = Factory::new();
    factory.register_fn("burst", &["out"], |ctx: &mut BuildCtx| {
        let link = ctx.link("out")?;
        Ok(Box::new(Burst {
            link,
            delays: vec![0],
        }) as Box<dyn Component>)
    });
    factory.register_fn("nest", &[], |ctx: &mut BuildCtx| {
        let sub = ctx.build_sub_component(0)?;
        Ok(Box::new(Nest { sub }) as Box<dyn Component>)
    });
    let count_for_ctor = Arc::clone(&count);
    factory.register_fn("inner_rec", &["in"], move |ctx: &mut BuildCtx| {
        let link = ctx.link("in")?;
        ctx.set_handler(link)?;
        ctx.register_primary();
        Ok(Box::new(InnerRecorder {
            count: Arc::clone(&count_for_ctor),
        }) as Box<dyn Component>)
    });

    let mut g = ConfigGraph::new();
    let src = g.add_component("src", "burst");
    let parent = g.add_component("outer", "nest");
    let sub = g.add_sub_component(parent, "inner", "inner_rec").unwrap();
    g.add_link(src, "wire", "out", "1ns");
    g.add_link(sub, "wire", "in", "1ns");

    let runtime = solo(factory, RuntimeConfig::default());
    let summary = runtime.run(g).unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(summary.end_cycle, 1000);
}
