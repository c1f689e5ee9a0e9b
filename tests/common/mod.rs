#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, WriteHalf};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use power_indicator_link::device::{LineHandler, LinkState};
use power_indicator_link::power::{
    HostPower, PowerError, PowerModeEvent, PowerModeMonitor, SuspendController, SuspendPolicy,
};
use power_indicator_link::serial::dispatch::{dispatch_queue, ConsumerExit, LineAssembler};

/// Host whose idle time the test controls; counts suspend requests
pub struct FakeHost {
    idle: Mutex<Option<Duration>>,
    suspends: AtomicUsize,
    idle_queries: AtomicUsize,
}

impl FakeHost {
    pub fn new(idle: Option<Duration>) -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(idle),
            suspends: AtomicUsize::new(0),
            idle_queries: AtomicUsize::new(0),
        })
    }

    pub fn set_idle(&self, idle: Option<Duration>) {
        *self.idle.lock().unwrap() = idle;
    }

    pub fn suspends(&self) -> usize {
        self.suspends.load(Ordering::SeqCst)
    }

    pub fn idle_queries(&self) -> usize {
        self.idle_queries.load(Ordering::SeqCst)
    }
}

impl HostPower for FakeHost {
    fn idle_duration(&self) -> Option<Duration> {
        self.idle_queries.fetch_add(1, Ordering::SeqCst);
        *self.idle.lock().unwrap()
    }

    fn request_suspend(&self) -> Result<(), PowerError> {
        self.suspends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Resume notifications injected by the test
pub struct FakeMonitor {
    rx: Option<mpsc::Receiver<PowerModeEvent>>,
    started: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

pub struct MonitorHandle {
    pub events: mpsc::Sender<PowerModeEvent>,
    started: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl MonitorHandle {
    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

pub fn fake_monitor() -> (Box<dyn PowerModeMonitor>, MonitorHandle) {
    let (tx, rx) = mpsc::channel(8);
    let started = Arc::new(AtomicBool::new(false));
    let stopped = Arc::new(AtomicBool::new(false));
    let monitor = FakeMonitor {
        rx: Some(rx),
        started: started.clone(),
        stopped: stopped.clone(),
    };
    (
        Box::new(monitor),
        MonitorHandle {
            events: tx,
            started,
            stopped,
        },
    )
}

#[async_trait::async_trait]
impl PowerModeMonitor for FakeMonitor {
    async fn start(&mut self) -> Result<(), PowerError> {
        self.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), PowerError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn get_receiver(&mut self) -> Option<mpsc::Receiver<PowerModeEvent>> {
        self.rx.take()
    }
}

/// How the simulated indicator reacts to the reset probes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Announces START on every reload
    Responsive,
    /// Ignores reloads until it has seen a break
    AfterBreak,
    /// Never answers anything
    Silent,
    /// Resets fine but never acknowledges the monitor request
    NoMonitorAck,
}

impl Behaviour {
    fn starts_on_reload(self, seen_break: bool) -> bool {
        match self {
            Behaviour::Responsive | Behaviour::NoMonitorAck => true,
            Behaviour::AfterBreak => seen_break,
            Behaviour::Silent => false,
        }
    }
}

/// Device end of a duplex pipe that behaves like the indicator firmware
pub struct ScriptedDevice {
    received: Arc<Mutex<Vec<u8>>>,
    outgoing: mpsc::UnboundedSender<String>,
    pub task: JoinHandle<()>,
}

impl ScriptedDevice {
    pub fn spawn(stream: DuplexStream, behaviour: Behaviour) -> Self {
        let received = Arc::new(Mutex::new(Vec::new()));
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();

        let log = received.clone();
        let task = tokio::spawn(async move {
            let (mut rd, mut wr) = tokio::io::split(stream);
            let mut buf = [0u8; 256];
            let mut line = Vec::new();
            let mut seen_break = false;

            loop {
                tokio::select! {
                    n = rd.read(&mut buf) => {
                        let n = match n {
                            Ok(0) | Err(_) => break,
                            Ok(n) => n,
                        };
                        log.lock().unwrap().extend_from_slice(&buf[..n]);

                        let mut replies = Vec::new();
                        for &byte in &buf[..n] {
                            match byte {
                                0x03 => {
                                    seen_break = true;
                                    line.clear();
                                }
                                0x04 => {
                                    line.clear();
                                    if behaviour.starts_on_reload(seen_break) {
                                        replies.push("event,START");
                                    }
                                }
                                b'\n' if line.last() == Some(&b'\r') => {
                                    line.pop();
                                    if behaviour != Behaviour::Silent {
                                        replies.extend(answer(&line, behaviour));
                                    }
                                    line.clear();
                                }
                                other => line.push(other),
                            }
                        }

                        for reply in replies {
                            if wr.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                                return;
                            }
                        }
                    }
                    Some(out) = outgoing_rx.recv() => {
                        if wr.write_all(format!("{}\r\n", out).as_bytes()).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            received,
            outgoing,
            task,
        }
    }

    /// Everything the host has written so far
    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    /// Make the device emit a line, e.g. `event,POWER_LOST`
    pub fn send_line(&self, line: &str) {
        let _ = self.outgoing.send(line.to_string());
    }
}

fn answer(request: &[u8], behaviour: Behaviour) -> Vec<&'static str> {
    match request {
        b"request,POWER_STATE" => vec!["response,POWER_ON"],
        b"request,POWER_MONITOR" if behaviour != Behaviour::NoMonitorAck => {
            vec!["response,POWER_MONITOR_ON", "event,REQUEST_BLOCKING"]
        }
        b"request,POWER_MONITOR" => vec![],
        b"" => vec!["response,REQUEST_ERROR"],
        _ => vec!["response,REQUEST_UNRECOGNISED"],
    }
}

/// Host half of a link: reader pump, dispatch consumer and handler wired up
pub struct HostSide {
    pub state: Arc<LinkState>,
    pub suspend: Arc<SuspendController>,
    pub writer: WriteHalf<DuplexStream>,
    pub consumer: JoinHandle<ConsumerExit>,
    cancel: watch::Sender<bool>,
}

impl HostSide {
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

pub fn host_side(stream: DuplexStream, host: Arc<dyn HostPower>) -> HostSide {
    let state = Arc::new(LinkState::new());
    let suspend = SuspendController::new(host, SuspendPolicy::default());
    let (cancel, cancel_rx) = watch::channel(false);

    let handler = Arc::new(LineHandler::new(state.clone(), suspend.clone()));
    let (chunks, consumer) = dispatch_queue(LineAssembler::new(), handler, cancel_rx);
    let consumer = consumer.spawn();

    let (reader, writer) = tokio::io::split(stream);
    chunks.spawn_pump(reader);

    HostSide {
        state,
        suspend,
        writer,
        consumer,
        cancel,
    }
}

/// A connected host/device pair
pub fn link(behaviour: Behaviour, host: Arc<dyn HostPower>) -> (HostSide, ScriptedDevice) {
    let (host_end, device_end) = tokio::io::duplex(1024);
    (host_side(host_end, host), ScriptedDevice::spawn(device_end, behaviour))
}
