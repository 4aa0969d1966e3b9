//! Control loops that tie a role to a radio and, for marks, a hull.

use std::time::Duration;

use anyhow::Result;
use buoy_nav::avoid::Indicator;
use buoy_nav::wind::WindSpeedMeter;
use buoy_proto::{Packet, PacketCodec};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::coordinator::Coordinator;
use crate::helm::MotorCommand;
use crate::keeper::{Event, Output, Readings, StationKeeper};
use crate::radio::Radio;
use crate::reply::ReplyQueue;

/// Control loop period, 10 Hz.
pub const TICK: Duration = Duration::from_millis(100);

/// The mark's sensors and actuators.
pub trait Hull {
    fn read(&mut self) -> Readings;
    fn command(&mut self, cmd: MotorCommand);
    fn indicate(&mut self, indicator: Indicator);
}

enum Wake {
    Tick,
    Frame(Vec<u8>),
    Idle,
}

/// Waits for the next 10 Hz boundary or an incoming frame, whichever is
/// first. `due` cuts the wait short so a queued reply goes out on time.
async fn wake<R: Radio>(radio: &mut R, next_tick: &mut Instant, due: Option<Instant>) -> Wake {
    let now = Instant::now();
    if now >= *next_tick {
        *next_tick += TICK;
        if *next_tick <= now {
            // Fell behind; don't burst to catch up.
            *next_tick = now + TICK;
        }
        return Wake::Tick;
    }
    let until = due.map_or(*next_tick, |d| d.min(*next_tick));
    if until <= now {
        return Wake::Idle;
    }
    match radio.recv(until - now).await {
        Ok(Some(frame)) => Wake::Frame(frame),
        Ok(None) => Wake::Idle,
        Err(e) => {
            warn!("radio: {:#}", e);
            tokio::time::sleep_until(until).await;
            Wake::Idle
        }
    }
}

pub struct BuoyNode<R, H> {
    keeper: StationKeeper,
    codec: PacketCodec,
    radio: R,
    hull: H,
    anemometer: Option<WindSpeedMeter>,
    replies: ReplyQueue,
    boot: Instant,
}

impl<R: Radio, H: Hull> BuoyNode<R, H> {
    pub fn new(keeper: StationKeeper, codec: PacketCodec, radio: R, hull: H) -> Self {
        let replies = ReplyQueue::new(keeper.id());
        Self { keeper, codec, radio, hull, anemometer: None, replies, boot: Instant::now() }
    }

    pub fn with_anemometer(mut self, meter: WindSpeedMeter) -> Self {
        self.anemometer = Some(meter);
        self
    }

    pub fn keeper(&self) -> &StationKeeper {
        &self.keeper
    }

    pub fn hull(&self) -> &H {
        &self.hull
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(id = %self.keeper.id(), scheme = ?self.codec.scheme(), "mark online");
        let mut next_tick = Instant::now();
        loop {
            self.step(&mut next_tick).await?;
        }
    }

    /// One loop iteration: due replies go out, then a tick or one received
    /// frame is handled.
    pub async fn step(&mut self, next_tick: &mut Instant) -> Result<()> {
        while let Some(p) = self.replies.pop_due(Instant::now()) {
            send(&mut self.radio, &mut self.codec, &p).await;
        }
        let event = match wake(&mut self.radio, next_tick, self.replies.next_due()).await {
            Wake::Idle => return Ok(()),
            Wake::Tick => {
                self.sample_wind();
                Event::Tick(self.hull.read())
            }
            Wake::Frame(frame) => match self.codec.decode(&frame) {
                Ok(p) => Event::Packet(p),
                Err(e) => {
                    debug!(len = frame.len(), error = %e, "dropped frame");
                    return Ok(());
                }
            },
        };
        let now = Instant::now();
        let out = self.keeper.handle(event, now.into_std());
        self.dispatch(out, now);
        Ok(())
    }

    fn sample_wind(&mut self) {
        let Some(meter) = self.anemometer.as_mut() else { return };
        let before = meter.speed_kmh();
        let now_ms = self.boot.elapsed().as_millis() as u32;
        let kmh = meter.update(now_ms);
        if kmh != before {
            debug!(id = %self.keeper.id(), kmh, "wind speed");
        }
    }

    fn dispatch(&mut self, out: Vec<Output>, now: Instant) {
        for o in out {
            match o {
                Output::Motor(cmd) => self.hull.command(cmd),
                Output::Indicator(ind) => self.hull.indicate(ind),
                Output::Reply(p) => self.replies.push(p, now),
            }
        }
    }
}

pub struct CoordinatorNode<R> {
    coordinator: Coordinator,
    codec: PacketCodec,
    radio: R,
}

impl<R: Radio> CoordinatorNode<R> {
    pub fn new(coordinator: Coordinator, codec: PacketCodec, radio: R) -> Self {
        Self { coordinator, codec, radio }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub async fn run(&mut self) -> Result<()> {
        info!(scheme = ?self.codec.scheme(), started = self.coordinator.is_started(), "coordinator online");
        let mut next_tick = Instant::now();
        loop {
            self.step(&mut next_tick).await?;
        }
    }

    pub async fn step(&mut self, next_tick: &mut Instant) -> Result<()> {
        match wake(&mut self.radio, next_tick, None).await {
            Wake::Frame(frame) => match self.codec.decode(&frame) {
                Ok(p) => self.coordinator.handle(p, Instant::now().into_std()),
                Err(e) => debug!(len = frame.len(), error = %e, "dropped frame"),
            },
            Wake::Idle => {}
            Wake::Tick => {
                for p in self.coordinator.tick(Instant::now().into_std()) {
                    send(&mut self.radio, &mut self.codec, &p).await;
                }
            }
        }
        Ok(())
    }
}

async fn send<R: Radio>(radio: &mut R, codec: &mut PacketCodec, p: &Packet) {
    let frame = codec.encode(p);
    if let Err(e) = radio.send(&frame).await {
        warn!(kind = ?p.kind(), "send failed: {:#}", e);
    }
}
