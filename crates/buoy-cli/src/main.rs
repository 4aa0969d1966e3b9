mod sim;

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tokio::task::LocalSet;
use tracing::{info, warn};

use buoy_nav::doctor as nav_doctor;
use buoy_nav::geo::{haversine_m, offset_m};
use buoy_nav::gnss::{GnssSource, NmeaParser, Position};
use buoy_nav::wind::{PulseCounter, WindSpeedMeter};
use buoy_proto::{ChecksumScheme, Identifier, Packet, PacketCodec};
use buoy_station::coordinator::{Coordinator, CoordinatorConfig};
use buoy_station::keeper::StationKeeper;
use buoy_station::node::{BuoyNode, CoordinatorNode};
use buoy_station::radio::{MemoryChannel, Radio, UdpRadio};
use buoy_station::StationConfig;

use sim::SimHull;

#[derive(Debug, Parser)]
#[command(name = "buoyctl", version, about = "Autonomous race-mark buoys: coordinator, marks and tools")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the configuration.
    Doctor,
    /// Run this node as a course mark.
    Buoy,
    /// Run this node as the coordinator.
    Coordinator,
    /// Send a remote-control command onto the channel.
    Rc { #[command(subcommand)] cmd: RcCmd },
    /// Decode one hex-encoded frame and print it.
    Decode { hex: String },
    /// Run the coordinator and every course mark in-process on simulated hulls.
    Sim {
        #[arg(long, default_value_t = 60)]
        secs: u64,
    },
}

#[derive(Debug, Subcommand)]
enum RcCmd { Start, Stop }

#[derive(Debug, serde::Deserialize)]
struct Config {
    node: NodeCfg,
    #[serde(default)]
    protocol: ProtocolCfg,
    radio: RadioCfg,
    #[serde(default)]
    station: StationConfig,
    #[serde(default)]
    coordinator: CoordinatorConfig,
    #[serde(default)]
    gnss: GnssCfg,
}

#[derive(Debug, serde::Deserialize)]
struct NodeCfg { id: Identifier }

#[derive(Debug, Default, serde::Deserialize)]
struct ProtocolCfg {
    #[serde(default)]
    checksum: ChecksumScheme,
}

#[derive(Debug, serde::Deserialize)]
struct RadioCfg {
    bind: SocketAddr,
    /// Every node address on the channel; our own is skipped.
    channel: Vec<SocketAddr>,
}

#[derive(Debug, serde::Deserialize)]
struct GnssCfg {
    /// "sim", "nmea-serial" or "nmea-file".
    #[serde(default = "default_gnss_source")]
    source: String,
    nmea_device: Option<String>,
    baud: Option<u32>,
    nmea_file: Option<String>,
}

fn default_gnss_source() -> String { "sim".into() }

impl Default for GnssCfg {
    fn default() -> Self {
        Self { source: default_gnss_source(), nmea_device: None, baud: None, nmea_file: None }
    }
}

/// Marks further apart than this are almost certainly a typo.
const MAX_COURSE_SPREAD_M: f64 = 10_000.0;

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Buoy => buoy(&cfg).await?,
        Command::Coordinator => coordinator(&cfg).await?,
        Command::Rc { cmd } => rc(&cfg, cmd).await?,
        Command::Decode { hex } => decode(&cfg, &hex)?,
        Command::Sim { secs } => simulate(&cfg, Duration::from_secs(secs)).await?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    let st = &cfg.station;
    nav_doctor::check_fix_requirement(st.min_fix_mode)?;
    nav_doctor::check_wind(st.wind_window(), st.wind_threshold_deg)?;
    nav_doctor::check_avoidance(&st.avoidance)?;
    anyhow::ensure!(st.default_hold_radius_m > 0, "station.default_hold_radius_m must be > 0");
    anyhow::ensure!(st.dwell_s > 0, "station.dwell_s must be > 0");
    anyhow::ensure!(st.comms_timeout_s > st.dwell_s, "station.comms_timeout_s should exceed dwell_s");
    anyhow::ensure!(st.status_interval_ms >= 1000, "station.status_interval_ms below 1s floods the channel");

    anyhow::ensure!(!cfg.radio.channel.is_empty(), "radio.channel is empty");

    match cfg.node.id {
        Identifier::Coordinator => {
            let co = &cfg.coordinator;
            nav_doctor::check_course(&co.course, MAX_COURSE_SPREAD_M)?;
            anyhow::ensure!(co.ping_interval_ms > 0, "coordinator.ping_interval_ms must be > 0");
            anyhow::ensure!(
                co.ping_interval_ms * 2 < st.comms_timeout_s * 1000,
                "coordinator pings too slowly for station.comms_timeout_s"
            );
        }
        id if id.is_mark() => match cfg.gnss.source.as_str() {
            "sim" => info!("doctor: gnss simulated"),
            "nmea-serial" => anyhow::ensure!(
                cfg.gnss.nmea_device.as_ref().is_some_and(|d| !d.is_empty()),
                "gnss.nmea_device missing"
            ),
            "nmea-file" => anyhow::ensure!(cfg.gnss.nmea_file.is_some(), "gnss.nmea_file missing"),
            other => anyhow::bail!("unknown gnss.source: {}", other),
        },
        _ => {}
    }

    info!(id = %cfg.node.id, scheme = ?cfg.protocol.checksum, "doctor: OK");
    Ok(())
}

async fn buoy(cfg: &Config) -> Result<()> {
    let id = cfg.node.id;
    anyhow::ensure!(id.is_mark(), "node.id {} is not a mark", id);

    let radio = UdpRadio::bind(cfg.radio.bind, &cfg.radio.channel).await?;
    let start = cfg
        .coordinator
        .course
        .mark(id)
        .map(|m| offset_m(m.target(), 40.0, -25.0))
        .unwrap_or_default();
    let mut hull = SimHull::new(start, id.ordinal() as u64);

    match cfg.gnss.source.as_str() {
        "sim" => {}
        "nmea-serial" => {
            let dev = cfg.gnss.nmea_device.as_ref().context("gnss.nmea_device missing")?;
            let src = GnssSource::serial(dev, cfg.gnss.baud.unwrap_or(9600))?;
            hull = hull.with_gnss(spawn_gnss(src));
        }
        "nmea-file" => {
            let src = GnssSource::file(cfg.gnss.nmea_file.as_ref().context("gnss.nmea_file missing")?)?;
            hull = hull.with_gnss(spawn_gnss(src));
        }
        other => anyhow::bail!("unknown gnss.source: {}", other),
    }

    let counter = PulseCounter::new();
    sim::spawn_anemometer(counter.clone(), id.ordinal() as u64);

    let keeper = StationKeeper::new(id, cfg.station.clone(), tokio::time::Instant::now().into_std());
    let mut node = BuoyNode::new(keeper, PacketCodec::new(cfg.protocol.checksum), radio, hull)
        .with_anemometer(WindSpeedMeter::new(counter, 0));

    let finished = tokio::select! {
        res = node.run() => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };
    if let Some(res) = finished {
        return res;
    }
    info!(id = %id, state = ?node.keeper().state(), "shutting down");
    Ok(())
}

fn spawn_gnss(mut src: GnssSource) -> watch::Receiver<Option<Position>> {
    let (tx, rx) = watch::channel(None);
    tokio::spawn(async move {
        let mut parser = NmeaParser::new();
        loop {
            match src.next_fix(&mut parser).await {
                Ok(fix) => {
                    if tx.send(Some(fix)).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("gnss: {:#}", e);
                    let _ = tx.send(None);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });
    rx
}

async fn coordinator(cfg: &Config) -> Result<()> {
    anyhow::ensure!(cfg.node.id == Identifier::Coordinator, "node.id must be coordinator");
    nav_doctor::check_course(&cfg.coordinator.course, MAX_COURSE_SPREAD_M)?;

    let radio = UdpRadio::bind(cfg.radio.bind, &cfg.radio.channel).await?;
    let coordinator = Coordinator::new(cfg.coordinator.clone(), tokio::time::Instant::now().into_std());
    let mut node = CoordinatorNode::new(coordinator, PacketCodec::new(cfg.protocol.checksum), radio);

    let finished = tokio::select! {
        res = node.run() => Some(res),
        _ = tokio::signal::ctrl_c() => None,
    };
    if let Some(res) = finished {
        return res;
    }
    let now = tokio::time::Instant::now().into_std();
    info!(alive = ?node.coordinator().alive(now), "shutting down");
    Ok(())
}

async fn rc(cfg: &Config, cmd: RcCmd) -> Result<()> {
    anyhow::ensure!(cfg.node.id == Identifier::RemoteControl, "node.id must be remote_control");
    let sender = Identifier::RemoteControl;
    let packet = match cmd {
        RcCmd::Start => Packet::RcStart { sender },
        RcCmd::Stop => Packet::RcStop { sender },
    };
    let mut radio = UdpRadio::bind(cfg.radio.bind, &cfg.radio.channel).await?;
    let frame = PacketCodec::new(cfg.protocol.checksum).encode(&packet);
    radio.send(&frame).await?;
    info!(kind = ?packet.kind(), "rc: sent");
    Ok(())
}

fn decode(cfg: &Config, s: &str) -> Result<()> {
    let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ':').collect();
    let frame = hex::decode(&cleaned).context("frame is not valid hex")?;
    let codec = PacketCodec::new(cfg.protocol.checksum);
    let packet = codec
        .decode(&frame)
        .with_context(|| format!("{} byte frame rejected ({:?})", frame.len(), codec.scheme()))?;
    println!("{:#?}", packet);
    Ok(())
}

async fn simulate(cfg: &Config, run_for: Duration) -> Result<()> {
    nav_doctor::check_course(&cfg.coordinator.course, MAX_COURSE_SPREAD_M)?;
    let scheme = cfg.protocol.checksum;
    let channel = MemoryChannel::new();
    let deadline = tokio::time::Instant::now() + run_for;
    let local = LocalSet::new();

    let co_cfg = CoordinatorConfig { autostart: true, ..cfg.coordinator.clone() };
    let marks = co_cfg.course.marks.clone();
    let coordinator = Coordinator::new(co_cfg, tokio::time::Instant::now().into_std());
    let mut co_node = CoordinatorNode::new(coordinator, PacketCodec::new(scheme), channel.join());
    let co_task = local.spawn_local(async move {
        let mut next = tokio::time::Instant::now();
        while tokio::time::Instant::now() < deadline {
            co_node.step(&mut next).await?;
        }
        Ok::<_, anyhow::Error>(co_node)
    });

    let mut mark_tasks = Vec::new();
    for (i, mark) in marks.iter().enumerate() {
        let hull = SimHull::new(offset_m(mark.target(), 30.0 + 10.0 * i as f64, -20.0), i as u64);
        let keeper = StationKeeper::new(mark.id, cfg.station.clone(), tokio::time::Instant::now().into_std());
        let mut node = BuoyNode::new(keeper, PacketCodec::new(scheme), channel.join(), hull);
        let target = mark.target();
        mark_tasks.push(local.spawn_local(async move {
            let mut next = tokio::time::Instant::now();
            while tokio::time::Instant::now() < deadline {
                node.step(&mut next).await?;
            }
            Ok::<_, anyhow::Error>((node.keeper().id(), node.keeper().state(), haversine_m(node.hull().position(), target)))
        }));
    }

    local
        .run_until(async move {
            let co_node = co_task.await.context("coordinator task")??;
            for t in mark_tasks {
                let (id, state, dist) = t.await.context("mark task")??;
                let peer = co_node.coordinator().peer(id);
                println!(
                    "{:<16} {:<9} {:>7.1} m  acked={}",
                    id.to_string(),
                    format!("{:?}", state),
                    dist,
                    peer.is_some_and(|p| p.acked),
                );
            }
            Ok::<_, anyhow::Error>(())
        })
        .await
}
