use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use facet::{
    AnimationClip, AnimationCommand, Attachment, BarKind, BlendSync, BoneRetarget, EntityId,
    LayeredAnimation, LinkKind, Locomotion, Priority, Quaternion, Stance, StatusDisplay,
    Transform, Vec2, Vec3, World, MAX_PRIORITY,
};
use repgraph::{ClientBudget, ClientView, GraphConfig, ReplicationGraph};
use replication::{ClientId, ClientReplicator, HostReplicator, ReplicationConfig, Tick};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// Half-width of the square the entities roam in.
const ARENA: f32 = 100.0;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Deterministic host to client replication simulation"
)]
struct Cli {
    /// Number of simulated entities.
    #[arg(long, default_value_t = 32)]
    entities: u32,
    /// Number of connected clients.
    #[arg(long, default_value_t = 2)]
    clients: u32,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Base transport latency in ticks.
    #[arg(long, default_value_t = 2)]
    latency: u32,
    /// Extra random latency in ticks, up to this many.
    #[arg(long, default_value_t = 2)]
    jitter: u32,
    /// How far the client playback clock runs behind the newest host tick.
    #[arg(long, default_value_t = 6)]
    interp_delay: u32,
    /// Client view radius.
    #[arg(long, default_value_t = 80.0)]
    radius: f32,
    /// Maximum entities entering a client's set per tick.
    #[arg(long)]
    enter_budget: Option<usize>,
    /// Drop every Nth packet to exercise resync.
    #[arg(long)]
    drop_every: Option<u32>,
    /// Replication config JSON file; defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write the summary JSON here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Fail if the average bytes per tick exceeds this value.
    #[arg(long)]
    max_avg_bytes: Option<u64>,
}

fn main() -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ReplicationConfig::default(),
    };

    let mut rng = Rng::new(cli.seed);
    let mut world = World::new();
    for raw in 1..=u64::from(cli.entities) {
        spawn_entity(&mut world, EntityId::new(raw), &mut rng);
    }

    let mut host = HostReplicator::new(config.clone());
    let mut graph = ReplicationGraph::new(GraphConfig::default_limits());
    let mut clients: BTreeMap<ClientId, SimClient> = BTreeMap::new();
    for raw in 0..cli.clients {
        let id = ClientId::new(raw);
        host.add_client(id);
        let mut view = ClientView::new(client_position(raw, cli.clients), cli.radius);
        if let Some(max_enters) = cli.enter_budget {
            view = view.with_budget(ClientBudget { max_enters });
        }
        graph.upsert_client(id, view);
        clients.insert(id, SimClient::new(config.clone()));
    }

    let mut summary = Summary::new(&cli);
    // Long enough for a resync round trip after the last dropped packet.
    let settle = 2 * (cli.latency + cli.jitter) + cli.interp_delay + 4;
    let last_tick = cli.ticks + settle;
    info!(
        entities = cli.entities,
        clients = cli.clients,
        ticks = cli.ticks,
        settle,
        "simulation started"
    );

    let mut sent = 0u32;
    for tick in 1..=last_tick {
        if tick <= cli.ticks {
            step_world(&mut world, &mut rng, tick);
        }
        graph.sync_world(&world);
        for &id in clients.keys() {
            let relevance = graph.build_client_relevance(id);
            if !relevance.is_unchanged() {
                debug!(
                    client = %id,
                    entered = relevance.entered.len(),
                    left = relevance.left.len(),
                    "relevance changed"
                );
            }
            host.set_relevant(id, relevance.relevant)
                .context("update relevance")?;
        }
        graph.clear_removed();

        let clock = Tick::new(tick);
        let mut tick_bytes = 0u64;
        for packet in host.build_tick(&world, clock).context("build tick")? {
            sent += 1;
            tick_bytes += packet.bytes.len() as u64;
            summary.push_packet(packet.bytes.len() as u64);
            let dropped = tick <= cli.ticks
                && cli.drop_every.is_some_and(|every| every > 0 && sent % every == 0);
            if dropped {
                summary.dropped += 1;
                continue;
            }
            let delay = cli.latency + rng.below(cli.jitter + 1);
            if let Some(client) = clients.get_mut(&packet.client) {
                client.transport.send(tick + delay, packet.bytes);
            }
        }
        summary.max_bytes_per_tick = summary.max_bytes_per_tick.max(tick_bytes);

        let playback = Tick::new(tick.saturating_sub(cli.interp_delay));
        for (&id, client) in &mut clients {
            if client.step(tick, playback, &mut summary)? {
                summary.resyncs += 1;
                host.request_resync(id).context("request resync")?;
            }
        }
    }

    for client in clients.values_mut() {
        client.flush(&mut summary)?;
    }
    summary.mismatches = verify(&world, &host, &clients)?;
    summary.finalize(last_tick);
    info!(
        packets = summary.packets,
        bytes = summary.bytes_total,
        resyncs = summary.resyncs,
        mismatches = summary.mismatches,
        "simulation finished"
    );

    write_summary(cli.out.as_deref(), &summary)?;
    summary.assert_budgets(cli.max_avg_bytes)?;
    if summary.mismatches > 0 {
        anyhow::bail!("{} entities did not converge", summary.mismatches);
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<ReplicationConfig> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_summary(out: Option<&Path>, summary: &Summary) -> Result<()> {
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    match out {
        Some(path) => {
            fs::write(path, contents).with_context(|| format!("write {}", path.display()))
        }
        None => {
            println!("{contents}");
            Ok(())
        }
    }
}

/// Compares every entity a client was sent against the host world.
fn verify(
    world: &World,
    host: &HostReplicator,
    clients: &BTreeMap<ClientId, SimClient>,
) -> Result<u64> {
    let mut mismatches = 0;
    for (&id, client) in clients {
        let known: BTreeSet<EntityId> = host
            .known_entities(id)
            .context("known entities")?
            .collect();
        for &entity in &known {
            let expected = world.get(entity).map(|e| e.facets());
            let actual = client.mirror.get(entity).map(|e| e.facets());
            if expected != actual {
                warn!(client = %id, %entity, ?expected, ?actual, "entity diverged");
                mismatches += 1;
            }
        }
        let extra = client
            .mirror
            .ids()
            .filter(|entity| !known.contains(entity))
            .count();
        if extra > 0 {
            warn!(client = %id, extra, "client kept entities it should have dropped");
            mismatches += extra as u64;
        }
    }
    Ok(mismatches)
}

/// One client: transport inbox, receiver, and its mirrored world.
struct SimClient {
    transport: Transport,
    receiver: ClientReplicator,
    mirror: World,
    last_received: Option<u32>,
    awaiting_resync: bool,
}

impl SimClient {
    fn new(config: ReplicationConfig) -> Self {
        Self {
            transport: Transport::default(),
            receiver: ClientReplicator::new(config),
            mirror: World::new(),
            last_received: None,
            awaiting_resync: false,
        }
    }

    /// Delivers due packets and plays back to `playback`. Returns whether the
    /// host should resend everything.
    fn step(&mut self, now: u32, playback: Tick, summary: &mut Summary) -> Result<bool> {
        let mut lost = false;
        while let Some(bytes) = self.transport.recv(now) {
            let report = self.receiver.receive(&bytes).context("receive packet")?;
            summary.item_failures += report.failures.len() as u64;
            let tick = report.tick.raw();
            if report.full_resync {
                self.awaiting_resync = false;
            }
            // Every tick produces a packet, so a gap means loss. A lost
            // resync packet is caught here too.
            if self.last_received.is_some_and(|last| tick > last + 1) {
                debug!(tick, "packet loss detected");
                lost = true;
            }
            self.last_received = Some(tick);
        }
        let report = self.receiver.interpolate(&mut self.mirror, playback);
        summary.applied += report.applied as u64;
        summary.spawned += report.spawned as u64;
        summary.despawned += report.despawned as u64;

        let resync = lost || (self.receiver.resync_requested() && !self.awaiting_resync);
        self.awaiting_resync |= resync;
        Ok(resync)
    }

    /// Plays back everything still buffered.
    fn flush(&mut self, summary: &mut Summary) -> Result<()> {
        let tick = self.last_received.unwrap_or(0);
        let report = self.receiver.interpolate(&mut self.mirror, Tick::new(tick));
        summary.applied += report.applied as u64;
        Ok(())
    }
}

/// In-order delivery with latency: a packet never overtakes an earlier one.
#[derive(Default)]
struct Transport {
    queue: VecDeque<(u32, Vec<u8>)>,
}

impl Transport {
    fn send(&mut self, deliver_at: u32, bytes: Vec<u8>) {
        let at = self
            .queue
            .back()
            .map_or(deliver_at, |(last, _)| deliver_at.max(*last));
        self.queue.push_back((at, bytes));
    }

    fn recv(&mut self, now: u32) -> Option<Vec<u8>> {
        if self.queue.front().is_some_and(|(at, _)| *at <= now) {
            self.queue.pop_front().map(|(_, bytes)| bytes)
        } else {
            None
        }
    }
}

fn client_position(index: u32, count: u32) -> Vec3<f32> {
    if count <= 1 {
        return Vec3::zero();
    }
    let angle = std::f32::consts::TAU * index as f32 / count as f32;
    Vec3::new(angle.cos() * ARENA * 0.5, 0.0, angle.sin() * ARENA * 0.5)
}

fn spawn_entity(world: &mut World, id: EntityId, rng: &mut Rng) {
    let entity = world.spawn(id);
    entity.insert_facet(Transform {
        position: Vec3::new(rng.range_f32(-ARENA, ARENA), 0.0, rng.range_f32(-ARENA, ARENA)),
        ..Transform::default()
    });
    entity.insert_facet(Priority::new(random_priority(rng)));
    entity.insert_facet(Locomotion {
        heading: Vec2::new(1.0, 0.0),
        speed: 1.0,
        stance: Stance::Walk,
    });
    let mut status = StatusDisplay::default();
    status.set_bar(BarKind::Health, 100);
    entity.insert_facet(status);
    if rng.chance(2) {
        entity.insert_facet(LayeredAnimation {
            command: random_command(rng),
        });
    }
}

fn step_world(world: &mut World, rng: &mut Rng, tick: u32) {
    let ids: Vec<EntityId> = world.ids().collect();
    for &id in &ids {
        if rng.chance(400) {
            debug!(entity = %id, tick, "despawn");
            world.despawn(id);
            continue;
        }
        let Some(entity) = world.get_mut(id) else {
            continue;
        };
        if let Some(locomotion) = entity.facet::<Locomotion>().copied() {
            if let Some(transform) = entity.facet_mut::<Transform>() {
                let step = locomotion.heading * locomotion.speed * 0.1;
                transform.position.x = (transform.position.x + step.x).clamp(-ARENA, ARENA);
                transform.position.z = (transform.position.z + step.y).clamp(-ARENA, ARENA);
            }
        }
        if rng.chance(10) {
            let locomotion = entity.get_or_create_facet::<Locomotion>();
            let angle = rng.range_f32(0.0, std::f32::consts::TAU);
            locomotion.heading = Vec2::new(angle.cos(), angle.sin());
            locomotion.speed = rng.range_f32(0.0, 8.0);
            locomotion.stance = match rng.below(4) {
                0 => Stance::Idle,
                1 => Stance::Walk,
                2 => Stance::Run,
                _ => Stance::Crouch,
            };
        }
        if rng.chance(20) {
            let status = entity.get_or_create_facet::<StatusDisplay>();
            let kind = BarKind::ALL[rng.below(5) as usize];
            if rng.chance(4) {
                status.clear_bar(kind);
            } else {
                status.set_bar(kind, rng.below(101) as u8);
            }
            status.set_icon(rng.below(64) as u8, rng.chance(2));
        }
        if rng.chance(30) {
            entity.get_or_create_facet::<LayeredAnimation>().command = random_command(rng);
        }
        if rng.chance(60) {
            entity
                .get_or_create_facet::<Priority>()
                .set_level(random_priority(rng));
        }
        if rng.chance(80) {
            if entity.destroy_facet::<Attachment>().is_none() {
                let parent = ids[rng.below(ids.len() as u32) as usize];
                entity.insert_facet(Attachment {
                    parent: (parent != id).then_some(parent),
                    kind: LinkKind::Socket,
                    offset: Vec3::new(0.0, rng.range_f32(0.0, 2.0), 0.0),
                    rotation: Quaternion::rotation_y(rng.range_f32(0.0, 3.0)),
                });
            }
        }
    }
    if rng.chance(100) {
        let id = EntityId::new(world.ids().last().map_or(1, |last| last.raw() + 1));
        debug!(entity = %id, tick, "spawn");
        spawn_entity(world, id, rng);
    }
}

fn random_priority(rng: &mut Rng) -> u8 {
    rng.below(u32::from(MAX_PRIORITY) + 1) as u8
}

fn random_command(rng: &mut Rng) -> AnimationCommand {
    let clip = |rng: &mut Rng| AnimationClip {
        asset: rng.below(32),
        reverse: rng.chance(8),
        retarget: if rng.chance(2) {
            BoneRetarget::Skeleton
        } else {
            BoneRetarget::None
        },
    };
    let mask = vec!["spine".to_owned(), "left_arm".to_owned()];
    match rng.below(5) {
        0 => AnimationCommand::StopAll,
        1 => AnimationCommand::PlaySingle {
            clip: clip(rng),
            looping: rng.chance(2),
        },
        2 => AnimationCommand::PlayMasked {
            clip: clip(rng),
            looping: true,
            mask,
        },
        3 => AnimationCommand::BlendSingle {
            from: clip(rng),
            to: clip(rng),
            sync: BlendSync::Phase,
            blend_time: rng.below(20) as f32 / 10.0,
        },
        _ => AnimationCommand::BlendMasked {
            from: clip(rng),
            to: clip(rng),
            sync: BlendSync::Length,
            blend_time: 0.5,
            mask,
        },
    }
}

struct Rng {
    state: u64,
}

impl Rng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(6364136223846793005).wrapping_add(1);
        (self.state >> 32) as u32
    }

    fn below(&mut self, bound: u32) -> u32 {
        self.next_u32() % bound.max(1)
    }

    /// True one time in `n` on average.
    fn chance(&mut self, n: u32) -> bool {
        self.below(n) == 0
    }

    fn range_f32(&mut self, min: f32, max: f32) -> f32 {
        let unit = self.next_u32() as f32 / u32::MAX as f32;
        min + (max - min) * unit
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    entities: u32,
    clients: u32,
    ticks: u32,
    seed: u64,
    latency: u32,
    jitter: u32,
    interp_delay: u32,
    packets: u64,
    bytes_total: u64,
    avg_bytes_per_tick: u64,
    max_bytes_per_tick: u64,
    max_packet_bytes: u64,
    dropped: u64,
    resyncs: u64,
    item_failures: u64,
    applied: u64,
    spawned: u64,
    despawned: u64,
    mismatches: u64,
}

impl Summary {
    fn new(cli: &Cli) -> Self {
        Self {
            entities: cli.entities,
            clients: cli.clients,
            ticks: cli.ticks,
            seed: cli.seed,
            latency: cli.latency,
            jitter: cli.jitter,
            interp_delay: cli.interp_delay,
            packets: 0,
            bytes_total: 0,
            avg_bytes_per_tick: 0,
            max_bytes_per_tick: 0,
            max_packet_bytes: 0,
            dropped: 0,
            resyncs: 0,
            item_failures: 0,
            applied: 0,
            spawned: 0,
            despawned: 0,
            mismatches: 0,
        }
    }

    fn push_packet(&mut self, bytes: u64) {
        self.packets += 1;
        self.bytes_total += bytes;
        self.max_packet_bytes = self.max_packet_bytes.max(bytes);
    }

    fn finalize(&mut self, ticks_run: u32) {
        if ticks_run > 0 {
            self.avg_bytes_per_tick = self.bytes_total / u64::from(ticks_run);
        }
    }

    fn assert_budgets(&self, max_avg: Option<u64>) -> Result<()> {
        if let Some(max_avg) = max_avg {
            if self.avg_bytes_per_tick > max_avg {
                anyhow::bail!(
                    "avg bytes per tick {} exceeds budget {}",
                    self.avg_bytes_per_tick,
                    max_avg
                );
            }
        }
        Ok(())
    }
}
