use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use facet::{BarKind, EntityId, Priority, StatusDisplay, Transform, Vec3, World};
use replication::{ClientId, ClientReplicator, HostReplicator, ReplicationConfig, Tick};

const ENTITIES: u64 = 256;

fn world() -> World {
    let mut world = World::new();
    for raw in 0..ENTITIES {
        let entity = world.spawn(EntityId::new(raw));
        entity.insert_facet(Priority::new(3));
        entity.insert_facet(Transform::default());
        let mut status = StatusDisplay::default();
        status.set_bar(BarKind::Health, 100);
        entity.insert_facet(status);
    }
    world
}

/// Moves every fourth entity, as a mostly idle world would.
fn churn(world: &mut World, tick: u32) {
    for entity in world.iter_mut() {
        if (entity.id().raw() + u64::from(tick)) % 4 == 0 {
            if let Some(transform) = entity.facet_mut::<Transform>() {
                transform.position += Vec3::new(0.1, 0.0, 0.0);
            }
        }
    }
}

fn host_with_clients(world: &World, clients: u32) -> HostReplicator {
    let mut host = HostReplicator::new(ReplicationConfig::default());
    for raw in 0..clients {
        let client = ClientId::new(raw);
        host.add_client(client);
        host.set_relevant(client, world.ids()).unwrap();
    }
    host
}

fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("replication");

    for clients in [1, 8] {
        group.bench_function(format!("build_tick {ENTITIES} entities {clients} clients"), |b| {
            let mut world = world();
            let mut host = host_with_clients(&world, clients);
            host.build_tick(&world, Tick::new(1)).unwrap();
            let mut tick = 1;
            b.iter(|| {
                tick += 1;
                churn(&mut world, tick);
                black_box(host.build_tick(&world, Tick::new(tick)).unwrap())
            });
        });
    }

    group.bench_function(format!("receive+interpolate {ENTITIES} entities"), |b| {
        let mut world = world();
        let mut host = host_with_clients(&world, 1);
        let mut client = ClientReplicator::new(ReplicationConfig::default());
        let mut mirror = World::new();
        let mut tick = 0;
        b.iter(|| {
            tick += 1;
            churn(&mut world, tick);
            for packet in host.build_tick(&world, Tick::new(tick)).unwrap() {
                client.receive(black_box(&packet.bytes)).unwrap();
            }
            black_box(client.interpolate(&mut mirror, Tick::new(tick)))
        });
    });

    group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
