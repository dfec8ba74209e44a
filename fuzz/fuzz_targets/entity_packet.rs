#![no_main]

use facet::World;
use libfuzzer_sys::fuzz_target;
use replication::{ClientReplicator, ReplicationConfig, Tick};

fuzz_target!(|data: &[u8]| {
    let mut client = ClientReplicator::new(ReplicationConfig::for_testing());
    let mut world = World::new();
    let mut idx = 0usize;

    // Split the input into length-prefixed frames and feed each as a packet.
    while idx < data.len() && idx < 4096 {
        let len = (data[idx] as usize % 240).saturating_add(1);
        idx += 1;
        let end = (idx + len).min(data.len());
        let frame = &data[idx..end];
        idx = end;

        if let Ok(report) = client.receive(frame) {
            client.interpolate(&mut world, report.tick);
        }
    }

    // Whatever was buffered must apply without panicking.
    client.interpolate(&mut world, Tick::new(u32::MAX));
    let _ = client.resync_requested();
});
