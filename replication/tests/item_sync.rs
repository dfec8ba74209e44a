use bitstream::{BitReader, BitWriter};
use facet::{
    AnimationClip, AnimationCommand, Attachment, BarKind, BlendSync, BoneRetarget, Entity,
    EntityId, LayeredAnimation, LinkKind, Locomotion, Priority, Quaternion, Stance,
    StatusDisplay, Transform, Vec2, Vec3,
};
use replication::items::{AnimationItem, PriorityItem, StatusItem};
use replication::{ItemKind, ReplicationConfig, ReplicationItem, Tick};

/// Runs one host prepare and, if anything changed, one encode/decode/apply.
/// Returns the number of bits written, or `None` when nothing changed.
fn sync(
    host: &mut dyn ReplicationItem,
    client: &mut dyn ReplicationItem,
    source: &Entity,
    mirror: &mut Entity,
    tick: u32,
) -> Option<usize> {
    let tick = Tick::new(tick);
    if !host.prepare_for_update(source, tick) {
        return None;
    }
    let mut writer = BitWriter::new();
    host.update_data(&mut writer, false).unwrap();
    let bits = writer.bits_written();
    let bytes = writer.finish();
    client.set_data(&mut BitReader::new(&bytes), tick).unwrap();
    assert_eq!(client.interpolate(mirror, tick), 1);
    Some(bits)
}

fn encode(item: &dyn ReplicationItem, force: bool) -> (Vec<u8>, usize) {
    let mut writer = BitWriter::new();
    item.update_data(&mut writer, force).unwrap();
    let bits = writer.bits_written();
    (writer.finish(), bits)
}

fn clip(asset: u32) -> AnimationClip {
    AnimationClip {
        asset,
        reverse: false,
        retarget: BoneRetarget::Skeleton,
    }
}

fn populated(id: u64) -> Entity {
    let mut entity = Entity::new(EntityId::new(id));
    entity.insert_facet(Priority::new(7));
    entity.insert_facet(Attachment {
        parent: Some(EntityId::new(99)),
        kind: LinkKind::Socket,
        offset: Vec3::new(0.0, 1.5, -0.25),
        rotation: Quaternion::rotation_y(0.5),
    });
    entity.insert_facet(LayeredAnimation {
        command: AnimationCommand::BlendMasked {
            from: clip(3),
            to: clip(4),
            sync: BlendSync::Phase,
            blend_time: 0.5,
            mask: vec!["spine".into(), "left_arm".into()],
        },
    });
    let mut status = StatusDisplay::default();
    status.set_icon(3, true);
    status.set_bar(BarKind::Health, 80);
    status.set_bar(BarKind::Shield, 15);
    entity.insert_facet(status);
    entity.insert_facet(Transform {
        position: Vec3::new(10.0, 0.0, -4.0),
        rotation: Quaternion::rotation_z(1.0),
        scale: 2.0,
    });
    entity.insert_facet(Locomotion {
        heading: Vec2::new(0.0, 1.0),
        speed: 3.5,
        stance: Stance::Run,
    });
    entity
}

fn all_items() -> Vec<Box<dyn ReplicationItem>> {
    let config = ReplicationConfig::for_testing();
    ItemKind::ALL
        .iter()
        .map(|kind| kind.create_item(&config))
        .collect()
}

#[test]
fn every_item_converges_after_mutation() {
    let mut source = populated(1);
    let mut mirror = Entity::new(source.id());
    let mut hosts = all_items();
    let mut clients = all_items();

    for (host, client) in hosts.iter_mut().zip(clients.iter_mut()) {
        assert!(sync(host.as_mut(), client.as_mut(), &source, &mut mirror, 1).is_some());
    }
    assert_eq!(mirror.facets(), source.facets());

    if let Some(priority) = source.facet_mut::<Priority>() {
        priority.set_level(2);
    }
    if let Some(attachment) = source.facet_mut::<Attachment>() {
        attachment.parent = None;
        attachment.kind = LinkKind::Tether;
    }
    if let Some(animation) = source.facet_mut::<LayeredAnimation>() {
        animation.command = AnimationCommand::PlaySingle {
            clip: clip(8),
            looping: true,
        };
    }
    if let Some(status) = source.facet_mut::<StatusDisplay>() {
        status.clear_bar(BarKind::Health);
        status.set_bar(BarKind::Mana, 33);
    }
    if let Some(transform) = source.facet_mut::<Transform>() {
        transform.position.y = 4.0;
    }
    if let Some(locomotion) = source.facet_mut::<Locomotion>() {
        locomotion.stance = Stance::Crouch;
        locomotion.speed = 1.0;
    }

    for (host, client) in hosts.iter_mut().zip(clients.iter_mut()) {
        assert!(sync(host.as_mut(), client.as_mut(), &source, &mut mirror, 2).is_some());
    }
    assert_eq!(mirror.facets(), source.facets());
}

#[test]
fn unchanged_entity_reports_no_changes() {
    let source = populated(1);
    let mut mirror = Entity::new(source.id());
    let mut hosts = all_items();
    let mut clients = all_items();
    for (host, client) in hosts.iter_mut().zip(clients.iter_mut()) {
        sync(host.as_mut(), client.as_mut(), &source, &mut mirror, 1);
    }

    for tick in 2..5 {
        for host in &mut hosts {
            assert!(
                !host.prepare_for_update(&source, Tick::new(tick)),
                "{} reported a change",
                host.kind()
            );
        }
    }
}

#[test]
fn removal_is_two_bits_and_readd_sends_everything() {
    let mut source = Entity::new(EntityId::new(5));
    source.insert_facet(Priority::new(9));
    let mut mirror = Entity::new(source.id());
    let mut host = PriorityItem::new(8);
    let mut client = PriorityItem::new(8);
    sync(&mut host, &mut client, &source, &mut mirror, 1);
    assert_eq!(mirror.facet::<Priority>(), Some(&Priority::new(9)));

    source.destroy_facet::<Priority>();
    assert!(host.prepare_for_update(&source, Tick::new(2)));
    let (bytes, bits) = encode(&host, false);
    assert_eq!(bits, 2);
    assert_eq!(bytes, vec![0b1000_0000]);
    assert_eq!(host.mirror().level(), 0);

    client.set_data(&mut BitReader::new(&bytes), Tick::new(2)).unwrap();
    assert!(!client.exists());
    assert_eq!(client.mirror().level(), 0);
    client.interpolate(&mut mirror, Tick::new(2));
    assert!(!mirror.has_facet::<Priority>());

    // Re-added at the default level: the level is still sent.
    source.insert_facet(Priority::default());
    let bits = sync(&mut host, &mut client, &source, &mut mirror, 3);
    assert_eq!(bits, Some(1 + 1 + 1 + 4));
    assert_eq!(mirror.facet::<Priority>(), Some(&Priority::default()));
}

#[test]
fn status_batches_changed_and_new_bars() {
    let mut source = Entity::new(EntityId::new(2));
    let mut status = StatusDisplay::default();
    status.set_bar(BarKind::Health, 50);
    status.set_bar(BarKind::Mana, 20);
    status.set_bar(BarKind::Progress, 5);
    source.insert_facet(status);
    let mut mirror = Entity::new(source.id());
    let mut host = StatusItem::new(8);
    let mut client = StatusItem::new(8);
    sync(&mut host, &mut client, &source, &mut mirror, 1);

    if let Some(status) = source.facet_mut::<StatusDisplay>() {
        status.set_bar(BarKind::Health, 40);
        status.set_bar(BarKind::Mana, 10);
        status.set_bar(BarKind::Stamina, 70);
    }
    let bits = sync(&mut host, &mut client, &source, &mut mirror, 2);
    // existence, icons, presence + mask, count, three records
    assert_eq!(bits, Some(1 + 1 + (1 + 5) + 3 + 3 * 11));
    assert_eq!(mirror.facets(), source.facets());
}

#[test]
fn animation_mode_switch_sends_every_field_of_new_mode() {
    let mut source = Entity::new(EntityId::new(3));
    source.insert_facet(LayeredAnimation::default());
    let mut mirror = Entity::new(source.id());
    let mut host = AnimationItem::new(8);
    let mut client = AnimationItem::new(8);
    sync(&mut host, &mut client, &source, &mut mirror, 1);

    if let Some(animation) = source.facet_mut::<LayeredAnimation>() {
        animation.command = AnimationCommand::BlendMasked {
            from: clip(1),
            to: clip(2),
            sync: BlendSync::Length,
            blend_time: 0.3,
            mask: vec!["head".into()],
        };
    }
    assert!(host.prepare_for_update(&source, Tick::new(2)));
    let (_, delta_bits) = encode(&host, false);
    let (_, forced_bits) = encode(&host, true);
    // Forced adds only the existence announcement: [1][1] instead of [0].
    assert_eq!(forced_bits, delta_bits + 1);

    let (bytes, _) = encode(&host, false);
    client.set_data(&mut BitReader::new(&bytes), Tick::new(2)).unwrap();
    client.interpolate(&mut mirror, Tick::new(2));
    assert_eq!(mirror.facets(), source.facets());

    if let Some(animation) = source.facet_mut::<LayeredAnimation>() {
        animation.command = AnimationCommand::StopAll;
    }
    let bits = sync(&mut host, &mut client, &source, &mut mirror, 3);
    // existence, then the mode field alone
    assert_eq!(bits, Some(1 + 1 + 3));
    assert_eq!(mirror.facets(), source.facets());
}

#[test]
fn blend_time_rounds_to_tenths() {
    let mut source = Entity::new(EntityId::new(4));
    source.insert_facet(LayeredAnimation {
        command: AnimationCommand::BlendSingle {
            from: clip(1),
            to: clip(2),
            sync: BlendSync::Free,
            blend_time: 0.26,
        },
    });
    let mut mirror = Entity::new(source.id());
    let mut host = AnimationItem::new(8);
    let mut client = AnimationItem::new(8);
    sync(&mut host, &mut client, &source, &mut mirror, 1);

    match &mirror.facet::<LayeredAnimation>().unwrap().command {
        AnimationCommand::BlendSingle { blend_time, .. } => {
            assert!((blend_time - 0.3).abs() < 1e-6);
        }
        other => panic!("unexpected command {}", other.name()),
    }
}

#[test]
fn priority_above_wire_range_round_trips() {
    let mut source = Entity::new(EntityId::new(6));
    source.insert_facet(Priority::new(200));
    let mut mirror = Entity::new(source.id());
    let mut host = PriorityItem::new(8);
    let mut client = PriorityItem::new(8);
    sync(&mut host, &mut client, &source, &mut mirror, 1);
    assert_eq!(mirror.facet::<Priority>(), source.facet::<Priority>());

    if let Some(priority) = source.facet_mut::<Priority>() {
        priority.set_level(u8::MAX);
    }
    assert_eq!(sync(&mut host, &mut client, &source, &mut mirror, 2), None);
    assert_eq!(mirror.facet::<Priority>(), source.facet::<Priority>());
}
