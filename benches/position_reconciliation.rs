use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use syncplay_server::protocol::ConnectionId;
use syncplay_server::room::{Room, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn make_room(watcher_count: usize) -> Room {
    let mut room = Room::new("bench-room".to_string(), 0.0);
    for i in 0..watcher_count {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut watcher = Watcher::new(
            ConnectionId::next(),
            format!("watcher-{i}"),
            "1.6.5".to_string(),
            Default::default(),
            tx,
            CancellationToken::new(),
            0.0,
        );
        watcher.position = Some(i as f64 * 10.0);
        room.insert_watcher(watcher);
    }
    room
}

fn bench_get_position(c: &mut Criterion) {
    c.bench_function("room_get_position_50_watchers", |b| {
        let mut room = make_room(50);
        let mut t = 0.0;
        b.iter(|| {
            t += 1.1;
            black_box(room.get_position(t));
        });
    });
}

fn bench_pump_state(c: &mut Criterion) {
    c.bench_function("room_pump_state_50_watchers", |b| {
        let mut room = make_room(50);
        let mut t = 0.0;
        b.iter(|| {
            t += 1.0;
            room.pump_state(t);
        });
    });
}

fn bench_update_state(c: &mut Criterion) {
    c.bench_function("room_update_state_seek", |b| {
        let mut room = make_room(50);
        let ids: Vec<ConnectionId> = room.watchers.keys().copied().collect();
        let mut t = 0.0;
        b.iter(|| {
            t += 1.0;
            room.update_state(ids[0], t * 3.0, false, true, 0.0, t);
        });
    });
}

criterion_group!(position_reconciliation, bench_get_position, bench_pump_state, bench_update_state);
criterion_main!(position_reconciliation);
