use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use stream_uploader::cloud::queue::PacketQueue;
use stream_uploader::models::Packet;

fn bench_push_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_queue");

    for packet_size in [4 * 1024, 64 * 1024, 1024 * 1024] {
        let packet = Packet::from(vec![0xABu8; packet_size]);
        let packets = 64;
        group.throughput(Throughput::Bytes((packet_size * packets) as u64));

        group.bench_with_input(BenchmarkId::new("push_drain", packet_size), &packet, |b, packet| {
            let queue = PacketQueue::new(usize::MAX);
            let mut buffer = Vec::with_capacity(packet_size * packets);
            b.iter(|| {
                for _ in 0..packets {
                    queue.push(packet.clone());
                }
                buffer.clear();
                black_box(queue.drain_into(&mut buffer));
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_push_drain);
criterion_main!(benches);
