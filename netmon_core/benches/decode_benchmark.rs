use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use netmon_core::{decode_frame, PacketRecord, Protocol, StatsAggregator};
use rand::Rng;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

// 生成随机 payload 的 IPv4 测试帧
fn generate_test_frame(size: usize, protocol: u8) -> BytesMut {
    let mut rng = rand::rng();
    let mut data = BytesMut::with_capacity(size);
    data.resize(size, 0);

    // 填充以太网头部 (14字节)
    data[0..6].fill(0xff); // 目标MAC
    rng.fill(&mut data[6..12]); // 源MAC
    data[12] = 0x08; // 类型 (IPv4)
    data[13] = 0x00;

    // 填充IP头部 (20字节)
    data[14] = 0x45; // 版本(4) + IHL(5)
    let total_length = ((size - 14) as u16).to_be_bytes();
    data[16..18].copy_from_slice(&total_length);
    data[22] = 0x40; // TTL
    data[23] = protocol;
    rng.fill(&mut data[26..30]); // 源IP
    rng.fill(&mut data[30..34]); // 目标IP

    // 端口和 payload
    rng.fill(&mut data[34..]);
    data
}

// 生成带选项的 IPv4 帧 (IHL=15，最长头部)
fn generate_frame_with_ip_options(size: usize) -> BytesMut {
    let mut data = generate_test_frame(size, 17);
    data[14] = 0x4f;
    data
}

fn generate_ipv6_frame(size: usize) -> BytesMut {
    let mut rng = rand::rng();
    let mut data = BytesMut::with_capacity(size);
    data.resize(size, 0);

    data[12] = 0x86; // 类型 (IPv6)
    data[13] = 0xdd;
    data[14] = 0x60; // 版本(6)
    data[20] = 0x06; // 下一个头部 (TCP)
    data[21] = 0x40; // 跳数限制
    rng.fill(&mut data[22..]);
    data
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_frame");
    group.measurement_time(Duration::from_secs(10));
    group.sample_size(100);

    let iface: Arc<str> = Arc::from("eth0");

    // 测试不同大小的帧
    let frame_sizes = [64, 128, 256, 512, 1024, 1500];
    for size in frame_sizes.iter() {
        let frame = generate_test_frame(*size, 6);
        group.bench_with_input(BenchmarkId::new("tcp", size), &frame, |b, f| {
            b.iter(|| black_box(decode_frame(f, f.len(), &iface)))
        });
    }

    let option_frame = generate_frame_with_ip_options(1500);
    group.bench_with_input(BenchmarkId::new("ip_options", "1500"), &option_frame, |b, f| {
        b.iter(|| black_box(decode_frame(f, f.len(), &iface)))
    });

    let ipv6_frame = generate_ipv6_frame(1500);
    group.bench_with_input(BenchmarkId::new("ipv6", "1500"), &ipv6_frame, |b, f| {
        b.iter(|| black_box(decode_frame(f, f.len(), &iface)))
    });

    // 截断帧走错误路径
    let truncated = generate_test_frame(1500, 6);
    group.bench_with_input(BenchmarkId::new("truncated", "38"), &truncated, |b, f| {
        b.iter(|| black_box(decode_frame(f, 38, &iface)))
    });

    group.finish();
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregate");
    group.measurement_time(Duration::from_secs(5));

    let mut rng = rand::rng();
    let iface: Arc<str> = Arc::from("eth0");

    // 连接数不同时的单条记录开销
    for connections in [16usize, 1024, 65536].iter() {
        let records: Vec<PacketRecord> = (0..*connections)
            .map(|i| PacketRecord {
                source_address: format!("10.{}.{}.{}", (i >> 16) & 0xff, (i >> 8) & 0xff, i & 0xff)
                    .parse()
                    .unwrap(),
                dest_address: "10.255.0.1".parse().unwrap(),
                source_port: rng.random_range(1024..65535),
                dest_port: 443,
                protocol: Protocol::Tcp,
                length: rng.random_range(60..1514),
                interface_name: Arc::clone(&iface),
            })
            .collect();

        let aggregator = StatsAggregator::new();
        for record in &records {
            aggregator.record(record);
        }

        group.bench_with_input(BenchmarkId::new("record", connections), &records, |b, records| {
            let mut next = 0;
            b.iter(|| {
                aggregator.record(black_box(&records[next % records.len()]));
                next += 1;
            })
        });

        group.bench_with_input(BenchmarkId::new("snapshot", connections), &aggregator, |b, a| {
            b.iter(|| black_box(a.snapshot()))
        });

        group.bench_with_input(BenchmarkId::new("snapshot_top10", connections), &aggregator, |b, a| {
            b.iter(|| black_box(a.snapshot_top(10)))
        });

        group.bench_with_input(BenchmarkId::new("snapshot_all", connections), &aggregator, |b, a| {
            b.iter(|| black_box(a.snapshot_all()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_aggregate);
criterion_main!(benches);
