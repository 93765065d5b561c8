use criterion::{criterion_group, criterion_main, Criterion};
use netmon_core::capture::scripted::{DeviceScript, ScriptedSource};
use netmon_core::{
    CaptureConfig, CaptureOrchestrator, PacketRecord, Protocol, StatsAggregator, StatsConfig,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const THREADS: usize = 8;
const RECORDS_PER_THREAD: usize = 10_000;
const FRAMES_PER_INTERFACE: u16 = 2_000;

fn create_udp_frame(src_port: u16) -> Vec<u8> {
    let mut data = vec![0u8; 128];
    data[12] = 0x08; // 类型 (IPv4)
    data[14] = 0x45; // 版本(4) + IHL(5)
    data[22] = 0x40; // TTL
    data[23] = 17; // 协议 (UDP)
    data[26..30].copy_from_slice(&[10, 0, 0, 1]);
    data[30..34].copy_from_slice(&[10, 0, 0, 2]);
    data[34..36].copy_from_slice(&src_port.to_be_bytes());
    data[36..38].copy_from_slice(&53u16.to_be_bytes());
    data
}

// 多个线程同时写入同一个聚合器
fn concurrent_record(aggregator: &Arc<StatsAggregator>) {
    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let aggregator = Arc::clone(aggregator);
            thread::spawn(move || {
                let iface: Arc<str> = Arc::from(format!("eth{}", t));
                for i in 0..RECORDS_PER_THREAD {
                    aggregator.record(&PacketRecord {
                        source_address: "10.0.0.1".parse().unwrap(),
                        dest_address: "10.0.0.2".parse().unwrap(),
                        source_port: (i % 512) as u16,
                        dest_port: 80,
                        protocol: if i % 3 == 0 { Protocol::Udp } else { Protocol::Tcp },
                        length: 64 + (i % 1400) as u32,
                        interface_name: Arc::clone(&iface),
                    });
                }
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}

// 完整流水线：每个接口一个会话线程，解码后写入聚合器
fn run_pipeline(interfaces: usize) -> u64 {
    let mut source = ScriptedSource::new();
    let names: Vec<String> = (0..interfaces).map(|i| format!("eth{}", i)).collect();
    for name in &names {
        source = source.with_device(
            name,
            DeviceScript::new()
                .frames((0..FRAMES_PER_INTERFACE).map(create_udp_frame))
                .then_fail("end of capture"),
        );
    }

    let aggregator = Arc::new(StatsAggregator::with_config(&StatsConfig::default(), true));
    let config = CaptureConfig { timeout_ms: 10, ..CaptureConfig::default() };
    let mut orchestrator = CaptureOrchestrator::new(Arc::new(source), config);
    orchestrator.start(&names, aggregator.clone()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while !orchestrator.all_finished() {
        if Instant::now() > deadline {
            panic!("流水线基准测试超时，可能存在死锁问题");
        }
        thread::yield_now();
    }
    orchestrator.stop();

    let total = aggregator.snapshot().total_packets;
    assert_eq!(total, interfaces as u64 * FRAMES_PER_INTERFACE as u64);
    total
}

fn benchmark_concurrent_processing(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_processing");
    group.measurement_time(Duration::from_secs(2));
    group.sample_size(10);
    group.warm_up_time(Duration::from_millis(200));

    group.bench_function("concurrent_record", |b| {
        b.iter_with_setup(
            || Arc::new(StatsAggregator::new()),
            |aggregator| {
                concurrent_record(&aggregator);
                assert_eq!(
                    aggregator.snapshot().total_packets,
                    (THREADS * RECORDS_PER_THREAD) as u64
                );
            },
        );
    });

    group.bench_function("concurrent_record_bounded", |b| {
        let config = StatsConfig { max_connections: Some(128) };
        b.iter_with_setup(
            || Arc::new(StatsAggregator::with_config(&config, true)),
            |aggregator| concurrent_record(&aggregator),
        );
    });

    for interfaces in [1usize, 4] {
        group.bench_function(format!("pipeline_{}_interfaces", interfaces), |b| {
            b.iter(|| run_pipeline(interfaces));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_concurrent_processing);
criterion_main!(benches);
