use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use tierstore::hierarchy::GB;
use tierstore::{
    BlockSettings, CacheEngine, DeviceSpec, EngineConfig, HierarchyDescriptor, HybridCache,
    TierLayout,
};

fn open(ram_bytes: usize) -> (HybridCache, u8) {
    let mut cache = HybridCache::open(EngineConfig {
        cache_name: "bench".to_string(),
        ram_bytes,
        hierarchy: HierarchyDescriptor {
            layout: TierLayout::Striping,
            fast: DeviceSpec {
                path: "fast_0".to_string(),
                capacity: GB,
            },
            capacity: DeviceSpec {
                path: "cap_0".to_string(),
                capacity: GB,
            },
            reader_threads: 4,
            writer_threads: 2,
            big_hash: None,
            block: BlockSettings::default(),
        },
    })
    .unwrap();
    let pool = cache.add_pool("default", ram_bytes).unwrap();
    (cache, pool)
}

fn put(cache: &HybridCache, pool: u8, key: &[u8], value: &[u8]) {
    let mut handle = cache.allocate(pool, key, value.len()).unwrap().unwrap();
    handle.writable_memory().copy_from_slice(value);
    cache.insert_or_replace(handle).unwrap();
}

fn bench_ram_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("find_1kb_ram", |b| {
        let (cache, pool) = open(16 * 1024 * 1024);
        let data = vec![b'x'; 1024];
        let keys: Vec<Vec<u8>> = (0..100).map(|i| format!("user{:012}", i).into_bytes()).collect();
        for key in &keys {
            put(&cache, pool, key, &data);
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(cache.find(pool, &keys[counter % 100]).unwrap());
            counter += 1;
        });
    });

    group.bench_function("find_1kb_nvm", |b| {
        // RAM holds ~10 items so most finds go to NVM
        let (cache, pool) = open(11 * 1024);
        let data = vec![b'x'; 1024];
        let keys: Vec<Vec<u8>> = (0..100).map(|i| format!("user{:012}", i).into_bytes()).collect();
        for key in &keys {
            put(&cache, pool, key, &data);
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(cache.find(pool, &keys[counter % 100]).unwrap());
            counter += 1;
        });
    });

    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("insert_or_replace_1kb", |b| {
        let (cache, pool) = open(16 * 1024 * 1024);
        let data = vec![b'x'; 1024];

        let mut counter = 0u64;
        b.iter(|| {
            let key = format!("user{:012}", counter % 1000);
            put(&cache, pool, key.as_bytes(), &data);
            counter += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_ram_hit, bench_insert);
criterion_main!(benches);
