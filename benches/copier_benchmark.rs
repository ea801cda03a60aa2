/// Benchmarks for archive packing and staged copies
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use siva_indexer::siva::{pack_dir, unpack};
use siva_indexer::storage::{Copier, LocalBackend};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Helper to create a directory tree shaped like a bare repository
fn create_test_tree(dir: &TempDir, count: usize) -> anyhow::Result<()> {
    let objects = dir.path().join("objects");
    for i in 0..count {
        let bucket = objects.join(format!("{:02x}", i % 256));
        std::fs::create_dir_all(&bucket)?;
        let content = format!("object {}\n", i).repeat(64);
        std::fs::write(bucket.join(format!("{:038x}", i)), content)?;
    }

    std::fs::create_dir_all(dir.path().join("refs/heads"))?;
    std::fs::write(dir.path().join("HEAD"), "ref: refs/heads/master\n")?;
    Ok(())
}

fn benchmark_pack(c: &mut Criterion) {
    let mut group = c.benchmark_group("siva");

    for file_count in [10, 100, 1000].iter() {
        let tree = TempDir::new().unwrap();
        create_test_tree(&tree, *file_count).unwrap();

        group.bench_with_input(
            BenchmarkId::new("pack", format!("{}_files", file_count)),
            file_count,
            |b, _| {
                b.iter(|| {
                    let out = TempDir::new().unwrap();
                    pack_dir(black_box(tree.path()), &out.path().join("root.siva")).unwrap()
                });
            },
        );

        let archive_dir = TempDir::new().unwrap();
        let archive = archive_dir.path().join("root.siva");
        pack_dir(tree.path(), &archive).unwrap();

        group.bench_with_input(
            BenchmarkId::new("unpack", format!("{}_files", file_count)),
            file_count,
            |b, _| {
                b.iter(|| {
                    let out = TempDir::new().unwrap();
                    unpack(black_box(&archive), out.path()).unwrap()
                });
            },
        );
    }

    group.finish();
}

fn benchmark_copy_from_remote(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("copier");

    for size_kb in [64, 1024, 16 * 1024].iter() {
        let remote = TempDir::new().unwrap();
        std::fs::write(remote.path().join("root.siva"), vec![7u8; size_kb * 1024]).unwrap();

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_kb", size_kb)),
            size_kb,
            |b, _| {
                b.iter(|| {
                    rt.block_on(async {
                        let local = TempDir::new().unwrap();
                        let backend = Arc::new(LocalBackend::new(remote.path().to_string_lossy()));
                        let copier = Copier::new(local.path(), backend, 0);
                        copier
                            .copy_from_remote(
                                &CancellationToken::new(),
                                black_box("root.siva"),
                                "root.siva",
                            )
                            .await
                            .unwrap()
                    })
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, benchmark_pack, benchmark_copy_from_remote);
criterion_main!(benches);
