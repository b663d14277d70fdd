//! segalloc against the system allocator, mimalloc and jemalloc, all driven
//! through the `GlobalAlloc` interface.

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use segalloc::{AllocConfig, LockedSegAlloc, OwnedRegion, SegAlloc};
use std::alloc::{GlobalAlloc, Layout, System};
use std::hint::black_box;

const ARENA_BYTES: usize = 256 << 20;

fn allocators() -> Vec<(&'static str, Box<dyn GlobalAlloc>)> {
    let region = OwnedRegion::new(ARENA_BYTES).expect("bench arena");
    let mut all: Vec<(&'static str, Box<dyn GlobalAlloc>)> = vec![
        (
            "segalloc",
            Box::new(LockedSegAlloc::new(SegAlloc::new(region, AllocConfig::new()))),
        ),
        ("system", Box::new(System)),
        ("mimalloc", Box::new(mimalloc::MiMalloc)),
    ];
    #[cfg(not(target_env = "msvc"))]
    all.push(("jemalloc", Box::new(tikv_jemallocator::Jemalloc)));
    all
}

fn alloc_free(c: &mut Criterion) {
    let mut group = c.benchmark_group("alloc_free");
    for (name, alloc) in allocators() {
        for size in [16usize, 64, 448, 4096, 65536] {
            let layout = Layout::from_size_align(size, 8).unwrap();
            group.bench_with_input(BenchmarkId::new(name, size), &layout, |b, &layout| {
                b.iter(|| unsafe {
                    let p = alloc.alloc(layout);
                    black_box(p);
                    alloc.dealloc(p, layout);
                })
            });
        }
    }
    group.finish();
}

/// Allocate a batch of mixed sizes, then free every other block followed by
/// the rest, so free lists hold many fragments between rounds.
fn mixed_batch(c: &mut Criterion) {
    let layouts: Vec<Layout> = (0..1000)
        .map(|i| Layout::from_size_align(8 + (i * 97) % 2000, 8).unwrap())
        .collect();
    let mut group = c.benchmark_group("mixed_batch");
    for (name, alloc) in allocators() {
        group.bench_function(name, |b| {
            let mut ptrs = Vec::with_capacity(layouts.len());
            b.iter(|| unsafe {
                ptrs.extend(layouts.iter().map(|&layout| alloc.alloc(layout)));
                for (p, &layout) in ptrs.iter().zip(&layouts).step_by(2) {
                    alloc.dealloc(*p, layout);
                }
                for (p, &layout) in ptrs.iter().zip(&layouts).skip(1).step_by(2) {
                    alloc.dealloc(*p, layout);
                }
                ptrs.clear();
            })
        });
    }
    group.finish();
}

fn realloc_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("realloc_growth");
    for (name, alloc) in allocators() {
        group.bench_function(name, |b| {
            b.iter(|| unsafe {
                let mut layout = Layout::from_size_align(16, 8).unwrap();
                let mut p = alloc.alloc(layout);
                while layout.size() < 1 << 16 {
                    let new_size = layout.size() * 2;
                    p = alloc.realloc(p, layout, new_size);
                    layout = Layout::from_size_align(new_size, 8).unwrap();
                }
                alloc.dealloc(black_box(p), layout);
            })
        });
    }
    group.finish();
}

criterion_group!(benches, alloc_free, mixed_batch, realloc_growth);
criterion_main!(benches);
