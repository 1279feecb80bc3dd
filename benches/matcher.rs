use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use formscope::formats::default_registry;
use formscope::{AnalyzerOptions, Input, MatchContext, Matcher};
use std::sync::Arc;

fn samples() -> Vec<(&'static str, Vec<u8>)> {
    let mut elf = vec![0u8; 64];
    elf[..4].copy_from_slice(b"\x7FELF");
    elf[4] = 2;
    elf[5] = 1;
    elf[6] = 1;
    elf[0x12] = 0x3E;

    let mut tar = vec![0u8; 1024];
    tar[..8].copy_from_slice(b"file.txt");
    tar[257..263].copy_from_slice(b"ustar\0");

    let text = "The quick brown fox jumps over the lazy dog.\n".repeat(64);

    // Deterministic noise that matches nothing.
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    let noise = (0..4096)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8 | 0x80
        })
        .collect();

    vec![
        ("elf", elf),
        ("tar_bad_checksum", tar),
        ("text", text.into_bytes()),
        ("noise", noise),
    ]
}

fn bench_try_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("matcher/try_match");
    let matcher = Matcher::new(Arc::new(default_registry()));
    let cx = MatchContext::new(Arc::new(AnalyzerOptions::new()));

    for (name, bytes) in samples() {
        group.throughput(Throughput::Bytes(bytes.len() as u64));
        let input = Input::from_vec(bytes);
        group.bench_with_input(BenchmarkId::from_parameter(name), &input, |b, input| {
            b.iter(|| {
                let object = matcher.try_match(black_box(input), &cx).ok().flatten();
                black_box(object.map(|o| o.name()))
            })
        });
    }

    group.finish();
}

fn bench_registry_build(c: &mut Criterion) {
    c.bench_function("matcher/registry_build", |b| {
        b.iter(|| black_box(Matcher::new(Arc::new(default_registry()))))
    });
}

criterion_group!(benches, bench_try_match, bench_registry_build);
criterion_main!(benches);
