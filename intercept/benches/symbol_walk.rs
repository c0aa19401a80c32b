use criterion::{black_box, criterion_group, criterion_main, Criterion};

use arthook_intercept::module;

fn libc_module_name() -> Option<String> {
    module::enumerate_modules()
        .into_iter()
        .map(|m| m.name)
        .find(|n| n.starts_with("libc.") || n.starts_with("libc-"))
}

fn bench_enumerate_modules(c: &mut Criterion) {
    c.bench_function("enumerate_modules", |b| {
        b.iter(|| black_box(module::enumerate_modules()).len())
    });
}

fn bench_find_export(c: &mut Criterion) {
    let Some(libc_name) = libc_module_name() else { return };
    c.bench_function("find_export_malloc", |b| {
        b.iter(|| module::find_export(black_box(&libc_name), black_box("malloc")))
    });
}

fn bench_find_symbol(c: &mut Criterion) {
    let Some(libc_name) = libc_module_name() else { return };
    c.bench_function("find_symbol_malloc", |b| {
        b.iter(|| module::find_symbol(black_box(&libc_name), black_box("malloc")))
    });
}

criterion_group!(benches, bench_enumerate_modules, bench_find_export, bench_find_symbol);
criterion_main!(benches);
