//! Criterion benchmarks for unit-script processing
//!
//! Run with: cargo bench -p livefx-host
#![allow(missing_docs)]

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use livefx_host::{ContextOptions, Oscillator, RenderContext, script::compile_source};

const SAMPLE_RATE: f32 = 48000.0;

const SNIPPETS: &[(&str, &str)] = &[
    ("copy", "output[i] = input[i]"),
    ("gain", "output[i] = input[i] * parameters.gain"),
    ("tanh_drive", "output[i] = tanh(input[i] * parameters.gain * 4) * 0.5"),
];

fn module(name: &str, body: &str) -> String {
    format!(
        r#"unit Bench {{
            parameters [{{"name":"gain","defaultValue":1,"minValue":0,"maxValue":4,"automationRate":"k-rate"}}];
            state keepalive = true;
            on "disconnect" {{ keepalive = false; }}
            process {{
                for channel in channels {{
                    try {{ run(channel.input, channel.output, parameters); }}
                    catch fault {{ warn(fault); }}
                }}
                return keepalive;
            }}
            fn run(input, output, parameters) {{
                for i in 0..len(input) {{ {body} }}
            }}
        }}
        register "{name}" Bench;"#
    )
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("ScriptUnit");

    for &(name, body) in SNIPPETS {
        group.bench_with_input(BenchmarkId::new("render_quantum", name), &body, |b, body| {
            let (ctx, mut renderer) = RenderContext::new(ContextOptions {
                sample_rate: SAMPLE_RATE,
                channels: 2,
            });
            ctx.module_loader()
                .add_module_blocking(&module(name, body))
                .unwrap();
            let unit = ctx.create_unit(name).unwrap();
            let src = ctx
                .create_media_source(Box::new(Oscillator::new(440.0, 0.5, SAMPLE_RATE, 2)))
                .unwrap();
            let mut tx = ctx.transaction();
            tx.connect(src, unit.node()).unwrap();
            tx.connect(unit.node(), ctx.destination()).unwrap();
            tx.commit().unwrap();

            b.iter(|| {
                black_box(renderer.render_quantum().channel_count());
            });
        });
    }

    group.finish();
}

fn bench_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("ScriptCompile");
    let src = module("bench", SNIPPETS[2].1);
    group.bench_function("compile_source", |b| {
        b.iter(|| black_box(compile_source(black_box(&src)).is_ok()));
    });
    group.finish();
}

criterion_group!(benches, bench_render, bench_compile);
criterion_main!(benches);
