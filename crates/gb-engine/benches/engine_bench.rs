use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gb_engine::{Frame, GrooveBox, GrooveBoxConfig, NullMidi, SampleBank};
use gb_ir::{InstrumentKind, Param, StepContext};

fn busy_box(rendered_voices: usize) -> GrooveBox {
    let config = GrooveBoxConfig { rendered_voices, ..Default::default() };
    let mut gb = GrooveBox::new(config, SampleBank::new(), NullMidi);
    let sample = gb.storage_mut().insert((0..44100).map(|i| ((i * 37) % 65536 - 32768) as i16).collect());
    for v in 0..rendered_voices {
        let (voice, pool) = gb.voice_mut(v);
        match v % 3 {
            0 => voice.set_kind(InstrumentKind::Macro { shape: 0xb8 }),
            1 => {
                voice.set_kind(InstrumentKind::Sample { sampler: 0x80 });
                voice.file = Some(sample);
            }
            _ => voice.set_kind(InstrumentKind::Drums),
        }
        voice.set_base_value(Param::Cutoff, StepContext::default(), 0x80);
        for step in 0..16 {
            voice.set_note(0, step, Some(step));
            voice.store_lock(Param::Volume, step, 0, step * 8, pool);
        }
    }
    gb.play();
    gb
}

fn bench_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render");
    for voices in [1, 6, 15] {
        let mut gb = busy_box(voices);
        let mut out = vec![Frame::silence(); 128];
        group.bench_function(format!("{}_voices_128", voices), |b| {
            b.iter(|| {
                gb.render(black_box(&mut out));
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_render);
criterion_main!(benches);
