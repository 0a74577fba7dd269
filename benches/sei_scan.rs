//! Benchmarks for embedded caption extraction
//!
//! Measures the SEI scan alone and the full fragment path (box fields,
//! NAL walk, GA94 decode, field ordering and decoder delivery).

use captionforge::extract::EventLog;
use captionforge_captions::cea608::CcDataWriter;
use captionforge_captions::sei::{length_prefixed_nal, SeiWriter};
use captionforge_captions::{CaptionChannel, EmbeddedCaptionExtractor, Field, SeiScanner};
use captionforge_media::fmp4::{FragmentWriter, InitSegmentWriter, SampleSpec};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

/// A 30 kB IDR slice preceded by an SEI with two caption pairs per field
fn video_sample(frame: u8) -> Vec<u8> {
    let cc_data = CcDataWriter::new()
        .pair(Field::One, [0x94, frame | 0x80])
        .pair(Field::One, [0xC1, 0xC2])
        .pair(Field::Two, [0x15, 0x2C])
        .pair(Field::Two, [0x80, 0xC1])
        .build();
    let mut sample = length_prefixed_nal(0x09, &[0xF0]);
    sample.extend(SeiWriter::new().payload(4, cc_data).build());
    sample.extend(length_prefixed_nal(0x65, &vec![0x5A; 30_000]));
    sample
}

fn fragment(sequence_number: u32, samples: usize) -> Vec<u8> {
    FragmentWriter::new(sequence_number)
        .base_media_decode_time(sequence_number as u64 * samples as u64 * 3003)
        .samples((0..samples).map(|i| SampleSpec::new(video_sample(i as u8), 3003)))
        .build()
}

fn bench_sei_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("sei_scan");

    let sample = video_sample(0);
    group.throughput(Throughput::Bytes(sample.len() as u64));
    group.bench_function("single_sample", |b| {
        b.iter(|| SeiScanner::new(black_box(&sample)).count());
    });

    group.finish();
}

fn bench_fragment_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("fragment_extraction");
    let init = InitSegmentWriter::new(90_000).build();

    for samples in [30usize, 120] {
        let data = fragment(1, samples);
        group.throughput(Throughput::Bytes(data.len() as u64));
        group.bench_with_input(BenchmarkId::new("samples", samples), &data, |b, data| {
            b.iter(|| {
                let mut extractor = EmbeddedCaptionExtractor::new();
                extractor.attach(CaptionChannel::Cc1, EventLog::new(CaptionChannel::Cc1));
                extractor.attach(CaptionChannel::Cc3, EventLog::new(CaptionChannel::Cc3));
                extractor.on_init_segment(&init).unwrap();
                extractor.on_media_segment(black_box(data)).unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sei_scan, bench_fragment_extraction);
criterion_main!(benches);
