use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use image::{DynamicImage, Rgb, RgbImage};
use jpegfit::processing::{search, ImageResizer, QualityRange};

/// Deterministic noise, the worst case for JPEG compression
fn noise(width: u32, height: u32) -> DynamicImage {
    let mut state: u32 = 0x1234_5678;
    let img = RgbImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgb([r, g, b])
    });
    DynamicImage::ImageRgb8(img)
}

fn benchmark_quality_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("quality_search");
    group.sample_size(10);

    let image = noise(256, 256);
    let range = QualityRange::default();
    let full = search(&image, u64::MAX, range).unwrap().size();

    // Generous budget stops at the first attempt, tight budget walks further down
    for (label, budget) in [("fits_at_max", full), ("half_budget", full / 2), ("unreachable", 1)] {
        group.bench_with_input(BenchmarkId::from_parameter(label), &budget, |b, &budget| {
            b.iter(|| search(black_box(&image), budget, range).unwrap());
        });
    }
    group.finish();
}

fn benchmark_fit(c: &mut Criterion) {
    let image = noise(1024, 768);
    let resizer = ImageResizer::new(512, jpegfit::processing::FilterType::Lanczos3);
    c.bench_function("fit_1024_to_512", |b| {
        b.iter(|| resizer.fit(black_box(image.clone())));
    });
}

criterion_group!(benches, benchmark_quality_search, benchmark_fit);
criterion_main!(benches);
