use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use chubaca_image::{Image, ImageSize};
use chubaca_imgproc::{
    canny::canny,
    contours::{find_contours, RetrievalMode},
};

fn disk_mask(width: usize, height: usize) -> Image<u8, 1> {
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let radius = cx.min(cy) * 0.8;
    let data = (0..width * height)
        .map(|i| {
            let (x, y) = ((i % width) as f64, (i / width) as f64);
            if (x - cx).hypot(y - cy) < radius {
                255
            } else {
                0
            }
        })
        .collect();
    Image::new(ImageSize { width, height }, data).unwrap()
}

fn bench_canny(c: &mut Criterion) {
    let mut group = c.benchmark_group("Canny");

    for (width, height) in [(640, 480), (1920, 1080)].iter() {
        group.throughput(criterion::Throughput::Elements((*width * *height) as u64));
        let parameter_string = format!("{}x{}", width, height);
        let mask = disk_mask(*width, *height);

        group.bench_with_input(
            BenchmarkId::new("canny", &parameter_string),
            &mask,
            |b, mask| b.iter(|| black_box(canny(mask, 30.0, 200.0))),
        );

        let edges = canny(&mask, 30.0, 200.0).unwrap();
        group.bench_with_input(
            BenchmarkId::new("find_contours_external", &parameter_string),
            &edges,
            |b, edges| b.iter(|| black_box(find_contours(edges, RetrievalMode::External))),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_canny);
criterion_main!(benches);
