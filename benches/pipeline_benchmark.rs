use std::io::Cursor;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imagelens::{
    normalize, CanonicalImage, Classifier, ClassifierError, ContentTable, ImageModel, ModelOutput,
    Preprocessing, ResizeMode,
};

/// A model with a fixed output over a large vocabulary, so ranking dominates.
struct Fixed {
    labels: Vec<String>,
    probabilities: Vec<f32>,
}

impl ImageModel for Fixed {
    fn labels(&self) -> &[String] {
        &self.labels
    }

    fn predict(&self, _image: &CanonicalImage) -> Result<ModelOutput, ClassifierError> {
        Ok(ModelOutput {
            predicted_index: 0,
            probabilities: self.probabilities.clone(),
        })
    }
}

fn photo(format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(1024, 768, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Normalize");
    group.sample_size(20);

    let jpeg = photo(ImageFormat::Jpeg);
    let png = photo(ImageFormat::Png);

    group.bench_function("jpeg_1024x768", |b| b.iter(|| normalize(black_box(&jpeg)).unwrap()));
    group.bench_function("png_1024x768", |b| b.iter(|| normalize(black_box(&png)).unwrap()));

    group.finish();
}

fn bench_preprocessing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Preprocessing");
    group.sample_size(20);

    let image = normalize(&photo(ImageFormat::Png)).unwrap();
    for (name, resize) in [
        ("squish", ResizeMode::Squish),
        ("letterbox", ResizeMode::Letterbox),
        ("center_crop", ResizeMode::CenterCrop),
    ] {
        let preprocessing = Preprocessing {
            resize,
            ..Preprocessing::default()
        };
        group.bench_function(name, |b| b.iter(|| preprocessing.to_tensor(black_box(&image))));
    }

    group.finish();
}

fn bench_ranking(c: &mut Criterion) {
    let labels: Vec<String> = (0..1000).map(|i| format!("class_{}", i)).collect();
    let probabilities = vec![1.0 / labels.len() as f32; labels.len()];
    let classifier = Classifier::builder()
        .with_image_model(Arc::new(Fixed {
            labels: labels.clone(),
            probabilities,
        }))
        .unwrap()
        .build()
        .unwrap();
    let image = CanonicalImage::from_rgb(RgbImage::new(1, 1));

    c.bench_function("classify_1000_labels", |b| {
        b.iter(|| classifier.classify(black_box(&image)).unwrap())
    });

    let table = ContentTable::builtin(&labels);
    c.bench_function("content_lookup", |b| b.iter(|| table.lookup(black_box("class_0"))));
}

criterion_group!(benches, bench_normalize, bench_preprocessing, bench_ranking);
criterion_main!(benches);
