use criterion::{criterion_group, criterion_main, Criterion};
use search_core::{LemmaExtractor, StemmerMorphology};
use std::sync::Arc;

const TEXT: &str = "Повторное появление леопарда в Осетии позволяет предположить, \
    что леопард постоянно обитает в некоторых районах Северного Кавказа. \
    Кошка сидит на окне, а за окном идёт снег и дети лепят снеговика.";

fn bench_extract(c: &mut Criterion) {
    let extractor = LemmaExtractor::new(Arc::new(StemmerMorphology::russian()));
    let text = TEXT.repeat(50);
    c.bench_function("extract_lemmas", |b| b.iter(|| extractor.extract(&text)));
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
