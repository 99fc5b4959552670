use criterion::{Criterion, criterion_group, criterion_main};
use scrapekit::{CommonLibrary, Processor, ScraperSettings, parse_definition};

const LIBRARY: &[u8] = include_bytes!("../tests/fixtures/metadata.example.movies/movies.xml");
const RATINGS: &[u8] = include_bytes!("../tests/fixtures/metadata.common.ratings/ratings.xml");
const SEARCH: &str = include_str!("../tests/fixtures/search.html");
const DETAILS: &str = include_str!("../tests/fixtures/alien.html");

fn load() -> scrapekit::ScraperDefinition {
    parse_definition(
        "metadata.example.movies",
        LIBRARY,
        &["metadata.common.ratings".to_string()],
        &[CommonLibrary::new("metadata.common.ratings/ratings.xml", RATINGS)],
    )
    .unwrap()
}

fn bench_parse_definition(c: &mut Criterion) {
    c.bench_function("parse_definition", |b| b.iter(load));
}

fn bench_search_results(c: &mut Criterion) {
    let definition = load();
    let settings = ScraperSettings::new();
    let processor = Processor::new(&definition, &settings);

    c.bench_function("search_results", |b| {
        b.iter(|| processor.execute_function("GetSearchResults", &["", SEARCH]))
    });
}

fn bench_details_with_calls(c: &mut Criterion) {
    let definition = load();
    let settings = ScraperSettings::new().with("fanart", "true");
    let processor = Processor::new(&definition, &settings);

    c.bench_function("details_with_calls", |b| {
        b.iter(|| processor.execute_function("GetDetails", &["", DETAILS, "tt0078748"]))
    });
}

// Large document: the same page repeated to stress repeat matching
fn bench_repeat_over_large_document(c: &mut Criterion) {
    let definition = load();
    let settings = ScraperSettings::new();
    let processor = Processor::new(&definition, &settings);
    let page = SEARCH.repeat(500);

    c.bench_function("repeat_over_large_document", |b| {
        b.iter(|| {
            std::hint::black_box(
                processor.execute_function("GetSearchResults", &["", page.as_str()]),
            )
        })
    });
}

criterion_group!(
    processor_benches,
    bench_parse_definition,
    bench_search_results,
    bench_details_with_calls,
    bench_repeat_over_large_document
);
criterion_main!(processor_benches);
