use contentscout::results::{FileDescriptor, FileResult};
use contentscout::search::format_html;
use contentscout::{MatchEngine, ReplaceEngine, Replacement, SearchConfig, SearchType, TargetScope};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn create_page(sections: usize) -> String {
    let mut page = String::from("<body><header><nav><a href=\"/acme\">Acme Corp</a></nav></header><main>");
    for i in 0..sections {
        page.push_str(&format!(
            "<div><h2>Section {i}</h2><p>Acme Corp ships product {i}. Contact Acme Corp support.</p>\
             <div class=\"cards\"><div><div><p>Card {i}</p></div></div></div></div>"
        ));
    }
    page.push_str(
        "<div class=\"metadata\"><div><div>title</div><div>Acme Corp home</div></div></div></main></body>",
    );
    page
}

fn result_for(content: &str, config: &SearchConfig) -> FileResult {
    FileResult {
        file: FileDescriptor {
            path: "/acme/site/index.html".to_string(),
            extension: Some("html".to_string()),
            last_modified: None,
            name: "index.html".to_string(),
        },
        matches: MatchEngine::new().find_matches(content, config).unwrap(),
        original_content: content.to_string(),
        updated_content: None,
        expanded: false,
        is_blank_page: false,
        is_json_file: false,
        element_count: 0,
        config_fingerprint: config.fingerprint(),
    }
}

fn bench_detection(c: &mut Criterion) {
    let page = create_page(200);
    let configs = vec![
        ("contains", SearchConfig::contains("Acme Corp")),
        (
            "exact",
            SearchConfig {
                search_type: SearchType::Exact,
                ..SearchConfig::contains("Acme")
            },
        ),
        (
            "regex",
            SearchConfig {
                search_type: SearchType::RegularExpression,
                ..SearchConfig::contains(r"product \d+")
            },
        ),
        (
            "page_metadata",
            SearchConfig {
                target_scope: TargetScope::PageMetadata,
                ..SearchConfig::contains("Acme Corp")
            },
        ),
        (
            "custom_selector",
            SearchConfig {
                target_scope: TargetScope::CustomSelector(".cards".to_string()),
                ..SearchConfig::contains("Card")
            },
        ),
    ];

    let mut group = c.benchmark_group("Detection");
    for (name, config) in &configs {
        let engine = MatchEngine::new();
        group.bench_function(*name, |b| {
            b.iter(|| engine.find_matches(black_box(&page), config).unwrap());
        });
    }
    group.finish();
}

fn bench_replace(c: &mut Criterion) {
    let page = create_page(200);
    let config = SearchConfig::contains("Acme Corp").with_replacement(Replacement::Text("Acme".to_string()));
    let all = result_for(&page, &config);
    let mut half = all.clone();
    for m in half.matches.iter_mut().filter(|m| m.id % 2 == 1) {
        m.selected = false;
    }

    let mut group = c.benchmark_group("Replace");
    let engine = ReplaceEngine::new(MatchEngine::new());
    group.bench_function("all_selected", |b| {
        b.iter(|| engine.apply(black_box(&all), &config).unwrap());
    });
    group.bench_function("half_selected", |b| {
        b.iter(|| engine.apply(black_box(&half), &config).unwrap());
    });
    group.finish();
}

fn bench_formatting(c: &mut Criterion) {
    let page = create_page(200);
    c.bench_function("format_html", |b| b.iter(|| format_html(black_box(&page))));
}

criterion_group!(benches, bench_detection, bench_replace, bench_formatting);
criterion_main!(benches);
