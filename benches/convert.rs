//! Benchmarks for Markdown to HTML conversion.

use std::fmt::Write as _;
use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use markdown_html_converter::converter::MarkdownConverter;
use markdown_html_converter::ffi::{markdown_get_default_allocator, markdown_to_html};
use markdown_html_converter::options::{OPT_DEFAULT, OPT_SOURCEPOS, Options};

/// Generate a document with `sections` headings, each followed by lists,
/// code and paragraphs full of inline markup.
fn generate_markdown(sections: usize) -> String {
    let mut md = String::with_capacity(sections * 400);
    md.push_str("# Document Title\n\n");

    for i in 0..sections {
        let _ = write!(
            md,
            "## Section {i}\n\n\
             Paragraph with **bold**, *italic*, `code` and a [link][ref{i}].\n\
             Second line with <span>inline html</span> &amp; an entity.\n\n\
             - item one\n- item *two*\n  continued\n\n\
             > quoted text\n\n\
             ```rust\nfn f() -> u32 {{ {i} }}\n```\n\n\
             [ref{i}]: https://example.com/{i} \"Title {i}\"\n\n"
        );
    }
    md
}

fn bench_convert_simple(c: &mut Criterion) {
    let converter = MarkdownConverter::new();

    c.bench_function("convert_simple_markdown", |b| {
        b.iter(|| converter.convert(black_box("# Hello\n\nSimple *content*.")));
    });
}

fn bench_convert_varying_sizes(c: &mut Criterion) {
    let converter = MarkdownConverter::new();
    let mut group = c.benchmark_group("convert_by_size");

    for sections in [5, 50, 500] {
        let markdown = generate_markdown(sections);
        group.throughput(Throughput::Bytes(markdown.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("sections", sections),
            &markdown,
            |b, markdown| b.iter(|| converter.convert(markdown)),
        );
    }

    group.finish();
}

fn bench_convert_sourcepos(c: &mut Criterion) {
    let converter = MarkdownConverter::with_options(Options::from_bits(OPT_SOURCEPOS));
    let markdown = generate_markdown(50);

    c.bench_function("convert_with_sourcepos", |b| {
        b.iter(|| converter.convert(&markdown));
    });
}

fn bench_pathological(c: &mut Criterion) {
    let converter = MarkdownConverter::new();
    let mut group = c.benchmark_group("pathological");

    let inputs = [
        ("nested_quotes", ">".repeat(5_000) + " x"),
        ("open_brackets", "[".repeat(5_000) + "x"),
        ("emphasis_runs", "*a **a ".repeat(2_000)),
        ("backticks", "`a``".repeat(2_000)),
    ];
    for (name, markdown) in &inputs {
        group.throughput(Throughput::Bytes(markdown.len() as u64));
        group.bench_with_input(BenchmarkId::new(*name, markdown.len()), markdown, |b, md| {
            b.iter(|| converter.convert(md))
        });
    }

    group.finish();
}

fn bench_ffi(c: &mut Criterion) {
    let markdown = generate_markdown(50);
    let allocator = markdown_get_default_allocator();

    c.bench_function("ffi_markdown_to_html", |b| {
        b.iter(|| {
            // SAFETY: `markdown` is a live string of the given length.
            let html = unsafe { markdown_to_html(markdown.as_ptr(), markdown.len(), OPT_DEFAULT) };
            // SAFETY: the result came from the default allocator record.
            unsafe {
                if let Some(release) = (*allocator).release {
                    release(black_box(html).cast());
                }
            }
        });
    });
}

criterion_group!(
    benches,
    bench_convert_simple,
    bench_convert_varying_sizes,
    bench_convert_sourcepos,
    bench_pathological,
    bench_ffi
);
criterion_main!(benches);
