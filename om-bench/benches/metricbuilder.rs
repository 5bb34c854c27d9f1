use std::fmt::Write;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use om_metricbuilder::{
    build_page, reader::read_page, BuilderConfig, ExpositionFormat, MetricBuilder,
};

const TIMESTAMP: i64 = 1_650_000_000_000;

// A page with `series` series each of a counter, a gauge, a histogram and a summary.
fn synthetic_page(series: usize) -> String {
    let mut page = String::new();

    writeln!(page, "# TYPE requests counter").unwrap();
    for i in 0..series {
        writeln!(page, "requests_total{{path=\"/{}\",code=\"200\"}} {}", i, i * 3).unwrap();
        writeln!(page, "requests_created{{path=\"/{}\",code=\"200\"}} 1600000000", i).unwrap();
    }

    writeln!(page, "# TYPE temperature gauge").unwrap();
    for i in 0..series {
        writeln!(page, "temperature{{room=\"{}\"}} {}.5", i, i).unwrap();
    }

    writeln!(page, "# TYPE latency histogram").unwrap();
    for i in 0..series {
        let mut cumulative = 0;
        for (n, le) in ["0.005", "0.01", "0.05", "0.1", "0.5", "1", "+Inf"].iter().enumerate() {
            cumulative += n + i;
            writeln!(page, "latency_bucket{{handler=\"{}\",le=\"{}\"}} {}", i, le, cumulative).unwrap();
        }
        writeln!(page, "latency_sum{{handler=\"{}\"}} {}.25", i, i).unwrap();
        writeln!(page, "latency_count{{handler=\"{}\"}} {}", i, cumulative).unwrap();
    }

    writeln!(page, "# TYPE rpc summary").unwrap();
    for i in 0..series {
        for q in ["0.5", "0.9", "0.99"] {
            writeln!(page, "rpc{{service=\"{}\",quantile=\"{}\"}} {}", i, q, i).unwrap();
        }
        writeln!(page, "rpc_sum{{service=\"{}\"}} {}", i, i * 10).unwrap();
        writeln!(page, "rpc_count{{service=\"{}\"}} {}", i, i * 2).unwrap();
    }

    writeln!(page, "up 1").unwrap();
    page
}

fn metricbuilder(cr: &mut Criterion) {
    let mut group = cr.benchmark_group("metricbuilder");

    for series in [10, 100, 1000] {
        let page = synthetic_page(series);
        group.throughput(Throughput::Bytes(page.len() as u64));

        group.bench_with_input(BenchmarkId::new("read", series), &page, |b, page| {
            b.iter(|| read_page(page, ExpositionFormat::Prometheus, TIMESTAMP).expect("read failed"))
        });

        let scraped = read_page(&page, ExpositionFormat::Prometheus, TIMESTAMP).expect("read failed");
        group.bench_with_input(BenchmarkId::new("build", series), &scraped, |b, scraped| {
            b.iter(|| {
                let mut builder = MetricBuilder::new(BuilderConfig::default(), &scraped.metadata)
                    .expect("bad config");
                for sample in scraped.samples.iter() {
                    let _ = builder.add_data_point(&sample.labels, sample.timestamp_ms, sample.value);
                }
                let mut metrics = vec![];
                builder.build(&mut metrics).expect("build failed");
                metrics
            })
        });

        group.bench_with_input(BenchmarkId::new("read+build", series), &page, |b, page| {
            b.iter(|| {
                build_page(
                    page,
                    ExpositionFormat::Prometheus,
                    TIMESTAMP,
                    BuilderConfig::default(),
                )
                .expect("build failed")
            })
        });
    }

    group.finish();
}

criterion_group!(metricbuilder_benches, metricbuilder);
criterion_main!(metricbuilder_benches);
