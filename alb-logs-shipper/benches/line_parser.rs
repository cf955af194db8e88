//! Throughput of the two line parser strategies.
//!
//! ```bash
//! cargo bench -p alb-logs-shipper
//! ```

use alb_logs_shipper::config::OutputFormat;
use alb_logs_shipper::line::{LineParser, PatternParser, ScanParser};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

const LINE: &str = r#"http 2018-07-02T22:23:00.186641Z app/my-loadbalancer/50dc6c495c0c9188 192.168.131.39:2817 10.0.0.1:80 0.000 0.001 0.000 200 200 34 366 "GET http://www.example.com:80/ HTTP/1.1" "curl/7.46.0" - - arn:aws:elasticloadbalancing:us-east-2:123456789012:targetgroup/my-targets/73e2d6bc24d8a067 "Root=1-58337262-36d228ad5d99923122bbe354" "-" "-" 0 2018-07-02T22:22:48.364000Z "forward" "-" "-" "10.0.0.1:80" "200" "-" "-" TID_1234abcd5678ef90"#;

fn bench_parsers(c: &mut Criterion) {
    let mut group = c.benchmark_group("line_parser");
    group.throughput(Throughput::Bytes(LINE.len() as u64));

    let parsers: [(&str, &dyn LineParser); 2] =
        [("pattern", &PatternParser), ("scan", &ScanParser)];
    for format in [OutputFormat::Logfmt, OutputFormat::Json] {
        for (name, parser) in parsers {
            group.bench_with_input(BenchmarkId::new(name, format), &format, |b, format| {
                b.iter(|| parser.parse(*format, black_box(LINE)))
            });
        }
    }
    group.finish();
}

criterion_group!(benches, bench_parsers);
criterion_main!(benches);
