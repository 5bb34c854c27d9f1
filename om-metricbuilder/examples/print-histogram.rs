use anyhow::{anyhow, Result};
use indoc::indoc;
use itertools::Itertools;
use om_metricbuilder::{build_page, BuilderConfig, ExpositionFormat, MetricData};

const COLORS: &[&'static str] = &[
    "\u{2591}", "\u{2592}", "\u{2593}",
    "\u{25A3}", "\u{25A9}", "\u{25A4}"
];

fn main() -> Result<()> {
    // Buckets deliberately out of order, the builder sorts them.
    let om_data = indoc! {r#"
        # TYPE a histogram
        # HELP a help
        a_bucket{le="1.0"} 7
        a_bucket{le="+Inf"} 15
        a_bucket{le="0.5"} 5
        a_count 15
        a_sum 2
        # EOF
    "#};

    let mut args = std::env::args();

    let progname = args.next().ok_or(anyhow!("ARGV[0] was not set??"))?;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" => {
                println!("Usage: {} [--print-exposition]", progname);
                return Ok(());
            }
            "--print-exposition" => {
                println!("Exposition:\n\n{}", om_data);
            }
            arg => return Err(anyhow!("Unknown argument: {}", arg)),
        }
    }

    let output = build_page(
        om_data,
        ExpositionFormat::OpenMetrics,
        0,
        BuilderConfig::default(),
    )?;

    let metric = output.metrics.first().ok_or(anyhow!("empty exposition?"))?;
    let point = match &metric.data {
        MetricData::Histogram(points) => points.first().ok_or(anyhow!("no points?"))?,
        other => return Err(anyhow!("not a histogram: {:?}", other.kind())),
    };

    let factor = match point.count {
        count if count < 25 => 2,
        _ => 1,
    };

    print!("Distribution of «{}»: ", metric.name);
    point
        .bucket_counts
        .iter()
        .zip(COLORS)
        .fold(0, |acc, (count, color)| {
            print!("{}", color.repeat((*count - acc) as usize * factor));
            *count
        });
    print!("\t");

    let bounds = point
        .explicit_bounds
        .iter()
        .map(|bound| bound.to_string())
        .chain(std::iter::once("+Inf".to_string()));

    println!(
        "[ {}]",
        bounds
            .zip(COLORS.iter().cycle())
            .map(|(bound, color)| format!("{} ≤ {} ", color, bound))
            .join(" ")
    );

    Ok(())
}
