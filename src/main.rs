use std::io::{self, Write};
use std::ops::ControlFlow;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::EnvFilter;

use tilebench::bench::{
    report::header, BenchmarkConfig, BenchmarkRunner, Implementation, ImplementationSet,
};
use tilebench::matmul::TileSpec;
use tilebench::matrix::FillPattern;
use tilebench::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TestName {
    /// Tiled, vectorized, parallel kernel
    #[value(alias = "explicit")]
    Tiled,
    /// Naive i-j-k triple loop
    #[value(alias = "class")]
    Reference,
    /// ndarray's general_mat_mul
    #[value(alias = "eigen")]
    Baseline,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Fill {
    Random,
    Trig,
}

/// Benchmark dense f32 matrix multiplication implementations.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Opt {
    /// Implementations to run, comma separated
    #[arg(short = 't', long = "test", value_enum, value_delimiter = ',', default_value = "all")]
    tests: Vec<TestName>,

    /// Timed iterations per matrix size
    #[arg(short, long = "iters", default_value_t = 1)]
    iterations: usize,

    /// Square matrix sizes, comma separated
    #[arg(
        short,
        long,
        value_delimiter = ',',
        default_value = "16,32,64,128,256,512,1024,2048"
    )]
    sizes: Vec<usize>,

    /// Worker threads for the tiled kernel [default: available cores]
    #[arg(long)]
    threads: Option<usize>,

    /// Untimed calls before each timed loop
    #[arg(long, default_value_t = 1)]
    warmup: usize,

    /// How operands are filled
    #[arg(long, value_enum, default_value = "random")]
    fill: Fill,

    /// Seed for random fill
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Check every output against the reference implementation
    #[arg(long)]
    verify: bool,

    /// Maximum relative error accepted by --verify
    #[arg(long, default_value_t = 1e-3)]
    tolerance: f32,

    /// Outer tile edge
    #[arg(long, default_value_t = 16)]
    outer: usize,

    /// Inner sub-tile edge
    #[arg(long, default_value_t = 8)]
    inner: usize,

    /// Accumulator lanes (4, 8 or 16)
    #[arg(long, default_value_t = 8)]
    lanes: usize,
}

impl Opt {
    fn implementations(&self) -> ImplementationSet {
        self.tests
            .iter()
            .fold(ImplementationSet::NONE, |set, test| match test {
                TestName::Tiled => set.with(Implementation::Tiled),
                TestName::Reference => set.with(Implementation::Reference),
                TestName::Baseline => set.with(Implementation::Baseline),
                TestName::All => ImplementationSet::ALL,
            })
    }

    fn config(&self) -> Result<BenchmarkConfig> {
        let fill = match self.fill {
            Fill::Random => FillPattern::Random { seed: self.seed },
            Fill::Trig => FillPattern::Trigonometric,
        };

        let mut builder = BenchmarkConfig::builder()
            .sizes(self.sizes.clone())
            .iterations(self.iterations)
            .implementations(self.implementations())
            .warmup(self.warmup)
            .tile(TileSpec::new(self.outer, self.inner, self.lanes)?)
            .fill(fill)
            .verify(self.verify)
            .tolerance(self.tolerance);
        if let Some(threads) = self.threads {
            builder = builder.threads(threads);
        }
        builder.build()
    }
}

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let opt = Opt::parse();

    let config = match opt.config() {
        Ok(config) => config,
        Err(e) => {
            error!(%e, "refusing to start");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let runner = match BenchmarkRunner::new(config) {
        Ok(runner) => runner,
        Err(e) => {
            error!(%e, "refusing to start");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(started = %chrono::Local::now().to_rfc3339(), "tilebench");

    let mut stdout = io::stdout().lock();
    if writeln!(stdout, "{}", header()).is_err() {
        return ExitCode::FAILURE;
    }
    let mut skipped = 0usize;
    let mut write_error = None;
    runner.run_with(|cell| {
        skipped += usize::from(cell.is_skipped());
        // Lines are written as cells finish; nobody is reading once stdout closes.
        match writeln!(stdout, "{cell}").and_then(|()| stdout.flush()) {
            Ok(()) => ControlFlow::Continue(()),
            Err(e) => {
                write_error = Some(e);
                ControlFlow::Break(())
            }
        }
    });

    if let Some(e) = write_error {
        error!(%e, "stdout closed, benchmark run abandoned");
        return ExitCode::FAILURE;
    }

    info!(skipped, "benchmark run finished");
    ExitCode::SUCCESS
}
