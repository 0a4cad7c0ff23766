use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "bedcensus=info";
const VERBOSE_FILTER: &str = "bedcensus=debug";

/// Install the stderr subscriber. `RUST_LOG` wins over the default filter;
/// `--verbose` raises this crate family to debug on top of either.
pub fn init_logging(verbose: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    if verbose {
        if let Ok(directive) = VERBOSE_FILTER.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Ignore a second init (tests may call in-process).
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
