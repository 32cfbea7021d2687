use clap::{Arg, Command, arg, value_parser};

pub use svchain_chaining::consts::*;

pub fn create_chain_cli() -> Command {
    Command::new(CHAIN_CMD)
        .about("Form chains for every cluster in a cluster file.")
        .arg(
            Arg::new("clusters")
                .long("clusters")
                .required(true)
                .help("Clusters to chain, as JSON (optionally gzipped)"),
        )
        .arg(arg!(--config <config> "TOML chaining config; defaults apply to missing keys"))
        .arg(arg!(--output <output> "Where to write the chains as JSON"))
        .arg(arg!(--diagnostics <diagnostics> "Write one CSV summary row per cluster"))
        .arg(
            arg!(--threads <threads> "Number of clusters to chain at once")
                .value_parser(value_parser!(usize)),
        )
}

pub fn create_default_config_cli() -> Command {
    Command::new(DEFAULT_CONFIG_CMD)
        .about("Print the default chaining config as TOML.")
        .arg(arg!(--output <output> "Write the config to a file instead of stdout"))
}
