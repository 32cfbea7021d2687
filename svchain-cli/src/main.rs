mod chain;

use anyhow::Result;
use clap::{ArgAction, Command, arg};
use env_logger::Env;

pub mod consts {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
    pub const BIN_NAME: &str = "svchain";
}

fn build_parser() -> Command {
    Command::new(consts::BIN_NAME)
        .bin_name(consts::BIN_NAME)
        .version(consts::VERSION)
        .about("Reconstruct derivative chromosome chains from clustered structural variants.")
        .subcommand_required(true)
        .arg(
            arg!(-v --verbose "Log every link as it is added")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .subcommand(chain::cli::create_chain_cli())
        .subcommand(chain::cli::create_default_config_cli())
}

fn main() -> Result<()> {
    let app = build_parser();
    let matches = app.get_matches();

    let level = if matches.get_flag("verbose") {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match matches.subcommand() {
        //
        // CHAIN
        //
        Some((chain::cli::CHAIN_CMD, matches)) => {
            chain::handlers::run_chain(matches)?;
        }

        //
        // DEFAULT CONFIG
        //
        Some((chain::cli::DEFAULT_CONFIG_CMD, matches)) => {
            chain::handlers::run_default_config(matches)?;
        }

        _ => unreachable!("Subcommand not found"),
    };

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    fn test_parser_is_consistent() {
        build_parser().debug_assert();
    }

    #[rstest]
    fn test_chain_args() {
        let matches = build_parser()
            .try_get_matches_from([
                "svchain",
                "chain",
                "--clusters",
                "clusters.json.gz",
                "--threads",
                "4",
                "-v",
            ])
            .unwrap();

        assert!(matches.get_flag("verbose"));
        let (name, sub) = matches.subcommand().unwrap();
        assert_eq!(name, chain::cli::CHAIN_CMD);
        assert_eq!(sub.get_one::<String>("clusters").unwrap(), "clusters.json.gz");
        assert_eq!(*sub.get_one::<usize>("threads").unwrap(), 4);
        assert!(sub.get_one::<String>("output").is_none());
    }
}
